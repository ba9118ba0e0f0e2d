use anyhow::{bail, Result};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => bail!("Unknown output format: {}", other),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => f.write_str("text"),
            OutputFormat::Json => f.write_str("json"),
            OutputFormat::Markdown => f.write_str("markdown"),
        }
    }
}

pub trait OutputFormatter {
    fn format_pair(&self, key: &str, value: &str) -> String;

    fn format_list(&self, items: &[String]) -> String;

    fn format_section(&self, title: &str) -> String;

    fn format_code(&self, code: &str, language: Option<&str>) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TextFormatter {
    pub use_colors: bool,
}

impl TextFormatter {
    pub fn new(use_colors: bool) -> Self {
        Self { use_colors }
    }
}

impl OutputFormatter for TextFormatter {
    fn format_pair(&self, key: &str, value: &str) -> String {
        if self.use_colors {
            format!("{}: {}", key.cyan(), value)
        } else {
            format!("{}: {}", key, value)
        }
    }

    fn format_list(&self, items: &[String]) -> String {
        items
            .iter()
            .map(|item| format!("  - {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_section(&self, title: &str) -> String {
        let heading = format!("=== {} ===", title);
        if self.use_colors {
            format!("\n{}\n", heading.bold())
        } else {
            format!("\n{}\n", heading)
        }
    }

    fn format_code(&self, code: &str, _language: Option<&str>) -> String {
        code.to_string()
    }
}

pub struct MarkdownFormatter;

impl OutputFormatter for MarkdownFormatter {
    fn format_pair(&self, key: &str, value: &str) -> String {
        format!("**{}**: {}", key, value)
    }

    fn format_list(&self, items: &[String]) -> String {
        items
            .iter()
            .map(|item| format!("- `{}`", item))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn format_section(&self, title: &str) -> String {
        format!("\n## {}\n", title)
    }

    fn format_code(&self, code: &str, language: Option<&str>) -> String {
        let lang = language.unwrap_or("llvm");
        format!("```{}\n{}\n```", lang, code)
    }
}

pub struct JsonFormatter;

impl JsonFormatter {
    pub fn format_object<W: Write>(writer: &mut W, obj: &serde_json::Value) -> Result<()> {
        serde_json::to_writer_pretty(writer, obj)?;
        Ok(())
    }

    pub fn to_string<T: Serialize + ?Sized>(value: &T) -> Result<String> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_names() {
        assert_eq!("md".parse::<OutputFormat>().unwrap(), OutputFormat::Markdown);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("html".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Markdown.to_string(), "markdown");
    }

    #[test]
    fn test_plain_text_formatter() {
        let formatter = TextFormatter::new(false);
        assert_eq!(formatter.format_pair("checks", "3"), "checks: 3");
        assert_eq!(formatter.format_section("Summary"), "\n=== Summary ===\n");
        assert_eq!(
            formatter.format_list(&["a".to_string(), "b".to_string()]),
            "  - a\n  - b"
        );
    }

    #[test]
    fn test_markdown_formatter() {
        let formatter = MarkdownFormatter;
        assert_eq!(formatter.format_pair("checks", "3"), "**checks**: 3");
        assert_eq!(formatter.format_list(&["@f:call0".to_string()]), "- `@f:call0`");
        assert_eq!(formatter.format_code("ret void", None), "```llvm\nret void\n```");
    }

    #[test]
    fn test_json_formatter() {
        let mut buffer = Vec::new();
        JsonFormatter::format_object(&mut buffer, &serde_json::json!({"removed": 2})).unwrap();
        assert_eq!(String::from_utf8(buffer).unwrap(), "{\n  \"removed\": 2\n}");
    }
}
