use crate::config::ReportConfig;
use crate::output::{JsonFormatter, MarkdownFormatter, OutputFormat, OutputFormatter, TextFormatter};
use anyhow::{Context, Result};
use desan_core::analysis::dependency::to_reports;
use desan_core::analysis::{
    collect_function_summaries, find_sanitizer_calls, propagate_globals, CheckReport,
    FunctionSummary,
};
use desan_core::{
    AnalysisContext, CheckKey, CheckSubgraph, MarkingPolicy, Module, RemovalStrategy,
};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A titled block of key/value pairs followed by a list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Section {
    pub title: String,
    pub pairs: Vec<(String, String)>,
    pub items: Vec<String>,
}

impl Section {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    pub fn pair(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.pairs.push((key.into(), value.to_string()));
        self
    }

    pub fn items(mut self, items: Vec<String>) -> Self {
        self.items = items;
        self
    }
}

pub fn render_sections(formatter: &dyn OutputFormatter, title: &str, sections: &[Section]) -> String {
    let mut out = formatter.format_section(title);
    for section in sections {
        out.push_str(&formatter.format_section(&section.title));
        for (key, value) in &section.pairs {
            out.push_str(&formatter.format_pair(key, value));
            out.push('\n');
        }
        if !section.items.is_empty() {
            out.push_str(&formatter.format_list(&section.items));
            out.push('\n');
        }
    }
    out
}

pub trait Report: Serialize {
    fn title(&self) -> String;

    fn sections(&self, config: &ReportConfig) -> Vec<Section>;

    fn render(&self, format: OutputFormat, config: &ReportConfig) -> Result<String> {
        match format {
            OutputFormat::Json => JsonFormatter::to_string(self),
            OutputFormat::Text => Ok(render_sections(
                &TextFormatter::new(config.use_colors),
                &self.title(),
                &self.sections(config),
            )),
            OutputFormat::Markdown => Ok(render_sections(
                &MarkdownFormatter,
                &self.title(),
                &self.sections(config),
            )),
        }
    }

    fn write_to(&self, path: &Path, format: OutputFormat, config: &ReportConfig) -> Result<()> {
        let rendered = self.render(format, config)?;
        std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write report to {}", path.display()))
    }
}

pub fn strategy_label(strategy: &RemovalStrategy) -> String {
    match strategy {
        RemovalStrategy::All => "all".to_string(),
        RemovalStrategy::Ranked { limit } => format!("ranked (limit {})", limit),
    }
}

/// Per-check dependency data keyed by `<function>:call<n>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencyReport {
    pub checks: IndexMap<String, CheckReport>,
}

impl DependencyReport {
    pub fn from_subgraphs(
        subgraphs: &IndexMap<CheckKey, CheckSubgraph>,
        ctx: &AnalysisContext,
    ) -> Self {
        Self {
            checks: to_reports(subgraphs, ctx),
        }
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        JsonFormatter::to_string(self)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write dependencies to {}", path.display()))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read dependencies from {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl Report for DependencyReport {
    fn title(&self) -> String {
        "Check Dependencies".to_string()
    }

    fn sections(&self, config: &ReportConfig) -> Vec<Section> {
        self.checks
            .iter()
            .map(|(key, check)| {
                let section = Section::new(key)
                    .pair("function", &check.function)
                    .pair("check", &check.check)
                    .pair("operands", check.operands.join(", "));
                if !config.verbosity.should_list_operands() {
                    return section;
                }
                let items = check
                    .aliases
                    .iter()
                    .map(|(op, info)| {
                        format!(
                            "{} write={} aliases=[{}]",
                            op,
                            info.is_write,
                            info.alias_set.join(", ")
                        )
                    })
                    .collect();
                section.items(items)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindCount {
    pub total: usize,
    pub removed: usize,
}

/// Outcome of one redundancy analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedundancyReport {
    pub source: Option<String>,
    pub total_checks: usize,
    pub redundant: usize,
    pub kept: usize,
    pub by_kind: IndexMap<String, KindCount>,
    pub redundant_keys: Vec<String>,
    pub policy: MarkingPolicy,
    pub strategy: RemovalStrategy,
}

impl RedundancyReport {
    pub fn new(
        subgraphs: &IndexMap<CheckKey, CheckSubgraph>,
        redundant: &IndexSet<CheckKey>,
        policy: MarkingPolicy,
        strategy: RemovalStrategy,
    ) -> Self {
        let mut by_kind: IndexMap<String, KindCount> = IndexMap::new();
        for (key, sg) in subgraphs {
            let kind = sg
                .kind()
                .map(|k| k.short_name().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            let count = by_kind.entry(kind).or_default();
            count.total += 1;
            if redundant.contains(key) {
                count.removed += 1;
            }
        }
        by_kind.sort_keys();

        Self {
            source: None,
            total_checks: subgraphs.len(),
            redundant: redundant.len(),
            kept: subgraphs.len().saturating_sub(redundant.len()),
            by_kind,
            redundant_keys: redundant.iter().map(ToString::to_string).collect(),
            policy,
            strategy,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Fraction of checks removed, 0 for a module without checks.
    pub fn removal_ratio(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.redundant as f64 / self.total_checks as f64
        }
    }
}

impl Report for RedundancyReport {
    fn title(&self) -> String {
        match &self.source {
            Some(source) => format!("Redundancy Report: {}", source),
            None => "Redundancy Report".to_string(),
        }
    }

    fn sections(&self, config: &ReportConfig) -> Vec<Section> {
        let mut sections = vec![Section::new("Summary")
            .pair("checks", self.total_checks)
            .pair("redundant", self.redundant)
            .pair("kept", self.kept)
            .pair("removed", format!("{:.1}%", self.removal_ratio() * 100.0))
            .pair("policy", self.policy)
            .pair("strategy", strategy_label(&self.strategy))];

        let kinds = self
            .by_kind
            .iter()
            .map(|(kind, count)| format!("{}: {} of {} removed", kind, count.removed, count.total))
            .collect();
        sections.push(Section::new("By Sanitizer").items(kinds));

        if config.verbosity.should_list_keys() {
            sections.push(Section::new("Removed Checks").items(self.redundant_keys.clone()));
        }
        sections
    }
}

/// Structure and statistics of a parsed module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub source: Option<String>,
    pub functions: Vec<String>,
    pub globals: Vec<String>,
    pub declarations: usize,
    pub basic_blocks: usize,
    pub instructions: usize,
    pub opcodes: IndexMap<String, usize>,
    pub sanitizer_calls: usize,
    pub summaries: Vec<FunctionSummary>,
    pub uses_globals: IndexMap<String, bool>,
}

impl ModuleReport {
    pub fn from_module(module: &Module) -> Self {
        Self {
            source: module.source_name.clone(),
            functions: module.functions.keys().cloned().collect(),
            globals: module.globals.clone(),
            declarations: module.declarations.len(),
            basic_blocks: module.block_count(),
            instructions: module.instruction_count(),
            opcodes: module.opcode_histogram(),
            sanitizer_calls: find_sanitizer_calls(module).len(),
            summaries: collect_function_summaries(module).into_values().collect(),
            uses_globals: propagate_globals(module),
        }
    }
}

impl Report for ModuleReport {
    fn title(&self) -> String {
        match &self.source {
            Some(source) => format!("Module Report: {}", source),
            None => "Module Report".to_string(),
        }
    }

    fn sections(&self, config: &ReportConfig) -> Vec<Section> {
        let mut sections = vec![Section::new("Overview")
            .pair("functions", self.functions.len())
            .pair("globals", self.globals.len())
            .pair("declarations", self.declarations)
            .pair("basic blocks", self.basic_blocks)
            .pair("instructions", self.instructions)
            .pair("sanitizer calls", self.sanitizer_calls)];

        let opcodes = self
            .opcodes
            .iter()
            .map(|(opcode, count)| format!("{}: {}", opcode, count))
            .collect();
        sections.push(Section::new("Opcodes").items(opcodes));

        if config.verbosity.should_list_functions() {
            let summaries = self
                .summaries
                .iter()
                .map(|summary| {
                    let transitive = self.uses_globals.get(&summary.name).copied().unwrap_or(false);
                    format!("{} (transitive globals={})", summary, transitive)
                })
                .collect();
            sections.push(Section::new("Functions").items(summaries));
        }
        sections
    }
}
