use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use desan::core::analysis::defined_function;
use desan::{AnalysisConfig, MarkingPolicy, PipelineConfig, RemovalStrategy};
use desan_emit::{OutputFormat, ReportConfig, VerbosityLevel};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "desan")]
#[command(about = "desan - remove redundant sanitizer checks from LLVM IR")]
#[command(version = "0.1.0")]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only errors in the log; reports leave out per-check listings
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a project with sanitizers, drop redundant checks, and rebuild it
    Run {
        #[arg(long)]
        project: Option<PathBuf>,

        #[arg(long, value_delimiter = ',')]
        sanitizers: Option<Vec<String>>,

        #[arg(long)]
        opt_level: Option<String>,

        #[arg(long)]
        build_dir: Option<PathBuf>,

        #[arg(long)]
        verify: bool,

        #[arg(long)]
        include_cpp: bool,

        /// Comma-separated preprocessor defines
        #[arg(long)]
        defines: Option<String>,

        /// Colon-separated include directories
        #[arg(long)]
        include_paths: Option<String>,

        /// Comma-separated extra clang flags
        #[arg(long, allow_hyphen_values = true)]
        extra_flags: Option<String>,

        #[arg(long)]
        split: bool,

        /// JSON pipeline configuration; flags override its values
        #[arg(long)]
        config: Option<PathBuf>,

        #[command(flatten)]
        analysis: AnalysisArgs,
    },

    /// Remove redundant checks from a text IR file
    Analyze {
        input: PathBuf,

        /// Defaults to `<input>.opt.ll`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write per-check dependency data as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        analysis: AnalysisArgs,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        #[arg(long)]
        no_color: bool,
    },

    /// Print module statistics
    Report {
        input: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,

        #[arg(long)]
        no_color: bool,
    },

    /// Check that a text IR file parses
    Validate { input: PathBuf },
}

#[derive(Args, Debug, Clone, Default)]
struct AnalysisArgs {
    #[arg(long, value_enum)]
    policy: Option<Policy>,

    /// Remove at most this many checks, best-ranked first
    #[arg(long)]
    limit: Option<usize>,

    /// Keep cross-function pairs when either function touches globals
    #[arg(long)]
    interprocedural_guard: bool,
}

impl AnalysisArgs {
    fn apply(&self, mut config: AnalysisConfig) -> AnalysisConfig {
        if let Some(policy) = self.policy {
            config.policy = policy.into();
        }
        if let Some(limit) = self.limit {
            config.strategy = RemovalStrategy::Ranked { limit };
        }
        if self.interprocedural_guard {
            config.interprocedural_guard = true;
        }
        config
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    Transitive,
    StrictPairwise,
}

impl From<Policy> for MarkingPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Transitive => MarkingPolicy::Transitive,
            Policy::StrictPairwise => MarkingPolicy::StrictPairwise,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
    Markdown,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Text => OutputFormat::Text,
            Format::Json => OutputFormat::Json,
            Format::Markdown => OutputFormat::Markdown,
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match verbose {
        _ if quiet => "error",
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);
    let verbosity = if cli.quiet {
        VerbosityLevel::Quiet
    } else {
        VerbosityLevel::from_count(cli.verbose)
    };

    match cli.command {
        Commands::Run {
            project,
            sanitizers,
            opt_level,
            build_dir,
            verify,
            include_cpp,
            defines,
            include_paths,
            extra_flags,
            split,
            config,
            analysis,
        } => {
            let mut pipeline = match config {
                Some(path) => PipelineConfig::from_file(&path)?,
                None => {
                    let project = project.clone().ok_or_else(|| {
                        anyhow::anyhow!("--project is required unless --config is given")
                    })?;
                    PipelineConfig {
                        compiler: desan::CompilerConfig::new(project),
                        ..PipelineConfig::default()
                    }
                }
            };
            let compiler = &mut pipeline.compiler;
            if let Some(project) = project {
                compiler.project_path = project;
            }
            if let Some(sanitizers) = sanitizers {
                compiler.sanitizers = sanitizers;
            }
            if let Some(opt_level) = opt_level {
                compiler.opt_level = opt_level;
            }
            if let Some(defines) = defines {
                compiler.defines = split_list(&defines, ',');
            }
            if let Some(paths) = include_paths {
                compiler.include_paths = split_list(&paths, ':');
            }
            if let Some(flags) = extra_flags {
                compiler.extra_flags = split_list(&flags, ',');
            }
            compiler.include_cpp |= include_cpp;
            if let Some(build_dir) = build_dir {
                pipeline.build_dir = build_dir;
            }
            pipeline.verify |= verify;
            pipeline.split |= split;
            pipeline.analysis = analysis.apply(pipeline.analysis);
            cmd_run(&pipeline)
        }
        Commands::Analyze {
            input,
            output,
            report,
            analysis,
            format,
            no_color,
        } => {
            let config = analysis.apply(AnalysisConfig::default());
            let rendering = report_config(format, no_color, verbosity);
            cmd_analyze(&input, output, report, &config, format, &rendering)
        }
        Commands::Report {
            input,
            output,
            format,
            no_color,
        } => cmd_report(&input, output, format, &report_config(format, no_color, verbosity)),
        Commands::Validate { input } => cmd_validate(&input),
    }
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    desan_toolchain::config::split_list(value, separator)
}

fn report_config(format: Format, no_color: bool, verbosity: VerbosityLevel) -> ReportConfig {
    ReportConfig {
        use_colors: format == Format::Text && !no_color,
        verbosity,
    }
}

fn cmd_run(config: &PipelineConfig) -> Result<()> {
    use colored::*;

    eprintln!("{}", " desan pipeline".bright_blue().bold());
    eprintln!(" Project: {}", config.compiler.project_path.display());
    eprintln!(" Build directory: {}", config.build_dir.display());
    eprintln!(" Policy: {}", config.analysis.policy);

    let outputs = desan::run_pipeline(config)?;

    println!(
        "{} removed {} of {} check(s)",
        "SUCCESS:".bright_green().bold(),
        outputs.report.redundant,
        outputs.report.total_checks
    );
    println!("bitcode: {}", outputs.bitcode.display());
    println!("ir: {}", outputs.ir.display());
    println!("optimized_ir: {}", outputs.optimized_ir.display());
    println!("dependencies: {}", outputs.dependencies.display());
    println!("binary: {}", outputs.binary.display());
    Ok(())
}

fn cmd_analyze(
    input: &Path,
    output: Option<PathBuf>,
    report: Option<PathBuf>,
    config: &AnalysisConfig,
    format: Format,
    report_config: &ReportConfig,
) -> Result<()> {
    use colored::*;
    use desan::Report;

    let output = output.unwrap_or_else(|| input.with_extension("opt.ll"));
    let optimization = desan::optimize_ir_file(input, &output, config)?;

    if let Some(report_path) = report {
        optimization.dependencies.save_json(&report_path)?;
        eprintln!(" Dependencies: {}", report_path.display());
    }

    print!(
        "{}",
        optimization.report.render(format.into(), report_config)?
    );
    if format != Format::Json {
        println!();
    }
    eprintln!(
        " {} {} -> {}",
        "Optimised:".bright_green().bold(),
        input.display(),
        output.display()
    );
    Ok(())
}

fn cmd_report(
    input: &Path,
    output: Option<PathBuf>,
    format: Format,
    report_config: &ReportConfig,
) -> Result<()> {
    use desan::Report;

    let module = desan_parser::parse_file(input)?;
    let report = desan::ModuleReport::from_module(&module);
    match output {
        Some(path) => report.write_to(&path, format.into(), report_config)?,
        None => println!("{}", report.render(format.into(), report_config)?),
    }
    Ok(())
}

fn cmd_validate(input: &Path) -> Result<()> {
    use colored::*;

    let text = std::fs::read_to_string(input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))?;

    let module = match desan_parser::parse_module(&text) {
        Ok(module) => module,
        Err(e) => {
            println!("{}", " INVALID".bright_red().bold());
            println!("\n{}", "Parse Error:".bright_red());
            println!("{}", e);
            return Err(anyhow::anyhow!("Validation failed"));
        }
    };

    // A `define` the grammar could not take apart would be invisible to the analysis.
    let skipped: Vec<String> = text
        .lines()
        .filter_map(|line| defined_function(line.trim()))
        .filter(|name| module.get_function(name).is_none())
        .collect();
    if !skipped.is_empty() {
        println!("{}", " INVALID".bright_red().bold());
        for name in &skipped {
            println!("   could not parse the body of {}", name);
        }
        return Err(anyhow::anyhow!("Validation failed"));
    }

    println!("{}", " VALID".bright_green().bold());
    println!(
        "   {} function(s), {} sanitizer call(s)",
        module.functions.len(),
        desan::core::analysis::find_sanitizer_calls(&module).len()
    );
    Ok(())
}
