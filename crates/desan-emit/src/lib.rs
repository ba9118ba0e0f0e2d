/*! Reports for sanitizer check analysis.
 *
 * An analysis run is only useful if someone can see what it decided. These types turn the
 * dependency subgraphs, the redundant set and the module structure into reports that render as
 * plain text for a terminal, markdown for a review, or JSON for another tool.
 */

pub mod config;
pub mod output;
pub mod report;

pub use config::{ReportConfig, VerbosityLevel};
pub use output::{JsonFormatter, MarkdownFormatter, OutputFormat, OutputFormatter, TextFormatter};
pub use report::{
    render_sections, strategy_label, DependencyReport, KindCount, ModuleReport, RedundancyReport,
    Report, Section,
};
