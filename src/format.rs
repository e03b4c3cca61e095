//! Output formatting for command results, as markdown or JSON.

use crate::db::Page;
use crate::db::import::ImportResults;
use crate::logging::summary_lines;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    #[default]
    Markdown,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

fn push_section(md: &mut String, heading: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    md.push_str(&format!("\n### {} ({})\n", heading, items.len()));
    for item in items {
        md.push_str(&format!("- {}\n", item));
    }
}

/// Format import results as markdown.
pub fn format_results_markdown(results: &ImportResults) -> String {
    let mut md = String::new();
    md.push_str(if results.dry_run {
        "## Import preview\n"
    } else {
        "## Import results\n"
    });

    let summary = summary_lines(results);
    if summary.is_empty() {
        md.push_str("- nothing imported\n");
    }
    for line in summary {
        md.push_str(&format!("- {}\n", line));
    }

    push_section(&mut md, "Warnings", &results.warnings);
    push_section(&mut md, "Errors", &results.errors);
    push_section(&mut md, "Failures", &results.failures);
    md
}

pub fn format_results_json(results: &ImportResults) -> Value {
    json!({
        "dry_run": results.dry_run,
        "success": results.is_success(),
        "pages": results.pages,
        "snippets": results.snippets,
        "images": results.images,
        "warnings": results.warnings,
        "errors": results.errors,
        "failures": results.failures,
    })
}

pub fn format_results(results: &ImportResults, format: OutputFormat) -> String {
    match format {
        OutputFormat::Markdown => format_results_markdown(results),
        OutputFormat::Json => {
            serde_json::to_string_pretty(&format_results_json(results)).unwrap_or_default()
        }
    }
}

/// Format the destination tree as an indented markdown list.
pub fn format_pages_markdown(pages: &[Page]) -> String {
    let mut md = format!("# Pages ({})\n\n", pages.len());
    for page in pages {
        let indent = "  ".repeat(page.depth.saturating_sub(1) as usize);
        md.push_str(&format!(
            "{}- **{}** `{}` id={} ({}){}\n",
            indent,
            if page.title.is_empty() { "(untitled)" } else { page.title.as_str() },
            page.path,
            page.id,
            page.model_key(),
            if page.live { "" } else { " draft" }
        ));
    }
    md
}

pub fn format_pages(pages: &[Page], format: OutputFormat) -> String {
    match format {
        OutputFormat::Markdown => format_pages_markdown(pages),
        OutputFormat::Json => serde_json::to_string_pretty(pages).unwrap_or_default(),
    }
}
