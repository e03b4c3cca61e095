//! Reporting of import results through `tracing`.
//!
//! Results are emitted in bands of increasing severity: the imported counts
//! at info, warnings at warn, errors at error, and failures at error tagged
//! `critical`.

use crate::db::import::ImportResults;
use tracing::Level;

/// Severity band of a reported message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }

    /// The `tracing` level a band is emitted at.
    pub fn level(&self) -> Level {
        match self {
            Severity::Info => Level::INFO,
            Severity::Warning => Level::WARN,
            Severity::Error | Severity::Critical => Level::ERROR,
        }
    }

    /// Highest band present in `results`.
    pub fn of(results: &ImportResults) -> Severity {
        if !results.failures.is_empty() {
            Severity::Critical
        } else if !results.errors.is_empty() {
            Severity::Error
        } else if !results.warnings.is_empty() {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    /// Process exit code for a run that ended in this band.
    pub fn exit_code(&self) -> i32 {
        match self {
            Severity::Info | Severity::Warning => 0,
            Severity::Error | Severity::Critical => 1,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Emit one message in its severity band.
pub fn emit(severity: Severity, message: &str) {
    match severity {
        Severity::Info => tracing::info!(severity = %severity, "{}", message),
        Severity::Warning => tracing::warn!(severity = %severity, "{}", message),
        Severity::Error | Severity::Critical => {
            tracing::error!(severity = %severity, "{}", message)
        }
    }
}

/// One line per phase with anything to report.
pub fn summary_lines(results: &ImportResults) -> Vec<String> {
    let verb = if results.dry_run {
        "Would import"
    } else {
        "Imported"
    };
    [
        ("page", "pages", results.pages),
        ("snippet", "snippets", results.snippets),
        ("image", "images", results.images),
    ]
    .into_iter()
    .filter(|(_, _, count)| count.total() > 0)
    .map(|(one, many, count)| {
        format!(
            "{} {} {} ({} created, {} updated)",
            verb,
            count.total(),
            if count.total() == 1 { one } else { many },
            count.created,
            count.updated
        )
    })
    .collect()
}

/// Log every band of `results` and return the highest band reached.
pub fn report_results(results: &ImportResults) -> Severity {
    let summary = summary_lines(results);
    if summary.is_empty() {
        emit(Severity::Info, "Nothing imported");
    }
    for line in &summary {
        emit(Severity::Info, line);
    }
    for warning in &results.warnings {
        emit(Severity::Warning, warning);
    }
    for error in &results.errors {
        emit(Severity::Error, error);
    }
    for failure in &results.failures {
        emit(Severity::Critical, failure);
    }
    Severity::of(results)
}
