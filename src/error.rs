//! Error types and the non-fatal diagnostics channel.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Fatal errors raised by the import pipeline.
///
/// Everything else a run can find (unresolvable references, unknown block
/// types, per-record persistence problems) is collected in [`Diagnostics`]
/// instead of being raised.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error(
        "No anchor point for import root at path '{path}': neither the page nor its parent exists in the destination"
    )]
    NoAnchor { path: String },

    #[error("Import root record has no valid tree path")]
    MissingRootPath,

    #[error("Bundle {bundle} does not contain {file}")]
    MissingContent { bundle: String, file: &'static str },

    #[error("Invalid interchange document: {0}")]
    InvalidDocument(#[from] serde_json::Error),
}

/// A single record that could not be persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RecordFailure {
    pub model: String,
    pub id: Option<i64>,
    pub cause: String,
}

impl RecordFailure {
    pub fn new(model: impl Into<String>, id: Option<i64>, cause: impl fmt::Display) -> Self {
        Self {
            model: model.into(),
            id,
            cause: cause.to_string(),
        }
    }

    /// Build a failure from an error chain, keeping every cause.
    pub fn from_error(model: impl Into<String>, id: Option<i64>, err: &anyhow::Error) -> Self {
        Self::new(model, id, format!("{:#}", err))
    }
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "Failed to import {} {}: {}", self.model, id, self.cause),
            None => write!(f, "Failed to import {}: {}", self.model, self.cause),
        }
    }
}

/// Warnings, errors and failures accumulated during a run.
///
/// - warnings: informational, the import carried on with a sensible default
/// - errors: data-integrity risk, e.g. a dangling non-null page reference
/// - failures: a record or a whole phase could not be imported
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Diagnostics {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub failures: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    /// Append everything from `other`, keeping order.
    pub fn merge(&mut self, other: Diagnostics) {
        self.warnings.extend(other.warnings);
        self.errors.extend(other.errors);
        self.failures.extend(other.failures);
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty() && self.errors.is_empty() && self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.warnings.len() + self.errors.len() + self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostics_merge_keeps_order() {
        let mut first = Diagnostics::new();
        first.warn("w1");
        first.error("e1");

        let mut second = Diagnostics::new();
        second.warn("w2");
        second.fail("f1");

        first.merge(second);
        assert_eq!(first.warnings, vec!["w1", "w2"]);
        assert_eq!(first.errors, vec!["e1"]);
        assert_eq!(first.failures, vec!["f1"]);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_record_failure_display() {
        let failure = RecordFailure::new("testapp.testpage", Some(7), "constraint failed");
        assert_eq!(
            failure.to_string(),
            "Failed to import testapp.testpage 7: constraint failed"
        );

        let failure = RecordFailure::new("testapp.testsnippet", None, "missing id");
        assert_eq!(
            failure.to_string(),
            "Failed to import testapp.testsnippet: missing id"
        );
    }

    #[test]
    fn test_no_anchor_message_names_path() {
        let err = ImportError::NoAnchor {
            path: "0022".to_string(),
        };
        assert!(err.to_string().contains("'0022'"));
    }
}
