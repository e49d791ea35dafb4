//! Sink for recoverable problems that never abort an operation.

use std::error::Error as StdError;
use std::sync::{Mutex, PoisonError};

use taskdex_core::Filter;
use thiserror::Error;
use tracing::warn;

/// Why a filter could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnsupportedFilter {
    /// The filter names a field the index does not cover.
    #[error("unsupported filter type `{0}`")]
    UnknownField(String),
    /// The field is indexed but the operator does not apply to it.
    #[error("operator `{operator}` is not supported for `{field}`")]
    UnsupportedOperator {
        /// Field name.
        field: String,
        /// Operator token.
        operator: &'static str,
    },
    /// The filter value cannot be read as the field's type.
    #[error("value `{value}` is not valid for `{field}`")]
    InvalidValue {
        /// Field name.
        field: String,
        /// Rendered value.
        value: String,
    },
}

/// Receives warnings from the query engine and the ingestion path.
pub trait Diagnostics: Send + Sync {
    /// A filter was skipped and evaluated to the empty set.
    fn unsupported_filter(&self, filter: &Filter, reason: &UnsupportedFilter);

    /// A parser failed; the index was left unchanged for `path`.
    fn parse_failed(&self, path: &str, error: &(dyn StdError + 'static));
}

/// Default sink forwarding everything to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl Diagnostics for TracingDiagnostics {
    fn unsupported_filter(&self, filter: &Filter, reason: &UnsupportedFilter) {
        warn!(
            field = %filter.field,
            operator = %filter.operator,
            %reason,
            "filter evaluated to an empty result"
        );
    }

    fn parse_failed(&self, path: &str, error: &(dyn StdError + 'static)) {
        warn!(path, %error, "failed to parse file; keeping previous index state");
    }
}

/// One recorded warning.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// See [`Diagnostics::unsupported_filter`].
    UnsupportedFilter {
        /// Offending filter.
        filter: Filter,
        /// Why it was skipped.
        reason: UnsupportedFilter,
    },
    /// See [`Diagnostics::parse_failed`].
    ParseFailed {
        /// File that failed to parse.
        path: String,
        /// Rendered parser error.
        message: String,
    },
}

/// Sink that keeps every warning in memory, for hosts that surface them
/// later and for tests.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl RecordingDiagnostics {
    /// Copy of the warnings recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn push(&self, entry: Diagnostic) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

impl Diagnostics for RecordingDiagnostics {
    fn unsupported_filter(&self, filter: &Filter, reason: &UnsupportedFilter) {
        self.push(Diagnostic::UnsupportedFilter {
            filter: filter.clone(),
            reason: reason.clone(),
        });
    }

    fn parse_failed(&self, path: &str, error: &(dyn StdError + 'static)) {
        self.push(Diagnostic::ParseFailed {
            path: path.to_owned(),
            message: error.to_string(),
        });
    }
}
