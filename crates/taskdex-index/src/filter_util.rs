use serde::{Deserialize, Serialize};
use taskdex_core::query::UnknownOperator;
use taskdex_core::{Filter, FilterField, FilterOperator, FilterValue, SortCriterion, SortDirection, SortField};
use thiserror::Error;

/// Error type returned while parsing user-facing filter and sort strings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterParseError {
    #[error("filter expression is empty")]
    Empty,
    #[error("filter `{input}` is missing an operator")]
    MissingOperator { input: String },
    #[error("filter `{input}`: {source}")]
    UnknownOperator {
        input: String,
        #[source]
        source: UnknownOperator,
    },
    #[error("filter `{input}` is missing a value")]
    MissingValue { input: String },
    #[error("sort criterion is empty")]
    EmptySort,
    #[error("invalid sort direction `{0}`; expected `asc` or `desc`")]
    InvalidDirection(String),
}

/// Result alias for filter parsing helpers.
pub type FilterParseResult<T> = Result<T, FilterParseError>;

/// Parse `[or:]<field> <operator> [value]`.
///
/// The value is the rest of the input and may contain spaces; it may be
/// omitted for `empty`.
///
/// # Errors
/// Returns an error when the operator is missing or unknown, or when a
/// value is required but absent.
pub fn parse_filter(raw: &str) -> FilterParseResult<Filter> {
    let input = raw.trim();
    let (or, body) = match input.strip_prefix("or:") {
        Some(rest) => (true, rest.trim_start()),
        None => (false, input),
    };

    let (field, rest) = split_token(body);
    if field.is_empty() {
        return Err(FilterParseError::Empty);
    }
    let (operator, value) = split_token(rest);
    if operator.is_empty() {
        return Err(FilterParseError::MissingOperator {
            input: input.to_owned(),
        });
    }
    let operator: FilterOperator =
        operator
            .parse()
            .map_err(|source| FilterParseError::UnknownOperator {
                input: input.to_owned(),
                source,
            })?;
    if value.is_empty() && operator != FilterOperator::Empty {
        return Err(FilterParseError::MissingValue {
            input: input.to_owned(),
        });
    }

    let Ok(field) = field.parse::<FilterField>();
    let filter = Filter::new(field, operator, FilterValue::from(value));
    Ok(if or { filter.or() } else { filter })
}

/// Split off the first whitespace-delimited token.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.find(char::is_whitespace) {
        Some(at) => (&input[..at], input[at..].trim()),
        None => (input, ""),
    }
}

/// Parse `field[:asc|:desc]`; the direction defaults to ascending.
///
/// # Errors
/// Returns an error for an empty field or an unknown direction.
pub fn parse_sort(raw: &str) -> FilterParseResult<SortCriterion> {
    let (field, direction) = match raw.trim().split_once(':') {
        Some((field, direction)) => (field.trim(), Some(direction.trim())),
        None => (raw.trim(), None),
    };
    if field.is_empty() {
        return Err(FilterParseError::EmptySort);
    }
    let direction = match direction.map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => SortDirection::Asc,
        Some("desc") => SortDirection::Desc,
        Some(other) => return Err(FilterParseError::InvalidDirection(other.to_owned())),
    };
    let Ok(field) = field.parse::<SortField>();
    Ok(SortCriterion { field, direction })
}

/// Filters and sort criteria of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Filter chain, evaluated left to right.
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Sort keys; empty means the default order.
    #[serde(default)]
    pub sort: Vec<SortCriterion>,
}

/// Builder that accepts user-facing strings and normalizes them into a [`Query`].
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append parsed filters.
    ///
    /// # Errors
    /// Returns the first parse failure.
    pub fn with_filters<S: AsRef<str>>(mut self, filters: &[S]) -> FilterParseResult<Self> {
        for raw in filters {
            self.query.filters.push(parse_filter(raw.as_ref())?);
        }
        Ok(self)
    }

    /// Append parsed sort criteria.
    ///
    /// # Errors
    /// Returns the first parse failure.
    pub fn with_sort<S: AsRef<str>>(mut self, sort: &[S]) -> FilterParseResult<Self> {
        for raw in sort {
            self.query.sort.push(parse_sort(raw.as_ref())?);
        }
        Ok(self)
    }

    /// Append an already built filter.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query.filters.push(filter);
        self
    }

    /// Build the final [`Query`].
    #[must_use]
    pub fn build(self) -> Query {
        self.query
    }
}
