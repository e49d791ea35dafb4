use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::date::{DayKey, Timestamp};
use crate::Task;

/// Field a filter is evaluated against.
///
/// Unknown names are kept as [`FilterField::Other`] so that evaluation can
/// report them instead of rejecting the whole query up front.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterField {
    /// Tag membership.
    Tag,
    /// Project name.
    Project,
    /// Context name.
    Context,
    /// Completion flag.
    Status,
    /// Numeric priority.
    Priority,
    /// Due date.
    DueDate,
    /// Start date.
    StartDate,
    /// Scheduled date.
    ScheduledDate,
    /// Any other field name.
    Other(String),
}

impl FilterField {
    /// Canonical name used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Tag => "tag",
            Self::Project => "project",
            Self::Context => "context",
            Self::Status => "status",
            Self::Priority => "priority",
            Self::DueDate => "dueDate",
            Self::StartDate => "startDate",
            Self::ScheduledDate => "scheduledDate",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for FilterField {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "tag" | "tags" => Self::Tag,
            "project" => Self::Project,
            "context" => Self::Context,
            "status" | "completed" => Self::Status,
            "priority" => Self::Priority,
            "dueDate" | "due_date" | "due" => Self::DueDate,
            "startDate" | "start_date" | "start" => Self::StartDate,
            "scheduledDate" | "scheduled_date" | "scheduled" => Self::ScheduledDate,
            other => Self::Other(other.to_owned()),
        })
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FilterField {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FilterField {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        let Ok(field) = s.parse::<Self>();
        Ok(field)
    }
}

/// Comparison applied by a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterOperator {
    /// Exact match.
    #[serde(rename = "=")]
    Eq,
    /// Complement of an exact match.
    #[serde(rename = "!=")]
    NotEq,
    /// Membership in a multi-valued field.
    #[serde(rename = "contains")]
    Contains,
    /// The field has no value.
    #[serde(rename = "empty")]
    Empty,
    /// Strictly earlier day.
    #[serde(rename = "before")]
    Before,
    /// Strictly later day.
    #[serde(rename = "after")]
    After,
    /// Strictly greater number.
    #[serde(rename = ">")]
    GreaterThan,
    /// Strictly smaller number.
    #[serde(rename = "<")]
    LessThan,
}

/// Error returned for unknown operator tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown filter operator `{0}`")]
pub struct UnknownOperator(pub String);

impl FilterOperator {
    /// Token used on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "!=",
            Self::Contains => "contains",
            Self::Empty => "empty",
            Self::Before => "before",
            Self::After => "after",
            Self::GreaterThan => ">",
            Self::LessThan => "<",
        }
    }
}

impl FromStr for FilterOperator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Self::Eq),
            "!=" => Ok(Self::NotEq),
            "contains" => Ok(Self::Contains),
            "empty" => Ok(Self::Empty),
            "before" => Ok(Self::Before),
            "after" => Ok(Self::After),
            ">" => Ok(Self::GreaterThan),
            "<" => Ok(Self::LessThan),
            _ => Err(UnknownOperator(s.to_owned())),
        }
    }
}

impl fmt::Display for FilterOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a filter's result combines with the result of the filters before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conjunction {
    /// Intersection.
    #[default]
    #[serde(rename = "AND")]
    And,
    /// Union.
    #[serde(rename = "OR")]
    Or,
}

/// Literal a filter compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    /// Boolean literal.
    Bool(bool),
    /// Numeric literal.
    Number(f64),
    /// String literal.
    Text(String),
}

impl Default for FilterValue {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl FilterValue {
    /// Value rendered as an index key.
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Bool(flag) => flag.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(text) => text.clone(),
        }
    }

    /// Numeric interpretation, parsing text when needed.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Bool(_) => None,
            Self::Number(n) => Some(*n),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }

    /// Boolean interpretation; accepts `"true"` / `"false"` text.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(flag) => Some(*flag),
            Self::Number(_) => None,
            Self::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }

    /// Calendar-day interpretation. Numbers are unix milliseconds in UTC.
    #[must_use]
    pub fn as_day_key(&self) -> Option<DayKey> {
        match self {
            Self::Bool(_) => None,
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(n) => DayKey::from_unix_millis(n.trunc() as i64),
            Self::Text(text) => text.parse().ok(),
        }
    }

    /// Exact instant, when the value carries a time of day: RFC 3339 text or
    /// unix milliseconds. Plain `YYYY-MM-DD` text yields `None`.
    #[must_use]
    pub fn as_instant(&self) -> Option<Timestamp> {
        match self {
            Self::Bool(_) => None,
            #[allow(clippy::cast_possible_truncation)]
            Self::Number(n) => {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(n.trunc() as i64) * 1_000_000)
                    .ok()
            }
            Self::Text(text) => OffsetDateTime::parse(text.trim(), &Rfc3339).ok(),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() {
        format!("{n:.0}")
    } else {
        n.to_string()
    }
}

impl From<&str> for FilterValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for FilterValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<bool> for FilterValue {
    fn from(flag: bool) -> Self {
        Self::Bool(flag)
    }
}

impl From<i32> for FilterValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

/// One step of a filter chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Field to evaluate.
    #[serde(rename = "type")]
    pub field: FilterField,
    /// Comparison to apply.
    pub operator: FilterOperator,
    /// Literal to compare against (ignored by `empty`).
    #[serde(default)]
    pub value: FilterValue,
    /// Combination with the running result; `AND` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conjunction: Option<Conjunction>,
}

impl Filter {
    /// Build an `AND`-combined filter.
    #[must_use]
    pub fn new(field: FilterField, operator: FilterOperator, value: impl Into<FilterValue>) -> Self {
        Self {
            field,
            operator,
            value: value.into(),
            conjunction: None,
        }
    }

    /// Combine with the running result by union.
    #[must_use]
    pub const fn or(mut self) -> Self {
        self.conjunction = Some(Conjunction::Or);
        self
    }

    /// Effective conjunction.
    #[must_use]
    pub fn conjunction(&self) -> Conjunction {
        self.conjunction.unwrap_or_default()
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    /// Smallest first.
    #[default]
    Asc,
    /// Largest first.
    Desc,
}

/// Field a sort criterion orders by.
///
/// Top-level task fields take precedence over metadata fields with the same
/// name: `"id"` is [`SortField::Id`], the metadata id is `"taskId"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SortField {
    /// Task id.
    Id,
    /// Source path.
    FilePath,
    /// Line inside the source file.
    Line,
    /// Completion flag.
    Completed,
    /// Raw status marker.
    Status,
    /// Task text.
    Content,
    /// Source line as written.
    OriginalMarkdown,
    /// Tags, compared as a comma-joined string.
    Tags,
    /// Project.
    Project,
    /// Context.
    Context,
    /// Priority.
    Priority,
    /// Due date.
    DueDate,
    /// Start date.
    StartDate,
    /// Scheduled date.
    ScheduledDate,
    /// Completion date.
    CompletedDate,
    /// Cancellation date.
    CancelledDate,
    /// Creation date.
    CreatedDate,
    /// Recurrence rule.
    Recurrence,
    /// Dependencies, compared as a comma-joined string.
    DependsOn,
    /// On-completion action.
    OnCompletion,
    /// External task id from the metadata.
    TaskId,
    /// Unknown field; every task lacks it.
    Other(String),
}

impl SortField {
    /// Canonical name used on the wire.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Id => "id",
            Self::FilePath => "filePath",
            Self::Line => "line",
            Self::Completed => "completed",
            Self::Status => "status",
            Self::Content => "content",
            Self::OriginalMarkdown => "originalMarkdown",
            Self::Tags => "tags",
            Self::Project => "project",
            Self::Context => "context",
            Self::Priority => "priority",
            Self::DueDate => "dueDate",
            Self::StartDate => "startDate",
            Self::ScheduledDate => "scheduledDate",
            Self::CompletedDate => "completedDate",
            Self::CancelledDate => "cancelledDate",
            Self::CreatedDate => "createdDate",
            Self::Recurrence => "recurrence",
            Self::DependsOn => "dependsOn",
            Self::OnCompletion => "onCompletion",
            Self::TaskId => "taskId",
            Self::Other(name) => name,
        }
    }

    fn top_level(name: &str) -> Option<Self> {
        Some(match name {
            "id" => Self::Id,
            "filePath" => Self::FilePath,
            "line" => Self::Line,
            "completed" => Self::Completed,
            "status" => Self::Status,
            "content" => Self::Content,
            "originalMarkdown" => Self::OriginalMarkdown,
            _ => return None,
        })
    }

    fn metadata(name: &str) -> Option<Self> {
        Some(match name {
            "tags" => Self::Tags,
            "project" => Self::Project,
            "context" => Self::Context,
            "priority" => Self::Priority,
            "dueDate" => Self::DueDate,
            "startDate" => Self::StartDate,
            "scheduledDate" => Self::ScheduledDate,
            "completedDate" => Self::CompletedDate,
            "cancelledDate" => Self::CancelledDate,
            "createdDate" => Self::CreatedDate,
            "recurrence" => Self::Recurrence,
            "dependsOn" => Self::DependsOn,
            "onCompletion" => Self::OnCompletion,
            "taskId" => Self::TaskId,
            _ => return None,
        })
    }

    /// Resolve this field on a task. `None` means the task has no value.
    #[must_use]
    pub fn value_of(&self, task: &Task) -> Option<SortValue> {
        let meta = &task.metadata;
        match self {
            Self::Id => Some(SortValue::Text(task.id.to_string())),
            Self::FilePath => Some(SortValue::Text(task.file_path.clone())),
            Self::Line => Some(SortValue::Number(i64::from(task.line))),
            Self::Completed => Some(SortValue::Bool(task.completed)),
            Self::Status => Some(SortValue::Text(task.status.clone())),
            Self::Content => Some(SortValue::Text(task.content.clone())),
            Self::OriginalMarkdown => Some(SortValue::Text(task.original_markdown.clone())),
            Self::Tags => Some(SortValue::Text(meta.tags.join(","))),
            Self::Project => meta.project.clone().map(SortValue::Text),
            Self::Context => meta.context.clone().map(SortValue::Text),
            Self::Priority => meta.priority.map(|p| SortValue::Number(i64::from(p))),
            Self::DueDate => meta.due_date.map(SortValue::Time),
            Self::StartDate => meta.start_date.map(SortValue::Time),
            Self::ScheduledDate => meta.scheduled_date.map(SortValue::Time),
            Self::CompletedDate => meta.completed_date.map(SortValue::Time),
            Self::CancelledDate => meta.cancelled_date.map(SortValue::Time),
            Self::CreatedDate => meta.created_date.map(SortValue::Time),
            Self::Recurrence => meta.recurrence.clone().map(SortValue::Text),
            Self::DependsOn => Some(SortValue::Text(meta.depends_on.join(","))),
            Self::OnCompletion => meta.on_completion.clone().map(SortValue::Text),
            Self::TaskId => meta.task_id.clone().map(SortValue::Text),
            Self::Other(_) => None,
        }
    }
}

impl FromStr for SortField {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Ok(Self::top_level(name)
            .or_else(|| Self::metadata(name))
            .unwrap_or_else(|| Self::Other(name.to_owned())))
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SortField {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SortField {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        let Ok(field) = s.parse::<Self>();
        Ok(field)
    }
}

/// One key of a multi-key sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortCriterion {
    /// Field to order by.
    pub field: SortField,
    /// Direction of the order.
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortCriterion {
    /// Ascending criterion.
    #[must_use]
    pub const fn asc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Asc,
        }
    }

    /// Descending criterion.
    #[must_use]
    pub const fn desc(field: SortField) -> Self {
        Self {
            field,
            direction: SortDirection::Desc,
        }
    }
}

/// Typed value extracted from a task for sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortValue {
    /// Text, compared case-insensitively first.
    Text(String),
    /// Integer.
    Number(i64),
    /// Boolean, `false` before `true`.
    Bool(bool),
    /// Instant.
    Time(Timestamp),
}

impl SortValue {
    /// Ascending order between two defined values.
    ///
    /// Values of different kinds fall back to comparing their text renderings.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => compare_text(a, b),
            (Self::Number(a), Self::Number(b)) => a.cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Time(a), Self::Time(b)) => a.cmp(b),
            _ => compare_text(&self.render(), &other.render()),
        }
    }

    fn render(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Number(n) => n.to_string(),
            Self::Bool(flag) => flag.to_string(),
            Self::Time(ts) => ts.to_string(),
        }
    }
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use crate::TaskMetadata;

    #[test]
    fn filter_deserializes_from_wire_shape() {
        let raw = r#"{"type":"priority","operator":">","value":2,"conjunction":"OR"}"#;
        let filter: Filter = serde_json::from_str(raw).expect("filter must parse");
        assert_eq!(filter.field, FilterField::Priority);
        assert_eq!(filter.operator, FilterOperator::GreaterThan);
        assert_eq!(filter.value.as_number(), Some(2.0));
        assert_eq!(filter.conjunction(), Conjunction::Or);
    }

    #[test]
    fn unknown_filter_types_are_preserved() {
        let raw = r#"{"type":"assignee","operator":"=","value":"alice"}"#;
        let filter: Filter = serde_json::from_str(raw).expect("filter must parse");
        assert_eq!(filter.field, FilterField::Other("assignee".into()));
        assert_eq!(filter.conjunction(), Conjunction::And);
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let raw = r#"{"type":"tag","operator":"~=","value":"x"}"#;
        assert!(serde_json::from_str::<Filter>(raw).is_err());
        assert!("~=".parse::<FilterOperator>().is_err());
    }

    #[test]
    fn filter_values_coerce() {
        assert_eq!(FilterValue::from("true").as_bool(), Some(true));
        assert_eq!(FilterValue::from(3).as_text(), "3");
        assert_eq!(FilterValue::from(" 4 ").as_number(), Some(4.0));
        assert_eq!(
            FilterValue::from("2024-02-01").as_day_key().map(|d| d.to_string()),
            Some("2024-02-01".to_string())
        );
    }

    #[test]
    fn instants_require_a_time_of_day() {
        assert_eq!(FilterValue::from("2024-05-03").as_instant(), None);
        assert_eq!(
            FilterValue::from("2024-05-03T12:00:00+02:00").as_instant(),
            Some(time::macros::datetime!(2024-05-03 10:00 UTC))
        );
        assert_eq!(
            FilterValue::Number(1_714_737_600_000.0).as_instant(),
            Some(time::macros::datetime!(2024-05-03 12:00 UTC))
        );
        assert_eq!(FilterValue::from(true).as_instant(), None);
    }

    #[test]
    fn sort_field_prefers_top_level_names() {
        assert_eq!("id".parse::<SortField>(), Ok(SortField::Id));
        assert_eq!("taskId".parse::<SortField>(), Ok(SortField::TaskId));
        assert_eq!("dueDate".parse::<SortField>(), Ok(SortField::DueDate));
        assert_eq!(
            "mood".parse::<SortField>(),
            Ok(SortField::Other("mood".into()))
        );
    }

    #[test]
    fn sort_values_resolve_from_metadata() {
        let task = Task::new("t1", "a.md", 7).with_metadata(TaskMetadata {
            priority: Some(3),
            tags: vec!["#a".into(), "#b".into()],
            ..TaskMetadata::default()
        });
        assert_eq!(SortField::Priority.value_of(&task), Some(SortValue::Number(3)));
        assert_eq!(SortField::Line.value_of(&task), Some(SortValue::Number(7)));
        assert_eq!(SortField::Tags.value_of(&task), Some(SortValue::Text("#a,#b".into())));
        assert_eq!(SortField::Project.value_of(&task), None);
        assert_eq!(SortField::Other("mood".into()).value_of(&task), None);
    }

    #[test]
    fn text_compares_case_insensitively() {
        let lower = SortValue::Text("alpha".into());
        let upper = SortValue::Text("Beta".into());
        assert_eq!(lower.compare(&upper), Ordering::Less);
    }
}
