//! Filter evaluation over the secondary indexes, followed by sorting.

use std::borrow::Borrow;
use std::cmp::Ordering;

use taskdex_core::{
    Conjunction, DayKey, Filter, FilterField, FilterOperator, SortCriterion, SortDirection,
    SortField, Task, Timestamp,
};
use time::Duration;

use crate::diagnostics::{Diagnostics, UnsupportedFilter};
use crate::secondary_index::{IdSet, SecondaryIndex};
use crate::task_cache::TaskCache;

type FilterResult = Result<IdSet, UnsupportedFilter>;

/// Reads the timestamp a date index was built from.
type Stamp = fn(&Task) -> Option<Timestamp>;

/// Days on either side of an instant whose buckets are checked task by task.
/// Covers any UTC offset a task may have been authored in.
const OFFSET_SLACK_DAYS: i64 = 2;

/// Read-only query evaluator bound to a cache.
pub struct QueryEngine<'a> {
    cache: &'a TaskCache,
    diagnostics: &'a dyn Diagnostics,
    small_store_threshold: usize,
}

impl<'a> QueryEngine<'a> {
    /// Bind an engine to `cache`.
    #[must_use]
    pub fn new(
        cache: &'a TaskCache,
        diagnostics: &'a dyn Diagnostics,
        small_store_threshold: usize,
    ) -> Self {
        Self {
            cache,
            diagnostics,
            small_store_threshold,
        }
    }

    /// Tasks matching `filters`, ordered by `sort` (or the default order when
    /// `sort` is empty). Returned tasks are borrowed from the cache.
    #[must_use]
    pub fn query_refs(&self, filters: &[Filter], sort: &[SortCriterion]) -> Vec<&'a Task> {
        let mut tasks: Vec<&'a Task> =
            if filters.is_empty() && self.cache.len() < self.small_store_threshold {
                self.cache.tasks().collect()
            } else {
                let tasks = &self.cache.tasks;
                self.matching_ids(filters)
                    .iter()
                    .filter_map(|id| tasks.get(id))
                    .collect()
            };

        tasks.sort_by(|a, b| a.id.cmp(&b.id));
        sort_tasks(&mut tasks, sort);
        tasks
    }

    /// Owned copies of the tasks returned by [`query_refs`](Self::query_refs).
    #[must_use]
    pub fn query(&self, filters: &[Filter], sort: &[SortCriterion]) -> Vec<Task> {
        self.query_refs(filters, sort).into_iter().cloned().collect()
    }

    /// Ids matching the filter chain.
    ///
    /// The first filter seeds the result; each later filter is intersected,
    /// or unioned when its conjunction is `OR`. An empty chain matches
    /// every task.
    #[must_use]
    pub fn matching_ids(&self, filters: &[Filter]) -> IdSet {
        let mut result: Option<IdSet> = None;
        for filter in filters {
            let ids = self.evaluate(filter);
            result = Some(match result {
                None => ids,
                Some(acc) => match filter.conjunction() {
                    Conjunction::Or => acc.union(&ids).cloned().collect(),
                    Conjunction::And => acc.intersection(&ids).cloned().collect(),
                },
            });
        }
        result.unwrap_or_else(|| self.cache.task_ids())
    }

    fn evaluate(&self, filter: &Filter) -> IdSet {
        let outcome = match &filter.field {
            FilterField::Tag => self.tag(filter),
            FilterField::Project => self.keyed(filter, self.cache.projects()),
            FilterField::Context => self.keyed(filter, self.cache.contexts()),
            FilterField::Status => self.status(filter),
            FilterField::Priority => self.priority(filter),
            FilterField::DueDate => {
                self.date(filter, self.cache.due_date(), |t| t.metadata.due_date)
            }
            FilterField::StartDate => {
                self.date(filter, self.cache.start_date(), |t| t.metadata.start_date)
            }
            FilterField::ScheduledDate => self.date(filter, self.cache.scheduled_date(), |t| {
                t.metadata.scheduled_date
            }),
            FilterField::Other(name) => Err(UnsupportedFilter::UnknownField(name.clone())),
        };
        outcome.unwrap_or_else(|reason| {
            self.diagnostics.unsupported_filter(filter, &reason);
            IdSet::new()
        })
    }

    fn tag(&self, filter: &Filter) -> FilterResult {
        let tag = filter.value.as_text();
        let ids = lookup(self.cache.tags(), &tag);
        match filter.operator {
            FilterOperator::Contains | FilterOperator::Eq => Ok(ids),
            FilterOperator::NotEq => Ok(self.complement(&ids)),
            FilterOperator::Empty => Ok(self.complement(&self.cache.tags().union_all())),
            other => Err(unsupported_operator(filter, other)),
        }
    }

    fn keyed(&self, filter: &Filter, index: &SecondaryIndex<String>) -> FilterResult {
        match filter.operator {
            FilterOperator::Eq => Ok(lookup(index, &filter.value.as_text())),
            FilterOperator::NotEq => Ok(self.complement(&lookup(index, &filter.value.as_text()))),
            FilterOperator::Empty => Ok(self.complement(&index.union_all())),
            other => Err(unsupported_operator(filter, other)),
        }
    }

    fn status(&self, filter: &Filter) -> FilterResult {
        let completed = filter
            .value
            .as_bool()
            .ok_or_else(|| invalid_value(filter))?;
        match filter.operator {
            FilterOperator::Eq => Ok(lookup(self.cache.completed(), &completed)),
            FilterOperator::NotEq => Ok(lookup(self.cache.completed(), &!completed)),
            other => Err(unsupported_operator(filter, other)),
        }
    }

    fn priority(&self, filter: &Filter) -> FilterResult {
        let index = self.cache.priority();
        if filter.operator == FilterOperator::Empty {
            return Ok(self.complement(&index.union_all()));
        }
        let wanted = filter.value.as_number().ok_or_else(|| invalid_value(filter))?;
        let exact = || exact_priority(wanted).map_or_else(IdSet::new, |p| lookup(index, &p));
        match filter.operator {
            FilterOperator::Eq => Ok(exact()),
            FilterOperator::NotEq => Ok(self.complement(&exact())),
            FilterOperator::GreaterThan => Ok(index.union_where(|p| f64::from(*p) > wanted)),
            FilterOperator::LessThan => Ok(index.union_where(|p| f64::from(*p) < wanted)),
            other => Err(unsupported_operator(filter, other)),
        }
    }

    fn date(&self, filter: &Filter, index: &SecondaryIndex<DayKey>, stamp: Stamp) -> FilterResult {
        if filter.operator == FilterOperator::Empty {
            return Ok(self.complement(&index.union_all()));
        }
        if matches!(filter.operator, FilterOperator::Before | FilterOperator::After)
            && let Some(instant) = filter.value.as_instant()
        {
            return Ok(self.around_instant(filter.operator, index, stamp, instant));
        }
        let day = filter.value.as_day_key().ok_or_else(|| invalid_value(filter))?;
        match filter.operator {
            FilterOperator::Eq => Ok(lookup(index, &day)),
            FilterOperator::Before => Ok(index.union_where(|key| *key < day)),
            FilterOperator::After => Ok(index.union_where(|key| *key > day)),
            other => Err(unsupported_operator(filter, other)),
        }
    }

    /// Strict instant comparison. Buckets far from the instant's day are taken
    /// whole; the ones near it are checked against each task's timestamp.
    fn around_instant(
        &self,
        operator: FilterOperator,
        index: &SecondaryIndex<DayKey>,
        stamp: Stamp,
        instant: Timestamp,
    ) -> IdSet {
        let day = DayKey::of(instant).date();
        let low = DayKey::from_date(day.saturating_sub(Duration::days(OFFSET_SLACK_DAYS)));
        let high = DayKey::from_date(day.saturating_add(Duration::days(OFFSET_SLACK_DAYS)));
        let before = operator == FilterOperator::Before;

        let mut ids = index.union_where(|key| if before { *key < low } else { *key > high });
        let tasks = &self.cache.tasks;
        ids.extend(
            index
                .union_where(|key| (low..=high).contains(key))
                .into_iter()
                .filter(|id| {
                    tasks
                        .get(id)
                        .and_then(stamp)
                        .is_some_and(|at| if before { at < instant } else { at > instant })
                }),
        );
        ids
    }

    fn complement(&self, ids: &IdSet) -> IdSet {
        self.cache
            .tasks
            .keys()
            .filter(|id| !ids.contains(*id))
            .cloned()
            .collect()
    }
}

fn lookup<K: Eq + std::hash::Hash>(index: &SecondaryIndex<K>, key: &K) -> IdSet {
    index.get(key).cloned().unwrap_or_default()
}

/// Integral priority equal to `n`, if there is one.
fn exact_priority(n: f64) -> Option<i32> {
    let in_range = (f64::from(i32::MIN)..=f64::from(i32::MAX)).contains(&n);
    if !in_range || n.fract().abs() > f64::EPSILON {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(n as i32)
}

fn unsupported_operator(filter: &Filter, operator: FilterOperator) -> UnsupportedFilter {
    UnsupportedFilter::UnsupportedOperator {
        field: filter.field.to_string(),
        operator: operator.as_str(),
    }
}

fn invalid_value(filter: &Filter) -> UnsupportedFilter {
    UnsupportedFilter::InvalidValue {
        field: filter.field.to_string(),
        value: filter.value.as_text(),
    }
}

/// Sort tasks in place.
///
/// With no criteria, orders by priority descending (missing counts as 0),
/// then due instant ascending (missing last). Otherwise compares criterion by
/// criterion; a task lacking a field's value sorts after every task that has
/// one, whatever the direction. The sort is stable.
pub fn sort_tasks<T: Borrow<Task>>(tasks: &mut [T], criteria: &[SortCriterion]) {
    if criteria.is_empty() {
        tasks.sort_by(|a, b| default_order(a.borrow(), b.borrow()));
    } else {
        tasks.sort_by(|a, b| compare_by_criteria(a.borrow(), b.borrow(), criteria));
    }
}

fn default_order(a: &Task, b: &Task) -> Ordering {
    let priority = |t: &Task| t.metadata.priority.unwrap_or(0);
    priority(b).cmp(&priority(a)).then_with(|| {
        match (a.metadata.due_date, b.metadata.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    })
}

fn compare_by_criteria(a: &Task, b: &Task, criteria: &[SortCriterion]) -> Ordering {
    for criterion in criteria {
        let ordering = compare_field(a, b, &criterion.field, criterion.direction);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_field(a: &Task, b: &Task, field: &SortField, direction: SortDirection) -> Ordering {
    match (field.value_of(a), field.value_of(b)) {
        (None, None) => Ordering::Equal,
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (Some(x), Some(y)) => {
            let ordering = x.compare(&y);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        }
    }
}
