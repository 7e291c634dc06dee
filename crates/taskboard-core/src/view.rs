use std::cmp::Ordering;

use chrono::{
  Days,
  NaiveDate
};
use tracing::trace;

use crate::store::{
  DueDateFilter,
  SortField,
  SortOrder
};
use crate::task::{
  Priority,
  Task
};

/// The inputs of the projection besides
/// the task list itself.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
)]
pub struct ViewQuery {
  pub priority_filter: Option<Priority>,
  pub due_date_filter: DueDateFilter,
  pub sort_field:      Option<SortField>,
  pub sort_order:      SortOrder
}

/// Filters then sorts `tasks` into the
/// list the user sees.
///
/// `today` is the local date the due-date
/// filters are measured against. The
/// input is left untouched and equal
/// inputs always give equal output.
#[tracing::instrument(skip(tasks), fields(total = tasks.len()))]
#[must_use]
pub fn project(
  tasks: &[Task],
  query: &ViewQuery,
  today: NaiveDate
) -> Vec<Task> {
  let mut rows: Vec<Task> = tasks
    .iter()
    .filter(|task| {
      matches_priority(
        task,
        query.priority_filter
      )
    })
    .filter(|task| {
      matches_due_date(
        task,
        query.due_date_filter,
        today
      )
    })
    .cloned()
    .collect();

  if let Some(field) = query.sort_field
  {
    // `sort_by` is stable, so ties keep
    // their insertion order in either
    // direction.
    rows.sort_by(|a, b| {
      let ordering =
        compare_by(a, b, field);
      match query.sort_order {
        | SortOrder::Asc => ordering,
        | SortOrder::Desc => {
          ordering.reverse()
        }
      }
    });
  }

  trace!(
    visible = rows.len(),
    "projection computed"
  );
  rows
}

fn matches_priority(
  task: &Task,
  filter: Option<Priority>
) -> bool {
  filter.is_none_or(|priority| {
    task.priority == priority
  })
}

fn matches_due_date(
  task: &Task,
  filter: DueDateFilter,
  today: NaiveDate
) -> bool {
  let due_day = task.due_date.date();
  match filter {
    | DueDateFilter::All => true,
    | DueDateFilter::Overdue => {
      due_day < today
    }
    | DueDateFilter::Next7Days => {
      let horizon = today
        .checked_add_days(Days::new(7))
        .unwrap_or(NaiveDate::MAX);
      due_day >= today
        && due_day <= horizon
    }
  }
}

fn compare_by(
  a: &Task,
  b: &Task,
  field: SortField
) -> Ordering {
  match field {
    | SortField::Priority => {
      a.priority
        .rank()
        .cmp(&b.priority.rank())
    }
    | SortField::DueDate => {
      a.due_date.cmp(&b.due_date)
    }
  }
}
