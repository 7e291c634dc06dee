//! Field rules shared by the add form and
//! the inline edit form.
//!
//! Every rule takes the raw string the
//! user typed and either passes or returns
//! a [`FieldError`] whose `Display` is the
//! message shown next to the field.

use std::fmt;

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::datetime::{
  Clock,
  parse_due_date_at
};
use crate::task::Priority;

pub const MIN_TASK_NAME_LEN: usize = 3;
pub const MAX_DESCRIPTION_LEN: usize =
  200;

#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum FieldError {
  #[error(
    "Task name must be at least 3 characters long."
  )]
  TaskNameTooShort,
  #[error("Due date is required.")]
  DueDateRequired,
  #[error(
    "Due date is not a valid date: {0}"
  )]
  DueDateInvalid(String),
  #[error(
    "Due date cannot be in the past."
  )]
  DueDateInPast,
  #[error("Priority is required.")]
  PriorityRequired,
  #[error(
    "Priority must be one of Low, Medium or High."
  )]
  PriorityInvalid(String),
  #[error(
    "Description cannot exceed 200 characters."
  )]
  DescriptionTooLong
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
)]
pub enum Field {
  TaskName,
  DueDate,
  Priority,
  Description
}

impl Field {
  pub const ALL: [Self; 4] = [
    Self::TaskName,
    Self::DueDate,
    Self::Priority,
    Self::Description
  ];

  #[must_use]
  pub fn label(self) -> &'static str {
    match self {
      | Self::TaskName => "Task Name",
      | Self::DueDate => "Due Date",
      | Self::Priority => "Priority",
      | Self::Description => {
        "Description"
      }
    }
  }

  #[must_use]
  pub fn is_required(self) -> bool {
    !matches!(self, Self::Description)
  }
}

impl fmt::Display for Field {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.label())
  }
}

pub fn validate_task_name(
  name: &str
) -> Result<(), FieldError> {
  if name.trim().chars().count()
    < MIN_TASK_NAME_LEN
  {
    return Err(
      FieldError::TaskNameTooShort
    );
  }
  Ok(())
}

/// Compares the full local timestamp
/// against "now", not the calendar day. A
/// bare date for today is midnight and so
/// already counts as past. The clock is
/// read once, so `now` and `+0m` resolve
/// to exactly the instant they are
/// checked against.
pub fn validate_due_date(
  raw: &str,
  clock: &dyn Clock
) -> Result<(), FieldError> {
  check_due_date(raw, clock).map(|_| ())
}

pub fn validate_priority(
  raw: &str
) -> Result<(), FieldError> {
  check_priority(raw).map(|_| ())
}

pub fn validate_description(
  description: &str
) -> Result<(), FieldError> {
  if description.chars().count()
    > MAX_DESCRIPTION_LEN
  {
    return Err(
      FieldError::DescriptionTooLong
    );
  }
  Ok(())
}

pub(crate) fn check_due_date(
  raw: &str,
  clock: &dyn Clock
) -> Result<NaiveDateTime, FieldError> {
  if raw.trim().is_empty() {
    return Err(
      FieldError::DueDateRequired
    );
  }

  // one reading serves both parsing and
  // the comparison
  let now = clock.local_now();
  let due = parse_due_date_at(
    raw,
    now,
    clock.timezone()
  )
  .map_err(|err| {
    tracing::debug!(
      input = raw,
      error = %err,
      "due date did not parse"
    );
    FieldError::DueDateInvalid(
      raw.trim().to_string()
    )
  })?;

  if due < now {
    return Err(FieldError::DueDateInPast);
  }
  Ok(due)
}

pub(crate) fn check_priority(
  raw: &str
) -> Result<Priority, FieldError> {
  if raw.trim().is_empty() {
    return Err(
      FieldError::PriorityRequired
    );
  }
  Priority::parse(raw).ok_or_else(|| {
    FieldError::PriorityInvalid(
      raw.trim().to_string()
    )
  })
}

/// Live, single-field validation.
pub fn validate_field(
  field: Field,
  raw: &str,
  clock: &dyn Clock
) -> Result<(), FieldError> {
  match field {
    | Field::TaskName => {
      validate_task_name(raw)
    }
    | Field::DueDate => {
      validate_due_date(raw, clock)
    }
    | Field::Priority => {
      validate_priority(raw)
    }
    | Field::Description => {
      validate_description(raw)
    }
  }
}

/// Raw form input, one string per field.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct TaskFields {
  pub task_name:   String,
  pub due_date:    String,
  pub priority:    String,
  pub description: String
}

impl Default for TaskFields {
  fn default() -> Self {
    Self {
      task_name:   String::new(),
      due_date:    String::new(),
      priority:    Priority::Low
        .as_str()
        .to_string(),
      description: String::new()
    }
  }
}

impl TaskFields {
  #[must_use]
  pub fn get(
    &self,
    field: Field
  ) -> &str {
    match field {
      | Field::TaskName => {
        &self.task_name
      }
      | Field::DueDate => &self.due_date,
      | Field::Priority => {
        &self.priority
      }
      | Field::Description => {
        &self.description
      }
    }
  }

  pub fn set(
    &mut self,
    field: Field,
    value: String
  ) {
    match field {
      | Field::TaskName => {
        self.task_name = value;
      }
      | Field::DueDate => {
        self.due_date = value;
      }
      | Field::Priority => {
        self.priority = value;
      }
      | Field::Description => {
        self.description = value;
      }
    }
  }

  /// Mandatory fields hold something.
  #[must_use]
  pub fn has_required(&self) -> bool {
    Field::ALL
      .iter()
      .filter(|field| field.is_required())
      .all(|field| {
        !self.get(*field).trim().is_empty()
      })
  }
}

#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FormErrors {
  pub task_name:   Option<FieldError>,
  pub due_date:    Option<FieldError>,
  pub priority:    Option<FieldError>,
  pub description: Option<FieldError>
}

impl FormErrors {
  #[must_use]
  pub fn get(
    &self,
    field: Field
  ) -> Option<&FieldError> {
    match field {
      | Field::TaskName => {
        self.task_name.as_ref()
      }
      | Field::DueDate => {
        self.due_date.as_ref()
      }
      | Field::Priority => {
        self.priority.as_ref()
      }
      | Field::Description => {
        self.description.as_ref()
      }
    }
  }

  pub fn set(
    &mut self,
    field: Field,
    result: Result<(), FieldError>
  ) {
    let slot = match field {
      | Field::TaskName => {
        &mut self.task_name
      }
      | Field::DueDate => {
        &mut self.due_date
      }
      | Field::Priority => {
        &mut self.priority
      }
      | Field::Description => {
        &mut self.description
      }
    };
    *slot = result.err();
  }

  #[must_use]
  pub fn is_empty(&self) -> bool {
    self.iter().next().is_none()
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (Field, &FieldError)>
  {
    Field::ALL.into_iter().filter_map(
      |field| {
        self
          .get(field)
          .map(|err| (field, err))
      }
    )
  }
}

impl fmt::Display for FormErrors {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    let mut first = true;
    for (field, err) in self.iter() {
      if !first {
        f.write_str("; ")?;
      }
      first = false;
      write!(f, "{field}: {err}")?;
    }
    Ok(())
  }
}

/// Batch validation run on submit.
#[tracing::instrument(skip(fields, clock))]
pub fn validate_form(
  fields: &TaskFields,
  clock: &dyn Clock
) -> FormErrors {
  let mut errors = FormErrors::default();
  for field in Field::ALL {
    errors.set(
      field,
      validate_field(
        field,
        fields.get(field),
        clock
      )
    );
  }
  errors
}
