//! Controllers between raw input and the
//! store: the add form with its
//! confirm-before-create step, and the
//! inline edit form.

use std::collections::BTreeSet;

use tracing::{
  debug,
  info
};

use crate::datetime::{
  Clock,
  format_due_date
};
use crate::store::{
  Action,
  Store
};
use crate::task::{
  IdGenerator,
  Task,
  TaskDraft,
  TaskId
};
use crate::validation::{
  Field,
  FieldError,
  FormErrors,
  TaskFields,
  check_due_date,
  check_priority,
  validate_description,
  validate_field,
  validate_task_name
};

/// Validates every field and, when all
/// pass, returns the typed draft.
pub fn build_draft(
  fields: &TaskFields,
  clock: &dyn Clock
) -> Result<TaskDraft, FormErrors> {
  let name =
    validate_task_name(&fields.task_name);
  let due =
    check_due_date(&fields.due_date, clock);
  let priority =
    check_priority(&fields.priority);
  let description = validate_description(
    &fields.description
  );

  match (name, due, priority, description)
  {
    | (
      Ok(()),
      Ok(due_date),
      Ok(priority),
      Ok(())
    ) => {
      Ok(TaskDraft {
        task_name: fields
          .task_name
          .trim()
          .to_string(),
        due_date,
        priority,
        description: fields
          .description
          .clone()
      })
    }
    | (name, due, priority, description) => {
      Err(FormErrors {
        task_name:   name.err(),
        due_date:    due.err(),
        priority:    priority.err(),
        description: description.err()
      })
    }
  }
}

/// Field values plus the per-field errors
/// and which fields the user has touched.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct TaskForm {
  fields:  TaskFields,
  errors:  FormErrors,
  touched: BTreeSet<Field>
}

impl TaskForm {
  #[must_use]
  pub fn new(
    fields: TaskFields
  ) -> Self {
    Self {
      fields,
      errors: FormErrors::default(),
      touched: BTreeSet::new()
    }
  }

  #[must_use]
  pub fn fields(&self) -> &TaskFields {
    &self.fields
  }

  #[must_use]
  pub fn errors(&self) -> &FormErrors {
    &self.errors
  }

  #[must_use]
  pub fn is_touched(
    &self,
    field: Field
  ) -> bool {
    self.touched.contains(&field)
  }

  /// The error to show next to `field`;
  /// untouched fields stay quiet.
  #[must_use]
  pub fn visible_error(
    &self,
    field: Field
  ) -> Option<&FieldError> {
    if self.is_touched(field) {
      self.errors.get(field)
    } else {
      None
    }
  }

  /// Updates one field and revalidates it
  /// straight away.
  pub fn set_field(
    &mut self,
    field: Field,
    value: impl Into<String>,
    clock: &dyn Clock
  ) -> Result<(), FieldError> {
    self.fields.set(field, value.into());
    self.touch(field, clock)
  }

  /// Marks `field` touched and
  /// revalidates its current value.
  pub fn touch(
    &mut self,
    field: Field,
    clock: &dyn Clock
  ) -> Result<(), FieldError> {
    self.touched.insert(field);
    let result = validate_field(
      field,
      self.fields.get(field),
      clock
    );
    self.errors.set(field, result.clone());
    result
  }

  /// All fields pass and the mandatory
  /// ones hold something.
  #[must_use]
  pub fn is_submittable(&self) -> bool {
    self.fields.has_required()
      && self.errors.is_empty()
  }

  /// Batch validation on submit. Marks
  /// every field touched.
  pub fn submit(
    &mut self,
    clock: &dyn Clock
  ) -> Result<TaskDraft, FormErrors> {
    self.touched.extend(Field::ALL);
    match build_draft(&self.fields, clock)
    {
      | Ok(draft) => {
        self.errors = FormErrors::default();
        Ok(draft)
      }
      | Err(errors) => {
        self.errors = errors.clone();
        Err(errors)
      }
    }
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }
}

/// Two-phase creation: a validated
/// candidate waits for the user to confirm
/// or cancel. At most one candidate is
/// pending.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct AddFlow {
  pending: Option<TaskDraft>
}

impl AddFlow {
  #[must_use]
  pub fn pending(
    &self
  ) -> Option<&TaskDraft> {
    self.pending.as_ref()
  }

  /// Validates the form and holds the
  /// result as the pending candidate,
  /// replacing any earlier one. A form
  /// that fails leaves the pending slot
  /// as it was.
  #[tracing::instrument(skip_all)]
  pub fn propose(
    &mut self,
    form: &mut TaskForm,
    clock: &dyn Clock
  ) -> Result<&TaskDraft, FormErrors> {
    let draft = form.submit(clock)?;
    if self.pending.is_some() {
      debug!(
        "replacing pending candidate"
      );
    }
    Ok(&*self.pending.insert(draft))
  }

  /// Commits the pending candidate with a
  /// fresh id and creation time. `None`
  /// when nothing was pending.
  #[tracing::instrument(skip_all)]
  pub fn confirm(
    &mut self,
    store: &mut Store,
    clock: &dyn Clock,
    ids: &mut dyn IdGenerator
  ) -> Option<Task> {
    let draft = self.pending.take()?;
    let now = clock.now();
    let task =
      draft.into_task(ids.next_id(now), now);
    info!(id = %task.id, "task created");
    store.dispatch(Action::AddTask(
      task.clone()
    ));
    Some(task)
  }

  /// Drops the pending candidate. Returns
  /// whether there was one.
  pub fn cancel(&mut self) -> bool {
    let had = self.pending.take().is_some();
    if had {
      debug!("pending candidate discarded");
    }
    had
  }
}

/// Inline edit of an existing task. The
/// replacement keeps the original id,
/// creation time and status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditForm {
  original: Task,
  form:     TaskForm
}

impl EditForm {
  #[must_use]
  pub fn open(task: &Task) -> Self {
    let fields = TaskFields {
      task_name:   task.task_name.clone(),
      due_date:    format_due_date(
        task.due_date
      ),
      priority:    task
        .priority
        .as_str()
        .to_string(),
      description: task
        .description
        .clone()
    };
    Self {
      original: task.clone(),
      form:     TaskForm::new(fields)
    }
  }

  #[must_use]
  pub fn id(&self) -> TaskId {
    self.original.id
  }

  #[must_use]
  pub fn form(&self) -> &TaskForm {
    &self.form
  }

  pub fn set_field(
    &mut self,
    field: Field,
    value: impl Into<String>,
    clock: &dyn Clock
  ) -> Result<(), FieldError> {
    self.form.set_field(field, value, clock)
  }

  /// Validates everything and returns the
  /// record to dispatch as `EditTask`.
  pub fn submit(
    &mut self,
    clock: &dyn Clock
  ) -> Result<Task, FormErrors> {
    let draft = self.form.submit(clock)?;
    Ok(Task {
      id:          self.original.id,
      task_name:   draft.task_name,
      due_date:    draft.due_date,
      priority:    draft.priority,
      description: draft.description,
      created_at:  self.original.created_at,
      status:      self.original.status
    })
  }

  /// Submits and, on success, dispatches
  /// the edit.
  #[tracing::instrument(skip_all, fields(id = %self.original.id))]
  pub fn save(
    &mut self,
    store: &mut Store,
    clock: &dyn Clock
  ) -> Result<Task, FormErrors> {
    let task = self.submit(clock)?;
    store.dispatch(Action::EditTask(
      task.clone()
    ));
    info!("task updated");
    Ok(task)
  }
}
