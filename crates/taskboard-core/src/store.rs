//! The single source of truth: task list
//! plus the active filter and sort
//! selections.
//!
//! State only changes through [`reduce`],
//! which consumes the old state and
//! returns the next one. [`Store`] owns the
//! current state, applies dispatched
//! actions and notifies subscribers.

use std::fmt;

use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;
use tracing::{
  debug,
  trace
};

use crate::datetime::Clock;
use crate::task::{
  Priority,
  Task,
  TaskId
};
use crate::view::{
  self,
  ViewQuery
};

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
pub enum DueDateFilter {
  #[default]
  #[serde(rename = "")]
  All,
  #[serde(rename = "overdue")]
  Overdue,
  #[serde(rename = "next7days")]
  Next7Days
}

impl DueDateFilter {
  #[must_use]
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "" | "all" | "none" => {
        Some(Self::All)
      }
      | "overdue" => Some(Self::Overdue),
      | "next7days" | "next7"
      | "week" => Some(Self::Next7Days),
      | _ => None
    }
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::All => "all",
      | Self::Overdue => "overdue",
      | Self::Next7Days => "next7days"
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
  DueDate,
  Priority
}

impl SortField {
  #[must_use]
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "duedate" | "due" => {
        Some(Self::DueDate)
      }
      | "priority" | "pri" => {
        Some(Self::Priority)
      }
      | _ => None
    }
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::DueDate => "dueDate",
      | Self::Priority => "priority"
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
  #[default]
  Asc,
  Desc
}

impl SortOrder {
  #[must_use]
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "asc" | "ascending" => {
        Some(Self::Asc)
      }
      | "desc" | "descending" => {
        Some(Self::Desc)
      }
      | _ => None
    }
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Asc => "asc",
      | Self::Desc => "desc"
    }
  }
}

/// Parses the `field-order` form used by
/// the sort selector, e.g.
/// `priority-desc`. A bare field sorts
/// ascending; `none` clears sorting.
#[must_use]
pub fn parse_sort_spec(
  raw: &str
) -> Option<(Option<SortField>, SortOrder)>
{
  let (field_raw, order_raw) =
    match raw.trim().split_once('-') {
      | Some((field, order)) => {
        (field, Some(order))
      }
      | None => (raw.trim(), None)
    };

  let order = match order_raw {
    | Some(order) => {
      SortOrder::parse(order)?
    }
    | None => SortOrder::Asc
  };

  if field_raw
    .eq_ignore_ascii_case("none")
  {
    return Some((None, order));
  }

  SortField::parse(field_raw)
    .map(|field| (Some(field), order))
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct StoreState {
  pub tasks:           Vec<Task>,
  pub priority_filter: Option<Priority>,
  pub due_date_filter: DueDateFilter,
  pub sort_field:      Option<SortField>,
  pub sort_order:      SortOrder
}

impl Default for StoreState {
  fn default() -> Self {
    Self {
      tasks:           Vec::new(),
      priority_filter: None,
      due_date_filter:
        DueDateFilter::All,
      sort_field:      Some(
        SortField::DueDate
      ),
      sort_order:      SortOrder::Asc
    }
  }
}

impl StoreState {
  #[must_use]
  pub fn with_sort(
    mut self,
    field: Option<SortField>,
    order: SortOrder
  ) -> Self {
    self.sort_field = field;
    self.sort_order = order;
    self
  }

  #[must_use]
  pub fn query(&self) -> ViewQuery {
    ViewQuery {
      priority_filter: self
        .priority_filter,
      due_date_filter: self
        .due_date_filter,
      sort_field:      self.sort_field,
      sort_order:      self.sort_order
    }
  }

  #[must_use]
  pub fn task(
    &self,
    id: TaskId
  ) -> Option<&Task> {
    self
      .tasks
      .iter()
      .find(|task| task.id == id)
  }
}

#[derive(
  Debug,
  Clone,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(
  tag = "type",
  content = "payload",
  rename_all = "SCREAMING_SNAKE_CASE"
)]
pub enum Action {
  AddTask(Task),
  DeleteTask(TaskId),
  EditTask(Task),
  SetPriorityFilter(
    #[serde(with = "priority_filter_serde")]
    Option<Priority>
  ),
  SetDueDateFilter(DueDateFilter),
  SetSortOrder {
    #[serde(default)]
    field: Option<SortField>,
    order: SortOrder
  }
}

impl Action {
  #[must_use]
  pub fn kind(&self) -> &'static str {
    match self {
      | Self::AddTask(_) => "ADD_TASK",
      | Self::DeleteTask(_) => {
        "DELETE_TASK"
      }
      | Self::EditTask(_) => "EDIT_TASK",
      | Self::SetPriorityFilter(_) => {
        "SET_PRIORITY_FILTER"
      }
      | Self::SetDueDateFilter(_) => {
        "SET_DUE_DATE_FILTER"
      }
      | Self::SetSortOrder {
        ..
      } => "SET_SORT_ORDER"
    }
  }

  /// Decodes an action object such as
  /// `{"type": "DELETE_TASK", "payload":
  /// 42}`. Unknown types and malformed
  /// payloads yield `None`.
  #[must_use]
  pub fn from_value(
    raw: &Value
  ) -> Option<Self> {
    match serde_json::from_value::<Self>(
      raw.clone()
    ) {
      | Ok(action) => Some(action),
      | Err(err) => {
        debug!(
          error = %err,
          kind = ?raw.get("type"),
          "ignoring unrecognized action"
        );
        None
      }
    }
  }
}

mod priority_filter_serde {
  use serde::de::Error as _;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  use crate::task::Priority;

  pub fn serialize<S>(
    value: &Option<Priority>,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      value.map_or("", Priority::as_str)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<Option<Priority>, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw =
      Option::<String>::deserialize(
        deserializer
      )?;
    match raw.as_deref().map(str::trim)
    {
      | None | Some("") => Ok(None),
      | Some(value) => {
        Priority::parse(value)
          .map(Some)
          .ok_or_else(|| {
            D::Error::custom(format!(
              "unknown priority: {value}"
            ))
          })
      }
    }
  }
}

/// The transition function.
///
/// Add and edit trust their input;
/// validation happens before dispatch.
/// Deleting or editing an id that is not
/// present leaves the state as it was.
#[tracing::instrument(skip_all, fields(action = action.kind()))]
#[must_use]
pub fn reduce(
  state: StoreState,
  action: Action
) -> StoreState {
  match action {
    | Action::AddTask(task) => {
      let mut tasks = state.tasks;
      tasks.push(task);
      StoreState {
        tasks,
        ..state
      }
    }
    | Action::DeleteTask(id) => {
      let mut tasks = state.tasks;
      let before = tasks.len();
      tasks.retain(|task| task.id != id);
      if tasks.len() == before {
        debug!(%id, "delete of unknown task ignored");
      }
      StoreState {
        tasks,
        ..state
      }
    }
    | Action::EditTask(edited) => {
      let mut tasks = state.tasks;
      let mut replaced = 0_usize;
      for slot in tasks
        .iter_mut()
        .filter(|task| task.id == edited.id)
      {
        *slot = edited.clone();
        replaced += 1;
      }
      if replaced == 0 {
        debug!(id = %edited.id, "edit of unknown task ignored");
      }
      StoreState {
        tasks,
        ..state
      }
    }
    | Action::SetPriorityFilter(
      priority_filter
    ) => {
      StoreState {
        priority_filter,
        ..state
      }
    }
    | Action::SetDueDateFilter(
      due_date_filter
    ) => {
      StoreState {
        due_date_filter,
        ..state
      }
    }
    | Action::SetSortOrder {
      field,
      order
    } => {
      StoreState {
        sort_field: field,
        sort_order: order,
        ..state
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&StoreState)>;

/// Owns the state tree. Controllers get a
/// `&mut Store` instead of reaching for
/// anything global.
pub struct Store {
  state:     StoreState,
  listeners: Vec<(SubscriptionId, Listener)>,
  next_sub:  u64
}

impl fmt::Debug for Store {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.debug_struct("Store")
      .field("state", &self.state)
      .field(
        "listeners",
        &self.listeners.len()
      )
      .finish()
  }
}

impl Default for Store {
  fn default() -> Self {
    Self::new(StoreState::default())
  }
}

impl Store {
  #[must_use]
  pub fn new(
    initial: StoreState
  ) -> Self {
    Self {
      state:     initial,
      listeners: Vec::new(),
      next_sub:  0
    }
  }

  #[must_use]
  pub fn state(&self) -> &StoreState {
    &self.state
  }

  #[must_use]
  pub fn task(
    &self,
    id: TaskId
  ) -> Option<&Task> {
    self.state.task(id)
  }

  /// Applies `action` and notifies
  /// subscribers when the state changed.
  /// Returns whether it changed.
  #[tracing::instrument(skip_all, fields(action = action.kind()))]
  pub fn dispatch(
    &mut self,
    action: Action
  ) -> bool {
    let previous = self.state.clone();
    self.state = reduce(
      std::mem::take(&mut self.state),
      action
    );

    let changed = self.state != previous;
    trace!(
      changed,
      tasks = self.state.tasks.len(),
      "action applied"
    );
    if changed {
      for (_, listener) in
        &mut self.listeners
      {
        listener(&self.state);
      }
    }
    changed
  }

  /// Dispatches a JSON action object;
  /// anything unrecognized is a no-op.
  pub fn dispatch_value(
    &mut self,
    raw: &Value
  ) -> bool {
    match Action::from_value(raw) {
      | Some(action) => {
        self.dispatch(action)
      }
      | None => false
    }
  }

  pub fn subscribe<F>(
    &mut self,
    listener: F
  ) -> SubscriptionId
  where
    F: FnMut(&StoreState) + 'static
  {
    let id = SubscriptionId(self.next_sub);
    self.next_sub += 1;
    self
      .listeners
      .push((id, Box::new(listener)));
    id
  }

  pub fn unsubscribe(
    &mut self,
    id: SubscriptionId
  ) -> bool {
    let before = self.listeners.len();
    self
      .listeners
      .retain(|(sub, _)| *sub != id);
    self.listeners.len() != before
  }

  /// The filtered and sorted task list
  /// for the current state.
  #[must_use]
  pub fn visible(
    &self,
    clock: &dyn Clock
  ) -> Vec<Task> {
    view::project(
      &self.state.tasks,
      &self.state.query(),
      clock.today()
    )
  }
}
