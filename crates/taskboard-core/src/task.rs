use std::fmt;
use std::str::FromStr;

use chrono::{
  DateTime,
  NaiveDateTime,
  Utc
};
use serde::{
  Deserialize,
  Serialize
};

use crate::datetime::due_date_serde;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl FromStr for TaskId {
  type Err = std::num::ParseIntError;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    s.trim().parse::<u64>().map(Self)
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
)]
pub enum Priority {
  Low,
  Medium,
  High
}

impl Priority {
  pub const ALL: [Self; 3] =
    [Self::Low, Self::Medium, Self::High];

  /// Low = 1, Medium = 2, High = 3.
  #[must_use]
  pub fn rank(self) -> u8 {
    match self {
      | Self::Low => 1,
      | Self::Medium => 2,
      | Self::High => 3
    }
  }

  #[must_use]
  pub fn as_str(self) -> &'static str {
    match self {
      | Self::Low => "Low",
      | Self::Medium => "Medium",
      | Self::High => "High"
    }
  }

  /// Case-insensitive; `None` for
  /// anything that is not a priority.
  #[must_use]
  pub fn parse(
    raw: &str
  ) -> Option<Self> {
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "low" | "l" => Some(Self::Low),
      | "medium" | "m" => {
        Some(Self::Medium)
      }
      | "high" | "h" => Some(Self::High),
      | _ => None
    }
  }
}

impl fmt::Display for Priority {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
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
pub enum Status {
  #[default]
  Pending
}

impl fmt::Display for Status {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | Self::Pending => {
        f.write_str("pending")
      }
    }
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
#[serde(rename_all = "camelCase")]
pub struct Task {
  pub id:          TaskId,
  pub task_name:   String,
  #[serde(with = "due_date_serde")]
  pub due_date:    NaiveDateTime,
  pub priority:    Priority,
  #[serde(default)]
  pub description: String,
  pub created_at:  DateTime<Utc>,
  #[serde(default)]
  pub status:      Status
}

/// A validated task that has not been
/// given an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
  pub task_name:   String,
  pub due_date:    NaiveDateTime,
  pub priority:    Priority,
  pub description: String
}

impl TaskDraft {
  #[must_use]
  pub fn into_task(
    self,
    id: TaskId,
    created_at: DateTime<Utc>
  ) -> Task {
    Task {
      id,
      task_name: self.task_name,
      due_date: self.due_date,
      priority: self.priority,
      description: self.description,
      created_at,
      status: Status::Pending
    }
  }
}

/// Hands out task ids. Whoever creates
/// tasks owns uniqueness; the store
/// trusts what it is given.
pub trait IdGenerator {
  fn next_id(
    &mut self,
    now: DateTime<Utc>
  ) -> TaskId;
}

/// Millisecond timestamps, bumped by one
/// whenever the clock has not moved past
/// the last id handed out.
#[derive(Debug, Clone, Default)]
pub struct TimestampIds {
  last: u64
}

impl IdGenerator for TimestampIds {
  fn next_id(
    &mut self,
    now: DateTime<Utc>
  ) -> TaskId {
    let millis = u64::try_from(
      now.timestamp_millis()
    )
    .unwrap_or(0);
    let next = if millis > self.last {
      millis
    } else {
      self.last.saturating_add(1)
    };
    self.last = next;
    TaskId(next)
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::*;

  #[test]
  fn priority_parse_is_case_insensitive()
  {
    assert_eq!(
      Priority::parse("HIGH"),
      Some(Priority::High)
    );
    assert_eq!(
      Priority::parse(" medium "),
      Some(Priority::Medium)
    );
    assert_eq!(
      Priority::parse("urgent"),
      None
    );
    assert_eq!(Priority::parse(""), None);
  }

  #[test]
  fn priority_ranks_are_ordered() {
    let ranks: Vec<u8> = Priority::ALL
      .iter()
      .map(|p| p.rank())
      .collect();
    assert_eq!(ranks, vec![1, 2, 3]);
  }

  #[test]
  fn timestamp_ids_never_repeat() {
    let now = Utc
      .with_ymd_and_hms(
        2024, 6, 10, 9, 0, 0
      )
      .unwrap();
    let mut ids =
      TimestampIds::default();
    let first = ids.next_id(now);
    let second = ids.next_id(now);
    let third = ids.next_id(
      now - chrono::Duration::seconds(5)
    );
    assert_eq!(
      first,
      TaskId(
        now.timestamp_millis() as u64
      )
    );
    assert!(second > first);
    assert!(third > second);
  }

  #[test]
  fn serializes_with_original_field_names()
  {
    let task = TaskDraft {
      task_name:   "Write report"
        .to_string(),
      due_date:    NaiveDate::from_ymd_opt(
        2024, 6, 12
      )
      .unwrap()
      .and_hms_opt(0, 0, 0)
      .unwrap(),
      priority:    Priority::High,
      description: String::new()
    }
    .into_task(
      TaskId(7),
      Utc
        .with_ymd_and_hms(
          2024, 6, 10, 9, 0, 0
        )
        .unwrap()
    );

    let value =
      serde_json::to_value(&task)
        .unwrap();
    assert_eq!(value["id"], 7);
    assert_eq!(
      value["taskName"],
      "Write report"
    );
    assert_eq!(
      value["dueDate"],
      "2024-06-12"
    );
    assert_eq!(
      value["priority"],
      "High"
    );
    assert_eq!(
      value["status"],
      "pending"
    );

    let back: Task =
      serde_json::from_value(value)
        .unwrap();
    assert_eq!(back, task);
  }
}
