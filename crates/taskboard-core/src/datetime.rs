use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Timelike,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "taskboard-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "TASKBOARD_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "TASKBOARD_TIME_CONFIG";

const STORED_DATE_FORMATS: [&str; 3] = [
  "%Y-%m-%dT%H:%M:%S",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M"
];

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  time:     Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Where "now" comes from.
///
/// Due-date validation and the overdue / next-7-days filters read the
/// current time only through this trait, so tests can pin it.
pub trait Clock {
  fn now(&self) -> DateTime<Utc>;

  fn timezone(&self) -> Tz;

  /// Wall-clock time in the configured
  /// timezone.
  fn local_now(&self) -> NaiveDateTime {
    self
      .now()
      .with_timezone(&self.timezone())
      .naive_local()
  }

  /// Local calendar date, i.e. "now"
  /// truncated to midnight.
  fn today(&self) -> NaiveDate {
    self.local_now().date()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
  tz: Tz
}

impl SystemClock {
  #[must_use]
  pub fn new(tz: Tz) -> Self {
    Self {
      tz
    }
  }
}

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }

  fn timezone(&self) -> Tz {
    self.tz
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
  now: DateTime<Utc>,
  tz:  Tz
}

impl FixedClock {
  #[must_use]
  pub fn at(
    now: DateTime<Utc>
  ) -> Self {
    Self {
      now,
      tz: chrono_tz::UTC
    }
  }

  #[must_use]
  pub fn with_timezone(
    mut self,
    tz: Tz
  ) -> Self {
    self.tz = tz;
    self
  }

  pub fn advance(
    &mut self,
    by: Duration
  ) {
    self.now += by;
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.now
  }

  fn timezone(&self) -> Tz {
    self.tz
  }
}

/// Picks the timezone used to interpret
/// due dates.
///
/// Order: the `timezone` config key, the
/// `TASKBOARD_TIMEZONE` env var, a
/// `taskboard-time.toml` file, then UTC.
#[tracing::instrument]
pub fn resolve_timezone(
  configured: Option<&str>
) -> Tz {
  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "config")
  {
    return tz;
  }

  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  tracing::debug!(
    "no timezone configured; using UTC"
  );
  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.time.and_then(|section| {
        section.timezone
      })
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::info!(
        source,
        timezone = %trimmed,
        "configured timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[must_use]
pub fn midnight(
  date: NaiveDate
) -> NaiveDateTime {
  date.and_time(NaiveTime::MIN)
}

/// Parses a due date typed by the user
/// into local wall-clock time.
pub fn parse_due_date(
  input: &str,
  clock: &dyn Clock
) -> anyhow::Result<NaiveDateTime> {
  parse_due_date_at(
    input,
    clock.local_now(),
    clock.timezone()
  )
}

/// Like [`parse_due_date`] against a clock
/// reading taken by the caller. `now` and
/// relative offsets resolve from
/// `local_now`.
#[tracing::instrument(skip(local_now, tz), fields(input = input))]
pub fn parse_due_date_at(
  input: &str,
  local_now: NaiveDateTime,
  tz: Tz
) -> anyhow::Result<NaiveDateTime> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();
  let today = local_now.date();

  match lower.as_str() {
    | "now" => return Ok(local_now),
    | "today" => {
      return Ok(midnight(today));
    }
    | "tomorrow" => {
      return shift_days(today, 1)
        .map(midnight);
    }
    | "yesterday" => {
      return shift_days(today, -1)
        .map(midnight);
    }
    | _ => {}
  }

  if let Some(target_weekday) =
    parse_weekday_name(&lower)
  {
    return Ok(midnight(
      next_weekday_date(
        today,
        target_weekday
      )
    ));
  }

  if let Some(relative) =
    parse_relative(token, local_now)?
  {
    return Ok(relative);
  }

  if let Ok(dt) =
    DateTime::parse_from_rfc3339(token)
  {
    return Ok(
      dt.with_timezone(&tz)
      .naive_local()
    );
  }

  if let Some(stored) =
    parse_stored_due_date(token)
  {
    return Ok(stored);
  }

  Err(anyhow!(
    "unrecognized date: {input}"
  ))
  .with_context(|| {
    "supported formats: \
     now/today/tomorrow/yesterday, \
     weekday names (e.g. friday), \
     +Nd/+Nh/+Nm, RFC3339, \
     YYYY-MM-DD, YYYY-MM-DDTHH:MM, \
     YYYY-MM-DD HH:MM"
  })
}

/// Parses the fixed formats written by
/// [`format_due_date`].
#[must_use]
pub fn parse_stored_due_date(
  raw: &str
) -> Option<NaiveDateTime> {
  let token = raw.trim();
  if let Ok(date) =
    NaiveDate::parse_from_str(
      token, "%Y-%m-%d"
    )
  {
    return Some(midnight(date));
  }

  STORED_DATE_FORMATS.iter().find_map(
    |fmt| {
      NaiveDateTime::parse_from_str(
        token, fmt
      )
      .ok()
    }
  )
}

/// Date only at midnight, minutes
/// otherwise.
#[must_use]
pub fn format_due_date(
  due: NaiveDateTime
) -> String {
  if due.time() == NaiveTime::MIN {
    due.format("%Y-%m-%d").to_string()
  } else if due.second() == 0 {
    due
      .format("%Y-%m-%dT%H:%M")
      .to_string()
  } else {
    due
      .format("%Y-%m-%dT%H:%M:%S")
      .to_string()
  }
}

fn shift_days(
  date: NaiveDate,
  days: i64
) -> anyhow::Result<NaiveDate> {
  Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      anyhow!(
        "date out of range: {date} \
         {days:+} days"
      )
    })
}

fn parse_relative(
  token: &str,
  local_now: NaiveDateTime
) -> anyhow::Result<Option<NaiveDateTime>>
{
  let rel_re = Regex::new(r"^(?P<sign>[+-])(?P<num>\d+)(?P<unit>[dhm])$")
        .map_err(|e| anyhow!("internal regex compile failure: {e}"))?;

  let Some(caps) =
    rel_re.captures(token)
  else {
    return Ok(None);
  };

  let num: i64 = caps
    .name("num")
    .map(|m| m.as_str())
    .ok_or_else(|| {
      anyhow!("missing relative amount")
    })?
    .parse()
    .context(
      "invalid relative number"
    )?;
  let negative = caps
    .name("sign")
    .is_some_and(|m| m.as_str() == "-");
  let signed =
    if negative { -num } else { num };

  let delta = match caps
    .name("unit")
    .map(|m| m.as_str())
  {
    | Some("d") => {
      Duration::try_days(signed)
    }
    | Some("h") => {
      Duration::try_hours(signed)
    }
    | Some("m") => {
      Duration::try_minutes(signed)
    }
    | other => {
      return Err(anyhow!(
        "unknown relative unit: \
         {other:?}"
      ));
    }
  }
  .ok_or_else(|| {
    anyhow!(
      "relative offset out of range: \
       {token}"
    )
  })?;

  local_now
    .checked_add_signed(delta)
    .map(Some)
    .ok_or_else(|| {
      anyhow!(
        "relative date out of range: \
         {token}"
      )
    })
}

fn parse_weekday_name(
  token: &str
) -> Option<Weekday> {
  match token.trim() {
    | "monday" | "mon" => {
      Some(Weekday::Mon)
    }
    | "tuesday" | "tue" | "tues" => {
      Some(Weekday::Tue)
    }
    | "wednesday" | "wed" => {
      Some(Weekday::Wed)
    }
    | "thursday" | "thu" | "thur"
    | "thurs" => Some(Weekday::Thu),
    | "friday" | "fri" => {
      Some(Weekday::Fri)
    }
    | "saturday" | "sat" => {
      Some(Weekday::Sat)
    }
    | "sunday" | "sun" => {
      Some(Weekday::Sun)
    }
    | _ => None
  }
}

/// Next occurrence strictly after
/// `from`.
fn next_weekday_date(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let from_idx = i64::from(
    from
      .weekday()
      .num_days_from_monday()
  );
  let target_idx = i64::from(
    target.num_days_from_monday()
  );
  let mut delta =
    (7 + target_idx - from_idx) % 7;
  if delta == 0 {
    delta = 7;
  }
  shift_days(from, delta)
    .unwrap_or(from)
}

pub mod due_date_serde {
  use chrono::NaiveDateTime;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    due: &NaiveDateTime,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::format_due_date(*due)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDateTime, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::parse_stored_due_date(&raw)
      .ok_or_else(|| {
        serde::de::Error::custom(
          format!(
            "invalid due date: {raw}"
          )
        )
      })
  }
}

#[cfg(test)]
mod tests {
  use chrono::{
    NaiveDate,
    TimeZone,
    Utc
  };

  use super::{
    Clock,
    FixedClock,
    format_due_date,
    load_timezone_from_file,
    parse_due_date,
    parse_stored_due_date,
    resolve_timezone
  };

  fn clock() -> FixedClock {
    // Monday 2024-06-10 09:30 UTC
    FixedClock::at(
      Utc
        .with_ymd_and_hms(
          2024, 6, 10, 9, 30, 0
        )
        .unwrap()
    )
  }

  fn ymd(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .unwrap()
  }

  #[test]
  fn parses_plain_date_as_midnight() {
    let parsed = parse_due_date(
      "2024-06-12",
      &clock()
    )
    .unwrap();
    assert_eq!(
      parsed,
      ymd(2024, 6, 12)
        .and_hms_opt(0, 0, 0)
        .unwrap()
    );
  }

  #[test]
  fn parses_date_with_time() {
    let parsed = parse_due_date(
      "2024-06-12T17:45",
      &clock()
    )
    .unwrap();
    assert_eq!(
      parsed,
      ymd(2024, 6, 12)
        .and_hms_opt(17, 45, 0)
        .unwrap()
    );
    assert_eq!(
      parse_due_date(
        "2024-06-12 17:45",
        &clock()
      )
      .unwrap(),
      parsed
    );
  }

  #[test]
  fn parses_named_days_and_weekdays() {
    let clock = clock();
    assert_eq!(
      parse_due_date("today", &clock)
        .unwrap()
        .date(),
      ymd(2024, 6, 10)
    );
    assert_eq!(
      parse_due_date(
        "tomorrow", &clock
      )
      .unwrap()
      .date(),
      ymd(2024, 6, 11)
    );
    // 2024-06-10 is a Monday, so
    // "monday" means next week.
    assert_eq!(
      parse_due_date("monday", &clock)
        .unwrap()
        .date(),
      ymd(2024, 6, 17)
    );
    assert_eq!(
      parse_due_date("fri", &clock)
        .unwrap()
        .date(),
      ymd(2024, 6, 14)
    );
  }

  #[test]
  fn parses_relative_offsets() {
    let clock = clock();
    let parsed =
      parse_due_date("+3d", &clock)
        .unwrap();
    assert_eq!(
      parsed,
      ymd(2024, 6, 13)
        .and_hms_opt(9, 30, 0)
        .unwrap()
    );
    let earlier =
      parse_due_date("-2h", &clock)
        .unwrap();
    assert_eq!(
      earlier,
      ymd(2024, 6, 10)
        .and_hms_opt(7, 30, 0)
        .unwrap()
    );
  }

  #[test]
  fn rfc3339_lands_in_clock_timezone() {
    let clock = clock().with_timezone(
      chrono_tz::America::New_York
    );
    let parsed = parse_due_date(
      "2024-06-12T16:00:00Z",
      &clock
    )
    .unwrap();
    assert_eq!(
      parsed,
      ymd(2024, 6, 12)
        .and_hms_opt(12, 0, 0)
        .unwrap()
    );
  }

  #[test]
  fn local_today_follows_timezone() {
    let clock = FixedClock::at(
      Utc
        .with_ymd_and_hms(
          2024, 6, 10, 2, 0, 0
        )
        .unwrap()
    )
    .with_timezone(
      chrono_tz::America::Mexico_City
    );
    assert_eq!(
      clock.today(),
      ymd(2024, 6, 9)
    );
  }

  #[test]
  fn rejects_garbage() {
    let err = parse_due_date(
      "someday",
      &clock()
    )
    .unwrap_err();
    assert!(
      format!("{err:#}")
        .contains("unrecognized date")
    );
  }

  #[test]
  fn stored_format_round_trips() {
    for raw in [
      "2024-06-12",
      "2024-06-12T08:05",
      "2024-06-12T08:05:09"
    ] {
      let parsed =
        parse_stored_due_date(raw)
          .unwrap();
      assert_eq!(
        format_due_date(parsed),
        raw
      );
    }
  }

  #[test]
  fn configured_timezone_wins() {
    assert_eq!(
      resolve_timezone(Some(
        "Europe/Berlin"
      )),
      chrono_tz::Europe::Berlin
    );
  }

  #[test]
  fn reads_timezone_from_toml_section()
  {
    let dir =
      tempfile::tempdir().unwrap();
    let path =
      dir.path().join("time.toml");
    std::fs::write(
      &path,
      "[time]\ntimezone = \"Asia/Tokyo\"\n"
    )
    .unwrap();
    assert_eq!(
      load_timezone_from_file(&path),
      Some(chrono_tz::Asia::Tokyo)
    );
  }

  #[test]
  fn missing_timezone_file_is_none() {
    let dir =
      tempfile::tempdir().unwrap();
    assert_eq!(
      load_timezone_from_file(
        &dir.path().join("absent.toml")
      ),
      None
    );
  }
}
