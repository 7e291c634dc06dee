use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

use crate::store::{
  StoreState,
  parse_sort_spec
};
use crate::task::Priority;

const RC_ENV_VAR: &str = "TASKBOARDRC";
const RC_FILE_NAME: &str = ".taskboardrc";

#[derive(Debug, Clone)]
pub struct Config {
  map:              HashMap<String, String>,
  pub loaded_files: Vec<PathBuf>,
  /// Files on the current include chain.
  loading:          Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self::defaults()
  }
}

impl Config {
  /// Built-in values only, no rc file.
  #[must_use]
  pub fn defaults() -> Self {
    let mut map = HashMap::new();
    for (key, value) in [
      ("color", "on"),
      ("default.sort", "dueDate-asc"),
      ("default.priority", "Low"),
      ("auto.list", "off")
    ] {
      map.insert(
        key.to_string(),
        value.to_string()
      );
    }

    Config {
      map,
      loaded_files: vec![],
      loading: vec![]
    }
  }

  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    let rc = resolve_rc_path(rc_override)?;
    if let Some(path) = rc {
      info!(rc = %path.display(), "loading taskboardrc");
      cfg.load_file(&path)?;
    } else {
      debug!(
        "no taskboardrc found; using \
         defaults"
      );
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .map(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  /// Empty store with the configured
  /// `default.sort`.
  pub fn initial_state(
    &self
  ) -> anyhow::Result<StoreState> {
    let raw = self
      .get("default.sort")
      .unwrap_or_else(|| {
        "dueDate-asc".to_string()
      });
    let (field, order) =
      parse_sort_spec(&raw).ok_or_else(
        || {
          anyhow!(
            "invalid default.sort \
             value: {raw} (expected \
             dueDate|priority|none with \
             optional -asc/-desc)"
          )
        }
      )?;
    Ok(
      StoreState::default()
        .with_sort(field, order)
    )
  }

  /// Priority pre-selected in a fresh
  /// add form.
  pub fn default_priority(
    &self
  ) -> anyhow::Result<Priority> {
    let raw = self
      .get("default.priority")
      .unwrap_or_else(|| "Low".to_string());
    Priority::parse(&raw).ok_or_else(
      || {
        anyhow!(
          "invalid default.priority \
           value: {raw}"
        )
      }
    )
  }

  #[must_use]
  pub fn auto_list(&self) -> bool {
    self
      .get_bool("auto.list")
      .unwrap_or(false)
  }

  #[must_use]
  pub fn timezone(
    &self
  ) -> Option<String> {
    self
      .get("timezone")
      .filter(|tz| !tz.trim().is_empty())
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let identity = fs::canonicalize(&path)
      .unwrap_or_else(|_| path.clone());
    if self.loading.contains(&identity) {
      return Err(anyhow!(
        "include cycle: {}",
        path.display()
      ));
    }

    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;

    self
      .loaded_files
      .push(path.clone());

    let base_dir = path
      .parent()
      .map(|p| p.to_path_buf())
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    self.loading.push(identity);
    let result =
      self.load_lines(&path, &base_dir, &text);
    self.loading.pop();
    result
  }

  fn load_lines(
    &mut self,
    path: &Path,
    base_dir: &Path,
    text: &str
  ) -> anyhow::Result<()> {
    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let mut line = raw_line.trim();
      if line.is_empty()
        || line.starts_with('#')
      {
        continue;
      }

      if let Some((before, _)) =
        line.split_once('#')
      {
        line = before.trim();
      }

      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            base_dir,
            include_rest.trim()
          )?;
        debug!(
            file = %path.display(),
            include = %include_path.display(),
            line = line_num + 1,
            "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim().to_string();
      let value = v.trim().to_string();
      trace!(key = %key, value = %value, "loaded config key");
      self.map.insert(key, value);
    }

    Ok(())
  }
}

#[tracing::instrument(skip(
  override_path
))]
fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping \
       taskboardrc lookup"
    );
    return Ok(None);
  };
  let candidate = home.join(RC_FILE_NAME);
  if candidate.exists() {
    return Ok(Some(candidate));
  }

  Ok(None)
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.trim().is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let raw = PathBuf::from(include);
  let expanded = expand_tilde(&raw);
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> bool {
  matches!(
    s.trim()
      .to_ascii_lowercase()
      .as_str(),
    "1" | "y" | "yes" | "on" | "true"
  )
}

#[cfg(test)]
mod tests {
  use std::fs;

  use super::*;
  use crate::store::{
    SortField,
    SortOrder
  };

  #[test]
  fn defaults_match_initial_store() {
    let cfg = Config::defaults();
    assert_eq!(
      cfg.initial_state().unwrap(),
      StoreState::default()
    );
    assert_eq!(
      cfg.default_priority().unwrap(),
      Priority::Low
    );
    assert!(!cfg.auto_list());
    assert_eq!(cfg.timezone(), None);
  }

  #[test]
  fn loads_rc_file_with_comments_and_includes()
  {
    let dir =
      tempfile::tempdir().unwrap();
    let extra = dir.path().join("extra.rc");
    fs::write(
      &extra,
      "timezone = Europe/Paris\n"
    )
    .unwrap();
    let rc = dir.path().join("main.rc");
    fs::write(
      &rc,
      "# settings\n\
       default.sort = priority-desc  # hottest first\n\
       auto.list=yes\n\
       include extra.rc\n\
       include missing.rc\n"
    )
    .unwrap();

    let cfg =
      Config::load(Some(rc.as_path())).unwrap();
    assert_eq!(cfg.loaded_files.len(), 2);
    assert!(cfg.auto_list());
    assert_eq!(
      cfg.timezone().as_deref(),
      Some("Europe/Paris")
    );
    let state =
      cfg.initial_state().unwrap();
    assert_eq!(
      state.sort_field,
      Some(SortField::Priority)
    );
    assert_eq!(
      state.sort_order,
      SortOrder::Desc
    );
  }

  #[test]
  fn rejects_lines_without_equals() {
    let dir =
      tempfile::tempdir().unwrap();
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "color on\n").unwrap();
    let err =
      Config::load(Some(rc.as_path())).unwrap_err();
    assert!(
      err
        .to_string()
        .contains("invalid config line")
    );
  }

  #[test]
  fn self_include_is_a_cycle_error() {
    let dir =
      tempfile::tempdir().unwrap();
    let rc = dir.path().join("rc");
    fs::write(
      &rc,
      "include rc\ncolor = off\n"
    )
    .unwrap();
    let err =
      Config::load(Some(rc.as_path()))
        .unwrap_err();
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );
  }

  #[test]
  fn mutual_includes_are_a_cycle_error() {
    let dir =
      tempfile::tempdir().unwrap();
    let a = dir.path().join("a.rc");
    let b = dir.path().join("b.rc");
    fs::write(&a, "include b.rc\n")
      .unwrap();
    fs::write(&b, "include a.rc\n")
      .unwrap();
    let err =
      Config::load(Some(a.as_path()))
        .unwrap_err();
    assert!(
      format!("{err:#}")
        .contains("include cycle")
    );
  }

  #[test]
  fn shared_include_loads_twice_without_cycle()
  {
    let dir =
      tempfile::tempdir().unwrap();
    let common =
      dir.path().join("common.rc");
    let left = dir.path().join("left.rc");
    let main = dir.path().join("main.rc");
    fs::write(&common, "color = off\n")
      .unwrap();
    fs::write(
      &left,
      "include common.rc\n"
    )
    .unwrap();
    fs::write(
      &main,
      "include left.rc\ninclude common.rc\n"
    )
    .unwrap();
    let cfg =
      Config::load(Some(main.as_path()))
        .unwrap();
    assert_eq!(cfg.loaded_files.len(), 4);
    assert_eq!(
      cfg.get("color").as_deref(),
      Some("off")
    );
  }

  #[test]
  fn overrides_strip_rc_prefix() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "rc.default.sort".to_string(),
        "none".to_string()
      ),
      (
        "default.priority".to_string(),
        "high".to_string()
      )
    ]);
    let state =
      cfg.initial_state().unwrap();
    assert_eq!(state.sort_field, None);
    assert_eq!(
      cfg.default_priority().unwrap(),
      Priority::High
    );
  }

  #[test]
  fn bad_typed_values_are_errors() {
    let mut cfg = Config::defaults();
    cfg.apply_overrides(vec![
      (
        "default.sort".to_string(),
        "urgency-asc".to_string()
      ),
      (
        "default.priority".to_string(),
        "asap".to_string()
      )
    ]);
    assert!(cfg.initial_state().is_err());
    assert!(
      cfg.default_priority().is_err()
    );
  }
}
