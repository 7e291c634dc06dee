mod modifiers;

use std::cell::Cell;
use std::io::{BufRead, Write};
use std::rc::Rc;

use anyhow::Context;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::datetime::Clock;
use crate::form::{AddFlow, EditForm, TaskForm};
use crate::render::Renderer;
use crate::store::{Action, DueDateFilter, Store, parse_sort_spec};
use crate::task::{Priority, TaskId, TimestampIds};
use crate::validation::TaskFields;

use self::modifiers::{parse_words_and_mods, split_words};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "confirm", "cancel", "edit", "delete", "filter", "sort", "list", "info", "export",
        "raw", "status", "show", "help", "quit", "exit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One interactive board: the store, the pending add and the rendering
/// settings. Nothing is persisted; the board lives as long as the session.
pub struct Session {
    store: Store,
    add_flow: AddFlow,
    clock: Box<dyn Clock>,
    ids: TimestampIds,
    renderer: Renderer,
    default_priority: Priority,
    auto_list: bool,
    prompt: bool,
    settings: Vec<(String, String)>,
    changed: Rc<Cell<bool>>,
}

impl Session {
    pub fn new(cfg: &Config, clock: Box<dyn Clock>, renderer: Renderer) -> anyhow::Result<Self> {
        let mut store = Store::new(cfg.initial_state()?);
        let changed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&changed);
        store.subscribe(move |_| flag.set(true));

        let mut settings: Vec<(String, String)> =
            cfg.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        settings.sort();

        Ok(Self {
            store,
            add_flow: AddFlow::default(),
            clock,
            ids: TimestampIds::default(),
            renderer,
            default_priority: cfg.default_priority()?,
            auto_list: cfg.auto_list(),
            prompt: false,
            settings,
            changed,
        })
    }

    /// Print a `> ` prompt before each line read by [`Session::run`].
    #[must_use]
    pub fn with_prompt(mut self, prompt: bool) -> Self {
        self.prompt = prompt;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Reads commands line by line until `quit` or end of input.
    #[instrument(skip_all)]
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, out: &mut W) -> anyhow::Result<()> {
        let mut lines = input.lines();
        loop {
            if self.prompt {
                write!(out, "> ")?;
                out.flush()?;
            }
            let Some(line) = lines.next() else {
                break;
            };
            let line = line.context("failed to read command input")?;
            if self.execute(&line, out)? == Flow::Quit {
                break;
            }
        }
        info!(tasks = self.store.state().tasks.len(), "session finished");
        Ok(())
    }

    /// Runs one command line. Only output failures are errors; bad input is
    /// reported on `out` and the session carries on.
    #[instrument(skip(self, out))]
    pub fn execute<W: Write>(&mut self, line: &str, out: &mut W) -> anyhow::Result<Flow> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            return Ok(Flow::Continue);
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };

        let known = known_command_names();
        let Some(command) = expand_command_abbrev(head, &known) else {
            writeln!(out, "Unknown command: {head}. Type 'help' for a list.")?;
            return Ok(Flow::Continue);
        };

        // raw takes the JSON text as is
        let args = if command == "raw" {
            vec![rest.to_string()]
        } else {
            match split_words(rest) {
                Ok(args) => args,
                Err(err) => {
                    writeln!(out, "Cannot parse command: {err}")?;
                    return Ok(Flow::Continue);
                }
            }
        };

        debug!(command, args = ?args, "dispatching command");

        match command {
            "add" => self.cmd_add(out, &args)?,
            "confirm" => self.cmd_confirm(out)?,
            "cancel" => self.cmd_cancel(out)?,
            "edit" => self.cmd_edit(out, &args)?,
            "delete" => self.cmd_delete(out, &args)?,
            "filter" => self.cmd_filter(out, &args)?,
            "sort" => self.cmd_sort(out, &args)?,
            "list" => self.cmd_list(out)?,
            "info" => self.cmd_info(out, &args)?,
            "export" => self.cmd_export(out)?,
            "raw" => self.cmd_raw(out, rest)?,
            "status" => self.cmd_status(out)?,
            "show" => self.cmd_show(out)?,
            "help" => cmd_help(out)?,
            "quit" | "exit" => return Ok(Flow::Quit),
            other => {
                warn!(command = other, "command without handler");
            }
        }

        if self.changed.replace(false) && self.auto_list && command != "list" {
            self.cmd_list(out)?;
        }

        Ok(Flow::Continue)
    }

    fn cmd_add<W: Write>(&mut self, out: &mut W, args: &[String]) -> anyhow::Result<()> {
        let (words, mods) = parse_words_and_mods(args);
        let mut fields = TaskFields {
            task_name: words.join(" "),
            priority: self.default_priority.as_str().to_string(),
            ..TaskFields::default()
        };
        for (field, value) in mods {
            fields.set(field, value);
        }

        let mut form = TaskForm::new(fields);
        match self.add_flow.propose(&mut form, self.clock.as_ref()) {
            Ok(draft) => self.renderer.write_preview(out, draft)?,
            Err(errors) => {
                writeln!(out, "Cannot add task:")?;
                self.renderer.write_form_errors(out, &errors)?;
            }
        }
        Ok(())
    }

    fn cmd_confirm<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        match self
            .add_flow
            .confirm(&mut self.store, self.clock.as_ref(), &mut self.ids)
        {
            Some(task) => writeln!(out, "Created task {}.", task.id)?,
            None => writeln!(out, "Nothing to confirm.")?,
        }
        Ok(())
    }

    fn cmd_cancel<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        if self.add_flow.cancel() {
            writeln!(out, "Pending task discarded.")?;
        } else {
            writeln!(out, "Nothing to cancel.")?;
        }
        Ok(())
    }

    fn cmd_edit<W: Write>(&mut self, out: &mut W, args: &[String]) -> anyhow::Result<()> {
        let Some((id, rest)) = self.resolve_id(out, "edit", args)? else {
            return Ok(());
        };
        let Some(task) = self.store.task(id) else {
            writeln!(out, "No task with id {id}.")?;
            return Ok(());
        };

        let (words, mods) = parse_words_and_mods(rest);
        if !words.is_empty() {
            writeln!(
                out,
                "Unrecognized edit arguments: {}. Use name:, due:, pri: or desc:.",
                words.join(" ")
            )?;
            return Ok(());
        }
        if mods.is_empty() {
            writeln!(out, "Nothing to change for task {id}.")?;
            return Ok(());
        }

        let mut edit = EditForm::open(task);
        for (field, value) in mods {
            // problems are collected again on save
            let _ = edit.set_field(field, value, self.clock.as_ref());
        }

        match edit.save(&mut self.store, self.clock.as_ref()) {
            Ok(task) => writeln!(out, "Updated task {}.", task.id)?,
            Err(errors) => {
                writeln!(out, "Cannot update task {id}:")?;
                self.renderer.write_form_errors(out, &errors)?;
            }
        }
        Ok(())
    }

    fn cmd_delete<W: Write>(&mut self, out: &mut W, args: &[String]) -> anyhow::Result<()> {
        let Some((id, _)) = self.resolve_id(out, "delete", args)? else {
            return Ok(());
        };
        if self.store.dispatch(Action::DeleteTask(id)) {
            info!(%id, "task deleted");
            writeln!(out, "Deleted task {id}.")?;
        } else {
            writeln!(out, "No task with id {id}.")?;
        }
        Ok(())
    }

    fn cmd_filter<W: Write>(&mut self, out: &mut W, args: &[String]) -> anyhow::Result<()> {
        if args.is_empty() {
            return self.cmd_status(out);
        }

        let mut actions = Vec::with_capacity(args.len());
        for arg in args {
            let Some((key, value)) = arg.split_once(':').or_else(|| arg.split_once('=')) else {
                writeln!(out, "Invalid filter: {arg}. Use pri:<priority> or due:<range>.")?;
                return Ok(());
            };
            let action = match key.to_ascii_lowercase().as_str() {
                "pri" | "priority" => {
                    if value.eq_ignore_ascii_case("all") || value.is_empty() {
                        Some(Action::SetPriorityFilter(None))
                    } else {
                        Priority::parse(value).map(|p| Action::SetPriorityFilter(Some(p)))
                    }
                }
                "due" => DueDateFilter::parse(value).map(Action::SetDueDateFilter),
                _ => None,
            };
            match action {
                Some(action) => actions.push(action),
                None => {
                    writeln!(out, "Invalid filter: {arg}.")?;
                    return Ok(());
                }
            }
        }

        for action in actions {
            self.store.dispatch(action);
        }
        self.cmd_status(out)
    }

    fn cmd_sort<W: Write>(&mut self, out: &mut W, args: &[String]) -> anyhow::Result<()> {
        let spec = match args {
            [] => return self.cmd_status(out),
            [spec] => spec.clone(),
            [field, order] => format!("{field}-{order}"),
            _ => {
                writeln!(out, "Usage: sort <dueDate|priority|none>[-asc|-desc]")?;
                return Ok(());
            }
        };

        match parse_sort_spec(&spec) {
            Some((field, order)) => {
                self.store.dispatch(Action::SetSortOrder { field, order });
                self.cmd_status(out)
            }
            None => {
                writeln!(out, "Invalid sort: {spec}.")?;
                Ok(())
            }
        }
    }

    fn cmd_list<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        let visible = self.store.visible(self.clock.as_ref());
        self.renderer.write_task_table(
            out,
            &visible,
            self.store.state().tasks.len(),
            self.clock.today(),
        )
    }

    fn cmd_info<W: Write>(&mut self, out: &mut W, args: &[String]) -> anyhow::Result<()> {
        let Some((id, _)) = self.resolve_id(out, "info", args)? else {
            return Ok(());
        };
        match self.store.task(id) {
            Some(task) => self.renderer.write_task_info(out, task),
            None => {
                writeln!(out, "No task with id {id}.")?;
                Ok(())
            }
        }
    }

    fn cmd_export<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        let visible = self.store.visible(self.clock.as_ref());
        let json = serde_json::to_string_pretty(&visible).context("failed to serialize tasks")?;
        writeln!(out, "{json}")?;
        Ok(())
    }

    fn cmd_raw<W: Write>(&mut self, out: &mut W, text: &str) -> anyhow::Result<()> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => {
                writeln!(out, "Invalid JSON: {err}")?;
                return Ok(());
            }
        };
        if self.store.dispatch_value(&value) {
            writeln!(out, "Action applied.")?;
        } else {
            writeln!(out, "Action ignored.")?;
        }
        Ok(())
    }

    fn cmd_status<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        self.renderer.write_view_status(out, self.store.state())?;
        if let Some(draft) = self.add_flow.pending() {
            writeln!(out, "pending: {}", draft.task_name)?;
        }
        Ok(())
    }

    fn cmd_show<W: Write>(&mut self, out: &mut W) -> anyhow::Result<()> {
        for (key, value) in &self.settings {
            writeln!(out, "{key}={value}")?;
        }
        Ok(())
    }

    fn resolve_id<'a, W: Write>(
        &self,
        out: &mut W,
        command: &str,
        args: &'a [String],
    ) -> anyhow::Result<Option<(TaskId, &'a [String])>> {
        let Some((first, rest)) = args.split_first() else {
            writeln!(out, "Usage: {command} <id>")?;
            return Ok(None);
        };
        match first.parse::<TaskId>() {
            Ok(id) => Ok(Some((id, rest))),
            Err(_) => {
                writeln!(out, "Invalid task id: {first}")?;
                Ok(None)
            }
        }
    }
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(out, "taskboard commands:")?;
    writeln!(out, "  add <name> due:<date> [pri:<Low|Medium|High>] [desc:<text>]")?;
    writeln!(out, "  confirm | cancel")?;
    writeln!(out, "  edit <id> [name:<text>] [due:<date>] [pri:<p>] [desc:<text>]")?;
    writeln!(out, "  delete <id>")?;
    writeln!(out, "  filter [pri:<Low|Medium|High|all>] [due:<overdue|next7days|all>]")?;
    writeln!(out, "  sort <dueDate|priority|none>[-asc|-desc]")?;
    writeln!(out, "  list | info <id> | export | status | show")?;
    writeln!(out, "  raw <json action>")?;
    writeln!(out, "  help | quit")?;
    writeln!(out)?;
    writeln!(
        out,
        "Dates: YYYY-MM-DD, YYYY-MM-DDTHH:MM, today, tomorrow, monday, +3d, +2h, +30m"
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::datetime::FixedClock;
    use crate::store::{SortField, SortOrder};

    fn session() -> Session {
        session_with(Config::defaults())
    }

    fn session_with(cfg: Config) -> Session {
        let clock = FixedClock::at(Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap());
        Session::new(&cfg, Box::new(clock), Renderer::plain()).unwrap()
    }

    fn run(session: &mut Session, script: &str) -> String {
        let mut out = Vec::new();
        session.run(script.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn names(session: &Session) -> Vec<String> {
        session
            .store()
            .visible(&FixedClock::at(
                Utc.with_ymd_and_hms(2024, 6, 10, 9, 30, 0).unwrap(),
            ))
            .into_iter()
            .map(|t| t.task_name)
            .collect()
    }

    #[test]
    fn abbreviations_must_be_unique() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("conf", &known), Some("confirm"));
        assert_eq!(expand_command_abbrev("li", &known), Some("list"));
        assert_eq!(expand_command_abbrev("c", &known), None);
        assert_eq!(expand_command_abbrev("e", &known), None);
    }

    #[test]
    fn add_waits_for_confirmation() {
        let mut s = session();
        let text = run(
            &mut s,
            "add Write report due:2024-06-12 pri:high desc:\"quarterly numbers\"\n",
        );
        assert!(text.contains("Pending task:"));
        assert!(text.contains("quarterly numbers"));
        assert!(s.store().state().tasks.is_empty());

        let text = run(&mut s, "confirm\nconfirm\n");
        assert!(text.contains("Created task"));
        assert!(text.contains("Nothing to confirm."));
        let tasks = &s.store().state().tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].task_name, "Write report");
        assert_eq!(tasks[0].priority, Priority::High);
    }

    #[test]
    fn cancel_drops_the_candidate() {
        let mut s = session();
        let text = run(&mut s, "add Pay rent due:tomorrow\ncancel\nconfirm\n");
        assert!(text.contains("Pending task discarded."));
        assert!(text.contains("Nothing to confirm."));
        assert!(s.store().state().tasks.is_empty());
    }

    #[test]
    fn invalid_add_reports_every_field() {
        let mut s = session();
        let text = run(&mut s, "add ab due:2024-06-01\n");
        assert!(text.contains("Cannot add task:"));
        assert!(text.contains("Task name must be at least 3 characters long."));
        assert!(text.contains("Due date cannot be in the past."));
        assert!(run(&mut s, "confirm\n").contains("Nothing to confirm."));
    }

    #[test]
    fn default_priority_comes_from_config() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("default.priority".to_string(), "Medium".to_string())]);
        let mut s = session_with(cfg);
        run(&mut s, "add Water plants due:+1d\nconfirm\n");
        assert_eq!(s.store().state().tasks[0].priority, Priority::Medium);
    }

    #[test]
    fn edit_and_delete_by_id() {
        let mut s = session();
        run(&mut s, "add Water plants due:2024-06-11\nconfirm\n");
        let id = s.store().state().tasks[0].id;

        let text = run(&mut s, &format!("edit {id} pri:High name:\"Water the plants\"\n"));
        assert!(text.contains(&format!("Updated task {id}.")));
        let task = s.store().task(id).unwrap();
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.task_name, "Water the plants");

        let text = run(&mut s, &format!("edit {id} due:2024-06-01\n"));
        assert!(text.contains("Due date cannot be in the past."));
        assert_eq!(s.store().task(id).unwrap().task_name, "Water the plants");

        let text = run(&mut s, &format!("delete {id}\ndelete {id}\n"));
        assert!(text.contains(&format!("Deleted task {id}.")));
        assert!(text.contains(&format!("No task with id {id}.")));
        assert!(s.store().state().tasks.is_empty());
    }

    #[test]
    fn bad_ids_are_advisory() {
        let mut s = session();
        let text = run(&mut s, "delete\ninfo abc\nedit 99 pri:Low\n");
        assert!(text.contains("Usage: delete <id>"));
        assert!(text.contains("Invalid task id: abc"));
        assert!(text.contains("No task with id 99."));
    }

    #[test]
    fn filter_and_sort_shape_the_list() {
        let mut s = session();
        run(
            &mut s,
            "add Alpha due:2024-06-15 pri:Low\nconfirm\n\
             add Bravo due:2024-06-11 pri:High\nconfirm\n\
             add Charlie due:2024-06-30 pri:Medium\nconfirm\n",
        );
        assert_eq!(names(&s), vec!["Bravo", "Alpha", "Charlie"]);

        let text = run(&mut s, "sort priority desc\n");
        assert_eq!(text, "priority=all due=all sort=priority-desc\n");
        assert_eq!(names(&s), vec!["Bravo", "Charlie", "Alpha"]);

        run(&mut s, "filter due:next7days\n");
        assert_eq!(names(&s), vec!["Bravo", "Alpha"]);

        run(&mut s, "filter pri:high\n");
        assert_eq!(names(&s), vec!["Bravo"]);

        let text = run(&mut s, "filter pri:all due:all\nsort none\n");
        assert!(text.ends_with("priority=all due=all sort=none\n"));
        assert_eq!(s.store().state().sort_field, None);
        assert_eq!(names(&s), vec!["Alpha", "Bravo", "Charlie"]);

        let text = run(&mut s, "filter pri:urgent\nsort urgency\n");
        assert!(text.contains("Invalid filter: pri:urgent."));
        assert!(text.contains("Invalid sort: urgency."));
    }

    #[test]
    fn list_reports_empty_states() {
        let mut s = session();
        assert_eq!(run(&mut s, "list\n"), "No tasks available.\n");
        run(&mut s, "add Alpha due:2024-06-15\nconfirm\nfilter due:overdue\n");
        assert_eq!(run(&mut s, "list\n"), "No tasks match the current filters.\n");
    }

    #[test]
    fn raw_actions_ignore_unknown_types() {
        let mut s = session();
        let text = run(
            &mut s,
            "raw {\"type\": \"SET_SORT_ORDER\", \"payload\": {\"field\": \"priority\", \"order\": \"desc\"}}\n\
             raw {\"type\": \"ARCHIVE_TASK\", \"payload\": 1}\n\
             raw not json\n",
        );
        assert!(text.contains("Action applied."));
        assert!(text.contains("Action ignored."));
        assert!(text.contains("Invalid JSON"));
        assert_eq!(s.store().state().sort_field, Some(SortField::Priority));
        assert_eq!(s.store().state().sort_order, SortOrder::Desc);
    }

    #[test]
    fn export_prints_visible_tasks_as_json() {
        let mut s = session();
        run(&mut s, "add Alpha due:2024-06-15T14:00 desc:notes\nconfirm\n");
        let text = run(&mut s, "export\n");
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["taskName"], "Alpha");
        assert_eq!(value[0]["dueDate"], "2024-06-15T14:00");
        assert_eq!(value[0]["priority"], "Low");
        assert_eq!(value[0]["status"], "pending");
    }

    #[test]
    fn auto_list_renders_after_changes() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides(vec![("auto.list".to_string(), "on".to_string())]);
        let mut s = session_with(cfg);
        let text = run(&mut s, "add Alpha due:2024-06-15\n");
        assert!(!text.contains("1 of 1 task(s)"));
        let text = run(&mut s, "confirm\n");
        assert!(text.contains("1 of 1 task(s)"));
    }

    #[test]
    fn quit_stops_reading_and_unknown_commands_continue() {
        let mut s = session();
        let text = run(&mut s, "# comment\nfrobnicate\nquit\nadd Alpha due:2024-06-15\n");
        assert!(text.contains("Unknown command: frobnicate."));
        assert!(!text.contains("Pending task:"));
    }
}
