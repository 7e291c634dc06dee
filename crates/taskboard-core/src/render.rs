use std::io::Write;

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_due_date;
use crate::store::StoreState;
use crate::task::{Priority, Task, TaskDraft};
use crate::validation::FormErrors;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// `tty` says whether the output is a terminal; colour needs both that
    /// and `color=on`.
    pub fn new(cfg: &Config, tty: bool) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color: color && tty })
    }

    #[must_use]
    pub fn plain() -> Self {
        Self { color: false }
    }

    /// `total` is the size of the unfiltered list; it picks the empty-state
    /// message.
    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[Task],
        total: usize,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            if total == 0 {
                writeln!(out, "No tasks available.")?;
            } else {
                writeln!(out, "No tasks match the current filters.")?;
            }
            return Ok(());
        }

        let headers = vec![
            "ID".to_string(),
            "Due".to_string(),
            "Priority".to_string(),
            "Name".to_string(),
            "Description".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());

        for task in tasks {
            let id = self.paint(&task.id.to_string(), "33");

            let due = format_due_date(task.due_date);
            let due = if task.due_date.date() < today {
                self.paint(&due, "31")
            } else {
                due
            };

            let priority = self.paint_priority(task.priority);

            rows.push(vec![
                id,
                due,
                priority,
                task.task_name.clone(),
                task.description.clone(),
            ]);
        }

        write_table(&mut *out, headers, rows)?;
        writeln!(out, "{} of {} task(s)", tasks.len(), total)?;
        Ok(())
    }

    #[tracing::instrument(skip(self, out, task), fields(id = %task.id))]
    pub fn write_task_info<W: Write>(&self, out: &mut W, task: &Task) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "name        {}", task.task_name)?;
        writeln!(out, "due         {}", format_due_date(task.due_date))?;
        writeln!(out, "priority    {}", self.paint_priority(task.priority))?;
        writeln!(out, "description {}", task.description)?;
        writeln!(out, "status      {}", task.status)?;
        writeln!(
            out,
            "created     {}",
            task.created_at.format("%Y%m%dT%H%M%SZ")
        )?;
        Ok(())
    }

    /// The candidate waiting for `confirm` or `cancel`.
    pub fn write_preview<W: Write>(&self, out: &mut W, draft: &TaskDraft) -> anyhow::Result<()> {
        writeln!(out, "Pending task:")?;
        writeln!(out, "  name        {}", draft.task_name)?;
        writeln!(out, "  due         {}", format_due_date(draft.due_date))?;
        writeln!(out, "  priority    {}", self.paint_priority(draft.priority))?;
        if !draft.description.is_empty() {
            writeln!(out, "  description {}", draft.description)?;
        }
        writeln!(out, "Type 'confirm' to add it or 'cancel' to discard it.")?;
        Ok(())
    }

    pub fn write_form_errors<W: Write>(
        &self,
        out: &mut W,
        errors: &FormErrors,
    ) -> anyhow::Result<()> {
        for (field, err) in errors.iter() {
            let label = self.paint(field.label(), "31");
            writeln!(out, "  {label}: {err}")?;
        }
        Ok(())
    }

    /// One line summary of the active filters and sort.
    pub fn write_view_status<W: Write>(
        &self,
        out: &mut W,
        state: &StoreState,
    ) -> anyhow::Result<()> {
        let priority = state
            .priority_filter
            .map(Priority::as_str)
            .unwrap_or("all");
        let due = state.due_date_filter.as_str();
        let sort = match state.sort_field {
            Some(field) => format!("{}-{}", field.as_str(), state.sort_order.as_str()),
            None => "none".to_string(),
        };
        writeln!(out, "priority={priority} due={due} sort={sort}")?;
        Ok(())
    }

    fn paint_priority(&self, priority: Priority) -> String {
        let code = match priority {
            Priority::High => "31",
            Priority::Medium => "33",
            Priority::Low => "32",
        };
        self.paint(priority.as_str(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    let mut header_line = String::new();
    let mut rule_line = String::new();
    for idx in 0..column_count {
        header_line.push_str(&format!("{:width$} ", headers[idx], width = widths[idx]));
        rule_line.push_str(&format!("{:-<width$} ", "", width = widths[idx]));
    }
    writeln!(writer, "{}", header_line.trim_end())?;
    writeln!(writer, "{}", rule_line.trim_end())?;

    for row in rows {
        let mut line = String::new();
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            line.push_str(cell);
            line.push_str(&" ".repeat(padding));
            line.push(' ');
        }
        writeln!(writer, "{}", line.trim_end())?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
