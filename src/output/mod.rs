#![forbid(unsafe_code)]

pub mod table;

use std::io;

use serde::Serialize;

use crate::board::{BoardSummary, Metrics};
use crate::task::Task;
use crate::task::date;
use table::Table;

pub const ENV_OUTPUT: &str = "MDBOARD_OUTPUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl OutputFormat {
    /// Flags win, then `MDBOARD_OUTPUT`, then table.
    #[must_use]
    pub fn resolve(json: bool, table: bool) -> Self {
        Self::resolve_with(json, table, std::env::var(ENV_OUTPUT).ok().as_deref())
    }

    #[must_use]
    pub fn resolve_with(json: bool, table: bool, env: Option<&str>) -> Self {
        if json {
            return Self::Json;
        }
        if table {
            return Self::Table;
        }
        match env.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Table,
        }
    }

    #[must_use]
    pub fn is_json(self) -> bool {
        self == Self::Json
    }
}

pub fn write_json<T: Serialize + ?Sized>(mut out: impl io::Write, value: &T) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
    write_json(io::stdout().lock(), value)
}

#[must_use]
pub fn task_table(tasks: &[Task]) -> Table {
    let mut t = Table::new(["ID", "STATUS", "PRIORITY", "TITLE", "ASSIGNEE", "CLAIMED", "TAGS", "DUE"]);
    for task in tasks {
        t.row([
            task.id.to_string(),
            task.status.clone(),
            task.priority.clone(),
            task.title.clone(),
            task.assignee.clone().unwrap_or_default(),
            task.claimant().unwrap_or_default().to_owned(),
            task.tags.join(","),
            task.due.map(date::format).unwrap_or_default(),
        ]);
    }
    t
}

pub fn write_task_detail(mut out: impl io::Write, task: &Task) -> io::Result<()> {
    writeln!(out, "Task #{}: {}", task.id, task.title)?;
    writeln!(out)?;
    field(&mut out, "Status", &task.status)?;
    field(&mut out, "Priority", &task.priority)?;
    if let Some(a) = &task.assignee {
        field(&mut out, "Assignee", a)?;
    }
    if let Some(agent) = task.claimant() {
        field(&mut out, "Claimed by", agent)?;
    }
    if let Some(class) = &task.class {
        field(&mut out, "Class", class)?;
    }
    if !task.tags.is_empty() {
        field(&mut out, "Tags", &task.tags.join(", "))?;
    }
    if let Some(due) = task.due {
        field(&mut out, "Due", &date::format(due))?;
    }
    if let Some(e) = &task.estimate {
        field(&mut out, "Estimate", e)?;
    }
    if let Some(p) = task.parent {
        field(&mut out, "Parent", &format!("#{p}"))?;
    }
    if !task.depends_on.is_empty() {
        let deps: Vec<String> = task.depends_on.iter().map(|d| format!("#{d}")).collect();
        field(&mut out, "Depends on", &deps.join(", "))?;
    }
    if task.blocked {
        field(&mut out, "Blocked", task.block_reason.as_deref().unwrap_or("yes"))?;
    }
    field(&mut out, "Created", &stamp(task.created))?;
    field(&mut out, "Updated", &stamp(task.updated))?;
    if let Some(s) = task.started {
        field(&mut out, "Started", &stamp(s))?;
    }
    if let Some(c) = task.completed {
        field(&mut out, "Completed", &stamp(c))?;
    }
    if !task.body.trim().is_empty() {
        writeln!(out)?;
        writeln!(out, "{}", task.body.trim_end())?;
    }
    Ok(())
}

pub fn write_summary(mut out: impl io::Write, summary: &BoardSummary) -> io::Result<()> {
    writeln!(out, "{} ({} tasks)", summary.board_name, summary.total)?;
    writeln!(out)?;
    let mut t = Table::new(["STATUS", "COUNT", "WIP"]);
    for s in &summary.statuses {
        let wip = match (s.wip_limit, s.utilization) {
            (Some(limit), Some(u)) => format!("{}/{limit} ({:.0}%)", s.count, u * 100.0),
            (Some(limit), None) => format!("{}/{limit}", s.count),
            _ => String::new(),
        };
        t.row([s.status.clone(), s.count.to_string(), wip]);
    }
    t.write_to(&mut out)?;
    writeln!(out)?;
    writeln!(out, "Blocked: {}  Overdue: {}", summary.blocked, summary.overdue)?;
    if !summary.priorities.is_empty() {
        let parts: Vec<String> = summary
            .priorities
            .iter()
            .map(|(p, n)| format!("{p}={n}"))
            .collect();
        writeln!(out, "Priorities: {}", parts.join("  "))?;
    }
    Ok(())
}

pub fn write_metrics(mut out: impl io::Write, m: &Metrics) -> io::Result<()> {
    let hours = |v: Option<f64>| v.map_or_else(|| table::EMPTY.to_owned(), format_duration);
    writeln!(out, "Throughput (7d):   {}", m.throughput_7d)?;
    writeln!(out, "Throughput (30d):  {}", m.throughput_30d)?;
    writeln!(out, "Avg lead time:     {}", hours(m.avg_lead_time_hours))?;
    writeln!(out, "Avg cycle time:    {}", hours(m.avg_cycle_time_hours))?;
    let eff = m
        .flow_efficiency
        .map_or_else(|| table::EMPTY.to_owned(), |e| format!("{:.0}%", e * 100.0));
    writeln!(out, "Flow efficiency:   {eff}")?;
    if !m.aging_items.is_empty() {
        writeln!(out)?;
        writeln!(out, "Aging work in progress:")?;
        let mut t = Table::new(["ID", "STATUS", "AGE", "TITLE"]);
        for item in &m.aging_items {
            t.row([
                item.id.to_string(),
                item.status.clone(),
                format_duration(item.age_hours),
                item.title.clone(),
            ]);
        }
        t.write_to(&mut out)?;
    }
    Ok(())
}

/// `2d 2h` past a day, `3h 30m` below it.
#[must_use]
pub fn format_duration(hours: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let minutes = (hours.max(0.0) * 60.0).round() as u64;
    let (d, h, m) = (minutes / 1440, (minutes / 60) % 24, minutes % 60);
    if d > 0 {
        format!("{d}d {h}h")
    } else {
        format!("{h}h {m}m")
    }
}

fn field(out: &mut impl io::Write, name: &str, value: &str) -> io::Result<()> {
    writeln!(out, "  {name:<12}{value}")
}

fn stamp(t: time::OffsetDateTime) -> String {
    t.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "unknown".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::AgingItem;

    #[test]
    fn flag_beats_env_and_env_beats_default() {
        assert_eq!(OutputFormat::resolve_with(true, false, Some("table")), OutputFormat::Json);
        assert_eq!(OutputFormat::resolve_with(false, true, Some("json")), OutputFormat::Table);
        assert_eq!(OutputFormat::resolve_with(false, false, Some("json")), OutputFormat::Json);
        assert_eq!(OutputFormat::resolve_with(false, false, Some("xml")), OutputFormat::Table);
        assert_eq!(OutputFormat::resolve_with(false, false, None), OutputFormat::Table);
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(50.0), "2d 2h");
        assert_eq!(format_duration(3.5), "3h 30m");
        assert_eq!(format_duration(0.0), "0h 0m");
        assert_eq!(format_duration(48.0), "2d 0h");
    }

    #[test]
    fn task_table_marks_missing_fields() {
        let now = time::OffsetDateTime::now_utc();
        let mut a = Task::new(1, "All fields".to_owned(), "todo", "high".to_owned(), now);
        a.assignee = Some("alice".to_owned());
        a.tags = vec!["bug".to_owned(), "ui".to_owned()];
        let b = Task::new(2, "Bare".to_owned(), "backlog", "low".to_owned(), now);

        let mut buf = Vec::new();
        task_table(&[a, b]).write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with("ID  STATUS"));
        assert!(lines[1].contains("alice"));
        assert!(lines[1].contains("bug,ui"));
        assert!(lines[2].contains("Bare"));
        assert!(lines[2].contains("--"));
    }

    #[test]
    fn metrics_render_placeholders_and_aging() {
        let m = Metrics {
            throughput_7d: 2,
            aging_items: vec![AgingItem {
                id: 4,
                title: "Stuck".to_owned(),
                status: "review".to_owned(),
                age_hours: 26.0,
            }],
            ..Metrics::default()
        };
        let mut buf = Vec::new();
        write_metrics(&mut buf, &m).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("Throughput (7d):   2"));
        assert!(text.contains("Avg lead time:     --"));
        assert!(text.contains("1d 2h"));
        assert!(text.contains("Stuck"));
    }

    #[test]
    fn json_is_pretty_with_newline() {
        let mut buf = Vec::new();
        write_json(&mut buf, &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "{\n  \"a\": 1\n}\n");
    }
}
