#![forbid(unsafe_code)]

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use crate::config::{ARCHIVED_STATUS, BoardConfig};
use crate::error::BoardError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: u32,
    pub title: String,
    pub status: String,
    pub priority: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::task::date::option"
    )]
    pub due: Option<Date>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub blocked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub claimed_at: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub started: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub completed: Option<OffsetDateTime>,

    /// Markdown below the frontmatter. Stripped from the YAML on write.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Where this snapshot was read from. Never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

impl Task {
    #[must_use]
    pub fn new(
        id: u32,
        title: impl Into<String>,
        status: impl Into<String>,
        priority: impl Into<String>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            id,
            title: title.into(),
            status: status.into(),
            priority: priority.into(),
            created: now,
            updated: now,
            assignee: None,
            tags: Vec::new(),
            due: None,
            estimate: None,
            parent: None,
            depends_on: Vec::new(),
            blocked: false,
            block_reason: None,
            class: None,
            claimed_by: None,
            claimed_at: None,
            started: None,
            completed: None,
            body: String::new(),
            file: None,
        }
    }

    #[must_use]
    pub fn is_archived(&self) -> bool {
        self.status == ARCHIVED_STATUS
    }

    #[must_use]
    pub fn claimant(&self) -> Option<&str> {
        self.claimed_by.as_deref().filter(|s| !s.is_empty())
    }

    /// New snapshot in `status`, with flow timestamps maintained.
    #[must_use]
    pub fn with_status(&self, cfg: &BoardConfig, status: &str, now: OffsetDateTime) -> Self {
        let mut next = self.clone();
        next.status = status.to_owned();
        next.updated = now;
        if status == ARCHIVED_STATUS {
            return next;
        }
        if status != cfg.first_status() && next.started.is_none() {
            next.started = Some(now);
        }
        if status == cfg.terminal_status() {
            if next.completed.is_none() {
                next.completed = Some(now);
            }
        } else {
            next.completed = None;
        }
        next
    }

    #[must_use]
    pub fn with_normalized_body(mut self) -> Self {
        self.body = normalize_body(&self.body);
        self
    }
}

/// Non-empty bodies end in exactly the line break they were given, or one `\n`.
#[must_use]
pub fn normalize_body(body: &str) -> String {
    if body.is_empty() || body.ends_with('\n') {
        body.to_owned()
    } else {
        format!("{body}\n")
    }
}

/// A proposed set of field changes. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<Option<String>>,
    pub add_tags: Vec<String>,
    pub remove_tags: Vec<String>,
    pub due: Option<Option<Date>>,
    pub estimate: Option<Option<String>>,
    pub body: Option<String>,
    pub append_body: Option<String>,
    pub started: Option<Option<OffsetDateTime>>,
    pub completed: Option<Option<OffsetDateTime>>,
    pub parent: Option<Option<u32>>,
    pub add_deps: Vec<u32>,
    pub remove_deps: Vec<u32>,
    /// `Some(Some(reason))` blocks, `Some(None)` unblocks.
    pub block: Option<Option<String>>,
    pub class: Option<Option<String>>,
}

impl TaskEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Applies the edit to a snapshot. Validation against the board happens elsewhere.
    pub fn apply(
        &self,
        cfg: &BoardConfig,
        task: &Task,
        now: OffsetDateTime,
    ) -> Result<Task, BoardError> {
        let mut next = match self.status.as_deref() {
            Some(status) if status != task.status => task.with_status(cfg, status, now),
            _ => task.clone(),
        };

        if let Some(title) = &self.title {
            let title = title.trim();
            if title.is_empty() {
                return Err(BoardError::InvalidInput("title must not be empty".to_owned()));
            }
            next.title = title.to_owned();
        }
        if let Some(priority) = &self.priority {
            next.priority.clone_from(priority);
        }
        if let Some(assignee) = &self.assignee {
            next.assignee = assignee.clone().filter(|a| !a.trim().is_empty());
        }
        for tag in &self.add_tags {
            if !tag.is_empty() && !next.tags.contains(tag) {
                next.tags.push(tag.clone());
            }
        }
        next.tags.retain(|t| !self.remove_tags.contains(t));
        if let Some(due) = self.due {
            next.due = due;
        }
        if let Some(estimate) = &self.estimate {
            next.estimate = estimate.clone().filter(|e| !e.trim().is_empty());
        }
        if let Some(body) = &self.body {
            next.body.clone_from(body);
        }
        if let Some(extra) = &self.append_body {
            if !next.body.is_empty() && !next.body.ends_with('\n') {
                next.body.push('\n');
            }
            next.body.push_str(extra);
        }
        if let Some(started) = self.started {
            next.started = started;
        }
        if let Some(completed) = self.completed {
            next.completed = completed;
        }
        if let Some(parent) = self.parent {
            next.parent = parent;
        }
        for dep in &self.add_deps {
            if !next.depends_on.contains(dep) {
                next.depends_on.push(*dep);
            }
        }
        next.depends_on.retain(|d| !self.remove_deps.contains(d));
        match &self.block {
            Some(Some(reason)) => {
                if reason.trim().is_empty() {
                    return Err(BoardError::InvalidInput(
                        "block reason is required".to_owned(),
                    ));
                }
                next.blocked = true;
                next.block_reason = Some(reason.clone());
            }
            Some(None) => {
                next.blocked = false;
                next.block_reason = None;
            }
            None => {}
        }
        if let Some(class) = &self.class {
            next.class = class.clone().filter(|c| !c.trim().is_empty());
        }

        next.updated = now;
        Ok(next.with_normalized_body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn task() -> Task {
        Task::new(1, "Write docs", "backlog", "medium", datetime!(2026-01-01 09:00 UTC))
    }

    #[test]
    fn status_change_tracks_flow_timestamps() {
        let cfg = BoardConfig::default();
        let t1 = datetime!(2026-01-02 09:00 UTC);
        let t2 = datetime!(2026-01-03 09:00 UTC);

        let started = task().with_status(&cfg, "in-progress", t1);
        assert_eq!(started.started, Some(t1));
        assert_eq!(started.completed, None);
        assert_eq!(started.updated, t1);

        let done = started.with_status(&cfg, "done", t2);
        assert_eq!(done.started, Some(t1));
        assert_eq!(done.completed, Some(t2));

        let reopened = done.with_status(&cfg, "review", t2);
        assert_eq!(reopened.completed, None);
        assert_eq!(reopened.started, Some(t1));
    }

    #[test]
    fn archiving_keeps_flow_timestamps() {
        let cfg = BoardConfig::default();
        let t1 = datetime!(2026-01-02 09:00 UTC);
        let done = task().with_status(&cfg, "done", t1);
        let archived = done.with_status(&cfg, ARCHIVED_STATUS, datetime!(2026-02-01 0:00 UTC));
        assert!(archived.is_archived());
        assert_eq!(archived.completed, Some(t1));
    }

    #[test]
    fn staying_in_first_status_does_not_start() {
        let cfg = BoardConfig::default();
        let t = task().with_status(&cfg, "backlog", datetime!(2026-01-02 0:00 UTC));
        assert_eq!(t.started, None);
    }

    #[test]
    fn normalizes_bodies() {
        assert_eq!(normalize_body(""), "");
        assert_eq!(normalize_body("a"), "a\n");
        assert_eq!(normalize_body("a\n"), "a\n");
    }

    #[test]
    fn edit_leaves_original_untouched() {
        let cfg = BoardConfig::default();
        let original = task();
        let edit = TaskEdit {
            title: Some("Write better docs".to_owned()),
            add_tags: vec!["docs".to_owned(), "docs".to_owned()],
            add_deps: vec![4, 4, 5],
            remove_deps: vec![5],
            block: Some(Some("waiting on review".to_owned())),
            append_body: Some("More context".to_owned()),
            ..TaskEdit::default()
        };
        let now = datetime!(2026-01-05 12:00 UTC);
        let edited = edit.apply(&cfg, &original, now).unwrap();

        assert_eq!(original.title, "Write docs");
        assert_eq!(edited.title, "Write better docs");
        assert_eq!(edited.tags, ["docs"]);
        assert_eq!(edited.depends_on, [4]);
        assert!(edited.blocked);
        assert_eq!(edited.body, "More context\n");
        assert_eq!(edited.updated, now);
    }

    #[test]
    fn edit_rejects_blank_block_reason_and_title() {
        let cfg = BoardConfig::default();
        let now = datetime!(2026-01-05 12:00 UTC);
        let blank_reason = TaskEdit {
            block: Some(Some("  ".to_owned())),
            ..TaskEdit::default()
        };
        assert!(blank_reason.apply(&cfg, &task(), now).is_err());

        let blank_title = TaskEdit {
            title: Some(String::new()),
            ..TaskEdit::default()
        };
        assert!(blank_title.apply(&cfg, &task(), now).is_err());
    }

    #[test]
    fn empty_edit_is_detected() {
        assert!(TaskEdit::default().is_empty());
        let edit = TaskEdit {
            block: Some(None),
            ..TaskEdit::default()
        };
        assert!(!edit.is_empty());
    }
}
