#![forbid(unsafe_code)]

use crate::config::{ARCHIVED_STATUS, BoardConfig};
use crate::error::BoardError;
use crate::task::Task;

pub fn validate_status(cfg: &BoardConfig, status: &str) -> Result<(), BoardError> {
    if cfg.status_index(status).is_some() {
        return Ok(());
    }
    Err(BoardError::InvalidStatus {
        status: status.to_owned(),
        allowed: cfg.status_names().collect::<Vec<_>>().join(", "),
    })
}

pub fn validate_priority(cfg: &BoardConfig, priority: &str) -> Result<(), BoardError> {
    if cfg.priority_index(priority).is_some() {
        return Ok(());
    }
    Err(BoardError::InvalidPriority {
        priority: priority.to_owned(),
        allowed: cfg.priorities.join(", "),
    })
}

pub fn validate_class(cfg: &BoardConfig, class: &str) -> Result<(), BoardError> {
    if cfg.class(class).is_some() {
        return Ok(());
    }
    let known: Vec<&str> = cfg.classes.iter().map(|c| c.name.as_str()).collect();
    Err(BoardError::InvalidInput(format!(
        "unknown class '{class}' (allowed: {})",
        known.join(", ")
    )))
}

/// A claim-gated status can only hold a task that carries a claimant.
pub fn check_claim_gate(cfg: &BoardConfig, proposed: &Task) -> Result<(), BoardError> {
    if cfg.requires_claim(&proposed.status) && proposed.claimant().is_none() {
        return Err(BoardError::ClaimRequired {
            id: proposed.id,
            status: proposed.status.clone(),
        });
    }
    Ok(())
}

/// Parent and dependencies must name live tasks other than `task` itself.
/// Archived tasks count as missing.
pub fn validate_references(tasks: &[Task], task: &Task) -> Result<(), BoardError> {
    let refs = task.parent.iter().chain(task.depends_on.iter());
    for &target in refs {
        if target == task.id {
            return Err(BoardError::SelfReference(task.id));
        }
        let live = tasks.iter().any(|t| t.id == target && !t.is_archived());
        if !live {
            return Err(BoardError::DependencyNotFound {
                id: task.id,
                missing: target,
            });
        }
    }
    Ok(())
}

/// Work-in-progress admission over a board snapshot.
#[derive(Debug, Clone, Copy)]
pub struct Admission<'a> {
    cfg: &'a BoardConfig,
    tasks: &'a [Task],
}

impl<'a> Admission<'a> {
    #[must_use]
    pub fn new(cfg: &'a BoardConfig, tasks: &'a [Task]) -> Self {
        Self { cfg, tasks }
    }

    /// Checks that `task` may enter `target`. Staying put always succeeds,
    /// including an edit that only changes the task's class: limits are
    /// enforced on entry to a status, not on reclassification in place.
    pub fn check_status_move(&self, task: &Task, target: &str) -> Result<(), BoardError> {
        if task.status == target {
            return Ok(());
        }
        self.check_entry(task, target)
    }

    /// Checks that `task` may be placed in `target`, as for a new task.
    pub fn check_entry(&self, task: &Task, target: &str) -> Result<(), BoardError> {
        if target == ARCHIVED_STATUS {
            return Ok(());
        }

        if let Some(class) = task.class.as_deref().and_then(|c| self.cfg.class(c))
            && class.overrides_column()
        {
            let Some(limit) = class.wip_limit.filter(|n| *n > 0) else {
                return Ok(());
            };
            if !self.cfg.is_policed(target) {
                return Ok(());
            }
            let current = self
                .others(task)
                .filter(|t| t.class.as_deref() == Some(class.name.as_str()))
                .filter(|t| self.cfg.is_policed(&t.status))
                .count();
            if current >= limit as usize {
                return Err(BoardError::ClassWipExceeded {
                    class: class.name.clone(),
                    limit,
                    current,
                });
            }
            return Ok(());
        }

        let Some(limit) = self.cfg.wip_limit(target) else {
            return Ok(());
        };
        let current = self
            .others(task)
            .filter(|t| t.status == target)
            .filter(|t| !self.bypasses_column(t))
            .count();
        if current >= limit as usize {
            return Err(BoardError::WipLimitExceeded {
                status: target.to_owned(),
                limit,
                current,
            });
        }
        Ok(())
    }

    fn others<'t>(&'t self, task: &'t Task) -> impl Iterator<Item = &'a Task> + 't {
        self.tasks
            .iter()
            .filter(move |t| t.id != task.id && !t.is_archived())
    }

    fn bypasses_column(&self, task: &Task) -> bool {
        task.class
            .as_deref()
            .and_then(|c| self.cfg.class(c))
            .is_some_and(|c| c.overrides_column())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn task(id: u32, status: &str) -> Task {
        Task::new(id, format!("Task {id}"), status, "medium", datetime!(2026-01-01 0:00 UTC))
    }

    fn with_class(mut t: Task, class: &str) -> Task {
        t.class = Some(class.to_owned());
        t
    }

    fn limited(status: &str, n: u32) -> BoardConfig {
        let mut cfg = BoardConfig::default();
        cfg.wip_limits.insert(status.to_owned(), n);
        cfg
    }

    #[test]
    fn rejects_move_into_full_column() {
        let cfg = limited("in-progress", 2);
        let board = vec![task(1, "in-progress"), task(2, "in-progress"), task(3, "todo")];
        let err = Admission::new(&cfg, &board)
            .check_status_move(&board[2], "in-progress")
            .unwrap_err();
        assert!(matches!(
            err,
            BoardError::WipLimitExceeded {
                limit: 2,
                current: 2,
                ..
            }
        ));
    }

    #[test]
    fn archived_tasks_do_not_count() {
        let cfg = limited("in-progress", 1);
        let board = vec![task(1, ARCHIVED_STATUS), task(2, "todo")];
        let mut archived_in_progress = task(3, "in-progress");
        archived_in_progress.status = ARCHIVED_STATUS.to_owned();
        let mut board = board;
        board.push(archived_in_progress);
        Admission::new(&cfg, &board)
            .check_status_move(&board[1], "in-progress")
            .unwrap();
    }

    #[test]
    fn staying_in_a_full_column_is_fine() {
        let cfg = limited("in-progress", 1);
        let board = vec![task(1, "in-progress")];
        Admission::new(&cfg, &board)
            .check_status_move(&board[0], "in-progress")
            .unwrap();
    }

    #[test]
    fn bypass_class_ignores_full_column() {
        let cfg = limited("in-progress", 1);
        let board = vec![task(1, "in-progress"), with_class(task(2, "todo"), "expedite")];
        Admission::new(&cfg, &board)
            .check_status_move(&board[1], "in-progress")
            .unwrap();
    }

    #[test]
    fn bypassing_tasks_do_not_fill_the_column() {
        let cfg = limited("in-progress", 1);
        let board = vec![
            with_class(task(1, "in-progress"), "expedite"),
            task(2, "todo"),
        ];
        Admission::new(&cfg, &board)
            .check_status_move(&board[1], "in-progress")
            .unwrap();
    }

    #[test]
    fn class_limit_applies_across_active_statuses() {
        let cfg = BoardConfig::default();
        let board = vec![
            with_class(task(1, "review"), "expedite"),
            with_class(task(2, "backlog"), "expedite"),
        ];
        let err = Admission::new(&cfg, &board)
            .check_status_move(&board[1], "in-progress")
            .unwrap_err();
        assert!(err.to_string().contains("expedite"));
        assert_eq!(err.code(), "CLASS_WIP_EXCEEDED");
    }

    #[test]
    fn class_limit_ignores_backlog_and_done() {
        let cfg = BoardConfig::default();
        let board = vec![
            with_class(task(1, "done"), "expedite"),
            with_class(task(2, "backlog"), "expedite"),
            with_class(task(3, "todo"), "expedite"),
        ];
        let admission = Admission::new(&cfg, &board);
        admission.check_status_move(&board[2], "review").unwrap();
        admission.check_status_move(&board[2], "done").unwrap();
    }

    #[test]
    fn plain_class_uses_column_limit() {
        let cfg = limited("review", 1);
        let board = vec![task(1, "review"), with_class(task(2, "todo"), "standard")];
        assert!(
            Admission::new(&cfg, &board)
                .check_status_move(&board[1], "review")
                .is_err()
        );
    }

    #[test]
    fn new_task_entry_is_counted_against_column() {
        let cfg = limited("todo", 1);
        let board = vec![task(1, "todo")];
        let draft = task(2, "todo");
        let admission = Admission::new(&cfg, &board);
        assert!(admission.check_entry(&draft, "todo").is_err());
        admission.check_entry(&draft, "backlog").unwrap();
    }

    #[test]
    fn claim_gate_needs_claimant() {
        let cfg = BoardConfig::default();
        let mut t = task(1, "in-progress");
        assert!(matches!(
            check_claim_gate(&cfg, &t),
            Err(BoardError::ClaimRequired { .. })
        ));
        t.claimed_by = Some("agent".to_owned());
        check_claim_gate(&cfg, &t).unwrap();
        check_claim_gate(&cfg, &task(2, "todo")).unwrap();
    }

    #[test]
    fn references_must_be_live_and_not_self() {
        let mut archived = task(2, "done");
        archived.status = ARCHIVED_STATUS.to_owned();
        let board = vec![task(1, "todo"), archived, task(3, "done")];

        let mut t = task(4, "todo");
        t.depends_on = vec![3];
        t.parent = Some(1);
        validate_references(&board, &t).unwrap();

        t.depends_on = vec![4];
        assert!(matches!(
            validate_references(&board, &t),
            Err(BoardError::SelfReference(4))
        ));

        t.depends_on = vec![2];
        assert!(matches!(
            validate_references(&board, &t),
            Err(BoardError::DependencyNotFound { missing: 2, .. })
        ));

        t.depends_on = vec![99];
        assert!(validate_references(&board, &t).is_err());
    }

    #[test]
    fn status_and_priority_validation_lists_allowed() {
        let cfg = BoardConfig::default();
        let err = validate_status(&cfg, "nope").unwrap_err();
        assert!(err.to_string().contains("backlog, todo"));
        assert!(validate_priority(&cfg, "urgent").is_err());
        validate_priority(&cfg, "high").unwrap();
        assert!(validate_class(&cfg, "mystery").is_err());
    }
}
