#![forbid(unsafe_code)]

use std::path::Path;

use serde::Serialize;
use time::{Date, OffsetDateTime};
use tracing::info;

use crate::board;
use crate::config::{self, ARCHIVED_STATUS, BoardConfig};
use crate::core::admission::{self, Admission};
use crate::core::claim::{self, Transition};
use crate::core::lock;
use crate::error::BoardError;
use crate::task::{ReadWarning, Task, TaskEdit, TaskStore};

/// Result of a mutation that may turn out to be a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    #[serde(flatten)]
    pub task: Task,
    pub changed: bool,
    /// Status before the mutation.
    #[serde(skip)]
    pub from: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveTarget {
    Status(String),
    Next,
    Prev,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorityStep {
    Raise,
    Lower,
}

/// Claim change riding along with an edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ClaimAction {
    #[default]
    Keep,
    Claim(String),
    Release,
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub assignee: Option<String>,
    pub tags: Vec<String>,
    pub due: Option<Date>,
    pub estimate: Option<String>,
    pub parent: Option<u32>,
    pub depends_on: Vec<u32>,
    pub class: Option<String>,
    pub body: String,
    pub claim: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PickOptions {
    pub statuses: Vec<String>,
    pub tag: Option<String>,
    pub move_to: Option<String>,
}

/// Every board mutation goes through here, under the board lock.
#[derive(Debug, Clone)]
pub struct BoardManager {
    cfg: BoardConfig,
    store: TaskStore,
    agent: Option<String>,
}

impl BoardManager {
    #[must_use]
    pub fn new(cfg: BoardConfig) -> Self {
        let store = TaskStore::new(cfg.tasks_path());
        Self {
            cfg,
            store,
            agent: None,
        }
    }

    pub fn open(dir: &Path) -> Result<Self, BoardError> {
        Ok(Self::new(config::load(dir)?))
    }

    /// Claimant identity used for ownership checks.
    #[must_use]
    pub fn with_agent(mut self, agent: Option<String>) -> Self {
        self.agent = agent.map(|a| a.trim().to_owned()).filter(|a| !a.is_empty());
        self
    }

    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.cfg
    }

    #[must_use]
    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    #[must_use]
    pub fn agent(&self) -> Option<&str> {
        self.agent.as_deref()
    }

    pub fn reload_config(&mut self) -> Result<(), BoardError> {
        self.cfg = config::load(self.cfg.dir())?;
        self.store = TaskStore::new(self.cfg.tasks_path());
        Ok(())
    }

    pub fn show(&self, id: u32) -> Result<Task, BoardError> {
        self.store.load(id)
    }

    pub fn load_all(&self) -> Result<Vec<Task>, BoardError> {
        self.store.load_all()
    }

    pub fn load_all_lenient(&self) -> Result<(Vec<Task>, Vec<ReadWarning>), BoardError> {
        self.store.load_all_lenient()
    }

    /// Notes on live tasks that reference `id`.
    pub fn dependents(&self, id: u32) -> Result<Vec<String>, BoardError> {
        let tasks = self.store.load_all()?;
        let live: Vec<Task> = tasks.into_iter().filter(|t| !t.is_archived()).collect();
        Ok(board::find_dependents(&live, id))
    }

    fn require_agent(&self) -> Result<&str, BoardError> {
        self.agent.as_deref().ok_or_else(|| {
            BoardError::InvalidInput(
                "agent name is required (use --agent or MDBOARD_AGENT)".to_owned(),
            )
        })
    }

    fn locked<T>(&self, f: impl FnOnce() -> Result<T, BoardError>) -> Result<T, BoardError> {
        let mut guard = lock::acquire(&self.cfg.lock_path())?;
        let out = f();
        let released = guard.release();
        let out = out?;
        released?;
        Ok(out)
    }

    /// Strict: one unreadable task file fails the whole mutation.
    fn snapshot(&self) -> Result<Vec<Task>, BoardError> {
        self.store.load_all()
    }

    /// Status, admission and claim gate for a snapshot about to be written.
    fn admit(&self, board: &[Task], before: Option<&Task>, after: &Task) -> Result<(), BoardError> {
        if !after.is_archived() {
            admission::validate_status(&self.cfg, &after.status)?;
        }
        admission::validate_priority(&self.cfg, &after.priority)?;
        if let Some(class) = after.class.as_deref() {
            admission::validate_class(&self.cfg, class)?;
        }
        admission::validate_references(board, after)?;
        let gate = Admission::new(&self.cfg, board);
        match before {
            Some(before) => gate.check_status_move(before, &after.status)?,
            None => gate.check_entry(after, &after.status)?,
        }
        admission::check_claim_gate(&self.cfg, after)
    }

    fn commit(&self, task: &Task) -> Result<Task, BoardError> {
        self.store.save(&task.clone().with_normalized_body())
    }

    pub fn create(&self, new: NewTask) -> Result<Task, BoardError> {
        let title = new.title.trim().to_owned();
        if title.is_empty() {
            return Err(BoardError::InvalidInput("title must not be empty".to_owned()));
        }
        let status = new.status.clone().unwrap_or_else(|| self.cfg.defaults.status.clone());
        let priority = new
            .priority
            .clone()
            .unwrap_or_else(|| self.cfg.defaults.priority.clone());
        admission::validate_status(&self.cfg, &status)?;
        admission::validate_priority(&self.cfg, &priority)?;

        self.locked(|| {
            let now = OffsetDateTime::now_utc();
            let board = self.snapshot()?;
            let floor = self.store.max_file_id()?.saturating_add(1);
            let id = config::reserve_id(self.cfg.dir(), floor)?;

            let mut task = Task::new(id, title.clone(), self.cfg.first_status(), priority.clone(), now);
            if status != task.status {
                task = task.with_status(&self.cfg, &status, now);
            }
            task.assignee = new.assignee.clone().filter(|a| !a.trim().is_empty());
            for tag in &new.tags {
                if !tag.is_empty() && !task.tags.contains(tag) {
                    task.tags.push(tag.clone());
                }
            }
            task.due = new.due;
            task.estimate = new.estimate.clone().filter(|e| !e.trim().is_empty());
            task.parent = new.parent;
            for dep in &new.depends_on {
                if !task.depends_on.contains(dep) {
                    task.depends_on.push(*dep);
                }
            }
            task.class = new.class.clone().or_else(|| self.cfg.defaults.class.clone());
            task.body.clone_from(&new.body);
            if let Some(agent) = &new.claim {
                task = claim::claim(&task, agent, now)?.into_task(&task);
            }

            self.admit(&board, None, &task)?;
            let saved = self.commit(&task)?;
            info!(id, status = %saved.status, "created task");
            Ok(saved)
        })
    }

    fn resolve_target(&self, task: &Task, target: &MoveTarget) -> Result<String, BoardError> {
        let idx = self.cfg.status_index(&task.status);
        let last = self.cfg.statuses.len().saturating_sub(1);
        let status = match target {
            MoveTarget::Status(s) => {
                admission::validate_status(&self.cfg, s)?;
                return Ok(s.clone());
            }
            MoveTarget::Next => match idx {
                Some(i) if i < last => &self.cfg.statuses[i + 1],
                _ => {
                    return Err(BoardError::BoundaryReached {
                        id: task.id,
                        edge: "last",
                        what: "status",
                    });
                }
            },
            MoveTarget::Prev => match idx {
                Some(i) if i > 0 => &self.cfg.statuses[i - 1],
                _ => {
                    return Err(BoardError::BoundaryReached {
                        id: task.id,
                        edge: "first",
                        what: "status",
                    });
                }
            },
        };
        Ok(status.name.clone())
    }

    /// Moves a task. `claim_as` claims it in the same step, which also makes
    /// that agent the caller for the ownership check.
    pub fn move_task(
        &self,
        id: u32,
        target: &MoveTarget,
        claim_as: Option<&str>,
    ) -> Result<MoveOutcome, BoardError> {
        self.locked(|| {
            let now = OffsetDateTime::now_utc();
            let current = self.store.load(id)?;
            let status = self.resolve_target(&current, target)?;

            let mut next = match claim_as {
                Some(agent) => claim::claim(&current, agent, now)?.into_task(&current),
                None => {
                    claim::check_ownership(&current, self.agent.as_deref())?;
                    current.clone()
                }
            };

            if current.status == status && next == current {
                return Ok(MoveOutcome {
                    from: current.status.clone(),
                    task: current,
                    changed: false,
                });
            }
            if current.status != status {
                next = next.with_status(&self.cfg, &status, now);
            }
            let board = self.snapshot()?;
            self.admit(&board, Some(&current), &next)?;
            let saved = self.commit(&next)?;
            info!(id, from = %current.status, to = %saved.status, "moved task");
            Ok(MoveOutcome {
                task: saved,
                changed: true,
                from: current.status,
            })
        })
    }

    pub fn edit(&self, id: u32, edit: &TaskEdit, claim_action: &ClaimAction) -> Result<Task, BoardError> {
        if edit.is_empty() && *claim_action == ClaimAction::Keep {
            return Err(BoardError::NoChanges);
        }
        if let Some(status) = &edit.status {
            admission::validate_status(&self.cfg, status)?;
        }
        if let Some(priority) = &edit.priority {
            admission::validate_priority(&self.cfg, priority)?;
        }
        self.locked(|| {
            let now = OffsetDateTime::now_utc();
            let current = self.store.load(id)?;

            let mut next = match claim_action {
                ClaimAction::Claim(agent) => claim::claim(&current, agent, now)?.into_task(&current),
                ClaimAction::Keep | ClaimAction::Release => {
                    claim::check_ownership(&current, self.agent.as_deref())?;
                    current.clone()
                }
            };
            next = edit.apply(&self.cfg, &next, now)?;
            if *claim_action == ClaimAction::Release {
                next = claim::release(&next, self.agent.as_deref(), now)?;
            }

            let board = self.snapshot()?;
            self.admit(&board, Some(&current), &next)?;
            let saved = self.commit(&next)?;
            info!(id, "edited task");
            Ok(saved)
        })
    }

    pub fn claim(&self, id: u32) -> Result<MoveOutcome, BoardError> {
        let agent = self.require_agent()?;
        self.locked(|| self.claim_locked(id, agent))
    }

    /// Releases a claim. `force` releases whoever holds it.
    pub fn release(&self, id: u32, force: bool) -> Result<Task, BoardError> {
        let agent = if force { None } else { Some(self.require_agent()?) };
        self.locked(|| self.release_locked(id, agent))
    }

    fn claim_locked(&self, id: u32, agent: &str) -> Result<MoveOutcome, BoardError> {
        let current = self.store.load(id)?;
        match claim::claim(&current, agent, OffsetDateTime::now_utc())? {
            Transition::Unchanged => Ok(MoveOutcome {
                from: current.status.clone(),
                task: current,
                changed: false,
            }),
            Transition::Changed(next) => {
                let saved = self.commit(&next)?;
                info!(id, agent, "claimed task");
                Ok(MoveOutcome {
                    from: current.status,
                    task: saved,
                    changed: true,
                })
            }
        }
    }

    fn release_locked(&self, id: u32, agent: Option<&str>) -> Result<Task, BoardError> {
        let current = self.store.load(id)?;
        let next = claim::release(&current, agent, OffsetDateTime::now_utc())?;
        let saved = self.commit(&next)?;
        info!(id, force = agent.is_none(), "released task");
        Ok(saved)
    }

    /// Hands a claim from the configured agent to `to`, optionally noting why
    /// and moving the task in the same step.
    pub fn handoff(
        &self,
        id: u32,
        to: &str,
        note: Option<&str>,
        status: Option<&str>,
    ) -> Result<Task, BoardError> {
        let from = self.require_agent()?;
        if let Some(status) = status {
            admission::validate_status(&self.cfg, status)?;
        }
        self.locked(|| {
            let now = OffsetDateTime::now_utc();
            let current = self.store.load(id)?;
            let mut next = claim::handoff(&current, from, to, now)?.into_task(&current);
            if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
                let line = format!("Handoff from {from} to {}: {note}\n", to.trim());
                let edit = TaskEdit {
                    append_body: Some(line),
                    ..TaskEdit::default()
                };
                next = edit.apply(&self.cfg, &next, now)?;
            }
            if let Some(status) = status
                && status != next.status
            {
                next = next.with_status(&self.cfg, status, now);
            }
            if next == current {
                return Ok(current);
            }
            let board = self.snapshot()?;
            self.admit(&board, Some(&current), &next)?;
            let saved = self.commit(&next)?;
            info!(id, from, to, "handed off task");
            Ok(saved)
        })
    }

    /// Claims the most urgent ready task: highest priority, then lowest id.
    pub fn pick(&self, opts: &PickOptions) -> Result<Option<MoveOutcome>, BoardError> {
        let agent = self.require_agent()?;
        for status in &opts.statuses {
            admission::validate_status(&self.cfg, status)?;
        }
        if let Some(status) = &opts.move_to {
            admission::validate_status(&self.cfg, status)?;
        }
        self.locked(|| {
            let now = OffsetDateTime::now_utc();
            let board = self.snapshot()?;
            let terminal = self.cfg.terminal_status();
            let filter = board::FilterOptions {
                statuses: opts.statuses.clone(),
                tag: opts.tag.clone(),
                blocked: Some(false),
                ..board::FilterOptions::default()
            };
            let mut candidates: Vec<Task> = board::filter_unblocked(&board, terminal)
                .into_iter()
                .filter(|t| !t.is_archived() && t.claimant().is_none())
                .filter(|t| !opts.statuses.is_empty() || t.status != terminal)
                .filter(|t| filter.matches(t))
                .collect();
            candidates.sort_by_key(|t| {
                let rank = self.cfg.priority_index(&t.priority).map_or(0, |i| i + 1);
                (std::cmp::Reverse(rank), t.id)
            });
            let Some(current) = candidates.into_iter().next() else {
                return Ok(None);
            };

            let mut next = claim::claim(&current, agent, now)?.into_task(&current);
            if let Some(status) = &opts.move_to
                && *status != next.status
            {
                next = next.with_status(&self.cfg, status, now);
            }
            self.admit(&board, Some(&current), &next)?;
            let saved = self.commit(&next)?;
            info!(id = saved.id, agent, "picked task");
            Ok(Some(MoveOutcome {
                from: current.status,
                task: saved,
                changed: true,
            }))
        })
    }

    /// Soft delete. Archiving an archived task is a no-op.
    pub fn archive(&self, id: u32) -> Result<MoveOutcome, BoardError> {
        self.locked(|| {
            let current = self.store.load(id)?;
            claim::check_ownership(&current, self.agent.as_deref())?;
            if current.is_archived() {
                return Ok(MoveOutcome {
                    from: current.status.clone(),
                    task: current,
                    changed: false,
                });
            }
            let next = current.with_status(&self.cfg, ARCHIVED_STATUS, OffsetDateTime::now_utc());
            let saved = self.commit(&next)?;
            info!(id, from = %current.status, "archived task");
            Ok(MoveOutcome {
                from: current.status,
                task: saved,
                changed: true,
            })
        })
    }

    /// Removes the task file for good.
    pub fn delete(&self, id: u32) -> Result<Task, BoardError> {
        self.locked(|| {
            let current = self.store.load(id)?;
            claim::check_ownership(&current, self.agent.as_deref())?;
            self.store.delete(&current)?;
            info!(id, "deleted task");
            Ok(current)
        })
    }

    /// Moves the priority one step along the configured order.
    pub fn shift_priority(&self, id: u32, step: PriorityStep) -> Result<Task, BoardError> {
        self.locked(|| {
            let current = self.store.load(id)?;
            claim::check_ownership(&current, self.agent.as_deref())?;
            admission::validate_priority(&self.cfg, &current.priority)?;
            let idx = self.cfg.priority_index(&current.priority).unwrap_or_default();
            let target = match step {
                PriorityStep::Raise if idx + 1 < self.cfg.priorities.len() => idx + 1,
                PriorityStep::Lower if idx > 0 => idx - 1,
                PriorityStep::Raise => {
                    return Err(BoardError::BoundaryReached {
                        id,
                        edge: "highest",
                        what: "priority",
                    });
                }
                PriorityStep::Lower => {
                    return Err(BoardError::BoundaryReached {
                        id,
                        edge: "lowest",
                        what: "priority",
                    });
                }
            };
            let mut next = current.clone();
            next.priority.clone_from(&self.cfg.priorities[target]);
            next.updated = OffsetDateTime::now_utc();
            let saved = self.commit(&next)?;
            info!(id, priority = %saved.priority, "changed priority");
            Ok(saved)
        })
    }

    /// Claims an unclaimed task, or releases one we hold.
    pub fn toggle_claim(&self, id: u32) -> Result<Task, BoardError> {
        let agent = self.require_agent()?;
        self.locked(|| {
            let current = self.store.load(id)?;
            if current.claimant() == Some(agent) {
                self.release_locked(id, Some(agent))
            } else {
                Ok(self.claim_locked(id, agent)?.task)
            }
        })
    }
}
