#![forbid(unsafe_code)]

pub mod metrics;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;
use time::Date;

use crate::config::{ARCHIVED_STATUS, BoardConfig};
use crate::error::BoardError;
use crate::task::Task;

pub use metrics::{AgingItem, Metrics, compute_metrics};

pub const SORT_FIELDS: &[&str] = &["id", "status", "priority", "created", "updated", "due", "title"];

/// Conjunctive task filter. Empty fields match everything.
#[derive(Debug, Clone, Default)]
pub struct FilterOptions {
    pub statuses: Vec<String>,
    pub priorities: Vec<String>,
    pub assignee: Option<String>,
    pub tag: Option<String>,
    /// `Some(true)` only blocked, `Some(false)` only not blocked.
    pub blocked: Option<bool>,
    pub parent: Option<u32>,
    pub claimed_by: Option<String>,
    /// Case-insensitive substring of title or body.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filter: FilterOptions,
    pub sort_by: Option<String>,
    pub reverse: bool,
    pub limit: Option<usize>,
    pub unblocked: bool,
    pub include_archived: bool,
}

impl FilterOptions {
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&task.status) {
            return false;
        }
        if !self.priorities.is_empty() && !self.priorities.contains(&task.priority) {
            return false;
        }
        if let Some(assignee) = &self.assignee
            && task.assignee.as_ref() != Some(assignee)
        {
            return false;
        }
        if let Some(tag) = &self.tag
            && !task.tags.contains(tag)
        {
            return false;
        }
        if let Some(blocked) = self.blocked
            && task.blocked != blocked
        {
            return false;
        }
        if let Some(parent) = self.parent
            && task.parent != Some(parent)
        {
            return false;
        }
        if let Some(agent) = &self.claimed_by
            && task.claimant() != Some(agent.as_str())
        {
            return false;
        }
        if let Some(needle) = self.search.as_deref().map(str::to_lowercase)
            && !task.title.to_lowercase().contains(&needle)
            && !task.body.to_lowercase().contains(&needle)
        {
            return false;
        }
        true
    }
}

#[must_use]
pub fn filter(tasks: &[Task], opts: &FilterOptions) -> Vec<Task> {
    tasks.iter().filter(|t| opts.matches(t)).cloned().collect()
}

/// Keeps tasks whose dependencies all sit at `terminal`. A missing or archived
/// dependency never satisfies.
#[must_use]
pub fn filter_unblocked(tasks: &[Task], terminal: &str) -> Vec<Task> {
    let status_by_id: HashMap<u32, &str> = tasks.iter().map(|t| (t.id, t.status.as_str())).collect();
    tasks
        .iter()
        .filter(|t| deps_satisfied(t, &status_by_id, terminal))
        .cloned()
        .collect()
}

fn deps_satisfied(task: &Task, status_by_id: &HashMap<u32, &str>, terminal: &str) -> bool {
    task.depends_on
        .iter()
        .all(|dep| status_by_id.get(dep).is_some_and(|s| *s == terminal))
}

/// Human-readable notes on tasks that point at `id`.
#[must_use]
pub fn find_dependents(tasks: &[Task], id: u32) -> Vec<String> {
    let mut notes = Vec::new();
    for t in tasks {
        if t.parent == Some(id) {
            notes.push(format!("task #{} ({}) has this as parent", t.id, t.title));
        }
        if t.depends_on.contains(&id) {
            notes.push(format!("task #{} ({}) depends on this task", t.id, t.title));
        }
    }
    notes
}

#[must_use]
pub fn count_by_status(tasks: &[Task]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for t in tasks {
        *counts.entry(t.status.clone()).or_default() += 1;
    }
    counts
}

/// Sorts in place. Ties break by id so output is stable across runs.
pub fn sort(tasks: &mut [Task], field: &str, reverse: bool, cfg: &BoardConfig) -> Result<(), BoardError> {
    let cmp: Box<dyn Fn(&Task, &Task) -> Ordering + '_> = match field {
        "id" => Box::new(|_: &Task, _: &Task| Ordering::Equal),
        "status" => Box::new(|a: &Task, b: &Task| {
            rank(cfg.status_index(&a.status)).cmp(&rank(cfg.status_index(&b.status)))
        }),
        "priority" => Box::new(|a: &Task, b: &Task| {
            rank(cfg.priority_index(&a.priority)).cmp(&rank(cfg.priority_index(&b.priority)))
        }),
        "created" => Box::new(|a: &Task, b: &Task| a.created.cmp(&b.created)),
        "updated" => Box::new(|a: &Task, b: &Task| a.updated.cmp(&b.updated)),
        "due" => Box::new(|a: &Task, b: &Task| match (a.due, b.due) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }),
        "title" => Box::new(|a: &Task, b: &Task| a.title.to_lowercase().cmp(&b.title.to_lowercase())),
        other => return Err(BoardError::InvalidSortField(other.to_owned())),
    };
    tasks.sort_by(|a, b| {
        let ord = cmp(a, b).then_with(|| a.id.cmp(&b.id));
        if reverse { ord.reverse() } else { ord }
    });
    Ok(())
}

fn rank(idx: Option<usize>) -> usize {
    idx.unwrap_or(usize::MAX)
}

/// Filter, unblocked-only, sort, limit. Archived tasks only when asked for.
pub fn list(cfg: &BoardConfig, tasks: &[Task], opts: &ListOptions) -> Result<Vec<Task>, BoardError> {
    let wants_archived =
        opts.include_archived || opts.filter.statuses.iter().any(|s| s == ARCHIVED_STATUS);
    let visible: Vec<Task> = tasks
        .iter()
        .filter(|t| wants_archived || !t.is_archived())
        .cloned()
        .collect();

    let mut out = filter(&visible, &opts.filter);
    if opts.unblocked {
        // Dependencies resolve against the whole board, not the filtered view.
        let ready: HashSet<u32> = filter_unblocked(tasks, cfg.terminal_status())
            .iter()
            .map(|t| t.id)
            .collect();
        out.retain(|t| ready.contains(&t.id));
    }
    sort(&mut out, opts.sort_by.as_deref().unwrap_or("id"), opts.reverse, cfg)?;
    if let Some(limit) = opts.limit
        && limit > 0
    {
        out.truncate(limit);
    }
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSummary {
    pub status: String,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wip_limit: Option<u32>,
    /// `count / wip_limit`, when limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utilization: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoardSummary {
    pub board_name: String,
    pub total: usize,
    pub statuses: Vec<StatusSummary>,
    pub blocked: usize,
    pub overdue: usize,
    pub priorities: BTreeMap<String, usize>,
}

#[must_use]
pub fn summary(cfg: &BoardConfig, tasks: &[Task], today: Date) -> BoardSummary {
    let live: Vec<&Task> = tasks.iter().filter(|t| !t.is_archived()).collect();
    let statuses = cfg
        .status_names()
        .map(|status| {
            let count = live.iter().filter(|t| t.status == status).count();
            let wip_limit = cfg.wip_limit(status);
            StatusSummary {
                status: status.to_owned(),
                count,
                wip_limit,
                utilization: wip_limit.map(|n| count as f64 / f64::from(n)),
            }
        })
        .collect();

    let mut priorities = BTreeMap::new();
    for t in &live {
        *priorities.entry(t.priority.clone()).or_default() += 1;
    }

    BoardSummary {
        board_name: cfg.board.name.clone(),
        total: live.len(),
        statuses,
        blocked: live.iter().filter(|t| t.blocked).count(),
        overdue: live
            .iter()
            .filter(|t| t.status != cfg.terminal_status())
            .filter(|t| t.due.is_some_and(|d| d < today))
            .count(),
        priorities,
    }
}
