#![forbid(unsafe_code)]

use time::OffsetDateTime;

use crate::error::BoardError;
use crate::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState<'a> {
    Unclaimed,
    Claimed {
        by: &'a str,
        at: Option<OffsetDateTime>,
    },
}

impl<'a> ClaimState<'a> {
    #[must_use]
    pub fn of(task: &'a Task) -> Self {
        match task.claimant() {
            Some(by) => Self::Claimed {
                by,
                at: task.claimed_at,
            },
            None => Self::Unclaimed,
        }
    }
}

/// Result of a claim transition: a new snapshot, or nothing to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Changed(Task),
    Unchanged,
}

impl Transition {
    #[must_use]
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    #[must_use]
    pub fn into_task(self, current: &Task) -> Task {
        match self {
            Self::Changed(task) => task,
            Self::Unchanged => current.clone(),
        }
    }
}

fn agent_name(agent: &str) -> Result<&str, BoardError> {
    let agent = agent.trim();
    if agent.is_empty() {
        return Err(BoardError::InvalidInput(
            "agent name is required (use --agent or MDBOARD_AGENT)".to_owned(),
        ));
    }
    Ok(agent)
}

/// Unclaimed to claimed. Re-claiming by the current owner is a no-op.
pub fn claim(task: &Task, agent: &str, now: OffsetDateTime) -> Result<Transition, BoardError> {
    let agent = agent_name(agent)?;
    match ClaimState::of(task) {
        ClaimState::Claimed { by, .. } if by == agent => Ok(Transition::Unchanged),
        ClaimState::Claimed { by, .. } => Err(BoardError::TaskClaimed {
            id: task.id,
            owner: by.to_owned(),
        }),
        ClaimState::Unclaimed => {
            let mut next = task.clone();
            next.claimed_by = Some(agent.to_owned());
            next.claimed_at = Some(now);
            next.updated = now;
            Ok(Transition::Changed(next))
        }
    }
}

/// Clears the claim. `agent = None` releases regardless of owner.
pub fn release(task: &Task, agent: Option<&str>, now: OffsetDateTime) -> Result<Task, BoardError> {
    let ClaimState::Claimed { by, .. } = ClaimState::of(task) else {
        return Err(BoardError::NotClaimed(task.id));
    };
    if let Some(agent) = agent
        && agent.trim() != by
    {
        return Err(BoardError::TaskClaimed {
            id: task.id,
            owner: by.to_owned(),
        });
    }
    let mut next = task.clone();
    next.claimed_by = None;
    next.claimed_at = None;
    next.updated = now;
    Ok(next)
}

/// Transfers a claim from its current owner to `to`.
pub fn handoff(
    task: &Task,
    from: &str,
    to: &str,
    now: OffsetDateTime,
) -> Result<Transition, BoardError> {
    let to = agent_name(to)?;
    let ClaimState::Claimed { by, .. } = ClaimState::of(task) else {
        return Err(BoardError::NotClaimed(task.id));
    };
    if by != from.trim() {
        return Err(BoardError::TaskClaimed {
            id: task.id,
            owner: by.to_owned(),
        });
    }
    if by == to {
        return Ok(Transition::Unchanged);
    }
    let mut next = task.clone();
    next.claimed_by = Some(to.to_owned());
    next.claimed_at = Some(now);
    next.updated = now;
    Ok(Transition::Changed(next))
}

/// Rejects a mutation from anyone but the current claimant.
pub fn check_ownership(task: &Task, caller: Option<&str>) -> Result<(), BoardError> {
    match ClaimState::of(task) {
        ClaimState::Claimed { by, .. } if caller.map(str::trim) != Some(by) => {
            Err(BoardError::TaskClaimed {
                id: task.id,
                owner: by.to_owned(),
            })
        }
        _ => Ok(()),
    }
}
