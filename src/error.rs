#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BoardError {
    #[error("invalid task ID '{0}'")]
    InvalidTaskId(String),

    #[error("task #{0} not found")]
    TaskNotFound(u32),

    #[error("invalid status '{status}' (allowed: {allowed})")]
    InvalidStatus { status: String, allowed: String },

    #[error("invalid priority '{priority}' (allowed: {allowed})")]
    InvalidPriority { priority: String, allowed: String },

    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid sort field '{0}' (allowed: id, status, priority, created, updated, due, title)")]
    InvalidSortField(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("task #{0} cannot reference itself")]
    SelfReference(u32),

    #[error("task #{id} references #{missing}, which does not exist or is archived")]
    DependencyNotFound { id: u32, missing: u32 },

    /// Another agent owns the task. Automation branches on this.
    #[error("task #{id} is claimed by {owner}")]
    TaskClaimed { id: u32, owner: String },

    #[error("task #{0} is not claimed")]
    NotClaimed(u32),

    #[error("task #{id} must be claimed before entering '{status}'")]
    ClaimRequired { id: u32, status: String },

    #[error("WIP limit reached for '{status}' ({current}/{limit})")]
    WipLimitExceeded {
        status: String,
        limit: u32,
        current: usize,
    },

    #[error("class WIP limit reached for '{class}' ({current}/{limit})")]
    ClassWipExceeded {
        class: String,
        limit: u32,
        current: usize,
    },

    #[error("task #{id} is already at the {edge} {what}")]
    BoundaryReached {
        id: u32,
        edge: &'static str,
        what: &'static str,
    },

    #[error("{0} requires confirmation; pass --yes")]
    ConfirmationRequired(String),

    #[error("no changes specified")]
    NoChanges,

    #[error("no board found (looked for config.toml from {0} upward)")]
    BoardNotFound(PathBuf),

    #[error("board already exists at {0}")]
    BoardExists(PathBuf),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("parsing frontmatter in {path}: {msg}")]
    Parse { path: PathBuf, msg: String },

    #[error("{context} {path}: {source}")]
    IoPath {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("watching {path}: {source}")]
    Watch {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("lock already released")]
    LockReleased,

    /// Per-item errors were already reported; only the exit status remains.
    #[error("{failed} of {total} operations failed")]
    BatchFailed { failed: usize, total: usize },
}

impl BoardError {
    pub(crate) fn io_path(
        context: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::IoPath {
            context,
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable code for JSON error output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidTaskId(_) => "INVALID_TASK_ID",
            Self::TaskNotFound(_) => "TASK_NOT_FOUND",
            Self::InvalidStatus { .. } => "INVALID_STATUS",
            Self::InvalidPriority { .. } => "INVALID_PRIORITY",
            Self::InvalidDate(_) => "INVALID_DATE",
            Self::InvalidSortField(_) | Self::InvalidInput(_) | Self::BoundaryReached { .. } => {
                "INVALID_INPUT"
            }
            Self::SelfReference(_) => "SELF_REFERENCE",
            Self::DependencyNotFound { .. } => "DEPENDENCY_NOT_FOUND",
            Self::TaskClaimed { .. } => "TASK_CLAIMED",
            Self::NotClaimed(_) => "NOT_CLAIMED",
            Self::ClaimRequired { .. } => "CLAIM_REQUIRED",
            Self::WipLimitExceeded { .. } => "WIP_LIMIT_EXCEEDED",
            Self::ClassWipExceeded { .. } => "CLASS_WIP_EXCEEDED",
            Self::ConfirmationRequired(_) => "CONFIRMATION_REQUIRED",
            Self::NoChanges => "NO_CHANGES",
            Self::BoardNotFound(_) => "BOARD_NOT_FOUND",
            Self::BoardExists(_) => "BOARD_EXISTS",
            Self::Config(_) | Self::InvalidConfigKey(_) | Self::InvalidConfigValue { .. } => {
                "CONFIG_ERROR"
            }
            Self::Parse { .. } => "PARSE_ERROR",
            Self::IoPath { .. } | Self::Io(_) => "IO_ERROR",
            Self::Watch { .. } => "WATCH_ERROR",
            Self::LockReleased => "LOCK_RELEASED",
            Self::BatchFailed { .. } => "BATCH_FAILED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_conflict_has_distinct_code() {
        let err = BoardError::TaskClaimed {
            id: 3,
            owner: "agent-a".to_owned(),
        };
        assert_eq!(err.code(), "TASK_CLAIMED");
        assert_eq!(err.to_string(), "task #3 is claimed by agent-a");
    }

    #[test]
    fn class_wip_message_names_the_class() {
        let err = BoardError::ClassWipExceeded {
            class: "expedite".to_owned(),
            limit: 1,
            current: 1,
        };
        assert!(err.to_string().contains("expedite"));
        assert_eq!(err.code(), "CLASS_WIP_EXCEEDED");
    }

    #[test]
    fn io_errors_name_the_path() {
        let err = BoardError::io_path(
            "reading task file",
            "/tmp/x/001-a.md",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        let msg = err.to_string();
        assert!(msg.starts_with("reading task file /tmp/x/001-a.md"));
        assert_eq!(err.code(), "IO_ERROR");
    }
}
