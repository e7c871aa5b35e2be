#![forbid(unsafe_code)]

pub mod admission;
pub mod batch;
pub mod claim;
pub mod lock;
pub mod manager;

pub use manager::{BoardManager, ClaimAction, MoveOutcome, MoveTarget, NewTask, PickOptions, PriorityStep};
