#![forbid(unsafe_code)]

pub mod date;
pub mod model;
pub mod slug;
pub mod storage;

pub use model::{Task, TaskEdit};
pub use storage::{ReadWarning, TaskStore};
