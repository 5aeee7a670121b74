use thiserror::Error;
use super::types::{TaskId, TaskState};

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Cannot {action} task in state {state:?}")]
    InvalidState {
        action: &'static str,
        state: TaskState,
    },

    #[error("Invalid source file: {0}")]
    InvalidFile(String),

    #[error("Manager shut down")]
    ManagerShutdown,
}

pub type Result<T, E = TaskError> = std::result::Result<T, E>;
