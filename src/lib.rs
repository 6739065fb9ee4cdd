//! Nudge - conversational assistant with a persistent reminder scheduler
//!
//! A single-process assistant that:
//! - Runs a foreground conversational loop against an LLM
//! - Fires scheduled tasks (one-shot, interval, daily) from a background loop
//! - Shares one conversation memory between both, archiving it on clear

pub mod agent;
pub mod config;
pub mod memory;
pub mod message;
pub mod prompt;
pub mod scheduler;
pub mod tools;

pub use agent::{Agent, ChatClient};
pub use config::AppConfig;
pub use memory::SharedMemory;
pub use message::{Message, Role};
pub use scheduler::{Scheduler, Task, TaskStore, Trigger};

/// Result type for nudge operations
pub type Result<T> = std::result::Result<T, NudgeError>;

/// Errors that can occur in nudge
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
