//! Background task scheduling: trigger rules, persistence, and the
//! polling loop that feeds due tasks to an executor.

pub mod executor;
pub mod runner;
pub mod store;
pub mod task;

pub use executor::{AgentExecutor, TaskExecutor};
pub use runner::Scheduler;
pub use store::TaskStore;
pub use task::{Task, TaskSummary, Trigger, TriggerKind};
