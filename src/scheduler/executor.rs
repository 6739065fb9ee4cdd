//! Execution seam between the polling loop and the conversational agent.
//!
//! The loop only knows [`TaskExecutor`]; the production implementation
//! lazily builds one [`Agent`] bound to the shared memory and feeds each
//! fired task's message to it. Failures are logged with the task id and
//! swallowed so a bad fire can never take the loop down.

use super::task::Task;
use crate::agent::Agent;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, error};

/// Callback invoked for each due task.
pub trait TaskExecutor: Send + Sync {
    fn execute(&self, task: Task) -> BoxFuture<'_, ()>;
}

/// Builds the agent handle on first use.
pub type AgentFactory = Box<dyn Fn() -> crate::Result<Agent> + Send + Sync>;

/// Agent-backed executor.
///
/// The agent is constructed on the first fire and reused afterwards; the
/// mutex both guards the deferred init against racing fires and serializes
/// scheduled turns against each other.
pub struct AgentExecutor {
    factory: AgentFactory,
    agent: tokio::sync::Mutex<Option<Agent>>,
}

impl AgentExecutor {
    pub fn new(factory: AgentFactory) -> Self {
        Self {
            factory,
            agent: tokio::sync::Mutex::new(None),
        }
    }
}

impl TaskExecutor for AgentExecutor {
    fn execute(&self, task: Task) -> BoxFuture<'_, ()> {
        async move {
            if task.message.is_empty() {
                return;
            }

            let mut guard = self.agent.lock().await;
            if guard.is_none() {
                match (self.factory)() {
                    Ok(agent) => *guard = Some(agent),
                    Err(e) => {
                        error!("task {}: cannot construct agent: {e}", task.id);
                        return;
                    }
                }
            }
            let Some(agent) = guard.as_ref() else {
                return;
            };

            debug!("task {}: delivering scheduled message", task.id);
            if let Err(e) = agent.chat(&task.message).await {
                error!("task {} failed: {e}", task.id);
            }
        }
        .boxed()
    }
}
