//! The conversational agent.
//!
//! An [`Agent`] owns a chat client, a handle on the shared conversation log,
//! and a tool dispatcher. Both the foreground loop and the scheduler's
//! executor drive the same entry point, [`Agent::chat`], so every turn lands
//! in one shared history.

pub mod client;

pub use client::ChatClient;

use crate::config::AppConfig;
use crate::memory::SharedMemory;
use crate::message::Message;
use crate::prompt::{render, PromptStore};
use crate::scheduler::task::{now_local, TIME_FORMAT};
use crate::tools::ToolDispatcher;
use crate::{NudgeError, Result};
use std::sync::Arc;
use tracing::{debug, warn};

/// Upper bound on tool-call rounds within a single turn.
const MAX_TOOL_ROUNDS: usize = 8;

pub struct Agent {
    client: ChatClient,
    memory: SharedMemory,
    tools: Arc<dyn ToolDispatcher>,
    prompts: PromptStore,
    user_name: String,
    bot_name: String,
    persona: String,
}

impl Agent {
    pub fn new(
        config: &AppConfig,
        memory: SharedMemory,
        tools: Arc<dyn ToolDispatcher>,
    ) -> Result<Self> {
        Ok(Self {
            client: ChatClient::new(&config.ai)?,
            memory,
            tools,
            prompts: PromptStore::new(config.paths.prompt_dir.clone()),
            user_name: config.user.user_name.clone(),
            bot_name: config.user.bot_name.clone(),
            persona: config.user.persona.clone(),
        })
    }

    /// Seed the system prompts when the log is empty.
    ///
    /// Index 0 is the persona and index 1 the environment snapshot; the
    /// environment slot is refreshed on every turn.
    pub fn ensure_prompt(&self) -> Result<()> {
        if !self.memory.is_empty() {
            return Ok(());
        }
        let persona = self.prompts.get("persona")?;
        let persona = render(
            &persona,
            &[
                ("name", &self.bot_name),
                ("user", &self.user_name),
                ("persona", &self.persona),
            ],
        );
        self.memory.append(Message::system(persona));
        self.memory.append(Message::system(self.environment_text()?));
        Ok(())
    }

    fn environment_text(&self) -> Result<String> {
        let template = self.prompts.get("environment")?;
        let time = now_local().format(TIME_FORMAT).to_string();
        Ok(render(
            &template,
            &[("time", &time), ("os", std::env::consts::OS)],
        ))
    }

    /// Run one conversation turn: append the user message, loop through any
    /// tool calls, and return the final assistant text.
    pub async fn chat(&self, text: &str) -> Result<String> {
        self.ensure_prompt()?;
        self.memory.overwrite(1, Message::system(self.environment_text()?));
        self.memory.append(Message::user(text));

        let definitions = self.tools.definitions();
        for round in 0..MAX_TOOL_ROUNDS {
            let history = self.memory.snapshot();
            let reply = self.client.chat(&history, Some(&definitions)).await?;

            let calls = reply.tool_calls.clone().unwrap_or_default();
            self.memory.append(reply.clone());
            if calls.is_empty() {
                return Ok(reply.content);
            }

            debug!(round, calls = calls.len(), "dispatching tool calls");
            for call in calls {
                let args: serde_json::Value =
                    serde_json::from_str(&call.function.arguments).unwrap_or_else(|e| {
                        warn!("bad tool arguments for {}: {e}", call.function.name);
                        serde_json::Value::Null
                    });
                let result = self
                    .tools
                    .dispatch(&call.function.name, &args)
                    .await
                    .unwrap_or_else(|e| format!("Tool failed: {e}"));
                self.memory.append(Message::tool(result, &call.id));
            }
        }

        Err(NudgeError::Llm(format!(
            "no final reply after {MAX_TOOL_ROUNDS} tool rounds"
        )))
    }
}
