//! Prompt templates.
//!
//! Built-in templates can be overridden by dropping `{name}.txt` files into
//! the configured prompt directory. Placeholders use `{braces}` and are
//! filled with simple string replacement.

use crate::{NudgeError, Result};
use std::path::PathBuf;

/// Persona system prompt. Placeholders: `{name}`, `{user}`, `{persona}`.
const PERSONA_TEMPLATE: &str = "You are {name}, a personal assistant for {user}. \
{persona}\n\
You can schedule reminders for {user} with your scheduling tools: a reminder \
message you schedule will later be delivered back to you, and you should then \
relay it to {user} naturally. Keep replies short unless asked otherwise.";

/// Refreshable environment prompt. Placeholders: `{time}`, `{os}`.
const ENVIRONMENT_TEMPLATE: &str = "Current local time: {time}\n\
Operating system: {os}\n\
Use the current time when interpreting relative schedules like \"in an hour\" \
or \"tomorrow morning\".";

/// System prompt framing the memory summarization request.
const SUMMARY_TEMPLATE: &str = "You condense conversation transcripts into \
durable memory. Produce a short summary that preserves names, preferences, \
commitments, scheduled reminders, and unresolved questions. Plain text only.";

/// Loads prompt templates, preferring overrides on disk.
#[derive(Debug, Clone, Default)]
pub struct PromptStore {
    dir: Option<PathBuf>,
}

impl PromptStore {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Raw template by name (`persona`, `environment`, `summary`).
    pub fn get(&self, name: &str) -> Result<String> {
        if let Some(dir) = &self.dir {
            let path = dir.join(format!("{name}.txt"));
            if path.exists() {
                return Ok(std::fs::read_to_string(&path)?);
            }
        }
        match name {
            "persona" => Ok(PERSONA_TEMPLATE.to_string()),
            "environment" => Ok(ENVIRONMENT_TEMPLATE.to_string()),
            "summary" => Ok(SUMMARY_TEMPLATE.to_string()),
            other => Err(NudgeError::Prompt(format!("unknown prompt '{other}'"))),
        }
    }
}

/// Fill `{key}` placeholders in a template.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = template.to_string();
    for (key, value) in vars {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}
