//! Chat-completions HTTP client.
//!
//! Thin wrapper over a chat-completions endpoint: POSTs the role-tagged
//! message list (plus optional tool definitions) and returns the assistant
//! message. Transient failures are retried with exponential backoff.

use crate::config::AiConfig;
use crate::message::{Message, Role, ToolCall};
use crate::{NudgeError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 200;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const TEMPERATURE: f32 = 0.1;

/// Wire shape of one returned choice's message. `content` is null when the
/// model only asks for tool calls.
#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ResponseChoice>,
}

/// LLM completion client.
pub struct ChatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl ChatClient {
    pub fn new(config: &AiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| NudgeError::Llm(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    /// Send the message list and return the assistant message.
    ///
    /// Retries transient failures (connection errors, 429, 5xx) up to
    /// [`MAX_RETRY_ATTEMPTS`] times before giving up.
    pub async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[serde_json::Value]>,
    ) -> Result<Message> {
        if self.api_key.is_empty() {
            return Err(NudgeError::Llm(
                "no API key configured (set ai.api_key or AI_API_KEY)".into(),
            ));
        }

        let body = request_body(&self.model, messages, tools);
        let url = format!("{}/chat/completions", self.base_url);

        let mut last_error = String::new();
        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt - 1);
                debug!("retrying LLM request in {delay}ms (attempt {})", attempt + 1);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let response = match self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    last_error = format!("request error: {e}");
                    warn!("LLM request failed: {last_error}");
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 || status.is_server_error() {
                last_error = format!("status {status}");
                warn!("LLM returned {status}, will retry");
                continue;
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(NudgeError::Llm(format!("status {status}: {text}")));
            }

            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| NudgeError::Llm(format!("bad response body: {e}")))?;
            let choice = parsed
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| NudgeError::Llm("response had no choices".into()))?;

            return Ok(Message {
                role: Role::Assistant,
                content: choice.message.content.unwrap_or_default(),
                tool_calls: choice.message.tool_calls,
                tool_call_id: None,
            });
        }

        Err(NudgeError::Llm(format!(
            "giving up after {MAX_RETRY_ATTEMPTS} attempts: {last_error}"
        )))
    }
}

/// Build the JSON request body for one completion call.
fn request_body(
    model: &str,
    messages: &[Message],
    tools: Option<&[serde_json::Value]>,
) -> serde_json::Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": TEMPERATURE,
    });
    if let Some(tools) = tools {
        if !tools.is_empty() {
            body["tools"] = serde_json::Value::Array(tools.to_vec());
        }
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let body = request_body("test-model", &messages, None);

        assert_eq!(body["model"], "test-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_request_body_includes_tools() {
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {"name": "list_tasks", "parameters": {}}
        })];
        let body = request_body("m", &[Message::user("hi")], Some(&tools));
        assert_eq!(body["tools"][0]["function"]["name"], "list_tasks");
    }

    #[test]
    fn test_empty_tools_omitted() {
        let body = request_body("m", &[Message::user("hi")], Some(&[]));
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_response_parsing_with_null_content() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":null,
            "tool_calls":[{"id":"call_1","type":"function",
            "function":{"name":"list_tasks","arguments":"{}"}}]}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).unwrap();
        let msg = &parsed.choices[0].message;
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.as_ref().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_api_key_errors_without_network() {
        let client = ChatClient::new(&AiConfig {
            api_key: String::new(),
            base_url: "http://127.0.0.1:1".into(),
            model: "m".into(),
        })
        .unwrap();
        let err = client.chat(&[Message::user("hi")], None).await.unwrap_err();
        assert!(matches!(err, NudgeError::Llm(_)));
    }
}
