use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::error::PlannerError;
use crate::types::{Message, Role};

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5-20250929";
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Default instructions. The current page is appended at call time.
pub const SYSTEM_PROMPT: &str = r#"You are a browser automation agent. Break the user's goal down into small tasks and perform them one at a time in a real Chrome browser. Do not open new tabs.

Each reply must be exactly one JSON object and nothing else:
{"task":"the next task to perform, or the error that needs fixing","code":"the statement(s) that perform it","content":"any content extracted from the page"}

"code" holds one statement per line from this list:
- navigate("https://...")
- click("css selector")
- type_into("css selector", "text")
- press_key("Enter")
- extract_text("css selector")
- wait(milliseconds), at most 60000
- wait_for("css selector") or wait_for("css selector", milliseconds)

Plan only the next task, based on the current page. If the last statement failed, fix it and try again.
When every task is done, reply with {"task":"","code":"","content":"DONE"}."#;

/// Produces the LLM's next reply for a conversation.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, conversation: &ConversationState) -> Result<String, PlannerError>;
}

/// Anthropic Messages API client.
pub struct Brain {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    history_window: usize,
}

impl Brain {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            history_window: crate::types::DEFAULT_HISTORY_WINDOW,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Request body for the next call.
    pub fn request_body(&self, conversation: &ConversationState) -> Value {
        let mut window = conversation.windowed_history(self.history_window);
        // The API rejects a conversation that opens with an assistant turn.
        while let Some((first, rest)) = window.split_first() {
            if first.role == Role::User {
                break;
            }
            window = rest;
        }

        let messages: Vec<Value> = window.iter().map(message_json).collect();
        if conversation.messages().len() > self.history_window {
            debug!(
                "[Brain] sending last {} of {} messages",
                messages.len(),
                conversation.messages().len()
            );
        }

        let mut body = json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": messages,
        });
        if let Some(system) = conversation.render_system_prompt() {
            body["system"] = Value::String(system);
        }
        body
    }
}

fn message_json(m: &Message) -> Value {
    json!({"role": m.role.as_str(), "content": m.content})
}

/// The first text segment of a Messages API response.
pub fn reply_text(response: &Value) -> Result<String, PlannerError> {
    response["content"][0]["text"]
        .as_str()
        .map(String::from)
        .ok_or(PlannerError::EmptyResponse)
}

/// Interpret a raw Messages API response. Bodies that aren't JSON (a proxy's
/// HTML error page, say) still surface as `Api` with the status code.
pub fn read_reply(status: u16, raw: &str) -> Result<String, PlannerError> {
    let parsed: Option<Value> = serde_json::from_str(raw).ok();
    let success = (200..300).contains(&status);

    if !success {
        let message = parsed
            .as_ref()
            .and_then(|v| v["error"]["message"].as_str())
            .map(String::from)
            .unwrap_or_else(|| body_excerpt(raw));
        warn!("[Brain] API error ({}): {}", status, message);
        return Err(PlannerError::Api { status, message });
    }

    match parsed {
        Some(value) => reply_text(&value),
        None => Err(PlannerError::Api {
            status,
            message: format!("response is not JSON: {}", body_excerpt(raw)),
        }),
    }
}

fn body_excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "Unknown API error".to_string();
    }
    trimmed.chars().take(200).collect()
}

#[async_trait]
impl Planner for Brain {
    async fn plan(&self, conversation: &ConversationState) -> Result<String, PlannerError> {
        let body = self.request_body(conversation);
        info!("[Brain] asking {} for the next step", self.model);

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status().as_u16();
        let raw = response.text().await?;
        let text = read_reply(status, &raw)?;
        debug!("[Brain] LLM says: {}", text);
        Ok(text)
    }
}
