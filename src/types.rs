use serde::{Deserialize, Serialize};

/// Who authored a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A message in the conversation history sent to the LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The decision the LLM makes each turn: what it is doing, the statements to
/// run for it, and anything it read off the page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task: String,
    pub code: String,
    pub content: String,
}

impl TaskRecord {
    pub fn is_done(&self) -> bool {
        self.content == DONE_SENTINEL
    }
}

/// Text read from the page by an `extract_text` statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub selector: String,
    pub text: String,
}

pub const DONE_SENTINEL: &str = "DONE";
pub const DEFAULT_HISTORY_WINDOW: usize = 10;
pub const PAGE_SNAPSHOT_MAX_CHARS: usize = 100_000;
pub const EXTRACTION_MAX_CHARS: usize = 2000;
