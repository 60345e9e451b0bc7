use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::BufReader;
use std::path::Path;

use crate::error::PersistError;
use crate::types::{Message, Role, TaskRecord};

/// Everything the agent knows between turns.
///
/// Owned by the control loop and handed to each step by value; the planner
/// only ever borrows it.
#[derive(Debug, Clone)]
pub struct ConversationState {
    system_prompt: Option<String>,
    messages: Vec<Message>,
    current_page: String,
    pub task_record: TaskRecord,
}

/// On-disk shape of the history file.
#[derive(Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    system_prompt: Option<String>,
}

impl ConversationState {
    pub fn new(system_prompt: Option<String>) -> Self {
        Self {
            system_prompt,
            messages: Vec::new(),
            current_page: "None".to_string(),
            task_record: TaskRecord::default(),
        }
    }

    pub fn append_user(&mut self, text: impl Into<String>) {
        self.messages.push(Message::user(text));
    }

    pub fn append_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(Message::assistant(text));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent `limit` messages, oldest first.
    pub fn windowed_history(&self, limit: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Instructions plus the latest page, or `None` if there are no instructions.
    pub fn render_system_prompt(&self) -> Option<String> {
        self.system_prompt.as_ref().map(|prompt| {
            format!(
                "{} The current page content is: {}",
                prompt, self.current_page
            )
        })
    }

    pub fn current_page(&self) -> &str {
        &self.current_page
    }

    /// Replace the page snapshot, keeping only the first `limit` characters.
    pub fn set_current_page(&mut self, page: String, limit: usize) {
        self.current_page = truncate_chars(page, limit);
    }

    pub fn is_done(&self) -> bool {
        self.task_record.is_done()
    }

    /// True when there is nothing for the planner to answer: no messages,
    /// or the last one is already an assistant reply.
    pub fn awaits_user_turn(&self) -> bool {
        self.messages
            .last()
            .is_none_or(|m| m.role == Role::Assistant)
    }

    /// Overwrite `path` with the messages and system prompt.
    pub fn persist(&self, path: &Path) -> Result<(), PersistError> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let data = HistoryFile {
            messages: self.messages.clone(),
            system_prompt: self.system_prompt.clone(),
        };
        serde_json::to_writer_pretty(file, &data)?;
        Ok(())
    }

    /// Load a conversation saved by [`persist`](Self::persist). A missing file
    /// is an empty conversation with no system prompt.
    pub fn restore(path: &Path) -> Result<Self, PersistError> {
        if !path.exists() {
            return Ok(Self::new(None));
        }
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let data: HistoryFile = serde_json::from_reader(reader)?;

        let mut state = Self::new(data.system_prompt);
        state.messages = data.messages;
        Ok(state)
    }
}

pub(crate) fn truncate_chars(mut text: String, limit: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(limit) {
        text.truncate(idx);
    }
    text
}
