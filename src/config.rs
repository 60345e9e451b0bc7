use std::path::PathBuf;
use std::time::Duration;

use crate::brain::{DEFAULT_MAX_TOKENS, DEFAULT_MODEL, SYSTEM_PROMPT};
use crate::types::{DEFAULT_HISTORY_WINDOW, PAGE_SNAPSHOT_MAX_CHARS};

pub const DEFAULT_ANOMALY_MARKERS: [&str; 2] = ["recaptcha", "hcaptcha"];

/// Knobs for a run. `Default` matches the stock agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub max_tokens: u32,
    /// Most recent messages sent to the LLM each turn.
    pub history_window: usize,
    /// Page snapshots are cut to this many characters.
    pub page_char_limit: usize,
    pub poll_interval: Duration,
    pub suspend_timeout: Duration,
    /// Iframe `src` fragments that mark a challenge widget.
    pub anomaly_markers: Vec<String>,
    /// Consecutive unparseable replies tolerated before giving up.
    pub extraction_retry_limit: usize,
    pub history_path: Option<PathBuf>,
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            history_window: DEFAULT_HISTORY_WINDOW,
            page_char_limit: PAGE_SNAPSHOT_MAX_CHARS,
            poll_interval: Duration::from_secs(5),
            suspend_timeout: Duration::from_secs(300),
            anomaly_markers: DEFAULT_ANOMALY_MARKERS.iter().map(|m| m.to_string()).collect(),
            extraction_retry_limit: 3,
            history_path: None,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }
}
