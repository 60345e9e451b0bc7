//! Drives a browser toward a natural-language goal: ask the LLM for the next
//! step, run it, look at the page, repeat until it says `DONE`.

pub mod actions;
pub mod agent;
pub mod brain;
pub mod config;
pub mod conversation;
pub mod error;
pub mod executor;
pub mod extract;
pub mod interrupt;
pub mod types;

pub use actions::{Action, ActionParseError};
pub use agent::{Agent, Flow, RunSummary, start_conversation};
pub use brain::{Brain, Planner};
pub use config::AgentConfig;
pub use conversation::ConversationState;
pub use error::{AgentError, ExecutionError, ExtractionError, PersistError, PlannerError};
pub use executor::{BrowserDriver, ExecutionReport, Executor};
pub use extract::{Strategy, extract_task_record};
pub use interrupt::{InterruptMonitor, MonitorState, Suspension};
pub use types::{Extraction, Message, Role, TaskRecord};
