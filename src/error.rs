use crate::actions::ActionParseError;

/// The LLM call failed. Not retried; aborts the run.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("response contained no text segment")]
    EmptyResponse,
}

/// The LLM reply did not contain a usable task record.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("no object found")]
    NoObject,

    #[error("invalid JSON: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("missing key `{0}`")]
    MissingKey(&'static str),

    #[error("invalid task record: {0}")]
    Schema(#[source] serde_json::Error),
}

/// Why a single statement failed.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    #[error(transparent)]
    Parse(#[from] ActionParseError),

    #[error("{0:#}")]
    Driver(anyhow::Error),
}

/// A statement in the `code` batch failed. Recovered by telling the LLM.
#[derive(Debug, thiserror::Error)]
#[error("line {line}: `{statement}`: {reason}")]
pub struct ExecutionError {
    pub line: usize,
    pub statement: String,
    #[source]
    pub reason: FailureReason,
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("planner failed: {0}")]
    Planner(#[from] PlannerError),

    #[error("gave up after {attempts} unparseable replies: {source}")]
    Extraction {
        attempts: usize,
        #[source]
        source: ExtractionError,
    },

    #[error("could not observe page: {0:#}")]
    Browser(anyhow::Error),

    #[error("could not save history: {0}")]
    Persist(#[from] PersistError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
