use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::conversation::truncate_chars;
use crate::error::{ExecutionError, FailureReason};
use crate::types::{EXTRACTION_MAX_CHARS, Extraction};

/// The browser session the agent drives. One active tab, one caller.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    async fn type_into(&self, selector: &str, text: &str) -> Result<()>;
    async fn press_key(&self, key: &str) -> Result<()>;
    async fn extract_text(&self, selector: &str) -> Result<String>;
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Serialized HTML of the current page.
    async fn page_source(&self) -> Result<String>;
}

/// What a successful batch did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExecutionReport {
    pub executed: Vec<Action>,
    pub extractions: Vec<Extraction>,
}

/// Runs the statements of a task record against the browser.
pub struct Executor<'a, B: ?Sized> {
    browser: &'a B,
}

impl<'a, B: BrowserDriver + ?Sized> Executor<'a, B> {
    pub fn new(browser: &'a B) -> Self {
        Self { browser }
    }

    /// Run each non-empty line in order, stopping at the first failure.
    pub async fn execute(&self, code: &str) -> Result<ExecutionReport, ExecutionError> {
        let mut report = ExecutionReport::default();

        for (idx, line) in code.lines().enumerate() {
            let statement = line.trim();
            if statement.is_empty() {
                continue;
            }
            let fail = |reason: FailureReason| ExecutionError {
                line: idx + 1,
                statement: statement.to_string(),
                reason,
            };

            let action = Action::parse(statement).map_err(|e| fail(e.into()))?;
            info!("[Executor] {}", action);

            match self.run(&action).await {
                Ok(Some(extraction)) => report.extractions.push(extraction),
                Ok(None) => {}
                Err(e) => {
                    warn!("[Executor] {} failed: {:#}", action.name(), e);
                    return Err(fail(FailureReason::Driver(e)));
                }
            }
            report.executed.push(action);
        }

        debug!("[Executor] ran {} statement(s)", report.executed.len());
        Ok(report)
    }

    async fn run(&self, action: &Action) -> Result<Option<Extraction>> {
        match action {
            Action::Navigate { url } => self.browser.navigate(url).await?,
            Action::Click { selector } => self.browser.click(selector).await?,
            Action::TypeInto { selector, text } => self.browser.type_into(selector, text).await?,
            Action::PressKey { key } => self.browser.press_key(key).await?,
            Action::ExtractText { selector } => {
                let text = self.browser.extract_text(selector).await?;
                return Ok(Some(Extraction {
                    selector: selector.clone(),
                    text: truncate_chars(text, EXTRACTION_MAX_CHARS),
                }));
            }
            Action::Wait { duration } => tokio::time::sleep(*duration).await,
            Action::WaitFor { selector, timeout } => {
                self.browser.wait_for(selector, *timeout).await?
            }
        }
        Ok(None)
    }
}
