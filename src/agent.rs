//! The plan, extract, execute, observe loop.

use tracing::{debug, info, warn};

use crate::brain::Planner;
use crate::config::AgentConfig;
use crate::conversation::ConversationState;
use crate::error::{AgentError, ExecutionError, ExtractionError, PersistError, Result};
use crate::executor::{BrowserDriver, ExecutionReport, Executor};
use crate::extract::extract_task_record;
use crate::interrupt::{InterruptMonitor, MonitorState, Suspension};
use crate::types::TaskRecord;

/// Whether the loop should go around again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Done,
}

/// Counters for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: usize,
    pub execution_failures: usize,
    pub extraction_failures: usize,
    pub interrupts: usize,
}

pub struct Agent<P, B> {
    planner: P,
    browser: B,
    monitor: InterruptMonitor,
    config: AgentConfig,
    extraction_streak: usize,
    summary: RunSummary,
}

impl<P: Planner, B: BrowserDriver> Agent<P, B> {
    pub fn new(
        planner: P,
        browser: B,
        config: AgentConfig,
    ) -> std::result::Result<Self, regex::Error> {
        let monitor = InterruptMonitor::new(
            &config.anomaly_markers,
            config.poll_interval,
            config.suspend_timeout,
        )?;
        Ok(Self {
            planner,
            browser,
            monitor,
            config,
            extraction_streak: 0,
            summary: RunSummary::default(),
        })
    }

    pub fn planner(&self) -> &P {
        &self.planner
    }

    pub fn browser(&self) -> &B {
        &self.browser
    }

    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }

    /// Step until the LLM reports `DONE`. There is no iteration cap.
    pub async fn run(
        &mut self,
        mut state: ConversationState,
    ) -> Result<(ConversationState, RunSummary)> {
        while !state.is_done() {
            let (next, _) = self.step(state).await?;
            state = next;
        }
        info!(
            "[Agent] done after {} iteration(s): {}",
            self.summary.iterations, state.task_record.task
        );
        Ok((state, self.summary.clone()))
    }

    /// One pass through the loop. Takes the conversation and hands it back
    /// updated.
    pub async fn step(
        &mut self,
        mut state: ConversationState,
    ) -> Result<(ConversationState, Flow)> {
        self.summary.iterations += 1;
        info!("[Agent] iteration {}: planning", self.summary.iterations);

        let raw = self.planner.plan(&state).await?;
        state.append_assistant(raw.clone());

        let record = match extract_task_record(&raw) {
            Ok((strategy, record)) => {
                debug!("[Agent] task record found via {:?}", strategy);
                self.extraction_streak = 0;
                record
            }
            Err(e) => {
                self.summary.extraction_failures += 1;
                self.extraction_streak += 1;
                warn!(
                    "[Agent] could not read a task record ({} in a row): {}",
                    self.extraction_streak, e
                );
                if self.extraction_streak >= self.config.extraction_retry_limit {
                    self.persist(&state)?;
                    return Err(AgentError::Extraction {
                        attempts: self.extraction_streak,
                        source: e,
                    });
                }
                state.append_user(extraction_feedback(&e));
                self.persist(&state)?;
                return Ok((state, Flow::Continue));
            }
        };

        info!("[Agent] task: {}", record.task);
        if !record.content.is_empty() && !record.is_done() {
            info!("[Agent] content: {}", record.content);
        }
        state.task_record = record;

        let outcome = Executor::new(&self.browser)
            .execute(&state.task_record.code)
            .await;
        match outcome {
            Ok(report) => {
                if !state.is_done() {
                    state.append_user(step_feedback(&state.task_record, &report));
                }
            }
            Err(e) => {
                self.summary.execution_failures += 1;
                warn!("[Agent] execution failed: {}", e);
                state.append_user(execution_feedback(&e));
            }
        }

        let page = self.observe().await?;
        state.set_current_page(page, self.config.page_char_limit);
        self.persist(&state)?;

        let flow = if state.is_done() {
            Flow::Done
        } else {
            Flow::Continue
        };
        Ok((state, flow))
    }

    /// Fresh page source, after waiting out any challenge widget.
    async fn observe(&mut self) -> Result<String> {
        let page = self
            .browser
            .page_source()
            .await
            .map_err(AgentError::Browser)?;

        if self.monitor.observe(&page) != MonitorState::Suspended {
            return Ok(page);
        }

        self.summary.interrupts += 1;
        let outcome = self
            .monitor
            .wait_until_clear(&self.browser)
            .await
            .map_err(AgentError::Browser)?;
        if let Suspension::TimedOut(_) = outcome {
            warn!("[Agent] continuing with a page that may still show a challenge");
        }
        Ok(outcome.into_snapshot())
    }

    fn persist(&self, state: &ConversationState) -> Result<()> {
        if let Some(path) = &self.config.history_path {
            state.persist(path)?;
            debug!("[Agent] history saved to {}", path.display());
        }
        Ok(())
    }
}

/// Load any saved history, fill in default instructions, and add the goal.
pub fn start_conversation(
    config: &AgentConfig,
    goal: Option<&str>,
) -> std::result::Result<ConversationState, PersistError> {
    let mut state = match &config.history_path {
        Some(path) => ConversationState::restore(path)?,
        None => ConversationState::new(None),
    };
    if !state.messages().is_empty() {
        info!("[Agent] resumed {} message(s) from history", state.messages().len());
    }
    if state.system_prompt().is_none() {
        state.set_system_prompt(config.system_prompt.clone());
    }
    if let Some(goal) = goal {
        state.append_user(goal);
    }
    Ok(state)
}

fn step_feedback(record: &TaskRecord, report: &ExecutionReport) -> String {
    let mut message = if report.executed.is_empty() {
        format!("Nothing was executed for task: {}", record.task)
    } else {
        format!("Task completed: {}", record.task)
    };
    for ext in &report.extractions {
        message.push_str(&format!("\n\nExtracted [{}]: {}", ext.selector, ext.text));
    }
    message.push_str("\n\nThe current page is in your instructions. What is the next task?");
    message
}

fn execution_feedback(err: &ExecutionError) -> String {
    format!(
        "An error occurred during code execution: {err}. Fix the statement and try again."
    )
}

fn extraction_feedback(err: &ExtractionError) -> String {
    format!(
        "Your last reply could not be read ({err}). Reply with exactly one JSON object \
         with string fields \"task\", \"code\" and \"content\", and nothing else."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::types::Extraction;

    #[test]
    fn step_feedback_lists_extractions() {
        let record = TaskRecord {
            task: "read the price".into(),
            code: "extract_text(\".price\")".into(),
            content: String::new(),
        };
        let report = ExecutionReport {
            executed: vec![Action::ExtractText {
                selector: ".price".into(),
            }],
            extractions: vec![Extraction {
                selector: ".price".into(),
                text: "$499".into(),
            }],
        };
        let message = step_feedback(&record, &report);
        assert!(message.starts_with("Task completed: read the price"));
        assert!(message.contains("Extracted [.price]: $499"));
    }

    #[test]
    fn extraction_feedback_names_the_problem() {
        let message = extraction_feedback(&ExtractionError::MissingKey("code"));
        assert!(message.contains("missing key `code`"));
        assert!(message.contains("\"task\", \"code\" and \"content\""));
    }

    #[test]
    fn start_conversation_uses_defaults_and_goal() {
        let config = AgentConfig::default();
        let state = start_conversation(&config, Some("find a red couch")).unwrap();
        assert_eq!(state.system_prompt(), Some(config.system_prompt.as_str()));
        assert_eq!(state.messages().len(), 1);
        assert_eq!(state.messages()[0].content, "find a red couch");
    }

    #[test]
    fn start_conversation_resumes_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let mut saved = ConversationState::new(Some("custom".into()));
        saved.append_user("earlier goal");
        saved.append_assistant("{}");
        saved.persist(&path).unwrap();

        let config = AgentConfig {
            history_path: Some(path),
            ..AgentConfig::default()
        };
        let state = start_conversation(&config, None).unwrap();
        assert_eq!(state.system_prompt(), Some("custom"));
        assert_eq!(state.messages().len(), 2);
    }
}
