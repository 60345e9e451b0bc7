//! Pauses the loop while a challenge widget (reCAPTCHA, hCaptcha) is on the
//! page, giving a human time to solve it.

use regex::Regex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::executor::BrowserDriver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Normal,
    Suspended,
}

/// How a suspension ended. Both variants carry the latest page source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Suspension {
    Cleared(String),
    TimedOut(String),
}

impl Suspension {
    pub fn into_snapshot(self) -> String {
        match self {
            Suspension::Cleared(page) | Suspension::TimedOut(page) => page,
        }
    }
}

pub struct InterruptMonitor {
    markers: Vec<(String, Regex)>,
    poll_interval: Duration,
    timeout: Duration,
    state: MonitorState,
}

impl InterruptMonitor {
    /// `markers` are fragments matched against the `src` of iframes on the page.
    pub fn new<S: AsRef<str>>(
        markers: &[S],
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self, regex::Error> {
        let markers = markers
            .iter()
            .map(|m| {
                let marker = m.as_ref().to_string();
                let pattern = format!(
                    r#"(?is)<iframe\b[^>]*\bsrc\s*=\s*["'][^"']*{}"#,
                    regex::escape(&marker)
                );
                Regex::new(&pattern).map(|re| (marker, re))
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            markers,
            poll_interval,
            timeout,
            state: MonitorState::Normal,
        })
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// The first marker present in `snapshot`, if any.
    pub fn detect(&self, snapshot: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|(_, re)| re.is_match(snapshot))
            .map(|(name, _)| name.as_str())
    }

    /// Inspect a fresh snapshot; suspends if a challenge is present.
    pub fn observe(&mut self, snapshot: &str) -> MonitorState {
        if let Some(marker) = self.detect(snapshot) {
            info!(
                "[Interrupt] {} challenge detected, please solve it manually (waiting up to {}s)",
                marker,
                self.timeout.as_secs()
            );
            self.state = MonitorState::Suspended;
        }
        self.state
    }

    /// Poll the page until the challenge is gone or the timeout elapses.
    /// Always leaves the monitor in `Normal`.
    pub async fn wait_until_clear<B: BrowserDriver + ?Sized>(
        &mut self,
        browser: &B,
    ) -> anyhow::Result<Suspension> {
        let started = Instant::now();
        let mut snapshot = String::new();

        while started.elapsed() < self.timeout {
            let remaining = self.timeout.saturating_sub(started.elapsed());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
            snapshot = browser.page_source().await?;
            if self.detect(&snapshot).is_none() {
                info!("[Interrupt] challenge solved or disappeared");
                self.state = MonitorState::Normal;
                return Ok(Suspension::Cleared(snapshot));
            }
        }

        warn!("[Interrupt] timed out waiting for the challenge to be solved");
        if snapshot.is_empty() {
            snapshot = browser.page_source().await?;
        }
        self.state = MonitorState::Normal;
        Ok(Suspension::TimedOut(snapshot))
    }
}
