mod dom;
mod hands;

use anyhow::{Result, anyhow, bail};
use browser_pilot::brain::{DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL};
use browser_pilot::types::{DEFAULT_HISTORY_WINDOW, PAGE_SNAPSHOT_MAX_CHARS};
use browser_pilot::{Agent, AgentConfig, Brain, start_conversation};
use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Drive Chrome toward a goal, one LLM-planned step at a time")]
#[command(version)]
struct Cli {
    /// What the agent should accomplish. Optional when resuming a history file.
    goal: Option<String>,

    #[arg(long, env = "PILOT_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    #[arg(long, env = "PILOT_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Most recent messages sent with each planning call
    #[arg(long, default_value_t = DEFAULT_HISTORY_WINDOW)]
    history_window: usize,

    /// Characters of page source kept as context
    #[arg(long, default_value_t = PAGE_SNAPSHOT_MAX_CHARS)]
    page_chars: usize,

    /// Conversation file, restored at start and rewritten every iteration
    #[arg(long, env = "PILOT_HISTORY", default_value = "history.json")]
    history: PathBuf,

    /// Don't read or write a history file
    #[arg(long)]
    no_history: bool,

    /// Seconds to wait for a human to solve a CAPTCHA
    #[arg(long, default_value_t = 300)]
    captcha_timeout: u64,

    /// Seconds between CAPTCHA checks
    #[arg(long, default_value_t = 5)]
    captcha_poll: u64,

    /// Consecutive unreadable LLM replies before giving up
    #[arg(long, default_value_t = 3)]
    extraction_retries: usize,

    /// Run Chrome without a window
    #[arg(long)]
    headless: bool,

    /// Attach to a running Chrome via its DevTools websocket URL
    #[arg(long, env = "PILOT_CHROME_WS")]
    attach: Option<String>,

    #[arg(long, env = "ANTHROPIC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Verbose output (-v for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            history_window: self.history_window,
            page_char_limit: self.page_chars,
            poll_interval: Duration::from_secs(self.captcha_poll),
            suspend_timeout: Duration::from_secs(self.captcha_timeout),
            extraction_retry_limit: self.extraction_retries,
            history_path: (!self.no_history).then(|| self.history.clone()),
            ..AgentConfig::default()
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else if verbose > 0 {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let api_key = std::env::var("ANTHROPIC_API_KEY").map_err(|_| {
        anyhow!(
            "ANTHROPIC_API_KEY not found in environment.\n\
             Create a .env file in the working directory with a line like:\n\
             ANTHROPIC_API_KEY=sk-... (no quotes)"
        )
    })?;

    let config = cli.agent_config();
    let state = start_conversation(&config, cli.goal.as_deref())?;
    if state.awaits_user_turn() {
        bail!("no goal given and the history has no open request to resume; pass a goal");
    }

    let brain = Brain::new(api_key)
        .with_model(&config.model)
        .with_max_tokens(config.max_tokens)
        .with_history_window(config.history_window)
        .with_base_url(&cli.base_url);

    info!("[Agent] launching Chrome...");
    let settings = hands::LaunchSettings {
        headless: cli.headless,
        attach: cli.attach.clone(),
    };
    let session = tokio::task::spawn_blocking(move || hands::BrowserSession::launch(&settings))
        .await
        .map_err(|e| anyhow!("Browser launch panicked: {}", e))??;

    let mut agent = Agent::new(brain, session, config)?;

    tokio::select! {
        result = agent.run(state) => {
            let (state, summary) = result?;
            info!(
                "[Agent] finished: {} iteration(s), {} execution error(s), {} unreadable replies, {} CAPTCHA pause(s)",
                summary.iterations,
                summary.execution_failures,
                summary.extraction_failures,
                summary.interrupts
            );
            if let Some(last) = state.messages().last() {
                info!("[Agent] last reply: {}", last.content);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("[Agent] interrupted; history holds the last completed iteration");
        }
    }

    Ok(())
}
