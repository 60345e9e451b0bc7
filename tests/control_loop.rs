use anyhow::bail;
use async_trait::async_trait;
use browser_pilot::{
    Agent, AgentConfig, AgentError, BrowserDriver, ConversationState, Flow, Message, Planner,
    PlannerError, Role, start_conversation,
};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const CLEAN_PAGE: &str = "<html><body><h1>Search</h1></body></html>";
const CAPTCHA_PAGE: &str =
    r#"<html><body><iframe src="https://www.google.com/recaptcha/api2/anchor"></iframe></body></html>"#;

fn reply(task: &str, code: &str, content: &str) -> String {
    serde_json::json!({"task": task, "code": code, "content": content}).to_string()
}

fn done() -> String {
    format!("All finished.\n```json\n{}\n```", reply("", "", "DONE"))
}

enum Scripted {
    Reply(String),
    Fail,
}

/// Hands out canned replies and remembers what each call saw.
struct ScriptedPlanner {
    replies: Mutex<VecDeque<Scripted>>,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedPlanner {
    fn new(replies: Vec<Scripted>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn replying(replies: Vec<String>) -> Self {
        Self::new(replies.into_iter().map(Scripted::Reply).collect())
    }

    fn calls(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Planner for ScriptedPlanner {
    async fn plan(&self, conversation: &ConversationState) -> Result<String, PlannerError> {
        self.seen
            .lock()
            .unwrap()
            .push(conversation.messages().to_vec());
        match self.replies.lock().unwrap().pop_front() {
            Some(Scripted::Reply(text)) => Ok(text),
            Some(Scripted::Fail) => Err(PlannerError::Api {
                status: 429,
                message: "rate limited".into(),
            }),
            None => panic!("planner called after the script ran out"),
        }
    }
}

#[derive(Default)]
struct FakeBrowser {
    calls: Mutex<Vec<String>>,
    missing_selector: Option<&'static str>,
    pages: Mutex<VecDeque<&'static str>>,
}

impl FakeBrowser {
    fn with_pages(pages: &[&'static str]) -> Self {
        Self {
            pages: Mutex::new(pages.iter().copied().collect()),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeBrowser {
    async fn navigate(&self, url: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("navigate {url}"));
        Ok(())
    }
    async fn click(&self, selector: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("click {selector}"));
        if self.missing_selector == Some(selector) {
            bail!("no element matches {selector}");
        }
        Ok(())
    }
    async fn type_into(&self, selector: &str, text: &str) -> anyhow::Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("type {selector} {text}"));
        Ok(())
    }
    async fn press_key(&self, key: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("key {key}"));
        Ok(())
    }
    async fn extract_text(&self, selector: &str) -> anyhow::Result<String> {
        self.calls.lock().unwrap().push(format!("extract {selector}"));
        Ok("Red Couch $499".into())
    }
    async fn wait_for(&self, selector: &str, _timeout: Duration) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("wait_for {selector}"));
        Ok(())
    }
    async fn page_source(&self) -> anyhow::Result<String> {
        let page = self.pages.lock().unwrap().pop_front().unwrap_or(CLEAN_PAGE);
        Ok(page.to_string())
    }
}

fn test_config() -> AgentConfig {
    AgentConfig {
        poll_interval: Duration::from_millis(1),
        suspend_timeout: Duration::from_millis(500),
        ..AgentConfig::default()
    }
}

fn goal_state() -> ConversationState {
    start_conversation(&test_config(), Some("search for a red couch")).unwrap()
}

#[tokio::test]
async fn stops_on_the_first_done() {
    let planner = ScriptedPlanner::replying(vec![
        reply("open google", "navigate(\"https://www.google.com\")", ""),
        reply(
            "search",
            "type_into(\"textarea[name=q]\", \"red couch\")\npress_key(\"Enter\")",
            "",
        ),
        done(),
        reply("never", "navigate(\"https://example.com\")", ""),
    ]);
    let mut agent = Agent::new(planner, FakeBrowser::default(), test_config()).unwrap();

    let (state, summary) = agent.run(goal_state()).await.unwrap();

    assert!(state.is_done());
    assert_eq!(summary.iterations, 3);
    assert_eq!(agent.planner().calls().len(), 3);
    assert_eq!(
        agent.browser().calls(),
        vec![
            "navigate https://www.google.com",
            "type textarea[name=q] red couch",
            "key Enter"
        ]
    );
}

#[tokio::test]
async fn each_plan_after_the_first_starts_from_a_user_turn() {
    let planner = ScriptedPlanner::replying(vec![
        reply("read price", "extract_text(\".price\")", ""),
        done(),
    ]);
    let mut agent = Agent::new(planner, FakeBrowser::default(), test_config()).unwrap();
    agent.run(goal_state()).await.unwrap();

    let calls = agent.planner().calls();
    let second = calls[1].last().unwrap();
    assert_eq!(second.role, Role::User);
    assert!(second.content.contains("Task completed: read price"));
    assert!(second.content.contains("Extracted [.price]: Red Couch $499"));
}

#[tokio::test]
async fn execution_failure_is_fed_back_and_the_loop_continues() {
    let planner = ScriptedPlanner::replying(vec![
        reply(
            "click the result",
            "click(\"#missing\")\npress_key(\"Enter\")",
            "",
        ),
        reply("try another link", "click(\"a.result\")", ""),
        done(),
    ]);
    let browser = FakeBrowser {
        missing_selector: Some("#missing"),
        ..Default::default()
    };
    let mut agent = Agent::new(planner, browser, test_config()).unwrap();

    let (state, summary) = agent.run(goal_state()).await.unwrap();

    assert!(state.is_done());
    assert_eq!(summary.execution_failures, 1);
    // The rest of the failed batch was skipped and never retried.
    assert_eq!(
        agent.browser().calls(),
        vec!["click #missing", "click a.result"]
    );

    let calls = agent.planner().calls();
    let feedback = calls[1].last().unwrap();
    assert_eq!(feedback.role, Role::User);
    assert!(feedback.content.contains("An error occurred during code execution"));
    assert!(feedback.content.contains("no element matches #missing"));
}

#[tokio::test]
async fn unsupported_statement_is_reported_like_a_failure() {
    let planner = ScriptedPlanner::replying(vec![
        reply("open", "driver.get(\"https://www.google.com\")", ""),
        done(),
    ]);
    let mut agent = Agent::new(planner, FakeBrowser::default(), test_config()).unwrap();

    let (_, summary) = agent.run(goal_state()).await.unwrap();

    assert_eq!(summary.execution_failures, 1);
    assert!(agent.browser().calls().is_empty());
    let calls = agent.planner().calls();
    assert!(calls[1].last().unwrap().content.contains("driver.get"));
}

#[tokio::test]
async fn unreadable_reply_asks_for_a_corrected_object() {
    let planner = ScriptedPlanner::replying(vec![
        "I'm sorry, I need a moment to think.".into(),
        r#"{"task":"a","content":""}"#.into(),
        done(),
    ]);
    let mut agent = Agent::new(planner, FakeBrowser::default(), test_config()).unwrap();

    let (state, summary) = agent.run(goal_state()).await.unwrap();

    assert!(state.is_done());
    assert_eq!(summary.extraction_failures, 2);
    let calls = agent.planner().calls();
    assert!(calls[1].last().unwrap().content.contains("no object found"));
    assert!(calls[2].last().unwrap().content.contains("missing key `code`"));
}

#[tokio::test]
async fn too_many_unreadable_replies_abort() {
    let planner = ScriptedPlanner::replying(vec!["no".into(), "still no".into()]);
    let config = AgentConfig {
        extraction_retry_limit: 2,
        ..test_config()
    };
    let mut agent = Agent::new(planner, FakeBrowser::default(), config).unwrap();

    let err = agent.run(goal_state()).await.unwrap_err();
    assert!(matches!(err, AgentError::Extraction { attempts: 2, .. }));
}

#[tokio::test]
async fn good_reply_resets_the_unreadable_streak() {
    let planner = ScriptedPlanner::replying(vec![
        "no".into(),
        reply("open", "navigate(\"https://shop.example\")", ""),
        "still no".into(),
        done(),
    ]);
    let config = AgentConfig {
        extraction_retry_limit: 2,
        ..test_config()
    };
    let mut agent = Agent::new(planner, FakeBrowser::default(), config).unwrap();

    let (state, summary) = agent.run(goal_state()).await.unwrap();

    assert!(state.is_done());
    assert_eq!(summary.extraction_failures, 2);
    assert_eq!(agent.browser().calls(), vec!["navigate https://shop.example"]);
}

#[tokio::test]
async fn planner_failure_is_fatal() {
    let planner = ScriptedPlanner::new(vec![Scripted::Fail]);
    let mut agent = Agent::new(planner, FakeBrowser::default(), test_config()).unwrap();

    let err = agent.run(goal_state()).await.unwrap_err();
    assert!(matches!(
        err,
        AgentError::Planner(PlannerError::Api { status: 429, .. })
    ));
    assert!(agent.browser().calls().is_empty());
}

#[tokio::test]
async fn captcha_pauses_until_cleared() {
    let planner = ScriptedPlanner::replying(vec![
        reply("open", "navigate(\"https://shop.example\")", ""),
        done(),
    ]);
    let browser = FakeBrowser::with_pages(&[CAPTCHA_PAGE, CAPTCHA_PAGE, CLEAN_PAGE]);
    let mut agent = Agent::new(planner, browser, test_config()).unwrap();

    let state = goal_state();
    let (state, flow) = agent.step(state).await.unwrap();

    assert_eq!(flow, Flow::Continue);
    assert_eq!(agent.summary().interrupts, 1);
    assert_eq!(state.current_page(), CLEAN_PAGE);
    assert!(
        state
            .render_system_prompt()
            .unwrap()
            .ends_with(CLEAN_PAGE)
    );
}

#[tokio::test]
async fn captcha_timeout_keeps_going_with_the_stale_page() {
    let planner = ScriptedPlanner::replying(vec![reply("open", "", ""), done()]);
    let browser = FakeBrowser::with_pages(&[CAPTCHA_PAGE; 64]);
    let config = AgentConfig {
        suspend_timeout: Duration::from_millis(20),
        ..test_config()
    };
    let mut agent = Agent::new(planner, browser, config).unwrap();

    let (state, flow) = agent.step(goal_state()).await.unwrap();

    assert_eq!(flow, Flow::Continue);
    assert_eq!(agent.summary().interrupts, 1);
    assert_eq!(state.current_page(), CAPTCHA_PAGE);
}

#[tokio::test]
async fn page_snapshot_is_bounded() {
    let planner = ScriptedPlanner::replying(vec![done()]);
    let config = AgentConfig {
        page_char_limit: 12,
        ..test_config()
    };
    let mut agent = Agent::new(planner, FakeBrowser::default(), config).unwrap();

    let (state, flow) = agent.step(goal_state()).await.unwrap();

    assert_eq!(flow, Flow::Done);
    assert_eq!(state.current_page(), &CLEAN_PAGE[..12]);
}

#[tokio::test]
async fn history_is_rewritten_every_iteration() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    let config = AgentConfig {
        history_path: Some(path.clone()),
        ..test_config()
    };

    let planner = ScriptedPlanner::replying(vec![
        reply("open", "navigate(\"https://www.google.com\")", ""),
        done(),
    ]);
    let mut agent = Agent::new(planner, FakeBrowser::default(), config.clone()).unwrap();
    let state = start_conversation(&config, Some("search for a red couch")).unwrap();

    let (state, _) = agent.step(state).await.unwrap();
    let saved = ConversationState::restore(&path).unwrap();
    assert_eq!(saved.messages(), state.messages());

    let (state, _) = agent.run(state).await.unwrap();
    let saved = ConversationState::restore(&path).unwrap();
    assert_eq!(saved.messages(), state.messages());
    assert_eq!(saved.messages().last().unwrap().role, Role::Assistant);
    assert_eq!(saved.system_prompt(), Some(config.system_prompt.as_str()));
}
