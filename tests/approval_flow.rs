//! End-to-end interactive approval: an agent turn that hits an
//! `always_ask` capability round-trips through the approval flow, and
//! sticky responses suppress later prompts.

use std::collections::BTreeSet;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use arc_agent::agent::{AgentLoop, AgentLoopConfig, ChunkSink};
use arc_agent::config::schema::SecuritySection;
use arc_agent::config::ArcConfig;
use arc_agent::core::types::{
    ApprovalResponse, ArgMap, Capability, SkillManifest, ToolResult, ToolSpec,
};
use arc_agent::core::{event_type, ArcError, Kernel};
use arc_agent::llm::{LlmProvider, MockProvider};
use arc_agent::security::{ApprovalFlow, SecurityEngine};
use arc_agent::skills::{Skill, SkillManager};

struct FileSkill;

#[async_trait]
impl Skill for FileSkill {
    fn manifest(&self) -> SkillManifest {
        let write_caps: BTreeSet<Capability> = [Capability::FileWrite].into_iter().collect();
        let read_caps: BTreeSet<Capability> = [Capability::FileRead].into_iter().collect();
        SkillManifest {
            name: "files".into(),
            version: "1.0.0".into(),
            description: "file access".into(),
            capabilities: write_caps.iter().chain(read_caps.iter()).copied().collect(),
            tools: vec![
                ToolSpec {
                    name: "write_file".into(),
                    description: "Write a file".into(),
                    parameters: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
                    required_capabilities: write_caps,
                },
                ToolSpec {
                    name: "read_file".into(),
                    description: "Read a file".into(),
                    parameters: json!({"type": "object", "properties": {"path": {"type": "string"}}}),
                    required_capabilities: read_caps,
                },
            ],
        }
    }

    async fn execute_tool(&self, tool: &str, _args: &ArgMap) -> Result<ToolResult, ArcError> {
        Ok(ToolResult::ok(format!("{tool}: ok")))
    }
}

struct Fixture {
    kernel: Arc<Kernel>,
    mock: Arc<MockProvider>,
    agent: AgentLoop,
    approval: Arc<ApprovalFlow>,
    approval_events: Arc<AtomicUsize>,
}

async fn fixture(approval_timeout: Duration) -> Fixture {
    let kernel = Kernel::new(ArcConfig::default());
    let skills = Arc::new(SkillManager::new(Arc::clone(&kernel)));
    skills.register(Arc::new(FileSkill), json!({})).await.unwrap();

    let section = SecuritySection {
        auto_allow: vec!["file:read".into()],
        always_ask: vec!["file:write".into()],
        never_allow: vec![],
        approval_timeout: approval_timeout.as_secs().max(1),
        workspace: ".".into(),
    };
    let approval = Arc::new(ApprovalFlow::with_timeout(Arc::clone(&kernel.bus), approval_timeout));
    let security = Arc::new(SecurityEngine::new(&section, Arc::clone(&approval)));

    let approval_events = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&approval_events);
    kernel.on(event_type::SECURITY_APPROVAL, move |_| {
        let counter = Arc::clone(&counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let mock = Arc::new(MockProvider::new());
    let agent = AgentLoop::new(
        Arc::clone(&kernel),
        Arc::clone(&mock) as Arc<dyn LlmProvider>,
        skills,
        security,
        "You are a test agent.",
        AgentLoopConfig::default(),
        None,
    );

    Fixture {
        kernel,
        mock,
        agent,
        approval,
        approval_events,
    }
}

fn write_call(mock: &MockProvider) {
    let mut args = ArgMap::new();
    args.insert("path".into(), json!("x.txt"));
    mock.set_tool_call("write_file", args);
}

fn sink() -> ChunkSink {
    tokio::sync::mpsc::unbounded_channel().0
}

#[tokio::test]
async fn allow_always_suppresses_later_prompts() {
    let mut f = fixture(Duration::from_secs(5)).await;

    // The "user": resolves every approval request with allow_always
    // after a short delay.
    let approval = Arc::clone(&f.approval);
    f.kernel.on(event_type::SECURITY_APPROVAL, move |event| {
        let approval = Arc::clone(&approval);
        async move {
            let id = event.data_str("request_id").unwrap_or_default().to_string();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                approval.resolve_approval(&id, ApprovalResponse::AllowAlways);
            });
            Ok(())
        }
    });

    // Turn 1: write_file triggers an approval prompt.
    write_call(&f.mock);
    f.mock.set_response("file written");
    let out = f.agent.run("write x.txt", &sink()).await.unwrap();
    assert_eq!(out, "file written");
    assert_eq!(f.approval_events.load(Ordering::SeqCst), 1);

    // Turn 2: the decision was remembered — no second approval event.
    write_call(&f.mock);
    f.mock.set_response("written again");
    f.agent.run("write x.txt again", &sink()).await.unwrap();
    assert_eq!(f.approval_events.load(Ordering::SeqCst), 1);

    // The tool actually executed both times.
    let tool_messages: Vec<_> = f
        .agent
        .memory()
        .get_messages(false)
        .into_iter()
        .filter(|m| m.role == "tool")
        .collect();
    assert_eq!(tool_messages.len(), 2);
    for m in tool_messages {
        assert!(m.content.as_deref().unwrap_or("").contains("ok"));
    }
}

#[tokio::test]
async fn unanswered_prompt_times_out_to_denial() {
    let mut f = fixture(Duration::from_millis(500)).await;

    // A resolver that sleeps past the timeout.
    let approval = Arc::clone(&f.approval);
    f.kernel.on(event_type::SECURITY_APPROVAL, move |event| {
        let approval = Arc::clone(&approval);
        async move {
            let id = event.data_str("request_id").unwrap_or_default().to_string();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(2)).await;
                approval.resolve_approval(&id, ApprovalResponse::AllowOnce);
            });
            Ok(())
        }
    });

    write_call(&f.mock);
    f.mock.set_response("moving on");
    f.agent.run("write please", &sink()).await.unwrap();

    let tool_msg = f
        .agent
        .memory()
        .get_messages(false)
        .into_iter()
        .find(|m| m.role == "tool")
        .expect("tool result in memory");
    let content = tool_msg.content.unwrap_or_default();
    assert!(content.contains("Permission denied"), "{content}");
    assert!(content.contains("timeout"), "{content}");
}

#[tokio::test]
async fn auto_allowed_reads_never_prompt() {
    let mut f = fixture(Duration::from_secs(5)).await;

    let mut args = ArgMap::new();
    args.insert("path".into(), json!("x.txt"));
    f.mock.set_tool_call("read_file", args);
    f.mock.set_response("contents shown");

    f.agent.run("read x.txt", &sink()).await.unwrap();
    assert_eq!(f.approval_events.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn denied_tool_flows_back_as_failure_result() {
    let mut f = fixture(Duration::from_secs(5)).await;

    let approval = Arc::clone(&f.approval);
    f.kernel.on(event_type::SECURITY_APPROVAL, move |event| {
        let approval = Arc::clone(&approval);
        async move {
            let id = event.data_str("request_id").unwrap_or_default().to_string();
            tokio::spawn(async move {
                approval.resolve_approval(&id, ApprovalResponse::Deny);
            });
            Ok(())
        }
    });

    write_call(&f.mock);
    f.mock.set_response("understood, not writing");
    let out = f.agent.run("write x.txt", &sink()).await.unwrap();
    assert_eq!(out, "understood, not writing");

    let tool_msg = f
        .agent
        .memory()
        .get_messages(false)
        .into_iter()
        .find(|m| m.role == "tool")
        .expect("tool result in memory");
    assert!(tool_msg.content.unwrap_or_default().contains("Permission denied"));
}
