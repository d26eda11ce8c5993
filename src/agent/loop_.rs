//! `AgentLoop` — the think → act → observe cycle.
//!
//! Each turn:
//! 1. COMPOSE — build messages from session memory + retrieved memories
//! 2. THINK — stream from the LLM, pushing text chunks to the caller
//! 3. ACT — execute tool calls sequentially, gated by the security engine
//! 4. OBSERVE — tool results land in memory; repeat until done or the
//!    iteration bound, then run one final completion without tools.
//!
//! Every event an agent emits carries its `agent_id` as `source`; the
//! interactive display filters on `"main"`.

use std::{collections::HashSet, sync::Arc};

use serde_json::json;
use tokio::sync::mpsc;

use crate::core::types::{
    AgentState, AgentStatus, LlmChunk, Message, StopReason, ToolCall, ToolResult,
};
use crate::core::{event_type, ArcError, Event, Kernel};
use crate::llm::{GenerateRequest, LlmProvider};
use crate::memory::{ContextComposer, MemoryManager, SessionMemory};
use crate::security::SecurityEngine;
use crate::skills::SkillManager;

use futures::StreamExt;

/// Streaming side-channel: text chunks are pushed here as they arrive.
pub type ChunkSink = mpsc::UnboundedSender<String>;

const MAX_ITERATIONS_NUDGE: &str = "You have used the maximum number of tool calls. \
     Do NOT call any more tools. \
     Based solely on the information you have gathered in this conversation, \
     provide your best complete answer to the original question right now.";

// ─── AgentLoopConfig ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct AgentLoopConfig {
    pub max_iterations: u32,
    pub temperature: f32,
    pub recent_window: usize,
    /// Skill names whose tools are hidden from the LLM for this agent.
    /// Sub-agents use this so they cannot schedule jobs or delegate
    /// further work.
    pub excluded_skills: HashSet<String>,
    /// `"main"` for the interactive agent; `"worker:<label>"` or
    /// `"scheduler:<name>"` for background agents.
    pub agent_id: String,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 25,
            temperature: 0.7,
            recent_window: 20,
            excluded_skills: HashSet::new(),
            agent_id: "main".to_string(),
        }
    }
}

// ─── AgentLoop ───────────────────────────────────────────────────────────────

pub struct AgentLoop {
    kernel: Arc<Kernel>,
    llm: Arc<dyn LlmProvider>,
    skills: Arc<SkillManager>,
    security: Arc<SecurityEngine>,
    config: AgentLoopConfig,
    memory: SessionMemory,
    memory_manager: Option<Arc<dyn MemoryManager>>,
    composer: ContextComposer,
    state: AgentState,
}

impl AgentLoop {
    pub fn new(
        kernel: Arc<Kernel>,
        llm: Arc<dyn LlmProvider>,
        skills: Arc<SkillManager>,
        security: Arc<SecurityEngine>,
        system_prompt: &str,
        config: AgentLoopConfig,
        memory_manager: Option<Arc<dyn MemoryManager>>,
    ) -> Self {
        let info = llm.model_info();
        let composer = ContextComposer::new(info.context_window, info.max_output_tokens);
        let mut memory = SessionMemory::new();
        memory.set_system_prompt(system_prompt);
        let state = AgentState::new(config.agent_id.clone());

        Self {
            kernel,
            llm,
            skills,
            security,
            config,
            memory,
            memory_manager,
            composer,
            state,
        }
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn memory(&self) -> &SessionMemory {
        &self.memory
    }

    /// Reset for a new conversation.
    pub fn reset(&mut self) {
        self.memory.clear();
        self.state = AgentState::new(self.config.agent_id.clone());
    }

    // ── Main entry point ─────────────────────────────────────────────────────

    /// Process one user turn, streaming text chunks into `sink` as they
    /// arrive. Returns the full streamed text.
    ///
    /// LLM errors propagate to the caller after an `agent:error` event;
    /// tool failures do not — they flow back to the model as failure
    /// results.
    #[tracing::instrument(
        name = "agent.run",
        skip_all,
        fields(agent_id = %self.config.agent_id, input_len = user_input.len())
    )]
    pub async fn run(&mut self, user_input: &str, sink: &ChunkSink) -> Result<String, ArcError> {
        self.memory.add_user_message(user_input);
        self.state.status = AgentStatus::Composing;
        self.state.iteration = 0;
        let mut streamed = String::new();

        self.emit(event_type::AGENT_START, json!({ "input": user_input })).await;

        let result = self.run_inner(user_input, sink, &mut streamed).await;
        if let Err(e) = &result {
            self.state.status = AgentStatus::Error;
            self.emit(event_type::AGENT_ERROR, json!({ "error": e.to_string() })).await;
        }
        result?;
        Ok(streamed)
    }

    async fn run_inner(
        &mut self,
        user_input: &str,
        sink: &ChunkSink,
        streamed: &mut String,
    ) -> Result<(), ArcError> {
        while self.state.iteration < self.config.max_iterations {
            self.state.iteration += 1;
            self.emit(event_type::AGENT_THINKING, json!({ "iteration": self.state.iteration }))
                .await;

            // 1. COMPOSE
            let memory_sections = self.retrieve_memory_sections(user_input).await;
            let context = self.compose(&memory_sections);

            // 2. THINK
            self.state.status = AgentStatus::Thinking;
            let tool_specs = self.visible_tool_specs();
            let tools = if tool_specs.is_empty() { None } else { Some(tool_specs) };

            let request = GenerateRequest::new(context)
                .with_tools(tools)
                .with_temperature(self.config.temperature);
            let mut stream = self.llm.generate(request).await?;

            let mut collected_text = String::new();
            let mut collected_calls: Vec<ToolCall> = Vec::new();
            let mut stop_reason: Option<StopReason> = None;
            let mut input_tokens = 0u64;
            let mut output_tokens = 0u64;

            while let Some(chunk) = stream.next().await {
                let chunk: LlmChunk = chunk?;
                if !chunk.text.is_empty() {
                    collected_text.push_str(&chunk.text);
                    streamed.push_str(&chunk.text);
                    let _ = sink.send(chunk.text);
                }
                if !chunk.tool_calls.is_empty() {
                    collected_calls.extend(chunk.tool_calls);
                }
                if let Some(reason) = chunk.stop_reason {
                    stop_reason = Some(reason);
                    input_tokens = chunk.input_tokens;
                    output_tokens = chunk.output_tokens;
                }
            }

            self.record_usage(input_tokens, output_tokens);
            self.emit(
                event_type::LLM_RESPONSE,
                json!({
                    "input_tokens": input_tokens,
                    "output_tokens": output_tokens,
                    "stop_reason": stop_reason.map(|r| serde_json::to_value(r).unwrap_or_default()),
                    "has_tool_calls": !collected_calls.is_empty(),
                }),
            )
            .await;

            // 3. Done?
            if stop_reason == Some(StopReason::Complete) || collected_calls.is_empty() {
                self.memory.add_assistant_message(Some(collected_text.clone()), None);
                self.state.status = AgentStatus::Complete;
                self.fire_memory_tasks(user_input, &collected_text);
                self.emit(event_type::AGENT_COMPLETE, json!({ "iterations": self.state.iteration }))
                    .await;
                return Ok(());
            }

            // 4. ACT — sequentially, in producer order.
            self.state.status = AgentStatus::Acting;
            let content = if collected_text.is_empty() { None } else { Some(collected_text) };
            self.memory.add_assistant_message(content, Some(collected_calls.clone()));

            for call in collected_calls {
                let name = call.name.clone();
                let result = self.execute_tool_with_approval(call).await;
                self.memory.add_tool_result(&result, &name);
            }
        }

        // Iteration bound reached — one final completion with no tools.
        streamed.push_str("\n\n");
        let _ = sink.send("\n\n".to_string());
        let synthesis = self.synthesise_on_limit(sink, streamed).await?;
        self.fire_memory_tasks(user_input, &synthesis);
        self.state.status = AgentStatus::Complete;
        self.emit(
            event_type::AGENT_COMPLETE,
            json!({ "iterations": self.state.iteration, "reason": "max_iterations" }),
        )
        .await;
        Ok(())
    }

    /// Final completion when `max_iterations` is exhausted: a user-role
    /// nudge and no tools, forcing a text answer from what was
    /// gathered.
    async fn synthesise_on_limit(
        &mut self,
        sink: &ChunkSink,
        streamed: &mut String,
    ) -> Result<String, ArcError> {
        let mut context = self.compose(&[]);
        context.push(Message::user(MAX_ITERATIONS_NUDGE));

        let request = GenerateRequest::new(context).with_temperature(self.config.temperature);
        let mut stream = self.llm.generate(request).await?;

        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if !chunk.text.is_empty() {
                text.push_str(&chunk.text);
                streamed.push_str(&chunk.text);
                let _ = sink.send(chunk.text);
            }
            if chunk.stop_reason.is_some() {
                self.record_usage(chunk.input_tokens, chunk.output_tokens);
            }
        }
        self.memory.add_assistant_message(Some(text.clone()), None);
        Ok(text)
    }

    // ── Tool execution ───────────────────────────────────────────────────────

    async fn execute_tool_with_approval(&mut self, call: ToolCall) -> ToolResult {
        let spec = self
            .skills
            .get_all_tool_specs()
            .into_iter()
            .find(|t| t.name == call.name);
        let Some(spec) = spec else {
            let mut result = ToolResult::err(format!("Unknown tool: {}", call.name));
            result.tool_call_id = call.id;
            return result;
        };

        self.state.status = AgentStatus::WaitingApproval;
        let decision = self.security.check_and_approve(&spec, &call.arguments).await;
        self.state.status = AgentStatus::Acting;

        if !decision.allowed {
            self.emit(
                event_type::SECURITY_DENIED,
                json!({ "tool": call.name, "reason": decision.reason }),
            )
            .await;
            let mut result = ToolResult::err(format!("Permission denied: {}", decision.reason));
            result.tool_call_id = call.id;
            return result;
        }

        self.emit(
            event_type::SKILL_TOOL_CALL,
            json!({ "tool": call.name, "arguments": call.arguments }),
        )
        .await;

        let started = std::time::Instant::now();
        let mut result = self.skills.execute_tool(&call.name, &call.arguments).await;
        result.tool_call_id = call.id;
        result.duration_ms = started.elapsed().as_millis() as u64;

        let preview: String = result.output.chars().take(200).collect();
        self.emit(
            event_type::SKILL_TOOL_RESULT,
            json!({ "tool": call.name, "success": result.success, "output_preview": preview }),
        )
        .await;

        result
    }

    // ── Context helpers ──────────────────────────────────────────────────────

    fn visible_tool_specs(&self) -> Vec<crate::core::types::ToolSpec> {
        let excluded = &self.config.excluded_skills;
        let all = self.skills.get_all_tool_specs();
        if excluded.is_empty() {
            return all;
        }
        all.into_iter()
            .filter(|spec| {
                self.skills
                    .get_tool_skill(&spec.name)
                    .map(|owner| !excluded.contains(&owner))
                    .unwrap_or(true)
            })
            .collect()
    }

    /// Retrieved long-term memory, rendered as system prompt sections:
    /// core facts first, episodic matches second.
    async fn retrieve_memory_sections(&self, query: &str) -> Vec<String> {
        let Some(mm) = &self.memory_manager else {
            return Vec::new();
        };
        let entries = match mm.retrieve(query, 5).await {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!("memory retrieval failed: {e}");
                return Vec::new();
            }
        };
        if entries.is_empty() {
            return Vec::new();
        }

        let mut sections = Vec::new();
        let facts: Vec<&str> = entries
            .iter()
            .filter(|e| e.entry_type == "fact")
            .map(|e| e.content.as_str())
            .collect();
        if !facts.is_empty() {
            sections.push(format!(
                "Known facts:\n{}",
                facts.iter().map(|f| format!("- {f}")).collect::<Vec<_>>().join("\n")
            ));
        }
        let episodes: Vec<&str> = entries
            .iter()
            .filter(|e| e.entry_type == "episode")
            .map(|e| e.content.as_str())
            .collect();
        if !episodes.is_empty() {
            sections.push(format!(
                "Relevant past conversations:\n{}",
                episodes.iter().map(|e| format!("- {e}")).collect::<Vec<_>>().join("\n")
            ));
        }
        sections
    }

    fn compose(&self, system_extra: &[String]) -> Vec<Message> {
        let llm = Arc::clone(&self.llm);
        let counter = move |messages: &[Message]| llm.count_tokens(messages);
        self.composer
            .compose(&self.memory, self.config.recent_window, system_extra, &counter)
            .messages
    }

    // ── Background memory tasks ──────────────────────────────────────────────

    /// Fire-and-forget long-term memory writes; the turn never waits on
    /// them.
    fn fire_memory_tasks(&self, user_input: &str, assistant_text: &str) {
        let Some(mm) = &self.memory_manager else {
            return;
        };
        let session_id = self.config.agent_id.clone();
        let user = user_input.to_string();
        let assistant = assistant_text.to_string();
        let store_mm = Arc::clone(mm);
        tokio::spawn(async move {
            if let Err(e) = store_mm.store_turn(&user, &assistant, &session_id).await {
                log::warn!("store_turn failed: {e}");
            }
        });

        if mm.should_distill() {
            let recent = self.memory.recent_messages(self.config.recent_window);
            let distill_mm = Arc::clone(mm);
            let llm = Arc::clone(&self.llm);
            tokio::spawn(async move {
                if let Err(e) = distill_mm.distill(&recent, llm).await {
                    log::warn!("distillation failed: {e}");
                }
            });
        }
    }

    // ── Bookkeeping ──────────────────────────────────────────────────────────

    fn record_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.state.tokens_used += input_tokens + output_tokens;
        let info = self.llm.model_info();
        self.state.cost_so_far += input_tokens as f64 * info.cost_per_input_token
            + output_tokens as f64 * info.cost_per_output_token;
    }

    async fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.kernel
            .emit(Event::new(event_type, self.config.agent_id.clone()).with_data(data))
            .await;
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArcConfig;
    use crate::core::types::{ArgMap, SkillManifest, ToolSpec};
    use crate::llm::MockProvider;
    use crate::skills::Skill;
    use async_trait::async_trait;
    use serde_json::json;

    struct GreetSkill;

    #[async_trait]
    impl Skill for GreetSkill {
        fn manifest(&self) -> SkillManifest {
            SkillManifest {
                name: "greeter".into(),
                version: "1.0.0".into(),
                description: "greets people".into(),
                capabilities: Default::default(),
                tools: vec![ToolSpec {
                    name: "greet".into(),
                    description: "Greet someone by name".into(),
                    parameters: json!({"type": "object", "properties": {"name": {"type": "string"}}}),
                    required_capabilities: Default::default(),
                }],
            }
        }

        async fn execute_tool(&self, _tool: &str, args: &ArgMap) -> Result<ToolResult, ArcError> {
            let name = args.get("name").and_then(serde_json::Value::as_str).unwrap_or("there");
            Ok(ToolResult::ok(format!("Hello, {name}!")))
        }
    }

    async fn harness(mock: Arc<MockProvider>, max_iterations: u32) -> AgentLoop {
        let kernel = Kernel::new(ArcConfig::default());
        let skills = Arc::new(SkillManager::new(Arc::clone(&kernel)));
        skills.register(Arc::new(GreetSkill), json!({})).await.unwrap();
        let security = Arc::new(SecurityEngine::permissive());
        AgentLoop::new(
            kernel,
            mock,
            skills,
            security,
            "You are a test agent.",
            AgentLoopConfig {
                max_iterations,
                ..Default::default()
            },
            None,
        )
    }

    fn sink() -> (ChunkSink, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn simple_completion_streams_and_stores() {
        let mock = Arc::new(MockProvider::new());
        mock.set_response("Hello");
        let mut agent = harness(Arc::clone(&mock), 25).await;

        let (tx, mut rx) = sink();
        let out = agent.run("hi", &tx).await.unwrap();
        assert_eq!(out, "Hello");
        assert_eq!(rx.recv().await.unwrap(), "Hello");

        let messages = agent.memory().get_messages(false);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].role, "assistant");
        assert_eq!(messages[1].content.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn tool_loop_round_trip() {
        let mock = Arc::new(MockProvider::new());
        let mut args = ArgMap::new();
        args.insert("name".into(), json!("World"));
        mock.set_tool_call("greet", args);
        mock.set_response("I greeted World!");

        let mut agent = harness(Arc::clone(&mock), 25).await;
        let (tx, _rx) = sink();
        let out = agent.run("please greet World", &tx).await.unwrap();
        assert_eq!(out, "I greeted World!");

        let messages = agent.memory().get_messages(false);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "assistant"]);
        assert_eq!(messages[2].content.as_deref(), Some("Hello, World!"));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_becomes_failure_result() {
        let mock = Arc::new(MockProvider::new());
        mock.set_tool_call("nonexistent", ArgMap::new());
        mock.set_response("That tool is missing.");

        let mut agent = harness(mock, 25).await;
        let (tx, _rx) = sink();
        agent.run("use the missing tool", &tx).await.unwrap();

        let messages = agent.memory().get_messages(false);
        let tool_msg = messages.iter().find(|m| m.role == "tool").unwrap();
        assert!(tool_msg.content.as_deref().unwrap_or("").contains("Unknown tool"));
    }

    #[tokio::test]
    async fn max_iterations_triggers_synthesis_without_tools() {
        let mock = Arc::new(MockProvider::new());
        for _ in 0..5 {
            let mut args = ArgMap::new();
            args.insert("name".into(), json!("loop"));
            mock.set_tool_call("greet", args);
        }
        mock.set_response("Best answer from gathered context.");

        let mut agent = harness(Arc::clone(&mock), 5).await;
        let (tx, _rx) = sink();
        let out = agent.run("loop forever", &tx).await.unwrap();
        assert!(out.contains("Best answer"));

        // The synthesis call carries no tools and the nudge as the last
        // user message.
        assert!(mock.last_tools().is_none());
        let last = mock.last_messages();
        let nudge = last.iter().rev().find(|m| m.role == "user").unwrap();
        assert!(nudge.content.as_deref().unwrap_or("").contains("maximum number of tool calls"));
    }

    #[tokio::test]
    async fn llm_error_emits_agent_error_and_propagates() {
        let mock = Arc::new(MockProvider::new());
        mock.fail_when_empty("Cannot connect — is the LLM server running?");
        let mut agent = harness(mock, 25).await;

        let errors = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let errors_h = Arc::clone(&errors);
        agent.kernel.on(event_type::AGENT_ERROR, move |_| {
            let e = Arc::clone(&errors_h);
            async move {
                e.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            }
        });

        let (tx, _rx) = sink();
        let result = agent.run("hi", &tx).await;
        assert!(result.is_err());
        assert_eq!(errors.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn emits_lifecycle_events_in_order() {
        let mock = Arc::new(MockProvider::new());
        mock.set_response("Hello");
        let mut agent = harness(mock, 25).await;

        let seen = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let seen_h = Arc::clone(&seen);
        agent.kernel.on("*", move |e| {
            let seen = Arc::clone(&seen_h);
            async move {
                seen.lock().unwrap().push(e.event_type);
                Ok(())
            }
        });

        let (tx, _rx) = sink();
        agent.run("hi", &tx).await.unwrap();

        let events = seen.lock().unwrap().clone();
        assert_eq!(
            events,
            vec!["agent:start", "agent:thinking", "llm:response", "agent:complete"]
        );
    }

    #[tokio::test]
    async fn excluded_skills_hide_tools_from_the_llm() {
        let mock = Arc::new(MockProvider::new());
        mock.set_response("no tools needed");
        let kernel = Kernel::new(ArcConfig::default());
        let skills = Arc::new(SkillManager::new(Arc::clone(&kernel)));
        skills.register(Arc::new(GreetSkill), json!({})).await.unwrap();

        let mut agent = AgentLoop::new(
            kernel,
            Arc::clone(&mock) as Arc<dyn LlmProvider>,
            skills,
            Arc::new(SecurityEngine::permissive()),
            "sys",
            AgentLoopConfig {
                excluded_skills: ["greeter".to_string()].into_iter().collect(),
                ..Default::default()
            },
            None,
        );

        let (tx, _rx) = sink();
        agent.run("hi", &tx).await.unwrap();
        assert!(mock.last_tools().is_none());
    }

    #[tokio::test]
    async fn events_carry_agent_id_as_source() {
        let mock = Arc::new(MockProvider::new());
        mock.set_response("ok");
        let kernel = Kernel::new(ArcConfig::default());
        let skills = Arc::new(SkillManager::new(Arc::clone(&kernel)));

        let sources = Arc::new(std::sync::Mutex::new(Vec::<String>::new()));
        let sources_h = Arc::clone(&sources);
        kernel.on("agent:*", move |e| {
            let s = Arc::clone(&sources_h);
            async move {
                s.lock().unwrap().push(e.source);
                Ok(())
            }
        });

        let mut agent = AgentLoop::new(
            kernel,
            mock,
            skills,
            Arc::new(SecurityEngine::permissive()),
            "sys",
            AgentLoopConfig {
                agent_id: "worker:research".into(),
                ..Default::default()
            },
            None,
        );
        let (tx, _rx) = sink();
        agent.run("hi", &tx).await.unwrap();

        assert!(sources.lock().unwrap().iter().all(|s| s == "worker:research"));
    }
}
