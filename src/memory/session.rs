//! Session memory — the conversation transcript for one session.

use crate::core::types::{Message, ToolCall, ToolResult};

/// Holds conversation history for a single session.
#[derive(Default)]
pub struct SessionMemory {
    messages: Vec<Message>,
    system_prompt: String,
}

impl SessionMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the system prompt (called once at start).
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn add_user_message(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn add_assistant_message(&mut self, content: Option<String>, tool_calls: Option<Vec<ToolCall>>) {
        self.messages.push(Message::assistant(content, tool_calls));
    }

    pub fn add_tool_result(&mut self, result: &ToolResult, tool_name: &str) {
        let content = if result.success {
            result.output.clone()
        } else {
            format!("Error: {}", result.error.clone().unwrap_or_default())
        };
        self.messages
            .push(Message::tool_result(result.tool_call_id.clone(), content, tool_name));
    }

    /// All messages, optionally with the system prompt prepended.
    pub fn get_messages(&self, include_system: bool) -> Vec<Message> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if include_system && !self.system_prompt.is_empty() {
            out.push(Message::system(self.system_prompt.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }

    /// The last `n` non-system messages.
    pub fn recent_messages(&self, n: usize) -> Vec<Message> {
        let start = self.messages.len().saturating_sub(n);
        self.messages[start..].to_vec()
    }

    /// Clear all messages but keep the system prompt.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_prepended_once() {
        let mut m = SessionMemory::new();
        m.set_system_prompt("Be helpful.");
        m.add_user_message("hi");

        let all = m.get_messages(true);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].role, "system");

        let without = m.get_messages(false);
        assert_eq!(without.len(), 1);
        assert_eq!(without[0].role, "user");
    }

    #[test]
    fn tool_failure_is_prefixed_as_error() {
        let mut m = SessionMemory::new();
        let mut result = ToolResult::err("no such file");
        result.tool_call_id = "tc_9".into();
        m.add_tool_result(&result, "read_file");

        let msgs = m.get_messages(false);
        assert_eq!(msgs[0].role, "tool");
        assert!(msgs[0].content.as_deref().unwrap_or("").starts_with("Error:"));
        assert_eq!(msgs[0].tool_call_id.as_deref(), Some("tc_9"));
    }

    #[test]
    fn clear_keeps_system_prompt() {
        let mut m = SessionMemory::new();
        m.set_system_prompt("p");
        m.add_user_message("hi");
        m.clear();
        assert_eq!(m.message_count(), 0);
        assert_eq!(m.get_messages(true).len(), 1);
    }

    #[test]
    fn recent_messages_takes_the_tail() {
        let mut m = SessionMemory::new();
        for i in 0..5 {
            m.add_user_message(format!("msg {i}"));
        }
        let recent = m.recent_messages(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].content.as_deref(), Some("msg 4"));
    }
}
