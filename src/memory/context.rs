//! Context composition — builds the message list for each LLM call
//! under a token budget.
//!
//! When the full transcript does not fit `max_tokens - reserve_output`,
//! messages are truncated from the **front** of the non-system list,
//! shrinking a window counter down from `recent_window` until the
//! transcript fits. The system message is never dropped; in the worst
//! case the composed context is the system prompt alone.

use crate::core::types::Message;

use super::session::SessionMemory;

/// The assembled working context for one LLM call.
#[derive(Debug)]
pub struct ComposedContext {
    pub messages: Vec<Message>,
    pub token_count: usize,
    pub token_budget: usize,
    /// How many non-system messages were dropped.
    pub truncated: usize,
}

pub struct ContextComposer {
    max_tokens: usize,
    reserve_output: usize,
}

impl ContextComposer {
    pub fn new(max_tokens: usize, reserve_output: usize) -> Self {
        Self {
            max_tokens,
            reserve_output,
        }
    }

    /// Tokens available for input context.
    pub fn token_budget(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserve_output)
    }

    /// Compose the context from session memory.
    ///
    /// `system_extra` holds retrieved memory sections appended to the
    /// system prompt verbatim (core facts first, then episodic); they
    /// count against the budget but are part of the inviolable system
    /// message.
    pub fn compose(
        &self,
        session: &SessionMemory,
        recent_window: usize,
        system_extra: &[String],
        count_tokens: &dyn Fn(&[Message]) -> usize,
    ) -> ComposedContext {
        let system_msgs = self.system_messages(session, system_extra);
        let other_msgs = session.get_messages(false);

        // Fast path: everything fits.
        let mut full: Vec<Message> = system_msgs.clone();
        full.extend(other_msgs.iter().cloned());
        let token_count = count_tokens(&full);
        if token_count <= self.token_budget() {
            return ComposedContext {
                messages: full,
                token_count,
                token_budget: self.token_budget(),
                truncated: 0,
            };
        }

        // Shrink the recent window until the transcript fits.
        let mut window = recent_window.min(other_msgs.len());
        while window > 0 {
            let mut candidate = system_msgs.clone();
            candidate.extend(other_msgs[other_msgs.len() - window..].iter().cloned());
            let tokens = count_tokens(&candidate);
            if tokens <= self.token_budget() {
                return ComposedContext {
                    messages: candidate,
                    token_count: tokens,
                    token_budget: self.token_budget(),
                    truncated: other_msgs.len() - window,
                };
            }
            window -= 1;
        }

        // Worst case: only the system prompt.
        let tokens = count_tokens(&system_msgs);
        ComposedContext {
            messages: system_msgs,
            token_count: tokens,
            token_budget: self.token_budget(),
            truncated: other_msgs.len(),
        }
    }

    fn system_messages(&self, session: &SessionMemory, system_extra: &[String]) -> Vec<Message> {
        let mut prompt = session.system_prompt().to_string();
        for section in system_extra {
            if !section.is_empty() {
                prompt.push_str("\n\n");
                prompt.push_str(section);
            }
        }
        if prompt.is_empty() {
            Vec::new()
        } else {
            vec![Message::system(prompt)]
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
