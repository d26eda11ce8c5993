//! Security engine — capability checks with interactive approval.
//!
//! Per required capability, four ordered layers:
//! 1. never-allow (immediate denial, no override)
//! 2. remembered session decisions (`allow_always` / `deny_always`)
//! 3. auto-allow
//! 4. always-ask (requires approval) — unknown capabilities behave the
//!    same way.
//!
//! A tool's capability set is evaluated in order; the first denial or
//! approval-required decision short-circuits. If everything passes, the
//! last allow decision is returned so flags like `remembered` survive.

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use crate::config::schema::SecuritySection;
use crate::core::types::{ApprovalResponse, ArgMap, Capability, SecurityDecision, ToolSpec};

use super::approval::ApprovalFlow;

pub struct SecurityEngine {
    auto_allow: HashSet<String>,
    always_ask: HashSet<String>,
    never_allow: HashSet<String>,
    /// `(tool_name, capability)` → sticky user decision.
    remembered: Mutex<HashMap<(String, String), ApprovalResponse>>,
    /// Interactive engines carry the approval flow; permissive engines
    /// (background agents) cannot — the combination of a permissive
    /// policy with an interactive prompt channel is unrepresentable.
    approval: Option<Arc<ApprovalFlow>>,
    permissive: bool,
}

impl SecurityEngine {
    /// Interactive engine: policy from config, approvals routed through
    /// `approval`.
    pub fn new(config: &SecuritySection, approval: Arc<ApprovalFlow>) -> Self {
        Self {
            auto_allow: config.auto_allow.iter().cloned().collect(),
            always_ask: config.always_ask.iter().cloned().collect(),
            never_allow: config.never_allow.iter().cloned().collect(),
            remembered: Mutex::new(HashMap::new()),
            approval: Some(approval),
            permissive: false,
        }
    }

    /// Engine for background agents: every capability is auto-allowed
    /// and there is no interactive prompt channel.
    pub fn permissive() -> Self {
        Self {
            auto_allow: HashSet::new(),
            always_ask: HashSet::new(),
            never_allow: HashSet::new(),
            remembered: Mutex::new(HashMap::new()),
            approval: None,
            permissive: true,
        }
    }

    pub fn is_permissive(&self) -> bool {
        self.permissive
    }

    // ── Policy check ─────────────────────────────────────────────────────────

    /// Evaluate the policy layers for every required capability.
    pub fn check_tool(&self, spec: &ToolSpec) -> SecurityDecision {
        if self.permissive {
            return SecurityDecision::allow("policy:permissive");
        }
        if spec.required_capabilities.is_empty() {
            return SecurityDecision::allow("no capabilities required");
        }

        let mut last_allow: Option<SecurityDecision> = None;
        for capability in &spec.required_capabilities {
            let decision = self.check_capability(&spec.name, *capability);
            if !decision.allowed || decision.requires_approval {
                return decision;
            }
            last_allow = Some(decision);
        }
        last_allow.unwrap_or_else(|| SecurityDecision::allow("policy:all_allowed"))
    }

    fn check_capability(&self, tool_name: &str, capability: Capability) -> SecurityDecision {
        let cap = capability.as_str();

        if self.never_allow.contains(cap) {
            log::info!("blocked {tool_name}: {cap} in never_allow");
            return SecurityDecision::deny(format!("policy:never_allow ({cap})"));
        }

        // User decisions take precedence over auto_allow.
        let key = (tool_name.to_string(), cap.to_string());
        let remembered = self
            .remembered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&key)
            .copied();
        match remembered {
            Some(ApprovalResponse::AllowAlways) => {
                let mut d = SecurityDecision::allow(format!("user:remembered_allow ({cap})"));
                d.remembered = true;
                return d;
            }
            Some(ApprovalResponse::DenyAlways) => {
                let mut d = SecurityDecision::deny(format!("user:remembered_deny ({cap})"));
                d.remembered = true;
                return d;
            }
            _ => {}
        }

        if self.auto_allow.contains(cap) {
            return SecurityDecision::allow(format!("policy:auto_allow ({cap})"));
        }

        if self.always_ask.contains(cap) {
            return SecurityDecision::needs_approval(format!("policy:always_ask ({cap})"));
        }

        // Unlisted capability: same as always-ask.
        SecurityDecision::needs_approval(format!("policy:unknown_capability ({cap})"))
    }

    // ── Check + interactive approval ─────────────────────────────────────────

    /// Run the policy check and, when approval is required, round-trip
    /// through the interactive platform. Sticky responses are
    /// remembered for **every** capability the tool declares.
    pub async fn check_and_approve(&self, spec: &ToolSpec, arguments: &ArgMap) -> SecurityDecision {
        let decision = self.check_tool(spec);
        if !decision.requires_approval {
            return decision;
        }

        let Some(flow) = &self.approval else {
            return SecurityDecision::deny("policy:no_approval_channel");
        };

        let resolved = flow.request_approval(spec, arguments).await;

        if let Some(response) = resolved.user_response {
            if response.is_sticky() {
                for capability in &spec.required_capabilities {
                    self.remember_decision(&spec.name, *capability, response);
                }
            }
        }
        resolved
    }

    /// Remember a sticky decision for `(tool, capability)`.
    pub fn remember_decision(&self, tool_name: &str, capability: Capability, response: ApprovalResponse) {
        if !response.is_sticky() {
            return;
        }
        self.remembered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((tool_name.to_string(), capability.as_str().to_string()), response);
        log::debug!("remembered {} for {tool_name}/{capability}", response.as_str());
    }

    pub fn clear_remembered(&self) {
        self.remembered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Snapshot of remembered decisions (backs the `/perms` command).
    pub fn remembered_decisions(&self) -> Vec<(String, String, ApprovalResponse)> {
        self.remembered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|((tool, cap), resp)| (tool.clone(), cap.clone(), *resp))
            .collect()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
