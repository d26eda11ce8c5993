//! Skill manager — registration, lazy activation, and tool routing.
//!
//! The single point of access for all skills. Tools map back to their
//! owning skill (last registration wins, with a warning); activation
//! happens exactly once, on first tool use.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use serde_json::Value;

use crate::core::types::{ArgMap, ToolResult, ToolSpec};
use crate::core::{ArcError, Kernel};

use super::skill::Skill;

#[derive(Default)]
struct Tables {
    skills: HashMap<String, Arc<dyn Skill>>,
    tool_to_skill: HashMap<String, String>,
    initialized: HashSet<String>,
}

pub struct SkillManager {
    kernel: Arc<Kernel>,
    tables: std::sync::RwLock<Tables>,
    /// Guarded by an async mutex so activation can await while still
    /// happening exactly once per skill.
    activated: tokio::sync::Mutex<HashSet<String>>,
}

impl SkillManager {
    pub fn new(kernel: Arc<Kernel>) -> Self {
        Self {
            kernel,
            tables: std::sync::RwLock::new(Tables::default()),
            activated: tokio::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Register a skill: capture its manifest, map its tools, call
    /// `initialize`. Activation stays lazy.
    pub async fn register(&self, skill: Arc<dyn Skill>, config: Value) -> Result<(), ArcError> {
        let manifest = skill.manifest();
        let name = manifest.name.clone();

        {
            let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
            if tables.skills.contains_key(&name) {
                log::warn!("skill '{name}' already registered, replacing");
            }
            for tool in &manifest.tools {
                if let Some(other) = tables.tool_to_skill.get(&tool.name) {
                    if other != &name {
                        log::warn!(
                            "tool '{}' already registered by '{other}', now owned by '{name}'",
                            tool.name
                        );
                    }
                }
                tables.tool_to_skill.insert(tool.name.clone(), name.clone());
            }
            tables.skills.insert(name.clone(), Arc::clone(&skill));
        }

        skill.initialize(Arc::clone(&self.kernel), config).await?;
        self.tables
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .initialized
            .insert(name.clone());

        log::debug!("registered skill '{name}' with {} tools", manifest.tools.len());
        Ok(())
    }

    /// Execute a tool by name: find the owning skill, activate it if
    /// needed, run the tool. Failures come back as failure
    /// [`ToolResult`]s — this never returns an error to the loop.
    pub async fn execute_tool(&self, tool_name: &str, arguments: &ArgMap) -> ToolResult {
        let (skill, skill_name) = {
            let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
            let Some(skill_name) = tables.tool_to_skill.get(tool_name).cloned() else {
                let mut known: Vec<&str> = tables.tool_to_skill.keys().map(String::as_str).collect();
                known.sort_unstable();
                return ToolResult::err(format!(
                    "Unknown tool: {tool_name}. Available: [{}]",
                    known.join(", ")
                ));
            };
            match tables.skills.get(&skill_name) {
                Some(skill) => (Arc::clone(skill), skill_name),
                None => return ToolResult::err(format!("Skill '{skill_name}' not found")),
            }
        };

        if let Err(e) = self.ensure_activated(&skill_name, &skill).await {
            return ToolResult::err(format!("Tool execution failed: {e}"));
        }

        match skill.execute_tool(tool_name, arguments).await {
            Ok(result) => result,
            Err(e) => ToolResult::err(format!("Tool execution failed: {e}")),
        }
    }

    /// Activate a skill exactly once. The check-then-insert is atomic
    /// under the async mutex, so concurrent first calls still produce a
    /// single `activate()`.
    async fn ensure_activated(&self, name: &str, skill: &Arc<dyn Skill>) -> Result<(), ArcError> {
        let mut activated = self.activated.lock().await;
        if !activated.contains(name) {
            log::debug!("activating skill '{name}'");
            skill.activate().await?;
            activated.insert(name.to_string());
        }
        Ok(())
    }

    /// All tool specifications from all registered skills.
    pub fn get_all_tool_specs(&self) -> Vec<ToolSpec> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut specs = Vec::new();
        for skill in tables.skills.values() {
            specs.extend(skill.manifest().tools);
        }
        specs
    }

    /// Which skill owns a tool.
    pub fn get_tool_skill(&self, tool_name: &str) -> Option<String> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .tool_to_skill
            .get(tool_name)
            .cloned()
    }

    pub fn get_skill(&self, name: &str) -> Option<Arc<dyn Skill>> {
        self.tables
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .skills
            .get(name)
            .cloned()
    }

    pub fn skill_names(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = tables.skills.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn tool_names(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = tables.tool_to_skill.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub async fn is_activated(&self, name: &str) -> bool {
        self.activated.lock().await.contains(name)
    }

    /// Shut down every **activated** skill; untouched skills are left
    /// alone. Clears the activation set.
    pub async fn shutdown_all(&self) {
        let names: Vec<String> = {
            let mut activated = self.activated.lock().await;
            activated.drain().collect()
        };
        for name in names {
            if let Some(skill) = self.get_skill(&name) {
                skill.shutdown().await;
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArcConfig;
    use crate::core::types::SkillManifest;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSkill {
        name: String,
        activations: AtomicUsize,
        shutdowns: AtomicUsize,
    }

    impl CountingSkill {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                activations: AtomicUsize::new(0),
                shutdowns: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Skill for CountingSkill {
        fn manifest(&self) -> SkillManifest {
            SkillManifest {
                name: self.name.clone(),
                version: "1.0.0".into(),
                description: "counts lifecycle calls".into(),
                capabilities: Default::default(),
                tools: vec![ToolSpec {
                    name: format!("{}_tool", self.name),
                    description: "test tool".into(),
                    parameters: json!({"type": "object"}),
                    required_capabilities: Default::default(),
                }],
            }
        }

        async fn activate(&self) -> Result<(), ArcError> {
            self.activations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn execute_tool(&self, _tool: &str, _args: &ArgMap) -> Result<ToolResult, ArcError> {
            Ok(ToolResult::ok("done"))
        }

        async fn shutdown(&self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FailingSkill;

    #[async_trait]
    impl Skill for FailingSkill {
        fn manifest(&self) -> SkillManifest {
            SkillManifest {
                name: "failing".into(),
                version: "1.0.0".into(),
                description: "always errors".into(),
                capabilities: Default::default(),
                tools: vec![ToolSpec {
                    name: "explode".into(),
                    description: "fails".into(),
                    parameters: json!({"type": "object"}),
                    required_capabilities: Default::default(),
                }],
            }
        }

        async fn execute_tool(&self, _tool: &str, _args: &ArgMap) -> Result<ToolResult, ArcError> {
            Err(ArcError::Skill("kaboom".into()))
        }
    }

    fn manager() -> SkillManager {
        SkillManager::new(Kernel::new(ArcConfig::default()))
    }

    #[tokio::test]
    async fn unknown_tool_lists_known_tools() {
        let m = manager();
        m.register(CountingSkill::new("alpha"), json!({})).await.unwrap();

        let result = m.execute_tool("nope", &ArgMap::new()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("alpha_tool"));
    }

    #[tokio::test]
    async fn activation_happens_exactly_once() {
        let m = manager();
        let skill = CountingSkill::new("alpha");
        m.register(Arc::clone(&skill) as Arc<dyn Skill>, json!({})).await.unwrap();

        for _ in 0..3 {
            let result = m.execute_tool("alpha_tool", &ArgMap::new()).await;
            assert!(result.success);
        }
        assert_eq!(skill.activations.load(Ordering::SeqCst), 1);
        assert!(m.is_activated("alpha").await);
    }

    #[tokio::test]
    async fn skill_errors_become_failure_results() {
        let m = manager();
        m.register(Arc::new(FailingSkill), json!({})).await.unwrap();

        let result = m.execute_tool("explode", &ArgMap::new()).await;
        assert!(!result.success);
        assert!(result.error.as_deref().unwrap_or("").contains("kaboom"));
    }

    #[tokio::test]
    async fn shutdown_only_touches_activated_skills() {
        let m = manager();
        let used = CountingSkill::new("used");
        let untouched = CountingSkill::new("untouched");
        m.register(Arc::clone(&used) as Arc<dyn Skill>, json!({})).await.unwrap();
        m.register(Arc::clone(&untouched) as Arc<dyn Skill>, json!({})).await.unwrap();

        m.execute_tool("used_tool", &ArgMap::new()).await;
        m.shutdown_all().await;

        assert_eq!(used.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(untouched.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn last_registration_wins_for_tools() {
        struct SameTool(&'static str);

        #[async_trait]
        impl Skill for SameTool {
            fn manifest(&self) -> SkillManifest {
                SkillManifest {
                    name: self.0.into(),
                    version: "1.0.0".into(),
                    description: String::new(),
                    capabilities: Default::default(),
                    tools: vec![ToolSpec {
                        name: "shared".into(),
                        description: String::new(),
                        parameters: json!({"type": "object"}),
                        required_capabilities: Default::default(),
                    }],
                }
            }
            async fn execute_tool(&self, _t: &str, _a: &ArgMap) -> Result<ToolResult, ArcError> {
                Ok(ToolResult::ok(self.0))
            }
        }

        let m = manager();
        m.register(Arc::new(SameTool("first")), json!({})).await.unwrap();
        m.register(Arc::new(SameTool("second")), json!({})).await.unwrap();

        assert_eq!(m.get_tool_skill("shared").as_deref(), Some("second"));
        let result = m.execute_tool("shared", &ArgMap::new()).await;
        assert_eq!(result.output, "second");
    }

    #[tokio::test]
    async fn tool_specs_aggregate_across_skills() {
        let m = manager();
        m.register(CountingSkill::new("a"), json!({})).await.unwrap();
        m.register(CountingSkill::new("b"), json!({})).await.unwrap();
        let specs = m.get_all_tool_specs();
        assert_eq!(specs.len(), 2);
    }
}
