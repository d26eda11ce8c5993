//! The identity file (`identity.md`) — the agent's persona.
//!
//! Free-text markdown holding the agent name, user name, personality
//! preset and a learned-facts section. Edits take effect on the next
//! session; the file is the single source of truth for the system
//! prompt's opening.

use std::path::{Path, PathBuf};

use crate::core::ArcError;

use super::personality::get_personality;

const IDENTITY_TEMPLATE: &str = "# {agent_name}'s Soul\n\n\
## Identity\n\
name: {agent_name}\n\
created: {created}\n\
personality: {personality}\n\n\
## My Human\n\
user_name: {user_name}\n\n\
## How I Behave\n\
{personality_description}\n\n\
## Things I've Learned About {user_name}\n\
(This section grows as we interact)\n\n\
---\n\
*Edit this file to customize my personality. Changes take effect on the next session.*\n";

/// Parsed identity.
#[derive(Debug, Clone)]
pub struct Identity {
    pub agent_name: String,
    pub user_name: String,
    pub personality_id: String,
    pub system_prompt: String,
}

pub struct SoulManager {
    path: PathBuf,
}

impl SoulManager {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create a fresh identity file from the template.
    pub fn create(&self, agent_name: &str, user_name: &str, personality_id: &str) -> Result<(), ArcError> {
        let personality = get_personality(personality_id);
        let content = IDENTITY_TEMPLATE
            .replace("{agent_name}", agent_name)
            .replace("{user_name}", user_name)
            .replace("{personality}", personality.id)
            .replace("{personality_description}", personality.system_prompt)
            .replace("{created}", &chrono::Local::now().format("%Y-%m-%d").to_string());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, content)?;
        log::info!("created identity at {}", self.path.display());
        Ok(())
    }

    /// Load and parse the identity. A missing file yields the default
    /// identity rather than an error.
    pub fn load(&self) -> Identity {
        let Ok(content) = std::fs::read_to_string(&self.path) else {
            return default_identity();
        };
        parse_identity(&content)
    }
}

fn default_identity() -> Identity {
    let personality = get_personality("helpful");
    Identity {
        agent_name: "Arc".to_string(),
        user_name: "User".to_string(),
        personality_id: personality.id.to_string(),
        system_prompt: build_system_prompt("Arc", "User", personality.system_prompt),
    }
}

fn parse_identity(content: &str) -> Identity {
    let mut agent_name = "Arc".to_string();
    let mut user_name = "User".to_string();
    let mut personality_id = "helpful".to_string();

    let mut section = String::new();
    for line in content.lines() {
        let stripped = line.trim();
        if let Some(heading) = stripped.strip_prefix("## ") {
            section = heading.to_ascii_lowercase();
            continue;
        }
        if stripped.starts_with('#') {
            continue;
        }
        let Some((key, value)) = stripped.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase().replace(' ', "_");
        let value = value.trim();
        match key.as_str() {
            "name" if section == "identity" => agent_name = value.to_string(),
            "user_name" => user_name = value.to_string(),
            "personality" => personality_id = value.to_string(),
            _ => {}
        }
    }

    let personality = get_personality(&personality_id);
    Identity {
        system_prompt: build_system_prompt(&agent_name, &user_name, personality.system_prompt),
        agent_name,
        user_name,
        personality_id: personality.id.to_string(),
    }
}

fn build_system_prompt(agent_name: &str, user_name: &str, personality_prompt: &str) -> String {
    format!("Your name is {agent_name}.\nYou are talking to {user_name}.\n\n{personality_prompt}")
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let soul = SoulManager::new(Path::new("/nonexistent/identity.md"));
        assert!(!soul.exists());
        let identity = soul.load();
        assert_eq!(identity.agent_name, "Arc");
        assert!(identity.system_prompt.contains("Your name is Arc."));
    }

    #[test]
    fn create_then_load_round_trips() {
        let dir = tempfile::TempDir::new().unwrap();
        let soul = SoulManager::new(&dir.path().join("identity.md"));
        soul.create("Friday", "Alex", "sarcastic").unwrap();
        assert!(soul.exists());

        let identity = soul.load();
        assert_eq!(identity.agent_name, "Friday");
        assert_eq!(identity.user_name, "Alex");
        assert_eq!(identity.personality_id, "sarcastic");
        assert!(identity.system_prompt.contains("You are talking to Alex."));
        assert!(identity.system_prompt.contains("sarcastic but helpful"));
    }

    #[test]
    fn unknown_personality_falls_back() {
        let identity = parse_identity(
            "# X's Soul\n\n## Identity\nname: X\npersonality: galactic\n\n## My Human\nuser_name: Sam\n",
        );
        assert_eq!(identity.personality_id, "helpful");
        assert_eq!(identity.user_name, "Sam");
    }

    #[test]
    fn name_outside_identity_section_is_ignored() {
        let identity = parse_identity("## Notes\nname: Wrong\n\n## Identity\nname: Right\n");
        assert_eq!(identity.agent_name, "Right");
    }
}
