//! Layered configuration loading.
//!
//! Precedence (lowest to highest):
//! 1. Defaults (hardcoded)
//! 2. User config (`~/.arc/config.toml`)
//! 3. Project config (`./arc.toml`)
//! 4. Environment variables (`ARC_*`)
//! 5. Explicit overrides (passed in code)
//!
//! `${VAR}` patterns inside string values are substituted from the
//! environment after merging.

use std::{env, path::Path};

use toml::Value;

use crate::core::ArcError;

use super::schema::ArcConfig;

/// Default user config path: `~/.arc/config.toml`.
pub fn default_user_config_path() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".arc")
        .join("config.toml")
}

/// Default project config path: `./arc.toml`.
pub fn default_project_config_path() -> std::path::PathBuf {
    std::path::PathBuf::from("arc.toml")
}

/// Load configuration from all sources and merge.
pub fn load(
    user_path: Option<&Path>,
    project_path: Option<&Path>,
    overrides: Option<Value>,
) -> Result<ArcConfig, ArcError> {
    let mut merged = Value::Table(toml::map::Map::new());

    let user = user_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_user_config_path);
    if user.exists() {
        deep_merge(&mut merged, load_toml(&user)?);
    }

    let project = project_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_project_config_path);
    if project.exists() {
        deep_merge(&mut merged, load_toml(&project)?);
    }

    deep_merge(&mut merged, env_layer());

    if let Some(o) = overrides {
        deep_merge(&mut merged, o);
    }

    substitute_env_vars(&mut merged);

    merged
        .try_into()
        .map_err(|e| ArcError::Config(format!("invalid configuration: {e}")))
}

/// Load from the default paths with no overrides.
pub fn load_default() -> Result<ArcConfig, ArcError> {
    load(None, None, None)
}

// ─── Layers ───────────────────────────────────────────────────────────────────

fn load_toml(path: &Path) -> Result<Value, ArcError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ArcError::Config(format!("failed to read {}: {e}", path.display())))?;
    content
        .parse::<Value>()
        .map_err(|e| ArcError::Config(format!("failed to parse {}: {e}", path.display())))
}

/// Build a config layer from `ARC_*` environment variables.
fn env_layer() -> Value {
    const MAPPING: &[(&str, &str, &str)] = &[
        ("ARC_LLM_PROVIDER", "llm", "default_provider"),
        ("ARC_LLM_MODEL", "llm", "default_model"),
        ("ARC_LLM_BASE_URL", "llm", "base_url"),
        ("ARC_LLM_API_KEY", "llm", "api_key"),
        ("ARC_AGENT_NAME", "agent", "name"),
        ("ARC_AGENT_MAX_ITERATIONS", "agent", "max_iterations"),
        ("ARC_AGENT_TEMPERATURE", "agent", "temperature"),
        ("ARC_SHELL_PROVIDER", "shell", "provider"),
        ("ARC_SECURITY_WORKSPACE", "security", "workspace"),
        ("ARC_IDENTITY_USER_NAME", "identity", "user_name"),
        ("ARC_IDENTITY_AGENT_NAME", "identity", "agent_name"),
        ("ARC_IDENTITY_PERSONALITY", "identity", "personality"),
        ("ARC_TELEGRAM_TOKEN", "telegram", "token"),
        ("ARC_TELEGRAM_CHAT_ID", "telegram", "chat_id"),
        ("ARC_SCHEDULER_POLL_INTERVAL", "scheduler", "poll_interval"),
    ];

    let mut root = toml::map::Map::new();
    for (var, section, key) in MAPPING {
        if let Ok(raw) = env::var(var) {
            let section_map = root
                .entry(section.to_string())
                .or_insert_with(|| Value::Table(toml::map::Map::new()));
            if let Value::Table(t) = section_map {
                t.insert(key.to_string(), convert(&raw));
            }
        }
    }
    Value::Table(root)
}

/// Convert a string env value to the most specific TOML type.
fn convert(raw: &str) -> Value {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "yes" => return Value::Boolean(true),
        "false" | "no" => return Value::Boolean(false),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Value::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    Value::String(raw.to_string())
}

/// Deep-merge `overlay` into `base` (tables merge, everything else replaces).
fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_t), Value::Table(overlay_t)) => {
            for (k, v) in overlay_t {
                match base_t.get_mut(&k) {
                    Some(existing) if existing.is_table() && v.is_table() => {
                        deep_merge(existing, v);
                    }
                    _ => {
                        base_t.insert(k, v);
                    }
                }
            }
        }
        (base_slot, overlay) => *base_slot = overlay,
    }
}

/// Replace `${VAR}` patterns in every string value with the variable's
/// environment value (empty string when unset).
fn substitute_env_vars(value: &mut Value) {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern compiles")
    });

    match value {
        Value::String(s) => {
            if s.contains("${") {
                let replaced = re.replace_all(s, |caps: &regex::Captures<'_>| {
                    env::var(&caps[1]).unwrap_or_default()
                });
                *s = replaced.into_owned();
            }
        }
        Value::Table(t) => {
            for (_, v) in t.iter_mut() {
                substitute_env_vars(v);
            }
        }
        Value::Array(a) => {
            for v in a.iter_mut() {
                substitute_env_vars(v);
            }
        }
        _ => {}
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_toml(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn missing_files_yield_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let cfg = load(Some(&missing), Some(&missing), None).unwrap();
        assert_eq!(cfg.agent.name, "arc");
    }

    #[test]
    fn project_overrides_user() {
        let dir = tempfile::TempDir::new().unwrap();
        let user = write_toml(&dir, "user.toml", "[agent]\nname = \"from_user\"\nmax_iterations = 7\n");
        let project = write_toml(&dir, "project.toml", "[agent]\nname = \"from_project\"\n");
        let cfg = load(Some(&user), Some(&project), None).unwrap();
        // Project wins on the conflicting key, user survives on the other.
        assert_eq!(cfg.agent.name, "from_project");
        assert_eq!(cfg.agent.max_iterations, 7);
    }

    #[test]
    fn explicit_overrides_win() {
        let dir = tempfile::TempDir::new().unwrap();
        let user = write_toml(&dir, "user.toml", "[llm]\ndefault_model = \"llama3.1\"\n");
        let overrides: Value = toml::from_str("[llm]\ndefault_model = \"qwen\"\n").unwrap();
        let cfg = load(Some(&user), Some(&user.with_extension("none")), Some(overrides)).unwrap();
        assert_eq!(cfg.llm.default_model, "qwen");
    }

    #[test]
    fn env_var_substitution_in_strings() {
        std::env::set_var("ARC_TEST_SUBST_TOKEN", "s3cret");
        let dir = tempfile::TempDir::new().unwrap();
        let user = write_toml(
            &dir,
            "user.toml",
            "[telegram]\ntoken = \"${ARC_TEST_SUBST_TOKEN}\"\nchat_id = \"1\"\n",
        );
        let cfg = load(Some(&user), Some(&user.with_extension("none")), None).unwrap();
        assert_eq!(cfg.telegram.token, "s3cret");
        assert!(cfg.telegram.configured());
        std::env::remove_var("ARC_TEST_SUBST_TOKEN");
    }

    #[test]
    fn env_values_are_type_converted() {
        assert_eq!(convert("25"), Value::Integer(25));
        assert_eq!(convert("0.4"), Value::Float(0.4));
        assert_eq!(convert("true"), Value::Boolean(true));
        assert_eq!(convert("llama3.1"), Value::String("llama3.1".into()));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let bad = write_toml(&dir, "bad.toml", "not [valid toml");
        let err = load(Some(&bad), None, None).unwrap_err();
        assert!(matches!(err, ArcError::Config(_)));
    }
}
