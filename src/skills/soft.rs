//! Soft skills — plain-text `skills/*.md` files appended to the system
//! prompt verbatim.

use std::path::Path;

/// One soft skill: the file stem and its text.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftSkill {
    pub name: String,
    pub text: String,
}

/// Load every `*.md` file under `dir`, sorted by name. A missing
/// directory is not an error — there are simply no soft skills.
pub fn load_soft_skills(dir: &Path) -> Vec<SoftSkill> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut skills: Vec<SoftSkill> = entries
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "md"))
        .filter_map(|e| {
            let path = e.path();
            let name = path.file_stem()?.to_string_lossy().into_owned();
            let text = std::fs::read_to_string(&path).ok()?;
            Some(SoftSkill { name, text })
        })
        .collect();

    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

/// Render soft skills as a system-prompt section.
pub fn render_section(skills: &[SoftSkill]) -> String {
    if skills.is_empty() {
        return String::new();
    }
    let mut out = String::from("Additional instructions:\n");
    for skill in skills {
        out.push('\n');
        out.push_str(skill.text.trim_end());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dir_yields_nothing() {
        let skills = load_soft_skills(Path::new("/nonexistent/skills"));
        assert!(skills.is_empty());
        assert_eq!(render_section(&skills), "");
    }

    #[test]
    fn loads_md_files_sorted_and_skips_others() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b_style.md"), "Use short sentences.").unwrap();
        std::fs::write(dir.path().join("a_tone.md"), "Be warm.").unwrap();
        std::fs::write(dir.path().join("script.py"), "print('no')").unwrap();

        let skills = load_soft_skills(dir.path());
        assert_eq!(skills.len(), 2);
        assert_eq!(skills[0].name, "a_tone");
        assert_eq!(skills[1].name, "b_style");

        let section = render_section(&skills);
        assert!(section.contains("Be warm."));
        assert!(section.contains("Use short sentences."));
    }
}
