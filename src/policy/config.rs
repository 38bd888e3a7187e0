//! Tool policy file loading.
//!
//! The policy file is a permissive INI dialect:
//!
//! ```ini
//! ; applies to every tool first
//! [tools]
//! write = false
//!
//! [tool.calendar]
//! enabled = yes
//! modes = read, write
//! ```
//!
//! Section and key names are case-insensitive, `=` or `:` separate keys from
//! values, and matching quotes around values are stripped. Parsing never
//! fails: anything that cannot be understood becomes a warning on the
//! returned [`ToolAccessConfig`] and the affected field keeps its value.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use super::engine::{KnownTool, ToolAccessRule};
use crate::paths::{CONFIG_FILE_ENV, ConfigSearch};

const TRUE_VALUES: [&str; 4] = ["1", "true", "yes", "on"];
const FALSE_VALUES: [&str; 4] = ["0", "false", "no", "off"];

/// Section names that apply to every tool, highest priority first.
const DEFAULT_SECTIONS: [&str; 3] = ["tools", "tool.defaults", "tool.default"];

type IniSection = HashMap<String, String>;
type IniSections = HashMap<String, IniSection>;

/// Effective tool policy.
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct ToolAccessConfig {
    /// File the policy was read from; `None` means built-in defaults.
    pub source_path: Option<PathBuf>,
    /// One rule per known tool.
    pub tools: BTreeMap<KnownTool, ToolAccessRule>,
    /// Non-fatal problems found while loading, in file order.
    pub warnings: Vec<String>,
}

impl Default for ToolAccessConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

impl ToolAccessConfig {
    /// Every known tool enabled for read and write, no source file.
    pub fn defaults() -> Self {
        Self {
            source_path: None,
            tools: KnownTool::all()
                .iter()
                .map(|&tool| (tool, ToolAccessRule::default()))
                .collect(),
            warnings: Vec::new(),
        }
    }

    /// Rule for `tool`.
    pub fn rule(&self, tool: KnownTool) -> ToolAccessRule {
        self.tools.get(&tool).copied().unwrap_or_default()
    }

    /// Label used in denial reasons: the file path or `default policy`.
    pub fn source_label(&self) -> String {
        match self.source_path {
            Some(ref path) => path.display().to_string(),
            None => "default policy".to_owned(),
        }
    }

    /// Load using the process environment and working directory.
    pub fn load() -> Self {
        Self::load_from(&ConfigSearch::from_env())
    }

    /// Load from the first existing regular file among `search`'s candidates.
    pub fn load_from(search: &ConfigSearch) -> Self {
        let candidates = search.candidates();
        let Some(path) = find_config_path(&candidates) else {
            let mut config = Self::defaults();
            if let Some(ref explicit) = search.explicit {
                config.warnings.push(format!(
                    "{CONFIG_FILE_ENV} points to \"{}\" but no readable file was found.",
                    explicit.display()
                ));
            }
            return config;
        };

        match std::fs::read_to_string(&path) {
            Ok(content) => Self::from_ini_str(&content, Some(path)),
            Err(e) => {
                let mut config = Self::defaults();
                config
                    .warnings
                    .push(format!("Failed to read \"{}\": {e}", path.display()));
                config.source_path = Some(path);
                config
            }
        }
    }

    /// Build a policy from policy-file text.
    pub fn from_ini_str(content: &str, source_path: Option<PathBuf>) -> Self {
        let mut config = Self::defaults();
        config.source_path = source_path;
        let sections = parse_ini(content);

        let defaults = DEFAULT_SECTIONS
            .iter()
            .find_map(|name| sections.get(*name));
        if let Some(section) = defaults {
            for &tool in KnownTool::all() {
                let rule = config.tools.entry(tool).or_default();
                apply_section_rule(rule, section, "[tools]", &mut config.warnings);
            }
        }

        for &tool in KnownTool::all() {
            let Some(section) = section_for_tool(&sections, tool) else {
                continue;
            };
            let context = format!("[tool.{tool}]");
            let rule = config.tools.entry(tool).or_default();
            apply_section_rule(rule, section, &context, &mut config.warnings);
        }

        config
    }
}

fn find_config_path(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates
        .iter()
        .find(|candidate| is_regular_file(candidate))
        .cloned()
}

fn is_regular_file(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

fn section_for_tool(sections: &IniSections, tool: KnownTool) -> Option<&IniSection> {
    sections
        .get(&format!("tool.{tool}"))
        .or_else(|| sections.get(tool.as_str()))
}

fn parse_ini(content: &str) -> IniSections {
    let mut sections = IniSections::new();
    let mut current = "default".to_owned();
    sections.entry(current.clone()).or_default();

    for raw_line in content.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
            continue;
        }

        if line.len() >= 2 && line.starts_with('[') && line.ends_with(']') {
            current = line[1..line.len() - 1].trim().to_lowercase();
            sections.entry(current.clone()).or_default();
            continue;
        }

        // Whichever separator comes first wins.
        let split_at = match (line.find('='), line.find(':')) {
            (Some(eq), Some(colon)) => eq.min(colon),
            (Some(eq), None) => eq,
            (None, Some(colon)) => colon,
            (None, None) => continue,
        };

        let key = line[..split_at].trim().to_lowercase();
        let value = strip_matching_quotes(&line[split_at + 1..]);
        sections
            .entry(current.clone())
            .or_default()
            .insert(key, value);
    }

    sections
}

fn strip_matching_quotes(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() < 2 {
        return trimmed.to_owned();
    }
    let quoted = (trimmed.starts_with('"') && trimmed.ends_with('"'))
        || (trimmed.starts_with('\'') && trimmed.ends_with('\''));
    if quoted {
        trimmed[1..trimmed.len() - 1].trim().to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn parse_boolean(value: &str) -> Option<bool> {
    let normalized = value.trim().to_lowercase();
    if TRUE_VALUES.contains(&normalized.as_str()) {
        Some(true)
    } else if FALSE_VALUES.contains(&normalized.as_str()) {
        Some(false)
    } else {
        None
    }
}

fn apply_modes(rule: &mut ToolAccessRule, raw: &str, context: &str, warnings: &mut Vec<String>) {
    let tokens: Vec<String> = raw
        .split(',')
        .map(|token| token.trim().to_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.is_empty() {
        warnings.push(format!("{context}: modes is empty; expected read/write."));
        return;
    }

    if tokens.iter().any(|t| t == "none") {
        rule.read = false;
        rule.write = false;
        return;
    }

    if let Some(unknown) = tokens.iter().find(|t| *t != "read" && *t != "write") {
        warnings.push(format!(
            "{context}: unknown mode \"{unknown}\" (expected read/write)."
        ));
        return;
    }

    rule.read = tokens.iter().any(|t| t == "read");
    rule.write = tokens.iter().any(|t| t == "write");
}

fn apply_section_rule(
    rule: &mut ToolAccessRule,
    section: &IniSection,
    context: &str,
    warnings: &mut Vec<String>,
) {
    if let Some(modes) = section.get("modes").or_else(|| section.get("mode")) {
        apply_modes(rule, modes, context, warnings);
    }

    for key in ["enabled", "read", "write"] {
        let Some(raw) = section.get(key) else {
            continue;
        };
        let Some(parsed) = parse_boolean(raw) else {
            warnings.push(format!(
                "{context}: {key} must be boolean (true/false/1/0/yes/no/on/off)."
            ));
            continue;
        };
        match key {
            "enabled" => rule.enabled = parsed,
            "read" => rule.read = parsed,
            _ => rule.write = parsed,
        }
    }
}
