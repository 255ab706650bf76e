//! Prompt Manager (spec.md §4.I) — renders the system prompt from external
//! template assets loaded once at startup, substituting a fixed set of
//! named slots. No templating engine: four fixed slots are cheaper and
//! safer as plain `str::replace` than pulling in a dependency that would
//! accept user-controlled template identifiers (spec.md §4.I invariant).

use crate::error::AgentError;
use crate::types::{InterfaceTag, UserPreferences};
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_TEMPLATE_NAME: &str = "default";

fn interface_template_name(tag: InterfaceTag) -> &'static str {
    match tag {
        InterfaceTag::Telegram => "telegram",
        InterfaceTag::Web => "web",
        InterfaceTag::Slack => "slack",
        InterfaceTag::Api => "api",
        InterfaceTag::Cli => "cli",
        InterfaceTag::Unknown => DEFAULT_TEMPLATE_NAME,
    }
}

fn interface_label(tag: InterfaceTag) -> &'static str {
    match tag {
        InterfaceTag::Telegram => "telegram",
        InterfaceTag::Web => "web",
        InterfaceTag::Slack => "slack",
        InterfaceTag::Api => "api",
        InterfaceTag::Cli => "cli",
        InterfaceTag::Unknown => "unknown",
    }
}

/// Loads `system.<name>.txt` templates from a directory once at startup and
/// renders them on demand. Holding the rendered templates in memory keeps
/// `render` free of I/O, matching spec.md §4.I's "rendering is pure and
/// deterministic" (aside from the `{now}` slot).
pub struct PromptManager {
    templates: HashMap<&'static str, String>,
}

impl PromptManager {
    /// Load every known template name from `dir`. The `default` template is
    /// required; interface-specific overrides are optional and fall back to
    /// `default` at render time if their file is absent.
    pub fn load(dir: &Path) -> Result<Self, AgentError> {
        let mut templates = HashMap::new();

        let default_path = dir.join(format!("system.{DEFAULT_TEMPLATE_NAME}.txt"));
        let default_body = std::fs::read_to_string(&default_path).map_err(|e| {
            AgentError::Config(format!("failed to read {}: {e}", default_path.display()))
        })?;
        templates.insert(DEFAULT_TEMPLATE_NAME, default_body);

        for name in ["telegram", "web", "slack", "api", "cli"] {
            let path = dir.join(format!("system.{name}.txt"));
            if let Ok(body) = std::fs::read_to_string(&path) {
                templates.insert(name, body);
            }
        }

        Ok(Self { templates })
    }

    /// Build a manager from in-memory templates, bypassing the filesystem.
    /// Used by tests and by callers that embed templates at compile time.
    pub fn from_templates(default: impl Into<String>) -> Self {
        let mut templates = HashMap::new();
        templates.insert(DEFAULT_TEMPLATE_NAME, default.into());
        Self { templates }
    }

    pub fn with_override(mut self, name: &'static str, body: impl Into<String>) -> Self {
        self.templates.insert(name, body.into());
        self
    }

    /// Render the system prompt for `interface_tag`, substituting
    /// `{interface}`, `{toolsSummary}`, `{verbosity}`, `{now}`.
    pub fn render(&self, interface_tag: InterfaceTag, preferences: &UserPreferences, tools_summary: &str) -> String {
        let name = interface_template_name(interface_tag);
        let template = self
            .templates
            .get(name)
            .or_else(|| self.templates.get(DEFAULT_TEMPLATE_NAME))
            .expect("default template missing after successful load");

        let verbosity = if preferences.terse {
            "terse"
        } else if preferences.verbose {
            "verbose"
        } else {
            "normal"
        };

        template
            .replace("{interface}", interface_label(interface_tag))
            .replace("{toolsSummary}", tools_summary)
            .replace("{verbosity}", verbosity)
            .replace("{now}", &Utc::now().to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PromptManager {
        PromptManager::from_templates("iface={interface} verbosity={verbosity} tools={toolsSummary} now={now}")
    }

    #[test]
    fn substitutes_all_four_slots() {
        let pm = manager();
        let prefs = UserPreferences::default();
        let rendered = pm.render(InterfaceTag::Web, &prefs, "file_read, web_fetch");

        assert!(rendered.contains("iface=web"));
        assert!(rendered.contains("verbosity=normal"));
        assert!(rendered.contains("tools=file_read, web_fetch"));
        assert!(!rendered.contains("{now}"));
    }

    #[test]
    fn terse_preference_overrides_verbose() {
        let pm = manager();
        let prefs = UserPreferences { verbose: true, terse: true };
        let rendered = pm.render(InterfaceTag::Cli, &prefs, "");
        assert!(rendered.contains("verbosity=terse"));
    }

    #[test]
    fn unknown_interface_falls_back_to_default_template() {
        let pm = manager();
        let prefs = UserPreferences::default();
        let rendered = pm.render(InterfaceTag::Unknown, &prefs, "");
        assert!(rendered.contains("iface=unknown"));
    }

    #[test]
    fn rendering_is_deterministic_apart_from_now() {
        let pm = manager();
        let prefs = UserPreferences::default();
        let a = pm.render(InterfaceTag::Slack, &prefs, "t1");
        let b = pm.render(InterfaceTag::Slack, &prefs, "t1");
        let strip_now = |s: &str| s.split("now=").next().unwrap().to_string();
        assert_eq!(strip_now(&a), strip_now(&b));
    }

    #[test]
    fn interface_override_is_used_when_present() {
        let pm = PromptManager::from_templates("default template")
            .with_override("cli", "cli-specific template");
        let prefs = UserPreferences::default();
        assert_eq!(pm.render(InterfaceTag::Cli, &prefs, ""), "cli-specific template");
        assert_eq!(pm.render(InterfaceTag::Web, &prefs, ""), "default template");
    }
}
