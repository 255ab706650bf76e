//! Application configuration (spec.md §10 ambient stack addendum). TOML via
//! `serde` + `toml`, `#[serde(default)]` on every struct so partial configs
//! deserialize, matching `agent-shell::config::AppConfig` exactly in shape.

use crate::model_registry::{Capability, ModelDescriptor, SpeedClass};
use crate::classifier::Complexity;
use crate::router::RoutingStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level application configuration, loaded from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backends: BackendsConfig,
    /// Seeds the Model Registry at startup (spec.md §4.A ambient stack
    /// addendum).
    pub models: Vec<ModelEntry>,
    pub routing: RoutingConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub execution: ExecutionConfig,
    pub context: ContextConfig,
    pub confirmation: ConfirmationConfig,
    /// Drives `switchboard-tools`' code-execution tools (`shell_exec`,
    /// `python_exec`); core itself never executes a process.
    pub sandbox: SandboxConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backends: BackendsConfig::default(),
            models: default_models(),
            routing: RoutingConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            execution: ExecutionConfig::default(),
            context: ContextConfig::default(),
            confirmation: ConfirmationConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path, falling back to defaults
    /// if the file doesn't exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject base URLs that don't parse, rather than letting a typo
    /// surface later as an opaque `Transport` error from inside a backend
    /// adapter.
    fn validate(&self) -> anyhow::Result<()> {
        for (field, value) in [
            ("backends.ollama_base_url", &self.backends.ollama_base_url),
            ("backends.lmstudio_base_url", &self.backends.lmstudio_base_url),
        ] {
            if let Some(url) = value {
                url::Url::parse(url).map_err(|e| anyhow::anyhow!("{field} is not a valid URL: {e}"))?;
            }
        }
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("switchboard").join("config.toml")
    }

    pub fn data_dir() -> PathBuf {
        dirs::data_dir().unwrap_or_else(|| PathBuf::from(".")).join("switchboard")
    }
}

/// HTTP server configuration for the axum interface adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub auth_token: Option<String>,
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8080, auth_token: None, cors: true }
    }
}

/// Base URLs for the local backend adapters. Cloud adapters read their API
/// keys directly from `OPENAI_API_KEY`/`ANTHROPIC_API_KEY` at construction
/// time (spec.md §6); an absent key disables the adapter rather than
/// failing startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Falls back to the `OLLAMA_BASE_URL` environment variable if unset.
    pub ollama_base_url: Option<String>,
    /// Falls back to the `LMSTUDIO_BASE_URL` environment variable if unset.
    pub lmstudio_base_url: Option<String>,
    pub enable_openai: bool,
    pub enable_anthropic: bool,
}

impl Default for BackendsConfig {
    fn default() -> Self {
        Self { ollama_base_url: None, lmstudio_base_url: None, enable_openai: false, enable_anthropic: false }
    }
}

/// One `[[models]]` entry, mirroring `ModelDescriptor` plus the backend it
/// should resolve against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model_id: String,
    pub display_name: String,
    pub backend_id: String,
    pub api_model_name: String,
    #[serde(default)]
    pub capabilities: Vec<Capability>,
    #[serde(default = "default_speed_class")]
    pub speed_class: SpeedClass,
    #[serde(default = "default_parameter_size")]
    pub parameter_size: String,
    #[serde(default = "default_context_window")]
    pub context_window: u32,
    #[serde(default)]
    pub cost: f32,
    #[serde(default)]
    pub quality_score: f32,
    #[serde(default = "default_true")]
    pub available: bool,
}

fn default_speed_class() -> SpeedClass {
    SpeedClass::Balanced
}
fn default_parameter_size() -> String {
    "unknown".into()
}
fn default_context_window() -> u32 {
    8192
}
fn default_true() -> bool {
    true
}

impl From<&ModelEntry> for ModelDescriptor {
    fn from(entry: &ModelEntry) -> Self {
        ModelDescriptor {
            model_id: entry.model_id.clone(),
            display_name: entry.display_name.clone(),
            backend_id: entry.backend_id.clone(),
            api_model_name: entry.api_model_name.clone(),
            capabilities: entry.capabilities.iter().copied().collect(),
            speed_class: entry.speed_class,
            parameter_size: entry.parameter_size.clone(),
            context_window: entry.context_window,
            cost: entry.cost,
            quality_score: entry.quality_score,
            available: entry.available,
        }
    }
}

fn default_models() -> Vec<ModelEntry> {
    vec![
        ModelEntry {
            model_id: "local-chat-7b".into(),
            display_name: "local-chat-7b".into(),
            backend_id: "ollama".into(),
            api_model_name: "llama3".into(),
            capabilities: vec![Capability::General, Capability::Code],
            speed_class: SpeedClass::Fast,
            parameter_size: "7b".into(),
            context_window: 8192,
            cost: 0.0,
            quality_score: 0.55,
            available: true,
        },
    ]
}

/// Routing strategy and operator-supplied model preferences (spec.md §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub strategy: RoutingStrategy,
    pub model_preferences: HashMap<Complexity, Vec<String>>,
    pub max_cost: f32,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self { strategy: RoutingStrategy::Auto, model_preferences: HashMap::new(), max_cost: 1.0 }
    }
}

/// Circuit Breaker defaults (spec.md §4.C).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self { failure_threshold: 5, open_duration_secs: 30 }
    }
}

/// Execution Engine defaults (spec.md §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub generate_timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { generate_timeout_secs: 60, max_tokens: 1024, temperature: 0.7 }
    }
}

/// Context Manager defaults (spec.md §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub max_messages: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { max_messages: 50 }
    }
}

/// Confirmation Middleware defaults (spec.md §4.K).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    pub default_timeout_ms: u64,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self { default_timeout_ms: 300_000 }
    }
}

/// How `shell_exec`/`python_exec` run untrusted model-generated code.
/// `Unsafe` runs directly on the host; `Docker` isolates via `docker run
/// --network=none --read-only`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxMode {
    Unsafe,
    Docker,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub mode: SandboxMode,
    pub docker_image: String,
    pub timeout_secs: u64,
    pub memory_limit: Option<u64>,
    pub work_dir: String,
    /// Root directory `file_read`/`file_write`/`file_list` resolve relative
    /// paths against.
    pub workspace_root: String,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            mode: SandboxMode::Unsafe,
            docker_image: "python:3.12-slim".into(),
            timeout_secs: 30,
            memory_limit: Some(256 * 1024 * 1024),
            work_dir: "/workspace".into(),
            workspace_root: ".".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes_and_round_trips() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.server.port, config.server.port);
        assert_eq!(parsed.models.len(), config.models.len());
    }

    #[test]
    fn malformed_base_url_fails_validation() {
        let config = AppConfig {
            backends: BackendsConfig { ollama_base_url: Some("not a url".into()), ..BackendsConfig::default() },
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn well_formed_base_url_passes_validation() {
        let config = AppConfig {
            backends: BackendsConfig { ollama_base_url: Some("http://localhost:11434".into()), ..BackendsConfig::default() },
            ..AppConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_in_defaults() {
        let toml_str = r#"
[server]
port = 9000
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn models_array_deserializes() {
        let toml_str = r#"
[[models]]
model_id = "cloud-gpt"
display_name = "GPT-4"
backend_id = "openai"
api_model_name = "gpt-4o"
capabilities = ["general", "code", "vision"]
speed_class = "slow"
cost = 0.9
quality_score = 0.97
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.models.len(), 1);
        assert_eq!(config.models[0].model_id, "cloud-gpt");
        assert_eq!(config.models[0].capabilities.len(), 3);
        assert!(config.models[0].available);
    }

    #[test]
    fn model_entry_converts_to_descriptor() {
        let entry = ModelEntry {
            model_id: "m1".into(),
            display_name: "M1".into(),
            backend_id: "b1".into(),
            api_model_name: "m1-api".into(),
            capabilities: vec![Capability::Code],
            speed_class: SpeedClass::Fast,
            parameter_size: "13b".into(),
            context_window: 4096,
            cost: 0.2,
            quality_score: 0.7,
            available: true,
        };
        let descriptor: ModelDescriptor = (&entry).into();
        assert_eq!(descriptor.model_id, "m1");
        assert!(descriptor.has_capability(Capability::Code));
    }

    #[test]
    fn routing_preferences_keyed_by_complexity_deserialize() {
        let toml_str = r#"
[routing]
strategy = "quality"

[routing.model_preferences]
expert = ["big-model"]
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.routing.strategy, RoutingStrategy::Quality);
        assert_eq!(config.routing.model_preferences[&Complexity::Expert], vec!["big-model".to_string()]);
    }
}
