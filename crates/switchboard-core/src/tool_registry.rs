//! Tool Registry (spec.md §4.J) — holds the catalog of available tools,
//! their immutable descriptors, and mutable execution statistics.
//!
//! Discovery is build-time self-registration via a `register_all` free
//! function supplied by the `switchboard-tools` crate (spec.md §9's
//! "compile-time registration mechanism" redesign of the original's
//! dynamic package-walking discovery), matching `agent-shell`'s
//! `agent_tools::register_all`. `ToolStats` bookkeeping is grounded in
//! `original_source/pocketportal/tools/__init__.py`'s `ToolExecutionStats`.

use crate::error::AgentError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Data,
    System,
    Web,
    Dev,
    Automation,
    Knowledge,
    Other,
}

/// Immutable metadata about one registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    pub requires_confirmation: bool,
    pub parameters: Value,
    pub version: String,
}

/// Mutable, monotonic execution counters for one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolStats {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub sum_success_latency_ms: u64,
    pub last_invocation: Option<DateTime<Utc>>,
}

impl ToolStats {
    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            return 1.0;
        }
        self.successes as f64 / self.attempts as f64
    }

    pub fn average_success_latency_ms(&self) -> f64 {
        if self.successes == 0 {
            return 0.0;
        }
        self.sum_success_latency_ms as f64 / self.successes as f64
    }
}

/// A tool the orchestrator can invoke on the model's behalf.
///
/// Mirrors `agent-shell::tool_registry::Tool` (`name`/`description`/
/// `parameters_schema`/`execute`), extended with three methods that carry
/// sensible defaults so the bulk of illustrative tools need only implement
/// the original four.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;

    fn category(&self) -> ToolCategory {
        ToolCategory::Other
    }

    fn requires_confirmation(&self) -> bool {
        false
    }

    fn version(&self) -> &str {
        "0.1.0"
    }

    async fn execute(&self, args: Value) -> Result<String, AgentError>;
}

/// Tools never invoked, and tools invoked at least 10 times with a success
/// rate below 50% — the two classes spec.md §4.J's `healthReport` names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolHealthReport {
    pub never_executed: Vec<String>,
    pub unhealthy: Vec<String>,
}

const UNHEALTHY_MIN_ATTEMPTS: u64 = 10;
const UNHEALTHY_MAX_SUCCESS_RATE: f64 = 0.5;

/// Catalog of registered tools plus their per-tool execution statistics.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    stats: Mutex<HashMap<String, ToolStats>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new(), stats: Mutex::new(HashMap::new()) }
    }

    /// Register a tool. Overwrites any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        tracing::debug!(tool = %name, category = ?tool.category(), "registered tool");
        self.stats.lock().expect("tool registry stats lock poisoned").entry(name.clone()).or_default();
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn descriptor(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools.get(name).map(|t| ToolDescriptor {
            name: t.name().to_string(),
            description: t.description().to_string(),
            category: t.category(),
            requires_confirmation: t.requires_confirmation(),
            parameters: t.parameters_schema(),
            version: t.version().to_string(),
        })
    }

    pub fn all(&self) -> Vec<ToolDescriptor> {
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();
        names.into_iter().filter_map(|n| self.descriptor(n)).collect()
    }

    pub fn by_category(&self, category: ToolCategory) -> Vec<ToolDescriptor> {
        self.all().into_iter().filter(|d| d.category == category).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Names of every declared-required parameter not present in `params`.
    /// Type coercion is the tool's own responsibility (spec.md §4.J).
    pub fn validate(&self, name: &str, params: &Value) -> (bool, Option<String>) {
        let Some(tool) = self.get(name) else {
            return (false, Some(format!("unknown tool: {name}")));
        };

        let schema = tool.parameters_schema();
        let required = schema.get("required").and_then(|r| r.as_array()).cloned().unwrap_or_default();

        let mut missing = Vec::new();
        for field in &required {
            if let Some(field_name) = field.as_str() {
                let present = params.get(field_name).map(|v| !v.is_null()).unwrap_or(false);
                if !present {
                    missing.push(field_name.to_string());
                }
            }
        }

        if missing.is_empty() {
            (true, None)
        } else {
            (false, Some(format!("missing required parameter(s): {}", missing.join(", "))))
        }
    }

    pub fn record_execution(&self, name: &str, success: bool, elapsed_ms: u64) {
        let mut stats = self.stats.lock().expect("tool registry stats lock poisoned");
        let entry = stats.entry(name.to_string()).or_default();
        entry.attempts += 1;
        if success {
            entry.successes += 1;
            entry.sum_success_latency_ms += elapsed_ms;
        } else {
            entry.failures += 1;
        }
        entry.last_invocation = Some(Utc::now());
    }

    pub fn stats_for(&self, name: &str) -> Option<ToolStats> {
        self.stats.lock().expect("tool registry stats lock poisoned").get(name).cloned()
    }

    pub fn health_report(&self) -> ToolHealthReport {
        let stats = self.stats.lock().expect("tool registry stats lock poisoned");
        let mut names: Vec<&String> = self.tools.keys().collect();
        names.sort();

        let mut report = ToolHealthReport::default();
        for name in names {
            let Some(entry) = stats.get(name) else { continue };
            if entry.attempts == 0 {
                report.never_executed.push(name.clone());
            } else if entry.attempts >= UNHEALTHY_MIN_ATTEMPTS && entry.success_rate() < UNHEALTHY_MAX_SUCCESS_RATE {
                report.unhealthy.push(name.clone());
            }
        }
        report
    }

    /// Invoke `name`, timing the call and recording the outcome via
    /// `record_execution`. Callers are expected to have already validated
    /// parameters (spec.md §4.L's `executeTool` sequences validate then
    /// invoke as distinct steps).
    pub async fn invoke(&self, name: &str, args: Value) -> Result<String, AgentError> {
        let tool = self.get(name).ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;
        let start = std::time::Instant::now();
        let result = tool.execute(args).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.record_execution(name, result.is_ok(), elapsed_ms);
        result
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {"text": {"type": "string"}}, "required": ["text"]})
        }
        async fn execute(&self, args: Value) -> Result<String, AgentError> {
            Ok(args["text"].as_str().unwrap_or_default().to_string())
        }
    }

    struct FlakyTool;

    #[async_trait]
    impl Tool for FlakyTool {
        fn name(&self) -> &str {
            "flaky"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object", "properties": {}, "required": []})
        }
        fn requires_confirmation(&self) -> bool {
            true
        }
        async fn execute(&self, _args: Value) -> Result<String, AgentError> {
            Err(AgentError::ToolExecution { tool_name: "flaky".into(), message: "boom".into() })
        }
    }

    #[test]
    fn validate_reports_missing_required_params() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let (ok, reason) = registry.validate("echo", &json!({}));
        assert!(!ok);
        assert!(reason.unwrap().contains("text"));

        let (ok, _) = registry.validate("echo", &json!({"text": "hi"}));
        assert!(ok);
    }

    #[test]
    fn validate_unknown_tool_fails() {
        let registry = ToolRegistry::new();
        let (ok, reason) = registry.validate("nope", &json!({}));
        assert!(!ok);
        assert!(reason.is_some());
    }

    #[tokio::test]
    async fn invoke_records_success_stats() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));

        let result = registry.invoke("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(result, "hi");

        let stats = registry.stats_for("echo").unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.successes, 1);
        assert_eq!(stats.failures, 0);
    }

    #[tokio::test]
    async fn invoke_records_failure_stats() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FlakyTool));

        let result = registry.invoke("flaky", json!({})).await;
        assert!(result.is_err());

        let stats = registry.stats_for("flaky").unwrap();
        assert_eq!(stats.attempts, 1);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test]
    async fn health_report_flags_never_executed_and_unhealthy_tools() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(FlakyTool));

        for _ in 0..10 {
            let _ = registry.invoke("flaky", json!({})).await;
        }

        let report = registry.health_report();
        assert!(report.never_executed.contains(&"echo".to_string()));
        assert!(report.unhealthy.contains(&"flaky".to_string()));
    }

    #[test]
    fn by_category_filters() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FlakyTool));
        assert_eq!(registry.by_category(ToolCategory::Other).len(), 1);
        assert_eq!(registry.by_category(ToolCategory::Web).len(), 0);
    }

    #[test]
    fn descriptor_reflects_requires_confirmation() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(FlakyTool));
        let d = registry.descriptor("flaky").unwrap();
        assert!(d.requires_confirmation);
    }
}
