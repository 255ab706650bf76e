//! Agent Orchestrator (spec.md §4.L) — the single entry point tying every
//! other component together. Grounded in
//! `original_source/pocketportal/core/engine.py`'s `AgentCoreV2`:
//! `process_message`'s step ordering (load context, append user message
//! before any fallible work, classify+route+execute, append assistant
//! message, emit terminal event) and `health_check`/`get_stats` mirror that
//! file's `health_check()` and `self.stats` dict.

use crate::backend::Backend;
use crate::circuit_breaker::CircuitBreaker;
use crate::confirmation::ConfirmationMiddleware;
use crate::context::ContextManager;
use crate::event_bus::{Event, EventBus, EventType};
use crate::execution_engine::ExecutionEngine;
use crate::model_registry::ModelRegistry;
use crate::prompt_manager::PromptManager;
use crate::router::{IntelligentRouter, ModelPreferences, RoutingStrategy};
use crate::tool_registry::ToolRegistry;
use crate::types::{ErrorKind, InterfaceTag, Message, UserContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Tuning knobs assembled by the composition root (`main.rs`) from
/// `AppConfig`, kept separate from the component wiring itself.
pub struct OrchestratorSettings {
    pub routing_strategy: RoutingStrategy,
    pub model_preferences: ModelPreferences,
    pub generate_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_cost: f32,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            routing_strategy: RoutingStrategy::Auto,
            model_preferences: ModelPreferences::new(),
            generate_timeout: Duration::from_secs(60),
            max_tokens: 1024,
            temperature: 0.7,
            max_cost: 1.0,
        }
    }
}

/// The result of one `process_message` call. Always returned, never an
/// error — spec.md §7: "the orchestrator MUST NOT throw into the caller."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub response: String,
    pub model_used: Option<String>,
    pub execution_time_ms: u64,
    pub tools_used: Vec<String>,
    pub warnings: Vec<String>,
    pub trace_id: Uuid,
    pub error_kind: Option<ErrorKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub backend_availability: HashMap<String, bool>,
    pub circuit_states: HashMap<String, String>,
    pub models_registered: usize,
    pub tools_registered: usize,
    pub pending_confirmations: usize,
    pub tracked_chats: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_processed: u64,
    pub tools_executed: u64,
    pub errors: u64,
    pub per_interface: HashMap<String, u64>,
    pub uptime_secs: u64,
}

#[derive(Default)]
struct Stats {
    messages_processed: AtomicU64,
    tools_executed: AtomicU64,
    errors: AtomicU64,
    per_interface: StdMutex<HashMap<String, u64>>,
}

pub struct AgentOrchestrator {
    model_registry: ModelRegistry,
    backends: HashMap<String, Box<dyn Backend>>,
    circuit_breaker: CircuitBreaker,
    context_manager: ContextManager,
    event_bus: EventBus,
    prompt_manager: PromptManager,
    tool_registry: ToolRegistry,
    confirmation_middleware: Option<ConfirmationMiddleware>,
    settings: OrchestratorSettings,
    started_at: Instant,
    stats: Stats,
}

impl AgentOrchestrator {
    pub fn new(
        model_registry: ModelRegistry,
        backends: HashMap<String, Box<dyn Backend>>,
        circuit_breaker: CircuitBreaker,
        context_manager: ContextManager,
        event_bus: EventBus,
        prompt_manager: PromptManager,
        tool_registry: ToolRegistry,
        confirmation_middleware: Option<ConfirmationMiddleware>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            model_registry,
            backends,
            circuit_breaker,
            context_manager,
            event_bus,
            prompt_manager,
            tool_registry,
            confirmation_middleware,
            settings,
            started_at: Instant::now(),
            stats: Stats::default(),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    pub fn context_manager(&self) -> &ContextManager {
        &self.context_manager
    }

    /// `None` when confirmation middleware wasn't wired in at construction
    /// (spec.md §4.K is opt-in per deployment). An interface adapter exposing
    /// approve/deny endpoints should return 404 in that case.
    pub fn confirmation_middleware(&self) -> Option<&ConfirmationMiddleware> {
        self.confirmation_middleware.as_ref()
    }

    /// The single entry point: route a message through classification,
    /// routing, execution, and persistence. Never returns an `Err` — all
    /// failure modes are folded into `ProcessingResult::success = false`.
    pub async fn process_message(
        &self,
        chat_id: &str,
        message: &str,
        interface_tag: InterfaceTag,
        user_context: Option<UserContext>,
    ) -> ProcessingResult {
        let trace_id = Uuid::new_v4();
        let started = Instant::now();
        let user_context = user_context.unwrap_or_default();

        self.event_bus.publish(Event::new(
            EventType::ProcessingStarted,
            chat_id,
            trace_id,
            serde_json::json!({"interface": format!("{interface_tag:?}")}),
        ));

        if message.trim().is_empty() {
            self.record_error(interface_tag);
            return self.failure(trace_id, started, ErrorKind::Validation, "message is empty");
        }

        let _history = self.context_manager.history(chat_id, Some(10)).await;
        self.event_bus.publish(Event::new(EventType::ContextLoaded, chat_id, trace_id, serde_json::json!({})));

        // Crash-safety: the user's message is persisted before any fallible
        // work begins (spec.md §4.L step 4, verified by scenario S6).
        self.context_manager.append(chat_id, Message::user(message, interface_tag)).await;
        self.record_message(interface_tag);

        let tool_names: Vec<String> = self.tool_registry.all().into_iter().map(|d| d.name).collect();
        let tools_summary = if tool_names.is_empty() { "none".to_string() } else { tool_names.join(", ") };
        let system_prompt = self.prompt_manager.render(interface_tag, &user_context.preferences, &tools_summary);

        let router = IntelligentRouter::new(&self.model_registry, self.settings.routing_strategy, self.settings.model_preferences.clone());
        let engine = ExecutionEngine::new(&self.model_registry, &self.backends, &self.circuit_breaker, self.settings.generate_timeout);
        let cancellation = CancellationToken::new();

        self.event_bus.publish(Event::new(EventType::RoutingDecision, chat_id, trace_id, serde_json::json!({})));
        self.event_bus.publish(Event::new(EventType::ModelGenerating, chat_id, trace_id, serde_json::json!({})));

        let result = engine
            .execute(
                &router,
                message,
                user_context.has_vision_attachment(),
                Some(&system_prompt),
                self.settings.max_tokens,
                self.settings.temperature,
                self.settings.max_cost,
                &cancellation,
            )
            .await;

        match result {
            Ok(execution) => {
                self.context_manager
                    .append(
                        chat_id,
                        Message::assistant(execution.text.clone(), interface_tag)
                            .with_model(execution.model_used.clone())
                            .with_exec_elapsed_ms(execution.elapsed.as_millis() as u64),
                    )
                    .await;

                self.event_bus.publish(Event::new(
                    EventType::ProcessingCompleted,
                    chat_id,
                    trace_id,
                    serde_json::json!({"model": execution.model_used, "fallbacksUsed": execution.fallbacks_used}),
                ));

                ProcessingResult {
                    success: true,
                    response: execution.text,
                    model_used: Some(execution.model_used),
                    execution_time_ms: started.elapsed().as_millis() as u64,
                    tools_used: Vec::new(),
                    warnings: Vec::new(),
                    trace_id,
                    error_kind: None,
                }
            }
            Err(failure) => {
                self.record_error(interface_tag);
                self.event_bus.publish(Event::new(
                    EventType::ProcessingFailed,
                    chat_id,
                    trace_id,
                    serde_json::json!({"errorKind": failure.kind, "diagnostic": failure.diagnostic}),
                ));
                self.failure(trace_id, started, failure.kind, &failure.diagnostic)
            }
        }
    }

    /// Direct tool invocation path, independent of `process_message`
    /// (spec.md §4.L).
    pub async fn execute_tool(
        &self,
        tool_name: &str,
        params: Value,
        chat_id: Option<&str>,
        user_id: Option<String>,
    ) -> Result<String, ErrorKind> {
        let trace_id = Uuid::new_v4();
        let chat_id = chat_id.unwrap_or("__direct__");

        let Some(descriptor) = self.tool_registry.descriptor(tool_name) else {
            return Err(ErrorKind::ToolNotFound);
        };

        if descriptor.requires_confirmation {
            let Some(middleware) = &self.confirmation_middleware else {
                return Err(ErrorKind::ToolDenied);
            };
            let approved = middleware
                .request_confirmation(tool_name, params.clone(), chat_id, user_id, trace_id, None)
                .await;
            if !approved {
                return Err(ErrorKind::ToolDenied);
            }
        }

        let (ok, _reason) = self.tool_registry.validate(tool_name, &params);
        if !ok {
            return Err(ErrorKind::ToolValidation);
        }

        self.stats.tools_executed.fetch_add(1, Ordering::Relaxed);
        self.tool_registry.invoke(tool_name, params).await.map_err(|_| ErrorKind::ToolExecution)
    }

    /// Enumerates backend availability, circuit states, registry sizes,
    /// pending confirmations, and context count (spec.md §4.L).
    pub async fn health_check(&self) -> HealthReport {
        let mut backend_availability = HashMap::new();
        for (backend_id, backend) in &self.backends {
            backend_availability.insert(backend_id.clone(), backend.is_available().await);
        }

        let circuit_states = self.circuit_breaker.snapshot();
        let any_open = circuit_states.values().any(|s| s == "open");
        let any_unreachable = backend_availability.values().any(|available| !available);
        let any_available = backend_availability.values().any(|available| *available);

        let status = if self.backends.is_empty() || !any_available {
            HealthStatus::Unhealthy
        } else if any_open || any_unreachable {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        let pending_confirmations = match &self.confirmation_middleware {
            Some(middleware) => middleware.pending_count().await,
            None => 0,
        };

        HealthReport {
            status,
            backend_availability,
            circuit_states,
            models_registered: self.model_registry.list().len(),
            tools_registered: self.tool_registry.len(),
            pending_confirmations,
            tracked_chats: self.context_manager.chat_count().await,
        }
    }

    pub fn get_stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_processed: self.stats.messages_processed.load(Ordering::Relaxed),
            tools_executed: self.stats.tools_executed.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            per_interface: self.stats.per_interface.lock().expect("stats lock poisoned").clone(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    fn record_message(&self, interface_tag: InterfaceTag) {
        self.stats.messages_processed.fetch_add(1, Ordering::Relaxed);
        let mut per_interface = self.stats.per_interface.lock().expect("stats lock poisoned");
        *per_interface.entry(format!("{interface_tag:?}")).or_insert(0) += 1;
    }

    fn record_error(&self, interface_tag: InterfaceTag) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        let _ = interface_tag;
    }

    fn failure(&self, trace_id: Uuid, started: Instant, kind: ErrorKind, diagnostic: &str) -> ProcessingResult {
        ProcessingResult {
            success: false,
            response: human_readable_error(kind, diagnostic),
            model_used: None,
            execution_time_ms: started.elapsed().as_millis() as u64,
            tools_used: Vec::new(),
            warnings: Vec::new(),
            trace_id,
            error_kind: Some(kind),
        }
    }
}

/// A short, user-facing explanation of an error class — never a stack
/// trace (spec.md §7: "no stack traces").
fn human_readable_error(kind: ErrorKind, diagnostic: &str) -> String {
    match kind {
        ErrorKind::Validation => "Your message couldn't be processed: it was empty.".to_string(),
        ErrorKind::Cancelled => "The request was cancelled before it could complete.".to_string(),
        ErrorKind::AllModelsFailed => format!("No model was able to handle this request right now ({diagnostic})."),
        _ => format!("Something went wrong while processing your request ({diagnostic})."),
    }
}

// The Admission type is re-exported for adapters that want to build their
// own diagnostics off circuit state without pulling in `crate::circuit_breaker`.
pub use crate::circuit_breaker::Admission as CircuitAdmission;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendError, GenerationRequest, GenerationResult};
    use crate::model_registry::{Capability, ModelDescriptor, SpeedClass};
    use async_trait::async_trait;

    struct AlwaysSucceeds;

    #[async_trait]
    impl Backend for AlwaysSucceeds {
        async fn generate(&self, _request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
            Ok(GenerationResult { text: "hi there".to_string(), token_count: Some(3), elapsed: Duration::from_millis(5) })
        }
        async fn is_available(&self) -> bool {
            true
        }
        async fn close(&self) {}
    }

    struct AlwaysFails;

    #[async_trait]
    impl Backend for AlwaysFails {
        async fn generate(&self, _request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
            Err(BackendError::Transport("scripted".into()))
        }
        async fn is_available(&self) -> bool {
            false
        }
        async fn close(&self) {}
    }

    fn descriptor(id: &str, backend_id: &str) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.to_string(),
            display_name: id.to_string(),
            backend_id: backend_id.to_string(),
            api_model_name: id.to_string(),
            capabilities: [Capability::General].into_iter().collect(),
            speed_class: SpeedClass::Fast,
            parameter_size: "7b".to_string(),
            context_window: 4096,
            cost: 0.1,
            quality_score: 0.5,
            available: true,
        }
    }

    fn prompt_manager() -> PromptManager {
        PromptManager::from_templates("sys {interface} {toolsSummary} {verbosity} {now}")
    }

    fn build_orchestrator(backend: Box<dyn Backend>) -> AgentOrchestrator {
        let registry = ModelRegistry::new();
        registry.register(descriptor("primary", "b1"));
        let mut backends: HashMap<String, Box<dyn Backend>> = HashMap::new();
        backends.insert("b1".to_string(), backend);

        AgentOrchestrator::new(
            registry,
            backends,
            CircuitBreaker::with_defaults(),
            ContextManager::new(50),
            EventBus::new(),
            prompt_manager(),
            ToolRegistry::new(),
            None,
            OrchestratorSettings::default(),
        )
    }

    #[tokio::test]
    async fn successful_message_persists_user_and_assistant_messages() {
        let orchestrator = build_orchestrator(Box::new(AlwaysSucceeds));
        let result = orchestrator.process_message("chat-1", "hello", InterfaceTag::Cli, None).await;

        assert!(result.success);
        assert_eq!(result.response, "hi there");

        let history = orchestrator.context_manager().history("chat-1", None).await;
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn empty_message_is_validation_error_without_persisting() {
        let orchestrator = build_orchestrator(Box::new(AlwaysSucceeds));
        let result = orchestrator.process_message("chat-1", "   ", InterfaceTag::Cli, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::Validation));
        assert!(orchestrator.context_manager().history("chat-1", None).await.is_empty());
    }

    #[tokio::test]
    async fn failing_backend_persists_only_the_user_message() {
        let orchestrator = build_orchestrator(Box::new(AlwaysFails));
        let result = orchestrator.process_message("chat-1", "hello", InterfaceTag::Telegram, None).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::AllModelsFailed));

        let history = orchestrator.context_manager().history("chat-1", None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, crate::types::Role::User);
    }

    #[tokio::test]
    async fn zero_backends_is_unhealthy_and_fails_execution() {
        let registry = ModelRegistry::new();
        let orchestrator = AgentOrchestrator::new(
            registry,
            HashMap::new(),
            CircuitBreaker::with_defaults(),
            ContextManager::new(50),
            EventBus::new(),
            prompt_manager(),
            ToolRegistry::new(),
            None,
            OrchestratorSettings::default(),
        );

        let health = orchestrator.health_check().await;
        assert_eq!(health.status, HealthStatus::Unhealthy);

        let result = orchestrator.process_message("chat-1", "hello", InterfaceTag::Cli, None).await;
        assert_eq!(result.error_kind, Some(ErrorKind::AllModelsFailed));
    }

    #[tokio::test]
    async fn execute_tool_not_found() {
        let orchestrator = build_orchestrator(Box::new(AlwaysSucceeds));
        let err = orchestrator.execute_tool("nonexistent", serde_json::json!({}), None, None).await.unwrap_err();
        assert_eq!(err, ErrorKind::ToolNotFound);
    }

    #[tokio::test]
    async fn stats_track_processed_messages_and_errors() {
        let orchestrator = build_orchestrator(Box::new(AlwaysSucceeds));
        orchestrator.process_message("chat-1", "hello", InterfaceTag::Cli, None).await;
        orchestrator.process_message("chat-1", "", InterfaceTag::Cli, None).await;

        let stats = orchestrator.get_stats();
        assert_eq!(stats.messages_processed, 1);
        assert_eq!(stats.errors, 1);
    }
}
