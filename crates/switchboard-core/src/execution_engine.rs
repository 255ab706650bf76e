//! Execution Engine (spec.md §4.F) — walks the routed model chain,
//! consulting the Circuit Breaker and per-backend availability cache,
//! calling through to Backend Adapters under a timeout.
//!
//! Grounded in `original_source/routing/execution_engine.py`'s
//! `ExecutionEngine.execute` (chain-building, per-model timeout via
//! `asyncio.wait_for`) and `agent-shell::agent_loop::send_completion_request`'s
//! `tokio::time::timeout` usage for the Rust-idiomatic timeout mechanism.

use crate::backend::{Backend, BackendError, GenerationRequest};
use crate::circuit_breaker::{Admission, CircuitBreaker};
use crate::model_registry::ModelRegistry;
use crate::router::{IntelligentRouter, RoutingDecision};
use crate::types::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A cache of `is_available()` probes with a short TTL, so the engine does
/// not hit the network once per chain entry per request (spec.md §4.F:
/// "cached ≤1s").
struct AvailabilityCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, (bool, Instant)>>,
}

impl AvailabilityCache {
    fn new(ttl: Duration) -> Self {
        Self { ttl, entries: Mutex::new(HashMap::new()) }
    }

    async fn check(&self, backend_id: &str, backend: &dyn Backend) -> bool {
        {
            let entries = self.entries.lock().expect("availability cache lock poisoned");
            if let Some((available, checked_at)) = entries.get(backend_id) {
                if checked_at.elapsed() < self.ttl {
                    return *available;
                }
            }
        }
        let available = backend.is_available().await;
        let mut entries = self.entries.lock().expect("availability cache lock poisoned");
        entries.insert(backend_id.to_string(), (available, Instant::now()));
        available
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub text: String,
    pub model_used: String,
    pub fallbacks_used: u32,
    pub token_count: Option<u32>,
    pub elapsed: Duration,
    pub routing_decision: RoutingDecisionSnapshot,
}

/// A serializable snapshot of the routing decision that produced this
/// result, kept on `ExecutionResult` for callers that want to surface
/// routing diagnostics without holding a reference into the router
/// (supplemental field recovered from `original_source`'s
/// `ExecutionResult`, not named explicitly in spec.md §4.F but present in
/// the original implementation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecisionSnapshot {
    pub strategy_used: String,
    pub reasoning: String,
}

impl From<&RoutingDecision> for RoutingDecisionSnapshot {
    fn from(decision: &RoutingDecision) -> Self {
        Self {
            strategy_used: format!("{:?}", decision.strategy_used),
            reasoning: decision.reasoning.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionFailure {
    pub kind: ErrorKind,
    pub diagnostic: String,
}

pub struct ExecutionEngine<'a> {
    registry: &'a ModelRegistry,
    backends: &'a HashMap<String, Box<dyn Backend>>,
    circuit_breaker: &'a CircuitBreaker,
    availability_cache: AvailabilityCache,
    generate_timeout: Duration,
}

impl<'a> ExecutionEngine<'a> {
    pub fn new(
        registry: &'a ModelRegistry,
        backends: &'a HashMap<String, Box<dyn Backend>>,
        circuit_breaker: &'a CircuitBreaker,
        generate_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            backends,
            circuit_breaker,
            availability_cache: AvailabilityCache::new(Duration::from_secs(1)),
            generate_timeout,
        }
    }

    pub async fn execute(
        &self,
        router: &IntelligentRouter<'_>,
        query: &str,
        has_attachment: bool,
        system_prompt: Option<&str>,
        max_tokens: u32,
        temperature: f32,
        max_cost: f32,
        cancellation: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutionFailure> {
        let decision = router.route(query, has_attachment, max_cost);

        let mut chain = vec![decision.model_id.clone()];
        chain.extend(decision.fallback_models.iter().cloned());

        let mut last_error: Option<ExecutionFailure> = None;
        let mut fallbacks_used = 0u32;

        for model_id in &chain {
            if cancellation.is_cancelled() {
                return Err(ExecutionFailure { kind: ErrorKind::Cancelled, diagnostic: "cancelled before model attempt".to_string() });
            }

            let descriptor = match self.registry.get(model_id) {
                Some(d) => d,
                None => {
                    fallbacks_used += 1;
                    continue;
                }
            };

            let backend = match self.backends.get(&descriptor.backend_id) {
                Some(b) => b.as_ref(),
                None => {
                    fallbacks_used += 1;
                    continue;
                }
            };

            let admission = self.circuit_breaker.admit(&descriptor.backend_id);
            if admission == Admission::Rejected {
                last_error = Some(ExecutionFailure {
                    kind: ErrorKind::BackendOpen,
                    diagnostic: format!("{}: circuit open", descriptor.backend_id),
                });
                fallbacks_used += 1;
                continue;
            }

            if admission == Admission::Allowed && !self.availability_cache.check(&descriptor.backend_id, backend).await {
                fallbacks_used += 1;
                continue;
            }

            let request = GenerationRequest {
                prompt: query,
                model_name: &descriptor.api_model_name,
                system_prompt,
                max_tokens,
                temperature,
            };

            let call = backend.generate(request);
            let outcome = tokio::select! {
                biased;
                _ = cancellation.cancelled() => {
                    return Err(ExecutionFailure { kind: ErrorKind::Cancelled, diagnostic: "cancelled mid-flight".to_string() });
                }
                result = tokio::time::timeout(self.generate_timeout, call) => result,
            };

            match outcome {
                Ok(Ok(result)) => {
                    if admission == Admission::Probe {
                        self.circuit_breaker.record_probe_result(&descriptor.backend_id, true);
                    } else {
                        self.circuit_breaker.record_success(&descriptor.backend_id);
                    }
                    return Ok(ExecutionResult {
                        text: result.text,
                        model_used: descriptor.display_name.clone(),
                        fallbacks_used,
                        token_count: result.token_count,
                        elapsed: result.elapsed,
                        routing_decision: RoutingDecisionSnapshot::from(&decision),
                    });
                }
                Ok(Err(backend_err)) => {
                    let kind = classify_backend_error(&backend_err);
                    if backend_err.counts_toward_circuit_breaker() {
                        if admission == Admission::Probe {
                            self.circuit_breaker.record_probe_result(&descriptor.backend_id, false);
                        } else {
                            self.circuit_breaker.record_failure(&descriptor.backend_id);
                        }
                    } else if admission == Admission::Probe {
                        self.circuit_breaker.record_probe_result(&descriptor.backend_id, true);
                    }
                    last_error = Some(ExecutionFailure { kind, diagnostic: format!("{}: {backend_err}", descriptor.backend_id) });
                    fallbacks_used += 1;
                }
                Err(_elapsed) => {
                    if admission == Admission::Probe {
                        self.circuit_breaker.record_probe_result(&descriptor.backend_id, false);
                    } else {
                        self.circuit_breaker.record_failure(&descriptor.backend_id);
                    }
                    last_error = Some(ExecutionFailure { kind: ErrorKind::Timeout, diagnostic: format!("{}: timed out after {:?}", descriptor.backend_id, self.generate_timeout) });
                    fallbacks_used += 1;
                }
            }
        }

        // spec.md §7: once the fallback chain is exhausted the error surfaced
        // to the caller is always ALL_MODELS_FAILED; individual backend
        // error kinds (TIMEOUT, TRANSPORT, BACKEND_OPEN, ...) are recovered
        // locally by trying the next model and only live on in the
        // diagnostic string.
        let diagnostic = last_error
            .map(|e| e.diagnostic)
            .unwrap_or_else(|| "no models available in routing chain".to_string());
        Err(ExecutionFailure { kind: ErrorKind::AllModelsFailed, diagnostic })
    }
}

fn classify_backend_error(err: &BackendError) -> ErrorKind {
    match err {
        BackendError::Timeout => ErrorKind::Timeout,
        BackendError::Transport(_) => ErrorKind::Transport,
        BackendError::Auth(_) => ErrorKind::Auth,
        BackendError::BadRequest(_) => ErrorKind::BadRequest,
        BackendError::ServerError { .. } => ErrorKind::ServerError,
        BackendError::Unavailable(_) => ErrorKind::BackendUnavailable,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GenerationResult;
    use crate::model_registry::{Capability, ModelDescriptor, SpeedClass};
    use crate::router::{IntelligentRouter, ModelPreferences, RoutingStrategy};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct ScriptedBackend {
        calls: AtomicU32,
        fail_first_n: u32,
        outcome: BackendOutcome,
        available: bool,
    }

    #[derive(Clone)]
    enum BackendOutcome {
        Succeed,
    }

    #[async_trait]
    impl Backend for ScriptedBackend {
        async fn generate(&self, _request: GenerationRequest<'_>) -> Result<GenerationResult, BackendError> {
            let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
            if call_index < self.fail_first_n {
                let BackendOutcome::Succeed = &self.outcome;
                return Err(BackendError::Transport("scripted failure".into()));
            }
            Ok(GenerationResult { text: "ok".to_string(), token_count: Some(10), elapsed: Duration::from_millis(5) })
        }

        async fn is_available(&self) -> bool {
            self.available
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

    #[tokio::test]
    async fn succeeds_on_primary_with_no_fallback_used() {
        let registry = ModelRegistry::new();
        registry.register(descriptor("primary", "b1"));

        let mut backends: HashMap<String, Box<dyn Backend>> = HashMap::new();
        backends.insert(
            "b1".to_string(),
            Box::new(ScriptedBackend { calls: AtomicU32::new(0), fail_first_n: 0, outcome: BackendOutcome::Succeed, available: true }),
        );

        let cb = CircuitBreaker::with_defaults();
        let engine = ExecutionEngine::new(&registry, &backends, &cb, Duration::from_secs(5));
        let router = IntelligentRouter::new(&registry, RoutingStrategy::Auto, ModelPreferences::new());
        let token = CancellationToken::new();

        let result = engine
            .execute(&router, "hello", false, None, 128, 0.7, 1.0, &token)
            .await
            .unwrap();

        assert_eq!(result.model_used, "primary");
        assert_eq!(result.fallbacks_used, 0);
    }

    #[tokio::test]
    async fn falls_back_to_next_model_on_transport_failure() {
        let registry = ModelRegistry::new();
        registry.register(descriptor("primary", "b1"));
        registry.register(descriptor("fallback", "b2"));

        let mut backends: HashMap<String, Box<dyn Backend>> = HashMap::new();
        backends.insert(
            "b1".to_string(),
            Box::new(ScriptedBackend { calls: AtomicU32::new(0), fail_first_n: 10, outcome: BackendOutcome::Succeed, available: true }),
        );
        backends.insert(
            "b2".to_string(),
            Box::new(ScriptedBackend { calls: AtomicU32::new(0), fail_first_n: 0, outcome: BackendOutcome::Succeed, available: true }),
        );

        let cb = CircuitBreaker::with_defaults();
        let engine = ExecutionEngine::new(&registry, &backends, &cb, Duration::from_secs(5));
        let router = IntelligentRouter::new(&registry, RoutingStrategy::Quality, ModelPreferences::new());
        let token = CancellationToken::new();

        let result = engine
            .execute(&router, "hello", false, None, 128, 0.7, 1.0, &token)
            .await
            .unwrap();

        assert_eq!(result.model_used, "fallback");
        assert_eq!(result.fallbacks_used, 1);
    }

    #[tokio::test]
    async fn open_circuit_skips_backend_without_calling_it() {
        let registry = ModelRegistry::new();
        registry.register(descriptor("primary", "b1"));

        let mut backends: HashMap<String, Box<dyn Backend>> = HashMap::new();
        backends.insert(
            "b1".to_string(),
            Box::new(ScriptedBackend { calls: AtomicU32::new(0), fail_first_n: 0, outcome: BackendOutcome::Succeed, available: true }),
        );

        let cb = CircuitBreaker::new(1, Duration::from_secs(30));
        cb.record_failure("b1");
        assert_eq!(cb.admit("b1"), Admission::Rejected);

        let engine = ExecutionEngine::new(&registry, &backends, &cb, Duration::from_secs(5));
        let router = IntelligentRouter::new(&registry, RoutingStrategy::Auto, ModelPreferences::new());
        let token = CancellationToken::new();

        let err = engine
            .execute(&router, "hello", false, None, 128, 0.7, 1.0, &token)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::AllModelsFailed);
    }

    #[tokio::test]
    async fn cancellation_token_aborts_before_call() {
        let registry = ModelRegistry::new();
        registry.register(descriptor("primary", "b1"));

        let mut backends: HashMap<String, Box<dyn Backend>> = HashMap::new();
        backends.insert(
            "b1".to_string(),
            Box::new(ScriptedBackend { calls: AtomicU32::new(0), fail_first_n: 0, outcome: BackendOutcome::Succeed, available: true }),
        );

        let cb = CircuitBreaker::with_defaults();
        let engine = ExecutionEngine::new(&registry, &backends, &cb, Duration::from_secs(5));
        let router = IntelligentRouter::new(&registry, RoutingStrategy::Auto, ModelPreferences::new());
        let token = CancellationToken::new();
        token.cancel();

        let err = engine
            .execute(&router, "hello", false, None, 128, 0.7, 1.0, &token)
            .await
            .unwrap_err();

        assert_eq!(err.kind, ErrorKind::Cancelled);
    }
}
