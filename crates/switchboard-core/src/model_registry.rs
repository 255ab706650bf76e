//! Model Registry (spec.md §4.A) — the static + discovered catalog of
//! model capabilities that the Router and Execution Engine select from.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// A capability a model may offer. Used by the Router to filter candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    General,
    Code,
    Math,
    Reasoning,
    Vision,
    Speed,
}

/// Coarse latency tier used for SPEED-strategy ordering.
///
/// Ordered INSTANT < FAST < BALANCED < SLOW; derive order follows
/// declaration order, matching spec.md §4.A's required ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedClass {
    Instant,
    Fast,
    Balanced,
    Slow,
}

/// An immutable (post-registration) description of one model's
/// capabilities, cost, and the backend that serves it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub display_name: String,
    pub backend_id: String,
    pub api_model_name: String,
    pub capabilities: HashSet<Capability>,
    pub speed_class: SpeedClass,
    /// Opaque size bucket, e.g. "7b", "70b", "cloud".
    pub parameter_size: String,
    pub context_window: u32,
    /// Normalized cost in [0, 1]; 0 is free/local, 1 is most expensive.
    pub cost: f32,
    /// Normalized quality score in [0, 1].
    pub quality_score: f32,
    pub available: bool,
}

impl ModelDescriptor {
    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}

/// Catalog of known models, keyed by `model_id`. Registration is permanent
/// (descriptors are immutable once registered); only `available` may be
/// flipped after the fact via `set_available`.
#[derive(Default)]
pub struct ModelRegistry {
    models: RwLock<HashMap<String, ModelDescriptor>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Register a model descriptor. Overwrites any existing entry with the
    /// same `model_id`.
    pub fn register(&self, descriptor: ModelDescriptor) {
        tracing::debug!(model_id = %descriptor.model_id, backend_id = %descriptor.backend_id, "registered model");
        let mut models = self.models.write().expect("model registry lock poisoned");
        models.insert(descriptor.model_id.clone(), descriptor);
    }

    pub fn get(&self, model_id: &str) -> Option<ModelDescriptor> {
        self.models
            .read()
            .expect("model registry lock poisoned")
            .get(model_id)
            .cloned()
    }

    pub fn list(&self) -> Vec<ModelDescriptor> {
        self.models
            .read()
            .expect("model registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub fn set_available(&self, model_id: &str, available: bool) {
        let mut models = self.models.write().expect("model registry lock poisoned");
        if let Some(descriptor) = models.get_mut(model_id) {
            descriptor.available = available;
            tracing::info!(model_id, available, "model availability changed");
        }
    }

    /// Fastest available model, optionally filtered by capability.
    ///
    /// Ordered by `speed_class` ascending, then `cost` ascending, ties
    /// broken by lexicographic `model_id` (spec.md §4.A).
    pub fn fastest_with(&self, capability: Option<Capability>) -> Option<ModelDescriptor> {
        let models = self.models.read().expect("model registry lock poisoned");
        models
            .values()
            .filter(|m| m.available)
            .filter(|m| capability.map(|c| m.has_capability(c)).unwrap_or(true))
            .min_by(|a, b| {
                a.speed_class
                    .cmp(&b.speed_class)
                    .then_with(|| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
                    .then_with(|| a.model_id.cmp(&b.model_id))
            })
            .cloned()
    }

    /// Best-quality model under `max_cost` that has `capability`.
    ///
    /// Ordered by `quality_score` descending, ties broken by `cost`
    /// ascending (spec.md §4.A).
    pub fn best_quality_with(&self, capability: Capability, max_cost: f32) -> Option<ModelDescriptor> {
        let models = self.models.read().expect("model registry lock poisoned");
        models
            .values()
            .filter(|m| m.available)
            .filter(|m| m.cost <= max_cost)
            .filter(|m| m.has_capability(capability))
            .max_by(|a, b| {
                a.quality_score
                    .partial_cmp(&b.quality_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| b.cost.partial_cmp(&a.cost).unwrap_or(std::cmp::Ordering::Equal))
            })
            .cloned()
    }

    /// Any available model, cheapest first; used by COST_OPTIMIZED routing
    /// and as the last-resort fallback when nothing else matches.
    pub fn cheapest_available(&self) -> Option<ModelDescriptor> {
        let models = self.models.read().expect("model registry lock poisoned");
        models
            .values()
            .filter(|m| m.available)
            .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
            .cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().expect("model registry lock poisoned").is_empty()
    }

    pub fn any_available(&self) -> bool {
        self.models
            .read()
            .expect("model registry lock poisoned")
            .values()
            .any(|m| m.available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(id: &str, speed: SpeedClass, cost: f32, quality: f32, caps: &[Capability]) -> ModelDescriptor {
        ModelDescriptor {
            model_id: id.to_string(),
            display_name: id.to_string(),
            backend_id: "local".to_string(),
            api_model_name: id.to_string(),
            capabilities: caps.iter().copied().collect(),
            speed_class: speed,
            parameter_size: "7b".to_string(),
            context_window: 8192,
            cost,
            quality_score: quality,
            available: true,
        }
    }

    #[test]
    fn fastest_with_orders_by_speed_then_cost_then_id() {
        let reg = ModelRegistry::new();
        reg.register(model("b-fast", SpeedClass::Fast, 0.5, 0.5, &[Capability::General]));
        reg.register(model("a-fast", SpeedClass::Fast, 0.5, 0.5, &[Capability::General]));
        reg.register(model("instant", SpeedClass::Instant, 0.9, 0.1, &[Capability::General]));

        let fastest = reg.fastest_with(None).unwrap();
        assert_eq!(fastest.model_id, "instant");
    }

    #[test]
    fn fastest_with_ties_broken_lexicographically() {
        let reg = ModelRegistry::new();
        reg.register(model("zeta", SpeedClass::Fast, 0.3, 0.5, &[Capability::General]));
        reg.register(model("alpha", SpeedClass::Fast, 0.3, 0.5, &[Capability::General]));

        let fastest = reg.fastest_with(None).unwrap();
        assert_eq!(fastest.model_id, "alpha");
    }

    #[test]
    fn best_quality_with_filters_by_cost_and_capability() {
        let reg = ModelRegistry::new();
        reg.register(model("cheap-ok", SpeedClass::Balanced, 0.1, 0.6, &[Capability::Code]));
        reg.register(model("expensive-great", SpeedClass::Slow, 0.9, 0.99, &[Capability::Code]));
        reg.register(model("no-code", SpeedClass::Fast, 0.05, 0.95, &[Capability::General]));

        let best = reg.best_quality_with(Capability::Code, 0.5).unwrap();
        assert_eq!(best.model_id, "cheap-ok");
    }

    #[test]
    fn unavailable_models_never_surface() {
        let reg = ModelRegistry::new();
        let mut m = model("offline", SpeedClass::Instant, 0.0, 1.0, &[Capability::General]);
        m.available = false;
        reg.register(m);

        assert!(reg.fastest_with(None).is_none());
        assert!(reg.best_quality_with(Capability::General, 1.0).is_none());
        assert!(!reg.any_available());
    }

    #[test]
    fn set_available_flips_visibility() {
        let reg = ModelRegistry::new();
        let mut m = model("flaky", SpeedClass::Fast, 0.2, 0.5, &[Capability::General]);
        m.available = false;
        reg.register(m);
        assert!(reg.fastest_with(None).is_none());

        reg.set_available("flaky", true);
        assert!(reg.fastest_with(None).is_some());
    }

    #[test]
    fn no_match_returns_none_never_panics() {
        let reg = ModelRegistry::new();
        assert!(reg.get("missing").is_none());
        assert!(reg.fastest_with(Some(Capability::Vision)).is_none());
    }
}
