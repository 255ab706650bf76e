//! Intelligent Router (spec.md §4.E) — selects a primary model and fallback
//! chain for a classified query, grounded in
//! `original_source/routing/intelligent_router.py`'s `IntelligentRouter`.

use crate::classifier::{self, Category, Complexity, TaskClassification};
use crate::model_registry::{Capability, ModelDescriptor, ModelRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    Auto,
    Speed,
    Quality,
    Balanced,
    CostOptimized,
}

/// Operator override: complexity -> ordered list of preferred model ids.
pub type ModelPreferences = HashMap<Complexity, Vec<String>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub model_id: String,
    pub model: ModelDescriptor,
    pub classification: TaskClassification,
    pub strategy_used: RoutingStrategy,
    pub fallback_models: Vec<String>,
    pub reasoning: String,
}

const UNAVAILABLE_MODEL_ID: &str = "__unavailable__";

pub struct IntelligentRouter<'a> {
    registry: &'a ModelRegistry,
    strategy: RoutingStrategy,
    preferences: ModelPreferences,
}

impl<'a> IntelligentRouter<'a> {
    pub fn new(registry: &'a ModelRegistry, strategy: RoutingStrategy, preferences: ModelPreferences) -> Self {
        Self { registry, strategy, preferences }
    }

    pub fn route(&self, query: &str, has_attachment: bool, max_cost: f32) -> RoutingDecision {
        let classification = classifier::classify(query, has_attachment);

        let model = self
            .select_primary(&classification, max_cost)
            .unwrap_or_else(|| unavailable_descriptor());

        let fallbacks = self.build_fallback_chain(&model, max_cost);
        let reasoning = self.generate_reasoning(&model, &classification, &fallbacks);

        RoutingDecision {
            model_id: model.model_id.clone(),
            model,
            classification,
            strategy_used: self.strategy,
            fallback_models: fallbacks,
            reasoning,
        }
    }

    fn select_primary(&self, classification: &TaskClassification, max_cost: f32) -> Option<ModelDescriptor> {
        match self.strategy {
            RoutingStrategy::Auto => self.route_auto(classification, max_cost),
            RoutingStrategy::Speed => self.route_speed(classification),
            RoutingStrategy::Quality => self.route_quality(classification, max_cost),
            RoutingStrategy::Balanced => self.route_balanced(classification, max_cost),
            RoutingStrategy::CostOptimized => self.route_cost_optimized(classification),
        }
    }

    fn route_auto(&self, classification: &TaskClassification, max_cost: f32) -> Option<ModelDescriptor> {
        if let Some(preferred_ids) = self.preferences.get(&classification.complexity) {
            for id in preferred_ids {
                if let Some(model) = self.registry.get(id) {
                    if model.available && model.cost <= max_cost {
                        return Some(model);
                    }
                }
            }
        }

        let capability = if classification.requires_code {
            Capability::Code
        } else {
            category_capability(classification.category)
        };

        self.registry
            .best_quality_with(capability, max_cost)
            .or_else(|| self.registry.cheapest_available())
    }

    fn route_speed(&self, classification: &TaskClassification) -> Option<ModelDescriptor> {
        let capability = self.strongest_required_capability(classification);
        self.registry.fastest_with(Some(capability))
    }

    fn route_quality(&self, classification: &TaskClassification, max_cost: f32) -> Option<ModelDescriptor> {
        let capability = self.strongest_required_capability(classification);
        self.registry
            .best_quality_with(capability, max_cost)
            .or_else(|| self.registry.cheapest_available())
    }

    fn route_balanced(&self, classification: &TaskClassification, max_cost: f32) -> Option<ModelDescriptor> {
        match classification.complexity {
            Complexity::Trivial | Complexity::Simple => self.route_speed(classification),
            Complexity::Complex | Complexity::Expert => self.route_quality(classification, max_cost),
            Complexity::Moderate => self.route_auto(classification, max_cost * 0.7),
        }
    }

    fn route_cost_optimized(&self, classification: &TaskClassification) -> Option<ModelDescriptor> {
        let capability = self.strongest_required_capability(classification);
        self.registry
            .list()
            .into_iter()
            .filter(|m| m.available && m.has_capability(capability))
            .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
            .or_else(|| self.registry.cheapest_available())
    }

    fn strongest_required_capability(&self, classification: &TaskClassification) -> Capability {
        if classification.requires_vision {
            Capability::Vision
        } else if classification.requires_code {
            Capability::Code
        } else if classification.requires_math {
            Capability::Math
        } else {
            category_capability(classification.category)
        }
    }

    fn build_fallback_chain(&self, primary: &ModelDescriptor, max_cost: f32) -> Vec<String> {
        let mut candidates: Vec<ModelDescriptor> = self
            .registry
            .list()
            .into_iter()
            .filter(|m| m.model_id != primary.model_id && m.available && m.cost <= max_cost)
            .collect();

        candidates.sort_by(|a, b| {
            b.quality_score
                .partial_cmp(&a.quality_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.model_id.cmp(&b.model_id))
        });

        candidates.into_iter().take(3).map(|m| m.model_id).collect()
    }

    fn generate_reasoning(&self, model: &ModelDescriptor, classification: &TaskClassification, fallbacks: &[String]) -> String {
        if model.model_id == UNAVAILABLE_MODEL_ID {
            return "no models available in the registry; nothing to route to".to_string();
        }

        format!(
            "strategy={:?} complexity={:?} category={:?} selected={} (quality={:.2}, cost={:.2}); {} fallback(s): [{}]",
            self.strategy,
            classification.complexity,
            classification.category,
            model.model_id,
            model.quality_score,
            model.cost,
            fallbacks.len(),
            fallbacks.join(", "),
        )
    }
}

fn category_capability(category: Category) -> Capability {
    match category {
        Category::Code => Capability::Code,
        Category::Math => Capability::Math,
        Category::Analysis => Capability::Reasoning,
        Category::Creative | Category::Factual | Category::Chat => Capability::General,
    }
}

/// A designated no-op descriptor returned when the registry has nothing
/// available at all (spec.md §4.E). The Execution Engine treats this as
/// fatal rather than attempting a `generate` call against it.
fn unavailable_descriptor() -> ModelDescriptor {
    ModelDescriptor {
        model_id: UNAVAILABLE_MODEL_ID.to_string(),
        display_name: "unavailable".to_string(),
        backend_id: UNAVAILABLE_MODEL_ID.to_string(),
        api_model_name: UNAVAILABLE_MODEL_ID.to_string(),
        capabilities: Default::default(),
        speed_class: crate::model_registry::SpeedClass::Slow,
        parameter_size: "none".to_string(),
        context_window: 0,
        cost: 1.0,
        quality_score: 0.0,
        available: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_registry::SpeedClass;

    fn descriptor(id: &str, speed: SpeedClass, cost: f32, quality: f32, caps: &[Capability]) -> ModelDescriptor {
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

    fn populated_registry() -> ModelRegistry {
        let reg = ModelRegistry::new();
        reg.register(descriptor("small-fast", SpeedClass::Instant, 0.0, 0.3, &[Capability::General]));
        reg.register(descriptor("mid", SpeedClass::Balanced, 0.3, 0.6, &[Capability::General, Capability::Code]));
        reg.register(descriptor("big-quality", SpeedClass::Slow, 0.8, 0.95, &[Capability::General, Capability::Code, Capability::Reasoning]));
        reg
    }

    #[test]
    fn speed_strategy_picks_fastest_available() {
        let reg = populated_registry();
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Speed, ModelPreferences::new());
        let decision = router.route("hi", false, 1.0);
        assert_eq!(decision.model_id, "small-fast");
    }

    #[test]
    fn quality_strategy_picks_best_quality_under_cost_cap() {
        let reg = populated_registry();
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Quality, ModelPreferences::new());
        let decision = router.route("analyze this dataset", false, 1.0);
        assert_eq!(decision.model_id, "big-quality");
    }

    #[test]
    fn quality_strategy_respects_max_cost() {
        let reg = populated_registry();
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Quality, ModelPreferences::new());
        let decision = router.route("analyze this dataset", false, 0.5);
        assert_eq!(decision.model_id, "mid");
    }

    #[test]
    fn balanced_uses_speed_for_trivial_and_quality_for_expert() {
        let reg = populated_registry();
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Balanced, ModelPreferences::new());

        let trivial = router.route("hey", false, 1.0);
        assert_eq!(trivial.model_id, "small-fast");

        let expert = router.route("prove this theorem rigorously", false, 1.0);
        assert_eq!(expert.model_id, "big-quality");
    }

    #[test]
    fn fallback_chain_excludes_primary_and_caps_at_three() {
        let reg = ModelRegistry::new();
        for i in 0..5 {
            reg.register(descriptor(&format!("m{i}"), SpeedClass::Fast, 0.1, i as f32 / 10.0, &[Capability::General]));
        }
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Quality, ModelPreferences::new());
        let decision = router.route("hello", false, 1.0);
        assert!(!decision.fallback_models.contains(&decision.model_id));
        assert!(decision.fallback_models.len() <= 3);
    }

    #[test]
    fn empty_registry_yields_unavailable_decision() {
        let reg = ModelRegistry::new();
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Auto, ModelPreferences::new());
        let decision = router.route("hi", false, 1.0);
        assert_eq!(decision.model_id, UNAVAILABLE_MODEL_ID);
        assert!(decision.fallback_models.is_empty());
    }

    #[test]
    fn operator_preferences_override_auto_routing() {
        let reg = populated_registry();
        let mut prefs = ModelPreferences::new();
        prefs.insert(Complexity::Trivial, vec!["big-quality".to_string()]);
        let router = IntelligentRouter::new(&reg, RoutingStrategy::Auto, prefs);
        let decision = router.route("hi", false, 1.0);
        assert_eq!(decision.model_id, "big-quality");
    }
}
