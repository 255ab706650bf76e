//! Task Classifier (spec.md §4.D) — a pure, synchronous mapping from a
//! query string to a `TaskClassification`. No I/O, no randomness: the same
//! input always yields the same output.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    Expert,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Code,
    Math,
    Analysis,
    Creative,
    Factual,
    Chat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskClassification {
    pub complexity: Complexity,
    pub category: Category,
    pub requires_code: bool,
    pub requires_math: bool,
    pub requires_vision: bool,
    pub estimated_tokens: u32,
}

const TRIVIAL_LEXICON: &[&str] = &[
    "hi", "hello", "hey", "yo", "thanks", "thank you", "ok", "okay", "yes", "no", "sure",
    "bye", "goodbye", "good morning", "good night",
];

const ANALYSIS_VERBS: &[&str] = &["analyze", "compare", "design", "evaluate", "critique"];
const EXPERT_MARKERS: &[&str] = &["prove", "derive", "architect", "optimize complexity"];
const CODE_KEYWORDS: &[&str] = &[
    "function", "class ", "def ", "fn ", "variable", "compile", "bug", "stack trace",
    "refactor", "algorithm", "api", "regex", "exception", "null pointer",
];
const MATH_KEYWORDS: &[&str] = &[
    "equation", "integral", "derivative", "matrix", "probability", "theorem", "calculate",
];
const MATH_OPERATORS: &[&str] = &["+", "-", "*", "/", "=", "∫", "∑", "√"];
const CREATIVE_KEYWORDS: &[&str] = &["story", "poem", "write a", "imagine", "fiction", "lyrics"];
const FACTUAL_KEYWORDS: &[&str] = &["what is", "who is", "when did", "where is", "define", "how many"];

fn contains_code_fence(query: &str) -> bool {
    query.contains("```")
}

fn contains_nested_code_fence(query: &str) -> bool {
    query.matches("```").count() >= 4
}

fn has_any(query_lower: &str, lexicon: &[&str]) -> bool {
    lexicon.iter().any(|term| query_lower.contains(term))
}

fn classify_complexity(query: &str, query_lower: &str) -> Complexity {
    let len = query.chars().count();

    if contains_nested_code_fence(query)
        || len > 1500
        || has_any(query_lower, EXPERT_MARKERS)
    {
        return Complexity::Expert;
    }

    if contains_code_fence(query) || len > 500 || has_any(query_lower, ANALYSIS_VERBS) {
        return Complexity::Complex;
    }

    if len <= 40 && has_any(query_lower, TRIVIAL_LEXICON) {
        return Complexity::Trivial;
    }

    if len <= 160 && !contains_code_fence(query) {
        return Complexity::Simple;
    }

    Complexity::Moderate
}

fn classify_category(query_lower: &str, requires_code: bool, requires_math: bool) -> Category {
    if requires_code {
        return Category::Code;
    }
    if requires_math {
        return Category::Math;
    }
    if has_any(query_lower, ANALYSIS_VERBS) {
        return Category::Analysis;
    }
    if has_any(query_lower, CREATIVE_KEYWORDS) {
        return Category::Creative;
    }
    if has_any(query_lower, FACTUAL_KEYWORDS) {
        return Category::Factual;
    }
    Category::Chat
}

/// Classify a query. `has_attachment` is passed in by the caller (spec.md
/// §4.D: "`requiresVision` iff caller signals an attachment").
pub fn classify(query: &str, has_attachment: bool) -> TaskClassification {
    let query_lower = query.to_lowercase();

    let requires_code = contains_code_fence(query) || has_any(&query_lower, CODE_KEYWORDS);
    let requires_math = MATH_OPERATORS.iter().any(|op| query.contains(op)) || has_any(&query_lower, MATH_KEYWORDS);

    let complexity = classify_complexity(query, &query_lower);
    let category = classify_category(&query_lower, requires_code, requires_math);

    // Rough heuristic: ~1 token per 4 characters of input, plus headroom
    // for a response proportional to complexity.
    let input_tokens = (query.chars().count() as u32 / 4).max(1);
    let response_budget = match complexity {
        Complexity::Trivial => 32,
        Complexity::Simple => 128,
        Complexity::Moderate => 384,
        Complexity::Complex => 1024,
        Complexity::Expert => 2048,
    };

    TaskClassification {
        complexity,
        category,
        requires_code,
        requires_math,
        requires_vision: has_attachment,
        estimated_tokens: input_tokens + response_budget,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_is_trivial_chat() {
        let c = classify("hey", false);
        assert_eq!(c.complexity, Complexity::Trivial);
        assert_eq!(c.category, Category::Chat);
    }

    #[test]
    fn short_factual_question_is_simple() {
        let c = classify("What is the capital of France?", false);
        assert_eq!(c.complexity, Complexity::Simple);
        assert_eq!(c.category, Category::Factual);
    }

    #[test]
    fn long_plain_prose_defaults_to_moderate() {
        let query = "a".repeat(300);
        let c = classify(&query, false);
        assert_eq!(c.complexity, Complexity::Moderate);
    }

    #[test]
    fn analyze_verb_forces_complex_and_analysis_category() {
        let c = classify("Please analyze this dataset for trends.", false);
        assert_eq!(c.complexity, Complexity::Complex);
        assert_eq!(c.category, Category::Analysis);
    }

    #[test]
    fn code_fence_forces_complex_and_code_category() {
        let query = "Why does this fail?\n```rust\nfn main() {}\n```";
        let c = classify(query, false);
        assert_eq!(c.complexity, Complexity::Complex);
        assert_eq!(c.category, Category::Code);
        assert!(c.requires_code);
    }

    #[test]
    fn nested_code_fences_force_expert() {
        let query = "```outer\n```inner\ncode\n```\n```";
        let c = classify(query, false);
        assert_eq!(c.complexity, Complexity::Expert);
    }

    #[test]
    fn prove_keyword_forces_expert() {
        let c = classify("Prove that the square root of two is irrational.", false);
        assert_eq!(c.complexity, Complexity::Expert);
    }

    #[test]
    fn math_operators_set_requires_math() {
        let c = classify("What is 2 + 2?", false);
        assert!(c.requires_math);
        assert_eq!(c.category, Category::Math);
    }

    #[test]
    fn attachment_flag_passes_through_to_requires_vision() {
        let c = classify("describe this image", true);
        assert!(c.requires_vision);
        let c2 = classify("describe this image", false);
        assert!(!c2.requires_vision);
    }

    #[test]
    fn classification_is_deterministic() {
        let a = classify("analyze this architecture", false);
        let b = classify("analyze this architecture", false);
        assert_eq!(a.complexity, b.complexity);
        assert_eq!(a.category, b.category);
        assert_eq!(a.estimated_tokens, b.estimated_tokens);
    }
}
