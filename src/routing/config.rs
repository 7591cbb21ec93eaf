//! Routing configuration types.
//!
//! Provides [`RoutingConfig`] for tuning the escalation thresholds, the
//! complexity heuristics, and the vocabulary lists the policy scans for.
//! All fields have defaults and are (de)serialisable via serde for TOML/JSON
//! config files.

use regex::RegexSet;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ── Default value functions ────────────────────────────────────────────

/// Default fast-model confidence below which requests escalate.
fn default_min_fast_confidence() -> f64 {
    0.7
}

/// Default maximum text length (code points) the fast model may handle.
fn default_max_fast_length() -> usize {
    200
}

/// Default word count above which the word-count signal fires.
fn default_word_count_threshold() -> usize {
    20
}

/// Default special-character ratio above which the special-char signal fires.
fn default_special_char_threshold() -> f64 {
    0.3
}

/// Default complexity score above which requests escalate.
fn default_high_complexity_threshold() -> f64 {
    0.7
}

/// Terms that mark sarcasm, irony or hedging. Order is significant: the first
/// match names the escalation reason.
fn default_nuance_terms() -> Vec<String> {
    [
        "сарказм",
        "ирония",
        "конечно",
        "ещё бы",
        "наверное",
        "возможно",
        "может быть",
        "скорее всего",
        "с одной стороны",
        "с другой стороны",
        "если бы",
        "хотелось бы",
        "желательно",
        "по сравнению",
        "в отличие от",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Contrastive and hedging connectives for the complexity signal.
fn default_contrastive_terms() -> Vec<String> {
    [
        "но",
        "однако",
        "хотя",
        "несмотря на",
        "в то время как",
        "тем не менее",
        "впрочем",
        "следовательно",
        "таким образом",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Double-negation regular expressions, matched against lower-cased text.
fn default_negation_patterns() -> Vec<String> {
    [r"не\s+не", r"ни\s+ни", r"без\s+не"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

// ── RoutingConfig ──────────────────────────────────────────────────────

/// Configuration for the routing policy and its complexity scorer.
///
/// Constructed once and shared read-only by every request.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RoutingConfig {
    /// Fast-model confidence below which a request is escalated.
    ///
    /// Range: `0.0..=1.0`.  Default: `0.7`.
    #[serde(default = "default_min_fast_confidence")]
    pub min_fast_confidence: f64,

    /// Longest text, in code points, the fast model is trusted with.
    ///
    /// Also the denominator of the length complexity factor.  Default: `200`.
    #[serde(default = "default_max_fast_length")]
    pub max_fast_length: usize,

    /// Word count above which the word-count signal adds `0.2`.  Default: `20`.
    #[serde(default = "default_word_count_threshold")]
    pub word_count_threshold: usize,

    /// Special-character ratio above which the special-char signal adds `0.2`.
    ///
    /// Range: `0.0..=1.0`.  Default: `0.3`.
    #[serde(default = "default_special_char_threshold")]
    pub special_char_threshold: f64,

    /// Complexity score above which a request is escalated.
    ///
    /// Range: `0.0..=1.0`.  Default: `0.7`.
    #[serde(default = "default_high_complexity_threshold")]
    pub high_complexity_threshold: f64,

    /// Vocabulary that always requires the accurate model, scanned in order.
    #[serde(default = "default_nuance_terms")]
    pub nuance_terms: Vec<String>,

    /// Contrastive connectives feeding the complexity score.
    #[serde(default = "default_contrastive_terms")]
    pub contrastive_terms: Vec<String>,

    /// Regular expressions detecting double negation.
    #[serde(default = "default_negation_patterns")]
    pub negation_patterns: Vec<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            min_fast_confidence: default_min_fast_confidence(),
            max_fast_length: default_max_fast_length(),
            word_count_threshold: default_word_count_threshold(),
            special_char_threshold: default_special_char_threshold(),
            high_complexity_threshold: default_high_complexity_threshold(),
            nuance_terms: default_nuance_terms(),
            contrastive_terms: default_contrastive_terms(),
            negation_patterns: default_negation_patterns(),
        }
    }
}

/// Validate a [`RoutingConfig`], returning a list of human-readable errors.
///
/// # Arguments
///
/// * `config`: The routing configuration to validate.
///
/// # Returns
///
/// An empty `Vec` on success, or one error string per violated constraint.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &RoutingConfig) -> Vec<String> {
    let mut errors = Vec::new();

    check_unit_range(
        &mut errors,
        "min_fast_confidence",
        config.min_fast_confidence,
    );
    check_unit_range(
        &mut errors,
        "special_char_threshold",
        config.special_char_threshold,
    );
    check_unit_range(
        &mut errors,
        "high_complexity_threshold",
        config.high_complexity_threshold,
    );

    if config.max_fast_length == 0 {
        errors.push("max_fast_length must be > 0".to_string());
    }

    check_terms(&mut errors, "nuance_terms", &config.nuance_terms);
    check_terms(&mut errors, "contrastive_terms", &config.contrastive_terms);

    if let Err(e) = RegexSet::new(&config.negation_patterns) {
        errors.push(format!("negation_patterns contains an invalid pattern: {e}"));
    }

    errors
}

fn check_unit_range(errors: &mut Vec<String>, field: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(format!("{field} must be in [0.0, 1.0], got {value}"));
    }
}

fn check_terms(errors: &mut Vec<String>, field: &str, terms: &[String]) {
    for (i, term) in terms.iter().enumerate() {
        if term.trim().is_empty() {
            errors.push(format!("{field}[{i}] must not be empty"));
        } else if term.to_lowercase() != *term {
            // Terms are matched against lower-cased text.
            errors.push(format!("{field}[{i}] must be lower-case, got {term:?}"));
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // -- defaults --------------------------------------------------------

    #[test]
    fn test_default_min_fast_confidence_returns_0_7() {
        assert!((default_min_fast_confidence() - 0.7).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_max_fast_length_returns_200() {
        assert_eq!(default_max_fast_length(), 200);
    }

    #[test]
    fn test_default_word_count_threshold_returns_20() {
        assert_eq!(default_word_count_threshold(), 20);
    }

    #[test]
    fn test_default_special_char_threshold_returns_0_3() {
        assert!((default_special_char_threshold() - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn test_default_nuance_terms_start_with_sarcasm_markers() {
        let terms = default_nuance_terms();
        assert_eq!(terms.len(), 15);
        assert_eq!(terms[0], "сарказм");
        assert_eq!(terms[1], "ирония");
    }

    #[test]
    fn test_default_negation_patterns_compile() {
        assert!(RegexSet::new(default_negation_patterns()).is_ok());
    }

    // -- serde -----------------------------------------------------------

    #[test]
    fn test_routing_config_toml_roundtrip() {
        let cfg = RoutingConfig::default();
        let toml_str = toml::to_string_pretty(&cfg)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: serialize: {e}")));
        let parsed: RoutingConfig = toml::from_str(&toml_str)
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: deserialize: {e}")));
        assert_eq!(cfg, parsed);
    }

    #[test]
    fn test_routing_config_deserializes_with_defaults() {
        // Empty table → all defaults
        let cfg: RoutingConfig = toml::from_str("")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: deserialize: {e}")));
        assert_eq!(cfg, RoutingConfig::default());
    }

    #[test]
    fn test_routing_config_partial_override_keeps_other_defaults() {
        let cfg: RoutingConfig = toml::from_str("min_fast_confidence = 0.9\nmax_fast_length = 50")
            .unwrap_or_else(|e| std::panic::panic_any(format!("test: deserialize: {e}")));
        assert!((cfg.min_fast_confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(cfg.max_fast_length, 50);
        assert_eq!(cfg.word_count_threshold, 20);
        assert_eq!(cfg.nuance_terms, default_nuance_terms());
    }

    // -- validation ------------------------------------------------------

    #[test]
    fn test_validate_default_config_passes() {
        let errors = validate(&RoutingConfig::default());
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn test_validate_min_fast_confidence_above_1_fails() {
        let cfg = RoutingConfig {
            min_fast_confidence: 1.1,
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("min_fast_confidence")));
    }

    #[test]
    fn test_validate_nan_threshold_fails() {
        let cfg = RoutingConfig {
            high_complexity_threshold: f64::NAN,
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("high_complexity_threshold")));
    }

    #[test]
    fn test_validate_zero_max_fast_length_fails() {
        let cfg = RoutingConfig {
            max_fast_length: 0,
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("max_fast_length")));
    }

    #[test]
    fn test_validate_blank_nuance_term_fails() {
        let cfg = RoutingConfig {
            nuance_terms: vec!["ирония".to_string(), "  ".to_string()],
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("nuance_terms[1]")));
    }

    #[test]
    fn test_validate_upper_case_term_fails() {
        let cfg = RoutingConfig {
            contrastive_terms: vec!["Однако".to_string()],
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("contrastive_terms[0]")));
    }

    #[test]
    fn test_validate_invalid_negation_pattern_fails() {
        let cfg = RoutingConfig {
            negation_patterns: vec![r"не\s+(".to_string()],
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(errors.iter().any(|e| e.contains("negation_patterns")));
    }

    #[test]
    fn test_validate_collects_multiple_errors() {
        let cfg = RoutingConfig {
            min_fast_confidence: -1.0,
            special_char_threshold: 2.0,
            max_fast_length: 0,
            nuance_terms: vec![String::new()],
            ..RoutingConfig::default()
        };
        let errors = validate(&cfg);
        assert!(
            errors.len() >= 4,
            "expected >=4 errors, got {}",
            errors.len()
        );
    }

    #[test]
    fn test_validate_boundary_values_pass() {
        let cfg = RoutingConfig {
            min_fast_confidence: 0.0,
            special_char_threshold: 1.0,
            high_complexity_threshold: 1.0,
            ..RoutingConfig::default()
        };
        assert!(validate(&cfg).is_empty());
    }
}
