//! Routing policy.
//!
//! The [`RoutingPolicy`] combines a [`ComplexityScorer`](super::ComplexityScorer)
//! with a [`RoutingConfig`](super::RoutingConfig) to decide whether the fast
//! classifier's answer can be trusted or the request must escalate to the
//! accurate classifier.
//!
//! Rules are an ordered table evaluated top to bottom; the first rule that
//! produces a [`RoutingReason`] wins:
//!
//! | # | Rule              | Verdict                       |
//! |---|-------------------|-------------------------------|
//! | 1 | empty text        | fast, `EMPTY_TEXT`            |
//! | 2 | nuance vocabulary | accurate, `PATTERN_MATCH:<t>` |
//! | 3 | length ceiling    | accurate, `TOO_LONG:<n>`      |
//! | 4 | fast confidence   | accurate, `LOW_CONFIDENCE:<c>`|
//! | 5 | complexity        | accurate, `HIGH_COMPLEXITY:<s>`|
//! | - | otherwise         | fast, `SIMPLE_TEXT`           |

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::config::RoutingConfig;
use super::scorer::{ComplexityScore, ComplexityScorer};
use crate::config::ConfigError;

// ── Reason codes ───────────────────────────────────────────────────────

/// Why a verdict was reached.
///
/// Renders as a stable reason code (`TOO_LONG:250`) through [`fmt::Display`]
/// and serde, and as prose through [`RoutingReason::description`].
#[derive(Debug, Clone, PartialEq)]
pub enum RoutingReason {
    /// The text is empty or whitespace only.
    EmptyText,
    /// The text contains a term from the nuance vocabulary.
    PatternMatch(String),
    /// The text is longer than the fast-path ceiling (code points).
    TooLong(usize),
    /// The fast classifier's confidence is below the minimum, rounded to two
    /// decimals as rendered.
    LowConfidence(f64),
    /// The complexity score is above the escalation threshold, rounded to two
    /// decimals as rendered.
    HighComplexity(f64),
    /// None of the escalation rules fired.
    SimpleText,
}

impl RoutingReason {
    /// Return `true` if this reason keeps the request on the fast path.
    pub fn allows_fast(&self) -> bool {
        matches!(self, Self::EmptyText | Self::SimpleText)
    }

    /// The reason code without its argument, e.g. `TOO_LONG`.
    ///
    /// Used as a low-cardinality metrics label.
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyText => "EMPTY_TEXT",
            Self::PatternMatch(_) => "PATTERN_MATCH",
            Self::TooLong(_) => "TOO_LONG",
            Self::LowConfidence(_) => "LOW_CONFIDENCE",
            Self::HighComplexity(_) => "HIGH_COMPLEXITY",
            Self::SimpleText => "SIMPLE_TEXT",
        }
    }

    /// Human-readable explanation for logs and API consumers.
    pub fn description(&self) -> String {
        match self {
            Self::EmptyText => "Empty text".to_string(),
            Self::PatternMatch(term) => format!("Contains pattern: '{term}'"),
            Self::TooLong(len) => format!("Text too long ({len} chars)"),
            Self::LowConfidence(c) => format!("Low fast model confidence: {c:.2}"),
            Self::HighComplexity(s) => format!("High text complexity: {s:.2}"),
            Self::SimpleText => "Simple text with sufficient confidence".to_string(),
        }
    }

    fn parse(code: &str) -> Option<Self> {
        let (head, arg) = match code.split_once(':') {
            Some((h, a)) => (h, Some(a)),
            None => (code, None),
        };
        match (head, arg) {
            ("EMPTY_TEXT", None) => Some(Self::EmptyText),
            ("SIMPLE_TEXT", None) => Some(Self::SimpleText),
            ("PATTERN_MATCH", Some(t)) => Some(Self::PatternMatch(t.to_string())),
            ("TOO_LONG", Some(n)) => n.parse().ok().map(Self::TooLong),
            ("LOW_CONFIDENCE", Some(c)) => c.parse().ok().map(Self::LowConfidence),
            ("HIGH_COMPLEXITY", Some(s)) => s.parse().ok().map(Self::HighComplexity),
            _ => None,
        }
    }
}

impl fmt::Display for RoutingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyText | Self::SimpleText => f.write_str(self.code()),
            Self::PatternMatch(term) => write!(f, "PATTERN_MATCH:{term}"),
            Self::TooLong(len) => write!(f, "TOO_LONG:{len}"),
            Self::LowConfidence(c) => write!(f, "LOW_CONFIDENCE:{c:.2}"),
            Self::HighComplexity(s) => write!(f, "HIGH_COMPLEXITY:{s:.2}"),
        }
    }
}

impl Serialize for RoutingReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RoutingReason {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Self::parse(&code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown routing reason: {code}")))
    }
}

// ── Verdict ────────────────────────────────────────────────────────────

/// The routing decision for a single text.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingVerdict {
    /// `true` if the fast classifier's output is trusted.
    pub use_fast: bool,
    /// Reason code explaining the verdict.
    pub reason: RoutingReason,
    /// Fast-classifier confidence seen by the policy, if any.
    pub fast_confidence: Option<f64>,
    /// Complexity score, when the policy computed one before deciding.
    pub complexity: Option<ComplexityScore>,
}

impl RoutingVerdict {
    /// Return `true` if the verdict escalates to the accurate classifier.
    pub fn is_escalation(&self) -> bool {
        !self.use_fast
    }
}

// ── Rule chain ─────────────────────────────────────────────────────────

/// Per-request state shared by the rules.
struct RuleContext<'a> {
    text: &'a str,
    lower: String,
    length: usize,
    fast_confidence: Option<f64>,
    complexity: Option<ComplexityScore>,
}

impl RuleContext<'_> {
    /// Compute the complexity once, on first use.
    fn complexity(&mut self, scorer: &ComplexityScorer) -> f64 {
        let (text, lower) = (self.text, &self.lower);
        self.complexity
            .get_or_insert_with(|| scorer.score_lowered(text, lower))
            .value
    }
}

type RuleCheck = fn(&RoutingPolicy, &mut RuleContext<'_>) -> Option<RoutingReason>;

/// One entry of the ordered rule table.
struct Rule {
    name: &'static str,
    /// Whether verdicts from this rule and later ones carry the complexity.
    observes_complexity: bool,
    check: RuleCheck,
}

const RULES: [Rule; 5] = [
    Rule {
        name: "empty_text",
        observes_complexity: false,
        check: RoutingPolicy::empty_text_rule,
    },
    Rule {
        name: "nuance_pattern",
        observes_complexity: false,
        check: RoutingPolicy::nuance_pattern_rule,
    },
    Rule {
        name: "length_ceiling",
        observes_complexity: true,
        check: RoutingPolicy::length_ceiling_rule,
    },
    Rule {
        name: "fast_confidence",
        observes_complexity: true,
        check: RoutingPolicy::fast_confidence_rule,
    },
    Rule {
        name: "complexity",
        observes_complexity: true,
        check: RoutingPolicy::complexity_rule,
    },
];

// ── Policy ─────────────────────────────────────────────────────────────

/// Pure routing decision function.
///
/// Holds only immutable configuration, so a single instance can serve any
/// number of concurrent requests.
///
/// # Panics
///
/// This type and its methods never panic.
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    scorer: ComplexityScorer,
    config: RoutingConfig,
}

impl RoutingPolicy {
    /// Create a policy from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the configuration violates a
    /// constraint, or [`ConfigError::InvalidPattern`] if a negation pattern
    /// does not compile.
    pub fn new(config: RoutingConfig) -> Result<Self, ConfigError> {
        let errors = super::config::validate(&config);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors.join("\n")));
        }
        let scorer = ComplexityScorer::new(&config)?;
        Ok(Self { scorer, config })
    }

    /// Decide which classifier to trust for `text`.
    ///
    /// # Arguments
    ///
    /// * `text`: The (already truncated) request text.
    /// * `fast_confidence`: The fast classifier's confidence, if it ran.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn decide(&self, text: &str, fast_confidence: Option<f64>) -> RoutingVerdict {
        let mut ctx = RuleContext {
            text,
            lower: text.to_lowercase(),
            length: text.chars().count(),
            fast_confidence,
            complexity: None,
        };

        for rule in &RULES {
            if rule.observes_complexity {
                // Computed once here and reused by the complexity rule.
                ctx.complexity(&self.scorer);
            }
            if let Some(reason) = (rule.check)(self, &mut ctx) {
                tracing::debug!(rule = rule.name, reason = %reason, "routing rule fired");
                return Self::verdict(reason, ctx);
            }
        }

        Self::verdict(RoutingReason::SimpleText, ctx)
    }

    /// Return the scorer for external breakdown queries.
    pub fn scorer(&self) -> &ComplexityScorer {
        &self.scorer
    }

    /// Return the configuration this policy was built from.
    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    fn verdict(reason: RoutingReason, ctx: RuleContext<'_>) -> RoutingVerdict {
        if reason == RoutingReason::EmptyText {
            return RoutingVerdict {
                use_fast: true,
                reason,
                fast_confidence: Some(1.0),
                complexity: Some(ComplexityScore::zero()),
            };
        }
        RoutingVerdict {
            use_fast: reason.allows_fast(),
            reason,
            fast_confidence: ctx.fast_confidence,
            complexity: ctx.complexity,
        }
    }

    // ── Rules ──────────────────────────────────────────────────────────

    fn empty_text_rule(&self, ctx: &mut RuleContext<'_>) -> Option<RoutingReason> {
        ctx.text.trim().is_empty().then_some(RoutingReason::EmptyText)
    }

    /// First match in vocabulary order.
    fn nuance_pattern_rule(&self, ctx: &mut RuleContext<'_>) -> Option<RoutingReason> {
        self.config
            .nuance_terms
            .iter()
            .find(|term| ctx.lower.contains(term.as_str()))
            .map(|term| RoutingReason::PatternMatch(term.clone()))
    }

    fn length_ceiling_rule(&self, ctx: &mut RuleContext<'_>) -> Option<RoutingReason> {
        (ctx.length > self.config.max_fast_length).then_some(RoutingReason::TooLong(ctx.length))
    }

    fn fast_confidence_rule(&self, ctx: &mut RuleContext<'_>) -> Option<RoutingReason> {
        let confidence = ctx.fast_confidence?;
        if !confidence.is_finite() || confidence < self.config.min_fast_confidence {
            Some(RoutingReason::LowConfidence(two_decimals(confidence)))
        } else {
            None
        }
    }

    fn complexity_rule(&self, ctx: &mut RuleContext<'_>) -> Option<RoutingReason> {
        let complexity = ctx.complexity(&self.scorer);
        (complexity > self.config.high_complexity_threshold)
            .then_some(RoutingReason::HighComplexity(two_decimals(complexity)))
    }
}

/// Round to the precision of the reason code, so a parsed code compares
/// equal to the reason it was rendered from.
fn two_decimals(value: f64) -> f64 {
    if value.is_finite() {
        (value * 100.0).round() / 100.0
    } else {
        value
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
