//! # Stage: Fast/Accurate Routing Policy
//!
//! ## Responsibility
//! Decide, per request, whether the fast sentiment classifier's answer can be
//! trusted or the request must escalate to the accurate classifier.  Simple,
//! short, confidently classified texts stay on the fast path; texts with
//! nuance markers, excessive length, low fast confidence or high linguistic
//! complexity escalate.
//!
//! ## Guarantees
//! - Deterministic: the same text and fast confidence always produce the same
//!   verdict.
//! - Ordered: rules are evaluated in a fixed priority order and the first
//!   match wins.
//! - Thread-safe: the policy holds only immutable configuration.
//! - Auditable: every verdict carries a reason code, and every escalation's
//!   reason is non-empty.
//!
//! ## NOT Responsible For
//! - Calling the classifiers (that belongs to `orchestrator`)
//! - Aggregating batch statistics (that belongs to `batch`)

pub mod config;
pub mod router;
pub mod scorer;

// Re-exports for convenience
pub use config::RoutingConfig;
pub use router::{RoutingPolicy, RoutingReason, RoutingVerdict};
pub use scorer::{ComplexityScore, ComplexityScorer, ComplexitySignal, ScoreBreakdown};
