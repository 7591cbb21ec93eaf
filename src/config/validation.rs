//! Configuration validation engine.
//!
//! ## Responsibility
//! Validate semantic constraints on a parsed [`ServiceConfig`] that cannot
//! be expressed through the type system alone (range checks, non-empty
//! vocabularies, compilable patterns).
//!
//! ## Guarantees
//! - Every validation rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - File I/O (that belongs to `loader`)

use super::ServiceConfig;
use crate::routing::config as routing_config;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range or contradictory value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "batch.max_concurrency").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// A regular expression in the configuration does not compile.
    #[error("Invalid pattern in '{field}': {source}")]
    InvalidPattern {
        /// Dot-separated field path of the pattern list.
        field: String,
        /// Underlying regex compilation error.
        #[source]
        source: regex::Error,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Validate all semantic constraints on a [`ServiceConfig`].
///
/// Collects every violation before returning so the caller sees the full
/// scope of issues at once.
///
/// # Arguments
///
/// * `config`: The parsed config to validate.
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &ServiceConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Routing ──────────────────────────────────────────────────────
    for reason in routing_config::validate(&config.routing) {
        errors.push(ConfigError::InvalidField {
            field: "routing".into(),
            value: String::new(),
            reason,
        });
    }

    // ── Analysis ─────────────────────────────────────────────────────
    if config.analysis.max_text_length == 0 {
        errors.push(ConfigError::InvalidField {
            field: "analysis.max_text_length".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    // ── Batch ────────────────────────────────────────────────────────
    if config.batch.max_batch_size == 0 {
        errors.push(ConfigError::InvalidField {
            field: "batch.max_batch_size".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    if config.batch.max_concurrency == 0 {
        errors.push(ConfigError::InvalidField {
            field: "batch.max_concurrency".into(),
            value: "0".into(),
            reason: "must be at least 1".into(),
        });
    }

    // ── Server ───────────────────────────────────────────────────────
    if config.server.host.trim().is_empty() {
        errors.push(ConfigError::InvalidField {
            field: "server.host".into(),
            value: format!("{:?}", config.server.host),
            reason: "must not be empty".into(),
        });
    }

    if config.server.max_request_size == 0 {
        errors.push(ConfigError::InvalidField {
            field: "server.max_request_size".into(),
            value: "0".into(),
            reason: "must be at least 1 byte".into(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
