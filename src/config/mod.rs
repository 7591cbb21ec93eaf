//! # Stage: Declarative Service Configuration
//!
//! ## Responsibility
//! Parse and validate the TOML configuration of a sentiment routing service:
//! routing thresholds and vocabularies, input limits, batch limits, the HTTP
//! listener and log format.
//!
//! ## Guarantees
//! - Deterministic: same TOML input always produces the same `ServiceConfig`
//! - Validated: all semantic constraints are checked before a config is accepted
//! - Defaulted: every field has a documented default, so an empty file is valid
//! - Schema-exportable: JSON Schema output enables IDE autocomplete
//!
//! ## NOT Responsible For
//! - Building the orchestrator from config (that belongs to the caller)
//! - Runtime reconfiguration: a config is fixed once constructed

pub mod loader;
pub mod validation;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::routing::RoutingConfig;

pub use validation::ConfigError;

// ── Default value functions ──────────────────────────────────────────────

/// Default truncation limit for incoming texts: 1000 code points.
fn default_max_text_length() -> usize {
    1000
}

/// Default maximum number of texts per batch.
fn default_max_batch_size() -> usize {
    100
}

/// Default number of batch items analysed concurrently.
fn default_max_concurrency() -> usize {
    8
}

/// Default listen address.
fn default_host() -> String {
    "0.0.0.0".to_string()
}

/// Default listen port.
fn default_port() -> u16 {
    8000
}

/// Default maximum request body: 1 MiB.
fn default_max_request_size() -> usize {
    1024 * 1024
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for a sentiment routing service.
///
/// Deserialized from a TOML file and validated before use.
///
/// # Example
///
/// ```toml
/// [routing]
/// min_fast_confidence = 0.8
///
/// [batch]
/// max_batch_size = 50
///
/// [observability]
/// log_format = "json"
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServiceConfig {
    /// Routing policy thresholds and vocabularies.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Per-text input limits.
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// Batch limits.
    #[serde(default)]
    pub batch: BatchConfig,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

// ── Analysis ─────────────────────────────────────────────────────────────

/// Per-text input limits applied by the orchestrator.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct AnalysisConfig {
    /// Texts longer than this many code points are truncated. Default: `1000`.
    #[serde(default = "default_max_text_length")]
    pub max_text_length: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_text_length: default_max_text_length(),
        }
    }
}

// ── Batch ────────────────────────────────────────────────────────────────

/// Batch limits applied by the batch coordinator.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BatchConfig {
    /// Largest accepted batch. Default: `100`.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    /// Items analysed at the same time. Default: `8`.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

// ── Server ───────────────────────────────────────────────────────────────

/// HTTP listener settings for the `web-api` feature.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ServerConfig {
    /// Listen address. Default: `0.0.0.0`.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port. Default: `8000`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body in bytes. Default: 1 MiB.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_request_size: default_max_request_size(),
        }
    }
}

// ── Observability ────────────────────────────────────────────────────────

/// Observability configuration.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ObservabilityConfig {
    /// Log output format. Overridden by the `LOG_FORMAT` environment variable.
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Log output format.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable, colorized log output.
    #[default]
    Pretty,
    /// Structured JSON log output for machine consumption.
    Json,
}

impl LogFormat {
    /// Value understood by the `LOG_FORMAT` environment variable.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }

    /// Parse a `LOG_FORMAT` value; `"json"` selects JSON, anything else pretty.
    pub fn from_env_value(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Pretty
        }
    }

    /// The format named by `LOG_FORMAT`, or `fallback` if it is unset.
    pub fn from_env_or(fallback: LogFormat) -> Self {
        std::env::var("LOG_FORMAT")
            .map(|v| Self::from_env_value(&v))
            .unwrap_or(fallback)
    }
}

/// Export the JSON Schema for `ServiceConfig`.
///
/// # Errors
///
/// Returns `serde_json::Error` if schema serialization fails (should not
/// happen with well-formed derive macros).
///
/// # Panics
///
/// This function never panics.
pub fn json_schema() -> Result<String, serde_json::Error> {
    let schema = schemars::schema_for!(ServiceConfig);
    serde_json::to_string_pretty(&schema)
}
