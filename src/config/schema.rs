//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration for the chain gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Executables the gateway is allowed to drive.
    pub binaries: BinariesConfig,

    /// Child process behaviour.
    pub process: ProcessConfig,

    /// Scratch space for intermediate transaction files.
    pub artifacts: ArtifactConfig,

    /// Append-only audit log.
    pub audit: AuditConfig,

    /// Recognised form options, per command type.
    pub options: OptionsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_size: usize,

    /// Optional whole-request timeout in seconds. Off by default: multisig
    /// runs have no deadline.
    pub request_timeout_secs: Option<u64>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            max_body_size: 1024 * 1024,
            request_timeout_secs: None,
        }
    }
}

/// Binary allow-list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BinariesConfig {
    /// Request name → program name or absolute path.
    pub allow: BTreeMap<String, String>,

    /// Fall back to a PATH lookup for names not in `allow`.
    pub path_lookup: bool,
}

impl Default for BinariesConfig {
    fn default() -> Self {
        let mut allow = BTreeMap::new();
        allow.insert("gead".to_string(), "gead".to_string());
        allow.insert("gc".to_string(), "gcd".to_string());
        allow.insert("me".to_string(), "med".to_string());
        Self {
            allow,
            path_lookup: true,
        }
    }
}

/// Child process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Timeout for simple (non-multisig) invocations. `None` disables it.
    pub simple_timeout_secs: Option<u64>,

    /// Text piped to stdin of simple invocations (e.g. "y\n").
    pub confirm_input: Option<String>,

    /// Output format passed as `-o <format>` to sign, multisign and broadcast.
    pub output_format: String,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            simple_timeout_secs: Some(120),
            confirm_input: None,
            output_format: "json".to_string(),
        }
    }
}

/// Artifact scratch directory.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory holding transient transaction files.
    pub directory: PathBuf,

    /// File name prefix shared by all artifacts of a run.
    pub prefix: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("chain_gateway_temp"),
            prefix: "tx".to_string(),
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// JSONL file receiving one record per request.
    pub path: PathBuf,

    /// Default tail length for `GET /logs`.
    pub default_lines: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("logs/chain_gateway.jsonl"),
            default_lines: 100,
        }
    }
}

/// What to do with a form field that is not in the schema.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownOptionPolicy {
    /// Fail the request with 400.
    #[default]
    Reject,
    /// Drop the field and log it.
    Ignore,
}

/// Option set for one command type, added on top of the defaults.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CommandOptions {
    pub value_flags: Vec<String>,
    pub bool_flags: Vec<String>,
}

/// Recognised form options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OptionsConfig {
    /// Flags emitted as `--key=value`.
    pub value_flags: Vec<String>,

    /// Flags emitted bare when truthy.
    pub bool_flags: Vec<String>,

    /// Extra options keyed by command type (`tx`, `query`, `keys`, ...).
    pub commands: BTreeMap<String, CommandOptions>,

    /// Handling of unrecognised keys.
    pub unknown: UnknownOptionPolicy,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        let value_flags = [
            "chain-id",
            "node",
            "home",
            "keyring-backend",
            "keyring-dir",
            "from",
            "fees",
            "gas",
            "gas-prices",
            "gas-adjustment",
            "memo",
            "note",
            "output",
            "broadcast-mode",
            "sequence",
            "account-number",
            "timeout-height",
            "sign-mode",
            "height",
            "page",
            "limit",
            "denom",
            "algo",
            "multisig",
            "multisig-threshold",
            "pubkey",
        ];
        let bool_flags = [
            "y",
            "yes",
            "no-validate",
            "unarmored-hex",
            "unsafe",
            "recover",
            "dry-run",
            "offline",
            "nosort",
            "count-total",
        ];
        Self {
            value_flags: value_flags.iter().map(|s| s.to_string()).collect(),
            bool_flags: bool_flags.iter().map(|s| s.to_string()).collect(),
            commands: BTreeMap::new(),
            unknown: UnknownOptionPolicy::Reject,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
