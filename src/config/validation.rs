//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, non-empty names)
//! - Reject option names that could not be safe CLI flags
//! - Detect options declared both as boolean and valued
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use thiserror::Error;

use crate::command::options::{is_valid_flag_name, RESERVED_FLAGS};
use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("invalid flag name '{0}'")]
    InvalidFlag(String),

    #[error("flag '{0}' is managed by the gateway and cannot be configured")]
    ReservedFlag(String),

    #[error("flag '{0}' is declared both as boolean and valued")]
    ConflictingFlag(String),

    #[error("binary alias '{0}' has an empty target")]
    EmptyBinary(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "listener.bind_address" });
    }
    if config.listener.request_timeout_secs == Some(0) {
        errors.push(ValidationError::Zero { field: "listener.request_timeout_secs" });
    }
    if config.listener.max_body_size == 0 {
        errors.push(ValidationError::Zero { field: "listener.max_body_size" });
    }
    if config.process.simple_timeout_secs == Some(0) {
        errors.push(ValidationError::Zero { field: "process.simple_timeout_secs" });
    }
    if config.process.output_format.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "process.output_format" });
    }
    if config.artifacts.prefix.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "artifacts.prefix" });
    }
    if config.audit.path.as_os_str().is_empty() {
        errors.push(ValidationError::Empty { field: "audit.path" });
    }

    for (alias, target) in &config.binaries.allow {
        if target.trim().is_empty() {
            errors.push(ValidationError::EmptyBinary(alias.clone()));
        }
    }

    let options = &config.options;
    let command_sets = options
        .commands
        .values()
        .map(|c| (&c.value_flags, &c.bool_flags));
    for (value_flags, bool_flags) in
        std::iter::once((&options.value_flags, &options.bool_flags)).chain(command_sets)
    {
        check_flags(value_flags, bool_flags, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_flags(value_flags: &[String], bool_flags: &[String], errors: &mut Vec<ValidationError>) {
    let valued: HashSet<&str> = value_flags.iter().map(String::as_str).collect();
    for name in value_flags.iter().chain(bool_flags) {
        if !is_valid_flag_name(name) {
            errors.push(ValidationError::InvalidFlag(name.clone()));
        } else if RESERVED_FLAGS.contains(&name.as_str()) {
            errors.push(ValidationError::ReservedFlag(name.clone()));
        }
    }
    for name in bool_flags {
        if valued.contains(name.as_str()) {
            errors.push(ValidationError::ConflictingFlag(name.clone()));
        }
    }
}
