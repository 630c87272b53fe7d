//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to HttpServer, which derives the runtime collaborators
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ArtifactConfig, AuditConfig, BinariesConfig, CommandOptions, GatewayConfig, ListenerConfig,
    ObservabilityConfig, OptionsConfig, ProcessConfig, UnknownOptionPolicy,
};
pub use validation::{validate_config, ValidationError};
