//! Chain Gateway Library
//!
//! HTTP front end for an external blockchain command-line client: path
//! segments and form fields become argument vectors, multisig requests run
//! through a generate → sign → multisign → broadcast pipeline, and every
//! invocation is written to an append-only audit log.

pub mod audit;
pub mod command;
pub mod config;
pub mod exec;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod pipeline;

pub use audit::{AuditRecord, AuditRecorder};
pub use config::schema::GatewayConfig;
pub use exec::{CommandInvocation, ExecutionResult, ProcessRunner};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use pipeline::{ArtifactStore, PipelineRun, TransactionPipeline};
