//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Construct the long-lived collaborators (resolver, option schema,
//!   artifact store, pipeline, audit recorder) once at startup
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, limits, optional timeout)
//! - Serve until shutdown, then close the audit log

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::audit::{AuditError, AuditRecorder};
use crate::command::{BinaryResolver, OptionSchema};
use crate::config::{GatewayConfig, ProcessConfig};
use crate::exec::{ProcessRunner, SystemProcessRunner};
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown;
use crate::pipeline::{ArtifactStore, TransactionPipeline};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<BinaryResolver>,
    pub options: Arc<OptionSchema>,
    pub runner: Arc<dyn ProcessRunner>,
    pub artifacts: Arc<ArtifactStore>,
    pub pipeline: Arc<TransactionPipeline>,
    pub audit: Arc<AuditRecorder>,
    pub process: Arc<ProcessConfig>,
    pub default_log_lines: i64,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    audit: Arc<AuditRecorder>,
}

impl HttpServer {
    /// Create a server that spawns real child processes.
    pub fn new(config: GatewayConfig) -> Result<Self, AuditError> {
        Self::with_runner(config, Arc::new(SystemProcessRunner::new()))
    }

    /// Create a server around the given process runner.
    pub fn with_runner(config: GatewayConfig, runner: Arc<dyn ProcessRunner>) -> Result<Self, AuditError> {
        let audit = Arc::new(AuditRecorder::open(&config.audit.path)?);
        let artifacts = Arc::new(ArtifactStore::new(
            config.artifacts.directory.clone(),
            config.artifacts.prefix.clone(),
        ));
        let pipeline = Arc::new(TransactionPipeline::new(
            runner.clone(),
            artifacts.clone(),
            config.process.output_format.clone(),
        ));

        let state = AppState {
            resolver: Arc::new(BinaryResolver::from_config(&config.binaries)),
            options: Arc::new(OptionSchema::from_config(&config.options)),
            runner,
            artifacts,
            pipeline,
            audit: audit.clone(),
            process: Arc::new(config.process.clone()),
            default_log_lines: config.audit.default_lines,
        };

        let router = Self::build_router(&config, state);
        Ok(Self {
            router,
            config,
            audit,
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let router = Router::new()
            .route("/health", get(handlers::health))
            .route("/logs", get(handlers::get_logs))
            .route("/logs/clear", delete(handlers::clear_logs))
            .route("/artifacts/clear", delete(handlers::clear_artifacts))
            .route("/{binary}/{command_type}", post(handlers::execute_command))
            .route("/{binary}/{command_type}/{*path}", post(handlers::execute_command))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.listener.max_body_size));

        let router = match config.listener.request_timeout_secs {
            Some(secs) => router.layer(TimeoutLayer::new(Duration::from_secs(secs))),
            None => router,
        };

        // Outermost first: the ID exists before the trace span opens.
        router.layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http())
                .layer(propagate_request_id_layer()),
        )
    }

    /// Serve on `listener` until `shutdown` fires. In-flight requests,
    /// including multisig runs, are allowed to finish.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        self.audit.close().await;
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}
