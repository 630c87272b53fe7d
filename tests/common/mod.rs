//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use chain_gateway::config::GatewayConfig;
use chain_gateway::exec::ScriptedRunner;
use chain_gateway::{HttpServer, Shutdown};

/// A gateway listening on an ephemeral port, driving a scripted runner.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub runner: Arc<ScriptedRunner>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
    // Keeps the scratch directory alive for the gateway's lifetime.
    pub dir: TempDir,
}

#[allow(dead_code)]
impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn audit_path(&self) -> PathBuf {
        self.dir.path().join("logs").join("audit.jsonl")
    }

    /// Artifact files currently on disk.
    pub fn artifacts(&self) -> Vec<String> {
        std::fs::read_dir(self.artifact_dir())
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Config rooted in `dir`, with `gc` allow-listed to the test executable
/// itself (any executable resolves; the scripted runner never spawns it).
pub fn test_config(dir: &TempDir) -> GatewayConfig {
    let exe = std::env::current_exe().unwrap();
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.binaries.allow.clear();
    config
        .binaries
        .allow
        .insert("gc".to_string(), exe.to_string_lossy().into_owned());
    config.binaries.path_lookup = false;
    config.artifacts.directory = dir.path().join("artifacts");
    config.audit.path = dir.path().join("logs").join("audit.jsonl");
    config.observability.metrics_enabled = false;
    config
}

/// Start a gateway with the default test config.
pub async fn start_gateway() -> TestGateway {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    start_gateway_with(dir, config).await
}

/// Start a gateway with a custom config rooted in `dir`.
pub async fn start_gateway_with(dir: TempDir, config: GatewayConfig) -> TestGateway {
    start_gateway_with_runner(dir, config, ScriptedRunner::new()).await
}

/// Start a gateway around a pre-configured scripted runner.
pub async fn start_gateway_with_runner(
    dir: TempDir,
    config: GatewayConfig,
    runner: ScriptedRunner,
) -> TestGateway {
    let runner = Arc::new(runner.watching(config.artifacts.directory.clone()));
    let server = HttpServer::with_runner(config, runner.clone()).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    let handle = tokio::spawn(async move { server.run(listener, rx).await });

    TestGateway {
        addr,
        runner,
        shutdown,
        handle,
        dir,
    }
}

/// Headers switching a request onto the multisig path.
#[allow(dead_code)]
pub fn multisig_headers(signers: &str, name: &str) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("x-env-use-multisig", "true".parse().unwrap());
    headers.insert("x-use-multisig", "true".parse().unwrap());
    headers.insert("x-multisig-signers", signers.parse().unwrap());
    headers.insert("x-multisig-name", name.parse().unwrap());
    headers
}

/// Form fields every multisig request needs.
#[allow(dead_code)]
pub fn chain_form() -> Vec<(&'static str, &'static str)> {
    vec![
        ("chain-id", "testchain-1"),
        ("node", "tcp://localhost:26657"),
        ("home", "/tmp/gc-home"),
        ("keyring-backend", "test"),
        ("from", "cosmos1multisigaddr"),
    ]
}
