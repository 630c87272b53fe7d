//! The multisig transaction pipeline: generate → sign × N → multisign → broadcast.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

use crate::command::{form_value, BaseCommand, MultisigHeaders, RequestError};
use crate::exec::{parse_output, CommandInvocation, ExecutionResult, ProcessRunner};
use crate::observability::metrics;
use crate::pipeline::artifacts::{ArtifactError, ArtifactHandle, ArtifactScope, ArtifactStore};
use crate::pipeline::report::{PipelineRun, SignTrace, StageReport};
use crate::pipeline::state::Stage;

/// Flag appended to the base command for the generate stage.
pub const GENERATE_ONLY_FLAG: &str = "--generate-only";

/// Chain parameters shared verbatim by sign, multisign and broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainParams {
    pub chain_id: String,
    pub node: String,
    pub home: String,
    pub keyring_backend: String,
}

impl ChainParams {
    /// Take the parameters from the request's form fields.
    pub fn from_form(form: &[(String, String)]) -> Result<Self, RequestError> {
        let field = |key: &'static str| {
            form_value(form, key)
                .map(str::to_string)
                .ok_or(RequestError::MissingField(key))
        };
        Ok(Self {
            chain_id: field("chain-id")?,
            node: field("node")?,
            home: field("home")?,
            keyring_backend: field("keyring-backend")?,
        })
    }

    fn args(&self, output_format: &str) -> Vec<String> {
        [
            "--chain-id",
            self.chain_id.as_str(),
            "--node",
            self.node.as_str(),
            "--home",
            self.home.as_str(),
            "--keyring-backend",
            self.keyring_backend.as_str(),
            "-o",
            output_format,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

/// Everything a run needs, validated at the request boundary.
#[derive(Debug, Clone)]
pub struct MultisigRequest {
    pub program: PathBuf,
    pub base_args: Vec<String>,
    pub signers: Vec<String>,
    pub multisig_name: String,
    pub multisig_address: String,
    pub chain: ChainParams,
}

impl MultisigRequest {
    pub fn new(
        base: BaseCommand,
        headers: &MultisigHeaders,
        form: &[(String, String)],
    ) -> Result<Self, RequestError> {
        if headers.signers.is_empty() {
            return Err(RequestError::NoSigners);
        }
        let multisig_name = headers
            .name
            .clone()
            .ok_or(RequestError::MissingField("x-multisig-name"))?;
        let multisig_address = form_value(form, "from")
            .map(str::to_string)
            .ok_or(RequestError::MissingField("from"))?;
        Ok(Self {
            program: base.program,
            base_args: base.args,
            signers: headers.signers.clone(),
            multisig_name,
            multisig_address,
            chain: ChainParams::from_form(form)?,
        })
    }
}

/// Local faults that end a run. Process failures are not errors; they are
/// recorded in the trace.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("no signers requested")]
    NoSigners,

    #[error("expected {expected} signer contributions, found {actual}")]
    IncompleteSignatures { expected: usize, actual: usize },
}

/// One signer's successful sign output.
#[derive(Debug)]
struct SignerContribution {
    signer: String,
    artifact: ArtifactHandle,
}

/// Drives a multisig run through its four stages, one process at a time.
pub struct TransactionPipeline {
    runner: Arc<dyn ProcessRunner>,
    artifacts: Arc<ArtifactStore>,
    output_format: String,
}

impl TransactionPipeline {
    pub fn new(
        runner: Arc<dyn ProcessRunner>,
        artifacts: Arc<ArtifactStore>,
        output_format: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            artifacts,
            output_format: output_format.into(),
        }
    }

    /// Execute a fresh run. Always returns the trace; every artifact created
    /// during the run is gone by the time this returns.
    pub async fn execute(&self, request: &MultisigRequest) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun::new();

        match self.artifacts.begin_run().await {
            Ok(mut scope) => {
                if let Err(e) = self.drive(request, &mut scope, &mut run).await {
                    tracing::error!(stage = ?run.state.stage(), error = %e, "Multisig run aborted");
                    run.fault(e.to_string());
                }
                scope.release_all();
            }
            Err(e) => {
                tracing::error!(error = %e, "Could not open artifact scope");
                run.fault(e.to_string());
            }
        }

        tracing::info!(
            state = ?run.state,
            failed_stage = ?run.failed_stage,
            signers = request.signers.len(),
            duration_ms = started.elapsed().as_millis() as u64,
            "Multisig run finished"
        );
        run
    }

    async fn drive(
        &self,
        request: &MultisigRequest,
        scope: &mut ArtifactScope,
        run: &mut PipelineRun,
    ) -> Result<(), PipelineError> {
        if request.signers.is_empty() {
            return Err(PipelineError::NoSigners);
        }

        // 1. Generate the unsigned transaction.
        run.enter(Stage::Generate.running_state());
        let (report, result) = self
            .invoke(Stage::Generate, None, self.generate_invocation(request))
            .await;
        run.steps.generate = Some(report.clone());
        if !result.success() {
            run.fail_stage(Stage::Generate, &report);
            return Ok(());
        }
        let unsigned = scope.create("unsigned").await?;
        unsigned.write(&result.stdout).await?;

        // 2. One signature per signer, in the order given.
        run.enter(Stage::Sign.running_state());
        let mut contributions: Vec<SignerContribution> = Vec::with_capacity(request.signers.len());
        for signer in &request.signers {
            let invocation = self.sign_invocation(request, &unsigned, signer);
            let (report, result) = self.invoke(Stage::Sign, Some(signer.as_str()), invocation).await;
            run.steps
                .sign
                .get_or_insert_with(SignTrace::default)
                .push(signer, report.clone());
            if !result.success() {
                run.fail_stage(Stage::Sign, &report);
                return Ok(());
            }
            let artifact = scope.create(&format!("signed-{}", file_label(signer))).await?;
            artifact.write(&result.stdout).await?;
            contributions.push(SignerContribution {
                signer: signer.clone(),
                artifact,
            });
        }

        // 3. Merge every contribution.
        if contributions.len() != request.signers.len() {
            return Err(PipelineError::IncompleteSignatures {
                expected: request.signers.len(),
                actual: contributions.len(),
            });
        }
        run.enter(Stage::Multisign.running_state());
        let invocation = self.multisign_invocation(request, &unsigned, &contributions);
        let (report, result) = self.invoke(Stage::Multisign, None, invocation).await;
        run.steps.multisign = Some(report.clone());
        if !result.success() {
            run.fail_stage(Stage::Multisign, &report);
            return Ok(());
        }
        let merged = scope.create("multisigned").await?;
        merged.write(&result.stdout).await?;

        // The merged file supersedes its inputs.
        release(scope, &unsigned);
        for contribution in &contributions {
            tracing::trace!(signer = %contribution.signer, "Releasing signer contribution");
            release(scope, &contribution.artifact);
        }

        // 4. Broadcast.
        run.enter(Stage::Broadcast.running_state());
        let invocation = self.broadcast_invocation(request, &merged);
        let (report, result) = self.invoke(Stage::Broadcast, None, invocation).await;
        run.steps.broadcast = Some(report.clone());
        release(scope, &merged);
        if !result.success() {
            run.fail_stage(Stage::Broadcast, &report);
            return Ok(());
        }

        run.complete(parse_output(&result.stdout));
        Ok(())
    }

    async fn invoke(
        &self,
        stage: Stage,
        signer: Option<&str>,
        invocation: CommandInvocation,
    ) -> (StageReport, ExecutionResult) {
        let command = invocation.display();
        tracing::debug!(stage = %stage, signer = signer.unwrap_or("-"), command = %command, "Running stage");

        let started = Instant::now();
        let result = self.runner.run(invocation).await;
        let elapsed = started.elapsed();

        metrics::record_stage(stage.as_str(), result.success(), elapsed);
        if result.success() {
            tracing::info!(stage = %stage, signer = signer.unwrap_or("-"), duration_ms = elapsed.as_millis() as u64, "Stage succeeded");
        } else {
            tracing::warn!(
                stage = %stage,
                signer = signer.unwrap_or("-"),
                exit_code = result.exit_status,
                stderr = %result.stderr.trim(),
                "Stage failed"
            );
        }

        (StageReport::new(command, &result), result)
    }

    fn generate_invocation(&self, request: &MultisigRequest) -> CommandInvocation {
        let mut args = request.base_args.clone();
        args.push(GENERATE_ONLY_FLAG.to_string());
        CommandInvocation::new(&request.program, args)
    }

    fn sign_invocation(
        &self,
        request: &MultisigRequest,
        unsigned: &ArtifactHandle,
        signer: &str,
    ) -> CommandInvocation {
        let mut args = vec![
            "tx".to_string(),
            "sign".to_string(),
            unsigned.arg(),
            "--from".to_string(),
            signer.to_string(),
            "--multisig".to_string(),
            request.multisig_address.clone(),
        ];
        args.extend(request.chain.args(&self.output_format));
        CommandInvocation::new(&request.program, args)
    }

    fn multisign_invocation(
        &self,
        request: &MultisigRequest,
        unsigned: &ArtifactHandle,
        contributions: &[SignerContribution],
    ) -> CommandInvocation {
        let mut args = vec![
            "tx".to_string(),
            "multisign".to_string(),
            unsigned.arg(),
            request.multisig_name.clone(),
        ];
        args.extend(contributions.iter().map(|c| c.artifact.arg()));
        args.extend(request.chain.args(&self.output_format));
        CommandInvocation::new(&request.program, args)
    }

    fn broadcast_invocation(&self, request: &MultisigRequest, merged: &ArtifactHandle) -> CommandInvocation {
        let mut args = vec!["tx".to_string(), "broadcast".to_string(), merged.arg()];
        args.extend(request.chain.args(&self.output_format));
        CommandInvocation::new(&request.program, args)
    }
}

fn release(scope: &mut ArtifactScope, handle: &ArtifactHandle) {
    if let Err(e) = scope.release(handle) {
        tracing::warn!(path = %handle.path().display(), error = %e, "Failed to remove artifact");
    }
}

fn file_label(signer: &str) -> String {
    signer
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '@') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ScriptedRunner;
    use crate::pipeline::state::RunState;
    use serde_json::json;
    use std::path::Path;

    const BROADCAST_OUT: &str = r#"{"height":"0","txhash":"9F3A","code":0}"#;

    fn request(signers: &[&str]) -> MultisigRequest {
        MultisigRequest {
            program: PathBuf::from("/usr/local/bin/gcd"),
            base_args: vec![
                "tx".into(),
                "bank".into(),
                "send".into(),
                "treasury-addr".into(),
                "dest-addr".into(),
                "10stake".into(),
                "--from=treasury-addr".into(),
            ],
            signers: signers.iter().map(|s| s.to_string()).collect(),
            multisig_name: "treasury".into(),
            multisig_address: "treasury-addr".into(),
            chain: ChainParams {
                chain_id: "test-1".into(),
                node: "tcp://localhost:26657".into(),
                home: "/var/lib/gc".into(),
                keyring_backend: "test".into(),
            },
        }
    }

    fn setup(dir: &Path) -> (Arc<ScriptedRunner>, TransactionPipeline) {
        let runner = Arc::new(ScriptedRunner::new().watching(dir));
        let store = Arc::new(ArtifactStore::new(dir, "tx"));
        let pipeline = TransactionPipeline::new(runner.clone(), store, "json");
        (runner, pipeline)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).map(|mut d| d.next().is_none()).unwrap_or(true)
    }

    #[tokio::test]
    async fn test_happy_path() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        runner
            .push_ok(r#"{"body":{"messages":[]}}"#)
            .push_ok(r#"{"signer":"alice"}"#)
            .push_ok(r#"{"signer":"bob"}"#)
            .push_ok(r#"{"signatures":["a","b"]}"#)
            .push_ok(BROADCAST_OUT);

        let run = pipeline.execute(&request(&["alice", "bob"])).await;

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.failed_stage, None);
        assert!(run.steps.generate.as_ref().unwrap().success);
        let sign = run.steps.sign.as_ref().unwrap();
        assert_eq!(sign.signers().collect::<Vec<_>>(), vec!["alice", "bob"]);
        assert!(sign.get("alice").unwrap().success && sign.get("bob").unwrap().success);
        assert!(run.steps.multisign.as_ref().unwrap().success);
        assert!(run.steps.broadcast.as_ref().unwrap().success);
        assert_eq!(run.result, json!({"height": "0", "txhash": "9F3A", "code": 0}));
        assert_eq!(runner.call_count(), 5);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_commands_reference_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        pipeline.execute(&request(&["alice", "bob"])).await;

        let calls = runner.calls();
        let args: Vec<&[String]> = calls.iter().map(|c| c.invocation.args()).collect();

        assert_eq!(args[0].last().unwrap(), GENERATE_ONLY_FLAG);
        assert_eq!(&args[0][..3], &["tx", "bank", "send"]);

        let unsigned = &args[1][2];
        assert!(unsigned.ends_with("-unsigned.json"));
        assert_eq!(&args[1][..2], &["tx", "sign"]);
        assert_eq!(&args[1][3..7], &["--from", "alice", "--multisig", "treasury-addr"]);
        assert_eq!(&args[2][3..5], &["--from", "bob"]);
        assert_eq!(&args[2][2], unsigned);
        assert_eq!(&args[1][args[1].len() - 2..], &["-o", "json"]);

        assert_eq!(&args[3][..4], &["tx", "multisign", unsigned.as_str(), "treasury"]);
        assert!(args[3][4].ends_with("-signed-alice.json"));
        assert!(args[3][5].ends_with("-signed-bob.json"));
        assert_eq!(args[3][6], "--chain-id");

        assert_eq!(&args[4][..2], &["tx", "broadcast"]);
        assert!(args[4][2].ends_with("-multisigned.json"));

        // All artifacts of the run share one stem.
        let stem = unsigned.trim_end_matches("-unsigned.json");
        assert!(args[4][2].starts_with(stem));
    }

    #[tokio::test]
    async fn test_artifact_counts_per_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        pipeline.execute(&request(&["alice", "bob", "carol"])).await;

        let calls = runner.calls();
        assert_eq!(calls.len(), 6);
        // generate runs before anything exists.
        assert!(calls[0].files_present.is_empty());
        // multisign sees the unsigned file plus one contribution per signer.
        let at_merge = &calls[4].files_present;
        assert_eq!(at_merge.len(), 4);
        assert_eq!(at_merge.iter().filter(|f| f.ends_with("-unsigned.json")).count(), 1);
        assert_eq!(at_merge.iter().filter(|f| f.contains("-signed-")).count(), 3);
        // broadcast sees only the merged file.
        let at_broadcast = &calls[5].files_present;
        assert_eq!(at_broadcast.len(), 1);
        assert!(at_broadcast[0].ends_with("-multisigned.json"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_signer_failure_stops_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        runner
            .push_ok(r#"{"body":{}}"#)
            .push_ok(r#"{"signer":"alice"}"#)
            .push_failure(1, "invalid key");

        let run = pipeline.execute(&request(&["alice", "bob", "carol"])).await;

        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.failed_stage, Some(Stage::Sign));
        let sign = run.steps.sign.as_ref().unwrap();
        assert_eq!(sign.len(), 2);
        assert!(sign.get("alice").unwrap().success);
        let bob = sign.get("bob").unwrap();
        assert!(!bob.success);
        assert_eq!(bob.stderr, json!(["invalid key"]));
        assert!(sign.get("carol").is_none());
        assert!(run.steps.multisign.is_none());
        assert!(run.steps.broadcast.is_none());
        assert_eq!(run.result["stderr"], json!(["invalid key"]));

        // generate + alice + bob, nothing after the failure.
        assert_eq!(runner.call_count(), 3);
        let calls = runner.calls();
        assert!(calls
            .iter()
            .all(|c| !c.invocation.args().iter().any(|a| a == "multisign" || a == "broadcast")));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_generate_failure_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        runner.push_failure(2, "account sequence mismatch");

        let run = pipeline.execute(&request(&["alice"])).await;

        assert_eq!(run.failed_stage, Some(Stage::Generate));
        assert!(run.steps.sign.is_none());
        assert_eq!(run.result["exit_code"], 2);
        assert_eq!(runner.call_count(), 1);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_multisign_and_broadcast_failures() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        runner
            .push_ok("{}")
            .push_ok("{}")
            .push_failure(1, "threshold not met");
        let run = pipeline.execute(&request(&["alice"])).await;
        assert_eq!(run.failed_stage, Some(Stage::Multisign));
        assert!(run.steps.broadcast.is_none());
        assert_eq!(runner.call_count(), 3);

        let (runner, pipeline) = setup(dir.path());
        runner
            .push_ok("{}")
            .push_ok("{}")
            .push_ok("{}")
            .push_failure(1, "out of gas");
        let run = pipeline.execute(&request(&["alice"])).await;
        assert_eq!(run.failed_stage, Some(Stage::Broadcast));
        assert_eq!(run.result["stderr"], json!(["out of gas"]));
        assert_eq!(runner.call_count(), 4);
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_empty_signer_set_runs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (runner, pipeline) = setup(dir.path());
        let run = pipeline.execute(&request(&[])).await;
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.failed_stage, None);
        assert!(run.is_faulted());
        assert_eq!(runner.call_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_artifact_fault_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the scratch directory should be.
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "").unwrap();
        let runner = Arc::new(ScriptedRunner::new());
        let store = Arc::new(ArtifactStore::new(&blocker, "tx"));
        let pipeline = TransactionPipeline::new(runner.clone(), store, "json");

        let run = pipeline.execute(&request(&["alice"])).await;
        assert_eq!(run.state, RunState::Failed);
        assert!(run.error.as_deref().unwrap().contains("artifact directory"));
        assert_eq!(runner.call_count(), 0);
    }

    /// Sweeps the scratch directory whenever a signer is asked to sign.
    struct SweepingRunner {
        inner: ScriptedRunner,
        store: Arc<ArtifactStore>,
        swept: std::sync::Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl ProcessRunner for SweepingRunner {
        async fn run(&self, invocation: CommandInvocation) -> ExecutionResult {
            if invocation.args().get(1).map(String::as_str) == Some("sign") {
                let report = self.store.sweep().await;
                self.swept.lock().unwrap().extend(report.cleared);
            }
            self.inner.run(invocation).await
        }
    }

    #[tokio::test]
    async fn test_sweep_during_sign_spares_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let orphan = dir.path().join("tx-19700101-000000000-000000000000-unsigned.json");
        std::fs::write(&orphan, "{}").unwrap();

        let store = Arc::new(ArtifactStore::new(dir.path(), "tx"));
        let runner = Arc::new(SweepingRunner {
            inner: ScriptedRunner::new().watching(dir.path()),
            store: store.clone(),
            swept: Default::default(),
        });
        let pipeline = TransactionPipeline::new(runner.clone(), store.clone(), "json");

        let run = pipeline.execute(&request(&["alice", "bob"])).await;

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(*runner.swept.lock().unwrap(), vec![orphan.display().to_string()]);
        let calls = runner.inner.calls();
        // Merge still sees the unsigned file and both signatures.
        assert_eq!(calls[3].invocation.args()[1], "multisign");
        assert_eq!(calls[3].files_present.len(), 3);
        assert_eq!(store.open_runs(), 0);
        assert!(dir_is_empty(dir.path()));
    }

    /// Occupy the file a signer's signature would be written to.
    fn block_signature(invocation: &CommandInvocation) {
        let args = invocation.args();
        if args.get(1).map(String::as_str) != Some("sign") {
            return;
        }
        let signed = args[2].replace("-unsigned.json", &format!("-signed-{}.json", args[4]));
        std::fs::write(signed, "taken").unwrap();
    }

    #[tokio::test]
    async fn test_artifact_fault_mid_run_releases_earlier_files() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(ScriptedRunner::new().before_each(block_signature));
        let store = Arc::new(ArtifactStore::new(dir.path(), "tx"));
        let pipeline = TransactionPipeline::new(runner.clone(), store.clone(), "json");

        let run = pipeline.execute(&request(&["alice", "bob"])).await;

        assert!(run.is_faulted());
        assert_eq!(run.state, RunState::Failed);
        assert_eq!(run.failed_stage, Some(Stage::Sign));
        assert!(run.error.as_deref().unwrap().contains("failed to create artifact"));
        assert!(run.steps.generate.as_ref().unwrap().success);
        assert!(run.steps.sign.as_ref().unwrap().get("alice").unwrap().success);
        assert!(run.steps.multisign.is_none());
        // Fail fast: bob is never asked to sign.
        assert_eq!(runner.call_count(), 2);

        // The unsigned file is gone; only the blocking file is left.
        let left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(left.len(), 1);
        assert!(left[0].ends_with("-signed-alice.json"));
        assert_eq!(store.open_runs(), 0);
    }

    #[test]
    fn test_request_requires_chain_params() {
        let base = BaseCommand {
            program: PathBuf::from("/bin/gcd"),
            args: vec!["tx".into()],
        };
        let headers = MultisigHeaders {
            enabled: true,
            signers: vec!["alice".into()],
            name: Some("treasury".into()),
        };
        let mut form: Vec<(String, String)> = [
            ("from", "treasury-addr"),
            ("chain-id", "test-1"),
            ("node", "tcp://n:26657"),
            ("home", "/h"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(
            MultisigRequest::new(base.clone(), &headers, &form).unwrap_err(),
            RequestError::MissingField("keyring-backend")
        );
        form.push(("keyring-backend".into(), "test".into()));
        let req = MultisigRequest::new(base, &headers, &form).unwrap();
        assert_eq!(req.multisig_address, "treasury-addr");
        assert_eq!(req.chain.keyring_backend, "test");
    }

    #[test]
    fn test_file_label() {
        assert_eq!(file_label("alice@corp"), "alice@corp");
        assert_eq!(file_label("a/b c"), "a_b_c");
    }
}
