//! End-to-end remediation pipeline runs against a scripted repository

use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use patchwarden_core::config::{GuardrailConfig, PipelineConfig};
use patchwarden_core::pipeline::{
    CloneInfo, CommandOutput, IssueEvent, Patch, PatchKind, PatchSynthesizer, RemediationPipeline,
    RepositoryAnalysis, RepositoryClient,
};
use patchwarden_core::pipeline::Stage;
use patchwarden_core::telemetry::{MemoryMetricsSink, MetricKind};
use patchwarden_core::{RepositoryError, RiskLevel, SecurityGuardrails};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Fault {
    None,
    CloneRejected,
    CloneStalls,
    TestsTimeOut,
}

/// Repository double that materialises a tiny Rust project and replays a
/// canned test summary
struct ScriptedRepository {
    test_output: String,
    fault: Fault,
    clones: AtomicUsize,
    applies: AtomicUsize,
    commands: AtomicUsize,
}

impl ScriptedRepository {
    fn new(test_output: &str) -> Arc<Self> {
        Self::with_fault(test_output, Fault::None)
    }

    fn failing_clone() -> Arc<Self> {
        Self::with_fault("", Fault::CloneRejected)
    }

    fn with_fault(test_output: &str, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            test_output: test_output.to_string(),
            fault,
            clones: AtomicUsize::new(0),
            applies: AtomicUsize::new(0),
            commands: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl RepositoryClient for ScriptedRepository {
    async fn clone_repository(
        &self,
        url: &str,
        dest: &Path,
        _timeout: Duration,
    ) -> Result<CloneInfo, RepositoryError> {
        self.clones.fetch_add(1, Ordering::SeqCst);
        match self.fault {
            Fault::CloneRejected => return Err(RepositoryError::CloneFailed("remote hung up".into())),
            Fault::CloneStalls => {
                std::fs::create_dir_all(dest).map_err(|e| RepositoryError::CloneFailed(e.to_string()))?;
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            _ => {}
        }
        std::fs::create_dir_all(dest.join("src")).map_err(|e| RepositoryError::CloneFailed(e.to_string()))?;
        std::fs::write(dest.join("Cargo.toml"), "[package]\nname = \"demo\"\n")
            .map_err(|e| RepositoryError::CloneFailed(e.to_string()))?;
        std::fs::write(dest.join("src/lib.rs"), "pub fn add(a: i32, b: i32) -> i32 { a + b }\n")
            .map_err(|e| RepositoryError::CloneFailed(e.to_string()))?;
        Ok(CloneInfo {
            url: url.to_string(),
            path: dest.to_path_buf(),
            head: Some("abc123".into()),
            branch: Some("main".into()),
        })
    }

    async fn apply_patch(&self, _repo: &Path, _diff: &str) -> Result<(), RepositoryError> {
        self.applies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn run_command(
        &self,
        _repo: &Path,
        _argv: &[String],
        timeout: Duration,
    ) -> Result<CommandOutput, RepositoryError> {
        self.commands.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::TestsTimeOut {
            return Err(RepositoryError::Timeout(timeout.as_secs()));
        }
        Ok(CommandOutput {
            success: true,
            exit_code: 0,
            stdout: self.test_output.clone(),
            stderr: String::new(),
            duration: 0.5,
        })
    }
}

/// Synthesizer that always proposes code shelling out
struct DangerousSynthesizer;

#[async_trait]
impl PatchSynthesizer for DangerousSynthesizer {
    async fn synthesize(
        &self,
        _issue: &IssueEvent,
        _analysis: &RepositoryAnalysis,
    ) -> patchwarden_core::Result<Patch> {
        Ok(Patch {
            kind: PatchKind::BugFix,
            description: "run the fixer".into(),
            files: vec!["src/fix.py".into()],
            diff: "diff --git a/src/fix.py b/src/fix.py\n--- /dev/null\n+++ b/src/fix.py\n@@ -0,0 +1,2 @@\n+import os\n+os.system(user_input)\n"
                .into(),
        })
    }
}

fn issue(url: &str) -> IssueEvent {
    IssueEvent {
        repository_url: url.to_string(),
        repository: "acme/widgets".into(),
        issue_number: 42,
        title: "Addition overflows".into(),
        body: "add(i32::MAX, 1) panics in debug builds".into(),
        labels: vec!["bug".into(), "autofix".into()],
    }
}

fn pipeline(repo: Arc<ScriptedRepository>, root: &Path) -> RemediationPipeline {
    pipeline_with(repo, PipelineConfig::default().with_workspace_root(root))
}

fn pipeline_with(repo: Arc<ScriptedRepository>, config: PipelineConfig) -> RemediationPipeline {
    let guardrails = Arc::new(SecurityGuardrails::new(GuardrailConfig::default()));
    RemediationPipeline::new(config, guardrails, repo)
}

#[tokio::test]
async fn e2e_fix_with_passing_tests_yields_draft() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::new("test result: ok. 85 passed; 15 failed; 0 ignored; 0 measured\n");
    let sink = Arc::new(MemoryMetricsSink::new());
    let pipeline = pipeline(repo.clone(), root.path()).with_sink(sink.clone());

    let run = pipeline
        .execute_autonomous_fix(issue("https://github.com/acme/widgets.git"))
        .await;

    assert!(run.success, "failure: {:?}", run.failure);
    let tests = run.test_results.as_ref().unwrap();
    assert_eq!(tests.pass_rate, 0.85);
    assert!(tests.meets_target);
    let proposal = run.proposal.as_ref().unwrap();
    assert!(proposal.draft);
    assert!(proposal.meets_target);
    assert_eq!(run.analysis.as_ref().unwrap().source_files, 1);
    assert_eq!(repo.applies.load(Ordering::SeqCst), 1);

    assert_eq!(sink.of_kind(MetricKind::PipelineRun).len(), 1);
    assert_eq!(pipeline.stats().successful_runs, 1);
    // workspace removed after the run
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn e2e_dangerous_patch_never_reaches_tests() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::new("test result: ok. 1 passed; 0 failed; 0 ignored\n");
    let pipeline = pipeline(repo.clone(), root.path()).with_synthesizer(Arc::new(DangerousSynthesizer));

    let run = pipeline
        .execute_autonomous_fix(issue("https://github.com/acme/widgets.git"))
        .await;

    assert!(!run.success);
    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::PatchGate);
    assert_eq!(failure.risk_level, Some(RiskLevel::High));
    assert_eq!(run.outcome_label(), "blocked");
    assert!(!run.patch_decision.as_ref().unwrap().valid);

    assert_eq!(repo.applies.load(Ordering::SeqCst), 0);
    assert_eq!(repo.commands.load(Ordering::SeqCst), 0);
    assert!(run.test_results.is_none());
    assert!(run.proposal.is_none());
    // earlier stage output is kept for diagnostics
    assert!(run.analysis.is_some());
    assert!(run.patch.is_some());
}

#[tokio::test]
async fn e2e_blocked_domain_rejected_before_clone() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::new("");
    let pipeline = pipeline(repo.clone(), root.path());

    let run = pipeline
        .execute_autonomous_fix(issue("https://malicious.example/repo.git"))
        .await;

    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::RepositoryAccess);
    assert!(failure.reason.contains("blocked domain"));
    assert_eq!(repo.clones.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn e2e_clone_failure_is_stage_failure() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::failing_clone();
    let pipeline = pipeline(repo.clone(), root.path());

    let run = pipeline
        .execute_autonomous_fix(issue("https://github.com/acme/widgets.git"))
        .await;

    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Clone);
    assert!(failure.reason.contains("remote hung up"));
    assert_eq!(run.outcome_label(), "error");
    assert!(run.analysis.is_none());

    let stats = pipeline.stats();
    assert_eq!(stats.total_runs, 1);
    assert_eq!(stats.success_rate, 0.0);
    assert!(!stats.meets_target);
}

#[tokio::test]
async fn e2e_below_target_is_not_success() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::new("test result: FAILED. 84 passed; 16 failed; 0 ignored\n");
    let pipeline = pipeline(repo, root.path());

    let run = pipeline
        .execute_autonomous_fix(issue("https://github.com/acme/widgets.git"))
        .await;

    assert!(run.failure.is_none());
    assert!(!run.success);
    let proposal = run.proposal.unwrap();
    assert!(!proposal.meets_target);
    assert!(proposal.labels.contains(&"needs-review".to_string()));
}

#[tokio::test]
async fn e2e_test_timeout_keeps_earlier_results() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::with_fault("", Fault::TestsTimeOut);
    let config = PipelineConfig::default()
        .with_workspace_root(root.path())
        .with_test_timeout_secs(7);
    let pipeline = pipeline_with(repo.clone(), config);

    let run = pipeline
        .execute_autonomous_fix(issue("https://github.com/acme/widgets.git"))
        .await;

    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Tests);
    assert!(failure.reason.contains("7"), "reason: {}", failure.reason);
    assert_eq!(failure.risk_level, None);
    assert_eq!(run.outcome_label(), "error");
    assert!(!run.success);

    assert_eq!(repo.applies.load(Ordering::SeqCst), 1);
    assert!(run.clone.is_some());
    assert!(run.analysis.is_some());
    assert!(run.patch.is_some());
    assert!(run.test_results.is_none());
    assert!(run.proposal.is_none());
    assert_eq!(pipeline.stats().total_runs, 1);
}

#[tokio::test]
async fn e2e_clone_timeout_is_stage_failure() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::with_fault("", Fault::CloneStalls);
    let config = PipelineConfig::default()
        .with_workspace_root(root.path())
        .with_clone_timeout_secs(1);
    let pipeline = pipeline_with(repo.clone(), config);

    let run = pipeline
        .execute_autonomous_fix(issue("https://github.com/acme/widgets.git"))
        .await;

    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Clone);
    assert!(failure.reason.contains("timed out"), "reason: {}", failure.reason);
    assert!(run.analysis.is_none());
    assert_eq!(repo.applies.load(Ordering::SeqCst), 0);
    // the partial checkout is removed
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn e2e_run_deadline_fails_running_stage() {
    let root = tempfile::tempdir().unwrap();
    let repo = ScriptedRepository::with_fault("", Fault::CloneStalls);
    let sink = Arc::new(MemoryMetricsSink::new());
    let pipeline = pipeline(repo, root.path()).with_sink(sink.clone());

    let run = pipeline
        .execute_autonomous_fix_with_deadline(
            issue("https://github.com/acme/widgets.git"),
            Duration::from_millis(300),
        )
        .await;

    let failure = run.failure.as_ref().unwrap();
    assert_eq!(failure.stage, Stage::Clone);
    assert!(failure.reason.contains("run timed out"));
    assert_eq!(run.metrics.stages.last().map(|t| t.stage), Some(Stage::Clone));
    assert_eq!(pipeline.stats().total_runs, 1);
    assert_eq!(sink.of_kind(MetricKind::PipelineRun).len(), 1);
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
}
