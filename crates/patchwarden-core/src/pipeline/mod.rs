//! Autonomous remediation pipeline
//!
//! Strictly sequential, gated stages:
//!
//! 1. repository access check, then clone
//! 2. analysis
//! 3. patch synthesis and the patch security gate
//! 4. patch application and tests
//! 5. draft proposal
//!
//! A failing stage halts everything after it. Outputs of the stages that
//! did run stay on the [`PipelineRun`] for diagnostics.

pub mod analyzer;
pub mod patcher;
pub mod proposal;
pub mod repository;
pub mod test_runner;

pub use analyzer::{analyze_repository, RepositoryAnalysis};
pub use patcher::{HeuristicSynthesizer, Patch, PatchKind, PatchSynthesizer};
pub use proposal::{create_proposal, DraftProposal};
pub use repository::{CloneInfo, CommandOutput, RepositoryClient};
pub use test_runner::{TestResults, TestRunner};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::RepositoryError;
use crate::outcome::Outcome;
use crate::security::{RepositoryOperation, SecurityGuardrails};
use crate::telemetry::{default_sink, MetricKind, MetricRecord, SharedSink};
use crate::types::{RiskLevel, SecurityDecision};

/// An issue the pipeline should try to fix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueEvent {
    /// Clone URL
    pub repository_url: String,
    /// `owner/name`
    pub repository: String,
    pub issue_number: u64,
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RepositoryAccess,
    Clone,
    Analysis,
    PatchSynthesis,
    PatchGate,
    PatchApply,
    Tests,
    Proposal,
}

impl Stage {
    const ORDER: [Stage; 8] = [
        Stage::RepositoryAccess,
        Stage::Clone,
        Stage::Analysis,
        Stage::PatchSynthesis,
        Stage::PatchGate,
        Stage::PatchApply,
        Stage::Tests,
        Stage::Proposal,
    ];

    /// The stage that runs after `previous`; the first stage for `None`
    fn following(previous: Option<Stage>) -> Stage {
        match previous {
            None => Stage::RepositoryAccess,
            Some(previous) => Self::ORDER
                .iter()
                .skip_while(|stage| **stage != previous)
                .nth(1)
                .copied()
                .unwrap_or(Stage::Proposal),
        }
    }
}

/// Why a run stopped early
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
    /// Set when a guardrail rejected the stage
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    /// Seconds
    pub duration: f64,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub stages: Vec<StageTiming>,
    /// Seconds
    pub total_time: f64,
}

/// Record of one pipeline execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub issue: IssueEvent,
    pub clone: Option<CloneInfo>,
    pub analysis: Option<RepositoryAnalysis>,
    pub patch: Option<Patch>,
    pub patch_decision: Option<SecurityDecision>,
    pub test_results: Option<TestResults>,
    pub proposal: Option<DraftProposal>,
    pub metrics: RunMetrics,
    pub failure: Option<StageFailure>,
    pub success: bool,
}

impl PipelineRun {
    fn new(issue: IssueEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            issue,
            clone: None,
            analysis: None,
            patch: None,
            patch_decision: None,
            test_results: None,
            proposal: None,
            metrics: RunMetrics::default(),
            failure: None,
            success: false,
        }
    }

    /// `accepted`, `blocked` or `error`
    pub fn outcome_label(&self) -> &'static str {
        match &self.failure {
            None => "accepted",
            Some(f) if f.risk_level.is_some() => "blocked",
            Some(_) => "error",
        }
    }

    fn timed(&mut self, stage: Stage, started: Instant, success: bool) {
        self.metrics.stages.push(StageTiming {
            stage,
            duration: started.elapsed().as_secs_f64(),
            success,
        });
    }

    fn fail(&mut self, stage: Stage, started: Instant, reason: impl Into<String>) {
        self.timed(stage, started, false);
        let reason = reason.into();
        tracing::warn!("Pipeline run {} failed at {:?}: {}", self.id, stage, reason);
        self.failure = Some(StageFailure {
            stage,
            reason,
            risk_level: None,
        });
    }

    fn reject(&mut self, stage: Stage, started: Instant, reason: impl Into<String>, risk: RiskLevel) {
        self.timed(stage, started, false);
        let reason = reason.into();
        tracing::warn!("Pipeline run {} blocked at {:?}: {}", self.id, stage, reason);
        self.failure = Some(StageFailure {
            stage,
            reason,
            risk_level: Some(risk),
        });
    }
}

/// Run counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub success_rate: f64,
    pub meets_target: bool,
}

/// Drives issues through the remediation stages
pub struct RemediationPipeline {
    config: PipelineConfig,
    guardrails: Arc<SecurityGuardrails>,
    repository: Arc<dyn RepositoryClient>,
    synthesizer: Arc<dyn PatchSynthesizer>,
    sink: SharedSink,
    total_runs: AtomicU64,
    successful_runs: AtomicU64,
}

impl RemediationPipeline {
    pub fn new(
        config: PipelineConfig,
        guardrails: Arc<SecurityGuardrails>,
        repository: Arc<dyn RepositoryClient>,
    ) -> Self {
        Self {
            config,
            guardrails,
            repository,
            synthesizer: Arc::new(HeuristicSynthesizer),
            sink: default_sink(),
            total_runs: AtomicU64::new(0),
            successful_runs: AtomicU64::new(0),
        }
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn PatchSynthesizer>) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    pub fn guardrails(&self) -> &Arc<SecurityGuardrails> {
        &self.guardrails
    }

    /// Run every stage for `issue`. Never returns an error: failures and
    /// rejections are recorded on the run.
    pub async fn execute_autonomous_fix(&self, issue: IssueEvent) -> PipelineRun {
        self.execute(issue, None).await
    }

    /// Like [`execute_autonomous_fix`](Self::execute_autonomous_fix), but the
    /// stage still running when `deadline` passes fails and the run ends
    /// there. The run is counted and its workspace removed either way.
    pub async fn execute_autonomous_fix_with_deadline(
        &self,
        issue: IssueEvent,
        deadline: Duration,
    ) -> PipelineRun {
        self.execute(issue, Some(deadline)).await
    }

    async fn execute(&self, issue: IssueEvent, deadline: Option<Duration>) -> PipelineRun {
        let started = Instant::now();
        let mut run = PipelineRun::new(issue);
        tracing::info!(
            "Pipeline run {} started for {}#{}",
            run.id,
            run.issue.repository,
            run.issue.issue_number
        );

        let workspace = self.config.workspace_root.join(format!("run-{}", run.id));
        match deadline {
            None => self.execute_stages(&mut run, &workspace).await,
            Some(deadline) => {
                let finished =
                    tokio::time::timeout(deadline, self.execute_stages(&mut run, &workspace))
                        .await
                        .is_ok();
                if !finished {
                    let stage = Stage::following(run.metrics.stages.last().map(|t| t.stage));
                    let elapsed: f64 = run.metrics.stages.iter().map(|t| t.duration).sum();
                    let stage_started = started + Duration::from_secs_f64(elapsed);
                    run.fail(
                        stage,
                        stage_started,
                        format!("run timed out after {:?}", deadline),
                    );
                }
            }
        }

        if !self.config.keep_workspaces && workspace.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
                tracing::warn!("Failed to remove workspace {}: {}", workspace.display(), e);
            }
        }

        run.metrics.total_time = started.elapsed().as_secs_f64();
        run.success = run.failure.is_none()
            && run
                .test_results
                .as_ref()
                .map(|t| t.meets_target)
                .unwrap_or(false);

        self.total_runs.fetch_add(1, Ordering::Relaxed);
        if run.success {
            self.successful_runs.fetch_add(1, Ordering::Relaxed);
        }

        self.sink.record(MetricRecord::new(
            MetricKind::PipelineRun,
            run.id.to_string(),
            run.metrics.total_time,
            run.outcome_label(),
            run.success,
        ));
        tracing::info!(
            "Pipeline run {} finished in {:.2}s (success: {})",
            run.id,
            run.metrics.total_time,
            run.success
        );
        run
    }

    async fn execute_stages(&self, run: &mut PipelineRun, workspace: &Path) {
        // Repository access gate
        let t = Instant::now();
        let decision = self
            .guardrails
            .validate_repository_access(&run.issue.repository_url, RepositoryOperation::Clone);
        if !decision.valid {
            run.reject(
                Stage::RepositoryAccess,
                t,
                format!("cloning failed: {}", decision.reason),
                decision.risk_level,
            );
            return;
        }
        run.timed(Stage::RepositoryAccess, t, true);

        // Clone
        let t = Instant::now();
        if let Err(e) = tokio::fs::create_dir_all(&self.config.workspace_root).await {
            run.fail(Stage::Clone, t, format!("cannot create workspace root: {}", e));
            return;
        }
        let cloned = tokio::time::timeout(
            self.config.clone_timeout(),
            self.repository.clone_repository(
                &run.issue.repository_url,
                workspace,
                self.config.clone_timeout(),
            ),
        )
        .await
        .unwrap_or(Err(RepositoryError::Timeout(self.config.clone_timeout_secs)));
        match cloned {
            Ok(info) => {
                run.clone = Some(info);
                run.timed(Stage::Clone, t, true);
            }
            Err(e) => {
                run.fail(Stage::Clone, t, format!("cloning failed: {}", e));
                return;
            }
        }

        // Analysis
        let t = Instant::now();
        let root = workspace.to_path_buf();
        let analysis = match tokio::task::spawn_blocking(move || analyze_repository(&root)).await {
            Ok(analysis) => analysis,
            Err(e) => {
                run.fail(Stage::Analysis, t, format!("analysis task failed: {}", e));
                return;
            }
        };
        if let Some(error) = &analysis.error {
            let reason = error.clone();
            run.analysis = Some(analysis);
            run.fail(Stage::Analysis, t, reason);
            return;
        }
        run.timed(Stage::Analysis, t, true);

        // Patch synthesis
        let t = Instant::now();
        let synthesized = self.synthesizer.synthesize(&run.issue, &analysis).await;
        run.analysis = Some(analysis);
        let patch = match synthesized {
            Ok(patch) => patch,
            Err(e) => {
                run.fail(Stage::PatchSynthesis, t, e.to_string());
                return;
            }
        };
        run.timed(Stage::PatchSynthesis, t, true);

        // Patch gate; a rejected patch never reaches apply or tests
        let t = Instant::now();
        run.patch = Some(patch.clone());
        let (decision, gated) = patcher::gate_patch(&self.guardrails, patch);
        run.patch_decision = Some(decision);
        let patch = match gated {
            Outcome::Accepted { value } => value,
            Outcome::Rejected { reason, risk_level } => {
                run.reject(Stage::PatchGate, t, reason, risk_level);
                return;
            }
            Outcome::Faulted { error } => {
                run.fail(Stage::PatchGate, t, error);
                return;
            }
        };
        run.timed(Stage::PatchGate, t, true);

        // Apply
        let t = Instant::now();
        if let Err(e) = self.repository.apply_patch(workspace, &patch.diff).await {
            run.fail(Stage::PatchApply, t, e.to_string());
            return;
        }
        run.timed(Stage::PatchApply, t, true);

        // Tests
        let t = Instant::now();
        let runner = TestRunner::new(
            self.guardrails.clone(),
            self.repository.clone(),
            self.config.test_timeout(),
            self.config.pass_rate_target,
        );
        let results = match runner.run(workspace).await {
            Outcome::Accepted { value } => value,
            Outcome::Rejected { reason, risk_level } => {
                run.reject(Stage::Tests, t, reason, risk_level);
                return;
            }
            Outcome::Faulted { error } => {
                run.fail(Stage::Tests, t, error);
                return;
            }
        };
        run.timed(Stage::Tests, t, results.error.is_none());
        run.test_results = Some(results);

        // Proposal
        let t = Instant::now();
        if let Some(results) = &run.test_results {
            run.proposal = Some(create_proposal(&run.issue, &patch, results));
        }
        run.timed(Stage::Proposal, t, true);
    }

    pub fn stats(&self) -> PipelineStats {
        let total = self.total_runs.load(Ordering::Relaxed);
        let successful = self.successful_runs.load(Ordering::Relaxed);
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };
        PipelineStats {
            total_runs: total,
            successful_runs: successful,
            success_rate,
            meets_target: total > 0 && success_rate >= self.config.success_rate_target,
        }
    }
}
