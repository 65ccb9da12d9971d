//! Patch synthesis and the patch security gate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::analyzer::RepositoryAnalysis;
use super::IssueEvent;
use crate::outcome::Outcome;
use crate::security::SecurityGuardrails;
use crate::types::SecurityDecision;
use crate::Result;

/// What a patch is meant to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchKind {
    BugFix,
    Feature,
}

/// A candidate change in unified diff form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub kind: PatchKind,
    pub description: String,
    /// Paths touched, relative to the repository root
    pub files: Vec<String>,
    pub diff: String,
}

/// Produces candidate patches for an issue
#[async_trait]
pub trait PatchSynthesizer: Send + Sync {
    async fn synthesize(&self, issue: &IssueEvent, analysis: &RepositoryAnalysis) -> Result<Patch>;
}

const BUG_KEYWORDS: &[&str] = &[
    "bug", "crash", "error", "exception", "fail", "broken", "panic", "regression", "incorrect",
];

/// Classify an issue from its labels, then its title and body
pub fn classify(issue: &IssueEvent) -> PatchKind {
    let labels: Vec<String> = issue.labels.iter().map(|l| l.to_lowercase()).collect();
    if labels.iter().any(|l| l == "bug" || l == "defect") {
        return PatchKind::BugFix;
    }
    if labels.iter().any(|l| l == "enhancement" || l == "feature") {
        return PatchKind::Feature;
    }

    let text = format!("{} {}", issue.title, issue.body).to_lowercase();
    if BUG_KEYWORDS.iter().any(|k| text.contains(k)) {
        PatchKind::BugFix
    } else {
        PatchKind::Feature
    }
}

/// Keyword-driven synthesizer that writes a remediation note into the
/// repository rather than touching source files
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicSynthesizer;

#[async_trait]
impl PatchSynthesizer for HeuristicSynthesizer {
    async fn synthesize(&self, issue: &IssueEvent, analysis: &RepositoryAnalysis) -> Result<Patch> {
        let kind = classify(issue);
        let (path, heading) = match kind {
            PatchKind::BugFix => (
                format!("docs/fixes/issue-{}.md", issue.issue_number),
                format!("# Fix plan for #{}: {}", issue.issue_number, issue.title),
            ),
            PatchKind::Feature => (
                format!("docs/proposals/issue-{}.md", issue.issue_number),
                format!("# Proposal for #{}: {}", issue.issue_number, issue.title),
            ),
        };

        let mut content = vec![heading, String::new()];
        content.push(format!(
            "Repository: {} ({} source files, {} test files{})",
            issue.repository,
            analysis.source_files,
            analysis.test_files,
            analysis
                .primary_language()
                .map(|l| format!(", mostly {}", l))
                .unwrap_or_default()
        ));
        content.push(String::new());
        content.push("## Report".to_string());
        content.extend(issue.body.lines().map(|l| l.to_string()));
        content.push(String::new());
        match kind {
            PatchKind::BugFix => {
                content.push("## Next steps".to_string());
                content.push("- Reproduce the failure with a regression test".to_string());
                content.push("- Fix the root cause and keep the test".to_string());
            }
            PatchKind::Feature => {
                content.push("## Next steps".to_string());
                content.push("- Agree on the interface".to_string());
                content.push("- Implement behind tests".to_string());
            }
        }

        Ok(Patch {
            kind,
            description: format!("{:?} note for issue #{}", kind, issue.issue_number),
            files: vec![path.clone()],
            diff: new_file_diff(&path, &content),
        })
    }
}

/// Unified diff creating `path` with `lines`
pub fn new_file_diff(path: &str, lines: &[String]) -> String {
    let mut diff = format!(
        "diff --git a/{path} b/{path}\nnew file mode 100644\n--- /dev/null\n+++ b/{path}\n@@ -0,0 +1,{} @@\n",
        lines.len(),
        path = path
    );
    for line in lines {
        diff.push('+');
        diff.push_str(line);
        diff.push('\n');
    }
    diff
}

/// Security gate: a patch only proceeds when the guardrails accept it
pub fn gate_patch(guardrails: &SecurityGuardrails, patch: Patch) -> (SecurityDecision, Outcome<Patch>) {
    let decision = guardrails.validate_patch(&patch.diff);
    let outcome = if decision.valid {
        Outcome::accepted(patch)
    } else {
        tracing::warn!("Patch rejected by guardrails: {}", decision.reason);
        Outcome::from_decision(&decision)
    };
    (decision, outcome)
}
