//! Draft proposal creation

use serde::{Deserialize, Serialize};

use super::patcher::{Patch, PatchKind};
use super::test_runner::TestResults;
use super::IssueEvent;

/// A not-yet-mergeable change bundled with its test evidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftProposal {
    pub title: String,
    pub body: String,
    pub branch: String,
    /// Always true; proposals are never opened ready to merge
    pub draft: bool,
    pub labels: Vec<String>,
    pub files: Vec<String>,
    pub pass_rate: f64,
    pub meets_target: bool,
}

/// Bundle `patch` and `tests` into a draft proposal for `issue`
pub fn create_proposal(issue: &IssueEvent, patch: &Patch, tests: &TestResults) -> DraftProposal {
    let prefix = match patch.kind {
        PatchKind::BugFix => "fix",
        PatchKind::Feature => "feat",
    };

    let evidence = match &tests.error {
        Some(error) => format!("Tests could not be evaluated: {}", error),
        None => format!(
            "{} passed, {} failed, {} skipped (pass rate {:.1}%, target {})",
            tests.passed,
            tests.failed,
            tests.skipped,
            tests.pass_rate * 100.0,
            if tests.meets_target { "met" } else { "not met" }
        ),
    };

    let body = format!(
        "Automated draft for #{number}.\n\n{description}\n\n### Files\n{files}\n\n### Test evidence\n{evidence}\n\nCommand: `{command}`\n",
        number = issue.issue_number,
        description = patch.description,
        files = patch
            .files
            .iter()
            .map(|f| format!("- `{}`", f))
            .collect::<Vec<_>>()
            .join("\n"),
        evidence = evidence,
        command = tests.command.as_deref().unwrap_or("none"),
    );

    let mut labels = vec!["automated".to_string(), "draft".to_string()];
    if !tests.meets_target {
        labels.push("needs-review".to_string());
    }

    DraftProposal {
        title: format!("{}: {} (#{})", prefix, issue.title, issue.issue_number),
        body,
        branch: format!("patchwarden/issue-{}", issue.issue_number),
        draft: true,
        labels,
        files: patch.files.clone(),
        pass_rate: tests.pass_rate,
        meets_target: tests.meets_target,
    }
}
