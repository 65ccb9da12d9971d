//! Test execution and result parsing

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::repository::RepositoryClient;
use crate::outcome::Outcome;
use crate::security::SecurityGuardrails;

lazy_static! {
    static ref CARGO_SUMMARY: Regex =
        Regex::new(r"test result: \w+\. (\d+) passed; (\d+) failed; (\d+) ignored").unwrap();
    static ref PYTEST_SUMMARY: Regex = Regex::new(r"^=+ (.*) in [\d.]+s.*=+$").unwrap();
    static ref PYTEST_COUNT: Regex = Regex::new(r"(\d+) (passed|failed|skipped|errors?)").unwrap();
    static ref JEST_SUMMARY: Regex = Regex::new(r"^Tests:\s+(.*)$").unwrap();
    static ref JEST_COUNT: Regex = Regex::new(r"(\d+) (passed|failed|skipped|todo)").unwrap();
    static ref GO_RESULT: Regex = Regex::new(r"^\s*--- (PASS|FAIL|SKIP): ").unwrap();
}

/// Outcome of one test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResults {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    /// `passed + failed`
    pub total: u64,
    /// In `[0, 1]`; zero when nothing ran
    pub pass_rate: f64,
    /// `pass_rate >= target`
    pub meets_target: bool,
    pub command: Option<String>,
    /// Seconds
    pub duration: f64,
    pub error: Option<String>,
}

impl TestResults {
    pub fn from_counts(passed: u64, failed: u64, skipped: u64, target: f64) -> Self {
        let total = passed + failed;
        let pass_rate = if total == 0 {
            0.0
        } else {
            (passed as f64 / total as f64).clamp(0.0, 1.0)
        };
        Self {
            passed,
            failed,
            skipped,
            total,
            pass_rate,
            meets_target: total > 0 && pass_rate >= target,
            command: None,
            duration: 0.0,
            error: None,
        }
    }

    fn with_error(target: f64, error: impl Into<String>) -> Self {
        let mut results = Self::from_counts(0, 0, 0, target);
        results.error = Some(error.into());
        results
    }
}

/// Counts parsed from test runner output
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TestCounts {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
}

/// Parse cargo, pytest, jest or `go test -v` output
pub fn parse_test_output(output: &str) -> Option<TestCounts> {
    parse_cargo(output)
        .or_else(|| parse_summary(output, &PYTEST_SUMMARY, &PYTEST_COUNT))
        .or_else(|| parse_summary(output, &JEST_SUMMARY, &JEST_COUNT))
        .or_else(|| parse_go(output))
}

fn parse_cargo(output: &str) -> Option<TestCounts> {
    let mut counts: Option<TestCounts> = None;
    for caps in CARGO_SUMMARY.captures_iter(output) {
        let c = counts.get_or_insert_with(TestCounts::default);
        c.passed += caps[1].parse::<u64>().unwrap_or(0);
        c.failed += caps[2].parse::<u64>().unwrap_or(0);
        c.skipped += caps[3].parse::<u64>().unwrap_or(0);
    }
    counts
}

fn parse_summary(output: &str, line_re: &Regex, count_re: &Regex) -> Option<TestCounts> {
    let line = output
        .lines()
        .rev()
        .find_map(|l| line_re.captures(l.trim()).map(|c| c[1].to_string()))?;

    let mut counts = TestCounts::default();
    for caps in count_re.captures_iter(&line) {
        let n = caps[1].parse::<u64>().unwrap_or(0);
        match &caps[2] {
            "passed" => counts.passed += n,
            "failed" | "error" | "errors" => counts.failed += n,
            _ => counts.skipped += n,
        }
    }
    Some(counts)
}

fn parse_go(output: &str) -> Option<TestCounts> {
    let mut counts = TestCounts::default();
    let mut seen = false;
    for line in output.lines() {
        if let Some(caps) = GO_RESULT.captures(line) {
            seen = true;
            match &caps[1] {
                "PASS" => counts.passed += 1,
                "FAIL" => counts.failed += 1,
                _ => counts.skipped += 1,
            }
        }
    }
    seen.then_some(counts)
}

/// Pick a test command from project markers
pub fn detect_test_command(repo: &Path) -> Option<Vec<String>> {
    let argv: &[&str] = if repo.join("Cargo.toml").exists() {
        &["cargo", "test", "--quiet"]
    } else if repo.join("go.mod").exists() {
        &["go", "test", "-v", "./..."]
    } else if repo.join("package.json").exists() {
        &["npm", "test", "--silent"]
    } else if ["pyproject.toml", "setup.py", "pytest.ini", "requirements.txt"]
        .iter()
        .any(|m| repo.join(m).exists())
    {
        &["pytest", "-q"]
    } else {
        return None;
    };
    Some(argv.iter().map(|s| s.to_string()).collect())
}

/// Runs a project's tests through the repository collaborator
pub struct TestRunner {
    guardrails: Arc<SecurityGuardrails>,
    repository: Arc<dyn RepositoryClient>,
    timeout: Duration,
    target: f64,
}

impl TestRunner {
    pub fn new(
        guardrails: Arc<SecurityGuardrails>,
        repository: Arc<dyn RepositoryClient>,
        timeout: Duration,
        target: f64,
    ) -> Self {
        Self {
            guardrails,
            repository,
            timeout,
            target,
        }
    }

    /// Detect, validate and run the test command in `repo`
    pub async fn run(&self, repo: &Path) -> Outcome<TestResults> {
        let argv = match detect_test_command(repo) {
            Some(argv) => argv,
            None => {
                return Outcome::accepted(TestResults::with_error(
                    self.target,
                    "no test command detected",
                ))
            }
        };
        let command = argv.join(" ");

        let decision = self.guardrails.validate_command(&command);
        if !decision.valid {
            return Outcome::from_decision(&decision);
        }

        tracing::info!("Running tests: {}", command);
        let output = match self.repository.run_command(repo, &argv, self.timeout).await {
            Ok(output) => output,
            Err(e) => return Outcome::faulted(e.to_string()),
        };

        let combined = output.combined();
        let mut results = match parse_test_output(&combined) {
            Some(c) => TestResults::from_counts(c.passed, c.failed, c.skipped, self.target),
            None => TestResults::with_error(
                self.target,
                format!("could not parse test output (exit code {})", output.exit_code),
            ),
        };
        results.command = Some(command);
        results.duration = output.duration;

        tracing::info!(
            "Tests finished: {}/{} passed (pass rate {:.2}, target met: {})",
            results.passed,
            results.total,
            results.pass_rate,
            results.meets_target
        );
        Outcome::accepted(results)
    }
}
