//! The check harness.
//!
//! A check is a deferred async computation producing a [`CheckResult`]. A
//! [`Checklist`] holds checks in registration order and runs them one after
//! another, never concurrently.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

/// How much a failed check matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckLevel {
    Info,
    Warning,
    /// A failure blocks the command.
    Error,
}

impl fmt::Display for CheckLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckLevel::Info => f.write_str("info"),
            CheckLevel::Warning => f.write_str("warning"),
            CheckLevel::Error => f.write_str("error"),
        }
    }
}

/// Outcome of a single check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub level: CheckLevel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl CheckResult {
    /// A passing error-level check.
    pub fn pass(name: impl Into<String>) -> Self {
        CheckResult {
            name: name.into(),
            passed: true,
            message: None,
            level: CheckLevel::Error,
            suggestions: Vec::new(),
        }
    }

    /// A failing error-level check.
    pub fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult {
            passed: false,
            message: Some(message.into()),
            ..CheckResult::pass(name)
        }
    }

    /// A failing warning-level check.
    pub fn warn(name: impl Into<String>, message: impl Into<String>) -> Self {
        CheckResult::fail(name, message).with_level(CheckLevel::Warning)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_level(mut self, level: CheckLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = String>) -> Self {
        self.suggestions.extend(suggestions);
        self
    }

    /// Returns true if this result fails an error-level check.
    pub fn is_blocking(&self) -> bool {
        !self.passed && self.level == CheckLevel::Error
    }

    /// One status line, followed by one line per suggestion.
    pub fn render_line(&self) -> String {
        let symbol = match (self.passed, self.level) {
            (true, _) => "✓",
            (false, CheckLevel::Error) => "✗",
            (false, CheckLevel::Warning) => "⚠",
            (false, CheckLevel::Info) => "•",
        };
        let mut line = match &self.message {
            Some(message) => format!("  {} {}: {}", symbol, self.name, message),
            None => format!("  {} {}", symbol, self.name),
        };
        for suggestion in &self.suggestions {
            line.push_str(&format!("\n      → {}", suggestion));
        }
        line
    }
}

/// Whether a checklist gates a command or reports on it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckPhase {
    PreFlight,
    PostFlight,
}

impl fmt::Display for CheckPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckPhase::PreFlight => f.write_str("pre-flight"),
            CheckPhase::PostFlight => f.write_str("post-flight"),
        }
    }
}

/// All results of one checklist run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    pub command: String,
    pub phase: CheckPhase,
    pub results: Vec<CheckResult>,
}

impl CheckReport {
    /// Returns true if every error-level check passed.
    pub fn passed(&self) -> bool {
        !self.results.iter().any(CheckResult::is_blocking)
    }

    /// Returns true if this is a pre-flight report that must stop the command.
    /// Post-flight reports never block.
    pub fn blocks(&self) -> bool {
        self.phase == CheckPhase::PreFlight && !self.passed()
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn blocking_failures(&self) -> impl Iterator<Item = &CheckResult> {
        self.results.iter().filter(|r| r.is_blocking())
    }

    /// Suggestions attached to the blocking failures.
    pub fn suggestions(&self) -> Vec<String> {
        self.blocking_failures()
            .flat_map(|r| r.suggestions.iter().cloned())
            .collect()
    }

    /// Names of the blocking failures, comma-separated.
    pub fn blocking_summary(&self) -> String {
        self.blocking_failures()
            .map(|r| r.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn render(&self) -> String {
        let mut out = format!("{} checks for {}:", self.phase, self.command);
        for result in &self.results {
            out.push('\n');
            out.push_str(&result.render_line());
        }
        out
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// A boxed check future.
pub type CheckFuture<'a> = Pin<Box<dyn Future<Output = CheckResult> + 'a>>;

type Check<'a> = Box<dyn FnOnce() -> CheckFuture<'a> + 'a>;

/// Checks registered for one command.
pub struct Checklist<'a> {
    command: String,
    checks: Vec<Check<'a>>,
}

impl fmt::Debug for Checklist<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checklist")
            .field("command", &self.command)
            .field("checks", &self.checks.len())
            .finish()
    }
}

impl<'a> Checklist<'a> {
    pub fn new(command: impl Into<String>) -> Self {
        Checklist {
            command: command.into(),
            checks: Vec::new(),
        }
    }

    /// Registers a check. It runs after every previously registered one.
    pub fn check<F, Fut>(mut self, check: F) -> Self
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = CheckResult> + 'a,
    {
        self.push(check);
        self
    }

    /// Like [`check`](Self::check), for conditional registration.
    pub fn push<F, Fut>(&mut self, check: F)
    where
        F: FnOnce() -> Fut + 'a,
        Fut: Future<Output = CheckResult> + 'a,
    {
        self.checks
            .push(Box::new(move || Box::pin(check()) as CheckFuture<'a>));
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Runs every check as a pre-flight gate. Callers proceed only if
    /// [`CheckReport::passed`] is true.
    pub async fn run_checks(self) -> CheckReport {
        self.run(CheckPhase::PreFlight).await
    }

    /// Runs every check as a post-flight verification. Failures are reported,
    /// never raised.
    pub async fn run_verifications(self) -> CheckReport {
        self.run(CheckPhase::PostFlight).await
    }

    async fn run(self, phase: CheckPhase) -> CheckReport {
        let mut results = Vec::with_capacity(self.checks.len());
        for check in self.checks {
            let result = check().await;
            log_result(&self.command, phase, &result);
            results.push(result);
        }
        let report = CheckReport {
            command: self.command,
            phase,
            results,
        };
        if report.blocks() {
            tracing::warn!(
                command = %report.command,
                failed = %report.blocking_summary(),
                "pre-flight checks failed"
            );
        }
        report
    }
}

fn log_result(command: &str, phase: CheckPhase, result: &CheckResult) {
    let message = result.message.as_deref().unwrap_or("");
    match (result.passed, result.level) {
        (true, _) | (false, CheckLevel::Info) => {
            tracing::debug!(command, %phase, check = %result.name, message, "check passed")
        }
        (false, CheckLevel::Warning) => {
            tracing::warn!(command, %phase, check = %result.name, message, "check warning")
        }
        (false, CheckLevel::Error) if phase == CheckPhase::PostFlight => {
            tracing::warn!(command, %phase, check = %result.name, message, "verification failed")
        }
        (false, CheckLevel::Error) => {
            tracing::info!(command, %phase, check = %result.name, message, "check failed")
        }
    }
}
