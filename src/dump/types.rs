//! Dump report types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for a recorded diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// A collection that was expected to work did not
    Error,
    /// Expected or informational condition, e.g. a container without a previous instance
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// Collection step a diagnostic came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    NodePools,
    Inspect,
    NodeLogs,
    PodLogs,
    Network,
    GuestCluster,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::NodePools => write!(f, "nodepools"),
            Step::Inspect => write!(f, "inspect"),
            Step::NodeLogs => write!(f, "node-logs"),
            Step::PodLogs => write!(f, "pod-logs"),
            Step::Network => write!(f, "network"),
            Step::GuestCluster => write!(f, "guest-cluster"),
        }
    }
}

/// A non-fatal failure or notable condition seen during a dump
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub step: Step,
    /// What was being collected (pod, file, namespace...)
    pub subject: String,
    pub message: String,
    /// Arguments of the command or request that failed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Captured output of the failed command
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        step: Step,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            step,
            subject: subject.into(),
            message: message.into(),
            args: Vec::new(),
            output: None,
            recorded_at: Utc::now(),
        }
    }

    pub fn error(step: Step, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, step, subject, message)
    }

    pub fn info(step: Step, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, step, subject, message)
    }

    pub fn with_args(mut self, args: &[String]) -> Self {
        self.args = args.to_vec();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        self.output = (!output.is_empty()).then_some(output);
        self
    }
}

/// Everything that went wrong, without stopping the run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DumpReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub diagnostics: Vec<Diagnostic>,
    /// Archive written at the end of the run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<std::path::PathBuf>,
}

impl Default for DumpReport {
    fn default() -> Self {
        Self::new()
    }
}

impl DumpReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            diagnostics: Vec::new(),
            archive: None,
        }
    }

    /// Store a diagnostic and emit it as a tracing event
    pub fn record(&mut self, diagnostic: Diagnostic) {
        let output = diagnostic.output.as_deref().unwrap_or("");
        match diagnostic.severity {
            Severity::Error => tracing::error!(
                step = %diagnostic.step,
                subject = %diagnostic.subject,
                args = ?diagnostic.args,
                output,
                "{}",
                diagnostic.message
            ),
            Severity::Info => tracing::info!(
                step = %diagnostic.step,
                subject = %diagnostic.subject,
                args = ?diagnostic.args,
                output,
                "{}",
                diagnostic.message
            ),
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn for_step(&self, step: Step) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.step == step)
    }

    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn info_count(&self) -> usize {
        self.count(Severity::Info)
    }

    fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    pub fn is_clean(&self) -> bool {
        self.error_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_by_severity() {
        let mut report = DumpReport::new();
        report.record(Diagnostic::info(Step::PodLogs, "p-c-previous.log", "no previous"));
        report.record(Diagnostic::error(Step::Inspect, "clusters", "inspect failed"));
        report.record(Diagnostic::error(Step::Network, "ovnkube-master-0", "cp failed"));

        assert_eq!(report.error_count(), 2);
        assert_eq!(report.info_count(), 1);
        assert_eq!(report.for_step(Step::PodLogs).count(), 1);
        assert!(!report.is_clean());
    }

    #[test]
    fn test_empty_output_dropped() {
        let d = Diagnostic::error(Step::Inspect, "x", "y").with_output("");
        assert!(d.output.is_none());
    }

    #[test]
    fn test_report_serializes_steps_kebab_case() {
        let mut report = DumpReport::new();
        report.record(Diagnostic::error(Step::GuestCluster, "example", "no pod"));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["diagnostics"][0]["step"], "guest-cluster");
        assert_eq!(json["diagnostics"][0]["severity"], "error");
    }
}
