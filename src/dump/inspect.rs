//! `oc adm inspect` and `oc adm node-logs` invocations

use super::types::{Diagnostic, DumpReport, Step};
use super::DumpContext;
use crate::process::Invocation;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::debug;

/// Where an inspection is pointed: namespace, credentials and identity
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionTarget {
    pub namespace: Option<String>,
    pub kubeconfig: Option<PathBuf>,
    pub impersonate: Option<String>,
}

impl CollectionTarget {
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..self.clone()
        }
    }

    pub fn with_kubeconfig(&self, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            kubeconfig: Some(kubeconfig.into()),
            ..self.clone()
        }
    }

    pub fn with_impersonation(&self, user: Option<&str>) -> Self {
        Self {
            impersonate: user.map(String::from),
            ..self.clone()
        }
    }
}

/// Invoker for `oc adm inspect`, scoped to one [`CollectionTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspector {
    program: PathBuf,
    dest_dir: PathBuf,
    target: CollectionTarget,
}

impl Inspector {
    pub fn new(program: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dest_dir: dest_dir.into(),
            target: CollectionTarget::default(),
        }
    }

    pub fn target(&self) -> &CollectionTarget {
        &self.target
    }

    /// Same inspector, scoped to another namespace
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            target: self.target.with_namespace(namespace),
            ..self.clone()
        }
    }

    pub fn with_kubeconfig(&self, kubeconfig: impl Into<PathBuf>) -> Self {
        Self {
            target: self.target.with_kubeconfig(kubeconfig),
            ..self.clone()
        }
    }

    pub fn with_impersonation(&self, user: Option<&str>) -> Self {
        Self {
            target: self.target.with_impersonation(user),
            ..self.clone()
        }
    }

    /// Full argument list for inspecting `targets`
    pub fn args(&self, targets: &[String]) -> Vec<String> {
        let mut args = vec![
            "adm".to_string(),
            "inspect".to_string(),
            "--dest-dir".to_string(),
            self.dest_dir.display().to_string(),
        ];
        if let Some(ns) = &self.target.namespace {
            args.extend(["-n".to_string(), ns.clone()]);
        }
        if let Some(kubeconfig) = &self.target.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig.display().to_string()]);
        }
        if let Some(user) = &self.target.impersonate {
            args.extend(["--as".to_string(), user.clone()]);
        }
        args.extend(targets.iter().cloned());
        args
    }

    /// Run one inspection; failures are recorded as informational, never returned
    pub async fn run(&self, ctx: &DumpContext, report: &mut DumpReport, targets: &[String]) {
        let args = self.args(targets);
        let subject = self
            .target
            .namespace
            .clone()
            .unwrap_or_else(|| "cluster-scoped".to_string());
        let start = Instant::now();

        let invocation = Invocation::new(&self.program, args.clone());
        match ctx.runner.run(&invocation, &ctx.cancel).await {
            Ok(out) if out.success => {
                debug!(
                    namespace = %subject,
                    duration = %humantime::format_duration(start.elapsed()),
                    "oc adm inspect finished"
                );
            }
            Ok(out) => report.record(
                Diagnostic::info(
                    Step::Inspect,
                    subject,
                    format!("oc adm inspect returned an error: {}", out.status_text()),
                )
                .with_args(&args)
                .with_output(out.combined_lossy()),
            ),
            Err(e) => report.record(
                Diagnostic::info(
                    Step::Inspect,
                    subject,
                    format!("oc adm inspect returned an error: {}", e),
                )
                .with_args(&args),
            ),
        }
    }
}

/// Invoker for `oc adm node-logs`, writing stdout to `<role>.nodes.log`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeLogs {
    program: PathBuf,
    dest_dir: PathBuf,
    kubeconfig: Option<PathBuf>,
    role: Option<String>,
}

impl NodeLogs {
    pub fn new(program: impl Into<PathBuf>, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            dest_dir: dest_dir.into(),
            kubeconfig: None,
            role: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into()).filter(|r: &String| !r.is_empty());
        self
    }

    pub fn file_name(&self) -> String {
        match &self.role {
            Some(role) => format!("{}.nodes.log", role),
            None => "nodes.log".to_string(),
        }
    }

    pub fn output_path(&self) -> PathBuf {
        self.dest_dir.join(self.file_name())
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["adm".to_string(), "node-logs".to_string()];
        if let Some(kubeconfig) = &self.kubeconfig {
            args.extend(["--kubeconfig".to_string(), kubeconfig.display().to_string()]);
        }
        if let Some(role) = &self.role {
            args.extend(["--role".to_string(), role.clone()]);
        }
        args
    }

    pub async fn run(&self, ctx: &DumpContext, report: &mut DumpReport) {
        let path = self.output_path();
        if let Err(e) = ensure_parent(&path) {
            report.record(Diagnostic::error(
                Step::NodeLogs,
                path.display().to_string(),
                format!("failed creating file to dump node-logs: {}", e),
            ));
            return;
        }

        let args = self.args();
        let invocation = Invocation::new(&self.program, args.clone());
        let out = match ctx.runner.run(&invocation, &ctx.cancel).await {
            Ok(out) => out,
            Err(e) => {
                report.record(
                    Diagnostic::error(
                        Step::NodeLogs,
                        path.display().to_string(),
                        format!("failed running command oc: {}", e),
                    )
                    .with_args(&args),
                );
                return;
            }
        };

        // Whatever reached stdout is kept, even from a failing run.
        if let Err(e) = tokio::fs::write(&path, &out.stdout).await {
            report.record(Diagnostic::error(
                Step::NodeLogs,
                path.display().to_string(),
                format!("failed writing node-logs: {}", e),
            ));
        }
        if !out.success {
            report.record(
                Diagnostic::error(
                    Step::NodeLogs,
                    path.display().to_string(),
                    format!("failed running command oc: {}", out.status_text()),
                )
                .with_args(&args)
                .with_output(String::from_utf8_lossy(&out.stderr)),
            );
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) => std::fs::create_dir_all(parent),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_with_namespace_leaves_original_untouched() {
        let base = Inspector::new("/usr/bin/oc", "/tmp/dump").with_impersonation(Some("admin"));
        let scoped = base.with_namespace("clusters-example");

        assert_eq!(base.target().namespace, None);
        assert_eq!(scoped.target().namespace.as_deref(), Some("clusters-example"));
        assert_eq!(scoped.target().impersonate.as_deref(), Some("admin"));
    }

    #[test]
    fn test_args_order() {
        let inspector = Inspector::new("oc", "/tmp/dump")
            .with_namespace("clusters")
            .with_kubeconfig("/tmp/kubeconfig-1")
            .with_impersonation(Some("system:admin"));
        assert_eq!(
            inspector.args(&strings(&["node", "pod"])),
            strings(&[
                "adm", "inspect", "--dest-dir", "/tmp/dump", "-n", "clusters", "--kubeconfig",
                "/tmp/kubeconfig-1", "--as", "system:admin", "node", "pod",
            ])
        );
    }

    #[test]
    fn test_args_without_optionals() {
        let inspector = Inspector::new("oc", "/tmp/dump");
        assert_eq!(
            inspector.args(&strings(&["node"])),
            strings(&["adm", "inspect", "--dest-dir", "/tmp/dump", "node"])
        );
    }

    #[test]
    fn test_node_logs_file_name() {
        let logs = NodeLogs::new("oc", "/tmp/guest").with_kubeconfig("/tmp/kc").with_role("worker");
        assert_eq!(logs.file_name(), "worker.nodes.log");
        assert_eq!(
            logs.args(),
            strings(&["adm", "node-logs", "--kubeconfig", "/tmp/kc", "--role", "worker"])
        );
        assert_eq!(NodeLogs::new("oc", "/tmp").file_name(), "nodes.log");
    }
}
