//! OVN database copies and cluster status from ovnkube-master pods

use super::types::{Diagnostic, DumpReport, Step};
use super::DumpContext;
use crate::client::{cancellable, ClusterAccess};
use crate::process::Invocation;
use std::path::{Path, PathBuf};

/// Label selecting the pods running the OVN databases
pub const OVNKUBE_MASTER_SELECTOR: &str = "app=ovnkube-master";

/// The two OVN databases copied from every ovnkube-master pod
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OvnDatabase {
    Northbound,
    Southbound,
}

impl OvnDatabase {
    pub const ALL: [OvnDatabase; 2] = [OvnDatabase::Northbound, OvnDatabase::Southbound];

    fn letter(&self) -> &'static str {
        match self {
            OvnDatabase::Northbound => "n",
            OvnDatabase::Southbound => "s",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OvnDatabase::Northbound => "OVN_Northbound",
            OvnDatabase::Southbound => "OVN_Southbound",
        }
    }

    /// Sidecar container serving this database
    pub fn container(&self) -> String {
        format!("{}bdb", self.letter())
    }

    pub fn db_file(&self) -> String {
        format!("ovn{}b_db.db", self.letter())
    }

    /// `oc cp` arguments copying the database file out of the pod
    pub fn copy_args(&self, namespace: &str, pod: &str, dest_dir: &Path) -> Vec<String> {
        vec![
            "cp".to_string(),
            format!("{}/{}:/etc/ovn/{}", namespace, pod, self.db_file()),
            "-c".to_string(),
            self.container(),
            dest_dir
                .join(format!("{}_{}", pod, self.db_file()))
                .display()
                .to_string(),
        ]
    }

    /// `oc exec` arguments querying raft cluster status
    pub fn status_args(&self, namespace: &str, pod: &str) -> Vec<String> {
        vec![
            "exec".to_string(),
            "-n".to_string(),
            namespace.to_string(),
            pod.to_string(),
            "-c".to_string(),
            self.container(),
            "--".to_string(),
            "bash".to_string(),
            "-c".to_string(),
            format!(
                "ovn-appctl -t /var/run/ovn/ovn{}b_db.ctl cluster/status {}",
                self.letter(),
                self.name()
            ),
        ]
    }

    pub fn status_file(&self, pod: &str, dest_dir: &Path) -> PathBuf {
        dest_dir.join(format!("{}_{}_status", pod, self.name()))
    }
}

/// Directory receiving network diagnostics
pub fn network_dir(artifact_dir: &Path) -> PathBuf {
    artifact_dir.join("network_logs")
}

/// Copy OVN databases and record their cluster status for every ovnkube-master pod
pub async fn gather_network_logs(
    ctx: &DumpContext,
    access: &dyn ClusterAccess,
    program: &Path,
    control_plane_namespace: &str,
    artifact_dir: &Path,
    report: &mut DumpReport,
) {
    let dir = network_dir(artifact_dir);
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        report.record(Diagnostic::error(
            Step::Network,
            dir.display().to_string(),
            format!("Cannot create directory: {}", e),
        ));
        return;
    }

    let pods = match cancellable(
        &ctx.cancel,
        access.list_pods(control_plane_namespace, Some(OVNKUBE_MASTER_SELECTOR)),
    )
    .await
    {
        Ok(pods) => pods,
        Err(e) => {
            report.record(Diagnostic::error(
                Step::Network,
                control_plane_namespace,
                format!("Cannot list ovnkube pods in controlplane namespace: {}", e),
            ));
            Vec::new()
        }
    };

    for pod in &pods {
        let Some(name) = pod.metadata.name.as_deref() else {
            continue;
        };
        for db in OvnDatabase::ALL {
            copy_database(ctx, program, control_plane_namespace, name, db, &dir, report).await;
            save_cluster_status(ctx, program, control_plane_namespace, name, db, &dir, report)
                .await;
        }
    }
}

async fn copy_database(
    ctx: &DumpContext,
    program: &Path,
    namespace: &str,
    pod: &str,
    db: OvnDatabase,
    dir: &Path,
    report: &mut DumpReport,
) {
    let args = db.copy_args(namespace, pod, dir);
    let invocation = Invocation::new(program, args.clone());
    let failure = match ctx.runner.run(&invocation, &ctx.cancel).await {
        Ok(out) if out.success => return,
        Ok(out) => Diagnostic::error(
            Step::Network,
            pod,
            format!("Copy ovn dbs command returned an error: {}", out.status_text()),
        )
        .with_output(out.combined_lossy()),
        Err(e) => Diagnostic::error(
            Step::Network,
            pod,
            format!("Copy ovn dbs command returned an error: {}", e),
        ),
    };
    report.record(failure.with_args(&args));
}

async fn save_cluster_status(
    ctx: &DumpContext,
    program: &Path,
    namespace: &str,
    pod: &str,
    db: OvnDatabase,
    dir: &Path,
    report: &mut DumpReport,
) {
    let args = db.status_args(namespace, pod);
    let invocation = Invocation::new(program, args.clone());
    let stdout = match ctx.runner.run(&invocation, &ctx.cancel).await {
        Ok(out) if out.success => out.stdout,
        Ok(out) => {
            report.record(
                Diagnostic::error(
                    Step::Network,
                    pod,
                    format!("Get ovn db status command returned an error: {}", out.status_text()),
                )
                .with_args(&args)
                .with_output(out.combined_lossy()),
            );
            return;
        }
        Err(e) => {
            report.record(
                Diagnostic::error(
                    Step::Network,
                    pod,
                    format!("Get ovn db status command returned an error: {}", e),
                )
                .with_args(&args),
            );
            return;
        }
    };

    let file = db.status_file(pod, dir);
    if let Err(e) = tokio::fs::write(&file, stdout).await {
        report.record(Diagnostic::error(
            Step::Network,
            file.display().to_string(),
            format!("Failed to write file: {}", e),
        ));
    }
}
