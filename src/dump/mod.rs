//! Hosted cluster dump orchestration
//!
//! A dump is best effort: every collection step records its failures in the
//! [`DumpReport`] and the run carries on. Only a missing tool, an unusable
//! artifact directory and a failed archive stop it.

pub mod archive;
pub mod guest;
pub mod inspect;
pub mod kubeconfig;
pub mod logs;
pub mod network;
pub mod resources;
pub mod tunnel;
pub mod types;

pub use archive::ARCHIVE_NAME;
pub use inspect::{CollectionTarget, Inspector, NodeLogs};
pub use logs::{LogChecker, LogCollector, SignatureHit, SignatureScanner};
pub use resources::{PlatformUsage, ResourceType, ResourceTypeSet};
pub use tunnel::TunnelSession;
pub use types::{Diagnostic, DumpReport, Severity, Step};

use crate::client::{cancellable, Access};
use crate::config::{AppConfig, DumpRequest};
use crate::crd::NodePool;
use crate::error::{DumpError, Result};
use crate::process::CommandRunner;
use k8s_openapi::api::core::v1::Pod;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Namespace holding KubeVirt virtualization components
pub const KUBEVIRT_NAMESPACE: &str = "openshift-cnv";

/// What every step needs to run external commands
#[derive(Clone)]
pub struct DumpContext {
    pub runner: Arc<dyn CommandRunner>,
    pub cancel: CancellationToken,
}

impl DumpContext {
    pub fn new(runner: Arc<dyn CommandRunner>, cancel: CancellationToken) -> Self {
        Self { runner, cancel }
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(DumpError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs one hosted cluster dump from start to archive
pub struct Dumper {
    request: DumpRequest,
    config: AppConfig,
    access: Access,
    ctx: DumpContext,
    checkers: Vec<LogChecker>,
}

impl Dumper {
    pub fn new(
        request: DumpRequest,
        config: AppConfig,
        access: Access,
        runner: Arc<dyn CommandRunner>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request,
            config,
            access,
            ctx: DumpContext::new(runner, cancel),
            checkers: Vec::new(),
        }
    }

    /// Register a checker run over every container log before it is written
    pub fn with_log_checker(mut self, checker: LogChecker) -> Self {
        self.checkers.push(checker);
        self
    }

    pub async fn run(&self) -> Result<DumpReport> {
        let start = Instant::now();
        let mut report = DumpReport::new();

        let inspect_program = self.resolve_program(&self.config.inspect_command)?;
        let archive_program = self.resolve_program(&self.config.archive_command)?;
        ensure_artifact_dir(&self.request.artifact_dir).await?;

        info!(
            namespace = %self.request.namespace,
            name = %self.request.name,
            artifact_dir = %self.request.artifact_dir.display(),
            "Dumping hosted cluster"
        );

        let node_pools = self.cluster_node_pools(&mut report).await;
        self.ctx.check_cancelled()?;

        self.inspect_cluster_objects(&inspect_program, &node_pools, &mut report)
            .await;
        self.ctx.check_cancelled()?;

        self.collect_pod_logs(&mut report).await;
        self.ctx.check_cancelled()?;

        network::gather_network_logs(
            &self.ctx,
            self.access.primary.as_ref(),
            &inspect_program,
            &self.request.control_plane_namespace(),
            &self.request.artifact_dir,
            &mut report,
        )
        .await;
        self.ctx.check_cancelled()?;

        if self.request.dump_guest_cluster {
            if let Err(e) = guest::dump_guest_cluster(
                &self.ctx,
                self.access.management.as_ref(),
                &inspect_program,
                &self.request,
                &self.config,
                &mut report,
            )
            .await
            {
                report.record(Diagnostic::error(
                    Step::GuestCluster,
                    self.request.guest_dir().display().to_string(),
                    format!("Failed to dump guest cluster: {}", e),
                ));
            }
            self.ctx.check_cancelled()?;
        }

        let archive =
            archive::create_archive(&self.ctx, &archive_program, &self.request.artifact_dir)
                .await?;
        report.archive = Some(archive);
        report.finish();

        info!(
            duration = %humantime::format_duration(start.elapsed()),
            errors = report.error_count(),
            "Dump finished"
        );
        Ok(report)
    }

    fn resolve_program(&self, program: &str) -> Result<PathBuf> {
        self.ctx
            .runner
            .resolve(program)
            .ok_or_else(|| DumpError::ToolNotFound(program.to_string()))
    }

    /// NodePools in the request namespace that belong to this cluster
    async fn cluster_node_pools(&self, report: &mut DumpReport) -> Vec<NodePool> {
        let listed = cancellable(
            &self.ctx.cancel,
            self.access.primary.list_node_pools(&self.request.namespace),
        )
        .await;

        match listed {
            Ok(pools) => pools
                .into_iter()
                .filter(|np| np.spec.cluster_name == self.request.name)
                .collect(),
            Err(e) => {
                report.record(Diagnostic::error(
                    Step::NodePools,
                    self.request.namespace.as_str(),
                    format!("Failed to list nodepools in namespace: {}", e),
                ));
                Vec::new()
            }
        }
    }

    async fn inspect_cluster_objects(
        &self,
        program: &Path,
        node_pools: &[NodePool],
        report: &mut DumpReport,
    ) {
        let base = Inspector::new(program, &self.request.artifact_dir)
            .with_impersonation(self.request.impersonate.as_deref());

        let mut cluster_objects = vec![resources::HOSTED_CLUSTER.named(&self.request.name)];
        cluster_objects.extend(
            node_pools
                .iter()
                .filter_map(|np| np.metadata.name.as_deref())
                .map(|name| resources::NODE_POOL.named(name)),
        );
        base.with_namespace(self.request.namespace.as_str())
            .run(&self.ctx, report, &cluster_objects)
            .await;
        base.run(&self.ctx, report, &[resources::NODE.to_string()])
            .await;

        let usage = PlatformUsage {
            kubevirt: node_pools.iter().any(NodePool::uses_kubevirt),
            agent: self.request.agent_namespace.is_some(),
        };
        let resource_set = resources::control_plane_resources(usage);
        let resource_arg = vec![resource_set.to_arg()];
        debug!(kinds = resource_set.len(), ?usage, "Computed resource set");

        for namespace in [
            self.request.control_plane_namespace(),
            self.request.namespace.clone(),
            self.config.operator_namespace.clone(),
        ] {
            base.with_namespace(namespace)
                .run(&self.ctx, report, &resource_arg)
                .await;
        }

        if let Some(agent_namespace) = &self.request.agent_namespace {
            base.with_namespace(agent_namespace.as_str())
                .run(
                    &self.ctx,
                    report,
                    &[resources::agent_namespace_resources().to_arg()],
                )
                .await;
        }

        if usage.kubevirt {
            base.with_namespace(KUBEVIRT_NAMESPACE)
                .run(&self.ctx, report, &resource_arg)
                .await;
        }
    }

    /// Logs of every pod in the control plane and operator namespaces
    async fn collect_pod_logs(&self, report: &mut DumpReport) {
        let mut pods: Vec<Pod> = Vec::new();
        for namespace in [
            self.request.control_plane_namespace(),
            self.config.operator_namespace.clone(),
        ] {
            match cancellable(
                &self.ctx.cancel,
                self.access.primary.list_pods(&namespace, None),
            )
            .await
            {
                Ok(listed) => pods.extend(listed),
                Err(e) => report.record(Diagnostic::error(
                    Step::PodLogs,
                    namespace.as_str(),
                    format!("Cannot list pods in namespace: {}", e),
                )),
            }
        }

        LogCollector::new(
            self.access.primary.as_ref(),
            &self.request.artifact_dir,
            &self.checkers,
            &self.ctx.cancel,
        )
        .collect(&pods, report)
        .await;
    }
}

/// Create the artifact directory if needed and prove it is writable
pub async fn ensure_artifact_dir(dir: &Path) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| DumpError::ArtifactDir {
            path: dir.to_path_buf(),
            source,
        })?;
    tempfile::tempfile_in(dir).map_err(|source| DumpError::ArtifactDir {
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(())
}
