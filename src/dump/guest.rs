//! Guest cluster collection through a tunnel to the hosted kube-apiserver
//!
//! The guest cluster's own nodes may be unschedulable while we collect, so
//! nothing runs inside it: everything goes through its API server, reached
//! via a port forward to a kube-apiserver pod in the control plane namespace.

use super::inspect::{Inspector, NodeLogs};
use super::kubeconfig::{
    kubeconfig_from_secret, rewrite_kubeconfig, TempKubeconfig, LOCALHOST_KUBECONFIG_SECRET,
};
use super::resources::guest_cluster_resources;
use super::tunnel::reserve_local_port;
use super::types::DumpReport;
use super::DumpContext;
use crate::client::{cancellable, ClusterAccess};
use crate::config::{AppConfig, DumpRequest};
use crate::error::{DumpError, Result};
use k8s_openapi::api::core::v1::Pod;
use std::path::Path;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::info;

/// Labels of the hosted kube-apiserver pods
pub const KUBE_APISERVER_SELECTOR: &str =
    "app=kube-apiserver,hypershift.openshift.io/control-plane-component=kube-apiserver";

/// First pod in the `Running` phase
pub fn first_running(pods: &[Pod]) -> Option<&Pod> {
    pods.iter().find(|pod| {
        pod.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Running")
    })
}

/// Dump the guest cluster into `<artifact-dir>/hostedcluster-<name>`.
///
/// The temporary kubeconfig and the tunnel are released on every path out
/// of this function.
pub async fn dump_guest_cluster(
    ctx: &DumpContext,
    access: &dyn ClusterAccess,
    program: &Path,
    request: &DumpRequest,
    config: &AppConfig,
    report: &mut DumpReport,
) -> Result<()> {
    let start = Instant::now();

    let hosted_cluster = cancellable(
        &ctx.cancel,
        access.get_hosted_cluster(&request.namespace, &request.name),
    )
    .await
    .map_err(|e| {
        DumpError::GuestCluster(format!(
            "failed to get hosted cluster {}/{}: {}",
            request.namespace, request.name, e
        ))
    })?;
    let cp_namespace = request.control_plane_namespace();

    let listener = reserve_local_port(config.tunnel_ports()?, config.tunnel_bind_attempts).await?;
    let local_port = listener.local_addr()?.port();

    let kubeconfig =
        create_guest_kubeconfig(ctx, access, config, &cp_namespace, local_port).await?;

    let result = collect_through_tunnel(
        ctx,
        access,
        program,
        request,
        &cp_namespace,
        hosted_cluster.api_server_port(),
        listener,
        &kubeconfig,
        report,
    )
    .await;

    kubeconfig.remove(report);

    if result.is_ok() {
        info!(
            duration = %humantime::format_duration(start.elapsed()),
            "Successfully dumped guest cluster"
        );
    }
    result
}

async fn create_guest_kubeconfig(
    ctx: &DumpContext,
    access: &dyn ClusterAccess,
    config: &AppConfig,
    cp_namespace: &str,
    local_port: u16,
) -> Result<TempKubeconfig> {
    let secret = cancellable(
        &ctx.cancel,
        access.get_secret(cp_namespace, LOCALHOST_KUBECONFIG_SECRET),
    )
    .await
    .map_err(|e| {
        DumpError::GuestCluster(format!("failed to get hostedcluster localhost kubeconfig: {}", e))
    })?;

    let rewritten = rewrite_kubeconfig(kubeconfig_from_secret(&secret)?, local_port)?;
    TempKubeconfig::create(&rewritten, config.temp_dir.as_deref())
}

#[allow(clippy::too_many_arguments)]
async fn collect_through_tunnel(
    ctx: &DumpContext,
    access: &dyn ClusterAccess,
    program: &Path,
    request: &DumpRequest,
    cp_namespace: &str,
    api_port: i32,
    listener: TcpListener,
    kubeconfig: &TempKubeconfig,
    report: &mut DumpReport,
) -> Result<()> {
    let pods = cancellable(
        &ctx.cancel,
        access.list_pods(cp_namespace, Some(KUBE_APISERVER_SELECTOR)),
    )
    .await
    .map_err(|e| {
        DumpError::GuestCluster(format!(
            "failed to list kube-apiserver pods in control plane namespace: {}",
            e
        ))
    })?;
    let pod_name = first_running(&pods)
        .and_then(|pod| pod.metadata.name.clone())
        .ok_or_else(|| {
            DumpError::GuestCluster("did not find running kube-apiserver pod for guest cluster".to_string())
        })?;

    let remote_port = u16::try_from(api_port)
        .map_err(|_| DumpError::GuestCluster(format!("invalid API server port {}", api_port)))?;
    let tunnel = cancellable(
        &ctx.cancel,
        access.open_tunnel(listener, cp_namespace, &pod_name, remote_port),
    )
    .await
    .map_err(|e| DumpError::GuestCluster(format!("cannot forward kube apiserver port: {}", e)))?;

    let target = request.guest_dir();
    info!(
        dest = %target.display(),
        tunnel = %tunnel.target(),
        local_port = tunnel.local_port(),
        remote_port = tunnel.remote_port(),
        "Dumping guestcluster"
    );
    let result = dump_guest_resources(ctx, program, kubeconfig.path(), &target, report).await;

    tunnel.close();
    result
}

/// Reduced collection against the guest API server: inspect plus worker node logs
pub async fn dump_guest_resources(
    ctx: &DumpContext,
    program: &Path,
    kubeconfig: &Path,
    dest_dir: &Path,
    report: &mut DumpReport,
) -> Result<()> {
    tokio::fs::create_dir_all(dest_dir).await.map_err(|e| {
        DumpError::GuestCluster(format!("cannot create {}: {}", dest_dir.display(), e))
    })?;

    let inspector = Inspector::new(program, dest_dir).with_kubeconfig(kubeconfig);
    inspector
        .run(ctx, report, &[guest_cluster_resources().to_arg()])
        .await;

    NodeLogs::new(program, dest_dir)
        .with_kubeconfig(kubeconfig)
        .with_role("worker")
        .run(ctx, report)
        .await;

    if ctx.cancel.is_cancelled() {
        return Err(DumpError::Cancelled);
    }
    Ok(())
}
