//! Kubernetes client abstraction

use crate::crd::{HostedCluster, NodePool};
use crate::dump::tunnel::{relay_connections, TunnelSession};
use crate::error::{DumpError, Result};
use async_trait::async_trait;
use futures::AsyncReadExt;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{ListParams, LogParams};
use kube::{config::KubeConfigOptions, Api, Client, Config};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Create a Kubernetes client for the specified context, optionally impersonating a user
pub async fn create_client(context: Option<&str>, impersonate: Option<&str>) -> Result<Client> {
    let mut config = load_config(context).await?;
    if let Some(user) = impersonate {
        config.auth_info.impersonate = Some(user.to_string());
    }
    Client::try_from(config).map_err(DumpError::from)
}

/// Load Kubernetes configuration
async fn load_config(context: Option<&str>) -> Result<Config> {
    let options = KubeConfigOptions {
        context: context.map(String::from),
        ..Default::default()
    };

    Config::from_kubeconfig(&options)
        .await
        .map_err(|e| DumpError::Config(format!("Failed to load kubeconfig: {e}")))
}

/// The cluster operations a dump needs from the management cluster
#[async_trait]
pub trait ClusterAccess: Send + Sync {
    async fn list_node_pools(&self, namespace: &str) -> Result<Vec<NodePool>>;

    async fn get_hosted_cluster(&self, namespace: &str, name: &str) -> Result<HostedCluster>;

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret>;

    /// List pods, filtered by a `k=v,k2=v2` label selector when given
    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>>;

    /// Fetch the raw log of one container
    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
    ) -> Result<Vec<u8>>;

    /// Relay connections accepted on `listener` to `remote_port` of the pod
    async fn open_tunnel(
        &self,
        listener: TcpListener,
        namespace: &str,
        pod: &str,
        remote_port: u16,
    ) -> Result<TunnelSession>;
}

/// Clients resolved for one run
#[derive(Clone)]
pub struct Access {
    /// Client used for collection, impersonated when requested
    pub primary: Arc<dyn ClusterAccess>,
    /// Non-impersonated client used to reach the guest cluster
    pub management: Arc<dyn ClusterAccess>,
}

/// Resolve management cluster access, impersonating `impersonate` for collection
pub async fn resolve_access(context: Option<&str>, impersonate: Option<&str>) -> Result<Access> {
    let management = create_client(context, None).await?;
    let primary = match impersonate {
        Some(user) => create_client(context, Some(user)).await?,
        None => management.clone(),
    };
    Ok(Access {
        primary: Arc::new(KubeAccess::new(primary)),
        management: Arc::new(KubeAccess::new(management)),
    })
}

/// Race an API call against the run's cancellation signal
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(DumpError::Cancelled),
        result = fut => result,
    }
}

/// [`ClusterAccess`] backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeAccess {
    client: Client,
}

impl KubeAccess {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterAccess for KubeAccess {
    async fn list_node_pools(&self, namespace: &str) -> Result<Vec<NodePool>> {
        let api: Api<NodePool> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn get_hosted_cluster(&self, namespace: &str, name: &str) -> Result<HostedCluster> {
        let api: Api<HostedCluster> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await?.ok_or_else(|| DumpError::NotFound {
            kind: "HostedCluster".to_string(),
            name: format!("{}/{}", namespace, name),
        })
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name).await?.ok_or_else(|| DumpError::NotFound {
            kind: "Secret".to_string(),
            name: format!("{}/{}", namespace, name),
        })
    }

    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let mut lp = ListParams::default();
        if let Some(selector) = label_selector {
            lp = lp.labels(selector);
        }
        Ok(api.list(&lp).await?.items)
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
    ) -> Result<Vec<u8>> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let lp = LogParams {
            container: Some(container.to_string()),
            previous,
            ..Default::default()
        };

        let mut stream = Box::pin(api.log_stream(pod, &lp).await?);
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).await?;
        Ok(buf)
    }

    async fn open_tunnel(
        &self,
        listener: TcpListener,
        namespace: &str,
        pod: &str,
        remote_port: u16,
    ) -> Result<TunnelSession> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let local_port = listener.local_addr()?.port();

        // Establish one forward up front so an unreachable pod fails the step
        // instead of every later connection.
        let mut first = api
            .portforward(pod, &[remote_port])
            .await
            .map_err(|e| DumpError::Tunnel(format!("{}/{}:{}: {}", namespace, pod, remote_port, e)))?;
        if first.take_stream(remote_port).is_none() {
            return Err(DumpError::Tunnel(format!(
                "{}/{}:{}: no stream for port",
                namespace, pod, remote_port
            )));
        }
        first.abort();

        let pod_name = pod.to_string();
        let task = tokio::spawn(relay_connections(listener, move || {
            let api = api.clone();
            let pod_name = pod_name.clone();
            async move {
                let mut pf = match api.portforward(&pod_name, &[remote_port]).await {
                    Ok(pf) => pf,
                    Err(e) => {
                        warn!(pod = %pod_name, error = %e, "Cannot forward connection");
                        return None;
                    }
                };
                match pf.take_stream(remote_port) {
                    Some(upstream) => Some((upstream, pf)),
                    None => {
                        warn!(pod = %pod_name, port = remote_port, "Port forward returned no stream");
                        None
                    }
                }
            }
        }));

        Ok(TunnelSession::new(local_port, namespace, pod, remote_port, task))
    }
}
