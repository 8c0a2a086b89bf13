// Common test utilities and helpers
#![allow(dead_code)]

use async_trait::async_trait;
use hcdump::client::{Access, ClusterAccess};
use hcdump::crd::{HostedCluster, HostedClusterSpec, NodePool, NodePoolPlatform, NodePoolSpec};
use hcdump::dump::TunnelSession;
use hcdump::error::{DumpError, Result};
use hcdump::process::{CommandOutput, CommandRunner, Invocation};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub const LOCALHOST_KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: cluster
  cluster:
    server: https://localhost:6443
contexts:
- name: admin
  context:
    cluster: cluster
    user: admin
current-context: admin
users:
- name: admin
  user:
    token: abc
"#;

// ============================================================================
// Fixtures
// ============================================================================

/// Create a mock Pod with the given containers and phase
pub fn create_mock_pod(
    name: &str,
    namespace: &str,
    phase: &str,
    labels: &[(&str, &str)],
    containers: &[&str],
) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: containers
                .iter()
                .map(|c| Container {
                    name: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}

pub fn create_mock_kube_apiserver(name: &str, namespace: &str, phase: &str) -> Pod {
    create_mock_pod(
        name,
        namespace,
        phase,
        &[
            ("app", "kube-apiserver"),
            (
                "hypershift.openshift.io/control-plane-component",
                "kube-apiserver",
            ),
        ],
        &["kube-apiserver"],
    )
}

pub fn create_mock_node_pool(name: &str, namespace: &str, cluster: &str, platform: &str) -> NodePool {
    let mut np = NodePool::new(
        name,
        NodePoolSpec {
            cluster_name: cluster.to_string(),
            platform: NodePoolPlatform {
                type_: platform.to_string(),
            },
        },
    );
    np.metadata.namespace = Some(namespace.to_string());
    np
}

pub fn create_mock_hosted_cluster(name: &str, namespace: &str) -> HostedCluster {
    let mut hc = HostedCluster::new(name, HostedClusterSpec::default());
    hc.metadata.namespace = Some(namespace.to_string());
    hc
}

pub fn create_localhost_kubeconfig_secret(namespace: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("localhost-kubeconfig".to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(
            "kubeconfig".to_string(),
            ByteString(LOCALHOST_KUBECONFIG.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

// ============================================================================
// Fake management cluster
// ============================================================================

/// In-memory [`ClusterAccess`]
#[derive(Default)]
pub struct FakeCluster {
    pub node_pools: Vec<NodePool>,
    pub hosted_clusters: Vec<HostedCluster>,
    pub secrets: Vec<Secret>,
    pub pods: Vec<Pod>,
    /// Logs keyed by (namespace, pod, container, previous)
    pub logs: HashMap<(String, String, String, bool), Vec<u8>>,
    pub fail_node_pools: bool,
    pub fail_tunnel: bool,
    /// (namespace, pod, local port, remote port) of every opened tunnel
    pub tunnels: Mutex<Vec<(String, String, u16, u16)>>,
}

impl FakeCluster {
    pub fn with_log(mut self, namespace: &str, pod: &str, container: &str, previous: bool, content: &str) -> Self {
        self.logs.insert(
            (
                namespace.to_string(),
                pod.to_string(),
                container.to_string(),
                previous,
            ),
            content.as_bytes().to_vec(),
        );
        self
    }

    pub fn into_access(self) -> (Access, Arc<FakeCluster>) {
        let fake = Arc::new(self);
        let access = Access {
            primary: fake.clone(),
            management: fake.clone(),
        };
        (access, fake)
    }

    pub fn opened_tunnels(&self) -> Vec<(String, String, u16, u16)> {
        self.tunnels.lock().unwrap().clone()
    }
}

fn matches_selector(pod: &Pod, selector: Option<&str>) -> bool {
    let Some(selector) = selector else {
        return true;
    };
    let labels = pod.metadata.labels.clone().unwrap_or_default();
    selector.split(',').all(|term| match term.split_once('=') {
        Some((k, v)) => labels.get(k).map(String::as_str) == Some(v),
        None => labels.contains_key(term),
    })
}

fn not_found(kind: &str, namespace: &str, name: &str) -> DumpError {
    DumpError::NotFound {
        kind: kind.to_string(),
        name: format!("{}/{}", namespace, name),
    }
}

#[async_trait]
impl ClusterAccess for FakeCluster {
    async fn list_node_pools(&self, namespace: &str) -> Result<Vec<NodePool>> {
        if self.fail_node_pools {
            return Err(DumpError::Config("nodepools are forbidden".to_string()));
        }
        Ok(self
            .node_pools
            .iter()
            .filter(|np| np.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn get_hosted_cluster(&self, namespace: &str, name: &str) -> Result<HostedCluster> {
        self.hosted_clusters
            .iter()
            .find(|hc| {
                hc.metadata.namespace.as_deref() == Some(namespace)
                    && hc.metadata.name.as_deref() == Some(name)
            })
            .cloned()
            .ok_or_else(|| not_found("HostedCluster", namespace, name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret> {
        self.secrets
            .iter()
            .find(|s| {
                s.metadata.namespace.as_deref() == Some(namespace)
                    && s.metadata.name.as_deref() == Some(name)
            })
            .cloned()
            .ok_or_else(|| not_found("Secret", namespace, name))
    }

    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>> {
        Ok(self
            .pods
            .iter()
            .filter(|p| p.metadata.namespace.as_deref() == Some(namespace))
            .filter(|p| matches_selector(p, label_selector))
            .cloned()
            .collect())
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
    ) -> Result<Vec<u8>> {
        self.logs
            .get(&(
                namespace.to_string(),
                pod.to_string(),
                container.to_string(),
                previous,
            ))
            .cloned()
            .ok_or_else(|| not_found("PodLog", namespace, &format!("{}/{}", pod, container)))
    }

    async fn open_tunnel(
        &self,
        listener: TcpListener,
        namespace: &str,
        pod: &str,
        remote_port: u16,
    ) -> Result<TunnelSession> {
        if self.fail_tunnel {
            return Err(DumpError::Tunnel(format!(
                "{}/{}:{}: connection refused",
                namespace, pod, remote_port
            )));
        }
        let local_port = listener.local_addr()?.port();
        self.tunnels.lock().unwrap().push((
            namespace.to_string(),
            pod.to_string(),
            local_port,
            remote_port,
        ));
        let task = tokio::spawn(async move {
            let _listener = listener;
            std::future::pending::<()>().await;
        });
        Ok(TunnelSession::new(local_port, namespace, pod, remote_port, task))
    }
}

// ============================================================================
// Recording command runner
// ============================================================================

pub type Responder = Box<dyn Fn(&Invocation) -> CommandOutput + Send + Sync>;

/// [`CommandRunner`] that records invocations and answers from a closure
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    responder: Responder,
    missing: Vec<String>,
}

impl RecordingRunner {
    /// Every command succeeds with empty output
    pub fn succeeding() -> Self {
        Self::with_responder(|_| CommandOutput::ok(Vec::new()))
    }

    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&Invocation) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
            missing: Vec::new(),
        }
    }

    /// Pretend `program` is not installed
    pub fn without_program(mut self, program: &str) -> Self {
        self.missing.push(program.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls whose first argument is `first`
    pub fn calls_starting_with(&self, first: &str) -> Vec<Invocation> {
        self.calls()
            .into_iter()
            .filter(|c| c.args.first().map(String::as_str) == Some(first))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    fn resolve(&self, program: &str) -> Option<PathBuf> {
        if self.missing.iter().any(|m| m == program) {
            None
        } else {
            Some(PathBuf::from(program))
        }
    }

    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<CommandOutput> {
        if cancel.is_cancelled() {
            return Err(DumpError::Cancelled);
        }
        self.calls.lock().unwrap().push(invocation.clone());
        Ok((self.responder)(invocation))
    }
}

/// Value following `flag` in an argument list
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}
