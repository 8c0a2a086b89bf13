//! Hosted cluster API types
//!
//! Only the fields the dump reads are modelled; everything else in the
//! objects is ignored on deserialization.

use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// Port the hosted kube-apiserver binds when the HostedCluster does not override it
pub const DEFAULT_API_SERVER_PORT: i32 = 6443;

/// NodePool platform type for KubeVirt-backed nodes
pub const KUBEVIRT_PLATFORM: &str = "KubeVirt";

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1beta1",
    kind = "HostedCluster",
    plural = "hostedclusters",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct HostedClusterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networking: Option<ClusterNetworking>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetworking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_server: Option<ApiServerNetworking>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ApiServerNetworking {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl HostedCluster {
    /// Port the kube-apiserver pod listens on
    pub fn api_server_port(&self) -> i32 {
        self.spec
            .networking
            .as_ref()
            .and_then(|n| n.api_server.as_ref())
            .and_then(|a| a.port)
            .unwrap_or(DEFAULT_API_SERVER_PORT)
    }
}

#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[kube(
    group = "hypershift.openshift.io",
    version = "v1beta1",
    kind = "NodePool",
    plural = "nodepools",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolSpec {
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default)]
    pub platform: NodePoolPlatform,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct NodePoolPlatform {
    #[serde(default, rename = "type")]
    pub type_: String,
}

impl NodePool {
    pub fn uses_kubevirt(&self) -> bool {
        self.spec.platform.type_ == KUBEVIRT_PLATFORM
    }
}
