//! Application configuration for hcdump

use crate::error::{DumpError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::{Path, PathBuf};

/// Namespace the hosted cluster operator runs in
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "hypershift";

/// Application configuration stored in ~/.hcdump/config.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Introspection tool used for `adm inspect`, `cp` and `exec`
    #[serde(default = "default_inspect_command")]
    pub inspect_command: String,

    /// Archiver invoked over the artifact directory
    #[serde(default = "default_archive_command")]
    pub archive_command: String,

    /// Namespace of the hosted cluster operator
    #[serde(default = "default_operator_namespace")]
    pub operator_namespace: String,

    /// Lowest local port picked for the guest cluster tunnel
    #[serde(default = "default_tunnel_port_min")]
    pub tunnel_port_min: u16,

    /// Upper bound (exclusive) for the guest cluster tunnel port
    #[serde(default = "default_tunnel_port_max")]
    pub tunnel_port_max: u16,

    /// Random ports tried before giving up on the tunnel listener
    #[serde(default = "default_tunnel_bind_attempts")]
    pub tunnel_bind_attempts: u32,

    /// Directory for temporary guest kubeconfigs, system temp dir when unset
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            inspect_command: default_inspect_command(),
            archive_command: default_archive_command(),
            operator_namespace: default_operator_namespace(),
            tunnel_port_min: default_tunnel_port_min(),
            tunnel_port_max: default_tunnel_port_max(),
            tunnel_bind_attempts: default_tunnel_bind_attempts(),
            temp_dir: None,
        }
    }
}

fn default_inspect_command() -> String {
    "oc".to_string()
}

fn default_archive_command() -> String {
    "tar".to_string()
}

fn default_operator_namespace() -> String {
    DEFAULT_OPERATOR_NAMESPACE.to_string()
}

fn default_tunnel_port_min() -> u16 {
    32767
}

fn default_tunnel_port_max() -> u16 {
    45000
}

fn default_tunnel_bind_attempts() -> u32 {
    10
}

impl AppConfig {
    /// Port range the tunnel listener is drawn from
    pub fn tunnel_ports(&self) -> Result<Range<u16>> {
        if self.tunnel_port_min == 0 || self.tunnel_port_min >= self.tunnel_port_max {
            return Err(DumpError::Config(format!(
                "invalid tunnel port range {}..{}",
                self.tunnel_port_min, self.tunnel_port_max
            )));
        }
        Ok(self.tunnel_port_min..self.tunnel_port_max)
    }
}

/// A single dump run, fixed for its whole duration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpRequest {
    /// Namespace of the HostedCluster
    pub namespace: String,
    /// Name of the HostedCluster
    pub name: String,
    /// Destination directory for dump files
    pub artifact_dir: PathBuf,
    /// Namespace holding Agents when the agent platform is used
    pub agent_namespace: Option<String>,
    /// Identity to impersonate against the management cluster
    pub impersonate: Option<String>,
    /// Whether the guest cluster is dumped through a tunnel
    pub dump_guest_cluster: bool,
}

impl DumpRequest {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        artifact_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            artifact_dir: artifact_dir.into(),
            agent_namespace: None,
            impersonate: None,
            dump_guest_cluster: false,
        }
    }

    pub fn with_agent_namespace(mut self, namespace: Option<String>) -> Self {
        self.agent_namespace = namespace.filter(|ns| !ns.is_empty());
        self
    }

    pub fn with_impersonation(mut self, user: Option<String>) -> Self {
        self.impersonate = user.filter(|u| !u.is_empty());
        self
    }

    pub fn with_guest_cluster(mut self, enabled: bool) -> Self {
        self.dump_guest_cluster = enabled;
        self
    }

    /// Namespace holding the control plane of the hosted cluster
    pub fn control_plane_namespace(&self) -> String {
        control_plane_namespace(&self.namespace, &self.name)
    }

    /// Directory receiving the guest cluster collection
    pub fn guest_dir(&self) -> PathBuf {
        self.artifact_dir.join(format!("hostedcluster-{}", self.name))
    }
}

/// Control plane namespace naming used by the hosted cluster operator
pub fn control_plane_namespace(namespace: &str, name: &str) -> String {
    format!("{}-{}", namespace, name.replace('.', "-"))
}

/// Get the hcdump config directory (~/.hcdump)
pub fn config_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|h| h.join(".hcdump"))
        .ok_or_else(|| DumpError::Config("Could not determine home directory".to_string()))
}

/// Load application config from ~/.hcdump/config.toml
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_dir()?.join("config.toml"))
}

/// Load application config from an explicit path, defaulting when absent
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| DumpError::Config(e.to_string()))
    } else {
        Ok(AppConfig::default())
    }
}
