//! Guest cluster kubeconfig rewriting
//!
//! The control plane publishes a kubeconfig addressed to `https://localhost`.
//! It is rewritten to the tunnel's local port and kept in a temporary file
//! for exactly as long as the guest collection runs.

use super::types::{Diagnostic, DumpReport, Step};
use crate::error::{DumpError, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::config::Kubeconfig;
use std::io::Write;
use std::path::Path;
use tempfile::TempPath;

/// Secret in the control plane namespace holding the localhost kubeconfig
pub const LOCALHOST_KUBECONFIG_SECRET: &str = "localhost-kubeconfig";

/// Key of the kubeconfig inside [`LOCALHOST_KUBECONFIG_SECRET`]
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// Server address of the tunnel's local end
pub fn localhost_server(local_port: u16) -> String {
    format!("https://localhost:{}", local_port)
}

/// Raw kubeconfig bytes from the secret
pub fn kubeconfig_from_secret(secret: &Secret) -> Result<&[u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(KUBECONFIG_KEY))
        .map(|bytes| bytes.0.as_slice())
        .ok_or_else(|| {
            DumpError::Kubeconfig(format!(
                "secret {} has no {} key",
                LOCALHOST_KUBECONFIG_SECRET, KUBECONFIG_KEY
            ))
        })
}

/// Point every cluster entry at `https://localhost:<local_port>` and re-serialize
pub fn rewrite_kubeconfig(raw: &[u8], local_port: u16) -> Result<String> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| DumpError::Kubeconfig(format!("kubeconfig is not UTF-8: {}", e)))?;
    let mut config = Kubeconfig::from_yaml(text)
        .map_err(|e| DumpError::Kubeconfig(format!("failed to parse localhost kubeconfig: {}", e)))?;

    if config.clusters.is_empty() {
        return Err(DumpError::Kubeconfig(
            "no clusters found in localhost kubeconfig".to_string(),
        ));
    }

    let server = localhost_server(local_port);
    for named in &mut config.clusters {
        named.cluster.get_or_insert_with(Default::default).server = Some(server.clone());
    }

    serde_yaml::to_string(&config)
        .map_err(|e| DumpError::Kubeconfig(format!("failed to serialize localhost kubeconfig: {}", e)))
}

/// Temporary kubeconfig file, removed when the guest collection ends
#[derive(Debug)]
pub struct TempKubeconfig {
    path: Option<TempPath>,
}

impl TempKubeconfig {
    /// Write `contents` to a new temporary file in `dir`, or the system temp dir.
    /// The handle is synced and closed on return.
    pub fn create(contents: &str, dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("kubeconfig-");
        let created = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        let mut file = created.map_err(|e| DumpError::Kubeconfig(format!("failed to create tempfile for kubeconfig: {}", e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| DumpError::Kubeconfig(format!("failed to write kubeconfig data: {}", e)))?;
        file.flush()?;
        file.as_file().sync_all()?;
        Ok(Self {
            path: Some(file.into_temp_path()),
        })
    }

    pub fn path(&self) -> &Path {
        match &self.path {
            Some(path) => path,
            None => Path::new(""),
        }
    }

    /// Delete the file now, recording a failure instead of returning it
    pub fn remove(mut self, report: &mut DumpReport) {
        if let Some(path) = self.path.take() {
            let display = path.display().to_string();
            if let Err(e) = path.close() {
                report.record(Diagnostic::error(
                    Step::GuestCluster,
                    display,
                    format!("Failed to cleanup temporary kubeconfig: {}", e),
                ));
            }
        }
    }
}

impl Drop for TempKubeconfig {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = path.close() {
                tracing::error!(error = %e, "Failed to cleanup temporary kubeconfig");
            }
        }
    }
}
