//! Container log collection

use super::types::{Diagnostic, DumpReport, Step};
use crate::client::{cancellable, ClusterAccess};
use crate::error::DumpError;
use k8s_openapi::api::core::v1::Pod;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Callback run over the raw bytes of every fetched log before it is written
pub type LogChecker = Arc<dyn Fn(&Path, &[u8]) + Send + Sync>;

/// Directory holding the logs of pods in `namespace`
pub fn logs_dir(artifact_dir: &Path, namespace: &str) -> PathBuf {
    artifact_dir
        .join("namespaces")
        .join(namespace)
        .join("core")
        .join("pods")
        .join("logs")
}

/// File name for a container log
pub fn log_file_name(pod: &str, container: &str, previous: bool) -> String {
    if previous {
        format!("{}-{}-previous.log", pod, container)
    } else {
        format!("{}-{}.log", pod, container)
    }
}

/// Init containers first, then regular containers
pub fn container_names(pod: &Pod) -> Vec<String> {
    let Some(spec) = &pod.spec else {
        return Vec::new();
    };
    spec.init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
        .map(|c| c.name.clone())
        .collect()
}

/// Streams current and previous container logs to the artifact directory
pub struct LogCollector<'a> {
    access: &'a dyn ClusterAccess,
    artifact_dir: &'a Path,
    checkers: &'a [LogChecker],
    cancel: &'a CancellationToken,
}

impl<'a> LogCollector<'a> {
    pub fn new(
        access: &'a dyn ClusterAccess,
        artifact_dir: &'a Path,
        checkers: &'a [LogChecker],
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            access,
            artifact_dir,
            checkers,
            cancel,
        }
    }

    pub async fn collect(&self, pods: &[Pod], report: &mut DumpReport) {
        for pod in pods {
            let name = pod.metadata.name.as_deref().unwrap_or("unknown");
            let namespace = pod.metadata.namespace.as_deref().unwrap_or("default");

            let dir = logs_dir(self.artifact_dir, namespace);
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                report.record(Diagnostic::error(
                    Step::PodLogs,
                    dir.display().to_string(),
                    format!("Cannot create directory: {}", e),
                ));
                continue;
            }

            for container in container_names(pod) {
                for previous in [false, true] {
                    let file = dir.join(log_file_name(name, &container, previous));
                    self.collect_one(namespace, name, &container, previous, &file, report)
                        .await;
                }
            }
        }
    }

    async fn collect_one(
        &self,
        namespace: &str,
        pod: &str,
        container: &str,
        previous: bool,
        file: &Path,
        report: &mut DumpReport,
    ) {
        let fetched = cancellable(
            self.cancel,
            self.access.pod_logs(namespace, pod, container, previous),
        )
        .await;

        let bytes = match fetched {
            Ok(bytes) => bytes,
            Err(e) => {
                report.record(fetch_failure(namespace, pod, container, previous, &e));
                return;
            }
        };

        for checker in self.checkers {
            checker(file, &bytes);
        }

        if let Err(e) = tokio::fs::write(file, &bytes).await {
            report.record(Diagnostic::error(
                Step::PodLogs,
                file.display().to_string(),
                format!("Failed to write file: {}", e),
            ));
            return;
        }
        debug!(file = %file.display(), bytes = bytes.len(), "Wrote container log");
    }
}

/// A missing previous instance is expected and stays informational
fn fetch_failure(
    namespace: &str,
    pod: &str,
    container: &str,
    previous: bool,
    error: &DumpError,
) -> Diagnostic {
    let subject = format!("{}/{}/{}", namespace, pod, container);
    if previous {
        Diagnostic::info(
            Step::PodLogs,
            subject,
            format!("No previous pod log: {}", error),
        )
    } else {
        Diagnostic::error(
            Step::PodLogs,
            subject,
            format!("Failed to get pod log: {}", error),
        )
    }
}

/// A signature found in a collected log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHit {
    pub file: PathBuf,
    pub signature: String,
}

/// Checker scanning logs for known error signatures
#[derive(Debug, Clone, Default)]
pub struct SignatureScanner {
    signatures: Arc<Vec<String>>,
    hits: Arc<Mutex<Vec<SignatureHit>>>,
}

impl SignatureScanner {
    pub fn new(signatures: Vec<String>) -> Self {
        Self {
            signatures: Arc::new(signatures.into_iter().filter(|s| !s.is_empty()).collect()),
            hits: Arc::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn scan(&self, file: &Path, content: &[u8]) {
        let text = String::from_utf8_lossy(content);
        for signature in self.signatures.iter() {
            if text.contains(signature.as_str()) {
                warn!(file = %file.display(), signature = %signature, "Log matches signature");
                if let Ok(mut hits) = self.hits.lock() {
                    hits.push(SignatureHit {
                        file: file.to_path_buf(),
                        signature: signature.clone(),
                    });
                }
            }
        }
    }

    /// Checker handle sharing this scanner's hit list
    pub fn checker(&self) -> LogChecker {
        let scanner = self.clone();
        Arc::new(move |file: &Path, content: &[u8]| scanner.scan(file, content))
    }

    pub fn hits(&self) -> Vec<SignatureHit> {
        self.hits.lock().map(|h| h.clone()).unwrap_or_default()
    }
}
