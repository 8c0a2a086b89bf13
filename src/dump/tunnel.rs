//! Local end of the guest cluster tunnel

use crate::error::{DumpError, Result};
use rand::Rng;
use std::future::Future;
use std::ops::Range;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, warn};

/// Bind a listener on a random loopback port from `range`.
///
/// The listener is held from here until the tunnel is open, so the port
/// written into the guest kubeconfig cannot be taken in between. A port that
/// is already in use is skipped and another one drawn, up to `attempts` times.
pub async fn reserve_local_port(range: Range<u16>, attempts: u32) -> Result<TcpListener> {
    if range.is_empty() {
        return Err(DumpError::Tunnel(format!("empty port range {:?}", range)));
    }

    let mut last_error = None;
    for _ in 0..attempts.max(1) {
        let port = rand::thread_rng().gen_range(range.clone());
        match TcpListener::bind(("127.0.0.1", port)).await {
            Ok(listener) => {
                debug!(port, "Reserved local tunnel port");
                return Ok(listener);
            }
            Err(e) => {
                debug!(port, error = %e, "Local tunnel port unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(DumpError::Tunnel(format!(
        "no free local port in {}..{} after {} attempts: {}",
        range.start,
        range.end,
        attempts.max(1),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

/// Accept connections on `listener` and relay each one to a stream from `connect`.
///
/// `connect` yields the upstream stream plus a guard kept alive for the
/// lifetime of the connection, or `None` when no upstream could be opened.
/// Connections are owned by this future: dropping or aborting it closes all
/// of them.
pub async fn relay_connections<F, Fut, S, G>(listener: TcpListener, mut connect: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<(S, G)>>,
    S: AsyncRead + AsyncWrite + Send + 'static,
    G: Send + 'static,
{
    let mut connections = JoinSet::new();
    loop {
        let (mut client_stream, peer) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Tunnel listener failed");
                    break;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => continue,
        };
        debug!(%peer, "Accepted tunnel connection");

        let Some((upstream, guard)) = connect().await else {
            continue;
        };

        connections.spawn(async move {
            let (mut client_read, mut client_write) = client_stream.split();
            let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

            tokio::select! {
                _ = tokio::io::copy(&mut client_read, &mut upstream_write) => {}
                _ = tokio::io::copy(&mut upstream_read, &mut client_write) => {}
            }
            drop(guard);
        });
    }
}

/// An open port forward from a local port to a pod port.
///
/// Closing (or dropping) the session stops accepting connections and tears
/// down the relay task.
#[derive(Debug)]
pub struct TunnelSession {
    local_port: u16,
    namespace: String,
    pod: String,
    remote_port: u16,
    task: Option<JoinHandle<()>>,
}

impl TunnelSession {
    pub fn new(
        local_port: u16,
        namespace: impl Into<String>,
        pod: impl Into<String>,
        remote_port: u16,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            local_port,
            namespace: namespace.into(),
            pod: pod.into(),
            remote_port,
            task: Some(task),
        }
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// `namespace/pod` the tunnel points at
    pub fn target(&self) -> String {
        format!("{}/{}", self.namespace, self.pod)
    }

    pub fn is_open(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(
                local_port = self.local_port,
                target = %self.target(),
                remote_port = self.remote_port,
                "Closed tunnel"
            );
        }
    }
}

impl Drop for TunnelSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
