//! Remote cluster health probing
//!
//! The controller never talks to a remote API server directly; it asks a
//! [`HealthProbe`]. Production uses [`HealthzProbe`], tests swap in a mock.

use std::time::Duration;

use async_trait::async_trait;
use kube::Client;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use toolchain_common::Error;

/// Path of the API server liveness endpoint
pub const HEALTHZ_PATH: &str = "/healthz";

/// Default upper bound for a single health check
pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Strategy for deciding whether a remote cluster is healthy
///
/// - `Ok(true)`: reachable and healthy
/// - `Ok(false)`: reachable but reports itself unhealthy
/// - `Err(_)`: not reachable (transport failure, timeout, non-2xx reply)
#[cfg_attr(test, automock)]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Check the health of `cluster` over its registered client
    async fn check(&self, cluster: &str, client: &Client) -> Result<bool, Error>;
}

/// Probe that issues `GET /healthz` against the remote API server
#[derive(Clone, Debug)]
pub struct HealthzProbe {
    timeout: Duration,
}

impl HealthzProbe {
    /// Create a probe that gives up after `timeout`
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The per-check timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for HealthzProbe {
    fn default() -> Self {
        Self::new(DEFAULT_HEALTH_TIMEOUT)
    }
}

#[async_trait]
impl HealthProbe for HealthzProbe {
    async fn check(&self, cluster: &str, client: &Client) -> Result<bool, Error> {
        let request = http::Request::get(HEALTHZ_PATH)
            .body(Vec::new())
            .map_err(|e| Error::internal_with_context("health_check", e.to_string()))?;

        let body = match tokio::time::timeout(self.timeout, client.request_text(request)).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                return Err(Error::connection_for(
                    cluster,
                    format!("failed doing cluster health check: {}", e),
                ))
            }
            Err(_) => {
                return Err(Error::connection_for(
                    cluster,
                    format!(
                        "failed doing cluster health check: timed out after {:?}",
                        self.timeout
                    ),
                ))
            }
        };

        let healthy = is_healthz_ok(&body);
        debug!(cluster, healthy, "healthz answered");
        Ok(healthy)
    }
}

/// Whether a `/healthz` body reports a healthy API server
pub fn is_healthz_ok(body: &str) -> bool {
    body.trim().eq_ignore_ascii_case("ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::client_for;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection: read the request, then reply with `response` if given
    ///
    /// Without a response the connection is held open until the test ends.
    async fn serve_once(response: Option<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener should bind");
        let addr = listener.local_addr().expect("listener has an address");

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut buf = vec![0u8; 4096];
            let _ = socket.read(&mut buf).await;
            match response {
                Some(response) => {
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                }
                None => tokio::time::sleep(Duration::from_secs(30)).await,
            }
        });

        format!("http://{}", addr)
    }

    #[test]
    fn healthz_body_must_be_ok() {
        assert!(is_healthz_ok("ok"));
        assert!(is_healthz_ok("OK\n"));
        assert!(!is_healthz_ok("unstable"));
        assert!(!is_healthz_ok(""));
        assert!(!is_healthz_ok("[-]etcd failed: reason withheld\nhealthz check failed"));
    }

    #[test]
    fn default_timeout_is_ten_seconds() {
        assert_eq!(HealthzProbe::default().timeout(), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn unreachable_cluster_reports_an_error() {
        // nothing listens on port 1
        let client = client_for("http://127.0.0.1:1");
        let probe = HealthzProbe::new(Duration::from_secs(5));

        let err = probe.check("unreachable", &client).await.unwrap_err();

        assert!(
            err.to_string().starts_with("failed doing cluster health check"),
            "unexpected error: {}",
            err
        );
        assert_eq!(err.cluster(), Some("unreachable"));
    }

    #[tokio::test]
    async fn ok_body_is_healthy() {
        let url = serve_once(Some(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 2\r\nconnection: close\r\n\r\nok",
        ))
        .await;
        let probe = HealthzProbe::new(Duration::from_secs(5));

        assert!(probe.check("stable", &client_for(&url)).await.unwrap());
    }

    #[tokio::test]
    async fn other_body_is_reachable_but_unhealthy() {
        let url = serve_once(Some(
            "HTTP/1.1 200 OK\r\ncontent-type: text/plain\r\ncontent-length: 8\r\nconnection: close\r\n\r\nunstable",
        ))
        .await;
        let probe = HealthzProbe::new(Duration::from_secs(5));

        let healthy = probe.check("unstable", &client_for(&url)).await.unwrap();

        assert!(!healthy);
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let url = serve_once(None).await;
        let probe = HealthzProbe::new(Duration::from_millis(100));

        let err = probe.check("silent", &client_for(&url)).await.unwrap_err();

        assert!(
            err.to_string().ends_with("timed out after 100ms"),
            "unexpected error: {}",
            err
        );
        assert_eq!(err.cluster(), Some("silent"));
    }
}
