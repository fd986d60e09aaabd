/// Liveness probing of node slave APIs
///
/// A probe answers a yes/no question and never fails: unreachable,
/// timed-out and faulting nodes all count as not alive.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use rosproxy_common::{decode_response, encode_call, MethodCall};
use std::time::Duration;
use tracing::debug;

/// Caller id the proxy identifies itself with in probes
pub const PROBE_CALLER_ID: &str = "/rosproxy";

#[async_trait]
pub trait LivenessProbe: Send + Sync {
    /// Whether the slave API at `address` answers
    async fn probe(&self, address: &str) -> bool;
}

/// Probes with the slave API `getPid` call
pub struct XmlRpcProbe {
    client: reqwest::Client,
    timeout: Duration,
    attempts: u32,
}

impl XmlRpcProbe {
    pub fn new(timeout: Duration, attempts: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            attempts: attempts.max(1),
        }
    }

    /// One `getPid` round trip; `Ok(false)` on a fault response
    async fn get_pid(&self, address: &str) -> Result<bool> {
        let body = encode_call(&MethodCall::new("getPid", vec![PROBE_CALLER_ID.into()]));
        let text = self
            .client
            .post(address)
            .header(CONTENT_TYPE, "text/xml")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await
            .context("getPid request failed")?
            .error_for_status()?
            .text()
            .await?;

        let response = decode_response(&text).context("getPid answer is not XML-RPC")?;
        Ok(!response.is_fault())
    }
}

#[async_trait]
impl LivenessProbe for XmlRpcProbe {
    async fn probe(&self, address: &str) -> bool {
        for attempt in 1..=self.attempts {
            match self.get_pid(address).await {
                Ok(alive) => return alive,
                Err(e) => debug!("Probe {}/{} of {} failed: {:#}", attempt, self.attempts, address, e),
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::post;
    use axum::Router;
    use rosproxy_common::{encode_response, ros_result, Fault, MethodResponse, Value};
    use tokio::net::TcpListener;

    async fn serve(answer: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}/", listener.local_addr().unwrap());
        let app = Router::new().route("/", post(move || async move { answer }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        address
    }

    fn probe() -> XmlRpcProbe {
        XmlRpcProbe::new(Duration::from_millis(300), 2)
    }

    #[tokio::test]
    async fn test_alive_node() {
        let pid = encode_response(&MethodResponse::success(vec![ros_result(1, "", Value::Int(4242))]));
        let address = serve(pid).await;
        assert!(probe().probe(&address).await);
    }

    #[tokio::test]
    async fn test_fault_means_dead() {
        let fault = encode_response(&MethodResponse::Fault(Fault::new(-1, "shutting down")));
        let address = serve(fault).await;
        assert!(!probe().probe(&address).await);
    }

    #[tokio::test]
    async fn test_garbage_means_dead() {
        let address = serve("<html>not a node</html>".to_string()).await;
        assert!(!probe().probe(&address).await);
    }

    #[tokio::test]
    async fn test_unreachable_means_dead() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);
        assert!(!probe().probe(&address).await);
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        // Accepts connections but never answers
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let started = std::time::Instant::now();
        assert!(!probe().probe(&address).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
