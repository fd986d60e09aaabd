use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::api::UpstreamReply;

/// HTTP client for the real master and the real nodes
#[derive(Clone, Default)]
pub struct Upstream {
    client: reqwest::Client,
}

impl Upstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// POST an XML-RPC body to `url` and collect the answer
    pub async fn post(&self, url: &str, body: String) -> Result<UpstreamReply> {
        debug!("Forwarding {} bytes to {}", body.len(), url);

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "text/xml")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {}", url))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read answer from {}", url))?;

        Ok(UpstreamReply {
            status,
            content_type,
            body,
        })
    }
}
