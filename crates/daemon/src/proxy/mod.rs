/// Proxy lifecycle
///
/// Ties the rewriting engine, housekeeping and the XML-RPC front end
/// together and tears everything down on shutdown.

mod upstream;

pub use upstream::Upstream;

use crate::api::ApiServer;
use anyhow::{Context, Result};
use rosproxy_common::ProxyConfig;
use rosproxy_core::ProxyEngine;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// A configured, not yet running proxy
pub struct RosProxy {
    config: ProxyConfig,
    engine: Arc<ProxyEngine>,
}

impl RosProxy {
    /// Validate `config` and build the engine; a missing master URI is fatal
    pub fn new(config: ProxyConfig) -> Result<Self> {
        let config = config.validate().context("Invalid proxy configuration")?;
        info!("ROS proxy options: {}", serde_json::to_string(&config)?);

        if let Some(range) = config.port_range {
            info!("Limiting usable port range {}", range);
        }

        let engine = Arc::new(ProxyEngine::new(&config));
        Ok(Self { config, engine })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn engine(&self) -> &Arc<ProxyEngine> {
        &self.engine
    }

    /// Bind the configured address and serve until `shutdown` resolves
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let addr = (self.config.listen_addr.as_str(), self.config.port);
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}:{}", addr.0, addr.1))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        info!("ROS proxy listening for XML-RPC calls on {}", listener.local_addr()?);

        if self.config.housekeeping {
            self.engine.start_housekeeping(self.config.housekeeping_period());
        }

        let server = ApiServer::new(self.config.clone(), self.engine.clone())?;
        let result = server.serve(listener, shutdown).await;

        info!("ROS proxy shutting down");
        self.engine.reset().await;
        result
    }
}
