/// XML-RPC front end: master route, node routes and the failure route

use super::handlers::*;
use crate::proxy::Upstream;
use anyhow::Result;
use axum::{
    routing::{any, post},
    Router,
};
use rosproxy_common::ProxyConfig;
use rosproxy_core::ProxyEngine;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// HTTP server impersonating the ROS master and every node's slave API
pub struct ApiServer {
    config: ProxyConfig,
    state: AppState,
}

impl ApiServer {
    /// `config` must be validated; its master URI is required
    pub fn new(config: ProxyConfig, engine: Arc<ProxyEngine>) -> Result<Self> {
        let master_uri: Arc<str> = Arc::from(config.master_uri()?);
        let state = AppState {
            engine,
            upstream: Upstream::new(),
            master_uri,
        };
        Ok(Self { config, state })
    }

    /// Build the router
    pub fn router(&self) -> Router {
        let node_route = format!("{}/*node", self.config.node_api_path);

        let app = Router::new()
            .route(&node_route, post(node_api))
            .route(&self.config.failure_path, any(failure_route));

        let master_path = self.config.master_api_path.as_str();
        let app = if master_path == "/" {
            app.fallback(master_api)
        } else {
            app.route(master_path, post(master_api))
                .route(&format!("{}/*rest", master_path), post(master_api))
        };

        app.layer(TraceLayer::new_for_http()).with_state(self.state.clone())
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve(self, listener: TcpListener, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        info!(
            "Serving master API at {}, node API at {}/<node>, failures at {}",
            self.config.master_api_path, self.config.node_api_path, self.config.failure_path
        );
        info!("Proxying ROS master at {}", self.state.master_uri);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| anyhow::anyhow!("API server error: {}", e))?;

        Ok(())
    }
}
