use rosproxy_common::{MethodCall, MethodResponse, ProxyConfig, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::housekeeping::{HousekeepingReport, Housekeeper};
use crate::node::{NodeApiRoute, RewriteRules};
use crate::probe::{LivenessProbe, XmlRpcProbe};
use crate::registry::{NodeRegistry, RegistryStats};
use crate::transport::{PortAllocator, RendezvousPool};

/// Entry point for the HTTP front end: rewriting, routing and housekeeping
pub struct ProxyEngine {
    registry: Arc<NodeRegistry>,
    housekeeper: Housekeeper,
}

impl ProxyEngine {
    /// Build an engine probing nodes over XML-RPC
    pub fn new(config: &ProxyConfig) -> Self {
        let probe = XmlRpcProbe::new(config.probe_timeout(), config.probe_attempts);
        Self::with_probe(config, Arc::new(probe))
    }

    pub fn with_probe(config: &ProxyConfig, probe: Arc<dyn LivenessProbe>) -> Self {
        let allocator = PortAllocator::new(config.listen_addr.clone(), config.port_range);
        let pool = RendezvousPool::new(allocator, config.hostname.clone());
        let route = NodeApiRoute::new(config.hostname.clone(), config.port, config.node_api_path.clone());

        let registry = Arc::new(NodeRegistry::new(route, RewriteRules::new(pool)));
        let housekeeper = Housekeeper::new(registry.clone(), probe);
        Self { registry, housekeeper }
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub async fn rewrite_master_request(&self, call: &MethodCall) -> Result<MethodCall> {
        self.registry.rewrite_master_request(call).await
    }

    pub async fn rewrite_master_response(&self, call: &MethodCall, response: &MethodResponse) -> Result<MethodResponse> {
        self.registry.rewrite_master_response(call, response).await
    }

    pub async fn rewrite_node_request(&self, path: &str, call: &MethodCall) -> Result<MethodCall> {
        self.registry.rewrite_node_request(path, call).await
    }

    pub async fn rewrite_node_response(
        &self,
        path: &str,
        call: &MethodCall,
        response: &MethodResponse,
    ) -> Result<MethodResponse> {
        self.registry.rewrite_node_response(path, call, response).await
    }

    /// Real slave API address for a node route path
    pub async fn resolve_routing_target(&self, path: &str) -> Option<String> {
        self.registry.resolve_routing_target(path).await
    }

    pub fn start_housekeeping(&self, period: Duration) {
        self.housekeeper.start(period);
    }

    pub async fn stop_housekeeping(&self) {
        self.housekeeper.stop().await;
    }

    pub async fn housekeeping_pass(&self) -> HousekeepingReport {
        self.housekeeper.run_pass().await
    }

    pub async fn stats(&self) -> RegistryStats {
        self.registry.stats().await
    }

    /// Stop housekeeping and drop every node
    pub async fn reset(&self) {
        self.housekeeper.stop().await;
        let dropped = self.registry.reset().await;
        info!("Reset: dropped {} nodes", dropped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosproxy_common::Value;

    #[tokio::test]
    async fn test_engine_wires_route_from_config() {
        let config = ProxyConfig::new()
            .with_master_uri("http://master:11311/")
            .with_hostname("proxyhost")
            .with_port(11411);
        let engine = ProxyEngine::new(&config);

        let call = MethodCall::new(
            "registerSubscriber",
            vec!["/listener".into(), "/chatter".into(), "std_msgs/String".into(), "http://host-b:40002/".into()],
        );
        let rewritten = engine.rewrite_master_request(&call).await.unwrap();

        assert_eq!(rewritten.params[3], Value::from("http://proxyhost:11411/node/listener"));
        assert_eq!(
            engine.resolve_routing_target("/node/listener").await.as_deref(),
            Some("http://host-b:40002/")
        );

        engine.start_housekeeping(Duration::from_secs(60));
        engine.reset().await;
        assert_eq!(engine.stats().await.nodes, 0);
        assert!(engine.resolve_routing_target("/node/listener").await.is_none());
    }
}
