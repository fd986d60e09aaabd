/// Registry of known nodes
///
/// Records live behind their own mutex inside a briefly-locked map, so work on
/// one node (rendezvous binds, rewrites) never blocks another. Dropping a
/// record marks it under its lock before removing it from the map; anyone who
/// locks a record afterwards sees the mark and treats the node as gone.

use futures::future::join_all;
use rosproxy_common::{MethodCall, MethodResponse, ProxyError, Result, Value, MULTICALL_METHOD};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, info, warn};

use crate::node::{coerce_status_code, NodeApiRoute, NodeId, NodeRecord, ProtocolMethod, RewriteRules};

/// Shared handle to one node's record
pub type NodeEntry = Arc<Mutex<NodeRecord>>;

/// Registry statistics
#[derive(Debug, Clone, Default)]
pub struct RegistryStats {
    pub nodes: usize,
    pub rendezvous_proxies: usize,
    pub proxies_created: usize,
}

/// Known nodes and the rules to rewrite their traffic
pub struct NodeRegistry {
    nodes: RwLock<HashMap<NodeId, NodeEntry>>,
    route: NodeApiRoute,
    rules: RewriteRules,
}

impl NodeRegistry {
    pub fn new(route: NodeApiRoute, rules: RewriteRules) -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            route,
            rules,
        }
    }

    pub fn route(&self) -> &NodeApiRoute {
        &self.route
    }

    pub async fn get(&self, id: &NodeId) -> Option<NodeEntry> {
        self.nodes.read().await.get(id).cloned()
    }

    /// Snapshot of all entries
    pub async fn entries(&self) -> Vec<(NodeId, NodeEntry)> {
        self.nodes
            .read()
            .await
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.nodes.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.read().await.is_empty()
    }

    pub async fn stats(&self) -> RegistryStats {
        let mut stats = RegistryStats {
            proxies_created: self.rules.pool().created_count(),
            ..Default::default()
        };
        for (_, entry) in self.entries().await {
            let record = entry.lock().await;
            if !record.is_dropped() {
                stats.nodes += 1;
                stats.rendezvous_proxies += record.rendezvous_proxies().count();
            }
        }
        stats
    }

    /// Record of the node that sent `call`, created on first sighting
    ///
    /// Creation needs the caller's slave API address from the call; without
    /// one an unknown node stays unknown.
    pub async fn resolve_by_sender_identity(&self, call: &MethodCall) -> Option<OwnedMutexGuard<NodeRecord>> {
        let id = NodeId::parse(call.caller_id()?)?;

        loop {
            let entry = match self.get(&id).await {
                Some(entry) => entry,
                None => {
                    let method = ProtocolMethod::from_name(&call.method);
                    let Some(real_address) = method.caller_address(call) else {
                        debug!("Cannot instantiate unknown node {} from {}", id, call.method);
                        return None;
                    };
                    let mut nodes = self.nodes.write().await;
                    nodes
                        .entry(id.clone())
                        .or_insert_with(|| {
                            let proxy_address = self.route.proxy_address(&id);
                            info!("New node {}: {} -> {}", id, real_address, proxy_address);
                            Arc::new(Mutex::new(NodeRecord::new(id.clone(), real_address, proxy_address)))
                        })
                        .clone()
                }
            };

            let record = entry.lock_owned().await;
            if !record.is_dropped() {
                return Some(record);
            }
            // Dropped between lookup and lock; the map no longer holds it
        }
    }

    /// Record of an already known node
    pub async fn resolve_existing(&self, id: &NodeId) -> Option<OwnedMutexGuard<NodeRecord>> {
        let entry = self.get(id).await?;
        let record = entry.lock_owned().await;
        (!record.is_dropped()).then_some(record)
    }

    /// Record addressed by a node route path
    pub async fn resolve_by_proxy_path(&self, path: &str) -> Option<OwnedMutexGuard<NodeRecord>> {
        let id = self.route.node_id(path)?;
        self.resolve_existing(&id).await
    }

    /// Real slave API address behind a node route path
    pub async fn resolve_routing_target(&self, path: &str) -> Option<String> {
        let record = self.resolve_by_proxy_path(path).await?;
        Some(record.real_address().to_string())
    }

    /// Rewrite a call a node sends to the master
    pub async fn rewrite_master_request(&self, call: &MethodCall) -> Result<MethodCall> {
        if call.is_multicall() {
            return self
                .rewrite_multicall_request(call, |sub| async move { self.master_request(&sub).await })
                .await;
        }
        self.master_request(call).await
    }

    async fn master_request(&self, call: &MethodCall) -> Result<MethodCall> {
        let Some(mut record) = self.resolve_by_sender_identity(call).await else {
            return Ok(call.clone());
        };
        let rewritten = self.rules.rewrite_request(&mut record, call).await?;
        debug!("Master request {} -> {}", call, rewritten);
        Ok(rewritten)
    }

    /// Rewrite the master's response to a (rewritten) node call
    pub async fn rewrite_master_response(&self, call: &MethodCall, response: &MethodResponse) -> Result<MethodResponse> {
        if call.is_multicall() {
            return self
                .rewrite_multicall_response(call, response, |sub, sub_response| async move {
                    self.master_response(&sub, &sub_response).await
                })
                .await;
        }
        self.master_response(call, response).await
    }

    async fn master_response(&self, call: &MethodCall, response: &MethodResponse) -> Result<MethodResponse> {
        if response.is_fault() {
            return Ok(response.clone());
        }
        let Some(mut record) = self.resolve_sender(call).await else {
            return Ok(coerce_status_code(response.clone()));
        };
        let rewritten = self.rules.rewrite_response(&mut record, call, response).await?;
        Ok(coerce_status_code(rewritten))
    }

    async fn resolve_sender(&self, call: &MethodCall) -> Option<OwnedMutexGuard<NodeRecord>> {
        let id = NodeId::parse(call.caller_id()?)?;
        self.resolve_existing(&id).await
    }

    /// Rewrite a call to the node behind `path`
    pub async fn rewrite_node_request(&self, path: &str, call: &MethodCall) -> Result<MethodCall> {
        if call.is_multicall() {
            return self
                .rewrite_multicall_request(call, |sub| async move { self.node_request(path, &sub).await })
                .await;
        }
        self.node_request(path, call).await
    }

    async fn node_request(&self, path: &str, call: &MethodCall) -> Result<MethodCall> {
        let mut record = self.resolve_by_proxy_path(path).await.ok_or_else(|| ProxyError::Unresolvable {
            path: path.to_string(),
        })?;
        let rewritten = self.rules.rewrite_request(&mut record, call).await?;
        debug!("Node request {} -> {}", call, rewritten);
        Ok(rewritten)
    }

    /// Rewrite the response of the node behind `path`
    pub async fn rewrite_node_response(
        &self,
        path: &str,
        call: &MethodCall,
        response: &MethodResponse,
    ) -> Result<MethodResponse> {
        if call.is_multicall() {
            return self
                .rewrite_multicall_response(call, response, |sub, sub_response| async move {
                    self.node_response(path, &sub, &sub_response).await
                })
                .await;
        }
        self.node_response(path, call, response).await
    }

    async fn node_response(&self, path: &str, call: &MethodCall, response: &MethodResponse) -> Result<MethodResponse> {
        if response.is_fault() {
            return Ok(response.clone());
        }
        // Every slave API call answers [code, statusMessage, value]
        match response.params().first().and_then(Value::as_array) {
            Some(result) if result.len() == 3 => {}
            _ => {
                return Err(ProxyError::malformed_response(format!(
                    "{} answered {}",
                    call.method,
                    serde_json::to_string(response.params()).unwrap_or_default()
                )))
            }
        }

        let mut record = self.resolve_by_proxy_path(path).await.ok_or_else(|| ProxyError::Unresolvable {
            path: path.to_string(),
        })?;
        let rewritten = self.rules.rewrite_response(&mut record, call, response).await?;
        debug!("Node response {:?} -> {:?}", response, rewritten);
        Ok(coerce_status_code(rewritten))
    }

    /// Rewrite every sub-call of a multicall, keeping array order
    ///
    /// Entries that are not well-formed sub-calls are kept as they are. Any
    /// sub-call that fails to rewrite fails the whole batch.
    async fn rewrite_multicall_request<F, Fut>(&self, call: &MethodCall, rewrite: F) -> Result<MethodCall>
    where
        F: Fn(MethodCall) -> Fut,
        Fut: Future<Output = Result<MethodCall>>,
    {
        let Some(entries) = call.params.first().and_then(Value::as_array) else {
            warn!("{} without a call array, passing through", MULTICALL_METHOD);
            return Ok(call.clone());
        };

        let rewritten = join_all(entries.iter().map(|entry| {
            let rewrite = &rewrite;
            async move {
                match MethodCall::from_multicall_entry(entry) {
                    Some(sub) => rewrite(sub).await.map(|sub| sub.to_multicall_entry()),
                    None => Ok(entry.clone()),
                }
            }
        }))
        .await;

        let mut params = call.params.clone();
        params[0] = Value::Array(rewritten.into_iter().collect::<Result<Vec<_>>>()?);
        Ok(MethodCall::new(call.method.clone(), params))
    }

    /// Pair sub-calls with sub-results by position and rewrite each pair
    ///
    /// Sub-results without a matching sub-call are dropped. A sub-result that
    /// cannot be rewritten is replaced by a fault entry.
    async fn rewrite_multicall_response<F, Fut>(
        &self,
        call: &MethodCall,
        response: &MethodResponse,
        rewrite: F,
    ) -> Result<MethodResponse>
    where
        F: Fn(MethodCall, MethodResponse) -> Fut,
        Fut: Future<Output = Result<MethodResponse>>,
    {
        if response.is_fault() {
            return Ok(response.clone());
        }
        if response.params().first().and_then(Value::as_array).is_none() {
            warn!("{} answered without a result array, passing through", MULTICALL_METHOD);
            return Ok(response.clone());
        }

        let calls = call.multicall_entries();
        let results = response.multicall_entries();
        if calls.len() != results.len() {
            warn!(
                "{} with {} calls answered with {} results",
                MULTICALL_METHOD,
                calls.len(),
                results.len()
            );
        }

        let rewritten = join_all(calls.into_iter().zip(results).map(|(sub, result)| {
            let rewrite = &rewrite;
            async move {
                let rewritten = match sub {
                    Some(sub) => rewrite(sub, result)
                        .await
                        .unwrap_or_else(|e| MethodResponse::Fault(e.to_fault())),
                    None => result,
                };
                rewritten.to_multicall_entry()
            }
        }))
        .await;

        let mut params = response.params().to_vec();
        params[0] = Value::Array(rewritten);
        Ok(MethodResponse::success(params))
    }

    /// Tear down `record` and forget it
    ///
    /// The caller holds the record's lock; the map entry is only removed if it
    /// still refers to `entry`.
    pub async fn evict(&self, entry: &NodeEntry, record: &mut NodeRecord) -> usize {
        let closed = record.teardown();
        let mut nodes = self.nodes.write().await;
        if nodes.get(record.id()).is_some_and(|current| Arc::ptr_eq(current, entry)) {
            nodes.remove(record.id());
        }
        closed
    }

    /// Drop one node; false if it was not known
    pub async fn drop_node(&self, id: &NodeId) -> bool {
        let Some(entry) = self.get(id).await else {
            return false;
        };
        let mut record = entry.lock().await;
        if record.is_dropped() {
            return false;
        }
        let closed = self.evict(&entry, &mut record).await;
        info!("Dropped node {} ({} proxies closed)", id, closed);
        true
    }

    /// Drop every node; returns how many were dropped
    pub async fn reset(&self) -> usize {
        let mut dropped = 0;
        for (id, _) in self.entries().await {
            if self.drop_node(&id).await {
                dropped += 1;
            }
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Membership;
    use crate::transport::{PortAllocator, RendezvousPool};
    use rosproxy_common::{ros_result, Fault};

    const TALKER_API: &str = "http://host-a:40001/";

    fn registry() -> NodeRegistry {
        let pool = RendezvousPool::new(PortAllocator::new("127.0.0.1", None), "proxyhost");
        NodeRegistry::new(NodeApiRoute::new("proxyhost", 11311, "/node"), RewriteRules::new(pool))
    }

    fn register_publisher(caller: &str, topic: &str) -> MethodCall {
        MethodCall::new(
            "registerPublisher",
            vec![caller.into(), topic.into(), "std_msgs/String".into(), TALKER_API.into()],
        )
    }

    fn request_topic_response() -> MethodResponse {
        MethodResponse::success(vec![ros_result(
            1,
            "ready",
            Value::Array(vec!["TCPROS".into(), "host-a".into(), Value::Int(40200)]),
        )])
    }

    fn request_topic() -> MethodCall {
        MethodCall::new(
            "requestTopic",
            vec![
                "/listener".into(),
                "/chatter".into(),
                Value::Array(vec![Value::Array(vec!["TCPROS".into()])]),
            ],
        )
    }

    #[tokio::test]
    async fn test_sanitized_ids_share_a_record() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker/", "/a")).await.unwrap();
        registry.rewrite_master_request(&register_publisher("talker", "/b")).await.unwrap();

        assert_eq!(registry.len().await, 1);
        let record = registry.resolve_existing(&NodeId::sanitize("/talker")).await.unwrap();
        assert_eq!(record.names(Membership::Publications).len(), 2);
        assert_eq!(record.proxy_address(), "http://proxyhost:11311/node/talker");
    }

    #[tokio::test]
    async fn test_first_sighting_requires_an_address() {
        let registry = registry();
        let call = MethodCall::new("unregisterSubscriber", vec!["bar".into(), "caller".into()]);

        let rewritten = registry.rewrite_master_request(&call).await.unwrap();

        assert_eq!(rewritten, call);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_method_creates_nothing() {
        let registry = registry();
        let call = MethodCall::new("getSystemState", vec!["/rostopic".into()]);

        assert_eq!(registry.rewrite_master_request(&call).await.unwrap(), call);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_rendezvous_reused_across_requests() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();

        let path = "/node/talker";
        let call = request_topic();
        let first = registry.rewrite_node_response(path, &call, &request_topic_response()).await.unwrap();
        let second = registry.rewrite_node_response(path, &call, &request_topic_response()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.stats().await.rendezvous_proxies, 1);
        assert_eq!(registry.stats().await.proxies_created, 1);
    }

    #[tokio::test]
    async fn test_multicall_preserves_order() {
        let registry = registry();
        let call = MethodCall::new(
            MULTICALL_METHOD,
            vec![Value::Array(vec![
                register_publisher("/talker", "t1").to_multicall_entry(),
                register_publisher("/talker", "t2").to_multicall_entry(),
            ])],
        );

        let rewritten = registry.rewrite_master_request(&call).await.unwrap();
        let entries = rewritten.multicall_entries();
        assert_eq!(entries.len(), 2);
        let first = entries[0].as_ref().unwrap();
        let second = entries[1].as_ref().unwrap();
        assert_eq!(first.params[1], Value::from("t1"));
        assert_eq!(second.params[1], Value::from("t2"));
        assert_eq!(first.params[3], Value::from("http://proxyhost:11311/node/talker"));

        let response = MethodResponse::success(vec![Value::Array(vec![
            Value::Array(vec![Value::Array(vec!["1".into(), "t1 registered".into(), Value::Array(vec![])])]),
            Value::Array(vec![Value::Array(vec!["1".into(), "t2 registered".into(), Value::Array(vec![])])]),
        ])]);
        let rewritten = registry.rewrite_master_response(&rewritten, &response).await.unwrap();
        let results = rewritten.multicall_entries();
        assert_eq!(results[0].params()[0], ros_result(1, "t1 registered", Value::Array(vec![])));
        assert_eq!(results[1].params()[0], ros_result(1, "t2 registered", Value::Array(vec![])));
    }

    #[tokio::test]
    async fn test_multicall_short_response_is_truncated() {
        let registry = registry();
        let call = MethodCall::new(
            MULTICALL_METHOD,
            vec![Value::Array(vec![
                register_publisher("/talker", "t1").to_multicall_entry(),
                register_publisher("/talker", "t2").to_multicall_entry(),
            ])],
        );
        let response = MethodResponse::success(vec![Value::Array(vec![Value::Array(vec![ros_result(
            1,
            "t1 registered",
            Value::Array(vec![]),
        )])])]);

        let rewritten = registry.rewrite_master_response(&call, &response).await.unwrap();
        assert_eq!(rewritten.multicall_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_numeric_coercion() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();

        let response = MethodResponse::success(vec![Value::Array(vec![
            "1".into(),
            "ready".into(),
            Value::Array(vec!["TCPROS".into(), "host-a".into(), "40200".into()]),
        ])]);
        let rewritten = registry
            .rewrite_node_response("/node/talker", &request_topic(), &response)
            .await
            .unwrap();

        let result = rewritten.params()[0].as_array().unwrap();
        assert_eq!(result[0], Value::Int(1));
        assert_eq!(result[2].as_array().unwrap()[1], Value::from("proxyhost"));
    }

    #[tokio::test]
    async fn test_unsupported_transport_rejected() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();

        let call = MethodCall::new(
            "requestTopic",
            vec![
                "/listener".into(),
                "t".into(),
                Value::Array(vec![Value::Array(vec!["UNKNOWN".into(), Value::Struct(Default::default())])]),
            ],
        );
        let err = registry.rewrite_node_request("/node/talker", &call).await.unwrap_err();
        assert_eq!(err.to_fault().code, -32500);
        assert!(matches!(err, ProxyError::UnsupportedTransport { .. }));
    }

    #[tokio::test]
    async fn test_fault_passes_through() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();

        let fault = MethodResponse::Fault(Fault::new(-1, "boom"));
        let rewritten = registry
            .rewrite_node_response("/node/talker", &request_topic(), &fault)
            .await
            .unwrap();
        assert_eq!(rewritten, fault);

        let rewritten = registry
            .rewrite_master_response(&register_publisher("/talker", "/chatter"), &fault)
            .await
            .unwrap();
        assert_eq!(rewritten, fault);
    }

    #[tokio::test]
    async fn test_malformed_node_response() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();

        let response = MethodResponse::success(vec![Value::Int(1)]);
        let err = registry
            .rewrite_node_response("/node/talker", &request_topic(), &response)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_routing_target_and_drop() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();
        registry
            .rewrite_node_response("/node/talker", &request_topic(), &request_topic_response())
            .await
            .unwrap();

        assert_eq!(
            registry.resolve_routing_target("/node/talker").await.as_deref(),
            Some(TALKER_API)
        );

        let proxy = {
            let record = registry.resolve_existing(&NodeId::sanitize("talker")).await.unwrap();
            let proxy = record.rendezvous_proxies().next().unwrap().clone();
            proxy
        };

        assert!(registry.drop_node(&NodeId::sanitize("talker")).await);
        assert!(!registry.drop_node(&NodeId::sanitize("talker")).await);
        assert!(proxy.is_closed());
        assert_eq!(registry.resolve_routing_target("/node/talker").await, None);

        let err = registry.rewrite_node_request("/node/talker", &request_topic()).await.unwrap_err();
        assert!(matches!(err, ProxyError::Unresolvable { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_first_sightings_create_one_record() {
        let registry = Arc::new(registry());
        let calls = (0..8).map(|i| {
            let registry = registry.clone();
            tokio::spawn(async move {
                registry
                    .rewrite_master_request(&register_publisher("/talker", &format!("/t{}", i)))
                    .await
                    .unwrap()
            })
        });
        for result in join_all(calls).await {
            result.unwrap();
        }

        assert_eq!(registry.len().await, 1);
        let record = registry.resolve_existing(&NodeId::sanitize("talker")).await.unwrap();
        assert_eq!(record.names(Membership::Publications).len(), 8);
    }

    #[tokio::test]
    async fn test_reset_drops_everything() {
        let registry = registry();
        registry.rewrite_master_request(&register_publisher("/a", "/chatter")).await.unwrap();
        registry.rewrite_master_request(&register_publisher("/b", "/chatter")).await.unwrap();

        assert_eq!(registry.reset().await, 2);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_drop_during_rewrite_yields_fresh_record() {
        let registry = Arc::new(registry());
        registry.rewrite_master_request(&register_publisher("/talker", "/old")).await.unwrap();
        registry
            .rewrite_node_response("/node/talker", &request_topic(), &request_topic_response())
            .await
            .unwrap();

        // Hold the record as an in-flight rewrite would
        let held = registry.resolve_existing(&NodeId::sanitize("talker")).await.unwrap();
        let old_proxy = held.rendezvous_proxies().next().unwrap().clone();

        let dropping = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.drop_node(&NodeId::sanitize("talker")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let rewriting = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.rewrite_master_request(&register_publisher("/talker", "/new")).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!dropping.is_finished());
        assert!(!rewriting.is_finished());

        drop(held);
        assert!(dropping.await.unwrap());
        let rewritten = rewriting.await.unwrap().unwrap();
        assert_eq!(rewritten.params[3], Value::from("http://proxyhost:11311/node/talker"));

        assert!(old_proxy.is_closed());
        let record = registry.resolve_existing(&NodeId::sanitize("talker")).await.unwrap();
        assert!(!record.is_dropped());
        assert_eq!(record.rendezvous_proxies().count(), 0);
        let names: Vec<String> = record.names(Membership::Publications).iter().cloned().collect();
        assert_eq!(names, vec!["/new".to_string()]);
    }

    #[tokio::test]
    async fn test_port_exhaustion_fails_only_that_request() {
        let port = {
            let spare = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            spare.local_addr().unwrap().port()
        };
        let range = rosproxy_common::PortRange::new(port, port).unwrap();
        let pool = RendezvousPool::new(PortAllocator::new("127.0.0.1", Some(range)), "proxyhost");
        let registry = NodeRegistry::new(NodeApiRoute::new("proxyhost", 11311, "/node"), RewriteRules::new(pool));

        registry.rewrite_master_request(&register_publisher("/talker", "/chatter")).await.unwrap();
        registry.rewrite_master_request(&register_publisher("/other", "/chatter")).await.unwrap();

        let first = registry
            .rewrite_node_response("/node/talker", &request_topic(), &request_topic_response())
            .await
            .unwrap();
        let proxy = {
            let record = registry.resolve_existing(&NodeId::sanitize("talker")).await.unwrap();
            let proxy = record.rendezvous_proxies().next().unwrap().clone();
            proxy
        };
        assert_eq!(proxy.listen_port(), port);

        let err = registry
            .rewrite_node_response("/node/other", &request_topic(), &request_topic_response())
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyError::PortRangeExhausted { .. }));
        assert_eq!(err.to_fault().code, -32500);

        // The earlier node and its proxy are untouched
        assert!(!proxy.is_closed());
        assert_eq!(registry.len().await, 2);
        let again = registry
            .rewrite_node_response("/node/talker", &request_topic(), &request_topic_response())
            .await
            .unwrap();
        assert_eq!(again, first);
        let other = registry.resolve_existing(&NodeId::sanitize("other")).await.unwrap();
        assert_eq!(other.rendezvous_proxies().count(), 0);
    }
}
