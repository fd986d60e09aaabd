/// Address rewriting rules of the ROS master and slave APIs
///
/// Every rule takes the decoded call by reference and returns a rewritten
/// copy; parameters are positional per method.

use rosproxy_common::defaults::TCPROS;
use rosproxy_common::{MethodCall, MethodResponse, ProxyError, Result, Value, MULTICALL_METHOD};
use tracing::{debug, error, warn};

use super::{Membership, NodeRecord};
use crate::transport::RendezvousPool;

/// ROS API methods the proxy has to look into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMethod {
    RegisterService,
    UnregisterService,
    RegisterSubscriber,
    UnregisterSubscriber,
    RegisterPublisher,
    UnregisterPublisher,
    RequestTopic,
    Multicall,
    /// Anything else passes through untouched
    Other,
}

impl ProtocolMethod {
    pub fn from_name(name: &str) -> Self {
        match name {
            "registerService" => Self::RegisterService,
            "unregisterService" => Self::UnregisterService,
            "registerSubscriber" => Self::RegisterSubscriber,
            "unregisterSubscriber" => Self::UnregisterSubscriber,
            "registerPublisher" => Self::RegisterPublisher,
            "unregisterPublisher" => Self::UnregisterPublisher,
            "requestTopic" => Self::RequestTopic,
            MULTICALL_METHOD => Self::Multicall,
            _ => Self::Other,
        }
    }

    /// Position of the caller's own slave API address among the parameters
    pub fn caller_address_index(self) -> Option<usize> {
        match self {
            Self::RegisterService | Self::RegisterSubscriber | Self::RegisterPublisher => Some(3),
            Self::UnregisterSubscriber | Self::UnregisterPublisher => Some(2),
            _ => None,
        }
    }

    /// Caller address carried by `call`, if this method carries one
    pub fn caller_address(self, call: &MethodCall) -> Option<&str> {
        self.caller_address_index()
            .and_then(|index| call.params.get(index))
            .and_then(Value::as_str)
    }
}

/// Normalize a status code that arrived as a numeric string
///
/// Some client libraries send `["1", "ok", ...]`; callers expect an int.
pub fn coerce_status_code(response: MethodResponse) -> MethodResponse {
    let MethodResponse::Success { mut params } = response else {
        return response;
    };
    if let Some(Value::Array(result)) = params.first_mut() {
        if result.len() == 3 {
            if let Some(code) = result[0].as_str().and_then(|s| s.trim().parse::<i32>().ok()) {
                result[0] = Value::Int(code);
            }
        }
    }
    MethodResponse::Success { params }
}

/// Applies the per-method rewrites on behalf of one node record
pub struct RewriteRules {
    pool: RendezvousPool,
}

impl RewriteRules {
    pub fn new(pool: RendezvousPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &RendezvousPool {
        &self.pool
    }

    /// Rewrite a request sent by or to `record`
    pub async fn rewrite_request(&self, record: &mut NodeRecord, call: &MethodCall) -> Result<MethodCall> {
        let method = ProtocolMethod::from_name(&call.method);
        match method {
            ProtocolMethod::RegisterService => self.register_service(record, call).await,
            ProtocolMethod::UnregisterService => self.unregister_service(record, call).await,
            ProtocolMethod::RegisterSubscriber | ProtocolMethod::UnregisterSubscriber => {
                Ok(membership_call(record, call, method, Membership::Subscriptions))
            }
            ProtocolMethod::RegisterPublisher | ProtocolMethod::UnregisterPublisher => {
                Ok(membership_call(record, call, method, Membership::Publications))
            }
            ProtocolMethod::RequestTopic => request_topic(call),
            ProtocolMethod::Multicall => {
                warn!("Nested {} is not supported, passing through", MULTICALL_METHOD);
                Ok(call.clone())
            }
            ProtocolMethod::Other => Ok(call.clone()),
        }
    }

    /// Rewrite the response to `call`; faults are never touched
    pub async fn rewrite_response(
        &self,
        record: &mut NodeRecord,
        call: &MethodCall,
        response: &MethodResponse,
    ) -> Result<MethodResponse> {
        if response.is_fault() {
            return Ok(response.clone());
        }
        match ProtocolMethod::from_name(&call.method) {
            ProtocolMethod::RequestTopic => self.request_topic_response(record, response).await,
            _ => Ok(response.clone()),
        }
    }

    // registerService(caller_id, service, service_api, caller_api)
    async fn register_service(&self, record: &mut NodeRecord, call: &MethodCall) -> Result<MethodCall> {
        let (Some(service), Some(service_api), Some(caller_api)) =
            (str_param(call, 1), str_param(call, 2), str_param(call, 3))
        else {
            return Ok(passthrough(call));
        };
        record.check_caller_address(caller_api);

        let proxied_api = self.proxy_service_api(record, service_api).await?;
        record.add_name(Membership::Services, service);

        let mut params = call.params.clone();
        params[2] = Value::String(proxied_api);
        params[3] = Value::from(record.proxy_address());
        Ok(MethodCall::new(call.method.clone(), params))
    }

    // unregisterService(caller_id, service, service_api)
    async fn unregister_service(&self, record: &mut NodeRecord, call: &MethodCall) -> Result<MethodCall> {
        let (Some(service), Some(service_api)) = (str_param(call, 1), str_param(call, 2)) else {
            return Ok(passthrough(call));
        };
        record.remove_name(Membership::Services, service);

        let proxied_api = self.proxy_service_api(record, service_api).await?;
        let mut params = call.params.clone();
        params[2] = Value::String(proxied_api);
        Ok(MethodCall::new(call.method.clone(), params))
    }

    /// `rosrpc://host:port` of the node's service, via a rendezvous proxy
    async fn proxy_service_api(&self, record: &mut NodeRecord, service_api: &str) -> Result<String> {
        let url = reqwest::Url::parse(service_api)
            .map_err(|e| ProxyError::invalid_address(format!("{}: {}", service_api, e)))?;
        let (Some(host), Some(port)) = (url.host_str(), url.port()) else {
            return Err(ProxyError::invalid_address(service_api));
        };

        let (proxy_host, listen_port) = self.pool.get_or_create(record, host, port).await?;
        Ok(format!("{}://{}:{}", url.scheme(), proxy_host, listen_port))
    }

    async fn request_topic_response(
        &self,
        record: &mut NodeRecord,
        response: &MethodResponse,
    ) -> Result<MethodResponse> {
        let params = response.params();
        let Some(Value::Array(result)) = params.first() else {
            return Err(ProxyError::malformed_response("requestTopic: missing result"));
        };
        if result.len() != 3 {
            return Err(ProxyError::malformed_response("requestTopic: result is not a triple"));
        }
        let Some(protocol) = result[2].as_array() else {
            return Err(ProxyError::malformed_response("requestTopic: protocol params not an array"));
        };

        // No publisher-side agreement; nothing to proxy
        if protocol.is_empty() {
            return Ok(response.clone());
        }

        let protocol = if protocol[0].as_str() == Some(TCPROS) {
            let (Some(host), Some(port)) = (
                protocol.get(1).and_then(Value::as_str),
                protocol.get(2).and_then(Value::as_port),
            ) else {
                return Err(ProxyError::malformed_response("requestTopic: TCPROS params"));
            };
            let (proxy_host, listen_port) = self.pool.get_or_create(record, host, port).await?;
            debug!("Node {}: TCPROS {}:{} via {}:{}", record.id(), host, port, proxy_host, listen_port);
            vec![Value::from(TCPROS), Value::String(proxy_host), Value::Int(i32::from(listen_port))]
        } else {
            error!(
                "Node {} answered requestTopic with unsupported protocol {:?}",
                record.id(),
                protocol[0]
            );
            Vec::new()
        };

        let mut result = result.clone();
        result[2] = Value::Array(protocol);
        let mut params = params.to_vec();
        params[0] = Value::Array(result);
        Ok(MethodResponse::success(params))
    }
}

fn str_param(call: &MethodCall, index: usize) -> Option<&str> {
    call.params.get(index).and_then(Value::as_str)
}

fn passthrough(call: &MethodCall) -> MethodCall {
    warn!("Unexpected parameters for {}, passing through: {}", call.method, call);
    call.clone()
}

// (un)registerSubscriber / (un)registerPublisher(caller_id, topic, [topic_type,] caller_api)
fn membership_call(
    record: &mut NodeRecord,
    call: &MethodCall,
    method: ProtocolMethod,
    kind: Membership,
) -> MethodCall {
    let (Some(topic), Some(index)) = (str_param(call, 1), method.caller_address_index()) else {
        return passthrough(call);
    };
    let Some(caller_api) = str_param(call, index) else {
        return passthrough(call);
    };
    record.check_caller_address(caller_api);

    match method {
        ProtocolMethod::RegisterSubscriber | ProtocolMethod::RegisterPublisher => {
            record.add_name(kind, topic);
        }
        _ => {
            record.remove_name(kind, topic);
        }
    }

    let mut params = call.params.clone();
    params[index] = Value::from(record.proxy_address());
    MethodCall::new(call.method.clone(), params)
}

// requestTopic(caller_id, topic, protocols)
fn request_topic(call: &MethodCall) -> Result<MethodCall> {
    let Some(protocols) = call.params.get(2).and_then(Value::as_array) else {
        return Ok(passthrough(call));
    };

    let is_tcpros = |p: &&Value| {
        p.as_array()
            .and_then(|p| p.first())
            .and_then(Value::as_str)
            == Some(TCPROS)
    };
    let supported: Vec<Value> = protocols.iter().filter(is_tcpros).cloned().collect();
    if supported.is_empty() {
        let offered = protocols
            .iter()
            .filter_map(|p| p.as_array()?.first()?.as_str().map(str::to_string))
            .collect();
        return Err(ProxyError::UnsupportedTransport { offered });
    }

    let mut params = call.params.clone();
    params[2] = Value::Array(supported);
    Ok(MethodCall::new(call.method.clone(), params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeId;
    use crate::transport::PortAllocator;
    use rosproxy_common::{ros_result, Fault};

    const PROXY_ADDRESS: &str = "http://proxyhost:11311/node/talker";

    fn rules() -> RewriteRules {
        RewriteRules::new(RendezvousPool::new(PortAllocator::new("127.0.0.1", None), "proxyhost"))
    }

    fn record() -> NodeRecord {
        NodeRecord::new(NodeId::sanitize("/talker"), "http://host-a:40001/", PROXY_ADDRESS)
    }

    fn call(method: &str, params: Vec<Value>) -> MethodCall {
        MethodCall::new(method, params)
    }

    #[test]
    fn test_caller_address_index_table() {
        assert_eq!(ProtocolMethod::from_name("registerService").caller_address_index(), Some(3));
        assert_eq!(ProtocolMethod::from_name("registerPublisher").caller_address_index(), Some(3));
        assert_eq!(ProtocolMethod::from_name("unregisterSubscriber").caller_address_index(), Some(2));
        assert_eq!(ProtocolMethod::from_name("unregisterService").caller_address_index(), None);
        assert_eq!(ProtocolMethod::from_name("getPid"), ProtocolMethod::Other);
        assert_eq!(ProtocolMethod::from_name(MULTICALL_METHOD), ProtocolMethod::Multicall);
    }

    #[tokio::test]
    async fn test_register_publisher_rewrites_caller_api() {
        let rules = rules();
        let mut record = record();
        let original = call(
            "registerPublisher",
            vec!["/talker".into(), "/chatter".into(), "std_msgs/String".into(), "http://host-a:40001/".into()],
        );

        let rewritten = rules.rewrite_request(&mut record, &original).await.unwrap();

        assert_eq!(rewritten.params[3], Value::from(PROXY_ADDRESS));
        assert_eq!(rewritten.params[1], original.params[1]);
        assert_eq!(original.params[3], Value::from("http://host-a:40001/"));
        assert!(record.names(Membership::Publications).contains("/chatter"));

        let unregister = call(
            "unregisterPublisher",
            vec!["/talker".into(), "/chatter".into(), "http://host-a:40001/".into()],
        );
        let rewritten = rules.rewrite_request(&mut record, &unregister).await.unwrap();
        assert_eq!(rewritten.params[2], Value::from(PROXY_ADDRESS));
        assert!(record.is_stale());
    }

    #[tokio::test]
    async fn test_register_service_goes_through_rendezvous() {
        let rules = rules();
        let mut record = record();
        let original = call(
            "registerService",
            vec![
                "/talker".into(),
                "/add_two_ints".into(),
                "rosrpc://host-a:40500".into(),
                "http://host-a:40001/".into(),
            ],
        );

        let rewritten = rules.rewrite_request(&mut record, &original).await.unwrap();
        let proxy = record.rendezvous_proxies().next().unwrap().clone();

        assert_eq!(
            rewritten.params[2],
            Value::String(format!("rosrpc://proxyhost:{}", proxy.listen_port()))
        );
        assert_eq!(rewritten.params[3], Value::from(PROXY_ADDRESS));
        assert_eq!(proxy.target().host, "host-a");
        assert_eq!(proxy.target().port, 40500);
        assert!(record.names(Membership::Services).contains("/add_two_ints"));

        let unregister = call(
            "unregisterService",
            vec!["/talker".into(), "/add_two_ints".into(), "rosrpc://host-a:40500".into()],
        );
        let rewritten = rules.rewrite_request(&mut record, &unregister).await.unwrap();
        assert_eq!(rewritten.params[2], Value::String(format!("rosrpc://proxyhost:{}", proxy.listen_port())));
        assert_eq!(rules.pool().created_count(), 1);
        assert!(record.is_stale());
    }

    #[tokio::test]
    async fn test_request_topic_keeps_only_tcpros() {
        let rules = rules();
        let mut record = record();
        let original = call(
            "requestTopic",
            vec![
                "/listener".into(),
                "/chatter".into(),
                Value::Array(vec![
                    Value::Array(vec!["UDPROS".into(), Value::Int(1500)]),
                    Value::Array(vec!["TCPROS".into()]),
                ]),
            ],
        );

        let rewritten = rules.rewrite_request(&mut record, &original).await.unwrap();
        assert_eq!(rewritten.params[2], Value::Array(vec![Value::Array(vec!["TCPROS".into()])]));
    }

    #[tokio::test]
    async fn test_request_topic_without_tcpros_is_rejected() {
        let rules = rules();
        let mut record = record();
        let original = call(
            "requestTopic",
            vec![
                "/listener".into(),
                "t".into(),
                Value::Array(vec![Value::Array(vec!["UNKNOWN".into(), Value::Struct(Default::default())])]),
            ],
        );

        let err = rules.rewrite_request(&mut record, &original).await.unwrap_err();
        match err {
            ProxyError::UnsupportedTransport { offered } => assert_eq!(offered, vec!["UNKNOWN".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_request_topic_response_points_at_proxy() {
        let rules = rules();
        let mut record = record();
        let request = call("requestTopic", vec!["/listener".into(), "/chatter".into(), Value::Array(vec![])]);
        let response = MethodResponse::success(vec![ros_result(
            1,
            "ready",
            Value::Array(vec!["TCPROS".into(), "host-a".into(), Value::Int(40200)]),
        )]);

        let rewritten = rules.rewrite_response(&mut record, &request, &response).await.unwrap();
        let proxy = record.rendezvous_proxies().next().unwrap();

        assert_eq!(
            rewritten,
            MethodResponse::success(vec![ros_result(
                1,
                "ready",
                Value::Array(vec!["TCPROS".into(), "proxyhost".into(), Value::Int(i32::from(proxy.listen_port()))]),
            )])
        );
        assert_eq!(proxy.target().port, 40200);
    }

    #[tokio::test]
    async fn test_request_topic_response_with_foreign_protocol_is_emptied() {
        let rules = rules();
        let mut record = record();
        let request = call("requestTopic", vec!["/listener".into(), "/chatter".into(), Value::Array(vec![])]);
        let response = MethodResponse::success(vec![ros_result(
            1,
            "ready",
            Value::Array(vec!["UDPROS".into(), "host-a".into(), Value::Int(40200)]),
        )]);

        let rewritten = rules.rewrite_response(&mut record, &request, &response).await.unwrap();
        assert_eq!(rewritten, MethodResponse::success(vec![ros_result(1, "ready", Value::Array(vec![]))]));
        assert_eq!(rules.pool().created_count(), 0);
    }

    #[tokio::test]
    async fn test_request_topic_response_malformed() {
        let rules = rules();
        let mut record = record();
        let request = call("requestTopic", vec!["/listener".into(), "/chatter".into(), Value::Array(vec![])]);
        let response = MethodResponse::success(vec![Value::Array(vec![Value::Int(1)])]);

        let err = rules.rewrite_response(&mut record, &request, &response).await.unwrap_err();
        assert!(matches!(err, ProxyError::MalformedResponse { .. }));
    }

    #[tokio::test]
    async fn test_fault_passes_through() {
        let rules = rules();
        let mut record = record();
        let request = call("requestTopic", vec!["/listener".into(), "/chatter".into(), Value::Array(vec![])]);
        let response = MethodResponse::Fault(Fault::new(-1, "no such topic"));

        let rewritten = rules.rewrite_response(&mut record, &request, &response).await.unwrap();
        assert_eq!(rewritten, response);
    }

    #[test]
    fn test_status_code_coercion() {
        let response = MethodResponse::success(vec![Value::Array(vec!["1".into(), "ok".into(), Value::Nil])]);
        assert_eq!(
            coerce_status_code(response),
            MethodResponse::success(vec![ros_result(1, "ok", Value::Nil)])
        );

        let untouched = MethodResponse::success(vec![Value::Array(vec!["one".into(), "ok".into(), Value::Nil])]);
        assert_eq!(coerce_status_code(untouched.clone()), untouched);
    }
}
