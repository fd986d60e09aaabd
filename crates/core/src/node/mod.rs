/// ROS nodes as seen by the proxy
///
/// A node is known by its sanitized caller id. The proxy hands every node a
/// stable address of its own (`http://<hostname>:<port><node path>/<id>`)
/// and uses the trailing path segment to route slave API calls back.

mod record;
mod rules;

pub use record::{Membership, NodeRecord};
pub use rules::{coerce_status_code, ProtocolMethod, RewriteRules};

use serde::Serialize;
use std::fmt;

/// Sanitized ROS caller id: the node name without leading or trailing `/`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(String);

impl NodeId {
    /// Strip separators; `"/foo/"`, `"/foo"` and `"foo"` all give `foo`
    pub fn sanitize(raw: &str) -> Self {
        Self(raw.trim_matches('/').to_string())
    }

    /// Like `sanitize`, but rejects names that are empty once stripped
    pub fn parse(raw: &str) -> Option<Self> {
        let id = Self::sanitize(raw);
        (!id.0.is_empty()).then_some(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where node slave APIs are exposed on the proxy
#[derive(Debug, Clone)]
pub struct NodeApiRoute {
    hostname: String,
    port: u16,
    base_path: String,
}

impl NodeApiRoute {
    /// `base_path` is expected in normalized form (`/node`)
    pub fn new(hostname: impl Into<String>, port: u16, base_path: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            base_path: base_path.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// Proxy-owned slave API address handed out in place of the node's own
    pub fn proxy_address(&self, id: &NodeId) -> String {
        format!("http://{}:{}{}/{}", self.hostname, self.port, self.base_path, id)
    }

    /// Node id addressed by a request path below the node route
    ///
    /// Node names may contain namespaces, so everything after the base path
    /// is the id.
    pub fn node_id(&self, path: &str) -> Option<NodeId> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        NodeId::parse(rest)
    }
}
