use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use super::NodeId;
use crate::transport::{RendezvousProxy, RendezvousTarget};

/// Which of a node's name sets a register/unregister call touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Subscriptions,
    Publications,
    Services,
}

/// Everything the proxy knows about one node
#[derive(Debug)]
pub struct NodeRecord {
    /// Sanitized caller id
    id: NodeId,

    /// The node's own slave API address, fixed at first registration
    real_address: String,

    /// Address handed out in its place
    proxy_address: String,

    /// Rendezvous proxies, one per TCPROS endpoint of this node
    rendezvous: HashMap<RendezvousTarget, RendezvousProxy>,

    /// Topics the node subscribes to
    subscriptions: BTreeSet<String>,

    /// Topics the node publishes
    publications: BTreeSet<String>,

    /// Services the node provides
    services: BTreeSet<String>,

    /// Set once the record has been torn down
    dropped: bool,
}

impl NodeRecord {
    pub fn new(id: NodeId, real_address: impl Into<String>, proxy_address: impl Into<String>) -> Self {
        Self {
            id,
            real_address: real_address.into(),
            proxy_address: proxy_address.into(),
            rendezvous: HashMap::new(),
            subscriptions: BTreeSet::new(),
            publications: BTreeSet::new(),
            services: BTreeSet::new(),
            dropped: false,
        }
    }

    pub fn id(&self) -> &NodeId {
        &self.id
    }

    pub fn real_address(&self) -> &str {
        &self.real_address
    }

    pub fn proxy_address(&self) -> &str {
        &self.proxy_address
    }

    /// Compare a caller address claimed in a request against the recorded one
    ///
    /// A mismatch is reported but not rejected.
    pub fn check_caller_address(&self, claimed: &str) -> bool {
        if claimed == self.real_address {
            return true;
        }
        warn!(
            "Node {} claims caller address {} but registered with {}",
            self.id, claimed, self.real_address
        );
        false
    }

    pub fn names(&self, kind: Membership) -> &BTreeSet<String> {
        match kind {
            Membership::Subscriptions => &self.subscriptions,
            Membership::Publications => &self.publications,
            Membership::Services => &self.services,
        }
    }

    fn names_mut(&mut self, kind: Membership) -> &mut BTreeSet<String> {
        match kind {
            Membership::Subscriptions => &mut self.subscriptions,
            Membership::Publications => &mut self.publications,
            Membership::Services => &mut self.services,
        }
    }

    pub fn add_name(&mut self, kind: Membership, name: &str) -> bool {
        self.names_mut(kind).insert(name.to_string())
    }

    pub fn remove_name(&mut self, kind: Membership, name: &str) -> bool {
        self.names_mut(kind).remove(name)
    }

    /// Nothing references a node that neither publishes, subscribes nor serves
    pub fn is_stale(&self) -> bool {
        self.subscriptions.is_empty() && self.publications.is_empty() && self.services.is_empty()
    }

    pub fn rendezvous(&self, target: &RendezvousTarget) -> Option<&RendezvousProxy> {
        self.rendezvous.get(target)
    }

    pub fn insert_rendezvous(&mut self, target: RendezvousTarget, proxy: RendezvousProxy) {
        if let Some(previous) = self.rendezvous.insert(target, proxy) {
            previous.close();
        }
    }

    pub fn rendezvous_proxies(&self) -> impl Iterator<Item = &RendezvousProxy> {
        self.rendezvous.values()
    }

    /// Close every owned proxy and mark the record as dropped
    ///
    /// Returns the number of proxies closed.
    pub fn teardown(&mut self) -> usize {
        let closed = self.rendezvous.len();
        for (target, proxy) in self.rendezvous.drain() {
            debug!("Node {}: closing proxy {} ~> {}", self.id, proxy.listen_port(), target);
            proxy.close();
        }
        self.dropped = true;
        closed
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped
    }
}
