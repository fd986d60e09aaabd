pub mod engine;
pub mod housekeeping;
pub mod node;
pub mod probe;
pub mod registry;
pub mod transport;

pub use engine::ProxyEngine;

// Re-export node types
pub use node::{coerce_status_code, Membership, NodeApiRoute, NodeId, NodeRecord, ProtocolMethod, RewriteRules};

// Re-export transport types
pub use transport::{PortAllocator, RendezvousPool, RendezvousProxy, RendezvousTarget};

// Re-export supervision types
pub use housekeeping::{Housekeeper, HousekeepingReport, NodeHealth};
pub use probe::{LivenessProbe, XmlRpcProbe, PROBE_CALLER_ID};
pub use registry::{NodeEntry, NodeRegistry, RegistryStats};
