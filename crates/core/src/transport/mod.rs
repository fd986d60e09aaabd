/// Raw TCP plumbing for TCPROS rendezvous
///
/// - Port allocation, optionally restricted to a configured range
/// - Byte-forwarding proxies, one listening port per target
/// - A pool that deduplicates proxies per node and target

mod allocator;
mod rendezvous;

pub use allocator::PortAllocator;
pub use rendezvous::{RendezvousPool, RendezvousProxy, RendezvousTarget};
