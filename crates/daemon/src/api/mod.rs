/// XML-RPC front end of the proxy
///
/// Exposes, on a single port:
/// - The master API, forwarded to the real ROS master
/// - One slave API per known node, forwarded to the node itself
/// - A failure route answering calls that cannot be routed

pub mod handlers;
pub mod responses;
pub mod server;

pub use server::ApiServer;
pub use responses::*;
