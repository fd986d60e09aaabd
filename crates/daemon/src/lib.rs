/// ROS discovery proxy daemon library
///
/// This crate provides the HTTP front end and lifecycle of the proxy that
/// sits between ROS nodes and their master.

pub mod api;
pub mod proxy;

pub use api::ApiServer;
pub use proxy::{RosProxy, Upstream};
