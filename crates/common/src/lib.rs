/// Shared building blocks of the ROS discovery proxy: the XML-RPC value model
/// and codec, configuration, and error types.

pub mod codec;
pub mod config;
pub mod error;
pub mod types;

pub use codec::{decode_call, decode_response, encode_call, encode_response};
pub use config::{defaults, normalize_base_path, ConfigError, PortRange, ProxyConfig};
pub use error::{CodecError, ProxyError, Result};
pub use types::{ros_result, Fault, MethodCall, MethodResponse, Value, MULTICALL_METHOD};
