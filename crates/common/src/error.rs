use thiserror::Error;

use crate::types::Fault;

/// Errors raised while decoding or encoding XML-RPC documents
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("XML error: {0}")]
    Xml(String),

    #[error("Malformed XML-RPC document: {0}")]
    Malformed(String),

    #[error("Invalid {kind} value: {text:?}")]
    InvalidValue { kind: &'static str, text: String },

    #[error("Unsupported value type <{0}>")]
    UnsupportedType(String),
}

impl From<quick_xml::Error> for CodecError {
    fn from(err: quick_xml::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

impl CodecError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}

/// Error types of the rewriting proxy
///
/// The display strings of the first variants are sent to callers verbatim as
/// fault messages.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Can proxy TCPROS connections only!")]
    UnsupportedTransport { offered: Vec<String> },

    #[error("Node sent response with unexpected parameters!")]
    MalformedResponse { detail: String },

    #[error("Could not resolve endpoint to proxy to!")]
    Unresolvable { path: String },

    #[error("Port range {min}-{max} exhausted")]
    PortRangeExhausted { min: u16, max: u16 },

    #[error("Failed to bind rendezvous proxy: {0}")]
    Bind(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;

impl ProxyError {
    pub fn malformed_response(detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            detail: detail.into(),
        }
    }

    pub fn invalid_address(msg: impl Into<String>) -> Self {
        Self::InvalidAddress(msg.into())
    }

    /// Application fault (`-32500`) reported to the caller instead of the error
    pub fn to_fault(&self) -> Fault {
        Fault::application(self.to_string())
    }
}
