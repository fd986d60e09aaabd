/// Response types of the XML-RPC front end

use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rosproxy_common::{encode_response, Fault, MethodResponse, ProxyError};
use serde::{Deserialize, Serialize};

const TEXT_XML: &str = "text/xml";

/// Encoded XML-RPC response
#[derive(Debug)]
pub struct XmlRpcReply(pub MethodResponse);

impl XmlRpcReply {
    pub fn fault(fault: Fault) -> Self {
        Self(MethodResponse::Fault(fault))
    }

    /// Fault reported in place of an engine error
    pub fn from_error(err: &ProxyError) -> Self {
        Self::fault(err.to_fault())
    }

    /// Fault for calls that cannot be routed to any node
    pub fn unresolvable(path: &str) -> Self {
        Self::from_error(&ProxyError::Unresolvable {
            path: path.to_string(),
        })
    }
}

impl IntoResponse for XmlRpcReply {
    fn into_response(self) -> Response {
        ([(CONTENT_TYPE, TEXT_XML)], encode_response(&self.0)).into_response()
    }
}

/// Upstream answer handed back without decoding
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl IntoResponse for UpstreamReply {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let content_type = self.content_type.unwrap_or_else(|| TEXT_XML.to_string());
        (status, [(CONTENT_TYPE, content_type)], self.body).into_response()
    }
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub code: u16,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
        }
    }
}
