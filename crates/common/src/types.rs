use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::config::defaults::APPLICATION_ERROR;

/// Method name of the XML-RPC batching convention
pub const MULTICALL_METHOD: &str = "system.multicall";

/// A single XML-RPC value
///
/// Serializes untagged so envelopes render as plain JSON in debug logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i32),
    Boolean(bool),
    String(String),
    Double(f64),
    DateTime(String),
    Base64(String),
    Array(Vec<Value>),
    Struct(BTreeMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Port numbers arrive as `int` from well-behaved peers and as strings
    /// from some client libraries.
    pub fn as_port(&self) -> Option<u16> {
        match self {
            Self::Int(i) => u16::try_from(*i).ok(),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::Array(value)
    }
}

/// Decoded XML-RPC request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }

    /// The caller's self-declared name; every ROS API call carries it first
    pub fn caller_id(&self) -> Option<&str> {
        self.params.first().and_then(Value::as_str)
    }

    pub fn is_multicall(&self) -> bool {
        self.method == MULTICALL_METHOD
    }

    /// Sub-calls of a `system.multicall` request
    ///
    /// Entries that are not `{methodName, params}` structs are returned as `None`
    /// so positions stay aligned with the original array.
    pub fn multicall_entries(&self) -> Vec<Option<MethodCall>> {
        self.params
            .first()
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(MethodCall::from_multicall_entry).collect())
            .unwrap_or_default()
    }

    pub fn from_multicall_entry(value: &Value) -> Option<MethodCall> {
        let members = value.as_struct()?;
        let method = members.get("methodName")?.as_str()?;
        let params = match members.get("params") {
            Some(Value::Array(params)) => params.clone(),
            Some(_) => return None,
            None => Vec::new(),
        };
        Some(MethodCall::new(method, params))
    }

    pub fn to_multicall_entry(&self) -> Value {
        let mut members = BTreeMap::new();
        members.insert("methodName".to_string(), Value::from(self.method.as_str()));
        members.insert("params".to_string(), Value::Array(self.params.clone()));
        Value::Struct(members)
    }
}

impl fmt::Display for MethodCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.params) {
            Ok(params) => write!(f, "{}{}", self.method, params),
            Err(_) => write!(f, "{}(..)", self.method),
        }
    }
}

/// XML-RPC fault
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    pub code: i32,
    pub message: String,
}

impl Fault {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `-32500` application error
    pub fn application(message: impl Into<String>) -> Self {
        Self::new(APPLICATION_ERROR, message)
    }

    pub fn to_value(&self) -> Value {
        let mut members = BTreeMap::new();
        members.insert("faultCode".to_string(), Value::Int(self.code));
        members.insert("faultString".to_string(), Value::from(self.message.as_str()));
        Value::Struct(members)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let members = value.as_struct()?;
        let code = members.get("faultCode")?.as_i32()?;
        let message = members
            .get("faultString")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self::new(code, message))
    }
}

/// Decoded XML-RPC response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MethodResponse {
    Success { params: Vec<Value> },
    Fault(Fault),
}

impl MethodResponse {
    pub fn success(params: Vec<Value>) -> Self {
        Self::Success { params }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }

    pub fn params(&self) -> &[Value] {
        match self {
            Self::Success { params } => params,
            Self::Fault(_) => &[],
        }
    }

    /// Sub-results of a `system.multicall` response, one per sub-call
    pub fn multicall_entries(&self) -> Vec<MethodResponse> {
        self.params()
            .first()
            .and_then(Value::as_array)
            .map(|entries| entries.iter().map(MethodResponse::from_multicall_entry).collect())
            .unwrap_or_default()
    }

    /// A multicall sub-result is either a one-element array or a fault struct
    pub fn from_multicall_entry(value: &Value) -> MethodResponse {
        if let Some(fault) = Fault::from_value(value) {
            return Self::Fault(fault);
        }
        match value {
            Value::Array(items) => Self::success(items.clone()),
            other => Self::success(vec![other.clone()]),
        }
    }

    pub fn to_multicall_entry(&self) -> Value {
        match self {
            Self::Success { params } => Value::Array(params.clone()),
            Self::Fault(fault) => fault.to_value(),
        }
    }
}

/// `[code, statusMessage, value]`, the return shape of every ROS API call
pub fn ros_result(code: i32, status: &str, value: Value) -> Value {
    Value::Array(vec![Value::Int(code), Value::from(status), value])
}
