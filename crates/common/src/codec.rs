/// XML-RPC wire codec
///
/// Documents are first read into a small element tree and then interpreted,
/// which keeps the value grammar (nested arrays and structs) out of the
/// event loop.

use quick_xml::events::Event;
use quick_xml::escape::escape;
use quick_xml::Reader;
use std::collections::BTreeMap;

use crate::error::CodecError;
use crate::types::{Fault, MethodCall, MethodResponse, Value};

type Result<T> = std::result::Result<T, CodecError>;

/// Deepest element nesting accepted in a document
const MAX_DEPTH: usize = 128;

#[derive(Debug, Default)]
struct Element {
    name: String,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn require(&self, name: &str) -> Result<&Element> {
        self.child(name)
            .ok_or_else(|| CodecError::malformed(format!("<{}> without <{}>", self.name, name)))
    }
}

fn parse_tree(xml: &str) -> Result<Element> {
    let mut reader = Reader::from_str(xml);
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(CodecError::malformed(format!("nesting deeper than {} elements", MAX_DEPTH)));
                }
                stack.push(Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                })
            }
            Event::Empty(e) => {
                let element = Element {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| CodecError::malformed("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::CData(c) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&c));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(CodecError::malformed("unexpected end of document"));
    }
    root.ok_or_else(|| CodecError::malformed("empty document"))
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(CodecError::malformed("multiple root elements")),
    }
    Ok(())
}

fn decode_value(element: &Element) -> Result<Value> {
    // <value>text</value> without a type element is a string
    let Some(typed) = element.children.first() else {
        return Ok(Value::String(element.text.clone()));
    };

    let text = typed.text.as_str();
    match typed.name.as_str() {
        "i4" | "int" => text
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| CodecError::InvalidValue { kind: "int", text: text.to_string() }),
        "boolean" => match text.trim() {
            "1" | "true" => Ok(Value::Boolean(true)),
            "0" | "false" => Ok(Value::Boolean(false)),
            _ => Err(CodecError::InvalidValue { kind: "boolean", text: text.to_string() }),
        },
        "string" => Ok(Value::String(text.to_string())),
        "double" => text
            .trim()
            .parse()
            .map(Value::Double)
            .map_err(|_| CodecError::InvalidValue { kind: "double", text: text.to_string() }),
        "dateTime.iso8601" => Ok(Value::DateTime(text.trim().to_string())),
        "base64" => Ok(Value::Base64(text.trim().to_string())),
        "nil" => Ok(Value::Nil),
        "array" => {
            let data = typed.require("data")?;
            data.children
                .iter()
                .filter(|c| c.name == "value")
                .map(decode_value)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = BTreeMap::new();
            for member in typed.children.iter().filter(|c| c.name == "member") {
                let name = member.require("name")?.text.clone();
                let value = decode_value(member.require("value")?)?;
                members.insert(name, value);
            }
            Ok(Value::Struct(members))
        }
        other => Err(CodecError::UnsupportedType(other.to_string())),
    }
}

fn decode_params(params: Option<&Element>) -> Result<Vec<Value>> {
    let Some(params) = params else {
        return Ok(Vec::new());
    };
    params
        .children
        .iter()
        .filter(|c| c.name == "param")
        .map(|param| decode_value(param.require("value")?))
        .collect()
}

/// Decode a `<methodCall>` document
pub fn decode_call(xml: &str) -> Result<MethodCall> {
    let root = parse_tree(xml)?;
    if root.name != "methodCall" {
        return Err(CodecError::malformed(format!("expected <methodCall>, got <{}>", root.name)));
    }
    let method = root.require("methodName")?.text.trim().to_string();
    let params = decode_params(root.child("params"))?;
    Ok(MethodCall::new(method, params))
}

/// Decode a `<methodResponse>` document
pub fn decode_response(xml: &str) -> Result<MethodResponse> {
    let root = parse_tree(xml)?;
    if root.name != "methodResponse" {
        return Err(CodecError::malformed(format!(
            "expected <methodResponse>, got <{}>",
            root.name
        )));
    }
    if let Some(fault) = root.child("fault") {
        let value = decode_value(fault.require("value")?)?;
        return Fault::from_value(&value)
            .map(MethodResponse::Fault)
            .ok_or_else(|| CodecError::malformed("fault without faultCode"));
    }
    Ok(MethodResponse::success(decode_params(root.child("params"))?))
}

fn encode_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        Value::Boolean(b) => out.push_str(if *b { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" }),
        Value::String(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</string>");
        }
        Value::Double(d) => out.push_str(&format!("<double>{}</double>", d)),
        Value::DateTime(s) => {
            out.push_str("<dateTime.iso8601>");
            out.push_str(&escape(s.as_str()));
            out.push_str("</dateTime.iso8601>");
        }
        Value::Base64(s) => {
            out.push_str("<base64>");
            out.push_str(s);
            out.push_str("</base64>");
        }
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                encode_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                encode_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
        Value::Nil => out.push_str("<nil/>"),
    }
    out.push_str("</value>");
}

fn encode_params(params: &[Value], out: &mut String) {
    out.push_str("<params>");
    for param in params {
        out.push_str("<param>");
        encode_value(param, out);
        out.push_str("</param>");
    }
    out.push_str("</params>");
}

/// Encode a `<methodCall>` document
pub fn encode_call(call: &MethodCall) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodCall><methodName>");
    out.push_str(&escape(call.method.as_str()));
    out.push_str("</methodName>");
    encode_params(&call.params, &mut out);
    out.push_str("</methodCall>\n");
    out
}

/// Encode a `<methodResponse>` document
pub fn encode_response(response: &MethodResponse) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<methodResponse>");
    match response {
        MethodResponse::Success { params } => encode_params(params, &mut out),
        MethodResponse::Fault(fault) => {
            out.push_str("<fault>");
            encode_value(&fault.to_value(), &mut out);
            out.push_str("</fault>");
        }
    }
    out.push_str("</methodResponse>\n");
    out
}
