//! Wire payload decoding.
//!
//! Every request and response body is decoded once into a [`Payload`] before any
//! schema inference runs. How a body is decoded depends only on its declared
//! `Content-Type`:
//!
//! - `application/json` and `*+json` bodies are parsed as JSON
//! - `application/x-www-form-urlencoded` bodies become an object of strings
//! - anything else is kept as an opaque string
//!
//! Empty bodies and JSON that fails to parse produce no payload at all.

use crate::content_negotiator::parse_content_type;
use log::debug;
use serde_json::Value;

/// A decoded body value.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Payload>),
    /// Keys in the order the JSON decoder yields them
    Object(Vec<(String, Payload)>),
}

/// How a body with a given Content-Type is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Text,
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Payload::Null,
            Value::Bool(b) => Payload::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Payload::Int(i),
                // u64 beyond i64::MAX and all fractional numbers
                None => Payload::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Payload::String(s),
            Value::Array(items) => Payload::Array(items.into_iter().map(Payload::from).collect()),
            Value::Object(map) => Payload::Object(
                map.into_iter()
                    .map(|(key, value)| (key, Payload::from(value)))
                    .collect(),
            ),
        }
    }
}

impl Payload {
    /// Converts the payload back to a JSON value, used for `example` fields.
    ///
    /// Non-finite floats have no JSON form and become their textual rendering.
    pub fn to_json(&self) -> Value {
        match self {
            Payload::Null => Value::Null,
            Payload::Bool(b) => Value::Bool(*b),
            Payload::Int(i) => Value::from(*i),
            Payload::Float(f) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(f.to_string())),
            Payload::String(s) => Value::String(s.clone()),
            Payload::Array(items) => Value::Array(items.iter().map(Payload::to_json).collect()),
            Payload::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Classifies a Content-Type header value. Missing or unparsable values are
/// treated as opaque text.
pub fn body_kind(content_type: Option<&str>) -> BodyKind {
    let Some(media) = content_type.and_then(parse_content_type) else {
        return BodyKind::Text;
    };

    if media.subtype() == mime::JSON || media.suffix() == Some(mime::JSON) {
        BodyKind::Json
    } else if media.type_() == mime::APPLICATION && media.subtype() == mime::WWW_FORM_URLENCODED {
        BodyKind::Form
    } else {
        BodyKind::Text
    }
}

/// Decodes a raw body according to its Content-Type.
///
/// Returns `None` when there is no body, the body is empty, or a JSON body is
/// malformed. A malformed body only loses its schema; the exchange itself is
/// still recorded by the caller.
pub fn decode_body(content_type: Option<&str>, raw: Option<&str>) -> Option<Payload> {
    let raw = raw?;
    if raw.is_empty() {
        return None;
    }

    match body_kind(content_type) {
        BodyKind::Json => match serde_json::from_str::<Value>(raw) {
            Ok(value) => Some(Payload::from(value)),
            Err(e) => {
                debug!("Skipping malformed JSON body: {}", e);
                None
            }
        },
        BodyKind::Form => Some(Payload::Object(
            url::form_urlencoded::parse(raw.as_bytes())
                .map(|(key, value)| (key.into_owned(), Payload::String(value.into_owned())))
                .collect(),
        )),
        BodyKind::Text => Some(Payload::String(raw.to_string())),
    }
}
