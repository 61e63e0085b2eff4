//! Pluggable payload formatters.
//!
//! The call engine never encodes payloads itself; it goes through these
//! narrow contracts so applications can swap in their own codecs.
//!
//! | Contract | Default |
//! |----------|---------|
//! | [`JsonFormatter`] | [`DefaultJsonFormatter`] (serde_json) |
//! | [`XmlFormatter`] | [`DefaultXmlFormatter`] (quick-xml) |
//! | [`KeyValueFormatter`] | [`KeyValueSerializer`](crate::KeyValueSerializer) |

use bytes::Bytes;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use serde::de::DeserializeOwned;

use crate::kv::MAX_DEPTH;
use crate::{ApiError, FormatOptions, KeyValue, Value};

/// Serializes request values to JSON and parses JSON responses.
pub trait JsonFormatter: Send + Sync + 'static {
    fn serialize(&self, value: &Value, options: &FormatOptions) -> Result<Bytes, ApiError>;

    /// Parse a response body. An empty body is `null`.
    fn deserialize(&self, body: &[u8]) -> Result<serde_json::Value, ApiError>;
}

/// Serializes request values to XML and checks XML responses.
pub trait XmlFormatter: Send + Sync + 'static {
    /// Serialize `value` as the content of a `root` element.
    fn serialize(&self, root: &str, value: &Value, options: &FormatOptions) -> Result<String, ApiError>;

    /// Validate a response body and return it as text.
    fn deserialize(&self, body: &[u8]) -> Result<String, ApiError>;
}

/// Flattens a named value into key-value pairs.
pub trait KeyValueFormatter: Send + Sync + 'static {
    fn serialize(&self, name: &str, value: &Value, options: &FormatOptions) -> Result<Vec<KeyValue>, ApiError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultJsonFormatter;

impl JsonFormatter for DefaultJsonFormatter {
    fn serialize(&self, value: &Value, options: &FormatOptions) -> Result<Bytes, ApiError> {
        let json = value.to_json(options)?;
        serde_json::to_vec(&json)
            .map(Bytes::from)
            .map_err(|e| ApiError::encode(e.to_string()))
    }

    fn deserialize(&self, body: &[u8]) -> Result<serde_json::Value, ApiError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(body).map_err(|e| ApiError::decode(e.to_string()))
    }
}

/// Writes values as nested elements.
///
/// Object members become child elements, list items become `<item>`
/// elements and null members become empty elements unless
/// `ignore_null_property` is set. Names that are not XML names fail with
/// [`ApiError::Encode`]; nesting deeper than [`MAX_DEPTH`] fails with
/// [`ApiError::DepthLimitExceeded`].
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultXmlFormatter;

impl DefaultXmlFormatter {
    fn write_element(
        writer: &mut Writer<Vec<u8>>,
        name: &str,
        value: &Value,
        options: &FormatOptions,
        depth: usize,
    ) -> Result<(), ApiError> {
        if depth > MAX_DEPTH {
            return Err(ApiError::DepthLimitExceeded {
                name: name.to_string(),
                depth: MAX_DEPTH,
            });
        }
        if !is_xml_name(name) {
            return Err(ApiError::encode(format!("`{}` is not a valid xml element name", name)));
        }
        let io = |e: std::io::Error| ApiError::encode(e.to_string());
        match value {
            Value::Null => {
                writer
                    .write_event(Event::Empty(BytesStart::new(name)))
                    .map_err(io)?;
                return Ok(());
            }
            Value::Bytes(_) => return Err(ApiError::unsupported_type(value.type_name())),
            _ => {}
        }

        writer
            .write_event(Event::Start(BytesStart::new(name)))
            .map_err(io)?;
        match value {
            Value::Simple(simple) => {
                let text = simple.render(options)?;
                writer
                    .write_event(Event::Text(BytesText::new(&text)))
                    .map_err(io)?;
            }
            Value::Pair(key, value) => {
                let key = match key.as_ref() {
                    Value::Simple(simple) => simple.render(options)?,
                    other => return Err(ApiError::unsupported_type(other.type_name())),
                };
                Self::write_element(writer, &key, value, options, depth + 1)?;
            }
            Value::List(items) => {
                for item in items {
                    Self::write_element(writer, "item", item, options, depth + 1)?;
                }
            }
            Value::Object(members) => {
                for (member, value) in members {
                    if options.ignore_null_property && value.is_null() {
                        continue;
                    }
                    Self::write_element(
                        writer,
                        &options.member_name(member),
                        value,
                        options,
                        depth + 1,
                    )?;
                }
            }
            Value::Null | Value::Bytes(_) => {}
        }
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(io)?;
        Ok(())
    }
}

impl XmlFormatter for DefaultXmlFormatter {
    fn serialize(&self, root: &str, value: &Value, options: &FormatOptions) -> Result<String, ApiError> {
        let mut writer = Writer::new(Vec::new());
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(|e| ApiError::encode(e.to_string()))?;
        Self::write_element(&mut writer, root, value, options, 0)?;
        String::from_utf8(writer.into_inner()).map_err(|e| ApiError::encode(e.to_string()))
    }

    fn deserialize(&self, body: &[u8]) -> Result<String, ApiError> {
        let text = std::str::from_utf8(body).map_err(|e| ApiError::decode(format!("invalid UTF-8: {e}")))?;
        let mut reader = quick_xml::Reader::from_str(text);
        loop {
            match reader.read_event() {
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => {
                    return Err(ApiError::decode(format!(
                        "malformed xml at position {}: {}",
                        reader.buffer_position(),
                        e
                    )));
                }
            }
        }
        Ok(text.to_string())
    }
}

/// `NameStartChar (NameChar)*`, with `:` left out since no namespaces are
/// declared.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | '\u{B7}'))
}

/// Deserialize XML text into a typed value.
pub fn from_xml<T: DeserializeOwned>(text: &str) -> Result<T, ApiError> {
    quick_xml::de::from_str(text).map_err(|e| ApiError::decode(e.to_string()))
}
