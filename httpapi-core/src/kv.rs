//! Key-value conversion engine.
//!
//! Flattens a [`Value`] into an ordered list of [`KeyValue`] pairs for query
//! strings, header sets and url-encoded forms. Conversion walks an immutable
//! [`ConverterChain`]: each [`Converter`] either handles the value or passes,
//! and nested values recurse through the chain from the start with a fresh
//! [`ConvertContext`].
//!
//! ## Naming
//!
//! - A simple value at the top level is keyed by the parameter name.
//! - Members of a top-level object use the bare member name; deeper members
//!   compose `parent.member`.
//! - List elements repeat the enclosing key (`tags=a&tags=b`).
//! - A pair uses its own key.

use std::sync::Arc;

use crate::{ApiError, FormatOptions, KeyValueFormatter, Value};

mod converters;

pub use converters::{
    EnumerableConverter, NotSupportedConverter, NullConverter, PairConverter, PropertiesConverter,
    SimpleConverter,
};

/// Nesting deeper than this fails with [`ApiError::DepthLimitExceeded`].
pub const MAX_DEPTH: usize = 32;

/// One flattened entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl<K: Into<String>, V: Into<String>> From<(K, V)> for KeyValue {
    fn from((key, value): (K, V)) -> Self {
        KeyValue::new(key, value)
    }
}

/// The state a converter sees for one node of the value tree.
#[derive(Clone, Copy, Debug)]
pub struct ConvertContext<'a> {
    pub name: &'a str,
    pub value: &'a Value,
    pub depth: usize,
    pub options: &'a FormatOptions,
}

impl<'a> ConvertContext<'a> {
    pub fn new(name: &'a str, value: &'a Value, options: &'a FormatOptions) -> Self {
        Self {
            name,
            value,
            depth: 0,
            options,
        }
    }

    /// Context for a nested value, one level deeper.
    pub fn child<'b>(&self, name: &'b str, value: &'b Value) -> ConvertContext<'b>
    where
        'a: 'b,
    {
        ConvertContext {
            name,
            value,
            depth: self.depth + 1,
            options: self.options,
        }
    }
}

/// A step in the converter chain.
pub trait Converter: Send + Sync {
    /// Convert the value, or return `None` to let the next converter try.
    ///
    /// Nested values are converted by calling [`ConverterChain::convert`] on
    /// `chain` with a [`ConvertContext::child`].
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>>;
}

/// An ordered, immutable list of converters.
///
/// The not-supported terminal is always appended, so every value is either
/// converted or rejected with [`ApiError::UnsupportedType`].
#[derive(Clone)]
pub struct ConverterChain {
    converters: Arc<[Arc<dyn Converter>]>,
}

impl ConverterChain {
    /// Build a chain from `converters`, tried in order.
    pub fn new<I>(converters: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Converter>>,
    {
        let converters: Vec<Arc<dyn Converter>> = converters
            .into_iter()
            .chain(std::iter::once(Arc::new(NotSupportedConverter) as Arc<dyn Converter>))
            .collect();
        Self {
            converters: converters.into(),
        }
    }

    /// The built-in chain: null, simple, pair, enumerable, object properties.
    pub fn default_converters() -> Vec<Arc<dyn Converter>> {
        vec![
            Arc::new(NullConverter),
            Arc::new(SimpleConverter),
            Arc::new(PairConverter),
            Arc::new(EnumerableConverter),
            Arc::new(PropertiesConverter),
        ]
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Run `ctx` through the chain.
    pub fn convert(&self, ctx: &ConvertContext<'_>) -> Result<Vec<KeyValue>, ApiError> {
        if ctx.depth > MAX_DEPTH {
            return Err(ApiError::DepthLimitExceeded {
                name: ctx.name.to_string(),
                depth: MAX_DEPTH,
            });
        }
        for converter in self.converters.iter() {
            if let Some(result) = converter.convert(ctx, self) {
                return result;
            }
        }
        Err(ApiError::unsupported_type(ctx.value.type_name()))
    }
}

impl Default for ConverterChain {
    fn default() -> Self {
        Self::new(Self::default_converters())
    }
}

impl std::fmt::Debug for ConverterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterChain")
            .field("converters", &self.converters.len())
            .finish()
    }
}

/// The default [`KeyValueFormatter`], backed by a [`ConverterChain`].
#[derive(Clone, Debug, Default)]
pub struct KeyValueSerializer {
    chain: ConverterChain,
}

impl KeyValueSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom chain, e.g. with an extra converter in front of the defaults.
    pub fn with_chain(chain: ConverterChain) -> Self {
        Self { chain }
    }

    pub fn chain(&self) -> &ConverterChain {
        &self.chain
    }
}

impl KeyValueFormatter for KeyValueSerializer {
    fn serialize(
        &self,
        name: &str,
        value: &Value,
        options: &FormatOptions,
    ) -> Result<Vec<KeyValue>, ApiError> {
        self.chain.convert(&ConvertContext::new(name, value, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Simple, ToValue};
    use chrono::NaiveDate;

    fn serialize(name: &str, value: &Value, options: &FormatOptions) -> Vec<(String, String)> {
        KeyValueSerializer::new()
            .serialize(name, value, options)
            .unwrap()
            .into_iter()
            .map(|kv| (kv.key, kv.value))
            .collect()
    }

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_object_in_declared_order() {
        let birthday = NaiveDate::from_ymd_opt(2010, 10, 10).unwrap();
        let model = Value::object([
            ("name", "laojiu".to_value()),
            ("birthDay", birthday.to_value()),
        ]);

        let options = FormatOptions::default();
        assert_eq!(
            serialize("model", &model, &options),
            pairs(&[("name", "laojiu"), ("birthDay", "2010-10-10 00:00:00")])
        );
    }

    #[test]
    fn test_null_yields_nothing() {
        assert!(serialize("x", &Value::Null, &FormatOptions::default()).is_empty());
    }

    #[test]
    fn test_simple_uses_parameter_name() {
        assert_eq!(
            serialize("id", &42.to_value(), &FormatOptions::default()),
            pairs(&[("id", "42")])
        );
    }

    #[test]
    fn test_list_repeats_key() {
        let tags = vec!["a", "b"].to_value();
        assert_eq!(
            serialize("tags", &tags, &FormatOptions::default()),
            pairs(&[("tags", "a"), ("tags", "b")])
        );
    }

    #[test]
    fn test_pairs_use_their_own_key() {
        let entries = Value::List(vec![Value::pair("a", 1), Value::pair("b", Value::Null)]);
        assert_eq!(
            serialize("dict", &entries, &FormatOptions::default()),
            pairs(&[("a", "1")])
        );
    }

    #[test]
    fn test_nested_members_compose_names() {
        let model = Value::object([
            ("Name", "laojiu".to_value()),
            (
                "Address",
                Value::object([("City", "xm".to_value()), ("Zip", Value::Null)]),
            ),
        ]);

        let camel = FormatOptions::default().use_camel_case(true);
        assert_eq!(
            serialize("model", &model, &camel),
            pairs(&[("name", "laojiu"), ("address.city", "xm")])
        );

        let keep_null = FormatOptions::default();
        let result = KeyValueSerializer::new()
            .serialize("model", &model, &keep_null)
            .unwrap();
        // A null member yields no pair either way, it just is not skipped early.
        assert_eq!(result.len(), 2);
        assert_eq!(result[1], KeyValue::new("Address.City", "xm"));
    }

    #[test]
    fn test_bytes_are_not_supported() {
        let err = KeyValueSerializer::new()
            .serialize("file", &Value::Bytes(bytes::Bytes::from_static(b"x")), &FormatOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::UnsupportedType(ref name) if name == "bytes"));
    }

    #[test]
    fn test_depth_limit() {
        let mut value = Value::Simple(Simple::Int(1));
        for _ in 0..(MAX_DEPTH + 5) {
            value = Value::object([("inner", value)]);
        }
        let err = KeyValueSerializer::new()
            .serialize("deep", &value, &FormatOptions::default())
            .unwrap_err();
        assert!(matches!(err, ApiError::DepthLimitExceeded { depth: MAX_DEPTH, .. }));
    }

    #[test]
    fn test_custom_converter_runs_first() {
        struct Masked;

        impl Converter for Masked {
            fn convert(
                &self,
                ctx: &ConvertContext<'_>,
                _chain: &ConverterChain,
            ) -> Option<Result<Vec<KeyValue>, ApiError>> {
                (ctx.name == "password").then(|| Ok(vec![KeyValue::new(ctx.name, "***")]))
            }
        }

        let mut converters: Vec<Arc<dyn Converter>> = vec![Arc::new(Masked)];
        converters.extend(ConverterChain::default_converters());
        let serializer = KeyValueSerializer::with_chain(ConverterChain::new(converters));

        let form = Value::object([("user", "laojiu".to_value()), ("password", "secret".to_value())]);
        let result = serializer
            .serialize("form", &form, &FormatOptions::default())
            .unwrap();
        assert_eq!(
            result,
            vec![KeyValue::new("user", "laojiu"), KeyValue::new("password", "***")]
        );
    }
}
