//! The built-in converters, in chain order.

use super::{ConvertContext, Converter, ConverterChain, KeyValue};
use crate::{ApiError, Value};

/// A null value yields no pairs.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullConverter;

impl Converter for NullConverter {
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        _chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>> {
        ctx.value.is_null().then(|| Ok(Vec::new()))
    }
}

/// A simple value yields `(name, text)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleConverter;

impl Converter for SimpleConverter {
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        _chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>> {
        let simple = ctx.value.as_simple()?;
        Some(
            simple
                .render(ctx.options)
                .map(|text| vec![KeyValue::new(ctx.name, text)]),
        )
    }
}

/// A pair is keyed by its own key; its value is converted under that key.
#[derive(Clone, Copy, Debug, Default)]
pub struct PairConverter;

impl Converter for PairConverter {
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>> {
        let Value::Pair(key, value) = ctx.value else {
            return None;
        };
        let key = match key.as_ref() {
            Value::Simple(simple) => match simple.render(ctx.options) {
                Ok(key) => key,
                Err(err) => return Some(Err(err)),
            },
            other => return Some(Err(ApiError::unsupported_type(other.type_name()))),
        };
        Some(chain.convert(&ctx.child(&key, value)))
    }
}

/// Each list element is converted under the enclosing name.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnumerableConverter;

impl Converter for EnumerableConverter {
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>> {
        let Value::List(items) = ctx.value else {
            return None;
        };
        let mut pairs = Vec::with_capacity(items.len());
        for item in items {
            match chain.convert(&ctx.child(ctx.name, item)) {
                Ok(converted) => pairs.extend(converted),
                Err(err) => return Some(Err(err)),
            }
        }
        Some(Ok(pairs))
    }
}

/// Object members are converted one by one, in declaration order.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropertiesConverter;

impl Converter for PropertiesConverter {
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>> {
        let Value::Object(members) = ctx.value else {
            return None;
        };
        let mut pairs = Vec::with_capacity(members.len());
        for (member, value) in members {
            if ctx.options.ignore_null_property && value.is_null() {
                continue;
            }
            let member = ctx.options.member_name(member);
            let name = if ctx.depth == 0 {
                member
            } else {
                format!("{}.{}", ctx.name, member)
            };
            match chain.convert(&ctx.child(&name, value)) {
                Ok(converted) => pairs.extend(converted),
                Err(err) => return Some(Err(err)),
            }
        }
        Some(Ok(pairs))
    }
}

/// Terminal converter: rejects whatever reached it.
#[derive(Clone, Copy, Debug, Default)]
pub struct NotSupportedConverter;

impl Converter for NotSupportedConverter {
    fn convert(
        &self,
        ctx: &ConvertContext<'_>,
        _chain: &ConverterChain,
    ) -> Option<Result<Vec<KeyValue>, ApiError>> {
        Some(Err(ApiError::unsupported_type(ctx.value.type_name())))
    }
}
