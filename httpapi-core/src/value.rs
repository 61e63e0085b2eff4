//! The dynamic value model that call arguments are expressed in.
//!
//! Arguments reach the engine as [`Value`]s: simple scalars, key/value pairs,
//! lists and objects with ordered members. Types opt in through [`ToValue`];
//! anything implementing `serde::Serialize` can be bridged with
//! [`Value::from_serialize`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{ApiError, FormatOptions};

/// The closed set of simple types.
///
/// Simple values render to a single piece of text and are bound to the path
/// or query string by default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimpleKind {
    Bool,
    Int,
    UInt,
    Float,
    Decimal,
    Char,
    Text,
    DateTime,
    DateTimeOffset,
    Date,
    Uuid,
    Uri,
    Version,
    Enum,
}

/// A decimal number kept in its textual form.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Decimal(String);

impl Decimal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Decimal {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
        let (int, frac) = match digits.split_once('.') {
            Some((int, frac)) => (int, Some(frac)),
            None => (digits, None),
        };
        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(int) || frac.is_some_and(|frac| !all_digits(frac)) {
            return Err(ApiError::decode(format!("`{}` is not a decimal", s)));
        }
        Ok(Decimal(s.to_string()))
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dotted version number with two to four components (`1.2`, `1.2.3.4`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub build: Option<u32>,
    pub revision: Option<u32>,
}

impl Version {
    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: None,
            revision: None,
        }
    }
}

impl FromStr for Version {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ApiError::decode(format!("`{}` is not a version", s));
        let parts = s
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| invalid()))
            .collect::<Result<Vec<_>, _>>()?;
        match parts.as_slice() {
            [major, minor] => Ok(Version::new(*major, *minor)),
            [major, minor, build] => Ok(Version {
                build: Some(*build),
                ..Version::new(*major, *minor)
            }),
            [major, minor, build, revision] => Ok(Version {
                major: *major,
                minor: *minor,
                build: Some(*build),
                revision: Some(*revision),
            }),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some(revision) = self.revision {
                write!(f, ".{}", revision)?;
            }
        }
        Ok(())
    }
}

/// A value of one of the [`SimpleKind`]s.
#[derive(Clone, Debug, PartialEq)]
pub enum Simple {
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Decimal(Decimal),
    Char(char),
    Text(String),
    DateTime(NaiveDateTime),
    DateTimeOffset(DateTime<FixedOffset>),
    Date(NaiveDate),
    Uuid(Uuid),
    Uri(http::Uri),
    Version(Version),
    /// An enum member, carried by name.
    Enum(String),
}

impl Simple {
    pub fn kind(&self) -> SimpleKind {
        match self {
            Simple::Bool(_) => SimpleKind::Bool,
            Simple::Int(_) => SimpleKind::Int,
            Simple::UInt(_) => SimpleKind::UInt,
            Simple::Float(_) => SimpleKind::Float,
            Simple::Decimal(_) => SimpleKind::Decimal,
            Simple::Char(_) => SimpleKind::Char,
            Simple::Text(_) => SimpleKind::Text,
            Simple::DateTime(_) => SimpleKind::DateTime,
            Simple::DateTimeOffset(_) => SimpleKind::DateTimeOffset,
            Simple::Date(_) => SimpleKind::Date,
            Simple::Uuid(_) => SimpleKind::Uuid,
            Simple::Uri(_) => SimpleKind::Uri,
            Simple::Version(_) => SimpleKind::Version,
            Simple::Enum(_) => SimpleKind::Enum,
        }
    }

    /// Render the value as text.
    ///
    /// Date-time values use `options.date_time_format`; a date renders as
    /// midnight of that day.
    pub fn render(&self, options: &FormatOptions) -> Result<String, ApiError> {
        Ok(match self {
            Simple::Bool(v) => v.to_string(),
            Simple::Int(v) => v.to_string(),
            Simple::UInt(v) => v.to_string(),
            Simple::Float(v) => v.to_string(),
            Simple::Decimal(v) => v.to_string(),
            Simple::Char(v) => v.to_string(),
            Simple::Text(v) | Simple::Enum(v) => v.clone(),
            Simple::DateTime(v) => options.format_naive(v)?,
            Simple::DateTimeOffset(v) => options.format_offset(v)?,
            Simple::Date(v) => options.format_naive(&v.and_time(NaiveTime::MIN))?,
            Simple::Uuid(v) => v.hyphenated().to_string(),
            Simple::Uri(v) => v.to_string(),
            Simple::Version(v) => v.to_string(),
        })
    }

    /// Parse text produced by [`Simple::render`] back into a value of `kind`.
    ///
    /// Offset date-time text that carries no offset is read back as UTC.
    pub fn parse(kind: SimpleKind, text: &str, options: &FormatOptions) -> Result<Simple, ApiError> {
        let invalid = |what: &str| ApiError::decode(format!("`{}` is not a valid {}", text, what));
        let format = options.date_time_format.as_str();
        Ok(match kind {
            SimpleKind::Bool => Simple::Bool(text.parse().map_err(|_| invalid("bool"))?),
            SimpleKind::Int => Simple::Int(text.parse().map_err(|_| invalid("integer"))?),
            SimpleKind::UInt => Simple::UInt(text.parse().map_err(|_| invalid("integer"))?),
            SimpleKind::Float => Simple::Float(text.parse().map_err(|_| invalid("float"))?),
            SimpleKind::Decimal => Simple::Decimal(text.parse()?),
            SimpleKind::Char => {
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Simple::Char(c),
                    _ => return Err(invalid("char")),
                }
            }
            SimpleKind::Text => Simple::Text(text.to_string()),
            SimpleKind::Enum => Simple::Enum(text.to_string()),
            SimpleKind::DateTime => {
                Simple::DateTime(options.parse_naive(text).ok_or_else(|| invalid("date-time"))?)
            }
            SimpleKind::DateTimeOffset => Simple::DateTimeOffset(
                options.parse_offset(text).ok_or_else(|| invalid("date-time"))?,
            ),
            SimpleKind::Date => Simple::Date(
                options
                    .parse_naive(text)
                    .map(|v| v.date())
                    .or_else(|| NaiveDate::parse_from_str(text, format).ok())
                    .ok_or_else(|| invalid("date"))?,
            ),
            SimpleKind::Uuid => Simple::Uuid(Uuid::parse_str(text).map_err(|_| invalid("uuid"))?),
            SimpleKind::Uri => Simple::Uri(text.parse().map_err(|_| invalid("uri"))?),
            SimpleKind::Version => Simple::Version(text.parse()?),
        })
    }
}

/// A dynamically typed argument value.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Simple(Simple),
    /// A single key/value pair, e.g. a map entry.
    Pair(Box<Value>, Box<Value>),
    List(Vec<Value>),
    /// An object with its readable members in declaration order.
    Object(Vec<(String, Value)>),
    Bytes(Bytes),
}

impl Value {
    /// Build an object from `(member, value)` pairs, keeping their order.
    ///
    /// ```
    /// use httpapi_core::{ToValue, Value};
    ///
    /// let user = Value::object([("name", "laojiu".to_value()), ("age", 18.to_value())]);
    /// assert_eq!(user.member("name"), Some(&Value::from("laojiu")));
    /// ```
    pub fn object<I, K>(members: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Object(
            members
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    pub fn pair(key: impl ToValue, value: impl ToValue) -> Value {
        Value::Pair(Box::new(key.to_value()), Box::new(value.to_value()))
    }

    /// Convert any `Serialize` value through `serde_json`.
    ///
    /// Struct fields keep their declaration order. Values serde renders as
    /// strings (dates, UUIDs) become text.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Value, ApiError> {
        let json = serde_json::to_value(value).map_err(|e| ApiError::encode(e.to_string()))?;
        Ok(Value::from(json))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_simple(&self) -> Option<&Simple> {
        match self {
            Value::Simple(simple) => Some(simple),
            _ => None,
        }
    }

    /// Look up an object member by name.
    pub fn member(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Object(members) => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// A short name for the shape of this value, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Simple(simple) => match simple.kind() {
                SimpleKind::Bool => "bool",
                SimpleKind::Int => "int",
                SimpleKind::UInt => "uint",
                SimpleKind::Float => "float",
                SimpleKind::Decimal => "decimal",
                SimpleKind::Char => "char",
                SimpleKind::Text => "text",
                SimpleKind::DateTime => "date-time",
                SimpleKind::DateTimeOffset => "date-time-offset",
                SimpleKind::Date => "date",
                SimpleKind::Uuid => "uuid",
                SimpleKind::Uri => "uri",
                SimpleKind::Version => "version",
                SimpleKind::Enum => "enum",
            },
            Value::Pair(..) => "pair",
            Value::List(_) => "list",
            Value::Object(_) => "object",
            Value::Bytes(_) => "bytes",
        }
    }

    /// Convert into a `serde_json::Value` for JSON bodies.
    ///
    /// Simple values render with `options`; object member names follow the
    /// camelCase option and null members are dropped when requested.
    pub fn to_json(&self, options: &FormatOptions) -> Result<serde_json::Value, ApiError> {
        use serde_json::Value as Json;
        Ok(match self {
            Value::Null => Json::Null,
            Value::Simple(simple) => match simple {
                Simple::Bool(v) => Json::Bool(*v),
                Simple::Int(v) => Json::from(*v),
                Simple::UInt(v) => Json::from(*v),
                Simple::Float(v) => serde_json::Number::from_f64(*v)
                    .map(Json::Number)
                    .unwrap_or(Json::Null),
                other => Json::String(other.render(options)?),
            },
            Value::Pair(key, value) => {
                let key = match key.as_ref() {
                    Value::Simple(simple) => simple.render(options)?,
                    other => return Err(ApiError::unsupported_type(other.type_name())),
                };
                let mut map = serde_json::Map::new();
                map.insert(key, value.to_json(options)?);
                Json::Object(map)
            }
            Value::List(items) => Json::Array(
                items
                    .iter()
                    .map(|item| item.to_json(options))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(members) => {
                let mut map = serde_json::Map::new();
                for (name, value) in members {
                    if options.ignore_null_property && value.is_null() {
                        continue;
                    }
                    map.insert(options.member_name(name), value.to_json(options)?);
                }
                Json::Object(map)
            }
            Value::Bytes(bytes) => Json::Array(bytes.iter().map(|b| Json::from(*b)).collect()),
        })
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Value::Null,
            Json::Bool(v) => Value::Simple(Simple::Bool(v)),
            Json::Number(n) => {
                if let Some(v) = n.as_i64() {
                    Value::Simple(Simple::Int(v))
                } else if let Some(v) = n.as_u64() {
                    Value::Simple(Simple::UInt(v))
                } else {
                    Value::Simple(Simple::Float(n.as_f64().unwrap_or(f64::NAN)))
                }
            }
            Json::String(v) => Value::Simple(Simple::Text(v)),
            Json::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            Json::Object(map) => Value::Object(
                map.into_iter()
                    .map(|(name, value)| (name, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<Simple> for Value {
    fn from(simple: Simple) -> Self {
        Value::Simple(simple)
    }
}

/// Conversion into the dynamic [`Value`] model.
pub trait ToValue {
    fn to_value(&self) -> Value;

    /// The simple kind of this type, or `None` for complex types.
    ///
    /// Drives default parameter binding when a descriptor is built.
    fn simple_kind() -> Option<SimpleKind> {
        None
    }
}

macro_rules! impl_simple {
    ($variant:ident as $target:ty: $($ty:ty),+) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::Simple(Simple::$variant(<$target>::from(self.clone())))
                }

                fn simple_kind() -> Option<SimpleKind> {
                    Some(SimpleKind::$variant)
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    value.to_value()
                }
            }
        )+
    };
}

impl_simple!(Bool as bool: bool);
impl_simple!(Int as i64: i8, i16, i32, i64);
impl_simple!(UInt as u64: u8, u16, u32, u64);
impl_simple!(Float as f64: f32, f64);
impl_simple!(Char as char: char);
impl_simple!(Text as String: String);
impl_simple!(Decimal as Decimal: Decimal);
impl_simple!(Version as Version: Version);
impl_simple!(DateTime as NaiveDateTime: NaiveDateTime);
impl_simple!(DateTimeOffset as DateTime<FixedOffset>: DateTime<FixedOffset>);
impl_simple!(Date as NaiveDate: NaiveDate);
impl_simple!(Uuid as Uuid: Uuid);
impl_simple!(Uri as http::Uri: http::Uri);

impl ToValue for isize {
    fn to_value(&self) -> Value {
        Value::Simple(Simple::Int(*self as i64))
    }

    fn simple_kind() -> Option<SimpleKind> {
        Some(SimpleKind::Int)
    }
}

impl ToValue for usize {
    fn to_value(&self) -> Value {
        Value::Simple(Simple::UInt(*self as u64))
    }

    fn simple_kind() -> Option<SimpleKind> {
        Some(SimpleKind::UInt)
    }
}

impl ToValue for str {
    fn to_value(&self) -> Value {
        Value::Simple(Simple::Text(self.to_string()))
    }

    fn simple_kind() -> Option<SimpleKind> {
        Some(SimpleKind::Text)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        value.to_value()
    }
}

impl ToValue for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Simple(Simple::DateTimeOffset(self.fixed_offset()))
    }

    fn simple_kind() -> Option<SimpleKind> {
        Some(SimpleKind::DateTimeOffset)
    }
}

impl ToValue for Bytes {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for Simple {
    fn to_value(&self) -> Value {
        Value::Simple(self.clone())
    }
}

impl<T: ToValue + ?Sized> ToValue for &T {
    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn simple_kind() -> Option<SimpleKind> {
        T::simple_kind()
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(value) => value.to_value(),
            None => Value::Null,
        }
    }

    fn simple_kind() -> Option<SimpleKind> {
        T::simple_kind()
    }
}

impl<T: ToValue> ToValue for [T] {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        self.as_slice().to_value()
    }
}

impl<K: ToValue, V: ToValue> ToValue for (K, V) {
    fn to_value(&self) -> Value {
        Value::pair(&self.0, &self.1)
    }
}

impl<K: ToValue, V: ToValue> ToValue for BTreeMap<K, V> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(|(k, v)| Value::pair(k, v)).collect())
    }
}

impl<K: ToValue, V: ToValue, S> ToValue for HashMap<K, V, S> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(|(k, v)| Value::pair(k, v)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn round_trip(value: Simple, options: &FormatOptions) {
        let text = value.render(options).unwrap();
        let parsed = Simple::parse(value.kind(), &text, options).unwrap();
        assert_eq!(parsed, value, "round trip through `{}`", text);
    }

    #[test]
    fn test_simple_round_trip() {
        let options = FormatOptions::default();
        let date = NaiveDate::from_ymd_opt(2010, 10, 10).unwrap();

        round_trip(Simple::Bool(true), &options);
        round_trip(Simple::Int(-42), &options);
        round_trip(Simple::UInt(u64::MAX), &options);
        round_trip(Simple::Float(0.1), &options);
        round_trip(Simple::Float(-1.5e300), &options);
        round_trip(Simple::Decimal("-12.500".parse().unwrap()), &options);
        round_trip(Simple::Char('字'), &options);
        round_trip(Simple::Text("laojiu".into()), &options);
        round_trip(Simple::Enum("Male".into()), &options);
        round_trip(Simple::Date(date), &options);
        round_trip(
            Simple::DateTime(date.and_hms_opt(23, 59, 1).unwrap()),
            &options,
        );
        round_trip(Simple::Uuid(Uuid::from_u128(0x1234)), &options);
        round_trip(
            Simple::Uri("http://www.baidu.com/path?q=1".parse().unwrap()),
            &options,
        );
        round_trip(Simple::Version("1.2.3".parse().unwrap()), &options);
    }

    #[test]
    fn test_offset_round_trip() {
        let options = FormatOptions::default();
        let iso = options.with_date_time_format("%Y-%m-%dT%H:%M:%S%:z");
        for seconds in [8 * 3600, -(5 * 3600 + 30 * 60), 0] {
            let offset = FixedOffset::east_opt(seconds).unwrap();
            let value = offset.with_ymd_and_hms(2010, 10, 10, 8, 0, 0).unwrap();
            round_trip(Simple::DateTimeOffset(value), &options);
            round_trip(Simple::DateTimeOffset(value), &iso);
            round_trip(
                Simple::DateTimeOffset(value.with_nanosecond(123_456_789).unwrap()),
                &options,
            );
        }

        let text = Simple::DateTimeOffset(Utc.with_ymd_and_hms(2010, 10, 10, 8, 0, 0).unwrap().fixed_offset())
            .render(&options)
            .unwrap();
        assert_eq!(text, "2010-10-10 08:00:00+00:00");
    }

    #[test]
    fn test_sub_second_round_trip() {
        let options = FormatOptions::default();
        let value = NaiveDate::from_ymd_opt(2010, 10, 10)
            .unwrap()
            .and_hms_milli_opt(8, 30, 0, 250)
            .unwrap();
        round_trip(Simple::DateTime(value), &options);
        round_trip(
            Simple::DateTime(value.with_nanosecond(1).unwrap()),
            &options,
        );
    }

    #[test]
    fn test_invalid_simple_text() {
        let options = FormatOptions::default();
        assert!(Simple::parse(SimpleKind::Int, "abc", &options).is_err());
        assert!(Simple::parse(SimpleKind::Char, "ab", &options).is_err());
        assert!("1.".parse::<Decimal>().is_err());
        assert!("1".parse::<Version>().is_err());
        assert!("1.2.3.4.5".parse::<Version>().is_err());
    }

    #[test]
    fn test_to_value() {
        assert_eq!(Some(5u8).to_value(), Value::Simple(Simple::UInt(5)));
        assert_eq!(None::<i32>.to_value(), Value::Null);
        assert_eq!(
            vec!["a", "b"].to_value(),
            Value::List(vec![Value::from("a"), Value::from("b")])
        );

        let mut map = BTreeMap::new();
        map.insert("k", 1);
        assert_eq!(map.to_value(), Value::List(vec![Value::pair("k", 1)]));
    }

    #[test]
    fn test_simple_kind() {
        assert_eq!(i32::simple_kind(), Some(SimpleKind::Int));
        assert_eq!(<Option<&str>>::simple_kind(), Some(SimpleKind::Text));
        assert_eq!(Uuid::simple_kind(), Some(SimpleKind::Uuid));
        assert_eq!(<Vec<i32>>::simple_kind(), None);
        assert_eq!(Value::simple_kind(), None);
    }

    #[test]
    fn test_from_serialize_keeps_order() {
        #[derive(Serialize)]
        struct User {
            name: &'static str,
            age: u32,
            email: Option<&'static str>,
        }

        let value = Value::from_serialize(&User {
            name: "laojiu",
            age: 18,
            email: None,
        })
        .unwrap();

        match value {
            Value::Object(members) => {
                let names: Vec<_> = members.iter().map(|(name, _)| name.as_str()).collect();
                assert_eq!(names, ["name", "age", "email"]);
                assert_eq!(members[1].1, Value::Simple(Simple::Int(18)));
                assert!(members[2].1.is_null());
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_to_json_honors_options() {
        let value = Value::object([
            ("UserName", Value::from("laojiu")),
            ("Email", Value::Null),
        ]);
        let options = FormatOptions::default()
            .use_camel_case(true)
            .ignore_null_property(true);
        assert_eq!(
            value.to_json(&options).unwrap(),
            serde_json::json!({ "userName": "laojiu" })
        );
        assert_eq!(
            value.to_json(&FormatOptions::default()).unwrap(),
            serde_json::json!({ "UserName": "laojiu", "Email": null })
        );
    }
}
