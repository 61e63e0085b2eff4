//! Core types for httpapi.
//!
//! This crate provides the transport-free building blocks shared by the
//! call engine in `httpapi-client`:
//!
//! ## Modules
//!
//! - `error`: The [`ApiError`] taxonomy
//! - `format`: [`FormatOptions`] and the camelCase naming rule
//! - `value`: The dynamic [`Value`] model arguments are expressed in
//! - [`kv`]: The key-value conversion engine used for query, header and form encoding
//! - `formatter`: Pluggable JSON / XML / key-value formatter contracts
//! - `cache`: The single-flight memoizing cache

mod cache;
mod error;
mod format;
mod formatter;
pub mod kv;
mod value;

pub use cache::*;
pub use error::*;
pub use format::*;
pub use formatter::*;
pub use kv::{KeyValue, KeyValueSerializer};
pub use value::*;
