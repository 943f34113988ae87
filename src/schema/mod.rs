//! Schema representation consumed by the engine.
//!
//! The engine does not parse SDL; callers construct a [`Schema`] from
//! whatever source they have and hand it over read-only.

pub mod meta;
pub mod model;

pub use self::model::{Schema, SchemaBuilder};
