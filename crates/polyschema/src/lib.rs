//! # PolySchema
//!
//! The language-neutral description of an API: its methods, events and data models,
//! with every type expressed in one canonical wire type system.
//!
//! A schema document is produced by some front-end (annotation processor, hand-written
//! JSON, ...) and consumed identically by servers and clients. This crate only parses,
//! validates and indexes it.

pub mod endpoint;
pub mod error;
pub mod model;
pub mod schema;
pub mod types;
mod validate;


pub use endpoint::EventEndpoint;
pub use endpoint::EventParameter;
pub use endpoint::Method;
pub use endpoint::Parameter;
pub use error::Error;
pub use error::Result;
pub use error::Violation;
pub use model::Model;
pub use model::Property;
pub use schema::Schema;
pub use schema::SchemaDefinition;
pub use types::Builtin;
pub use types::TypeReference;

/// Field carrying the option name of a serialized union value.
pub const DISCRIMINATOR_FIELD: &str = "type";

/// Separates the method name from the argument payload of a request.
pub const METHOD_SEPARATOR: char = ':';
