//! # Error Definitions
//!
//! Schema errors are build-time failures. A `Schema` either validates completely or is
//! never constructed; nothing here is deferred to request time.

use std::fmt;

use crate::types::ShapeError;

/// One problem found while validating a schema definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    DuplicateModel(String),
    DuplicateMethod(String),
    DuplicateEvent(String),
    /// Two properties, parameters, options or type parameters share a name.
    DuplicateMember { context: String, name: String },
    /// An endpoint name contains the request separator.
    ReservedSeparator { endpoint: String },
    /// A union member property or union option uses the discriminator field name.
    ReservedDiscriminator { context: String },
    /// Unions may not declare type parameters.
    GenericUnion(String),
    InvalidUnionOption { union: String, option: String, reason: String },
    UnknownType { context: String, name: String },
    ArityMismatch { context: String, ty: String, expected: String, found: usize },
    UndeclaredTypeParameter { context: String, name: String },
    MalformedReference { context: String, error: ShapeError },
    MultipleTargets(String),
    DispatchTarget { event: String, parameter: String },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateModel(name) => write!(f, "model '{}' is declared more than once", name),
            Self::DuplicateMethod(name) => write!(f, "method '{}' is declared more than once", name),
            Self::DuplicateEvent(name) => write!(f, "event '{}' is declared more than once", name),
            Self::DuplicateMember { context, name } => write!(f, "{}: '{}' is declared more than once", context, name),
            Self::ReservedSeparator { endpoint } => {
                write!(f, "endpoint '{}' must not contain the separator ':'", endpoint)
            }
            Self::ReservedDiscriminator { context } => write!(
                f,
                "{}: the name '{}' is reserved for the union discriminator",
                context,
                crate::DISCRIMINATOR_FIELD
            ),
            Self::GenericUnion(name) => write!(f, "union '{}' declares type parameters; generic unions are not supported", name),
            Self::InvalidUnionOption { union, option, reason } => {
                write!(f, "union '{}' option '{}': {}", union, option, reason)
            }
            Self::UnknownType { context, name } => write!(f, "{}: unknown type '{}'", context, name),
            Self::ArityMismatch { context, ty, expected, found } => write!(
                f,
                "{}: '{}' takes {} type argument(s), found {}",
                context, ty, expected, found
            ),
            Self::UndeclaredTypeParameter { context, name } => {
                write!(f, "{}: type parameter <{}> is not declared here", context, name)
            }
            Self::MalformedReference { context, error } => write!(f, "{}: {}", context, error),
            Self::MultipleTargets(event) => write!(f, "event '{}' declares more than one target parameter", event),
            Self::DispatchTarget { event, parameter } => write!(
                f,
                "event '{}' parameter '{}' cannot be both a dispatch and a target parameter",
                event, parameter
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Error {
    /// The schema document could not be parsed.
    Malformed(String),
    /// The schema document could not be read.
    Io(String),
    /// The definition parsed but failed validation. Holds every problem found.
    Invalid(Vec<Violation>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "Malformed schema document: {}", msg),
            Self::Io(msg) => write!(f, "Could not read schema document: {}", msg),
            Self::Invalid(violations) => {
                write!(f, "Invalid schema ({} problem(s))", violations.len())?;
                for v in violations {
                    write!(f, "\n  - {}", v)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
