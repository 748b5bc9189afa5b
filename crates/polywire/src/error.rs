//! # Error Definitions
//!
//! The ledger of serialization and framing failures. Every variant here describes
//! bytes or values that do not satisfy their declared type, so a server reports all of
//! them to callers as invalid requests.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The Format could not read or write its byte representation.
    Format(String),
    /// A value did not match the declared type.
    TypeMismatch { expected: String, found: String },
    /// A struct was missing a required property.
    MissingField(String),
    /// A struct value carried a property its model does not declare.
    UnexpectedField { model: String, field: String },
    /// An unknown union option or enum name was encountered.
    UnknownVariant(String),
    /// A user type name has no model in the schema.
    UnknownType(String),
    /// A type parameter survived substitution, so no concrete type is known.
    UnboundTypeParameter(String),
    /// The message structure was malformed (separator, arity, discriminator, ...).
    ProtocolViolation(String),
    /// A method name contains the request separator.
    InvalidMethodName(String),
    /// The nested depth of the values exceeded the safety limit.
    RecursionLimitExceeded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(msg) => write!(f, "format error: {}", msg),
            Self::TypeMismatch { expected, found } => write!(f, "expected {}, found {}", expected, found),
            Self::MissingField(name) => write!(f, "missing field '{}'", name),
            Self::UnexpectedField { model, field } => write!(f, "'{}' has no field '{}'", model, field),
            Self::UnknownVariant(name) => write!(f, "unknown variant '{}'", name),
            Self::UnknownType(name) => write!(f, "unknown type '{}'", name),
            Self::UnboundTypeParameter(name) => write!(f, "type parameter <{}> is not bound", name),
            Self::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            Self::InvalidMethodName(name) => {
                write!(f, "method name must not contain '{}': \"{}\"", polyschema::METHOD_SEPARATOR, name)
            }
            Self::RecursionLimitExceeded => write!(f, "value nesting exceeds the recursion limit"),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Format(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
