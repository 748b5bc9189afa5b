//! # Wire Type System
//!
//! The closed vocabulary of builtin tags plus the open set of user type names.
//! Every language binding maps its native types into this vocabulary; the runtime only
//! ever sees `TypeReference` values already expressed in it.
//!
//! ## Invariants
//! - **Structural Equality**: two references are equal iff every field is equal.
//! - **Type Parameters Are Leaves**: a type-parameter reference has no type arguments
//!   and no inlined type. `TypeReference::type_parameter` cannot build one that does;
//!   deserialized references are rechecked by `check_shape`.

use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The builtin tags of the wire type system.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Builtin {
    Bool,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Char,
    String,
    /// Signed byte array.
    I8Array,
    /// Unsigned byte array.
    UI8Array,
    Array,
    Record,
    Tuple,
    Date,
    Duration,
    Uuid,
    Void,
}

impl Builtin {
    pub const ALL: [Builtin; 18] = [
        Builtin::Bool,
        Builtin::I8,
        Builtin::I16,
        Builtin::I32,
        Builtin::I64,
        Builtin::F32,
        Builtin::F64,
        Builtin::Char,
        Builtin::String,
        Builtin::I8Array,
        Builtin::UI8Array,
        Builtin::Array,
        Builtin::Record,
        Builtin::Tuple,
        Builtin::Date,
        Builtin::Duration,
        Builtin::Uuid,
        Builtin::Void,
    ];

    /// The tag as it appears in a schema document.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::I8 => "i8",
            Self::I16 => "i16",
            Self::I32 => "i32",
            Self::I64 => "i64",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::Char => "char",
            Self::String => "string",
            Self::I8Array => "i8array",
            Self::UI8Array => "ui8array",
            Self::Array => "array",
            Self::Record => "record",
            Self::Tuple => "tuple",
            Self::Date => "date",
            Self::Duration => "duration",
            Self::Uuid => "uuid",
            Self::Void => "void",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.as_str() == name)
    }

    /// Number of type arguments the tag requires.
    ///
    /// `None` means "one or more" (tuples).
    pub fn arity(self) -> Option<usize> {
        match self {
            Self::Array => Some(1),
            Self::Record => Some(2),
            Self::Tuple => None,
            _ => Some(0),
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node in the canonical type system describing one value's shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_nullable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub type_arguments: Vec<TypeReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inlined_type: Option<Box<TypeReference>>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_type_parameter: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Reasons a reference can be malformed regardless of the schema it lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    TypeParameterWithArguments(String),
    TypeParameterInlined(String),
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TypeParameterWithArguments(name) => {
                write!(f, "type parameter <{}> cannot have type arguments", name)
            }
            Self::TypeParameterInlined(name) => {
                write!(f, "type parameter <{}> cannot be an inlined type", name)
            }
        }
    }
}

impl std::error::Error for ShapeError {}

impl TypeReference {
    /// A plain, non-nullable reference without type arguments.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_nullable: false,
            type_arguments: Vec::new(),
            inlined_type: None,
            is_type_parameter: false,
        }
    }

    pub fn builtin(tag: Builtin) -> Self {
        Self::new(tag.as_str())
    }

    pub fn type_parameter(name: impl Into<String>) -> Self {
        Self { is_type_parameter: true, ..Self::new(name) }
    }

    pub fn array(element: TypeReference) -> Self {
        Self::builtin(Builtin::Array).with_arguments(vec![element])
    }

    pub fn record(key: TypeReference, value: TypeReference) -> Self {
        Self::builtin(Builtin::Record).with_arguments(vec![key, value])
    }

    pub fn tuple(elements: Vec<TypeReference>) -> Self {
        Self::builtin(Builtin::Tuple).with_arguments(elements)
    }

    pub fn nullable(mut self) -> Self {
        self.is_nullable = true;
        self
    }

    pub fn with_arguments(mut self, args: Vec<TypeReference>) -> Self {
        self.type_arguments = args;
        self
    }

    pub fn inlining(mut self, inner: TypeReference) -> Self {
        self.inlined_type = Some(Box::new(inner));
        self
    }

    /// The builtin tag, unless this is a user type or a type parameter.
    pub fn as_builtin(&self) -> Option<Builtin> {
        if self.is_type_parameter {
            return None;
        }
        Builtin::from_name(&self.name)
    }

    pub fn is_void(&self) -> bool {
        self.as_builtin() == Some(Builtin::Void)
    }

    /// The same reference with the nullability flag cleared.
    pub fn non_null(&self) -> Self {
        Self { is_nullable: false, ..self.clone() }
    }

    /// Recursively checks the type-parameter invariants.
    pub fn check_shape(&self) -> Result<(), ShapeError> {
        if self.is_type_parameter {
            if !self.type_arguments.is_empty() {
                return Err(ShapeError::TypeParameterWithArguments(self.name.clone()));
            }
            if self.inlined_type.is_some() {
                return Err(ShapeError::TypeParameterInlined(self.name.clone()));
            }
        }
        for arg in &self.type_arguments {
            arg.check_shape()?;
        }
        if let Some(inner) = &self.inlined_type {
            inner.check_shape()?;
        }
        Ok(())
    }

    /// Replaces type-parameter references by name.
    ///
    /// Parameters with no binding are left as they are.
    pub fn substitute(&self, bindings: &[(String, TypeReference)]) -> TypeReference {
        if self.is_type_parameter {
            if let Some((_, bound)) = bindings.iter().find(|(name, _)| *name == self.name) {
                let mut resolved = bound.clone();
                resolved.is_nullable |= self.is_nullable;
                return resolved;
            }
            return self.clone();
        }
        Self {
            name: self.name.clone(),
            is_nullable: self.is_nullable,
            type_arguments: self.type_arguments.iter().map(|a| a.substitute(bindings)).collect(),
            inlined_type: self.inlined_type.as_ref().map(|t| Box::new(t.substitute(bindings))),
            is_type_parameter: false,
        }
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.is_type_parameter {
            if !self.type_arguments.is_empty() {
                f.write_str("<")?;
                for (i, arg) in self.type_arguments.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(">")?;
            }
            if let Some(inner) = &self.inlined_type {
                write!(f, "(inlining {})", inner)?;
            }
        }
        if self.is_nullable {
            f.write_str("?")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_roundtrip() {
        for tag in Builtin::ALL {
            assert_eq!(Builtin::from_name(tag.as_str()), Some(tag));
        }
        assert_eq!(Builtin::from_name("Dog"), None);
    }

    #[test]
    fn test_structural_equality() {
        let a = TypeReference::array(TypeReference::builtin(Builtin::I32));
        let b = TypeReference::array(TypeReference::builtin(Builtin::I32));
        let c = TypeReference::array(TypeReference::builtin(Builtin::I64));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, a.clone().nullable());
    }

    #[test]
    fn test_type_parameter_is_not_builtin() {
        let t = TypeReference::type_parameter("string");
        assert_eq!(t.as_builtin(), None);
    }

    #[test]
    fn test_shape_rejects_parameter_with_arguments() {
        let mut t = TypeReference::type_parameter("T");
        t.type_arguments.push(TypeReference::builtin(Builtin::I32));
        assert_eq!(t.check_shape(), Err(ShapeError::TypeParameterWithArguments("T".into())));

        let nested = TypeReference::array(TypeReference::type_parameter("U").inlining(TypeReference::new("x")));
        assert_eq!(nested.check_shape(), Err(ShapeError::TypeParameterInlined("U".into())));
    }

    #[test]
    fn test_substitute_keeps_nullability() {
        let t = TypeReference::array(TypeReference::type_parameter("T").nullable());
        let bound = t.substitute(&[("T".into(), TypeReference::builtin(Builtin::String))]);
        assert_eq!(bound, TypeReference::array(TypeReference::builtin(Builtin::String).nullable()));
    }

    #[test]
    fn test_display() {
        let t = TypeReference::record(
            TypeReference::builtin(Builtin::String),
            TypeReference::new("Dog").nullable(),
        );
        assert_eq!(t.to_string(), "record<string, Dog?>");
    }

    #[test]
    fn test_document_field_names() {
        let json = r#"{"name":"array","isNullable":true,"typeArguments":[{"name":"T","isTypeParameter":true}]}"#;
        let t: TypeReference = serde_json::from_str(json).unwrap();
        assert!(t.is_nullable);
        assert!(t.type_arguments[0].is_type_parameter);
        assert_eq!(serde_json::to_string(&t).unwrap(), json);
    }
}
