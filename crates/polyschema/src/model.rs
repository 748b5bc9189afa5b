//! # Data Models
//!
//! User-defined types referenced by name from a `TypeReference`.
//! Each model is an explicit tagged variant; nothing here depends on a host language's
//! class hierarchy.

use serde::Deserialize;
use serde::Serialize;

use crate::types::TypeReference;

/// A named field of a struct model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeReference,
}

impl Property {
    pub fn new(name: impl Into<String>, ty: TypeReference) -> Self {
        Self { name: name.into(), ty }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Model {
    #[serde(rename_all = "camelCase")]
    Struct {
        name: String,
        #[serde(default)]
        type_parameters: Vec<String>,
        properties: Vec<Property>,
        /// Set when the struct is a union member and must carry a discriminator.
        #[serde(default)]
        has_type_discriminator: bool,
    },
    #[serde(rename_all = "camelCase")]
    Union {
        name: String,
        options: Vec<TypeReference>,
        #[serde(default)]
        type_parameters: Vec<String>,
    },
    Enum {
        name: String,
        options: Vec<String>,
    },
    /// A transparent newtype over exactly one other type.
    #[serde(rename_all = "camelCase")]
    Inline {
        name: String,
        #[serde(default)]
        type_parameters: Vec<String>,
        inlined_type: TypeReference,
    },
}

impl Model {
    pub fn name(&self) -> &str {
        match self {
            Self::Struct { name, .. }
            | Self::Union { name, .. }
            | Self::Enum { name, .. }
            | Self::Inline { name, .. } => name,
        }
    }

    pub fn type_parameters(&self) -> &[String] {
        match self {
            Self::Struct { type_parameters, .. }
            | Self::Union { type_parameters, .. }
            | Self::Inline { type_parameters, .. } => type_parameters,
            Self::Enum { .. } => &[],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Struct { .. } => "struct",
            Self::Union { .. } => "union",
            Self::Enum { .. } => "enum",
            Self::Inline { .. } => "inline",
        }
    }

    pub fn new_struct(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self::Struct {
            name: name.into(),
            type_parameters: Vec::new(),
            properties,
            has_type_discriminator: false,
        }
    }

    /// A struct that is a member of some union.
    pub fn union_member(name: impl Into<String>, properties: Vec<Property>) -> Self {
        Self::Struct {
            name: name.into(),
            type_parameters: Vec::new(),
            properties,
            has_type_discriminator: true,
        }
    }

    pub fn new_union(name: impl Into<String>, options: Vec<TypeReference>) -> Self {
        Self::Union { name: name.into(), options, type_parameters: Vec::new() }
    }

    pub fn new_enum(name: impl Into<String>, options: &[&str]) -> Self {
        Self::Enum {
            name: name.into(),
            options: options.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn new_inline(name: impl Into<String>, inlined_type: TypeReference) -> Self {
        Self::Inline { name: name.into(), type_parameters: Vec::new(), inlined_type }
    }

    /// Adds generic parameters to a struct, union or inline model. Enums ignore it.
    pub fn with_type_parameters(mut self, params: &[&str]) -> Self {
        let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        match &mut self {
            Self::Struct { type_parameters, .. }
            | Self::Union { type_parameters, .. }
            | Self::Inline { type_parameters, .. } => *type_parameters = params,
            Self::Enum { .. } => {}
        }
        self
    }
}
