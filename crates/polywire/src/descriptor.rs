//! # Serializer Descriptors
//!
//! Everything the codec needs to know about a model, derived once from the schema:
//! struct element order, the union discriminator and its value per option, and the
//! enum name-to-ordinal table.

use std::collections::HashMap;

use polyschema::DISCRIMINATOR_FIELD;
use polyschema::Model;
use polyschema::Property;
use polyschema::Schema;
use polyschema::TypeReference;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SerialDescriptor {
    Struct {
        name: String,
        type_parameters: Vec<String>,
        /// Properties in wire order.
        elements: Vec<Property>,
        discriminated: bool,
    },
    Union {
        name: String,
        discriminator: &'static str,
        /// `(discriminator value, option struct name)` in declaration order.
        options: Vec<(String, String)>,
    },
    Enum {
        name: String,
        /// Index is the ordinal.
        names: Vec<String>,
    },
    Inline {
        name: String,
        type_parameters: Vec<String>,
        inner: TypeReference,
    },
}

impl SerialDescriptor {
    pub fn derive(model: &Model) -> Self {
        match model {
            Model::Struct { name, type_parameters, properties, has_type_discriminator } => Self::Struct {
                name: name.clone(),
                type_parameters: type_parameters.clone(),
                elements: properties.clone(),
                discriminated: *has_type_discriminator,
            },
            Model::Union { name, options, .. } => Self::Union {
                name: name.clone(),
                discriminator: DISCRIMINATOR_FIELD,
                options: options.iter().map(|o| (o.name.clone(), o.name.clone())).collect(),
            },
            Model::Enum { name, options } => Self::Enum { name: name.clone(), names: options.clone() },
            Model::Inline { name, type_parameters, inlined_type } => Self::Inline {
                name: name.clone(),
                type_parameters: type_parameters.clone(),
                inner: inlined_type.clone(),
            },
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Struct { name, .. } | Self::Union { name, .. } | Self::Enum { name, .. } | Self::Inline { name, .. } => {
                name
            }
        }
    }

    /// Looks up the struct model a union discriminator value selects.
    pub fn option_for(&self, discriminator_value: &str) -> Option<&str> {
        match self {
            Self::Union { options, .. } => options
                .iter()
                .find(|(value, _)| value == discriminator_value)
                .map(|(_, model)| model.as_str()),
            _ => None,
        }
    }

    /// The discriminator value written for an option struct.
    pub fn discriminator_for(&self, option_model: &str) -> Option<&str> {
        match self {
            Self::Union { options, .. } => options
                .iter()
                .find(|(_, model)| model == option_model)
                .map(|(value, _)| value.as_str()),
            _ => None,
        }
    }

    pub fn ordinal(&self, option: &str) -> Option<usize> {
        match self {
            Self::Enum { names, .. } => names.iter().position(|n| n == option),
            _ => None,
        }
    }
}

/// Descriptors for every model of one schema.
#[derive(Clone, Debug, Default)]
pub struct Descriptors {
    by_name: HashMap<String, SerialDescriptor>,
    order: Vec<String>,
}

impl Descriptors {
    pub fn derive(schema: &Schema) -> Self {
        let mut out = Self::default();
        for model in schema.models() {
            out.order.push(model.name().to_string());
            out.by_name.insert(model.name().to_string(), SerialDescriptor::derive(model));
        }
        out
    }

    pub fn get(&self, name: &str) -> Option<&SerialDescriptor> {
        self.by_name.get(name)
    }

    /// Descriptors in schema declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SerialDescriptor> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
