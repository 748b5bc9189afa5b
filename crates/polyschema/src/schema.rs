//! # Schema Registry
//!
//! `SchemaDefinition` is the document both sides agree on. `Schema` is its validated,
//! indexed form: built once, read-only afterwards, with O(1) lookup of every endpoint
//! and model on the hot path of a call.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

use crate::endpoint::EventEndpoint;
use crate::endpoint::Method;
use crate::error::Error;
use crate::error::Result;
use crate::model::Model;
use crate::validate::validate;

/// The serialized description of an API.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<Method>,
    #[serde(default)]
    pub events: Vec<EventEndpoint>,
    #[serde(default)]
    pub models: Vec<Model>,
}

impl SchemaDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.methods.push(method);
        self
    }

    pub fn event(mut self, event: EventEndpoint) -> Self {
        self.events.push(event);
        self
    }

    pub fn model(mut self, model: Model) -> Self {
        self.models.push(model);
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A validated schema.
#[derive(Clone, Debug)]
pub struct Schema {
    definition: SchemaDefinition,
    methods: HashMap<String, usize>,
    events: HashMap<String, usize>,
    models: HashMap<String, usize>,
}

impl Schema {
    /// Validates and indexes a definition.
    ///
    /// # Errors
    /// Returns `Error::Invalid` listing every violation if any check fails.
    pub fn from_definition(definition: SchemaDefinition) -> Result<Self> {
        let violations = validate(&definition);
        if !violations.is_empty() {
            return Err(Error::Invalid(violations));
        }

        let index = |names: Vec<&str>| -> HashMap<String, usize> {
            names.into_iter().enumerate().map(|(i, n)| (n.to_string(), i)).collect()
        };
        let methods = index(definition.methods.iter().map(|m| m.name.as_str()).collect());
        let events = index(definition.events.iter().map(|e| e.name.as_str()).collect());
        let models = index(definition.models.iter().map(Model::name).collect());

        Ok(Self { definition, methods, events, models })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let definition: SchemaDefinition = serde_json::from_str(text)?;
        Self::from_definition(definition)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &SchemaDefinition {
        &self.definition
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        self.methods.get(name).map(|&i| &self.definition.methods[i])
    }

    pub fn event(&self, name: &str) -> Option<&EventEndpoint> {
        self.events.get(name).map(|&i| &self.definition.events[i])
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name).map(|&i| &self.definition.models[i])
    }

    pub fn methods(&self) -> &[Method] {
        &self.definition.methods
    }

    pub fn events(&self) -> &[EventEndpoint] {
        &self.definition.events
    }

    pub fn models(&self) -> &[Model] {
        &self.definition.models
    }
}
