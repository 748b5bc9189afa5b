//! # Schema Validation
//!
//! Runs every check over a `SchemaDefinition` and reports all violations at once, so
//! a broken document is fixed in one pass instead of one error at a time.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::DISCRIMINATOR_FIELD;
use crate::METHOD_SEPARATOR;
use crate::endpoint::EventEndpoint;
use crate::endpoint::Method;
use crate::error::Violation;
use crate::model::Model;
use crate::schema::SchemaDefinition;
use crate::types::TypeReference;

struct Validator<'a> {
    models: HashMap<&'a str, &'a Model>,
    violations: Vec<Violation>,
}

/// Validates a definition, returning every violation found.
pub fn validate(def: &SchemaDefinition) -> Vec<Violation> {
    let mut v = Validator { models: HashMap::new(), violations: Vec::new() };

    for model in &def.models {
        if v.models.insert(model.name(), model).is_some() {
            v.violations.push(Violation::DuplicateModel(model.name().to_string()));
        }
    }

    for model in &def.models {
        v.check_model(model);
    }

    let mut seen = HashSet::new();
    for method in &def.methods {
        if !seen.insert(method.name.as_str()) {
            v.violations.push(Violation::DuplicateMethod(method.name.clone()));
        }
        v.check_method(method);
    }

    let mut seen = HashSet::new();
    for event in &def.events {
        if !seen.insert(event.name.as_str()) {
            v.violations.push(Violation::DuplicateEvent(event.name.clone()));
        }
        v.check_event(event);
    }

    v.violations
}

impl<'a> Validator<'a> {
    fn check_unique<'n>(&mut self, context: &str, names: impl Iterator<Item = &'n str>) {
        let mut seen = HashSet::new();
        for name in names {
            if !seen.insert(name) {
                self.violations.push(Violation::DuplicateMember {
                    context: context.to_string(),
                    name: name.to_string(),
                });
            }
        }
    }

    fn check_model(&mut self, model: &'a Model) {
        let context = format!("model '{}'", model.name());
        self.check_unique(&context, model.type_parameters().iter().map(String::as_str));

        match model {
            Model::Struct { name, type_parameters, properties, has_type_discriminator } => {
                self.check_unique(&context, properties.iter().map(|p| p.name.as_str()));
                for prop in properties {
                    let ctx = format!("model '{}' property '{}'", name, prop.name);
                    if *has_type_discriminator && prop.name == DISCRIMINATOR_FIELD {
                        self.violations.push(Violation::ReservedDiscriminator { context: ctx.clone() });
                    }
                    self.check_type(&prop.ty, type_parameters, &ctx);
                }
            }
            Model::Union { name, options, type_parameters } => {
                if !type_parameters.is_empty() {
                    self.violations.push(Violation::GenericUnion(name.clone()));
                }
                self.check_unique(&context, options.iter().map(|o| o.name.as_str()));
                for option in options {
                    self.check_union_option(name, option);
                }
            }
            Model::Enum { options, .. } => {
                self.check_unique(&context, options.iter().map(String::as_str));
            }
            Model::Inline { type_parameters, inlined_type, .. } => {
                self.check_type(inlined_type, type_parameters, &context);
            }
        }
    }

    fn check_union_option(&mut self, union: &str, option: &TypeReference) {
        let invalid = |reason: &str| Violation::InvalidUnionOption {
            union: union.to_string(),
            option: option.name.clone(),
            reason: reason.to_string(),
        };

        if option.name == DISCRIMINATOR_FIELD {
            self.violations.push(Violation::ReservedDiscriminator {
                context: format!("union '{}' option", union),
            });
        }
        if option.is_type_parameter || !option.type_arguments.is_empty() {
            self.violations.push(invalid("options must be concrete, non-generic types"));
            return;
        }
        if option.is_nullable {
            self.violations.push(invalid("options cannot be nullable"));
        }

        match self.models.get(option.name.as_str()) {
            None => self.violations.push(Violation::UnknownType {
                context: format!("union '{}'", union),
                name: option.name.clone(),
            }),
            Some(Model::Struct { type_parameters, has_type_discriminator, .. }) => {
                if !type_parameters.is_empty() {
                    self.violations.push(invalid("generic structs cannot be union members"));
                }
                if !has_type_discriminator {
                    self.violations.push(invalid("union members must set hasTypeDiscriminator"));
                }
            }
            Some(other) => {
                let reason = format!("options must be structs, found {}", other.kind());
                self.violations.push(invalid(&reason));
            }
        }
    }

    fn check_method(&mut self, method: &Method) {
        if method.name.contains(METHOD_SEPARATOR) {
            self.violations.push(Violation::ReservedSeparator { endpoint: method.name.clone() });
        }
        let context = format!("method '{}'", method.name);
        self.check_unique(&context, method.parameters.iter().map(|p| p.name.as_str()));
        for param in &method.parameters {
            let ctx = format!("method '{}' parameter '{}'", method.name, param.name);
            self.check_type(&param.ty, &[], &ctx);
        }
        self.check_type(&method.return_type, &[], &format!("method '{}' return type", method.name));
    }

    fn check_event(&mut self, event: &EventEndpoint) {
        if event.name.contains(METHOD_SEPARATOR) {
            self.violations.push(Violation::ReservedSeparator { endpoint: event.name.clone() });
        }
        let context = format!("event '{}'", event.name);
        self.check_unique(&context, event.parameters.iter().map(|p| p.value.name.as_str()));

        if event.parameters.iter().filter(|p| p.is_target).count() > 1 {
            self.violations.push(Violation::MultipleTargets(event.name.clone()));
        }
        for param in &event.parameters {
            if param.is_target && param.is_dispatch {
                self.violations.push(Violation::DispatchTarget {
                    event: event.name.clone(),
                    parameter: param.value.name.clone(),
                });
            }
            let ctx = format!("event '{}' parameter '{}'", event.name, param.value.name);
            self.check_type(&param.value.ty, &[], &ctx);
        }
        self.check_type(&event.return_type, &[], &format!("event '{}' return type", event.name));
    }

    fn check_type(&mut self, ty: &TypeReference, scope: &[String], context: &str) {
        if let Err(error) = ty.check_shape() {
            self.violations.push(Violation::MalformedReference { context: context.to_string(), error });
            return;
        }
        self.check_type_impl(ty, scope, context);
    }

    fn check_type_impl(&mut self, ty: &TypeReference, scope: &[String], context: &str) {
        if ty.is_type_parameter {
            if !scope.contains(&ty.name) {
                self.violations.push(Violation::UndeclaredTypeParameter {
                    context: context.to_string(),
                    name: ty.name.clone(),
                });
            }
            return;
        }

        let found = ty.type_arguments.len();
        if let Some(tag) = ty.as_builtin() {
            let ok = match tag.arity() {
                Some(n) => n == found,
                None => found >= 1,
            };
            if !ok {
                let expected = tag.arity().map_or("at least 1".to_string(), |n| n.to_string());
                self.violations.push(Violation::ArityMismatch {
                    context: context.to_string(),
                    ty: ty.name.clone(),
                    expected,
                    found,
                });
            }
        } else {
            match self.models.get(ty.name.as_str()) {
                None => self.violations.push(Violation::UnknownType {
                    context: context.to_string(),
                    name: ty.name.clone(),
                }),
                Some(model) => {
                    let expected = model.type_parameters().len();
                    if expected != found {
                        self.violations.push(Violation::ArityMismatch {
                            context: context.to_string(),
                            ty: ty.name.clone(),
                            expected: expected.to_string(),
                            found,
                        });
                    }
                }
            }
        }

        for arg in &ty.type_arguments {
            self.check_type_impl(arg, scope, context);
        }
        if let Some(inner) = &ty.inlined_type {
            self.check_type_impl(inner, scope, context);
        }
    }
}
