//! # Endpoints
//!
//! Methods (request/response) and event endpoints (subscribe/push).

use serde::Deserialize;
use serde::Serialize;

use crate::types::TypeReference;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeReference,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: TypeReference) -> Self {
        Self { name: name.into(), ty }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Method {
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: TypeReference,
}

impl Method {
    pub fn new(name: impl Into<String>, parameters: Vec<Parameter>, return_type: TypeReference) -> Self {
        Self { name: name.into(), parameters, return_type }
    }

    pub fn parameter_types(&self) -> Vec<TypeReference> {
        self.parameters.iter().map(|p| p.ty.clone()).collect()
    }
}

/// A parameter of an event endpoint.
///
/// - `is_dispatch`: supplied by the producing call on the server, never sent by clients.
/// - `is_target`: the value subscriptions are filtered by.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventParameter {
    #[serde(default)]
    pub is_dispatch: bool,
    #[serde(default)]
    pub is_target: bool,
    pub value: Parameter,
}

impl EventParameter {
    pub fn plain(name: impl Into<String>, ty: TypeReference) -> Self {
        Self { is_dispatch: false, is_target: false, value: Parameter::new(name, ty) }
    }

    pub fn dispatch(name: impl Into<String>, ty: TypeReference) -> Self {
        Self { is_dispatch: true, is_target: false, value: Parameter::new(name, ty) }
    }

    pub fn target(name: impl Into<String>, ty: TypeReference) -> Self {
        Self { is_dispatch: false, is_target: true, value: Parameter::new(name, ty) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEndpoint {
    pub name: String,
    pub parameters: Vec<EventParameter>,
    /// The payload type pushed to subscribers.
    pub return_type: TypeReference,
}

impl EventEndpoint {
    pub fn new(name: impl Into<String>, parameters: Vec<EventParameter>, return_type: TypeReference) -> Self {
        Self { name: name.into(), parameters, return_type }
    }

    /// Whether subscriptions to this event are filtered by target.
    ///
    /// This flag alone decides how an empty target string is read: with a target
    /// parameter it is an ordinary target value, without one every target is ignored.
    pub fn has_target(&self) -> bool {
        self.target_parameter().is_some()
    }

    pub fn target_parameter(&self) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.is_target).map(|p| &p.value)
    }

    /// Index of the target parameter within the subscribe payload.
    pub fn target_position(&self) -> Option<usize> {
        self.parameters.iter().filter(|p| !p.is_dispatch).position(|p| p.is_target)
    }

    /// Types of the parameters a client puts in its subscribe payload, in order.
    pub fn subscription_types(&self) -> Vec<TypeReference> {
        self.parameters.iter().filter(|p| !p.is_dispatch).map(|p| p.value.ty.clone()).collect()
    }

    pub fn dispatch_types(&self) -> Vec<TypeReference> {
        self.parameters.iter().filter(|p| p.is_dispatch).map(|p| p.value.ty.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Builtin;

    fn room_event() -> EventEndpoint {
        EventEndpoint::new(
            "room",
            vec![
                EventParameter::dispatch("message", TypeReference::builtin(Builtin::String)),
                EventParameter::target("roomId", TypeReference::builtin(Builtin::String)),
                EventParameter::plain("shout", TypeReference::builtin(Builtin::Bool)),
            ],
            TypeReference::builtin(Builtin::String),
        )
    }

    #[test]
    fn test_parameter_partition() {
        let e = room_event();
        assert!(e.has_target());
        assert_eq!(e.target_parameter().map(|p| p.name.as_str()), Some("roomId"));
        // The dispatch parameter before it is not part of the payload.
        assert_eq!(e.target_position(), Some(0));
        assert_eq!(
            e.subscription_types(),
            vec![TypeReference::builtin(Builtin::String), TypeReference::builtin(Builtin::Bool)]
        );
        assert_eq!(e.dispatch_types(), vec![TypeReference::builtin(Builtin::String)]);
    }

    #[test]
    fn test_event_without_target() {
        let e = EventEndpoint::new("tick", vec![], TypeReference::builtin(Builtin::I64));
        assert!(!e.has_target());
        assert_eq!(e.target_position(), None);
        assert!(e.subscription_types().is_empty());
    }

    #[test]
    fn test_event_parameter_defaults() {
        let json = r#"{"value":{"name":"x","type":{"name":"i32"}}}"#;
        let p: EventParameter = serde_json::from_str(json).unwrap();
        assert!(!p.is_dispatch && !p.is_target);
    }
}
