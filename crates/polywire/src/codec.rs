//! # Codec
//!
//! The translation layer between `Value` and a Format's bytes, directed entirely by the
//! schema's `TypeReference`s and the derived `SerialDescriptor`s.
//!
//! ## Invariants
//! - **Recursion Safety**: All recursive operations are bounded by `MAX_RECURSION_DEPTH`.
//! - **Type Strictness**: Decoding verifies every tree node against the expected type;
//!   no value reaches a handler without matching its declaration.
//! - **Discriminator First**: union values are written with the discriminator as their
//!   first key, so streaming readers can dispatch before seeing the body.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::SecondsFormat;
use chrono::Utc;
use polyschema::Builtin;
use polyschema::Schema;
use polyschema::TypeReference;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value as Tree;
use uuid::Uuid;

use crate::descriptor::Descriptors;
use crate::descriptor::SerialDescriptor;
use crate::error::Error;
use crate::error::Result;
use crate::format::Format;
use crate::format::JsonFormat;
use crate::value::Value;

/// The maximum nesting depth for Values before failing.
pub const MAX_RECURSION_DEPTH: usize = 64;

/// How a record key type is laid out in an object-form record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum KeyForm {
    /// Written verbatim as the object key.
    Text,
    /// A number or bool, printed into the object key.
    Scalar,
    /// Not representable as an object key; the record becomes a flat `[k, v, ...]` array.
    Composite,
}

/// Schema-bound serializer. Cheap to clone.
#[derive(Clone)]
pub struct Codec {
    schema: Arc<Schema>,
    descriptors: Arc<Descriptors>,
    format: Arc<dyn Format>,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec")
            .field("schema", &self.schema.name())
            .field("models", &self.descriptors.len())
            .field("format", &self.format.name())
            .finish()
    }
}

impl Codec {
    pub fn new(schema: Arc<Schema>, format: Arc<dyn Format>) -> Self {
        let descriptors = Arc::new(Descriptors::derive(&schema));
        Self { schema, descriptors, format }
    }

    pub fn json(schema: Arc<Schema>) -> Self {
        Self::new(schema, Arc::new(JsonFormat))
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn descriptors(&self) -> &Descriptors {
        &self.descriptors
    }

    pub fn format(&self) -> &dyn Format {
        self.format.as_ref()
    }

    /// Encodes a single value of type `ty`.
    ///
    /// # Errors
    /// Returns `Error::RecursionLimitExceeded` if the value is too deeply nested.
    pub fn encode(&self, ty: &TypeReference, value: &Value) -> Result<Vec<u8>> {
        let tree = self.to_tree(ty, value)?;
        self.format.write(&tree)
    }

    pub fn decode(&self, ty: &TypeReference, bytes: &[u8]) -> Result<Value> {
        let tree = self.format.read(bytes)?;
        self.from_tree(ty, &tree)
    }

    /// Encodes a fixed-arity positional list, as used for argument lists.
    pub fn encode_tuple(&self, types: &[TypeReference], values: &[Value]) -> Result<Vec<u8>> {
        check_arity(types.len(), values.len())?;
        let items = types
            .iter()
            .zip(values)
            .map(|(ty, value)| self.encode_impl(ty, value, 1))
            .collect::<Result<Vec<_>>>()?;
        self.format.write(&Tree::Array(items))
    }

    /// Decodes a list of values given a list of expected types.
    pub fn decode_tuple(&self, types: &[TypeReference], bytes: &[u8]) -> Result<Vec<Value>> {
        let tree = self.format.read(bytes)?;
        let Tree::Array(items) = &tree else {
            return Err(Error::ProtocolViolation(format!("expected a positional list, found {}", tree_kind(&tree))));
        };
        check_arity(types.len(), items.len())?;
        types
            .iter()
            .zip(items)
            .map(|(ty, item)| self.decode_impl(ty, item, 1))
            .collect()
    }

    /// The text a subscription is filtered by when `value` is its target argument.
    ///
    /// Values that map to text (strings, chars, enums, uuids, dates) are used as they are;
    /// anything else is the format's encoding of the value.
    pub fn target_text(&self, ty: &TypeReference, value: &Value) -> Result<String> {
        match self.to_tree(ty, value)? {
            Tree::String(text) => Ok(text),
            tree => {
                let bytes = self.format.write(&tree)?;
                String::from_utf8(bytes).map_err(|e| Error::Format(format!("target is not text: {}", e)))
            }
        }
    }

    pub fn to_tree(&self, ty: &TypeReference, value: &Value) -> Result<Tree> {
        self.encode_impl(ty, value, 0)
    }

    pub fn from_tree(&self, ty: &TypeReference, tree: &Tree) -> Result<Value> {
        self.decode_impl(ty, tree, 0)
    }

    fn descriptor(&self, name: &str) -> Result<&SerialDescriptor> {
        self.descriptors.get(name).ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    fn is_inline(&self, ty: &TypeReference) -> bool {
        ty.as_builtin().is_none() && matches!(self.descriptors.get(&ty.name), Some(SerialDescriptor::Inline { .. }))
    }

    // ------------------------------------------------------------------------
    //  ENCODING
    // ------------------------------------------------------------------------

    fn encode_impl(&self, ty: &TypeReference, value: &Value, depth: usize) -> Result<Tree> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }
        if ty.is_type_parameter {
            return Err(Error::UnboundTypeParameter(ty.name.clone()));
        }
        // A non-nullable inline may still wrap a nullable type.
        if value.is_null() && (ty.is_nullable || !self.is_inline(ty)) {
            return if ty.is_nullable { Ok(Tree::Null) } else { Err(mismatch(ty, "null")) };
        }

        match ty.as_builtin() {
            Some(tag) => self.encode_builtin(tag, ty, value, depth),
            None => self.encode_model(ty, value, depth),
        }
    }

    fn encode_builtin(&self, tag: Builtin, ty: &TypeReference, value: &Value, depth: usize) -> Result<Tree> {
        let wrong = || mismatch(ty, value.kind());

        let tree = match (tag, value) {
            (Builtin::Void, Value::Void) => Tree::Object(Map::new()),
            (Builtin::Bool, Value::Bool(b)) => Tree::Bool(*b),
            (Builtin::I8, v) => Tree::from(narrow::<i8>(v).ok_or_else(wrong)?),
            (Builtin::I16, v) => Tree::from(narrow::<i16>(v).ok_or_else(wrong)?),
            (Builtin::I32, v) => Tree::from(narrow::<i32>(v).ok_or_else(wrong)?),
            (Builtin::I64, v) => Tree::from(v.as_i64().ok_or_else(wrong)?),
            (Builtin::F32, Value::F32(v)) => float(ty, *v as f64)?,
            (Builtin::F64, Value::F64(v)) => float(ty, *v)?,
            (Builtin::F64, Value::F32(v)) => float(ty, *v as f64)?,
            (Builtin::Char, Value::Char(c)) => Tree::String(c.to_string()),
            (Builtin::String, Value::String(s)) => Tree::String(s.clone()),
            (Builtin::I8Array, Value::Bytes(bytes)) => {
                Tree::Array(bytes.iter().map(|b| Tree::from(*b as i8)).collect())
            }
            (Builtin::UI8Array, Value::Bytes(bytes)) => Tree::Array(bytes.iter().map(|b| Tree::from(*b)).collect()),
            (Builtin::Array, Value::Array(items)) => {
                let element = argument(ty, 0)?;
                Tree::Array(
                    items
                        .iter()
                        .map(|item| self.encode_impl(element, item, depth + 1))
                        .collect::<Result<_>>()?,
                )
            }
            (Builtin::Record, Value::Record(entries)) => self.encode_record(ty, entries, depth)?,
            (Builtin::Tuple, Value::Tuple(items)) => {
                if items.len() != ty.type_arguments.len() {
                    return Err(mismatch(ty, format!("tuple of {}", items.len())));
                }
                Tree::Array(
                    ty.type_arguments
                        .iter()
                        .zip(items)
                        .map(|(element, item)| self.encode_impl(element, item, depth + 1))
                        .collect::<Result<_>>()?,
                )
            }
            (Builtin::Date, Value::Date(date)) => Tree::String(date.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            (Builtin::Duration, Value::Duration(duration)) => Tree::String(format_duration(*duration)),
            (Builtin::Uuid, Value::Uuid(id)) => Tree::String(id.hyphenated().to_string()),
            _ => return Err(wrong()),
        };
        Ok(tree)
    }

    fn encode_record(&self, ty: &TypeReference, entries: &[(Value, Value)], depth: usize) -> Result<Tree> {
        let key_ty = argument(ty, 0)?;
        let value_ty = argument(ty, 1)?;

        if self.key_form(key_ty, depth) == KeyForm::Composite {
            let mut flat = Vec::with_capacity(entries.len() * 2);
            for (key, value) in entries {
                flat.push(self.encode_impl(key_ty, key, depth + 1)?);
                flat.push(self.encode_impl(value_ty, value, depth + 1)?);
            }
            return Ok(Tree::Array(flat));
        }

        let mut map = Map::with_capacity(entries.len());
        for (key, value) in entries {
            let key = match self.encode_impl(key_ty, key, depth + 1)? {
                Tree::String(text) => text,
                scalar => scalar.to_string(),
            };
            map.insert(key, self.encode_impl(value_ty, value, depth + 1)?);
        }
        Ok(Tree::Object(map))
    }

    fn encode_model(&self, ty: &TypeReference, value: &Value, depth: usize) -> Result<Tree> {
        let descriptor = self.descriptor(&ty.name)?;
        match descriptor {
            SerialDescriptor::Struct { .. } => self.encode_struct(descriptor, ty, value, None, depth),
            SerialDescriptor::Union { discriminator, .. } => {
                let Value::Struct { name: option, .. } = value else {
                    return Err(mismatch(ty, value.kind()));
                };
                let tag = descriptor
                    .discriminator_for(option)
                    .ok_or_else(|| Error::UnknownVariant(option.clone()))?;
                let option_ty = TypeReference::new(option.clone());
                self.encode_struct(self.descriptor(option)?, &option_ty, value, Some((*discriminator, tag)), depth)
            }
            SerialDescriptor::Enum { names, .. } => match value {
                Value::Enum(option) if names.contains(option) => Ok(Tree::String(option.clone())),
                Value::Enum(option) => Err(Error::UnknownVariant(option.clone())),
                _ => Err(mismatch(ty, value.kind())),
            },
            SerialDescriptor::Inline { type_parameters, inner, .. } => {
                self.encode_impl(&resolve_inline(ty, type_parameters, inner), value, depth + 1)
            }
        }
    }

    fn encode_struct(
        &self,
        descriptor: &SerialDescriptor,
        ty: &TypeReference,
        value: &Value,
        tag: Option<(&str, &str)>,
        depth: usize,
    ) -> Result<Tree> {
        let SerialDescriptor::Struct { name, type_parameters, elements, .. } = descriptor else {
            return Err(Error::UnknownType(descriptor.name().to_string()));
        };
        let Value::Struct { name: value_name, fields } = value else {
            return Err(mismatch(ty, value.kind()));
        };
        if value_name != name {
            return Err(mismatch(ty, value_name.clone()));
        }
        if let Some((field, _)) = fields.iter().find(|(f, _)| !elements.iter().any(|e| &e.name == f)) {
            return Err(Error::UnexpectedField { model: name.clone(), field: field.clone() });
        }

        let bindings = bind(type_parameters, &ty.type_arguments);
        let mut map = Map::with_capacity(elements.len() + 1);
        if let Some((key, tag)) = tag {
            map.insert(key.to_string(), Tree::String(tag.to_string()));
        }
        for element in elements {
            let element_ty = element.ty.substitute(&bindings);
            let tree = match fields.iter().find(|(f, _)| *f == element.name) {
                Some((_, field)) => self.encode_impl(&element_ty, field, depth + 1)?,
                None if element_ty.is_nullable => Tree::Null,
                None => return Err(Error::MissingField(element.name.clone())),
            };
            map.insert(element.name.clone(), tree);
        }
        Ok(Tree::Object(map))
    }

    // ------------------------------------------------------------------------
    //  DECODING
    // ------------------------------------------------------------------------

    fn decode_impl(&self, ty: &TypeReference, tree: &Tree, depth: usize) -> Result<Value> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimitExceeded);
        }
        if ty.is_type_parameter {
            return Err(Error::UnboundTypeParameter(ty.name.clone()));
        }
        if tree.is_null() && (ty.is_nullable || !self.is_inline(ty)) {
            if ty.is_nullable {
                return Ok(Value::Null);
            }
            if ty.is_void() {
                return Ok(Value::Void);
            }
            return Err(mismatch(ty, "null"));
        }

        match ty.as_builtin() {
            Some(tag) => self.decode_builtin(tag, ty, tree, depth),
            None => self.decode_model(ty, tree, depth),
        }
    }

    fn decode_builtin(&self, tag: Builtin, ty: &TypeReference, tree: &Tree, depth: usize) -> Result<Value> {
        let wrong = || mismatch(ty, tree_kind(tree));

        let value = match tag {
            Builtin::Void => match tree {
                Tree::Object(_) => Value::Void,
                _ => return Err(wrong()),
            },
            Builtin::Bool => Value::Bool(tree.as_bool().ok_or_else(wrong)?),
            Builtin::I8 => Value::I8(integer(tree).ok_or_else(wrong)?),
            Builtin::I16 => Value::I16(integer(tree).ok_or_else(wrong)?),
            Builtin::I32 => Value::I32(integer(tree).ok_or_else(wrong)?),
            Builtin::I64 => Value::I64(tree.as_i64().ok_or_else(wrong)?),
            Builtin::F32 => Value::F32(tree.as_f64().ok_or_else(wrong)? as f32),
            Builtin::F64 => Value::F64(tree.as_f64().ok_or_else(wrong)?),
            Builtin::Char => {
                let text = tree.as_str().ok_or_else(wrong)?;
                let mut chars = text.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Value::Char(c),
                    _ => return Err(mismatch(ty, format!("string of {} chars", text.chars().count()))),
                }
            }
            Builtin::String => Value::String(tree.as_str().ok_or_else(wrong)?.to_string()),
            Builtin::I8Array => {
                Value::Bytes(byte_array(tree, |n| i8::try_from(n).ok().map(|b| b as u8)).ok_or_else(wrong)?)
            }
            Builtin::UI8Array => Value::Bytes(byte_array(tree, |n| u8::try_from(n).ok()).ok_or_else(wrong)?),
            Builtin::Array => {
                let element = argument(ty, 0)?;
                let Tree::Array(items) = tree else {
                    return Err(wrong());
                };
                Value::Array(
                    items
                        .iter()
                        .map(|item| self.decode_impl(element, item, depth + 1))
                        .collect::<Result<_>>()?,
                )
            }
            Builtin::Record => self.decode_record(ty, tree, depth)?,
            Builtin::Tuple => {
                let Tree::Array(items) = tree else {
                    return Err(wrong());
                };
                if items.len() != ty.type_arguments.len() {
                    return Err(mismatch(ty, format!("array of {}", items.len())));
                }
                Value::Tuple(
                    ty.type_arguments
                        .iter()
                        .zip(items)
                        .map(|(element, item)| self.decode_impl(element, item, depth + 1))
                        .collect::<Result<_>>()?,
                )
            }
            Builtin::Date => {
                let text = tree.as_str().ok_or_else(wrong)?;
                let date = DateTime::parse_from_rfc3339(text).map_err(|e| mismatch(ty, format!("\"{}\" ({})", text, e)))?;
                Value::Date(date.with_timezone(&Utc))
            }
            Builtin::Duration => {
                let text = tree.as_str().ok_or_else(wrong)?;
                Value::Duration(parse_duration(text).ok_or_else(|| mismatch(ty, format!("\"{}\"", text)))?)
            }
            Builtin::Uuid => {
                let text = tree.as_str().ok_or_else(wrong)?;
                Value::Uuid(Uuid::parse_str(text).map_err(|e| mismatch(ty, format!("\"{}\" ({})", text, e)))?)
            }
        };
        Ok(value)
    }

    fn decode_record(&self, ty: &TypeReference, tree: &Tree, depth: usize) -> Result<Value> {
        let key_ty = argument(ty, 0)?;
        let value_ty = argument(ty, 1)?;

        let mut entries = Vec::new();
        match (self.key_form(key_ty, depth), tree) {
            (KeyForm::Composite, Tree::Array(flat)) => {
                if flat.len() % 2 != 0 {
                    return Err(mismatch(ty, "odd-length array"));
                }
                for pair in flat.chunks_exact(2) {
                    entries.push((
                        self.decode_impl(key_ty, &pair[0], depth + 1)?,
                        self.decode_impl(value_ty, &pair[1], depth + 1)?,
                    ));
                }
            }
            (form @ (KeyForm::Text | KeyForm::Scalar), Tree::Object(map)) => {
                for (key, value) in map {
                    let key_tree = if form == KeyForm::Text {
                        Tree::String(key.clone())
                    } else {
                        serde_json::from_str(key).map_err(|_| mismatch(key_ty, format!("key \"{}\"", key)))?
                    };
                    entries.push((
                        self.decode_impl(key_ty, &key_tree, depth + 1)?,
                        self.decode_impl(value_ty, value, depth + 1)?,
                    ));
                }
            }
            _ => return Err(mismatch(ty, tree_kind(tree))),
        }
        Ok(Value::Record(entries))
    }

    fn decode_model(&self, ty: &TypeReference, tree: &Tree, depth: usize) -> Result<Value> {
        let descriptor = self.descriptor(&ty.name)?;
        match descriptor {
            SerialDescriptor::Struct { .. } => self.decode_struct(descriptor, ty, tree, depth),
            SerialDescriptor::Union { discriminator, .. } => {
                let Tree::Object(map) = tree else {
                    return Err(mismatch(ty, tree_kind(tree)));
                };
                let tag = match map.get(*discriminator) {
                    Some(Tree::String(tag)) => tag,
                    Some(other) => return Err(mismatch(format!("{} discriminator", ty), tree_kind(other))),
                    None => return Err(Error::MissingField(discriminator.to_string())),
                };
                let option = descriptor.option_for(tag).ok_or_else(|| Error::UnknownVariant(tag.clone()))?;
                self.decode_struct(self.descriptor(option)?, &TypeReference::new(option), tree, depth)
            }
            SerialDescriptor::Enum { names, .. } => {
                let option = tree.as_str().ok_or_else(|| mismatch(ty, tree_kind(tree)))?;
                if names.iter().any(|n| n == option) {
                    Ok(Value::Enum(option.to_string()))
                } else {
                    Err(Error::UnknownVariant(option.to_string()))
                }
            }
            SerialDescriptor::Inline { type_parameters, inner, .. } => {
                self.decode_impl(&resolve_inline(ty, type_parameters, inner), tree, depth + 1)
            }
        }
    }

    fn decode_struct(&self, descriptor: &SerialDescriptor, ty: &TypeReference, tree: &Tree, depth: usize) -> Result<Value> {
        let SerialDescriptor::Struct { name, type_parameters, elements, .. } = descriptor else {
            return Err(Error::UnknownType(descriptor.name().to_string()));
        };
        let Tree::Object(map) = tree else {
            return Err(mismatch(ty, tree_kind(tree)));
        };

        let bindings = bind(type_parameters, &ty.type_arguments);
        let mut fields = Vec::with_capacity(elements.len());
        for element in elements {
            let element_ty = element.ty.substitute(&bindings);
            let value = match map.get(&element.name) {
                Some(field) => self.decode_impl(&element_ty, field, depth + 1)?,
                None if element_ty.is_nullable => Value::Null,
                None => return Err(Error::MissingField(element.name.clone())),
            };
            fields.push((element.name.clone(), value));
        }
        Ok(Value::Struct { name: name.clone(), fields })
    }

    fn key_form(&self, ty: &TypeReference, depth: usize) -> KeyForm {
        if ty.is_nullable || ty.is_type_parameter || depth > MAX_RECURSION_DEPTH {
            return KeyForm::Composite;
        }
        match ty.as_builtin() {
            Some(Builtin::String | Builtin::Char | Builtin::Date | Builtin::Uuid) => KeyForm::Text,
            Some(Builtin::Bool | Builtin::I8 | Builtin::I16 | Builtin::I32 | Builtin::I64 | Builtin::F32 | Builtin::F64) => {
                KeyForm::Scalar
            }
            Some(_) => KeyForm::Composite,
            None => match self.descriptors.get(&ty.name) {
                Some(SerialDescriptor::Enum { .. }) => KeyForm::Text,
                Some(SerialDescriptor::Inline { type_parameters, inner, .. }) => {
                    self.key_form(&resolve_inline(ty, type_parameters, inner), depth + 1)
                }
                _ => KeyForm::Composite,
            },
        }
    }
}

// ============================================================================
//  HELPERS
// ============================================================================

fn mismatch(expected: impl fmt::Display, found: impl Into<String>) -> Error {
    Error::TypeMismatch { expected: expected.to_string(), found: found.into() }
}

fn check_arity(expected: usize, found: usize) -> Result<()> {
    if expected != found {
        return Err(Error::ProtocolViolation(format!("expected {} value(s), found {}", expected, found)));
    }
    Ok(())
}

fn argument(ty: &TypeReference, index: usize) -> Result<&TypeReference> {
    ty.type_arguments
        .get(index)
        .ok_or_else(|| Error::ProtocolViolation(format!("{} is missing type argument {}", ty, index)))
}

fn bind(parameters: &[String], arguments: &[TypeReference]) -> Vec<(String, TypeReference)> {
    parameters.iter().cloned().zip(arguments.iter().cloned()).collect()
}

fn resolve_inline(ty: &TypeReference, type_parameters: &[String], inner: &TypeReference) -> TypeReference {
    let mut resolved = inner.substitute(&bind(type_parameters, &ty.type_arguments));
    resolved.is_nullable |= ty.is_nullable;
    resolved
}

fn narrow<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    value.as_i64().and_then(|n| T::try_from(n).ok())
}

fn integer<T: TryFrom<i64>>(tree: &Tree) -> Option<T> {
    tree.as_i64().and_then(|n| T::try_from(n).ok())
}

fn float(ty: &TypeReference, v: f64) -> Result<Tree> {
    Number::from_f64(v).map(Tree::Number).ok_or_else(|| mismatch(ty, "non-finite float"))
}

fn byte_array(tree: &Tree, narrow: impl Fn(i64) -> Option<u8>) -> Option<Vec<u8>> {
    tree.as_array()?.iter().map(|n| n.as_i64().and_then(&narrow)).collect()
}

fn tree_kind(tree: &Tree) -> &'static str {
    match tree {
        Tree::Null => "null",
        Tree::Bool(_) => "bool",
        Tree::Number(_) => "number",
        Tree::String(_) => "string",
        Tree::Array(_) => "array",
        Tree::Object(_) => "object",
    }
}

/// Renders a duration as ISO-8601 `PT<seconds>[.<fraction>]S`.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        return format!("PT{}S", duration.as_secs());
    }
    let fraction = format!("{:09}", nanos);
    format!("PT{}.{}S", duration.as_secs(), fraction.trim_end_matches('0'))
}

/// Parses the time-only subset of ISO-8601 durations: `PT[nH][nM][n[.f]S]`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let mut rest = text.strip_prefix("PT")?;
    if rest.is_empty() {
        return None;
    }

    let mut total = Duration::ZERO;
    for (unit, scale) in [('H', 3600u64), ('M', 60)] {
        if let Some((amount, tail)) = rest.split_once(unit) {
            let seconds = amount.parse::<u64>().ok()?.checked_mul(scale)?;
            total = total.checked_add(Duration::from_secs(seconds))?;
            rest = tail;
        }
    }

    if !rest.is_empty() {
        let seconds = rest.strip_suffix('S')?;
        let (whole, fraction) = seconds.split_once('.').unwrap_or((seconds, ""));
        if !whole.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        total = total.checked_add(Duration::from_secs(whole.parse().ok()?))?;
        if !fraction.is_empty() {
            if fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let nanos: u64 = format!("{:0<9}", fraction).parse().ok()?;
            total = total.checked_add(Duration::from_nanos(nanos))?;
        }
    }
    Some(total)
}
