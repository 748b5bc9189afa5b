use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use polyschema::Builtin;
use polyschema::Model;
use polyschema::Property;
use polyschema::Schema;
use polyschema::SchemaDefinition;
use polyschema::TypeReference;
use polywire::Codec;
use polywire::Error;
use polywire::Value;
use proptest::collection::btree_map;
use proptest::collection::vec;
use proptest::prelude::*;
use uuid::Uuid;

fn b(tag: Builtin) -> TypeReference {
    TypeReference::builtin(tag)
}

fn codec() -> Codec {
    let def = SchemaDefinition::new("Props")
        .model(Model::union_member("Circle", vec![Property::new("radius", b(Builtin::F64))]))
        .model(Model::union_member("Label", vec![
            Property::new("text", b(Builtin::String)),
            Property::new("color", TypeReference::new("Color").nullable()),
        ]))
        .model(Model::new_union("Shape", vec![TypeReference::new("Circle"), TypeReference::new("Label")]))
        .model(Model::new_enum("Color", &["Red", "Green", "Blue"]))
        .model(
            Model::new_struct("Layer", vec![
                Property::new("id", b(Builtin::Uuid)),
                Property::new("shapes", TypeReference::array(TypeReference::type_parameter("S"))),
                Property::new("tags", TypeReference::record(b(Builtin::String), TypeReference::new("Color"))),
            ])
            .with_type_parameters(&["S"]),
        );
    Codec::json(Arc::new(Schema::from_definition(def).unwrap()))
}

fn assert_roundtrip(codec: &Codec, ty: &TypeReference, value: Value) -> Result<(), TestCaseError> {
    let bytes = codec.encode(ty, &value).map_err(|e| TestCaseError::fail(e.to_string()))?;
    let decoded = codec.decode(ty, &bytes).map_err(|e| TestCaseError::fail(e.to_string()))?;
    prop_assert_eq!(decoded, value);
    Ok(())
}

// Floats with short decimal forms, so text parsing is exact.
fn short_f64() -> impl Strategy<Value = f64> {
    any::<i32>().prop_map(|n| n as f64 / 4.0)
}

fn color() -> impl Strategy<Value = Value> {
    prop_oneof![Just("Red"), Just("Green"), Just("Blue")].prop_map(Value::enumeration)
}

fn shape() -> impl Strategy<Value = Value> {
    prop_oneof![
        short_f64().prop_map(|r| Value::structure("Circle", vec![("radius", Value::F64(r))])),
        (any::<String>(), proptest::option::of(color())).prop_map(|(text, color)| {
            Value::structure("Label", vec![("text", Value::String(text)), ("color", color.unwrap_or(Value::Null))])
        }),
    ]
}

fn scalar() -> impl Strategy<Value = (TypeReference, Value)> {
    prop_oneof![
        any::<bool>().prop_map(|v| (b(Builtin::Bool), Value::Bool(v))),
        any::<i8>().prop_map(|v| (b(Builtin::I8), Value::I8(v))),
        any::<i16>().prop_map(|v| (b(Builtin::I16), Value::I16(v))),
        any::<i32>().prop_map(|v| (b(Builtin::I32), Value::I32(v))),
        any::<i64>().prop_map(|v| (b(Builtin::I64), Value::I64(v))),
        any::<i16>().prop_map(|v| (b(Builtin::F32), Value::F32(v as f32 / 8.0))),
        short_f64().prop_map(|v| (b(Builtin::F64), Value::F64(v))),
        any::<char>().prop_map(|v| (b(Builtin::Char), Value::Char(v))),
        any::<String>().prop_map(|v| (b(Builtin::String), Value::String(v))),
        vec(any::<u8>(), 0..16).prop_map(|v| (b(Builtin::I8Array), Value::Bytes(v))),
        vec(any::<u8>(), 0..16).prop_map(|v| (b(Builtin::UI8Array), Value::Bytes(v))),
        (0i64..4_000_000_000, 0u32..1_000_000_000).prop_map(|(secs, nanos)| {
            let date = DateTime::from_timestamp(secs, nanos).unwrap_or_default();
            (b(Builtin::Date), Value::Date(date))
        }),
        (any::<u32>(), 0u32..1_000_000_000)
            .prop_map(|(secs, nanos)| (b(Builtin::Duration), Value::Duration(Duration::new(secs as u64, nanos)))),
        any::<u128>().prop_map(|v| (b(Builtin::Uuid), Value::Uuid(Uuid::from_u128(v)))),
        Just((b(Builtin::Void), Value::Void)),
    ]
}

proptest! {
    #[test]
    fn prop_builtins_roundtrip((ty, value) in scalar()) {
        assert_roundtrip(&codec(), &ty, value)?;
    }

    #[test]
    fn prop_nullable_builtins_roundtrip((ty, value) in scalar(), absent in any::<bool>()) {
        let value = if absent { Value::Null } else { value };
        assert_roundtrip(&codec(), &ty.nullable(), value)?;
    }

    #[test]
    fn prop_tuples_roundtrip(items in vec(scalar(), 1..6)) {
        let (types, values): (Vec<_>, Vec<_>) = items.into_iter().unzip();
        assert_roundtrip(&codec(), &TypeReference::tuple(types.clone()), Value::Tuple(values.clone()))?;

        let codec = codec();
        let bytes = codec.encode_tuple(&types, &values).unwrap();
        prop_assert_eq!(codec.decode_tuple(&types, &bytes).unwrap(), values);
    }

    #[test]
    fn prop_generic_layers_roundtrip(
        id in any::<u128>(),
        shapes in vec(shape(), 0..6),
        tags in btree_map(any::<String>(), color(), 0..6),
    ) {
        let ty = TypeReference::new("Layer").with_arguments(vec![TypeReference::new("Shape")]);
        let value = Value::structure("Layer", vec![
            ("id", Value::Uuid(Uuid::from_u128(id))),
            ("shapes", Value::Array(shapes)),
            ("tags", Value::Record(tags.into_iter().map(|(k, v)| (Value::String(k), v)).collect())),
        ]);
        assert_roundtrip(&codec(), &ty, value)?;
    }

    #[test]
    fn prop_records_with_composite_keys_roundtrip(entries in vec((shape(), any::<i64>()), 0..6)) {
        let ty = TypeReference::record(TypeReference::new("Shape"), b(Builtin::I64));
        let value = Value::Record(entries.into_iter().map(|(k, v)| (k, Value::I64(v))).collect());
        assert_roundtrip(&codec(), &ty, value)?;
    }

    #[test]
    fn prop_unknown_discriminator_is_rejected(tag in "[A-Za-z]{1,12}") {
        prop_assume!(tag != "Circle" && tag != "Label");
        let body = format!(r#"{{"type":"{}","radius":1.0}}"#, tag);
        let result = codec().decode(&TypeReference::new("Shape"), body.as_bytes());
        prop_assert_eq!(result, Err(Error::UnknownVariant(tag)));
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in vec(any::<u8>(), 0..64)) {
        let codec = codec();
        let _ = codec.decode(&TypeReference::new("Shape"), &bytes);
        let _ = codec.decode_tuple(&[b(Builtin::I32), b(Builtin::String)], &bytes);
    }
}
