use proptest::prelude::*;

use crate::error::ErrorKind;
use crate::protocol::{Endianness, TypeCode};
use crate::signature::{parse, parse_one, OwnedSignature, TypeNode};
use crate::value::Value;

use super::{decode, decode_params, encode, encode_params, ReadBuf, WriteBuf};

macro_rules! assert_kind {
    ($result:expr, $expected:pat) => {{
        let kind = $result.unwrap_err();
        let kind = kind.kind();

        assert!(
            matches!(kind, $expected),
            "{kind:?} does not match {}",
            stringify!($expected)
        );
    }};
}

fn encode_one(signature: &str, value: &Value) -> Vec<u8> {
    let (node, rest) = parse_one(signature).unwrap();
    assert_eq!(rest, "");

    let mut buf = WriteBuf::new();
    encode(&mut buf, &node, value).unwrap();
    buf.into_vec()
}

fn decode_one(signature: &str, bytes: &[u8]) -> crate::error::Result<Value> {
    let (node, rest) = parse_one(signature).unwrap();
    assert_eq!(rest, "");

    let mut cur = ReadBuf::new(bytes, Endianness::LITTLE);
    decode(&mut cur, &node)
}

#[test]
fn encode_strings() {
    let mut buf = WriteBuf::new();
    buf.put_str("string").unwrap();
    buf.put_str("test2").unwrap();

    assert_eq!(
        buf.get(),
        b"\x06\x00\x00\x00string\x00\x00\x05\x00\x00\x00test2\x00"
    );
}

#[test]
fn encode_empty_string() {
    assert_eq!(
        encode_one("s", &Value::Str(String::new())),
        b"\x00\x00\x00\x00\x00"
    );
}

#[test]
fn interior_nul_rejected() {
    let mut buf = WriteBuf::new();
    assert_kind!(buf.put_str("a\0b"), ErrorKind::InteriorNul);
}

#[test]
fn byte_then_uint32_alignment() {
    let mut buf = WriteBuf::new();
    let nodes = parse("yu").unwrap();
    encode_params(&mut buf, &nodes, &[Value::Byte(1), Value::Uint32(2)]).unwrap();

    assert_eq!(buf.get(), b"\x01\x00\x00\x00\x02\x00\x00\x00");
}

#[test]
fn encode_array_of_string_uint32_structs() {
    let value = Value::Array(vec![
        Value::Struct(vec![Value::Str("test1".into()), Value::Uint32(1)]),
        Value::Struct(vec![Value::Str("test2".into()), Value::Uint32(2)]),
        Value::Struct(vec![Value::Str("test3".into()), Value::Uint32(3)]),
    ]);

    let bytes = encode_one("a(su)", &value);

    assert_eq!(
        bytes,
        b"\x30\x00\x00\x00\x00\x00\x00\x00\
          \x05\x00\x00\x00test1\x00\x00\x00\x01\x00\x00\x00\
          \x05\x00\x00\x00test2\x00\x00\x00\x02\x00\x00\x00\
          \x05\x00\x00\x00test3\x00\x00\x00\x03\x00\x00\x00"
    );
    assert_eq!(bytes.len(), 56);

    assert_eq!(decode_one("a(su)", &bytes).unwrap(), value);
}

#[test]
fn empty_array_of_bytes() {
    assert_eq!(
        encode_one("ay", &Value::Array(Vec::new())),
        b"\x00\x00\x00\x00"
    );
}

#[test]
fn empty_array_of_structs_keeps_element_padding() {
    let bytes = encode_one("a(ii)", &Value::Array(Vec::new()));
    assert_eq!(bytes, b"\x00\x00\x00\x00\x00\x00\x00\x00");

    assert_eq!(
        decode_one("a(ii)", &bytes).unwrap(),
        Value::Array(Vec::new())
    );
}

#[test]
fn decode_three_consecutive_variants() {
    let bytes = b"\x01s\x00\x00\x04\x00\x00\x00test\x00\x01y\x00\x03\x01u\x00\x04\x00\x00\x00";
    let nodes = parse("vvv").unwrap();
    let mut cur = ReadBuf::new(bytes, Endianness::LITTLE);
    let values = decode_params(&mut cur, &nodes).unwrap();

    assert_eq!(
        values,
        [
            Value::variant(OwnedSignature::new("s").unwrap(), Value::Str("test".into())),
            Value::variant(OwnedSignature::new("y").unwrap(), Value::Byte(3)),
            Value::variant(OwnedSignature::new("u").unwrap(), Value::Uint32(4)),
        ]
    );

    // The same values marshal back to the same bytes.
    let mut buf = WriteBuf::new();
    encode_params(&mut buf, &nodes, &values).unwrap();
    assert_eq!(buf.get(), bytes);
}

#[test]
fn variant_with_empty_signature_rejected() {
    assert_kind!(decode_one("v", b"\x00\x00"), ErrorKind::InvalidVariant);

    let value = Value::variant(OwnedSignature::empty(), Value::Uint32(1));
    let (node, _) = parse_one("v").unwrap();
    let mut buf = WriteBuf::new();
    assert_kind!(encode(&mut buf, &node, &value), ErrorKind::InvalidVariant);
}

#[test]
fn variant_with_two_types_rejected() {
    assert_kind!(
        decode_one("v", b"\x02uu\x00\x01\x00\x00\x00"),
        ErrorKind::Signature(..)
    );
}

#[test]
fn invalid_boolean_rejected() {
    assert_kind!(
        decode_one("b", b"\x02\x00\x00\x00"),
        ErrorKind::InvalidBoolean(2)
    );
}

#[test]
fn truncated_primitive() {
    assert_kind!(decode_one("u", b"\x01\x00"), ErrorKind::Truncated { .. });
}

#[test]
fn truncated_string() {
    assert_kind!(
        decode_one("s", b"\x10\x00\x00\x00abc\x00"),
        ErrorKind::Truncated { .. }
    );
}

#[test]
fn array_elements_overshoot_declared_end() {
    // Declared length of 6 cannot hold a whole number of uint32 elements.
    let bytes = b"\x06\x00\x00\x00\x01\x00\x00\x00\x02\x00\x00\x00";
    assert_kind!(decode_one("au", bytes), ErrorKind::MalformedArray { .. });
}

#[test]
fn array_length_past_buffer_end() {
    let bytes = b"\xff\x00\x00\x00\x01\x00\x00\x00";
    assert_kind!(decode_one("au", bytes), ErrorKind::Truncated { .. });
}

#[test]
fn unix_fd_unsupported() {
    assert_kind!(
        decode_one("h", b"\x01\x00\x00\x00"),
        ErrorKind::UnsupportedType(b'h')
    );
}

#[test]
fn type_mismatch_reports_both_sides() {
    let (node, _) = parse_one("u").unwrap();
    let mut buf = WriteBuf::new();

    assert_kind!(
        encode(&mut buf, &node, &Value::Str("nope".into())),
        ErrorKind::TypeMismatch { .. }
    );
}

#[test]
fn param_count_mismatch() {
    let nodes = parse("uu").unwrap();
    let mut buf = WriteBuf::new();

    assert_kind!(
        encode_params(&mut buf, &nodes, &[Value::Uint32(1)]),
        ErrorKind::ParamCountMismatch {
            expected: 2,
            found: 1
        }
    );
}

#[test]
fn signature_value_length_limits() {
    let max = "i".repeat(255);
    let bytes = encode_one("g", &Value::Signature(max.clone()));
    assert_eq!(bytes.len(), 257);
    assert_eq!(decode_one("g", &bytes).unwrap(), Value::Signature(max));

    let over = "i".repeat(256);
    let (node, _) = parse_one("g").unwrap();
    let mut buf = WriteBuf::new();
    assert!(encode(&mut buf, &node, &Value::Signature(over)).is_err());
}

#[test]
fn big_endian_reads() {
    let mut cur = ReadBuf::new(b"\x00\x00\x00\x2a", Endianness::BIG);
    assert_eq!(cur.take_u32().unwrap(), 42);

    let bytes = b"\x00\x00\x00\x03abc\x00";
    let (node, _) = parse_one("s").unwrap();
    let mut cur = ReadBuf::new(bytes, Endianness::BIG);
    assert_eq!(decode(&mut cur, &node).unwrap(), Value::Str("abc".into()));
}

#[test]
fn nested_containers_round_trip() {
    let cases = [
        (
            "a{sv}",
            Value::Dict(vec![
                (
                    Value::Str("a".into()),
                    Value::variant(OwnedSignature::new("u").unwrap(), Value::Uint32(1)),
                ),
                (
                    Value::Str("b".into()),
                    Value::variant(OwnedSignature::new("ai").unwrap(),
                        Value::Array(vec![Value::Int32(-1), Value::Int32(2)])),
                ),
            ]),
        ),
        (
            "aa{ui}",
            Value::Array(vec![
                Value::Dict(vec![(Value::Uint32(1), Value::Int32(-1))]),
                Value::Dict(Vec::new()),
            ]),
        ),
        (
            "(i(sd)a{yb})",
            Value::Struct(vec![
                Value::Int32(7),
                Value::Struct(vec![Value::Str("x".into()), Value::Double(1.5)]),
                Value::Dict(vec![(Value::Byte(1), Value::Bool(true))]),
            ]),
        ),
        (
            "a(aya{s(ii)})",
            Value::Array(vec![Value::Struct(vec![
                Value::Array(vec![Value::Byte(1), Value::Byte(2)]),
                Value::Dict(vec![(
                    Value::Str("k".into()),
                    Value::Struct(vec![Value::Int32(1), Value::Int32(2)]),
                )]),
            ])]),
        ),
    ];

    for (signature, value) in cases {
        let bytes = encode_one(signature, &value);
        assert_eq!(decode_one(signature, &bytes).unwrap(), value, "{signature}");
    }
}

#[test]
fn primitive_round_trips() {
    let cases = [
        ("y", Value::Byte(0xff)),
        ("b", Value::Bool(true)),
        ("b", Value::Bool(false)),
        ("n", Value::Int16(-2)),
        ("q", Value::Uint16(0xffee)),
        ("i", Value::Int32(-100)),
        ("u", Value::Uint32(0xdeadbeef)),
        ("x", Value::Int64(i64::MIN)),
        ("t", Value::Uint64(u64::MAX)),
        ("d", Value::Double(3.5)),
        ("s", Value::Str("Hello World!".into())),
        ("o", Value::ObjectPath("/org/freedesktop/DBus".into())),
        ("g", Value::Signature("a{sv}".into())),
    ];

    for (signature, value) in cases {
        let bytes = encode_one(signature, &value);
        assert_eq!(decode_one(signature, &bytes).unwrap(), value, "{signature}");
    }
}

#[test]
fn values_start_on_their_alignment() {
    let cases = vec![
        ("n", Value::Int16(1), 2),
        ("u", Value::Uint32(1), 4),
        ("t", Value::Uint64(1), 8),
        ("d", Value::Double(1.0), 8),
        ("s", Value::Str("x".into()), 4),
        ("(yy)", Value::Struct(vec![Value::Byte(1), Value::Byte(2)]), 8),
        ("ay", Value::Array(vec![Value::Byte(1)]), 4),
    ];

    for prefix in 0..8usize {
        for (signature, value, align) in &cases {
            let (node, _) = parse_one(signature).unwrap();

            let mut buf = WriteBuf::new();

            for _ in 0..prefix {
                buf.put_u8(0xaa);
            }

            encode(&mut buf, &node, value).unwrap();

            // The payload begins at the next multiple of the alignment,
            // and everything in between is zero padding.
            let start = (prefix + align - 1) & !(align - 1);
            assert!(buf.len() > start, "{signature} at prefix {prefix}");
            assert!(
                buf.get()[prefix..start].iter().all(|&byte| byte == 0),
                "{signature} at prefix {prefix}"
            );
        }
    }
}

fn node_strategy() -> impl Strategy<Value = TypeNode> {
    let basic = prop::sample::select(vec![
        b'y', b'b', b'n', b'q', b'i', b'u', b'x', b't', b'd', b's', b'o', b'g', b'v',
    ])
    .prop_map(|code| TypeNode::Basic(TypeCode(code)));

    basic.prop_recursive(3, 24, 4, |inner| {
        let key = prop::sample::select(vec![b'y', b'q', b'u', b's'])
            .prop_map(TypeCode);

        prop_oneof![
            inner.clone().prop_map(|n| TypeNode::Array(Box::new(n))),
            prop::collection::vec(inner.clone(), 1..4).prop_map(TypeNode::Struct),
            (key, inner).prop_map(|(k, v)| TypeNode::Dict(k, Box::new(v))),
        ]
    })
}

/// Build a deterministic well-typed value for a node, varying leaves by
/// `seed` so that different shapes exercise different payloads.
fn sample_value(node: &TypeNode, seed: u64) -> Value {
    match node {
        TypeNode::Basic(code) => match *code {
            TypeCode::BYTE => Value::Byte(seed as u8),
            TypeCode::BOOLEAN => Value::Bool(seed % 2 == 0),
            TypeCode::INT16 => Value::Int16(seed as i16),
            TypeCode::UINT16 => Value::Uint16(seed as u16),
            TypeCode::INT32 => Value::Int32(seed as i32),
            TypeCode::UINT32 => Value::Uint32(seed as u32),
            TypeCode::INT64 => Value::Int64(seed as i64),
            TypeCode::UINT64 => Value::Uint64(seed),
            TypeCode::DOUBLE => Value::Double(seed as f64 * 0.5),
            TypeCode::STRING => Value::Str(format!("s{seed}")),
            TypeCode::OBJECT_PATH => Value::ObjectPath(format!("/n{seed}")),
            TypeCode::SIGNATURE => Value::Signature("a{sv}".into()),
            _ => Value::variant(
                OwnedSignature::new("u").unwrap(),
                Value::Uint32(seed as u32),
            ),
        },
        TypeNode::Array(element) => Value::Array(
            (0..seed % 3)
                .map(|i| sample_value(element, seed + i))
                .collect(),
        ),
        TypeNode::Struct(fields) => Value::Struct(
            fields
                .iter()
                .enumerate()
                .map(|(i, field)| sample_value(field, seed + i as u64))
                .collect(),
        ),
        TypeNode::Dict(key, element) => Value::Dict(
            (0..seed % 3)
                .map(|i| {
                    (
                        sample_value(&TypeNode::Basic(*key), seed + i),
                        sample_value(element, seed + i),
                    )
                })
                .collect(),
        ),
    }
}

proptest! {
    #[test]
    fn prop_signature_render_parse(node in node_strategy()) {
        let rendered = node.to_string();
        let (parsed, rest) = parse_one(&rendered).unwrap();
        prop_assert_eq!(rest, "");
        prop_assert_eq!(parsed, node);
    }

    #[test]
    fn prop_value_round_trip(node in node_strategy(), seed in 0u64..64) {
        let value = sample_value(&node, seed);

        let mut buf = WriteBuf::new();
        encode(&mut buf, &node, &value).unwrap();

        let mut cur = ReadBuf::new(buf.get(), Endianness::LITTLE);
        let decoded = decode(&mut cur, &node).unwrap();

        prop_assert_eq!(decoded, value);
        prop_assert!(cur.is_empty());
    }
}
