use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{TypeCode, MAX_ARRAY_LENGTH};
use crate::signature::{self, TypeNode};
use crate::value::Value;

use super::WriteBuf;

/// Marshal one value against its type, appending to `buf`.
///
/// The value arm must match the type exactly; a mismatch is reported
/// without modifying the signature-driven layout guarantees of previously
/// written values.
pub fn encode(buf: &mut WriteBuf, node: &TypeNode, value: &Value) -> Result<()> {
    match node {
        TypeNode::Basic(code) => encode_basic(buf, *code, value, node),
        TypeNode::Array(element) => {
            let Value::Array(values) = value else {
                return Err(mismatch(node, value));
            };

            encode_array(buf, element.alignment(), values.len(), |buf, i| {
                encode(buf, element, &values[i])
            })
        }
        TypeNode::Dict(key, element) => {
            let Value::Dict(entries) = value else {
                return Err(mismatch(node, value));
            };

            let key_node = TypeNode::Basic(*key);

            encode_array(buf, 8, entries.len(), |buf, i| {
                let (k, v) = &entries[i];
                buf.align(8);
                encode(buf, &key_node, k)?;
                encode(buf, element, v)
            })
        }
        TypeNode::Struct(fields) => {
            let Value::Struct(values) = value else {
                return Err(mismatch(node, value));
            };

            if fields.len() != values.len() {
                return Err(ErrorKind::ParamCountMismatch {
                    expected: fields.len(),
                    found: values.len(),
                }
                .into());
            }

            buf.align(8);

            for (field, value) in fields.iter().zip(values) {
                encode(buf, field, value)?;
            }

            Ok(())
        }
    }
}

/// Marshal a body: a sequence of values against a sequence of types.
pub fn encode_params(buf: &mut WriteBuf, nodes: &[TypeNode], values: &[Value]) -> Result<()> {
    if nodes.len() != values.len() {
        return Err(ErrorKind::ParamCountMismatch {
            expected: nodes.len(),
            found: values.len(),
        }
        .into());
    }

    for (node, value) in nodes.iter().zip(values) {
        encode(buf, node, value)?;
    }

    Ok(())
}

fn encode_basic(buf: &mut WriteBuf, code: TypeCode, value: &Value, node: &TypeNode) -> Result<()> {
    match (code, value) {
        (TypeCode::BYTE, Value::Byte(v)) => buf.put_u8(*v),
        (TypeCode::BOOLEAN, Value::Bool(v)) => buf.put_u32(u32::from(*v)),
        (TypeCode::INT16, Value::Int16(v)) => buf.put_i16(*v),
        (TypeCode::UINT16, Value::Uint16(v)) => buf.put_u16(*v),
        (TypeCode::INT32, Value::Int32(v)) => buf.put_i32(*v),
        (TypeCode::UINT32, Value::Uint32(v)) => buf.put_u32(*v),
        (TypeCode::INT64, Value::Int64(v)) => buf.put_i64(*v),
        (TypeCode::UINT64, Value::Uint64(v)) => buf.put_u64(*v),
        (TypeCode::DOUBLE, Value::Double(v)) => buf.put_f64(*v),
        (TypeCode::STRING, Value::Str(v)) => buf.put_str(v)?,
        (TypeCode::OBJECT_PATH, Value::ObjectPath(v)) => buf.put_str(v)?,
        (TypeCode::SIGNATURE, Value::Signature(v)) => {
            signature::parse(v)?;
            buf.put_signature(v)?;
        }
        (TypeCode::VARIANT, Value::Variant(inner)) => {
            let (embedded, value) = &**inner;

            let [node] = embedded.nodes() else {
                return Err(ErrorKind::InvalidVariant.into());
            };

            buf.put_signature(embedded.as_str())?;
            encode(buf, node, value)?;
        }
        (TypeCode::UNIX_FD, ..) => return Err(ErrorKind::UnsupportedType(code.0).into()),
        _ => return Err(mismatch(node, value)),
    }

    Ok(())
}

/// Marshal an array shell: 4-aligned length field, padding to the element
/// alignment, then the elements. The length is back-patched once the
/// elements are written and counts their bytes only, excluding the padding
/// that precedes the first element.
fn encode_array<F>(buf: &mut WriteBuf, element_align: usize, len: usize, mut each: F) -> Result<()>
where
    F: FnMut(&mut WriteBuf, usize) -> Result<()>,
{
    buf.align(4);
    let patch = buf.len();
    buf.put_u32(0);
    buf.align(element_align);
    let start = buf.len();

    for i in 0..len {
        each(buf, i)?;
    }

    let written = buf.len() - start;

    if written > MAX_ARRAY_LENGTH as usize {
        return Err(ErrorKind::ArrayTooLong(written as u32).into());
    }

    buf.put_at_u32(patch, written as u32);
    Ok(())
}

fn mismatch(node: &TypeNode, value: &Value) -> Error {
    Error::new(ErrorKind::TypeMismatch {
        expected: node.to_string().into(),
        found: value.type_name(),
    })
}
