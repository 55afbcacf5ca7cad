use crate::error::{ErrorKind, Result};
use crate::protocol::{TypeCode, MAX_ARRAY_LENGTH};
use crate::signature::{self, OwnedSignature, TypeNode};
use crate::value::Value;

use super::ReadBuf;

/// Unmarshal one value of the given type from the cursor.
///
/// Errors unwind without touching the rest of the buffer; the cursor
/// position is unspecified afterwards.
pub fn decode(cur: &mut ReadBuf<'_>, node: &TypeNode) -> Result<Value> {
    match node {
        TypeNode::Basic(code) => decode_basic(cur, *code),
        TypeNode::Array(element) => {
            let mut values = Vec::new();

            decode_array(cur, element.alignment(), |cur| {
                values.push(decode(cur, element)?);
                Ok(())
            })?;

            Ok(Value::Array(values))
        }
        TypeNode::Dict(key, element) => {
            let key_node = TypeNode::Basic(*key);
            let mut entries = Vec::new();

            decode_array(cur, 8, |cur| {
                cur.align(8)?;
                let k = decode(cur, &key_node)?;
                let v = decode(cur, element)?;
                entries.push((k, v));
                Ok(())
            })?;

            Ok(Value::Dict(entries))
        }
        TypeNode::Struct(fields) => {
            cur.align(8)?;
            let mut values = Vec::with_capacity(fields.len());

            for field in fields {
                values.push(decode(cur, field)?);
            }

            Ok(Value::Struct(values))
        }
    }
}

/// Unmarshal a body: one value per type in the signature sequence.
pub fn decode_params(cur: &mut ReadBuf<'_>, nodes: &[TypeNode]) -> Result<Vec<Value>> {
    let mut values = Vec::with_capacity(nodes.len());

    for node in nodes {
        values.push(decode(cur, node)?);
    }

    Ok(values)
}

fn decode_basic(cur: &mut ReadBuf<'_>, code: TypeCode) -> Result<Value> {
    let value = match code {
        TypeCode::BYTE => Value::Byte(cur.take_u8()?),
        TypeCode::BOOLEAN => match cur.take_u32()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => return Err(ErrorKind::InvalidBoolean(other).into()),
        },
        TypeCode::INT16 => Value::Int16(cur.take_i16()?),
        TypeCode::UINT16 => Value::Uint16(cur.take_u16()?),
        TypeCode::INT32 => Value::Int32(cur.take_i32()?),
        TypeCode::UINT32 => Value::Uint32(cur.take_u32()?),
        TypeCode::INT64 => Value::Int64(cur.take_i64()?),
        TypeCode::UINT64 => Value::Uint64(cur.take_u64()?),
        TypeCode::DOUBLE => Value::Double(cur.take_f64()?),
        TypeCode::STRING => Value::Str(cur.take_str()?.to_owned()),
        TypeCode::OBJECT_PATH => Value::ObjectPath(cur.take_str()?.to_owned()),
        TypeCode::SIGNATURE => Value::Signature(cur.take_signature_str()?.to_owned()),
        TypeCode::VARIANT => {
            let embedded = cur.take_signature_str()?;
            let node = parse_variant_signature(embedded)?;
            let value = decode(cur, &node)?;
            Value::variant(OwnedSignature::new(embedded)?, value)
        }
        TypeCode::UNIX_FD => return Err(ErrorKind::UnsupportedType(code.0).into()),
        _ => return Err(ErrorKind::UnsupportedType(code.0).into()),
    };

    Ok(value)
}

/// The embedded signature of a variant must be exactly one complete type.
fn parse_variant_signature(embedded: &str) -> Result<TypeNode> {
    if embedded.is_empty() {
        return Err(ErrorKind::InvalidVariant.into());
    }

    Ok(signature::parse_single(embedded)?)
}

/// Unmarshal an array shell: 4-aligned byte length, padding to the element
/// alignment, then elements until the declared end offset is reached
/// exactly.
fn decode_array<F>(cur: &mut ReadBuf<'_>, element_align: usize, mut each: F) -> Result<()>
where
    F: FnMut(&mut ReadBuf<'_>) -> Result<()>,
{
    let len = cur.take_u32()?;

    if len > MAX_ARRAY_LENGTH {
        return Err(ErrorKind::ArrayTooLong(len).into());
    }

    cur.align(element_align)?;
    let len = len as usize;

    let Some(end) = cur.pos().checked_add(len).filter(|&end| end <= cur.len()) else {
        return Err(ErrorKind::Truncated {
            offset: cur.pos(),
            requested: len,
        }
        .into());
    };

    while cur.pos() < end {
        each(cur)?;
    }

    if cur.pos() != end {
        return Err(ErrorKind::MalformedArray {
            offset: cur.pos(),
            end,
        }
        .into());
    }

    Ok(())
}
