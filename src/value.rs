use std::fmt;

use crate::signature::OwnedSignature;

/// A dynamically typed D-Bus value.
///
/// Every argument in a message body is one of these. Encoding verifies the
/// value against the message signature; decoding produces the arm the
/// signature dictates.
///
/// # Examples
///
/// ```
/// use wirebus::Value;
///
/// let value = Value::Array(vec![Value::Uint32(1), Value::Uint32(2)]);
/// assert_eq!(value.type_name(), "array");
/// ```
#[derive(Debug, Clone)]
pub enum Value {
    /// 8-bit unsigned integer (`y`).
    Byte(u8),
    /// Boolean (`b`).
    Bool(bool),
    /// 16-bit signed integer (`n`).
    Int16(i16),
    /// 16-bit unsigned integer (`q`).
    Uint16(u16),
    /// 32-bit signed integer (`i`).
    Int32(i32),
    /// 32-bit unsigned integer (`u`).
    Uint32(u32),
    /// 64-bit signed integer (`x`).
    Int64(i64),
    /// 64-bit unsigned integer (`t`).
    Uint64(u64),
    /// IEEE 754 double (`d`).
    Double(f64),
    /// UTF-8 string (`s`).
    Str(String),
    /// Object path (`o`).
    ObjectPath(String),
    /// Type signature (`g`).
    Signature(String),
    /// Array of uniformly typed elements (`a`).
    Array(Vec<Value>),
    /// Struct with one field per value (`(...)`).
    Struct(Vec<Value>),
    /// Dictionary carried as an array of key-value entries (`a{..}`).
    Dict(Vec<(Value, Value)>),
    /// A self-describing value (`v`): the embedded signature and the value
    /// it describes.
    Variant(Box<(OwnedSignature, Value)>),
}

impl Value {
    /// Construct a variant from a single complete type signature and a
    /// value.
    pub fn variant(signature: OwnedSignature, value: Value) -> Self {
        Self::Variant(Box::new((signature, value)))
    }

    /// A short name for the arm, used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Byte(..) => "byte",
            Value::Bool(..) => "boolean",
            Value::Int16(..) => "int16",
            Value::Uint16(..) => "uint16",
            Value::Int32(..) => "int32",
            Value::Uint32(..) => "uint32",
            Value::Int64(..) => "int64",
            Value::Uint64(..) => "uint64",
            Value::Double(..) => "double",
            Value::Str(..) => "string",
            Value::ObjectPath(..) => "object path",
            Value::Signature(..) => "signature",
            Value::Array(..) => "array",
            Value::Struct(..) => "struct",
            Value::Dict(..) => "dict",
            Value::Variant(..) => "variant",
        }
    }

    /// Access the value as a string slice, for the `s`, `o` and `g` arms.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(value) | Value::ObjectPath(value) | Value::Signature(value) => Some(value),
            _ => None,
        }
    }

    /// Access the value as a `u32`, if it is one.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Uint32(value) => Some(*value),
            _ => None,
        }
    }

    /// Access the value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Access the elements of an array or struct value.
    pub fn as_slice(&self) -> Option<&[Value]> {
        match self {
            Value::Array(values) | Value::Struct(values) => Some(values),
            _ => None,
        }
    }
}

/// Equality of decoded values. Doubles compare by bit pattern so that
/// round-trips through the codec are exact.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int16(a), Value::Int16(b)) => a == b,
            (Value::Uint16(a), Value::Uint16(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Uint32(a), Value::Uint32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Uint64(a), Value::Uint64(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::ObjectPath(a), Value::ObjectPath(b)) => a == b,
            (Value::Signature(a), Value::Signature(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Variant(a), Value::Variant(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

macro_rules! from_impl {
    ($($ty:ty => $arm:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                #[inline]
                fn from(value: $ty) -> Self {
                    Value::$arm(value)
                }
            }
        )*
    }
}

from_impl! {
    u8 => Byte,
    bool => Bool,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f64 => Double,
    String => Str,
}

impl From<&str> for Value {
    #[inline]
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Byte(value) => value.fmt(f),
            Value::Bool(value) => value.fmt(f),
            Value::Int16(value) => value.fmt(f),
            Value::Uint16(value) => value.fmt(f),
            Value::Int32(value) => value.fmt(f),
            Value::Uint32(value) => value.fmt(f),
            Value::Int64(value) => value.fmt(f),
            Value::Uint64(value) => value.fmt(f),
            Value::Double(value) => value.fmt(f),
            Value::Str(value) | Value::ObjectPath(value) | Value::Signature(value) => {
                write!(f, "{value:?}")
            }
            Value::Array(values) | Value::Struct(values) => {
                let mut it = values.iter();

                write!(f, "[")?;

                if let Some(first) = it.next() {
                    first.fmt(f)?;
                }

                for value in it {
                    write!(f, ", {value}")?;
                }

                write!(f, "]")
            }
            Value::Dict(entries) => {
                let mut it = entries.iter();

                write!(f, "{{")?;

                if let Some((key, value)) = it.next() {
                    write!(f, "{key}: {value}")?;
                }

                for (key, value) in it {
                    write!(f, ", {key}: {value}")?;
                }

                write!(f, "}}")
            }
            Value::Variant(inner) => {
                let (signature, value) = &**inner;
                write!(f, "<{signature} {value}>")
            }
        }
    }
}
