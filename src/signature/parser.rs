use crate::protocol::TypeCode;

use super::signature_error::SignatureErrorKind;
use super::{SignatureError, TypeNode, MAX_CONTAINER_DEPTH, MAX_SIGNATURE};

/// Parse a concatenation of complete types, such as a message body
/// signature.
///
/// The whole input is consumed; an empty input yields an empty sequence.
///
/// # Examples
///
/// ```
/// use wirebus::signature;
///
/// let nodes = signature::parse("susai")?;
/// assert_eq!(nodes.len(), 4);
/// # Ok::<_, wirebus::SignatureError>(())
/// ```
pub fn parse(signature: &str) -> Result<Vec<TypeNode>, SignatureError> {
    if signature.len() > MAX_SIGNATURE {
        return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong(
            signature.len(),
        )));
    }

    let mut nodes = Vec::new();
    let mut rest = signature.as_bytes();

    while !rest.is_empty() {
        let (node, tail) = parse_one_inner(rest, 0)?;
        nodes.push(node);
        rest = tail;
    }

    Ok(nodes)
}

/// Parse exactly one complete type, returning the node and the unparsed
/// remainder of the input.
///
/// # Examples
///
/// ```
/// use wirebus::signature;
///
/// let (node, rest) = signature::parse_one("ii")?;
/// assert_eq!(node.to_string(), "i");
/// assert_eq!(rest, "i");
/// # Ok::<_, wirebus::SignatureError>(())
/// ```
pub fn parse_one(signature: &str) -> Result<(TypeNode, &str), SignatureError> {
    if signature.len() > MAX_SIGNATURE {
        return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong(
            signature.len(),
        )));
    }

    let (node, rest) = parse_one_inner(signature.as_bytes(), 0)?;
    let consumed = signature.len() - rest.len();
    Ok((node, &signature[consumed..]))
}

/// Parse exactly one complete type and require that nothing follows it.
///
/// # Examples
///
/// ```
/// use wirebus::signature;
///
/// assert!(signature::parse_single("a{sv}").is_ok());
/// assert!(signature::parse_single("uu").is_err());
/// ```
pub fn parse_single(signature: &str) -> Result<TypeNode, SignatureError> {
    let (node, rest) = parse_one(signature)?;

    if !rest.is_empty() {
        return Err(SignatureError::new(SignatureErrorKind::TrailingInput));
    }

    Ok(node)
}

fn parse_one_inner(input: &[u8], depth: usize) -> Result<(TypeNode, &[u8]), SignatureError> {
    if depth > MAX_CONTAINER_DEPTH {
        return Err(SignatureError::new(SignatureErrorKind::ExceededMaximumDepth));
    }

    let Some((&code, rest)) = input.split_first() else {
        return Err(SignatureError::new(SignatureErrorKind::EmptySignature));
    };

    match code {
        b'a' => parse_array(rest, depth),
        b'(' => parse_struct(rest, depth),
        b'{' => Err(SignatureError::new(
            SignatureErrorKind::DictEntryNotInsideArray,
        )),
        b')' => Err(SignatureError::new(
            SignatureErrorKind::StructEndedButNotStarted,
        )),
        b'}' => Err(SignatureError::new(
            SignatureErrorKind::DictEndedButNotStarted,
        )),
        _ => {
            let code = TypeCode(code);

            if !code.is_basic() && code != TypeCode::VARIANT {
                return Err(SignatureError::new(SignatureErrorKind::UnknownTypeCode(
                    code.0,
                )));
            }

            Ok((TypeNode::Basic(code), rest))
        }
    }
}

fn parse_array(rest: &[u8], depth: usize) -> Result<(TypeNode, &[u8]), SignatureError> {
    match rest.first() {
        None | Some(b')') | Some(b'}') => Err(SignatureError::new(
            SignatureErrorKind::MissingArrayElementType,
        )),
        Some(b'{') => parse_dict(&rest[1..], depth),
        Some(..) => {
            let (element, tail) = parse_one_inner(rest, depth + 1)?;
            Ok((TypeNode::Array(Box::new(element)), tail))
        }
    }
}

fn parse_struct(mut rest: &[u8], depth: usize) -> Result<(TypeNode, &[u8]), SignatureError> {
    let mut fields = Vec::new();

    loop {
        match rest.first() {
            None => {
                return Err(SignatureError::new(SignatureErrorKind::UnclosedGroup(
                    b')',
                )))
            }
            Some(b')') => {
                rest = &rest[1..];
                break;
            }
            Some(..) => {
                let (field, tail) = parse_one_inner(rest, depth + 1)?;
                fields.push(field);
                rest = tail;
            }
        }
    }

    if fields.is_empty() {
        return Err(SignatureError::new(SignatureErrorKind::StructHasNoFields));
    }

    Ok((TypeNode::Struct(fields), rest))
}

fn parse_dict(rest: &[u8], depth: usize) -> Result<(TypeNode, &[u8]), SignatureError> {
    let Some((&key, rest)) = rest.split_first() else {
        return Err(SignatureError::new(SignatureErrorKind::UnclosedGroup(b'}')));
    };

    let key = TypeCode(key);

    if !key.is_basic() || key == TypeCode::VARIANT {
        return Err(SignatureError::new(
            SignatureErrorKind::DictKeyMustBeBasicType,
        ));
    }

    let (value, rest) = parse_one_inner(rest, depth + 1)?;

    match rest.first() {
        Some(b'}') => Ok((TypeNode::Dict(key, Box::new(value)), &rest[1..])),
        Some(..) => Err(SignatureError::new(
            SignatureErrorKind::DictEntryHasTooManyFields,
        )),
        None => Err(SignatureError::new(SignatureErrorKind::UnclosedGroup(b'}'))),
    }
}
