use std::error;
use std::fmt;

/// An error raised while parsing a D-Bus type signature.
#[derive(Debug, PartialEq, Eq)]
pub struct SignatureError {
    pub(crate) kind: SignatureErrorKind,
}

impl SignatureError {
    #[inline]
    pub(crate) fn new(kind: SignatureErrorKind) -> Self {
        Self { kind }
    }

    #[inline]
    pub(crate) fn too_long(length: usize) -> Self {
        Self::new(SignatureErrorKind::SignatureTooLong(length))
    }
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignatureErrorKind::EmptySignature => {
                write!(f, "Expected a type, but the signature ended")
            }
            SignatureErrorKind::UnknownTypeCode(code) => {
                write!(f, "Unknown type code `{}` in signature", char::from(code))
            }
            SignatureErrorKind::MissingArrayElementType => {
                write!(f, "Array marker `a` is missing its element type")
            }
            SignatureErrorKind::UnclosedGroup(delimiter) => {
                write!(f, "Missing closing `{}` in signature", char::from(delimiter))
            }
            SignatureErrorKind::StructEndedButNotStarted => {
                write!(f, "Closing `)` without a matching `(`")
            }
            SignatureErrorKind::DictEndedButNotStarted => {
                write!(f, "Closing `}}` without a matching `{{`")
            }
            SignatureErrorKind::StructHasNoFields => write!(f, "Struct `()` has no fields"),
            SignatureErrorKind::DictKeyMustBeBasicType => {
                write!(f, "Dict entry key must be a basic type")
            }
            SignatureErrorKind::DictEntryHasTooManyFields => {
                write!(f, "Dict entry has more than one value type")
            }
            SignatureErrorKind::DictEntryNotInsideArray => {
                write!(f, "Dict entry is only valid as an array element")
            }
            SignatureErrorKind::TrailingInput => {
                write!(f, "Trailing input after a complete type")
            }
            SignatureErrorKind::SignatureTooLong(length) => {
                write!(f, "Signature of {length} bytes exceeds the maximum of 255")
            }
            SignatureErrorKind::ExceededMaximumDepth => {
                write!(f, "Signature exceeds the maximum container depth")
            }
        }
    }
}

impl error::Error for SignatureError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureErrorKind {
    EmptySignature,
    UnknownTypeCode(u8),
    MissingArrayElementType,
    UnclosedGroup(u8),
    StructEndedButNotStarted,
    DictEndedButNotStarted,
    StructHasNoFields,
    DictKeyMustBeBasicType,
    DictEntryHasTooManyFields,
    DictEntryNotInsideArray,
    TrailingInput,
    SignatureTooLong(usize),
    ExceededMaximumDepth,
}
