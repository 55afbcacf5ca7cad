use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::sasl::AuthError;
use crate::signature::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    /// Test if the error was raised because the connection has been closed.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::ConnectionClosed)
    }

    /// Test if the error was raised because a call deadline elapsed or the
    /// call was cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// The name and message of a remote error reply, if this error is one.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::Error;
    ///
    /// fn classify(error: &Error) -> bool {
    ///     matches!(
    ///         error.response_error(),
    ///         Some(("org.freedesktop.DBus.Error.UnknownMethod", _))
    ///     )
    /// }
    /// ```
    #[inline]
    pub fn response_error(&self) -> Option<(&str, &str)> {
        match &self.kind {
            ErrorKind::ResponseError(name, message) => Some((name, message)),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<AuthError> for Error {
    #[inline]
    fn from(error: AuthError) -> Self {
        Self::new(ErrorKind::Auth(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::Auth(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::Truncated { offset, requested } => {
                write!(f, "Read of {requested} bytes at offset {offset} is out of bounds")
            }
            ErrorKind::MalformedArray { offset, end } => {
                write!(f, "Array elements at offset {offset} overshoot declared end {end}")
            }
            ErrorKind::InvalidBoolean(value) => {
                write!(f, "Boolean must be 0 or 1, got {value}")
            }
            ErrorKind::UnsupportedType(code) => {
                write!(f, "Unsupported type code `{}`", char::from(*code))
            }
            ErrorKind::TypeMismatch { expected, found } => {
                write!(f, "Expected value of type `{expected}`, found {found}")
            }
            ErrorKind::ParamCountMismatch { expected, found } => {
                write!(f, "Signature describes {expected} values, found {found}")
            }
            ErrorKind::InteriorNul => write!(f, "String contains an interior NUL byte"),
            ErrorKind::NotNullTerminated => write!(f, "String is not NUL terminated"),
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of {length} bytes exceeds maximum (67108864)")
            }
            ErrorKind::MessageTooLarge(length) => {
                write!(f, "Frame of {length} bytes exceeds maximum (134217728)")
            }
            ErrorKind::IncompleteMessage => write!(f, "Frame is shorter than its declared size"),
            ErrorKind::InvalidEndianness(tag) => {
                write!(f, "Unknown endianness tag {:?}", char::from(*tag))
            }
            ErrorKind::InvalidProtocol(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::InvalidMessageType(value) => {
                write!(f, "Unknown message type {value}")
            }
            ErrorKind::InvalidHeaderField => write!(f, "Malformed header field entry"),
            ErrorKind::MissingPath => write!(f, "Missing required PATH header field"),
            ErrorKind::MissingInterface => write!(f, "Missing required INTERFACE header field"),
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header field"),
            ErrorKind::MissingErrorName => write!(f, "Missing required ERROR_NAME header field"),
            ErrorKind::MissingReplySerial => {
                write!(f, "Missing required REPLY_SERIAL header field")
            }
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::InvalidVariant => {
                write!(f, "Variant signature must contain exactly one complete type")
            }
            ErrorKind::MissingBus => write!(f, "Missing session bus address"),
            ErrorKind::InvalidAddress => write!(f, "Invalid d-bus address"),
            ErrorKind::ResponseError(error_name, message) => {
                write!(f, "Response error: {error_name}: {message}")
            }
            ErrorKind::Cancelled => write!(f, "Call was cancelled"),
            ErrorKind::ConnectionClosed => write!(f, "Connection is closed"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::Auth(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    Auth(AuthError),
    Utf8Error(Utf8Error),
    Truncated { offset: usize, requested: usize },
    MalformedArray { offset: usize, end: usize },
    InvalidBoolean(u32),
    UnsupportedType(u8),
    TypeMismatch { expected: Box<str>, found: &'static str },
    ParamCountMismatch { expected: usize, found: usize },
    InteriorNul,
    NotNullTerminated,
    ArrayTooLong(u32),
    MessageTooLarge(u64),
    IncompleteMessage,
    InvalidEndianness(u8),
    InvalidProtocol(u8),
    InvalidMessageType(u8),
    InvalidHeaderField,
    MissingPath,
    MissingInterface,
    MissingMember,
    MissingErrorName,
    MissingReplySerial,
    ZeroSerial,
    InvalidVariant,
    MissingBus,
    InvalidAddress,
    ResponseError(Box<str>, Box<str>),
    Cancelled,
    ConnectionClosed,
}
