//! Low level details for the D-Bus protocol implementation.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitXor};

/// The protocol version spoken and accepted by this crate.
pub(crate) const VERSION: u8 = 1;

/// The length of the fixed portion of a message header.
pub(crate) const FIXED_HEADER_LENGTH: usize = 16;

/// The maximum length in bytes of a single array.
pub(crate) const MAX_ARRAY_LENGTH: u32 = 1 << 26;

/// The maximum length in bytes of a whole message frame.
pub(crate) const MAX_FRAME_LENGTH: usize = 1 << 27;

/// Round `len` up to the next multiple of `align`, which must be a power of
/// two.
#[inline(always)]
pub(crate) fn align_up(align: usize, len: usize) -> usize {
    let mask = align - 1;
    (len + mask) & !mask
}

/// The number of padding bytes needed to bring `len` up to a multiple of
/// `align`.
#[inline(always)]
pub(crate) fn padding_to(align: usize, len: usize) -> usize {
    align_up(align, len) - len
}

macro_rules! raw_enum {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match *self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)*
                    _ => f.write_str("INVALID"),
                }
            }
        }
    }
}

macro_rules! raw_set {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Default, Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                struct Raw(&'static str);

                impl fmt::Debug for Raw {
                    #[inline]
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "{}", self.0)
                    }
                }

                let mut f = f.debug_set();
                let mut this = *self;

                $(
                    if this & Self::$variant {
                        f.entry(&Raw(stringify!($variant)));
                        this = this ^ Self::$variant;
                    }
                )*

                if this.0 != 0 {
                    f.entry(&format_args!("{:b}", this.0));
                }

                f.finish()
            }
        }
    }
}

raw_enum! {
    /// The endianness tag of a message.
    #[repr(u8)]
    pub enum Endianness {
        /// Little endian.
        LITTLE = b'l',
        /// Big endian.
        BIG = b'B',
    }
}

impl Endianness {
    /// Decode the endianness tag at the head of a frame.
    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'l' => Some(Self::LITTLE),
            b'B' => Some(Self::BIG),
            _ => None,
        }
    }
}

raw_enum! {
    /// The type of a message.
    #[repr(u8)]
    pub enum MessageType {
        /// Method call. This message type may prompt a reply.
        METHOD_CALL = 1,
        /// Method reply with returned data.
        METHOD_RETURN = 2,
        /// Error reply.
        ERROR = 3,
        /// Signal emission.
        SIGNAL = 4,
    }
}

impl MessageType {
    /// The name used in the textual form of a match rule.
    pub(crate) fn as_match_str(&self) -> &'static str {
        match *self {
            Self::METHOD_CALL => "method_call",
            Self::METHOD_RETURN => "method_return",
            Self::ERROR => "error",
            Self::SIGNAL => "signal",
            _ => "invalid",
        }
    }
}

raw_set! {
    /// Flags inside of a D-Bus message.
    ///
    /// # Examples
    ///
    /// ```
    /// use wirebus::Flags;
    ///
    /// let flags = Flags::EMPTY;
    /// assert!(!(flags & Flags::NO_REPLY_EXPECTED));
    ///
    /// let flags = Flags::EMPTY | Flags::NO_REPLY_EXPECTED;
    /// assert!(flags & Flags::NO_REPLY_EXPECTED);
    /// assert!(!(flags & Flags::NO_AUTO_START));
    /// ```
    #[repr(u8)]
    pub enum Flags {
        /// An empty set of flags.
        EMPTY = 0,
        /// This message does not expect a method return or error reply, even
        /// if it is of a type that can have one.
        NO_REPLY_EXPECTED = 1,
        /// The bus must not launch an owner for the destination name in
        /// response to this message.
        NO_AUTO_START = 2,
        /// The caller is prepared to wait for interactive authorization on
        /// the receiving side.
        ALLOW_INTERACTIVE_AUTHORIZATION = 4,
    }
}

impl BitOr<Flags> for Flags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Flags) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd<Flags> for Flags {
    type Output = bool;

    #[inline]
    fn bitand(self, rhs: Flags) -> Self::Output {
        self.0 & rhs.0 != 0
    }
}

impl BitXor<Flags> for Flags {
    type Output = Self;

    #[inline]
    fn bitxor(self, rhs: Flags) -> Self::Output {
        Self(self.0 ^ rhs.0)
    }
}

raw_enum! {
    /// A code identifying a field in the message header array.
    #[repr(u8)]
    pub(crate) enum FieldCode {
        /// The object to send a call to, or the object a signal is emitted
        /// from.
        PATH = 1,
        /// The interface to invoke a method call on, or that a signal is
        /// emitted from.
        INTERFACE = 2,
        /// The member, either the method name or signal name.
        MEMBER = 3,
        /// The name of the error that occurred, for errors.
        ERROR_NAME = 4,
        /// The serial number of the message this message is a reply to.
        REPLY_SERIAL = 5,
        /// The name of the connection this message is intended for.
        DESTINATION = 6,
        /// Unique name of the sending connection.
        SENDER = 7,
        /// The signature of the message body.
        SIGNATURE = 8,
        /// The number of Unix file descriptors that accompany the message.
        UNIX_FDS = 9,
    }
}

raw_enum! {
    /// A single byte code in a type signature.
    #[repr(u8)]
    pub enum TypeCode {
        /// 8-bit unsigned integer.
        BYTE = b'y',
        /// Boolean value; 0 is FALSE and 1 is TRUE, everything else is
        /// invalid.
        BOOLEAN = b'b',
        /// 16-bit signed integer.
        INT16 = b'n',
        /// 16-bit unsigned integer.
        UINT16 = b'q',
        /// 32-bit signed integer.
        INT32 = b'i',
        /// 32-bit unsigned integer.
        UINT32 = b'u',
        /// 64-bit signed integer.
        INT64 = b'x',
        /// 64-bit unsigned integer.
        UINT64 = b't',
        /// IEEE 754 double.
        DOUBLE = b'd',
        /// UTF-8 string without interior NUL bytes.
        STRING = b's',
        /// Name of an object instance.
        OBJECT_PATH = b'o',
        /// A type signature.
        SIGNATURE = b'g',
        /// Variant type; the type of the value is part of the value itself.
        VARIANT = b'v',
        /// Unix file descriptor index. Valid in the grammar, unsupported by
        /// this crate.
        UNIX_FD = b'h',
        /// Array marker.
        ARRAY = b'a',
        /// Struct opening parenthesis.
        OPEN_PAREN = b'(',
        /// Struct closing parenthesis.
        CLOSE_PAREN = b')',
        /// Dict entry opening brace.
        OPEN_BRACE = b'{',
        /// Dict entry closing brace.
        CLOSE_BRACE = b'}',
    }
}

impl TypeCode {
    /// Test if the code denotes a complete basic type.
    pub fn is_basic(&self) -> bool {
        matches!(
            *self,
            Self::BYTE
                | Self::BOOLEAN
                | Self::INT16
                | Self::UINT16
                | Self::INT32
                | Self::UINT32
                | Self::INT64
                | Self::UINT64
                | Self::DOUBLE
                | Self::STRING
                | Self::OBJECT_PATH
                | Self::SIGNATURE
                | Self::UNIX_FD
        )
    }

    /// The natural alignment of a value of this type, measured from the
    /// start of the message.
    pub fn alignment(&self) -> usize {
        match *self {
            Self::INT16 | Self::UINT16 => 2,
            Self::BOOLEAN
            | Self::INT32
            | Self::UINT32
            | Self::STRING
            | Self::OBJECT_PATH
            | Self::UNIX_FD => 4,
            Self::INT64 | Self::UINT64 | Self::DOUBLE => 8,
            _ => 1,
        }
    }
}
