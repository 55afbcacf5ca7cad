use std::num::NonZeroU32;

use crate::codec::{decode_params, ReadBuf};
use crate::error::Result;
use crate::protocol::{Endianness, Flags, MessageType};
use crate::signature::OwnedSignature;
use crate::value::Value;

/// The kind of a message, carrying the header fields mandatory for that
/// kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A method call addressed at an object path.
    MethodCall {
        /// The path of the object the call is addressed to.
        path: Box<str>,
        /// The method being invoked.
        member: Box<str>,
    },
    /// A successful reply to a method call.
    MethodReturn {
        /// The serial of the call this message answers.
        reply_serial: NonZeroU32,
    },
    /// An error reply to a method call.
    Error {
        /// The name of the error that occurred.
        error_name: Box<str>,
        /// The serial of the call this message answers.
        reply_serial: NonZeroU32,
    },
    /// A broadcast signal.
    Signal {
        /// The path of the object emitting the signal.
        path: Box<str>,
        /// The name of the signal.
        member: Box<str>,
    },
}

/// An owned D-Bus message: kind, optional header fields, and the
/// still-marshalled body together with its signature and byte order.
///
/// Messages are constructed by callers on the way out and by the framer on
/// the way in; after the framer publishes one it is never mutated.
///
/// # Examples
///
/// ```
/// use std::num::NonZeroU32;
///
/// use wirebus::{Message, MessageKind};
///
/// let serial = NonZeroU32::new(1).unwrap();
///
/// let m = Message::method_call("/org/freedesktop/DBus", "Hello", serial)
///     .with_interface("org.freedesktop.DBus")
///     .with_destination("org.freedesktop.DBus");
///
/// assert!(matches!(m.kind(), MessageKind::MethodCall { .. }));
/// assert_eq!(m.interface(), Some("org.freedesktop.DBus"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// The kind of the message.
    pub(crate) kind: MessageKind,
    /// Serial of the message.
    pub(crate) serial: NonZeroU32,
    /// Flags in the message.
    pub(crate) flags: Flags,
    /// The interface of the message.
    pub(crate) interface: Option<Box<str>>,
    /// The destination of the message.
    pub(crate) destination: Option<Box<str>>,
    /// The sender of the message.
    pub(crate) sender: Option<Box<str>>,
    /// The signature of the body.
    pub(crate) signature: OwnedSignature,
    /// The marshalled body.
    pub(crate) body: Vec<u8>,
    /// The byte order the body is marshalled in.
    pub(crate) endianness: Endianness,
}

impl Message {
    /// Construct a method call message.
    pub fn method_call(path: &str, member: &str, serial: NonZeroU32) -> Self {
        Self::new(
            MessageKind::MethodCall {
                path: path.into(),
                member: member.into(),
            },
            serial,
        )
    }

    /// Construct a signal message.
    pub fn signal(path: &str, member: &str, serial: NonZeroU32) -> Self {
        Self::new(
            MessageKind::Signal {
                path: path.into(),
                member: member.into(),
            },
            serial,
        )
    }

    pub(crate) fn new(kind: MessageKind, serial: NonZeroU32) -> Self {
        Self {
            kind,
            serial,
            flags: Flags::EMPTY,
            interface: None,
            destination: None,
            sender: None,
            signature: OwnedSignature::empty(),
            body: Vec::new(),
            endianness: Endianness::LITTLE,
        }
    }

    /// Get the kind of the message.
    pub fn kind(&self) -> &MessageKind {
        &self.kind
    }

    /// Get the serial of the message.
    pub fn serial(&self) -> NonZeroU32 {
        self.serial
    }

    /// Get the flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// Modify the flags of the message.
    pub fn with_flags(self, flags: Flags) -> Self {
        Self { flags, ..self }
    }

    /// Get the interface of the message.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// Modify the interface of the message.
    pub fn with_interface(self, interface: &str) -> Self {
        Self {
            interface: Some(interface.into()),
            ..self
        }
    }

    /// Get the destination of the message.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// Modify the destination of the message.
    pub fn with_destination(self, destination: &str) -> Self {
        Self {
            destination: Some(destination.into()),
            ..self
        }
    }

    /// Get the sender of the message.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Modify the sender of the message.
    pub fn with_sender(self, sender: &str) -> Self {
        Self {
            sender: Some(sender.into()),
            ..self
        }
    }

    /// Get the signature of the body.
    pub fn signature(&self) -> &OwnedSignature {
        &self.signature
    }

    /// Replace the body of the message with marshalled bytes and the
    /// signature describing them.
    pub fn with_body(self, signature: OwnedSignature, body: Vec<u8>) -> Self {
        Self {
            signature,
            body,
            endianness: Endianness::LITTLE,
            ..self
        }
    }

    /// The object path of the message, for kinds that carry one.
    pub fn path(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { path, .. } | MessageKind::Signal { path, .. } => Some(path),
            _ => None,
        }
    }

    /// The member of the message, for kinds that carry one.
    pub fn member(&self) -> Option<&str> {
        match &self.kind {
            MessageKind::MethodCall { member, .. } | MessageKind::Signal { member, .. } => {
                Some(member)
            }
            _ => None,
        }
    }

    /// The serial this message replies to, for reply kinds.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        match &self.kind {
            MessageKind::MethodReturn { reply_serial }
            | MessageKind::Error { reply_serial, .. } => Some(*reply_serial),
            _ => None,
        }
    }

    /// Unmarshal the body of the message against its signature.
    ///
    /// Decoding happens on demand; the raw body is carried around until
    /// someone asks for the values.
    pub fn args(&self) -> Result<Vec<Value>> {
        let mut cur = ReadBuf::new(&self.body, self.endianness);
        let values = decode_params(&mut cur, self.signature.nodes())?;
        Ok(values)
    }

    pub(crate) fn message_type(&self) -> MessageType {
        match &self.kind {
            MessageKind::MethodCall { .. } => MessageType::METHOD_CALL,
            MessageKind::MethodReturn { .. } => MessageType::METHOD_RETURN,
            MessageKind::Error { .. } => MessageType::ERROR,
            MessageKind::Signal { .. } => MessageType::SIGNAL,
        }
    }
}
