use std::num::NonZeroU32;

use crate::codec::{self, ReadBuf};
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{
    self, Endianness, FieldCode, Flags, MessageType, FIXED_HEADER_LENGTH, MAX_FRAME_LENGTH,
};
use crate::signature::{self, OwnedSignature};
use crate::value::Value;

use super::{Message, MessageKind};

/// The decoded fixed portion of a frame.
///
/// Reading a frame is a two step affair: the fixed 16 bytes determine the
/// byte order and how much more to read, then the rest of the frame is
/// pulled off the stream and handed to [`Message::deserialize`] whole.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FrameHeader {
    pub(crate) endianness: Endianness,
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) serial: u32,
    pub(crate) body_length: usize,
    pub(crate) fields_length: usize,
}

impl FrameHeader {
    /// Decode the fixed header, validating the endianness tag, message
    /// type and protocol version.
    pub(crate) fn parse(fixed: &[u8; FIXED_HEADER_LENGTH]) -> Result<Self> {
        let Some(endianness) = Endianness::from_tag(fixed[0]) else {
            return Err(ErrorKind::InvalidEndianness(fixed[0]).into());
        };

        let message_type = match fixed[1] {
            1 => MessageType::METHOD_CALL,
            2 => MessageType::METHOD_RETURN,
            3 => MessageType::ERROR,
            4 => MessageType::SIGNAL,
            other => return Err(ErrorKind::InvalidMessageType(other).into()),
        };

        if fixed[3] != protocol::VERSION {
            return Err(ErrorKind::InvalidProtocol(fixed[3]).into());
        }

        let mut cur = ReadBuf::new(fixed, endianness);
        cur.set_pos(4);
        let body_length = cur.take_u32()? as usize;
        let serial = cur.take_u32()?;
        let fields_length = cur.take_u32()? as usize;

        if serial == 0 {
            return Err(ErrorKind::ZeroSerial.into());
        }

        Ok(Self {
            endianness,
            message_type,
            flags: Flags(fixed[2]),
            serial,
            body_length,
            fields_length,
        })
    }

    /// The number of bytes in the frame beyond the fixed header: the field
    /// array, its padding to the body boundary, and the body.
    ///
    /// Both lengths come straight off the wire, so the frame is sized in
    /// `u64` and checked against the cap before any narrowing back to
    /// `usize`; on 32-bit targets a hostile length must not wrap around
    /// the arithmetic instead of being rejected.
    pub(crate) fn remaining_length(&self) -> Result<usize> {
        let fields_end = FIXED_HEADER_LENGTH as u64 + self.fields_length as u64;
        let total = (fields_end + 7) / 8 * 8 + self.body_length as u64;

        if total > MAX_FRAME_LENGTH as u64 {
            return Err(ErrorKind::MessageTooLarge(total).into());
        }

        Ok(total as usize - FIXED_HEADER_LENGTH)
    }
}

/// The header fields recognised on a frame, prior to the mandatory-field
/// checks for its message type.
#[derive(Default)]
struct HeaderFields {
    path: Option<String>,
    interface: Option<String>,
    member: Option<String>,
    error_name: Option<String>,
    reply_serial: Option<u32>,
    destination: Option<String>,
    sender: Option<String>,
    signature: Option<String>,
    unix_fds: Option<u32>,
}

impl HeaderFields {
    fn set(&mut self, code: u8, value: Value) -> Result<()> {
        match (FieldCode(code), value) {
            (FieldCode::PATH, Value::ObjectPath(v)) => self.path = Some(v),
            (FieldCode::INTERFACE, Value::Str(v)) => self.interface = Some(v),
            (FieldCode::MEMBER, Value::Str(v)) => self.member = Some(v),
            (FieldCode::ERROR_NAME, Value::Str(v)) => self.error_name = Some(v),
            (FieldCode::REPLY_SERIAL, Value::Uint32(v)) => self.reply_serial = Some(v),
            (FieldCode::DESTINATION, Value::Str(v)) => self.destination = Some(v),
            (FieldCode::SENDER, Value::Str(v)) => self.sender = Some(v),
            (FieldCode::SIGNATURE, Value::Signature(v)) => self.signature = Some(v),
            (FieldCode::UNIX_FDS, Value::Uint32(v)) => self.unix_fds = Some(v),
            _ => return Err(ErrorKind::InvalidHeaderField.into()),
        }

        Ok(())
    }

    fn reply_serial(&self) -> Result<NonZeroU32> {
        self.reply_serial
            .and_then(NonZeroU32::new)
            .ok_or_else(|| Error::new(ErrorKind::MissingReplySerial))
    }
}

impl Message {
    /// Unmarshal a complete frame into a message.
    ///
    /// `frame` must contain exactly the frame, fixed header included. The
    /// body is not decoded here; it is sliced out and kept with its byte
    /// order for decoding on demand.
    pub fn deserialize(frame: &[u8]) -> Result<Self> {
        let fixed = frame
            .get(..FIXED_HEADER_LENGTH)
            .and_then(|fixed| <&[u8; FIXED_HEADER_LENGTH]>::try_from(fixed).ok())
            .ok_or_else(|| Error::new(ErrorKind::IncompleteMessage))?;

        let header = FrameHeader::parse(fixed)?;

        if frame.len() != FIXED_HEADER_LENGTH + header.remaining_length()? {
            return Err(ErrorKind::IncompleteMessage.into());
        }

        let mut cur = ReadBuf::new(frame, header.endianness);
        cur.set_pos(12);
        let fields_length = cur.take_u32()? as usize;
        let fields_end = cur.pos() + fields_length;

        let mut fields = HeaderFields::default();

        while cur.pos() < fields_end {
            cur.align(8)?;
            let code = cur.take_u8()?;
            let embedded = cur.take_signature_str()?;
            let node = signature::parse_single(embedded)
                .map_err(|_| Error::new(ErrorKind::InvalidHeaderField))?;
            let value = codec::decode(&mut cur, &node)?;

            match code {
                0 => return Err(ErrorKind::InvalidHeaderField.into()),
                1..=9 => fields.set(code, value)?,
                _ => {
                    log::warn!("framer: ignoring unknown header field code {code}");
                }
            }
        }

        if cur.pos() != fields_end {
            return Err(ErrorKind::InvalidHeaderField.into());
        }

        if let Some(unix_fds) = fields.unix_fds {
            if unix_fds != 0 {
                return Err(ErrorKind::UnsupportedType(b'h').into());
            }
        }

        cur.align(8)?;
        let body = cur.take_bytes(header.body_length)?;

        let signature = match fields.signature.as_deref() {
            None | Some("") => {
                if header.body_length != 0 {
                    return Err(ErrorKind::InvalidHeaderField.into());
                }

                OwnedSignature::empty()
            }
            Some(raw) => OwnedSignature::new(raw)?,
        };

        let kind = match header.message_type {
            MessageType::METHOD_CALL => MessageKind::MethodCall {
                path: take_field(fields.path, ErrorKind::MissingPath)?,
                member: take_field(fields.member, ErrorKind::MissingMember)?,
            },
            MessageType::METHOD_RETURN => MessageKind::MethodReturn {
                reply_serial: fields.reply_serial()?,
            },
            MessageType::ERROR => {
                let reply_serial = fields.reply_serial()?;

                MessageKind::Error {
                    error_name: take_field(fields.error_name, ErrorKind::MissingErrorName)?,
                    reply_serial,
                }
            }
            _ => {
                if fields.interface.is_none() {
                    return Err(ErrorKind::MissingInterface.into());
                }

                MessageKind::Signal {
                    path: take_field(fields.path, ErrorKind::MissingPath)?,
                    member: take_field(fields.member, ErrorKind::MissingMember)?,
                }
            }
        };

        // Serial is validated non-zero by FrameHeader::parse.
        let Some(serial) = NonZeroU32::new(header.serial) else {
            return Err(ErrorKind::ZeroSerial.into());
        };

        Ok(Self {
            kind,
            serial,
            flags: header.flags,
            interface: fields.interface.map(Box::from),
            destination: fields.destination.map(Box::from),
            sender: fields.sender.map(Box::from),
            signature,
            body: body.to_vec(),
            endianness: header.endianness,
        })
    }
}

fn take_field(field: Option<String>, missing: ErrorKind) -> Result<Box<str>> {
    match field {
        Some(value) => Ok(value.into()),
        None => Err(missing.into()),
    }
}
