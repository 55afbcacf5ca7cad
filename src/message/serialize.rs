use crate::codec::WriteBuf;
use crate::error::{ErrorKind, Result};
use crate::protocol::{self, Endianness, FieldCode, TypeCode, MAX_FRAME_LENGTH};

use super::{Message, MessageKind};

impl Message {
    /// Marshal the message into a complete frame.
    ///
    /// Frames are always produced little-endian: fixed header, the header
    /// field array with back-patched length, padding to an 8-byte
    /// boundary, then the already-marshalled body.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        if self.endianness != Endianness::LITTLE {
            return Err(ErrorKind::InvalidEndianness(self.endianness.0).into());
        }

        if matches!(self.kind, MessageKind::Signal { .. }) && self.interface.is_none() {
            return Err(ErrorKind::MissingInterface.into());
        }

        let mut buf = WriteBuf::new();

        buf.put_u8(Endianness::LITTLE.0);
        buf.put_u8(self.message_type().0);
        buf.put_u8(self.flags.0);
        buf.put_u8(protocol::VERSION);
        buf.put_u32(self.body.len() as u32);
        buf.put_u32(self.serial.get());

        let patch = buf.len();
        buf.put_u32(0);

        match &self.kind {
            MessageKind::MethodCall { path, member } => {
                put_string_field(&mut buf, FieldCode::PATH, TypeCode::OBJECT_PATH, path)?;
                put_optional_fields(&mut buf, self, Some(member), None, None)?;
            }
            MessageKind::MethodReturn { reply_serial } => {
                put_optional_fields(&mut buf, self, None, None, Some(reply_serial.get()))?;
            }
            MessageKind::Error {
                error_name,
                reply_serial,
            } => {
                put_optional_fields(
                    &mut buf,
                    self,
                    None,
                    Some(error_name),
                    Some(reply_serial.get()),
                )?;
            }
            MessageKind::Signal { path, member } => {
                put_string_field(&mut buf, FieldCode::PATH, TypeCode::OBJECT_PATH, path)?;
                put_optional_fields(&mut buf, self, Some(member), None, None)?;
            }
        }

        let fields_len = buf.len() - (patch + 4);
        buf.put_at_u32(patch, fields_len as u32);

        buf.align(8);
        buf.put_bytes(&self.body);

        if buf.len() > MAX_FRAME_LENGTH {
            return Err(ErrorKind::MessageTooLarge(buf.len() as u64).into());
        }

        Ok(buf.into_vec())
    }
}

/// Write the fields every kind shares, in field code order: interface (2),
/// member (3), error name (4), reply serial (5), destination (6), sender
/// (7) and body signature (8). Absent fields are skipped entirely.
fn put_optional_fields(
    buf: &mut WriteBuf,
    message: &Message,
    member: Option<&str>,
    error_name: Option<&str>,
    reply_serial: Option<u32>,
) -> Result<()> {
    if let Some(interface) = message.interface.as_deref() {
        put_string_field(buf, FieldCode::INTERFACE, TypeCode::STRING, interface)?;
    }

    if let Some(member) = member {
        put_string_field(buf, FieldCode::MEMBER, TypeCode::STRING, member)?;
    }

    if let Some(error_name) = error_name {
        put_string_field(buf, FieldCode::ERROR_NAME, TypeCode::STRING, error_name)?;
    }

    if let Some(reply_serial) = reply_serial {
        put_field_header(buf, FieldCode::REPLY_SERIAL, TypeCode::UINT32)?;
        buf.put_u32(reply_serial);
    }

    if let Some(destination) = message.destination.as_deref() {
        put_string_field(buf, FieldCode::DESTINATION, TypeCode::STRING, destination)?;
    }

    if let Some(sender) = message.sender.as_deref() {
        put_string_field(buf, FieldCode::SENDER, TypeCode::STRING, sender)?;
    }

    if !message.signature.is_empty() {
        put_field_header(buf, FieldCode::SIGNATURE, TypeCode::SIGNATURE)?;
        buf.put_signature(message.signature.as_str())?;
    }

    Ok(())
}

/// Each header field is a struct of field code and variant, so entries are
/// 8-aligned and start with the code byte and the embedded one-character
/// signature.
fn put_field_header(buf: &mut WriteBuf, code: FieldCode, contents: TypeCode) -> Result<()> {
    buf.align(8);
    buf.put_u8(code.0);

    let signature = [contents.0];
    buf.put_signature(std::str::from_utf8(&signature)?)?;
    Ok(())
}

fn put_string_field(
    buf: &mut WriteBuf,
    code: FieldCode,
    contents: TypeCode,
    value: &str,
) -> Result<()> {
    put_field_header(buf, code, contents)?;
    buf.put_str(value)
}
