//! Marshalling and unmarshalling of values over an aligned buffer.
//!
//! Alignment is measured from offset 0 of the buffer, which must coincide
//! with the start of the message. Message bodies start on an 8-byte
//! boundary, so a body marshalled into its own buffer lines up the same
//! way it does inside the full frame.

pub use self::cursor::{ReadBuf, WriteBuf};
mod cursor;

pub use self::encode::{encode, encode_params};
mod encode;

pub use self::decode::{decode, decode_params};
mod decode;

#[cfg(test)]
mod tests;
