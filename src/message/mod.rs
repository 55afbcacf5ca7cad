//! The message model and its wire framing.

pub use self::message::{Message, MessageKind};
mod message;

mod serialize;

pub(crate) use self::deserialize::FrameHeader;
mod deserialize;
