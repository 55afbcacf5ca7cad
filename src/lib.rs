//! An asynchronous client for the D-Bus message bus.
//!
//! The crate is built around three pieces: the [`signature`] grammar, a
//! dynamic [`Value`] codec that marshals values against a signature with
//! the alignment rules of the wire format, and a [`Connection`] that owns
//! the transport, correlates method replies by serial, and dispatches
//! broadcast signals to [`MatchRule`] subscriptions.
//!
//! ```no_run
//! use wirebus::{Connection, MatchRule};
//!
//! # #[tokio::main] async fn main() -> wirebus::Result<()> {
//! let connection = Connection::session_bus().await?;
//!
//! let owner = connection
//!     .call(
//!         "org.freedesktop.DBus",
//!         "/org/freedesktop/DBus",
//!         "org.freedesktop.DBus",
//!         "GetNameOwner",
//!         "s",
//!         vec!["org.freedesktop.DBus".into()],
//!     )
//!     .await?;
//!
//! println!("owner: {owner:?}");
//!
//! let rule = MatchRule::signal().with_member("NameOwnerChanged");
//!
//! connection
//!     .subscribe(rule, |message| {
//!         println!("{:?}: {:?}", message.member(), message.args());
//!     })
//!     .await?;
//! # Ok(()) }
//! ```

#[doc(inline)]
pub use self::connection::{BusKind, Connection, ConnectionBuilder, SubscriptionId, Transport};
mod connection;

#[doc(inline)]
pub use self::error::{Error, Result};
mod error;

#[doc(inline)]
pub use self::protocol::{Endianness, Flags, MessageType, TypeCode};
pub mod protocol;

#[doc(inline)]
pub use self::signature::{OwnedSignature, SignatureError, TypeNode};
pub mod signature;

pub mod codec;

#[doc(inline)]
pub use self::value::Value;
mod value;

pub use self::message::{Message, MessageKind};
mod message;

#[doc(inline)]
pub use self::match_rule::MatchRule;
mod match_rule;

pub use self::sasl::{AuthError, AuthMechanism};
pub mod sasl;

mod org_freedesktop_dbus;
