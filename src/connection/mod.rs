//! The connection layer: transport, reply correlation and signal
//! dispatch.

pub use self::connection::{Connection, SubscriptionId};
mod connection;

pub use self::builder::ConnectionBuilder;
mod builder;

pub use self::transport::{BusKind, Transport};
mod transport;

#[cfg(test)]
mod tests;
