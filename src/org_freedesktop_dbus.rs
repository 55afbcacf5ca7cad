//! Well-known addressing constants for the message bus itself.

/// The object path of the message bus.
pub(crate) const PATH: &str = "/org/freedesktop/DBus";

/// The destination name of the message bus.
pub(crate) const DESTINATION: &str = "org.freedesktop.DBus";

/// The interface of the message bus.
pub(crate) const INTERFACE: &str = "org.freedesktop.DBus";
