use std::fmt;

use crate::message::Message;
use crate::protocol::MessageType;
use crate::value::Value;

/// A predicate over messages, used to pick which broadcast signals a
/// subscription receives.
///
/// A rule is the conjunction of its populated fields; an empty rule
/// matches everything. The textual form handed to the bus is produced by
/// [`Display`][fmt::Display].
///
/// # Examples
///
/// ```
/// use wirebus::MatchRule;
///
/// let rule = MatchRule::signal()
///     .with_interface("org.freedesktop.DBus")
///     .with_member("NameOwnerChanged")
///     .with_arg(0, "org.example.Name");
///
/// assert_eq!(
///     rule.to_string(),
///     "type='signal',interface='org.freedesktop.DBus',\
///      member='NameOwnerChanged',arg0='org.example.Name'"
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchRule {
    message_type: Option<MessageType>,
    sender: Option<Box<str>>,
    interface: Option<Box<str>>,
    member: Option<Box<str>>,
    path: Option<Box<str>>,
    destination: Option<Box<str>>,
    args: Vec<(u8, Box<str>)>,
}

impl MatchRule {
    /// Construct an empty rule matching every message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct a rule matching signals.
    pub fn signal() -> Self {
        Self {
            message_type: Some(MessageType::SIGNAL),
            ..Self::default()
        }
    }

    /// Match only messages of the given type.
    pub fn with_message_type(self, message_type: MessageType) -> Self {
        Self {
            message_type: Some(message_type),
            ..self
        }
    }

    /// Match only messages from the given sender.
    pub fn with_sender(self, sender: &str) -> Self {
        Self {
            sender: Some(sender.into()),
            ..self
        }
    }

    /// Match only messages with the given interface.
    pub fn with_interface(self, interface: &str) -> Self {
        Self {
            interface: Some(interface.into()),
            ..self
        }
    }

    /// Match only messages with the given member.
    pub fn with_member(self, member: &str) -> Self {
        Self {
            member: Some(member.into()),
            ..self
        }
    }

    /// Match only messages emitted from the given object path.
    pub fn with_path(self, path: &str) -> Self {
        Self {
            path: Some(path.into()),
            ..self
        }
    }

    /// Match only messages addressed to the given destination.
    pub fn with_destination(self, destination: &str) -> Self {
        Self {
            destination: Some(destination.into()),
            ..self
        }
    }

    /// Match only messages whose string argument at `index` equals `value`.
    ///
    /// The bus recognises `arg0` through `arg63`.
    pub fn with_arg(mut self, index: u8, value: &str) -> Self {
        assert!(index < 64, "argument index out of range");

        self.args.retain(|(i, _)| *i != index);
        self.args.push((index, value.into()));
        self.args.sort_by_key(|(i, _)| *i);
        self
    }

    /// Test the rule against a message. Argument predicates decode the
    /// body; a body that fails to decode simply does not match.
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(message_type) = self.message_type {
            if message.message_type() != message_type {
                return false;
            }
        }

        if !optional_eq(self.sender.as_deref(), message.sender()) {
            return false;
        }

        if !optional_eq(self.interface.as_deref(), message.interface()) {
            return false;
        }

        if !optional_eq(self.member.as_deref(), message.member()) {
            return false;
        }

        if !optional_eq(self.path.as_deref(), message.path()) {
            return false;
        }

        if !optional_eq(self.destination.as_deref(), message.destination()) {
            return false;
        }

        if !self.args.is_empty() {
            let Ok(values) = message.args() else {
                return false;
            };

            for (index, expected) in &self.args {
                match values.get(usize::from(*index)) {
                    Some(Value::Str(value)) if value.as_str() == &**expected => {}
                    _ => return false,
                }
            }
        }

        true
    }
}

fn optional_eq(rule: Option<&str>, field: Option<&str>) -> bool {
    match rule {
        Some(expected) => field == Some(expected),
        None => true,
    }
}

/// The textual form sent to the bus with `AddMatch`: comma-separated
/// `key='value'` pairs, single quotes escaped as `\'`.
impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;

        let mut pair = |f: &mut fmt::Formatter<'_>, key: &str, value: &str| -> fmt::Result {
            if !first {
                f.write_str(",")?;
            }

            first = false;
            write!(f, "{key}='")?;

            for c in value.chars() {
                if c == '\'' {
                    f.write_str("\\'")?;
                } else {
                    write!(f, "{c}")?;
                }
            }

            f.write_str("'")
        };

        if let Some(message_type) = self.message_type {
            pair(f, "type", message_type.as_match_str())?;
        }

        if let Some(sender) = &self.sender {
            pair(f, "sender", sender)?;
        }

        if let Some(interface) = &self.interface {
            pair(f, "interface", interface)?;
        }

        if let Some(member) = &self.member {
            pair(f, "member", member)?;
        }

        if let Some(path) = &self.path {
            pair(f, "path", path)?;
        }

        if let Some(destination) = &self.destination {
            pair(f, "destination", destination)?;
        }

        for (index, value) in &self.args {
            let key = format!("arg{index}");
            pair(f, &key, value)?;
        }

        Ok(())
    }
}
