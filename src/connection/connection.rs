use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::{encode_params, WriteBuf};
use crate::error::{Error, ErrorKind, Result};
use crate::match_rule::MatchRule;
use crate::message::{FrameHeader, Message, MessageKind};
use crate::org_freedesktop_dbus;
use crate::protocol::{Flags, FIXED_HEADER_LENGTH};
use crate::signature::OwnedSignature;
use crate::value::Value;

use super::Transport;

/// Identifies one signal subscription on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn Fn(&Message) + Send + Sync + 'static>;

struct Subscription {
    id: u64,
    rule: MatchRule,
    handler: Handler,
}

/// State shared between the connection handle and its reader task.
pub(crate) struct Shared {
    /// Write half of the transport. Taken on close; writes are serialised
    /// by the lock, which keeps per-caller send order intact.
    writer: tokio::sync::Mutex<Option<WriteHalf<Transport>>>,
    /// The next outbound serial.
    serial: AtomicU32,
    /// Reply waiters keyed by the serial of their call. `None` once the
    /// connection is closed, so late registrations fail fast.
    waiters: Mutex<Option<HashMap<u32, oneshot::Sender<Result<Message>>>>>,
    /// Signal subscriptions, read on every inbound signal.
    subscriptions: RwLock<Vec<Subscription>>,
    next_subscription: AtomicU64,
}

impl Shared {
    pub(crate) fn new(writer: WriteHalf<Transport>) -> Self {
        Self {
            writer: tokio::sync::Mutex::new(Some(writer)),
            serial: AtomicU32::new(1),
            waiters: Mutex::new(Some(HashMap::new())),
            subscriptions: RwLock::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    /// Allocate the next outbound serial, skipping zero on wrap-around.
    fn next_serial(&self) -> NonZeroU32 {
        loop {
            let serial = self.serial.fetch_add(1, Ordering::Relaxed);

            if let Some(serial) = NonZeroU32::new(serial) {
                return serial;
            }
        }
    }

    fn register_waiter(&self, serial: u32, tx: oneshot::Sender<Result<Message>>) -> Result<()> {
        let mut waiters = self.waiters.lock().unwrap();

        match waiters.as_mut() {
            Some(waiters) => {
                waiters.insert(serial, tx);
                Ok(())
            }
            None => Err(Error::new(ErrorKind::ConnectionClosed)),
        }
    }

    fn remove_waiter(&self, serial: u32) -> Option<oneshot::Sender<Result<Message>>> {
        self.waiters.lock().unwrap().as_mut()?.remove(&serial)
    }

    /// Close the waiter table and release everyone still waiting.
    fn fail_waiters(&self) {
        let waiters = self.waiters.lock().unwrap().take();

        if let Some(waiters) = waiters {
            for (_, tx) in waiters {
                let _ = tx.send(Err(Error::new(ErrorKind::ConnectionClosed)));
            }
        }
    }
}

/// An asynchronous connection to a D-Bus message bus.
///
/// One background reader task pulls frames off the transport and routes
/// them: replies to the caller that registered the matching serial,
/// signals to every subscription whose rule matches. Callers invoke
/// methods concurrently from any number of tasks.
///
/// # Examples
///
/// ```no_run
/// use wirebus::{Connection, Value};
///
/// # #[tokio::main] async fn main() -> wirebus::Result<()> {
/// let connection = Connection::session_bus().await?;
///
/// let names = connection
///     .call(
///         "org.freedesktop.DBus",
///         "/org/freedesktop/DBus",
///         "org.freedesktop.DBus",
///         "ListNames",
///         "",
///         Vec::new(),
///     )
///     .await?;
///
/// println!("{names:?}");
/// connection.close().await;
/// # Ok(()) }
/// ```
pub struct Connection {
    shared: Arc<Shared>,
    reader: Mutex<Option<JoinHandle<()>>>,
    unique_name: Box<str>,
}

impl Connection {
    /// Connect, authenticate and say `Hello` to the session bus.
    pub async fn session_bus() -> Result<Self> {
        super::ConnectionBuilder::new().connect().await
    }

    /// Connect, authenticate and say `Hello` to the system bus.
    pub async fn system_bus() -> Result<Self> {
        super::ConnectionBuilder::new().system_bus().connect().await
    }

    /// Take over a transport that has already completed its SASL
    /// handshake (see [`sasl::authenticate`][crate::sasl::authenticate]).
    pub async fn from_transport(transport: Transport) -> Result<Self> {
        Self::start(transport).await
    }

    /// Take over an authenticated transport: split it, start the reader
    /// task, and perform the implicit `Hello` which registers this client
    /// with the bus.
    pub(crate) async fn start(transport: Transport) -> Result<Self> {
        let (read_half, write_half) = tokio::io::split(transport);
        let shared = Arc::new(Shared::new(write_half));

        let reader = tokio::spawn(read_task(read_half, shared.clone()));

        let mut connection = Self {
            shared,
            reader: Mutex::new(Some(reader)),
            unique_name: Box::from(""),
        };

        let reply = match connection.hello().await {
            Ok(reply) => reply,
            Err(error) => {
                connection.close().await;
                return Err(error);
            }
        };

        connection.unique_name = reply.into();
        Ok(connection)
    }

    async fn hello(&self) -> Result<String> {
        let mut reply = self
            .call(
                org_freedesktop_dbus::DESTINATION,
                org_freedesktop_dbus::PATH,
                org_freedesktop_dbus::INTERFACE,
                "Hello",
                "",
                Vec::new(),
            )
            .await?;

        match reply.pop() {
            Some(Value::Str(name)) => Ok(name),
            _ => Err(Error::new(ErrorKind::ParamCountMismatch {
                expected: 1,
                found: 0,
            })),
        }
    }

    /// The unique `:1.N`-style name the bus assigned to this connection.
    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Invoke a method on a remote object and wait for its reply.
    ///
    /// `signature` describes `args`; the reply arguments are decoded
    /// against the signature the remote declared. An error reply surfaces
    /// as an [`Error`] whose [`response_error()`][Error::response_error]
    /// carries the remote error name and message.
    pub async fn call(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        member: &str,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let (serial, rx) = self
            .send_call(destination, path, interface, member, signature, args)
            .await?;

        match rx.await {
            Ok(reply) => reply_args(reply?),
            Err(..) => {
                self.shared.remove_waiter(serial);
                Err(Error::new(ErrorKind::ConnectionClosed))
            }
        }
    }

    /// Like [`call()`][Self::call], giving up after `deadline`.
    ///
    /// On expiry the waiter is deregistered, the caller gets a cancelled
    /// error, and a reply arriving later is dropped by the reader.
    pub async fn call_with_deadline(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        member: &str,
        signature: &str,
        args: Vec<Value>,
        deadline: Duration,
    ) -> Result<Vec<Value>> {
        let (serial, rx) = self
            .send_call(destination, path, interface, member, signature, args)
            .await?;

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(reply)) => reply_args(reply?),
            Ok(Err(..)) => {
                self.shared.remove_waiter(serial);
                Err(Error::new(ErrorKind::ConnectionClosed))
            }
            Err(..) => {
                self.shared.remove_waiter(serial);
                Err(Error::new(ErrorKind::Cancelled))
            }
        }
    }

    async fn send_call(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        member: &str,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<(u32, oneshot::Receiver<Result<Message>>)> {
        let (signature, body) = marshal_body(signature, &args)?;

        let serial = self.shared.next_serial();

        let message = Message::method_call(path, member, serial)
            .with_interface(interface)
            .with_destination(destination)
            .with_body(signature, body);

        let frame = message.serialize()?;

        let (tx, rx) = oneshot::channel();
        self.shared.register_waiter(serial.get(), tx)?;

        if let Err(error) = self.write_frame(&frame).await {
            self.shared.remove_waiter(serial.get());
            return Err(error);
        }

        Ok((serial.get(), rx))
    }

    /// Emit a signal. Fire and forget: no reply is expected and none is
    /// waited for.
    pub async fn emit(
        &self,
        path: &str,
        interface: &str,
        member: &str,
        signature: &str,
        args: Vec<Value>,
    ) -> Result<()> {
        let (signature, body) = marshal_body(signature, &args)?;

        let message = Message::signal(path, member, self.shared.next_serial())
            .with_interface(interface)
            .with_flags(Flags::NO_REPLY_EXPECTED)
            .with_body(signature, body);

        self.write_frame(&message.serialize()?).await
    }

    /// Subscribe to broadcast signals matching `rule`.
    ///
    /// The rule is installed on the bus with `AddMatch`. The handler runs
    /// on the reader task: it must not block, and anything expensive
    /// should be handed off to another task.
    pub async fn subscribe<F>(&self, rule: MatchRule, handler: F) -> Result<SubscriptionId>
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        let id = self.shared.next_subscription.fetch_add(1, Ordering::Relaxed);

        self.shared.subscriptions.write().unwrap().push(Subscription {
            id,
            rule: rule.clone(),
            handler: Box::new(handler),
        });

        if let Err(error) = self.bus_match_call("AddMatch", &rule).await {
            self.shared
                .subscriptions
                .write()
                .unwrap()
                .retain(|subscription| subscription.id != id);
            return Err(error);
        }

        Ok(SubscriptionId(id))
    }

    /// Drop a subscription and remove its rule from the bus. Unknown ids
    /// are ignored.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        let rule = {
            let mut subscriptions = self.shared.subscriptions.write().unwrap();

            let Some(index) = subscriptions
                .iter()
                .position(|subscription| subscription.id == id.0)
            else {
                return Ok(());
            };

            subscriptions.swap_remove(index).rule
        };

        self.bus_match_call("RemoveMatch", &rule).await?;
        Ok(())
    }

    async fn bus_match_call(&self, member: &str, rule: &MatchRule) -> Result<()> {
        self.call(
            org_freedesktop_dbus::DESTINATION,
            org_freedesktop_dbus::PATH,
            org_freedesktop_dbus::INTERFACE,
            member,
            "s",
            vec![Value::Str(rule.to_string())],
        )
        .await?;

        Ok(())
    }

    /// Gracefully shut the connection down: release every outstanding
    /// caller with a closed error, shut the transport, and join the
    /// reader task.
    pub async fn close(&self) {
        self.shared.fail_waiters();

        {
            let mut writer = self.shared.writer.lock().await;

            if let Some(mut writer) = writer.take() {
                let _ = writer.shutdown().await;
            }
        }

        let reader = self.reader.lock().unwrap().take();

        if let Some(reader) = reader {
            reader.abort();
            let _ = reader.await;
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut guard = self.shared.writer.lock().await;

        let Some(writer) = guard.as_mut() else {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        };

        match writer.write_all(frame).await {
            Ok(()) => Ok(()),
            Err(error) => {
                // A partial write leaves the stream mid-frame; there is no
                // resynchronising after that. Drop the write half so every
                // later send fails with ConnectionClosed instead of putting
                // more bytes on the wire.
                *guard = None;
                self.shared.fail_waiters();
                Err(error.into())
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn waiter_count(&self) -> usize {
        self.shared
            .waiters
            .lock()
            .unwrap()
            .as_ref()
            .map(HashMap::len)
            .unwrap_or_default()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.shared.fail_waiters();

        if let Ok(mut reader) = self.reader.lock() {
            if let Some(reader) = reader.take() {
                reader.abort();
            }
        }
    }
}

fn marshal_body(signature: &str, args: &[Value]) -> Result<(OwnedSignature, Vec<u8>)> {
    let signature = OwnedSignature::new(signature)?;
    let mut body = WriteBuf::new();
    encode_params(&mut body, signature.nodes(), args)?;
    Ok((signature, body.into_vec()))
}

/// Turn a routed reply into what the caller sees: decoded arguments for a
/// method return, an error for an error reply.
fn reply_args(message: Message) -> Result<Vec<Value>> {
    match message.kind() {
        MessageKind::MethodReturn { .. } => message.args(),
        MessageKind::Error { error_name, .. } => {
            let description = message
                .args()
                .ok()
                .and_then(|values| values.into_iter().next())
                .and_then(|value| match value {
                    Value::Str(text) => Some(text),
                    _ => None,
                })
                .unwrap_or_default();

            Err(Error::new(ErrorKind::ResponseError(
                error_name.clone(),
                description.into(),
            )))
        }
        _ => Err(Error::new(ErrorKind::InvalidHeaderField)),
    }
}

/// The reader loop: pull one frame at a time off the transport and route
/// it. Runs until the transport fails or the frame stream turns
/// malformed, then releases every waiter.
pub(crate) async fn read_task(mut reader: ReadHalf<Transport>, shared: Arc<Shared>) {
    let error = loop {
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(error) => break error,
        };

        // A frame that fails header decoding poisons the stream: lengths
        // can no longer be trusted, so the connection goes down. Body
        // decoding, in contrast, happens at the consumer and only fails
        // that one message.
        match Message::deserialize(&frame) {
            Ok(message) => dispatch(&shared, message),
            Err(error) => break error,
        }
    };

    log::debug!("connection: reader stopped: {error}");
    shared.fail_waiters();
}

async fn read_frame(reader: &mut ReadHalf<Transport>) -> Result<Vec<u8>> {
    let mut fixed = [0u8; FIXED_HEADER_LENGTH];
    reader.read_exact(&mut fixed).await?;

    let header = FrameHeader::parse(&fixed)?;
    let remaining = header.remaining_length()?;

    let mut frame = vec![0u8; FIXED_HEADER_LENGTH + remaining];
    frame[..FIXED_HEADER_LENGTH].copy_from_slice(&fixed);

    if let Err(error) = reader.read_exact(&mut frame[FIXED_HEADER_LENGTH..]).await {
        if error.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(Error::new(ErrorKind::IncompleteMessage));
        }

        return Err(error.into());
    }

    Ok(frame)
}

fn dispatch(shared: &Arc<Shared>, message: Message) {
    if let Some(reply_serial) = message.reply_serial() {
        match shared.remove_waiter(reply_serial.get()) {
            Some(tx) => {
                let _ = tx.send(Ok(message));
            }
            None => {
                // Belongs to a cancelled or timed-out call.
                log::debug!(
                    "connection: dropping reply to unknown serial {reply_serial}"
                );
            }
        }

        return;
    }

    if matches!(message.kind(), MessageKind::Signal { .. }) {
        let subscriptions = shared.subscriptions.read().unwrap();

        for subscription in subscriptions.iter() {
            if subscription.rule.matches(&message) {
                (subscription.handler)(&message);
            }
        }

        return;
    }

    // This is a pure client; nobody serves method calls here.
    log::debug!(
        "connection: ignoring inbound method call {:?}",
        message.member()
    );
}
