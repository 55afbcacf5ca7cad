use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use crate::codec::WriteBuf;
use crate::match_rule::MatchRule;
use crate::message::{FrameHeader, Message, MessageKind};
use crate::protocol::FIXED_HEADER_LENGTH;
use crate::signature::OwnedSignature;
use crate::value::Value;

use super::{Connection, Transport};

/// A scripted bus daemon on the far end of an in-memory pipe.
struct FakeBus {
    io: DuplexStream,
    serial: u32,
    held: Option<Message>,
    serials: mpsc::UnboundedSender<u32>,
}

impl FakeBus {
    fn next_serial(&mut self) -> NonZeroU32 {
        self.serial += 1;
        NonZeroU32::new(self.serial).unwrap()
    }

    async fn send(&mut self, message: Message) {
        let frame = message.serialize().unwrap();
        self.io.write_all(&frame).await.unwrap();
    }

    fn string_body(text: &str) -> (OwnedSignature, Vec<u8>) {
        let mut body = WriteBuf::new();
        body.put_str(text).unwrap();
        (OwnedSignature::new("s").unwrap(), body.into_vec())
    }

    fn method_return(&mut self, to: &Message) -> Message {
        Message::new(
            MessageKind::MethodReturn {
                reply_serial: to.serial(),
            },
            self.next_serial(),
        )
    }

    async fn run(mut self) {
        while let Some(frame) = read_frame(&mut self.io).await {
            let message = Message::deserialize(&frame).unwrap();
            let _ = self.serials.send(message.serial().get());

            let member = message.member().map(str::to_owned);

            match member.as_deref() {
                Some("Hello") => {
                    let (signature, body) = Self::string_body(":1.7");
                    let reply = self.method_return(&message).with_body(signature, body);
                    self.send(reply).await;
                }
                Some("AddMatch") | Some("RemoveMatch") => {
                    let reply = self.method_return(&message);
                    self.send(reply).await;
                }
                Some("Echo") => {
                    let reply = self
                        .method_return(&message)
                        .with_body(message.signature().clone(), message.body.clone());
                    self.send(reply).await;
                }
                Some("Fail") => {
                    let (signature, body) = Self::string_body("nope");
                    let reply = Message::new(
                        MessageKind::Error {
                            error_name: "org.example.Failure".into(),
                            reply_serial: message.serial(),
                        },
                        self.next_serial(),
                    )
                    .with_body(signature, body);
                    self.send(reply).await;
                }
                Some("HoldA") => {
                    self.held = Some(message);
                }
                Some("SwapB") => {
                    // Answer B before the held A, exercising out-of-order
                    // correlation.
                    let reply = self
                        .method_return(&message)
                        .with_body(message.signature().clone(), message.body.clone());
                    self.send(reply).await;

                    if let Some(held) = self.held.take() {
                        let reply = self
                            .method_return(&held)
                            .with_body(held.signature().clone(), held.body.clone());
                        self.send(reply).await;
                    }
                }
                Some("EmitSignals") => {
                    let (signature, body) = Self::string_body("hello");
                    let signal = Message::signal("/org/example/Obj", "Ping", self.next_serial())
                        .with_interface("org.example.Iface")
                        .with_body(signature, body);
                    self.send(signal).await;

                    let (signature, body) = Self::string_body("other");
                    let signal = Message::signal("/org/example/Obj", "Pong", self.next_serial())
                        .with_interface("org.example.Iface")
                        .with_body(signature, body);
                    self.send(signal).await;

                    let reply = self.method_return(&message);
                    self.send(reply).await;
                }
                Some("Never") => {}
                _ => {}
            }
        }
    }
}

async fn read_frame(io: &mut DuplexStream) -> Option<Vec<u8>> {
    let mut fixed = [0u8; FIXED_HEADER_LENGTH];
    io.read_exact(&mut fixed).await.ok()?;

    let header = FrameHeader::parse(&fixed).ok()?;
    let remaining = header.remaining_length().ok()?;

    let mut frame = vec![0u8; FIXED_HEADER_LENGTH + remaining];
    frame[..FIXED_HEADER_LENGTH].copy_from_slice(&fixed);
    io.read_exact(&mut frame[FIXED_HEADER_LENGTH..]).await.ok()?;
    Some(frame)
}

async fn connect() -> (Connection, mpsc::UnboundedReceiver<u32>) {
    let (client, server) = tokio::io::duplex(1 << 16);
    let (serials, seen) = mpsc::unbounded_channel();

    tokio::spawn(
        FakeBus {
            io: server,
            serial: 0x1000,
            held: None,
            serials,
        }
        .run(),
    );

    let connection = Connection::start(Transport::from_stream(client))
        .await
        .unwrap();

    (connection, seen)
}

const DEST: &str = "org.example.Service";
const PATH: &str = "/org/example/Obj";
const IFACE: &str = "org.example.Iface";

#[tokio::test]
async fn hello_assigns_unique_name() {
    let (connection, _seen) = connect().await;
    assert_eq!(connection.unique_name(), ":1.7");
    connection.close().await;
}

#[tokio::test]
async fn call_round_trips_arguments() {
    let (connection, _seen) = connect().await;

    let args = vec![Value::Str("ping".into()), Value::Uint32(7)];
    let reply = connection
        .call(DEST, PATH, IFACE, "Echo", "su", args.clone())
        .await
        .unwrap();

    assert_eq!(reply, args);
    assert_eq!(connection.waiter_count(), 0);
    connection.close().await;
}

#[tokio::test]
async fn replies_correlate_out_of_order() {
    let (connection, _seen) = connect().await;

    let first = connection.call(DEST, PATH, IFACE, "HoldA", "u", vec![Value::Uint32(1)]);
    let second = connection.call(DEST, PATH, IFACE, "SwapB", "u", vec![Value::Uint32(2)]);

    let (first, second) = tokio::join!(first, second);

    assert_eq!(first.unwrap(), [Value::Uint32(1)]);
    assert_eq!(second.unwrap(), [Value::Uint32(2)]);
    connection.close().await;
}

#[tokio::test]
async fn error_reply_surfaces_name_and_message() {
    let (connection, _seen) = connect().await;

    let error = connection
        .call(DEST, PATH, IFACE, "Fail", "", Vec::new())
        .await
        .unwrap_err();

    assert_eq!(error.response_error(), Some(("org.example.Failure", "nope")));
    connection.close().await;
}

#[tokio::test]
async fn call_after_close_fails_fast() {
    let (connection, _seen) = connect().await;
    connection.close().await;

    let error = connection
        .call(DEST, PATH, IFACE, "Echo", "", Vec::new())
        .await
        .unwrap_err();

    assert!(error.is_closed());
    assert_eq!(connection.waiter_count(), 0);

    // Closing again is a no-op.
    connection.close().await;
}

#[tokio::test]
async fn close_releases_pending_calls() {
    let (connection, _seen) = connect().await;
    let connection = Arc::new(connection);

    let closer = connection.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        closer.close().await;
    });

    let error = connection
        .call(DEST, PATH, IFACE, "Never", "", Vec::new())
        .await
        .unwrap_err();

    assert!(error.is_closed());
    assert_eq!(connection.waiter_count(), 0);
}

#[tokio::test]
async fn deadline_cancels_and_removes_the_waiter() {
    let (connection, _seen) = connect().await;

    let error = connection
        .call_with_deadline(
            DEST,
            PATH,
            IFACE,
            "Never",
            "",
            Vec::new(),
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

    assert!(error.is_cancelled());
    assert_eq!(connection.waiter_count(), 0);
    connection.close().await;
}

#[tokio::test]
async fn signals_reach_matching_subscriptions() {
    let (connection, _seen) = connect().await;

    let (tx, mut delivered) = mpsc::unbounded_channel();

    let rule = MatchRule::signal()
        .with_interface(IFACE)
        .with_member("Ping");

    connection
        .subscribe(rule, move |message| {
            let _ = tx.send(message.args().unwrap());
        })
        .await
        .unwrap();

    connection
        .call(DEST, PATH, IFACE, "EmitSignals", "", Vec::new())
        .await
        .unwrap();

    // The matching signal was written before the reply, so it has been
    // dispatched by now.
    assert_eq!(
        delivered.try_recv().unwrap(),
        [Value::Str("hello".into())]
    );
    assert!(delivered.try_recv().is_err());

    connection.close().await;
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let (connection, _seen) = connect().await;

    let (tx, mut delivered) = mpsc::unbounded_channel();

    let id = connection
        .subscribe(MatchRule::signal().with_member("Ping"), move |message| {
            let _ = tx.send(message.member().map(str::to_owned));
        })
        .await
        .unwrap();

    connection.unsubscribe(id).await.unwrap();

    connection
        .call(DEST, PATH, IFACE, "EmitSignals", "", Vec::new())
        .await
        .unwrap();

    assert!(delivered.try_recv().is_err());
    connection.close().await;
}

#[tokio::test]
async fn emit_reaches_the_bus() {
    let (connection, mut seen) = connect().await;

    connection
        .emit(PATH, IFACE, "Changed", "s", vec![Value::Str("state".into())])
        .await
        .unwrap();

    // The follow-up call is ordered behind the signal on the stream, so
    // once it completes the bus has consumed both frames.
    connection
        .call(DEST, PATH, IFACE, "Echo", "", Vec::new())
        .await
        .unwrap();

    let mut frames = 0;

    while seen.try_recv().is_ok() {
        frames += 1;
    }

    // Hello, the signal, and the call.
    assert_eq!(frames, 3);
    connection.close().await;
}

#[tokio::test]
async fn serials_are_unique_and_nonzero() {
    let (connection, mut seen) = connect().await;

    for _ in 0..3 {
        connection
            .call(DEST, PATH, IFACE, "Echo", "", Vec::new())
            .await
            .unwrap();
    }

    connection.close().await;

    let mut serials = Vec::new();

    while let Ok(serial) = seen.try_recv() {
        serials.push(serial);
    }

    // Hello plus the three calls.
    assert_eq!(serials.len(), 4);
    assert!(serials.iter().all(|&serial| serial != 0));

    let mut deduped = serials.clone();
    deduped.sort_unstable();
    deduped.dedup();
    assert_eq!(deduped.len(), serials.len());
}
