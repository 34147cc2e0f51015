use std::sync::Arc;
use std::time::Duration;

use burrow_fabric::{
    codec::{Codec, JsonCodec},
    error::Error,
    transport::{FrameReader, FrameWriter},
    Arguments, Component, Envelope, Session,
};
use tokio::io::{DuplexStream, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, Mutex};

type Peer = (FrameReader<ReadHalf<DuplexStream>>, FrameWriter<WriteHalf<DuplexStream>>);

/// A session over an in-memory stream plus the raw framed peer end
fn session_pair() -> (Session<ReadHalf<DuplexStream>>, Peer) {
    let (local, remote) = tokio::io::duplex(64 * 1024);
    let (read, write) = tokio::io::split(remote);
    (
        Session::from_stream(local),
        (FrameReader::new(read), FrameWriter::new(write)),
    )
}

async fn send_envelope(writer: &mut FrameWriter<WriteHalf<DuplexStream>>, envelope: Envelope) {
    let bytes = JsonCodec.encode(&envelope).unwrap();
    writer.write_frame(&bytes).await.unwrap();
}

async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for handler")
        .expect("channel closed")
}

/// Handler that forwards `tag` and the `msg` argument into a channel
fn reporting(
    tag: &'static str,
    tx: mpsc::UnboundedSender<(&'static str, Vec<u8>)>,
) -> impl Fn(Arguments) -> std::future::Ready<()> + Send + Sync + 'static {
    move |args: Arguments| {
        let msg = args.get("msg").cloned().unwrap_or_default();
        let _ = tx.send((tag, msg));
        std::future::ready(())
    }
}

#[tokio::test]
async fn first_registration_wins() {
    let (mut session, (_reader, mut writer)) = session_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();

    assert!(session.register("tcpWorker", "Message", reporting("first", tx.clone())));
    assert!(!session.register("tcpWorker", "Message", reporting("second", tx)));
    tokio::spawn(session.run());

    send_envelope(
        &mut writer,
        Envelope::new("tcpWorker", "Message").with_arg("msg", "hi"),
    )
    .await;

    assert_eq!(recv(&mut rx).await, ("first", b"hi".to_vec()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unknown_operation_and_malformed_frames_are_skipped() {
    let (mut session, (_reader, mut writer)) = session_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.register("tcpWorker", "Message", reporting("message", tx));
    let running = tokio::spawn(session.run());

    send_envelope(&mut writer, Envelope::new("tcpWorker", "Nope")).await;
    send_envelope(&mut writer, Envelope::new("otherComponent", "Message")).await;
    writer.write_frame(b"{ definitely not an envelope").await.unwrap();
    send_envelope(
        &mut writer,
        Envelope::new("tcpWorker", "Message").with_arg("msg", "still alive"),
    )
    .await;

    assert_eq!(recv(&mut rx).await, ("message", b"still alive".to_vec()));
    assert!(!running.is_finished());
}

#[tokio::test]
async fn slow_handler_does_not_stall_later_frames() {
    let (mut session, (_reader, mut writer)) = session_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let release_rx = Arc::new(Mutex::new(Some(release_rx)));

    let slow_tx = tx.clone();
    session.register("tcpWorker", "Slow", move |_args: Arguments| {
        let release_rx = Arc::clone(&release_rx);
        let slow_tx = slow_tx.clone();
        async move {
            let gate = release_rx.lock().await.take();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            let _ = slow_tx.send("slow");
        }
    });
    session.register("tcpWorker", "Fast", move |_args: Arguments| {
        let _ = tx.send("fast");
        std::future::ready(())
    });
    tokio::spawn(session.run());

    send_envelope(&mut writer, Envelope::new("tcpWorker", "Slow")).await;
    send_envelope(&mut writer, Envelope::new("tcpWorker", "Fast")).await;

    assert_eq!(recv(&mut rx).await, "fast");
    release_tx.send(()).unwrap();
    assert_eq!(recv(&mut rx).await, "slow");
}

#[tokio::test]
async fn run_ends_cleanly_when_peer_closes() {
    let (session, peer) = session_pair();
    let running = tokio::spawn(session.run());
    drop(peer);

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn run_fails_on_desynchronized_stream() {
    let (session, (_reader, writer)) = session_pair();
    let running = tokio::spawn(session.run());

    let mut raw = writer.into_inner();
    tokio::io::AsyncWriteExt::write_all(&mut raw, b"junk and more junk")
        .await
        .unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(Error::UnknownTag(tag)) if &tag == b"junk"));
}

#[tokio::test]
async fn concurrent_sends_never_interleave_frames() {
    let (session, (mut reader, _writer)) = session_pair();
    let sender = session.sender();

    let mut tasks = Vec::new();
    for i in 0..50u32 {
        let sender = sender.clone();
        tasks.push(tokio::spawn(async move {
            let envelope = Envelope::new("tcpWorker", "Message")
                .with_arg("msg", vec![i as u8; 4096 + i as usize]);
            sender.send(&envelope).await.unwrap();
        }));
    }

    let mut seen = Vec::new();
    for _ in 0..50 {
        let bytes = reader.read_frame().await.unwrap();
        let envelope: Envelope = JsonCodec.decode(&bytes).unwrap();
        let msg = envelope.arg("msg").unwrap();
        assert!(msg.iter().all(|b| *b == msg[0]));
        assert_eq!(msg.len(), 4096 + msg[0] as usize);
        seen.push(msg[0]);
    }
    for task in tasks {
        task.await.unwrap();
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..50u8).collect::<Vec<_>>());
}

#[tokio::test]
async fn send_after_close_reports_connection_lost() {
    let (session, _peer) = session_pair();
    let sender = session.sender();
    sender.close().await.unwrap();

    assert!(sender.is_closed());
    let result = sender.send(&Envelope::new("tcpWorker", "Message")).await;
    assert!(matches!(result, Err(Error::ConnectionLost)));
}

#[tokio::test]
async fn abandoned_send_closes_the_sender() {
    let (local, _remote) = tokio::io::duplex(64);
    let session = Session::from_stream(local);
    let sender = session.sender();

    let envelope = Envelope::new("tcpWorker", "Message").with_arg("msg", vec![7u8; 64 * 1024]);
    let stuck = tokio::time::timeout(Duration::from_millis(50), sender.send(&envelope)).await;
    assert!(stuck.is_err());

    assert!(sender.is_closed());
    tokio::time::timeout(Duration::from_secs(1), sender.closed())
        .await
        .expect("closed() did not resolve for a torn sender");
    let result = sender.send(&Envelope::new("tcpWorker", "Message")).await;
    assert!(matches!(result, Err(Error::ConnectionLost)));
}

struct Echo {
    seen: mpsc::UnboundedSender<String>,
}

#[async_trait::async_trait]
impl Component for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn operations(&self) -> &'static [&'static str] {
        &["Ping", "Pong"]
    }

    async fn invoke(&self, operation: &str, _arguments: Arguments) {
        let _ = self.seen.send(operation.to_string());
    }
}

#[tokio::test]
async fn include_registers_every_component_operation() {
    let (mut session, (_reader, mut writer)) = session_pair();
    let (tx, mut rx) = mpsc::unbounded_channel();
    session.include(Arc::new(Echo { seen: tx }));

    assert!(session.is_registered("echo", "Ping"));
    assert!(session.is_registered("echo", "Pong"));
    assert!(!session.is_registered("echo", "Other"));
    tokio::spawn(session.run());

    send_envelope(&mut writer, Envelope::new("echo", "Pong")).await;
    assert_eq!(recv(&mut rx).await, "Pong");
}
