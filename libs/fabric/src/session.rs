use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::codec::{Codec, JsonCodec};
use crate::envelope::{Arguments, Envelope};
use crate::error::{Error, Result};
use crate::transport::{FrameReader, FrameWriter, TcpTransport};

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// A callable operation
///
/// Handlers only see the argument map. Results go back to the peer as new
/// envelopes sent through a [`SessionSender`].
#[async_trait::async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn call(&self, arguments: Arguments);
}

#[async_trait::async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn call(&self, arguments: Arguments) {
        (self)(arguments).await
    }
}

/// A handler object with a fixed table of operations
///
/// Every name listed by `operations` must be accepted by `invoke`.
#[async_trait::async_trait]
pub trait Component: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn operations(&self) -> &'static [&'static str];

    async fn invoke(&self, operation: &str, arguments: Arguments);
}

struct ComponentOperation<C> {
    component: Arc<C>,
    operation: &'static str,
}

#[async_trait::async_trait]
impl<C: Component> Handler for ComponentOperation<C> {
    async fn call(&self, arguments: Arguments) {
        self.component.invoke(self.operation, arguments).await
    }
}

/// Cloneable sending side of a session
///
/// Concurrent senders are serialized so frames never interleave. A send
/// abandoned part-way through a frame drops the writer and closes the sender,
/// since the stream can no longer be resynchronized.
#[derive(Clone)]
pub struct SessionSender {
    writer: Arc<Mutex<Option<FrameWriter<BoxedWriter>>>>,
    closed: Arc<watch::Sender<bool>>,
    codec: JsonCodec,
}

/// Marks the sender closed unless disarmed after a complete frame
struct CloseOnDrop<'a>(Option<&'a watch::Sender<bool>>);

impl CloseOnDrop<'_> {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CloseOnDrop<'_> {
    fn drop(&mut self) {
        if let Some(closed) = self.0.take() {
            closed.send_replace(true);
        }
    }
}

impl SessionSender {
    fn new<W: AsyncWrite + Send + Unpin + 'static>(writer: FrameWriter<W>) -> Self {
        let writer: FrameWriter<BoxedWriter> = writer.boxed();
        let (closed, _) = watch::channel(false);
        Self {
            writer: Arc::new(Mutex::new(Some(writer))),
            closed: Arc::new(closed),
            codec: JsonCodec,
        }
    }

    /// Encode and write one envelope
    ///
    /// Fails with [`Error::ConnectionLost`] once the sender is closed.
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        let payload = self.codec.encode(envelope)?;
        let mut slot = self.writer.lock().await;
        if self.is_closed() {
            return Err(Error::ConnectionLost);
        }
        let mut writer = slot.take().ok_or(Error::ConnectionLost)?;

        let guard = CloseOnDrop(Some(self.closed.as_ref()));
        writer.write_frame(&payload).await?;
        *slot = Some(writer);
        guard.disarm();

        debug!(
            component = %envelope.component,
            operation = %envelope.operation,
            len = payload.len(),
            "sent envelope"
        );
        Ok(())
    }

    /// Shut the stream down; later sends fail with [`Error::ConnectionLost`]
    ///
    /// Waits for a send in progress to finish or be abandoned.
    pub async fn close(&self) -> Result<()> {
        self.closed.send_replace(true);
        let writer = self.writer.lock().await.take();
        match writer {
            Some(mut writer) => writer.shutdown().await,
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the sender is closed or a frame was left half-written
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// One framed connection plus its operation registry and receive loop
pub struct Session<R> {
    reader: FrameReader<R>,
    sender: SessionSender,
    registry: HashMap<(String, String), Arc<dyn Handler>>,
    codec: JsonCodec,
}

impl Session<OwnedReadHalf> {
    pub fn from_tcp(transport: TcpTransport) -> Self {
        let (reader, writer) = transport.into_split();
        Self::new(reader, writer)
    }
}

impl<S> Session<ReadHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Build a session over any duplex byte stream
    pub fn from_stream(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        Self::new(FrameReader::new(read), FrameWriter::new(write))
    }
}

impl<R: AsyncRead + Send + Unpin + 'static> Session<R> {
    pub fn new<W: AsyncWrite + Send + Unpin + 'static>(
        reader: FrameReader<R>,
        writer: FrameWriter<W>,
    ) -> Self {
        Self {
            reader,
            sender: SessionSender::new(writer),
            registry: HashMap::new(),
            codec: JsonCodec,
        }
    }

    /// Register `handler` under `component.operation`
    ///
    /// The first registration of a name wins; returns false for a duplicate.
    pub fn register(
        &mut self,
        component: impl Into<String>,
        operation: impl Into<String>,
        handler: impl Handler,
    ) -> bool {
        let key = (component.into(), operation.into());
        if self.registry.contains_key(&key) {
            debug!(component = %key.0, operation = %key.1, "operation already registered");
            return false;
        }
        self.registry.insert(key, Arc::new(handler));
        true
    }

    /// Register every operation a component exposes
    pub fn include<C: Component>(&mut self, component: Arc<C>) {
        let name = component.name();
        for &operation in component.operations() {
            self.register(
                name,
                operation,
                ComponentOperation {
                    component: Arc::clone(&component),
                    operation,
                },
            );
        }
    }

    pub fn is_registered(&self, component: &str, operation: &str) -> bool {
        self.registry
            .contains_key(&(component.to_string(), operation.to_string()))
    }

    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.sender.send(envelope).await
    }

    /// Read and dispatch frames until the connection ends
    ///
    /// Returns `Ok(())` when the peer closes cleanly between frames and the
    /// terminal transport error otherwise. Malformed envelopes and unknown
    /// operations are dropped without ending the loop. Each handler runs on
    /// its own task.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let payload = match self.reader.read_frame().await {
                Ok(payload) => payload,
                Err(e) if e.is_clean_close() => {
                    debug!("peer closed the session");
                    return Ok(());
                }
                Err(e) => return Err(e),
            };

            let envelope: Envelope = match self.codec.decode(&payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(error = %e, len = payload.len(), "dropping malformed envelope");
                    continue;
                }
            };

            let Envelope {
                component,
                operation,
                arguments,
            } = envelope;
            let key = (component, operation);
            let Some(handler) = self.registry.get(&key) else {
                warn!(component = %key.0, operation = %key.1, "no such operation");
                continue;
            };

            debug!(component = %key.0, operation = %key.1, "dispatching");
            let handler = Arc::clone(handler);
            tokio::spawn(async move { handler.call(arguments).await });
        }
    }
}
