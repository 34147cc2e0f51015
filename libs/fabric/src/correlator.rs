use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::envelope::Arguments;
use crate::error::{Error, Result};

type ReplySlot = oneshot::Sender<Result<Arguments>>;

#[derive(Default)]
struct State {
    next_id: u32,
    waiters: HashMap<u32, ReplySlot>,
    closed: bool,
}

/// Matches replies arriving out of order to the callers waiting on them
///
/// The lock guards only the id counter and the pending table; it is never
/// held while a caller waits.
#[derive(Clone, Default)]
pub struct Correlator {
    state: Arc<Mutex<State>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next request id; strictly increasing, skipping 0 and ids still pending
    pub fn allocate_id(&self) -> u32 {
        let mut state = self.lock();
        loop {
            state.next_id = state.next_id.wrapping_add(1);
            let id = state.next_id;
            if id != 0 && !state.waiters.contains_key(&id) {
                return id;
            }
        }
    }

    /// Record a reply slot for `id`
    ///
    /// Fails with [`Error::ConnectionLost`] once the correlator is closed.
    pub fn register(&self, id: u32) -> Result<PendingReply> {
        let mut state = self.lock();
        if state.closed {
            return Err(Error::ConnectionLost);
        }
        if state.waiters.contains_key(&id) {
            return Err(Error::custom(format!("request id {id} is already pending")));
        }
        let (tx, rx) = oneshot::channel();
        state.waiters.insert(id, tx);
        Ok(PendingReply {
            id,
            rx,
            state: Arc::clone(&self.state),
            settled: false,
        })
    }

    /// Register a slot for `id`, run `send`, then wait for the reply
    ///
    /// The slot is watched while `send` runs, so [`Correlator::close`]
    /// abandons a send stuck behind a peer that stopped reading. With a
    /// `deadline` the send and the wait together fail with
    /// [`Error::ReplyTimeout`] when it expires. A failed send removes the slot
    /// and returns the send error.
    pub async fn await_reply<F>(
        &self,
        id: u32,
        send: F,
        deadline: Option<Duration>,
    ) -> Result<Arguments>
    where
        F: Future<Output = Result<()>>,
    {
        let mut pending = self.register(id)?;
        let exchange = async move {
            tokio::select! {
                biased;
                sent = send => sent?,
                outcome = pending.recv() => return outcome,
            }
            pending.recv().await
        };
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, exchange)
                .await
                .unwrap_or(Err(Error::ReplyTimeout(deadline))),
            None => exchange.await,
        }
    }

    /// Hand `arguments` to the caller waiting on `id`
    ///
    /// Returns false when nobody is waiting (late or duplicate reply).
    pub fn deliver(&self, id: u32, arguments: Arguments) -> bool {
        let slot = self.lock().waiters.remove(&id);
        match slot {
            Some(slot) => {
                if slot.send(Ok(arguments)).is_err() {
                    debug!(request_id = id, "waiter went away before its reply");
                    return false;
                }
                true
            }
            None => {
                warn!(request_id = id, "discarding reply for unknown request");
                false
            }
        }
    }

    /// Fail every pending wait with [`Error::ConnectionLost`]
    ///
    /// Later registrations fail immediately. Returns how many waiters were
    /// released.
    pub fn close(&self) -> usize {
        let waiters: Vec<ReplySlot> = {
            let mut state = self.lock();
            state.closed = true;
            state.waiters.drain().map(|(_, slot)| slot).collect()
        };
        let released = waiters.len();
        for slot in waiters {
            let _ = slot.send(Err(Error::ConnectionLost));
        }
        released
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn pending(&self) -> usize {
        self.lock().waiters.len()
    }
}

/// A registered reply slot
///
/// Dropping it before the reply arrives removes the slot from the table.
pub struct PendingReply {
    id: u32,
    rx: oneshot::Receiver<Result<Arguments>>,
    state: Arc<Mutex<State>>,
    settled: bool,
}

impl PendingReply {
    pub async fn wait(mut self, deadline: Option<Duration>) -> Result<Arguments> {
        match deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.recv())
                .await
                .unwrap_or(Err(Error::ReplyTimeout(deadline))),
            None => self.recv().await,
        }
    }

    async fn recv(&mut self) -> Result<Arguments> {
        let received = (&mut self.rx).await;
        self.settled = true;
        match received {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::ConnectionLost),
        }
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .waiters
                .remove(&self.id);
        }
    }
}
