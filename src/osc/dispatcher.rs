//! Inbound message dispatch: pending request correlation and listener registry
//!
//! Shared by every [`Transport`](super::Transport) implementation so the
//! correlation rules live in one place.

use parking_lot::{Mutex, RwLock};
use rosc::OscType;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::trace;

use super::{matches_prefix, ListenerId, MessageCallback, OscReply};
use crate::error::{LiveError, LiveResult};

/// One outstanding request waiting for its reply
struct PendingRequest {
    id: u64,
    reply_address: String,
    prefix: Vec<OscType>,
    tx: oneshot::Sender<OscReply>,
}

impl PendingRequest {
    fn matches(&self, reply: &OscReply) -> bool {
        self.reply_address == reply.address && matches_prefix(&reply.args, &self.prefix)
    }
}

/// Routes inbound messages to pending requests and persistent listeners
///
/// Requests are correlated strictly by reply address plus argument prefix,
/// never by call order, so any number of requests may be in flight at once.
/// Callbacks run outside of the registry locks: a listener may add or remove
/// listeners from inside its callback.
pub struct Dispatcher {
    pending: Mutex<Vec<PendingRequest>>,
    listeners: RwLock<HashMap<String, Vec<(ListenerId, MessageCallback)>>>,
    next_id: AtomicU64,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_listener(&self, address: &str, callback: MessageCallback) -> ListenerId {
        let id = ListenerId(self.next_id());
        self.listeners
            .write()
            .entry(address.to_string())
            .or_default()
            .push((id, callback));
        trace!(address, id = id.0, "listener added");
        id
    }

    pub fn remove_listener(&self, address: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let Some(callbacks) = listeners.get_mut(address) else {
            return false;
        };

        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        let removed = callbacks.len() != before;

        if callbacks.is_empty() {
            listeners.remove(address);
        }
        removed
    }

    /// Number of listeners registered on an address
    pub fn listener_count(&self, address: &str) -> usize {
        self.listeners.read().get(address).map_or(0, Vec::len)
    }

    /// Number of requests still waiting for a reply
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Drop every pending request (their waiters see `NotConnected`) and listener
    pub fn clear(&self) {
        self.pending.lock().clear();
        self.listeners.write().clear();
    }

    /// Deliver an inbound message. Returns how many waiters and listeners saw it.
    pub fn dispatch(&self, reply: OscReply) -> usize {
        let waiters: Vec<oneshot::Sender<OscReply>> = {
            let mut pending = self.pending.lock();
            let mut matched = Vec::new();
            let mut i = 0;
            while i < pending.len() {
                if pending[i].matches(&reply) {
                    matched.push(pending.swap_remove(i).tx);
                } else {
                    i += 1;
                }
            }
            matched
        };

        let callbacks: Vec<MessageCallback> = self
            .listeners
            .read()
            .get(&reply.address)
            .map(|entries| entries.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default();

        let delivered = waiters.len() + callbacks.len();

        for tx in waiters {
            let _ = tx.send(reply.clone());
        }
        for callback in callbacks {
            callback(&reply);
        }

        if delivered == 0 {
            trace!(address = %reply.address, "unhandled OSC message");
        }
        delivered
    }

    /// Register a waiter, run `send`, then wait for the correlated reply
    ///
    /// The waiter is registered before `send` runs so a reply that arrives
    /// immediately is never lost.
    pub async fn request<F>(
        &self,
        address: &str,
        reply_address: &str,
        timeout: Duration,
        prefix: Vec<OscType>,
        send: F,
    ) -> LiveResult<OscReply>
    where
        F: FnOnce() -> LiveResult<()>,
    {
        let (tx, rx) = oneshot::channel();
        let id = self.next_id();

        self.pending.lock().push(PendingRequest {
            id,
            reply_address: reply_address.to_string(),
            prefix,
            tx,
        });

        if let Err(e) = send() {
            self.forget(id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            // Sender dropped: the transport was torn down underneath us
            Ok(Err(_)) => Err(LiveError::NotConnected),
            Err(_) => {
                self.forget(id);
                Err(LiveError::RequestTimeout {
                    address: address.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending.lock().retain(|pending| pending.id != id);
    }
}
