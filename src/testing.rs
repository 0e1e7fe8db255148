//! In-memory stand-in for Live used by unit tests

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rosc::OscType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::OscConfig;
use crate::error::{LiveError, LiveResult};
use crate::osc::{
    ConnectionStatus, Dispatcher, ListenerId, MessageCallback, OscReply, StatusCallback,
    Transport,
};

/// Scripted reply: `Some(args)` answers on the request address, `None` stays silent
pub type Responder = Box<dyn Fn(&str, &[OscType]) -> Option<Vec<OscType>> + Send + Sync>;

/// Transport that answers requests from a script and records what was sent
pub struct FakeLive {
    dispatcher: Dispatcher,
    connected: AtomicBool,
    responder: RwLock<Responder>,
    sent: Mutex<Vec<(String, Vec<OscType>)>>,
    status_callbacks: RwLock<Vec<StatusCallback>>,
}

impl FakeLive {
    pub fn connected<F>(responder: F) -> Arc<Self>
    where
        F: Fn(&str, &[OscType]) -> Option<Vec<OscType>> + Send + Sync + 'static,
    {
        Arc::new(Self {
            dispatcher: Dispatcher::new(),
            connected: AtomicBool::new(true),
            responder: RwLock::new(Box::new(responder)),
            sent: Mutex::new(Vec::new()),
            status_callbacks: RwLock::new(Vec::new()),
        })
    }

    pub fn disconnected() -> Arc<Self> {
        let fake = Self::connected(|_, _| None);
        fake.set_connected(false);
        fake
    }

    /// Swap the script mid-test (e.g. a clip starts playing)
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &[OscType]) -> Option<Vec<OscType>> + Send + Sync + 'static,
    {
        *self.responder.write() = Box::new(responder);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Deliver a message as if Live had sent it
    pub fn inject(&self, address: &str, args: Vec<OscType>) {
        self.dispatcher.dispatch(OscReply::new(address, args));
    }

    /// Argument lists of every message sent to `address`
    pub fn sent_to(&self, address: &str) -> Vec<Vec<OscType>> {
        self.sent
            .lock()
            .iter()
            .filter(|(a, _)| a == address)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn listener_count(&self, address: &str) -> usize {
        self.dispatcher.listener_count(address)
    }

    pub fn pending_count(&self) -> usize {
        self.dispatcher.pending_count()
    }
}

#[async_trait]
impl Transport for FakeLive {
    async fn connect(&self, _config: &OscConfig) -> LiveResult<()> {
        self.set_connected(true);
        for callback in self.status_callbacks.read().iter() {
            callback(ConnectionStatus::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.set_connected(false);
        self.dispatcher.clear();
        for callback in self.status_callbacks.read().iter() {
            callback(ConnectionStatus::Disconnected);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, address: &str, args: Vec<OscType>) -> LiveResult<()> {
        if !self.is_connected() {
            return Err(LiveError::NotConnected);
        }

        let reply = {
            let responder = self.responder.read();
            (**responder)(address, &args)
        };
        self.sent.lock().push((address.to_string(), args));

        if let Some(reply_args) = reply {
            self.dispatcher.dispatch(OscReply::new(address, reply_args));
        }
        Ok(())
    }

    async fn request_reply(
        &self,
        address: &str,
        reply_address: &str,
        timeout: Duration,
        args: Vec<OscType>,
    ) -> LiveResult<OscReply> {
        let prefix = args.clone();
        self.dispatcher
            .request(address, reply_address, timeout, prefix, || self.send(address, args))
            .await
    }

    fn add_listener(&self, address: &str, callback: MessageCallback) -> ListenerId {
        self.dispatcher.add_listener(address, callback)
    }

    fn remove_listener(&self, address: &str, id: ListenerId) -> bool {
        self.dispatcher.remove_listener(address, id)
    }

    fn subscribe_status(&self, callback: StatusCallback) {
        self.status_callbacks.write().push(callback);
    }
}
