//! OSC transport to the Live remote script
//!
//! The rest of the crate only talks to Live through the [`Transport`] trait:
//! fire-and-forget sends, one-shot request/reply correlated by reply address and
//! echoed argument prefix, and persistent listeners keyed by [`ListenerId`].

mod dispatcher;
mod udp;

pub use dispatcher::Dispatcher;
pub use udp::UdpTransport;

use async_trait::async_trait;
use rosc::OscType;
use std::sync::Arc;
use std::time::Duration;

use crate::config::OscConfig;
use crate::error::LiveResult;

/// Tracing target used for the OSC traffic log
pub const TRAFFIC_TARGET: &str = "osc_traffic";

/// Inbound OSC message as seen by listeners and request waiters
#[derive(Debug, Clone)]
pub struct OscReply {
    pub address: String,
    pub args: Vec<OscType>,
}

impl OscReply {
    pub fn new(address: impl Into<String>, args: Vec<OscType>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }
}

/// Handle returned by [`Transport::add_listener`], needed to remove it again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Persistent listener callback
pub type MessageCallback = Arc<dyn Fn(&OscReply) + Send + Sync>;

/// Connection lifecycle of the transport
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Error(String),
}

/// Type alias for connection status callbacks
pub type StatusCallback = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

/// Narrow request/response + listener interface over the OSC socket
///
/// All methods take `&self`; implementations use interior mutability so the
/// transport can be shared as `Arc<dyn Transport>` by every component.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the socket pair. Connecting while connected reconnects.
    async fn connect(&self, config: &OscConfig) -> LiveResult<()>;

    /// Close the socket, fail pending requests and drop all listeners
    async fn disconnect(&self);

    fn is_connected(&self) -> bool;

    /// Fire-and-forget message
    fn send(&self, address: &str, args: Vec<OscType>) -> LiveResult<()>;

    /// Send `args` to `address` and wait for the first message on
    /// `reply_address` whose leading arguments echo `args`
    async fn request_reply(
        &self,
        address: &str,
        reply_address: &str,
        timeout: Duration,
        args: Vec<OscType>,
    ) -> LiveResult<OscReply>;

    fn add_listener(&self, address: &str, callback: MessageCallback) -> ListenerId;

    /// Returns false when no listener with that id was registered on `address`
    fn remove_listener(&self, address: &str, id: ListenerId) -> bool;

    fn subscribe_status(&self, callback: StatusCallback);
}

/// Numeric view of an OSC argument (ints and floats compare by value)
pub fn osc_number(arg: &OscType) -> Option<f64> {
    match arg {
        OscType::Int(i) => Some(*i as f64),
        OscType::Long(l) => Some(*l as f64),
        OscType::Float(f) => Some(*f as f64),
        OscType::Double(d) => Some(*d),
        _ => None,
    }
}

/// Argument equality as used for reply correlation
pub fn args_equal(a: &OscType, b: &OscType) -> bool {
    match (osc_number(a), osc_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// True when `args` starts with every element of `prefix`
pub fn matches_prefix(args: &[OscType], prefix: &[OscType]) -> bool {
    args.len() >= prefix.len() && prefix.iter().zip(args).all(|(p, a)| args_equal(p, a))
}

/// Render arguments for the traffic log
pub fn format_args(args: &[OscType]) -> String {
    args.iter()
        .map(|arg| match arg {
            OscType::Int(i) => i.to_string(),
            OscType::Long(l) => l.to_string(),
            OscType::Float(f) => f.to_string(),
            OscType::Double(d) => d.to_string(),
            OscType::String(s) => format!("\"{}\"", s),
            OscType::Bool(b) => b.to_string(),
            OscType::Nil => "nil".to_string(),
            other => format!("{:?}", other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
