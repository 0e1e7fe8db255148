//! UDP transport: one socket bound on the receive port, sending to Live's port

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rosc::{OscMessage, OscPacket, OscType};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{
    format_args, ConnectionStatus, Dispatcher, ListenerId, MessageCallback, OscReply,
    StatusCallback, Transport, TRAFFIC_TARGET,
};
use crate::config::OscConfig;
use crate::error::{LiveError, LiveResult};

const RECV_BUFFER_SIZE: usize = 8192;

struct Link {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
}

/// OSC over UDP to a running AbletonOSC instance
pub struct UdpTransport {
    dispatcher: Arc<Dispatcher>,
    link: RwLock<Option<Link>>,
    recv_task: Mutex<Option<JoinHandle<()>>>,
    connected: Arc<AtomicBool>,
    status_callbacks: Arc<RwLock<Vec<StatusCallback>>>,
}

impl Default for UdpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpTransport {
    pub fn new() -> Self {
        Self {
            dispatcher: Arc::new(Dispatcher::new()),
            link: RwLock::new(None),
            recv_task: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            status_callbacks: Arc::new(RwLock::new(Vec::new())),
        }
    }

    fn emit_status(callbacks: &RwLock<Vec<StatusCallback>>, status: ConnectionStatus) {
        for callback in callbacks.read().iter() {
            callback(status.clone());
        }
    }

    async fn resolve_remote(config: &OscConfig) -> LiveResult<SocketAddr> {
        let mut candidates: Vec<SocketAddr> =
            tokio::net::lookup_host((config.host.as_str(), config.send_port))
                .await?
                .collect();
        // The local socket is bound on IPv4, so prefer an IPv4 target ("localhost" may resolve to ::1 first)
        candidates.sort_by_key(|addr| !addr.is_ipv4());
        candidates.into_iter().next().ok_or_else(|| {
            LiveError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("could not resolve host {}", config.host),
            ))
        })
    }

    fn spawn_receiver(&self, socket: Arc<UdpSocket>) -> JoinHandle<()> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let connected = Arc::clone(&self.connected);
        let status_callbacks = Arc::clone(&self.status_callbacks);

        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((size, _from)) => match rosc::decoder::decode_udp(&buf[..size]) {
                        Ok((_, packet)) => handle_packet(&dispatcher, packet),
                        Err(e) => warn!("Dropping undecodable OSC packet ({} bytes): {:?}", size, e),
                    },
                    // ICMP port unreachable surfaces here on some platforms while Live is closed
                    Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                        debug!("OSC receive reset: {}", e);
                    }
                    Err(e) => {
                        warn!("❌ OSC receive error: {}", e);
                        connected.store(false, Ordering::SeqCst);
                        UdpTransport::emit_status(
                            &status_callbacks,
                            ConnectionStatus::Error(e.to_string()),
                        );
                        break;
                    }
                }
            }
        })
    }
}

fn handle_packet(dispatcher: &Dispatcher, packet: OscPacket) {
    match packet {
        OscPacket::Message(msg) => handle_message(dispatcher, msg),
        OscPacket::Bundle(bundle) => bundle
            .content
            .into_iter()
            .for_each(|p| handle_packet(dispatcher, p)),
    }
}

fn handle_message(dispatcher: &Dispatcher, msg: OscMessage) {
    debug!(target: TRAFFIC_TARGET, "RECEIVE | {} | {}", msg.addr, format_args(&msg.args));
    dispatcher.dispatch(OscReply::new(msg.addr, msg.args));
}

#[async_trait]
impl Transport for UdpTransport {
    async fn connect(&self, config: &OscConfig) -> LiveResult<()> {
        if self.is_connected() {
            self.disconnect().await;
        }

        info!(
            "🎛️ Connecting to Live at {}:{} (receiving on {})",
            config.host, config.send_port, config.receive_port
        );

        let remote = Self::resolve_remote(config).await?;
        let socket = match UdpSocket::bind(("0.0.0.0", config.receive_port)).await {
            Ok(socket) => Arc::new(socket),
            Err(e) => {
                Self::emit_status(&self.status_callbacks, ConnectionStatus::Error(e.to_string()));
                return Err(e.into());
            }
        };

        let handle = self.spawn_receiver(Arc::clone(&socket));
        *self.recv_task.lock() = Some(handle);
        *self.link.write() = Some(Link { socket, remote });
        self.connected.store(true, Ordering::SeqCst);

        Self::emit_status(&self.status_callbacks, ConnectionStatus::Connected);
        info!("✅ OSC transport ready ({})", remote);
        Ok(())
    }

    async fn disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::SeqCst);

        if let Some(handle) = self.recv_task.lock().take() {
            handle.abort();
        }
        *self.link.write() = None;
        self.dispatcher.clear();

        if was_connected {
            Self::emit_status(&self.status_callbacks, ConnectionStatus::Disconnected);
            info!("🔌 OSC transport closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn send(&self, address: &str, args: Vec<OscType>) -> LiveResult<()> {
        let link = self.link.read();
        let Some(link) = link.as_ref() else {
            return Err(LiveError::NotConnected);
        };

        debug!(target: TRAFFIC_TARGET, "SEND | {} | {}", address, format_args(&args));

        let packet = OscPacket::Message(OscMessage {
            addr: address.to_string(),
            args,
        });
        let buf = rosc::encoder::encode(&packet).map_err(|e| LiveError::Encode(format!("{:?}", e)))?;

        link.socket.try_send_to(&buf, link.remote)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback_config(send_port: u16, receive_port: u16) -> OscConfig {
        OscConfig {
            host: "127.0.0.1".to_string(),
            send_port,
            receive_port,
        }
    }

    #[tokio::test]
    async fn test_send_without_connect_fails() {
        let transport = UdpTransport::new();
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send("/live/test", vec![]),
            Err(LiveError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_request_reply_over_loopback() {
        // A fake Live remote script echoing /live/test
        let fake_live = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let live_port = fake_live.local_addr().unwrap().port();

        let spare = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let receive_port = spare.local_addr().unwrap().port();
        drop(spare);

        let transport = UdpTransport::new();
        transport
            .connect(&loopback_config(live_port, receive_port))
            .await
            .unwrap();
        assert!(transport.is_connected());

        let responder = tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            let (size, _) = fake_live.recv_from(&mut buf).await.unwrap();
            let (_, packet) = rosc::decoder::decode_udp(&buf[..size]).unwrap();
            let OscPacket::Message(msg) = packet else {
                panic!("expected message");
            };
            assert_eq!(msg.addr, "/live/test");

            let reply = OscPacket::Message(OscMessage {
                addr: "/live/test".to_string(),
                args: vec![OscType::String("ok".into())],
            });
            let bytes = rosc::encoder::encode(&reply).unwrap();
            fake_live
                .send_to(&bytes, ("127.0.0.1", receive_port))
                .await
                .unwrap();
        });

        let reply = transport
            .request_reply("/live/test", "/live/test", Duration::from_secs(2), vec![])
            .await
            .unwrap();
        assert_eq!(reply.args, vec![OscType::String("ok".into())]);

        responder.await.unwrap();
        transport.disconnect().await;
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_status_callbacks_fire_on_connect_and_disconnect() {
        let seen: Arc<Mutex<Vec<ConnectionStatus>>> = Arc::new(Mutex::new(Vec::new()));
        let transport = UdpTransport::new();

        let s = Arc::clone(&seen);
        transport.subscribe_status(Arc::new(move |status: ConnectionStatus| s.lock().push(status)));

        let spare = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let receive_port = spare.local_addr().unwrap().port();
        drop(spare);

        transport
            .connect(&loopback_config(receive_port.wrapping_add(1).max(1), receive_port))
            .await
            .unwrap();
        transport.disconnect().await;
        // A second disconnect is silent
        transport.disconnect().await;

        assert_eq!(
            *seen.lock(),
            vec![ConnectionStatus::Connected, ConnectionStatus::Disconnected]
        );
    }
}
