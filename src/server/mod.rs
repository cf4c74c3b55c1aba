//! TCP and UDP listeners for the device simulator.

pub mod introspection;
pub mod session;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, UdpSocket};

use crate::config::DeviceConfig;
use crate::enip::{Frame, COMMAND_NOP};
use crate::error::Result;
use crate::object_model::ClassRegistry;
use introspection::SharedSnapshot;

/// Administrative on/off switch, polled by both listeners on a 0.1s tick
/// (§5 cancellation model).
#[derive(Clone, Default)]
pub struct DisableFlag(Arc<AtomicBool>);

impl DisableFlag {
    pub fn is_disabled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self, disabled: bool) {
        self.0.store(disabled, Ordering::Relaxed);
    }
}

const DISABLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// Disable Nagle and size the kernel send/recv buffers for the explicit
/// messaging traffic this connection will carry. `SockRef` borrows the
/// fd, so the caller keeps owning the `TcpStream`.
fn tune_accepted_socket(stream: &tokio::net::TcpStream) -> std::io::Result<()> {
    let sock_ref = socket2::SockRef::from(stream);
    sock_ref.set_nodelay(true)?;
    sock_ref.set_recv_buffer_size(SOCKET_BUFFER_SIZE)?;
    sock_ref.set_send_buffer_size(SOCKET_BUFFER_SIZE)?;
    Ok(())
}

pub struct Server {
    pub registry: Arc<ClassRegistry>,
    pub config: Arc<DeviceConfig>,
    pub snapshot: SharedSnapshot,
    pub disable: DisableFlag,
}

impl Server {
    pub fn new(config: DeviceConfig) -> Self {
        let registry = Arc::new(ClassRegistry::build(&config));
        Server {
            registry,
            config: Arc::new(config),
            snapshot: SharedSnapshot::new(),
            disable: DisableFlag::default(),
        }
    }

    /// Run the TCP listener at `addr` until the disable flag is set.
    pub async fn serve_tcp(&self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await.map_err(crate::error::CipError::Io)?;
        tracing::info!(%addr, "listening for ENIP/CIP TCP connections");

        loop {
            if self.disable.is_disabled() {
                tracing::info!("disable flag set, stopping TCP listener");
                return Ok(());
            }
            let accept = tokio::time::timeout(DISABLE_POLL_INTERVAL, listener.accept()).await;
            let (stream, peer_addr) = match accept {
                Ok(Ok(pair)) => pair,
                Ok(Err(error)) => {
                    tracing::warn!(%error, "accept failed");
                    continue;
                }
                Err(_) => continue, // poll tick elapsed with no connection
            };

            if let Err(error) = tune_accepted_socket(&stream) {
                tracing::warn!(%error, "failed to tune accepted socket");
            }

            let registry = self.registry.clone();
            let config = self.config.clone();
            let snapshot = self.snapshot.clone();
            tokio::spawn(async move {
                session::run(stream, peer_addr, registry, config, snapshot).await;
            });
        }
    }

    /// Run the UDP listener at `addr`, answering List-Services/Identity/
    /// Interfaces and the legacy NOP probe datagram-per-request (§4.7).
    /// Bind to a broadcast-capable address to support broadcast discovery.
    pub async fn serve_udp(&self, addr: SocketAddr) -> Result<()> {
        let socket = UdpSocket::bind(addr).await.map_err(crate::error::CipError::Io)?;
        socket.set_broadcast(true).ok();
        tracing::info!(%addr, "listening for ENIP UDP datagrams");

        let mut buffer = [0u8; 4096];
        loop {
            if self.disable.is_disabled() {
                return Ok(());
            }
            let recv = tokio::time::timeout(DISABLE_POLL_INTERVAL, socket.recv_from(&mut buffer)).await;
            let (n, peer) = match recv {
                Ok(Ok(pair)) => pair,
                Ok(Err(error)) => {
                    tracing::warn!(%error, "UDP recv failed");
                    continue;
                }
                Err(_) => continue,
            };

            let Ok((frame, _)) = Frame::decode(&buffer[..n]) else {
                continue;
            };
            if frame.command == COMMAND_NOP {
                continue;
            }
            let Some(reply) = session::discovery_reply(&frame, &self.config) else {
                continue;
            };
            if let Err(error) = socket.send_to(&reply.encode(), peer).await {
                tracing::warn!(%error, %peer, "failed to send discovery reply");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disable_flag_stops_tcp_listener_promptly() {
        let server = Server::new(DeviceConfig::default());
        server.disable.set(true);
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        // Binding to port 0 then immediately observing the disable flag
        // should return almost immediately rather than blocking forever.
        let result = tokio::time::timeout(Duration::from_secs(1), server.serve_tcp(addr)).await;
        assert!(result.is_ok());
    }
}
