//! RCON connection to the Minecraft server.

use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::common::error::{RconError, RconResult};
use crate::protocol::rcon::codec::{packet_type, RconCodec, RconFrame, RconPacket, AUTH_FAILED_ID};

/// Anything that can run a console command and return its output.
///
/// The relay core only talks to the server through this trait.
#[async_trait]
pub trait RemoteConsole: Send + Sync {
    async fn command(&self, text: &str) -> RconResult<String>;
}

/// Object-safe stream bound so the client works over TCP and in-memory pipes.
pub trait RconStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RconStream for T {}

/// An authenticated RCON session.
///
/// Commands are serialized on the single connection: each request holds the
/// connection until its response arrives, so responses cannot be mismatched.
pub struct RconClient {
    connection: Mutex<Framed<Box<dyn RconStream>, RconCodec>>,
    next_id: AtomicI32,
    timeout: Duration,
}

impl RconClient {
    /// Connect to `addr` and log in with `password`.
    pub async fn connect(addr: &str, password: &str, timeout: Duration) -> RconResult<Self> {
        info!("Connecting to RCON at {}", addr);
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| RconError::ConnectFailed {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out"),
            })?
            .map_err(|e| RconError::ConnectFailed {
                addr: addr.to_string(),
                source: e,
            })?;

        Self::login(Box::new(stream), password, timeout).await
    }

    /// Log in over an already-open stream.
    pub async fn login(stream: Box<dyn RconStream>, password: &str, timeout: Duration) -> RconResult<Self> {
        let client = Self {
            connection: Mutex::new(Framed::new(stream, RconCodec::default())),
            next_id: AtomicI32::new(1),
            timeout,
        };

        let request_id = client.next_request_id();
        let mut connection = client.connection.lock().await;
        connection
            .send(RconPacket::new(request_id, packet_type::AUTH, password))
            .await?;

        let reply = tokio::time::timeout(timeout, async {
            loop {
                // Some servers precede the auth response with an empty value packet.
                match read_frame(&mut connection).await? {
                    RconFrame::Packet(packet) if packet.packet_type == packet_type::AUTH_RESPONSE => {
                        return Ok::<_, RconError>(packet);
                    }
                    RconFrame::Packet(packet) => {
                        debug!("Skipping pre-auth packet type {}", packet.packet_type)
                    }
                    RconFrame::Oversized { len, .. } => debug!("Skipping oversized pre-auth packet ({} bytes)", len),
                }
            }
        })
        .await
        .map_err(|_| RconError::Timeout {
            secs: timeout.as_secs(),
        })??;

        if reply.request_id == AUTH_FAILED_ID {
            return Err(RconError::AuthFailed);
        }
        if reply.request_id != request_id {
            return Err(RconError::InvalidPacket {
                message: format!(
                    "auth response id {} does not match request {}",
                    reply.request_id, request_id
                ),
            });
        }

        drop(connection);
        info!("RCON session authenticated");
        Ok(client)
    }

    fn next_request_id(&self) -> i32 {
        // Ids stay positive; -1 is reserved for auth failure.
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if id <= 0 {
            self.next_id.store(2, Ordering::Relaxed);
            1
        } else {
            id
        }
    }
}

async fn read_frame(connection: &mut Framed<Box<dyn RconStream>, RconCodec>) -> RconResult<RconFrame> {
    match connection.next().await {
        Some(frame) => frame,
        None => Err(RconError::ConnectionClosed),
    }
}

#[async_trait]
impl RemoteConsole for RconClient {
    async fn command(&self, text: &str) -> RconResult<String> {
        let request_id = self.next_request_id();
        let mut connection = self.connection.lock().await;

        debug!(request_id, "RCON > {}", text);
        let exchange = async {
            connection
                .send(RconPacket::new(request_id, packet_type::EXEC_COMMAND, text))
                .await?;
            loop {
                let (id, result) = match read_frame(&mut connection).await? {
                    RconFrame::Packet(packet) => (packet.request_id, Ok::<_, RconError>(packet.body)),
                    RconFrame::Oversized { request_id, len } => {
                        (request_id, Err(RconError::ResponseTooLarge { len }))
                    }
                };
                if id == request_id {
                    return result;
                }
                // Late answer to a request that already timed out.
                warn!("Discarding RCON response for stale request {}", id);
            }
        };

        let body = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RconError::Timeout {
                secs: self.timeout.as_secs(),
            })??;

        debug!(request_id, "RCON < {}", body);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt};

    type ServerSide = Framed<tokio::io::DuplexStream, RconCodec>;

    /// Raw frame bytes; replies may exceed what the encoder allows.
    fn frame_bytes(request_id: i32, packet_type: i32, body: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&((body.len() + 10) as i32).to_le_bytes());
        bytes.extend_from_slice(&request_id.to_le_bytes());
        bytes.extend_from_slice(&packet_type.to_le_bytes());
        bytes.extend_from_slice(body.as_bytes());
        bytes.extend_from_slice(&[0, 0]);
        bytes
    }

    /// Minimal server: accepts `password`, answers every command via `respond`.
    fn spawn_server(
        stream: tokio::io::DuplexStream,
        password: &'static str,
        respond: fn(&str) -> Option<String>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut server: ServerSide = Framed::new(stream, RconCodec::default());
            while let Some(Ok(RconFrame::Packet(packet))) = server.next().await {
                let reply = match packet.packet_type {
                    packet_type::AUTH => {
                        let id = if packet.body == password {
                            packet.request_id
                        } else {
                            AUTH_FAILED_ID
                        };
                        frame_bytes(id, packet_type::AUTH_RESPONSE, "")
                    }
                    _ => match respond(&packet.body) {
                        Some(body) => frame_bytes(packet.request_id, packet_type::RESPONSE_VALUE, &body),
                        None => continue,
                    },
                };
                server.get_mut().write_all(&reply).await.unwrap();
            }
        })
    }

    #[tokio::test]
    async fn test_login_and_command() {
        let (client_end, server_end) = duplex(8192);
        spawn_server(server_end, "minecraft", |cmd| {
            Some(format!("There are 0 of a max of 20 players online: ({})", cmd))
        });

        let client = RconClient::login(Box::new(client_end), "minecraft", Duration::from_secs(5))
            .await
            .unwrap();
        let reply = client.command("list").await.unwrap();
        assert!(reply.ends_with("(list)"));
    }

    #[tokio::test]
    async fn test_large_multibyte_reply() {
        let (client_end, server_end) = duplex(8192);
        spawn_server(server_end, "pw", |_| Some("é".repeat(3000)));

        let client = RconClient::login(Box::new(client_end), "pw", Duration::from_secs(5))
            .await
            .unwrap();
        let reply = client.command("data get storage").await.unwrap();
        assert_eq!(reply.chars().count(), 3000);
    }

    #[tokio::test]
    async fn test_oversized_reply_fails_only_its_command() {
        let (client_end, server_end) = duplex(8192);
        spawn_server(server_end, "pw", |cmd| match cmd {
            "list" => Some("There are 1 of a max of 20 players online: Steve".to_string()),
            _ => Some("é".repeat(9000)),
        });

        let client = RconClient::login(Box::new(client_end), "pw", Duration::from_secs(5))
            .await
            .unwrap();

        let result = client.command("data get entity Steve").await;
        assert!(matches!(result, Err(RconError::ResponseTooLarge { len: 18000 })));

        for _ in 0..2 {
            let reply = client.command("list").await.unwrap();
            assert_eq!(reply, "There are 1 of a max of 20 players online: Steve");
        }
    }

    #[tokio::test]
    async fn test_bad_password() {
        let (client_end, server_end) = duplex(8192);
        spawn_server(server_end, "minecraft", |_| None);

        let result = RconClient::login(Box::new(client_end), "wrong", Duration::from_secs(5)).await;
        assert!(matches!(result, Err(RconError::AuthFailed)));
    }

    #[tokio::test]
    async fn test_command_timeout() {
        let (client_end, server_end) = duplex(8192);
        spawn_server(server_end, "pw", |_| None);

        let client = RconClient::login(Box::new(client_end), "pw", Duration::from_millis(100))
            .await
            .unwrap();
        let result = client.command("list").await;
        assert!(matches!(result, Err(RconError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_server_gone() {
        let (client_end, server_end) = duplex(8192);
        let server = spawn_server(server_end, "pw", |_| None);

        let client = RconClient::login(Box::new(client_end), "pw", Duration::from_secs(5))
            .await
            .unwrap();
        server.abort();
        let _ = server.await;

        let result = client.command("list").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = RconClient::connect(&addr, "pw", Duration::from_secs(2)).await;
        assert!(matches!(result, Err(RconError::ConnectFailed { .. })));
    }
}
