//! The two datagram transports the engine can drive: direct UDP, or the
//! UDP Relay's WebSocket-framed bidirectional stream.

use futures::{SinkExt, StreamExt};
use tokio::net::UdpSocket;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

/// Maximum UDP datagram size the engine ever sends or expects to receive.
pub const MAX_DATAGRAM_LEN: usize = 2048;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A connected datagram transport: either raw UDP to the TS3 server, or a
/// WebSocket stream to the UDP Relay which forwards each binary message as
/// one UDP datagram on our behalf.
pub enum Transport {
    /// Direct UDP, connected so that `send`/`recv` need not specify a peer
    /// address each call.
    Udp(UdpSocket),
    /// The relay's WebSocket stream.
    Relay(WsStream),
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Udp(_) => f.debug_tuple("Udp").finish(),
            Self::Relay(_) => f.debug_tuple("Relay").finish(),
        }
    }
}

impl Transport {
    /// Connects directly over UDP to `host:port`.
    pub async fn connect_udp(host: &str, port: u16) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.connect((host, port)).await?;
        Ok(Self::Udp(socket))
    }

    /// Connects to the UDP Relay and requests it forward datagrams to
    /// `host:port` on our behalf.
    pub async fn connect_relay(
        relay_url: &str,
        relay_token: &str,
        host: &str,
        port: u16,
    ) -> std::io::Result<Self> {
        let mut url = Url::parse(relay_url).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        })?;
        url.query_pairs_mut()
            .append_pair("token", relay_token)
            .append_pair("host", host)
            .append_pair("port", &port.to_string());

        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| {
                std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e)
            })?;
        Ok(Self::Relay(stream))
    }

    /// Sends one whole datagram.
    pub async fn send(&mut self, payload: &[u8]) -> std::io::Result<()> {
        match self {
            Self::Udp(socket) => {
                socket.send(payload).await?;
            }
            Self::Relay(stream) => {
                stream
                    .send(Message::Binary(payload.to_vec()))
                    .await
                    .map_err(|e| {
                        std::io::Error::new(std::io::ErrorKind::BrokenPipe, e)
                    })?;
            }
        }
        Ok(())
    }

    /// Receives one whole datagram.
    ///
    /// For the relay transport, control frames (ping/pong/close) are
    /// handled internally by `tokio-tungstenite` and never surface here;
    /// fragmented binary messages are reassembled by the library into one
    /// `Message::Binary` before this call returns.
    pub async fn recv(&mut self) -> std::io::Result<Vec<u8>> {
        match self {
            Self::Udp(socket) => {
                let mut buf = vec![0_u8; MAX_DATAGRAM_LEN];
                let len = socket.recv(&mut buf).await?;
                buf.truncate(len);
                Ok(buf)
            }
            Self::Relay(stream) => loop {
                match stream.next().await {
                    Some(Ok(Message::Binary(data))) => return Ok(data),
                    Some(Ok(_other)) => continue,
                    Some(Err(e)) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ))
                    }
                    None => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::ConnectionAborted,
                            "relay stream closed",
                        ))
                    }
                }
            },
        }
    }
}
