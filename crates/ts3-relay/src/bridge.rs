//! The actor bridging one WebSocket stream to one UDP socket.
//!
//! It is deliberately a dumb wire: each complete binary WebSocket message
//! becomes one UDP datagram, and vice versa. Fragmented binary messages
//! (continuation frames) are reassembled before the UDP send, since UDP is
//! datagram-atomic. Text messages are ignored; ping/pong are answered per
//! RFC 6455.

use actix::{Actor, ActorContext, AsyncContext, Handler, Message, StreamHandler};
use actix_web_actors::ws;
use bytes::{Bytes, BytesMut};
use tokio::net::udp::{RecvHalf, SendHalf};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use voicebeacon_log::log;

use crate::clients::{ClientTable, ConnId};

/// Datagrams received on the UDP socket, routed back into the actor so it
/// can push them onto the WebSocket as binary frames.
struct UdpDatagram(Bytes);

impl Message for UdpDatagram {
    type Result = ();
}

/// One relay session: a WebSocket actor paired 1:1 with a connected UDP
/// socket. `started()` hands the socket's receive half to a background
/// task and keeps only a channel to its send half, so WS->UDP forwarding
/// never blocks the actor's message loop on the socket itself.
pub struct WsBridge {
    conn_id: ConnId,
    table: ClientTable,
    recv_half: Option<RecvHalf>,
    datagram_tx: mpsc::Sender<Bytes>,
    fragment: FragmentAssembler,
}

impl WsBridge {
    /// Builds a bridge over an already-connected `socket`, registering
    /// `conn_id` in `table` so shutdown can account for it.
    #[must_use]
    pub fn new(
        conn_id: ConnId,
        socket: UdpSocket,
        table: ClientTable,
    ) -> Self {
        let (recv_half, send_half) = socket.split();
        let (datagram_tx, datagram_rx) = mpsc::channel(64);
        let _ = tokio::spawn(forward_to_udp(send_half, datagram_rx));

        Self {
            conn_id,
            table,
            recv_half: Some(recv_half),
            datagram_tx,
            fragment: FragmentAssembler::default(),
        }
    }

    fn forward_datagram(&mut self, datagram: Bytes) {
        if let Err(e) = self.datagram_tx.try_send(datagram) {
            log::warn!(
                "Relay session {}: dropped datagram, UDP send queue full: {}",
                self.conn_id,
                e
            );
        }
    }

    fn handle_continuation(&mut self, item: ws::Item) {
        if let Some(datagram) = self.fragment.push(item) {
            self.forward_datagram(datagram);
        }
    }
}

/// Reassembles a FIN=0 continuation-frame sequence into one message.
///
/// UDP is datagram-atomic, so a fragmented WebSocket message must be fully
/// buffered before it can become a single `send`.
#[derive(Debug, Default)]
struct FragmentAssembler {
    buf: Option<BytesMut>,
}

impl FragmentAssembler {
    /// Feeds one continuation-sequence item. Returns the reassembled
    /// message once `Last` completes a binary sequence.
    fn push(&mut self, item: ws::Item) -> Option<Bytes> {
        match item {
            ws::Item::FirstBinary(bytes) => {
                self.buf = Some(BytesMut::from(&bytes[..]));
                None
            }
            ws::Item::FirstText(_) => {
                // Fragmented text is out of contract; drop any binary
                // reassembly in progress so stray continuations don't get
                // appended to the wrong message.
                self.buf = None;
                None
            }
            ws::Item::Continue(bytes) => {
                if let Some(buf) = self.buf.as_mut() {
                    buf.extend_from_slice(&bytes);
                }
                None
            }
            ws::Item::Last(bytes) => self.buf.take().map(|mut buf| {
                buf.extend_from_slice(&bytes);
                buf.freeze()
            }),
        }
    }
}

impl Actor for WsBridge {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let mut recv_half = self
            .recv_half
            .take()
            .expect("recv_half is only taken once, in started()");
        let addr = ctx.address();
        let conn_id = self.conn_id;

        let _ = tokio::spawn(async move {
            let mut buf = vec![0_u8; crate::MAX_DATAGRAM_LEN];
            loop {
                match recv_half.recv(&mut buf).await {
                    Ok(len) => {
                        let datagram = Bytes::copy_from_slice(&buf[..len]);
                        if addr.do_send(UdpDatagram(datagram)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!(
                            "Relay session {}: UDP recv error: {}",
                            conn_id,
                            e
                        );
                        break;
                    }
                }
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.table.remove(self.conn_id);
        log::info!("Relay session {} closed", self.conn_id);
    }
}

impl Handler<UdpDatagram> for WsBridge {
    type Result = ();

    fn handle(&mut self, msg: UdpDatagram, ctx: &mut Self::Context) {
        ctx.binary(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsBridge {
    fn handle(
        &mut self,
        item: Result<ws::Message, ws::ProtocolError>,
        ctx: &mut Self::Context,
    ) {
        let msg = match item {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!(
                    "Relay session {}: WebSocket protocol error: {}",
                    self.conn_id,
                    e
                );
                ctx.stop();
                return;
            }
        };

        match msg {
            ws::Message::Ping(payload) => ctx.pong(&payload),
            ws::Message::Pong(_) => {}
            ws::Message::Text(_) => {}
            ws::Message::Binary(bytes) => self.forward_datagram(bytes),
            ws::Message::Continuation(item) => self.handle_continuation(item),
            ws::Message::Close(reason) => {
                ctx.close(reason);
                ctx.stop();
            }
            ws::Message::Nop => {}
        }
    }
}

/// Drains `rx` and sends each datagram on `send_half`, until the actor (and
/// so every [`mpsc::Sender`] clone) is dropped.
async fn forward_to_udp(
    mut send_half: SendHalf,
    mut rx: mpsc::Receiver<Bytes>,
) {
    while let Some(datagram) = rx.recv().await {
        if let Err(e) = send_half.send(&datagram).await {
            log::warn!("Relay: UDP send error: {}", e);
        }
    }
}
