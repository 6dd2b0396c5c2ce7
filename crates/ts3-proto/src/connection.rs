//! The public `Connection`/`Event` API: drives the handshake to
//! completion, then owns a background task that runs the session's I/O
//! loop (reads, acks, heartbeat, retransmission) for its lifetime.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use rand::RngCore;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex};
use tokio::time::{interval, timeout};
use voicebeacon_log::log;

use crate::command::{self, Item, Param};
use crate::counters::Counters;
use crate::directory::{ChannelDirectory, ChannelId, ClientId, PeerDirectory};
use crate::error::{ErrorKind, HandshakeError};
use crate::fragment::Assembler;
use crate::handshake::{self, EphemeralP256Key};
use crate::header::{Flags, Header, PacketType};
use crate::packet;
use crate::reliability::{Action as RetransmitAction, RetransmitQueue};
use crate::transport::Transport;

/// Bound on `connect()`: failing to reach `Authenticated` within this
/// window aborts with [`ErrorKind::Timeout`].
#[cfg(not(test))]
const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
#[cfg(test)]
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Heartbeat interval.
#[cfg(not(test))]
const PING_INTERVAL: Duration = Duration::from_secs(1);
#[cfg(test)]
const PING_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum silence from the server before the session is considered dead.
#[cfg(not(test))]
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);
#[cfg(test)]
const IDLE_TIMEOUT: Duration = Duration::from_millis(80);

/// Caller-supplied connection parameters.
#[derive(Clone, Debug)]
pub struct Config {
    /// TS3 server host (ignored when a relay is configured; the relay is
    /// told the target host instead).
    pub host: String,
    /// TS3 server UDP port.
    pub port: u16,
    /// Display nickname.
    pub nickname: String,
    /// Channel to join on connect, by name/path.
    pub default_channel: Option<String>,
    /// Virtual server password.
    pub server_password: Option<String>,
    /// Client hardware id; a random one is generated if omitted.
    pub hwid: Option<String>,
    /// UDP Relay URL; if set together with `relay_token`, the relay
    /// transport is used instead of direct UDP.
    pub relay_url: Option<String>,
    /// UDP Relay shared-secret token.
    pub relay_token: Option<String>,
    /// If `true`, a license-chain derivation failure aborts the handshake
    /// with [`ErrorKind::Crypto`] instead of falling back to a random
    /// server key and emitting a [`Event::Warning`].
    pub strict_license: bool,
}

/// The target of an outgoing text message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TextMessageTarget {
    /// A private message to one client.
    Client(ClientId),
    /// The sender's current channel.
    Channel,
    /// The whole virtual server.
    Server,
}

impl TextMessageTarget {
    const fn wire_mode(self) -> u8 {
        match self {
            Self::Client(_) => 1,
            Self::Channel => 2,
            Self::Server => 3,
        }
    }
}

/// Events surfaced to callers of [`Connection`].
#[derive(Debug)]
pub enum Event {
    /// The handshake completed and the session is fully established.
    Connected {
        /// The server's virtual-server name.
        virtual_server_name: String,
    },
    /// The session ended.
    Disconnected {
        /// Human-readable reason (e.g. `"timeout"`, `"kicked"`, `"banned"`,
        /// `"requested"`).
        reason: String,
    },
    /// A non-fatal error occurred.
    Error {
        /// Classification of the error.
        kind: ErrorKind,
        /// Additional detail.
        detail: String,
    },
    /// A text message was received.
    TextMessage {
        /// Which audience it was sent to.
        mode: TextMessageTarget,
        /// Message body.
        text: String,
        /// Sender's nickname.
        invoker_name: String,
        /// Sender's client id.
        invoker_id: ClientId,
    },
    /// A condition worth surfacing but not treated as an error, e.g. the
    /// license-derivation fallback.
    Warning(String),
}

enum Action {
    Disconnect,
    MoveToChannel(String, oneshot::Sender<bool>),
    SendChannelMessage(String),
    SendServerMessage(String),
    SendTextMessage(TextMessageTarget, String),
    UpdateDescription(String),
}

/// A live TS3 session.
pub struct Connection {
    actions: mpsc::UnboundedSender<Action>,
    events: AsyncMutex<mpsc::UnboundedReceiver<Event>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

impl Connection {
    /// Connects to the configured server, performing the full handshake
    /// and spawning the session's background I/O task.
    ///
    /// # Errors
    ///
    /// See [`ErrorKind`]. In particular, fails with [`ErrorKind::Timeout`]
    /// if `Authenticated` is not reached within 15 seconds.
    pub async fn connect(config: Config) -> Result<Self, ErrorKind> {
        match timeout(CONNECT_TIMEOUT, Self::connect_inner(config)).await {
            Ok(result) => result,
            Err(_) => {
                Err(ErrorKind::Timeout("connect() exceeded 15s".to_string()))
            }
        }
    }

    async fn connect_inner(config: Config) -> Result<Self, ErrorKind> {
        let mut transport = build_transport(&config).await?;

        let mut counters = Counters::default();
        let mut command_assembler = Assembler::default();

        let alpha = random_array::<10>();
        let random0 = random_array::<4>();

        let init0 = handshake::build_init0(random0, unix_now());
        send_init(&mut transport, &init0).await?;
        let init1_payload = recv_init(&mut transport).await?;
        let init1 = handshake::parse_init1(&init1_payload)
            .map_err(ErrorKind::from)?;
        if init1.random0_r != random0 {
            return Err(HandshakeError::Random0Mismatch.into());
        }

        let init2 = handshake::build_init2(init1.random1, init1.random0_r);
        send_init(&mut transport, &init2).await?;
        let init3_payload = recv_init(&mut transport).await?;
        let init3 =
            handshake::parse_init3(&init3_payload).map_err(ErrorKind::from)?;

        let init4 = {
            let init3 = init3;
            tokio::task::spawn_blocking(move || {
                let p256_key = EphemeralP256Key::generate();
                handshake::build_init4(&init3, &alpha, &p256_key)
            })
            .await
            .expect("puzzle-solving worker panicked")
            .map_err(ErrorKind::from)?
        };
        send_init(&mut transport, &init4).await?;

        let expand_cmd =
            recv_fake_command(&mut transport, &mut command_assembler).await?;
        if expand_cmd.name.as_deref() != Some("initivexpand2") {
            return Err(ErrorKind::Protocol(format!(
                "expected initivexpand2, got {:?}",
                expand_cmd.name
            )));
        }
        let item = expand_cmd.items.first().cloned().ok_or_else(|| {
            ErrorKind::Protocol("initivexpand2 had no items".to_string())
        })?;

        let strict_license = config.strict_license;
        let expand = {
            tokio::task::spawn_blocking(move || {
                handshake::process_init_iv_expand(&item, &alpha, strict_license)
            })
            .await
            .expect("license-derivation worker panicked")
            .map_err(ErrorKind::from)?
        };

        let mut pending_warnings = Vec::new();
        if let Some(warning) = expand.license_fallback_warning {
            pending_warnings.push(warning);
        }
        let keys = expand.keys;

        let clientek = handshake::build_clientek(&keys);
        send_command_real(
            &mut transport,
            &mut counters,
            &keys.shared_iv,
            0,
            clientek.into_bytes(),
        )
        .await?;

        let hwid = config.hwid.clone().unwrap_or_else(random_hwid);
        let clientinit_params = handshake::ClientInitParams {
            nickname: config.nickname.clone(),
            default_channel: config.default_channel.clone(),
            default_channel_password: None,
            server_password: config.server_password.clone(),
            hwid,
        };
        let clientinit = handshake::build_clientinit(&clientinit_params);
        send_command_real(
            &mut transport,
            &mut counters,
            &keys.shared_iv,
            0,
            clientinit.into_bytes(),
        )
        .await?;

        let initserver_cmd = recv_real_command(
            &mut transport,
            &mut counters,
            &keys.shared_iv,
            &mut command_assembler,
        )
        .await?;
        if initserver_cmd.name.as_deref() != Some("initserver") {
            return Err(ErrorKind::Protocol(format!(
                "expected initserver, got {:?}",
                initserver_cmd.name
            )));
        }
        let initserver_item = initserver_cmd.items.first().ok_or_else(|| {
            ErrorKind::Protocol("initserver had no items".to_string())
        })?;
        let own_client_id: u16 = initserver_item
            .get("aclid")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| {
                ErrorKind::Protocol("initserver missing aclid".to_string())
            })?;
        let virtual_server_name = initserver_item
            .get("virtualserver_name")
            .unwrap_or_default()
            .to_string();
        let default_channel_id: i32 = initserver_item
            .get("aclid_channel")
            .or_else(|| initserver_item.get("channel_id"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        for register in
            ["textchannel", "textprivate", "server"].iter().copied()
        {
            let cmd = format!("servernotifyregister event={register}");
            send_command_real(
                &mut transport,
                &mut counters,
                &keys.shared_iv,
                own_client_id,
                cmd.into_bytes(),
            )
            .await?;
        }
        send_command_real(
            &mut transport,
            &mut counters,
            &keys.shared_iv,
            own_client_id,
            b"clientlist".to_vec(),
        )
        .await?;
        send_command_real(
            &mut transport,
            &mut counters,
            &keys.shared_iv,
            own_client_id,
            b"channellist".to_vec(),
        )
        .await?;

        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        for warning in pending_warnings {
            let _ = event_tx.send(Event::Warning(warning));
        }
        let _ = event_tx.send(Event::Connected {
            virtual_server_name: virtual_server_name.clone(),
        });

        let session = Session {
            transport,
            counters,
            shared_iv: keys.shared_iv,
            own_client_id: ClientId(own_client_id),
            current_channel: ChannelId(default_channel_id),
            channel_directory: ChannelDirectory::default(),
            peer_directory: PeerDirectory::default(),
            command_assembler,
            command_low_assembler: Assembler::default(),
            retransmit: RetransmitQueue::default(),
            events: event_tx,
        };

        tokio::spawn(session.run(action_rx));

        Ok(Self {
            actions: action_tx,
            events: AsyncMutex::new(event_rx),
        })
    }

    /// Awaits the next event. Returns `None` once the session has torn
    /// down and no further events will arrive.
    pub async fn next_event(&self) -> Option<Event> {
        self.events.lock().await.recv().await
    }

    /// Requests a graceful disconnect. Idempotent: calling this more than
    /// once, or after the session has already ended, is a no-op.
    pub fn disconnect(&self) {
        let _ = self.actions.send(Action::Disconnect);
    }

    /// Looks up `name` in the channel directory (case-insensitive) and, if
    /// found, requests a move into it. Resolves to whether the name was
    /// known.
    pub fn move_to_channel(
        &self,
        name: impl Into<String>,
    ) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .actions
            .send(Action::MoveToChannel(name.into(), tx));
        rx
    }

    /// Sends a text message to the current channel.
    pub fn send_channel_message(&self, text: impl Into<String>) {
        let _ = self
            .actions
            .send(Action::SendChannelMessage(text.into()));
    }

    /// Sends a text message to the whole virtual server.
    pub fn send_server_message(&self, text: impl Into<String>) {
        let _ = self.actions.send(Action::SendServerMessage(text.into()));
    }

    /// Sends a text message to an arbitrary target.
    pub fn send_text_message(
        &self,
        target: TextMessageTarget,
        text: impl Into<String>,
    ) {
        let _ = self
            .actions
            .send(Action::SendTextMessage(target, text.into()));
    }

    /// Updates the client's own description via `clientedit`.
    pub fn update_description(&self, text: impl Into<String>) {
        let _ = self
            .actions
            .send(Action::UpdateDescription(text.into()));
    }
}

/// Owns all mutable per-session state and drives the post-handshake I/O
/// loop: reads, acks, heartbeat, idle timeout, retransmission, and the
/// outbound action queue.
struct Session {
    transport: Transport,
    counters: Counters,
    shared_iv: [u8; 64],
    own_client_id: ClientId,
    current_channel: ChannelId,
    channel_directory: ChannelDirectory,
    peer_directory: PeerDirectory,
    command_assembler: Assembler,
    command_low_assembler: Assembler,
    retransmit: RetransmitQueue,
    events: mpsc::UnboundedSender<Event>,
}

impl Session {
    async fn run(mut self, mut actions: mpsc::UnboundedReceiver<Action>) {
        let mut ping_timer = interval(PING_INTERVAL);
        let mut retransmit_timer = interval(Duration::from_millis(250));
        let mut last_server_traffic = Instant::now();

        let disconnect_reason = loop {
            tokio::select! {
                biased;

                action = actions.recv() => {
                    match action {
                        Some(Action::Disconnect) | None => {
                            self.send_best_effort(b"clientdisconnect".to_vec()).await;
                            break "requested".to_string();
                        }
                        Some(other) => self.handle_action(other).await,
                    }
                }

                datagram = self.transport.recv() => {
                    match datagram {
                        Ok(bytes) => {
                            last_server_traffic = Instant::now();
                            if let Some(reason) = self.handle_datagram(&bytes).await {
                                break reason;
                            }
                        }
                        Err(err) => {
                            let _ = self.events.send(Event::Error {
                                kind: ErrorKind::Transport(err),
                                detail: "transport read failed".to_string(),
                            });
                            break "transport error".to_string();
                        }
                    }
                }

                _ = ping_timer.tick() => {
                    if last_server_traffic.elapsed() >= IDLE_TIMEOUT {
                        break "timeout".to_string();
                    }
                    self.send_ping().await;
                }

                _ = retransmit_timer.tick() => {
                    if self.poll_retransmits().await {
                        break "timeout".to_string();
                    }
                }
            }
        };

        log::debug!("TS3 session ended: {}", disconnect_reason);
        let _ = self.events.send(Event::Disconnected {
            reason: disconnect_reason,
        });
    }

    async fn handle_action(&mut self, action: Action) {
        match action {
            // Intercepted in `run()` before reaching here; kept so this
            // match stays exhaustive.
            Action::Disconnect => {}
            Action::MoveToChannel(name, reply) => {
                let target = self.channel_directory.find_by_name(&name);
                if let Some(channel_id) = target {
                    let cmd = format!(
                        "clientmove clid={} cid={}",
                        self.own_client_id, channel_id
                    );
                    self.send_reliable(cmd.into_bytes()).await;
                }
                let _ = reply.send(target.is_some());
            }
            Action::SendChannelMessage(text) => {
                self.send_text(2, self.own_client_id.0, &text).await;
            }
            Action::SendServerMessage(text) => {
                self.send_text(3, self.own_client_id.0, &text).await;
            }
            Action::SendTextMessage(target, text) => {
                let target_id = match target {
                    TextMessageTarget::Client(id) => id.0,
                    TextMessageTarget::Channel | TextMessageTarget::Server => {
                        self.own_client_id.0
                    }
                };
                self.send_text(target.wire_mode(), target_id, &text).await;
            }
            Action::UpdateDescription(text) => {
                let cmd = command::Command {
                    name: Some("clientedit".to_string()),
                    items: vec![Item(vec![
                        Param::KeyValue(
                            "clid".to_string(),
                            self.own_client_id.to_string(),
                        ),
                        Param::KeyValue(
                            "client_description".to_string(),
                            text,
                        ),
                    ])],
                };
                self.send_reliable(command::serialize(&cmd).into_bytes())
                    .await;
            }
        }
    }

    async fn send_text(&mut self, mode: u8, target: u16, text: &str) {
        let cmd = command::Command {
            name: Some("sendtextmessage".to_string()),
            items: vec![Item(vec![
                Param::KeyValue("targetmode".to_string(), mode.to_string()),
                Param::KeyValue("target".to_string(), target.to_string()),
                Param::KeyValue("msg".to_string(), text.to_string()),
            ])],
        };
        self.send_reliable(command::serialize(&cmd).into_bytes()).await;
    }

    async fn send_reliable(&mut self, payload: Vec<u8>) {
        let sealed = packet::seal(
            &mut self.counters,
            &self.shared_iv,
            PacketType::Command,
            self.own_client_id.0,
            false,
            payload,
        );
        self.retransmit.track(sealed.packet_id, sealed.wire.clone());
        if let Err(err) = self.transport.send(&sealed.wire).await {
            let _ = self.events.send(Event::Error {
                kind: ErrorKind::Transport(err),
                detail: "failed to send command".to_string(),
            });
        }
    }

    async fn send_best_effort(&mut self, payload: Vec<u8>) {
        let sealed = packet::seal(
            &mut self.counters,
            &self.shared_iv,
            PacketType::Command,
            self.own_client_id.0,
            false,
            payload,
        );
        let _ = self.transport.send(&sealed.wire).await;
    }

    async fn send_ping(&mut self) {
        let (packet_id, _generation) =
            self.counters.next_send(PacketType::Ping);
        let header = Header {
            mac: [0; 8],
            packet_id,
            client_id: Some(self.own_client_id.0),
            packet_type: PacketType::Ping,
            flags: Flags::UNENCRYPTED,
        };
        let _ = self.transport.send(&header.encode_c2s()).await;
    }

    /// Returns `Some(reason)` if the session should tear down as a result
    /// of this datagram.
    async fn handle_datagram(&mut self, datagram: &[u8]) -> Option<String> {
        let header = Header::decode_s2c(datagram)?;
        let ciphertext = datagram.get(Header::LEN_S2C..)?.to_vec();

        match header.packet_type {
            PacketType::Pong => None,
            PacketType::Ping => {
                // Pongs echo the ping's own packet id rather than drawing
                // from our send counter.
                let reply = Header {
                    mac: [0; 8],
                    packet_id: header.packet_id,
                    client_id: Some(self.own_client_id.0),
                    packet_type: PacketType::Pong,
                    flags: Flags::UNENCRYPTED,
                };
                let _ = self.transport.send(&reply.encode_c2s()).await;
                None
            }
            PacketType::Ack | PacketType::AckLow => {
                let generation =
                    self.counters.recv_generation(header.packet_type);
                if let Ok(plaintext) =
                    packet::open(&header, &self.shared_iv, generation, ciphertext)
                {
                    self.counters
                        .observe_recv(header.packet_type, header.packet_id);
                    if plaintext.len() >= 2 {
                        let id = u16::from_be_bytes([
                            plaintext[0],
                            plaintext[1],
                        ]);
                        self.retransmit.ack(id);
                    }
                }
                None
            }
            PacketType::Command | PacketType::CommandLow => {
                let generation =
                    self.counters.recv_generation(header.packet_type);
                let plaintext =
                    match packet::open(&header, &self.shared_iv, generation, ciphertext)
                    {
                        Ok(p) => p,
                        Err(_) => return None,
                    };
                self.counters
                    .observe_recv(header.packet_type, header.packet_id);

                let fragmented = header.flags.contains(Flags::FRAGMENTED);
                let assembler = if header.packet_type == PacketType::Command
                {
                    &mut self.command_assembler
                } else {
                    &mut self.command_low_assembler
                };
                let assembled =
                    match assembler.feed(header.packet_id, &plaintext, fragmented)
                    {
                        Ok(Some(buf)) => buf,
                        Ok(None) => return None,
                        Err(err) => {
                            let _ = self.events.send(Event::Error {
                                kind: ErrorKind::Protocol(err.to_string()),
                                detail: "fragment reassembly failed".to_string(),
                            });
                            return Some("protocol error".to_string());
                        }
                    };

                self.send_ack(header.packet_type, header.packet_id).await;

                let text = String::from_utf8_lossy(&assembled).into_owned();
                self.handle_command_text(&text).await
            }
            PacketType::Voice | PacketType::VoiceWhisper | PacketType::Init => {
                None
            }
        }
    }

    async fn send_ack(&mut self, acked_type: PacketType, packet_id: u16) {
        let ack_type = if acked_type == PacketType::Command {
            PacketType::Ack
        } else {
            PacketType::AckLow
        };
        let (id, generation) = self.counters.next_send(ack_type);
        let header = Header {
            mac: [0; 8],
            packet_id: id,
            client_id: Some(self.own_client_id.0),
            packet_type: ack_type,
            flags: Flags::NEWPROTOCOL,
        };
        let header_bytes = header.encode_c2s();
        let meta = header_bytes[8..].to_vec();
        let mut payload = packet_id.to_be_bytes().to_vec();
        let (key, nonce) =
            crate::kdf::derive(&self.shared_iv, ack_type, true, id, generation);
        let tag = ts3_crypto::eax::seal(&key, &nonce, &meta, &mut payload);
        let mut wire = Vec::with_capacity(Header::LEN_C2S + payload.len());
        wire.extend_from_slice(&tag);
        wire.extend_from_slice(&meta);
        wire.extend_from_slice(&payload);
        let _ = self.transport.send(&wire).await;
    }

    async fn handle_command_text(&mut self, text: &str) -> Option<String> {
        let parsed = match command::parse(text) {
            Ok(cmd) => cmd,
            Err(_) => {
                for item in command::parse_body(text) {
                    self.apply_notification_item("", &item).await;
                }
                return None;
            }
        };
        let name = parsed.name.clone().unwrap_or_default();
        for item in &parsed.items {
            if let Some(reason) =
                self.apply_notification_item(&name, item).await
            {
                return Some(reason);
            }
        }
        None
    }

    async fn apply_notification_item(
        &mut self,
        name: &str,
        item: &Item,
    ) -> Option<String> {
        match name {
            "channellist" => {
                if let (Some(id), Some(channel_name)) =
                    (item.get("cid"), item.get("channel_name"))
                {
                    if let Ok(id) = id.parse() {
                        self.channel_directory
                            .insert(ChannelId(id), channel_name.to_string());
                    }
                }
            }
            "notifychanneledited" | "notifychannelcreated" => {
                if let (Some(id), Some(channel_name)) =
                    (item.get("cid"), item.get("channel_name"))
                {
                    if let Ok(id) = id.parse() {
                        self.channel_directory
                            .insert(ChannelId(id), channel_name.to_string());
                    }
                }
            }
            "notifychanneldeleted" => {
                if let Some(id) = item.get("cid").and_then(|v| v.parse().ok()) {
                    self.channel_directory.remove(ChannelId(id));
                }
            }
            "clientlist" | "notifycliententerview" => {
                if let (Some(id), Some(nickname)) =
                    (item.get("clid"), item.get("client_nickname"))
                {
                    if let Ok(id) = id.parse() {
                        self.peer_directory
                            .insert(ClientId(id), nickname.to_string());
                    }
                }
            }
            "notifyclientleftview" => {
                if let Some(id) = item.get("clid").and_then(|v| v.parse().ok())
                {
                    let id = ClientId(id);
                    self.peer_directory.remove(id);
                    if id == self.own_client_id {
                        let reason = item
                            .get("reasonmsg")
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "kicked".to_string());
                        return Some(reason);
                    }
                }
            }
            "notifyclientmoved" => {
                if let Some(channel_id) =
                    item.get("ctid").and_then(|v| v.parse().ok())
                {
                    if let Some(clid) =
                        item.get("clid").and_then(|v| v.parse::<u16>().ok())
                    {
                        if ClientId(clid) == self.own_client_id {
                            self.current_channel = ChannelId(channel_id);
                        }
                    }
                }
            }
            "notifyserveredited" => {}
            "notifytextmessage" => {
                let mode = item
                    .get("targetmode")
                    .and_then(|v| v.parse::<u8>().ok())
                    .unwrap_or(2);
                let invoker_id = item
                    .get("invokerid")
                    .and_then(|v| v.parse::<u16>().ok())
                    .unwrap_or(0);
                let invoker_name = item
                    .get("invokername")
                    .unwrap_or_default()
                    .to_string();
                let text = item.get("msg").unwrap_or_default().to_string();
                let target = match mode {
                    1 => TextMessageTarget::Client(ClientId(invoker_id)),
                    3 => TextMessageTarget::Server,
                    _ => TextMessageTarget::Channel,
                };
                let _ = self.events.send(Event::TextMessage {
                    mode: target,
                    text,
                    invoker_name,
                    invoker_id: ClientId(invoker_id),
                });
            }
            "" | "channellistfinished" => {}
            other => {
                log::debug!("ignoring unknown notification: {}", other);
            }
        }
        None
    }

    /// Polls the retransmit queue. Returns `true` if the session should
    /// fail with a timeout because a packet exhausted its retry budget.
    async fn poll_retransmits(&mut self) -> bool {
        let actions = self.retransmit.poll(Instant::now());
        let mut gave_up = false;
        for action in actions {
            match action {
                RetransmitAction::Retransmit(wire) => {
                    let _ = self.transport.send(&wire).await;
                }
                RetransmitAction::GiveUp => gave_up = true,
            }
        }
        gave_up
    }
}

async fn build_transport(config: &Config) -> Result<Transport, ErrorKind> {
    match (&config.relay_url, &config.relay_token) {
        (Some(url), Some(token)) => {
            Transport::connect_relay(url, token, &config.host, config.port)
                .await
                .map_err(ErrorKind::Transport)
        }
        _ => Transport::connect_udp(&config.host, config.port)
            .await
            .map_err(ErrorKind::Transport),
    }
}

async fn send_init(
    transport: &mut Transport,
    payload: &[u8],
) -> Result<(), ErrorKind> {
    let mut wire = Vec::with_capacity(11 + payload.len());
    wire.extend_from_slice(crate::header::INIT_MAGIC);
    wire.extend_from_slice(&crate::header::INIT_PACKET_ID.to_be_bytes());
    wire.push(crate::header::INIT_TYPE_BYTE);
    wire.extend_from_slice(payload);
    transport.send(&wire).await.map_err(ErrorKind::Transport)
}

async fn recv_init(transport: &mut Transport) -> Result<Vec<u8>, ErrorKind> {
    loop {
        let datagram = transport.recv().await.map_err(ErrorKind::Transport)?;
        if Header::is_init_frame(&datagram) {
            return Ok(datagram[11..].to_vec());
        }
    }
}

async fn send_command_real(
    transport: &mut Transport,
    counters: &mut Counters,
    shared_iv: &[u8; 64],
    client_id: u16,
    payload: Vec<u8>,
) -> Result<(), ErrorKind> {
    let sealed =
        packet::seal(counters, shared_iv, PacketType::Command, client_id, false, payload);
    transport.send(&sealed.wire).await.map_err(ErrorKind::Transport)
}

async fn recv_fake_command(
    transport: &mut Transport,
    assembler: &mut Assembler,
) -> Result<command::Command, ErrorKind> {
    loop {
        let datagram = transport.recv().await.map_err(ErrorKind::Transport)?;
        let header = match Header::decode_s2c(&datagram) {
            Some(h) => h,
            None => continue,
        };
        if header.packet_type != PacketType::Command {
            continue;
        }
        let ciphertext = datagram[Header::LEN_S2C..].to_vec();
        let plaintext = match packet::open_fake(&header, ciphertext) {
            Ok(p) => p,
            Err(_) => continue,
        };
        let fragmented = header.flags.contains(Flags::FRAGMENTED);
        match assembler.feed(header.packet_id, &plaintext, fragmented) {
            Ok(Some(full)) => {
                let text = String::from_utf8_lossy(&full).into_owned();
                return command::parse(&text)
                    .map_err(|e| ErrorKind::Protocol(e.to_string()));
            }
            Ok(None) => continue,
            Err(e) => return Err(ErrorKind::Protocol(e.to_string())),
        }
    }
}

async fn recv_real_command(
    transport: &mut Transport,
    counters: &mut Counters,
    shared_iv: &[u8; 64],
    assembler: &mut Assembler,
) -> Result<command::Command, ErrorKind> {
    loop {
        let datagram = transport.recv().await.map_err(ErrorKind::Transport)?;
        let header = match Header::decode_s2c(&datagram) {
            Some(h) => h,
            None => continue,
        };
        if header.packet_type != PacketType::Command {
            continue;
        }
        let ciphertext = datagram[Header::LEN_S2C..].to_vec();
        let generation = counters.recv_generation(header.packet_type);
        let plaintext =
            match packet::open(&header, shared_iv, generation, ciphertext) {
                Ok(p) => p,
                Err(_) => continue,
            };
        counters.observe_recv(header.packet_type, header.packet_id);
        let fragmented = header.flags.contains(Flags::FRAGMENTED);
        match assembler.feed(header.packet_id, &plaintext, fragmented) {
            Ok(Some(full)) => {
                let text = String::from_utf8_lossy(&full).into_owned();
                return command::parse(&text)
                    .map_err(|e| ErrorKind::Protocol(e.to_string()));
            }
            Ok(None) => continue,
            Err(e) => return Err(ErrorKind::Protocol(e.to_string())),
        }
    }
}

fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0_u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or_default()
}

fn random_hwid() -> String {
    let bytes = random_array::<8>();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use tokio::net::UdpSocket;

    fn test_config(port: u16) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port,
            nickname: "tester".to_string(),
            default_channel: None,
            server_password: None,
            hwid: Some("deadbeef".to_string()),
            relay_url: None,
            relay_token: None,
            strict_license: false,
        }
    }

    fn init1_payload(random0_r: [u8; 4]) -> Vec<u8> {
        let mut payload = vec![0x01_u8];
        payload.extend_from_slice(&[0xAA; 16]);
        payload.extend_from_slice(&random0_r);
        payload
    }

    /// Matches the fixture in `handshake::tests::build_init4_includes_*`:
    /// a puzzle whose level is low enough to solve instantly in a test.
    fn init3_payload() -> Vec<u8> {
        let mut x = [0_u8; 64];
        x[63] = 3;
        let mut n = [0_u8; 64];
        n[62] = 0x0F;
        n[63] = 0x45;

        let mut payload = vec![0x03_u8];
        payload.extend_from_slice(&x);
        payload.extend_from_slice(&n);
        payload.extend_from_slice(&2_u32.to_be_bytes());
        payload.extend_from_slice(&[7_u8; 100]);
        payload
    }

    fn wrap_init(payload: &[u8]) -> Vec<u8> {
        let mut wire = crate::header::INIT_MAGIC.to_vec();
        wire.extend_from_slice(&crate::header::INIT_PACKET_ID.to_be_bytes());
        wire.push(crate::header::INIT_TYPE_BYTE);
        wire.extend_from_slice(payload);
        wire
    }

    /// Seals `payload` as a fake-key S2C `Command` packet, mirroring what a
    /// real server sends before `clientek` establishes the real key.
    fn seal_fake_s2c(packet_id: u16, payload: &[u8]) -> Vec<u8> {
        let header = Header {
            mac: [0; 8],
            packet_id,
            client_id: None,
            packet_type: PacketType::Command,
            flags: Flags::NEWPROTOCOL,
        };
        let header_bytes = header.encode_s2c();
        let meta = header_bytes[8..].to_vec();
        let mut body = payload.to_vec();
        let tag = ts3_crypto::eax::seal(
            &crate::kdf::FAKE_KEY,
            &crate::kdf::FAKE_NONCE,
            &meta,
            &mut body,
        );
        let mut wire = Vec::with_capacity(Header::LEN_S2C + body.len());
        wire.extend_from_slice(&tag);
        wire.extend_from_slice(&meta);
        wire.extend_from_slice(&body);
        wire
    }

    #[tokio::test]
    async fn random0_mismatch_rejects_handshake() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0_u8; 2048];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let _ = &buf[..len];
            // Echo back a `random0_r` that cannot match whatever the
            // client just sent.
            let wire = wrap_init(&init1_payload([0xFF; 4]));
            server.send_to(&wire, peer).await.unwrap();
        });

        let result = Connection::connect(test_config(server_addr.port())).await;
        assert!(
            matches!(result, Err(ErrorKind::Protocol(_))),
            "expected a protocol error, got {result:?}"
        );
    }

    #[tokio::test]
    async fn strict_license_failure_surfaces_crypto_error() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let server_addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = vec![0_u8; 2048];

            // Init0 -> Init1, echoing back whatever random0 the client sent.
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let init0 = buf[11..len].to_vec();
            let mut random0_r = [0_u8; 4];
            random0_r.copy_from_slice(&init0[9..13]);
            server
                .send_to(&wrap_init(&init1_payload(random0_r)), peer)
                .await
                .unwrap();

            // Init2 -> Init3.
            let _ = server.recv_from(&mut buf).await.unwrap();
            server
                .send_to(&wrap_init(&init3_payload()), peer)
                .await
                .unwrap();

            // Init4 -> a fake-sealed `initivexpand2` with an empty license,
            // which fails license-chain derivation deterministically.
            let _ = server.recv_from(&mut buf).await.unwrap();
            let license_b64 = STANDARD.encode(Vec::<u8>::new());
            let beta_b64 = STANDARD.encode([0_u8; 10]);
            let cmd = format!(
                "initivexpand2 l={license_b64} beta={beta_b64}"
            );
            server
                .send_to(&seal_fake_s2c(1, cmd.as_bytes()), peer)
                .await
                .unwrap();
        });

        let mut config = test_config(server_addr.port());
        config.strict_license = true;
        let result = Connection::connect(config).await;
        assert!(
            matches!(result, Err(ErrorKind::Crypto(_))),
            "expected a crypto error, got {result:?}"
        );
    }

    #[tokio::test]
    async fn idle_timeout_ends_session_with_timeout_reason() {
        // Connected to an address nothing listens on: `recv()` simply never
        // resolves, exercising the idle-timeout path in isolation from the
        // rest of the handshake.
        let transport = Transport::connect_udp("127.0.0.1", 1).await.unwrap();
        let (action_tx, action_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let session = Session {
            transport,
            counters: Counters::default(),
            shared_iv: [0_u8; 64],
            own_client_id: ClientId(1),
            current_channel: ChannelId(0),
            channel_directory: ChannelDirectory::default(),
            peer_directory: PeerDirectory::default(),
            command_assembler: Assembler::default(),
            command_low_assembler: Assembler::default(),
            retransmit: RetransmitQueue::default(),
            events: event_tx,
        };

        timeout(Duration::from_secs(2), session.run(action_rx))
            .await
            .expect("session.run should finish well within the idle timeout");
        drop(action_tx);

        match event_rx.recv().await {
            Some(Event::Disconnected { reason }) => {
                assert_eq!(reason, "timeout");
            }
            other => panic!("expected Event::Disconnected, got {other:?}"),
        }
    }
}
