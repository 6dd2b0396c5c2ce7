//! On-wire packet header: 13 bytes client-to-server, 11 bytes
//! server-to-client, plus the fixed `TS3INIT1` framing used during the
//! handshake.

use byteorder::{BigEndian, ByteOrder};
use derive_more::Display;

/// The literal byte string that opens every Init packet in place of a MAC.
pub const INIT_MAGIC: &[u8; 8] = b"TS3INIT1";

/// Fixed packet id carried by every Init packet.
pub const INIT_PACKET_ID: u16 = 0x0065;

/// Fixed type/flags byte carried by every Init packet (`UNENCRYPTED | Init`).
pub const INIT_TYPE_BYTE: u8 = 0x88;

/// The eight packet types the protocol distinguishes in the header's low
/// nibble.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum PacketType {
    /// Voice data, never acked.
    Voice,
    /// Voice data sent to a whisper target list, never acked.
    VoiceWhisper,
    /// A command, requires an ack and may be fragmented.
    Command,
    /// A low-priority command, requires an ack and may be fragmented.
    CommandLow,
    /// Heartbeat, never acked.
    Ping,
    /// Heartbeat reply, never acked.
    Pong,
    /// Acknowledges a `Command` packet id.
    Ack,
    /// Acknowledges a `CommandLow` packet id.
    AckLow,
    /// Handshake packet; always unencrypted.
    Init,
}

impl PacketType {
    /// The number of distinct packet types; used to size fixed-length
    /// per-type tables.
    pub const COUNT: usize = 9;

    /// The low-nibble wire value for this type.
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::Voice => 0,
            Self::VoiceWhisper => 1,
            Self::Command => 2,
            Self::CommandLow => 3,
            Self::Ping => 4,
            Self::Pong => 5,
            Self::Ack => 6,
            Self::AckLow => 7,
            Self::Init => 8,
        }
    }

    /// Dense index matching [`wire_value`](Self::wire_value), for table
    /// lookups.
    #[must_use]
    pub const fn index(self) -> usize {
        self.wire_value() as usize
    }

    /// Parses a low-nibble wire value back into a [`PacketType`].
    #[must_use]
    pub const fn from_wire_value(value: u8) -> Option<Self> {
        Some(match value & 0x0F {
            0 => Self::Voice,
            1 => Self::VoiceWhisper,
            2 => Self::Command,
            3 => Self::CommandLow,
            4 => Self::Ping,
            5 => Self::Pong,
            6 => Self::Ack,
            7 => Self::AckLow,
            8 => Self::Init,
            _ => return None,
        })
    }

    /// Whether packets of this type require acknowledgement.
    #[must_use]
    pub const fn requires_ack(self) -> bool {
        matches!(self, Self::Command | Self::CommandLow)
    }

    /// Whether packets of this type may carry the FRAGMENTED flag.
    #[must_use]
    pub const fn fragmentable(self) -> bool {
        matches!(self, Self::Command | Self::CommandLow)
    }
}

bitflags::bitflags! {
    /// High-nibble flag bits of the type/flags byte.
    pub struct Flags: u8 {
        /// Packet is not encrypted (always set on Init and Ping/Pong).
        const UNENCRYPTED = 0x80;
        /// Payload is quicklz-compressed. Unsupported; see
        /// [`crate::command::CommandParseError::Compressed`].
        const COMPRESSED = 0x40;
        /// Peer advertises the "new protocol" dialect.
        const NEWPROTOCOL = 0x20;
        /// Payload is one fragment of a larger logical message.
        const FRAGMENTED = 0x10;
    }
}

/// A parsed packet header, direction-agnostic.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Header {
    /// 8-byte MAC (truncated EAX tag, or [`INIT_MAGIC`] on Init packets).
    pub mac: [u8; 8],
    /// Big-endian per-type packet id.
    pub packet_id: u16,
    /// Client id, present only on client-to-server headers.
    pub client_id: Option<u16>,
    /// Packet type, decoded from the low nibble of the type/flags byte.
    pub packet_type: PacketType,
    /// Flag bits, decoded from the high nibble of the type/flags byte.
    pub flags: Flags,
}

impl Header {
    /// Length in bytes of a client-to-server header.
    pub const LEN_C2S: usize = 13;
    /// Length in bytes of a server-to-client header.
    pub const LEN_S2C: usize = 11;

    /// Serializes this header as a client-to-server header. Panics (via
    /// debug assertion) if `client_id` is `None`; the caller is expected to
    /// have set it when constructing an outgoing header.
    #[must_use]
    pub fn encode_c2s(&self) -> [u8; Self::LEN_C2S] {
        let mut out = [0_u8; Self::LEN_C2S];
        out[0..8].copy_from_slice(&self.mac);
        BigEndian::write_u16(&mut out[8..10], self.packet_id);
        BigEndian::write_u16(
            &mut out[10..12],
            self.client_id.unwrap_or_default(),
        );
        out[12] = self.packet_type.wire_value() | self.flags.bits();
        out
    }

    /// Serializes this header as a server-to-client header.
    #[must_use]
    pub fn encode_s2c(&self) -> [u8; Self::LEN_S2C] {
        let mut out = [0_u8; Self::LEN_S2C];
        out[0..8].copy_from_slice(&self.mac);
        BigEndian::write_u16(&mut out[8..10], self.packet_id);
        out[10] = self.packet_type.wire_value() | self.flags.bits();
        out
    }

    /// Parses a client-to-server header from the front of `buf`.
    #[must_use]
    pub fn decode_c2s(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN_C2S {
            return None;
        }
        let mut mac = [0_u8; 8];
        mac.copy_from_slice(&buf[0..8]);
        let packet_id = BigEndian::read_u16(&buf[8..10]);
        let client_id = BigEndian::read_u16(&buf[10..12]);
        let type_byte = buf[12];
        Some(Self {
            mac,
            packet_id,
            client_id: Some(client_id),
            packet_type: PacketType::from_wire_value(type_byte)?,
            flags: Flags::from_bits_truncate(type_byte),
        })
    }

    /// Parses a server-to-client header from the front of `buf`.
    #[must_use]
    pub fn decode_s2c(buf: &[u8]) -> Option<Self> {
        if buf.len() < Self::LEN_S2C {
            return None;
        }
        let mut mac = [0_u8; 8];
        mac.copy_from_slice(&buf[0..8]);
        let packet_id = BigEndian::read_u16(&buf[8..10]);
        let type_byte = buf[10];
        Some(Self {
            mac,
            packet_id,
            client_id: None,
            packet_type: PacketType::from_wire_value(type_byte)?,
            flags: Flags::from_bits_truncate(type_byte),
        })
    }

    /// Whether `buf` opens with the fixed Init framing (magic, packet id,
    /// type byte), regardless of direction.
    #[must_use]
    pub fn is_init_frame(buf: &[u8]) -> bool {
        buf.len() >= 11
            && &buf[0..8] == INIT_MAGIC
            && BigEndian::read_u16(&buf[8..10]) == INIT_PACKET_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn c2s_round_trips() {
        let header = Header {
            mac: [1, 2, 3, 4, 5, 6, 7, 8],
            packet_id: 0xBEEF,
            client_id: Some(0x1234),
            packet_type: PacketType::Command,
            flags: Flags::NEWPROTOCOL,
        };
        let encoded = header.encode_c2s();
        let decoded = Header::decode_c2s(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn s2c_round_trips() {
        let header = Header {
            mac: [9; 8],
            packet_id: 7,
            client_id: None,
            packet_type: PacketType::Voice,
            flags: Flags::empty(),
        };
        let encoded = header.encode_s2c();
        let decoded = Header::decode_s2c(&encoded).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn recognizes_init_frame() {
        let mut buf = INIT_MAGIC.to_vec();
        buf.extend_from_slice(&[0x00, 0x65]);
        buf.push(0x88);
        assert!(Header::is_init_frame(&buf));

        buf[0] ^= 1;
        assert!(!Header::is_init_frame(&buf));
    }

    #[test]
    fn wire_value_round_trips_for_every_type() {
        let all = [
            PacketType::Voice,
            PacketType::VoiceWhisper,
            PacketType::Command,
            PacketType::CommandLow,
            PacketType::Ping,
            PacketType::Pong,
            PacketType::Ack,
            PacketType::AckLow,
            PacketType::Init,
        ];
        for ty in all {
            assert_eq!(PacketType::from_wire_value(ty.wire_value()), Some(ty));
        }
    }
}
