//! Channel and peer directories, and the newtypes that index them.

use std::collections::HashMap;

use derive_more::{Display, From, Into};

/// A server-assigned client id.
#[derive(
    Clone, Copy, Debug, Display, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd,
)]
pub struct ClientId(pub u16);

/// A channel id.
#[derive(
    Clone, Copy, Debug, Display, Eq, From, Hash, Into, Ord, PartialEq, PartialOrd,
)]
pub struct ChannelId(pub i32);

/// Mapping from channel id to channel name, populated from `channellist`
/// and kept current by `notifychanneledited` (and, when present,
/// `notifychannelcreated`/`notifychanneldeleted`).
#[derive(Clone, Debug, Default)]
pub struct ChannelDirectory {
    channels: HashMap<ChannelId, String>,
}

impl ChannelDirectory {
    /// Inserts or overwrites a channel's name.
    pub fn insert(&mut self, id: ChannelId, name: String) {
        self.channels.insert(id, name);
    }

    /// Removes a channel, e.g. on `notifychanneldeleted`.
    pub fn remove(&mut self, id: ChannelId) {
        self.channels.remove(&id);
    }

    /// Looks up a channel's name.
    #[must_use]
    pub fn name_of(&self, id: ChannelId) -> Option<&str> {
        self.channels.get(&id).map(String::as_str)
    }

    /// Case-insensitive lookup of a channel id by name, as used by
    /// [`crate::Connection::move_to_channel`].
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<ChannelId> {
        self.channels
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }
}

/// Mapping from client id to nickname, populated from `clientlist` and
/// kept current by `notifycliententerview`/`notifyclientleftview`.
#[derive(Clone, Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<ClientId, String>,
}

impl PeerDirectory {
    /// Records a peer entering view.
    pub fn insert(&mut self, id: ClientId, nickname: String) {
        self.peers.insert(id, nickname);
    }

    /// Removes a peer that left view.
    pub fn remove(&mut self, id: ClientId) -> Option<String> {
        self.peers.remove(&id)
    }

    /// Looks up a peer's nickname.
    #[must_use]
    pub fn nickname_of(&self, id: ClientId) -> Option<&str> {
        self.peers.get(&id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_lookup_is_case_insensitive() {
        let mut dir = ChannelDirectory::default();
        dir.insert(ChannelId(1), "General".to_string());
        assert_eq!(dir.find_by_name("general"), Some(ChannelId(1)));
        assert_eq!(dir.find_by_name("GENERAL"), Some(ChannelId(1)));
        assert_eq!(dir.find_by_name("missing"), None);
    }

    #[test]
    fn peer_directory_tracks_enter_and_leave() {
        let mut dir = PeerDirectory::default();
        dir.insert(ClientId(7), "Bot".to_string());
        assert_eq!(dir.nickname_of(ClientId(7)), Some("Bot"));
        assert_eq!(dir.remove(ClientId(7)), Some("Bot".to_string()));
        assert_eq!(dir.nickname_of(ClientId(7)), None);
    }
}
