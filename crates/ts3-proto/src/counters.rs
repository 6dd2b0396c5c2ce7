//! Per-packet-type send/receive counters, including the 32-bit generation
//! that disambiguates 16-bit packet ids after wraparound.

use crate::header::PacketType;

/// A `(id, generation)` pair for one packet type in one direction.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Counter {
    /// Next (send) or last-seen (receive) 16-bit packet id.
    pub id: u16,
    /// Incremented each time `id` wraps past `0xFFFF`.
    pub generation: u32,
}

impl Counter {
    /// Returns the current `(id, generation)` and advances to the next id,
    /// bumping `generation` on wrap.
    pub fn next(&mut self) -> (u16, u32) {
        let current = (self.id, self.generation);
        let (next_id, wrapped) = self.id.overflowing_add(1);
        self.id = next_id;
        if wrapped {
            self.generation = self.generation.wrapping_add(1);
        }
        current
    }

    /// Records an observed incoming id, bumping `generation` if it wrapped
    /// relative to the previous id.
    pub fn observe(&mut self, id: u16) {
        if id < self.id {
            self.generation = self.generation.wrapping_add(1);
        }
        self.id = id;
    }
}

/// Send and receive counters for every [`PacketType`], grouped the way the
/// rest of a connection's per-session state is grouped into one owned
/// struct rather than scattered loose fields.
#[derive(Clone, Copy, Debug)]
pub struct Counters {
    send: [Counter; PacketType::COUNT],
    recv: [Counter; PacketType::COUNT],
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            send: [Counter::default(); PacketType::COUNT],
            recv: [Counter::default(); PacketType::COUNT],
        }
    }
}

impl Counters {
    /// Returns the next outgoing `(id, generation)` for `ty`, advancing the
    /// send counter.
    pub fn next_send(&mut self, ty: PacketType) -> (u16, u32) {
        self.send[ty.index()].next()
    }

    /// Records an incoming packet id for `ty`.
    pub fn observe_recv(&mut self, ty: PacketType, id: u16) {
        self.recv[ty.index()].observe(id);
    }

    /// Current receive generation for `ty`, used to reconstruct the KDF
    /// input for a received packet.
    #[must_use]
    pub fn recv_generation(&self, ty: PacketType) -> u32 {
        self.recv[ty.index()].generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_ids_increase_monotonically() {
        let mut counters = Counters::default();
        let (id0, gen0) = counters.next_send(PacketType::Command);
        let (id1, gen1) = counters.next_send(PacketType::Command);
        assert_eq!(id1, id0.wrapping_add(1));
        assert_eq!(gen0, gen1);
    }

    #[test]
    fn send_generation_increments_on_wrap() {
        let mut counter = Counter {
            id: 0xFFFF,
            generation: 5,
        };
        let (id, generation) = counter.next();
        assert_eq!(id, 0xFFFF);
        assert_eq!(generation, 5);
        assert_eq!(counter.id, 0);
        assert_eq!(counter.generation, 6);
    }

    #[test]
    fn recv_generation_increments_when_id_wraps_backwards() {
        let mut counter = Counter::default();
        counter.observe(0xFFFE);
        counter.observe(0xFFFF);
        assert_eq!(counter.generation, 0);
        counter.observe(0x0001);
        assert_eq!(counter.generation, 1);
    }
}
