//! Outstanding-send tracking and exponential-backoff retransmission for
//! Command/CommandLow packets.
//!
//! The original protocol implementation is best-effort here and never
//! retransmits; since the transport is UDP, a conformant rewrite adds
//! backoff on top instead of trusting every send to arrive.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Initial retransmission delay.
const INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Backoff multiplier applied on each retransmit.
const BACKOFF_MULTIPLIER: u32 = 2;

/// Ceiling past which the session gives up and fails with `Timeout`.
const MAX_TOTAL_WAIT: Duration = Duration::from_secs(10);

/// One packet awaiting acknowledgement.
#[derive(Clone, Debug)]
struct Outstanding {
    payload: Vec<u8>,
    sent_at: Instant,
    next_retry_at: Instant,
    backoff: Duration,
    first_sent_at: Instant,
}

/// Tracks unacked Command/CommandLow sends for one connection and decides
/// when to retransmit or give up.
#[derive(Debug, Default)]
pub struct RetransmitQueue {
    outstanding: HashMap<u16, Outstanding>,
}

/// What the caller should do after a tick or an ack.
#[derive(Debug, Eq, PartialEq)]
pub enum Action {
    /// Resend the payload for this packet id.
    Retransmit(Vec<u8>),
    /// This packet id has exceeded [`MAX_TOTAL_WAIT`]; the session should
    /// fail with `Timeout`.
    GiveUp,
}

impl RetransmitQueue {
    /// Registers a freshly sent packet awaiting an ack.
    pub fn track(&mut self, packet_id: u16, payload: Vec<u8>) {
        let now = Instant::now();
        self.outstanding.insert(
            packet_id,
            Outstanding {
                payload,
                sent_at: now,
                next_retry_at: now + INITIAL_BACKOFF,
                backoff: INITIAL_BACKOFF,
                first_sent_at: now,
            },
        );
    }

    /// Clears a packet id on receipt of its ack.
    pub fn ack(&mut self, packet_id: u16) {
        self.outstanding.remove(&packet_id);
    }

    /// Whether any packet is still outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outstanding.is_empty()
    }

    /// Advances time, returning the actions to take for packets whose
    /// retry deadline has passed.
    pub fn poll(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let mut give_up = Vec::new();

        for (&packet_id, entry) in &mut self.outstanding {
            if now < entry.next_retry_at {
                continue;
            }
            if now.duration_since(entry.first_sent_at) >= MAX_TOTAL_WAIT {
                give_up.push(packet_id);
                continue;
            }
            entry.sent_at = now;
            entry.backoff *= BACKOFF_MULTIPLIER;
            entry.next_retry_at = now + entry.backoff;
            actions.push(Action::Retransmit(entry.payload.clone()));
        }

        for packet_id in give_up {
            self.outstanding.remove(&packet_id);
            actions.push(Action::GiveUp);
        }

        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_clears_outstanding_entry() {
        let mut queue = RetransmitQueue::default();
        queue.track(1, b"hello".to_vec());
        assert!(!queue.is_empty());
        queue.ack(1);
        assert!(queue.is_empty());
    }

    #[test]
    fn retransmits_after_backoff_elapses() {
        let mut queue = RetransmitQueue::default();
        queue.track(1, b"hello".to_vec());

        let immediate = queue.poll(Instant::now());
        assert!(immediate.is_empty());

        let later = Instant::now() + INITIAL_BACKOFF + Duration::from_millis(1);
        let actions = queue.poll(later);
        assert_eq!(actions, vec![Action::Retransmit(b"hello".to_vec())]);
    }

    #[test]
    fn gives_up_after_max_total_wait() {
        let mut queue = RetransmitQueue::default();
        queue.track(1, b"hello".to_vec());

        let far_future = Instant::now() + MAX_TOTAL_WAIT + Duration::from_secs(1);
        let actions = queue.poll(far_future);
        assert_eq!(actions, vec![Action::GiveUp]);
        assert!(queue.is_empty());
    }
}
