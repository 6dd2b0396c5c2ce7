//! Reassembly of fragmented Command/CommandLow payloads.

use derive_more::{Display, Error};

/// Guard against a runaway fragmented message consuming unbounded memory.
pub const MAX_ASSEMBLED_LEN: usize = 1024 * 1024;

/// Errors raised while reassembling a fragmented message.
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq)]
pub enum FragmentError {
    /// The assembled buffer grew past [`MAX_ASSEMBLED_LEN`].
    #[display(fmt = "fragment buffer exceeded {MAX_ASSEMBLED_LEN} bytes")]
    TooLarge,

    /// A fragment for this packet type arrived while a different
    /// fragmented stream of the same type was still in progress. The
    /// protocol never interleaves two logical messages of one type, so
    /// this is a server violation.
    #[display(fmt = "interleaved fragment stream for the same packet type")]
    Interleaved,
}

/// One pending reassembly accumulator, one per fragmentable packet type.
///
/// Tracks the packet id of the last fragment consumed so that a second,
/// interleaved fragmented stream of the same type (one whose ids do not
/// continue where the first left off) is rejected rather than silently
/// concatenated into nonsense.
#[derive(Clone, Debug, Default)]
pub struct Assembler {
    pending: Option<Vec<u8>>,
    last_id: Option<u16>,
}

impl Assembler {
    /// Feeds one received frame's payload into the assembler.
    ///
    /// Returns `Some(buffer)` once a frame without the FRAGMENTED flag
    /// completes the message; `None` while assembly is still in progress.
    pub fn feed(
        &mut self,
        packet_id: u16,
        payload: &[u8],
        fragmented: bool,
    ) -> Result<Option<Vec<u8>>, FragmentError> {
        if let Some(last_id) = self.last_id {
            if packet_id != last_id.wrapping_add(1) {
                self.pending = None;
                self.last_id = None;
                return Err(FragmentError::Interleaved);
            }
        }

        let buf = self.pending.get_or_insert_with(Vec::new);
        buf.extend_from_slice(payload);
        self.last_id = Some(packet_id);
        if buf.len() > MAX_ASSEMBLED_LEN {
            self.pending = None;
            self.last_id = None;
            return Err(FragmentError::TooLarge);
        }
        if fragmented {
            return Ok(None);
        }
        self.last_id = None;
        Ok(self.pending.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_three_fragments_in_order() {
        let mut asm = Assembler::default();
        assert_eq!(asm.feed(1, b"hel", true).unwrap(), None);
        assert_eq!(asm.feed(2, b"lo ", true).unwrap(), None);
        assert_eq!(
            asm.feed(3, b"world", false).unwrap(),
            Some(b"hello world".to_vec())
        );
    }

    #[test]
    fn single_unfragmented_frame_delivers_immediately() {
        let mut asm = Assembler::default();
        assert_eq!(
            asm.feed(1, b"whole message", false).unwrap(),
            Some(b"whole message".to_vec())
        );
    }

    #[test]
    fn rejects_buffer_past_guard() {
        let mut asm = Assembler::default();
        let chunk = vec![0_u8; MAX_ASSEMBLED_LEN];
        assert!(asm.feed(1, &chunk, true).is_ok());
        assert_eq!(
            asm.feed(2, &[0_u8; 1], false),
            Err(FragmentError::TooLarge)
        );
    }

    #[test]
    fn clears_state_after_delivery_for_next_message() {
        let mut asm = Assembler::default();
        asm.feed(1, b"first", false).unwrap();
        assert_eq!(
            asm.feed(5, b"second", false).unwrap(),
            Some(b"second".to_vec())
        );
    }

    #[test]
    fn rejects_interleaved_fragment_stream() {
        let mut asm = Assembler::default();
        assert_eq!(asm.feed(1, b"AAA", true).unwrap(), None);
        // A second message's fragment arrives out of sequence instead of
        // continuing packet id 2.
        assert_eq!(asm.feed(9, b"BBB", true), Err(FragmentError::Interleaved));
    }
}
