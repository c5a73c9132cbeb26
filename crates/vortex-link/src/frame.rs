//! IR frame wire format.
//!
//! Every IR timing event travels as one 32-bit little-endian word on a raw
//! TCP stream. There is no length prefix: frames are fixed size, so framing
//! is just "read 4 bytes".
//!
//! ```text
//!  31  30                                0
//! +---+-----------------------------------+
//! | M |      duration in microseconds     |
//! +---+-----------------------------------+
//! ```
//!
//! `M` is set for a mark (carrier on) and clear for a space. Both ends
//! honor it: the sender sets it and the receiver hands it to the engine
//! together with the duration.

/// Size of one encoded frame on the wire.
pub const FRAME_LEN: usize = 4;

/// Bit flagging a mark (carrier on) rather than a space.
pub const MARK_FLAG: u32 = 1 << 31;

/// Largest duration representable in a frame (31 bits).
pub const MAX_DURATION_MICROS: u32 = MARK_FLAG - 1;

/// One IR timing event: how long the carrier was on (mark) or off (space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IrFrame {
    duration_micros: u32,
    is_mark: bool,
}

impl IrFrame {
    /// Build a frame. Durations beyond [`MAX_DURATION_MICROS`] saturate.
    pub const fn new(duration_micros: u32, is_mark: bool) -> Self {
        let duration_micros = if duration_micros > MAX_DURATION_MICROS {
            MAX_DURATION_MICROS
        } else {
            duration_micros
        };
        Self {
            duration_micros,
            is_mark,
        }
    }

    /// A mark (carrier on) lasting `duration_micros`.
    pub const fn mark(duration_micros: u32) -> Self {
        Self::new(duration_micros, true)
    }

    /// A space (carrier off) lasting `duration_micros`.
    pub const fn space(duration_micros: u32) -> Self {
        Self::new(duration_micros, false)
    }

    /// Duration of the event in microseconds.
    pub const fn duration_micros(self) -> u32 {
        self.duration_micros
    }

    /// Whether the event is a mark.
    pub const fn is_mark(self) -> bool {
        self.is_mark
    }

    /// Pack into the 32-bit wire word.
    pub const fn to_word(self) -> u32 {
        if self.is_mark {
            self.duration_micros | MARK_FLAG
        } else {
            self.duration_micros
        }
    }

    /// Unpack a 32-bit wire word. Every word is a valid frame.
    pub const fn from_word(word: u32) -> Self {
        Self {
            duration_micros: word & MAX_DURATION_MICROS,
            is_mark: word & MARK_FLAG != 0,
        }
    }

    /// Encode to the 4 bytes sent on the wire.
    pub const fn encode(self) -> [u8; FRAME_LEN] {
        self.to_word().to_le_bytes()
    }

    /// Decode 4 bytes read from the wire.
    pub const fn decode(bytes: [u8; FRAME_LEN]) -> Self {
        Self::from_word(u32::from_le_bytes(bytes))
    }
}

/// The engine's inbound IR delivery entry point.
///
/// The Host's relay task calls [`deliver`](IrSink::deliver) directly for
/// every decoded frame. That call may run concurrently with the tick
/// thread and is not serialized by the pause gate, so implementations must
/// keep their own state consistent.
pub trait IrSink: Send + Sync {
    /// Hand one received frame to the engine.
    fn deliver(&self, frame: IrFrame);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_sets_high_bit() {
        let frame = IrFrame::mark(9_000);
        assert_eq!(frame.to_word(), 9_000 | MARK_FLAG);
        assert_eq!(IrFrame::space(9_000).to_word(), 9_000);
    }

    #[test]
    fn wire_bytes_are_little_endian() {
        let frame = IrFrame::space(0x0001_0203);
        assert_eq!(frame.encode(), [0x03, 0x02, 0x01, 0x00]);

        let frame = IrFrame::mark(0);
        assert_eq!(frame.encode(), [0x00, 0x00, 0x00, 0x80]);
    }

    #[test]
    fn oversized_duration_saturates() {
        let frame = IrFrame::new(u32::MAX, false);
        assert_eq!(frame.duration_micros(), MAX_DURATION_MICROS);
        assert!(!frame.is_mark());
    }

    #[test]
    fn decode_recovers_both_fields() {
        let frame = IrFrame::decode(IrFrame::mark(MAX_DURATION_MICROS).encode());
        assert_eq!(frame.duration_micros(), MAX_DURATION_MICROS);
        assert!(frame.is_mark());
    }

    #[test]
    fn any_word_decodes() {
        let frame = IrFrame::from_word(u32::MAX);
        assert_eq!(frame.duration_micros(), MAX_DURATION_MICROS);
        assert!(frame.is_mark());
        assert_eq!(frame.to_word(), u32::MAX);
    }
}
