//! Mode sharing over the emulated IR link.
//!
//! The sending instance periodically beacons the index of the mode it is
//! playing as one NEC-style burst:
//!
//! ```text
//! mark 9000 | space 4500 | 16 x (mark 560, space 560 or 1690) | mark 560
//! ```
//!
//! The 16 bits are the mode index followed by its bitwise complement, both
//! least significant bit first. The receiver validates the complement and
//! discards anything malformed.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};
use vortex_link::{IrFrame, IrSink};

const HEADER_MARK: u32 = 9_000;
const HEADER_SPACE: u32 = 4_500;
const BIT_MARK: u32 = 560;
const ZERO_SPACE: u32 = 560;
const ONE_SPACE: u32 = 1_690;
const TRAILER_MARK: u32 = 560;

const DATA_BITS: usize = 16;
const BIT_FRAMES: usize = 2 * DATA_BITS;

/// Frames in one complete beacon.
pub const BURST_LEN: usize = 2 + BIT_FRAMES + 1;

/// Frames buffered between ticks before the oldest are discarded.
pub const INBOX_CAPACITY: usize = 1024;

/// Encode a mode index as one beacon burst.
pub fn encode_mode(index: u8) -> Vec<IrFrame> {
    let mut rest = u16::from_le_bytes([index, !index]);
    let mut frames = Vec::with_capacity(BURST_LEN);
    frames.push(IrFrame::mark(HEADER_MARK));
    frames.push(IrFrame::space(HEADER_SPACE));
    for _ in 0..DATA_BITS {
        let set = rest & 1 == 1;
        rest = rest.checked_shr(1).unwrap_or(0);
        frames.push(IrFrame::mark(BIT_MARK));
        frames.push(IrFrame::space(if set { ONE_SPACE } else { ZERO_SPACE }));
    }
    frames.push(IrFrame::mark(TRAILER_MARK));
    frames
}

/// Whether `frame` is a mark/space of roughly `nominal` microseconds.
fn near(frame: IrFrame, is_mark: bool, nominal: u32) -> bool {
    frame.is_mark() == is_mark && frame.duration_micros().abs_diff(nominal) <= nominal / 4
}

fn decode_burst(frames: &[IrFrame]) -> Option<u8> {
    let ([header_mark, header_space], rest) = frames.split_first_chunk::<2>()?;
    if !near(*header_mark, true, HEADER_MARK) || !near(*header_space, false, HEADER_SPACE) {
        return None;
    }

    let (bits, trailer) = rest.split_at_checked(BIT_FRAMES)?;
    let [trailer] = trailer else {
        return None;
    };
    if !near(*trailer, true, TRAILER_MARK) {
        return None;
    }

    let mut word = 0u16;
    for (position, pair) in bits.chunks_exact(2).enumerate() {
        let [mark, space] = pair else {
            return None;
        };
        if !near(*mark, true, BIT_MARK) {
            return None;
        }
        let bit: u16 = if near(*space, false, ONE_SPACE) {
            1
        } else if near(*space, false, ZERO_SPACE) {
            0
        } else {
            return None;
        };
        word |= bit.checked_shl(u32::try_from(position).ok()?)?;
    }

    let [index, check] = word.to_le_bytes();
    (index ^ check == 0xFF).then_some(index)
}

/// Streaming beacon decoder. Feed it frames in arrival order.
#[derive(Debug, Default)]
pub struct ModeDecoder {
    burst: Vec<IrFrame>,
}

impl ModeDecoder {
    /// A decoder waiting for a header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one frame; returns a mode index when a valid burst completes.
    pub fn push(&mut self, frame: IrFrame) -> Option<u8> {
        if near(frame, true, HEADER_MARK) {
            self.burst.clear();
        } else if self.burst.is_empty() {
            // Noise between bursts.
            return None;
        }

        self.burst.push(frame);
        if self.burst.len() < BURST_LEN {
            return None;
        }

        let decoded = decode_burst(&self.burst);
        if decoded.is_none() {
            debug!("Discarding malformed IR burst");
        }
        self.burst.clear();
        decoded
    }
}

/// Frames received from the relay, waiting for the next engine tick.
///
/// The relay task delivers concurrently with the tick thread, so the queue
/// has its own lock and never touches the pause gate. Overflow drops the
/// oldest frames; the count is reported once per drain.
#[derive(Debug, Default)]
pub struct IrInbox {
    queue: Mutex<Queue>,
}

#[derive(Debug, Default)]
struct Queue {
    frames: VecDeque<IrFrame>,
    /// Dropped since the last drain.
    pending_drops: u64,
    total_drops: u64,
}

impl IrInbox {
    /// An empty inbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued frame.
    pub fn drain(&self) -> Vec<IrFrame> {
        let (frames, dropped) = {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let dropped = std::mem::take(&mut queue.pending_drops);
            (queue.frames.drain(..).collect::<Vec<_>>(), dropped)
        };
        if dropped > 0 {
            warn!(dropped, capacity = INBOX_CAPACITY, "IR inbox overflowed, oldest frames dropped");
        }
        frames
    }

    /// Frames dropped to overflow since the inbox was created.
    pub fn dropped(&self) -> u64 {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .total_drops
    }
}

impl IrSink for IrInbox {
    fn deliver(&self, frame: IrFrame) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if queue.frames.len() >= INBOX_CAPACITY {
            queue.frames.pop_front();
            queue.pending_drops = queue.pending_drops.saturating_add(1);
            queue.total_drops = queue.total_drops.saturating_add(1);
        }
        queue.frames.push_back(frame);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode_all(decoder: &mut ModeDecoder, frames: &[IrFrame]) -> Vec<u8> {
        frames.iter().filter_map(|f| decoder.push(*f)).collect()
    }

    #[test]
    fn beacon_has_nec_shape() {
        let frames = encode_mode(0b1010_0001);
        assert_eq!(frames.len(), BURST_LEN);
        assert_eq!(frames.first(), Some(&IrFrame::mark(HEADER_MARK)));
        assert_eq!(frames.get(1), Some(&IrFrame::space(HEADER_SPACE)));
        // Bit 0 is set, bit 1 is clear.
        assert_eq!(frames.get(3), Some(&IrFrame::space(ONE_SPACE)));
        assert_eq!(frames.get(5), Some(&IrFrame::space(ZERO_SPACE)));
        assert_eq!(frames.last(), Some(&IrFrame::mark(TRAILER_MARK)));
    }

    #[test]
    fn every_index_decodes() {
        let mut decoder = ModeDecoder::new();
        for index in 0..=u8::MAX {
            assert_eq!(decode_all(&mut decoder, &encode_mode(index)), vec![index]);
        }
    }

    #[test]
    fn noise_before_header_is_ignored() {
        let mut decoder = ModeDecoder::new();
        let mut frames = vec![IrFrame::space(300), IrFrame::mark(120)];
        frames.extend(encode_mode(5));
        assert_eq!(decode_all(&mut decoder, &frames), vec![5]);
    }

    #[test]
    fn truncated_burst_resyncs_on_next_header() {
        let mut decoder = ModeDecoder::new();
        let mut frames: Vec<IrFrame> = encode_mode(3).into_iter().take(10).collect();
        frames.extend(encode_mode(4));
        assert_eq!(decode_all(&mut decoder, &frames), vec![4]);
    }

    #[test]
    fn bad_complement_is_rejected() {
        let mut frames = encode_mode(7);
        // Complement of 7 is 0xF8; clear its bit 3 (word bit 11).
        *frames.get_mut(3 + 2 * 11).unwrap() = IrFrame::space(ZERO_SPACE);
        let mut decoder = ModeDecoder::new();
        assert!(decode_all(&mut decoder, &frames).is_empty());
    }

    #[test]
    fn jittered_timings_still_decode() {
        let frames: Vec<IrFrame> = encode_mode(42)
            .into_iter()
            .map(|f| IrFrame::new(f.duration_micros() + f.duration_micros() / 10, f.is_mark()))
            .collect();
        let mut decoder = ModeDecoder::new();
        assert_eq!(decode_all(&mut decoder, &frames), vec![42]);
    }

    #[test]
    fn inbox_is_bounded() {
        let inbox = IrInbox::new();
        for n in 0..u32::try_from(INBOX_CAPACITY + 5).unwrap() {
            inbox.deliver(IrFrame::space(n));
        }
        let frames = inbox.drain();
        assert_eq!(frames.len(), INBOX_CAPACITY);
        assert_eq!(frames.first(), Some(&IrFrame::space(5)));
        assert!(inbox.drain().is_empty());
        assert_eq!(inbox.dropped(), 5);
    }

    #[test]
    fn overflow_is_counted_not_reported_per_frame() {
        let inbox = IrInbox::new();
        let burst = u32::try_from(INBOX_CAPACITY).unwrap();
        for n in 0..burst.wrapping_mul(3) {
            inbox.deliver(IrFrame::mark(n));
        }
        assert_eq!(inbox.dropped(), u64::from(burst.wrapping_mul(2)));
        {
            let queue = inbox.queue.lock().unwrap();
            assert_eq!(queue.pending_drops, u64::from(burst.wrapping_mul(2)));
        }

        assert_eq!(inbox.drain().len(), INBOX_CAPACITY);
        assert_eq!(inbox.queue.lock().unwrap().pending_drops, 0);
        inbox.deliver(IrFrame::mark(1));
        assert_eq!(inbox.drain().len(), 1);
        assert_eq!(inbox.dropped(), u64::from(burst.wrapping_mul(2)));
    }
}
