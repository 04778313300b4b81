//! Stream width converter.
//!
//! Re-packs a stream from one data width to another without dropping or
//! reordering logical words. Widths must be integer multiples of each other.
//!
//! - **Down** (wide → narrow, ratio `r`): each input word yields `r` output
//!   words. The input is held (sink not ready) until its final sub-word is
//!   accepted. `first` rides on the first sub-word, `last` on the final one.
//! - **Up** (narrow → wide, ratio `r`): `r` input words are staged and one
//!   output word is offered only once all `r` are present. Partial words are
//!   never emitted, even on `last`.
//! - **Identity**: combinational pass-through.
//!
//! Sub-word order is fixed per converter: [`SubwordOrder::MsbFirst`] places
//! the first narrow word in the most significant slot of the wide word.

use smallvec::SmallVec;

use super::{StreamItem, StreamStage};
use crate::error::{ConfigError, ConfigResult};
use crate::sim::width_mask;

/// Widest data word the models carry.
pub const MAX_DATA_WIDTH: u32 = 64;

/// Position of the first narrow word inside a wide word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubwordOrder {
    /// First narrow word occupies the least significant bits
    #[default]
    LsbFirst,
    /// First narrow word occupies the most significant bits
    MsbFirst,
}

impl SubwordOrder {
    /// Bit offset of sub-word `index` (in stream order) inside a wide word.
    fn shift(self, index: u32, ratio: u32, narrow: u32) -> u32 {
        match self {
            SubwordOrder::LsbFirst => index * narrow,
            SubwordOrder::MsbFirst => (ratio - 1 - index) * narrow,
        }
    }
}

#[derive(Debug, Clone)]
enum Mode {
    Identity,
    Down { ratio: u32, index: u32 },
    Up { ratio: u32, staged: SmallVec<[StreamItem; 8]> },
}

/// Width converter stage.
#[derive(Debug, Clone)]
pub struct Converter {
    from_width: u32,
    to_width: u32,
    order: SubwordOrder,
    mode: Mode,
}

impl Converter {
    /// Create a converter from `from_width` bits to `to_width` bits.
    pub fn new(from_width: u32, to_width: u32, order: SubwordOrder) -> ConfigResult<Self> {
        for &width in &[from_width, to_width] {
            if width == 0 || width > MAX_DATA_WIDTH {
                return Err(ConfigError::InvalidDataWidth {
                    width,
                    bus_width: from_width.max(to_width),
                    reason: "width must be between 1 and 64 bits",
                });
            }
        }

        let mode = if from_width == to_width {
            Mode::Identity
        } else if from_width > to_width {
            if from_width % to_width != 0 {
                return Err(ConfigError::InvalidDataWidth {
                    width: to_width,
                    bus_width: from_width,
                    reason: "wide width must be an integer multiple of narrow width",
                });
            }
            Mode::Down { ratio: from_width / to_width, index: 0 }
        } else {
            if to_width % from_width != 0 {
                return Err(ConfigError::InvalidDataWidth {
                    width: from_width,
                    bus_width: to_width,
                    reason: "wide width must be an integer multiple of narrow width",
                });
            }
            Mode::Up { ratio: to_width / from_width, staged: SmallVec::new() }
        };

        Ok(Self { from_width, to_width, order, mode })
    }

    /// Input width in bits.
    pub fn from_width(&self) -> u32 {
        self.from_width
    }

    /// Output width in bits.
    pub fn to_width(&self) -> u32 {
        self.to_width
    }

    /// Words-per-word ratio (1 for identity).
    pub fn ratio(&self) -> u32 {
        match &self.mode {
            Mode::Identity => 1,
            Mode::Down { ratio, .. } | Mode::Up { ratio, .. } => *ratio,
        }
    }

    /// Discard any partially converted word.
    pub fn clear(&mut self) {
        match &mut self.mode {
            Mode::Identity => {}
            Mode::Down { index, .. } => *index = 0,
            Mode::Up { staged, .. } => staged.clear(),
        }
    }
}

impl StreamStage for Converter {
    fn source(&self, sink: &StreamItem) -> StreamItem {
        match &self.mode {
            Mode::Identity => StreamItem { ready: false, ..*sink },
            Mode::Down { ratio, index } => {
                if !sink.valid {
                    return StreamItem::idle();
                }
                let shift = self.order.shift(*index, *ratio, self.to_width);
                let data = (sink.data >> shift) & width_mask(self.to_width);
                StreamItem::word(data)
                    .with_first(sink.first && *index == 0)
                    .with_last(sink.last && *index == ratio - 1)
            }
            Mode::Up { ratio, staged } => {
                if staged.len() < *ratio as usize {
                    return StreamItem::idle();
                }
                let data = staged.iter().enumerate().fold(0u64, |acc, (i, w)| {
                    let shift = self.order.shift(i as u32, *ratio, self.from_width);
                    acc | ((w.data & width_mask(self.from_width)) << shift)
                });
                StreamItem::word(data)
                    .with_first(staged[0].first)
                    .with_last(staged.iter().any(|w| w.last))
            }
        }
    }

    fn sink_ready(&self, _sink: &StreamItem, source_ready: bool) -> bool {
        match &self.mode {
            Mode::Identity => source_ready,
            Mode::Down { ratio, index } => source_ready && *index == ratio - 1,
            Mode::Up { ratio, staged } => staged.len() < *ratio as usize || source_ready,
        }
    }

    fn commit(&mut self, sink: &StreamItem, source: &StreamItem) {
        match &mut self.mode {
            Mode::Identity => {}
            Mode::Down { ratio, index } => {
                if source.fires() {
                    *index = (*index + 1) % *ratio;
                }
            }
            Mode::Up { staged, .. } => {
                if source.fires() {
                    staged.clear();
                }
                if sink.fires() {
                    staged.push(*sink);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::step_chain;

    /// Drive `words` through a converter, consumer ready per `consumer_pattern`.
    fn run(
        conv: &mut Converter,
        words: &[StreamItem],
        consumer_pattern: &[bool],
    ) -> Vec<StreamItem> {
        let mut out = Vec::new();
        let mut next = 0;
        for t in 0..(words.len() * 16 + 16) {
            let input = words.get(next).copied().unwrap_or_default();
            let ready = consumer_pattern[t % consumer_pattern.len()];
            let wires = step_chain(&mut [&mut *conv as &mut dyn StreamStage], input, ready);
            if wires[0].fires() {
                next += 1;
            }
            if wires[1].fires() {
                out.push(wires[1]);
            }
        }
        assert_eq!(next, words.len(), "converter did not accept every input");
        out
    }

    #[test]
    fn test_rejects_non_integer_ratio() {
        assert!(Converter::new(32, 24, SubwordOrder::LsbFirst).is_err());
        assert!(Converter::new(0, 8, SubwordOrder::LsbFirst).is_err());
        assert!(Converter::new(8, 128, SubwordOrder::LsbFirst).is_err());
        assert!(Converter::new(32, 8, SubwordOrder::LsbFirst).is_ok());
    }

    #[test]
    fn test_down_msb_first() {
        let mut conv = Converter::new(32, 8, SubwordOrder::MsbFirst).unwrap();
        let input = [StreamItem::word(0xAABBCCDD).with_first(true).with_last(true)];
        let out = run(&mut conv, &input, &[true]);
        let data: Vec<u64> = out.iter().map(|i| i.data).collect();
        assert_eq!(data, vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(
            out.iter().map(|i| i.first).collect::<Vec<_>>(),
            vec![true, false, false, false]
        );
        assert_eq!(out.iter().map(|i| i.last).collect::<Vec<_>>(), vec![false, false, false, true]);
    }

    #[test]
    fn test_down_lsb_first_with_backpressure() {
        let mut conv = Converter::new(16, 8, SubwordOrder::LsbFirst).unwrap();
        let input = [StreamItem::word(0x1122), StreamItem::word(0x3344)];
        let out = run(&mut conv, &input, &[true, false, false]);
        let data: Vec<u64> = out.iter().map(|i| i.data).collect();
        assert_eq!(data, vec![0x22, 0x11, 0x44, 0x33]);
    }

    #[test]
    fn test_up_waits_for_full_word() {
        let mut conv = Converter::new(8, 32, SubwordOrder::MsbFirst).unwrap();
        for (i, b) in [0xAAu64, 0xBB, 0xCC].iter().enumerate() {
            let input = StreamItem::word(*b).with_first(i == 0);
            let wires = step_chain(&mut [&mut conv as &mut dyn StreamStage], input, true);
            assert!(wires[0].fires());
            assert!(!wires[1].valid, "no output before the word is complete");
        }
        let input = StreamItem::word(0xDD);
        let wires = step_chain(&mut [&mut conv as &mut dyn StreamStage], input, true);
        assert!(wires[0].fires());
        assert!(!wires[1].valid);

        let wires = step_chain(&mut [&mut conv as &mut dyn StreamStage], StreamItem::idle(), true);
        assert!(wires[1].fires());
        assert_eq!(wires[1].data, 0xAABBCCDD);
        assert!(wires[1].first);
    }

    #[test]
    fn test_up_partial_word_is_held() {
        let mut conv = Converter::new(8, 16, SubwordOrder::LsbFirst).unwrap();
        let words = [
            StreamItem::word(0x01),
            StreamItem::word(0x02),
            StreamItem::word(0x03).with_last(true),
        ];
        let out = run(&mut conv, &words, &[true]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, 0x0201);
        assert!(!out[0].last);

        // Clearing drops the staged 0x03
        conv.clear();
        let out = run(&mut conv, &[StreamItem::word(0x04), StreamItem::word(0x05)], &[true]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data, 0x0504);
    }

    #[test]
    fn test_down_then_up_round_trip() {
        let mut down = Converter::new(32, 8, SubwordOrder::MsbFirst).unwrap();
        let mut up = Converter::new(8, 32, SubwordOrder::MsbFirst).unwrap();
        let words = [0x01020304u64, 0xDEADBEEF, 0x0BADF00D];
        let mut next = 0;
        let mut out = Vec::new();
        for _ in 0..64 {
            let input = words.get(next).map(|w| StreamItem::word(*w)).unwrap_or_default();
            let wires = step_chain(&mut [&mut down, &mut up], input, true);
            if wires[0].fires() {
                next += 1;
            }
            if wires[2].fires() {
                out.push(wires[2].data);
            }
        }
        assert_eq!(out, words.to_vec());
    }

    #[test]
    fn test_identity_passes_through() {
        let mut conv = Converter::new(8, 8, SubwordOrder::MsbFirst).unwrap();
        assert_eq!(conv.ratio(), 1);
        let input = StreamItem::word(0x5A).with_last(true);
        let wires = step_chain(&mut [&mut conv as &mut dyn StreamStage], input, true);
        assert!(wires[0].fires());
        assert!(wires[1].fires());
        assert_eq!(wires[1].data, 0x5A);
        assert!(wires[1].last);
    }
}
