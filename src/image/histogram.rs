//! Bucketed color histogram produced by the frame reduction pass

use thiserror::Error;

use super::Frame;
use crate::{color, models::Color};

/// Quantization levels per color channel
pub const LEVELS_PER_CHANNEL: u32 = 16;

/// Number of color buckets
pub const NUM_BINS: usize = (LEVELS_PER_CHANNEL * LEVELS_PER_CHANNEL * LEVELS_PER_CHANNEL) as usize;

/// Number of `u32` words per bucket: count, then red, green and blue offset sums
///
/// Offsets are the channel bits below the bucket coordinate, at most 15 per pixel, so a bucket
/// holds up to `u32::MAX / 15` pixels (about 286M) before its sums overflow.
pub const BIN_WORDS: usize = 4;

/// Bits dropped from each channel to get its bucket coordinate
const CHANNEL_SHIFT: u32 = 4;

const OFFSET_MASK: u32 = (1 << CHANNEL_SHIFT) - 1;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistogramError {
    #[error("expected {expected} words of histogram data, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Bucket index of a color, must match the reduction shader
#[inline]
pub fn bin_index(r: u8, g: u8, b: u8) -> usize {
    let r = (r as u32) >> CHANNEL_SHIFT;
    let g = (g as u32) >> CHANNEL_SHIFT;
    let b = (b as u32) >> CHANNEL_SHIFT;

    ((r << (2 * CHANNEL_SHIFT)) | (g << CHANNEL_SHIFT) | b) as usize
}

#[derive(Clone, PartialEq, Eq)]
pub struct Histogram {
    data: Vec<u32>,
}

impl std::fmt::Debug for Histogram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Histogram")
            .field("total", &self.total())
            .finish()
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            data: vec![0; NUM_BINS * BIN_WORDS],
        }
    }
}

impl Histogram {
    /// Size in bytes of the buffer holding a histogram
    pub const BYTE_SIZE: usize = NUM_BINS * BIN_WORDS * std::mem::size_of::<u32>();

    /// Wrap the words read back from the reduction output buffer
    pub fn from_words(data: Vec<u32>) -> Result<Self, HistogramError> {
        let expected = NUM_BINS * BIN_WORDS;
        if data.len() != expected {
            return Err(HistogramError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self { data })
    }

    /// Reduce a frame on the CPU, with the same bucket semantics as the shader
    pub fn from_frame(frame: &Frame) -> Self {
        let mut histogram = Self::default();

        for y in 0..frame.height() {
            for pixel in frame.row(y).chunks_exact(4) {
                let (r, g, b) = frame.format().rgb(pixel);
                histogram.add(r, g, b);
            }
        }

        histogram
    }

    #[inline]
    pub fn add(&mut self, r: u8, g: u8, b: u8) {
        let base = bin_index(r, g, b) * BIN_WORDS;
        let bin = &mut self.data[base..base + BIN_WORDS];

        bin[0] = bin[0].wrapping_add(1);
        bin[1] = bin[1].wrapping_add(r as u32 & OFFSET_MASK);
        bin[2] = bin[2].wrapping_add(g as u32 & OFFSET_MASK);
        bin[3] = bin[3].wrapping_add(b as u32 & OFFSET_MASK);
    }

    /// Number of pixels in the given bucket
    pub fn count(&self, bin: usize) -> u32 {
        self.data[bin * BIN_WORDS]
    }

    pub fn total(&self) -> u64 {
        self.data
            .chunks_exact(BIN_WORDS)
            .map(|bin| bin[0] as u64)
            .sum()
    }

    fn mean(&self, bin: usize) -> Color {
        let words = &self.data[bin * BIN_WORDS..(bin + 1) * BIN_WORDS];
        let count = words[0].max(1) as u64;
        let channel = |level: usize, sum: u32| {
            let base = ((level as u32 & OFFSET_MASK) << CHANNEL_SHIFT) as u64;
            (base + (sum as u64 + count / 2) / count).min(255) as u8
        };

        color::opaque(
            channel(bin >> (2 * CHANNEL_SHIFT), words[1]),
            channel(bin >> CHANNEL_SHIFT, words[2]),
            channel(bin, words[3]),
        )
    }
}

/// Resolves reduction buckets to a single predominant color
#[derive(Debug, Default, Clone, Copy)]
pub struct ColorAlgorithm;

impl ColorAlgorithm {
    /// Mean color of the most populated bucket
    ///
    /// Ties resolve to the lowest bucket index. An empty histogram yields black.
    pub fn predominant_color(&self, histogram: &Histogram) -> Color {
        let mut best = None;

        for bin in 0..NUM_BINS {
            let count = histogram.count(bin);
            if count > 0 && best.map(|(_, c)| count > c).unwrap_or(true) {
                best = Some((bin, count));
            }
        }

        best.map(|(bin, _)| histogram.mean(bin))
            .unwrap_or_else(color::black)
    }
}
