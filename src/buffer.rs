//! Fixed-capacity planar sample storage with independent write and read cursors.
//!
//! A [`PlanarBuffer`] stores one contiguous run of `capacity` samples per channel.
//! Interleaved input is deinterleaved on [`insert`](PlanarBuffer::insert) and
//! re-interleaved on [`extract`](PlanarBuffer::extract). The buffer fills once and
//! must be [`reset`](PlanarBuffer::reset) explicitly; it never wraps around, so a
//! full buffer always holds exactly one aligned block.
//!
//! All memory is allocated by [`set_size`](PlanarBuffer::set_size). Insert, extract,
//! reset and filtering perform zero heap allocations.

use crate::transform::{BlockTransform, SpectralOperation};
use crate::{FilterError, Result};

/// Channel shape of a buffer. Only mono and stereo exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    /// Map a negotiated channel count onto a layout.
    pub fn from_count(count: usize) -> Result<Self> {
        match count {
            1 => Ok(ChannelLayout::Mono),
            2 => Ok(ChannelLayout::Stereo),
            other => Err(FilterError::UnsupportedChannelCount(other)),
        }
    }

    /// Samples per frame.
    #[inline]
    pub fn count(self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ChannelLayout::Mono => "mono",
            ChannelLayout::Stereo => "stereo",
        }
    }
}

impl std::fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fill state of a fill-then-reset buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillState {
    /// Free capacity remains.
    Filling,
    /// The write cursor reached capacity; only [`PlanarBuffer::reset`] makes room again.
    Full,
}

/// Planar (channel-major) audio buffer.
///
/// Layout: `data[ch * capacity + frame]`.
#[derive(Debug, Clone)]
pub struct PlanarBuffer {
    layout: ChannelLayout,
    capacity: usize,
    write_pos: usize,
    read_pos: usize,
    data: Vec<f32>,
}

impl PlanarBuffer {
    /// Create an empty buffer (capacity 0). Call [`set_size`](Self::set_size) before use.
    pub fn new(layout: ChannelLayout) -> Self {
        Self {
            layout,
            capacity: 0,
            write_pos: 0,
            read_pos: 0,
            data: Vec::new(),
        }
    }

    /// Create a buffer holding `capacity` frames, zero-filled.
    pub fn with_capacity(layout: ChannelLayout, capacity: usize) -> Self {
        let mut buffer = Self::new(layout);
        buffer.set_size(capacity);
        buffer
    }

    /// Reallocate storage for `capacity` frames and reset both cursors.
    ///
    /// No-op when the capacity is unchanged: content and cursors are kept.
    pub fn set_size(&mut self, capacity: usize) {
        if capacity == self.capacity {
            return;
        }
        self.data = vec![0.0f32; self.layout.count() * capacity];
        self.capacity = capacity;
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Capacity in frames (samples per channel).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[inline]
    pub fn channel_count(&self) -> usize {
        self.layout.count()
    }

    /// Frames that can still be inserted before the buffer is full.
    #[inline]
    pub fn free_frames(&self) -> usize {
        self.capacity - self.write_pos
    }

    /// Frames that can still be extracted.
    ///
    /// Counted against capacity, not against the write cursor: extraction always
    /// walks the whole block, whatever was written since the last reset.
    #[inline]
    pub fn readable_frames(&self) -> usize {
        self.capacity - self.read_pos
    }

    /// Frames written since the last reset.
    #[inline]
    pub fn written_frames(&self) -> usize {
        self.write_pos
    }

    #[inline]
    pub fn fill_state(&self) -> FillState {
        if self.write_pos == self.capacity {
            FillState::Full
        } else {
            FillState::Filling
        }
    }

    /// Deinterleave `src` into the buffer at the write cursor.
    ///
    /// Consumes at most `channels * free_frames()` samples, rounded down to whole
    /// frames. Returns the number of input samples consumed; a short count is the
    /// backpressure signal, not an error.
    pub fn insert(&mut self, src: &[f32]) -> usize {
        let channels = self.layout.count();
        let frames = (src.len() / channels).min(self.free_frames());
        if frames == 0 {
            return 0;
        }

        let cap = self.capacity;
        let start = self.write_pos;
        for (offset, frame) in src[..frames * channels].chunks_exact(channels).enumerate() {
            for (ch, &sample) in frame.iter().enumerate() {
                self.data[ch * cap + start + offset] = sample;
            }
        }

        self.write_pos += frames;
        frames * channels
    }

    /// Interleave from the read cursor into `dst`.
    ///
    /// Produces at most `channels * readable_frames()` samples, rounded down to
    /// whole frames. Returns the number of samples written to `dst`.
    pub fn extract(&mut self, dst: &mut [f32]) -> usize {
        let channels = self.layout.count();
        let frames = (dst.len() / channels).min(self.readable_frames());
        if frames == 0 {
            return 0;
        }

        let cap = self.capacity;
        let start = self.read_pos;
        for (offset, frame) in dst[..frames * channels].chunks_exact_mut(channels).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = self.data[ch * cap + start + offset];
            }
        }

        self.read_pos += frames;
        frames * channels
    }

    /// Rewind both cursors. Storage is kept as is; cursors gate visibility.
    #[inline]
    pub fn reset(&mut self) {
        self.write_pos = 0;
        self.read_pos = 0;
    }

    /// Copy the whole backing storage into `other`.
    ///
    /// `other` is resized to this buffer's capacity and its cursors are reset.
    /// Fails with [`FilterError::CapacityMismatch`] when the channel layouts differ.
    pub fn copy_to(&self, other: &mut PlanarBuffer) -> Result<()> {
        if other.layout != self.layout {
            return Err(FilterError::CapacityMismatch {
                expected: self.layout,
                found: other.layout,
            });
        }
        other.set_size(self.capacity);
        other.reset();
        other.data.copy_from_slice(&self.data);
        Ok(())
    }

    /// Run `transform` over every channel's full block, one channel at a time.
    pub fn apply_filter(
        &mut self,
        transform: &mut BlockTransform,
        operation: &mut dyn SpectralOperation,
    ) -> Result<()> {
        let cap = self.capacity;
        if cap == 0 {
            return Ok(());
        }
        for (ch, samples) in self.data.chunks_exact_mut(cap).enumerate() {
            transform.process(ch, samples, operation)?;
        }
        Ok(())
    }

    /// One channel's full block.
    pub fn channel(&self, ch: usize) -> &[f32] {
        let start = ch * self.capacity;
        &self.data[start..start + self.capacity]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [f32] {
        let start = ch * self.capacity;
        &mut self.data[start..start + self.capacity]
    }

    /// Raw planar storage.
    pub fn raw_data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32).collect()
    }

    #[test]
    fn test_layout_from_count() {
        assert_eq!(ChannelLayout::from_count(1).unwrap(), ChannelLayout::Mono);
        assert_eq!(ChannelLayout::from_count(2).unwrap(), ChannelLayout::Stereo);
        assert!(matches!(
            ChannelLayout::from_count(3),
            Err(FilterError::UnsupportedChannelCount(3))
        ));
        assert!(ChannelLayout::from_count(0).is_err());
    }

    #[test]
    fn test_insert_deinterleaves() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4);
        assert_eq!(buf.insert(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0]), 6);
        assert_eq!(&buf.channel(0)[..3], &[1.0, 2.0, 3.0]);
        assert_eq!(&buf.channel(1)[..3], &[-1.0, -2.0, -3.0]);
        assert_eq!(buf.written_frames(), 3);
        assert_eq!(buf.free_frames(), 1);
    }

    #[test]
    fn test_roundtrip_across_several_inserts() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 8);
        let input = ramp(16);
        let mut consumed = 0;
        for piece in [4usize, 2, 6, 4] {
            let n = buf.insert(&input[consumed..consumed + piece]);
            assert_eq!(n, piece, "short insert below capacity");
            consumed += n;
        }
        assert_eq!(buf.fill_state(), FillState::Full);

        let mut out = vec![0.0f32; 16];
        assert_eq!(buf.extract(&mut out), 16);
        assert_eq!(out, input);
    }

    #[test]
    fn test_insert_is_bounded_and_frame_aligned() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 8);
        let input = ramp(20);
        assert_eq!(buf.insert(&input), 16);
        assert_eq!(buf.insert(&input), 0);
        assert_eq!(buf.fill_state(), FillState::Full);

        // odd sample counts never split a frame
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 8);
        assert_eq!(buf.insert(&input[..5]), 4);
        assert_eq!(buf.written_frames(), 2);
    }

    #[test]
    fn test_extract_bounded_by_readable_frames() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Mono, 4);
        buf.insert(&[1.0, 2.0, 3.0, 4.0]);
        let mut out = [0.0f32; 3];
        assert_eq!(buf.extract(&mut out), 3);
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert_eq!(buf.extract(&mut out), 1);
        assert_eq!(out[0], 4.0);
        assert_eq!(buf.extract(&mut out), 0);
    }

    #[test]
    fn test_readable_counts_whole_block() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4);
        assert_eq!(buf.readable_frames(), 4);
        let mut out = [1.0f32; 8];
        assert_eq!(buf.extract(&mut out), 8);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reset_keeps_storage() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Mono, 2);
        buf.insert(&[5.0, 6.0]);
        buf.reset();
        assert_eq!(buf.fill_state(), FillState::Filling);
        assert_eq!(buf.free_frames(), 2);
        assert_eq!(buf.channel(0), &[5.0, 6.0]);
    }

    #[test]
    fn test_set_size_same_capacity_is_noop() {
        let mut buf = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4);
        buf.insert(&[1.0, 2.0, 3.0, 4.0]);
        buf.set_size(4);
        assert_eq!(buf.written_frames(), 2);
        assert_eq!(buf.channel(0)[..2], [1.0, 3.0]);

        buf.set_size(8);
        assert_eq!(buf.capacity(), 8);
        assert_eq!(buf.written_frames(), 0);
        assert!(buf.raw_data().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_copy_to_copies_full_storage() {
        let mut src = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4);
        src.insert(&ramp(8));
        let mut dst = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4);
        dst.insert(&[9.0, 9.0]);
        let mut sink = [0.0f32; 2];
        dst.extract(&mut sink);

        src.copy_to(&mut dst).unwrap();
        assert_eq!(dst.raw_data(), src.raw_data());
        assert_eq!(dst.written_frames(), 0);
        assert_eq!(dst.readable_frames(), 4);
    }

    #[test]
    fn test_copy_to_resizes_destination() {
        let src = PlanarBuffer::with_capacity(ChannelLayout::Mono, 8);
        let mut dst = PlanarBuffer::new(ChannelLayout::Mono);
        src.copy_to(&mut dst).unwrap();
        assert_eq!(dst.capacity(), 8);
    }

    #[test]
    fn test_copy_to_rejects_layout_mismatch() {
        let src = PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4);
        let mut dst = PlanarBuffer::with_capacity(ChannelLayout::Mono, 4);
        let err = src.copy_to(&mut dst).unwrap_err();
        assert!(matches!(
            err,
            FilterError::CapacityMismatch {
                expected: ChannelLayout::Stereo,
                found: ChannelLayout::Mono
            }
        ));
    }

    #[test]
    fn test_zero_capacity_transfers_nothing() {
        let mut buf = PlanarBuffer::new(ChannelLayout::Stereo);
        assert_eq!(buf.insert(&[1.0, 2.0]), 0);
        let mut out = [0.0f32; 2];
        assert_eq!(buf.extract(&mut out), 0);
        assert_eq!(buf.fill_state(), FillState::Full);
    }
}
