//! Three-buffer rotation between block production and block consumption.

use crate::buffer::{ChannelLayout, PlanarBuffer};
use crate::{FilterError, Result};

const SLOTS: usize = 3;

/// Owns three equally shaped [`PlanarBuffer`]s and rotates the roles
/// "being written", "being read" and "idle spare" between them.
///
/// The read slot trails the write slot by one, so after [`swap`](Self::swap)
/// the buffer that was just written becomes readable and the idle spare becomes
/// the next write target. Write and read never refer to the same buffer.
#[derive(Debug)]
pub struct SwapChain {
    buffers: [PlanarBuffer; SLOTS],
    write: usize,
    read: usize,
}

impl SwapChain {
    /// Take ownership of three buffers. Slot 0 is written first, slot 2 is read
    /// first and slot 1 is the spare.
    ///
    /// All three buffers must share layout and capacity.
    pub fn new(buffers: [PlanarBuffer; SLOTS]) -> Result<Self> {
        let layout = buffers[0].layout();
        let capacity = buffers[0].capacity();
        for buffer in &buffers[1..] {
            if buffer.layout() != layout {
                return Err(FilterError::CapacityMismatch {
                    expected: layout,
                    found: buffer.layout(),
                });
            }
            if buffer.capacity() != capacity {
                return Err(FilterError::Config(format!(
                    "swap chain buffers differ in size: {} vs {}",
                    capacity,
                    buffer.capacity()
                )));
            }
        }

        Ok(Self {
            buffers,
            write: 0,
            read: SLOTS - 1,
        })
    }

    /// Allocate three zeroed buffers of the given shape.
    pub fn with_shape(layout: ChannelLayout, capacity: usize) -> Self {
        Self {
            buffers: std::array::from_fn(|_| PlanarBuffer::with_capacity(layout, capacity)),
            write: 0,
            read: SLOTS - 1,
        }
    }

    pub fn write_buffer(&self) -> &PlanarBuffer {
        &self.buffers[self.write]
    }

    pub fn write_buffer_mut(&mut self) -> &mut PlanarBuffer {
        &mut self.buffers[self.write]
    }

    pub fn read_buffer(&self) -> &PlanarBuffer {
        &self.buffers[self.read]
    }

    pub fn read_buffer_mut(&mut self) -> &mut PlanarBuffer {
        &mut self.buffers[self.read]
    }

    #[inline]
    pub fn write_slot(&self) -> usize {
        self.write
    }

    #[inline]
    pub fn read_slot(&self) -> usize {
        self.read
    }

    /// Retire the current read buffer (its cursors are reset) and advance both
    /// roles by one slot.
    pub fn swap(&mut self) {
        self.buffers[self.read].reset();
        self.write = (self.write + 1) % SLOTS;
        self.read = (self.read + 1) % SLOTS;
        debug_assert_ne!(self.write, self.read);
    }

    pub fn layout(&self) -> ChannelLayout {
        self.buffers[0].layout()
    }

    /// Block size shared by all three buffers.
    pub fn capacity(&self) -> usize {
        self.buffers[0].capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_read_never_alias() {
        let mut chain = SwapChain::with_shape(ChannelLayout::Stereo, 4);
        for _ in 0..10 {
            assert_ne!(chain.write_slot(), chain.read_slot());
            assert!(!std::ptr::eq(chain.write_buffer(), chain.read_buffer()));
            chain.swap();
        }
    }

    #[test]
    fn test_filled_buffer_becomes_readable_after_swap() {
        let mut chain = SwapChain::with_shape(ChannelLayout::Mono, 2);
        chain.write_buffer_mut().insert(&[0.25, 0.5]);
        let filled = chain.write_slot();
        chain.swap();
        assert_eq!(chain.read_slot(), filled);

        let mut out = [0.0f32; 2];
        assert_eq!(chain.read_buffer_mut().extract(&mut out), 2);
        assert_eq!(out, [0.25, 0.5]);
    }

    #[test]
    fn test_spare_is_next_write_target() {
        let mut chain = SwapChain::with_shape(ChannelLayout::Mono, 2);
        assert_eq!((chain.write_slot(), chain.read_slot()), (0, 2));
        chain.swap();
        assert_eq!((chain.write_slot(), chain.read_slot()), (1, 0));
        chain.swap();
        assert_eq!((chain.write_slot(), chain.read_slot()), (2, 1));
        chain.swap();
        assert_eq!((chain.write_slot(), chain.read_slot()), (0, 2));
    }

    #[test]
    fn test_swap_resets_retired_read_buffer() {
        let mut chain = SwapChain::with_shape(ChannelLayout::Mono, 4);
        let mut out = [0.0f32; 3];
        chain.read_buffer_mut().extract(&mut out);
        assert_eq!(chain.read_buffer().readable_frames(), 1);

        let retired = chain.read_slot();
        chain.swap();
        chain.swap();
        chain.swap();
        assert_eq!(chain.read_slot(), retired);
        assert_eq!(chain.read_buffer().readable_frames(), 4);
    }

    #[test]
    fn test_new_rejects_mixed_shapes() {
        let buffers = [
            PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4),
            PlanarBuffer::with_capacity(ChannelLayout::Mono, 4),
            PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4),
        ];
        assert!(matches!(
            SwapChain::new(buffers),
            Err(FilterError::CapacityMismatch { .. })
        ));

        let buffers = [
            PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4),
            PlanarBuffer::with_capacity(ChannelLayout::Stereo, 8),
            PlanarBuffer::with_capacity(ChannelLayout::Stereo, 4),
        ];
        assert!(matches!(SwapChain::new(buffers), Err(FilterError::Config(_))));
    }
}
