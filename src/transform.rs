//! Block spectral transform: forward real FFT, pluggable frequency-domain
//! operation, inverse real FFT, `1/n` renormalization.
//!
//! [`BlockTransform`] owns the FFT plans and every scratch buffer it needs, all
//! pre-allocated at construction. [`process`](BlockTransform::process) performs
//! zero heap allocations, so it is safe to call from an audio callback.
//!
//! The frequency-domain step is a [`SpectralOperation`] strategy. The crate ships
//! [`PassThrough`]; any `FnMut(usize, &mut [Complex32])` closure works as well.

use std::sync::Arc;

use num_complex::Complex32;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::{FilterError, Result};

/// Frequency-domain step applied to one channel's spectrum.
///
/// `bins` holds `n / 2 + 1` bins of an `n`-sample block. `channel` is the index of
/// the channel being processed, so implementations may keep per-channel history
/// across calls; [`reset`](Self::reset) is called whenever the owning stage is
/// (re)initialized or freed.
pub trait SpectralOperation: Send {
    fn apply(&mut self, channel: usize, bins: &mut [Complex32]);

    /// Drop any state carried between blocks.
    fn reset(&mut self) {}
}

/// Leaves the spectrum untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl SpectralOperation for PassThrough {
    #[inline]
    fn apply(&mut self, _channel: usize, _bins: &mut [Complex32]) {}
}

impl<F> SpectralOperation for F
where
    F: FnMut(usize, &mut [Complex32]) + Send,
{
    fn apply(&mut self, channel: usize, bins: &mut [Complex32]) {
        self(channel, bins)
    }
}

/// Returns true for `n >= 2` that are powers of two.
#[inline]
pub fn is_valid_block_size(n: usize) -> bool {
    n >= 2 && n.is_power_of_two()
}

/// In-place spectral filter for fixed-size blocks of one channel.
pub struct BlockTransform {
    block_size: usize,
    /// `n / 2 + 1` bins.
    spectrum: Vec<Complex32>,
    fwd_scratch: Vec<Complex32>,
    inv_scratch: Vec<Complex32>,
    norm: f32,
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
}

impl BlockTransform {
    /// Plan forward and inverse transforms for `block_size` samples.
    ///
    /// `block_size` must be a power of two and at least 2.
    pub fn new(block_size: usize) -> Result<Self> {
        if !is_valid_block_size(block_size) {
            return Err(FilterError::InvalidBlockSize(block_size));
        }

        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(block_size);
        let fft_inverse = planner.plan_fft_inverse(block_size);

        Ok(Self {
            block_size,
            spectrum: fft_forward.make_output_vec(),
            fwd_scratch: fft_forward.make_scratch_vec(),
            inv_scratch: fft_inverse.make_scratch_vec(),
            norm: 1.0 / block_size as f32,
            fft_forward,
            fft_inverse,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of frequency bins handed to the operation: `n / 2 + 1`.
    #[inline]
    pub fn bin_count(&self) -> usize {
        self.spectrum.len()
    }

    /// Filter one channel's block in place.
    ///
    /// - `channel`: forwarded to the operation
    /// - `samples`: exactly `block_size` time-domain samples, overwritten with the result
    ///
    /// Zero heap allocations per call.
    pub fn process(
        &mut self,
        channel: usize,
        samples: &mut [f32],
        operation: &mut dyn SpectralOperation,
    ) -> Result<()> {
        debug_assert_eq!(samples.len(), self.block_size);

        // Forward FFT (uses `samples` as scratch)
        self.fft_forward
            .process_with_scratch(samples, &mut self.spectrum, &mut self.fwd_scratch)?;

        operation.apply(channel, &mut self.spectrum);

        // The real inverse requires purely real DC and Nyquist bins
        if let Some(dc) = self.spectrum.first_mut() {
            dc.im = 0.0;
        }
        if let Some(nyquist) = self.spectrum.last_mut() {
            nyquist.im = 0.0;
        }

        // Inverse FFT
        self.fft_inverse
            .process_with_scratch(&mut self.spectrum, samples, &mut self.inv_scratch)?;

        // Unnormalized inverse scales by n
        for x in samples.iter_mut() {
            *x *= self.norm;
        }

        Ok(())
    }
}

impl std::fmt::Debug for BlockTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTransform")
            .field("block_size", &self.block_size)
            .field("bins", &self.spectrum.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0f32, f32::max)
    }

    #[test]
    fn test_block_size_validation() {
        assert!(is_valid_block_size(2));
        assert!(is_valid_block_size(1 << 16));
        assert!(!is_valid_block_size(0));
        assert!(!is_valid_block_size(1));
        assert!(!is_valid_block_size(12));

        assert!(matches!(
            BlockTransform::new(100),
            Err(FilterError::InvalidBlockSize(100))
        ));
        assert!(BlockTransform::new(1).is_err());
    }

    #[test]
    fn test_bin_count() {
        let t = BlockTransform::new(64).unwrap();
        assert_eq!(t.bin_count(), 33);
        assert_eq!(t.block_size(), 64);
    }

    #[test]
    fn test_passthrough_roundtrip() {
        for &n in &[2usize, 8, 256, 4096] {
            let mut transform = BlockTransform::new(n).unwrap();
            let input: Vec<f32> = (0..n)
                .map(|i| {
                    let t = i as f32 / n as f32;
                    (2.0 * std::f32::consts::PI * 3.0 * t).sin() * 0.7
                        + (2.0 * std::f32::consts::PI * 11.0 * t).cos() * 0.3
                })
                .collect();
            let mut block = input.clone();
            transform.process(0, &mut block, &mut PassThrough).unwrap();

            let err = max_abs_diff(&block, &input);
            assert!(err < 1e-4, "roundtrip error too large for n={}: {}", n, err);
        }
    }

    #[test]
    fn test_transform_is_reusable() {
        let mut transform = BlockTransform::new(32).unwrap();
        for k in 0..4 {
            let input: Vec<f32> = (0..32).map(|i| ((i * (k + 1)) % 7) as f32 / 7.0 - 0.5).collect();
            let mut block = input.clone();
            transform.process(k, &mut block, &mut PassThrough).unwrap();
            assert!(max_abs_diff(&block, &input) < 1e-4);
        }
    }

    #[test]
    fn test_operation_sees_channel_and_bins() {
        let mut transform = BlockTransform::new(16).unwrap();
        let mut seen = Vec::new();
        let mut op = |ch: usize, bins: &mut [Complex32]| seen.push((ch, bins.len()));
        let mut block = vec![0.0f32; 16];
        transform.process(1, &mut block, &mut op).unwrap();
        transform.process(0, &mut block, &mut op).unwrap();
        assert_eq!(seen, vec![(1, 9), (0, 9)]);
    }

    #[test]
    fn test_zeroing_bins_silences_block() {
        let mut transform = BlockTransform::new(64).unwrap();
        let mut block: Vec<f32> = (0..64).map(|i| (i as f32 * 0.3).sin()).collect();
        let mut mute = |_: usize, bins: &mut [Complex32]| {
            for b in bins.iter_mut() {
                *b = Complex32::new(0.0, 0.0);
            }
        };
        transform.process(0, &mut block, &mut mute).unwrap();
        assert!(block.iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_dc_only_keeps_mean() {
        let mut transform = BlockTransform::new(32).unwrap();
        let mut block: Vec<f32> = (0..32).map(|i| 0.5 + (i as f32 * 0.9).sin()).collect();
        let mean = block.iter().sum::<f32>() / 32.0;
        let mut dc_only = |_: usize, bins: &mut [Complex32]| {
            for b in bins.iter_mut().skip(1) {
                *b = Complex32::new(0.0, 0.0);
            }
        };
        transform.process(0, &mut block, &mut dc_only).unwrap();
        assert!(block.iter().all(|s| (s - mean).abs() < 1e-4));
    }

    #[test]
    fn test_imaginary_edge_bins_are_tolerated() {
        let mut transform = BlockTransform::new(16).unwrap();
        let mut block = vec![0.25f32; 16];
        let mut skew = |_: usize, bins: &mut [Complex32]| {
            bins[0].im = 1.0;
            let last = bins.len() - 1;
            bins[last].im = -1.0;
        };
        assert!(transform.process(0, &mut block, &mut skew).is_ok());
        assert!(block.iter().all(|s| (s - 0.25).abs() < 1e-5));
    }
}
