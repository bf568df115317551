//! # BlockFilter-RT
//!
//! Real-time block-based spectral filtering for streaming interleaved audio.
//!
//! Audio hosts deliver chunks of arbitrary size on a live callback. A spectral
//! filter wants fixed, power-of-two blocks. This crate sits between the two: it
//! accumulates incoming chunks into one block, filters the block in the frequency
//! domain, and hands filtered audio back in chunks of whatever size the host asks
//! for next.
//!
//! ## Quick Start
//!
//! ```
//! use blockfilter_rt::{PassThrough, StreamAdapter};
//!
//! let mut adapter = StreamAdapter::new(PassThrough);
//! // Stereo source, 1024-frame blocks
//! adapter.initialize(Some(&2usize), 1024)?;
//!
//! // Inside the audio callback: filter the chunk in place
//! let mut chunk = vec![0.0f32; 2 * 441];
//! adapter.process(&mut chunk);
//! # Ok::<(), blockfilter_rt::FilterError>(())
//! ```
//!
//! ## Pipeline
//!
//! ```text
//! chunk ──► accumulator ──(full)──► swap chain write buffer ──► BlockTransform
//!                                              │ swap
//! chunk ◄── swap chain read buffer ◄───────────┘
//! ```
//!
//! - [`PlanarBuffer`] - fixed-capacity planar sample store (the accumulator and
//!   each swap chain slot).
//! - [`SwapChain`] - three buffers rotating between "being filled", "being read"
//!   and "idle spare".
//! - [`BlockTransform`] - forward real FFT, pluggable [`SpectralOperation`],
//!   inverse FFT, `1/n` renormalization.
//! - [`StreamAdapter`] - the filter stage proper.
//! - [`FilterHost`] - stream start/stop lifecycle around one adapter.
//!
//! ## Latency
//!
//! With the default [`RotationPolicy::OnDrain`], output is input delayed by
//! exactly one block (`n` frames) for any sequence of chunks no larger than a
//! block. The first `n` output frames are silence. A chunk spanning more than one
//! block boundary stages blocks faster than the reader can take them, and all but
//! the last are lost. [`RotationPolicy::OnStage`] exposes each block as soon as it
//! is filtered; it keeps the same delay only when the chunk size divides `n`.
//!
//! ## Channels
//!
//! Stereo is supported. Mono sources are recognised but fail initialization with
//! [`FilterError::MonoNotImplemented`]; any other channel count fails with
//! [`FilterError::UnsupportedChannelCount`]. A stage that failed to initialize
//! passes audio through untouched.
//!
//! ## Logging
//!
//! This crate uses the `log` crate and never installs a logger. Lifecycle
//! events (initialization, failures, free, stream start/stop) go through an
//! [`EventSink`]; the default [`LogSink`] forwards them to `log::info!`.
//!
//! ## Thread Safety
//!
//! Processing is single-threaded and callback-driven: one thread calls
//! [`StreamAdapter::process`] at a time. `initialize`/`free` may run on a control
//! thread, but never concurrently with processing. Adapters and hosts are `Send`.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

pub mod buffer;
pub mod host;
pub mod stream;
pub mod swap_chain;
pub mod transform;

pub use buffer::{ChannelLayout, FillState, PlanarBuffer};
pub use host::{AudioSource, FilterHost};
pub use stream::{ProcessMode, RotationPolicy, StreamAdapter, StreamStats};
pub use swap_chain::SwapChain;
pub use transform::{is_valid_block_size, BlockTransform, PassThrough, SpectralOperation};

/// Default block size in frames (~1.5s at 44.1 kHz).
pub const DEFAULT_BLOCK_SIZE: usize = 1 << 16;
/// Conventional configuration file name.
pub const CONFIG_FILE_NAME: &str = "noisereduction.ini";

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("no upstream audio source available")]
    MissingSource,
    #[error("unhandled channel count {0} (must be mono or stereo)")]
    UnsupportedChannelCount(usize),
    #[error("mono channel handling not implemented")]
    MonoNotImplemented,
    #[error("invalid block size {0} (must be a power of two >= 2)")]
    InvalidBlockSize(usize),
    #[error("buffer layout mismatch: expected {expected}, found {found}")]
    CapacityMismatch {
        expected: ChannelLayout,
        found: ChannelLayout,
    },
    #[error("FFT error: {0}")]
    Fft(#[from] realfft::FftError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config error: {0}")]
    Config(String),
}

impl FilterError {
    /// Errors raised by `initialize`; the stage stays in passthrough.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FilterError::MissingSource
                | FilterError::UnsupportedChannelCount(_)
                | FilterError::MonoNotImplemented
                | FilterError::InvalidBlockSize(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// Receives human-readable lifecycle events (`context: message`).
pub trait EventSink: Send + Sync {
    fn report(&self, context: &str, message: &str);
}

/// Forwards events to `log::info!`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl EventSink for LogSink {
    fn report(&self, context: &str, message: &str) {
        log::info!("{}: {}", context, message);
    }
}

/// Stage configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    /// Analysis block size in frames. Power of two, at least 2.
    pub block_size: usize,
    /// When a freshly filtered block becomes readable.
    pub rotation: RotationPolicy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            rotation: RotationPolicy::default(),
        }
    }
}

impl FilterConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_block_size(self.block_size) {
            return Err(FilterError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }

    /// Parse INI-style `key = value` text.
    ///
    /// Recognised keys: `block_size`, `rotation` (`on_stage` | `on_drain`).
    /// Missing keys keep their defaults, unknown keys are ignored.
    pub fn from_ini_str(content: &str) -> Result<Self> {
        let params = parse_ini(content);
        let mut config = Self::default();

        if let Some(value) = params.get("block_size") {
            config.block_size = value
                .parse::<usize>()
                .map_err(|e| FilterError::Config(format!("block_size '{}': {}", value, e)))?;
        }
        if let Some(value) = params.get("rotation") {
            config.rotation = value.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file (see [`from_ini_str`](Self::from_ini_str)).
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_ini_str(&content)
    }
}

/// Simple INI parser
fn parse_ini(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty()
            || line.starts_with('[')
            || line.starts_with('#')
            || line.starts_with(';')
        {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            map.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    map
}

// Verify that the stage can be moved onto the audio thread
// This is a compile-time check - if it compiles, the types are Send
fn _assert_send<T: Send>() {}
fn _assert_stage_is_send() {
    _assert_send::<StreamAdapter>();
    _assert_send::<FilterHost>();
}
