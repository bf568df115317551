//! Stream lifecycle around one [`StreamAdapter`].
//!
//! A [`FilterHost`] is what an audio application owns: it is created once, told
//! when a stream starts and stops, and forwards audio callbacks to its adapter.
//! There is no global instance; the application passes the host wherever audio
//! flows.

use std::sync::Arc;

use crate::stream::{ProcessMode, StreamAdapter};
use crate::transform::SpectralOperation;
use crate::{EventSink, FilterConfig, LogSink};

/// Upstream audio source, queried once when a stream starts.
pub trait AudioSource {
    /// Interleaved channels per frame.
    fn channel_count(&self) -> usize;
}

/// A bare channel count is a valid source.
impl AudioSource for usize {
    fn channel_count(&self) -> usize {
        *self
    }
}

/// Owns the filter stage across stream start/stop.
pub struct FilterHost {
    config: FilterConfig,
    enabled: bool,
    adapter: StreamAdapter,
    sink: Arc<dyn EventSink>,
}

impl FilterHost {
    pub fn new<O: SpectralOperation + 'static>(config: FilterConfig, operation: O) -> Self {
        Self::with_sink(config, operation, Arc::new(LogSink))
    }

    /// Host and adapter both report to `sink`.
    pub fn with_sink<O: SpectralOperation + 'static>(
        config: FilterConfig,
        operation: O,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let adapter =
            StreamAdapter::with_sink(operation, sink.clone()).with_rotation(config.rotation);
        Self {
            config,
            enabled: false,
            adapter,
            sink,
        }
    }

    /// Enable filtering and attach the stage to `source`.
    ///
    /// Returns whether the stage is attached. Without a usable source the host
    /// stays enabled but audio passes through unfiltered.
    pub fn on_start_stream(&mut self, source: Option<&dyn AudioSource>) -> bool {
        self.enabled = true;
        self.sink.report("OnStartStream", "Initializing");

        if source.is_none() {
            self.sink.report("OnStartStream", "no audio source found");
            // Drop any stage left attached by a previous start
            self.adapter.free();
            return false;
        }

        self.adapter.set_rotation(self.config.rotation);
        self.adapter.set_enabled(true);
        match self.adapter.initialize(source, self.config.block_size) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("filter not attached, passing audio through: {}", e);
                false
            }
        }
    }

    /// Disable filtering and release the stage. Idempotent.
    pub fn on_stop_stream(&mut self) {
        self.enabled = false;
        self.adapter.set_enabled(false);
        self.adapter.free();
        self.sink.report("OnStopStream", "Freeing data");
    }

    /// Audio callback entry point.
    pub fn process(&mut self, chunk: &mut [f32]) -> ProcessMode {
        if !self.is_attached() {
            return ProcessMode::Passthrough;
        }
        self.adapter.process(chunk)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether audio is currently being filtered.
    #[inline]
    pub fn is_attached(&self) -> bool {
        self.enabled && self.adapter.is_initialized()
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Applies from the next stream start.
    pub fn set_config(&mut self, config: FilterConfig) {
        self.config = config;
    }

    pub fn adapter(&self) -> &StreamAdapter {
        &self.adapter
    }

    pub fn adapter_mut(&mut self) -> &mut StreamAdapter {
        &mut self.adapter
    }
}
