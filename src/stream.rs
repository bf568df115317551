//! The filter stage: regroups arbitrary input chunks into fixed blocks, filters
//! them, and serves output chunks of arbitrary size.

use std::str::FromStr;
use std::sync::Arc;

use crate::buffer::{ChannelLayout, PlanarBuffer};
use crate::host::AudioSource;
use crate::swap_chain::SwapChain;
use crate::transform::{is_valid_block_size, BlockTransform, SpectralOperation};
use crate::{EventSink, FilterError, LogSink, Result};

const INIT_FAILED: &str = "Error initializing StreamAdapter";

/// When a freshly filtered block becomes visible to the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RotationPolicy {
    /// Only the read side rotates, when its buffer runs dry. A staged block waits
    /// until the current read buffer is exhausted; through
    /// [`StreamAdapter::process`] with chunks no larger than a block, output trails
    /// input by exactly one block. Staging twice before the reader rotates (larger
    /// chunks, or separate [`StreamAdapter::enqueue`] / [`StreamAdapter::fill`]
    /// calls) overwrites the unread block.
    #[default]
    OnDrain,
    /// Rotate right after a block is staged. The new block is read next, cutting
    /// short whatever remained of the previous one, so output is discontinuous
    /// unless the chunk size divides the block size.
    OnStage,
}

impl RotationPolicy {
    pub fn name(self) -> &'static str {
        match self {
            RotationPolicy::OnStage => "on_stage",
            RotationPolicy::OnDrain => "on_drain",
        }
    }
}

impl FromStr for RotationPolicy {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on_stage" => Ok(RotationPolicy::OnStage),
            "on_drain" => Ok(RotationPolicy::OnDrain),
            other => Err(FilterError::Config(format!(
                "unknown rotation '{}' (expected on_stage or on_drain)",
                other
            ))),
        }
    }
}

/// What [`StreamAdapter::process`] did with a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// The chunk was replaced with filtered audio.
    Filtered,
    /// The chunk was left untouched (stage disabled or not initialized).
    Passthrough,
}

/// Counters since the last `initialize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Blocks copied into the swap chain and filtered.
    pub blocks_staged: u64,
    /// Rotations triggered by staging ([`RotationPolicy::OnStage`] only).
    pub stage_swaps: u64,
    /// Rotations triggered by the read buffer running dry.
    pub drain_swaps: u64,
}

/// Buffers and plans that exist only while the stage is initialized.
///
/// Only stereo has a pipeline; there is no mono variant to construct.
enum ActiveStage {
    Stereo(BlockPipeline),
}

impl ActiveStage {
    fn pipeline(&self) -> &BlockPipeline {
        match self {
            ActiveStage::Stereo(pipeline) => pipeline,
        }
    }

    fn pipeline_mut(&mut self) -> &mut BlockPipeline {
        match self {
            ActiveStage::Stereo(pipeline) => pipeline,
        }
    }
}

struct BlockPipeline {
    accumulator: PlanarBuffer,
    chain: SwapChain,
    transform: BlockTransform,
    stats: StreamStats,
}

impl BlockPipeline {
    fn new(layout: ChannelLayout, block_size: usize) -> Result<Self> {
        Ok(Self {
            accumulator: PlanarBuffer::with_capacity(layout, block_size),
            chain: SwapChain::with_shape(layout, block_size),
            transform: BlockTransform::new(block_size)?,
            stats: StreamStats::default(),
        })
    }

    /// Push all whole frames of `input` into the accumulator, staging a block each
    /// time an insert comes back short. Returns the number of blocks staged.
    fn enqueue(
        &mut self,
        input: &[f32],
        operation: &mut dyn SpectralOperation,
        rotation: RotationPolicy,
    ) -> usize {
        let channels = self.accumulator.channel_count();
        let mut remaining = &input[..input.len() - input.len() % channels];
        let mut staged = 0;

        loop {
            let consumed = self.accumulator.insert(remaining);
            remaining = &remaining[consumed..];
            if remaining.is_empty() {
                break;
            }
            // Short insert: the accumulator is full
            self.flush(operation, rotation);
            self.accumulator.reset();
            staged += 1;
        }

        staged
    }

    /// Stage the accumulator into the chain's write buffer and filter it there.
    fn flush(&mut self, operation: &mut dyn SpectralOperation, rotation: RotationPolicy) {
        let target = self.chain.write_buffer_mut();
        if let Err(e) = self.accumulator.copy_to(target) {
            log::error!("dropping block: {}", e);
            return;
        }
        if let Err(e) = target.apply_filter(&mut self.transform, operation) {
            log::error!("block filter failed: {}", e);
        }
        self.stats.blocks_staged += 1;

        if rotation == RotationPolicy::OnStage {
            self.chain.swap();
            self.stats.stage_swaps += 1;
        }
    }

    /// Fill all whole frames of `output` from the read buffer, rotating whenever it
    /// runs dry. Returns the number of samples written.
    fn fill(&mut self, output: &mut [f32]) -> usize {
        let channels = self.chain.layout().count();
        let wanted = output.len() - output.len() % channels;
        let mut written = self.chain.read_buffer_mut().extract(&mut output[..wanted]);

        while written < wanted {
            self.chain.swap();
            self.stats.drain_swaps += 1;
            let n = self.chain.read_buffer_mut().extract(&mut output[written..wanted]);
            if n == 0 {
                // Only reachable with an empty block; nothing more to give
                break;
            }
            written += n;
        }

        written
    }
}

/// Streaming block-filter stage.
///
/// Lifecycle: constructed uninitialized, [`initialize`](Self::initialize) allocates
/// every buffer and plan, [`free`](Self::free) releases them (idempotent, also run
/// on drop). While uninitialized or disabled, [`process`](Self::process) leaves
/// audio untouched.
///
/// ```
/// use blockfilter_rt::{PassThrough, ProcessMode, StreamAdapter};
///
/// let mut adapter = StreamAdapter::new(PassThrough);
/// let mut chunk = vec![0.5f32; 64];
/// // Not initialized yet: passthrough
/// assert_eq!(adapter.process(&mut chunk), ProcessMode::Passthrough);
///
/// adapter.initialize(Some(&2usize), 256)?;
/// assert_eq!(adapter.process(&mut chunk), ProcessMode::Filtered);
/// # Ok::<(), blockfilter_rt::FilterError>(())
/// ```
pub struct StreamAdapter {
    operation: Box<dyn SpectralOperation>,
    rotation: RotationPolicy,
    enabled: bool,
    stage: Option<ActiveStage>,
    sink: Arc<dyn EventSink>,
}

impl StreamAdapter {
    /// Create an uninitialized, enabled stage around `operation`.
    pub fn new<O: SpectralOperation + 'static>(operation: O) -> Self {
        Self::with_sink(operation, Arc::new(LogSink))
    }

    /// Like [`new`](Self::new), reporting lifecycle events to `sink`.
    pub fn with_sink<O: SpectralOperation + 'static>(
        operation: O,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            operation: Box::new(operation),
            rotation: RotationPolicy::default(),
            enabled: true,
            stage: None,
            sink,
        }
    }

    pub fn with_rotation(mut self, rotation: RotationPolicy) -> Self {
        self.rotation = rotation;
        self
    }

    /// Change the rotation policy. Takes effect on the next staged block.
    pub fn set_rotation(&mut self, rotation: RotationPolicy) {
        self.rotation = rotation;
    }

    pub fn rotation(&self) -> RotationPolicy {
        self.rotation
    }

    /// Negotiate the channel layout with `source` and allocate all buffers for
    /// blocks of `block_size` frames.
    ///
    /// Any previous state is freed first. On failure the stage stays
    /// uninitialized (passthrough) and the reason is reported to the event sink.
    pub fn initialize(
        &mut self,
        source: Option<&dyn AudioSource>,
        block_size: usize,
    ) -> Result<()> {
        self.free();

        match self.setup(source, block_size) {
            Ok(stage) => {
                self.stage = Some(stage);
                self.operation.reset();
                self.sink.report("Setup", "completed");
                Ok(())
            }
            Err(e) => {
                self.sink.report(INIT_FAILED, &e.to_string());
                Err(e)
            }
        }
    }

    fn setup(&self, source: Option<&dyn AudioSource>, block_size: usize) -> Result<ActiveStage> {
        let source = source.ok_or(FilterError::MissingSource)?;
        let layout = ChannelLayout::from_count(source.channel_count())?;
        if !is_valid_block_size(block_size) {
            return Err(FilterError::InvalidBlockSize(block_size));
        }

        match layout {
            ChannelLayout::Stereo => {
                let pipeline = BlockPipeline::new(layout, block_size)?;
                log::debug!("stereo pipeline ready: {} frames per block", block_size);
                Ok(ActiveStage::Stereo(pipeline))
            }
            ChannelLayout::Mono => Err(FilterError::MonoNotImplemented),
        }
    }

    /// Release every buffer and return to the uninitialized state. Idempotent.
    pub fn free(&mut self) {
        if self.stage.take().is_some() {
            self.operation.reset();
            self.sink.report("Free", "released stage buffers");
        }
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.stage.is_some()
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Filter `chunk` in place.
    ///
    /// The chunk's samples are first accumulated, then overwritten with the same
    /// number of filtered samples. A trailing partial frame is left untouched.
    /// Disabled or uninitialized stages return [`ProcessMode::Passthrough`] without
    /// touching the chunk.
    pub fn process(&mut self, chunk: &mut [f32]) -> ProcessMode {
        if !self.enabled {
            return ProcessMode::Passthrough;
        }
        let Some(stage) = self.stage.as_mut() else {
            return ProcessMode::Passthrough;
        };

        let pipeline = stage.pipeline_mut();
        pipeline.enqueue(chunk, self.operation.as_mut(), self.rotation);
        pipeline.fill(chunk);
        ProcessMode::Filtered
    }

    /// Input half of [`process`](Self::process), for hosts with separate input and
    /// output buffers. Returns the number of blocks staged; 0 when disabled or
    /// uninitialized, in which case nothing is accumulated.
    pub fn enqueue(&mut self, input: &[f32]) -> usize {
        if !self.enabled {
            return 0;
        }
        match self.stage.as_mut() {
            Some(stage) => stage
                .pipeline_mut()
                .enqueue(input, self.operation.as_mut(), self.rotation),
            None => 0,
        }
    }

    /// Output half of [`process`](Self::process). Returns the number of samples
    /// written to `output`; 0 when disabled or uninitialized, leaving `output`
    /// untouched.
    pub fn fill(&mut self, output: &mut [f32]) -> usize {
        if !self.enabled {
            return 0;
        }
        match self.stage.as_mut() {
            Some(stage) => stage.pipeline_mut().fill(output),
            None => 0,
        }
    }

    /// Negotiated layout, `None` while uninitialized.
    pub fn channel_layout(&self) -> Option<ChannelLayout> {
        self.stage.as_ref().map(|s| s.pipeline().accumulator.layout())
    }

    pub fn block_size(&self) -> Option<usize> {
        self.stage.as_ref().map(|s| s.pipeline().accumulator.capacity())
    }

    /// Frames waiting in the accumulator.
    pub fn accumulated_frames(&self) -> usize {
        self.stage
            .as_ref()
            .map_or(0, |s| s.pipeline().accumulator.written_frames())
    }

    /// Frames left in the current read buffer.
    pub fn readable_frames(&self) -> usize {
        self.stage
            .as_ref()
            .map_or(0, |s| s.pipeline().chain.read_buffer().readable_frames())
    }

    /// Steady-state delay between input and output, in frames: one block.
    ///
    /// Holds under [`RotationPolicy::OnDrain`] for chunks no larger than a block.
    /// Under [`RotationPolicy::OnStage`] it holds only when the chunk size divides
    /// the block size; otherwise output skips ahead at every staged block.
    pub fn latency_frames(&self) -> usize {
        self.block_size().unwrap_or(0)
    }

    pub fn stats(&self) -> StreamStats {
        self.stage
            .as_ref()
            .map_or_else(StreamStats::default, |s| s.pipeline().stats)
    }
}

impl Drop for StreamAdapter {
    fn drop(&mut self) {
        self.free();
    }
}
