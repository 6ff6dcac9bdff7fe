// THEORY:
// The `pipeline` module is the top-level API of the decoder. A `DecoderSession` owns all
// mutable state of one scan (the cached transform and the consensus state) and exposes
// a single synchronous step: `tick(capture) -> TickResult`.
//
// Every tick runs the full stack in order:
//   blobs -> anchor triple -> stabilized transform -> dot colors -> consensus.
// No stage ever fails the tick. A capture without geometry or with an unreadable header
// simply contributes nothing, and the caller's next tick is the retry. The session has
// no clock of its own; the caller (or `scanner`) decides when to tick.

use crate::config::{Config, DecoderConfig};
use crate::core_modules::blob::Blob;
use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::capture::PixelView;
use crate::core_modules::color_sampler::{ColorSampler, DotSample, WhiteBalance};
use crate::core_modules::consensus::{ConsensusDecoder, DecoderPhase, SubmitOutcome};
use crate::core_modules::geometry::Layout;
use crate::core_modules::transform::{
    Transform, TransformSource, TransformStabilizer, derive_transform,
};
use crate::error::{BufferError, ConfigError, DecodeError};

/// What a tick contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No anchor triple this tick and no cached transform to fall back on.
    NotDetected,
    /// Dots were sampled and submitted to the consensus decoder.
    Sampled {
        source: TransformSource,
        submit: SubmitOutcome,
    },
}

/// Intermediate state of one tick, for overlays and diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugSnapshot {
    pub blobs: Vec<Blob>,
    pub transform: Option<Transform>,
    pub transform_source: TransformSource,
    pub white_balance: Option<WhiteBalance>,
    pub samples: Vec<DotSample>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickResult {
    /// Overall progress in [0, 1].
    pub progress: f64,
    pub complete: bool,
    pub outcome: TickOutcome,
    /// Present only when debug snapshots are enabled.
    pub debug: Option<DebugSnapshot>,
}

/// One scan session: every piece of state the decoder carries between ticks.
#[derive(Debug, Clone)]
pub struct DecoderSession {
    config: Config,
    tuning: DecoderConfig,
    layout: Layout,
    stabilizer: TransformStabilizer,
    sampler: ColorSampler,
    consensus: ConsensusDecoder,
}

impl DecoderSession {
    pub fn new(config: Config, tuning: DecoderConfig) -> Result<Self, ConfigError> {
        config.ensure_palette_fits()?;
        tuning.validate()?;

        Ok(Self {
            layout: Layout::new(&config),
            stabilizer: TransformStabilizer::new(&tuning),
            sampler: ColorSampler::new(&config, &tuning),
            consensus: ConsensusDecoder::new(&config, &tuning),
            config,
            tuning,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tuning(&self) -> &DecoderConfig {
        &self.tuning
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn phase(&self) -> DecoderPhase {
        self.consensus.phase()
    }

    pub fn progress(&self) -> f64 {
        self.consensus.progress()
    }

    pub fn cached_transform(&self) -> Option<&Transform> {
        self.stabilizer.cached()
    }

    /// Validates a raw RGBA buffer and ticks with it.
    pub fn decode_tick(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<TickResult, BufferError> {
        let view = PixelView::new(pixels, width, height)?;
        Ok(self.tick(&view))
    }

    pub fn tick(&mut self, view: &PixelView<'_>) -> TickResult {
        let blobs = blob_detector::find_blobs(view, &self.tuning);
        let fresh = derive_transform(&blobs, Some(view), &self.tuning);
        let stabilized = self.stabilizer.offer(fresh);

        let Some(transform) = stabilized.transform else {
            tracing::debug!("no anchors detected among {} blobs", blobs.len());
            return self.result(
                TickOutcome::NotDetected,
                self.tuning.debug_snapshots.then(|| DebugSnapshot {
                    blobs,
                    transform: None,
                    transform_source: stabilized.source,
                    white_balance: None,
                    samples: Vec::new(),
                }),
            );
        };

        let sampled = self.sampler.sample(view, &transform, &self.layout);
        let submit = self.consensus.submit(&sampled.dot_values);
        let outcome = TickOutcome::Sampled {
            source: stabilized.source,
            submit,
        };

        let debug = self.tuning.debug_snapshots.then(|| DebugSnapshot {
            blobs,
            transform: Some(transform),
            transform_source: stabilized.source,
            white_balance: Some(sampled.white_balance),
            samples: sampled.samples,
        });
        self.result(outcome, debug)
    }

    fn result(&self, outcome: TickOutcome, debug: Option<DebugSnapshot>) -> TickResult {
        TickResult {
            progress: self.consensus.progress(),
            complete: self.consensus.is_complete(),
            outcome,
            debug,
        }
    }

    /// The reassembled transfer, zero padding included.
    pub fn final_bytes(&self) -> Result<Vec<u8>, DecodeError> {
        self.consensus.final_bytes()
    }

    /// Forgets everything, including the cached transform.
    pub fn reset(&mut self) {
        self.consensus.reset();
        self.stabilizer.reset();
    }
}
