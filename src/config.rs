// THEORY:
// Two levels of configuration, mirroring the split between "what is on the screen"
// and "how hard we look at it":
// 1.  `Config` is the protocol itself (ring count, bits per dot, frame rate). Sender
//     and receiver must agree on it; it is validated once and never mutated.
// 2.  `DecoderConfig` holds every empirical threshold of the receive pipeline. These
//     are tuning knobs: they change how tolerant the decoder is of a bad camera, never
//     what bytes it produces for a clean one.

use crate::error::ConfigError;
use crate::core_modules::palette::PALETTE;
use serde::{Deserialize, Serialize};

/// Protocol parameters shared by encoder and decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawConfig")]
pub struct Config {
    rings: usize,
    bits_per_dot: u8,
    fps: u32,
}

#[derive(Deserialize)]
struct RawConfig {
    rings: usize,
    bits_per_dot: u8,
    #[serde(default = "default_fps")]
    fps: u32,
}

fn default_fps() -> u32 {
    5
}

impl TryFrom<RawConfig> for Config {
    type Error = ConfigError;

    fn try_from(raw: RawConfig) -> Result<Self, Self::Error> {
        Config::new(raw.rings, raw.bits_per_dot, raw.fps)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rings: 4,
            bits_per_dot: 3,
            fps: 5,
        }
    }
}

impl Config {
    pub fn new(rings: usize, bits_per_dot: u8, fps: u32) -> Result<Self, ConfigError> {
        if rings < 1 {
            return Err(ConfigError::RingCount(rings));
        }
        if !(1..=8).contains(&bits_per_dot) {
            return Err(ConfigError::BitsPerDot(bits_per_dot));
        }
        if fps < 1 {
            return Err(ConfigError::FrameRate);
        }
        Ok(Self {
            rings,
            bits_per_dot,
            fps,
        })
    }

    pub fn rings(&self) -> usize {
        self.rings
    }

    pub fn bits_per_dot(&self) -> u8 {
        self.bits_per_dot
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Number of distinct dot values (`2^bits_per_dot`).
    pub fn symbol_count(&self) -> usize {
        1usize << self.bits_per_dot
    }

    /// Total data dots: 6 + 12 + ... + 6·rings.
    pub fn total_dots(&self) -> usize {
        3 * self.rings * (self.rings + 1)
    }

    pub fn bits_per_frame(&self) -> usize {
        self.total_dots() * self.bits_per_dot as usize
    }

    /// Usable payload bytes per frame, excluding the two header bytes.
    /// Zero for configurations too small to even carry the header.
    pub fn bytes_per_frame(&self) -> usize {
        (self.bits_per_frame() / 8).saturating_sub(2)
    }

    /// Fails when the palette cannot represent every dot value.
    pub fn ensure_palette_fits(&self) -> Result<(), ConfigError> {
        let needed = self.symbol_count();
        if needed > PALETTE.len() {
            return Err(ConfigError::PaletteTooSmall {
                bits_per_dot: self.bits_per_dot,
                needed,
                available: PALETTE.len(),
            });
        }
        Ok(())
    }
}

/// Tunable thresholds for the receive pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    // Anchor detection
    /// Edge length of the square quantization cell in pixels (default: 8).
    pub cell_size: u32,
    /// Every channel of a probed pixel must exceed this for it to count (default: 190).
    pub brightness_threshold: u8,
    /// Components with fewer cells are noise or text (default: 1).
    pub min_blob_cells: usize,
    /// Components with more cells are screen glare (default: 400).
    pub max_blob_cells: usize,
    /// Mean HSV saturation above which a bright blob is a colored dot, not an anchor (default: 0.25).
    pub max_anchor_saturation: f32,
    /// Radius in pixels of the neighborhood probed at a blob centroid (default: 3).
    pub anchor_probe_radius: u32,

    // Transform estimation
    /// Only the K largest blobs are combined into anchor triples (default: 10).
    pub candidate_blobs: usize,
    /// Allowed relative deviation of each triangle side from the mean side (default: 0.30).
    pub triple_side_tolerance: f64,
    /// Largest-to-smallest blob size ratio allowed inside a triple (default: 3.0).
    pub max_blob_size_ratio: f64,
    /// Reject triples whose centroid is brighter than this; `None` disables the check (default: 80).
    pub dark_center_threshold: Option<u8>,
    /// Center drift tolerated against the cached transform, as a fraction of its scale (default: 0.15).
    pub max_center_drift: f64,
    /// Scale drift tolerated against the cached transform, as a fraction of its scale (default: 0.20).
    pub max_scale_drift: f64,
    /// Rotation drift tolerated against the cached transform, in degrees (default: 15).
    pub max_rotation_drift_deg: f64,

    // Color sampling
    /// Sampling disc radius as a fraction of the transform scale (default: 0.03).
    pub sample_radius_factor: f64,
    /// Anchors dimmer than this cannot calibrate white balance (default: 150).
    pub white_balance_min_brightness: f32,
    /// Upper bound of the per-channel white balance gain (default: 1.5).
    pub white_balance_max_gain: f32,
    /// Minimum HSV saturation for hue matching (default: 0.15).
    pub hue_min_saturation: f32,
    /// Minimum brightest channel for hue matching (default: 30).
    pub hue_min_value: f32,
    /// Split dot sampling across worker threads (default: false).
    pub parallel_sampling: bool,

    // Consensus
    /// Valid captures tallied before the frame total may lock (default: 10).
    pub lock_min_captures: usize,
    /// Share of the tally the plurality total needs to lock (default: 0.30).
    pub lock_min_share: f64,
    /// Captures accumulated per frame index before voting (default: 5).
    pub vote_cap: usize,

    /// Attach a `DebugSnapshot` to every tick result (default: false).
    pub debug_snapshots: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            cell_size: 8,
            brightness_threshold: 190,
            min_blob_cells: 1,
            max_blob_cells: 400,
            max_anchor_saturation: 0.25,
            anchor_probe_radius: 3,
            candidate_blobs: 10,
            triple_side_tolerance: 0.30,
            max_blob_size_ratio: 3.0,
            dark_center_threshold: Some(80),
            max_center_drift: 0.15,
            max_scale_drift: 0.20,
            max_rotation_drift_deg: 15.0,
            sample_radius_factor: 0.03,
            white_balance_min_brightness: 150.0,
            white_balance_max_gain: 1.5,
            hue_min_saturation: 0.15,
            hue_min_value: 30.0,
            parallel_sampling: false,
            lock_min_captures: 10,
            lock_min_share: 0.30,
            vote_cap: 5,
            debug_snapshots: false,
        }
    }
}

impl DecoderConfig {
    #[must_use]
    pub fn builder() -> DecoderConfigBuilder {
        DecoderConfigBuilder::default()
    }

    /// Parses a (possibly partial) JSON object over the defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: DecoderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(field: &'static str, reason: &str) -> ConfigError {
            ConfigError::InvalidSetting {
                field,
                reason: reason.to_string(),
            }
        }

        if self.cell_size < 2 {
            return Err(invalid("cell_size", "must be at least 2 pixels"));
        }
        if self.min_blob_cells < 1 {
            return Err(invalid("min_blob_cells", "must be at least 1"));
        }
        if self.max_blob_cells < self.min_blob_cells {
            return Err(invalid("max_blob_cells", "must not be below min_blob_cells"));
        }
        if self.candidate_blobs < 3 {
            return Err(invalid("candidate_blobs", "a triple needs at least 3 candidates"));
        }
        if !(self.triple_side_tolerance > 0.0) {
            return Err(invalid("triple_side_tolerance", "must be positive"));
        }
        if !(self.max_blob_size_ratio >= 1.0) {
            return Err(invalid("max_blob_size_ratio", "must be at least 1"));
        }
        if !(self.sample_radius_factor > 0.0) {
            return Err(invalid("sample_radius_factor", "must be positive"));
        }
        if !(self.white_balance_max_gain >= 1.0) {
            return Err(invalid("white_balance_max_gain", "must be at least 1"));
        }
        if self.vote_cap < 1 {
            return Err(invalid("vote_cap", "must be at least 1"));
        }
        if self.lock_min_captures < 1 {
            return Err(invalid("lock_min_captures", "must be at least 1"));
        }
        if !(self.lock_min_share > 0.0 && self.lock_min_share <= 1.0) {
            return Err(invalid("lock_min_share", "must be within (0, 1]"));
        }
        Ok(())
    }
}

/// Builder for [`DecoderConfig`], starting from the defaults.
#[derive(Debug, Default)]
pub struct DecoderConfigBuilder {
    config: DecoderConfig,
}

impl DecoderConfigBuilder {
    #[must_use]
    pub fn cell_size(mut self, pixels: u32) -> Self {
        self.config.cell_size = pixels;
        self
    }

    #[must_use]
    pub fn brightness_threshold(mut self, threshold: u8) -> Self {
        self.config.brightness_threshold = threshold;
        self
    }

    #[must_use]
    pub fn blob_cells(mut self, min: usize, max: usize) -> Self {
        self.config.min_blob_cells = min;
        self.config.max_blob_cells = max;
        self
    }

    #[must_use]
    pub fn max_anchor_saturation(mut self, saturation: f32) -> Self {
        self.config.max_anchor_saturation = saturation;
        self
    }

    #[must_use]
    pub fn candidate_blobs(mut self, count: usize) -> Self {
        self.config.candidate_blobs = count;
        self
    }

    #[must_use]
    pub fn triple_side_tolerance(mut self, tolerance: f64) -> Self {
        self.config.triple_side_tolerance = tolerance;
        self
    }

    #[must_use]
    pub fn max_blob_size_ratio(mut self, ratio: f64) -> Self {
        self.config.max_blob_size_ratio = ratio;
        self
    }

    #[must_use]
    pub fn dark_center_threshold(mut self, threshold: Option<u8>) -> Self {
        self.config.dark_center_threshold = threshold;
        self
    }

    /// Set the drift bounds: center and scale as fractions of scale, rotation in degrees.
    #[must_use]
    pub fn drift_limits(mut self, center: f64, scale: f64, rotation_deg: f64) -> Self {
        self.config.max_center_drift = center;
        self.config.max_scale_drift = scale;
        self.config.max_rotation_drift_deg = rotation_deg;
        self
    }

    #[must_use]
    pub fn sample_radius_factor(mut self, factor: f64) -> Self {
        self.config.sample_radius_factor = factor;
        self
    }

    #[must_use]
    pub fn white_balance(mut self, min_brightness: f32, max_gain: f32) -> Self {
        self.config.white_balance_min_brightness = min_brightness;
        self.config.white_balance_max_gain = max_gain;
        self
    }

    #[must_use]
    pub fn parallel_sampling(mut self, enabled: bool) -> Self {
        self.config.parallel_sampling = enabled;
        self
    }

    /// Set the total-frame lock rule: minimum tallied captures and plurality share.
    #[must_use]
    pub fn lock_rule(mut self, min_captures: usize, min_share: f64) -> Self {
        self.config.lock_min_captures = min_captures;
        self.config.lock_min_share = min_share;
        self
    }

    #[must_use]
    pub fn vote_cap(mut self, captures: usize) -> Self {
        self.config.vote_cap = captures;
        self
    }

    #[must_use]
    pub fn debug_snapshots(mut self, enabled: bool) -> Self {
        self.config.debug_snapshots = enabled;
        self
    }

    pub fn build(self) -> Result<DecoderConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
