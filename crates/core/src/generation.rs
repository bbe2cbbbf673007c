//! Generation defaults, aspect-ratio mapping, and seed handling.
//!
//! The public API exposes only a prompt and an aspect ratio; frame count,
//! frame rate, and seed are internal defaults resolved here.

use rand::Rng;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Generation defaults
// ---------------------------------------------------------------------------

/// Number of frames rendered per job.
pub const DEFAULT_FRAME_COUNT: u32 = 121;
/// Frame rate the workflow encodes at.
pub const FRAMES_PER_SECOND: u32 = 24;
/// Seed value requesting a randomly generated seed.
pub const SEED_RANDOM: i64 = 0;
/// Alternative seed value requesting a random seed.
pub const SEED_RANDOM_ALT: i64 = -1;
/// Upper bound (inclusive) of generated seeds: 2^53, the largest integer
/// JSON consumers can represent exactly.
pub const MAX_RANDOM_SEED: u64 = 1 << 53;

// ---------------------------------------------------------------------------
// Aspect ratio
// ---------------------------------------------------------------------------

/// Aspect ratio applied when the caller omits one.
pub const DEFAULT_ASPECT_RATIO: &str = "16:9";

/// Supported output aspect ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Landscape,
    Portrait,
}

impl AspectRatio {
    /// Parse the wire form (`"16:9"` or `"9:16"`).
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "16:9" => Ok(Self::Landscape),
            "9:16" => Ok(Self::Portrait),
            other => Err(CoreError::Validation(format!(
                "Invalid aspect_ratio: {other}. Must be '16:9' or '9:16'"
            ))),
        }
    }

    /// Output resolution as `(width, height)` in pixels.
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Self::Landscape => (1280, 720),
            Self::Portrait => (720, 1280),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }
}

// ---------------------------------------------------------------------------
// Seed and duration
// ---------------------------------------------------------------------------

/// Resolve a requested seed into the concrete seed sent to the workflow.
///
/// [`SEED_RANDOM`], [`SEED_RANDOM_ALT`] and any other negative value draw a
/// fresh seed in `0..=MAX_RANDOM_SEED`; positive values pass through.
pub fn resolve_seed(requested: i64) -> u64 {
    match u64::try_from(requested) {
        Ok(0) | Err(_) => rand::rng().random_range(0..=MAX_RANDOM_SEED),
        Ok(seed) => seed,
    }
}

/// Clip duration in seconds for `frame_count` frames, rounded to two
/// decimal places.
pub fn duration_seconds(frame_count: u32) -> f64 {
    let raw = frame_count as f64 / FRAMES_PER_SECOND as f64;
    (raw * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Resolved parameters
// ---------------------------------------------------------------------------

/// Fully resolved parameters for one generation job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub seed: u64,
}

impl GenerationParams {
    pub fn duration_seconds(&self) -> f64 {
        duration_seconds(self.frame_count)
    }
}
