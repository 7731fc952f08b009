//! Configuration for the playback core.
//!
//! All timing constants here are empirically tuned defaults, not invariants.
//! Hosts override them through [`FeedBuilder`](crate::feed::FeedBuilder).

use std::fmt;
use std::time::Duration;

use crate::media::MediaSource;

/// Grace period between a slot becoming inactive and its resource being
/// released. Absorbs rapid re-entry during scroll bounce.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Upper bound on how long a deferred decision delivery may wait for idle
/// execution before running unconditionally.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_millis(50);

/// Delay between media becoming ready and the poster being removed, covering
/// the host's fade transition.
pub const DEFAULT_POSTER_FADE: Duration = Duration::from_millis(200);

/// Maximum number of idle decode resources retained by the pool.
pub const DEFAULT_MAX_IDLE_RESOURCES: usize = 5;

/// Geometry observation thresholds: updates are wanted at these intersection
/// ratios so decisions flip near the 0.5 boundary without continuous polling.
pub const DEFAULT_THRESHOLDS: [f64; 3] = [0.0, 0.5, 1.0];

// =============================================================================
// Aspect Ratio
// =============================================================================

/// Aspect-ratio hint for a slot (width:height).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AspectRatio {
    /// Width component.
    pub width: u32,
    /// Height component.
    pub height: u32,
}

impl AspectRatio {
    /// Creates an aspect ratio.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for AspectRatio {
    /// Portrait 9:16, the native shape of a short-form feed slot.
    fn default() -> Self {
        Self {
            width: 9,
            height: 16,
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.width, self.height)
    }
}

// =============================================================================
// Slot Spec
// =============================================================================

/// Per-slot inputs supplied by the host at mount time.
#[derive(Clone, Debug, Default)]
pub struct SlotSpec {
    /// Media source locator. Required for playback; a slot without one
    /// reports `MissingSource` on any play attempt.
    pub source: Option<MediaSource>,
    /// Aspect-ratio hint; the feed default applies when absent.
    pub aspect_ratio: Option<AspectRatio>,
    /// Optional placeholder image locator shown before media is ready.
    pub poster: Option<String>,
}

impl SlotSpec {
    /// Creates an empty spec.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the media source.
    pub fn with_source(mut self, source: MediaSource) -> Self {
        self.source = Some(source);
        self
    }

    /// Sets the aspect-ratio hint.
    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = Some(ratio);
        self
    }

    /// Sets the poster locator.
    pub fn with_poster(mut self, poster: impl Into<String>) -> Self {
        self.poster = Some(poster.into());
        self
    }
}

// =============================================================================
// Feed Config
// =============================================================================

/// Tunables shared by the tracker, pool, and controllers of one feed.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Grace period before an inactive slot's resource is released.
    pub grace_period: Duration,

    /// Timeout bound on deferred decision delivery.
    pub delivery_timeout: Duration,

    /// Poster fade-out delay after media ready.
    pub poster_fade: Duration,

    /// Maximum idle resources retained by the pool.
    pub max_idle_resources: usize,

    /// Geometry observation thresholds for the host's geometry primitive.
    pub thresholds: Vec<f64>,

    /// Aspect ratio applied to slots that do not specify one.
    pub default_aspect_ratio: AspectRatio,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            delivery_timeout: DEFAULT_DELIVERY_TIMEOUT,
            poster_fade: DEFAULT_POSTER_FADE,
            max_idle_resources: DEFAULT_MAX_IDLE_RESOURCES,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            default_aspect_ratio: AspectRatio::default(),
        }
    }
}
