//! Geometry samples and the play/pause decision rule.

/// One geometry measurement for a slot.
///
/// Produced by the host's geometry-change primitive and consumed immediately
/// to derive a [`Decision`]; nothing here is retained.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeometrySample {
    /// Fraction of the slot's area currently overlapping the viewport (0-1).
    pub ratio: f64,
    /// Slot bounding height in host layout units.
    pub slot_height: f64,
    /// Viewport height in host layout units.
    pub viewport_height: f64,
}

impl GeometrySample {
    /// Creates a sample.
    pub fn new(ratio: f64, slot_height: f64, viewport_height: f64) -> Self {
        Self {
            ratio,
            slot_height,
            viewport_height,
        }
    }

    /// Derives the play/pause decision for this sample.
    ///
    /// Two scenarios trigger playback:
    ///
    /// 1. Normal slot: more than half of the slot's area is visible.
    /// 2. Slot taller than the viewport: such a slot can never reach 50% of
    ///    its own area visible, so it plays once its visible portion covers
    ///    more than half of the viewport instead.
    pub fn decide(&self) -> Decision {
        let viewport = if self.viewport_height > 0.0 {
            self.viewport_height
        } else {
            1.0
        };

        let occupancy = (self.slot_height * self.ratio) / viewport;
        let taller_than_viewport = self.slot_height > viewport;
        let should_play = self.ratio > 0.5 || (taller_than_viewport && occupancy > 0.5);

        Decision {
            should_play,
            ratio: self.ratio,
            occupancy,
        }
    }
}

/// A play/pause decision plus the metrics that triggered it.
///
/// Only the latest decision per slot is meaningful; the metrics ride along
/// so visibility-change events can report them to the host.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    /// Whether the slot should be playing.
    pub should_play: bool,
    /// Intersection ratio that produced this decision.
    pub ratio: f64,
    /// Fraction of the viewport covered by the slot's visible portion.
    pub occupancy: f64,
}
