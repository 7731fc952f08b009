//! Visibility observation: geometry samples, the decision rule, and the
//! tracker that routes decisions to controllers.

mod decision;
mod tracker;

pub use decision::{Decision, GeometrySample};
pub use tracker::{GeometryUpdate, SlotId, VisibilityTracker};
