//! Scrollplay - attention-driven playback for scroll feeds
//!
//! This library decides which media slots in a vertically scrolled feed
//! should be playing, and runs their playback lifecycles against a bounded
//! pool of decode resources. It is host-agnostic: the embedder supplies
//! geometry measurements and a decode backend, and observes playback through
//! per-slot controllers and their event streams.
//!
//! # Architecture
//!
//! - [`Feed`] wires everything together; one per scrolling surface.
//! - [`VisibilityTracker`](visibility::VisibilityTracker) turns geometry
//!   batches into play/pause decisions and routes them to controllers.
//! - [`ResourcePool`](pool::ResourcePool) recycles decode handles, bounding
//!   idle memory while never refusing an acquisition.
//! - [`PlaybackController`](controller::PlaybackController) runs one slot's
//!   lifecycle: acquire, attach, load, play, and a grace-period release that
//!   absorbs scroll bounce.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use scrollplay::{Feed, GeometrySample, GeometryUpdate, MediaSource, SlotSpec, StubBackend};
//!
//! # async fn demo() {
//! let feed = Feed::builder(Arc::new(StubBackend::new())).build();
//!
//! let slot = feed.mount(
//!     SlotSpec::new()
//!         .with_source(MediaSource::new("https://cdn.example.com/clip.mp4"))
//!         .with_poster("https://cdn.example.com/poster.jpg"),
//! );
//!
//! // Host reports geometry; the feed decides and drives playback.
//! feed.handle_updates(&[GeometryUpdate::new(
//!     slot.slot(),
//!     GeometrySample::new(0.8, 400.0, 800.0),
//! )]);
//! # }
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod feed;
pub mod media;
pub mod pool;
pub mod schedule;
pub mod visibility;

pub use config::{AspectRatio, FeedConfig, SlotSpec};
pub use controller::{LifecycleState, ListenerId, PlaybackController, PlayerEvent, PosterState};
pub use error::{ErrorKind, MediaError, PlaybackError};
pub use feed::{Feed, FeedBuilder};
pub use media::{
    BoxFuture, MediaBackend, MediaHandle, MediaSource, PosterLoader, SourceAdapter, SourceKind,
    StubBackend, StubHandle,
};
pub use pool::{PoolStats, PooledResource, ResourceId, ResourcePool};
pub use schedule::{DeferredScheduler, DeferredTask, InlineScheduler, TimerScheduler};
pub use visibility::{Decision, GeometrySample, GeometryUpdate, SlotId, VisibilityTracker};
