//! Feed assembly: wires the tracker, pool, and controllers together.
//!
//! A [`Feed`] owns one [`ResourcePool`] and one [`VisibilityTracker`] shared
//! by all of its slots. Hosts build it once with [`FeedBuilder`], then mount
//! a controller per on-screen slot and feed geometry batches to the tracker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::info;

use crate::config::{AspectRatio, FeedConfig, SlotSpec};
use crate::controller::PlaybackController;
use crate::media::{MediaBackend, PosterLoader, SourceAdapter};
use crate::pool::ResourcePool;
use crate::schedule::{DeferredScheduler, TimerScheduler};
use crate::visibility::{GeometryUpdate, SlotId, VisibilityTracker};

/// Attention-driven playback core for one scroll feed.
pub struct Feed {
    config: FeedConfig,
    pool: Arc<ResourcePool>,
    tracker: Arc<VisibilityTracker>,
    adapter: Option<Arc<dyn SourceAdapter>>,
    poster_loader: Option<Arc<dyn PosterLoader>>,
    slots: Mutex<HashMap<SlotId, Arc<PlaybackController>>>,
    next_slot: AtomicU64,
}

impl Feed {
    /// Starts building a feed around a decode backend.
    pub fn builder(backend: Arc<dyn MediaBackend>) -> FeedBuilder {
        FeedBuilder::new(backend)
    }

    /// Mounts a slot: creates its controller, registers it for visibility
    /// tracking, and kicks off its poster fetch.
    pub fn mount(&self, spec: SlotSpec) -> Arc<PlaybackController> {
        let slot = SlotId::from_raw(self.next_slot.fetch_add(1, Ordering::Relaxed) + 1);
        let controller = PlaybackController::new(
            slot,
            spec,
            Arc::clone(&self.pool),
            self.adapter.clone(),
            self.poster_loader.clone(),
            &self.config,
        );
        self.slots.lock().insert(slot, Arc::clone(&controller));
        self.tracker.register(&controller);
        controller.begin_poster();
        info!(%slot, "slot mounted");
        controller
    }

    /// Unmounts a slot: stops tracking it, cancels its deferred work, and
    /// returns its resource to the pool. Unknown slots are a safe no-op.
    pub fn unmount(&self, slot: SlotId) -> bool {
        let controller = self.slots.lock().remove(&slot);
        match controller {
            Some(controller) => {
                self.tracker.unregister(slot);
                controller.teardown();
                info!(%slot, "slot unmounted");
                true
            }
            None => false,
        }
    }

    /// Looks up the controller for a mounted slot.
    pub fn controller(&self, slot: SlotId) -> Option<Arc<PlaybackController>> {
        self.slots.lock().get(&slot).cloned()
    }

    /// Number of currently mounted slots.
    pub fn mounted_slots(&self) -> usize {
        self.slots.lock().len()
    }

    /// Processes a batch of geometry updates from the host's observation
    /// primitive. Shorthand for `feed.tracker().handle_updates(..)`.
    pub fn handle_updates(&self, updates: &[GeometryUpdate]) {
        self.tracker.handle_updates(updates);
    }

    /// The shared visibility tracker, for hosts that pump it via a channel.
    pub fn tracker(&self) -> Arc<VisibilityTracker> {
        Arc::clone(&self.tracker)
    }

    /// The shared decode resource pool.
    pub fn pool(&self) -> Arc<ResourcePool> {
        Arc::clone(&self.pool)
    }

    /// The feed configuration.
    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    /// Tears down every mounted slot. The feed remains usable; new slots may
    /// be mounted afterwards.
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        info!(slots = drained.len(), "feed shutting down");
        for (slot, controller) in drained {
            self.tracker.unregister(slot);
            controller.teardown();
        }
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feed")
            .field("mounted_slots", &self.mounted_slots())
            .field("pool", &self.pool)
            .finish()
    }
}

/// Builder for [`Feed`].
///
/// Only the decode backend is required; every timing knob defaults to the
/// values in [`crate::config`].
pub struct FeedBuilder {
    backend: Arc<dyn MediaBackend>,
    config: FeedConfig,
    scheduler: Option<Arc<dyn DeferredScheduler>>,
    adapter: Option<Arc<dyn SourceAdapter>>,
    poster_loader: Option<Arc<dyn PosterLoader>>,
}

impl FeedBuilder {
    fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self {
            backend,
            config: FeedConfig::default(),
            scheduler: None,
            adapter: None,
            poster_loader: None,
        }
    }

    /// Overrides the full configuration at once.
    pub fn config(mut self, config: FeedConfig) -> Self {
        self.config = config;
        self
    }

    /// Grace period before an inactive slot's resource is released.
    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.config.grace_period = grace_period;
        self
    }

    /// Timeout bound on deferred decision delivery.
    pub fn delivery_timeout(mut self, delivery_timeout: Duration) -> Self {
        self.config.delivery_timeout = delivery_timeout;
        self
    }

    /// Poster fade-out delay after media ready.
    pub fn poster_fade(mut self, poster_fade: Duration) -> Self {
        self.config.poster_fade = poster_fade;
        self
    }

    /// Maximum idle decode resources retained by the pool.
    pub fn max_idle_resources(mut self, max_idle: usize) -> Self {
        self.config.max_idle_resources = max_idle;
        self
    }

    /// Aspect ratio applied to slots that do not specify one.
    pub fn default_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.config.default_aspect_ratio = ratio;
        self
    }

    /// Installs a custom deferred-work scheduler (e.g. one backed by a real
    /// host idle callback). Defaults to [`TimerScheduler`].
    pub fn scheduler(mut self, scheduler: Arc<dyn DeferredScheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Installs a streaming source adapter.
    pub fn source_adapter(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Installs a poster image loader.
    pub fn poster_loader(mut self, loader: Arc<dyn PosterLoader>) -> Self {
        self.poster_loader = Some(loader);
        self
    }

    /// Builds the feed.
    pub fn build(self) -> Feed {
        let scheduler = self
            .scheduler
            .unwrap_or_else(|| Arc::new(TimerScheduler::new()));
        let pool = Arc::new(ResourcePool::with_max_idle(
            self.backend,
            self.config.max_idle_resources,
        ));
        let tracker = Arc::new(VisibilityTracker::new(
            self.config.clone(),
            scheduler,
        ));
        Feed {
            config: self.config,
            pool,
            tracker,
            adapter: self.adapter,
            poster_loader: self.poster_loader,
            slots: Mutex::new(HashMap::new()),
            next_slot: AtomicU64::new(0),
        }
    }
}
