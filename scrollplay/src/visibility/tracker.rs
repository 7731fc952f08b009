//! Registry mapping slots to controllers and the geometry event loop.
//!
//! One tracker is shared by every slot in a feed. The host feeds it batches
//! of geometry samples (from whatever observation primitive it has); the
//! tracker derives a [`Decision`] per sample, suppresses no-change decisions,
//! and hands the rest to a [`DeferredScheduler`] for low-priority delivery to
//! the owning controller.
//!
//! Controllers are held as `Weak` references: the feed owns them, and a slot
//! unmounted mid-batch simply fails to upgrade and is skipped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::config::FeedConfig;
use crate::controller::PlaybackController;
use crate::schedule::DeferredScheduler;
use crate::visibility::decision::GeometrySample;

/// Identity of a mounted slot, unique for the life of the feed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(u64);

impl SlotId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the numeric identity.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot-{}", self.0)
    }
}

/// One geometry measurement addressed to a slot.
#[derive(Clone, Copy, Debug)]
pub struct GeometryUpdate {
    /// The slot the measurement is for.
    pub slot: SlotId,
    /// The measurement itself.
    pub sample: GeometrySample,
}

impl GeometryUpdate {
    /// Creates an update.
    pub fn new(slot: SlotId, sample: GeometrySample) -> Self {
        Self { slot, sample }
    }
}

/// Shared visibility tracker for one feed.
///
/// Geometry batches can be pushed synchronously with
/// [`handle_updates`](Self::handle_updates) or pumped through a channel with
/// [`run`](Self::run).
pub struct VisibilityTracker {
    config: FeedConfig,
    scheduler: Arc<dyn DeferredScheduler>,
    registry: Mutex<HashMap<SlotId, Weak<PlaybackController>>>,
}

impl VisibilityTracker {
    pub(crate) fn new(config: FeedConfig, scheduler: Arc<dyn DeferredScheduler>) -> Self {
        Self {
            config,
            scheduler,
            registry: Mutex::new(HashMap::new()),
        }
    }

    /// Intersection ratios at which the host's geometry primitive should
    /// report, so decisions flip near the boundary without polling.
    pub fn thresholds(&self) -> &[f64] {
        &self.config.thresholds
    }

    /// Registers a controller for geometry updates. Registering the same
    /// slot again replaces the previous entry.
    pub fn register(&self, controller: &Arc<PlaybackController>) {
        let slot = controller.slot();
        let previous = self
            .registry
            .lock()
            .insert(slot, Arc::downgrade(controller));
        if previous.is_some() {
            debug!(%slot, "re-registered slot with tracker");
        } else {
            trace!(%slot, "registered slot with tracker");
        }
    }

    /// Removes a slot from tracking. Unknown slots are a safe no-op.
    pub fn unregister(&self, slot: SlotId) -> bool {
        let removed = self.registry.lock().remove(&slot).is_some();
        if removed {
            trace!(%slot, "unregistered slot from tracker");
        }
        removed
    }

    /// Number of currently tracked slots (dead entries included until their
    /// next update prunes them).
    pub fn tracked_slots(&self) -> usize {
        self.registry.lock().len()
    }

    /// Processes one batch of geometry updates.
    ///
    /// For each update: derive the decision, drop it if it matches the
    /// slot's current playback intent, otherwise schedule delivery to the
    /// controller. Delivery is deferred to low-priority execution bounded by
    /// the configured timeout; a slot torn down before delivery drops the
    /// decision. Entries whose controller is gone are pruned.
    pub fn handle_updates(&self, updates: &[GeometryUpdate]) {
        for update in updates {
            let controller = {
                let mut registry = self.registry.lock();
                match registry.get(&update.slot) {
                    Some(weak) => match weak.upgrade() {
                        Some(controller) => controller,
                        None => {
                            registry.remove(&update.slot);
                            continue;
                        }
                    },
                    None => continue,
                }
            };
            if controller.is_torn_down() {
                continue;
            }

            let decision = update.sample.decide();
            if decision.should_play == controller.is_playing() {
                trace!(slot = %update.slot, "decision unchanged, suppressed");
                continue;
            }

            // Stamp before scheduling: a later update for the same slot
            // supersedes this delivery even if both are still queued.
            let generation = controller.next_decision_generation();
            trace!(
                slot = %update.slot,
                should_play = decision.should_play,
                generation,
                "scheduling decision delivery"
            );
            let cancel = controller.mount_token();
            self.scheduler.defer(
                self.config.delivery_timeout,
                cancel,
                Box::new(move || controller.apply_decision(decision, generation)),
            );
        }
    }

    /// Pumps geometry batches from a channel until it closes or `shutdown`
    /// is cancelled.
    pub async fn run(
        self: Arc<Self>,
        mut updates: mpsc::UnboundedReceiver<Vec<GeometryUpdate>>,
        shutdown: CancellationToken,
    ) {
        info!("visibility tracker started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = updates.recv() => match batch {
                    Some(batch) => self.handle_updates(&batch),
                    None => break,
                },
            }
        }
        info!("visibility tracker stopped");
    }
}

impl fmt::Debug for VisibilityTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VisibilityTracker")
            .field("tracked_slots", &self.tracked_slots())
            .finish()
    }
}
