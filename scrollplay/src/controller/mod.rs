//! Per-slot playback lifecycle controller.
//!
//! One controller exists per mounted slot. It consumes visibility decisions
//! from the [`VisibilityTracker`](crate::visibility::VisibilityTracker),
//! leases decode resources from the [`ResourcePool`](crate::pool::ResourcePool),
//! and debounces the decision stream so rapid scroll bounce does not churn
//! resources.
//!
//! # Lifecycle
//!
//! ```text
//!            decision: play                    decision: pause
//! Dormant ───────────────────► Active ─────────────────────────► PendingCleanup
//!    ▲    acquire + load + play   ▲     pause, start grace timer       │
//!    │                            │                                    │
//!    │                            └────── decision: play ──────────────┤
//!    │                              cancel timer, resume (no acquire)  │
//!    │                                                                 │
//!    └───────────────── grace timer expires: release ──────────────────┘
//! ```
//!
//! Deferred work (decision delivery, grace timers, load/play completions)
//! always re-validates that the slot is still mounted and that it is acting
//! on the latest decision before touching state; stale tasks are no-ops.

mod events;

pub use events::{ListenerId, PlayerEvent};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::{AspectRatio, FeedConfig, SlotSpec};
use crate::controller::events::Listeners;
use crate::error::{ErrorKind, MediaError, PlaybackError};
use crate::media::{MediaHandle, MediaSource, PosterLoader, SourceAdapter, SourceKind};
use crate::pool::{PooledResource, ResourcePool};
use crate::visibility::{Decision, SlotId};

/// Lifecycle state of a slot's controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// No resource held, not playing.
    Dormant,
    /// Resource held, playing or attempting to play.
    Active,
    /// Decided inactive; resource still held while the grace timer runs.
    PendingCleanup,
}

/// Placeholder image lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PosterState {
    /// No poster configured.
    Absent,
    /// Poster fetch in flight.
    Loading,
    /// Poster displayable.
    Ready,
    /// Poster removed (faded out after media ready, or failed to load).
    Removed,
}

struct ControllerInner {
    state: LifecycleState,
    resource: Option<PooledResource>,
    /// Last applied decision (also the playback intent).
    playing: bool,
    /// Last decided visibility, tracked separately so `reset` knows whether
    /// to re-acquire.
    visible: bool,
    loaded: bool,
    adapter_attached: bool,
    poster: PosterState,
}

/// Per-slot playback state machine and host-facing playback API.
pub struct PlaybackController {
    slot: SlotId,
    spec: SlotSpec,
    pool: Arc<ResourcePool>,
    adapter: Option<Arc<dyn SourceAdapter>>,
    poster_loader: Option<Arc<dyn PosterLoader>>,
    grace_period: Duration,
    poster_fade: Duration,
    default_aspect_ratio: AspectRatio,
    listeners: Listeners,
    /// Cancelled exactly once, at teardown; invalidates all deferred work.
    mount: CancellationToken,
    /// Monotonic stamp of the latest scheduled decision.
    decision_gen: AtomicU64,
    /// Monotonic stamp of the latest grace timer; bumping it cancels any
    /// pending timer logically.
    timer_gen: AtomicU64,
    me: Weak<PlaybackController>,
    inner: Mutex<ControllerInner>,
}

impl PlaybackController {
    pub(crate) fn new(
        slot: SlotId,
        spec: SlotSpec,
        pool: Arc<ResourcePool>,
        adapter: Option<Arc<dyn SourceAdapter>>,
        poster_loader: Option<Arc<dyn PosterLoader>>,
        config: &FeedConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            slot,
            spec,
            pool,
            adapter,
            poster_loader,
            grace_period: config.grace_period,
            poster_fade: config.poster_fade,
            default_aspect_ratio: config.default_aspect_ratio,
            listeners: Listeners::new(),
            mount: CancellationToken::new(),
            decision_gen: AtomicU64::new(0),
            timer_gen: AtomicU64::new(0),
            me: me.clone(),
            inner: Mutex::new(ControllerInner {
                state: LifecycleState::Dormant,
                resource: None,
                playing: false,
                visible: false,
                loaded: false,
                adapter_attached: false,
                poster: PosterState::Absent,
            }),
        })
    }

    // =========================================================================
    // Host-facing API
    // =========================================================================

    /// Registers an event listener; returns its removal handle.
    pub fn subscribe(
        &self,
        listener: impl Fn(&PlayerEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.listeners.subscribe(listener)
    }

    /// Removes a listener. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// The slot this controller drives.
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// The inputs this slot was mounted with.
    pub fn spec(&self) -> &SlotSpec {
        &self.spec
    }

    /// Aspect-ratio hint, falling back to the feed default.
    pub fn aspect_ratio(&self) -> AspectRatio {
        self.spec.aspect_ratio.unwrap_or(self.default_aspect_ratio)
    }

    /// Whether the controller currently intends to play (last applied
    /// decision or host `start`).
    pub fn is_playing(&self) -> bool {
        self.inner.lock().playing
    }

    /// Whether the attached media is loaded to first frame.
    pub fn is_loaded(&self) -> bool {
        self.inner.lock().loaded
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    /// Current poster lifecycle state.
    pub fn poster_state(&self) -> PosterState {
        self.inner.lock().poster
    }

    /// Starts playback, lazily acquiring a decode resource if none is held.
    ///
    /// Idempotent: calling on an already-playing controller re-runs the play
    /// attempt on the held resource. The returned future resolves with the
    /// outcome of the play attempt; platform-level construction failures
    /// surface here rather than being swallowed.
    pub async fn start(&self) -> Result<(), PlaybackError> {
        if self.mount.is_cancelled() {
            return Err(PlaybackError::TornDown);
        }
        debug!(slot = %self.slot, "host requested start");
        self.activate(None).await
    }

    /// Pauses playback without releasing the resource. Safe no-op when
    /// nothing is playing.
    pub fn stop(&self) {
        let handle = {
            let mut inner = self.inner.lock();
            if !inner.playing {
                return;
            }
            inner.playing = false;
            inner.resource.as_ref().map(|r| r.handle())
        };
        if let Some(handle) = &handle {
            handle.pause();
        }
        debug!(slot = %self.slot, "host requested stop");
        self.emit(PlayerEvent::Pause);
    }

    /// Force-releases the decode resource, then re-acquires and resumes if
    /// the slot is currently decided visible.
    pub async fn reset(&self) -> Result<(), PlaybackError> {
        if self.mount.is_cancelled() {
            return Err(PlaybackError::TornDown);
        }
        debug!(slot = %self.slot, "host requested reset");
        self.force_dormant();
        let visible = self.inner.lock().visible;
        if visible {
            self.activate(None).await
        } else {
            Ok(())
        }
    }

    // =========================================================================
    // Tracker-facing API
    // =========================================================================

    /// Stamps a new decision generation. The tracker calls this when
    /// scheduling a delivery; any previously scheduled delivery becomes
    /// stale.
    pub(crate) fn next_decision_generation(&self) -> u64 {
        self.decision_gen.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Token invalidated at teardown; deferred work is gated on it.
    pub(crate) fn mount_token(&self) -> CancellationToken {
        self.mount.clone()
    }

    /// True once the slot has been unmounted.
    pub(crate) fn is_torn_down(&self) -> bool {
        self.mount.is_cancelled()
    }

    /// Applies a visibility decision.
    ///
    /// Tolerates redundant decisions (same value as the current intent) and
    /// drops deliveries that are stale or arrive after teardown.
    pub(crate) fn apply_decision(&self, decision: Decision, generation: u64) {
        if self.mount.is_cancelled() {
            trace!(slot = %self.slot, "dropping decision for unmounted slot");
            return;
        }
        if generation != self.decision_gen.load(Ordering::SeqCst) {
            trace!(slot = %self.slot, generation, "dropping superseded decision");
            return;
        }

        enum Action {
            None,
            Activate(u64),
            Resume(Arc<dyn MediaHandle>),
            Pause(Option<Arc<dyn MediaHandle>>),
        }

        let action = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            if decision.should_play == inner.playing {
                return;
            }
            inner.visible = decision.should_play;

            if decision.should_play {
                // Re-entry cancels any pending cleanup.
                self.timer_gen.fetch_add(1, Ordering::SeqCst);
                inner.playing = true;
                match &inner.resource {
                    // A held resource means the handle is paused, whether by
                    // a pending cleanup or a host stop; either way it must be
                    // told to play again.
                    Some(resource) => {
                        inner.state = LifecycleState::Active;
                        Action::Resume(resource.handle())
                    }
                    None => Action::Activate(generation),
                }
            } else {
                inner.playing = false;
                if inner.state == LifecycleState::Active {
                    inner.state = LifecycleState::PendingCleanup;
                    Action::Pause(inner.resource.as_ref().map(|r| r.handle()))
                } else {
                    Action::None
                }
            }
        };

        debug!(
            slot = %self.slot,
            visible = decision.should_play,
            ratio = decision.ratio,
            occupancy = decision.occupancy,
            "visibility decision changed"
        );
        self.emit(PlayerEvent::VisibilityChange {
            visible: decision.should_play,
            ratio: decision.ratio,
            occupancy: decision.occupancy,
        });

        match action {
            Action::None => {}
            Action::Activate(generation) => self.spawn_activation(Some(generation)),
            Action::Resume(handle) => self.spawn_resume(handle),
            Action::Pause(handle) => {
                if let Some(handle) = &handle {
                    handle.pause();
                }
                self.emit(PlayerEvent::Pause);
                self.spawn_grace_timer();
            }
        }
    }

    /// Tears the controller down: cancels deferred work and releases any
    /// held resource. Called on unmount; idempotent.
    pub(crate) fn teardown(&self) {
        if self.mount.is_cancelled() {
            return;
        }
        self.mount.cancel();
        debug!(slot = %self.slot, "controller torn down");
        self.force_dormant();
    }

    /// Kicks off the poster fetch, if the slot has one configured and a
    /// loader is installed.
    pub(crate) fn begin_poster(&self) {
        let (url, loader) = match (&self.spec.poster, &self.poster_loader) {
            (Some(url), Some(loader)) => (url.clone(), Arc::clone(loader)),
            _ => return,
        };
        self.inner.lock().poster = PosterState::Loading;

        let Some(this) = self.me.upgrade() else {
            return;
        };
        let token = self.mount.clone();
        tokio::spawn(async move {
            let result = loader.load(&url).await;
            if token.is_cancelled() {
                return;
            }
            match result {
                Ok(()) => {
                    let mut inner = this.inner.lock();
                    if inner.poster == PosterState::Loading {
                        inner.poster = PosterState::Ready;
                    }
                }
                Err(err) => {
                    this.inner.lock().poster = PosterState::Removed;
                    warn!(slot = %this.slot, error = %err, "poster load failed");
                    this.emit(PlayerEvent::Error {
                        kind: ErrorKind::Poster,
                        message: format!("failed to load poster {url}: {err}"),
                    });
                }
            }
        });
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Acquires (or reuses) the decode resource, loads the source, and
    /// starts playback. `generation` is the decision stamp for
    /// decision-driven activation; `None` for host-driven calls.
    async fn activate(&self, generation: Option<u64>) -> Result<(), PlaybackError> {
        if self.mount.is_cancelled() {
            return Err(PlaybackError::TornDown);
        }

        let source = match self.spec.source.clone() {
            Some(source) => source,
            None => {
                self.force_dormant();
                self.emit(PlayerEvent::Error {
                    kind: ErrorKind::Media,
                    message: "no media source configured".into(),
                });
                return Err(PlaybackError::MissingSource);
            }
        };

        let existing = {
            let mut inner = self.inner.lock();
            if self.is_stale(generation) {
                return Ok(());
            }
            if inner.resource.is_some() {
                // Re-entry with a held resource: cancel pending cleanup.
                self.timer_gen.fetch_add(1, Ordering::SeqCst);
                inner.state = LifecycleState::Active;
            }
            inner.resource.as_ref().map(|r| r.handle())
        };

        let (handle, newly_acquired) = match existing {
            Some(handle) => (handle, false),
            None => {
                let resource = match self.pool.acquire() {
                    Ok(resource) => resource,
                    Err(err) => {
                        warn!(slot = %self.slot, error = %err, "decode resource construction failed");
                        self.force_dormant();
                        self.emit(PlayerEvent::Error {
                            kind: ErrorKind::Media,
                            message: err.to_string(),
                        });
                        return Err(err);
                    }
                };
                let handle = resource.handle();
                let mut inner = self.inner.lock();
                if self.mount.is_cancelled() || self.is_stale(generation) {
                    drop(inner);
                    self.pool.release(resource);
                    return Ok(());
                }
                inner.state = LifecycleState::Active;
                inner.resource = Some(resource);
                (handle, true)
            }
        };

        if newly_acquired {
            if let Err(err) = self.attach_source(handle.as_ref(), &source) {
                self.report_media_error(&err);
                self.force_dormant();
                return Err(err.into());
            }
        }

        let already_loaded = self.inner.lock().loaded;
        if !already_loaded {
            match handle.load().await {
                Ok(()) => {
                    if self.mount.is_cancelled() {
                        return Err(PlaybackError::TornDown);
                    }
                    {
                        // The resource may have been force-released while the
                        // load was in flight; `loaded` implies a held resource.
                        let mut inner = self.inner.lock();
                        if inner.resource.is_none() {
                            return Ok(());
                        }
                        inner.loaded = true;
                    }
                    debug!(slot = %self.slot, "media ready");
                    self.emit(PlayerEvent::MediaReady);
                    self.spawn_poster_fade();
                }
                Err(err) => {
                    self.report_media_error(&err);
                    self.force_dormant();
                    return Err(err.into());
                }
            }
        }

        // A newer decision, host stop, or teardown may have landed while the
        // load was in flight.
        {
            let inner = self.inner.lock();
            let intent = generation.is_none() || inner.playing;
            if self.mount.is_cancelled()
                || self.is_stale(generation)
                || inner.state != LifecycleState::Active
                || !intent
            {
                return Ok(());
            }
        }

        match handle.play().await {
            Ok(()) => {
                let mut inner = self.inner.lock();
                if inner.state == LifecycleState::Active {
                    inner.playing = true;
                    drop(inner);
                    self.emit(PlayerEvent::Play);
                }
                Ok(())
            }
            Err(err) => {
                self.report_media_error(&err);
                self.force_dormant();
                Err(err.into())
            }
        }
    }

    fn spawn_activation(&self, generation: Option<u64>) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = this.activate(generation).await {
                debug!(slot = %this.slot, error = %err, "activation attempt failed");
            }
        });
    }

    fn spawn_resume(&self, handle: Arc<dyn MediaHandle>) {
        let Some(this) = self.me.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            if this.mount.is_cancelled() {
                return;
            }
            match handle.play().await {
                Ok(()) => {
                    let still_intended = {
                        let inner = this.inner.lock();
                        inner.state == LifecycleState::Active && inner.playing
                    };
                    if still_intended {
                        this.emit(PlayerEvent::Play);
                    }
                }
                Err(err) => {
                    this.report_media_error(&err);
                    this.force_dormant();
                }
            }
        });
    }

    fn spawn_grace_timer(&self) {
        let generation = self.timer_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let Some(this) = self.me.upgrade() else {
            return;
        };
        let token = self.mount.clone();
        let grace = self.grace_period;
        trace!(slot = %self.slot, grace_ms = grace.as_millis() as u64, "cleanup scheduled");
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(grace) => this.finish_cleanup(generation),
            }
        });
    }

    /// Completes the grace-period cleanup, unless the timer was superseded
    /// by re-entry or the state moved on.
    fn finish_cleanup(&self, generation: u64) {
        if self.timer_gen.load(Ordering::SeqCst) != generation {
            trace!(slot = %self.slot, "grace timer superseded");
            return;
        }
        let (resource, adapter_attached) = {
            let mut inner = self.inner.lock();
            if inner.state != LifecycleState::PendingCleanup {
                return;
            }
            inner.state = LifecycleState::Dormant;
            inner.playing = false;
            inner.loaded = false;
            let attached = inner.adapter_attached;
            inner.adapter_attached = false;
            (inner.resource.take(), attached)
        };
        if let Some(resource) = resource {
            debug!(slot = %self.slot, resource = %resource.id(), "grace period expired, releasing resource");
            self.detach_adapter(adapter_attached, &resource);
            self.pool.release(resource);
        }
    }

    /// Reverts to `Dormant`, releasing any held resource. Emits nothing;
    /// callers report errors where appropriate.
    fn force_dormant(&self) {
        self.timer_gen.fetch_add(1, Ordering::SeqCst);
        let (resource, adapter_attached) = {
            let mut inner = self.inner.lock();
            inner.state = LifecycleState::Dormant;
            inner.playing = false;
            inner.loaded = false;
            let attached = inner.adapter_attached;
            inner.adapter_attached = false;
            (inner.resource.take(), attached)
        };
        if let Some(resource) = resource {
            debug!(slot = %self.slot, resource = %resource.id(), "releasing decode resource");
            self.detach_adapter(adapter_attached, &resource);
            self.pool.release(resource);
        }
    }

    fn attach_source(&self, handle: &dyn MediaHandle, source: &MediaSource) -> Result<(), MediaError> {
        match (&self.adapter, source.kind()) {
            (Some(adapter), SourceKind::Streaming) => {
                adapter.attach(handle, source)?;
                self.inner.lock().adapter_attached = true;
                Ok(())
            }
            // Streaming without an adapter is attached directly; hosts with
            // native streaming decode handle it.
            _ => handle.attach(source),
        }
    }

    fn detach_adapter(&self, attached: bool, resource: &PooledResource) {
        if !attached {
            return;
        }
        if let Some(adapter) = &self.adapter {
            let handle = resource.handle();
            adapter.detach(handle.as_ref());
        }
    }

    fn spawn_poster_fade(&self) {
        let fading = {
            let inner = self.inner.lock();
            matches!(inner.poster, PosterState::Loading | PosterState::Ready)
        };
        if !fading {
            return;
        }
        let Some(this) = self.me.upgrade() else {
            return;
        };
        let token = self.mount.clone();
        let fade = self.poster_fade;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(fade) => {
                    let mut inner = this.inner.lock();
                    if inner.poster != PosterState::Absent {
                        inner.poster = PosterState::Removed;
                    }
                }
            }
        });
    }

    fn report_media_error(&self, err: &MediaError) {
        warn!(slot = %self.slot, kind = %err.error_kind(), error = %err, "media failure");
        self.emit(PlayerEvent::Error {
            kind: err.error_kind(),
            message: err.to_string(),
        });
    }

    fn emit(&self, event: PlayerEvent) {
        trace!(slot = %self.slot, event = %event, "emitting event");
        self.listeners.emit(&event);
    }

    fn is_stale(&self, generation: Option<u64>) -> bool {
        match generation {
            Some(generation) => generation != self.decision_gen.load(Ordering::SeqCst),
            None => false,
        }
    }
}

impl std::fmt::Debug for PlaybackController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("PlaybackController")
            .field("slot", &self.slot)
            .field("state", &inner.state)
            .field("playing", &inner.playing)
            .field("loaded", &inner.loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{BoxFuture, StubBackend};
    use std::sync::atomic::AtomicUsize;

    fn recorder(
        ctrl: &PlaybackController,
    ) -> Arc<Mutex<Vec<PlayerEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        ctrl.subscribe(move |event| sink.lock().push(event.clone()));
        events
    }

    fn names(events: &Mutex<Vec<PlayerEvent>>) -> Vec<&'static str> {
        events.lock().iter().map(|e| e.name()).collect()
    }

    fn make_controller(
        backend: Arc<StubBackend>,
        spec: SlotSpec,
    ) -> (Arc<PlaybackController>, Arc<ResourcePool>) {
        let pool = Arc::new(ResourcePool::new(backend));
        let ctrl = PlaybackController::new(
            SlotId::from_raw(1),
            spec,
            Arc::clone(&pool),
            None,
            None,
            &FeedConfig::default(),
        );
        (ctrl, pool)
    }

    fn video_spec() -> SlotSpec {
        SlotSpec::new().with_source(MediaSource::new("https://cdn.example.com/clip.mp4"))
    }

    fn decision(should_play: bool) -> Decision {
        Decision {
            should_play,
            ratio: if should_play { 0.8 } else { 0.2 },
            occupancy: 0.4,
        }
    }

    fn apply(ctrl: &PlaybackController, should_play: bool) {
        let generation = ctrl.next_decision_generation();
        ctrl.apply_decision(decision(should_play), generation);
    }

    async fn settle() {
        // Paused-clock runtimes auto-advance past this once spawned work is
        // drained, so this deterministically runs all pending tasks.
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_on_play_decision() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());
        let events = recorder(&ctrl);

        apply(&ctrl, true);
        settle().await;

        assert_eq!(ctrl.state(), LifecycleState::Active);
        assert!(ctrl.is_playing());
        assert!(ctrl.is_loaded());
        assert_eq!(pool.active_size(), 1);

        let handle = backend.handle(0).unwrap();
        assert!(handle.is_playing());
        assert_eq!(
            handle.attached_source().unwrap().url(),
            "https://cdn.example.com/clip.mp4"
        );
        assert_eq!(
            names(&events),
            vec!["visibility-change", "media-ready", "play"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounce_within_grace_keeps_resource() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        apply(&ctrl, false);
        tokio::time::sleep(Duration::from_millis(100)).await;
        apply(&ctrl, true);
        tokio::time::sleep(Duration::from_millis(300)).await;

        // The grace timer fired long ago but was superseded by re-entry.
        assert_eq!(ctrl.state(), LifecycleState::Active);
        assert!(ctrl.is_playing());
        assert_eq!(pool.stats().created, 1, "bounce must not construct");
        assert_eq!(pool.idle_size(), 0);
        assert_eq!(pool.active_size(), 1);

        let handle = backend.handle(0).unwrap();
        assert_eq!(handle.reset_count(), 0);
        assert_eq!(handle.play_count(), 2); // initial + resume
    }

    #[tokio::test(start_paused = true)]
    async fn test_sustained_inactive_releases_after_grace() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        apply(&ctrl, false);
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert!(!ctrl.is_playing());
        assert!(!ctrl.is_loaded());
        assert_eq!(pool.idle_size(), 1);
        assert_eq!(pool.active_size(), 0);
        assert_eq!(backend.handle(0).unwrap().reset_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_is_immediate_release_is_not() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        apply(&ctrl, false);

        // Before the grace period: paused but resource retained.
        let handle = backend.handle(0).unwrap();
        assert!(!handle.is_playing());
        assert_eq!(ctrl.state(), LifecycleState::PendingCleanup);
        assert_eq!(pool.active_size(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_redundant_decisions_are_noops() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        let plays_before = backend.handle(0).unwrap().play_count();

        apply(&ctrl, true);
        settle().await;
        apply(&ctrl, true);
        settle().await;

        assert_eq!(pool.stats().created, 1);
        assert_eq!(backend.handle(0).unwrap().play_count(), plays_before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_decision_is_dropped() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        let stale = ctrl.next_decision_generation();
        let _newer = ctrl.next_decision_generation();
        ctrl.apply_decision(decision(true), stale);
        settle().await;

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert_eq!(pool.stats().created, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_media_load_failure_forces_dormant() {
        let backend = Arc::new(StubBackend::failing_load());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());
        let events = recorder(&ctrl);

        apply(&ctrl, true);
        settle().await;

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert!(!ctrl.is_loaded());
        assert_eq!(pool.idle_size(), 1, "failed resource returns to the pool");

        let recorded = events.lock();
        let error = recorded
            .iter()
            .find_map(|e| match e {
                PlayerEvent::Error { kind, message } => Some((*kind, message.clone())),
                _ => None,
            })
            .expect("error event emitted");
        assert_eq!(error.0, ErrorKind::Media);
        assert!(error.1.contains("network error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_construction_failure_rejects_start() {
        let backend = Arc::new(StubBackend::failing_create());
        let (ctrl, _pool) = make_controller(backend, video_spec());

        let result = ctrl.start().await;
        assert!(matches!(result, Err(PlaybackError::Backend(_))));
        assert_eq!(ctrl.state(), LifecycleState::Dormant);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_without_source_is_rejected() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, _pool) = make_controller(backend, SlotSpec::new());

        let result = ctrl.start().await;
        assert!(matches!(result, Err(PlaybackError::MissingSource)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_on_dormant_is_noop() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(backend, video_spec());
        let events = recorder(&ctrl);

        ctrl.stop();
        ctrl.stop();

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert_eq!(pool.stats().created, 0);
        assert!(events.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_pauses_without_release() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        ctrl.stop();

        assert!(!ctrl.is_playing());
        assert_eq!(ctrl.state(), LifecycleState::Active);
        assert_eq!(pool.active_size(), 1);
        assert!(!backend.handle(0).unwrap().is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_resumes_after_stop() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        ctrl.stop();
        ctrl.start().await.unwrap();

        assert!(ctrl.is_playing());
        assert!(backend.handle(0).unwrap().is_playing());
        assert_eq!(pool.stats().created, 1, "start reuses the held resource");
    }

    #[tokio::test(start_paused = true)]
    async fn test_decision_resumes_after_host_stop() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());
        let events = recorder(&ctrl);

        apply(&ctrl, true);
        settle().await;
        ctrl.stop();
        assert!(!backend.handle(0).unwrap().is_playing());

        // A play decision on a stopped-but-Active controller must drive the
        // handle, not just flip the intent flag.
        apply(&ctrl, true);
        settle().await;

        assert!(ctrl.is_playing());
        assert!(backend.handle(0).unwrap().is_playing());
        assert_eq!(pool.stats().created, 1, "resume must reuse the held resource");
        assert_eq!(names(&events).last(), Some(&"play"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_reacquires_when_visible() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(Arc::clone(&backend), video_spec());

        apply(&ctrl, true);
        settle().await;
        ctrl.reset().await.unwrap();

        assert_eq!(ctrl.state(), LifecycleState::Active);
        assert!(ctrl.is_playing());
        // Release then re-acquire: the same handle comes back from the pool.
        assert_eq!(pool.stats().reused, 1);
        assert_eq!(backend.created_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_stays_dormant_when_hidden() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(backend, video_spec());

        apply(&ctrl, true);
        settle().await;
        apply(&ctrl, false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        ctrl.reset().await.unwrap();

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert_eq!(pool.active_size(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_releases_and_blocks_further_work() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(backend, video_spec());

        apply(&ctrl, true);
        settle().await;
        ctrl.teardown();
        ctrl.teardown(); // idempotent

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert_eq!(pool.idle_size(), 1);

        apply(&ctrl, true);
        settle().await;
        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert!(matches!(ctrl.start().await, Err(PlaybackError::TornDown)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_during_grace_releases_immediately() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = make_controller(backend, video_spec());

        apply(&ctrl, true);
        settle().await;
        apply(&ctrl, false);
        ctrl.teardown();

        assert_eq!(pool.idle_size(), 1);
        assert_eq!(pool.active_size(), 0);

        // The (cancelled) grace timer firing later must not double-release.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.idle_size(), 1);
    }

    // -------------------------------------------------------------------------
    // Source adapter
    // -------------------------------------------------------------------------

    struct RecordingAdapter {
        attaches: AtomicUsize,
        detaches: AtomicUsize,
        fail: bool,
    }

    impl RecordingAdapter {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                attaches: AtomicUsize::new(0),
                detaches: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl SourceAdapter for RecordingAdapter {
        fn attach(&self, _handle: &dyn MediaHandle, source: &MediaSource) -> Result<(), MediaError> {
            self.attaches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MediaError::Adapter(format!(
                    "manifest load failed: {}",
                    source.url()
                )));
            }
            Ok(())
        }

        fn detach(&self, _handle: &dyn MediaHandle) {
            self.detaches.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn streaming_controller(
        adapter: Arc<RecordingAdapter>,
        backend: Arc<StubBackend>,
    ) -> (Arc<PlaybackController>, Arc<ResourcePool>) {
        let pool = Arc::new(ResourcePool::new(backend));
        let spec =
            SlotSpec::new().with_source(MediaSource::new("https://cdn.example.com/live.m3u8"));
        let ctrl = PlaybackController::new(
            SlotId::from_raw(1),
            spec,
            Arc::clone(&pool),
            Some(adapter),
            None,
            &FeedConfig::default(),
        );
        (ctrl, pool)
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_source_goes_through_adapter() {
        let adapter = RecordingAdapter::new(false);
        let backend = Arc::new(StubBackend::new());
        let (ctrl, _pool) = streaming_controller(Arc::clone(&adapter), Arc::clone(&backend));

        apply(&ctrl, true);
        settle().await;

        assert_eq!(adapter.attaches.load(Ordering::SeqCst), 1);
        // Direct attachment is bypassed when the adapter handles the source.
        assert!(backend.handle(0).unwrap().attached_source().is_none());

        apply(&ctrl, false);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(adapter.detaches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_adapter_failure_reported_as_source_adapter() {
        let adapter = RecordingAdapter::new(true);
        let backend = Arc::new(StubBackend::new());
        let (ctrl, pool) = streaming_controller(adapter, backend);
        let events = recorder(&ctrl);

        apply(&ctrl, true);
        settle().await;

        assert_eq!(ctrl.state(), LifecycleState::Dormant);
        assert_eq!(pool.idle_size(), 1);
        assert!(events.lock().iter().any(|e| matches!(
            e,
            PlayerEvent::Error {
                kind: ErrorKind::SourceAdapter,
                ..
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_without_adapter_attaches_directly() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, _pool) = make_controller(
            Arc::clone(&backend),
            SlotSpec::new().with_source(MediaSource::new("https://cdn.example.com/live.m3u8")),
        );

        apply(&ctrl, true);
        settle().await;

        let attached = backend.handle(0).unwrap().attached_source().unwrap();
        assert_eq!(attached.url(), "https://cdn.example.com/live.m3u8");
    }

    // -------------------------------------------------------------------------
    // Poster
    // -------------------------------------------------------------------------

    struct StubPosterLoader {
        fail: bool,
    }

    impl PosterLoader for StubPosterLoader {
        fn load(&self, url: &str) -> BoxFuture<'_, Result<(), MediaError>> {
            let fail = self.fail;
            let url = url.to_string();
            Box::pin(async move {
                if fail {
                    Err(MediaError::Network(format!("poster fetch failed: {url}")))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn poster_controller(fail: bool) -> (Arc<PlaybackController>, Arc<StubBackend>) {
        let backend = Arc::new(StubBackend::new());
        let pool = Arc::new(ResourcePool::new(
            Arc::clone(&backend) as Arc<dyn crate::media::MediaBackend>
        ));
        let spec = video_spec().with_poster("https://cdn.example.com/poster.jpg");
        let ctrl = PlaybackController::new(
            SlotId::from_raw(1),
            spec,
            pool,
            None,
            Some(Arc::new(StubPosterLoader { fail })),
            &FeedConfig::default(),
        );
        (ctrl, backend)
    }

    #[tokio::test(start_paused = true)]
    async fn test_poster_fades_out_after_media_ready() {
        let (ctrl, _backend) = poster_controller(false);

        ctrl.begin_poster();
        settle().await;
        assert_eq!(ctrl.poster_state(), PosterState::Ready);

        apply(&ctrl, true);
        settle().await;
        // Still visible immediately after media ready.
        assert_eq!(ctrl.poster_state(), PosterState::Ready);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(ctrl.poster_state(), PosterState::Removed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poster_failure_is_nonfatal() {
        let (ctrl, _backend) = poster_controller(true);
        let events = recorder(&ctrl);

        ctrl.begin_poster();
        settle().await;

        assert_eq!(ctrl.poster_state(), PosterState::Removed);
        assert!(events.lock().iter().any(|e| matches!(
            e,
            PlayerEvent::Error {
                kind: ErrorKind::Poster,
                ..
            }
        )));

        // Playback is unaffected.
        apply(&ctrl, true);
        settle().await;
        assert!(ctrl.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aspect_ratio_falls_back_to_default() {
        let backend = Arc::new(StubBackend::new());
        let (ctrl, _pool) = make_controller(Arc::clone(&backend), video_spec());
        assert_eq!(ctrl.aspect_ratio(), AspectRatio::new(9, 16));

        let (ctrl, _pool) = make_controller(
            backend,
            video_spec().with_aspect_ratio(AspectRatio::new(4, 3)),
        );
        assert_eq!(ctrl.aspect_ratio(), AspectRatio::new(4, 3));
    }
}
