//! Collaborator interfaces for the decode/playback platform.
//!
//! The core never implements a decode pipeline itself. It drives one through
//! the [`MediaHandle`] trait, constructs handles through the [`MediaBackend`]
//! factory, and delegates streaming protocol negotiation to an optional
//! [`SourceAdapter`]. Placeholder images are fetched through [`PosterLoader`].
//!
//! # Dyn Compatibility
//!
//! Async trait methods use `Pin<Box<dyn Future>>` (the [`BoxFuture`] alias)
//! so implementations can be held behind `Arc<dyn ...>` trait objects.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::MediaError;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// =============================================================================
// Media Source
// =============================================================================

/// Classification of a media source locator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// Directly playable by the decode pipeline.
    Direct,
    /// Requires streaming protocol negotiation (e.g. an HLS playlist).
    Streaming,
}

/// Locator for the media a slot should play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaSource {
    url: String,
}

impl MediaSource {
    /// Creates a source from a locator string.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Returns the locator string.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Classifies the source by its locator.
    ///
    /// A locator containing `.m3u8` is a streaming playlist; everything else
    /// is handed to the decode pipeline directly.
    pub fn kind(&self) -> SourceKind {
        if self.url.contains(".m3u8") {
            SourceKind::Streaming
        } else {
            SourceKind::Direct
        }
    }
}

// =============================================================================
// Decode/Playback Handle
// =============================================================================

/// A decode/playback handle: the expensive object responsible for decoding
/// and rendering one media stream at a time.
///
/// Handles are constructed by a [`MediaBackend`], pooled by
/// [`ResourcePool`](crate::pool::ResourcePool), and driven by one
/// [`PlaybackController`](crate::controller::PlaybackController) at a time.
///
/// Implementations use interior mutability; all methods take `&self` so the
/// handle can be shared as `Arc<dyn MediaHandle>` between the pool and the
/// async load/play tasks.
pub trait MediaHandle: Send + Sync {
    /// Attaches a media source to the pipeline. Does not start loading.
    fn attach(&self, source: &MediaSource) -> Result<(), MediaError>;

    /// Loads the attached source up to first-frame availability.
    ///
    /// Resolves once the first frame is decodable. Classify failures using
    /// the [`MediaError`] variants.
    fn load(&self) -> BoxFuture<'_, Result<(), MediaError>>;

    /// Begins or resumes playback.
    fn play(&self) -> BoxFuture<'_, Result<(), MediaError>>;

    /// Pauses playback, keeping the decode pipeline intact.
    fn pause(&self);

    /// Hard reset: detaches the source and forces the underlying buffers to
    /// be released, so an idle handle retains no media memory.
    fn reset(&self);

    /// Returns true if the attached source is loaded to first frame.
    fn is_loaded(&self) -> bool;
}

/// Factory for decode/playback handles.
///
/// Construction is assumed to succeed under normal operation; an `Err` here
/// is a platform-level failure and is propagated, not swallowed.
pub trait MediaBackend: Send + Sync {
    /// Constructs a fresh decode/playback handle.
    fn create(&self) -> Result<Arc<dyn MediaHandle>, MediaError>;
}

// =============================================================================
// Optional Collaborators
// =============================================================================

/// Streaming protocol negotiation delegate.
///
/// When a slot's source is [`SourceKind::Streaming`] and an adapter is
/// installed, the controller delegates attachment to it instead of calling
/// [`MediaHandle::attach`] directly. Without an adapter the source is
/// attached directly (hosts with native streaming decode handle it).
pub trait SourceAdapter: Send + Sync {
    /// Negotiates and attaches the streaming source to the handle.
    fn attach(&self, handle: &dyn MediaHandle, source: &MediaSource) -> Result<(), MediaError>;

    /// Detaches the adapter from the handle before the handle is recycled.
    fn detach(&self, handle: &dyn MediaHandle);
}

/// Placeholder image fetch delegate.
///
/// Poster loading is fire-and-forget from the controller's point of view;
/// failures are reported as non-fatal `poster` errors.
pub trait PosterLoader: Send + Sync {
    /// Fetches the poster image at `url`, resolving when it is displayable.
    fn load(&self, url: &str) -> BoxFuture<'_, Result<(), MediaError>>;
}

// =============================================================================
// Stub Implementations
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

/// Headless [`MediaHandle`] for tests and hosts without a real pipeline.
///
/// Records every operation in counters and exposes the attached source, so
/// tests can assert on pipeline interactions.
pub struct StubHandle {
    attached: Mutex<Option<MediaSource>>,
    loaded: AtomicBool,
    playing: AtomicBool,
    loads: AtomicU64,
    plays: AtomicU64,
    pauses: AtomicU64,
    resets: AtomicU64,
    fail_load: bool,
    fail_play: bool,
}

impl StubHandle {
    /// Creates a handle whose operations all succeed.
    pub fn new() -> Self {
        Self::with_failures(false, false)
    }

    fn with_failures(fail_load: bool, fail_play: bool) -> Self {
        Self {
            attached: Mutex::new(None),
            loaded: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            loads: AtomicU64::new(0),
            plays: AtomicU64::new(0),
            pauses: AtomicU64::new(0),
            resets: AtomicU64::new(0),
            fail_load,
            fail_play,
        }
    }

    /// Returns the currently attached source, if any.
    pub fn attached_source(&self) -> Option<MediaSource> {
        self.attached.lock().clone()
    }

    /// Returns true if playback is currently running.
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    /// Number of completed `load` calls (including failed ones).
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of `play` calls.
    pub fn play_count(&self) -> u64 {
        self.plays.load(Ordering::SeqCst)
    }

    /// Number of `pause` calls.
    pub fn pause_count(&self) -> u64 {
        self.pauses.load(Ordering::SeqCst)
    }

    /// Number of `reset` calls.
    pub fn reset_count(&self) -> u64 {
        self.resets.load(Ordering::SeqCst)
    }
}

impl Default for StubHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaHandle for StubHandle {
    fn attach(&self, source: &MediaSource) -> Result<(), MediaError> {
        *self.attached.lock() = Some(source.clone());
        Ok(())
    }

    fn load(&self) -> BoxFuture<'_, Result<(), MediaError>> {
        Box::pin(async move {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.fail_load {
                return Err(MediaError::Network("stub load failure".into()));
            }
            self.loaded.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn play(&self) -> BoxFuture<'_, Result<(), MediaError>> {
        Box::pin(async move {
            self.plays.fetch_add(1, Ordering::SeqCst);
            if self.fail_play {
                return Err(MediaError::Aborted("stub play failure".into()));
            }
            self.playing.store(true, Ordering::SeqCst);
            Ok(())
        })
    }

    fn pause(&self) {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
        *self.attached.lock() = None;
        self.loaded.store(false, Ordering::SeqCst);
        self.playing.store(false, Ordering::SeqCst);
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }
}

/// Headless [`MediaBackend`] producing [`StubHandle`]s.
///
/// Keeps a list of every handle it created so tests can inspect them after
/// the pool has recycled them.
pub struct StubBackend {
    handles: Mutex<Vec<Arc<StubHandle>>>,
    fail_create: bool,
    fail_load: bool,
    fail_play: bool,
}

impl StubBackend {
    /// Backend whose handles always succeed.
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(Vec::new()),
            fail_create: false,
            fail_load: false,
            fail_play: false,
        }
    }

    /// Backend that fails handle construction (platform error path).
    pub fn failing_create() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    /// Backend whose handles fail to load (network error path).
    pub fn failing_load() -> Self {
        Self {
            fail_load: true,
            ..Self::new()
        }
    }

    /// Backend whose handles fail to start playback.
    pub fn failing_play() -> Self {
        Self {
            fail_play: true,
            ..Self::new()
        }
    }

    /// Total handles constructed so far.
    pub fn created_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Returns the `index`-th handle constructed, if it exists.
    pub fn handle(&self, index: usize) -> Option<Arc<StubHandle>> {
        self.handles.lock().get(index).cloned()
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaBackend for StubBackend {
    fn create(&self) -> Result<Arc<dyn MediaHandle>, MediaError> {
        if self.fail_create {
            return Err(MediaError::Decode("stub construction failure".into()));
        }
        let handle = Arc::new(StubHandle::with_failures(self.fail_load, self.fail_play));
        self.handles.lock().push(Arc::clone(&handle));
        Ok(handle)
    }
}
