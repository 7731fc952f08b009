//! Bounded pool of reusable decode/playback resources.
//!
//! Decode handles are expensive to construct and hold large buffers, so the
//! pool recycles them across slots. Only the *idle* side is bounded: any
//! number of slots may hold an active resource at once, but at most
//! `max_idle` reset handles are retained for reuse. Releasing beyond the cap
//! discards the handle, which bounds steady-state memory regardless of how
//! many slots have ever existed.
//!
//! Reuse is LIFO: a just-released handle is likely still warm (decoder
//! threads alive, buffers mapped), so it is handed out first.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::DEFAULT_MAX_IDLE_RESOURCES;
use crate::error::PlaybackError;
use crate::media::{MediaBackend, MediaHandle};

// =============================================================================
// Pooled Resource
// =============================================================================

/// Identity of a pooled resource, unique for the life of the pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res-{}", self.0)
    }
}

/// A decode/playback handle leased from the pool.
///
/// Owned by the pool while idle; ownership transfers to a single controller
/// while active and returns via [`ResourcePool::release`]. The value is
/// deliberately not `Clone`: at most one controller references a resource at
/// a time.
pub struct PooledResource {
    id: ResourceId,
    handle: Arc<dyn MediaHandle>,
}

impl PooledResource {
    /// Returns the resource identity.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Returns a shared reference to the underlying decode handle for async
    /// load/play calls.
    pub fn handle(&self) -> Arc<dyn MediaHandle> {
        Arc::clone(&self.handle)
    }
}

impl fmt::Debug for PooledResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource").field("id", &self.id).finish()
    }
}

// =============================================================================
// Pool
// =============================================================================

/// Point-in-time pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Handles constructed by the backend.
    pub created: u64,
    /// Acquisitions served from the idle set.
    pub reused: u64,
    /// Releases discarded because the idle set was full (or double-release).
    pub discarded: u64,
    /// Current idle set size.
    pub idle: usize,
    /// Current number of leased-out resources.
    pub active: usize,
}

struct PoolInner {
    idle: Vec<PooledResource>,
    active: HashSet<ResourceId>,
}

/// Bounded pool of decode/playback resources.
///
/// `acquire` never blocks and never fails for capacity reasons: when the
/// idle set is empty a new handle is constructed on demand. A construction
/// failure is a platform error and is returned to the caller.
pub struct ResourcePool {
    backend: Arc<dyn MediaBackend>,
    max_idle: usize,
    inner: Mutex<PoolInner>,
    next_id: AtomicU64,
    created: AtomicU64,
    reused: AtomicU64,
    discarded: AtomicU64,
}

impl ResourcePool {
    /// Creates a pool with the default idle cap.
    pub fn new(backend: Arc<dyn MediaBackend>) -> Self {
        Self::with_max_idle(backend, DEFAULT_MAX_IDLE_RESOURCES)
    }

    /// Creates a pool retaining at most `max_idle` idle resources.
    pub fn with_max_idle(backend: Arc<dyn MediaBackend>, max_idle: usize) -> Self {
        Self {
            backend,
            max_idle,
            inner: Mutex::new(PoolInner {
                idle: Vec::with_capacity(max_idle),
                active: HashSet::new(),
            }),
            next_id: AtomicU64::new(0),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
            discarded: AtomicU64::new(0),
        }
    }

    /// Leases a resource, reusing the most recently released idle handle or
    /// constructing a new one.
    pub fn acquire(&self) -> Result<PooledResource, PlaybackError> {
        if let Some(resource) = {
            let mut inner = self.inner.lock();
            let popped = inner.idle.pop();
            if let Some(r) = &popped {
                inner.active.insert(r.id);
            }
            popped
        } {
            self.reused.fetch_add(1, Ordering::Relaxed);
            debug!(resource = %resource.id(), "reusing idle decode resource");
            return Ok(resource);
        }

        let handle = self.backend.create().map_err(PlaybackError::Backend)?;
        let id = ResourceId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.inner.lock().active.insert(id);
        self.created.fetch_add(1, Ordering::Relaxed);
        debug!(resource = %id, "constructed new decode resource");
        Ok(PooledResource { id, handle })
    }

    /// Returns a resource to the pool.
    ///
    /// The handle is paused and hard-reset before it re-enters the idle set,
    /// so an idle resource retains no media memory. If the idle set is full
    /// the resource is dropped instead. Releasing a resource the pool does
    /// not consider active is a no-op discard (double-release guard).
    pub fn release(&self, resource: PooledResource) {
        let was_active = self.inner.lock().active.remove(&resource.id);
        if !was_active {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(resource = %resource.id(), "ignoring release of non-active resource");
            return;
        }

        resource.handle.pause();
        resource.handle.reset();

        let mut inner = self.inner.lock();
        if inner.idle.len() < self.max_idle {
            debug!(resource = %resource.id(), idle = inner.idle.len() + 1, "resource returned to pool");
            inner.idle.push(resource);
        } else {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            debug!(resource = %resource.id(), "idle set full, discarding resource");
        }
    }

    /// Number of resources currently idle.
    pub fn idle_size(&self) -> usize {
        self.inner.lock().idle.len()
    }

    /// Number of resources currently leased out.
    pub fn active_size(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Configured idle cap.
    pub fn max_idle(&self) -> usize {
        self.max_idle
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            idle: inner.idle.len(),
            active: inner.active.len(),
        }
    }
}

impl fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("max_idle", &self.max_idle)
            .field("stats", &self.stats())
            .finish()
    }
}
