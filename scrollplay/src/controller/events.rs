//! Host-observable lifecycle events and the listener registry.
//!
//! Events are fire-and-forget: listeners are invoked synchronously in
//! registration order and their return is ignored. The registry replaces the
//! original event-bubbling surface with an explicit list, removable by id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ErrorKind;

/// A lifecycle event emitted by a [`PlaybackController`].
///
/// [`PlaybackController`]: crate::controller::PlaybackController
#[derive(Clone, Debug)]
pub enum PlayerEvent {
    /// Playback started or resumed.
    Play,
    /// Playback paused.
    Pause,
    /// First frame of the media is available.
    MediaReady,
    /// The visibility decision for the slot changed.
    VisibilityChange {
        /// The new decision.
        visible: bool,
        /// Intersection ratio that triggered the change.
        ratio: f64,
        /// Viewport occupancy that triggered the change.
        occupancy: f64,
    },
    /// A non-fatal failure occurred.
    Error {
        /// Failure classification.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
    },
}

impl PlayerEvent {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            PlayerEvent::Play => "play",
            PlayerEvent::Pause => "pause",
            PlayerEvent::MediaReady => "media-ready",
            PlayerEvent::VisibilityChange { .. } => "visibility-change",
            PlayerEvent::Error { .. } => "error",
        }
    }
}

impl fmt::Display for PlayerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Handle identifying a subscribed listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Callback = Arc<dyn Fn(&PlayerEvent) + Send + Sync>;

/// Listener registry owned by a controller.
pub(crate) struct Listeners {
    entries: Mutex<Vec<(ListenerId, Callback)>>,
    next_id: AtomicU64,
}

impl Listeners {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    pub(crate) fn subscribe(
        &self,
        listener: impl Fn(&PlayerEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.entries.lock().push((id, Arc::new(listener)));
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    /// Invokes listeners in registration order.
    ///
    /// The entry list is snapshotted first so a listener may subscribe or
    /// unsubscribe from inside its callback without deadlocking.
    pub(crate) fn emit(&self, event: &PlayerEvent) {
        let snapshot: Vec<Callback> = self
            .entries
            .lock()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in snapshot {
            callback(event);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listeners_invoked_in_registration_order() {
        let listeners = Listeners::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            listeners.subscribe(move |_| order.lock().push(tag));
        }

        listeners.emit(&PlayerEvent::Play);
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unsubscribe_removes_listener() {
        let listeners = Listeners::new();
        let count = Arc::new(AtomicU64::new(0));

        let c = Arc::clone(&count);
        let id = listeners.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        listeners.emit(&PlayerEvent::Play);
        assert!(listeners.unsubscribe(id));
        listeners.emit(&PlayerEvent::Pause);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(listeners.len(), 0);
        // Unknown id is a safe no-op.
        assert!(!listeners.unsubscribe(id));
    }

    #[test]
    fn test_listener_may_unsubscribe_itself_reentrantly() {
        let listeners = Arc::new(Listeners::new());
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let inner = Arc::clone(&listeners);
        let my_id = Arc::clone(&slot);
        let id = listeners.subscribe(move |_| {
            if let Some(id) = *my_id.lock() {
                inner.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        listeners.emit(&PlayerEvent::Play);
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(PlayerEvent::Play.name(), "play");
        assert_eq!(PlayerEvent::Pause.name(), "pause");
        assert_eq!(PlayerEvent::MediaReady.name(), "media-ready");
        assert_eq!(
            PlayerEvent::VisibilityChange {
                visible: true,
                ratio: 0.8,
                occupancy: 0.4
            }
            .name(),
            "visibility-change"
        );
        assert_eq!(
            format!(
                "{}",
                PlayerEvent::Error {
                    kind: crate::error::ErrorKind::Poster,
                    message: "x".into()
                }
            ),
            "error"
        );
    }
}
