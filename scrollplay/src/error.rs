//! Error types for the playback core.
//!
//! Failures in this crate are never fatal to the process. Recoverable errors
//! are handled locally by the controller (state reverted to dormant, resource
//! reclaimed) and surfaced outward via the event channel; only host-initiated
//! operations like [`PlaybackController::start`] return errors directly.
//!
//! [`PlaybackController::start`]: crate::controller::PlaybackController::start

use std::fmt;

use thiserror::Error;

/// Classification of a media load/decode failure.
///
/// Mirrors the platform-level media error codes: a failure is either an
/// aborted load, a network problem, a decoder problem, an unsupported
/// container/codec, or a streaming-adapter failure.
#[derive(Debug, Error)]
pub enum MediaError {
    /// Media load was aborted before completion.
    #[error("media load aborted: {0}")]
    Aborted(String),

    /// Network error while fetching media data.
    #[error("network error while loading media: {0}")]
    Network(String),

    /// The decoder failed on the media data.
    #[error("media decode error: {0}")]
    Decode(String),

    /// The media format is not supported by the decode pipeline.
    #[error("media format not supported: {0}")]
    UnsupportedFormat(String),

    /// The streaming source adapter failed fatally.
    #[error("source adapter error: {0}")]
    Adapter(String),
}

impl MediaError {
    /// Maps the failure onto the event-channel classification tag.
    ///
    /// Adapter failures are reported as `source-adapter`; everything else is
    /// a plain media failure.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            MediaError::Adapter(_) => ErrorKind::SourceAdapter,
            _ => ErrorKind::Media,
        }
    }
}

/// Errors returned from host-facing controller operations.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The slot has no media source configured.
    #[error("no media source configured")]
    MissingSource,

    /// A media load/decode/play attempt failed.
    #[error(transparent)]
    Media(#[from] MediaError),

    /// The backend failed to construct a decode resource.
    ///
    /// Pool exhaustion is explicitly not an error (the pool grows past its
    /// idle cap on demand); this is a platform-level construction failure.
    #[error("failed to construct decode resource")]
    Backend(#[source] MediaError),

    /// The controller has been torn down (slot unmounted).
    #[error("controller has been torn down")]
    TornDown,
}

/// Classification tag carried on [`PlayerEvent::Error`] events.
///
/// [`PlayerEvent::Error`]: crate::controller::PlayerEvent::Error
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Placeholder (poster) image failed to load. Non-fatal; the poster is
    /// removed and playback is unaffected.
    Poster,
    /// Media load/decode/network/format failure.
    Media,
    /// Streaming source adapter failure.
    SourceAdapter,
}

impl ErrorKind {
    /// Short tag string for logs and event payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Poster => "poster",
            ErrorKind::Media => "media",
            ErrorKind::SourceAdapter => "source-adapter",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
