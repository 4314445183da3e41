//! Cache construction, decoding, and read error handling.

use std::{
    error::Error as StdError,
    fmt::{Debug, Display, Formatter, Result as FmtResult},
    io::Error as IoError,
    sync::Arc,
};

/// Errors returned when building or reading from an audio provider.
///
/// Unless otherwise stated, these don't invalidate the provider, but do advise
/// on valid operations.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The decoded stream could not be held in memory, either because the
    /// allocator refused or because it exceeded [`Config::memory_limit`].
    ///
    /// Callers should fall back to an uncached provider such as [`Streaming`].
    ///
    /// [`Config::memory_limit`]: crate::Config::memory_limit
    /// [`Streaming`]: crate::provider::Streaming
    InsufficientMemory {
        /// Number of bytes the cache needed. Saturates at `u64::MAX` if the
        /// stream's size cannot be represented.
        requested: u64,
    },
    /// The source reported audio properties no cache can hold.
    InvalidFormat(&'static str),
    /// The requested sample range extends past the end of the stream.
    OutOfRange {
        /// First requested sample.
        start: u64,
        /// Number of requested samples.
        count: u64,
        /// Number of samples in the stream.
        total: u64,
    },
    /// The destination buffer cannot hold the requested samples.
    BufferTooSmall {
        /// Bytes required to hold the requested samples.
        needed: usize,
        /// Bytes provided.
        actual: usize,
    },
    /// Volume scaling was requested on audio which is not 16-bit PCM.
    UnsupportedFormat,
    /// The sample source failed while filling the cache.
    ///
    /// This is sticky: every later blocking read past the decoded region
    /// reports the same failure.
    Decode(Arc<DecodeError>),
    /// The fill worker was cancelled before it decoded the requested samples.
    Cancelled,
    /// A blocking read waited longer than [`Config::read_timeout`].
    ///
    /// [`Config::read_timeout`]: crate::Config::read_timeout
    TimedOut,
    /// The fill worker's thread could not be started.
    Spawn(Arc<IoError>),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::InsufficientMemory { requested } => f.write_fmt(format_args!(
                "not enough memory available to cache {requested} bytes in RAM"
            )),
            Self::InvalidFormat(why) => f.write_fmt(format_args!("invalid audio format: {why}")),
            Self::OutOfRange {
                start,
                count,
                total,
            } => f.write_fmt(format_args!(
                "requested samples {start}..{} of a {total}-sample stream",
                start.saturating_add(*count)
            )),
            Self::BufferTooSmall { needed, actual } => f.write_fmt(format_args!(
                "destination holds {actual} bytes, but {needed} are needed"
            )),
            Self::UnsupportedFormat =>
                f.write_str("volume scaling is only supported on 16-bit audio"),
            Self::Decode(e) => f.write_fmt(format_args!("failed to decode audio: {e}")),
            Self::Cancelled => f.write_str("cache fill was cancelled"),
            Self::TimedOut => f.write_str("timed out waiting for samples to be decoded"),
            Self::Spawn(e) => f.write_fmt(format_args!("failed to start fill thread: {e}")),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Decode(e) => Some(e.as_ref()),
            Self::Spawn(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(val: DecodeError) -> Self {
        Self::Decode(Arc::new(val))
    }
}

impl From<IoError> for Error {
    fn from(val: IoError) -> Self {
        Self::Spawn(Arc::new(val))
    }
}

/// Convenience type for provider error handling.
pub type Result<T> = std::result::Result<T, Error>;

/// Failures reported by a [`SampleSource`] while decoding.
///
/// [`SampleSource`]: crate::provider::SampleSource
#[derive(Debug)]
#[non_exhaustive]
pub enum DecodeError {
    /// The underlying decoder returned an error.
    Source(Box<dyn StdError + Send + Sync>),
    /// The decoder panicked. Contains the panic message, if it was a string.
    Panicked(Option<String>),
}

impl DecodeError {
    /// Wrap any decoder-specific error.
    pub fn new<E>(err: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync>>,
    {
        Self::Source(err.into())
    }
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Source(e) => f.write_fmt(format_args!("{e}")),
            Self::Panicked(Some(msg)) =>
                f.write_fmt(format_args!("decoder panicked: {msg}")),
            Self::Panicked(None) => f.write_str("decoder panicked"),
        }
    }
}

impl StdError for DecodeError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Source(e) => Some(e.as_ref()),
            Self::Panicked(_) => None,
        }
    }
}

/// A cache which could not be built, returning ownership of its source.
///
/// This allows a caller to retry with another provider, such as
/// [`Streaming`], without reopening the stream.
///
/// [`Streaming`]: crate::provider::Streaming
pub struct Rejected<S> {
    /// Why the cache could not be built.
    pub error: Error,
    /// The sample source which was to be cached.
    pub source: S,
}

impl<S> Rejected<S> {
    /// Discards the error, returning the sample source.
    pub fn into_source(self) -> S {
        self.source
    }
}

impl<S> Debug for Rejected<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl<S> Display for Rejected<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_fmt(format_args!("could not cache source: {}", self.error))
    }
}

impl<S> StdError for Rejected<S> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.error)
    }
}

impl<S> From<Rejected<S>> for Error {
    fn from(val: Rejected<S>) -> Self {
        val.error
    }
}
