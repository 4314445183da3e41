//! Audio providers: decoded-audio sources offering random access by sample.
//!
//! A [`SampleSource`] is any upstream decoder. Consumers never use these
//! directly: they are wrapped in an [`AudioProvider`], which is either
//! * a [`RamCache`], decoding the whole stream into memory in the background, or
//! * a [`Streaming`] provider, decoding on each read.
//!
//! [`open`] picks between these based upon the source's [`needs_cache`] hint,
//! falling back to streaming if the stream will not fit in memory.
//!
//! [`needs_cache`]: SampleSource::needs_cache

mod format;
mod ram;
mod source;
mod stream;
#[cfg(any(test, feature = "internals"))]
pub mod test_impls;
mod volume;

pub use self::{
    format::AudioFormat,
    ram::{FillEvent, FillStatus, RamCache},
    source::SampleSource,
    stream::Streaming,
};

use crate::{
    error::{Error, Result},
    Config,
};
use tracing::{debug, warn};

/// Random access to a decoded audio stream.
///
/// Implementors are safe to read from any number of threads at once.
pub trait AudioProvider: Send + Sync {
    /// Properties of the decoded stream.
    fn format(&self) -> AudioFormat;

    /// Number of samples, from the start of the stream, which may currently
    /// be read without waiting.
    ///
    /// This never decreases.
    fn decoded_samples(&self) -> u64;

    /// Copies samples `start..start + count` into the front of `buf`.
    ///
    /// Returns the number of samples copied which hold decoded audio. Any
    /// samples past this are zero-filled. Providers which decode on demand
    /// always return `count`.
    ///
    /// Requests reaching past the end of the stream fail with
    /// [`Error::OutOfRange`], and destinations shorter than
    /// `count × channels × bytes_per_sample` with [`Error::BufferTooSmall`].
    fn read(&self, buf: &mut [u8], start: u64, count: u64) -> Result<u64>;

    /// As [`read`], additionally scaling each sample by `volume`.
    ///
    /// Scaled samples are clamped to the range of an `i16`. A `volume` of
    /// exactly `1.0` is a plain read; otherwise, only 16-bit integer audio is
    /// supported and other formats fail with [`Error::UnsupportedFormat`].
    ///
    /// [`read`]: AudioProvider::read
    fn read_with_volume(&self, buf: &mut [u8], start: u64, count: u64, volume: f64) -> Result<u64> {
        volume::read_with_volume(self, buf, start, count, volume)
    }

    /// Whether every sample has been decoded.
    fn is_complete(&self) -> bool {
        self.decoded_samples() >= self.format().samples
    }
}

impl<P: AudioProvider + ?Sized> AudioProvider for Box<P> {
    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    fn decoded_samples(&self) -> u64 {
        (**self).decoded_samples()
    }

    fn read(&self, buf: &mut [u8], start: u64, count: u64) -> Result<u64> {
        (**self).read(buf, start, count)
    }

    fn read_with_volume(&self, buf: &mut [u8], start: u64, count: u64, volume: f64) -> Result<u64> {
        (**self).read_with_volume(buf, start, count, volume)
    }
}

/// Wrap a sample source in the most suitable provider.
///
/// Sources which report [`needs_cache`] are held in a [`RamCache`]. If the
/// cache cannot be allocated, the same source is instead served by a
/// [`Streaming`] provider. All other errors (invalid formats, failure to start
/// a worker) are returned.
///
/// [`needs_cache`]: SampleSource::needs_cache
pub fn open<S: SampleSource>(source: S, config: &Config) -> Result<Box<dyn AudioProvider>> {
    if !source.needs_cache() {
        debug!("Source does not need caching, streaming directly.");
        return Ok(Box::new(Streaming::new(source)?));
    }

    match RamCache::new(source, config) {
        Ok(cache) => Ok(Box::new(cache)),
        Err(rejected) => match rejected.error {
            Error::InsufficientMemory { requested } => {
                warn!(
                    "Could not cache {} bytes of audio in RAM, falling back to streaming.",
                    requested
                );
                Ok(Box::new(Streaming::new(rejected.source)?))
            },
            e => Err(e),
        },
    }
}
