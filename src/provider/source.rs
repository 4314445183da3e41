use super::AudioFormat;
use crate::error::DecodeError;

/// An upstream decoder, producing interleaved PCM on demand.
///
/// Implementors must have finished parsing headers before being handed to a
/// provider: [`format`] is read once, and is assumed to never change.
///
/// A source is only ever driven from one thread at a time, but that thread
/// may differ from the one which created it.
///
/// [`format`]: SampleSource::format
pub trait SampleSource: Send + 'static {
    /// Properties of the decoded stream.
    fn format(&self) -> AudioFormat;

    /// Decodes samples `start..start + count` into `buf`.
    ///
    /// `buf` is exactly `count × channels × bytes_per_sample` bytes long, and
    /// the range is guaranteed to lie within the stream.
    fn decode(&mut self, buf: &mut [u8], start: u64, count: u64) -> Result<(), DecodeError>;

    /// Whether random access into this source is expensive enough that it
    /// should be held in a cache.
    ///
    /// Defaults to `false`.
    fn needs_cache(&self) -> bool {
        false
    }
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn format(&self) -> AudioFormat {
        (**self).format()
    }

    fn decode(&mut self, buf: &mut [u8], start: u64, count: u64) -> Result<(), DecodeError> {
        (**self).decode(buf, start, count)
    }

    fn needs_cache(&self) -> bool {
        (**self).needs_cache()
    }
}
