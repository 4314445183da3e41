use super::{AudioFormat, AudioProvider, SampleSource};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use tracing::trace;

/// An uncached provider, decoding directly from its source on every read.
///
/// Concurrent reads are serialised on a lock around the source. This is the
/// fallback for streams which cannot fit in a [`RamCache`], and is suitable
/// as-is for sources with cheap random access (e.g., raw PCM files).
///
/// [`RamCache`]: super::RamCache
pub struct Streaming<S> {
    format: AudioFormat,
    source: Mutex<S>,
}

impl<S: SampleSource> Streaming<S> {
    /// Serve reads directly from `source`.
    pub fn new(source: S) -> Result<Self> {
        let format = source.format();
        format.validate()?;

        Ok(Self {
            format,
            source: Mutex::new(source),
        })
    }

    /// Returns the wrapped sample source.
    pub fn into_source(self) -> S {
        self.source.into_inner()
    }
}

impl<S: SampleSource> AudioProvider for Streaming<S> {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn decoded_samples(&self) -> u64 {
        self.format.samples
    }

    fn read(&self, buf: &mut [u8], start: u64, count: u64) -> Result<u64> {
        let len = self.format.check_request(buf.len(), start, count)?;
        if count == 0 {
            return Ok(0);
        }

        trace!("Streaming {} samples from {}.", count, start);
        self.source
            .lock()
            .decode(&mut buf[..len], start, count)
            .map_err(Error::from)?;

        Ok(count)
    }
}
