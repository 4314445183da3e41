use crate::error::{Error, Result};

/// Fixed properties of a decoded PCM stream.
///
/// A *sample* here always means one frame: one interleaved value for each
/// channel. Every byte length in this crate is thus
/// `samples × channels × bytes_per_sample`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct AudioFormat {
    /// Number of interleaved channels.
    pub channels: u16,
    /// Samples per second.
    pub sample_rate: u32,
    /// Width of a single channel's value, in bytes.
    pub bytes_per_sample: u8,
    /// Whether values are IEEE floats, rather than signed integers.
    pub float: bool,
    /// Total number of samples in the stream.
    pub samples: u64,
}

impl AudioFormat {
    /// Number of bytes occupied by one sample across all channels.
    #[must_use]
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.bytes_per_sample as usize
    }

    /// Number of bytes needed to hold `samples` samples.
    ///
    /// # Panics
    /// Panics if the result overflows `usize`; use [`Self::checked_byte_len`]
    /// for untrusted sample counts.
    #[must_use]
    pub fn byte_len(&self, samples: u64) -> usize {
        self.checked_byte_len(samples)
            .expect("Byte length of requested samples must fit in memory.")
    }

    /// Number of bytes needed to hold `samples` samples, if representable.
    #[must_use]
    pub fn checked_byte_len(&self, samples: u64) -> Option<usize> {
        usize::try_from(samples)
            .ok()
            .and_then(|s| s.checked_mul(self.frame_size()))
    }

    /// Number of bytes needed to hold the entire decoded stream, saturating
    /// at `u64::MAX`.
    #[must_use]
    pub fn stream_byte_len(&self) -> u64 {
        self.samples.saturating_mul(self.frame_size() as u64)
    }

    /// Rejects formats which describe no audio at all.
    pub fn validate(&self) -> Result<()> {
        if self.channels == 0 {
            Err(Error::InvalidFormat("zero channels"))
        } else if self.sample_rate == 0 {
            Err(Error::InvalidFormat("zero sample rate"))
        } else if self.bytes_per_sample == 0 {
            Err(Error::InvalidFormat("zero bytes per sample"))
        } else if self.samples == 0 {
            Err(Error::InvalidFormat("stream contains no samples"))
        } else {
            Ok(())
        }
    }

    /// Checks that `start..start + count` lies within the stream, and that
    /// `buf_len` bytes can hold it. Returns the byte length of the range.
    pub(crate) fn check_request(&self, buf_len: usize, start: u64, count: u64) -> Result<usize> {
        let out_of_range = || Error::OutOfRange {
            start,
            count,
            total: self.samples,
        };

        let end = start.checked_add(count).ok_or_else(out_of_range)?;
        if end > self.samples {
            return Err(out_of_range());
        }

        let needed = self.checked_byte_len(count).ok_or_else(out_of_range)?;
        if buf_len < needed {
            return Err(Error::BufferTooSmall {
                needed,
                actual: buf_len,
            });
        }

        Ok(needed)
    }
}
