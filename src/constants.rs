//! Constants affecting cache sizing and worker behaviour.

use std::num::NonZeroU64;

/// Number of samples decoded and published by the fill worker per step.
///
/// This bounds both the latency of each call into a [`SampleSource`] and how
/// long teardown may wait on an in-flight decode.
///
/// [`SampleSource`]: crate::provider::SampleSource
pub const DEFAULT_CHUNK_SAMPLES: NonZeroU64 = match NonZeroU64::new(2 << 10) {
    Some(v) => v,
    None => [][0],
};

/// Name given to each cache's fill thread.
pub const FILL_THREAD_NAME: &str = "warbler-fill";

/// Width in bytes of a 16-bit PCM sample, the only width accepted by
/// volume-scaled reads.
pub const I16_SAMPLE_BYTES: u8 = std::mem::size_of::<i16>() as u8;
