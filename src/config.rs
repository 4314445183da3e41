use crate::constants::{DEFAULT_CHUNK_SAMPLES, FILL_THREAD_NAME};

use derivative::Derivative;
use std::{num::NonZeroU64, sync::Arc, time::Duration};

/// Callback invoked by a fill worker after each published chunk, given the
/// decoded sample count and the stream's total sample count.
pub type ProgressHook = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Configuration for RAM caches and the providers built by [`open`].
///
/// [`open`]: crate::provider::open
#[derive(Clone, Derivative)]
#[derivative(Debug)]
#[non_exhaustive]
pub struct Config {
    /// Number of samples the fill worker decodes before publishing progress
    /// and re-checking for cancellation.
    ///
    /// Smaller values make teardown and partial reads more responsive, at the
    /// cost of more calls into the sample source.
    ///
    /// Defaults to [`DEFAULT_CHUNK_SAMPLES`] (2048).
    ///
    /// [`DEFAULT_CHUNK_SAMPLES`]: crate::constants::DEFAULT_CHUNK_SAMPLES
    pub chunk_samples: NonZeroU64,

    /// Behaviour of reads which cover samples the worker has not yet decoded.
    ///
    /// Defaults to [`ReadPolicy::Partial`].
    pub read_policy: ReadPolicy,

    /// Maximum time a [`ReadPolicy::Block`] read may wait for the worker.
    ///
    /// Defaults to `None`, waiting until the fill completes or fails.
    pub read_timeout: Option<Duration>,

    /// Largest buffer, in bytes, that a cache may allocate.
    ///
    /// Streams whose decoded size exceeds this are rejected with
    /// [`Error::InsufficientMemory`], exactly as though the allocation itself
    /// had failed.
    ///
    /// Defaults to `None` (limited only by the allocator).
    ///
    /// [`Error::InsufficientMemory`]: crate::error::Error::InsufficientMemory
    pub memory_limit: Option<usize>,

    /// Name given to the fill worker's thread.
    ///
    /// Defaults to [`FILL_THREAD_NAME`].
    ///
    /// [`FILL_THREAD_NAME`]: crate::constants::FILL_THREAD_NAME
    pub thread_name: String,

    #[derivative(Debug = "ignore")]
    /// Called from the fill worker's thread each time progress is published.
    ///
    /// This runs between chunks, so expensive hooks delay decoding. Most UIs
    /// should instead poll [`AudioProvider::decoded_samples`].
    ///
    /// Defaults to `None`.
    ///
    /// [`AudioProvider::decoded_samples`]: crate::provider::AudioProvider::decoded_samples
    pub progress_hook: Option<ProgressHook>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_samples: DEFAULT_CHUNK_SAMPLES,
            read_policy: ReadPolicy::default(),
            read_timeout: None,
            memory_limit: None,
            thread_name: FILL_THREAD_NAME.into(),
            progress_hook: None,
        }
    }
}

impl Config {
    /// Sets this `Config`'s decode chunk size.
    #[must_use]
    pub fn chunk_samples(mut self, chunk_samples: NonZeroU64) -> Self {
        self.chunk_samples = chunk_samples;
        self
    }

    /// Sets this `Config`'s policy for reads past decoded data.
    #[must_use]
    pub fn read_policy(mut self, read_policy: ReadPolicy) -> Self {
        self.read_policy = read_policy;
        self
    }

    /// Sets this `Config`'s timeout for blocking reads.
    #[must_use]
    pub fn read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Sets this `Config`'s upper bound on cache allocations.
    #[must_use]
    pub fn memory_limit(mut self, memory_limit: Option<usize>) -> Self {
        self.memory_limit = memory_limit;
        self
    }

    /// Sets the name of the fill worker's thread.
    #[must_use]
    pub fn thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Sets a callback to observe fill progress.
    #[must_use]
    pub fn progress_hook(mut self, progress_hook: Option<ProgressHook>) -> Self {
        self.progress_hook = progress_hook;
        self
    }
}

/// How a cache answers reads for samples which have not been decoded yet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ReadPolicy {
    /// Copy only the decoded prefix of a request, zero-filling the remainder
    /// of the destination. The read returns the count of valid samples.
    ///
    /// Never waits on the fill worker; suited to UI threads.
    Partial,
    /// Wait until the fill worker has decoded every requested sample.
    ///
    /// Fails early if the fill is cancelled or fails, and after
    /// [`Config::read_timeout`] if one is set.
    Block,
}

impl Default for ReadPolicy {
    fn default() -> Self {
        Self::Partial
    }
}

#[cfg(test)]
impl Config {
    /// Small chunks, so that tests see many progress steps.
    pub(crate) fn test_cfg(read_policy: ReadPolicy) -> Self {
        Self::default()
            .chunk_samples(NonZeroU64::new(256).unwrap())
            .read_policy(read_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_never_block_by_default() {
        let config = Config::default();

        assert_eq!(config.read_policy, ReadPolicy::Partial);
        assert_eq!(config.chunk_samples, DEFAULT_CHUNK_SAMPLES);
        assert!(config.read_timeout.is_none());
    }
}
