mod arena;
mod state;
mod worker;

pub use state::{FillEvent, FillStatus};

use self::{arena::SampleArena, state::FillState};
use super::{AudioFormat, AudioProvider, SampleSource};
use crate::{
    error::{Error, Rejected, Result},
    Config,
    ReadPolicy,
};
use flume::Receiver;
use parking_lot::Mutex;
use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, warn};

/// Contents shared between a [`RamCache`] and its fill worker.
pub(crate) struct Shared {
    format: AudioFormat,
    arena: SampleArena,
    state: FillState,
}

/// A provider which decodes an entire stream into memory.
///
/// Building a cache allocates one buffer large enough for the whole decoded
/// stream, and starts a worker thread which fills it from the [`SampleSource`]
/// in chunks of [`Config::chunk_samples`]. Construction does not wait for
/// any decoding: reads may begin immediately, and see decoded samples as soon
/// as each chunk is published. Reads past the decoded region follow
/// [`Config::read_policy`].
///
/// The source is driven only by the worker thread. Dropping the cache stops
/// the worker at its next chunk boundary and waits for it to exit before the
/// buffer is freed.
///
/// This consumes exactly `samples × channels × bytes_per_sample` bytes of
/// memory: a 2-hour stereo 16-bit stream at 48kHz costs around 1.3 GiB.
///
/// [`Config::chunk_samples`]: crate::Config::chunk_samples
/// [`Config::read_policy`]: crate::Config::read_policy
pub struct RamCache<S: SampleSource> {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<Option<S>>>,
    read_policy: ReadPolicy,
    read_timeout: Option<Duration>,
}

impl<S: SampleSource> RamCache<S> {
    /// Allocate a cache for `source` and begin filling it in the background.
    ///
    /// On failure, the source is returned alongside the error. Notably,
    /// [`Error::InsufficientMemory`] indicates that the caller should fall
    /// back to an uncached provider such as [`Streaming`].
    ///
    /// [`Streaming`]: super::Streaming
    pub fn new(source: S, config: &Config) -> std::result::Result<Self, Rejected<S>> {
        let format = source.format();
        if let Err(error) = format.validate() {
            return Err(Rejected { error, source });
        }

        let requested = format.stream_byte_len();
        let arena = usize::try_from(requested)
            .map_err(|_| Error::InsufficientMemory { requested })
            .and_then(|len| SampleArena::new(len, config.memory_limit));

        let arena = match arena {
            Ok(arena) => arena,
            Err(error) => return Err(Rejected { error, source }),
        };

        debug!(
            "Caching {} samples ({} bytes) of {}-channel audio in RAM.",
            format.samples,
            arena.len(),
            format.channels
        );

        let shared = Arc::new(Shared {
            format,
            arena,
            state: FillState::new(format.samples),
        });

        let slot = Arc::new(Mutex::new(Some(source)));

        let worker_shared = shared.clone();
        let worker_slot = slot.clone();
        let chunk = config.chunk_samples.get();
        let hook = config.progress_hook.clone();

        let spawned = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker::runner(worker_slot, worker_shared, chunk, hook));

        match spawned {
            Ok(handle) => Ok(Self {
                shared,
                worker: Some(handle),
                read_policy: config.read_policy,
                read_timeout: config.read_timeout,
            }),
            Err(e) => {
                warn!("Failed to spawn fill thread: {:?}.", e);
                let source = slot
                    .lock()
                    .take()
                    .expect("An unspawned worker cannot have taken the source.");

                Err(Rejected {
                    error: e.into(),
                    source,
                })
            },
        }
    }

    /// Returns the current state of the fill worker.
    #[must_use]
    pub fn status(&self) -> FillStatus {
        self.shared.state.status()
    }

    /// Blocks until the first `samples` samples are decoded, returning the
    /// number of decoded samples.
    ///
    /// Requests past the end of the stream wait for the whole stream. Fails
    /// if the worker stops before decoding enough, or `timeout` elapses.
    pub fn wait_for(&self, samples: u64, timeout: Option<Duration>) -> Result<u64> {
        self.shared.state.wait_for(samples, timeout)
    }

    /// Returns a channel which receives a single [`FillEvent`] once the
    /// fill worker stops.
    ///
    /// If the worker has already stopped, the event is available immediately.
    /// The channel supports both blocking and `async` receipt.
    #[must_use]
    pub fn on_complete(&self) -> Receiver<FillEvent> {
        let (tx, rx) = flume::bounded(1);
        self.shared.state.subscribe(tx);
        rx
    }

    /// Stops the fill worker and returns the sample source.
    ///
    /// Returns `None` if the worker thread could not hand the source back.
    #[must_use]
    pub fn into_source(mut self) -> Option<S> {
        self.stop()
    }

    fn stop(&mut self) -> Option<S> {
        self.shared.state.cancel();

        let handle = self.worker.take()?;
        match handle.join() {
            Ok(source) => source,
            Err(e) => {
                warn!("Fill thread panicked outside of decoding: {:?}.", e);
                None
            },
        }
    }
}

impl<S: SampleSource> AudioProvider for RamCache<S> {
    fn format(&self) -> AudioFormat {
        self.shared.format
    }

    fn decoded_samples(&self) -> u64 {
        self.shared.state.decoded()
    }

    fn read(&self, buf: &mut [u8], start: u64, count: u64) -> Result<u64> {
        let format = self.shared.format;
        let len = format.check_request(buf.len(), start, count)?;
        if count == 0 {
            return Ok(0);
        }

        let end = start + count;

        let decoded = match self.read_policy {
            ReadPolicy::Partial => self.shared.state.decoded(),
            ReadPolicy::Block => self.shared.state.wait_for(end, self.read_timeout)?,
        };

        let valid = decoded.clamp(start, end) - start;
        let valid_len = format.byte_len(valid);
        let offset = format.byte_len(start);

        // SAFETY: every sample below `decoded` was written before it was
        // published (Release/Acquire on the count), and is never written again.
        let cached = unsafe { self.shared.arena.region(offset..offset + valid_len) };

        buf[..valid_len].copy_from_slice(cached);
        buf[valid_len..len].fill(0);

        Ok(valid)
    }
}

impl<S: SampleSource> Drop for RamCache<S> {
    fn drop(&mut self) {
        // Joins before `shared` (and so the arena) can be freed.
        drop(self.stop());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::test_data::*,
        error::DecodeError,
        provider::test_impls::*,
    };
    use std::{
        num::NonZeroU64,
        sync::atomic::{AtomicU64, Ordering},
        time::Instant,
    };

    fn pattern_cache(policy: ReadPolicy) -> RamCache<PatternSource> {
        RamCache::new(
            PatternSource::new(PATTERN_SAMPLES, 2, 2),
            &Config::test_cfg(policy),
        )
        .unwrap()
    }

    fn wait_until_complete<S: SampleSource>(cache: &RamCache<S>) {
        let deadline = Instant::now() + FILL_DEADLINE;
        while cache.decoded_samples() < cache.format().samples {
            assert!(Instant::now() < deadline, "cache fill did not complete in time");
            std::thread::yield_now();
        }
    }

    #[test]
    fn full_decode_reads_match_source() {
        let cache = pattern_cache(ReadPolicy::Partial);
        wait_until_complete(&cache);

        let mut buf = vec![0u8; 1_000 * 2 * 2];
        assert_eq!(cache.read(&mut buf, 50_000, 1_000).unwrap(), 1_000);
        assert!(PatternSource::matches(&buf, 50_000, 2, 2));

        // The status is recorded just after the final publish.
        assert!(matches!(
            cache.on_complete().recv_timeout(FILL_DEADLINE),
            Ok(FillEvent::Finished { samples: PATTERN_SAMPLES })
        ));
        assert!(matches!(cache.status(), FillStatus::Finished));
    }

    #[test]
    fn reads_match_direct_decode() {
        let cache = pattern_cache(ReadPolicy::Block);
        let mut direct = PatternSource::new(PATTERN_SAMPLES, 2, 2);

        for (start, count) in [(0, 1), (255, 2), (12_345, 777), (PATTERN_SAMPLES - 300, 300)] {
            let len = cache.format().byte_len(count);
            let mut cached = vec![0u8; len];
            let mut expected = vec![0u8; len];

            assert_eq!(cache.read(&mut cached, start, count).unwrap(), count);
            direct.decode(&mut expected, start, count).unwrap();

            assert_eq!(cached, expected);
        }
    }

    #[test]
    fn metadata_passes_through() {
        let source = PatternSource::new(1_000, 6, 3);
        let expected = source.format();
        let cache = RamCache::new(source, &Config::default()).unwrap();

        assert_eq!(cache.format(), expected);
    }

    #[test]
    fn chunks_are_clamped_to_stream_end() {
        let (source, calls) = PatternSource::new(1_000, 1, 2).with_call_log();
        let config = Config::default().chunk_samples(NonZeroU64::new(256).unwrap());
        let cache = RamCache::new(source, &config).unwrap();
        wait_until_complete(&cache);
        drop(cache);

        assert_eq!(
            *calls.lock(),
            vec![(0, 256), (256, 256), (512, 256), (768, 232)]
        );
    }

    #[test]
    fn decoded_count_is_monotonic_and_bounded() {
        let cache = pattern_cache(ReadPolicy::Partial);
        let mut last = 0;

        let deadline = Instant::now() + FILL_DEADLINE;
        while last < PATTERN_SAMPLES {
            let now = cache.decoded_samples();
            assert!(now >= last);
            assert!(now <= PATTERN_SAMPLES);
            last = now;
            assert!(Instant::now() < deadline, "cache fill did not complete in time");
        }
    }

    #[test]
    fn partial_reads_return_decoded_prefix() {
        let (source, gate) = GatedSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2));
        let cache = RamCache::new(source, &Config::test_cfg(ReadPolicy::Partial)).unwrap();

        gate.release(2);
        assert_eq!(cache.wait_for(512, Some(FILL_DEADLINE)).unwrap(), 512);

        let mut buf = vec![0xffu8; 400 * 2 * 2];
        assert_eq!(cache.read(&mut buf, 400, 400).unwrap(), 112);

        let (valid, rest) = buf.split_at(112 * 2 * 2);
        assert!(PatternSource::matches(valid, 400, 2, 2));
        assert!(rest.iter().all(|b| *b == 0));

        // Entirely undecoded requests are all zeroes.
        let mut buf = vec![0xffu8; 16];
        assert_eq!(cache.read(&mut buf, 90_000, 4).unwrap(), 0);
        assert!(buf.iter().all(|b| *b == 0));

        drop(gate);
    }

    #[test]
    fn blocking_reads_wait_for_worker() {
        let (source, gate) = GatedSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2));
        let cache = Arc::new(RamCache::new(source, &Config::test_cfg(ReadPolicy::Block)).unwrap());

        let reader = cache.clone();
        let handle = std::thread::spawn(move || {
            let mut buf = vec![0u8; 100 * 2 * 2];
            let valid = reader.read(&mut buf, 1_000, 100);
            (valid, buf)
        });

        // 1100 samples needs five chunks of 256.
        gate.release(5);

        let (valid, buf) = handle.join().unwrap();
        assert_eq!(valid.unwrap(), 100);
        assert!(PatternSource::matches(&buf, 1_000, 2, 2));
        drop(gate);
    }

    #[test]
    fn blocking_reads_time_out() {
        let (source, gate) = GatedSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2));
        let config = Config::test_cfg(ReadPolicy::Block).read_timeout(Some(Duration::from_millis(20)));
        let cache = RamCache::new(source, &config).unwrap();

        let mut buf = vec![0u8; 4];
        assert!(matches!(cache.read(&mut buf, 1_000, 1), Err(Error::TimedOut)));

        drop(gate);
    }

    #[test]
    fn out_of_range_reads_are_rejected() {
        let cache = pattern_cache(ReadPolicy::Block);
        let mut buf = vec![0u8; 4 * 10];

        assert!(matches!(
            cache.read(&mut buf, PATTERN_SAMPLES - 5, 10),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            cache.read(&mut buf, 0, 11),
            Err(Error::BufferTooSmall { needed: 44, actual: 40 })
        ));
        assert_eq!(cache.read(&mut buf, PATTERN_SAMPLES, 0).unwrap(), 0);
    }

    #[test]
    fn empty_reads_never_wait() {
        let (source, gate) = GatedSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2));
        let config = Config::test_cfg(ReadPolicy::Block).read_timeout(Some(FILL_DEADLINE));
        let cache = RamCache::new(source, &config).unwrap();

        let begun = Instant::now();
        assert_eq!(cache.read(&mut [], 50_000, 0).unwrap(), 0);
        assert!(begun.elapsed() < Duration::from_secs(1));
        assert_eq!(cache.decoded_samples(), 0);

        drop(gate);
    }

    #[test]
    fn empty_reads_ignore_failures() {
        let source = FailingSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2), 1_000);
        let cache = RamCache::new(source, &Config::test_cfg(ReadPolicy::Block)).unwrap();

        assert!(matches!(
            cache.on_complete().recv_timeout(FILL_DEADLINE),
            Ok(FillEvent::Failed { .. })
        ));
        assert_eq!(cache.read(&mut [], 5_000, 0).unwrap(), 0);
    }

    #[test]
    fn concurrent_readers_never_see_torn_samples() {
        let source = SlowSource::new(
            PatternSource::new(PATTERN_SAMPLES, 2, 4),
            Duration::from_micros(50),
        );
        let cache = Arc::new(RamCache::new(source, &Config::test_cfg(ReadPolicy::Partial)).unwrap());

        let readers: Vec<_> = (0..4u64)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    let mut buf = vec![0u8; 64 * 2 * 4];
                    let mut start = i * 97;
                    let deadline = Instant::now() + FILL_DEADLINE;

                    while !cache.is_complete() {
                        assert!(Instant::now() < deadline);
                        let valid = cache.read(&mut buf, start, 64).unwrap();
                        let valid_len = cache.format().byte_len(valid);
                        assert!(PatternSource::matches(&buf[..valid_len], start, 2, 4));

                        start = (start + 131) % (PATTERN_SAMPLES - 64);
                    }
                })
            })
            .collect();

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn decode_failure_is_sticky() {
        let source = FailingSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2), 1_000);
        let cache = RamCache::new(source, &Config::test_cfg(ReadPolicy::Block)).unwrap();

        let mut buf = vec![0u8; 4 * 100];
        assert!(matches!(cache.read(&mut buf, 2_000, 100), Err(Error::Decode(_))));
        assert!(matches!(cache.read(&mut buf, 5_000, 100), Err(Error::Decode(_))));

        // Samples published before the failure remain readable.
        assert_eq!(cache.decoded_samples(), 768);
        assert_eq!(cache.read(&mut buf, 600, 100).unwrap(), 100);
        assert!(PatternSource::matches(&buf, 600, 2, 2));

        assert!(matches!(cache.status(), FillStatus::Failed(_)));
    }

    #[test]
    fn decoder_panics_are_contained() {
        let source = FailingSource::new(PatternSource::new(PATTERN_SAMPLES, 2, 2), 300).panicking();
        let cache = RamCache::new(source, &Config::test_cfg(ReadPolicy::Block)).unwrap();

        let mut buf = vec![0u8; 4];
        match cache.read(&mut buf, 400, 1) {
            Err(Error::Decode(e)) => assert!(matches!(*e, DecodeError::Panicked(Some(_)))),
            other => panic!("expected a decode failure, got {:?}", other),
        }

        // The source is still handed back.
        assert!(cache.into_source().is_some());
    }

    #[test]
    fn memory_limit_rejects_with_source() {
        let source = PatternSource::new(PATTERN_SAMPLES, 2, 2);
        let config = Config::default().memory_limit(Some(PATTERN_SAMPLES as usize));

        let rejected = RamCache::new(source, &config).err().unwrap();
        assert!(matches!(
            rejected.error,
            Error::InsufficientMemory { requested } if requested == PATTERN_SAMPLES * 4
        ));
        assert_eq!(rejected.into_source().format().samples, PATTERN_SAMPLES);
    }

    #[test]
    fn unrepresentable_streams_are_rejected() {
        let source = PatternSource::new(u64::MAX / 2, 8, 8);

        assert!(matches!(
            RamCache::new(source, &Config::default()).err().unwrap().error,
            Error::InsufficientMemory {
                requested: u64::MAX
            }
        ));
    }

    #[test]
    fn immediate_drop_does_not_deadlock() {
        let start = Instant::now();

        for _ in 0..8 {
            let source = SlowSource::new(
                PatternSource::new(PATTERN_SAMPLES, 2, 2),
                Duration::from_millis(20),
            );
            drop(RamCache::new(source, &Config::default()).unwrap());
        }

        // A complete fill of each would take several seconds.
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn drop_mid_fill_stops_worker() {
        let (source, calls) = PatternSource::new(PATTERN_SAMPLES, 2, 2).with_call_log();
        let source = SlowSource::new(source, Duration::from_millis(5));
        let cache = RamCache::new(source, &Config::test_cfg(ReadPolicy::Partial)).unwrap();
        let events = cache.on_complete();

        cache.wait_for(768, Some(FILL_DEADLINE)).unwrap();
        drop(cache);

        assert!(calls.lock().len() < 20);
        assert!(matches!(
            events.try_recv(),
            Ok(FillEvent::Cancelled { decoded }) if decoded >= 768
        ));
    }

    #[test]
    fn progress_hook_sees_every_chunk() {
        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let config = Config::test_cfg(ReadPolicy::Partial).progress_hook(Some(Arc::new(
            move |decoded: u64, total: u64| {
                assert!(decoded <= total);
                counter.fetch_add(1, Ordering::Relaxed);
            },
        )));

        let cache = RamCache::new(PatternSource::new(1_000, 1, 1), &config).unwrap();
        let events = cache.on_complete();

        assert!(matches!(
            events.recv_timeout(FILL_DEADLINE),
            Ok(FillEvent::Finished { samples: 1_000 })
        ));
        assert_eq!(seen.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn into_source_returns_source() {
        let cache = pattern_cache(ReadPolicy::Partial);

        let source = cache.into_source().unwrap();
        assert_eq!(source.format().samples, PATTERN_SAMPLES);
    }

    #[tokio::test]
    async fn completion_can_be_awaited() {
        let cache = pattern_cache(ReadPolicy::Partial);
        let events = cache.on_complete();

        let event = tokio::time::timeout(FILL_DEADLINE, events.recv_async())
            .await
            .expect("fill did not complete in time")
            .unwrap();

        assert!(matches!(event, FillEvent::Finished { samples } if samples == PATTERN_SAMPLES));
        assert!(cache.is_complete());
    }
}
