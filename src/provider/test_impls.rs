//! Synthetic sample sources, for testing and benchmarking providers.
//!
//! Included if using the `"internals"` feature flag.
#![allow(missing_docs)]

use super::{AudioFormat, SampleSource};
use crate::error::DecodeError;
use byteorder::{ByteOrder, LittleEndian};
use flume::{Receiver, Sender};
use parking_lot::Mutex;
use std::{sync::Arc, thread, time::Duration};

/// A source where each channel value encodes its own position in the stream.
///
/// Value `c` of sample `i` holds the low bytes of `i × channels + c`, in
/// little-endian order. This makes torn or misplaced copies easy to spot.
#[derive(Clone, Debug)]
pub struct PatternSource {
    format: AudioFormat,
    needs_cache: bool,
    calls: Option<CallLog>,
}

pub type CallLog = Arc<Mutex<Vec<(u64, u64)>>>;

impl PatternSource {
    #[must_use]
    pub fn new(samples: u64, channels: u16, bytes_per_sample: u8) -> Self {
        assert!(
            (1..=8).contains(&bytes_per_sample),
            "Pattern values must fit in a u64."
        );

        Self {
            format: AudioFormat {
                channels,
                sample_rate: 48_000,
                bytes_per_sample,
                float: false,
                samples,
            },
            needs_cache: false,
            calls: None,
        }
    }

    #[must_use]
    pub fn with_needs_cache(mut self, needs_cache: bool) -> Self {
        self.needs_cache = needs_cache;
        self
    }

    /// Records the range of every `decode` call made on this source.
    #[must_use]
    pub fn with_call_log(mut self) -> (Self, CallLog) {
        let log = CallLog::default();
        self.calls = Some(log.clone());
        (self, log)
    }

    fn value(index: u64, channels: u16, channel: u16, bytes_per_sample: u8) -> u64 {
        let raw = index
            .wrapping_mul(channels as u64)
            .wrapping_add(channel as u64);

        if bytes_per_sample >= 8 {
            raw
        } else {
            raw & ((1u64 << (8 * bytes_per_sample as u32)) - 1)
        }
    }

    /// Writes the pattern for samples starting at `start` over all of `buf`.
    pub fn fill(buf: &mut [u8], start: u64, channels: u16, bytes_per_sample: u8) {
        let width = bytes_per_sample as usize;
        let frame = channels as usize * width;

        for (i, sample) in buf.chunks_exact_mut(frame).enumerate() {
            for (c, value) in sample.chunks_exact_mut(width).enumerate() {
                let v = Self::value(start + i as u64, channels, c as u16, bytes_per_sample);
                LittleEndian::write_uint(value, v, width);
            }
        }
    }

    /// Checks that `buf` holds exactly the pattern for samples from `start`.
    #[must_use]
    pub fn matches(buf: &[u8], start: u64, channels: u16, bytes_per_sample: u8) -> bool {
        let width = bytes_per_sample as usize;
        let frame = channels as usize * width;

        buf.len() % frame == 0
            && buf.chunks_exact(frame).enumerate().all(|(i, sample)| {
                sample.chunks_exact(width).enumerate().all(|(c, value)| {
                    LittleEndian::read_uint(value, width)
                        == Self::value(start + i as u64, channels, c as u16, bytes_per_sample)
                })
            })
    }
}

impl SampleSource for PatternSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn decode(&mut self, buf: &mut [u8], start: u64, count: u64) -> Result<(), DecodeError> {
        if let Some(calls) = &self.calls {
            calls.lock().push((start, count));
        }

        Self::fill(
            buf,
            start,
            self.format.channels,
            self.format.bytes_per_sample,
        );

        Ok(())
    }

    fn needs_cache(&self) -> bool {
        self.needs_cache
    }
}

/// How a [`FailingSource`] misbehaves once it reaches its trigger sample.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Failure {
    Error,
    Panic,
}

/// Wraps another source, failing any decode which touches `fail_at` or later.
pub struct FailingSource<S> {
    inner: S,
    fail_at: u64,
    failure: Failure,
}

impl<S: SampleSource> FailingSource<S> {
    pub fn new(inner: S, fail_at: u64) -> Self {
        Self {
            inner,
            fail_at,
            failure: Failure::Error,
        }
    }

    #[must_use]
    pub fn panicking(mut self) -> Self {
        self.failure = Failure::Panic;
        self
    }
}

impl<S: SampleSource> SampleSource for FailingSource<S> {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn decode(&mut self, buf: &mut [u8], start: u64, count: u64) -> Result<(), DecodeError> {
        if start + count > self.fail_at {
            match self.failure {
                Failure::Error => return Err(DecodeError::new("corrupt packet")),
                Failure::Panic => panic!("decoder state corrupted at sample {}", start),
            }
        }

        self.inner.decode(buf, start, count)
    }

    fn needs_cache(&self) -> bool {
        self.inner.needs_cache()
    }
}

/// Wraps another source, requiring a permit from its [`Gate`] before each
/// decode call.
///
/// Once the gate is dropped, decodes proceed freely.
pub struct GatedSource<S> {
    inner: S,
    permits: Receiver<()>,
}

/// Control handle for a [`GatedSource`].
pub struct Gate {
    permits: Sender<()>,
}

impl Gate {
    /// Allow `n` more decode calls.
    pub fn release(&self, n: usize) {
        for _ in 0..n {
            // Receiver lives as long as the source; a dead source needs no permits.
            _ = self.permits.send(());
        }
    }
}

impl<S: SampleSource> GatedSource<S> {
    pub fn new(inner: S) -> (Self, Gate) {
        let (tx, rx) = flume::unbounded();

        (
            Self { inner, permits: rx },
            Gate { permits: tx },
        )
    }
}

impl<S: SampleSource> SampleSource for GatedSource<S> {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn decode(&mut self, buf: &mut [u8], start: u64, count: u64) -> Result<(), DecodeError> {
        // An error here means the gate was dropped: run unimpeded.
        _ = self.permits.recv();
        self.inner.decode(buf, start, count)
    }

    fn needs_cache(&self) -> bool {
        self.inner.needs_cache()
    }
}

/// Wraps another source, sleeping for a fixed time on every decode call.
pub struct SlowSource<S> {
    inner: S,
    delay: Duration,
}

impl<S: SampleSource> SlowSource<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

impl<S: SampleSource> SampleSource for SlowSource<S> {
    fn format(&self) -> AudioFormat {
        self.inner.format()
    }

    fn decode(&mut self, buf: &mut [u8], start: u64, count: u64) -> Result<(), DecodeError> {
        thread::sleep(self.delay);
        self.inner.decode(buf, start, count)
    }

    fn needs_cache(&self) -> bool {
        self.inner.needs_cache()
    }
}
