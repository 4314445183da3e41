use crate::error::{DecodeError, Error, Result};
use flume::Sender;
use parking_lot::{Condvar, Mutex};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::trace;

/// Lifecycle of a cache's fill worker.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum FillStatus {
    /// The worker is still decoding.
    Running,
    /// Every sample has been decoded.
    Finished,
    /// The worker was stopped before decoding every sample.
    Cancelled,
    /// The source failed. Samples before [`decoded_samples`] remain valid.
    ///
    /// [`decoded_samples`]: crate::provider::AudioProvider::decoded_samples
    Failed(Arc<DecodeError>),
}

impl FillStatus {
    /// Whether the worker has stopped, for any reason.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// Sent once to each subscriber when a cache's fill worker stops.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum FillEvent {
    /// The whole stream is cached.
    Finished {
        /// Number of samples in the stream.
        samples: u64,
    },
    /// The worker was stopped early.
    Cancelled {
        /// Number of samples decoded before cancellation.
        decoded: u64,
    },
    /// The source failed.
    Failed {
        /// Number of samples decoded before failure.
        decoded: u64,
        /// The source's error.
        error: Arc<DecodeError>,
    },
}

/// State shared between a cache and its fill worker.
pub(crate) struct FillState {
    total: u64,
    /// High-water mark of published samples. Written only by the worker.
    decoded: AtomicU64,
    cancelled: AtomicBool,
    /// Also the lock paired with `progress`.
    status: Mutex<FillStatus>,
    progress: Condvar,
    listeners: Mutex<Vec<Sender<FillEvent>>>,
}

impl FillState {
    pub(crate) fn new(total: u64) -> Self {
        Self {
            total,
            decoded: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            status: Mutex::new(FillStatus::Running),
            progress: Condvar::new(),
            listeners: Mutex::new(Vec::new()),
        }
    }

    #[inline]
    pub(crate) fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn total(&self) -> u64 {
        self.total
    }

    pub(crate) fn status(&self) -> FillStatus {
        self.status.lock().clone()
    }

    #[inline]
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Marks `count` more samples as readable.
    ///
    /// The worker must have finished writing those samples before calling this.
    pub(crate) fn publish(&self, count: u64) -> u64 {
        let prev = self.decoded.fetch_add(count, Ordering::Release);
        let now = prev + count;
        debug_assert!(now <= self.total, "published past end of stream");

        // Waiters check progress under this lock, so taking it here means
        // none can miss the wakeup.
        let _guard = self.status.lock();
        self.progress.notify_all();

        now
    }

    /// Records why the worker stopped, waking all waiters and notifying
    /// every subscriber.
    pub(crate) fn finish(&self, status: FillStatus) {
        let decoded = self.decoded();
        let event = match &status {
            FillStatus::Running => unreachable!("a stopping worker cannot still be running"),
            FillStatus::Finished => FillEvent::Finished {
                samples: self.total,
            },
            FillStatus::Cancelled => FillEvent::Cancelled { decoded },
            FillStatus::Failed(error) => FillEvent::Failed {
                decoded,
                error: error.clone(),
            },
        };

        {
            let mut guard = self.status.lock();
            *guard = status;
            self.progress.notify_all();
        }

        let listeners = std::mem::take(&mut *self.listeners.lock());
        trace!("Notifying {} fill listener(s).", listeners.len());
        for tx in listeners {
            // Subscribers may have lost interest.
            _ = tx.send(event.clone());
        }
    }

    pub(crate) fn subscribe(&self, tx: Sender<FillEvent>) {
        let mut listeners = self.listeners.lock();

        let event = match &*self.status.lock() {
            FillStatus::Running => None,
            FillStatus::Finished => Some(FillEvent::Finished {
                samples: self.total,
            }),
            FillStatus::Cancelled => Some(FillEvent::Cancelled {
                decoded: self.decoded(),
            }),
            FillStatus::Failed(error) => Some(FillEvent::Failed {
                decoded: self.decoded(),
                error: error.clone(),
            }),
        };

        match event {
            Some(event) => {
                _ = tx.send(event);
            },
            None => listeners.push(tx),
        }
    }

    /// Blocks until at least `target` samples are published, returning the
    /// published count.
    ///
    /// Returns early with an error if the worker stops without reaching
    /// `target`, or if `timeout` elapses.
    pub(crate) fn wait_for(&self, target: u64, timeout: Option<Duration>) -> Result<u64> {
        let target = target.min(self.total);
        let deadline = timeout.map(|t| Instant::now() + t);

        let mut status = self.status.lock();
        loop {
            let decoded = self.decoded();
            if decoded >= target {
                return Ok(decoded);
            }

            match &*status {
                FillStatus::Running => {},
                // Unreachable in practice: finishing publishes every sample.
                FillStatus::Finished => return Ok(decoded),
                FillStatus::Cancelled => return Err(Error::Cancelled),
                FillStatus::Failed(e) => return Err(Error::Decode(e.clone())),
            }

            match deadline {
                Some(deadline) => {
                    if self.progress.wait_until(&mut status, deadline).timed_out()
                        && self.decoded() < target
                        && !status.is_done()
                    {
                        return Err(Error::TimedOut);
                    }
                },
                None => self.progress.wait(&mut status),
            }
        }
    }
}
