#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
//! Warbler is a RAM cache for decoded audio, intended to sit between a slow,
//! seek-hostile decoder and a consumer wanting cheap random access (waveform
//! renderers, scrubbing playback engines).
//!
//! The library offers:
//!  * [`RamCache`], which allocates one buffer for an entire stream and fills it
//!  from a [`SampleSource`] on a dedicated worker thread, while serving reads
//!  of whatever has been decoded so far.
//!  * [`Streaming`], an uncached provider which decodes on every read, for when
//!  a stream is too large to hold in memory.
//!  * The [`AudioProvider`] trait which both implement, and an [`open`] helper
//!  which picks between them.
//!
//! Decoding itself is left to the [`SampleSource`] implementor: warbler only
//! moves interleaved PCM bytes around.
//!
//! ## Reading before decode completes
//! The worker publishes its progress one chunk at a time. What a read does
//! when it asks for samples past that point is governed by [`ReadPolicy`]:
//! by default, the decoded prefix is copied and the rest zero-filled, and the
//! number of valid samples is returned.
//!
//! ```
//! # use warbler::{provider::{AudioFormat, SampleSource}, error::DecodeError};
//! use warbler::{AudioProvider, Config, RamCache};
//!
//! # struct Silence;
//! # impl SampleSource for Silence {
//! #     fn format(&self) -> AudioFormat {
//! #         AudioFormat { channels: 2, sample_rate: 48_000, bytes_per_sample: 2, float: false, samples: 48_000 }
//! #     }
//! #     fn decode(&mut self, buf: &mut [u8], _: u64, _: u64) -> Result<(), DecodeError> {
//! #         buf.fill(0);
//! #         Ok(())
//! #     }
//! # }
//! let cache = RamCache::new(Silence, &Config::default()).map_err(|r| r.error)?;
//! let mut buf = vec![0u8; cache.format().byte_len(1024)];
//!
//! let valid = cache.read(&mut buf, 0, 1024)?;
//! assert!(valid <= 1024);
//! # Ok::<(), warbler::error::Error>(())
//! ```
//!
//! [`RamCache`]: provider::RamCache
//! [`Streaming`]: provider::Streaming
//! [`SampleSource`]: provider::SampleSource
//! [`AudioProvider`]: provider::AudioProvider
//! [`open`]: provider::open
//! [`ReadPolicy`]: ReadPolicy

#![warn(clippy::pedantic)]
#![allow(
    // Allowed as they are too pedantic
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::cast_lossless,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc,
)]

mod config;
pub mod constants;
pub mod error;
pub mod provider;

pub use crate::provider::{open, AudioProvider, RamCache, Streaming};

pub use config::{Config, ProgressHook, ReadPolicy};
