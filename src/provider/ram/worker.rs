use super::{FillStatus, Shared};
use crate::{error::DecodeError, provider::SampleSource, ProgressHook};
use parking_lot::Mutex;
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use tracing::{debug, error, instrument, trace};

/// The fill worker is synchronous, as sample sources are blocking decoders.
///
/// It takes the source from `slot` (so that a failed spawn can hand it back),
/// decodes the stream chunk by chunk into the shared arena, and returns the
/// source once it has stopped.
#[instrument(skip_all, fields(samples = shared.state.total(), chunk = chunk))]
pub(crate) fn runner<S: SampleSource>(
    slot: Arc<Mutex<Option<S>>>,
    shared: Arc<Shared>,
    chunk: u64,
    hook: Option<ProgressHook>,
) -> Option<S> {
    trace!("Fill thread started.");

    let taken = slot.lock().take();
    let mut source = match taken {
        Some(source) => source,
        None => {
            shared.state.finish(FillStatus::Cancelled);
            return None;
        },
    };

    let status = panic::catch_unwind(AssertUnwindSafe(|| {
        fill(&mut source, &shared, chunk, hook.as_deref())
    }))
    .unwrap_or_else(|payload| {
        FillStatus::Failed(Arc::new(DecodeError::Panicked(panic_message(&*payload))))
    });

    match &status {
        FillStatus::Finished => debug!("Cached all {} samples.", shared.state.total()),
        FillStatus::Cancelled => debug!(
            "Fill cancelled after {} of {} samples.",
            shared.state.decoded(),
            shared.state.total()
        ),
        FillStatus::Failed(e) => error!(
            "Source failed after {} of {} samples: {}.",
            shared.state.decoded(),
            shared.state.total(),
            e
        ),
        FillStatus::Running => {},
    }

    shared.state.finish(status);
    trace!("Fill thread finished.");

    Some(source)
}

fn fill<S: SampleSource>(
    source: &mut S,
    shared: &Shared,
    chunk: u64,
    hook: Option<&(dyn Fn(u64, u64) + Send + Sync)>,
) -> FillStatus {
    let format = shared.format;
    let total = shared.state.total();
    let mut pos = 0;

    while pos < total {
        if shared.state.is_cancelled() {
            return FillStatus::Cancelled;
        }

        let count = chunk.min(total - pos);
        let bytes = format.byte_len(pos)..format.byte_len(pos + count);

        // SAFETY: this thread is the arena's only writer, and only ever writes
        // at or beyond `pos`, which has not yet been published. Readers never
        // look past the published count.
        let dest = unsafe { shared.arena.region_mut(bytes) };

        if let Err(e) = source.decode(dest, pos, count) {
            return FillStatus::Failed(Arc::new(e));
        }

        pos = shared.state.publish(count);
        trace!("Published {} of {} samples.", pos, total);

        if let Some(hook) = hook {
            hook(pos, total);
        }
    }

    FillStatus::Finished
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<String> {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
}
