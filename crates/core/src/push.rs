//! The steady-state frame production step.
//!
//! One [`PushCycle::run`] produces one frame:
//!
//! ```text
//! push GPU context
//!   acquire pooled buffer        (blocks / times out while 2 are outstanding)
//!   map -> source.produce() -> unmap
//!   stamp pts = clock, duration = den * 1s / num; advance clock
//!   push into the pipeline
//! pop GPU context                (also on every early return)
//! ```

use crate::clock::{FrameClock, FrameTiming};
use crate::config::{AcquireWait, FrameRate};
use crate::context::{ContextGuard, ContextStack};
use crate::error::{Error, Result};
use crate::frame::{FrameBuffer, FrameSink, FrameSource};
use crate::pool::{FramePool, acquire_frame};

/// Per-session producer state: the caller's frame source and the running
/// timestamp accumulator.
pub struct PushCycle<S> {
    source: S,
    clock: FrameClock,
    wait: AcquireWait,
}

impl<S: FrameSource> PushCycle<S> {
    pub fn new(source: S, rate: FrameRate, wait: AcquireWait) -> Self {
        Self {
            source,
            clock: FrameClock::new(rate),
            wait,
        }
    }

    /// Produce one frame and hand it to `sink`.
    ///
    /// The clock only advances once the source has filled the buffer, so a
    /// failed fill does not leave a gap in the timestamp sequence.
    pub fn run<C, P, K>(&mut self, context: &C, pool: &P, sink: &K) -> Result<FrameTiming>
    where
        C: ContextStack + ?Sized,
        P: FramePool + ?Sized,
        K: FrameSink<P::Frame> + ?Sized,
    {
        let guard = ContextGuard::push(context)?;

        let mut frame = acquire_frame(pool, self.wait)?;
        let source = &mut self.source;
        frame
            .write_with(|device| source.produce(device))?
            .map_err(Error::Source)?;

        let timing = self.clock.tick();
        frame.set_timing(timing);
        sink.push(frame)?;

        guard.release()?;
        tracing::trace!(
            pts_ns = timing.pts_ns,
            frames = self.clock.frames(),
            "frame pushed"
        );
        Ok(timing)
    }

    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }
}
