//! Bounded frame-buffer pool access.
//!
//! The pipeline holds on to pushed buffers until the encoder has consumed
//! them, so a pool of [`POOL_CAPACITY`] buffers caps how far production can
//! run ahead of consumption. Acquiring from an exhausted pool either blocks
//! or, with [`AcquireWait::Timeout`], fails with [`Error::PoolExhausted`].

use std::thread;
use std::time::{Duration, Instant};

use crate::config::AcquireWait;
use crate::error::{Error, Result};
use crate::frame::FrameBuffer;

/// Number of buffers per pool (double buffering).
pub const POOL_CAPACITY: u32 = 2;

const MIN_BACKOFF: Duration = Duration::from_micros(100);
const MAX_BACKOFF: Duration = Duration::from_millis(2);

/// A bounded set of reusable frame buffers.
///
/// Buffers return to the pool when the consumer drops them.
pub trait FramePool {
    type Frame: FrameBuffer;

    /// Take a free buffer without waiting; `Ok(None)` when all are outstanding.
    fn try_acquire(&self) -> Result<Option<Self::Frame>>;

    /// Take a free buffer, waiting as long as it takes.
    fn acquire(&self) -> Result<Self::Frame>;
}

/// Acquire one buffer according to `wait`.
pub fn acquire_frame<P: FramePool + ?Sized>(pool: &P, wait: AcquireWait) -> Result<P::Frame> {
    let limit = match wait {
        AcquireWait::Block => return pool.acquire(),
        AcquireWait::Timeout(limit) => limit,
    };

    let deadline = Instant::now() + limit;
    let mut backoff = MIN_BACKOFF;
    loop {
        if let Some(frame) = pool.try_acquire()? {
            return Ok(frame);
        }
        let now = Instant::now();
        if now >= deadline {
            tracing::warn!(?limit, "frame pool exhausted");
            return Err(Error::PoolExhausted(limit));
        }
        thread::sleep(backoff.min(deadline - now));
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::clock::FrameTiming;
    use crate::frame::DeviceFrame;

    struct Frame;

    impl FrameBuffer for Frame {
        fn write_with<R>(&mut self, write: impl FnOnce(DeviceFrame) -> R) -> Result<R> {
            Ok(write(DeviceFrame { ptr: 0, len: 0 }))
        }

        fn set_timing(&mut self, _timing: FrameTiming) {}
    }

    /// Hands out a frame once `free_after` polls have failed.
    struct Pool {
        polls: Cell<u32>,
        free_after: Option<u32>,
    }

    impl FramePool for Pool {
        type Frame = Frame;

        fn try_acquire(&self) -> Result<Option<Frame>> {
            let polls = self.polls.get();
            self.polls.set(polls + 1);
            Ok(match self.free_after {
                Some(n) if polls >= n => Some(Frame),
                _ => None,
            })
        }

        fn acquire(&self) -> Result<Frame> {
            Ok(Frame)
        }
    }

    #[test]
    fn block_uses_blocking_acquire() {
        let pool = Pool {
            polls: Cell::new(0),
            free_after: None,
        };
        assert!(acquire_frame(&pool, AcquireWait::Block).is_ok());
        assert_eq!(pool.polls.get(), 0);
    }

    #[test]
    fn timeout_waits_for_release() {
        let pool = Pool {
            polls: Cell::new(0),
            free_after: Some(3),
        };
        assert!(acquire_frame(&pool, AcquireWait::Timeout(Duration::from_secs(1))).is_ok());
        assert_eq!(pool.polls.get(), 4);
    }

    #[test]
    fn timeout_surfaces_exhaustion() {
        let pool = Pool {
            polls: Cell::new(0),
            free_after: None,
        };
        let limit = Duration::from_millis(20);
        let started = Instant::now();
        let err = acquire_frame(&pool, AcquireWait::Timeout(limit)).err().unwrap();
        assert!(matches!(err, Error::PoolExhausted(d) if d == limit));
        assert!(started.elapsed() >= limit);
    }
}
