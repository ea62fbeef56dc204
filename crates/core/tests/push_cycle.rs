//! Push cycle against in-memory stand-ins for the GPU context, the buffer
//! pool and the pipeline.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use cuda_rtsp_core::{
    AcquireWait, ContextStack, DeviceFrame, Error, FrameBuffer, FramePool, FrameRate, FrameSink,
    FrameTiming, POOL_CAPACITY, PushCycle, Result,
};
use parking_lot::{Condvar, Mutex};

const FRAME_BYTES: usize = 640 * 480 * 4;

#[derive(Default)]
struct Context {
    depth: AtomicI32,
    pushes: AtomicU32,
}

impl ContextStack for Context {
    fn push_current(&self) -> Result<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn pop_current(&self) -> Result<()> {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct PoolState {
    outstanding: Mutex<u32>,
    released: Condvar,
    peak: AtomicU32,
}

struct Frame {
    len: usize,
    timing: Option<FrameTiming>,
    filled: bool,
    state: Arc<PoolState>,
}

impl FrameBuffer for Frame {
    fn write_with<R>(&mut self, write: impl FnOnce(DeviceFrame) -> R) -> Result<R> {
        let out = write(DeviceFrame {
            ptr: 0xdead_0000,
            len: self.len,
        });
        self.filled = true;
        Ok(out)
    }

    fn set_timing(&mut self, timing: FrameTiming) {
        self.timing = Some(timing);
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        *self.state.outstanding.lock() -= 1;
        self.state.released.notify_one();
    }
}

struct Pool {
    capacity: u32,
    state: Arc<PoolState>,
}

impl Pool {
    fn new(capacity: u32) -> Self {
        Self {
            capacity,
            state: Arc::default(),
        }
    }

    fn take(&self, outstanding: &mut u32) -> Frame {
        *outstanding += 1;
        self.state.peak.fetch_max(*outstanding, Ordering::SeqCst);
        Frame {
            len: FRAME_BYTES,
            timing: None,
            filled: false,
            state: self.state.clone(),
        }
    }
}

impl FramePool for Pool {
    type Frame = Frame;

    fn try_acquire(&self) -> Result<Option<Frame>> {
        let mut outstanding = self.state.outstanding.lock();
        if *outstanding >= self.capacity {
            return Ok(None);
        }
        Ok(Some(self.take(&mut outstanding)))
    }

    fn acquire(&self) -> Result<Frame> {
        let mut outstanding = self.state.outstanding.lock();
        while *outstanding >= self.capacity {
            self.state.released.wait(&mut outstanding);
        }
        Ok(self.take(&mut outstanding))
    }
}

/// Keeps every pushed frame alive.
#[derive(Default)]
struct HoldingSink {
    frames: Mutex<Vec<Frame>>,
}

impl FrameSink<Frame> for HoldingSink {
    fn push(&self, frame: Frame) -> Result<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

/// Records timings and releases frames immediately.
#[derive(Default)]
struct RecordingSink {
    timings: Mutex<Vec<FrameTiming>>,
}

impl FrameSink<Frame> for RecordingSink {
    fn push(&self, frame: Frame) -> Result<()> {
        assert!(frame.filled, "frame pushed before it was filled");
        self.timings.lock().push(frame.timing.expect("unstamped frame"));
        Ok(())
    }
}

struct FailingSink;

impl FrameSink<Frame> for FailingSink {
    fn push(&self, _frame: Frame) -> Result<()> {
        Err(Error::pipeline("flushing"))
    }
}

fn thirty_fps() -> FrameRate {
    FrameRate::new(30, 1).unwrap()
}

#[test]
fn pacing_is_exact_regardless_of_callback_latency() {
    let context = Context::default();
    let pool = Pool::new(POOL_CAPACITY);
    let sink = RecordingSink::default();
    let mut calls = 0u64;
    let source = move |_frame: DeviceFrame| {
        calls += 1;
        thread::sleep(Duration::from_millis(calls % 4));
    };
    let mut cycle = PushCycle::new(source, thirty_fps(), AcquireWait::Block);

    for _ in 0..12 {
        cycle.run(&context, &pool, &sink).unwrap();
    }

    let timings = sink.timings.lock();
    assert_eq!(timings.len(), 12);
    for (n, timing) in timings.iter().enumerate() {
        assert_eq!(timing.pts_ns, n as u64 * 33_333_333);
        assert_eq!(timing.duration_ns, 33_333_333);
    }
    assert_eq!(cycle.clock().next_pts_ns(), 12 * 33_333_333);
}

#[test]
fn source_sees_whole_frame_with_context_current() {
    let context = Arc::new(Context::default());
    let pool = Pool::new(POOL_CAPACITY);
    let sink = RecordingSink::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let source = {
        let context = context.clone();
        let seen = seen.clone();
        move |frame: DeviceFrame| {
            seen.lock()
                .push((frame.len, context.depth.load(Ordering::SeqCst)));
        }
    };
    let mut cycle = PushCycle::new(source, thirty_fps(), AcquireWait::Block);

    cycle.run(&context, &pool, &sink).unwrap();

    assert_eq!(*seen.lock(), vec![(1_228_800, 1)]);
    assert_eq!(context.depth.load(Ordering::SeqCst), 0);
}

#[test]
fn failing_source_restores_context_and_keeps_clock() {
    let context = Context::default();
    let pool = Pool::new(POOL_CAPACITY);
    let sink = RecordingSink::default();
    struct Broken;
    impl cuda_rtsp_core::FrameSource for Broken {
        fn produce(&mut self, _frame: DeviceFrame) -> std::result::Result<(), cuda_rtsp_core::SourceError> {
            Err("device lost".into())
        }
    }
    let mut cycle = PushCycle::new(Broken, thirty_fps(), AcquireWait::Block);

    let err = cycle.run(&context, &pool, &sink).unwrap_err();

    assert!(matches!(err, Error::Source(_)));
    assert_eq!(context.depth.load(Ordering::SeqCst), 0);
    assert_eq!(cycle.clock().next_pts_ns(), 0);
    assert!(sink.timings.lock().is_empty());
    assert_eq!(*pool.state.outstanding.lock(), 0);
}

#[test]
fn failing_push_restores_context() {
    let context = Context::default();
    let pool = Pool::new(POOL_CAPACITY);
    let mut cycle = PushCycle::new(|_: DeviceFrame| {}, thirty_fps(), AcquireWait::Block);

    assert!(matches!(
        cycle.run(&context, &pool, &FailingSink),
        Err(Error::Pipeline(_))
    ));
    assert_eq!(context.depth.load(Ordering::SeqCst), 0);
    assert_eq!(context.pushes.load(Ordering::SeqCst), 1);
}

#[test]
fn exhausted_pool_times_out() {
    let context = Context::default();
    let pool = Pool::new(POOL_CAPACITY);
    let sink = HoldingSink::default();
    let wait = AcquireWait::Timeout(Duration::from_millis(30));
    let mut cycle = PushCycle::new(|_: DeviceFrame| {}, thirty_fps(), wait);

    cycle.run(&context, &pool, &sink).unwrap();
    cycle.run(&context, &pool, &sink).unwrap();
    let err = cycle.run(&context, &pool, &sink).unwrap_err();

    assert!(matches!(err, Error::PoolExhausted(_)));
    assert_eq!(context.depth.load(Ordering::SeqCst), 0);
    assert_eq!(cycle.clock().frames(), 2);

    sink.frames.lock().remove(0);
    let timing = cycle.run(&context, &pool, &sink).unwrap();
    assert_eq!(timing.pts_ns, 2 * 33_333_333);
}

#[test]
fn slow_consumer_bounds_outstanding_buffers() {
    struct ChannelSink(mpsc::Sender<Frame>);

    impl FrameSink<Frame> for ChannelSink {
        fn push(&self, frame: Frame) -> Result<()> {
            self.0
                .send(frame)
                .map_err(|_| Error::pipeline("consumer gone"))
        }
    }

    let context = Context::default();
    let pool = Pool::new(POOL_CAPACITY);
    let state = pool.state.clone();
    let (tx, rx) = mpsc::channel::<Frame>();
    let consumer = thread::spawn(move || {
        let mut last = None;
        for frame in rx {
            thread::sleep(Duration::from_millis(3));
            let pts = frame.timing.unwrap().pts_ns;
            if let Some(prev) = last {
                assert!(pts > prev);
            }
            last = Some(pts);
        }
        last
    });

    let sink = ChannelSink(tx);
    let mut cycle = PushCycle::new(|_: DeviceFrame| {}, thirty_fps(), AcquireWait::Block);
    for _ in 0..25 {
        cycle.run(&context, &pool, &sink).unwrap();
    }
    drop(sink);

    let last = consumer.join().unwrap();
    assert_eq!(last, Some(24 * 33_333_333));
    assert_eq!(state.peak.load(Ordering::SeqCst), POOL_CAPACITY);
    assert_eq!(*state.outstanding.lock(), 0);
    assert_eq!(context.depth.load(Ordering::SeqCst), 0);
}
