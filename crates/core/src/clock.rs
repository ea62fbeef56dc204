use crate::config::FrameRate;

/// Presentation time and duration stamped on one frame, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    pub pts_ns: u64,
    pub duration_ns: u64,
}

/// Running presentation-timestamp accumulator of a session.
///
/// Timestamps start at zero and advance by exactly one frame duration per
/// [`tick`](Self::tick), independent of how long producing the frame took.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frame_duration_ns: u64,
    next_pts_ns: u64,
    frames: u64,
}

impl FrameClock {
    pub fn new(rate: FrameRate) -> Self {
        Self {
            frame_duration_ns: rate.frame_duration_ns(),
            next_pts_ns: 0,
            frames: 0,
        }
    }

    /// Timing for the next frame; advances the accumulator.
    pub fn tick(&mut self) -> FrameTiming {
        let timing = FrameTiming {
            pts_ns: self.next_pts_ns,
            duration_ns: self.frame_duration_ns,
        };
        self.next_pts_ns += self.frame_duration_ns;
        self.frames += 1;
        timing
    }

    /// Timestamp the next frame will carry.
    pub fn next_pts_ns(&self) -> u64 {
        self.next_pts_ns
    }

    pub fn frame_duration_ns(&self) -> u64 {
        self.frame_duration_ns
    }

    /// Number of frames stamped so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}
