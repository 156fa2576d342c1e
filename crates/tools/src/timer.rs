use std::time::{Duration, Instant};

/// Rolling window of frame durations.
#[derive(Debug)]
pub struct FrameTimer {
    history: Vec<Duration>,
    capacity: usize,
    index: usize,
    filled: bool,
}

impl FrameTimer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: vec![Duration::ZERO; capacity],
            capacity,
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.index] = dt;
        self.index = (self.index + 1) % self.capacity;
        if self.index == 0 {
            self.filled = true;
        }
    }

    pub fn count(&self) -> usize {
        if self.filled { self.capacity } else { self.index }
    }

    fn samples(&self) -> &[Duration] {
        &self.history[..self.count()]
    }

    pub fn average(&self) -> Duration {
        match self.count() {
            0 => Duration::ZERO,
            n => self.samples().iter().sum::<Duration>() / n as u32,
        }
    }

    pub fn max(&self) -> Duration {
        self.samples().iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.samples().iter().copied().min().unwrap_or(Duration::ZERO)
    }
}

/// Frames-per-second over fixed windows.
///
/// The rate only changes when a window closes, so an overlay reading it every
/// frame shows a stable number.
#[derive(Debug)]
pub struct FpsCounter {
    window: Duration,
    window_start: Instant,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    /// Window length used by the demos.
    pub const DEFAULT_WINDOW: Duration = Duration::from_millis(500);

    pub fn new(now: Instant) -> Self {
        Self::with_window(now, Self::DEFAULT_WINDOW)
    }

    pub fn with_window(now: Instant, window: Duration) -> Self {
        Self {
            window,
            window_start: now,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Count one frame. Returns the new rate when a window closed.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }
        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        tracing::trace!(fps = self.fps, frames = self.frames, "fps window closed");
        self.frames = 0;
        self.window_start = now;
        Some(self.fps)
    }

    /// Rate measured over the last closed window.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}
