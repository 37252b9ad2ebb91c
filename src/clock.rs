//! Scheduling seam for the monitor loop.
//!
//! The loop never touches timers directly: it asks a [`Clock`] for the next
//! sampling frame or for a fixed wait, so tests can drive it with tokio's
//! paused time or wrap it to observe the waits.

use async_trait::async_trait;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Resolve at the next sampling frame.
    async fn next_frame(&self);
    async fn sleep(&self, duration: Duration);
}

/// Tokio-timer clock ticking at a display-like frame rate.
#[derive(Debug, Clone)]
pub struct FrameClock {
    frame: Duration,
}

impl FrameClock {
    pub fn new(frame_rate_hz: u32) -> Self {
        let hz = frame_rate_hz.max(1) as u64;
        Self {
            frame: Duration::from_micros(1_000_000 / hz),
        }
    }

    pub fn frame_period(&self) -> Duration {
        self.frame
    }
}

#[async_trait]
impl Clock for FrameClock {
    async fn next_frame(&self) {
        tokio::time::sleep(self.frame).await;
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
