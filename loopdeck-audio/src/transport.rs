//! Shared transport clock
//!
//! A sample counter advanced from the audio callback. Every loop repetition
//! is scheduled against this position, never against wall-clock timers, so
//! concurrent loops of different lengths stay locked together.

/// The shared sample-accurate clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transport {
    sample_rate: u32,
    running: bool,
    /// Frames elapsed since the transport last started
    position: u64,
}

impl Transport {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            running: false,
            position: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Frames since start; meaningful only while running.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn position_secs(&self) -> f64 {
        self.position as f64 / self.sample_rate as f64
    }

    /// Start from position zero. Running transports are left untouched.
    pub fn ensure_started(&mut self) {
        if !self.running {
            self.position = 0;
            self.running = true;
        }
    }

    /// Stop and rewind to zero. Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
        self.position = 0;
    }

    /// Advance by one processed block.
    pub fn advance(&mut self, frames: u64) {
        if self.running {
            self.position += frames;
        }
    }
}
