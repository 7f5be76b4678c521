/// Update engine tunables that can be tested independently
use core::time::Duration;
use serde::{Deserialize, Serialize};

use crate::header::HEADER_BUFFER_CAPACITY;
use crate::image::HEADER_MIN_SIZE;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OtaConfig {
    /// Consecutive zero-length reads tolerated before the link is declared dead.
    pub max_zero_reads: u32,
    /// Wait after a zero read while the header is still being collected.
    pub header_poll_delay_ms: u32,
    /// Wait after a zero read once the image is being written.
    pub body_poll_delay_ms: u32,
    /// Extra bytes collected past the descriptor before parsing.
    pub header_safety_margin: usize,
    /// Log progress every this many percent of the announced length.
    pub progress_step_percent: u8,
}

impl Default for OtaConfig {
    fn default() -> Self {
        Self {
            max_zero_reads: 10,
            header_poll_delay_ms: 100,
            body_poll_delay_ms: 50,
            header_safety_margin: 1024,
            progress_step_percent: 10,
        }
    }
}

impl OtaConfig {
    /// Clamp values that would make the engine misbehave, e.g. loaded from
    /// a hand-edited NVS blob.
    pub fn validated(mut self) -> Self {
        if self.max_zero_reads == 0 {
            log::warn!("max_zero_reads of 0 is not usable, using 1");
            self.max_zero_reads = 1;
        }
        let max_margin = HEADER_BUFFER_CAPACITY - HEADER_MIN_SIZE;
        if self.header_safety_margin > max_margin {
            log::warn!(
                "header_safety_margin {} exceeds buffer room, clamping to {}",
                self.header_safety_margin,
                max_margin
            );
            self.header_safety_margin = max_margin;
        }
        self.progress_step_percent = self.progress_step_percent.clamp(1, 100);
        self
    }

    pub fn header_poll_delay(&self) -> Duration {
        Duration::from_millis(self.header_poll_delay_ms as u64)
    }

    pub fn body_poll_delay(&self) -> Duration {
        Duration::from_millis(self.body_poll_delay_ms as u64)
    }

    /// Bytes that must be collected before the header is parsed.
    pub fn header_ready_size(&self) -> usize {
        HEADER_MIN_SIZE + self.header_safety_margin
    }
}
