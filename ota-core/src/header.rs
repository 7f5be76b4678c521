/// Collects the first bytes of a download until the image header can be
/// parsed safely.
///
/// Network reads never line up with structure boundaries, so nothing is
/// parsed until at least `ready_size` bytes are in the buffer. The buffer is
/// a fixed-capacity `heapless::Vec`; a chunk that would not fit is rejected
/// whole and the buffer is left as it was.
use heapless::Vec;

use crate::error::OtaError;
use crate::image::{AppDescriptor, HEADER_MIN_SIZE};

pub const HEADER_BUFFER_CAPACITY: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// More bytes needed; `needed` is how many at least.
    Pending { needed: usize },
    Ready,
}

pub struct HeaderAccumulator {
    buf: Vec<u8, HEADER_BUFFER_CAPACITY>,
    ready_size: usize,
}

impl HeaderAccumulator {
    /// `ready_size` is clamped to `[HEADER_MIN_SIZE, HEADER_BUFFER_CAPACITY]`.
    pub fn new(ready_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            ready_size: ready_size.clamp(HEADER_MIN_SIZE, HEADER_BUFFER_CAPACITY),
        }
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<Readiness, OtaError> {
        let overflow = OtaError::HeaderTooLarge {
            accumulated: self.buf.len(),
            incoming: chunk.len(),
            capacity: HEADER_BUFFER_CAPACITY,
        };
        if self.buf.len() + chunk.len() > HEADER_BUFFER_CAPACITY {
            return Err(overflow);
        }
        self.buf.extend_from_slice(chunk).map_err(|_| overflow)?;
        Ok(self.readiness())
    }

    pub fn readiness(&self) -> Readiness {
        if self.is_ready() {
            Readiness::Ready
        } else {
            Readiness::Pending { needed: self.ready_size - self.buf.len() }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.buf.len() >= self.ready_size
    }

    /// The app descriptor, once enough bytes are in.
    pub fn descriptor(&self) -> Option<AppDescriptor> {
        if !self.is_ready() {
            return None;
        }
        AppDescriptor::from_image_prefix(&self.buf)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn ready_size(&self) -> usize {
        self.ready_size
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Empty the buffer and change the threshold, so one accumulator can be
    /// reused across update attempts.
    pub fn reset(&mut self, ready_size: usize) {
        self.buf.clear();
        self.ready_size = ready_size.clamp(HEADER_MIN_SIZE, HEADER_BUFFER_CAPACITY);
    }
}
