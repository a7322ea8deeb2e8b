//! Pre-trigger frame buffer.

use std::collections::VecDeque;
use vigil_core::models::frame::Frame;

/// Keeps the most recent idle frames so a new episode can start a little
/// before its trigger. A capacity of 0 keeps nothing.
#[derive(Debug)]
pub struct LookbackBuffer {
    frames: VecDeque<Frame>,
    capacity: usize,
}

impl LookbackBuffer {
    /// Buffer holding at most `capacity` frames; 0 disables it.
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a frame, evicting the oldest one when full.
    pub fn push(&mut self, frame: Frame) {
        if self.capacity == 0 {
            return;
        }
        if self.frames.len() == self.capacity {
            self.frames.pop_front();
        }
        self.frames.push_back(frame);
    }

    /// Takes all buffered frames, oldest first.
    pub fn drain(&mut self) -> Vec<Frame> {
        self.frames.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use image::RgbaImage;
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, Instant::now(), Utc::now(), RgbaImage::new(1, 1))
    }

    #[test]
    fn keeps_most_recent() {
        let mut buf = LookbackBuffer::new(2);
        for seq in 1..=4 {
            buf.push(frame(seq));
        }
        let seqs: Vec<u64> = buf.drain().iter().map(|f| f.seq).collect();
        assert_eq!(seqs, vec![3, 4]);
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let mut buf = LookbackBuffer::new(0);
        buf.push(frame(1));
        assert_eq!(buf.len(), 0);
        assert!(buf.drain().is_empty());
    }
}
