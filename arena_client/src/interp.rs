//! Interpolation.
//!
//! The server sends discrete snapshots at its broadcast rate. A viewer draws
//! at its own rate and interpolates circle positions between the two most
//! recent frames.

use std::collections::VecDeque;

use arena_shared::physics::{Circle, CircleId};

/// One decoded snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Arrival order, starting at 0.
    pub seq: u64,
    pub circles: Vec<Circle>,
}

/// Bounded history of decoded frames.
#[derive(Default)]
pub struct FrameBuffer {
    history: VecDeque<Frame>,
    max: usize,
    next_seq: u64,
}

impl FrameBuffer {
    pub fn new(max: usize) -> Self {
        Self {
            history: VecDeque::new(),
            max: max.max(1),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, circles: Vec<Circle>) -> &Frame {
        let frame = Frame {
            seq: self.next_seq,
            circles,
        };
        self.next_seq += 1;
        self.history.push_back(frame);
        while self.history.len() > self.max {
            self.history.pop_front();
        }
        &self.history[self.history.len() - 1]
    }

    /// Returns the number of buffered frames.
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if no frames are buffered.
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Total frames received, including evicted ones.
    pub fn received(&self) -> u64 {
        self.next_seq
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.history.back()
    }

    /// Interpolated center of circle `id` between the last two frames.
    ///
    /// `alpha` is clamped to $[0,1]$ where 0 = older frame, 1 = newer.
    pub fn interp_circle(&self, id: CircleId, alpha: f32) -> Option<(f32, f32)> {
        if self.history.len() < 2 {
            return None;
        }
        let a = find_circle(&self.history[self.history.len() - 2], id)?;
        let b = find_circle(&self.history[self.history.len() - 1], id)?;
        let t = alpha.clamp(0.0, 1.0);
        let lerp = |from: u16, to: u16| {
            let from = f32::from(from);
            from + (f32::from(to) - from) * t
        };
        Some((lerp(a.x, b.x), lerp(a.y, b.y)))
    }
}

/// Convenience: find a circle in a frame.
pub fn find_circle(frame: &Frame, id: CircleId) -> Option<&Circle> {
    frame.circles.iter().find(|c| c.id == id)
}
