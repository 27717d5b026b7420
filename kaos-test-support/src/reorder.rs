//! Out-of-order delivery simulation for stream frames.
//!
//! Stream frames arrive carrying absolute end offsets. A path that reorders
//! packets hands the receiver offsets that go backwards, which the stream
//! flow controller must tolerate.

use kaos_shared::ByteCount;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Pattern for reordering simulation
#[derive(Debug, Clone)]
pub enum ReorderPattern {
    /// Deliver in order
    None,
    /// Deliver everything backwards
    Reverse,
    /// Swap every Nth frame with its predecessor
    SwapAdjacent { every_n: usize },
    /// Swap each frame with a later one (within `max_distance`) with given probability
    Random {
        probability: f64,
        max_distance: usize,
        seed: u64,
    },
}

/// Reorders frames according to a [`ReorderPattern`].
///
/// Random patterns use a seeded RNG so failures reproduce.
///
/// # Example
///
/// ```
/// use kaos_test_support::reorder::{frame_offsets, Reorderer};
///
/// let mut reorderer = Reorderer::swap_adjacent(2);
/// let delivered = reorderer.reorder(frame_offsets(40, 10));
/// assert_eq!(delivered, vec![20, 10, 40, 30]);
/// ```
pub struct Reorderer {
    pattern: ReorderPattern,
    rng: StdRng,
    frames_seen: usize,
    frames_moved: usize,
}

impl Reorderer {
    pub fn new(pattern: ReorderPattern) -> Self {
        let seed = match pattern {
            ReorderPattern::Random { seed, .. } => seed,
            _ => 0,
        };
        Self {
            pattern,
            rng: StdRng::seed_from_u64(seed),
            frames_seen: 0,
            frames_moved: 0,
        }
    }

    /// Create a reorderer that keeps the original order
    pub fn none() -> Self {
        Self::new(ReorderPattern::None)
    }

    /// Create a reorderer that reverses every batch
    pub fn reverse() -> Self {
        Self::new(ReorderPattern::Reverse)
    }

    /// Create a reorderer that swaps every Nth frame with the one before it
    pub fn swap_adjacent(every_n: usize) -> Self {
        Self::new(ReorderPattern::SwapAdjacent { every_n })
    }

    /// Create a seeded random reorderer
    pub fn random(probability: f64, max_distance: usize, seed: u64) -> Self {
        Self::new(ReorderPattern::Random {
            probability: probability.clamp(0.0, 1.0),
            max_distance: max_distance.max(1),
            seed,
        })
    }

    /// Reorder a batch of frames for delivery.
    pub fn reorder<T>(&mut self, mut frames: Vec<T>) -> Vec<T> {
        let len = frames.len();
        self.frames_seen += len;

        match self.pattern {
            ReorderPattern::None => {}

            ReorderPattern::Reverse => {
                frames.reverse();
                self.frames_moved += len - len % 2;
            }

            ReorderPattern::SwapAdjacent { every_n } => {
                if every_n > 1 {
                    let mut i = every_n - 1;
                    while i < len {
                        frames.swap(i - 1, i);
                        self.frames_moved += 2;
                        i += every_n;
                    }
                }
            }

            ReorderPattern::Random {
                probability,
                max_distance,
                ..
            } => {
                for i in 0..len.saturating_sub(1) {
                    if self.rng.gen::<f64>() < probability {
                        let reach = max_distance.min(len - 1 - i);
                        let j = i + self.rng.gen_range(1..=reach);
                        frames.swap(i, j);
                        self.frames_moved += 2;
                    }
                }
            }
        }

        frames
    }

    /// Get statistics
    pub fn stats(&self) -> ReorderStats {
        ReorderStats {
            frames_seen: self.frames_seen,
            frames_moved: self.frames_moved,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReorderStats {
    pub frames_seen: usize,
    pub frames_moved: usize,
}

/// End offsets of consecutive `frame_len`-byte frames covering `total` bytes.
///
/// The last frame is shorter if `total` is not a multiple of `frame_len`.
pub fn frame_offsets(total: ByteCount, frame_len: ByteCount) -> Vec<ByteCount> {
    if frame_len == 0 {
        return Vec::new();
    }
    let mut offsets = Vec::with_capacity((total / frame_len + 1) as usize);
    let mut end = 0;
    while end < total {
        end = (end + frame_len).min(total);
        offsets.push(end);
    }
    offsets
}
