//! Closed-interval algebra over block numbers.
//!
//! All functions operate on *canonical* interval lists: sorted by start,
//! pairwise disjoint, and maximally merged (adjacent integer intervals are
//! joined). Every operation returns canonical output and is total; empty
//! inputs yield empty outputs.

/// A closed interval of block numbers, `start <= end`, both inclusive.
pub type BlockInterval = (u64, u64);

/// Normalizes an arbitrary interval list into canonical form.
///
/// Sorts by start, drops inverted intervals, and merges overlapping or
/// integer-adjacent neighbors (`[0, 5]` and `[6, 9]` become `[0, 9]`).
pub fn normalize(intervals: &[BlockInterval]) -> Vec<BlockInterval> {
    let mut sorted: Vec<BlockInterval> = intervals.iter().copied().filter(|(lo, hi)| lo <= hi).collect();
    sorted.sort_unstable();

    let mut out: Vec<BlockInterval> = Vec::with_capacity(sorted.len());
    for (lo, hi) in sorted {
        match out.last_mut() {
            // merge if overlapping or adjacent
            Some((_, prev_hi)) if lo <= prev_hi.saturating_add(1) => {
                *prev_hi = (*prev_hi).max(hi);
            }
            _ => out.push((lo, hi)),
        }
    }
    out
}

/// Union of two canonical interval lists.
pub fn union(a: &[BlockInterval], b: &[BlockInterval]) -> Vec<BlockInterval> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    merged.extend_from_slice(a);
    merged.extend_from_slice(b);
    normalize(&merged)
}

/// Intersection of two canonical interval lists.
pub fn intersection(a: &[BlockInterval], b: &[BlockInterval]) -> Vec<BlockInterval> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0usize, 0usize);

    while i < a.len() && j < b.len() {
        let (a_lo, a_hi) = a[i];
        let (b_lo, b_hi) = b[j];

        let lo = a_lo.max(b_lo);
        let hi = a_hi.min(b_hi);
        if lo <= hi {
            out.push((lo, hi));
        }

        // advance the list whose interval ends first
        if a_hi < b_hi {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// Intersection across many canonical interval lists.
///
/// The intersection of zero lists is empty.
pub fn intersection_many(lists: &[Vec<BlockInterval>]) -> Vec<BlockInterval> {
    let Some((first, rest)) = lists.split_first() else {
        return Vec::new();
    };
    rest.iter()
        .fold(first.clone(), |acc, next| intersection(&acc, next))
}

/// Difference `a \ b` of two canonical interval lists.
pub fn difference(a: &[BlockInterval], b: &[BlockInterval]) -> Vec<BlockInterval> {
    let mut out = Vec::new();
    let mut j = 0usize;

    for &(a_lo, a_hi) in a {
        let mut cursor = a_lo;
        while j < b.len() && b[j].1 < cursor {
            j += 1;
        }
        let mut k = j;
        while k < b.len() && b[k].0 <= a_hi {
            let (b_lo, b_hi) = b[k];
            if b_lo > cursor {
                out.push((cursor, (b_lo - 1).min(a_hi)));
            }
            if b_hi >= a_hi {
                // this subtrahend swallows the rest of `a`'s interval
                cursor = a_hi.saturating_add(1);
                break;
            }
            cursor = b_hi + 1;
            k += 1;
        }
        if cursor <= a_hi {
            out.push((cursor, a_hi));
        }
    }
    normalize(&out)
}

/// The intervals of `target` not yet present in `completed`.
pub fn required(target: &[BlockInterval], completed: &[BlockInterval]) -> Vec<BlockInterval> {
    difference(target, completed)
}

/// Total number of blocks covered by a canonical interval list.
pub fn total(intervals: &[BlockInterval]) -> u64 {
    intervals.iter().map(|(lo, hi)| hi - lo + 1).sum()
}

/// Whether `point` lies inside any interval of the list.
pub fn contains(intervals: &[BlockInterval], point: u64) -> bool {
    intervals
        .binary_search_by(|&(lo, hi)| {
            if point < lo {
                std::cmp::Ordering::Greater
            } else if point > hi {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
}

/// Left-to-right partition where no output interval spans more than
/// `max_chunk_size` blocks. An empty input yields an empty output.
pub fn chunks(intervals: &[BlockInterval], max_chunk_size: u64) -> Vec<BlockInterval> {
    if max_chunk_size == 0 {
        return Vec::new();
    }

    let mut out = Vec::new();
    for &(lo, hi) in intervals {
        let mut cursor = lo;
        while cursor <= hi {
            let end = hi.min(cursor.saturating_add(max_chunk_size - 1));
            out.push((cursor, end));
            if end == u64::MAX {
                break;
            }
            cursor = end + 1;
        }
    }
    out
}

/// Outcome of [`ProgressTracker::add_completed_interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    /// Whether the contiguous-from-start checkpoint advanced.
    pub is_updated: bool,
    /// Checkpoint before the insertion, if any.
    pub prev_checkpoint: Option<u64>,
    /// Checkpoint after the insertion, if any.
    pub new_checkpoint: Option<u64>,
}

/// Tracks completion of a target interval.
///
/// The *checkpoint* is the largest `x >= target.start` such that
/// `[target.start, x]` is fully completed; `None` until the first block of
/// the target is completed.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    target: BlockInterval,
    completed: Vec<BlockInterval>,
}

impl ProgressTracker {
    /// Creates a tracker for `target` seeded with already-completed
    /// intervals (clamped to the target).
    pub fn new(target: BlockInterval, completed: &[BlockInterval]) -> Self {
        let completed = intersection(&[target], &normalize(completed));
        Self { target, completed }
    }

    /// The target interval.
    pub fn target(&self) -> BlockInterval {
        self.target
    }

    /// The completed intervals, clamped to the target.
    pub fn completed(&self) -> &[BlockInterval] {
        &self.completed
    }

    /// The intervals still required to complete the target.
    pub fn required(&self) -> Vec<BlockInterval> {
        required(&[self.target], &self.completed)
    }

    /// The number of target blocks already completed.
    pub fn completed_count(&self) -> u64 {
        total(&self.completed)
    }

    /// The total number of blocks in the target.
    pub fn total_count(&self) -> u64 {
        total(&[self.target])
    }

    /// Current checkpoint, if the prefix of the target is completed.
    pub fn checkpoint(&self) -> Option<u64> {
        match self.completed.first() {
            Some(&(lo, hi)) if lo <= self.target.0 => Some(hi.min(self.target.1)),
            _ => None,
        }
    }

    /// Whether the whole target is completed.
    pub fn is_complete(&self) -> bool {
        self.checkpoint() == Some(self.target.1)
    }

    /// Records a newly completed interval and reports checkpoint movement.
    pub fn add_completed_interval(&mut self, interval: BlockInterval) -> ProgressUpdate {
        let prev_checkpoint = self.checkpoint();
        self.completed = intersection(&[self.target], &union(&self.completed, &[interval]));
        let new_checkpoint = self.checkpoint();

        ProgressUpdate {
            is_updated: new_checkpoint > prev_checkpoint,
            prev_checkpoint,
            new_checkpoint,
        }
    }
}
