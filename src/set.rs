//! Round-robin federation over several queues of the same flavor.
//!
//! Iteration takes one element from each live queue in turn; items are
//! `(queue_index, element_id)` pairs and the payload-independent
//! operations dispatch back to the owning queue. Adds are not supported on
//! the set itself: pick a queue via [`QueueSet::queue_mut`].

use crate::error::{Error, Result};
use crate::queue::{PurgeOptions, PurgeStats, Queue};

/// A set of queues browsed as one.
pub struct QueueSet<Q: Queue> {
    queues: Vec<Q>,
    /// One pending identifier per queue, refilled from that queue's cursor.
    pending: Vec<Option<String>>,
    /// Next queue to serve.
    turn: usize,
}

impl<Q: Queue> QueueSet<Q> {
    pub fn new(queues: Vec<Q>) -> Self {
        let pending = queues.iter().map(|_| None).collect();
        Self {
            queues,
            pending,
            turn: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// The underlying queue at `index`, for flavor-specific operations
    /// such as `get` and `add`.
    pub fn queue(&self, index: usize) -> Option<&Q> {
        self.queues.get(index)
    }

    pub fn queue_mut(&mut self, index: usize) -> Option<&mut Q> {
        self.queues.get_mut(index)
    }

    /// Appends another queue to the set; takes effect at the next
    /// [`QueueSet::first`].
    pub fn push(&mut self, queue: Q) {
        self.queues.push(queue);
        self.pending.push(None);
    }

    /// Total number of visible elements across all queues.
    pub fn count(&self) -> Result<usize> {
        let mut total = 0;
        for queue in &self.queues {
            total += queue.count()?;
        }
        Ok(total)
    }

    /// Resets every queue's cursor and returns the first
    /// `(queue_index, element_id)` pair.
    pub fn first(&mut self) -> Result<Option<(usize, String)>> {
        for (index, queue) in self.queues.iter_mut().enumerate() {
            self.pending[index] = queue.first()?;
        }
        self.turn = 0;
        self.advance()
    }

    /// Returns the next `(queue_index, element_id)` pair, round-robin
    /// across queues that still have elements.
    pub fn next(&mut self) -> Result<Option<(usize, String)>> {
        self.advance()
    }

    fn advance(&mut self) -> Result<Option<(usize, String)>> {
        if self.queues.is_empty() {
            return Ok(None);
        }
        for offset in 0..self.queues.len() {
            let index = (self.turn + offset) % self.queues.len();
            if let Some(id) = self.pending[index].take() {
                self.pending[index] = self.queues[index].next()?;
                self.turn = (index + 1) % self.queues.len();
                return Ok(Some((index, id)));
            }
        }
        Ok(None)
    }

    fn target(&self, index: usize, id: &str) -> Result<&Q> {
        self.queues
            .get(index)
            .ok_or_else(|| Error::InvalidName(format!("{index}:{id}")))
    }

    pub fn lock(&self, index: usize, id: &str, permissive: bool) -> Result<bool> {
        self.target(index, id)?.lock(id, permissive)
    }

    pub fn unlock(&self, index: usize, id: &str, permissive: bool) -> Result<bool> {
        self.target(index, id)?.unlock(id, permissive)
    }

    pub fn remove(&self, index: usize, id: &str) -> Result<()> {
        self.target(index, id)?.remove(id)
    }

    pub fn touch(&self, index: usize, id: &str) -> Result<()> {
        self.target(index, id)?.touch(id)
    }

    /// Purges every queue in the set and sums the results.
    pub fn purge(&self, options: PurgeOptions) -> Result<PurgeStats> {
        let mut total = PurgeStats::default();
        for queue in &self.queues {
            let stats = queue.purge(options)?;
            total.temporary_removed += stats.temporary_removed;
            total.locks_reclaimed += stats.locks_reclaimed;
            total.obsolete_removed += stats.obsolete_removed;
            total.buckets_removed += stats.buckets_removed;
        }
        Ok(total)
    }
}
