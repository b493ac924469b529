//! Black-hole queue: same contract, no storage.
//!
//! Added data disappears immediately and the queue always reports empty,
//! so callers can be configured to dry-run without conditional code paths.

use std::cell::Cell;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::name::{bucket_name, default_rndhex, element_name};
use crate::queue::{PurgeOptions, PurgeStats, Queue};

/// A queue that discards every write and reports empty.
pub struct NullQueue<C: Clock = SystemClock> {
    granularity: u64,
    rndhex: u8,
    pid: u32,
    counter: Cell<u8>,
    clock: C,
}

impl NullQueue<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for NullQueue<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> NullQueue<C> {
    pub fn with_clock(clock: C) -> Self {
        let pid = std::process::id();
        Self {
            granularity: 60,
            rndhex: default_rndhex(pid),
            pid,
            counter: Cell::new(0),
            clock,
        }
    }

    /// Discards the payload and returns a well-formed synthetic
    /// identifier. Nothing is written anywhere.
    pub fn add(&mut self, _data: &[u8]) -> Result<String> {
        let now = self.clock.now();
        let counter = self.counter.get();
        self.counter.set(counter.wrapping_add(1));
        Ok(format!(
            "{}/{}",
            bucket_name(now, self.granularity),
            element_name(now, counter, self.pid, self.rndhex)
        ))
    }

    /// Always fails: nothing is ever stored.
    pub fn get(&self, id: &str) -> Result<Vec<u8>> {
        Err(Error::MissingElement(id.to_string()))
    }
}

impl<C: Clock> Queue for NullQueue<C> {
    fn count(&self) -> Result<usize> {
        Ok(0)
    }

    fn lock(&self, id: &str, permissive: bool) -> Result<bool> {
        if permissive {
            Ok(false)
        } else {
            Err(Error::MissingElement(id.to_string()))
        }
    }

    fn unlock(&self, id: &str, permissive: bool) -> Result<bool> {
        if permissive {
            Ok(false)
        } else {
            Err(Error::MissingElement(id.to_string()))
        }
    }

    fn remove(&self, id: &str) -> Result<()> {
        Err(Error::MissingElement(id.to_string()))
    }

    fn touch(&self, id: &str) -> Result<()> {
        Err(Error::MissingElement(id.to_string()))
    }

    fn first(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    fn next(&mut self) -> Result<Option<String>> {
        Ok(None)
    }

    fn purge(&self, _options: PurgeOptions) -> Result<PurgeStats> {
        Ok(PurgeStats::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::check_element_id;

    #[test]
    fn discards_and_reports_empty() {
        let mut queue = NullQueue::new();
        let id = queue.add(b"payload").unwrap();
        check_element_id(&id).unwrap();
        assert_eq!(queue.count().unwrap(), 0);
        assert_eq!(queue.first().unwrap(), None);
    }

    #[test]
    fn synthetic_identifiers_are_distinct() {
        let mut queue = NullQueue::new();
        let a = queue.add(b"x").unwrap();
        let b = queue.add(b"y").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn operations_report_missing_elements() {
        let queue = NullQueue::new();
        assert!(!queue.lock("00000000/00000000000000", true).unwrap());
        assert!(matches!(
            queue.lock("00000000/00000000000000", false),
            Err(Error::MissingElement(_))
        ));
        assert!(matches!(
            queue.get("00000000/00000000000000"),
            Err(Error::MissingElement(_))
        ));
        assert!(matches!(
            queue.remove("00000000/00000000000000"),
            Err(Error::MissingElement(_))
        ));
    }
}
