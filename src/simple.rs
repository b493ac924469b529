//! Opaque-payload queue: one file per element, one link per commit.
//!
//! The throughput-oriented flavor. The lock marker is a hard link
//! `<element>.lck` to the element file: creation is a single atomic
//! syscall, and because marker and element share an inode, bumping the
//! element's mtime on acquisition restarts the stale-lock clock for both.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::fsutil::{claim_link, touch_now, Claim};
use crate::name::check_element_id;
use crate::queue::{PurgeOptions, PurgeStats, Queue, QueueConfig, QueueCore};

/// Directory queue storing a single opaque byte payload per element.
pub struct SimpleQueue<C: Clock = SystemClock> {
    core: QueueCore<C>,
}

impl SimpleQueue<SystemClock> {
    /// Opens (creating if needed) a simple queue with default configuration.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, QueueConfig::default())
    }

    /// Opens a simple queue with explicit configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: QueueConfig) -> Result<Self> {
        Self::open_with_clock(path, config, SystemClock)
    }
}

impl<C: Clock> SimpleQueue<C> {
    /// Opens a simple queue with a custom clock source.
    pub fn open_with_clock(path: impl AsRef<Path>, config: QueueConfig, clock: C) -> Result<Self> {
        let core = QueueCore::open(path.as_ref(), config, clock)?;
        Ok(Self { core })
    }

    pub fn root(&self) -> &Path {
        self.core.root()
    }

    /// Adds a payload and returns its `bucket/element` identifier.
    pub fn add(&mut self, data: &[u8]) -> Result<String> {
        let staged = self.core.stage_file(data)?;
        match self.core.commit_link(&staged) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.core.discard_staged(&staged);
                Err(e)
            }
        }
    }

    /// Reads a locked element's payload.
    ///
    /// Lock ownership is a documented precondition, not enforced here.
    pub fn get(&self, id: &str) -> Result<Vec<u8>> {
        check_element_id(id)?;
        let path = self.core.element_path(id);
        match fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::MissingElement(id.to_string()))
            }
            Err(e) => Err(Error::fs("read", &path, e)),
        }
    }

    /// Locks, reads and removes an element in one step.
    ///
    /// Fails with [`Error::LockHeld`] when the element cannot be locked.
    pub fn dequeue(&self, id: &str) -> Result<Vec<u8>> {
        if !self.lock(id, true)? {
            return Err(Error::LockHeld(id.to_string()));
        }
        let data = self.get(id)?;
        self.remove(id)?;
        Ok(data)
    }

    pub fn lock(&self, id: &str, permissive: bool) -> Result<bool> {
        check_element_id(id)?;
        let element = self.core.element_path(id);
        let marker = self.core.lock_path(id);
        match claim_link(&element, &marker)? {
            Claim::Created => {
                // Marker and element share an inode: restart the stale-lock
                // clock at acquisition time.
                if let Err(e) = touch_now(&element) {
                    if e.kind() != ErrorKind::NotFound {
                        return Err(Error::fs("utime", &element, e));
                    }
                }
                Ok(true)
            }
            Claim::Taken => {
                if permissive {
                    Ok(false)
                } else {
                    Err(Error::LockHeld(id.to_string()))
                }
            }
            Claim::Vanished => {
                if permissive {
                    Ok(false)
                } else {
                    Err(Error::MissingElement(id.to_string()))
                }
            }
        }
    }

    pub fn unlock(&self, id: &str, permissive: bool) -> Result<bool> {
        check_element_id(id)?;
        let marker = self.core.lock_path(id);
        match fs::remove_file(&marker) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if permissive {
                    Ok(false)
                } else {
                    Err(Error::NotLocked(id.to_string()))
                }
            }
            Err(e) => Err(Error::fs("unlink", &marker, e)),
        }
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        check_element_id(id)?;
        let marker = self.core.lock_path(id);
        if !marker.exists() {
            return Err(Error::NotLocked(id.to_string()));
        }
        let element = self.core.element_path(id);
        match fs::remove_file(&element) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MissingElement(id.to_string()))
            }
            Err(e) => return Err(Error::fs("unlink", &element, e)),
        }
        match fs::remove_file(&marker) {
            Ok(()) => Ok(()),
            // Purge may have quarantined the marker in the meantime.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::fs("unlink", &marker, e)),
        }
    }
}

impl<C: Clock> Queue for SimpleQueue<C> {
    fn count(&self) -> Result<usize> {
        self.core.count()
    }

    fn lock(&self, id: &str, permissive: bool) -> Result<bool> {
        SimpleQueue::lock(self, id, permissive)
    }

    fn unlock(&self, id: &str, permissive: bool) -> Result<bool> {
        SimpleQueue::unlock(self, id, permissive)
    }

    fn remove(&self, id: &str) -> Result<()> {
        SimpleQueue::remove(self, id)
    }

    fn touch(&self, id: &str) -> Result<()> {
        self.core.touch(id)
    }

    fn first(&mut self) -> Result<Option<String>> {
        self.core.reset()?;
        self.core.next_id()
    }

    fn next(&mut self) -> Result<Option<String>> {
        self.core.next_id()
    }

    fn purge(&self, options: PurgeOptions) -> Result<PurgeStats> {
        self.core.purge(options)
    }
}
