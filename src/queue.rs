//! Shared queue engine: configuration, the common lifecycle contract and
//! the core used by every directory-backed flavor.
//!
//! # Layout
//!
//! ```text
//! root/
//!   temporary/           staging for in-progress writes
//!   obsolete/            quarantined stale lock markers
//!   <bucket>/            8 hex digits, time-ordered
//!     <element>          file (simple) or directory (typed)
//!     <element>.lck      lock marker
//! ```
//!
//! Every mutation is a single atomic filesystem operation: commits are
//! renames (or link+unlink) out of `temporary/`, locks are exclusive
//! creations next to the element, and purge quarantines stale markers by
//! renaming them into `obsolete/` before deleting them, so a legitimate
//! holder racing with purge only ever sees a benign missing path.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use log::warn;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::fsutil::{
    claim_dir, claim_link, create_excl, directory_contents, is_older, remove_any, special_mkdir,
    special_rmdir, touch_now, Claim,
};
use crate::name::{
    bucket_name, check_element_id, element_name, is_bucket_name, is_element_name, LOCKED_SUFFIX,
};

/// Name of the staging directory under the queue root.
pub const TEMPORARY_DIRECTORY: &str = "temporary";
/// Name of the quarantine directory for stale lock markers.
pub const OBSOLETE_DIRECTORY: &str = "obsolete";

/// Construction parameters shared by the directory-backed flavors.
#[derive(Debug, Clone, Copy)]
pub struct QueueConfig {
    /// Umask applied to every file and directory the queue creates; `None`
    /// leaves the process umask in effect.
    pub umask: Option<u32>,
    /// Bucket width in seconds; 0 means one bucket per second.
    pub granularity: u64,
    /// Random padding digit for element names, in `[0, 15]`. Defaults to a
    /// hash of the process id; pass an explicit value for byte-for-byte
    /// compatibility with sibling implementations.
    pub rndhex: Option<u8>,
    /// How many fresh names `add` tries on exclusive-create conflicts
    /// before surfacing a name collision.
    pub max_add_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            umask: None,
            granularity: 60,
            rndhex: None,
            max_add_retries: 10,
        }
    }
}

/// Age thresholds for [`Queue::purge`], in seconds.
#[derive(Debug, Clone, Copy)]
pub struct PurgeOptions {
    /// Staging entries older than this are reclaimed.
    pub maxtemp: u64,
    /// Lock markers older than this are considered stale.
    pub maxlock: u64,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        Self {
            maxtemp: 300,
            maxlock: 600,
        }
    }
}

/// What a purge pass reclaimed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    /// Entries removed from `temporary/`.
    pub temporary_removed: usize,
    /// Stale lock markers quarantined into `obsolete/`.
    pub locks_reclaimed: usize,
    /// Entries collected from `obsolete/`.
    pub obsolete_removed: usize,
    /// Empty bucket directories removed.
    pub buckets_removed: usize,
}

/// The lifecycle contract shared by every queue flavor.
///
/// `add` and `get` are inherent to each flavor because their payload types
/// differ; everything payload-independent lives here so that callers and
/// [`crate::QueueSet`] can treat flavors uniformly.
pub trait Queue {
    /// Number of committed elements currently visible, regardless of lock
    /// state. Concurrent mutation is tolerated: the count reflects what a
    /// single traversal observed.
    fn count(&self) -> Result<usize>;

    /// Attempts exclusive acquisition of an element.
    ///
    /// Returns `false` when another agent holds the lock (or, permissive,
    /// when the element vanished). Non-permissive callers get
    /// [`Error::LockHeld`] on contention and [`Error::MissingElement`] on
    /// a vanished element.
    fn lock(&self, id: &str, permissive: bool) -> Result<bool>;

    /// Releases a held lock. Permissive callers get `false` instead of an
    /// error when the marker is already gone.
    fn unlock(&self, id: &str, permissive: bool) -> Result<bool>;

    /// Removes a locked element: payload first, marker last, so a crash in
    /// between leaves only a stale marker for purge.
    fn remove(&self, id: &str) -> Result<()>;

    /// Bumps the element's mtime so purge does not consider a held lock
    /// expired. The heartbeat for long-running consumers.
    fn touch(&self, id: &str) -> Result<()>;

    /// Resets the iteration cursor and returns the first element
    /// identifier, if any.
    fn first(&mut self) -> Result<Option<String>>;

    /// Returns the next element identifier from the cursor.
    ///
    /// Elements added after [`Queue::first`] may or may not appear;
    /// identifiers of concurrently removed elements may still be yielded
    /// and a subsequent `lock` fails cleanly. Lock markers are never
    /// yielded.
    fn next(&mut self) -> Result<Option<String>>;

    /// Reclaims abandoned staging entries and stale lock markers, and
    /// prunes empty buckets. Safe to run concurrently with any other
    /// operation; never touches a fresh lock.
    fn purge(&self, options: PurgeOptions) -> Result<PurgeStats>;
}

/// State shared by the directory-backed flavors: root paths, naming
/// state and the iteration cursor.
pub(crate) struct QueueCore<C: Clock> {
    root: PathBuf,
    umask: Option<u32>,
    granularity: u64,
    rndhex: u8,
    max_add_retries: u32,
    pid: u32,
    counter: Cell<u8>,
    clock: C,
    dirs: VecDeque<String>,
    elts: VecDeque<String>,
}

impl<C: Clock> QueueCore<C> {
    /// Builds the queue directory structure and binds a handle to it.
    pub(crate) fn open(path: &Path, config: QueueConfig, clock: C) -> Result<Self> {
        if let Some(rndhex) = config.rndhex {
            if rndhex > 0x0f {
                return Err(Error::InvalidConfig(format!(
                    "rndhex out of range: {rndhex}"
                )));
            }
        }
        fs::create_dir_all(path).map_err(|e| {
            Error::InvalidConfig(format!("unusable queue root {}: {e}", path.display()))
        })?;
        let meta = fs::metadata(path)
            .map_err(|e| Error::InvalidConfig(format!("unusable queue root {}: {e}", path.display())))?;
        if !meta.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "queue root is not a directory: {}",
                path.display()
            )));
        }
        let pid = std::process::id();
        let core = Self {
            root: path.to_path_buf(),
            umask: config.umask,
            granularity: config.granularity,
            rndhex: config.rndhex.unwrap_or_else(|| crate::name::default_rndhex(pid)),
            max_add_retries: config.max_add_retries.max(1),
            pid,
            counter: Cell::new(0),
            clock,
            dirs: VecDeque::new(),
            elts: VecDeque::new(),
        };
        special_mkdir(&core.temporary_dir(), core.umask)?;
        special_mkdir(&core.obsolete_dir(), core.umask)?;
        Ok(core)
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn umask(&self) -> Option<u32> {
        self.umask
    }

    fn temporary_dir(&self) -> PathBuf {
        self.root.join(TEMPORARY_DIRECTORY)
    }

    fn obsolete_dir(&self) -> PathBuf {
        self.root.join(OBSOLETE_DIRECTORY)
    }

    /// Absolute path of an element, given its `bucket/element` identifier.
    pub(crate) fn element_path(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    /// Absolute path of the lock marker for an element.
    pub(crate) fn lock_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{id}{LOCKED_SUFFIX}"))
    }

    fn next_counter(&self) -> u8 {
        let value = self.counter.get();
        self.counter.set(value.wrapping_add(1));
        value
    }

    fn fresh_element_name(&self, now: u64) -> String {
        element_name(now, self.next_counter(), self.pid, self.rndhex)
    }

    fn fresh_temporary_name(&self) -> String {
        crate::name::temporary_name(self.clock.now(), self.next_counter(), self.pid, self.rndhex)
    }

    /// Allocates a fresh staging directory under `temporary/`.
    pub(crate) fn stage_dir(&self) -> Result<PathBuf> {
        for _ in 0..self.max_add_retries {
            let path = self.temporary_dir().join(self.fresh_temporary_name());
            match claim_dir(&path, self.umask)? {
                Claim::Created => return Ok(path),
                Claim::Taken => continue,
                // The staging directory itself vanished; put it back.
                Claim::Vanished => {
                    special_mkdir(&self.temporary_dir(), self.umask)?;
                }
            }
        }
        Err(Error::NameCollision(self.temporary_dir()))
    }

    /// Allocates a fresh staging file under `temporary/` holding `data`.
    pub(crate) fn stage_file(&self, data: &[u8]) -> Result<PathBuf> {
        for _ in 0..self.max_add_retries {
            let path = self.temporary_dir().join(self.fresh_temporary_name());
            match create_excl(&path, data, self.umask)? {
                Claim::Created => return Ok(path),
                Claim::Taken => continue,
                // The staging directory itself vanished; put it back.
                Claim::Vanished => {
                    special_mkdir(&self.temporary_dir(), self.umask)?;
                }
            }
        }
        Err(Error::NameCollision(self.temporary_dir()))
    }

    fn insertion_bucket(&self, now: u64) -> Result<(String, PathBuf)> {
        let bucket = bucket_name(now, self.granularity);
        let path = self.root.join(&bucket);
        special_mkdir(&path, self.umask)?;
        Ok((bucket, path))
    }

    /// Commits a staged directory by atomic rename into a bucket.
    ///
    /// EEXIST/ENOTEMPTY means the fresh name collided under contention:
    /// regenerate and retry, up to the configured budget.
    pub(crate) fn commit_rename(&self, staged: &Path) -> Result<String> {
        let mut attempts = 0;
        loop {
            let now = self.clock.now();
            let (bucket, bucket_path) = self.insertion_bucket(now)?;
            let element = self.fresh_element_name(now);
            let dest = bucket_path.join(&element);
            match fs::rename(staged, &dest) {
                Ok(()) => return Ok(format!("{bucket}/{element}")),
                Err(e)
                    if e.kind() == ErrorKind::AlreadyExists
                        || e.kind() == ErrorKind::DirectoryNotEmpty =>
                {
                    attempts += 1;
                    if attempts >= self.max_add_retries {
                        return Err(Error::NameCollision(dest));
                    }
                }
                // The bucket was pruned between mkdir and rename; recreate
                // it on the next round, against the same retry budget so a
                // pathological race cannot loop forever. A missing staging
                // path is fatal.
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if !staged.exists() {
                        return Err(Error::fs("rename", staged, e));
                    }
                    attempts += 1;
                    if attempts >= self.max_add_retries {
                        return Err(Error::NameCollision(dest));
                    }
                }
                Err(e) => return Err(Error::fs("rename", staged, e)),
            }
        }
    }

    /// Commits a staged file by hard-linking it into a bucket and
    /// unlinking the staging path.
    pub(crate) fn commit_link(&self, staged: &Path) -> Result<String> {
        let mut attempts = 0;
        loop {
            let now = self.clock.now();
            let (bucket, bucket_path) = self.insertion_bucket(now)?;
            let element = self.fresh_element_name(now);
            let dest = bucket_path.join(&element);
            match claim_link(staged, &dest)? {
                Claim::Created => {
                    if let Err(e) = fs::remove_file(staged) {
                        if e.kind() != ErrorKind::NotFound {
                            return Err(Error::fs("unlink", staged, e));
                        }
                    }
                    return Ok(format!("{bucket}/{element}"));
                }
                Claim::Taken => {
                    attempts += 1;
                    if attempts >= self.max_add_retries {
                        return Err(Error::NameCollision(dest));
                    }
                }
                // The bucket was pruned between mkdir and link; recreate it
                // on the next round, against the same retry budget.
                Claim::Vanished => {
                    if !staged.exists() {
                        return Err(Error::MissingElement(staged.display().to_string()));
                    }
                    attempts += 1;
                    if attempts >= self.max_add_retries {
                        return Err(Error::NameCollision(dest));
                    }
                }
            }
        }
    }

    fn bucket_list(&self) -> Result<Vec<String>> {
        let mut buckets: Vec<String> = directory_contents(&self.root, false)?
            .into_iter()
            .filter(|name| is_bucket_name(name))
            .collect();
        buckets.sort_unstable();
        Ok(buckets)
    }

    /// Snapshots the bucket list and resets the per-bucket cursor.
    pub(crate) fn reset(&mut self) -> Result<()> {
        self.dirs = self.bucket_list()?.into();
        self.elts.clear();
        Ok(())
    }

    /// Yields the next identifier across buckets, re-listing one bucket at
    /// a time so no directory handle outlives a call.
    pub(crate) fn next_id(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(id) = self.elts.pop_front() {
                return Ok(Some(id));
            }
            let Some(bucket) = self.dirs.pop_front() else {
                return Ok(None);
            };
            let mut names: Vec<String> = directory_contents(&self.root.join(&bucket), true)?
                .into_iter()
                .filter(|name| is_element_name(name))
                .collect();
            names.sort_unstable();
            self.elts
                .extend(names.into_iter().map(|name| format!("{bucket}/{name}")));
        }
    }

    pub(crate) fn count(&self) -> Result<usize> {
        let mut total = 0;
        for bucket in self.bucket_list()? {
            total += directory_contents(&self.root.join(&bucket), true)?
                .iter()
                .filter(|name| is_element_name(name))
                .count();
        }
        Ok(total)
    }

    pub(crate) fn touch(&self, id: &str) -> Result<()> {
        check_element_id(id)?;
        let path = self.element_path(id);
        match touch_now(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MissingElement(id.to_string()))
            }
            Err(e) => return Err(Error::fs("utime", &path, e)),
        }
        // Purge judges lock staleness by the marker's mtime, so a heartbeat
        // on a locked element must refresh the marker as well. For file
        // elements the marker shares the inode and this is a no-op.
        let marker = self.lock_path(id);
        match touch_now(&marker) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::fs("utime", &marker, e)),
        }
    }

    pub(crate) fn purge(&self, options: PurgeOptions) -> Result<PurgeStats> {
        let now = SystemTime::now();
        let temp_deadline = now
            .checked_sub(Duration::from_secs(options.maxtemp))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let lock_deadline = now
            .checked_sub(Duration::from_secs(options.maxlock))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut stats = PurgeStats::default();

        // Abandoned staging entries.
        let temporary = self.temporary_dir();
        for name in directory_contents(&temporary, true)? {
            let path = temporary.join(&name);
            if is_older(&path, temp_deadline)? {
                warn!("removing too old temporary element: {}", path.display());
                remove_any(&path)?;
                stats.temporary_removed += 1;
            }
        }

        // Stale lock markers are quarantined by rename before deletion, so
        // a holder racing with us only ever sees its marker path missing.
        let buckets = self.bucket_list()?;
        let obsolete = self.obsolete_dir();
        for bucket in &buckets {
            let bucket_path = self.root.join(bucket);
            for name in directory_contents(&bucket_path, true)? {
                if !name.ends_with(LOCKED_SUFFIX) {
                    continue;
                }
                let marker = bucket_path.join(&name);
                if !is_older(&marker, lock_deadline)? {
                    continue;
                }
                let quarantined = obsolete.join(self.fresh_temporary_name());
                match fs::rename(&marker, &quarantined) {
                    Ok(()) => {
                        warn!("reclaiming stale lock: {}", marker.display());
                        stats.locks_reclaimed += 1;
                    }
                    // The holder released it first.
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(Error::fs("rename", &marker, e)),
                }
            }
        }

        // Rename preserves mtime, so markers quarantined above are already
        // old enough to collect in this same pass.
        for name in directory_contents(&obsolete, true)? {
            let path = obsolete.join(&name);
            if is_older(&path, lock_deadline)? {
                remove_any(&path)?;
                stats.obsolete_removed += 1;
            }
        }

        // Prune buckets observed empty; `add` recovers from a vanishing
        // bucket by re-creating it.
        for bucket in &buckets {
            let bucket_path = self.root.join(bucket);
            if directory_contents(&bucket_path, true)?.is_empty()
                && special_rmdir(&bucket_path)?
            {
                stats.buckets_removed += 1;
            }
        }

        Ok(stats)
    }

    /// Removes the staged state after a failed `add`, best-effort.
    pub(crate) fn discard_staged(&self, staged: &Path) {
        let _ = remove_any(staged);
    }
}
