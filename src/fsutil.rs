//! Thin wrappers around the filesystem calls the engine depends on.
//!
//! Each wrapper pins down the exact POSIX semantics the queue relies on:
//! `mkdir` as a test-and-set, `O_EXCL` creation, `link` for re-parenting,
//! and listings that tolerate concurrent additions and removals. All
//! errors carry the syscall name and the path.

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::Path;
use std::time::SystemTime;

use crate::error::{Error, Result};

/// Outcome of an exclusive-create attempt.
pub(crate) enum Claim {
    /// The path was created by this call.
    Created,
    /// Something already exists at the path.
    Taken,
    /// The parent (or source, for `link`) vanished.
    Vanished,
}

/// Applies the configured umask to a freshly created path by chmod, so
/// that concurrent threads with different masks do not interfere through
/// the process-global umask.
#[cfg(unix)]
fn apply_umask(path: &Path, umask: u32, dir: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let base = if dir { 0o777 } else { 0o666 };
    fs::set_permissions(path, fs::Permissions::from_mode(base & !umask))
        .map_err(|e| Error::fs("chmod", path, e))
}

#[cfg(not(unix))]
fn apply_umask(_path: &Path, _umask: u32, _dir: bool) -> Result<()> {
    Ok(())
}

/// Creates a directory, reporting whether this call created it.
///
/// Returns `Ok(false)` when something already exists at the path; per the
/// layout invariants that something is always a directory.
pub(crate) fn special_mkdir(path: &Path, umask: Option<u32>) -> Result<bool> {
    match fs::create_dir(path) {
        Ok(()) => {
            if let Some(mask) = umask {
                apply_umask(path, mask, true)?;
            }
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(Error::fs("mkdir", path, e)),
    }
}

/// Like [`special_mkdir`] but classifies the outcome for lock acquisition:
/// EEXIST means contended, ENOENT means the bucket vanished.
pub(crate) fn claim_dir(path: &Path, umask: Option<u32>) -> Result<Claim> {
    match fs::create_dir(path) {
        Ok(()) => {
            if let Some(mask) = umask {
                apply_umask(path, mask, true)?;
            }
            Ok(Claim::Created)
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(Claim::Taken),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Claim::Vanished),
        Err(e) => Err(Error::fs("mkdir", path, e)),
    }
}

/// Removes a directory, demoting ENOENT and ENOTEMPTY to `Ok(false)`.
pub(crate) fn special_rmdir(path: &Path) -> Result<bool> {
    match fs::remove_dir(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) if e.kind() == ErrorKind::DirectoryNotEmpty => Ok(false),
        Err(e) => Err(Error::fs("rmdir", path, e)),
    }
}

/// Creates a regular file with `O_EXCL` and writes `data` to it.
pub(crate) fn create_excl(path: &Path, data: &[u8], umask: Option<u32>) -> Result<Claim> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    let mut file = match options.open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(Claim::Taken),
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Claim::Vanished),
        Err(e) => return Err(Error::fs("open", path, e)),
    };
    if let Some(mask) = umask {
        apply_umask(path, mask, false)?;
    }
    io::Write::write_all(&mut file, data).map_err(|e| Error::fs("write", path, e))?;
    Ok(Claim::Created)
}

/// Writes a whole file (no exclusivity), honoring the configured umask.
pub(crate) fn write_file(path: &Path, data: &[u8], umask: Option<u32>) -> Result<()> {
    fs::write(path, data).map_err(|e| Error::fs("write", path, e))?;
    if let Some(mask) = umask {
        apply_umask(path, mask, false)?;
    }
    Ok(())
}

/// Hard-links `source` to `target`, classifying EEXIST and ENOENT.
pub(crate) fn claim_link(source: &Path, target: &Path) -> Result<Claim> {
    match fs::hard_link(source, target) {
        Ok(()) => Ok(Claim::Created),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(Claim::Taken),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Claim::Vanished),
        Err(e) => Err(Error::fs("link", target, e)),
    }
}

/// Lists a directory as a vector of names.
///
/// With `missing_ok`, a directory that does not exist (anymore) yields an
/// empty listing instead of an error; entries that vanish mid-listing are
/// skipped.
pub(crate) fn directory_contents(path: &Path, missing_ok: bool) -> Result<Vec<String>> {
    let entries = match fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) if missing_ok && e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::fs("listdir", path, e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(Error::fs("listdir", path, e)),
        };
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    Ok(names)
}

/// True when the path exists and its mtime is strictly before `deadline`.
/// A path that does not exist (anymore) is never old.
pub(crate) fn is_older(path: &Path, deadline: SystemTime) -> Result<bool> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::fs("lstat", path, e)),
    };
    let mtime = meta.modified().map_err(|e| Error::fs("lstat", path, e))?;
    Ok(mtime < deadline)
}

/// Removes a file or a directory tree; ENOENT is not an error.
pub(crate) fn remove_any(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::fs("lstat", path, e)),
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match removed {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs("remove", path, e)),
    }
}

/// Bumps the mtime of a file or directory to now.
pub(crate) fn touch_now(path: &Path) -> io::Result<()> {
    let file = File::open(path)?;
    file.set_modified(SystemTime::now())
}
