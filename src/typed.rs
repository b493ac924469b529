//! Schema-aware queue: each element is a directory with one file per
//! declared field.
//!
//! String and table fields are stored percent-escaped (`src/encoding.rs`),
//! binary fields raw under a `.bin` suffix. The lock marker is a sibling
//! directory `<element>.lck` created by `mkdir`, so acquisition is a
//! single atomic syscall that fails with EEXIST under contention.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::clock::{Clock, SystemClock};
use crate::encoding::{self, Table};
use crate::error::{Error, Result};
use crate::fsutil::{claim_dir, write_file, Claim};
use crate::name::check_element_id;
use crate::queue::{PurgeOptions, PurgeStats, Queue, QueueConfig, QueueCore};
use crate::schema::{FieldKind, FieldSpec, Schema};

/// One field value of a typed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Unicode text.
    String(String),
    /// Arbitrary bytes.
    Binary(Vec<u8>),
    /// A string-to-string map.
    Table(Table),
}

impl Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Binary(_) => "binary",
            Value::Table(_) => "table",
        }
    }

    fn matches(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Value::String(_), FieldKind::String)
                | (Value::Binary(_), FieldKind::Binary)
                | (Value::Table(_), FieldKind::Table)
        )
    }
}

/// A typed element: field name to value, per the queue schema.
pub type Record = BTreeMap<String, Value>;

/// Directory queue storing multi-field records.
pub struct TypedQueue<C: Clock = SystemClock> {
    core: QueueCore<C>,
    schema: Schema,
}

impl TypedQueue<SystemClock> {
    /// Opens (creating if needed) a typed queue with default configuration.
    ///
    /// The schema string follows `name:kind[?][*]`, e.g.
    /// `body:string header:table?`.
    pub fn open(path: impl AsRef<Path>, schema: &str) -> Result<Self> {
        Self::open_with_config(path, schema, QueueConfig::default())
    }

    /// Opens a typed queue with explicit configuration.
    pub fn open_with_config(
        path: impl AsRef<Path>,
        schema: &str,
        config: QueueConfig,
    ) -> Result<Self> {
        Self::open_with_clock(path, schema, config, SystemClock)
    }
}

impl<C: Clock> TypedQueue<C> {
    /// Opens a typed queue with a custom clock source.
    pub fn open_with_clock(
        path: impl AsRef<Path>,
        schema: &str,
        config: QueueConfig,
        clock: C,
    ) -> Result<Self> {
        let schema: Schema = schema.parse()?;
        let core = QueueCore::open(path.as_ref(), config, clock)?;
        Ok(Self { core, schema })
    }

    pub fn root(&self) -> &Path {
        self.core.root()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    fn field_spec(&self, name: &str) -> Result<&FieldSpec> {
        self.schema
            .get(name)
            .ok_or_else(|| Error::InvalidConfig(format!("unexpected data: {name}")))
    }

    fn validate(&self, record: &Record) -> Result<()> {
        for (name, value) in record {
            let spec = self.field_spec(name)?;
            if !value.matches(spec.kind) {
                return Err(Error::InvalidConfig(format!(
                    "unexpected {} data in {name}",
                    value.kind_name()
                )));
            }
        }
        for (name, spec) in self.schema.fields() {
            if !spec.optional && !record.contains_key(name) {
                return Err(Error::InvalidConfig(format!("missing mandatory data: {name}")));
            }
        }
        Ok(())
    }

    fn write_fields(&self, staged: &Path, record: &Record) -> Result<()> {
        for (name, value) in record {
            let spec = self.field_spec(name)?;
            let contents = match value {
                Value::String(text) => encoding::escape(text.as_bytes()),
                Value::Binary(bytes) => bytes.clone(),
                Value::Table(table) => encoding::encode(table),
            };
            let file = staged.join(spec.file_name(name));
            let tmp = staged.join(format!("{}.tmp", spec.file_name(name)));
            write_file(&tmp, &contents, self.core.umask())?;
            fs::rename(&tmp, &file).map_err(|e| Error::fs("rename", &tmp, e))?;
        }
        Ok(())
    }

    /// Adds a record and returns its `bucket/element` identifier.
    ///
    /// The record is validated against the schema before anything is
    /// written; failures after staging roll the staged state back.
    pub fn add(&mut self, record: &Record) -> Result<String> {
        self.validate(record)?;
        let staged = self.core.stage_dir()?;
        if let Err(e) = self.write_fields(&staged, record) {
            self.core.discard_staged(&staged);
            return Err(e);
        }
        match self.core.commit_rename(&staged) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.core.discard_staged(&staged);
                Err(e)
            }
        }
    }

    /// Reads a locked element back as a record.
    ///
    /// Missing optional fields are simply absent from the result. Lock
    /// ownership is a documented precondition, not enforced here.
    pub fn get(&self, id: &str) -> Result<Record> {
        check_element_id(id)?;
        let dir = self.core.element_path(id);
        let mut record = Record::new();
        for (name, spec) in self.schema.fields() {
            let path = dir.join(spec.file_name(name));
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    if spec.optional {
                        continue;
                    }
                    return Err(Error::MissingElement(format!("{id}/{name}")));
                }
                Err(e) => return Err(Error::fs("read", &path, e)),
            };
            let value = match spec.kind {
                FieldKind::Binary => Value::Binary(bytes),
                FieldKind::String => Value::String(
                    String::from_utf8(encoding::unescape(&bytes)?)
                        .map_err(|_| Error::Malformed("string field is not valid UTF-8"))?,
                ),
                FieldKind::Table => Value::Table(encoding::decode(&bytes)?),
            };
            record.insert(name.to_string(), value);
        }
        Ok(record)
    }

    /// Locks, reads and removes an element in one step.
    ///
    /// Fails with [`Error::LockHeld`] when the element cannot be locked.
    pub fn dequeue(&self, id: &str) -> Result<Record> {
        if !self.lock(id, true)? {
            return Err(Error::LockHeld(id.to_string()));
        }
        let record = self.get(id)?;
        self.remove(id)?;
        Ok(record)
    }

    pub fn lock(&self, id: &str, permissive: bool) -> Result<bool> {
        check_element_id(id)?;
        let marker = self.core.lock_path(id);
        match claim_dir(&marker, self.core.umask())? {
            Claim::Created => {
                // The marker is a sibling of the element directory, so a
                // concurrent remove may have won: back the marker out.
                if self.core.element_path(id).exists() {
                    Ok(true)
                } else {
                    let _ = fs::remove_dir(&marker);
                    if permissive {
                        Ok(false)
                    } else {
                        Err(Error::MissingElement(id.to_string()))
                    }
                }
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
        match fs::remove_dir(&marker) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if permissive {
                    Ok(false)
                } else {
                    Err(Error::NotLocked(id.to_string()))
                }
            }
            Err(e) => Err(Error::fs("rmdir", &marker, e)),
        }
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        check_element_id(id)?;
        let marker = self.core.lock_path(id);
        if !marker.exists() {
            return Err(Error::NotLocked(id.to_string()));
        }
        let element = self.core.element_path(id);
        match fs::remove_dir_all(&element) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MissingElement(id.to_string()))
            }
            Err(e) => return Err(Error::fs("remove", &element, e)),
        }
        match fs::remove_dir(&marker) {
            Ok(()) => Ok(()),
            // Purge may have quarantined the marker in the meantime.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::fs("rmdir", &marker, e)),
        }
    }
}

impl<C: Clock> Queue for TypedQueue<C> {
    fn count(&self) -> Result<usize> {
        self.core.count()
    }

    fn lock(&self, id: &str, permissive: bool) -> Result<bool> {
        TypedQueue::lock(self, id, permissive)
    }

    fn unlock(&self, id: &str, permissive: bool) -> Result<bool> {
        TypedQueue::unlock(self, id, permissive)
    }

    fn remove(&self, id: &str) -> Result<()> {
        TypedQueue::remove(self, id)
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
