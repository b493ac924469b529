//! Directory based queue.
//!
//! A persistent multi-producer/multi-consumer queue that uses a directory
//! tree on a POSIX filesystem as its only storage and coordination
//! substrate. There is no broker and no shared in-process state: atomicity
//! and mutual exclusion come from filesystem primitives alone (atomic
//! rename, `O_EXCL` creation, `mkdir` as test-and-set, hard links), so any
//! number of independent processes can cooperate through a shared
//! filesystem that honors these semantics.
//!
//! Ordering is best-effort FIFO: elements sort by time-bucketed directory
//! and creation-time name, which approximates arrival order without
//! guaranteeing it across concurrent producers.
//!
//! # Example
//!
//! ```no_run
//! use dirq::{Queue, SimpleQueue};
//!
//! let mut producer = SimpleQueue::open("/tmp/queue")?;
//! producer.add(b"hello")?;
//!
//! let mut consumer = SimpleQueue::open("/tmp/queue")?;
//! let mut cursor = consumer.first()?;
//! while let Some(id) = cursor {
//!     if consumer.lock(&id, true)? {
//!         let payload = consumer.get(&id)?;
//!         println!("got {} bytes", payload.len());
//!         consumer.remove(&id)?;
//!     }
//!     cursor = consumer.next()?;
//! }
//! # Ok::<(), dirq::Error>(())
//! ```

pub mod clock;
pub mod encoding;
pub mod error;
mod fsutil;
pub mod name;
pub mod null;
pub mod queue;
pub mod schema;
pub mod set;
pub mod simple;
pub mod typed;

pub use clock::{Clock, SystemClock};
pub use error::{Error, Result};
pub use null::NullQueue;
pub use queue::{PurgeOptions, PurgeStats, Queue, QueueConfig};
pub use schema::{FieldKind, FieldSpec, Schema};
pub use set::QueueSet;
pub use simple::SimpleQueue;
pub use typed::{Record, TypedQueue, Value};
