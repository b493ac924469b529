//! Identifier service: fresh, collision-resistant names for buckets,
//! elements and staging entries.
//!
//! All names are fixed-width lowercase hex so that directory listings sort
//! lexicographically in time order. Collisions between independent writers
//! are unlikely by construction and caught by exclusive-create failure.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Width of a bucket directory name.
pub const BUCKET_NAME_LEN: usize = 8;
/// Width of an element name.
pub const ELEMENT_NAME_LEN: usize = 14;

/// Suffix of a lock marker inside a bucket.
pub const LOCKED_SUFFIX: &str = ".lck";
/// Suffix distinguishing staging names from element names.
pub const TEMPORARY_SUFFIX: &str = ".tmp";

/// Returns the bucket name for `now`: the time coarsened to `granularity`
/// seconds, as 8 hex digits. Granularity 0 means one bucket per second.
pub fn bucket_name(now: u64, granularity: u64) -> String {
    let coarse = if granularity == 0 {
        now
    } else {
        now - now % granularity
    };
    format!("{:08x}", coarse & 0xffff_ffff)
}

/// Returns a fresh element name: 14 hex digits made of the low 32 bits of
/// `now`, a per-handle counter, the process identity and the `rndhex`
/// padding digit.
///
/// Properties: fixed size, lexically sortable, ever increasing for a given
/// handle within one second, and unique with high probability across
/// concurrent writers.
pub fn element_name(now: u64, counter: u8, pid: u32, rndhex: u8) -> String {
    format!(
        "{:08x}{:02x}{:02x}{:02x}",
        now & 0xffff_ffff,
        counter,
        pid & 0xff,
        rndhex & 0x0f
    )
}

/// Returns a fresh staging name, disjoint from the element namespace.
pub fn temporary_name(now: u64, counter: u8, pid: u32, rndhex: u8) -> String {
    let mut name = element_name(now, counter, pid, rndhex);
    name.push_str(TEMPORARY_SUFFIX);
    name
}

/// Derives the default `rndhex` padding digit by hashing the process
/// identity into `[0, 15]`. Stable for the lifetime of the process.
pub fn default_rndhex(pid: u32) -> u8 {
    let mut hasher = DefaultHasher::new();
    pid.hash(&mut hasher);
    (hasher.finish() & 0x0f) as u8
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len
        && s.bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// True if `s` is a well-formed bucket directory name.
pub fn is_bucket_name(s: &str) -> bool {
    is_lower_hex(s, BUCKET_NAME_LEN)
}

/// True if `s` is a well-formed element name (without the bucket part).
pub fn is_element_name(s: &str) -> bool {
    is_lower_hex(s, ELEMENT_NAME_LEN)
}

/// Checks a full `bucket/element` identifier as yielded by iteration.
pub fn check_element_id(id: &str) -> Result<()> {
    match id.split_once('/') {
        Some((bucket, element)) if is_bucket_name(bucket) && is_element_name(element) => Ok(()),
        _ => Err(Error::InvalidName(id.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_names_are_coarsened() {
        assert_eq!(bucket_name(1_700_000_123, 60), format!("{:08x}", 1_700_000_100u64));
        assert_eq!(bucket_name(1_700_000_123, 0), format!("{:08x}", 1_700_000_123u64));
        assert!(is_bucket_name(&bucket_name(1_700_000_123, 60)));
    }

    #[test]
    fn element_names_have_fixed_width() {
        let name = element_name(1_700_000_123, 0xab, 4321, 7);
        assert_eq!(name.len(), ELEMENT_NAME_LEN);
        assert!(is_element_name(&name));
        assert!(name.ends_with("07"));
    }

    #[test]
    fn element_names_increase_with_counter() {
        let a = element_name(1_700_000_123, 1, 99, 3);
        let b = element_name(1_700_000_123, 2, 99, 3);
        assert!(a < b);
    }

    #[test]
    fn temporary_names_are_not_element_names() {
        let name = temporary_name(1_700_000_123, 0, 1, 0);
        assert!(!is_element_name(&name));
        assert!(name.ends_with(TEMPORARY_SUFFIX));
    }

    #[test]
    fn default_rndhex_is_a_half_byte() {
        for pid in [0u32, 1, 77, u32::MAX] {
            assert!(default_rndhex(pid) <= 0x0f);
        }
    }

    #[test]
    fn identifier_validation() {
        assert!(check_element_id("656d2d3c/656d2d3c01ab07").is_ok());
        assert!(check_element_id("656d2d3c").is_err());
        assert!(check_element_id("656d2d3c/656d2d3c01ab07.lck").is_err());
        assert!(check_element_id("../656d2d3c01ab07").is_err());
        assert!(check_element_id("656D2D3C/656d2d3c01ab07").is_err());
    }
}
