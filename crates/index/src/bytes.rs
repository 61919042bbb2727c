// Path: crates/index/src/bytes.rs

//! Key and value byte encodings.
//!
//! Keys are big-endian so that unsigned numeric order survives the byte-wise
//! comparison the ordered store performs during range scans. Secondary-index
//! values are [`PackedU64List`]s: candid sequences stored as raw 8-byte
//! big-endian blocks laid end to end.

use alertarc_schema::Alert;

/// Nanoseconds in one day.
const NS_PER_DAY: f64 = 86_400_000_000_000.0;

/// Julian Date of the Unix epoch (1970-01-01T00:00:00Z).
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

/// Encodes a u64 into a big-endian byte array, suitable for ordered key scans.
#[inline]
pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Decodes an 8-byte big-endian slice back into a u64.
///
/// Returns `None` when the slice is not exactly 8 bytes.
#[inline]
pub fn u64_from_be8(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

/// Converts a Julian Date to a unix nanosecond timestamp.
///
/// Leap seconds are not handled. Dates before the Unix epoch are outside the
/// key space; the cast saturates them to zero.
#[inline]
pub fn jd_to_unix_ns(jd: f64) -> u64 {
    ((jd - UNIX_EPOCH_JD) * NS_PER_DAY) as u64
}

/// Candidate-index key for an alert: its candid, big-endian.
pub fn candidate_key(candid: u64) -> [u8; 8] {
    be64(candid)
}

/// Timestamp-index key for an alert: its observation epoch as unix-ns.
pub fn timestamp_key(alert: &Alert) -> [u8; 8] {
    be64(jd_to_unix_ns(alert.candidate.jd))
}

/// A sequence of u64s packed end to end as 8-byte big-endian blocks.
///
/// This is the value encoding of the object, timestamp and pixel indexes.
/// Insertion order is preserved and duplicates are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackedU64List(Vec<u8>);

impl PackedU64List {
    /// An empty list.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Wraps raw index-value bytes; `None` unless the length is a multiple
    /// of 8.
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.len() % 8 != 0 {
            return None;
        }
        Some(Self(bytes))
    }

    /// Appends one value to the end of the list.
    pub fn push(&mut self, v: u64) {
        self.0.extend_from_slice(&be64(v));
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        self.0.len() / 8
    }

    /// True when the list holds no values.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        self.0
            .chunks_exact(8)
            .filter_map(|chunk| u64_from_be8(chunk))
    }

    /// The raw byte encoding, always a multiple of 8 bytes long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn be64_preserves_numeric_order() {
        let pairs = [
            (0u64, 1u64),
            (1, 255),
            (255, 256),
            (12344, 12345),
            (u64::MAX - 1, u64::MAX),
            (1 << 32, (1 << 32) + 1),
        ];
        for (a, b) in pairs {
            assert!(be64(a) < be64(b), "{a} vs {b}");
        }
    }

    #[test]
    fn be64_round_trips() {
        for v in [0u64, 1, 12345, u64::MAX] {
            assert_eq!(u64_from_be8(&be64(v)), Some(v));
        }
        assert_eq!(u64_from_be8(&[0u8; 7]), None);
    }

    #[test]
    fn candid_12345_key_bytes() {
        assert_eq!(
            candidate_key(12345),
            [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x30, 0x39]
        );
    }

    #[test]
    fn jd_conversion_known_values() {
        assert_eq!(jd_to_unix_ns(2_440_587.5), 0);
        // 18413 days after the epoch.
        assert_eq!(jd_to_unix_ns(2_459_000.5), 1_590_883_200_000_000_000);
        // Half a day is 43200 seconds.
        assert_eq!(jd_to_unix_ns(2_440_588.0), 43_200_000_000_000);
    }

    #[test]
    fn jd_before_epoch_saturates_to_zero() {
        assert_eq!(jd_to_unix_ns(2_440_000.0), 0);
    }

    #[test]
    fn packed_list_push_and_values() {
        let mut list = PackedU64List::new();
        assert!(list.is_empty());
        list.push(1);
        list.push(12345);
        list.push(1); // duplicates are kept
        assert_eq!(list.len(), 3);
        assert_eq!(list.as_bytes().len(), 24);
        assert_eq!(list.values().collect::<Vec<_>>(), vec![1, 12345, 1]);
    }

    #[test]
    fn packed_list_rejects_ragged_bytes() {
        assert!(PackedU64List::from_bytes(vec![0u8; 9]).is_none());
        assert!(PackedU64List::from_bytes(vec![0u8; 16]).is_some());
    }
}
