use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// File count and byte total for a path.
///
/// The same type is used for absolute values (a directory aggregate or the
/// record of one file) and for signed deltas applied to them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counters {
    pub file_count: i64,
    pub total_bytes: i64,
}

impl Counters {
    pub const ZERO: Counters = Counters::new(0, 0);

    /// Encoded width of [`Counters::to_le_bytes`].
    pub const ENCODED_LEN: usize = 16;

    #[inline]
    pub const fn new(file_count: i64, total_bytes: i64) -> Self {
        Self {
            file_count,
            total_bytes,
        }
    }

    /// The record of a single file of `size` bytes.
    #[inline]
    pub const fn file(size: i64) -> Self {
        Self::new(1, size)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.file_count == 0 && self.total_bytes == 0
    }

    pub fn to_le_bytes(self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[..8].copy_from_slice(&self.file_count.to_le_bytes());
        out[8..].copy_from_slice(&self.total_bytes.to_le_bytes());
        out
    }

    /// Decodes a value written by [`Counters::to_le_bytes`].
    ///
    /// Returns `None` if `bytes` is not exactly [`Counters::ENCODED_LEN`] long.
    pub fn from_le_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let mut count = [0u8; 8];
        let mut total = [0u8; 8];
        count.copy_from_slice(&bytes[..8]);
        total.copy_from_slice(&bytes[8..]);
        Some(Self::new(i64::from_le_bytes(count), i64::from_le_bytes(total)))
    }
}

impl Add for Counters {
    type Output = Counters;

    fn add(self, rhs: Counters) -> Counters {
        Counters::new(
            self.file_count.wrapping_add(rhs.file_count),
            self.total_bytes.wrapping_add(rhs.total_bytes),
        )
    }
}

impl AddAssign for Counters {
    fn add_assign(&mut self, rhs: Counters) {
        *self = *self + rhs;
    }
}

impl Sub for Counters {
    type Output = Counters;

    fn sub(self, rhs: Counters) -> Counters {
        Counters::new(
            self.file_count.wrapping_sub(rhs.file_count),
            self.total_bytes.wrapping_sub(rhs.total_bytes),
        )
    }
}

impl SubAssign for Counters {
    fn sub_assign(&mut self, rhs: Counters) {
        *self = *self - rhs;
    }
}

impl Neg for Counters {
    type Output = Counters;

    fn neg(self) -> Counters {
        Counters::ZERO - self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic_is_componentwise() {
        let a = Counters::new(3, 300);
        let b = Counters::file(50);
        assert_eq!(a + b, Counters::new(4, 350));
        assert_eq!(a - b, Counters::new(2, 250));
        assert_eq!(-b, Counters::new(-1, -50));
        assert!((a - a).is_zero());
    }

    #[test]
    fn byte_encoding_rejects_wrong_width() {
        let value = Counters::new(-2, 1 << 40);
        assert_eq!(Counters::from_le_bytes(&value.to_le_bytes()), Some(value));
        assert_eq!(Counters::from_le_bytes(&[0u8; 15]), None);
    }

    #[test]
    fn serializes_with_field_names() {
        let json = serde_json::to_string(&Counters::new(2, 150)).unwrap();
        assert_eq!(json, r#"{"file_count":2,"total_bytes":150}"#);
    }
}
