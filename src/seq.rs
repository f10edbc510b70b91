//! Sequence number arithmetic over the circular 32-bit sequence space.
//!
//! Every ordering of sequence numbers in this crate goes through
//! [wrapping_lt]. Plain `<` on two `u32` sequence numbers is wrong as soon as
//! the stream crosses `u32::MAX`.

use std::cmp::Ordering;
use std::fmt;

/// Returns `true` if `lhs` comes before `rhs` in sequence space.
///
/// RFC 1982 (3.2)
///
/// `lhs` is before `rhs` iff the signed 32-bit difference `lhs - rhs` is
/// negative. Only meaningful while the two values are less than `2^31` apart,
/// which TCP guarantees by bounding the window (RFC 1323 2.3).
#[inline]
pub fn wrapping_lt(lhs: u32, rhs: u32) -> bool {
    (lhs.wrapping_sub(rhs) as i32) < 0
}

/// Returns `true` if `lhs` comes before or is equal to `rhs` in sequence
/// space.
#[inline]
pub fn wrapping_le(lhs: u32, rhs: u32) -> bool {
    lhs == rhs || wrapping_lt(lhs, rhs)
}

/// Returns `true` if `lhs` comes after `rhs` in sequence space.
#[inline]
pub fn wrapping_gt(lhs: u32, rhs: u32) -> bool {
    wrapping_lt(rhs, lhs)
}

/// Returns the number of sequence numbers from `start` up to (but not
/// including) `end`.
#[inline]
pub fn seq_diff(end: u32, start: u32) -> u32 {
    end.wrapping_sub(start)
}

/// Returns `true` if the value `x` is strictly in between the values `start`
/// and `end`, using wrapping arithmetic.
#[inline]
pub fn is_between_wrapped(start: u32, x: u32, end: u32) -> bool {
    wrapping_lt(start, x) && wrapping_lt(x, end)
}

/// Sequence number usable as an ordered map key.
///
/// Ordering follows [wrapping_lt] instead of numeric order, so keys on both
/// sides of a wraparound stay in stream order. All keys held by one map must
/// lie within `2^31` of each other for the ordering to be total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SeqKey(pub u32);

impl SeqKey {
    /// Returns the raw sequence number.
    pub fn get(self) -> u32 {
        self.0
    }
}

impl Ord for SeqKey {
    fn cmp(&self, other: &Self) -> Ordering {
        if self.0 == other.0 {
            Ordering::Equal
        } else if wrapping_lt(self.0, other.0) {
            Ordering::Less
        } else {
            Ordering::Greater
        }
    }
}

impl PartialOrd for SeqKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SeqKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
