//! Half-open validity intervals `[start, end)`.

use std::cmp::Ordering;
use std::fmt;

use crate::{CoreError, Timestamp};

/// A left-closed, right-open range of transaction time.
///
/// `end == None` means the interval is still open (the row image is
/// current). Open intervals only ever describe live rows; history rows are
/// always closed, and [`Interval::to_bytes`] refuses to encode an open one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Interval {
    start: Timestamp,
    end: Option<Timestamp>,
}

impl Interval {
    pub const ENCODED_LEN: usize = 2 * Timestamp::ENCODED_LEN;

    /// `[start, end)`. Fails when `end` precedes `start`.
    pub fn closed(start: Timestamp, end: Timestamp) -> Result<Self, CoreError> {
        if end < start {
            return Err(CoreError::InvalidInterval {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            start,
            end: Some(end),
        })
    }

    /// `[start, )`.
    pub fn open(start: Timestamp) -> Self {
        Self { start, end: None }
    }

    pub fn start(&self) -> Timestamp {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// True when no instant satisfies `start <= t < end`.
    pub fn is_empty(&self) -> bool {
        self.end == Some(self.start)
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        t >= self.start && self.end.is_none_or(|end| t < end)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let self_before = self.end.is_some_and(|end| end <= other.start);
        let other_before = other.end.is_some_and(|end| end <= self.start);
        !self_before && !other_before
    }

    /// True when `self` ends exactly where `next` starts.
    pub fn is_adjacent_to(&self, next: &Interval) -> bool {
        self.end == Some(next.start)
    }

    pub fn to_bytes(&self) -> Result<[u8; 24], CoreError> {
        let end = self
            .end
            .ok_or_else(|| CoreError::OpenInterval(self.start.to_string()))?;
        let mut buf = [0u8; 24];
        buf[..12].copy_from_slice(&self.start.to_bytes());
        buf[12..].copy_from_slice(&end.to_bytes());
        Ok(buf)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        if bytes.len() != Self::ENCODED_LEN {
            return Err(CoreError::InvalidData(format!(
                "interval must be {} bytes, got {}",
                Self::ENCODED_LEN,
                bytes.len()
            )));
        }
        let start = Timestamp::from_slice(&bytes[..12])?;
        let end = Timestamp::from_slice(&bytes[12..])?;
        Interval::closed(start, end)
    }
}

impl Ord for Interval {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start.cmp(&other.start).then_with(|| match (self.end, other.end) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => a.cmp(&b),
        })
    }
}

impl PartialOrd for Interval {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{},{})", self.start, end),
            None => write!(f, "[{},)", self.start),
        }
    }
}
