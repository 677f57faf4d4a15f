use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::CoreError;

pub const DEFAULT_MAX_DRIFT_MS: u64 = 300_000; // 5 minutes

/// Returns the current wall-clock time as milliseconds since Unix epoch.
pub fn physical_now() -> Result<u64, CoreError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .map_err(|_| CoreError::InvalidData("system clock before epoch".into()))
}

/// A transaction timestamp: 8 bytes wall_ms (big-endian u64) followed by
/// 4 bytes counter (big-endian u32). Byte order equals time order, so the
/// encoded form can be compared directly inside SQLite.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug)]
pub struct Timestamp {
    wall_ms: u64,
    counter: u32,
}

impl Timestamp {
    pub const ENCODED_LEN: usize = 12;

    pub fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    pub fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    pub fn to_bytes(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[..8].copy_from_slice(&self.wall_ms.to_be_bytes());
        buf[8..].copy_from_slice(&self.counter.to_be_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 12]) -> Self {
        let mut wall = [0u8; 8];
        let mut counter = [0u8; 4];
        wall.copy_from_slice(&bytes[..8]);
        counter.copy_from_slice(&bytes[8..]);
        Self {
            wall_ms: u64::from_be_bytes(wall),
            counter: u32::from_be_bytes(counter),
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: &[u8; 12] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidData(format!("timestamp must be 12 bytes, got {}", bytes.len())))?;
        Ok(Self::from_bytes(arr))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_bytes().cmp(&other.to_bytes())
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}", self.wall_ms, self.counter)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.to_bytes())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        let arr: [u8; 12] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"12 bytes"))?;
        Ok(Timestamp::from_bytes(&arr))
    }
}

/// Issues strictly increasing transaction timestamps.
///
/// `tick` advances from local state alone. `receive` additionally merges a
/// timestamp observed elsewhere (another connection's high-water mark) and
/// returns a value greater than both.
pub struct Clock {
    wall_ms: u64,
    counter: u32,
    max_drift_ms: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::with_max_drift(DEFAULT_MAX_DRIFT_MS)
    }

    pub fn with_max_drift(max_drift_ms: u64) -> Self {
        Self {
            wall_ms: 0,
            counter: 0,
            max_drift_ms,
        }
    }

    /// Generate the next monotonically increasing timestamp.
    pub fn tick(&mut self) -> Result<Timestamp, CoreError> {
        let now = physical_now()?;

        let ts = if now > self.wall_ms {
            Timestamp::new(now, 0)
        } else {
            Timestamp::new(self.wall_ms, self.counter + 1)
        };

        self.wall_ms = ts.wall_ms;
        self.counter = ts.counter;
        Ok(ts)
    }

    /// Merge with an observed timestamp, producing a timestamp greater than both.
    pub fn receive(&mut self, remote: &Timestamp) -> Result<Timestamp, CoreError> {
        let now = physical_now()?;

        if remote.wall_ms > now + self.max_drift_ms {
            return Err(CoreError::ClockDriftTooLarge {
                delta_ms: remote.wall_ms - now,
                max_ms: self.max_drift_ms,
            });
        }

        let ts = if now > self.wall_ms && now > remote.wall_ms {
            Timestamp::new(now, 0)
        } else if self.wall_ms == remote.wall_ms {
            Timestamp::new(self.wall_ms, self.counter.max(remote.counter) + 1)
        } else if self.wall_ms > remote.wall_ms {
            Timestamp::new(self.wall_ms, self.counter + 1)
        } else {
            Timestamp::new(remote.wall_ms, remote.counter + 1)
        };

        self.wall_ms = ts.wall_ms;
        self.counter = ts.counter;
        Ok(ts)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
