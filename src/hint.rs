//! The `lastMod` resume hint a client passes when it connects.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Modification time of the content the client already has, in nanoseconds
/// since the Unix epoch.
///
/// The hint travels as lowercase hexadecimal. It is carried with the session
/// for logging; nothing is skipped based on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResumeHint {
    nanos: i64,
}

impl ResumeHint {
    pub const EPOCH: ResumeHint = ResumeHint { nanos: 0 };

    /// Parses the hint, falling back to the epoch when absent or malformed.
    pub fn parse(raw: Option<&str>) -> Self {
        raw.and_then(|raw| i64::from_str_radix(raw.trim(), 16).ok())
            .map(|nanos| ResumeHint { nanos })
            .unwrap_or(Self::EPOCH)
    }

    /// The hint for a given modification time. Times before the epoch, or
    /// too far after it to fit, clamp to the epoch.
    pub fn from_system_time(time: SystemTime) -> Self {
        time.duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|since| i64::try_from(since.as_nanos()).ok())
            .map(|nanos| ResumeHint { nanos })
            .unwrap_or(Self::EPOCH)
    }

    pub fn nanos(&self) -> i64 {
        self.nanos
    }

    pub fn to_system_time(&self) -> SystemTime {
        let offset = Duration::from_nanos(self.nanos.unsigned_abs());
        if self.nanos >= 0 {
            UNIX_EPOCH + offset
        } else {
            UNIX_EPOCH.checked_sub(offset).unwrap_or(UNIX_EPOCH)
        }
    }
}

impl fmt::Display for ResumeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos < 0 {
            write!(f, "-{:x}", self.nanos.unsigned_abs())
        } else {
            write!(f, "{:x}", self.nanos)
        }
    }
}
