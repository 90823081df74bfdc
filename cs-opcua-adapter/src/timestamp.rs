use std::fmt;

/// Control-system timestamp attached to a process variable.
///
/// `index0`/`index1` are the source's sample indices (e.g. macro pulse
/// number); they are carried through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TimeStamp {
    /// Seconds since the Unix epoch.
    pub seconds: u32,
    pub nano_seconds: u32,
    pub index0: u32,
    pub index1: u32,
}

impl TimeStamp {
    pub const fn new(seconds: u32, nano_seconds: u32, index0: u32, index1: u32) -> Self {
        Self {
            seconds,
            nano_seconds,
            index0,
            index1,
        }
    }

    /// Timestamp for the current wall-clock time with zero indices.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn now() -> Self {
        let now = chrono::Utc::now();
        Self::new(
            now.timestamp().clamp(0, i64::from(u32::MAX)) as u32,
            now.timestamp_subsec_nanos(),
            0,
            0,
        )
    }

    /// Human-readable local time, `"N/A"` for the zero timestamp.
    pub fn to_local_string(&self) -> String {
        if self.seconds == 0 && self.nano_seconds == 0 {
            return "N/A".to_string();
        }
        chrono::DateTime::from_timestamp(i64::from(self.seconds), self.nano_seconds).map_or_else(
            || "Invalid".to_string(),
            |utc| {
                utc.with_timezone(&chrono::Local)
                    .format("%Y-%m-%d %H:%M:%S%.3f")
                    .to_string()
            },
        )
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:09} [{}, {}]",
            self.seconds, self.nano_seconds, self.index0, self.index1
        )
    }
}
