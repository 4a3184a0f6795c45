use chrono::{DateTime, TimeDelta, Utc};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the current time truncated to microseconds.
///
/// Both sandbox stores keep microsecond timestamps, so every timestamp the control plane hands
/// out goes through here to keep cursor comparisons exact.
pub fn now_micros() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

/// Drops sub-microsecond precision from a timestamp.
pub fn truncate_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    from_micros(time.timestamp_micros())
}

/// Builds a timestamp from microseconds since the epoch.
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(micros).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Converts a std duration into a chrono delta, saturating on overflow.
pub fn to_time_delta(duration: std::time::Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Adds `delta` to `time`, clamping at the latest representable timestamp.
pub fn saturating_add(time: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    time.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
