//! Clock service.
//!
//! Mirrors `fmspy._time`: wall-clock seconds and milliseconds, used for
//! keep-alive bookkeeping and the timestamps stamped into Ping payloads.

use chrono::Local;

/// Current time in whole seconds.
pub fn seconds() -> i64 {
    Local::now().timestamp()
}

/// Current time in milliseconds.
pub fn milliseconds() -> i64 {
    Local::now().timestamp_millis()
}

/// `milliseconds()` truncated to fit the 31-bit range RTMP ping timestamps
/// use (`fmspy` masks with `0x7fffffff` for the same reason: the field is a
/// 32-bit unsigned RTMP word but some clients mishandle the sign bit).
pub fn ping_timestamp() -> u32 {
    (milliseconds() as u64 & 0x7fff_ffff) as u32
}
