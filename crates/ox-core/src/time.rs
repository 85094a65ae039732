//! Host clock helpers
//!
//! The console ABI stamps last-played and achievement-unlock times as
//! Windows FILETIME values (100 ns ticks since 1601-01-01).

use std::time::{SystemTime, UNIX_EPOCH};

/// Ticks between 1601-01-01 and the unix epoch.
pub const UNIX_EPOCH_AS_FILETIME: u64 = 116_444_736_000_000_000;

const TICKS_PER_SECOND: u64 = 10_000_000;

/// Current host time in FILETIME units.
pub fn host_system_time() -> u64 {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();

    UNIX_EPOCH_AS_FILETIME
        + elapsed.as_secs() * TICKS_PER_SECOND
        + u64::from(elapsed.subsec_nanos()) / 100
}
