//! Time sources: monotonic instants for TTLs and deadlines, wall-clock
//! milliseconds for stream ids.

use jiff::Timestamp;
use tokio::time::Instant;

/// Monotonic now, used for expirations and blocking deadlines.
pub fn now() -> Instant {
    Instant::now()
}

/// Wall-clock milliseconds since the Unix epoch, used for auto-generated
/// stream entry ids.
pub fn unix_ms() -> u64 {
    Timestamp::now().as_millisecond().max(0) as u64
}
