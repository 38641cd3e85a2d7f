//! Small time helpers shared across the workspace.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in whole seconds.
///
/// Used as the fallback clock by adapters that do not have a database-native
/// `now()` (e.g. the in-memory adapter); SQL backends prefer their own clock
/// so that `updatedAt` is genuinely server-assigned per §5 of the spec.
pub fn unix_time() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
