//! Periodic arming of open contexts for forced commits.

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::registry::HandleRegistry;

/// Spawn the background flusher thread.
///
/// Every `interval` the flusher marks all currently open contexts for a
/// forced commit on their next write. It never commits anything itself, so
/// a file left open without an explicit flush loses at most one interval's
/// worth of writes if the process dies.
///
/// Returns `None` when the interval is zero (flushing disabled). The thread
/// runs for the lifetime of the process; no cancellation is exposed.
pub fn spawn(
    registry: Arc<HandleRegistry>,
    interval: Duration,
) -> io::Result<Option<thread::JoinHandle<()>>> {
    if interval.is_zero() {
        debug!("periodic flusher disabled");
        return Ok(None);
    }
    let handle = thread::Builder::new()
        .name("snapfs-flusher".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            let armed = registry.arm_all();
            if armed > 0 {
                debug!(armed, "armed open contexts for forced commit");
            }
        })?;
    Ok(Some(handle))
}
