use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::error::QxError;

/// Which storage backend distributed reads should go through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Primary,
    Backup,
}

/// Process-wide read-backend selector.
///
/// Access rules: written only from the query failure path via
/// [`switch_on_allowed_fault`], read by distributed evaluators. The cell is
/// monotonic within a process lifetime; setting it twice is harmless and it
/// never reverts on its own.
static BACKUP_READ: AtomicBool = AtomicBool::new(false);

/// Current read backend, as seen by evaluators.
pub fn read_backend() -> StorageBackend {
    if BACKUP_READ.load(Ordering::Acquire) {
        StorageBackend::Backup
    } else {
        StorageBackend::Primary
    }
}

/// Switch reads to the backup backend when `err` is a recoverable backend
/// fault whose message matches one of the allow-listed patterns. Returns
/// `true` when the caller should re-run the whole query.
pub fn switch_on_allowed_fault(err: &QxError, allow_list: &[String]) -> bool {
    let QxError::RecoverableBackend(msg) = err else {
        return false;
    };
    if !allow_list.iter().any(|pat| !pat.is_empty() && msg.contains(pat)) {
        return false;
    }
    if !BACKUP_READ.swap(true, Ordering::AcqRel) {
        info!("read backend switched to backup after allowed fault: {msg}");
    }
    true
}

/// Reset the selector to the primary backend. Test hook; production code
/// must treat the switch as monotonic.
pub fn reset_read_backend() {
    BACKUP_READ.store(false, Ordering::Release);
}
