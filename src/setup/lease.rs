//! Binaries directory lease
//!
//! Install, wipe and a running server each need the binaries directory to
//! themselves. Whoever holds the lease owns it; everyone else fails fast
//! with `ResourceBusy` instead of waiting.

use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ControlError, ControlResult};

/// Operation currently holding the lease
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseHolder {
    Install,
    Wipe,
    Server,
}

impl LeaseHolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaseHolder::Install => "install",
            LeaseHolder::Wipe => "wipe",
            LeaseHolder::Server => "server",
        }
    }
}

#[derive(Clone, Default)]
pub struct BinariesLease {
    lock: Arc<Mutex<()>>,
    holder: Arc<SyncMutex<Option<LeaseHolder>>>,
}

impl BinariesLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease or fail immediately
    pub fn try_acquire(&self, holder: LeaseHolder) -> ControlResult<BinariesGuard> {
        match self.lock.clone().try_lock_owned() {
            Ok(guard) => {
                *self.holder.lock() = Some(holder);
                tracing::debug!("[Lease] Binaries directory leased to {}", holder.as_str());
                Ok(BinariesGuard {
                    _guard: guard,
                    holder: self.holder.clone(),
                })
            }
            Err(_) => {
                let current = self
                    .holder()
                    .map(|h| h.as_str())
                    .unwrap_or("another operation");
                Err(ControlError::busy(current))
            }
        }
    }

    pub fn holder(&self) -> Option<LeaseHolder> {
        *self.holder.lock()
    }
}

/// Releases the lease on drop
pub struct BinariesGuard {
    _guard: OwnedMutexGuard<()>,
    holder: Arc<SyncMutex<Option<LeaseHolder>>>,
}

impl Drop for BinariesGuard {
    fn drop(&mut self) {
        // Cleared before the mutex guard field drops
        *self.holder.lock() = None;
    }
}
