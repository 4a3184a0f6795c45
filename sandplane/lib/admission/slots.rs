use std::{sync::Arc, time::Duration};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::{SandplaneError, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A counting semaphore over sandboxes being created.
///
/// Acquisition is cancel safe: dropping a pending `acquire` never consumes a permit.
#[derive(Debug)]
pub struct CreationSlots {
    semaphore: Arc<Semaphore>,
}

/// A held creation slot, returned to the pool on drop.
#[derive(Debug)]
pub struct CreationPermit {
    _permit: OwnedSemaphorePermit,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CreationSlots {
    /// Creates a pool of `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
        }
    }

    /// Waits up to `wait` for a slot.
    pub async fn acquire(&self, wait: Duration) -> SandplaneResult<CreationPermit> {
        match tokio::time::timeout(wait, self.semaphore.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(CreationPermit { _permit: permit }),
            Ok(Err(_)) => Err(SandplaneError::Unavailable(
                "creation slots are closed".to_string(),
            )),
            Err(_) => {
                tracing::warn!(
                    wait_ms = wait.as_millis() as u64,
                    "timed out waiting for a creation slot"
                );
                Err(SandplaneError::Unavailable(
                    "too many sandboxes are starting, please retry".to_string(),
                ))
            }
        }
    }

    /// Number of free slots.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
