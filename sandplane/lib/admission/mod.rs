//! Admission control for sandbox creation.
//!
//! Two gates protect the node fabric. A global counting semaphore bounds how many sandboxes are
//! being created at once across the whole service, and a per-team reservation set bounds how many
//! sandboxes a team may have running. The global slot is held only for the duration of a create;
//! the team reservation lives as long as the sandbox stays on a node.

mod reservations;
mod slots;

use std::{sync::Arc, time::Duration};

use crate::SandplaneResult;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use reservations::*;
pub use slots::*;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The global and per-team creation gates.
#[derive(Debug)]
pub struct AdmissionController {
    slots: CreationSlots,
    teams: Arc<TeamReservations>,
    slot_timeout: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AdmissionController {
    /// Creates the gates with `max_starting` global slots.
    pub fn new(max_starting: usize, slot_timeout: Duration) -> Self {
        Self {
            slots: CreationSlots::new(max_starting),
            teams: Arc::new(TeamReservations::new()),
            slot_timeout,
        }
    }

    /// Waits for a global creation slot, giving up after the configured timeout.
    pub async fn acquire_creation_slot(&self) -> SandplaneResult<CreationPermit> {
        self.slots.acquire(self.slot_timeout).await
    }

    /// Reserves one of the team's `limit` running slots for `sandbox_id`.
    pub fn reserve_team_slot(
        &self,
        team_id: &str,
        sandbox_id: &str,
        limit: u32,
    ) -> SandplaneResult<TeamReservation> {
        self.teams.reserve(team_id, sandbox_id, limit)
    }

    /// Returns a sandbox's team slot. Releasing twice is harmless.
    pub fn release_team_slot(&self, team_id: &str, sandbox_id: &str) -> bool {
        self.teams.release(team_id, sandbox_id)
    }

    /// Number of slots the team currently holds.
    pub fn team_count(&self, team_id: &str) -> usize {
        self.teams.count(team_id)
    }

    /// Number of global creation slots currently free.
    pub fn available_creation_slots(&self) -> usize {
        self.slots.available()
    }
}
