use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{SandplaneError, SandplaneResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Per-team sets of sandboxes holding a running slot.
///
/// The count check and the insert happen under one lock, so two creates racing at the limit
/// cannot both pass. Slots are keyed by sandbox, which makes releasing idempotent.
#[derive(Debug, Default)]
pub struct TeamReservations {
    teams: Mutex<HashMap<String, HashSet<String>>>,
}

/// A team slot held for a sandbox being created.
///
/// Dropping the reservation releases the slot; [`TeamReservation::commit`] keeps it for the
/// sandbox's running life.
#[derive(Debug)]
pub struct TeamReservation {
    reservations: Arc<TeamReservations>,
    team_id: String,
    sandbox_id: String,
    committed: bool,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl TeamReservations {
    /// Creates an empty reservation table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims a slot for `sandbox_id` if the team holds fewer than `limit`.
    pub fn reserve(
        self: &Arc<Self>,
        team_id: &str,
        sandbox_id: &str,
        limit: u32,
    ) -> SandplaneResult<TeamReservation> {
        let mut teams = self.teams.lock().unwrap_or_else(PoisonError::into_inner);
        let held = teams.entry(team_id.to_string()).or_default();

        if !held.contains(sandbox_id) {
            if held.len() >= limit as usize {
                tracing::info!(team_id, limit, "team reached its concurrent sandbox limit");
                return Err(SandplaneError::QuotaExceeded { limit });
            }
            held.insert(sandbox_id.to_string());
        }

        Ok(TeamReservation {
            reservations: self.clone(),
            team_id: team_id.to_string(),
            sandbox_id: sandbox_id.to_string(),
            committed: false,
        })
    }

    /// Frees the slot held for `sandbox_id`. Returns whether one was held.
    pub fn release(&self, team_id: &str, sandbox_id: &str) -> bool {
        let mut teams = self.teams.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(held) = teams.get_mut(team_id) else {
            return false;
        };

        let released = held.remove(sandbox_id);
        if held.is_empty() {
            teams.remove(team_id);
        }

        released
    }

    /// Number of slots the team holds.
    pub fn count(&self, team_id: &str) -> usize {
        self.teams
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(team_id)
            .map_or(0, HashSet::len)
    }
}

impl TeamReservation {
    /// Keeps the slot after the reservation goes out of scope.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Drop for TeamReservation {
    fn drop(&mut self) {
        if !self.committed {
            self.reservations.release(&self.team_id, &self.sandbox_id);
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
