use std::{collections::HashMap, sync::Arc};

use sqlx::{Pool, Sqlite};
use typed_builder::TypedBuilder;

use super::{listing_order, Cursor};
use crate::{
    models::{ListedSandbox, SandboxState},
    registry::SandboxRegistry,
    store::{self, SnapshotQuery},
    SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Lists a team's running and paused sandboxes as one paginated view.
#[derive(Debug, Clone)]
pub struct ListingEngine {
    registry: Arc<SandboxRegistry>,
    pool: Pool<Sqlite>,
    default_limit: u32,
    max_limit: u32,
}

/// The filters and position of a listing request.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct ListQuery {
    /// The states to include; both `running` and `paused` when absent or empty.
    #[builder(default, setter(strip_option))]
    pub states: Option<Vec<SandboxState>>,

    /// Exact-match labels every listed sandbox carries.
    #[builder(default)]
    pub metadata: HashMap<String, String>,

    /// The page size; clamped to the configured maximum.
    #[builder(default, setter(strip_option))]
    pub limit: Option<u32>,

    /// The token returned with the previous page.
    #[builder(default, setter(strip_option, into))]
    pub next_token: Option<String>,
}

/// One page of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPage {
    /// The sandboxes on this page, in listing order.
    pub items: Vec<ListedSandbox>,

    /// The token for the next page; absent on the last page.
    pub next_token: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ListingEngine {
    /// Creates an engine over the registry and the snapshot store.
    pub fn new(
        registry: Arc<SandboxRegistry>,
        pool: Pool<Sqlite>,
        default_limit: u32,
        max_limit: u32,
    ) -> Self {
        Self {
            registry,
            pool,
            default_limit,
            max_limit,
        }
    }

    /// Returns one page of the team's sandboxes.
    ///
    /// Each source contributes at most `limit + 1` items after the cursor, so the item after the
    /// page's last one is always among the candidates and tells whether another page exists.
    pub async fn list(&self, team_id: &str, query: &ListQuery) -> SandplaneResult<ListPage> {
        let (want_running, want_paused) = wanted_states(query.states.as_deref())?;
        let limit = self.page_limit(query.limit)?;
        let fetch = limit.saturating_add(1);
        let cursor = match query.next_token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Some(Cursor::decode(token)?),
            _ => None,
        };

        let team_sandboxes = self.registry.team_items(team_id, None).await;
        let mut items: Vec<ListedSandbox> = Vec::new();

        if want_running {
            let mut running: Vec<ListedSandbox> = team_sandboxes
                .iter()
                .filter(|sandbox| sandbox.get_state() == SandboxState::Running)
                .filter(|sandbox| sandbox.matches_metadata(&query.metadata))
                .filter(|sandbox| {
                    cursor.as_ref().map_or(true, |cursor| {
                        cursor.admits(sandbox.get_started_at(), sandbox.get_sandbox_id())
                    })
                })
                .map(ListedSandbox::from)
                .collect();
            sort_listed(&mut running);
            running.truncate(fetch as usize);
            items.extend(running);
        }

        if want_paused {
            // Sandboxes still tracked in the registry never show up as paused.
            let exclude_ids = team_sandboxes
                .iter()
                .map(|sandbox| sandbox.get_sandbox_id().clone())
                .collect();
            let snapshot_query = SnapshotQuery::builder()
                .team_id(team_id)
                .metadata(query.metadata.clone())
                .after(cursor.clone())
                .exclude_ids(exclude_ids)
                .limit(fetch)
                .build();

            let paused = store::list_snapshots(&self.pool, &snapshot_query).await?;
            items.extend(paused.iter().map(ListedSandbox::from));
        }

        sort_listed(&mut items);

        let limit = limit as usize;
        let next_token = if items.len() > limit {
            items.truncate(limit);
            items
                .last()
                .map(|last| Cursor::new(last.started_at, &last.sandbox_id).encode())
        } else {
            None
        };

        tracing::debug!(
            team_id,
            items = items.len(),
            has_more = next_token.is_some(),
            "listed sandboxes"
        );

        Ok(ListPage { items, next_token })
    }

    fn page_limit(&self, requested: Option<u32>) -> SandplaneResult<u32> {
        match requested {
            None => Ok(self.default_limit.min(self.max_limit)),
            Some(0) => Err(SandplaneError::InvalidArgument(
                "limit must be at least 1".to_string(),
            )),
            Some(limit) => Ok(limit.min(self.max_limit)),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn wanted_states(states: Option<&[SandboxState]>) -> SandplaneResult<(bool, bool)> {
    let Some(states) = states.filter(|states| !states.is_empty()) else {
        return Ok((true, true));
    };

    let mut wanted = (false, false);
    for state in states {
        match state {
            SandboxState::Running => wanted.0 = true,
            SandboxState::Paused => wanted.1 = true,
            other => {
                return Err(SandplaneError::InvalidArgument(format!(
                    "cannot list sandboxes in state {other}"
                )))
            }
        }
    }

    Ok(wanted)
}

fn sort_listed(items: &mut [ListedSandbox]) {
    items.sort_by(|a, b| {
        listing_order(
            (a.started_at, a.sandbox_id.as_str()),
            (b.started_at, b.sandbox_id.as_str()),
        )
    });
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
