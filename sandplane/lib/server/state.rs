use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{lifecycle::SandboxService, models::Team, SandplaneError};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The header naming the calling team.
pub const TEAM_ID_HEADER: &str = "x-team-id";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct ServerState {
    service: SandboxService,
}

/// The team a request acts for, loaded from the `X-Team-ID` header.
#[derive(Debug, Clone)]
pub struct CallingTeam(pub Team);

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServerState {
    /// Creates the state around a service.
    pub fn new(service: SandboxService) -> Self {
        Self { service }
    }

    /// The sandbox service.
    pub fn service(&self) -> &SandboxService {
        &self.service
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl FromRequestParts<ServerState> for CallingTeam {
    type Rejection = SandplaneError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        let team_id = parts
            .headers
            .get(TEAM_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| SandplaneError::Unauthorized("missing X-Team-ID header".to_string()))?;

        let team = state.service.load_team(team_id).await?;
        Ok(Self(team))
    }
}
