use std::{collections::HashMap, time::Duration};

use chrono::TimeDelta;
use serde::Deserialize;
use typed_builder::TypedBuilder;

use super::SandboxService;
use crate::{
    config::DEFAULT_BUILD_TAG,
    fabric::CreateRequest,
    models::{ResourceSpec, Sandbox, SandboxState, Team},
    utils, SandplaneError, SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// What the caller asks for when creating a sandbox.
#[derive(Debug, Clone, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct CreateSandboxRequest {
    /// A template id or alias, optionally followed by `:tag`.
    #[serde(rename = "templateID")]
    #[builder(setter(into))]
    pub template: String,

    /// Lifetime in seconds; the configured default when absent.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub timeout: Option<u64>,

    /// Caller-defined labels.
    #[serde(default)]
    #[builder(default)]
    pub metadata: HashMap<String, String>,

    /// Environment variables for the guest.
    #[serde(default)]
    #[builder(default)]
    pub env_vars: HashMap<String, String>,

    /// Pause instead of kill when the deadline passes.
    #[serde(default)]
    #[builder(default)]
    pub auto_pause: bool,

    /// Overrides the build's vCPU count.
    #[serde(default)]
    #[builder(default, setter(strip_option))]
    pub cpu_count: Option<u32>,

    /// Overrides the build's memory size.
    #[serde(default, rename = "memoryMB")]
    #[builder(default, setter(strip_option))]
    pub memory_mb: Option<u32>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SandboxService {
    /// Creates a sandbox for the team.
    ///
    /// The template is resolved before any admission gate is taken. A creation slot and a team
    /// slot are then held while the node starts the sandbox; the creation slot is returned when
    /// this call ends, the team slot stays with the sandbox for as long as it runs.
    pub async fn create(
        &self,
        team: &Team,
        request: CreateSandboxRequest,
    ) -> SandplaneResult<Sandbox> {
        let inner = &self.inner;
        let cluster_id = self.resolve_cluster(team);

        let (name, tag) = parse_template_ref(&request.template)?;
        let template_id = inner.templates.resolve_alias(name, &team.id).await?;
        let resolved = inner
            .templates
            .get(&template_id, tag, &team.id, &cluster_id)
            .await?;
        let alias = (name != template_id).then(|| name.to_string());

        let permit = inner.admission.acquire_creation_slot().await?;

        let sandbox_id = Sandbox::generate_id();
        let reservation =
            inner
                .admission
                .reserve_team_slot(&team.id, &sandbox_id, team.concurrent_instances)?;

        let lifetime = requested_lifetime(
            team,
            request.timeout,
            inner.config.default_sandbox_timeout(),
        )?;
        let resources = resolve_resources(team, resolved.build.resources, &request)?;

        let started_at = utils::now_micros();
        let end_at = utils::saturating_add(started_at, lifetime);
        let create_request = CreateRequest::builder()
            .sandbox_id(sandbox_id.clone())
            .team_id(team.id.clone())
            .template_id(template_id.clone())
            .build_id(resolved.build.id.clone())
            .cluster_id(cluster_id.clone())
            .resources(resources)
            .started_at(started_at)
            .end_at(end_at)
            .metadata(request.metadata.clone())
            .env_vars(request.env_vars.clone())
            .build();

        let placement = inner
            .fabric
            .create_on_node(&create_request)
            .await
            .map_err(|e| {
                tracing::error!(
                    sandbox_id = %sandbox_id,
                    team_id = %team.id,
                    cluster_id = %cluster_id,
                    error = %e,
                    "failed to create sandbox on node"
                );
                SandplaneError::Internal(format!("failed to create sandbox: {e}"))
            })?;

        let sandbox = Sandbox {
            sandbox_id: sandbox_id.clone(),
            team_id: team.id.clone(),
            template_id,
            build_id: resolved.build.id,
            alias,
            cluster_id,
            node_id: placement.node_id,
            state: SandboxState::Running,
            resources,
            started_at,
            end_at,
            metadata: request.metadata,
            env_vars: request.env_vars,
            auto_pause: request.auto_pause,
            resumed_from: None,
        };

        inner.registry.insert(sandbox.clone())?;
        reservation.commit();
        drop(permit);

        tracing::info!(
            sandbox_id = %sandbox.sandbox_id,
            team_id = %sandbox.team_id,
            cluster_id = %sandbox.cluster_id,
            node_id = %sandbox.node_id,
            build_id = %sandbox.build_id,
            "sandbox created"
        );

        Ok(sandbox)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Splits `name[:tag]`, defaulting the tag.
fn parse_template_ref(reference: &str) -> SandplaneResult<(&str, &str)> {
    let reference = reference.trim();
    let (name, tag) = match reference.split_once(':') {
        Some((name, tag)) => (name, tag),
        None => (reference, DEFAULT_BUILD_TAG),
    };

    if name.is_empty() || tag.is_empty() {
        return Err(SandplaneError::InvalidArgument(format!(
            "invalid template reference '{reference}'"
        )));
    }

    Ok((name, tag))
}

/// The lifetime a create or resume asks for, in whole seconds.
///
/// An absent timeout takes `default`. Zero and anything past the team's maximum sandbox length
/// are rejected.
pub(super) fn requested_lifetime(
    team: &Team,
    timeout: Option<u64>,
    default: Duration,
) -> SandplaneResult<TimeDelta> {
    let timeout = timeout.map(Duration::from_secs).unwrap_or(default);
    if timeout.is_zero() {
        return Err(SandplaneError::InvalidArgument(
            "timeout must be at least one second".to_string(),
        ));
    }

    let lifetime = utils::to_time_delta(timeout);
    if lifetime > team.max_length() {
        return Err(SandplaneError::InvalidArgument(format!(
            "timeout cannot be greater than {} hours",
            team.max_length_hours
        )));
    }

    Ok(lifetime)
}

fn resolve_resources(
    team: &Team,
    build: ResourceSpec,
    request: &CreateSandboxRequest,
) -> SandplaneResult<ResourceSpec> {
    let vcpu = request.cpu_count.unwrap_or(build.vcpu);
    let memory_mb = request.memory_mb.unwrap_or(build.memory_mb);

    if vcpu == 0 || vcpu > team.max_vcpu {
        return Err(SandplaneError::InvalidArgument(format!(
            "cpu count must be between 1 and {}",
            team.max_vcpu
        )));
    }

    if memory_mb == 0 || memory_mb > team.max_ram_mb {
        return Err(SandplaneError::InvalidArgument(format!(
            "memory must be between 1 and {} MiB",
            team.max_ram_mb
        )));
    }

    Ok(ResourceSpec {
        vcpu,
        memory_mb,
        disk_mb: build.disk_mb,
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
