//! The control plane configuration.

use std::{
    net::{IpAddr, SocketAddr},
    path::{Path, PathBuf},
    time::Duration,
};

use getset::{CopyGetters, Getters};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use super::{
    DEFAULT_BUILD_TAG, DEFAULT_BULK_KILL_CONCURRENCY, DEFAULT_CLUSTER_ID,
    DEFAULT_CREATION_SLOT_TIMEOUT_SECS, DEFAULT_LIST_LIMIT, DEFAULT_LIST_MAX_LIMIT,
    DEFAULT_MAX_STARTING_SANDBOXES, DEFAULT_MIN_KEEP_ALIVE_SECS, DEFAULT_REAP_INTERVAL_MS,
    DEFAULT_SANDBOX_TIMEOUT_SECS, DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
    DEFAULT_TEMPLATE_CACHE_TTL_SECS,
};
use crate::{
    models::Team,
    utils::{self, SANDPLANE_DB_FILENAME},
    SandplaneResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The sandplane configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters, CopyGetters)]
#[serde(default)]
pub struct PlaneConfig {
    /// Upper bound on sandboxes being created at the same time.
    #[builder(default = DEFAULT_MAX_STARTING_SANDBOXES)]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) max_starting_sandboxes: usize,

    /// Seconds a create waits for a creation slot.
    #[builder(default = DEFAULT_CREATION_SLOT_TIMEOUT_SECS)]
    pub(crate) creation_slot_timeout_secs: u64,

    /// Seconds a sandbox lives when the caller gives no timeout.
    #[builder(default = DEFAULT_SANDBOX_TIMEOUT_SECS)]
    pub(crate) default_sandbox_timeout_secs: u64,

    /// The floor applied to keep-alive durations.
    #[builder(default = DEFAULT_MIN_KEEP_ALIVE_SECS)]
    pub(crate) min_keep_alive_secs: u64,

    /// The cluster used for teams without an override.
    #[builder(default = DEFAULT_CLUSTER_ID.to_string(), setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) default_cluster_id: String,

    /// Page size when the caller does not pass one.
    #[builder(default = DEFAULT_LIST_LIMIT)]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) list_default_limit: u32,

    /// Largest page size.
    #[builder(default = DEFAULT_LIST_MAX_LIMIT)]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) list_max_limit: u32,

    /// Sandboxes killed in parallel by a bulk kill.
    #[builder(default = DEFAULT_BULK_KILL_CONCURRENCY)]
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) bulk_kill_concurrency: usize,

    /// Milliseconds between reaper scans.
    #[builder(default = DEFAULT_REAP_INTERVAL_MS)]
    pub(crate) reap_interval_ms: u64,

    /// Seconds resolved templates stay cached.
    #[builder(default = DEFAULT_TEMPLATE_CACHE_TTL_SECS)]
    pub(crate) template_cache_ttl_secs: u64,

    /// Where the HTTP server listens.
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) server: ServerConfig,

    /// The SQLite database; defaults to `$SANDPLANE_HOME/sandplane.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    pub(crate) database_path: Option<PathBuf>,

    /// Teams written to the database on startup.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) teams: Vec<Team>,

    /// Templates written to the database on startup.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    #[builder(default)]
    #[getset(get = "pub with_prefix")]
    pub(crate) templates: Vec<TemplateSeed>,
}

/// Where the HTTP server listens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, CopyGetters)]
#[serde(default)]
#[getset(get_copy = "pub with_prefix")]
pub struct ServerConfig {
    /// The address to bind.
    #[builder(default = DEFAULT_SERVER_HOST)]
    pub(crate) host: IpAddr,

    /// The port to bind.
    #[builder(default = DEFAULT_SERVER_PORT)]
    pub(crate) port: u16,
}

/// A template and its builds, declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct TemplateSeed {
    /// The template identifier.
    #[builder(setter(into))]
    pub(crate) id: String,

    /// The owning team.
    #[builder(setter(into))]
    pub(crate) team_id: String,

    /// Whether every team may use the template.
    #[serde(default)]
    #[builder(default)]
    pub(crate) public: bool,

    /// Human-readable names for the template.
    #[serde(default)]
    #[builder(default)]
    pub(crate) aliases: Vec<String>,

    /// The template's builds.
    #[serde(default)]
    #[builder(default)]
    pub(crate) builds: Vec<BuildSeed>,
}

/// A build declared in the configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TypedBuilder, Getters, CopyGetters)]
pub struct BuildSeed {
    /// The build identifier.
    #[builder(setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) id: String,

    /// The tag the build is published under.
    #[serde(default = "BuildSeed::default_tag")]
    #[builder(default = BuildSeed::default_tag(), setter(into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) tag: String,

    /// Number of virtual CPUs.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) vcpu: u32,

    /// Memory in MiB.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) memory_mb: u32,

    /// Disk in MiB.
    #[getset(get_copy = "pub with_prefix")]
    pub(crate) disk_mb: u32,

    /// The cluster holding the artifacts; the default cluster when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[builder(default, setter(strip_option, into))]
    #[getset(get = "pub with_prefix")]
    pub(crate) cluster_id: Option<String>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl PlaneConfig {
    /// Loads the configuration from a TOML file; a missing file yields the defaults.
    pub async fn load(path: impl AsRef<Path>) -> SandplaneResult<Self> {
        let path = path.as_ref();
        if !tokio::fs::try_exists(path).await? {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&contents)
    }

    /// Parses the configuration from TOML.
    pub fn from_toml(contents: &str) -> SandplaneResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// How long a create waits for a creation slot.
    pub fn creation_slot_timeout(&self) -> Duration {
        Duration::from_secs(self.creation_slot_timeout_secs)
    }

    /// The sandbox lifetime used when the caller gives none.
    pub fn default_sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.default_sandbox_timeout_secs)
    }

    /// The floor applied to keep-alive durations.
    pub fn min_keep_alive(&self) -> Duration {
        Duration::from_secs(self.min_keep_alive_secs)
    }

    /// Time between reaper scans.
    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    /// How long resolved templates stay cached.
    pub fn template_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.template_cache_ttl_secs)
    }

    /// The database path, falling back to the sandplane home directory.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| utils::get_sandplane_home_path().join(SANDPLANE_DB_FILENAME))
    }

    /// The socket address of the HTTP server.
    pub fn server_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }

    /// Overrides the port of the HTTP server.
    pub fn set_server_port(&mut self, port: u16) {
        self.server.port = port;
    }
}

impl BuildSeed {
    fn default_tag() -> String {
        DEFAULT_BUILD_TAG.to_string()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for PlaneConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
