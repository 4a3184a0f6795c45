use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    sync::LazyLock,
};

use crate::utils::SANDPLANE_HOME_DIR;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Upper bound on sandboxes being created at the same time across the whole service.
pub const DEFAULT_MAX_STARTING_SANDBOXES: usize = 128;

/// How long a create request waits for a creation slot before giving up.
pub const DEFAULT_CREATION_SLOT_TIMEOUT_SECS: u64 = 30;

/// The sandbox lifetime used when the caller does not ask for one.
pub const DEFAULT_SANDBOX_TIMEOUT_SECS: u64 = 15;

/// The shortest extension a keep-alive can grant.
pub const DEFAULT_MIN_KEEP_ALIVE_SECS: u64 = 15;

/// The cluster used for teams without an override.
pub const DEFAULT_CLUSTER_ID: &str = "local";

/// Page size when the caller does not pass `limit`.
pub const DEFAULT_LIST_LIMIT: u32 = 100;

/// Largest page size a caller may ask for.
pub const DEFAULT_LIST_MAX_LIMIT: u32 = 100;

/// Sandboxes killed in parallel by a bulk kill.
pub const DEFAULT_BULK_KILL_CONCURRENCY: usize = 10;

/// How often the reaper looks for expired sandboxes.
pub const DEFAULT_REAP_INTERVAL_MS: u64 = 1_000;

/// How long resolved templates stay cached.
pub const DEFAULT_TEMPLATE_CACHE_TTL_SECS: u64 = 300;

/// Default port for the HTTP server.
pub const DEFAULT_SERVER_PORT: u16 = 3456;

/// Default address for the HTTP server.
pub const DEFAULT_SERVER_HOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// The build tag used when the caller does not name one.
pub const DEFAULT_BUILD_TAG: &str = "default";

/// The path where all sandplane global data is stored.
pub static DEFAULT_SANDPLANE_HOME: LazyLock<PathBuf> = LazyLock::new(|| {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(SANDPLANE_HOME_DIR)
});
