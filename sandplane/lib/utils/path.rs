use std::{env, path::PathBuf};

use crate::config::DEFAULT_SANDPLANE_HOME;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable that overrides the sandplane home directory.
pub const SANDPLANE_HOME_ENV_VAR: &str = "SANDPLANE_HOME";

/// The directory name of the sandplane home under the user's home directory.
pub const SANDPLANE_HOME_DIR: &str = ".sandplane";

/// The filename of the control plane database.
pub const SANDPLANE_DB_FILENAME: &str = "sandplane.db";

/// The filename of the control plane configuration.
pub const SANDPLANE_CONFIG_FILENAME: &str = "sandplane.toml";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the sandplane home directory, honouring `SANDPLANE_HOME`.
pub fn get_sandplane_home_path() -> PathBuf {
    match env::var(SANDPLANE_HOME_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(path),
        _ => DEFAULT_SANDPLANE_HOME.clone(),
    }
}
