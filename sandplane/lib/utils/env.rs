use std::env;

use crate::{config::DEFAULT_SANDPLANE_HOME, SandplaneResult};

use super::SANDPLANE_HOME_ENV_VAR;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Checks if the environment variables are set and sets them if they are not.
pub fn check_or_set_env() -> SandplaneResult<()> {
    if env::var(SANDPLANE_HOME_ENV_VAR).is_err() {
        tracing::warn!(
            "{} is not set, setting to default: {}",
            SANDPLANE_HOME_ENV_VAR,
            DEFAULT_SANDPLANE_HOME.display().to_string()
        );
        env::set_var(
            SANDPLANE_HOME_ENV_VAR,
            DEFAULT_SANDPLANE_HOME.display().to_string(),
        );
    }

    Ok(())
}
