use std::path::PathBuf;

use clap::Parser;

use super::styles;
use crate::utils::{self, SANDPLANE_CONFIG_FILENAME};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Sandplane - the control plane for ephemeral sandboxes
#[derive(Debug, Parser)]
#[command(name = "sandplane", author, about, version, styles=styles::styles())]
pub struct SandplaneArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<SandplaneSubcommand>,

    /// Path to the configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum SandplaneSubcommand {
    /// Start the HTTP control plane
    #[command(name = "serve")]
    Serve {
        /// Port to listen on, overriding the configuration
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create or upgrade the database and seed teams and templates
    #[command(name = "migrate")]
    Migrate,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl SandplaneArgs {
    /// The configuration file to load: `--config`, else `$SANDPLANE_HOME/sandplane.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| utils::get_sandplane_home_path().join(SANDPLANE_CONFIG_FILENAME))
    }

    /// The log filter used when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        if self.verbose {
            "sandplane=debug,info"
        } else {
            "info"
        }
    }
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
