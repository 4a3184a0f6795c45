//! `sandplane` is the control plane of a multi-tenant sandbox service.
//!
//! # Overview
//!
//! Teams create short-lived sandboxes (micro-VMs) from templates. The control plane decides
//! whether a sandbox may start, places it on a node, and answers where every sandbox is in its
//! life: running on a node, paused as a persisted snapshot, or gone.
//!
//! The state of a sandbox is split across two stores. Live sandboxes sit in the in-memory
//! [`registry`]; paused sandboxes are rows of the SQLite [`store`]. The [`lifecycle`] coordinator
//! moves sandboxes between the two so that each one is in exactly one place at a time, and the
//! [`listing`] engine merges both into a single cursor-paginated view.
//!
//! # Modules
//!
//! - [`admission`] - Global creation slots and per-team reservations
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration types and defaults
//! - [`deletion`] - Cascading deletion of paused snapshots
//! - [`fabric`] - The node fabric seam and a local single-node implementation
//! - [`lifecycle`] - Create, pause, kill, keep-alive and the expiry reaper
//! - [`listing`] - Merged, cursor-paginated listing
//! - [`models`] - Sandboxes, snapshots, teams and templates
//! - [`registry`] - The in-memory registry of live sandboxes
//! - [`server`] - REST API server implementation
//! - [`store`] - SQLite persistence
//! - [`templates`] - Template resolution with a TTL cache
//! - [`utils`] - Common utilities and helpers
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use sandplane::{
//!     config::PlaneConfig,
//!     lifecycle::{CreateSandboxRequest, SandboxService},
//!     listing::ListQuery,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = SandboxService::open(PlaneConfig::load("sandplane.toml").await?).await?;
//!     let team = service.load_team("team-a").await?;
//!
//!     let request = CreateSandboxRequest::builder().template("base").build();
//!     let sandbox = service.create(&team, request).await?;
//!
//!     service.pause(team.get_id(), sandbox.get_sandbox_id()).await?;
//!     let page = service.list(team.get_id(), &ListQuery::default()).await?;
//!     println!("{} sandboxes", page.items.len());
//!
//!     service.shutdown().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod admission;
pub mod cli;
pub mod config;
pub mod deletion;
pub mod fabric;
pub mod lifecycle;
pub mod listing;
pub mod models;
pub mod registry;
pub mod server;
pub mod store;
pub mod templates;
pub mod utils;

pub use error::*;
