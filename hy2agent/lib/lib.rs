//! `hy2agent` is a host agent for remotely managing a Hysteria 2 proxy server.
//!
//! # Overview
//!
//! The agent runs next to the daemon and exposes an authenticated REST API for:
//! - Service status, start, stop and restart through systemd
//! - Reading and replacing the daemon configuration, with timestamped backups
//! - Installing, upgrading and removing the daemon with the vendor installer
//! - Querying the daemon's journal
//! - Host statistics (CPU, memory, disk, network)
//! - Editing the agent's own access policy
//!
//! # Access Control
//!
//! Every request passes the gate in [`gate`] before reaching a handler. Blacklisted sources are
//! rejected first, then sources outside a non-empty whitelist, then requests without the right
//! `X-API-Key`. An empty whitelist admits any source holding the key.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use hy2agent::{
//!     config::{AgentConfig, PolicyStore},
//!     server::{self, AgentState},
//! };
//! use tokio::net::TcpListener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AgentConfig::builder().home_dir("/etc/hy2agent").build();
//!     let policy = Arc::new(PolicyStore::load_or_init(config.policy_path()).await?);
//!
//!     let state = AgentState::new(&config, policy);
//!     server::serve(TcpListener::bind("0.0.0.0:8080").await?, state).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Agent settings and the persisted access policy
//! - [`gate`] - Request admission
//! - [`management`] - Daemon configuration and its backups
//! - [`release`] - Upstream release listing
//! - [`runtime`] - Service supervision, probing, logs and health
//! - [`server`] - REST API server implementation
//! - [`stats`] - Host statistics
//! - [`utils`] - Common paths and helpers
//!
//! # Platform Support
//!
//! Linux with systemd only. Port checks read `/proc/net`.

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod cli;
pub mod config;
pub mod gate;
pub mod management;
pub mod release;
pub mod runtime;
pub mod server;
pub mod stats;
pub mod utils;

pub use error::*;
