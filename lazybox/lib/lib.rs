//! `lazybox` provisions a sandbox per pull request, routes traffic to it by host name and puts it
//! to sleep when nobody is using it.
//!
//! # Overview
//!
//! Every sandbox gets a routing domain of the form `<pr>-<repository>-<user>.<tag>.<base-domain>`.
//! A request for that host is forwarded to the sandbox if it is running. A sleeping sandbox is
//! woken in the background and the caller is redirected to a waiting page instead of being kept
//! on the line. Each start arms an idle-check that scales the sandbox back to zero once no
//! traffic has been seen for the idle window.
//!
//! # Architecture
//!
//! - **Store**: sandbox records and per-sandbox request activity, backed by SQLite
//! - **Backend**: the compute backend that runs containers and the registry that resolves hosts
//! - **Scheduler**: durable one-shot idle-check timers and the runner that fires them
//! - **Lifecycle**: the controller that drives the state machine, and a worker for queued commands
//! - **Gateway**: host-based routing with lazy wake
//! - **Server**: REST API for operators and CI hooks
//!
//! Each collaborator sits behind an `async_trait` trait with an in-memory implementation, so the
//! whole system runs without external services:
//!
//! ```rust,no_run
//! use lazybox::{config::LazyboxConfig, management::Collaborators, lifecycle::ProvisionInput};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = LazyboxConfig::default();
//!     let controller = Collaborators::ephemeral().controller(&config);
//!
//!     let sandbox = controller
//!         .provision(
//!             &ProvisionInput::builder()
//!                 .repository("web")
//!                 .user("alice")
//!                 .pr(42)
//!                 .created_by_user_id(7)
//!                 .build(),
//!         )
//!         .await?;
//!
//!     println!("{} is served at {}", sandbox.service_uuid, sandbox.domain);
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`backend`] - Compute backend and service registry clients
//! - [`cli`] - Command-line interface and argument parsing
//! - [`config`] - Configuration types and validation
//! - [`gateway`] - Host-based routing and lazy wake
//! - [`lifecycle`] - Sandbox state machine and command worker
//! - [`management`] - Wiring of the binary
//! - [`models`] - Sandbox records and routing keys
//! - [`scheduler`] - Idle-check scheduling
//! - [`server`] - REST API server implementation
//! - [`store`] - Metadata store and activity log
//! - [`utils`] - Common utilities and helpers

#![warn(missing_docs)]

mod error;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub mod backend;
pub mod cli;
pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod management;
pub mod models;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod utils;

pub use error::*;
