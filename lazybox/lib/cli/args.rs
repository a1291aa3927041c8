use std::path::PathBuf;

use clap::Parser;
use uuid::Uuid;

use super::styles;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// `lazybox` provisions per-pull-request sandboxes, routes traffic to them and puts idle ones to
/// sleep
#[derive(Debug, Parser)]
#[command(name = "lazybox", author, version, styles=styles::styles())]
pub struct LazyboxArgs {
    /// The subcommand to run
    #[command(subcommand)]
    pub subcommand: Option<LazyboxSubcommand>,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands
#[derive(Debug, Parser)]
pub enum LazyboxSubcommand {
    /// Run the control API, the gateway and the idle-check scheduler
    #[command(name = "serve")]
    Serve {
        /// Keep all state in memory and fake the compute backend and registry
        #[arg(long)]
        ephemeral: bool,
    },

    /// Provision a sandbox for a pull request
    #[command(name = "provision")]
    Provision {
        /// The repository name
        #[arg(short, long)]
        repository: String,

        /// The user handle
        #[arg(short, long)]
        user: String,

        /// The pull-request number
        #[arg(short, long)]
        pr: u64,

        /// The requester id
        #[arg(long = "created-by")]
        created_by_user_id: u64,
    },

    /// Scale a sandbox up and re-arm its idle-check
    #[command(name = "start")]
    Start {
        /// The sandbox uuid
        #[arg(required = true)]
        uuid: Uuid,
    },

    /// Check whether a sandbox should go idle
    #[command(name = "idle-check")]
    IdleCheck {
        /// The sandbox uuid
        #[arg(required = true)]
        uuid: Uuid,

        /// Go idle regardless of recent traffic
        #[arg(short, long)]
        force: bool,
    },

    /// List all sandboxes
    #[command(name = "list")]
    List,

    /// Show one sandbox record
    #[command(name = "show")]
    Show {
        /// The sandbox uuid
        #[arg(required = true)]
        uuid: Uuid,
    },
}

//-------------------------------------------------------------------------------------------------
// Tests
//-------------------------------------------------------------------------------------------------
