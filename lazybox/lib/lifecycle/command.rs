use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::{
    sync::mpsc::{self, error::TrySendError, Receiver, Sender},
    task::JoinSet,
};
use uuid::Uuid;

use crate::LazyboxError;

use super::LifecycleController;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A one-way request for the lifecycle worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum LifecycleCommand {
    /// Scale a sandbox up.
    StartOrRestart {
        /// The sandbox.
        uuid: Uuid,
    },

    /// Check whether a sandbox should go idle.
    IdleCheck {
        /// The sandbox.
        uuid: Uuid,

        /// Go idle regardless of recent traffic.
        force_shutdown: bool,
    },
}

/// The sending half of the command queue.
///
/// Dispatching never waits. When the queue is full the command is dropped and the next request
/// for the same sandbox triggers it again.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: Sender<LifecycleCommand>,
}

/// Executes lifecycle commands, each on its own task.
pub struct LifecycleWorker {
    controller: Arc<LifecycleController>,
    rx: Receiver<LifecycleCommand>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl CommandSender {
    /// Queues a command. Returns `false` if it was dropped.
    pub fn dispatch(&self, command: LifecycleCommand) -> bool {
        match self.tx.try_send(command) {
            Ok(()) => true,
            Err(TrySendError::Full(command)) => {
                tracing::warn!("lifecycle queue full, dropping {command:?}");
                false
            }
            Err(TrySendError::Closed(command)) => {
                tracing::error!("lifecycle worker stopped, dropping {command:?}");
                false
            }
        }
    }
}

impl LifecycleWorker {
    /// Creates a worker and the sender feeding it.
    pub fn new(controller: Arc<LifecycleController>, capacity: usize) -> (Self, CommandSender) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { controller, rx }, CommandSender { tx })
    }

    /// Runs until every sender is dropped, then waits for in-flight commands.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();

        loop {
            tokio::select! {
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    let controller = Arc::clone(&self.controller);
                    tasks.spawn(async move { execute(&controller, command).await });
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = result {
                        tracing::error!("lifecycle task panicked: {e}");
                    }
                }
            }
        }

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!("lifecycle task panicked: {e}");
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl From<Sender<LifecycleCommand>> for CommandSender {
    fn from(tx: Sender<LifecycleCommand>) -> Self {
        Self { tx }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

async fn execute(controller: &LifecycleController, command: LifecycleCommand) {
    match command {
        LifecycleCommand::StartOrRestart { uuid } => {
            match controller.start_or_restart(&uuid).await {
                Ok(next_check_at) => {
                    tracing::debug!("start of {uuid} done, idle-check at {next_check_at}")
                }
                Err(e) => tracing::error!("failed to start sandbox {uuid}: {e}"),
            }
        }
        LifecycleCommand::IdleCheck {
            uuid,
            force_shutdown,
        } => match controller.idle_check(&uuid, force_shutdown).await {
            Ok(outcome) => tracing::debug!("idle-check of {uuid}: {outcome:?}"),
            Err(LazyboxError::SandboxNotFound(_)) => {
                tracing::warn!("idle-check for unknown sandbox {uuid}, dropping it")
            }
            Err(e) => {
                tracing::error!("idle-check of sandbox {uuid} failed: {e}");
                if let Err(e) = controller.retry_idle_check(&uuid).await {
                    tracing::error!("failed to re-arm idle-check of sandbox {uuid}: {e}");
                }
            }
        },
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
