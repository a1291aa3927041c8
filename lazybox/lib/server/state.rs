//! Server state management.

use std::sync::Arc;

use crate::lifecycle::LifecycleController;

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Shared server state containing the lifecycle controller
#[derive(Clone)]
pub struct ServerState {
    /// The shared controller instance
    controller: Arc<LifecycleController>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl ServerState {
    /// Creates a new ServerState instance
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }

    /// Gets a reference to the controller
    pub fn controller(&self) -> &Arc<LifecycleController> {
        &self.controller
    }
}
