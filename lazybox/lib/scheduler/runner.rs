use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::time::{self, MissedTickBehavior};

use crate::{
    lifecycle::{CommandSender, LifecycleCommand},
    LazyboxResult,
};

use super::{ActionScheduler, IdleCheckPayload};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Fires due idle-checks by polling the scheduler.
pub struct ScheduleRunner {
    scheduler: Arc<dyn ActionScheduler>,
    commands: CommandSender,
    poll_interval: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ScheduleRunner {
    /// Creates a runner that dispatches into `commands`.
    pub fn new(
        scheduler: Arc<dyn ActionScheduler>,
        commands: CommandSender,
        poll_interval: Duration,
    ) -> Self {
        Self {
            scheduler,
            commands,
            poll_interval,
        }
    }

    /// Polls forever.
    pub async fn run(self) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            if let Err(e) = self.tick(Utc::now()).await {
                tracing::error!("failed to poll due schedules: {e}");
            }
        }
    }

    /// Dispatches an idle-check for every schedule due at `now`. Returns how many were sent.
    ///
    /// A schedule whose command could not be queued is released and taken again on a later tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> LazyboxResult<usize> {
        let due = self.scheduler.take_due(now).await?;
        let mut dispatched = 0;

        for schedule in due {
            let payload = match IdleCheckPayload::from_value(&schedule.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::error!("schedule {} has a malformed payload: {e}", schedule.name);
                    continue;
                }
            };

            tracing::debug!("schedule {} fired for {}", schedule.name, payload.service_uuid);
            let queued = self.commands.dispatch(LifecycleCommand::IdleCheck {
                uuid: payload.service_uuid,
                force_shutdown: false,
            });

            if queued {
                dispatched += 1;
            } else if let Err(e) = self.scheduler.release(&schedule.name).await {
                tracing::error!("failed to release schedule {}: {e}", schedule.name);
            }
        }

        Ok(dispatched)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
