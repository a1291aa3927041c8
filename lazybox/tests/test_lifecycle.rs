use std::{sync::Arc, time::Duration};

use chrono::Utc;
use lazybox::{
    backend::{ContainerSpec, MemoryComputeBackend, MemoryServiceRegistry},
    lifecycle::{
        CommandSender, IdleCheckOutcome, LifecycleCommand, LifecycleController, LifecycleWorker,
        ProvisionInput,
    },
    models::SandboxStatus,
    scheduler::{self, ActionScheduler, ScheduleRunner, ScheduleState, SqliteScheduler},
    store::{self, ActivityEvent, ActivityLog, SqliteActivityLog, SqliteSandboxStore},
};
use sqlx::{Pool, Sqlite};
use tempfile::TempDir;

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_lifecycle_sleeps_and_wakes_with_sqlite_collaborators() -> anyhow::Result<()> {
    let (_dir, pool) = open_db().await?;
    let env = TestEnv::new(pool);

    let provisioned = env.controller.provision(&input()).await?;
    let uuid = provisioned.service_uuid;
    let record = env.controller.sandbox(&uuid).await?;
    assert_eq!(record.status, SandboxStatus::Starting);
    assert_eq!(record.desired_tasks, Some(1));
    let next_shutdown_at = record.next_shutdown_at.expect("idle-check armed");

    // Retrying the same request returns the same sandbox.
    assert_eq!(env.controller.provision(&input()).await?, provisioned);
    assert_eq!(env.compute.service_count().await, 1);

    // Nothing is due before the window ends.
    let (worker, commands) = LifecycleWorker::new(env.controller.clone(), 8);
    let runner = ScheduleRunner::new(env.scheduler.clone(), commands, Duration::from_secs(1));
    assert_eq!(runner.tick(Utc::now()).await?, 0);

    // Once due, the idle-check fires exactly once.
    let due = next_shutdown_at + chrono::Duration::seconds(1);
    assert_eq!(runner.tick(due).await?, 1);
    assert_eq!(runner.tick(due).await?, 0);
    drop(runner);
    worker.run().await;

    let record = env.controller.sandbox(&uuid).await?;
    assert_eq!(record.status, SandboxStatus::Stopped);
    assert_eq!(record.desired_tasks, Some(0));
    assert_eq!(record.next_shutdown_at, None);

    let name = scheduler::idle_check_schedule_name("lazybox", &uuid);
    let schedule = env.scheduler.get(&name).await?.expect("schedule");
    assert_eq!(schedule.state, ScheduleState::Disabled);

    // A restart re-enables the same schedule instead of creating another.
    let fire_at = env.controller.start_or_restart(&uuid).await?;
    let schedule = env.scheduler.get(&name).await?.expect("schedule");
    assert_eq!(schedule.state, ScheduleState::Enabled);
    assert_eq!(schedule.fire_at, fire_at);

    let record = env.controller.sandbox(&uuid).await?;
    assert_eq!(record.status, SandboxStatus::Starting);
    assert_eq!(record.schedule_ref.as_deref(), Some(schedule.reference.as_str()));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_lifecycle_recent_activity_keeps_sandbox_running() -> anyhow::Result<()> {
    let (_dir, pool) = open_db().await?;
    let env = TestEnv::new(pool);

    let provisioned = env.controller.provision(&input()).await?;
    let uuid = provisioned.service_uuid;

    env.activity
        .append(&uuid, &ActivityEvent::request(&provisioned.domain, Utc::now()))
        .await?;

    match env.controller.idle_check(&uuid, false).await? {
        IdleCheckOutcome::StillInUse { next_check_at } => {
            let record = env.controller.sandbox(&uuid).await?;
            assert_eq!(record.next_shutdown_at, Some(next_check_at));
            assert_eq!(record.status, SandboxStatus::Starting);
        }
        outcome => panic!("expected the sandbox to stay up, got {outcome:?}"),
    }

    // Forcing ignores the activity.
    assert_eq!(
        env.controller.idle_check(&uuid, true).await?,
        IdleCheckOutcome::WentIdle
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_lifecycle_idle_check_survives_a_full_queue() -> anyhow::Result<()> {
    let (_dir, pool) = open_db().await?;
    let env = TestEnv::new(pool);

    let uuid = env.controller.provision(&input()).await?.service_uuid;
    let record = env.controller.sandbox(&uuid).await?;
    let due = record.next_shutdown_at.expect("idle-check armed") + chrono::Duration::seconds(1);

    let (tx, mut rx) = tokio::sync::mpsc::channel(1);
    let runner = ScheduleRunner::new(
        env.scheduler.clone(),
        CommandSender::from(tx.clone()),
        Duration::from_secs(1),
    );

    let filler = LifecycleCommand::StartOrRestart {
        uuid: uuid::Uuid::new_v4(),
    };
    assert!(CommandSender::from(tx).dispatch(filler));
    assert_eq!(runner.tick(due).await?, 0);

    let name = scheduler::idle_check_schedule_name("lazybox", &uuid);
    let schedule = env.scheduler.get(&name).await?.expect("schedule");
    assert_eq!(schedule.state, ScheduleState::Enabled);
    assert_eq!(schedule.fired_at, None);

    // Hours later, with room in the queue, the check still goes out.
    assert_eq!(rx.recv().await, Some(filler));
    let much_later = due + chrono::Duration::hours(5);
    assert_eq!(runner.tick(much_later).await?, 1);
    assert_eq!(
        rx.recv().await,
        Some(LifecycleCommand::IdleCheck {
            uuid,
            force_shutdown: false,
        })
    );

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_lifecycle_concurrent_starts_with_sqlite_collaborators() -> anyhow::Result<()> {
    let (_dir, pool) = open_db().await?;
    let env = TestEnv::new(pool);

    let uuid = env.controller.provision(&input()).await?.service_uuid;
    env.controller.idle_check(&uuid, true).await?;

    for _ in 0..20 {
        let (a, b, c) = tokio::join!(
            env.controller.start_or_restart(&uuid),
            env.controller.start_or_restart(&uuid),
            env.controller.start_or_restart(&uuid),
        );
        a?;
        b?;
        c?;
    }

    // An idle-check racing a start must not fail either.
    let (checked, started) = tokio::join!(
        env.controller.idle_check(&uuid, true),
        env.controller.start_or_restart(&uuid),
    );
    checked?;
    started?;

    let name = scheduler::idle_check_schedule_name("lazybox", &uuid);
    assert!(env.scheduler.get(&name).await?.is_some());
    assert_eq!(env.compute.service_count().await, 1);

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Types: Helpers
//--------------------------------------------------------------------------------------------------

struct TestEnv {
    activity: Arc<SqliteActivityLog>,
    compute: Arc<MemoryComputeBackend>,
    scheduler: Arc<SqliteScheduler>,
    controller: Arc<LifecycleController>,
}

impl TestEnv {
    fn new(pool: Pool<Sqlite>) -> Self {
        let activity = Arc::new(SqliteActivityLog::new(pool.clone()));
        let compute = Arc::new(MemoryComputeBackend::new());
        let scheduler = Arc::new(SqliteScheduler::new(pool.clone()));

        let controller = Arc::new(
            LifecycleController::builder()
                .store(Arc::new(SqliteSandboxStore::new(pool)))
                .activity(activity.clone())
                .registry(Arc::new(MemoryServiceRegistry::new()))
                .compute(compute.clone())
                .scheduler(scheduler.clone())
                .base_domain("example.com")
                .registry_tag("gh")
                .name_prefix("lazybox")
                .idle_window(chrono::Duration::minutes(10))
                .container(
                    ContainerSpec::builder()
                        .image("nginxdemos/hello")
                        .cpu(256)
                        .memory_mib(512)
                        .container_port(80)
                        .build(),
                )
                .build(),
        );

        Self {
            activity,
            compute,
            scheduler,
            controller,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

async fn open_db() -> anyhow::Result<(TempDir, Pool<Sqlite>)> {
    let dir = tempfile::tempdir()?;
    let pool = store::get_or_create_db_pool(dir.path().join("lazybox.db")).await?;
    Ok((dir, pool))
}

fn input() -> ProvisionInput {
    ProvisionInput::builder()
        .repository("web")
        .user("alice")
        .pr(42)
        .created_by_user_id(7)
        .build()
}
