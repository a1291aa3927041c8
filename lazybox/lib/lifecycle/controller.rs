use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use getset::Getters;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::{
    backend::{ComputeBackend, ContainerSpec, CreateServiceRequest, ServiceRegistry},
    models::{self, SandboxRecord, SandboxStatus, SandboxUpdate},
    scheduler::{self, ActionScheduler, IdleCheckPayload, Schedule, SchedulePatch, ScheduleSpec},
    store::{ActivityLog, SandboxStore},
    LazyboxError, LazyboxResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Orchestrates provisioning, starting, idle-checking and stopping of sandboxes.
///
/// The controller holds no mutable state of its own. Every operation reads the record, talks to
/// the collaborators and writes back, so concurrent callers are only as consistent as the
/// collaborators make them. Writes are not transactional across calls: a crash mid-way leaves a
/// record with some references still absent.
#[derive(TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct LifecycleController {
    /// Sandbox records.
    store: Arc<dyn SandboxStore>,

    /// Per-sandbox request activity.
    activity: Arc<dyn ActivityLog>,

    /// Where sandboxes announce their endpoints.
    registry: Arc<dyn ServiceRegistry>,

    /// Runs the sandbox containers.
    compute: Arc<dyn ComputeBackend>,

    /// Fires idle-checks.
    scheduler: Arc<dyn ActionScheduler>,

    /// The public base domain.
    #[builder(setter(into))]
    base_domain: String,

    /// The registry tag.
    #[builder(setter(into))]
    registry_tag: String,

    /// Prefix for service and schedule names.
    #[builder(setter(into))]
    name_prefix: String,

    /// How long a sandbox may go without traffic.
    idle_window: Duration,

    /// How far ahead a failed idle-check is re-armed.
    #[builder(default = Duration::minutes(1))]
    idle_check_retry: Duration,

    /// What each sandbox runs.
    container: ContainerSpec,
}

/// The validated input of a provisioning request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
pub struct ProvisionInput {
    /// The repository name.
    #[builder(setter(into))]
    pub repository: String,

    /// The user handle.
    #[builder(setter(into))]
    pub user: String,

    /// The pull-request number.
    pub pr: u64,

    /// The requester id.
    pub created_by_user_id: u64,
}

/// The identity of a provisioned sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provisioned {
    /// The sandbox uuid.
    pub service_uuid: Uuid,

    /// The routing domain.
    pub domain: String,
}

/// What an idle-check decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IdleCheckOutcome {
    /// Recent traffic was seen; the next check is scheduled.
    StillInUse {
        /// When the next idle-check fires.
        next_check_at: DateTime<Utc>,
    },

    /// The sandbox was scaled to zero.
    WentIdle,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LifecycleController {
    /// Provisions a sandbox and returns its uuid and domain.
    ///
    /// A sandbox already recorded under the derived domain is returned unchanged.
    pub async fn provision(&self, input: &ProvisionInput) -> LazyboxResult<Provisioned> {
        self.provision_at(input, Utc::now()).await
    }

    /// Scales a sandbox up and pushes its idle-check `idle_window` into the future.
    ///
    /// Returns when the next idle-check fires.
    pub async fn start_or_restart(&self, uuid: &Uuid) -> LazyboxResult<DateTime<Utc>> {
        self.start_or_restart_at(uuid, Utc::now()).await
    }

    /// Scales a sandbox to zero unless it saw traffic within the idle window.
    pub async fn idle_check(
        &self,
        uuid: &Uuid,
        force_shutdown: bool,
    ) -> LazyboxResult<IdleCheckOutcome> {
        self.idle_check_at(uuid, force_shutdown, Utc::now()).await
    }

    /// Re-arms the idle-check of a sandbox whose last check failed, `idle_check_retry` from now.
    ///
    /// Returns when the check fires again.
    pub async fn retry_idle_check(&self, uuid: &Uuid) -> LazyboxResult<DateTime<Utc>> {
        self.retry_idle_check_at(uuid, Utc::now()).await
    }

    /// Gets a sandbox record.
    pub async fn sandbox(&self, uuid: &Uuid) -> LazyboxResult<SandboxRecord> {
        self.store
            .get(uuid)
            .await?
            .ok_or_else(|| LazyboxError::SandboxNotFound(uuid.to_string()))
    }

    /// Lists all sandbox records, oldest first.
    pub async fn sandboxes(&self) -> LazyboxResult<Vec<SandboxRecord>> {
        self.store.list().await
    }

    pub(crate) async fn provision_at(
        &self,
        input: &ProvisionInput,
        now: DateTime<Utc>,
    ) -> LazyboxResult<Provisioned> {
        models::validate_name_part("repository", &input.repository)?;
        models::validate_name_part("user", &input.user)?;

        let domain = models::derive_domain(
            input.pr,
            &input.repository,
            &input.user,
            &self.registry_tag,
            &self.base_domain,
        );

        if let Some(existing) = self.store.find_by_domain(&domain).await? {
            tracing::info!("sandbox {} already provisioned for {domain}", existing.uuid);
            return Ok(Provisioned {
                service_uuid: existing.uuid,
                domain,
            });
        }

        let uuid = Uuid::new_v4();
        let record = SandboxRecord::pending(
            uuid,
            input.created_by_user_id,
            input.pr,
            &input.repository,
            &input.user,
            &domain,
            &self.registry_tag,
            now,
        );

        if let Err(e) = self.store.insert(&record).await {
            // A concurrent provision won the domain.
            if e.is_conflict() {
                if let Some(existing) = self.store.find_by_domain(&domain).await? {
                    return Ok(Provisioned {
                        service_uuid: existing.uuid,
                        domain,
                    });
                }
            }
            return Err(e);
        }

        tracing::info!("provisioning sandbox {uuid} for {domain}");
        self.provision_compute(&record, now).await?;

        Ok(Provisioned {
            service_uuid: uuid,
            domain,
        })
    }

    pub(crate) async fn start_or_restart_at(
        &self,
        uuid: &Uuid,
        now: DateTime<Utc>,
    ) -> LazyboxResult<DateTime<Utc>> {
        let record = self.sandbox(uuid).await?;

        let Some(service_ref) = &record.service_ref else {
            tracing::warn!("sandbox {uuid} has no compute service, provisioning it");
            return self.provision_compute(&record, now).await;
        };

        self.compute.set_desired_count(service_ref, 1).await?;

        let fire_at = now + self.idle_window;
        let schedule = self.arm_idle_check(uuid, fire_at).await?;

        self.store
            .update(
                uuid,
                &SandboxUpdate::new(now)
                    .desired_tasks(1)
                    .status(SandboxStatus::Starting)
                    .schedule_ref(schedule.reference)
                    .next_shutdown_at(Some(fire_at)),
            )
            .await?;

        tracing::info!("started sandbox {uuid}, next idle-check at {fire_at}");
        Ok(fire_at)
    }

    pub(crate) async fn idle_check_at(
        &self,
        uuid: &Uuid,
        force_shutdown: bool,
        now: DateTime<Utc>,
    ) -> LazyboxResult<IdleCheckOutcome> {
        let record = self.sandbox(uuid).await?;

        let in_use = !force_shutdown
            && self
                .activity
                .has_activity(uuid, now - self.idle_window, now)
                .await?;

        if in_use {
            let fire_at = now + self.idle_window;
            let schedule = self.arm_idle_check(uuid, fire_at).await?;
            self.store
                .update(
                    uuid,
                    &SandboxUpdate::new(now)
                        .schedule_ref(schedule.reference)
                        .next_shutdown_at(Some(fire_at)),
                )
                .await?;

            tracing::info!("sandbox {uuid} still in use, next idle-check at {fire_at}");
            return Ok(IdleCheckOutcome::StillInUse {
                next_check_at: fire_at,
            });
        }

        self.store
            .update(uuid, &SandboxUpdate::new(now).status(SandboxStatus::Stopping))
            .await?;

        match &record.service_ref {
            Some(service_ref) => self.compute.set_desired_count(service_ref, 0).await?,
            None => tracing::warn!("sandbox {uuid} has no compute service to scale down"),
        }

        self.store
            .update(
                uuid,
                &SandboxUpdate::new(now)
                    .desired_tasks(0)
                    .status(SandboxStatus::Stopped)
                    .next_shutdown_at(None),
            )
            .await?;

        // Disabled rather than deleted so the next start can re-arm it.
        let name = self.schedule_name(uuid);
        match self.scheduler.update(&name, &SchedulePatch::disable()).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!("no idle-check schedule {name} to disable")
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            "sandbox {uuid} went idle{}",
            if force_shutdown { " (forced)" } else { "" }
        );
        Ok(IdleCheckOutcome::WentIdle)
    }

    pub(crate) async fn retry_idle_check_at(
        &self,
        uuid: &Uuid,
        now: DateTime<Utc>,
    ) -> LazyboxResult<DateTime<Utc>> {
        let fire_at = now + self.idle_check_retry;
        let schedule = self.arm_idle_check(uuid, fire_at).await?;

        // A check that failed after scaling down still gets retried, but the record only
        // advertises a shutdown while the sandbox is meant to run.
        let record = self.sandbox(uuid).await?;
        if record.desired_tasks == Some(1) {
            self.store
                .update(
                    uuid,
                    &SandboxUpdate::new(now)
                        .schedule_ref(schedule.reference)
                        .next_shutdown_at(Some(fire_at)),
                )
                .await?;
        }

        tracing::warn!("idle-check of sandbox {uuid} re-armed for {fire_at}");
        Ok(fire_at)
    }

    /// Registers the sandbox, creates its compute service and arms its first idle-check.
    ///
    /// Returns when the idle-check fires.
    async fn provision_compute(
        &self,
        record: &SandboxRecord,
        now: DateTime<Utc>,
    ) -> LazyboxResult<DateTime<Utc>> {
        let uuid = &record.uuid;
        let name = self.service_name(uuid);

        let entry = self.registry.create_entry(&record.domain).await?;
        let template_ref = self
            .compute
            .register_template(&name, &self.container)
            .await?;

        self.store
            .update(
                uuid,
                &SandboxUpdate::new(now)
                    .template_ref(&template_ref)
                    .registry_ref(&entry.id),
            )
            .await?;

        let request = CreateServiceRequest::builder()
            .name(name)
            .template_ref(template_ref)
            .registry_ref(entry.id)
            .desired_count(1)
            .tags(self.service_tags(record))
            .build();
        let service_ref = self.compute.create_service(&request).await?;

        self.activity.open_stream(uuid).await?;

        self.store
            .update(
                uuid,
                &SandboxUpdate::new(now)
                    .service_ref(service_ref)
                    .desired_tasks(1)
                    .status(SandboxStatus::Starting),
            )
            .await?;

        let fire_at = now + self.idle_window;
        let schedule = self.arm_idle_check(uuid, fire_at).await?;

        self.store
            .update(
                uuid,
                &SandboxUpdate::new(now)
                    .schedule_ref(schedule.reference)
                    .next_shutdown_at(Some(fire_at)),
            )
            .await?;

        Ok(fire_at)
    }

    /// Moves the sandbox's idle-check to `fire_at`, creating it if needed.
    ///
    /// Two callers racing here end with one enabled schedule: whoever loses the create falls
    /// back to updating the winner's.
    async fn arm_idle_check(&self, uuid: &Uuid, fire_at: DateTime<Utc>) -> LazyboxResult<Schedule> {
        let name = self.schedule_name(uuid);
        let patch = SchedulePatch::rearm(fire_at);

        match self.scheduler.update(&name, &patch).await {
            Ok(schedule) => return Ok(schedule),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let spec = ScheduleSpec {
            name,
            fire_at,
            payload: IdleCheckPayload {
                service_uuid: *uuid,
            }
            .to_value()?,
        };

        match self.scheduler.create(&spec).await {
            Ok(schedule) => Ok(schedule),
            Err(e) if e.is_conflict() => self.scheduler.update(&spec.name, &patch).await,
            Err(e) => Err(e),
        }
    }

    fn service_name(&self, uuid: &Uuid) -> String {
        format!("{}-{uuid}", self.name_prefix)
    }

    fn schedule_name(&self, uuid: &Uuid) -> String {
        scheduler::idle_check_schedule_name(&self.name_prefix, uuid)
    }

    fn service_tags(&self, record: &SandboxRecord) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("company_prefix".to_string(), self.name_prefix.clone()),
            ("pr".to_string(), record.pr.to_string()),
            ("repository".to_string(), record.repository.clone()),
            ("user".to_string(), record.user.clone()),
            (
                "created_by_user_id".to_string(),
                record.created_by_user_id.to_string(),
            ),
            ("service_uuid".to_string(), record.uuid.to_string()),
        ])
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::{
        backend::{MemoryComputeBackend, MemoryServiceRegistry},
        scheduler::{MemoryScheduler, ScheduleState},
        store::{ActivityEvent, MemoryActivityLog, MemorySandboxStore},
    };

    use super::*;

    struct Harness {
        store: Arc<MemorySandboxStore>,
        activity: Arc<MemoryActivityLog>,
        registry: Arc<MemoryServiceRegistry>,
        compute: Arc<MemoryComputeBackend>,
        scheduler: Arc<MemoryScheduler>,
        controller: LifecycleController,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemorySandboxStore::new());
        let activity = Arc::new(MemoryActivityLog::new());
        let registry = Arc::new(MemoryServiceRegistry::new());
        let compute = Arc::new(MemoryComputeBackend::new());
        let scheduler = Arc::new(MemoryScheduler::new());

        let controller = LifecycleController::builder()
            .store(store.clone())
            .activity(activity.clone())
            .registry(registry.clone())
            .compute(compute.clone())
            .scheduler(scheduler.clone())
            .base_domain("example.com")
            .registry_tag("gh")
            .name_prefix("lazybox")
            .idle_window(Duration::minutes(10))
            .container(
                ContainerSpec::builder()
                    .image("nginxdemos/hello")
                    .cpu(256)
                    .memory_mib(512)
                    .container_port(80)
                    .build(),
            )
            .build();

        Harness {
            store,
            activity,
            registry,
            compute,
            scheduler,
            controller,
        }
    }

    fn input() -> ProvisionInput {
        ProvisionInput::builder()
            .repository("demo")
            .user("alice")
            .pr(123)
            .created_by_user_id(42)
            .build()
    }

    #[test_log::test(tokio::test)]
    async fn test_provision_fills_every_reference() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();

        let provisioned = h.controller.provision_at(&input(), now).await?;
        assert_eq!(provisioned.domain, "123-demo-alice.gh.example.com");

        let record = h.controller.sandbox(&provisioned.service_uuid).await?;
        assert_eq!(record.status, SandboxStatus::Starting);
        assert_eq!(record.desired_tasks, Some(1));
        assert_eq!(record.registry, "gh");
        assert!(record.template_ref.is_some());
        assert!(record.registry_ref.is_some());
        assert_eq!(record.next_shutdown_at, Some(now + Duration::minutes(10)));

        let service_ref = record.service_ref.unwrap();
        let service = h.compute.service(&service_ref).await.unwrap();
        assert_eq!(service.desired_count, 1);
        assert_eq!(
            service.request.tags["service_uuid"],
            provisioned.service_uuid.to_string()
        );
        assert_eq!(service.request.tags["pr"], "123");
        assert!(h
            .registry
            .entry("123-demo-alice.gh.example.com")
            .await
            .is_some());

        let schedule = h
            .scheduler
            .get(&format!("lazybox-{}", provisioned.service_uuid))
            .await?
            .unwrap();
        assert_eq!(Some(schedule.reference), record.schedule_ref);
        assert_eq!(schedule.state, ScheduleState::Enabled);
        assert_eq!(schedule.fire_at, now + Duration::minutes(10));
        assert_eq!(
            IdleCheckPayload::from_value(&schedule.payload)?.service_uuid,
            provisioned.service_uuid
        );

        // The activity stream is open.
        h.activity
            .append(
                &provisioned.service_uuid,
                &ActivityEvent::request(&provisioned.domain, now),
            )
            .await?;

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_provision_is_idempotent_on_domain() -> LazyboxResult<()> {
        let h = harness();
        let first = h.controller.provision(&input()).await?;
        let second = h.controller.provision(&input()).await?;

        assert_eq!(first, second);
        assert_eq!(h.compute.service_count().await, 1);
        assert_eq!(h.store.list().await?.len(), 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_mixed_case_sandbox_is_found_by_lowercase_host() -> LazyboxResult<()> {
        let h = harness();
        let mut mixed = input();
        mixed.repository = "MyRepo".to_string();
        mixed.user = "Alice".to_string();

        let provisioned = h.controller.provision(&mixed).await?;
        assert_eq!(provisioned.domain, "123-myrepo-alice.gh.example.com");

        let found = h.store.find_by_domain("123-myrepo-alice.gh.example.com").await?;
        assert_eq!(found.map(|record| record.uuid), Some(provisioned.service_uuid));
        assert!(h
            .registry
            .entry("123-myrepo-alice.gh.example.com")
            .await
            .is_some());

        // The record keeps the names as given.
        let record = h.controller.sandbox(&provisioned.service_uuid).await?;
        assert_eq!(record.repository, "MyRepo");
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_provision_rejects_invalid_names_without_side_effects() -> LazyboxResult<()> {
        let h = harness();
        let mut bad = input();
        bad.repository = "demo.app".to_string();

        let result = h.controller.provision(&bad).await;
        assert!(matches!(result, Err(LazyboxError::Validation(_))));
        assert!(h.store.list().await?.is_empty());
        assert_eq!(h.compute.template_count().await, 0);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_idle_check_without_activity_goes_idle() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let provisioned = h.controller.provision_at(&input(), now).await?;
        let uuid = provisioned.service_uuid;

        let later = now + Duration::minutes(10);
        let outcome = h.controller.idle_check_at(&uuid, false, later).await?;
        assert_eq!(outcome, IdleCheckOutcome::WentIdle);

        let record = h.controller.sandbox(&uuid).await?;
        assert_eq!(record.status, SandboxStatus::Stopped);
        assert_eq!(record.desired_tasks, Some(0));
        assert_eq!(record.next_shutdown_at, None);

        let service = h
            .compute
            .service(record.service_ref.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(service.desired_count, 0);

        let schedule = h.scheduler.get(&format!("lazybox-{uuid}")).await?.unwrap();
        assert_eq!(schedule.state, ScheduleState::Disabled);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_idle_check_with_activity_reschedules() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let provisioned = h.controller.provision_at(&input(), now).await?;
        let uuid = provisioned.service_uuid;

        h.store
            .update(&uuid, &SandboxUpdate::new(now).status(SandboxStatus::Running))
            .await?;

        let check_at = now + Duration::minutes(10);
        h.activity
            .append(
                &uuid,
                &ActivityEvent::request(&provisioned.domain, check_at - Duration::minutes(3)),
            )
            .await?;

        let outcome = h.controller.idle_check_at(&uuid, false, check_at).await?;
        let next_check_at = check_at + Duration::minutes(10);
        assert_eq!(outcome, IdleCheckOutcome::StillInUse { next_check_at });

        let record = h.controller.sandbox(&uuid).await?;
        assert_eq!(record.status, SandboxStatus::Running);
        assert_eq!(record.desired_tasks, Some(1));
        assert_eq!(record.next_shutdown_at, Some(next_check_at));

        let schedule = h.scheduler.get(&format!("lazybox-{uuid}")).await?.unwrap();
        assert_eq!(schedule.fire_at, next_check_at);
        assert_eq!(schedule.state, ScheduleState::Enabled);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_forced_idle_check_ignores_activity() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let provisioned = h.controller.provision_at(&input(), now).await?;
        let uuid = provisioned.service_uuid;

        h.activity
            .append(&uuid, &ActivityEvent::request(&provisioned.domain, now))
            .await?;

        let outcome = h.controller.idle_check_at(&uuid, true, now).await?;
        assert_eq!(outcome, IdleCheckOutcome::WentIdle);
        assert_eq!(
            h.controller.sandbox(&uuid).await?.status,
            SandboxStatus::Stopped
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_start_or_restart_wakes_stopped_sandbox() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let uuid = h.controller.provision_at(&input(), now).await?.service_uuid;
        h.controller.idle_check_at(&uuid, true, now).await?;

        let later = now + Duration::hours(1);
        let fire_at = h.controller.start_or_restart_at(&uuid, later).await?;
        assert_eq!(fire_at, later + Duration::minutes(10));

        let record = h.controller.sandbox(&uuid).await?;
        assert_eq!(record.status, SandboxStatus::Starting);
        assert_eq!(record.desired_tasks, Some(1));
        assert_eq!(record.next_shutdown_at, Some(fire_at));

        let schedule = h.scheduler.get(&format!("lazybox-{uuid}")).await?.unwrap();
        assert_eq!(schedule.state, ScheduleState::Enabled);
        assert_eq!(schedule.fire_at, fire_at);
        assert_eq!(h.scheduler.all().await.len(), 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_start_or_restart_unknown_sandbox() {
        let h = harness();
        let result = h.controller.start_or_restart(&Uuid::new_v4()).await;
        assert!(matches!(result, Err(LazyboxError::SandboxNotFound(_))));

        let result = h.controller.idle_check(&Uuid::new_v4(), false).await;
        assert!(matches!(result, Err(LazyboxError::SandboxNotFound(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_start_or_restart_provisions_missing_compute() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let record = SandboxRecord::pending(
            Uuid::new_v4(),
            42,
            9,
            "demo",
            "bob",
            "9-demo-bob.gh.example.com",
            "gh",
            now,
        );
        h.store.insert(&record).await?;

        h.controller.start_or_restart_at(&record.uuid, now).await?;

        let record = h.controller.sandbox(&record.uuid).await?;
        assert!(record.service_ref.is_some());
        assert_eq!(record.status, SandboxStatus::Starting);
        assert_eq!(h.compute.service_count().await, 1);
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_retry_idle_check_rearms_fired_schedule() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let uuid = h.controller.provision_at(&input(), now).await?.service_uuid;

        let due = now + Duration::minutes(10);
        assert_eq!(h.scheduler.take_due(due).await?.len(), 1);
        assert!(h.scheduler.take_due(due + Duration::hours(5)).await?.is_empty());

        let fire_at = h.controller.retry_idle_check_at(&uuid, due).await?;
        assert_eq!(fire_at, due + Duration::minutes(1));
        assert_eq!(
            h.controller.sandbox(&uuid).await?.next_shutdown_at,
            Some(fire_at)
        );

        let fired = h.scheduler.take_due(fire_at).await?;
        assert_eq!(fired.len(), 1);
        assert_eq!(
            IdleCheckPayload::from_value(&fired[0].payload)?.service_uuid,
            uuid
        );
        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_concurrent_starts_leave_one_schedule() -> LazyboxResult<()> {
        let h = harness();
        let now = Utc::now();
        let uuid = h.controller.provision_at(&input(), now).await?.service_uuid;
        h.controller.idle_check_at(&uuid, true, now).await?;

        let (a, b) = tokio::join!(
            h.controller.start_or_restart(&uuid),
            h.controller.start_or_restart(&uuid)
        );
        a?;
        b?;

        let record = h.controller.sandbox(&uuid).await?;
        assert_eq!(record.desired_tasks, Some(1));
        let service = h
            .compute
            .service(record.service_ref.as_deref().unwrap())
            .await
            .unwrap();
        assert_eq!(service.desired_count, 1);
        assert_eq!(h.compute.service_count().await, 1);

        let schedules = h.scheduler.all().await;
        assert_eq!(schedules.len(), 1);
        assert_eq!(schedules[0].state, ScheduleState::Enabled);
        Ok(())
    }
}
