//! Running the control API, the gateway and the background workers together.

use std::{future::IntoFuture, sync::Arc};

use tokio::net::TcpListener;

use crate::{
    config::LazyboxConfig,
    gateway::Gateway,
    lifecycle::LifecycleWorker,
    scheduler::ScheduleRunner,
    server::{self, ServerState},
    utils, LazyboxResult,
};

use super::Collaborators;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Serves the control API and the gateway until either fails or ctrl-c is received.
///
/// The lifecycle worker and the schedule runner run alongside on their own tasks.
pub async fn serve(config: &LazyboxConfig, collaborators: Collaborators) -> LazyboxResult<()> {
    let controller = Arc::new(collaborators.controller(config));
    let scheduler_config = config.get_scheduler();
    let timeouts = config.get_timeouts();
    let sandbox = config.get_sandbox();

    let (worker, commands) =
        LifecycleWorker::new(Arc::clone(&controller), *scheduler_config.get_command_queue_size());
    let runner = ScheduleRunner::new(
        Arc::clone(&collaborators.scheduler),
        commands.clone(),
        scheduler_config.poll_interval(),
    );

    let gateway = Gateway::builder()
        .store(Arc::clone(&collaborators.store))
        .activity(Arc::clone(&collaborators.activity))
        .registry(Arc::clone(&collaborators.registry))
        .commands(commands)
        .client(utils::build_forward_client(timeouts.forward_timeout())?)
        .base_domain(sandbox.get_base_domain())
        .starting_page_origin(sandbox.get_starting_page_origin().clone())
        .max_body_bytes(*timeouts.get_max_forward_body_bytes())
        .build();

    let control_router = server::create_router(ServerState::new(controller));
    let gateway_router = gateway.into_router();

    let control_listener = TcpListener::bind(config.get_server().get_control_addr()).await?;
    let gateway_listener = TcpListener::bind(config.get_server().get_gateway_addr()).await?;
    tracing::info!("control api listening on {}", control_listener.local_addr()?);
    tracing::info!("gateway listening on {}", gateway_listener.local_addr()?);

    let worker = tokio::spawn(worker.run());
    let runner = tokio::spawn(runner.run());

    let servers = futures::future::try_join(
        axum::serve(control_listener, control_router).into_future(),
        axum::serve(gateway_listener, gateway_router).into_future(),
    );

    let result = tokio::select! {
        result = servers => result.map(|_| ()),
        signal = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            signal
        }
    };

    runner.abort();
    worker.abort();

    Ok(result?)
}
