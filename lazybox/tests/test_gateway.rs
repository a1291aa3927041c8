use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    body::{self, Body, Bytes},
    extract::Request,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use lazybox::{
    backend::{ContainerSpec, MemoryComputeBackend, MemoryServiceRegistry},
    gateway::Gateway,
    lifecycle::{CommandSender, LifecycleController, LifecycleWorker, ProvisionInput},
    models::{Endpoint, SandboxStatus},
    scheduler::MemoryScheduler,
    store::{MemoryActivityLog, MemorySandboxStore},
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const HOST: &str = "42-web-alice.gh.example.com";

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[test_log::test(tokio::test)]
async fn test_gateway_forwards_every_supported_method() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.go_live().await?;

    for method in [
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::PATCH,
    ] {
        let response = env
            .gateway()
            .route(request(method.clone(), "/echo?page=2", "hello"))
            .await;
        assert_eq!(response.status(), StatusCode::OK, "{method}");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let echoed: Value = serde_json::from_slice(&read_body(response).await?)?;
        assert_eq!(echoed["method"], method.as_str());
        assert_eq!(echoed["uri"], "/echo?page=2");
        assert_eq!(echoed["body"], "hello");
        assert_eq!(echoed["host"], HOST);
    }

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_gateway_passes_backend_status_and_content_type() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.go_live().await?;

    let response = env.gateway().route(request(Method::GET, "/teapot", "")).await;
    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(read_body(response).await?, "short and stout");

    // No content type from the backend falls back to JSON.
    let response = env.gateway().route(request(Method::GET, "/untyped", "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(read_body(response).await?, "{}");

    // Redirects are handed to the caller, not followed.
    let response = env.gateway().route(request(Method::GET, "/moved", "")).await;
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(response.headers()[header::LOCATION], "/echo");

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_gateway_hides_forwarding_failures() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    // Nothing listens on a port freed right after binding it.
    let closed = TcpListener::bind("127.0.0.1:0").await?.local_addr()?;
    env.registry
        .set_endpoint(HOST, Endpoint::new(closed.ip().to_string(), Some(closed.port())))
        .await;

    let response = env.gateway().route(request(Method::GET, "/", "")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

    let error: Value = serde_json::from_slice(&read_body(response).await?)?;
    assert_eq!(error["code"], 500);
    assert_eq!(error["message"], "internal server error");
    assert_eq!(error["error_type"], "internal_error");
    assert!(error.get("details").is_none());

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_gateway_records_activity_and_promotes_to_running() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.go_live().await?;
    assert_eq!(
        env.controller.sandbox(&env.uuid).await?.status,
        SandboxStatus::Starting
    );

    let response = env.gateway().route(request(Method::GET, "/", "")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let events = env.activity.events(&env.uuid).await;
    assert_eq!(events.len(), 1);
    assert!(events[0].message.ends_with(HOST));
    assert_eq!(
        env.controller.sandbox(&env.uuid).await?.status,
        SandboxStatus::Running
    );

    // The recorded request keeps the sandbox awake.
    let outcome = env.controller.idle_check(&env.uuid, false).await?;
    assert!(matches!(
        outcome,
        lazybox::lifecycle::IdleCheckOutcome::StillInUse { .. }
    ));

    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_gateway_wakes_stopped_sandbox() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.controller.idle_check(&env.uuid, true).await?;
    let record = env.controller.sandbox(&env.uuid).await?;
    assert_eq!(record.status, SandboxStatus::Stopped);
    let service_ref = record.service_ref.expect("service ref");

    let (worker, commands) = LifecycleWorker::new(env.controller.clone(), 8);
    let worker = tokio::spawn(worker.run());
    let gateway = env.gateway_with(commands);

    let response = gateway.route(request(Method::GET, "/", "")).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://sb.example.com/starting/gh/42-web-alice"
    );

    // The redirect does not wait for the start, so poll for it.
    let mut status = SandboxStatus::Stopped;
    for _ in 0..100 {
        status = env.controller.sandbox(&env.uuid).await?.status;
        if status == SandboxStatus::Starting {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(status, SandboxStatus::Starting);
    assert_eq!(
        env.compute
            .service(&service_ref)
            .await
            .expect("service")
            .desired_count,
        1
    );

    drop(gateway);
    drop(env);
    worker.await?;
    Ok(())
}

#[test_log::test(tokio::test)]
async fn test_gateway_router_routes_by_host_header() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;
    env.go_live().await?;

    let (addr, _server) = spawn(env.gateway().into_router()).await?;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("http://{addr}/echo"))
        .header(header::HOST, HOST)
        .body("over the wire")
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let echoed: Value = response.json().await?;
    assert_eq!(echoed["body"], "over the wire");

    let response = client
        .get(format!("http://{addr}/"))
        .header(header::HOST, "42-web-alice.gh.other.org")
        .send()
        .await?;
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let error: Value = response.json().await?;
    assert_eq!(error["error_type"], "not_found");

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Types: Helpers
//--------------------------------------------------------------------------------------------------

struct TestEnv {
    uuid: Uuid,
    store: Arc<MemorySandboxStore>,
    activity: Arc<MemoryActivityLog>,
    registry: Arc<MemoryServiceRegistry>,
    compute: Arc<MemoryComputeBackend>,
    controller: Arc<LifecycleController>,
    commands: CommandSender,
    _commands_rx: tokio::sync::mpsc::Receiver<lazybox::lifecycle::LifecycleCommand>,
}

impl TestEnv {
    async fn new() -> anyhow::Result<Self> {
        let store = Arc::new(MemorySandboxStore::new());
        let activity = Arc::new(MemoryActivityLog::new());
        let registry = Arc::new(MemoryServiceRegistry::new());
        let compute = Arc::new(MemoryComputeBackend::new());

        let controller = Arc::new(
            LifecycleController::builder()
                .store(store.clone())
                .activity(activity.clone())
                .registry(registry.clone())
                .compute(compute.clone())
                .scheduler(Arc::new(MemoryScheduler::new()))
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

        let provisioned = controller
            .provision(
                &ProvisionInput::builder()
                    .repository("web")
                    .user("alice")
                    .pr(42)
                    .created_by_user_id(7)
                    .build(),
            )
            .await?;
        assert_eq!(provisioned.domain, HOST);

        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let commands = CommandSender::from(tx);

        Ok(Self {
            uuid: provisioned.service_uuid,
            store,
            activity,
            registry,
            compute,
            controller,
            commands,
            _commands_rx: rx,
        })
    }

    /// A gateway whose commands go nowhere.
    fn gateway(&self) -> Gateway {
        self.gateway_with(self.commands.clone())
    }

    fn gateway_with(&self, commands: CommandSender) -> Gateway {
        Gateway::builder()
            .store(self.store.clone())
            .activity(self.activity.clone())
            .registry(self.registry.clone())
            .commands(commands)
            .client(
                reqwest::Client::builder()
                    .redirect(reqwest::redirect::Policy::none())
                    .build()
                    .expect("client"),
            )
            .base_domain("example.com")
            .starting_page_origin(Some("https://sb.example.com".to_string()))
            .build()
    }

    /// Starts a backend for the sandbox and registers its endpoint.
    async fn go_live(&self) -> anyhow::Result<()> {
        let (addr, _) = spawn(backend()).await?;
        self.registry
            .set_endpoint(HOST, Endpoint::new(addr.ip().to_string(), Some(addr.port())))
            .await;
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

fn backend() -> Router {
    Router::new()
        .route("/teapot", any(|| async { (StatusCode::IM_A_TEAPOT, "short and stout") }))
        .route(
            "/untyped",
            any(|| async { Response::new(Body::from("{}")) }),
        )
        .route(
            "/moved",
            any(|| async {
                (
                    StatusCode::TEMPORARY_REDIRECT,
                    [(header::LOCATION, "/echo")],
                )
                    .into_response()
            }),
        )
        .fallback(echo)
}

async fn echo(method: Method, uri: Uri, request: Request) -> Json<Value> {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = body::to_bytes(request.into_body(), usize::MAX)
        .await
        .unwrap_or_default();

    Json(json!({
        "method": method.as_str(),
        "uri": uri.to_string(),
        "host": host,
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn spawn(router: Router) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, router).into_future().await;
    });
    Ok((addr, handle))
}

fn request(method: Method, uri: &str, body: &'static str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, HOST)
        .body(Body::from(body))
        .expect("request")
}

async fn read_body(response: Response) -> anyhow::Result<Bytes> {
    Ok(body::to_bytes(response.into_body(), usize::MAX).await?)
}
