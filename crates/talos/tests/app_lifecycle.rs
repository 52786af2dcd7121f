//! Assembly, dispatch and lifecycle of a complete application.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Method, Request, Response, StatusCode};
use talos::prelude::*;
use talos::tasks::JobInfo;
use talos_config::SchedulerConfig;
use talos_core::fixtures::{self, RecordingSupervisor, SupervisorCall, Trail};
use talos_pipeline::stages::CONTEXT_ID_HEADER;

fn get(path: &str) -> Request<Bytes> {
    Request::get(path).body(Bytes::new()).unwrap()
}

fn json_body(response: &Response<Bytes>) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap()
}

fn respond_with_order(ctx: &Context) -> OperationResult {
    let mut response = Response::new(Bytes::from_static(br#"{"id":42}"#));
    *response.status_mut() = StatusCode::CREATED;
    ctx.respond(response);
    Ok(())
}

fn shop() -> talos::AppBuilder {
    App::builder("shop", "1.0.0").service(
        Service::builder("orders", "/orders")
            .middleware(ContextIdMiddleware::new())
            .endpoint(
                Endpoint::builder("/")
                    .method(Method::POST)
                    .logic(|ctx| async move { respond_with_order(&ctx) }),
            )
            .endpoint(
                Endpoint::builder("/ping")
                    .method(Method::GET)
                    .with_logic(fixtures::succeed()),
            ),
    )
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_dispatch_returns_written_response() {
    let app = shop().build().unwrap();

    let request = Request::post("/orders/").body(Bytes::new()).unwrap();
    let response = app.dispatch(request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(json_body(&response)["id"], 42);
    assert!(response.headers().contains_key(CONTEXT_ID_HEADER));
}

#[tokio::test]
async fn test_dispatch_without_response_is_no_content() {
    let app = shop().build().unwrap();

    let response = app.dispatch(get("/orders/ping")).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.body().is_empty());
    assert!(response.headers().contains_key(CONTEXT_ID_HEADER));
}

#[tokio::test]
async fn test_dispatch_adopts_incoming_context_id() {
    let app = shop().build().unwrap();
    let id = uuid::Uuid::now_v7().to_string();

    let request = Request::get("/orders/ping")
        .header(CONTEXT_ID_HEADER, id.as_str())
        .body(Bytes::new())
        .unwrap();
    let response = app.dispatch(request).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[CONTEXT_ID_HEADER], id.as_str());
}

#[tokio::test]
async fn test_written_response_carries_incoming_context_id() {
    let app = shop().build().unwrap();
    let id = uuid::Uuid::now_v7().to_string();

    let request = Request::post("/orders/")
        .header(CONTEXT_ID_HEADER, id.as_str())
        .body(Bytes::new())
        .unwrap();
    let response = app.dispatch(request).await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()[CONTEXT_ID_HEADER], id.as_str());
}

#[tokio::test]
async fn test_watchdog_answers_routing_misses() {
    let app = shop().build().unwrap();

    let missing = app.dispatch(get("/invoices")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(&missing)["error"]["code"], "NOT_FOUND");

    let wrong_method = app.dispatch(get("/orders")).await;
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert!(json_body(&wrong_method)["context_id"].is_string());
}

#[tokio::test]
async fn test_routing_misses_reach_custom_supervisor() {
    let recorder = RecordingSupervisor::shared();
    let app = shop().supervisor(recorder.clone()).build().unwrap();

    app.dispatch(get("/invoices")).await;
    app.dispatch(get("/orders")).await;
    app.dispatch(get("/orders/ping")).await;

    assert_eq!(
        recorder.calls(),
        vec![SupervisorCall::RouteNotFound, SupervisorCall::MethodNotAllowed]
    );
}

#[tokio::test]
async fn test_endpoint_unavailable_in_environment() {
    let recorder = RecordingSupervisor::shared();
    let app = App::builder("shop", "1.0.0")
        .config(TalosConfig::production())
        .supervisor(recorder.clone())
        .service(
            Service::builder("debug", "/debug").endpoint(
                Endpoint::builder("/dump")
                    .method(Method::GET)
                    .available_in("development")
                    .with_logic(fixtures::succeed()),
            ),
        )
        .build()
        .unwrap();

    app.dispatch(get("/debug/dump")).await;

    assert_eq!(
        recorder.calls(),
        vec![SupervisorCall::Unavailable("GET /dump".to_string())]
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

fn lifecycle_app(trail: &Trail) -> App {
    let setup = trail.clone();
    let cleanup = trail.clone();

    App::builder("shop", "1.0.0")
        .provider(
            Provider::new("catalog cache")
                .setup(move |app| {
                    setup.push("setup catalog");
                    app.storage().write().insert("catalog", vec!["tea", "coffee"]);
                    Ok(())
                })
                .cleanup(move |_app| {
                    cleanup.push("cleanup catalog");
                    Ok(())
                }),
        )
        .service(
            Service::builder("orders", "/orders")
                .aux(Aux::builder("warm").when_up().with_logic(trail.logic("orders.warm")))
                .aux(Aux::builder("flush").when_down().with_logic(trail.logic("orders.flush")))
                .aux(Aux::builder("reindex").with_logic(trail.logic("orders.reindex"))),
        )
        .service(
            Service::builder("billing", "/billing")
                .aux(Aux::builder("connect").when_up().with_logic(trail.logic("billing.connect")))
                .aux(
                    Aux::builder("disconnect")
                        .when_down()
                        .with_logic(trail.logic("billing.disconnect")),
                ),
        )
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_start_and_shutdown_order() {
    let trail = Trail::new();
    let app = lifecycle_app(&trail);

    let started = app.start().await.unwrap();
    assert!(started.all_succeeded());
    assert_eq!(started.runs.len(), 2);
    assert_eq!(app.state(), AppState::Running);
    assert!(app.services().all(|service| service.loaded_at().is_some()));
    assert_eq!(
        app.storage().read().get::<Vec<&str>>("catalog").map(Vec::len),
        Some(2)
    );

    let stopped = app.shutdown().await.unwrap();
    assert!(stopped.all_succeeded());
    assert_eq!(app.state(), AppState::Stopped);

    assert_eq!(
        trail.entries(),
        vec![
            "setup catalog",
            "orders.warm",
            "billing.connect",
            "billing.disconnect",
            "orders.flush",
            "cleanup catalog",
        ]
    );
}

#[tokio::test]
async fn test_lifecycle_transitions_are_checked() {
    let app = lifecycle_app(&Trail::new());

    assert!(matches!(
        app.shutdown().await,
        Err(AppError::Lifecycle {
            state: AppState::Assembled,
            ..
        })
    ));

    app.start().await.unwrap();
    assert!(matches!(
        app.start().await,
        Err(AppError::Lifecycle {
            state: AppState::Running,
            ..
        })
    ));

    app.shutdown().await.unwrap();
    assert!(matches!(
        app.start().await,
        Err(AppError::Lifecycle {
            state: AppState::Stopped,
            ..
        })
    ));
}

#[tokio::test]
async fn test_failed_provider_cleans_up_earlier_ones() {
    let trail = Trail::new();
    let first = trail.clone();
    let warm = Trail::new();

    let app = App::builder("shop", "1.0.0")
        .provider(Provider::new("metrics sink").cleanup(move |_app| {
            first.push("cleanup metrics sink");
            Ok(())
        }))
        .provider(
            Provider::new("database pool")
                .setup(|_app| Err(anyhow::anyhow!("connection refused"))),
        )
        .service(
            Service::builder("orders", "/orders")
                .aux(Aux::builder("warm").when_up().with_logic(warm.logic("warm"))),
        )
        .build()
        .unwrap();

    let err = app.start().await.unwrap_err();

    assert!(matches!(err, AppError::Provider { ref provider, .. } if provider == "database pool"));
    assert_eq!(trail.entries(), vec!["cleanup metrics sink"]);
    assert!(warm.entries().is_empty());
    assert_eq!(app.state(), AppState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_startup_aux_timeout_is_reported() {
    let recorder = RecordingSupervisor::shared();
    let app = App::builder("shop", "1.0.0")
        .supervisor(recorder.clone())
        .service(
            Service::builder("search", "/search").aux(
                Aux::builder("load-index")
                    .when_up()
                    .deadline(Duration::from_millis(10))
                    .with_logic(fixtures::sleep_then_store(
                        Duration::from_millis(50),
                        "index",
                        "loaded",
                    )),
            ),
        )
        .build()
        .unwrap();

    let begin = tokio::time::Instant::now();
    let report = app.start().await.unwrap();

    assert_eq!(report.runs[0].outcome, Some(OutcomeKind::Timeout));
    assert!(!report.all_succeeded());
    let waited = begin.elapsed();
    assert!(waited >= Duration::from_millis(10));
    assert!(waited < Duration::from_millis(50));

    let calls = recorder.calls();
    assert!(matches!(calls.as_slice(), [SupervisorCall::TimedOut(_)]));
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_trigger_runs_aux_on_demand() {
    let trail = Trail::new();
    let app = lifecycle_app(&trail);

    let outcome = app.trigger("orders", "reindex").await.unwrap();

    assert_eq!(outcome, Some(OutcomeKind::Success));
    assert_eq!(trail.entries(), vec!["orders.reindex"]);
}

#[tokio::test]
async fn test_trigger_unknown_targets() {
    let app = lifecycle_app(&Trail::new());

    assert!(matches!(
        app.trigger("shipping", "reindex").await,
        Err(AppError::UnknownService(ref slug)) if slug == "shipping"
    ));
    assert!(matches!(
        app.trigger("orders", "vacuum").await,
        Err(AppError::UnknownAux { .. })
    ));
}

#[tokio::test]
async fn test_trigger_respects_service_availability() {
    let app = App::builder("shop", "1.0.0")
        .service(
            Service::builder("ledger", "/ledger")
                .available_in("production")
                .aux(Aux::builder("reconcile").with_logic(fixtures::succeed())),
        )
        .build()
        .unwrap();

    let outcome = app.trigger("ledger", "reconcile").await.unwrap();

    assert_eq!(outcome, Some(OutcomeKind::Unavailable));
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

fn count_run(runs: &AtomicUsize) -> OperationResult {
    runs.fetch_add(1, Ordering::SeqCst);
    Ok(())
}

fn scheduled_app(runs: &Arc<AtomicUsize>, scheduler: SchedulerConfig) -> App {
    let runs = Arc::clone(runs);
    let config = TalosConfig::builder().scheduler(scheduler).build();

    App::builder("shop", "1.0.0")
        .config(config)
        .service(
            Service::builder("carts", "/carts").aux(
                Aux::builder("expire")
                    .schedule("* * * * * *")
                    .logic(move |_ctx| {
                        let runs = Arc::clone(&runs);
                        async move { count_run(&runs) }
                    }),
            ),
        )
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_scheduled_aux_runs_until_shutdown() {
    let runs = Arc::new(AtomicUsize::new(0));
    let app = scheduled_app(
        &runs,
        SchedulerConfig {
            enabled: true,
            tick_interval_ms: 10,
        },
    );

    let report = app.start().await.unwrap();
    assert_eq!(report.scheduled_jobs, 1);
    assert!(app.scheduler().is_running());

    let deadline = Instant::now() + Duration::from_secs(5);
    while runs.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(runs.load(Ordering::SeqCst) >= 1);

    let jobs: Vec<JobInfo> = app.scheduler().list_jobs();
    assert_eq!(jobs[0].name, "carts.expire");

    app.shutdown().await.unwrap();
    assert!(!app.scheduler().is_running());
}

#[tokio::test]
async fn test_disabled_scheduler_registers_nothing() {
    let runs = Arc::new(AtomicUsize::new(0));
    let app = scheduled_app(
        &runs,
        SchedulerConfig {
            enabled: false,
            tick_interval_ms: 10,
        },
    );

    let report = app.start().await.unwrap();

    assert_eq!(report.scheduled_jobs, 0);
    assert_eq!(app.scheduler().job_count(), 0);
    assert!(!app.scheduler().is_running());

    app.trigger("carts", "expire").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_scheduler_failure_stops_application() {
    let runs = Arc::new(AtomicUsize::new(0));
    let trail = Trail::new();
    let cleanup = trail.clone();
    let config = TalosConfig::builder()
        .scheduler(SchedulerConfig {
            enabled: true,
            tick_interval_ms: 10,
        })
        .build();
    let counter = Arc::clone(&runs);

    let app = App::builder("shop", "1.0.0")
        .config(config)
        .provider(Provider::new("cache").cleanup(move |_app| {
            cleanup.push("cleanup cache");
            Ok(())
        }))
        .service(
            Service::builder("carts", "/carts").aux(
                Aux::builder("expire")
                    .schedule("0 0 * * * *")
                    .logic(move |_ctx| {
                        let runs = Arc::clone(&counter);
                        async move { count_run(&runs) }
                    }),
            ),
        )
        .build()
        .unwrap();

    app.scheduler().start().unwrap();
    let err = app.start().await.unwrap_err();

    assert!(matches!(err, AppError::Task(talos::tasks::TaskError::AlreadyRunning)));
    assert_eq!(app.state(), AppState::Stopped);
    assert_eq!(trail.entries(), vec!["cleanup cache"]);
    assert!(matches!(
        app.shutdown().await,
        Err(AppError::Lifecycle { state: AppState::Stopped, .. })
    ));

    app.scheduler().stop().await;
}
