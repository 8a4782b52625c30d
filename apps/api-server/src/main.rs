//! api-server — HTTP API for the todolist workspace.
//!
//! Serves the todo-item and activity-group CRUD endpoints on top of the
//! replicated database layer: writes run in transactions on the primary,
//! listing reads rotate across the secondaries.
//!
//! Run:
//! ```bash
//! # pretty logs (default); PORT optional
//! cargo run -p api-server
//!
//! # against a mysql replica set
//! DB_DRIVER=mysql \
//! DB_HOSTS="mysql://user:pw@primary/todo,mysql://user:pw@replica-a/todo" \
//!   cargo run -p api-server
//! ```
//!
//! Configuration: See `config.rs` for all environment variables.

mod config;
mod service;

use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use domain::{CreateActivity, CreateTodo, UpdateActivity, UpdateTodo};
use replica_db::{repository::ensure_schema, ReplicaDb};
use service::{ActivityService, ServiceError, TodoService};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone)]
struct AppState {
    todos: TodoService,
    activities: ActivityService,
}

#[tokio::main]
async fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match config::Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(&cfg);

    let db = match ReplicaDb::open(&cfg.db).await {
        Ok(db) => db,
        Err(e) => {
            eprintln!("Database error: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = db.ping().await {
        eprintln!("Database unreachable: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = ensure_schema(&db).await {
        eprintln!("Schema error: {}", e);
        std::process::exit(1);
    }

    let state = AppState {
        todos: TodoService::new(db.clone()),
        activities: ActivityService::new(db.clone()),
    };

    // Request ID header name
    let x_request_id = axum::http::HeaderName::from_static("x-request-id");

    let mut app = router(state)
        .layer(PropagateRequestIdLayer::new(x_request_id.clone()))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::new(x_request_id, MakeRequestUuid))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    // CORS - already validated in Config::from_env()
    let cors = if cfg.cors_allow_origin == HeaderValue::from_static("*") {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list([cfg.cors_allow_origin]))
            .allow_methods([
                axum::http::Method::GET,
                axum::http::Method::POST,
                axum::http::Method::PUT,
                axum::http::Method::DELETE,
                axum::http::Method::OPTIONS,
            ])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    };
    app = app.layer(cors);

    let addr: SocketAddr = ([0, 0, 0, 0], cfg.port).into();
    info!(%addr, "api-server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("bind port");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    match db.close_timeout(cfg.graceful_timeout).await {
        Ok(()) => info!("database closed"),
        Err(e) => warn!(error = %e, "database close failed"),
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/todo-items", get(list_todos).post(create_todo))
        .route(
            "/todo-items/:id",
            get(get_todo).put(update_todo).delete(delete_todo),
        )
        .route("/activity-groups", get(list_activities).post(create_activity))
        .route(
            "/activity-groups/:id",
            get(get_activity).put(update_activity).delete(delete_activity),
        )
        .with_state(state)
}

fn init_tracing(cfg: &config::Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        config::LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
        config::LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stdout),
                )
                .init();
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}

fn error_response(err: ServiceError) -> Response {
    let (code, status) = match &err {
        ServiceError::Validation(_) => {
            (StatusCode::BAD_REQUEST, http_common::MESSAGE_BAD_REQUEST)
        }
        ServiceError::NotFound { .. } => (StatusCode::NOT_FOUND, http_common::MESSAGE_NOT_FOUND),
        ServiceError::Db(e) => {
            tracing::error!(error = %e, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                http_common::MESSAGE_INTERNAL_SERVER_ERR,
            )
        }
    };
    (code, Json(http_common::error(status, err.to_string()))).into_response()
}

async fn create_todo(
    State(state): State<AppState>,
    Json(body): Json<CreateTodo>,
) -> Response {
    match state.todos.create(body).await {
        Ok(todo) => (StatusCode::CREATED, Json(http_common::success(todo))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn list_todos(State(state): State<AppState>) -> Response {
    match state.todos.get_all().await {
        Ok(todos) => Json(http_common::success(todos)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_todo(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.todos.get_one(id).await {
        Ok(todo) => Json(http_common::success(todo)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_todo(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateTodo>,
) -> Response {
    match state.todos.update(id, body).await {
        Ok(todo) => Json(http_common::success(todo)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_todo(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.todos.delete(id).await {
        Ok(()) => Json(http_common::success(serde_json::json!({}))).into_response(),
        Err(e) => error_response(e),
    }
}

async fn create_activity(
    State(state): State<AppState>,
    Json(body): Json<CreateActivity>,
) -> Response {
    match state.activities.create(body).await {
        Ok(activity) => {
            (StatusCode::CREATED, Json(http_common::success(activity))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn list_activities(State(state): State<AppState>) -> Response {
    match state.activities.get_all().await {
        Ok(activities) => Json(http_common::success(activities)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_activity(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.activities.get_one(id).await {
        Ok(activity) => Json(http_common::success(activity)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateActivity>,
) -> Response {
    match state.activities.update(id, body).await {
        Ok(activity) => Json(http_common::success(activity)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn delete_activity(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.activities.delete(id).await {
        Ok(()) => Json(http_common::success(serde_json::json!({}))).into_response(),
        Err(e) => error_response(e),
    }
}
