// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The JSON HTTP surface (spec.md §11), ported from `pkg/api/server.go`'s
//! `Server`: a per-pid reader cache behind a read/write lock, one handler
//! per public-facade operation, plus `/tools` for protocol-bridge
//! discovery that the original doesn't have.

mod state;

use std::net::SocketAddr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;

use spy_core::error::GospyError;
use spy_core::var::VarKind;
use state::AppState;

#[derive(Debug, Parser)]
#[clap(name = "gospy-http", about = "JSON HTTP surface for the gospy introspection engine")]
struct Cli {
    #[clap(long, default_value_t = 8080)]
    port: u16,
}

struct ApiError(GospyError);

impl From<GospyError> for ApiError {
    fn from(e: GospyError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GospyError::TaskNotFound(_) | GospyError::SymbolNotFound(_) => StatusCode::NOT_FOUND,
            GospyError::BinaryNotFound(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct PidQuery {
    pid: i32,
}

#[derive(Debug, Deserialize)]
struct TasksQuery {
    pid: i32,
    #[serde(default)]
    include_dead: bool,
}

async fn handle_runtime(
    State(state): State<AppState>,
    Query(q): Query<PidQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let proc = state.get_reader(q.pid)?;
    let facts = proc.runtime_info()?;
    Ok(Json(json!(facts)))
}

async fn handle_tasks(
    State(state): State<AppState>,
    Query(q): Query<TasksQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let proc = state.get_reader(q.pid)?;
    let tasks = proc.tasks(q.include_dead)?;
    Ok(Json(json!(tasks)))
}

async fn handle_task_stack(
    State(state): State<AppState>,
    Path(task_id): Path<u64>,
    Query(q): Query<PidQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let proc = state.get_reader(q.pid)?;
    let frames = proc.task_stack_trace(task_id)?;
    Ok(Json(json!(frames)))
}

async fn handle_processors(
    State(state): State<AppState>,
    Query(q): Query<PidQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let proc = state.get_reader(q.pid)?;
    let ps = proc.processors()?;
    Ok(Json(json!(ps)))
}

#[derive(Serialize)]
struct MemStatsResponse {
    #[serde(flatten)]
    stats: spy_core::memstats::MemStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_error: Option<String>,
}

async fn handle_memstats(
    State(state): State<AppState>,
    Query(q): Query<PidQuery>,
) -> Result<Json<MemStatsResponse>, ApiError> {
    let proc = state.get_reader(q.pid)?;
    let (stats, err) = proc.mem_stats();
    Ok(Json(MemStatsResponse {
        stats,
        partial_error: err.map(|e| e.to_string()),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum VarKindParam {
    Uint,
    Int,
    Bool,
    Str,
    Ptr,
}

impl From<VarKindParam> for VarKind {
    fn from(k: VarKindParam) -> Self {
        match k {
            VarKindParam::Uint => VarKind::Uint,
            VarKindParam::Int => VarKind::Int,
            VarKindParam::Bool => VarKind::Bool,
            VarKindParam::Str => VarKind::Str,
            VarKindParam::Ptr => VarKind::Ptr,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VarQuery {
    pid: i32,
    name: String,
    kind: VarKindParam,
    #[serde(default)]
    pointee_kind: Option<VarKindParam>,
}

/// Ad hoc symbol inspection, the HTTP counterpart of `spy-cli var`, exposed
/// alongside the five snapshot operations for the tool-protocol bridge.
async fn handle_var(
    State(state): State<AppState>,
    Query(q): Query<VarQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let proc = state.get_reader(q.pid)?;
    let value = proc.read_var(&q.name, q.kind.into(), q.pointee_kind.map(Into::into))?;
    Ok(Json(json!({ "value": format!("{value:?}") })))
}

/// Protocol-bridge discovery endpoint (spec.md §11's supplement over the
/// original, which has no equivalent): describes the five read
/// operations above so a generic tool-calling agent can invoke them
/// without this repo needing its own agent protocol.
async fn handle_tools() -> Json<serde_json::Value> {
    Json(json!([
        {
            "name": "runtime",
            "method": "GET",
            "path": "/runtime",
            "query": { "pid": "int, required" },
            "returns": "runtime version + init time",
        },
        {
            "name": "tasks",
            "method": "GET",
            "path": "/tasks",
            "query": { "pid": "int, required", "include_dead": "bool, default false" },
            "returns": "array of task records",
        },
        {
            "name": "task_stack",
            "method": "GET",
            "path": "/tasks/{id}/stack",
            "query": { "pid": "int, required" },
            "returns": "array of stack frames for one task",
        },
        {
            "name": "processors",
            "method": "GET",
            "path": "/processors",
            "query": { "pid": "int, required" },
            "returns": "array of processor records",
        },
        {
            "name": "memstats",
            "method": "GET",
            "path": "/memstats",
            "query": { "pid": "int, required" },
            "returns": "aggregate heap/GC stats, with an optional partial_error",
        },
        {
            "name": "var",
            "method": "GET",
            "path": "/var",
            "query": {
                "pid": "int, required",
                "name": "string, required, e.g. runtime.buildVersion",
                "kind": "uint|int|bool|str|ptr, required",
                "pointee_kind": "uint|int|bool|str|ptr, optional, only used when kind=ptr",
            },
            "returns": "ad hoc read of one named global",
        },
    ]))
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/runtime", get(handle_runtime))
        .route("/tasks", get(handle_tasks))
        .route("/tasks/:id/stack", get(handle_task_stack))
        .route("/processors", get(handle_processors))
        .route("/memstats", get(handle_memstats))
        .route("/var", get(handle_var))
        .route("/tools", get(handle_tools))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let state = AppState::new();
    let app = router(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("gospy-http listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
