//! JSON-over-HTTP front end for the operations in [`ops`](crate::ops).

use std::sync::{Arc, Mutex};

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use log::{error, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

use crate::error::Error;
use crate::model::{CreateTodo, TodoFilter, TodoResponse, UpdateTodo};
use crate::ops;
use crate::store::SqliteStore;

pub type SharedStore = Arc<Mutex<SqliteStore>>;

/// Error body returned for every failed request, including bodies and query
/// strings the extractors reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip)]
    status: u16,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            status: status.as_u16(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_FAILURE", message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument(msg) => Self::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", msg),
            Error::NotFound(_) => Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
            Error::Storage(e) => {
                error!("storage failure: {e}");
                Self::internal("storage failure")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::new(rejection.status(), "INVALID_ARGUMENT", rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::new(rejection.status(), "INVALID_ARGUMENT", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Run one operation on the blocking pool with the store locked, so a busy
/// database never stalls a runtime worker.
async fn with_store<T, F>(store: &SharedStore, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> crate::error::Result<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || {
        let guard = store.lock().map_err(|_| {
            error!("store mutex poisoned");
            ApiError::internal("storage failure")
        })?;
        op(&guard).map_err(ApiError::from)
    })
    .await
    .map_err(|e| {
        error!("store task failed: {e}");
        ApiError::internal("storage failure")
    })?
}

pub fn app(store: SqliteStore) -> Router {
    router(Arc::new(Mutex::new(store)))
}

pub fn router(state: SharedStore) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    Router::new()
        .route("/health", get(health))
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/count", get(count_todos))
        .route(
            "/todos/{id}",
            get(get_todo).patch(update_todo).delete(delete_todo),
        )
        .route("/todos/{id}/toggle", post(toggle_todo))
        .layer(cors)
        .with_state(state)
}

pub async fn run(listener: TcpListener, store: SqliteStore) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on http://{addr}");
    }
    axum::serve(listener, app(store)).await
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_todos(
    State(store): State<SharedStore>,
    query: Result<Query<TodoFilter>, QueryRejection>,
) -> Result<Json<Vec<TodoResponse>>, ApiError> {
    let Query(filter) = query?;
    let todos = with_store(&store, move |s| ops::list(s, Some(&filter))).await?;
    Ok(Json(todos))
}

async fn count_todos(
    State(store): State<SharedStore>,
    query: Result<Query<TodoFilter>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(filter) = query?;
    let count = with_store(&store, move |s| ops::count(s, Some(&filter))).await?;
    Ok(Json(json!({ "count": count })))
}

async fn get_todo(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<TodoResponse>, ApiError> {
    Ok(Json(with_store(&store, move |s| ops::get(s, &id)).await?))
}

async fn create_todo(
    State(store): State<SharedStore>,
    payload: Result<Json<CreateTodo>, JsonRejection>,
) -> Result<(StatusCode, Json<TodoResponse>), ApiError> {
    let Json(input) = payload?;
    let todo = with_store(&store, move |s| ops::create(s, input)).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}

async fn update_todo(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTodo>, JsonRejection>,
) -> Result<Json<TodoResponse>, ApiError> {
    let Json(input) = payload?;
    Ok(Json(
        with_store(&store, move |s| ops::update(s, &id, &input)).await?,
    ))
}

async fn delete_todo(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = with_store(&store, move |s| ops::delete(s, &id)).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

async fn toggle_todo(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> Result<Json<TodoResponse>, ApiError> {
    Ok(Json(with_store(&store, move |s| ops::toggle(s, &id)).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use axum::http::Request;
    use std::time::{Duration, Instant};
    use tower::ServiceExt;

    #[test]
    fn error_kinds_map_to_statuses() {
        let bad = ApiError::from(Error::InvalidArgument("invalid todo id 'x'".into()));
        assert_eq!(bad.status, 400);
        assert_eq!(bad.code, "INVALID_ARGUMENT");
        assert_eq!(bad.message, "invalid todo id 'x'");

        let missing = ApiError::from(Error::NotFound("4".into()));
        assert_eq!(missing.status, 404);
        assert_eq!(missing.message, "todo '4' not found");

        let storage = ApiError::from(Error::Storage(StoreError::Backend(
            rusqlite::Error::InvalidQuery,
        )));
        assert_eq!(storage.status, 500);
        assert_eq!(storage.message, "storage failure");
    }

    #[test]
    fn status_is_not_serialized() {
        let err = ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", "gone");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json, json!({ "code": "NOT_FOUND", "message": "gone" }));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn locked_store_leaves_runtime_free() {
        let state: SharedStore = Arc::new(Mutex::new(SqliteStore::open_memory().unwrap()));
        let app = router(Arc::clone(&state));

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = {
            let state = Arc::clone(&state);
            std::thread::spawn(move || {
                let _guard = state.lock().unwrap();
                locked_tx.send(()).unwrap();
                std::thread::sleep(Duration::from_millis(400));
            })
        };
        locked_rx.recv().unwrap();

        let request = tokio::spawn(
            app.oneshot(Request::get("/todos").body(String::new()).unwrap()),
        );
        // The request task runs as soon as this one yields. If it blocked the
        // only runtime thread on the mutex, this sleep would overrun.
        let start = Instant::now();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(start.elapsed() < Duration::from_millis(300));
        assert!(!request.is_finished());

        let resp = request.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        holder.join().unwrap();
    }
}
