//! Purpose: Provide the HTTP/JSON document server backing `RemoteClient`.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based server exposing local collections under `/v1`.
//! Invariants: JSON envelopes match `api::RemoteClient`; error kinds remain stable.
//! Invariants: Loopback-only unless explicitly allowed.
//! Notes: Documents are schemaless here; product validation happens in clients.

use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;

use talabarteria::api::{Error, ErrorKind, LocalClient};
use talabarteria::core::collection::{Collection, Document};

pub const VERSION_HEADER: &str = "talabarteria-version";

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub data_dir: PathBuf,
    pub token: Option<String>,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

struct AppState {
    client: LocalClient,
    token: Option<String>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let state = Arc::new(AppState {
        client: LocalClient::new().with_data_dir(&config.data_dir),
        token: config.token,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/v1/collections/:collection/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/v1/collections/:collection/documents/:id",
            get(get_document)
                .put(replace_document)
                .delete(delete_document),
        )
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::StoreUnavailable)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(
        bind = %config.bind,
        data_dir = %config.data_dir.display(),
        "talabarteria server listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(server_failed)?;
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown requested");
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(server_failed)?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Internal)
                        .with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn server_failed(err: std::io::Error) -> Error {
    Error::new(ErrorKind::StoreUnavailable)
        .with_message("server failed")
        .with_source(err)
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    if config.max_body_bytes > usize::MAX as u64 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes exceeds platform limits")
            .with_hint("Use a smaller value that fits in memory."));
    }

    if matches!(config.token.as_deref(), Some(token) if token.trim().is_empty()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--token must not be empty")
            .with_hint("Omit --token to disable authentication."));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}

fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    let Some(token) = state.token.as_ref() else {
        return Ok(());
    };
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(Error::new(ErrorKind::Permission).with_message("missing bearer token"));
    };
    let value = value.to_str().unwrap_or_default();
    let expected = format!("Bearer {token}");
    if value != expected {
        return Err(Error::new(ErrorKind::Permission).with_message("invalid bearer token"));
    }
    Ok(())
}

fn open_collection(state: &AppState, name: &str) -> Result<Collection, Error> {
    state.client.clone().with_collection(name).collection()
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    data: Value,
}

impl WriteRequest {
    fn into_object(self) -> Result<Map<String, Value>, Error> {
        match self.data {
            Value::Object(map) => Ok(map),
            _ => Err(Error::new(ErrorKind::Usage).with_message("document data must be an object")),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(collection): AxumPath<String>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let result = open_collection(&state, &collection).and_then(|collection| collection.list());
    match result {
        Ok(documents) => {
            let documents = documents.iter().map(document_json).collect::<Vec<_>>();
            json_response(json!({ "documents": documents }))
        }
        Err(err) => error_response(err),
    }
}

async fn create_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(collection): AxumPath<String>,
    Json(payload): Json<WriteRequest>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let result = payload.into_object().and_then(|data| {
        let collection = open_collection(&state, &collection)?;
        let id = collection.insert(data.clone())?;
        Ok(Document { id, data })
    });
    match result {
        Ok(document) => {
            tracing::debug!(%collection, id = %document.id, "created document");
            json_response(json!({ "document": document_json(&document) }))
        }
        Err(err) => error_response(err),
    }
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((collection, id)): AxumPath<(String, String)>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let result = open_collection(&state, &collection).and_then(|collection| collection.get(&id));
    match result {
        Ok(document) => json_response(json!({ "document": document_json(&document) })),
        Err(err) => error_response(err),
    }
}

async fn replace_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((collection, id)): AxumPath<(String, String)>,
    Json(payload): Json<WriteRequest>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let result = payload.into_object().and_then(|data| {
        open_collection(&state, &collection)?.replace(&id, data)
    });
    match result {
        Ok(document) => json_response(json!({ "document": document_json(&document) })),
        Err(err) => error_response(err),
    }
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath((collection, id)): AxumPath<(String, String)>,
) -> Response {
    if let Err(err) = authorize(&headers, &state) {
        return error_response(err);
    }
    let result = open_collection(&state, &collection).and_then(|collection| collection.remove(&id));
    match result {
        Ok(removed) => {
            tracing::debug!(%collection, %id, removed, "deleted document");
            json_response(json!({ "ok": true }))
        }
        Err(err) => error_response(err),
    }
}

fn document_json(document: &Document) -> Value {
    json!({
        "id": document.id,
        "data": Value::Object(document.data.clone()),
    })
}

fn json_response(payload: Value) -> Response {
    let mut response = Json(payload).into_response();
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static("1"));
    response
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Usage | ErrorKind::Validation | ErrorKind::ImageRequired => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::Permission => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Corrupt | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(err: Error) -> Response {
    let status = status_for(err.kind());
    if status.is_server_error() {
        tracing::warn!(error = %err, "request failed");
    }
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            hint: err.hint().map(str::to_string),
            path: err.path().map(|path| path.display().to_string()),
            id: err.id().map(str::to_string),
        },
    };
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static("1"));
    response
}
