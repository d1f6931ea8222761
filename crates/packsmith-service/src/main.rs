use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use packsmith_api::{PacksmithApi, PacksmithConfig, API_CONTRACT_VERSION};
use packsmith_core::PacksmithError;
use packsmith_provider::{PackQueryService, QueryResult, DEFAULT_AUTHORITY, DEFAULT_WORKERS, QUERY_TIMEOUT};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const SERVICE_CONTRACT_VERSION: &str = "service.v1";

#[derive(Clone)]
struct ServiceState {
    provider: Arc<PackQueryService>,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    category: &'static str,
    error: String,
}

#[derive(Debug, Clone, Serialize)]
struct HealthResponse {
    status: &'static str,
    authority: String,
}

#[derive(Debug, Clone, Serialize)]
struct RowsAffected {
    rows_affected: usize,
}

#[derive(Debug, Parser)]
#[command(name = "packsmith-service")]
#[command(about = "Read-only HTTP rendition of the sticker pack query interface")]
struct Args {
    #[arg(long, env = "PACKSMITH_DB")]
    db: Option<PathBuf>,
    #[arg(long, env = "PACKSMITH_FILES_DIR")]
    files_dir: Option<PathBuf>,
    #[arg(long, default_value = "127.0.0.1:4020")]
    bind: SocketAddr,
    #[arg(long, default_value = DEFAULT_AUTHORITY)]
    authority: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match self.category {
            "security" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

impl From<PacksmithError> for ServiceError {
    fn from(err: PacksmithError) -> Self {
        Self {
            service_contract_version: SERVICE_CONTRACT_VERSION,
            category: err.category(),
            error: err.to_string(),
        }
    }
}

fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

fn app(state: ServiceState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/metadata", get(metadata_all).fallback(read_only))
        .route("/metadata/:identifier", get(metadata_one).fallback(read_only))
        .route("/stickers/:identifier", get(stickers).fallback(read_only))
        .route("/stickers_asset/:identifier/*file_name", get(sticker_asset).fallback(read_only))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = PacksmithConfig::resolve(args.db, args.files_dir);
    PacksmithApi::new(config.clone()).migrate(false)?;
    let provider = PackQueryService::with_options(
        config.db_path.clone(),
        packsmith_core::AssetDir::new(config.files_dir.clone()),
        args.authority,
        DEFAULT_WORKERS,
        QUERY_TIMEOUT,
    )?;

    let state = ServiceState { provider: Arc::new(provider) };
    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, db = %config.db_path.display(), "packsmith service listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

async fn run_query(state: ServiceState, uri: String) -> Result<QueryResult, ServiceError> {
    tokio::task::spawn_blocking(move || state.provider.query(&uri)).await.map_err(|err| {
        ServiceError::from(PacksmithError::Internal(format!("query task failed: {err}")))
    })
}

async fn health(State(state): State<ServiceState>) -> Json<ServiceEnvelope<HealthResponse>> {
    Json(envelope(HealthResponse { status: "ok", authority: state.provider.authority().to_string() }))
}

async fn metadata_all(
    State(state): State<ServiceState>,
) -> Result<Json<ServiceEnvelope<QueryResult>>, ServiceError> {
    let result = run_query(state, "/metadata".to_string()).await?;
    Ok(Json(envelope(result)))
}

async fn metadata_one(
    State(state): State<ServiceState>,
    Path(identifier): Path<String>,
) -> Result<Json<ServiceEnvelope<QueryResult>>, ServiceError> {
    let result = run_query(state, format!("/metadata/{identifier}")).await?;
    Ok(Json(envelope(result)))
}

async fn stickers(
    State(state): State<ServiceState>,
    Path(identifier): Path<String>,
) -> Result<Json<ServiceEnvelope<QueryResult>>, ServiceError> {
    let result = run_query(state, format!("/stickers/{identifier}")).await?;
    Ok(Json(envelope(result)))
}

async fn sticker_asset(
    State(state): State<ServiceState>,
    Path((identifier, file_name)): Path<(String, String)>,
) -> Result<Response, ServiceError> {
    let uri = format!("/stickers_asset/{identifier}/{file_name}");
    let opened = tokio::task::spawn_blocking(move || -> Result<Option<(Vec<u8>, &'static str)>, PacksmithError> {
        let Some(mut handle) = state.provider.open_asset(&uri)? else {
            return Ok(None);
        };
        let mut bytes = Vec::new();
        handle.file.read_to_end(&mut bytes)?;
        Ok(Some((bytes, handle.mime_type)))
    })
    .await
    .map_err(|err| ServiceError::from(PacksmithError::Internal(format!("asset task failed: {err}"))))??;

    match opened {
        Some((bytes, mime_type)) => Ok(([(header::CONTENT_TYPE, mime_type)], bytes).into_response()),
        None => Err(PacksmithError::NotFound(format!("asset {file_name}")).into()),
    }
}

async fn read_only(State(state): State<ServiceState>, method: Method, uri: Uri) -> Json<RowsAffected> {
    let path = uri.path();
    let rows_affected = match method {
        Method::POST => {
            let _ = state.provider.insert(path);
            0
        }
        Method::DELETE => state.provider.delete(path),
        _ => state.provider.update(path),
    };
    Json(RowsAffected { rows_affected })
}
