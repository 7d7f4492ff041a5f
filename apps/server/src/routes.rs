//! HTTP routes.
//!
//! Every handler that touches a user's workspace holds that user's lock for
//! the whole request, so runs and cleanup for one user never interleave.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use seoforge_core::catalog::{list_keywords, select_keywords};
use seoforge_core::pipeline::{AnalysisPipeline, BlogPipeline, SeoContentPipeline};
use seoforge_core::workspace::Area;
use seoforge_markdown::DOCX_CONTENT_TYPE;
use seoforge_shared::{Brief, SeoforgeError, UserId};

use crate::error::ApiError;
use crate::state::AppState;

type ApiResult<T> = std::result::Result<T, ApiError>;
type SharedState = State<Arc<AppState>>;

pub(crate) fn router(state: Arc<AppState>, allowed_origins: &[String]) -> Router {
    let cors = if allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "ok" }))
        .route("/run/analysis", post(run_analysis))
        .route("/keywords", get(get_keywords))
        .route("/keywords/save/{user_id}", post(save_keywords))
        .route("/run/seo/{user_id}", post(run_seo))
        .route("/generate-blog/{user_id}", post(generate_blog))
        .route("/download/{user_id}/{filename}", get(download))
        .route("/runs/{user_id}", get(list_runs))
        .route("/cleanup/{user_id}", delete(cleanup))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            },
        ))
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BriefBody {
    #[serde(alias = "institution_name")]
    institution_name: String,
    #[serde(alias = "domain_url")]
    domain_url: String,
}

impl BriefBody {
    fn into_brief(self) -> Brief {
        Brief {
            institution_name: self.institution_name.trim().to_string(),
            domain: self.domain_url.trim().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeywordsBody {
    keywords: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlogBody {
    outline: String,
    #[serde(default, alias = "institution_name")]
    institution_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KeywordsQuery {
    #[serde(rename = "userId", alias = "user_id")]
    user_id: Option<String>,
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| SeoforgeError::validation(format!("invalid request body: {}", e.body_text())).into())
}

fn parse_user(raw: &str) -> ApiResult<UserId> {
    Ok(UserId::parse(raw)?)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index() -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": "SEO Forge API",
    }))
}

/// Allocate a new user, fetch rankings and analyze them. A failed run removes
/// the new workspace again.
#[instrument(skip_all)]
async fn run_analysis(
    State(state): SharedState,
    payload: std::result::Result<Json<BriefBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let brief = body(payload)?.into_brief();
    if brief.institution_name.is_empty() {
        return Err(SeoforgeError::validation("institutionName is required").into());
    }
    if brief.domain.is_empty() {
        return Err(SeoforgeError::validation("domainUrl is required").into());
    }

    let user_id = UserId::generate();
    let _guard = state.locks.lock(&user_id).await;
    let ws = state.root.ensure(&user_id)?;
    info!(%user_id, domain = %brief.domain, "analysis requested");

    let result = AnalysisPipeline::new(state.deps.clone())
        .run(&ws, &brief)
        .await;

    let output = match result {
        Ok(output) => output,
        Err(e) => {
            if let Err(cleanup) = state.root.destroy(&user_id) {
                warn!(%user_id, error = %cleanup, "failed to remove workspace of failed analysis");
            }
            if let Err(purge) = state.ledger.purge_user(&user_id).await {
                warn!(%user_id, error = %purge, "failed to purge ledger of failed analysis");
            }
            return Err(e.into());
        }
    };

    Ok(Json(json!({
        "status": "success",
        "message": "Analysis completed successfully",
        "userId": user_id,
        "markdown": output.markdown,
        "documentFiles": output.documents,
    })))
}

#[instrument(skip_all)]
async fn get_keywords(
    State(state): SharedState,
    Query(query): Query<KeywordsQuery>,
) -> ApiResult<Json<Value>> {
    let raw = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| SeoforgeError::validation("userId is required"))?;
    let user_id = parse_user(&raw)?;

    let _guard = state.locks.lock(&user_id).await;
    let keywords = list_keywords(&state.root.open(&user_id))?;

    Ok(Json(json!({
        "status": "success",
        "keywords": keywords,
    })))
}

#[instrument(skip_all, fields(user_id = %raw_id))]
async fn save_keywords(
    State(state): SharedState,
    Path(raw_id): Path<String>,
    payload: std::result::Result<Json<KeywordsBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let user_id = parse_user(&raw_id)?;
    let KeywordsBody { keywords } = body(payload)?;

    let _guard = state.locks.lock(&user_id).await;
    let selection = select_keywords(&state.root.open(&user_id), &keywords)?;

    Ok(Json(json!({
        "status": "success",
        "selected": selection.len(),
    })))
}

#[instrument(skip_all, fields(user_id = %raw_id))]
async fn run_seo(
    State(state): SharedState,
    Path(raw_id): Path<String>,
    payload: std::result::Result<Json<BriefBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let user_id = parse_user(&raw_id)?;
    let brief = body(payload)?.into_brief();
    let brief = (!brief.institution_name.is_empty()).then_some(brief);

    let _guard = state.locks.lock(&user_id).await;
    let ws = state.root.open(&user_id);
    let output = SeoContentPipeline::new(state.deps.clone())
        .run(&ws, brief.as_ref())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "markdown": output.markdown,
        "documentFiles": output.documents,
    })))
}

#[instrument(skip_all, fields(user_id = %raw_id))]
async fn generate_blog(
    State(state): SharedState,
    Path(raw_id): Path<String>,
    payload: std::result::Result<Json<BlogBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let user_id = parse_user(&raw_id)?;
    let BlogBody {
        outline,
        institution_name,
    } = body(payload)?;
    if outline.trim().is_empty() {
        return Err(SeoforgeError::validation("outline must not be empty").into());
    }

    let _guard = state.locks.lock(&user_id).await;
    let ws = state.root.ensure(&user_id)?;
    let output = BlogPipeline::new(state.deps.clone(), state.search_augmented)
        .run(&ws, &outline, institution_name.as_deref())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Blog post generated successfully",
        "markdown": output.markdown.get("blog"),
        "documentFile": output.documents.get("blog"),
    })))
}

/// Only plain `.docx` file names inside `doc/` are served.
fn validate_document_name(name: &str) -> ApiResult<()> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\'])
        && !name.contains("..");
    if !plain || !name.ends_with(".docx") {
        return Err(SeoforgeError::validation(format!("invalid document name `{name}`")).into());
    }
    Ok(())
}

#[instrument(skip_all, fields(user_id = %raw_id, filename = %filename))]
async fn download(
    State(state): SharedState,
    Path((raw_id, filename)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let user_id = parse_user(&raw_id)?;
    validate_document_name(&filename)?;

    let _guard = state.locks.lock(&user_id).await;
    let path = state.root.open(&user_id).path(Area::Doc, &filename);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SeoforgeError::NotFound(format!("file not found: {filename}")).into());
        }
        Err(e) => return Err(SeoforgeError::io(&path, e).into()),
    };

    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[instrument(skip_all, fields(user_id = %raw_id))]
async fn list_runs(
    State(state): SharedState,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user_id = parse_user(&raw_id)?;
    let runs = state.ledger.runs_for_user(&user_id).await?;
    Ok(Json(json!({
        "status": "success",
        "runs": runs,
    })))
}

/// Remove the workspace and ledger history. Succeeds for unknown users.
#[instrument(skip_all, fields(user_id = %raw_id))]
async fn cleanup(
    State(state): SharedState,
    Path(raw_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let user_id = parse_user(&raw_id)?;

    let guard = state.locks.lock(&user_id).await;
    let removed = state.root.destroy(&user_id)?;
    let purged = state.ledger.purge_user(&user_id).await?;
    drop(guard);

    info!(removed, purged, "user data cleaned up");
    Ok(Json(json!({
        "status": "success",
        "message": "User data cleaned up successfully",
    })))
}
