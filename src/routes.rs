use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::response::Html;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_with::skip_serializing_none;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AppError;
use crate::models::{
    AssetKind, DataUrlImage, DeleteAllResponse, DeleteResponse, GenerateMetrics, GenerateRequest, GenerateResponse,
    GenerationDetail, GenerationList, GenerationStatus, ListQuery, PreviewBody, PreviewQuery, ScreenshotRequest,
};
use crate::orchestrator::Orchestrator;
use crate::preview::html::escape_html;
use crate::preview::{PreviewRequest, PreviewService, RenderedPreview, SessionSnapshot};
use crate::store::{GenerationStore, ScreenshotFiles};

/// Room for a 5 MiB image once base64 and JSON framing are added.
pub const BODY_LIMIT: usize = 10 * 1024 * 1024;

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 100;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GenerationStore>,
    pub orchestrator: Arc<Orchestrator>,
    pub previews: Arc<PreviewService>,
    pub screenshots: Arc<ScreenshotFiles>,
}

pub fn router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/api/generate", post(generate))
        .route("/api/generations", get(list_generations).delete(delete_all_generations))
        .route("/api/generations/:id", get(get_generation).delete(delete_generation))
        .route("/api/generations/:id/screenshot", post(upload_screenshot))
        .route("/api/preview", post(render_preview))
        .route("/api/preview/:session_id", get(preview_session))
        .route("/preview/:id", get(preview_page))
        .nest_service("/vendor", ServeDir::new(&config.vendor_dir))
        .nest_service("/screenshots", ServeDir::new(&config.screenshot_dir))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::warn!("⚠️ Rejected request body: {}", rejection.body_text());
        AppError::BadRequest("Invalid JSON body".into())
    })
}

/// Unparsable ids cannot name a record, so they read as missing.
fn generation_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse().map_err(|_| AppError::NotFound("Generation not found".into()))
}

pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let request = json_body(payload)?;

    // Detached so a dropped connection cannot leave the record pending.
    let orchestrator = state.orchestrator.clone();
    let outcome = tokio::spawn(async move { orchestrator.generate(request).await })
        .await
        .map_err(|e| AppError::internal(format!("generation task failed: {e}")))??;

    let record = outcome.record;
    Ok(Json(GenerateResponse {
        id: record.id,
        metrics: GenerateMetrics {
            total_duration_ms: outcome.duration_ms,
            code_length: record.code.len(),
            css_length: record.css.as_ref().map_or(0, String::len),
        },
        code: record.code,
        css: record.css,
        status: record.status,
        attempts: outcome.attempts,
        template: outcome.template,
    }))
}

pub async fn list_generations(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<GenerationList>, AppError> {
    let limit = match query.limit.as_deref() {
        None => DEFAULT_LIST_LIMIT,
        Some(raw) => raw
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|limit| (1..=MAX_LIST_LIMIT).contains(limit))
            .ok_or_else(|| AppError::BadRequest("Limit must be between 1 and 100".into()))?,
    };

    let generations = state.store.list(limit).await?;
    let total = state.store.count().await?;
    tracing::info!("📋 Listed {} of {} generations", generations.len(), total);
    Ok(Json(GenerationList { generations, total }))
}

pub async fn delete_all_generations(State(state): State<AppState>) -> Result<Json<DeleteAllResponse>, AppError> {
    let deleted = state.store.delete_all().await?;

    let mut deleted_files = 0;
    let mut failed_files = 0;
    for url in deleted.iter().filter_map(|record| record.screenshot_url.as_deref()) {
        if state.screenshots.remove(url).await {
            deleted_files += 1;
        } else {
            failed_files += 1;
        }
    }

    tracing::info!("🗑️ Deleted {} generations ({} files, {} failed)", deleted.len(), deleted_files, failed_files);
    Ok(Json(DeleteAllResponse {
        success: true,
        message: "All generations deleted successfully".into(),
        deleted: deleted.len(),
        deleted_files,
        failed_files,
    }))
}

pub async fn get_generation(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<GenerationDetail>, AppError> {
    let id = generation_id(&id)?;
    state
        .store
        .fetch(id, true)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Generation not found".into()))
}

pub async fn delete_generation(
    Path(id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<DeleteResponse>, AppError> {
    let id = generation_id(&id)?;
    let detail = state
        .store
        .fetch(id, false)
        .await?
        .ok_or_else(|| AppError::NotFound("Generation not found".into()))?;

    // The file goes first; a failure there never blocks the record.
    if let Some(url) = detail.record.screenshot_url.as_deref() {
        state.screenshots.remove(url).await;
    }
    state.store.delete(id).await?;

    tracing::info!("🗑️ Deleted generation {}", id);
    Ok(Json(DeleteResponse {
        success: true,
        message: "Generation deleted successfully".into(),
        id,
    }))
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct ScreenshotResponse {
    pub success: bool,
    pub screenshot_url: String,
    pub asset_id: Uuid,
    pub size_kb: Option<usize>,
}

pub async fn upload_screenshot(
    Path(id): Path<String>,
    State(state): State<AppState>,
    payload: Result<Json<ScreenshotRequest>, JsonRejection>,
) -> Result<Json<ScreenshotResponse>, AppError> {
    let id = generation_id(&id)?;
    let body = json_body(payload)?;
    if state.store.fetch(id, false).await?.is_none() {
        return Err(AppError::NotFound("Generation not found".into()));
    }

    let image = DataUrlImage::parse(&body.image).map_err(|e| AppError::BadRequest(e.to_string()))?;
    if image.format != image::ImageFormat::Png {
        return Err(AppError::BadRequest("Screenshot must be a PNG image".into()));
    }

    let url = state.screenshots.save(id, &image.bytes).await.map_err(|e| AppError::Internal {
        message: "Failed to save screenshot".into(),
        details: Some(e.to_string()),
    })?;
    state.store.set_screenshot(id, &url).await?;
    let asset = state.store.add_asset(id, AssetKind::Screenshot, &url).await?;

    tracing::info!("📸 Saved screenshot for {} ({}KB)", id, image.size_kb());
    Ok(Json(ScreenshotResponse {
        success: true,
        screenshot_url: url,
        asset_id: asset.id,
        size_kb: Some(image.size_kb()),
    }))
}

#[skip_serializing_none]
#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub session_id: Option<String>,
    /// False when a newer render for the same session started first.
    pub applied: Option<bool>,
    pub preview: RenderedPreview,
}

pub async fn render_preview(
    State(state): State<AppState>,
    payload: Result<Json<PreviewBody>, JsonRejection>,
) -> Result<Json<PreviewResponse>, AppError> {
    let body = json_body(payload)?;
    let request = PreviewRequest {
        code: body.code,
        css: body.css,
    };

    let response = match body.session_id {
        Some(session_id) => {
            let (preview, applied) = state.previews.render_session(&session_id, &request, body.mode).await;
            PreviewResponse {
                session_id: Some(session_id),
                applied: Some(applied),
                preview,
            }
        }
        None => PreviewResponse {
            session_id: None,
            applied: None,
            preview: state.previews.render(&request, body.mode).await,
        },
    };
    Ok(Json(response))
}

pub async fn preview_session(
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, AppError> {
    state
        .previews
        .session(&session_id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Preview session not found".into()))
}

pub async fn preview_page(
    Path(id): Path<String>,
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Html<String>, AppError> {
    let id = generation_id(&id)?;
    let record = match state.store.fetch(id, false).await? {
        Some(detail) if detail.record.status == GenerationStatus::Completed => detail.record,
        _ => return Err(AppError::NotFound("Generation not found".into())),
    };

    let request = PreviewRequest {
        code: record.code,
        css: record.css,
    };
    let preview = state.previews.render(&request, query.mode).await;
    Ok(Html(host_page(&record.prompt, &preview)))
}

fn host_page(title: &str, preview: &RenderedPreview) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
            "<title>{title} · UI Forge</title>\n",
            "<style>html,body{{margin:0;height:100%;background:#0A0A0A;color:#FAFAFA;font-family:system-ui,sans-serif}}",
            "header{{display:flex;align-items:center;justify-content:space-between;padding:12px 20px;border-bottom:1px solid #262626}}",
            "nav a{{color:#A3A3A3;margin-left:16px;text-decoration:none}}",
            "main{{height:calc(100% - 57px)}}</style>\n",
            "</head>\n<body>\n",
            "<header><strong>{title}</strong><nav><a href=\"/\">Generator</a>",
            "<a href=\"?mode=isolated\">Isolated</a><a href=\"?mode=inline\">Inline</a></nav></header>\n",
            "<main class=\"w-full h-screen overflow-hidden\" data-strategy=\"{strategy}\">{body}</main>\n",
            "</body>\n</html>\n"
        ),
        title = escape_html(title),
        strategy = preview.strategy,
        body = preview.html,
    )
}
