use std::sync::Arc;

use axum::Router;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::model::{
    Credentials, MESSAGE_DUPLICATE, MESSAGE_STORED, NovelProgress, ProgressList, ProgressUpdate,
    StatusMessage, TtsRequest, UploadResponse,
};
use crate::app::novel_store::{NovelStore, PutOutcome};
use crate::app::source::{ContentSource, SourceResolver};
use crate::app::user_store::UserStore;
use crate::formats::{ChapterContent, ChapterPage};
use crate::ingest::{IngestOptions, ingest_epub};
use crate::tts::{SpeechSynthesizer, prepare_speech_text};

#[derive(Clone)]
pub struct AppState {
    pub novels: Arc<dyn NovelStore>,
    pub users: Arc<dyn UserStore>,
    pub sources: Arc<SourceResolver>,
    pub speech: Arc<dyn SpeechSynthesizer>,
}

/// Error body is always `{"detail": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, detail)
    }

    fn internal(context: &str, err: anyhow::Error) -> Self {
        tracing::error!(err = %format!("{err:#}"), "{context}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{context}: {err:#}"))
    }

    /// Remote sources fail upstream (502); local ones fail here (500).
    fn from_source(source: &dyn ContentSource, context: &str, err: anyhow::Error) -> Self {
        if source.is_remote() {
            tracing::warn!(err = %format!("{err:#}"), "{context}");
            Self::new(StatusCode::BAD_GATEWAY, format!("{context}: {err:#}"))
        } else {
            Self::internal(context, err)
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "detail": self.detail });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/upload-epub", post(upload_epub))
        .route("/novels", get(list_novels))
        .route("/chapters-with-pages/:novel", get(chapters_with_pages))
        .route("/chapter", get(chapter))
        .route("/novels/:novel/images/:image_id", get(image))
        .route("/tts", get(tts_get).post(tts_post))
        .route("/register", post(register))
        .route("/userLogin", post(login))
        .route("/user/progress", post(save_progress).get(all_progress))
        .route("/user/progress/:novel_name", get(novel_progress))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

async fn upload_epub(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadResponse>> {
    let mut multipart = multipart.map_err(|rej| ApiError::bad_request(rej.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::bad_request(err.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_owned();
        if !file_name.to_ascii_lowercase().ends_with(".epub") {
            return Err(ApiError::bad_request("File must be an EPUB file"));
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|err| ApiError::bad_request(err.body_text()))?;
        upload = Some((file_name, bytes));
        break;
    }
    let Some((file_name, bytes)) = upload else {
        return Err(ApiError::bad_request("multipart field `file` is required"));
    };
    tracing::info!(file_name, bytes = bytes.len(), "received epub upload");

    let ingested =
        tokio::task::spawn_blocking(move || ingest_epub(&bytes, &IngestOptions::default()))
            .await
            .map_err(|err| ApiError::internal("ingestion task failed", err.into()))?
            .map_err(|err| ApiError::bad_request(format!("Error processing EPUB file: {err}")))?;

    let outcome = state
        .novels
        .put_novel(&ingested)
        .await
        .map_err(|err| ApiError::internal("store novel", err))?;
    let response = match outcome {
        PutOutcome::Stored(novel) => UploadResponse::new(&novel, MESSAGE_STORED),
        PutOutcome::Existing(novel) => UploadResponse::new(&novel, MESSAGE_DUPLICATE),
    };
    Ok(Json(response))
}

async fn list_novels(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let names = state
        .sources
        .novel_names()
        .await
        .map_err(|err| ApiError::internal("list novels", err))?;
    Ok(Json(names))
}

#[derive(Debug, Deserialize)]
struct PageQuery {
    page: Option<i64>,
}

async fn chapters_with_pages(
    State(state): State<AppState>,
    Path(novel): Path<String>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<ChapterPage>> {
    let Query(query) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let page = query.page.unwrap_or(1);
    let page = u32::try_from(page)
        .ok()
        .filter(|p| *p >= 1)
        .ok_or_else(|| ApiError::bad_request("page must be >= 1"))?;

    let source = resolve_source(&state, &novel).await?;
    let listing = source
        .chapter_page(page)
        .await
        .map_err(|err| ApiError::from_source(source.as_ref(), "fetch chapters", err))?;
    Ok(Json(listing))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterQuery {
    chapter_number: u32,
    novel_name: String,
}

async fn chapter(
    State(state): State<AppState>,
    query: Result<Query<ChapterQuery>, QueryRejection>,
) -> ApiResult<Json<ChapterContent>> {
    let Query(query) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let source = resolve_source(&state, &query.novel_name).await?;
    let content = source
        .chapter(query.chapter_number)
        .await
        .map_err(|err| ApiError::from_source(source.as_ref(), "fetch chapter content", err))?
        .ok_or_else(|| {
            ApiError::not_found(format!("Chapter {} not found", query.chapter_number))
        })?;
    Ok(Json(content))
}

async fn resolve_source(state: &AppState, novel: &str) -> ApiResult<Box<dyn ContentSource>> {
    state
        .sources
        .resolve(novel)
        .await
        .map_err(|err| ApiError::internal("resolve novel", err))?
        .ok_or_else(|| ApiError::not_found(format!("Novel not found: {novel}")))
}

async fn image(
    State(state): State<AppState>,
    Path((novel, image_id)): Path<(String, String)>,
) -> ApiResult<Response> {
    let stored = state
        .novels
        .resolve(&novel)
        .await
        .map_err(|err| ApiError::internal("resolve novel", err))?
        .ok_or_else(|| ApiError::not_found(format!("Novel not found: {novel}")))?;
    let asset = state
        .novels
        .get_image(&stored.id, &image_id)
        .await
        .map_err(|err| ApiError::internal("read image", err))?
        .ok_or_else(|| ApiError::not_found(format!("Image not found: {image_id}")))?;
    let bytes = asset
        .decode_payload()
        .map_err(|err| ApiError::internal("decode image", err.into()))?;

    let content_type = HeaderValue::from_str(&asset.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let mut resp = Response::new(axum::body::Body::from(bytes));
    resp.headers_mut().insert(header::CONTENT_TYPE, content_type);
    resp.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );
    Ok(resp)
}

#[derive(Debug, Deserialize)]
struct TtsQuery {
    text: String,
    voice: Option<String>,
}

async fn tts_get(
    State(state): State<AppState>,
    query: Result<Query<TtsQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    synthesize(&state, &query.text, query.voice.as_deref()).await
}

async fn tts_post(
    State(state): State<AppState>,
    body: Result<Json<TtsRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(body) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    synthesize(&state, &body.text, body.voice.as_deref()).await
}

async fn synthesize(state: &AppState, text: &str, voice: Option<&str>) -> ApiResult<Response> {
    let text = prepare_speech_text(text);
    if text.is_empty() {
        return Err(ApiError::bad_request("text is required"));
    }
    let audio = state.speech.synthesize(&text, voice).await.map_err(|err| {
        tracing::warn!(err = %format!("{err:#}"), "speech synthesis failed");
        ApiError::new(
            StatusCode::BAD_GATEWAY,
            format!("Error generating speech: {err:#}"),
        )
    })?;

    let mut resp = Response::new(axum::body::Body::from(audio));
    resp.headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static("audio/mpeg"));
    resp.headers_mut().insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=speech.mp3"),
    );
    Ok(resp)
}

fn credentials(body: Result<Json<Credentials>, JsonRejection>) -> ApiResult<Credentials> {
    let Json(creds) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    if creds.username.trim().is_empty() || creds.password.is_empty() {
        return Err(ApiError::bad_request("username and password are required"));
    }
    Ok(creds)
}

async fn register(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Json<StatusMessage>> {
    let creds = credentials(body)?;
    let created = state
        .users
        .create_user(&creds.username, &creds.password)
        .await
        .map_err(|err| ApiError::internal("Registration failed", err))?;
    if !created {
        return Err(ApiError::bad_request("Username already exists"));
    }
    Ok(Json(StatusMessage::success("User registered successfully")))
}

async fn login(
    State(state): State<AppState>,
    body: Result<Json<Credentials>, JsonRejection>,
) -> ApiResult<Json<StatusMessage>> {
    let creds = credentials(body)?;
    let user = state
        .users
        .get_user(&creds.username)
        .await
        .map_err(|err| ApiError::internal("read user", err))?;
    match user {
        Some(user) if user.verify_password(&creds.password) => {
            Ok(Json(StatusMessage::success("Login successful")))
        }
        _ => Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "Invalid username or password",
        )),
    }
}

async fn save_progress(
    State(state): State<AppState>,
    body: Result<Json<ProgressUpdate>, JsonRejection>,
) -> ApiResult<Json<StatusMessage>> {
    let Json(update) = body.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let saved = state
        .users
        .save_progress(&update.username, &update.novel_name, update.last_chapter_read)
        .await
        .map_err(|err| ApiError::internal("Error saving progress", err))?;
    if !saved {
        return Err(ApiError::not_found("User not found"));
    }
    Ok(Json(StatusMessage::success("Progress saved")))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    username: String,
}

async fn all_progress(
    State(state): State<AppState>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult<Json<ProgressList>> {
    let Query(query) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let user = state
        .users
        .get_user(&query.username)
        .await
        .map_err(|err| ApiError::internal("read user", err))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ProgressList {
        progress: user.progress_list(),
    }))
}

async fn novel_progress(
    State(state): State<AppState>,
    Path(novel_name): Path<String>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> ApiResult<Json<NovelProgress>> {
    let Query(query) = query.map_err(|rej| ApiError::bad_request(rej.body_text()))?;
    let user = state
        .users
        .get_user(&query.username)
        .await
        .map_err(|err| ApiError::internal("read user", err))?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    let last_chapter_read = user.progress.get(&novel_name).copied().unwrap_or(1);
    Ok(Json(NovelProgress {
        novel_name,
        last_chapter_read,
    }))
}
