//! PDF page image endpoints
//!
//! - Open a document and read its page count
//! - Render one page or every page to PNG files
//! - Close a document, deleting its files

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::document::{PageImage, PdfInfo};
use crate::error::PageImageError;
use crate::state::AppState;

/// Body naming a document
#[derive(Debug, Deserialize)]
pub struct DocumentRequest {
    pub uri: String,
}

/// Body for rendering one page
#[derive(Debug, Deserialize)]
pub struct RenderPageRequest {
    pub uri: String,
    /// Zero-based page index
    pub page: i64,
    /// Falls back to the configured default
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Body for rendering every page
#[derive(Debug, Deserialize)]
pub struct RenderAllRequest {
    pub uri: String,
    #[serde(default)]
    pub scale: Option<f64>,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

/// A service error on its way to the client
#[derive(Debug)]
pub struct ApiError(pub PageImageError);

impl From<PageImageError> for ApiError {
    fn from(err: PageImageError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            e if e.is_caller_error() => StatusCode::BAD_REQUEST,
            PageImageError::DocumentOpen(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}: {}", self.0.kind(), self.0);
        } else {
            tracing::debug!("Rejected request: {}", self.0);
        }

        let body = ErrorResponse {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/open", post(open_pdf))
        .route("/render", post(render_page))
        .route("/render-all", post(render_all_pages))
        .route("/close", post(close_document))
}

async fn open_pdf(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Result<Json<PdfInfo>, ApiError> {
    let info = state.service().open_pdf(&request.uri).await?;
    Ok(Json(info))
}

async fn render_page(
    State(state): State<AppState>,
    Json(request): Json<RenderPageRequest>,
) -> Result<Json<PageImage>, ApiError> {
    let image = state
        .service()
        .render_page(&request.uri, request.page, request.scale)
        .await?;
    Ok(Json(image))
}

async fn render_all_pages(
    State(state): State<AppState>,
    Json(request): Json<RenderAllRequest>,
) -> Result<Json<Vec<PageImage>>, ApiError> {
    let images = state
        .service()
        .render_all_pages(&request.uri, request.scale)
        .await?;
    Ok(Json(images))
}

async fn close_document(
    State(state): State<AppState>,
    Json(request): Json<DocumentRequest>,
) -> Json<serde_json::Value> {
    state.service().close_document(&request.uri).await;
    Json(serde_json::json!({}))
}
