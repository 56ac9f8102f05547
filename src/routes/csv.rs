use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    error::AppError,
    models::{CsvAnalysis, DatasetSummary},
    routes::{chat::ReplyResponse, supplied, timestamp_millis, AppJson},
    services::csv_loader::fetch_csv,
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/csv/upload", post(upload_csv))
        .route("/csv/from-url", post(csv_from_url))
        .route("/csv/qa", post(csv_qa))
}

#[derive(Debug, Deserialize)]
pub struct FromUrlRequest {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QaRequest {
    question: Option<String>,
    summary: Option<serde_json::Value>,
}

async fn upload_csv(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Arc<CsvAnalysis>>, AppError> {
    let mut multipart = multipart?;
    let mut file: Option<Bytes> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            tracing::info!("Receiving CSV upload {:?}", field.file_name());
            file = Some(field.bytes().await?);
        }
    }

    let data = file.ok_or_else(|| AppError::Validation("Missing CSV file".to_string()))?;
    tracing::info!("CSV upload size: {}KB", data.len() / 1024);

    Ok(Json(analyze(&state, data).await?))
}

async fn csv_from_url(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<FromUrlRequest>,
) -> Result<Json<Arc<CsvAnalysis>>, AppError> {
    let url = supplied(request.url)
        .ok_or_else(|| AppError::Validation("Missing URL".to_string()))?;

    tracing::info!("Downloading CSV from URL (length {})", url.len());
    let download_start = std::time::Instant::now();
    let data = fetch_csv(&state.http, url.trim(), state.config.max_file_size).await?;
    tracing::info!(
        "CSV downloaded, size: {}KB, took: {:?}",
        data.len() / 1024,
        download_start.elapsed()
    );

    Ok(Json(analyze(&state, data).await?))
}

async fn csv_qa(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<QaRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let (Some(question), Some(summary)) = (
        supplied(request.question),
        request.summary.filter(|s| !s.is_null()),
    ) else {
        return Err(AppError::Validation("Missing question/summary".to_string()));
    };

    let summary: DatasetSummary = serde_json::from_value(summary)
        .map_err(|e| AppError::Validation(format!("Invalid summary: {}", e)))?;

    let reply = state.agent.answer_csv_question(&summary, &question).await?;

    Ok(Json(ReplyResponse {
        reply,
        timestamp: timestamp_millis(),
    }))
}

/// Parsing and summarizing are CPU-bound; they run on the blocking pool.
async fn analyze(state: &AppState, data: Bytes) -> Result<Arc<CsvAnalysis>, AppError> {
    let summaries = state.summaries.clone();
    tokio::task::spawn_blocking(move || summaries.get_or_analyze(&data)).await?
}
