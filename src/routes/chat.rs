use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::AppError,
    routes::{supplied, timestamp_millis, AppJson},
    services::{
        image_upload::{spool_image, SpooledImage},
        llm_agent::{ChatTurn, DEFAULT_IMAGE_PROMPT},
    },
    AppState,
};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat))
        .route("/image-chat", post(image_chat))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    message: Option<String>,
    #[serde(default)]
    history: Vec<ChatTurn>,
}

#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    pub reply: String,
    pub timestamp: i64,
}

#[derive(Debug, Serialize)]
pub struct ImageReplyResponse {
    reply: String,
    timestamp: i64,
    filename: String,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    AppJson(request): AppJson<ChatRequest>,
) -> Result<Json<ReplyResponse>, AppError> {
    let message = supplied(request.message)
        .ok_or_else(|| AppError::Validation("Missing message".to_string()))?;

    let reply = state.agent.chat(&message, &request.history).await?;

    Ok(Json(ReplyResponse {
        reply,
        timestamp: timestamp_millis(),
    }))
}

async fn image_chat(
    State(state): State<Arc<AppState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ImageReplyResponse>, AppError> {
    let mut multipart = multipart?;
    let mut image: Option<SpooledImage> = None;
    let mut prompt: Option<String> = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("image") => {
                let filename = field.file_name().unwrap_or("image").to_string();
                let content_type = field.content_type().unwrap_or_default().to_string();
                image = Some(
                    spool_image(field, filename, &content_type, &state.config.upload_dir).await?,
                );
            }
            Some("prompt") => prompt = Some(field.text().await?),
            _ => {}
        }
    }

    // `image` owns the temp file; it is removed when this handler returns.
    let image = image.ok_or_else(|| AppError::Validation("Missing image".to_string()))?;
    let prompt = prompt
        .filter(|p| !p.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_IMAGE_PROMPT.to_string());

    tracing::info!(
        "Received image {} ({} bytes) at {:?}",
        image.filename,
        image.size,
        image.path()
    );
    let data_url = image.to_data_url().await?;
    let reply = state.agent.describe_image(&prompt, &data_url).await?;

    Ok(Json(ImageReplyResponse {
        reply,
        timestamp: timestamp_millis(),
        filename: image.filename.clone(),
    }))
}
