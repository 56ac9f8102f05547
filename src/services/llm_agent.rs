use std::sync::Arc;

use async_openai::{
    config::{Config as _, OpenAIConfig},
    error::{ApiError, OpenAIError},
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestMessageContentPart, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessage,
        ChatCompletionRequestUserMessage, ChatCompletionRequestUserMessageContent,
        CreateChatCompletionRequest, CreateChatCompletionResponse, ImageUrlArgs, Role,
    },
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::DatasetSummary;

const CHAT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
const CSV_QA_SYSTEM_PROMPT: &str =
    "You are a data analysis assistant. Answer only from the CSV summary provided.";
pub const DEFAULT_IMAGE_PROMPT: &str = "Describe the contents of this image.";

const CHAT_FALLBACK: &str = "No response.";
const IMAGE_FALLBACK: &str = "Could not analyze the image.";
const CSV_QA_FALLBACK: &str = "Could not answer from the summary.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

/// A single request/response exchange with a chat completion service.
///
/// Returns the first choice's text, or `None` when the provider answered
/// without content.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<Option<String>, AppError>;
}

/// Any OpenAI-compatible endpoint (Groq by default).
///
/// Requests are sent once, without retries, and a failed call keeps the
/// upstream HTTP status.
pub struct OpenAiCompletions {
    http: reqwest::Client,
    config: OpenAIConfig,
}

/// Error object returned under the `error` key of a failed call.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

impl OpenAiCompletions {
    pub fn new(http: reqwest::Client, api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base.trim_end_matches('/'));

        Self { http, config }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletions {
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> Result<Option<String>, AppError> {
        let request = CreateChatCompletionRequest {
            model: model.to_string(),
            messages,
            ..Default::default()
        };

        let response = self
            .http
            .post(self.config.url("/chat/completions"))
            .headers(self.config.headers())
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), &body));
        }

        let completion: CreateChatCompletionResponse =
            serde_json::from_slice(&body).map_err(|e| AppError::Provider {
                status: Some(status.as_u16()),
                details: format!("Unreadable completion response: {}", e),
            })?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content))
    }
}

fn transport_error(err: reqwest::Error) -> AppError {
    AppError::Provider {
        status: err.status().map(|s| s.as_u16()),
        details: err.to_string(),
    }
}

/// Builds the provider error for a non-2xx reply.
fn api_error(status: u16, body: &[u8]) -> AppError {
    let details = match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => {
            let mut details = error.message;
            if let Some(kind) = error.r#type {
                details.push_str(&format!(" (type: {})", kind));
            }
            if let Some(code) = error.code.filter(|c| !c.is_null()) {
                details.push_str(&format!(" (code: {})", code));
            }
            details
        }
        Err(_) => String::from_utf8_lossy(body).trim().to_string(),
    };
    AppError::Provider {
        status: Some(status),
        details,
    }
}

// Request builders only fail on invalid arguments.
impl From<OpenAIError> for AppError {
    fn from(err: OpenAIError) -> Self {
        AppError::Internal(format!("Failed to build completion request: {}", err))
    }
}

pub struct LlmAgent {
    client: Arc<dyn CompletionClient>,
    chat_model: String,
    vision_model: String,
}

impl LlmAgent {
    pub fn new(client: Arc<dyn CompletionClient>, chat_model: &str, vision_model: &str) -> Self {
        Self {
            client,
            chat_model: chat_model.to_string(),
            vision_model: vision_model.to_string(),
        }
    }

    pub async fn chat(&self, message: &str, history: &[ChatTurn]) -> Result<String, AppError> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(system_message(CHAT_SYSTEM_PROMPT));
        for turn in history {
            messages.push(match turn.role {
                ChatRole::User => user_text_message(&turn.content),
                ChatRole::Assistant => ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessageArgs::default()
                        .role(Role::Assistant)
                        .content(turn.content.clone())
                        .build()?,
                ),
            });
        }
        messages.push(user_text_message(message));

        tracing::info!("Sending chat with {} history turns to {}", history.len(), self.chat_model);
        self.reply(&self.chat_model, messages, CHAT_FALLBACK).await
    }

    pub async fn describe_image(&self, prompt: &str, data_url: &str) -> Result<String, AppError> {
        let text = ChatCompletionRequestMessageContentPartTextArgs::default()
            .text(prompt)
            .build()?;
        let image = ChatCompletionRequestMessageContentPartImageArgs::default()
            .image_url(ImageUrlArgs::default().url(data_url).build()?)
            .build()?;

        let messages = vec![ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
            content: ChatCompletionRequestUserMessageContent::Array(vec![
                ChatCompletionRequestMessageContentPart::Text(text),
                ChatCompletionRequestMessageContentPart::Image(image),
            ]),
            name: None,
            role: Role::User,
        })];

        tracing::info!("Sending image ({} chars encoded) to {}", data_url.len(), self.vision_model);
        self.reply(&self.vision_model, messages, IMAGE_FALLBACK).await
    }

    pub async fn answer_csv_question(
        &self,
        summary: &DatasetSummary,
        question: &str,
    ) -> Result<String, AppError> {
        let messages = vec![
            system_message(CSV_QA_SYSTEM_PROMPT),
            user_text_message(&csv_question_prompt(summary, question)?),
        ];

        tracing::info!(
            "Asking about a {}-row, {}-column summary",
            summary.row_count,
            summary.columns.len()
        );
        self.reply(&self.chat_model, messages, CSV_QA_FALLBACK).await
    }

    async fn reply(
        &self,
        model: &str,
        messages: Vec<ChatCompletionRequestMessage>,
        fallback: &str,
    ) -> Result<String, AppError> {
        let start = std::time::Instant::now();
        let content = self.client.complete(model, messages).await?;
        tracing::info!("Completion from {} took {:?}", model, start.elapsed());

        Ok(content
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| fallback.to_string()))
    }
}

pub fn csv_question_prompt(summary: &DatasetSummary, question: &str) -> Result<String, AppError> {
    let summary_json = serde_json::to_string_pretty(summary)
        .map_err(|e| AppError::Internal(format!("Failed to serialize summary: {}", e)))?;
    Ok(format!("Summary:\n{}\n\nQuestion: {}", summary_json, question))
}

fn system_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: content.to_string(),
        name: None,
        role: Role::System,
    })
}

fn user_text_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(content.to_string()),
        name: None,
        role: Role::User,
    })
}
