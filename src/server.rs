//! Webhook dispatcher: signature gate, event routing, reply formatting.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tracing::{error, info, warn};

use crate::classifier::{self, Intent, Note};
use crate::gemini::TextModel;
use crate::line::{self, ReplySender, WebhookEvent, WebhookPayload};
use crate::notion::{self, NoteStore};

/// Reply used when the model answers a chat with nothing at all.
const EMPTY_CHAT_REPLY: &str = "🤔";

/// Immutable per-process service handles, constructed once at startup.
pub struct AppState {
    pub channel_secret: String,
    pub model: Arc<dyn TextModel>,
    pub store: Arc<dyn NoteStore>,
    pub messenger: Arc<dyn ReplySender>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/callback", post(callback))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let signature = headers
        .get("x-line-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !line::verify_signature(&state.channel_secret, body.as_bytes(), signature) {
        warn!("Rejected webhook: signature mismatch");
        return StatusCode::BAD_REQUEST.into_response();
    }

    let payload: WebhookPayload = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Unparseable webhook payload: {e}");
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    for event in &payload.events {
        if let Err(e) = handle_event(&state, event).await {
            error!("Reply delivery failed: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    (StatusCode::OK, "OK").into_response()
}

/// Process one event. Everything up to the final send recovers locally;
/// only the reply send itself may fail.
async fn handle_event(state: &AppState, event: &WebhookEvent) -> Result<(), line::Error> {
    if event.event_type != "message" {
        return Ok(());
    }
    let Some(message) = &event.message else {
        return Ok(());
    };
    if message.msg_type != "text" {
        return Ok(());
    }
    let Some(text) = &message.text else {
        return Ok(());
    };
    let Some(reply_token) = &event.reply_token else {
        // The platform issues a token with every message event; without one
        // there is no way to deliver the mandatory reply.
        return Err(line::Error::Api(
            "message event without reply token".to_string(),
        ));
    };

    let reply_text = build_reply(state, text).await;
    state.messenger.reply(reply_token, &reply_text).await
}

async fn build_reply(state: &AppState, text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.eq_ignore_ascii_case("debug") {
        return model_report(state.model.as_ref()).await;
    }

    match classifier::classify(state.model.as_ref(), trimmed).await {
        Intent::Note(note) => match notion::persist(state.store.as_ref(), &note).await {
            Some(url) => {
                info!("Note stored: {url}");
                format_saved(&note, &url)
            }
            None => format_save_failed(&note),
        },
        Intent::Chat(reply) if reply.is_empty() => EMPTY_CHAT_REPLY.to_string(),
        Intent::Chat(reply) => reply,
    }
}

/// The `debug` diagnostic: list models that can serve generateContent.
async fn model_report(model: &dyn TextModel) -> String {
    let mut report = String::from("🔍 正在查詢可用模型...\n");
    match model.list_models().await {
        Ok(models) => {
            let available: Vec<String> = models
                .into_iter()
                .filter(|m| m.supports_generation())
                .map(|m| m.name)
                .collect();
            for name in &available {
                info!("Find model: {name}");
            }
            if available.is_empty() {
                report.push_str("⚠️ 沒有找到任何支援 generateContent 的模型");
            } else {
                report.push_str("✅ 找到以下模型：\n");
                report.push_str(&available.join("\n"));
            }
        }
        Err(e) => {
            error!("List models error: {e}");
            report.push_str(&format!("❌ 查詢失敗: {e}"));
        }
    }
    report
}

fn format_saved(note: &Note, url: &str) -> String {
    format!(
        "✅ 已存入 Notion\n📌 [{}] {}\n\n{}\n\n🔗 {}",
        note.tag, note.title, note.body, url
    )
}

fn format_save_failed(note: &Note) -> String {
    format!(
        "❌ 寫入 Notion 失敗，內容先留在這裡：\n📌 [{}] {}\n\n{}",
        note.tag, note.title, note.body
    )
}
