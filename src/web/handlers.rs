use actix_web::error::{InternalError, JsonPayloadError};
use actix_web::{web, Error, HttpRequest, HttpResponse, Responder};
use log::{error, info, warn};
use serde_json::json;
use tera::Context;

use crate::model::truncate_chars;
use crate::web::models::{ChatMeta, ChatRequest, ChatResponse, ModelsResponse};
use crate::AppState;

const INTERNAL_FALLBACK: &str = "(local fallback) [internal error handled]";
const ERROR_DETAIL_CHARS: usize = 200;

// Index page handler
pub async fn index(data: web::Data<AppState>) -> impl Responder {
    let mut context = Context::new();
    context.insert("default_model", &data.default_model);
    match data.tera.render("index.html", &context) {
        Ok(html) => HttpResponse::Ok().content_type("text/html").body(html),
        Err(e) => {
            error!("Template error: {}", e);
            HttpResponse::InternalServerError().body("Template error")
        }
    }
}

// Health check endpoint
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

// Installed models, empty when the model server can't be reached
pub async fn models(data: web::Data<AppState>) -> impl Responder {
    let models = data.ollama.list_models().await;
    info!("Listing {} model(s)", models.len());
    HttpResponse::Ok().json(ModelsResponse { models })
}

// Chat API endpoint
pub async fn chat(data: web::Data<AppState>, req: web::Json<ChatRequest>) -> impl Responder {
    info!(
        "Chat request (conversation: {:?}, model: {:?}, use_ollama: {:?})",
        req.conversation_id, req.model, req.use_ollama
    );

    match data.relay.handle(&req).await {
        Ok(outcome) => HttpResponse::Ok().json(ChatResponse {
            response: outcome.response_text,
            meta: ChatMeta {
                used_ollama: outcome.used_model_server,
                error: None,
            },
        }),
        Err(e) => {
            error!("Chat relay error: {}", e);
            internal_fallback(&e.to_string())
        }
    }
}

/// Rejected request bodies still get the always-200 chat contract.
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> Error {
    warn!("Bad request body for {}: {}", req.path(), err);
    let response = internal_fallback(&err.to_string());
    InternalError::from_response(err, response).into()
}

fn internal_fallback(detail: &str) -> HttpResponse {
    HttpResponse::Ok().json(ChatResponse {
        response: INTERNAL_FALLBACK.to_string(),
        meta: ChatMeta {
            used_ollama: false,
            error: Some(truncate_chars(detail, ERROR_DETAIL_CHARS).to_string()),
        },
    })
}
