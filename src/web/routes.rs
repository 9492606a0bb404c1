use actix_cors::Cors;
use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(handlers::json_error_handler))
        .route("/", web::get().to(handlers::index))
        .route("/health", web::get().to(handlers::health_check))
        .route("/models", web::get().to(handlers::models))
        .route("/chat", web::post().to(handlers::chat));
}

// The desktop shell loads its page from file:// and calls us cross-origin
pub fn cors() -> Cors {
    Cors::permissive()
}
