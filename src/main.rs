mod config;
mod model;
mod web;

use actix_web::{App, HttpServer, web::Data};
use actix_files as fs;
use dotenv::dotenv;
use log::{info, error};
use std::sync::Arc;
use tera::Tera;

use config::Config;
use model::{InMemoryHistory, OllamaClient, Relay};
use web::routes;

// App state structure
struct AppState {
    tera: Tera,
    ollama: OllamaClient,
    relay: Relay,
    default_model: String,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting companion relay");

    let config = Config::from_env();
    config.log_summary();

    let ollama = match OllamaClient::new(config.ollama_base_url()) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to build Ollama client: {}", e);
            std::process::exit(1);
        }
    };

    // Fire-and-forget so the first real request doesn't pay the model load
    if config.ollama_enabled {
        let warm = ollama.clone();
        let model = config.ollama_model.clone();
        let (num_predict, timeout) = (config.num_predict, config.ollama_timeout);
        actix_web::rt::spawn(async move {
            warm.warmup(&model, num_predict, timeout).await;
        });
    }

    // Initialize template engine
    let mut tera = match Tera::new("templates/**/*") {
        Ok(t) => t,
        Err(e) => {
            error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };
    tera.autoescape_on(vec![".html"]);

    let history = Arc::new(InMemoryHistory::new(config.history_max_turns));
    let relay = Relay::new(&config, ollama.clone(), history);

    // Create app state
    let app_state = Data::new(AppState {
        tera,
        ollama,
        relay,
        default_model: config.ollama_model.clone(),
    });

    info!("Listening on http://{}:{}", config.bind_host, config.bind_port);

    // Start web server
    HttpServer::new(move || {
        App::new()
            .wrap(routes::cors())
            .app_data(app_state.clone())
            .configure(routes::configure)
            .service(fs::Files::new("/static", "./static"))
    })
    .bind((config.bind_host.as_str(), config.bind_port))?
    .run()
    .await
}
