use std::time::Duration;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use labguard_print::config::{ServerSettings, Settings};
use labguard_print::handlers;
use labguard_print::mailer::PrinterMailer;
use labguard_print::store::JobStore;

// ==============================================================================
// MAIN APPLICATION
// ==============================================================================

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,lettre=warn".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting LabGuard Pro Mobile Print service");

    let settings = Settings::from_env().context("Failed to load configuration")?;
    info!("Configuration loaded successfully");

    std::fs::create_dir_all(&settings.storage.labels_path)
        .with_context(|| format!("Failed to create labels directory {}", settings.storage.labels_path))?;

    let mailer = PrinterMailer::from_settings(&settings.mail).context("Failed to configure printer mail relay")?;
    info!("Printer relay using {:?} transport", settings.mail.transport);

    let store = match settings.storage.job_ttl_secs {
        0 => JobStore::new(),
        ttl => JobStore::with_retention(Duration::from_secs(ttl)),
    };
    let store = web::Data::new(store);

    // idle servers still release expired jobs
    if settings.storage.job_ttl_secs > 0 {
        let store = store.clone();
        let period = Duration::from_secs(settings.storage.job_ttl_secs.clamp(60, 3600));
        actix_web::rt::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                store.prune_expired().await;
            }
        });
    }
    let mailer = web::Data::new(mailer);
    let settings_data = web::Data::new(settings.clone());
    let server_settings = settings.server.clone();

    info!(
        "Starting HTTP server on {}:{} (public url {})",
        settings.server.host, settings.server.port, settings.server.public_url
    );

    let mut server = HttpServer::new(move || {
        App::new()
            // Global middleware
            .wrap(TracingLogger::default())
            .wrap(middleware::Compress::default())
            .wrap(cors(&server_settings))
            // Application data
            .app_data(settings_data.clone())
            .app_data(store.clone())
            .app_data(mailer.clone())
            .configure(handlers::configure)
    })
    .client_request_timeout(Duration::from_secs(settings.server.request_timeout_secs));

    if let Some(workers) = settings.server.workers {
        server = server.workers(workers);
    }

    server
        .bind((settings.server.host.as_str(), settings.server.port))?
        .run()
        .await?;

    Ok(())
}

fn cors(settings: &ServerSettings) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![
            actix_web::http::header::ACCEPT,
            actix_web::http::header::CONTENT_TYPE,
        ])
        .max_age(3600);

    if settings.cors_allowed_origins.iter().any(|o| o == "*") {
        return cors.allow_any_origin();
    }

    settings
        .cors_allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}
