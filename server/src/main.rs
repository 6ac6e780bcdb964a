use std::sync::Arc;

use dotenvy::dotenv;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use pulse_server::config::Config;
use pulse_server::routes::create_routes;
use pulse_server::services::{LogNotifier, Notifier, SmtpNotifier};
use pulse_server::state::AppState;
use pulse_server::store::{LocalFileStore, PgStore};

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pulse_server=info,tower_http=info")),
        )
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Successfully connected to database");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    tracing::info!("Migrations run successfully");

    let files = LocalFileStore::open(&config.upload.dir)
        .await
        .expect("Failed to prepare upload directory");
    let store = Arc::new(PgStore::new(pool));

    if config.admin_token.is_none() {
        tracing::warn!("ADMIN_API_TOKEN is not set, admin routes will refuse every request");
    }

    let notifier: Arc<dyn Notifier> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "Mailing notifications over SMTP");
            Arc::new(SmtpNotifier::new(smtp).expect("Failed to configure SMTP"))
        }
        None => {
            tracing::warn!("SMTP is not configured, notifications are only logged");
            Arc::new(LogNotifier)
        }
    };

    let state = AppState::new(store.clone(), store, Arc::new(files), notifier, &config);
    let app = create_routes(state, &config);

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
