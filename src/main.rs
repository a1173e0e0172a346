use tracing_subscriber::{EnvFilter, fmt};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let http_port = std::env::var("CLINIC_HTTP_PORT").unwrap_or_else(|_| "3001".to_string());
    let db_path = std::env::var("CLINIC_DB_PATH").unwrap_or_else(|_| "clinic.db".to_string());
    info!(
        target: "clinic",
        "Clinic starting: RUST_LOG='{}', http_port={}, db_path='{}'",
        rust_log, http_port, db_path
    );

    clinic::server::run().await
}
