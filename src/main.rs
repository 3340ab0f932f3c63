use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use csv_page_importer::application::{FileIntake, ImportProcessor};
use csv_page_importer::domain::settings::ImporterSettings;
use csv_page_importer::infrastructure::content::{ContentStore, SqlitePageStore};
use csv_page_importer::infrastructure::db::{self, ImportRunRepository};
use csv_page_importer::infrastructure::storage;
use csv_page_importer::interfaces::http::{start_server, HttpState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let settings = ImporterSettings::load().unwrap_or_else(|e| {
        error!(error = %e, "Failed to load settings");
        std::process::exit(1);
    });
    if let Err(e) = settings.validate() {
        error!(error = %e, "Invalid settings");
        std::process::exit(1);
    }

    storage::ensure_upload_root(&settings.upload_dir)?;

    if let Some(parent) = settings
        .database_url
        .strip_prefix("sqlite://")
        .map(std::path::Path::new)
        .and_then(|p| p.parent())
    {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = db::connect(&settings.database_url)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to open database");
            std::process::exit(1);
        });

    let runs = Arc::new(ImportRunRepository::new(pool.clone()));
    runs.init_schema().await.unwrap_or_else(|e| {
        error!(error = %e, "Failed to initialize ledger schema");
        std::process::exit(1);
    });

    let page_store = SqlitePageStore::new(pool);
    page_store.init_schema().await.unwrap_or_else(|e| {
        error!(error = %e, "Failed to initialize content schema");
        std::process::exit(1);
    });
    let store: Arc<dyn ContentStore> = Arc::new(page_store);

    let processor = Arc::new(ImportProcessor::new(
        store.clone(),
        runs.clone(),
        settings.clone(),
    ));
    let intake = FileIntake::new(settings.clone());

    spawn_daily_cleanup(runs.clone(), settings.cleanup_days);

    info!(bind_addr = %settings.bind_addr, "Starting CSV page importer");

    let server = start_server(HttpState {
        processor,
        intake,
        runs,
        store,
        settings,
    })?;

    server.await
}

/// Remove terminal runs past their retention window, once a day.
fn spawn_daily_cleanup(runs: Arc<ImportRunRepository>, cleanup_days: u32) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            match runs.cleanup_old(cleanup_days).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "Old import records cleaned up"),
                Err(e) => error!(error = %e, "Import record cleanup failed"),
            }
        }
    });
}
