use actix::prelude::*;
use actix_web::middleware::TrailingSlash;
use actix_web::{web::Data, App, HttpServer};
use anyhow::Context as AnyhowContext;
use nalda_sync::catalog::{SqliteCatalogRepository, SqliteTermRepository};
use nalda_sync::control;
use nalda_sync::export::ExportService;
use nalda_sync::history::FileSystemHistoryRepository;
use nalda_sync::settings::FileSystemSettingsRepository;
use nalda_types::product::CatalogRepository;
use nalda_types::term::TermRepository;
use std::env;
use std::sync::Arc;
use tokio_rusqlite::Connection;

#[actix_web::main]
async fn main() -> Result<(), anyhow::Error> {
    if let Err(env::VarError::NotPresent) = env::var("RUST_LOG") {
        env::set_var("RUST_LOG", "INFO");
    }
    pretty_env_logger::formatted_timed_builder()
        .parse_default_env()
        .init();

    match std::fs::File::open(".env") {
        Ok(_) => envmnt::load_file(".env")?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            std::fs::File::create(".env")?;
            envmnt::load_file(".env")?;
        }
        Err(err) => {
            return Err(anyhow::anyhow!("Unable to open .env file: {err}"));
        }
    }

    tokio::fs::create_dir_all("storage").await?;

    // Each repository gets its own connection; SQLite handles concurrent
    // access to the same database file.
    let conn = Connection::open("storage/catalog.db").await?;
    let catalog: Arc<dyn CatalogRepository> =
        Arc::new(SqliteCatalogRepository::init(conn).await?);
    let conn = Connection::open("storage/catalog.db").await?;
    let terms: Arc<dyn TermRepository> = Arc::new(SqliteTermRepository::init(conn).await?);

    let settings = Arc::new(FileSystemSettingsRepository::new());
    let history = Arc::new(FileSystemHistoryRepository::new());

    let export_service =
        ExportService::new(catalog.clone(), terms.clone(), settings.clone(), history.clone())
            .start();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::NormalizePath::new(
                TrailingSlash::Trim,
            ))
            .app_data(Data::new(export_service.clone()))
            .service(control::start_export)
            .service(control::export_progress)
            .service(control::active_export)
            .service(control::run_export_now)
            .service(control::export_logs)
            .service(control::clear_export_logs)
            .service(control::test_connection)
            .service(control::download_csv)
            .service(control::csv_file_info)
            // Registered last so the API routes above win; anything else
            // under /export is served straight from the export directory.
            .service(
                actix_files::Files::new("/export", "export")
                    .use_last_modified(true)
                    .use_etag(true),
            )
    })
    .bind(("0.0.0.0", 8080))
    .context("Failed to bind server to 0.0.0.0:8080. Is the port already in use?")?
    .run()
    .await?;
    Ok(())
}
