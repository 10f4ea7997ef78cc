use crate::export::{self, ExportService, StartOutcome};
use crate::uploader;
use actix::prelude::*;
use actix_files::NamedFile;
use actix_web::web::{Data, Json, Path};
use actix_web::{get, post, HttpResponse};
use anyhow::Context as AnyhowContext;
use derive_more::{Display, Error};
use nalda_types::settings::FtpCredentials;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::io::AsyncBufReadExt;

pub type Response = Result<HttpResponse, ControllerError>;

#[derive(Debug, Display, Error)]
pub enum ControllerError {
    NotFound,
    #[error(ignore)]
    InternalServerError(anyhow::Error),
}

impl From<anyhow::Error> for ControllerError {
    fn from(err: anyhow::Error) -> Self {
        Self::InternalServerError(err)
    }
}

impl From<actix::MailboxError> for ControllerError {
    fn from(err: actix::MailboxError) -> Self {
        Self::InternalServerError(err.into())
    }
}

impl actix_web::error::ResponseError for ControllerError {
    fn error_response(&self) -> HttpResponse {
        log::warn!("{self:?}");
        match self {
            Self::NotFound => {
                HttpResponse::NotFound().json(serde_json::json!({"error": "not found"}))
            }
            Self::InternalServerError(err) => HttpResponse::InternalServerError()
                .json(serde_json::json!({"error": err.to_string()})),
        }
    }
}

#[derive(Serialize)]
struct StartedDto {
    run_id: String,
}

#[post("/export/start")]
async fn start_export(service: Data<Addr<ExportService>>) -> Response {
    let outcome = service
        .send(export::StartRun)
        .await
        .context("Unable to send message to ExportService")??;
    match outcome {
        StartOutcome::Started(run_id) => Ok(HttpResponse::Ok().json(StartedDto { run_id })),
        StartOutcome::AlreadyRunning(active_run_id) => {
            Ok(HttpResponse::Conflict().json(serde_json::json!({
                "error": "An export is already in progress. Please wait for it to complete.",
                "active_run_id": active_run_id,
            })))
        }
    }
}

#[get("/export/progress/{run_id}")]
async fn export_progress(
    service: Data<Addr<ExportService>>,
    run_id: Path<String>,
) -> Response {
    service
        .send(export::GetProgress(run_id.into_inner()))
        .await
        .context("Unable to send message to ExportService")?
        .map(|record| HttpResponse::Ok().json(record))
        .ok_or(ControllerError::NotFound)
}

#[get("/export/active")]
async fn active_export(service: Data<Addr<ExportService>>) -> Response {
    let active = service
        .send(export::GetActiveRun)
        .await
        .context("Unable to send message to ExportService")?;
    match active {
        Some((run_id, progress)) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "active": true,
            "run_id": run_id,
            "progress": progress,
        }))),
        None => Ok(HttpResponse::Ok().json(serde_json::json!({"active": false}))),
    }
}

#[post("/export/run")]
async fn run_export_now(service: Data<Addr<ExportService>>) -> Response {
    let report = service
        .send(export::RunNow)
        .await
        .context("Unable to send message to ExportService")??;
    Ok(HttpResponse::Ok().json(report))
}

#[get("/export/logs")]
async fn export_logs(service: Data<Addr<ExportService>>) -> Response {
    let logs = service
        .send(export::GetLogs)
        .await
        .context("Unable to send message to ExportService")??;
    Ok(HttpResponse::Ok().json(logs))
}

#[post("/export/logs/clear")]
async fn clear_export_logs(service: Data<Addr<ExportService>>) -> Response {
    service
        .send(export::ClearLogs)
        .await
        .context("Unable to send message to ExportService")??;
    Ok(HttpResponse::Ok().json(()))
}

#[post("/export/test-connection")]
async fn test_connection(credentials: Json<FtpCredentials>) -> Response {
    let outcome = uploader::test_connection(credentials.into_inner()).await;
    Ok(HttpResponse::Ok().json(outcome))
}

#[get("/export/download")]
async fn download_csv() -> Result<NamedFile, ControllerError> {
    NamedFile::open(export::export_file_path()).map_err(|_| ControllerError::NotFound)
}

#[derive(Serialize)]
struct CsvFileInfo {
    path: String,
    size: u64,
    modified: String,
    rows: usize,
}

#[get("/export/file")]
async fn csv_file_info() -> Response {
    let path = export::export_file_path();
    let meta = match tokio::fs::metadata(&path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(ControllerError::NotFound)
        }
        Err(err) => {
            return Err(ControllerError::InternalServerError(
                anyhow::Error::new(err).context("Unable to read export file metadata"),
            ))
        }
    };
    let modified = meta
        .modified()
        .ok()
        .map(OffsetDateTime::from)
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_default();
    let rows = count_data_rows(&path)
        .await
        .context("Unable to count export file rows")?;
    Ok(HttpResponse::Ok().json(CsvFileInfo {
        path: path.display().to_string(),
        size: meta.len(),
        modified,
        rows,
    }))
}

async fn count_data_rows(path: &std::path::Path) -> Result<usize, anyhow::Error> {
    let file = tokio::fs::File::open(path).await?;
    let mut lines = tokio::io::BufReader::new(file).lines();
    let mut count = 0usize;
    while lines.next_line().await?.is_some() {
        count += 1;
    }
    Ok(count.saturating_sub(1))
}
