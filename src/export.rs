use crate::history::FileSystemHistoryRepository;
use crate::progress::{ProgressPatch, ProgressRecord, ProgressStore, RunStatus};
use crate::row::{self, Skip, CSV_HEADERS};
use crate::settings::FileSystemSettingsRepository;
use crate::uploader;
use actix::prelude::*;
use derive_more::Display;
use log_error::LogError;
use nalda_types::product::{CatalogRepository, ProductKind, VariationsOf};
use nalda_types::report::{ExportReport, SkipTally};
use nalda_types::settings::ExportSettings;
use nalda_types::term::TermRepository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const EXPORT_DIR: &str = "export";
pub const EXPORT_FILE_NAME: &str = "nalda-products.csv";

const TEMP_SUFFIX: &str = ".part";
const BATCH_SIZE: usize = 25;
const PROGRESS_START: f64 = 15.0;
const PROGRESS_END: f64 = 95.0;
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];
const SCHEDULE_RECHECK: Duration = Duration::from_secs(300);

pub fn export_file_path() -> PathBuf {
    Path::new(EXPORT_DIR).join(EXPORT_FILE_NAME)
}

#[derive(Debug, Display)]
pub enum ExportError {
    #[display("No products found to export")]
    EmptyCatalog,
    #[display("Failed to create CSV file: {_0}")]
    Io(std::io::Error),
    #[display("{_0}")]
    Other(anyhow::Error),
}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<anyhow::Error> for ExportError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err)
    }
}

impl From<csv_async::Error> for ExportError {
    fn from(err: csv_async::Error) -> Self {
        Self::Other(err.into())
    }
}

/// Write half of the progress store for one run. The worker holding the sink
/// is the only writer for its run id.
#[derive(Clone)]
pub struct ProgressSink {
    store: Arc<RwLock<ProgressStore>>,
    run_id: String,
}

impl ProgressSink {
    pub fn new(store: Arc<RwLock<ProgressStore>>, run_id: String) -> Self {
        Self { store, run_id }
    }

    async fn update(&self, patch: ProgressPatch) {
        self.store.write().await.merge(&self.run_id, patch);
    }
}

fn batch_percent(processed: usize, total: usize) -> u8 {
    let span = PROGRESS_END - PROGRESS_START;
    let percent = PROGRESS_START + (processed as f64 / total as f64) * span;
    percent.round() as u8
}

fn tally(reasons: &mut SkipTally, skip: Skip) {
    match skip {
        Skip::NoGtin => reasons.no_gtin += 1,
        Skip::NoPrice => reasons.no_price += 1,
    }
}

/// Shared generation core for both export modes. Streams rows into a
/// temporary file and renames it over the previous feed only once fully
/// written, so a concurrent reader never observes a partial file. With a
/// progress sink attached it also reports batch checkpoints and treats an
/// empty catalog as an error, matching the progressive contract.
pub async fn generate_feed(
    catalog: Arc<dyn CatalogRepository>,
    terms: Arc<dyn TermRepository>,
    settings: &ExportSettings,
    dir: &Path,
    progress: Option<&ProgressSink>,
) -> Result<ExportReport, ExportError> {
    tokio::fs::create_dir_all(dir).await?;

    if let Some(sink) = progress {
        sink.update(ProgressPatch {
            status: Some(RunStatus::Running),
            step: Some("counting".to_string()),
            percent: Some(5),
            message: Some("Counting products...".to_string()),
            ..Default::default()
        })
        .await;
    }

    let ids = catalog.published_ids().await?;
    let total = ids.len();
    if total == 0 && progress.is_some() {
        return Err(ExportError::EmptyCatalog);
    }

    if let Some(sink) = progress {
        sink.update(ProgressPatch {
            step: Some("preparing".to_string()),
            percent: Some(10),
            message: Some(format!("Found {total} products. Preparing export...")),
            total: Some(total),
            ..Default::default()
        })
        .await;
    }

    let term_index = terms.load_index().await?;

    let temp_path = dir.join(format!("{EXPORT_FILE_NAME}{TEMP_SUFFIX}"));
    let final_path = dir.join(EXPORT_FILE_NAME);
    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(UTF8_BOM).await?;
    let mut writer = csv_async::AsyncWriterBuilder::new()
        .has_headers(false)
        .create_serializer(file);
    writer.serialize(CSV_HEADERS.as_slice()).await?;

    let mut exported = 0usize;
    let mut reasons = SkipTally::default();
    let mut processed = 0usize;
    for id in ids {
        match catalog.get_one(&id).await? {
            Some(product) if product.kind == ProductKind::Variable => {
                for variation in catalog.select(&VariationsOf(product.id)).await? {
                    match row::build_row(&variation, Some(&product), settings, &term_index) {
                        Ok(row) => {
                            writer.serialize(row).await?;
                            exported += 1;
                        }
                        Err(skip) => tally(&mut reasons, skip),
                    }
                }
            }
            Some(product) => match row::build_row(&product, None, settings, &term_index) {
                Ok(row) => {
                    writer.serialize(row).await?;
                    exported += 1;
                }
                Err(skip) => tally(&mut reasons, skip),
            },
            None => reasons.product_not_found += 1,
        }
        processed += 1;
        if let Some(sink) = progress {
            if processed % BATCH_SIZE == 0 || processed == total {
                sink.update(ProgressPatch {
                    status: Some(RunStatus::Running),
                    step: Some("exporting".to_string()),
                    percent: Some(batch_percent(processed, total)),
                    message: Some(format!("Exporting products ({processed}/{total})...")),
                    exported: Some(exported),
                    skipped: Some(reasons.total()),
                    total: Some(total),
                })
                .await;
            }
        }
    }

    writer.flush().await?;
    drop(writer);

    if let Some(sink) = progress {
        sink.update(ProgressPatch {
            step: Some("finalizing".to_string()),
            percent: Some(98),
            message: Some("Finalizing export...".to_string()),
            exported: Some(exported),
            skipped: Some(reasons.total()),
            ..Default::default()
        })
        .await;
    }

    tokio::fs::rename(&temp_path, &final_path).await?;

    Ok(ExportReport::completed(exported, reasons.total(), reasons))
}

/// Blocking export: generate, optionally upload, log. Always yields a
/// structured report; failures are folded into it.
pub async fn run_export(
    catalog: Arc<dyn CatalogRepository>,
    terms: Arc<dyn TermRepository>,
    history: Arc<FileSystemHistoryRepository>,
    settings: ExportSettings,
) -> ExportReport {
    let mut report =
        match generate_feed(catalog, terms, &settings, Path::new(EXPORT_DIR), None).await {
            Ok(report) => report,
            Err(err) => {
                log::error!("Export failed: {err}");
                ExportReport::failed(err.to_string())
            }
        };
    if report.success && settings.upload.enabled {
        report.upload = Some(uploader::upload(export_file_path(), &settings.upload).await);
    }
    history
        .append(report.clone())
        .await
        .log_error("Unable to append export log");
    report
}

/// Background worker for one progressive run. Owns its progress record and
/// clears the active pointer on both terminal paths.
async fn run_progressive(
    run_id: String,
    catalog: Arc<dyn CatalogRepository>,
    terms: Arc<dyn TermRepository>,
    history: Arc<FileSystemHistoryRepository>,
    settings: ExportSettings,
    store: Arc<RwLock<ProgressStore>>,
) {
    let sink = ProgressSink::new(store.clone(), run_id.clone());
    match generate_feed(catalog, terms, &settings, Path::new(EXPORT_DIR), Some(&sink)).await {
        Ok(mut report) => {
            if settings.upload.enabled {
                report.upload = Some(uploader::upload(export_file_path(), &settings.upload).await);
            }
            history
                .append(report.clone())
                .await
                .log_error("Unable to append export log");
            let mut store = store.write().await;
            store.merge(
                &run_id,
                ProgressPatch {
                    status: Some(RunStatus::Complete),
                    step: Some("done".to_string()),
                    percent: Some(100),
                    message: Some(report.message.clone()),
                    exported: Some(report.exported),
                    skipped: Some(report.skipped),
                    ..Default::default()
                },
            );
            store.clear_active(&run_id);
        }
        Err(err) => {
            log::error!("Export run {run_id} failed: {err}");
            let mut store = store.write().await;
            store.merge(
                &run_id,
                ProgressPatch {
                    status: Some(RunStatus::Error),
                    message: Some(err.to_string()),
                    ..Default::default()
                },
            );
            store.clear_active(&run_id);
        }
    }
}

#[derive(Debug, Clone)]
pub enum StartOutcome {
    Started(String),
    AlreadyRunning(String),
}

/// Check-and-set of the active-run pointer. Callers must hold the store's
/// write lock for the whole call, which makes the guard atomic.
fn begin_run(store: &mut ProgressStore) -> StartOutcome {
    store.purge_expired();
    if let Some(active) = store.active().map(ToString::to_string) {
        let unresolved = store
            .get(&active)
            .map(|record| !record.status.is_terminal())
            .unwrap_or(false);
        if unresolved {
            return StartOutcome::AlreadyRunning(active);
        }
        store.clear_active(&active);
    }
    let run_id = format!("export_{}", Uuid::new_v4().simple());
    store.merge(
        &run_id,
        ProgressPatch {
            status: Some(RunStatus::Running),
            step: Some("init".to_string()),
            percent: Some(0),
            message: Some("Starting export...".to_string()),
            ..Default::default()
        },
    );
    store.set_active(run_id.clone());
    StartOutcome::Started(run_id)
}

pub struct ExportService {
    catalog: Arc<dyn CatalogRepository>,
    terms: Arc<dyn TermRepository>,
    settings: Arc<FileSystemSettingsRepository>,
    history: Arc<FileSystemHistoryRepository>,
    progress: Arc<RwLock<ProgressStore>>,
}

impl ExportService {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        terms: Arc<dyn TermRepository>,
        settings: Arc<FileSystemSettingsRepository>,
        history: Arc<FileSystemHistoryRepository>,
    ) -> Self {
        Self {
            catalog,
            terms,
            settings,
            history,
            progress: Arc::new(RwLock::new(ProgressStore::default())),
        }
    }
}

impl Actor for ExportService {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Context<Self>) {
        tokio::task::spawn_local(schedule_cycle(ctx.address(), self.settings.clone()));
    }
}

#[derive(Message)]
#[rtype(result = "Result<StartOutcome, anyhow::Error>")]
pub struct StartRun;

#[derive(Message)]
#[rtype(result = "Option<ProgressRecord>")]
pub struct GetProgress(pub String);

#[derive(Message)]
#[rtype(result = "Option<(String, ProgressRecord)>")]
pub struct GetActiveRun;

#[derive(Message)]
#[rtype(result = "Result<ExportReport, anyhow::Error>")]
pub struct RunNow;

#[derive(Message)]
#[rtype(result = "Result<Vec<ExportReport>, anyhow::Error>")]
pub struct GetLogs;

#[derive(Message)]
#[rtype(result = "Result<(), anyhow::Error>")]
pub struct ClearLogs;

impl Handler<StartRun> for ExportService {
    type Result = ResponseFuture<Result<StartOutcome, anyhow::Error>>;

    fn handle(&mut self, _: StartRun, _: &mut Self::Context) -> Self::Result {
        let catalog = self.catalog.clone();
        let terms = self.terms.clone();
        let settings_repo = self.settings.clone();
        let history = self.history.clone();
        let progress = self.progress.clone();
        Box::pin(async move {
            let settings = settings_repo.load().await?;
            let outcome = begin_run(&mut *progress.write().await);
            if let StartOutcome::Started(run_id) = &outcome {
                tokio::spawn(run_progressive(
                    run_id.clone(),
                    catalog,
                    terms,
                    history,
                    settings,
                    progress.clone(),
                ));
            }
            Ok(outcome)
        })
    }
}

impl Handler<GetProgress> for ExportService {
    type Result = ResponseFuture<Option<ProgressRecord>>;

    fn handle(&mut self, GetProgress(run_id): GetProgress, _: &mut Self::Context) -> Self::Result {
        let progress = self.progress.clone();
        Box::pin(async move { progress.read().await.get(&run_id).cloned() })
    }
}

impl Handler<GetActiveRun> for ExportService {
    type Result = ResponseFuture<Option<(String, ProgressRecord)>>;

    fn handle(&mut self, _: GetActiveRun, _: &mut Self::Context) -> Self::Result {
        let progress = self.progress.clone();
        Box::pin(async move {
            let mut store = progress.write().await;
            let active = store.active().map(ToString::to_string)?;
            let unresolved = store
                .get(&active)
                .map(|record| !record.status.is_terminal())
                .unwrap_or(false);
            if !unresolved {
                store.clear_active(&active);
                return None;
            }
            let record = store.get(&active).cloned()?;
            Some((active, record))
        })
    }
}

impl Handler<RunNow> for ExportService {
    type Result = ResponseFuture<Result<ExportReport, anyhow::Error>>;

    fn handle(&mut self, _: RunNow, _: &mut Self::Context) -> Self::Result {
        let catalog = self.catalog.clone();
        let terms = self.terms.clone();
        let settings_repo = self.settings.clone();
        let history = self.history.clone();
        Box::pin(async move {
            let settings = settings_repo.load().await?;
            Ok(run_export(catalog, terms, history, settings).await)
        })
    }
}

impl Handler<GetLogs> for ExportService {
    type Result = ResponseFuture<Result<Vec<ExportReport>, anyhow::Error>>;

    fn handle(&mut self, _: GetLogs, _: &mut Self::Context) -> Self::Result {
        let history = self.history.clone();
        Box::pin(async move { history.list().await })
    }
}

impl Handler<ClearLogs> for ExportService {
    type Result = ResponseFuture<Result<(), anyhow::Error>>;

    fn handle(&mut self, _: ClearLogs, _: &mut Self::Context) -> Self::Result {
        let history = self.history.clone();
        Box::pin(async move { history.clear().await })
    }
}

/// Fires the synchronous export on the configured interval. The interval is
/// re-read every cycle so settings changes apply without a restart.
pub async fn schedule_cycle(
    addr: Addr<ExportService>,
    settings: Arc<FileSystemSettingsRepository>,
) {
    loop {
        let interval = match settings.load().await {
            Ok(settings) => settings.schedule.as_deref().and_then(crate::parse_schedule),
            Err(err) => {
                log::error!("Unable to load settings for the export schedule: {err}");
                None
            }
        };
        let Some(interval) = interval else {
            tokio::time::sleep(SCHEDULE_RECHECK).await;
            continue;
        };
        tokio::time::sleep(interval).await;
        match addr.send(RunNow).await {
            Ok(Ok(report)) => log::info!("Scheduled export finished: {}", report.message),
            Ok(Err(err)) => log::error!("Scheduled export failed: {err}"),
            Err(err) => {
                log::error!("Export service stopped, ending schedule cycle: {err}");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::catalog::{SqliteCatalogRepository, SqliteTermRepository};
    use crate::fields::tests::product;
    use nalda_types::product::Product;
    use nalda_types::term::Term;
    use rust_decimal_macros::dec;
    use tokio_rusqlite::Connection;
    use typesafe_repository::async_ops::Save;

    async fn seeded_catalog(products: Vec<Product>) -> Arc<dyn CatalogRepository> {
        let conn = Connection::open_in_memory().await.unwrap();
        let repo = SqliteCatalogRepository::init(conn).await.unwrap();
        for p in products {
            repo.save(p).await.unwrap();
        }
        Arc::new(repo)
    }

    async fn seeded_terms(terms: Vec<Term>) -> Arc<dyn TermRepository> {
        let conn = Connection::open_in_memory().await.unwrap();
        let repo = SqliteTermRepository::init(conn).await.unwrap();
        for t in terms {
            repo.save(t).await.unwrap();
        }
        Arc::new(repo)
    }

    fn sellable(id: i64, sku: &str) -> Product {
        let mut p = product(id);
        p.sku = sku.to_string();
        p.price = Some(dec!(10));
        p
    }

    fn catalog_fixture() -> Vec<Product> {
        let mut variable = sellable(1, "10000001");
        variable.kind = ProductKind::Variable;
        let mut red = sellable(2, "10000002");
        red.kind = ProductKind::Variation;
        red.parent_id = Some(1);
        let mut blue = sellable(3, "10000003");
        blue.kind = ProductKind::Variation;
        blue.parent_id = Some(1);
        let simple = sellable(4, "10000004");
        vec![variable, red, blue, simple]
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("nalda-test-{}", Uuid::new_v4().simple()))
    }

    #[actix_rt::test]
    async fn variable_product_yields_one_row_per_variation() {
        let catalog = seeded_catalog(catalog_fixture()).await;
        let terms = seeded_terms(vec![]).await;
        let dir = temp_dir();

        let report = generate_feed(catalog, terms, &ExportSettings::default(), &dir, None)
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(3, report.exported);
        assert_eq!(0, report.skipped);

        let bytes = std::fs::read(dir.join(EXPORT_FILE_NAME)).unwrap();
        assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
        let content = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(4, content.lines().count());
        assert!(content.lines().next().unwrap().starts_with("gtin,title,country"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_rt::test]
    async fn reruns_are_byte_identical() {
        let catalog = seeded_catalog(catalog_fixture()).await;
        let terms = seeded_terms(vec![]).await;
        let dir = temp_dir();
        let settings = ExportSettings::default();

        generate_feed(catalog.clone(), terms.clone(), &settings, &dir, None)
            .await
            .unwrap();
        let first = std::fs::read(dir.join(EXPORT_FILE_NAME)).unwrap();
        generate_feed(catalog, terms, &settings, &dir, None)
            .await
            .unwrap();
        let second = std::fs::read(dir.join(EXPORT_FILE_NAME)).unwrap();
        assert_eq!(first, second);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_rt::test]
    async fn empty_catalog_still_writes_the_header_in_sync_mode() {
        let catalog = seeded_catalog(vec![]).await;
        let terms = seeded_terms(vec![]).await;
        let dir = temp_dir();

        let report = generate_feed(catalog, terms, &ExportSettings::default(), &dir, None)
            .await
            .unwrap();
        assert!(report.success);
        assert_eq!(0, report.exported);

        let bytes = std::fs::read(dir.join(EXPORT_FILE_NAME)).unwrap();
        let content = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert_eq!(1, content.lines().count());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_rt::test]
    async fn empty_catalog_is_an_error_in_progressive_mode() {
        let catalog = seeded_catalog(vec![]).await;
        let terms = seeded_terms(vec![]).await;
        let store = Arc::new(RwLock::new(ProgressStore::default()));
        let sink = ProgressSink::new(store.clone(), "run".to_string());
        let dir = temp_dir();

        let result = generate_feed(
            catalog,
            terms,
            &ExportSettings::default(),
            &dir,
            Some(&sink),
        )
        .await;
        assert!(matches!(result, Err(ExportError::EmptyCatalog)));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[actix_rt::test]
    async fn skips_are_tallied_per_reason() {
        let mut priceless = sellable(5, "10000005");
        priceless.price = None;
        let mut gtinless = sellable(6, "no-gtin-here");
        gtinless.sku = "SKU-ABC".to_string();
        let mut products = catalog_fixture();
        products.push(priceless);
        products.push(gtinless);

        let catalog = seeded_catalog(products).await;
        let terms = seeded_terms(vec![]).await;
        let dir = temp_dir();

        let report = generate_feed(catalog, terms, &ExportSettings::default(), &dir, None)
            .await
            .unwrap();
        assert_eq!(3, report.exported);
        assert_eq!(2, report.skipped);
        assert_eq!(1, report.skip_reasons.no_price);
        assert_eq!(1, report.skip_reasons.no_gtin);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[actix_rt::test]
    async fn category_terms_flow_into_rows() {
        let mut simple = sellable(1, "10000001");
        simple.term_ids = vec![2];
        let catalog = seeded_catalog(vec![simple]).await;
        let terms = seeded_terms(vec![
            Term {
                id: 1,
                taxonomy: "product_cat".to_string(),
                name: "Shoes".to_string(),
                parent_id: None,
            },
            Term {
                id: 2,
                taxonomy: "product_cat".to_string(),
                name: "Running".to_string(),
                parent_id: Some(1),
            },
        ])
        .await;
        let dir = temp_dir();

        generate_feed(catalog, terms, &ExportSettings::default(), &dir, None)
            .await
            .unwrap();
        let bytes = std::fs::read(dir.join(EXPORT_FILE_NAME)).unwrap();
        let content = String::from_utf8(bytes[3..].to_vec()).unwrap();
        assert!(content.contains("Shoes > Running"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn batch_percent_is_monotonic_and_bounded() {
        let total = 60;
        let mut last = 10;
        for processed in (BATCH_SIZE..=total).step_by(BATCH_SIZE).chain([total]) {
            let percent = batch_percent(processed, total);
            assert!(percent >= last);
            assert!((15..=95).contains(&percent));
            last = percent;
        }
        assert_eq!(95, batch_percent(total, total));
    }

    #[test]
    fn second_start_is_rejected_with_the_existing_run_id() {
        let mut store = ProgressStore::default();
        let first = begin_run(&mut store);
        let StartOutcome::Started(run_id) = first else {
            panic!("first run not started");
        };

        match begin_run(&mut store) {
            StartOutcome::AlreadyRunning(active) => assert_eq!(run_id, active),
            StartOutcome::Started(_) => panic!("guard did not hold"),
        }

        // terminal record releases the guard
        store.merge(
            &run_id,
            ProgressPatch {
                status: Some(RunStatus::Complete),
                ..Default::default()
            },
        );
        assert!(matches!(begin_run(&mut store), StartOutcome::Started(_)));
    }
}
