use crate::core::allocator::{PortAllocator, PortRequest};
use crate::core::checker;
use crate::core::extractor;
use crate::core::instantiator::instantiate_pair;
use crate::core::registry::PairingRegistry;
use crate::core::report::{AppReport, BatchReport, DIAGNOSTICS_FILE, SUMMARY_FILE};
use crate::core::store::TemplateStore;
use crate::domain::model::{Binding, MissingRoutePolicy, Severity, Verdict};
use crate::domain::ports::{ConfigProvider, Storage};
use crate::utils::error::{PairgenError, Result};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Loads, pairs, checks and instantiates one batch of templates.
pub struct BatchEngine<C: ConfigProvider> {
    config: Arc<C>,
    source: Arc<dyn Storage>,
    sink: Arc<dyn Storage>,
}

/// What a worker needs besides the pair itself.
#[derive(Clone)]
struct PairJob {
    registry: Arc<PairingRegistry>,
    sink: Arc<dyn Storage>,
    policy: MissingRoutePolicy,
    dry_run: bool,
}

impl<C: ConfigProvider + 'static> BatchEngine<C> {
    pub fn new(config: C, source: Arc<dyn Storage>, sink: Arc<dyn Storage>) -> Self {
        Self {
            config: Arc::new(config),
            source,
            sink,
        }
    }

    /// Load-time errors (duplicate templates, port conflicts, unreadable input)
    /// abort the run. Anything that goes wrong for a single pair ends up in
    /// that pair's report only.
    pub async fn run(&self) -> Result<BatchReport> {
        let started = Instant::now();
        tracing::info!("🚀 Starting batch from '{}'", self.config.input_dir());

        let store = TemplateStore::load(self.source.as_ref()).await?;
        let registry = Arc::new(PairingRegistry::build(&store)?);

        let requests: Vec<PortRequest> = registry
            .iter()
            .map(|r| PortRequest::from_override(&r.app_id, self.config.app_override(&r.app_id)))
            .collect();
        let bindings = PortAllocator::new(self.config.base_port())
            .allocate(&requests, self.config.global_bindings())?;

        let job = PairJob {
            registry: Arc::clone(&registry),
            sink: Arc::clone(&self.sink),
            policy: self.config.missing_route_policy(),
            dry_run: self.config.dry_run(),
        };
        let reports = self.process_all(job, bindings).await?;

        let report = BatchReport::new(reports, self.config.dry_run());
        if !self.config.dry_run() {
            self.sink.write_file(DIAGNOSTICS_FILE, &report.to_json()?).await?;
            self.sink.write_file(SUMMARY_FILE, &report.to_csv()?).await?;
        }

        tracing::info!(
            "✅ Batch finished in {:?}: {} instantiated, {} failed",
            started.elapsed(),
            report.totals.instantiated,
            report.totals.failed
        );
        Ok(report)
    }

    async fn process_all(
        &self,
        job: PairJob,
        bindings: Vec<(String, Binding)>,
    ) -> Result<Vec<AppReport>> {
        let workers = self.config.workers().max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        tracing::debug!("Processing {} pair(s) with {} worker(s)", bindings.len(), workers);

        let mut handles = Vec::with_capacity(bindings.len());
        for (app_id, binding) in bindings {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .map_err(|e| PairgenError::WorkerError {
                    message: e.to_string(),
                })?;
            let worker_job = job.clone();
            let worker_id = app_id.clone();
            let worker_binding = binding.clone();
            let handle = tokio::spawn(async move {
                let report = process_pair(&worker_job, &worker_id, worker_binding).await;
                drop(permit);
                report
            });
            handles.push((app_id, binding, handle));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for (app_id, binding, handle) in handles {
            let report = match handle.await {
                Ok(report) => report,
                // 單一 worker 崩潰只算該應用失敗
                Err(e) => {
                    let error = PairgenError::WorkerError {
                        message: format!("{}: {}", app_id, e),
                    };
                    tracing::error!("❌ {}", error);
                    let app_number = job.registry.get(&app_id).map_or(0, |r| r.app_number);
                    AppReport::new(&app_id, app_number, binding).fail(error)
                }
            };
            reports.push(report);
        }
        Ok(reports)
    }
}

async fn process_pair(job: &PairJob, app_id: &str, binding: Binding) -> AppReport {
    let Some(mut record) = job.registry.get(app_id).cloned() else {
        return AppReport::new(app_id, 0, binding).fail("not found in registry");
    };

    let mut report = AppReport::new(&record.app_id, record.app_number, binding.clone());
    report.backend_template = record.backend.as_ref().map(|d| d.file_name.clone());
    report.frontend_template = record.frontend.as_ref().map(|d| d.file_name.clone());

    record.backend_contract = record.backend.as_deref().map(extractor::extract);
    record.frontend_contract = record.frontend.as_deref().map(extractor::extract);

    let diagnostics = checker::collect_diagnostics(&record, &binding, job.policy);
    let verdict = Verdict::from_diagnostics(diagnostics.clone());
    report = report.with_verdict(&verdict, diagnostics);

    if verdict.is_blocking() {
        let error = PairgenError::InconsistentPair {
            app_id: record.app_id.clone(),
            errors: verdict.count(Severity::Error),
        };
        tracing::warn!("⚠️ {}", error);
        record.verdict = Some(verdict);
        return report.fail(error);
    }
    if let Verdict::Warnings(list) = &verdict {
        tracing::warn!("⚠️ {}: {} warning(s)", record.app_id, list.len());
    }
    record.verdict = Some(verdict);

    let finalized = match instantiate_pair(&record, &binding) {
        Ok(finalized) => finalized,
        Err(e) => {
            tracing::error!("❌ {}: {}", record.app_id, e);
            return report.fail(e);
        }
    };

    if !job.dry_run {
        for doc in &finalized.documents {
            if let Err(e) = job.sink.write_file(&doc.file_name, doc.body.as_bytes()).await {
                tracing::error!("❌ {}: writing {} failed: {}", record.app_id, doc.file_name, e);
                return report.fail(e);
            }
        }
    }

    report.outputs = finalized.documents.iter().map(|d| d.file_name.clone()).collect();
    report.instantiated = true;
    tracing::debug!("{}: finalized {:?}", record.app_id, report.outputs);
    report
}
