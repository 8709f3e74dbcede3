// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer. Owns the shared work queue, the job orchestrator,
// and the storage and analytics backends handed to every request handler.

use std::sync::Arc;

use stapel_core::{AppConfig, JobRequest};
use stapel_pipeline::{BoundedQueue, JobSummary, Orchestrator, ProgressStream, StagePipeline};
use tracing::{info, warn};

use super::analytics::{AnalyticsEvent, AnalyticsSink, MemoryAnalytics};
use super::store::{FileStore, MemoryFileStore};

/// Handler state. Every field is cheaply cloneable.
#[derive(Clone)]
pub struct AppServices {
    config: Arc<AppConfig>,
    orchestrator: Orchestrator,
    store: Arc<dyn FileStore>,
    analytics: Arc<dyn AnalyticsSink>,
}

impl AppServices {
    /// Build the default service set from `config`: one queue bounded by
    /// `max_concurrent_operations`, in-memory storage and analytics, and an
    /// OCR engine when one is compiled in and its models load.
    pub fn init(config: AppConfig) -> Self {
        info!(
            max_concurrent = config.max_concurrent_operations,
            channel_capacity = config.channel_capacity,
            "Initialising app services"
        );

        let queue = BoundedQueue::new(config.max_concurrent_operations);
        let pipeline = attach_ocr(
            StagePipeline::new(queue.clone()).with_file_timeout(config.file_timeout()),
            &queue,
            &config,
        );
        if !pipeline.has_ocr() {
            info!("OCR engine not configured; ocr jobs will fail per file");
        }
        let orchestrator = Orchestrator::new(pipeline, config.channel_capacity);
        let store = Arc::new(MemoryFileStore::with_limits(
            config.public_base_url.clone(),
            config.max_stored_files,
            config.max_stored_bytes,
        ));
        let analytics = Arc::new(MemoryAnalytics::default());

        info!("App services initialised");
        Self::new(config, orchestrator, store, analytics)
    }

    pub fn new(
        config: AppConfig,
        orchestrator: Orchestrator,
        store: Arc<dyn FileStore>,
        analytics: Arc<dyn AnalyticsSink>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            orchestrator,
            store,
            analytics,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn store(&self) -> &dyn FileStore {
        self.store.as_ref()
    }

    pub fn analytics(&self) -> &dyn AnalyticsSink {
        self.analytics.as_ref()
    }

    /// Start `request` on a background task and return its event stream.
    /// The job's outcome is recorded once it finishes.
    pub fn spawn_job(&self, request: JobRequest) -> ProgressStream {
        let (sink, stream) = self.orchestrator.open_channel();
        let services = self.clone();
        tokio::spawn(async move {
            let summary = services.orchestrator.run(request, sink).await;
            services.record_job(&summary).await;
        });
        stream
    }

    /// Run `request` to completion without streaming, then record it.
    pub async fn run_job(&self, request: JobRequest) -> JobSummary {
        let summary = self.orchestrator.run_to_completion(request).await;
        self.record_job(&summary).await;
        summary
    }

    async fn record_job(&self, summary: &JobSummary) {
        let Some(event) = AnalyticsEvent::from_summary(summary) else {
            return;
        };
        if let Err(err) = self.analytics.record_event(event).await {
            warn!(%err, "Failed to record job analytics");
        }
    }
}

#[cfg(feature = "ocr")]
fn attach_ocr(pipeline: StagePipeline, queue: &BoundedQueue, config: &AppConfig) -> StagePipeline {
    use stapel_document::{OcrConfig, OcrsRecognizer};
    use stapel_pipeline::OcrProcessor;

    let recognizer = match &config.ocr_model_dir {
        Some(dir) => OcrsRecognizer::from_model_dir(dir),
        None => OcrsRecognizer::new(OcrConfig::default()),
    };
    match recognizer {
        Ok(recognizer) => {
            info!("OCR engine loaded");
            pipeline.with_ocr(OcrProcessor::new(Arc::new(recognizer), queue.clone()))
        }
        Err(err) => {
            warn!(%err, "OCR engine unavailable");
            pipeline
        }
    }
}

#[cfg(not(feature = "ocr"))]
fn attach_ocr(pipeline: StagePipeline, _queue: &BoundedQueue, config: &AppConfig) -> StagePipeline {
    if let Some(dir) = &config.ocr_model_dir {
        warn!(path = %dir.display(), "OCR model directory set but built without the ocr feature");
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use stapel_core::InputFile;
    use stapel_pipeline::JobOutcome;

    #[tokio::test]
    async fn init_honours_config_limits() {
        let config = AppConfig {
            max_concurrent_operations: 5,
            ..AppConfig::default()
        };
        let services = AppServices::init(config);
        assert_eq!(services.orchestrator().pipeline().queue().max_concurrent(), 5);
        assert_eq!(services.config().port, 8080);
    }

    #[tokio::test]
    async fn finished_jobs_are_recorded() {
        let services = AppServices::init(AppConfig::default());
        let summary = services
            .run_job(JobRequest::new(
                "compress",
                vec![InputFile::new("broken.pdf", b"this is not a pdf".to_vec())],
            ))
            .await;
        assert_eq!(summary.outcome, JobOutcome::Completed);
        assert_eq!(summary.failed_count, 1);

        let events = services.analytics().events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event, "job_completed");
        assert_eq!(events[0].properties["operation"], "compress");
    }

    #[tokio::test]
    async fn rejected_jobs_are_not_recorded() {
        let services = AppServices::init(AppConfig::default());
        let summary = services.run_job(JobRequest::new("compress", Vec::new())).await;
        assert_eq!(summary.outcome, JobOutcome::Rejected);
        assert!(services.analytics().events().await.unwrap().is_empty());
    }
}
