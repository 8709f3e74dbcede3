// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch orchestrator: drives a job from submission to `complete`, one file
// at a time, isolating per-file failures.

use async_trait::async_trait;
use futures::StreamExt;
use stapel_core::error::StapelError;
use stapel_core::event::overall_progress_percent;
use stapel_core::{
    FileFailure, FileOutput, FileReport, FileResult, FileTask, Job, JobId, JobRequest,
    MergedDocument, Operation, OperationConfig, ProgressEvent, StageLabel,
};
use stapel_document::PdfReader;
use tracing::{debug, info, instrument, warn};

use crate::channel::{ProgressChannel, ProgressSink, ProgressStream};
use crate::stage::{ProgressReporter, StageError, StagePipeline};

/// Channel capacity used by [`Orchestrator::default`].
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Created,
    Started,
    ProcessingFile(usize),
    Completed,
    Failed,
}

impl JobPhase {
    /// Whether `self → next` is a legal transition.
    pub fn can_advance_to(self, next: JobPhase) -> bool {
        use JobPhase::*;
        match (self, next) {
            (Created, Started) | (Created, Failed) | (Started, Failed) => true,
            (Started, ProcessingFile(0)) | (Started, Completed) => true,
            (ProcessingFile(current), ProcessingFile(following)) => following == current + 1,
            (ProcessingFile(_), Completed) | (ProcessingFile(_), Failed) => true,
            _ => false,
        }
    }

    /// Move to `next` if the transition is legal, otherwise stay put.
    fn advance(&mut self, next: JobPhase) {
        if self.can_advance_to(next) {
            debug!(from = ?self, to = ?next, "Job phase");
            *self = next;
        } else {
            warn!(from = ?self, to = ?next, "Ignoring illegal job phase transition");
        }
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// Every file was attempted and `complete` was emitted.
    Completed,
    /// The consumer went away; remaining files were abandoned.
    Cancelled,
    /// Validation failed; only an `error` event was emitted.
    Rejected,
}

/// What happened to a job, for callers that need more than the stream.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub job_id: Option<JobId>,
    pub operation: Option<Operation>,
    pub outcome: JobOutcome,
    /// Phase the job ended in. `Failed` for rejected and cancelled jobs.
    pub phase: JobPhase,
    pub total_files: usize,
    /// Files attempted, successful or not.
    pub processed_count: usize,
    pub failed_count: usize,
    pub results: Vec<FileReport>,
    pub merged: Option<MergedDocument>,
    /// Validation message for a rejected job.
    pub error: Option<String>,
}

impl JobSummary {
    fn rejected(err: &StapelError, total_files: usize) -> Self {
        let mut phase = JobPhase::Created;
        phase.advance(JobPhase::Failed);
        Self {
            job_id: None,
            operation: None,
            outcome: JobOutcome::Rejected,
            phase,
            total_files,
            processed_count: 0,
            failed_count: 0,
            results: Vec::new(),
            merged: None,
            error: Some(err.to_string()),
        }
    }
}

/// Mutable state of a running job.
struct JobRun {
    phase: JobPhase,
    tasks: Vec<FileTask>,
    results: Vec<FileReport>,
    merged: Option<MergedDocument>,
}

impl JobRun {
    fn new(job: &Job) -> Self {
        Self {
            phase: JobPhase::Created,
            tasks: job
                .files
                .iter()
                .enumerate()
                .map(|(index, file)| FileTask::new(index, file))
                .collect(),
            results: Vec::with_capacity(job.total_files()),
            merged: None,
        }
    }

    fn advance(&mut self, next: JobPhase) {
        self.phase.advance(next);
    }

    fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }

    fn into_summary(self, job: &Job, outcome: JobOutcome) -> JobSummary {
        let failed_count = self.failed_count();
        JobSummary {
            job_id: Some(job.id),
            operation: Some(job.operation()),
            outcome,
            phase: self.phase,
            total_files: job.total_files(),
            processed_count: self.results.len(),
            failed_count,
            results: self.results,
            merged: self.merged,
            error: None,
        }
    }
}

/// Emits a file's checkpoints as `file_progress` events.
struct FileReporter<'a> {
    sink: &'a ProgressSink,
    task: &'a mut FileTask,
}

#[async_trait]
impl ProgressReporter for FileReporter<'_> {
    async fn report(&mut self, percent: u8, stage: StageLabel) -> stapel_core::Result<()> {
        if !self.task.advance(percent) {
            return Ok(());
        }
        self.sink
            .emit(ProgressEvent::FileProgress {
                file_name: self.task.name.clone(),
                progress: percent,
                stage_label: stage,
            })
            .await
    }
}

/// Runs batch jobs against a shared [`StagePipeline`].
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pipeline: StagePipeline,
    channel_capacity: usize,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(StagePipeline::new(Default::default()), DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Orchestrator {
    pub fn new(pipeline: StagePipeline, channel_capacity: usize) -> Self {
        Self {
            pipeline,
            channel_capacity: channel_capacity.max(1),
        }
    }

    pub fn pipeline(&self) -> &StagePipeline {
        &self.pipeline
    }

    pub fn open_channel(&self) -> (ProgressSink, ProgressStream) {
        ProgressChannel::open(self.channel_capacity)
    }

    /// Start the job on a background task and return its event stream.
    pub fn spawn(&self, request: JobRequest) -> ProgressStream {
        let (sink, stream) = self.open_channel();
        let orchestrator = self.clone();
        tokio::spawn(async move {
            orchestrator.run(request, sink).await;
        });
        stream
    }

    /// Run the job while discarding events, and return its summary.
    pub async fn run_to_completion(&self, request: JobRequest) -> JobSummary {
        let (sink, mut stream) = self.open_channel();
        let drain = async { while stream.next().await.is_some() {} };
        let (summary, ()) = tokio::join!(self.run(request, sink), drain);
        summary
    }

    /// Run the job, emitting every event into `sink`, and close it.
    #[instrument(skip_all, fields(operation = %request.operation, files = request.files.len()))]
    pub async fn run(&self, request: JobRequest, mut sink: ProgressSink) -> JobSummary {
        let total_files = request.files.len();
        let job = match Job::validate(request) {
            Ok(job) => job,
            Err(err) => {
                warn!(%err, "Job rejected");
                // A vanished consumer has nothing to be told.
                let _ = sink
                    .emit(ProgressEvent::Error {
                        error: err.to_string(),
                    })
                    .await;
                sink.close();
                return JobSummary::rejected(&err, total_files);
            }
        };

        info!(job_id = %job.id, operation = %job.operation(), files = job.total_files(), "Job started");
        let mut run = JobRun::new(&job);
        let outcome = match self.drive(&job, &sink, &mut run).await {
            Ok(()) => JobOutcome::Completed,
            Err(err) => {
                info!(job_id = %job.id, processed = run.results.len(), %err, "Job cancelled");
                // A consumer lost while `complete` is sent still saw every file.
                if run.phase != JobPhase::Completed {
                    run.advance(JobPhase::Failed);
                }
                JobOutcome::Cancelled
            }
        };
        sink.close();

        let summary = run.into_summary(&job, outcome);
        info!(
            job_id = %job.id,
            outcome = ?summary.outcome,
            phase = ?summary.phase,
            processed = summary.processed_count,
            failed = summary.failed_count,
            "Job finished"
        );
        summary
    }

    /// Only fails with [`StapelError::ChannelClosed`].
    async fn drive(&self, job: &Job, sink: &ProgressSink, run: &mut JobRun) -> stapel_core::Result<()> {
        let total_files = job.total_files();
        sink.emit(ProgressEvent::Start {
            total_files,
            operation: job.operation(),
        })
        .await?;
        run.advance(JobPhase::Started);

        for (index, file) in job.files.iter().enumerate() {
            run.advance(JobPhase::ProcessingFile(index));
            sink.emit(ProgressEvent::Progress {
                current_file_index: index,
                total_files,
                file_name: file.name.clone(),
                overall_progress_percent: overall_progress_percent(index, total_files),
            })
            .await?;

            run.tasks[index].start();
            let outcome = {
                let mut reporter = FileReporter {
                    sink,
                    task: &mut run.tasks[index],
                };
                self.pipeline.execute(file, &job.config, &mut reporter).await
            };

            match outcome {
                Ok(result) => {
                    run.tasks[index].succeed();
                    sink.emit(ProgressEvent::FileComplete {
                        file_name: file.name.clone(),
                        success: true,
                        result: Box::new(result.clone()),
                    })
                    .await?;
                    run.results.push(FileReport::Succeeded(result));
                }
                Err(StageError::Cancelled) => return Err(StapelError::ChannelClosed),
                Err(err) => {
                    let message = err.to_string();
                    warn!(file = %file.name, error = %message, "File failed");
                    run.tasks[index].fail(message.clone());
                    run.results
                        .push(FileReport::Failed(FileFailure::new(&file.name, &message)));
                    sink.emit(ProgressEvent::FileError {
                        file_name: file.name.clone(),
                        error: message,
                    })
                    .await?;
                }
            }
        }

        if matches!(job.config, OperationConfig::Merge {}) {
            run.merged = self.combine(&run.results).await;
        }

        run.advance(JobPhase::Completed);
        sink.emit(ProgressEvent::Complete {
            processed_count: run.results.len(),
            total_files,
            failed_count: run.failed_count(),
            results: run.results.clone(),
            merged: run.merged.clone(),
        })
        .await
    }

    /// Concatenate the successful outputs of a merge job, in file order.
    async fn combine(&self, results: &[FileReport]) -> Option<MergedDocument> {
        let (source_files, documents): (Vec<String>, Vec<_>) = results
            .iter()
            .filter_map(|report| match report {
                FileReport::Succeeded(FileResult {
                    file_name,
                    output: FileOutput::Document { data, .. },
                    ..
                }) => Some((file_name.clone(), data.clone())),
                _ => None,
            })
            .unzip();
        if documents.is_empty() {
            return None;
        }

        let task = self.pipeline.queue().submit_blocking(move |_| {
            let slices: Vec<&[u8]> = documents.iter().map(|d| d.as_ref()).collect();
            PdfReader::merge(&slices)
        });
        match task.finish().await {
            Ok((bytes, page_count)) => Some(MergedDocument {
                size: bytes.len() as u64,
                data: bytes.into(),
                page_count,
                source_files,
            }),
            Err(err) => {
                warn!(%err, "Could not combine merge outputs");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{FakeRecognizer, png_image, sample_pdf};
    use crate::ocr::OcrProcessor;
    use crate::queue::BoundedQueue;
    use serde_json::json;
    use stapel_core::InputFile;
    use std::sync::Arc;

    fn orchestrator() -> Orchestrator {
        let queue = BoundedQueue::new(2);
        let ocr = OcrProcessor::new(Arc::new(FakeRecognizer::default()), queue.clone());
        Orchestrator::new(StagePipeline::new(queue).with_ocr(ocr), 16)
    }

    fn pdfs(names: &[&str]) -> Vec<InputFile> {
        names
            .iter()
            .map(|name| InputFile::new(*name, sample_pdf(2)))
            .collect()
    }

    async fn events_for(request: JobRequest) -> Vec<ProgressEvent> {
        orchestrator().spawn(request).collect().await
    }

    fn kinds(events: &[ProgressEvent]) -> Vec<&'static str> {
        events.iter().map(ProgressEvent::kind).collect()
    }

    /// `file_progress` percentages reported for `name`.
    fn file_progress_of(events: &[ProgressEvent], name: &str) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::FileProgress {
                    file_name, progress, ..
                } if file_name == name => Some(*progress),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn phase_transitions() {
        use JobPhase::*;
        assert!(Created.can_advance_to(Started));
        assert!(Created.can_advance_to(Failed));
        assert!(Started.can_advance_to(ProcessingFile(0)));
        assert!(ProcessingFile(0).can_advance_to(ProcessingFile(1)));
        assert!(!ProcessingFile(0).can_advance_to(ProcessingFile(2)));
        assert!(ProcessingFile(2).can_advance_to(Completed));
        assert!(ProcessingFile(1).can_advance_to(Failed));
        assert!(!Completed.can_advance_to(Started));
        assert!(!Completed.can_advance_to(Failed));
        assert!(!Created.can_advance_to(Completed));
    }

    #[tokio::test]
    async fn merge_of_three_files() {
        let events = events_for(JobRequest::new("merge", pdfs(&["a.pdf", "b.pdf", "c.pdf"]))).await;

        assert_eq!(
            events.first(),
            Some(&ProgressEvent::Start {
                total_files: 3,
                operation: Operation::Merge
            })
        );
        assert_eq!(kinds(&events).iter().filter(|k| **k == "start").count(), 1);
        assert_eq!(kinds(&events).iter().filter(|k| **k == "file_complete").count(), 3);

        let ProgressEvent::Complete {
            processed_count,
            total_files,
            failed_count,
            results,
            merged,
        } = events.last().unwrap()
        else {
            panic!("last event should be complete: {:?}", events.last());
        };
        assert_eq!((*processed_count, *total_files, *failed_count), (3, 3, 0));
        assert!(results.iter().all(FileReport::is_success));
        let merged = merged.as_ref().expect("merge job carries the merged document");
        assert_eq!(merged.page_count, 6);
        assert_eq!(merged.source_files, vec!["a.pdf", "b.pdf", "c.pdf"]);
    }

    #[tokio::test]
    async fn file_groups_follow_submission_order() {
        let names = ["one.pdf", "two.pdf", "three.pdf"];
        let events = events_for(JobRequest::new("rotate", pdfs(&names))).await;

        let order: Vec<&str> = events.iter().filter_map(ProgressEvent::file_name).collect();
        let mut groups: Vec<&str> = order.clone();
        groups.dedup();
        assert_eq!(groups, names.to_vec(), "events interleaved: {order:?}");

        let overall: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Progress {
                    overall_progress_percent,
                    ..
                } => Some(*overall_progress_percent),
                _ => None,
            })
            .collect();
        assert_eq!(overall, vec![0, 33, 67]);
        assert_eq!(events.last().map(ProgressEvent::kind), Some("complete"));
    }

    #[tokio::test]
    async fn per_file_progress_is_strictly_increasing() {
        let events = events_for(
            JobRequest::new("watermark", pdfs(&["a.pdf", "b.pdf"]))
                .with_options(json!({ "text": "CONFIDENTIAL" })),
        )
        .await;
        for name in ["a.pdf", "b.pdf"] {
            let progress = file_progress_of(&events, name);
            assert!(progress.windows(2).all(|w| w[0] < w[1]), "{progress:?}");
            assert_eq!(progress.last(), Some(&100));
        }
    }

    #[tokio::test]
    async fn failing_file_does_not_stop_the_batch() {
        let mut files = pdfs(&["a.pdf"]);
        files.push(InputFile::new("broken.pdf", b"this is not a pdf".to_vec()));
        files.extend(pdfs(&["c.pdf"]));
        let events = events_for(JobRequest::new("compress", files)).await;

        assert_eq!(
            kinds(&events)
                .into_iter()
                .filter(|k| k.starts_with("file_") && *k != "file_progress")
                .collect::<Vec<_>>(),
            vec!["file_complete", "file_error", "file_complete"]
        );
        let Some(ProgressEvent::Complete {
            processed_count,
            failed_count,
            results,
            merged,
            ..
        }) = events.last()
        else {
            panic!("missing complete");
        };
        assert_eq!((*processed_count, *failed_count), (3, 1));
        assert_eq!(results[1].file_name(), "broken.pdf");
        assert!(!results[1].is_success());
        assert!(merged.is_none());
    }

    #[tokio::test]
    async fn ocr_with_corrupt_second_file() {
        let files = vec![
            InputFile::new("page1.png", png_image()),
            InputFile::new("page2.png", b"corrupted".to_vec()),
        ];
        let events = events_for(JobRequest::new("ocr", files)).await;

        let completes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::FileComplete {
                    file_name, success, ..
                } => Some((file_name.as_str(), *success)),
                _ => None,
            })
            .collect();
        assert_eq!(completes, vec![("page1.png", true)]);

        let errors: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::FileError { file_name, error } => Some((file_name.as_str(), error)),
                _ => None,
            })
            .collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "page2.png");
        assert!(!errors[0].1.is_empty());

        assert!(matches!(
            events.last(),
            Some(ProgressEvent::Complete {
                processed_count: 2,
                total_files: 2,
                failed_count: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unknown_operation_is_single_error() {
        let events = events_for(JobRequest::new("bogus", pdfs(&["a.pdf"]))).await;
        assert_eq!(kinds(&events), vec!["error"]);
    }

    #[tokio::test]
    async fn empty_file_list_is_single_error() {
        let events = events_for(JobRequest::new("merge", vec![])).await;
        assert_eq!(
            events,
            vec![ProgressEvent::Error {
                error: "invalid job: no files provided".into()
            }]
        );
    }

    #[tokio::test]
    async fn invalid_options_rejected_before_start() {
        let summary = orchestrator()
            .run_to_completion(
                JobRequest::new("rotate", pdfs(&["a.pdf"])).with_options(json!({ "degrees": 45 })),
            )
            .await;
        assert_eq!(summary.outcome, JobOutcome::Rejected);
        assert_eq!(summary.phase, JobPhase::Failed);
        assert!(summary.error.unwrap().contains("multiple of 90"));
        assert_eq!(summary.processed_count, 0);
    }

    #[tokio::test]
    async fn run_to_completion_summarises() {
        let summary = orchestrator()
            .run_to_completion(
                JobRequest::new("extract", pdfs(&["a.pdf", "b.pdf"]))
                    .with_options(json!({ "pageNumbers": [2] })),
            )
            .await;
        assert_eq!(summary.outcome, JobOutcome::Completed);
        assert_eq!(summary.phase, JobPhase::Completed);
        assert_eq!(summary.operation, Some(Operation::Extract));
        assert_eq!(summary.processed_count, 2);
        assert_eq!(summary.failed_count, 0);
        assert!(summary.job_id.is_some());
    }

    #[tokio::test]
    async fn dropped_stream_cancels_remaining_files() {
        let orchestrator = Orchestrator::new(StagePipeline::new(BoundedQueue::new(1)), 1);
        let (sink, mut stream) = orchestrator.open_channel();
        let request = JobRequest::new("split", pdfs(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]));

        let job = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(request, sink).await })
        };
        assert_eq!(stream.recv().await.map(|e| e.kind()), Some("start"));
        drop(stream);

        let summary = job.await.unwrap();
        assert_eq!(summary.outcome, JobOutcome::Cancelled);
        assert_eq!(summary.phase, JobPhase::Failed);
        assert!(summary.processed_count < 4, "{summary:?}");
    }

    #[tokio::test]
    async fn dropped_stream_stops_before_the_next_file() {
        let recognizer = FakeRecognizer::default();
        let calls = Arc::clone(&recognizer.calls);
        let queue = BoundedQueue::new(1);
        let ocr = OcrProcessor::new(Arc::new(recognizer), queue.clone());
        let orchestrator = Orchestrator::new(StagePipeline::new(queue).with_ocr(ocr), 1);

        let files: Vec<InputFile> = ["p1.png", "p2.png", "p3.png", "p4.png"]
            .into_iter()
            .map(|name| InputFile::new(name, png_image()))
            .collect();
        let (sink, mut stream) = orchestrator.open_channel();
        let job = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move { orchestrator.run(JobRequest::new("ocr", files), sink).await })
        };

        // Wait until the engine is working on the first image.
        while let Some(event) = stream.recv().await {
            if let ProgressEvent::FileProgress {
                file_name,
                stage_label: StageLabel::Recognizing,
                ..
            } = &event
            {
                assert_eq!(file_name, "p1.png");
                break;
            }
        }
        drop(stream);

        let summary = job.await.unwrap();
        assert_eq!(summary.outcome, JobOutcome::Cancelled);
        assert_eq!(summary.processed_count, 0, "{summary:?}");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
