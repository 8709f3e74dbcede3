// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-file stage pipeline: runs one operation against one file and reports
// checkpointed progress.
//
// Checkpoints for every operation:
//
//   10 loaded → 30 processing → 31..89 operation stage → 90 saving → 100 done
//
// The transform itself runs on a blocking thread admitted through the shared
// `BoundedQueue`. Every checkpoint yields to the scheduler so the event it
// produced is flushed before the next chunk of work starts. The per-file
// timeout covers the transform from the moment the queue admits it.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use stapel_core::error::StapelError;
use stapel_core::{FileOutput, FileResult, InputFile, OperationConfig, PagePart, StageLabel};
use stapel_document::{OcrRequest, PdfEditor, PdfReader, Watermark};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::ocr::OcrProcessor;
use crate::queue::{BlockingTask, BoundedQueue};

const LOADED: u8 = 10;
const PROCESSING: u8 = 30;
const SAVING: u8 = 90;
const DONE: u8 = 100;

/// Receives a file's checkpoints.
#[async_trait]
pub trait ProgressReporter: Send {
    /// Fails with [`StapelError::ChannelClosed`] when nobody is listening.
    async fn report(&mut self, percent: u8, stage: StageLabel) -> stapel_core::Result<()>;
}

/// Why one file's pipeline stopped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("{0}")]
    Processing(String),

    /// The progress consumer went away; the job should stop.
    #[error("cancelled: progress channel closed")]
    Cancelled,
}

impl From<StapelError> for StageError {
    fn from(err: StapelError) -> Self {
        match err {
            StapelError::ChannelClosed => Self::Cancelled,
            StapelError::UnsupportedOperation(op) => Self::UnsupportedOperation(op),
            other => Self::Processing(other.to_string()),
        }
    }
}

/// Executes operations on single files.
///
/// Clones share the queue and the OCR engine.
#[derive(Debug, Clone)]
pub struct StagePipeline {
    queue: BoundedQueue,
    ocr: Option<OcrProcessor>,
    file_timeout: Option<Duration>,
}

impl StagePipeline {
    pub fn new(queue: BoundedQueue) -> Self {
        Self {
            queue,
            ocr: None,
            file_timeout: None,
        }
    }

    pub fn with_ocr(mut self, ocr: OcrProcessor) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Give up on a file whose queued work runs longer than `timeout`.
    pub fn with_file_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.file_timeout = timeout;
        self
    }

    pub fn queue(&self) -> &BoundedQueue {
        &self.queue
    }

    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Run `config` against `file`.
    ///
    /// Checkpoints are reported through `reporter` in strictly increasing
    /// order, ending at 100 on success.
    #[instrument(skip_all, fields(file = %file.name, operation = %config.operation()))]
    pub async fn execute(
        &self,
        file: &InputFile,
        config: &OperationConfig,
        reporter: &mut dyn ProgressReporter,
    ) -> Result<FileResult, StageError> {
        let mut checkpoints = Checkpoints::new(reporter, self.file_timeout);
        checkpoints.mark(LOADED, StageLabel::Loaded).await?;
        checkpoints.mark(PROCESSING, StageLabel::Processing).await?;

        let data = file.data.clone();
        let output = match config {
            OperationConfig::Merge {} => {
                let task = self.queue.submit_blocking(move |progress| {
                    let reader = PdfReader::from_bytes(&data)?;
                    progress(50);
                    let rebuilt = reader.rebuild()?;
                    Ok(FileOutput::Document {
                        data: rebuilt.into(),
                        page_count: reader.page_count(),
                    })
                });
                checkpoints.drain(task, StageLabel::CopyingPages).await?
            }
            OperationConfig::Split { ranges } => {
                let ranges = ranges.clone();
                let task = self.queue.submit_blocking(move |progress| {
                    let reader = PdfReader::from_bytes(&data)?;
                    let on_part = |done: usize, total: usize| progress(fraction(done, total));
                    let parts = match &ranges {
                        Some(ranges) => reader.split_ranges(ranges, on_part)?,
                        None => reader.split_pages(on_part)?,
                    };
                    Ok(FileOutput::Pages {
                        pages: parts
                            .into_iter()
                            .map(|(page_numbers, bytes)| PagePart {
                                page_numbers,
                                size: bytes.len() as u64,
                                data: bytes.into(),
                            })
                            .collect(),
                    })
                });
                checkpoints.drain(task, StageLabel::Splitting).await?
            }
            OperationConfig::Compress {} => {
                let task = self.queue.submit_blocking(move |progress| {
                    let editor = PdfEditor::from_bytes(&data)?;
                    let page_count = editor.page_count();
                    progress(30);
                    let compressed = editor.compress()?.map(Bytes::from);
                    Ok(FileOutput::Document {
                        data: compressed.unwrap_or(data),
                        page_count,
                    })
                });
                checkpoints.drain(task, StageLabel::Compressing).await?
            }
            OperationConfig::Rotate { degrees, pages } => {
                let (degrees, pages) = (*degrees, pages.clone());
                let task = self.queue.submit_blocking(move |progress| {
                    let reader = PdfReader::from_bytes(&data)?;
                    progress(40);
                    let rotated = reader.rotate_pages(degrees, pages.as_deref())?;
                    Ok(FileOutput::Document {
                        data: rotated.into(),
                        page_count: reader.page_count(),
                    })
                });
                checkpoints.drain(task, StageLabel::Rotating).await?
            }
            OperationConfig::Watermark {
                text,
                opacity,
                font_size,
            } => {
                let watermark = Watermark {
                    text: text.clone(),
                    opacity: *opacity,
                    font_size: *font_size,
                };
                let task = self.queue.submit_blocking(move |progress| {
                    let editor = PdfEditor::from_bytes(&data)?;
                    let page_count = editor.page_count();
                    progress(30);
                    let stamped = editor.watermark(&watermark)?;
                    Ok(FileOutput::Document {
                        data: stamped.into(),
                        page_count,
                    })
                });
                checkpoints.drain(task, StageLabel::Watermarking).await?
            }
            OperationConfig::Extract { page_numbers } => {
                let page_numbers = page_numbers.clone();
                let task = self.queue.submit_blocking(move |progress| {
                    let reader = PdfReader::from_bytes(&data)?;
                    progress(40);
                    let extracted = reader.extract_pages(&page_numbers)?;
                    let mut kept = Vec::with_capacity(page_numbers.len());
                    for number in page_numbers {
                        if !kept.contains(&number) {
                            kept.push(number);
                        }
                    }
                    Ok(FileOutput::Extracted {
                        data: extracted.into(),
                        page_count: kept.len(),
                        extracted_pages: kept,
                    })
                });
                checkpoints.drain(task, StageLabel::Extracting).await?
            }
            OperationConfig::Ocr { language, layout } => {
                let Some(ocr) = &self.ocr else {
                    return Err(StageError::Processing(
                        "no OCR engine configured".to_string(),
                    ));
                };
                let request = OcrRequest {
                    language: language.clone(),
                    layout: *layout,
                };
                let task = ocr.submit(data, request);
                let recognition = checkpoints.drain(task, StageLabel::Recognizing).await?;
                FileOutput::Text {
                    text: recognition.text,
                    confidence: recognition.confidence,
                    lines: recognition.lines,
                }
            }
        };

        checkpoints.mark(SAVING, StageLabel::Saving).await?;
        let result = FileResult::new(file, output);
        checkpoints.mark(DONE, StageLabel::Done).await?;
        debug!(new_size = ?result.new_size, "File processed");
        Ok(result)
    }
}

/// Enforces strictly increasing checkpoints and yields after each one.
struct Checkpoints<'r> {
    reporter: &'r mut dyn ProgressReporter,
    last: u8,
    limit: Option<Duration>,
}

impl<'r> Checkpoints<'r> {
    fn new(reporter: &'r mut dyn ProgressReporter, limit: Option<Duration>) -> Self {
        Self {
            reporter,
            last: 0,
            limit,
        }
    }

    async fn mark(&mut self, percent: u8, stage: StageLabel) -> Result<(), StageError> {
        if percent <= self.last || percent > DONE {
            return Ok(());
        }
        self.last = percent;
        self.reporter.report(percent, stage).await?;
        tokio::task::yield_now().await;
        Ok(())
    }

    /// Wait for the task's queue slot, then forward its progress into the
    /// operation stage and take its result.
    ///
    /// The file timeout starts at admission. Time spent in the backlog
    /// behind other jobs does not count against it.
    async fn drain<T>(&mut self, mut task: BlockingTask<T>, stage: StageLabel) -> Result<T, StageError> {
        task.admitted().await;
        let Some(limit) = self.limit else {
            return self.forward(task, stage).await;
        };
        match tokio::time::timeout(limit, self.forward(task, stage)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(?limit, "File timed out");
                Err(StapelError::Timeout(limit).into())
            }
        }
    }

    async fn forward<T>(&mut self, mut task: BlockingTask<T>, stage: StageLabel) -> Result<T, StageError> {
        while let Some(fraction) = task.next_progress().await {
            self.mark(stage_percent(fraction), stage).await?;
        }
        Ok(task.finish().await?)
    }
}

/// Map 0–100 of an operation's own work into the 30..90 band, staying below
/// the saving checkpoint.
fn stage_percent(fraction: u8) -> u8 {
    let span = u16::from(SAVING - PROCESSING - 1);
    PROCESSING + (u16::from(fraction.min(100)) * span / 100) as u8
}

fn fraction(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (done.min(total) * 100 / total) as u8
}
