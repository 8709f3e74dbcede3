// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// stapel-pipeline: Asynchronous job execution for Stapel.
//
// A job's files run one after another through the stage pipeline; heavy work
// is admitted through a bounded queue shared by all jobs, and every lifecycle
// step is streamed to the client over a progress channel.

pub mod channel;
pub mod ocr;
pub mod orchestrator;
pub mod queue;
pub mod stage;

#[cfg(test)]
pub(crate) mod fixtures;

pub use channel::{ProgressChannel, ProgressSink, ProgressStream};
pub use ocr::OcrProcessor;
pub use orchestrator::{JobOutcome, JobPhase, JobSummary, Orchestrator};
pub use queue::{BlockingTask, BoundedQueue, QueueTicket};
pub use stage::{ProgressReporter, StageError, StagePipeline};
