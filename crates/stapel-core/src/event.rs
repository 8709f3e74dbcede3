// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress events streamed to the client while a batch job runs.

use serde::Serialize;

use crate::error::Result;
use crate::operation::Operation;
use crate::types::{FileReport, FileResult, MergedDocument};

/// What a file is doing at a given checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageLabel {
    Loaded,
    Processing,
    CopyingPages,
    Splitting,
    Compressing,
    Rotating,
    Watermarking,
    Extracting,
    Recognizing,
    Saving,
    Done,
}

/// A discrete lifecycle message on the progress channel.
///
/// Serialised with a `type` tag, e.g.
/// `{"type":"file_progress","fileName":"a.pdf","progress":30,"stageLabel":"processing"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ProgressEvent {
    Start {
        total_files: usize,
        operation: Operation,
    },
    Progress {
        current_file_index: usize,
        total_files: usize,
        file_name: String,
        overall_progress_percent: u8,
    },
    FileProgress {
        file_name: String,
        progress: u8,
        stage_label: StageLabel,
    },
    FileComplete {
        file_name: String,
        success: bool,
        result: Box<FileResult>,
    },
    FileError {
        file_name: String,
        error: String,
    },
    Complete {
        /// Files attempted, whether they succeeded or failed.
        processed_count: usize,
        total_files: usize,
        failed_count: usize,
        results: Vec<FileReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        merged: Option<MergedDocument>,
    },
    Error {
        error: String,
    },
}

impl ProgressEvent {
    /// Wire name of the variant (the `type` tag).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::Progress { .. } => "progress",
            Self::FileProgress { .. } => "file_progress",
            Self::FileComplete { .. } => "file_complete",
            Self::FileError { .. } => "file_error",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }

    /// File the event refers to, if any.
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Progress { file_name, .. }
            | Self::FileProgress { file_name, .. }
            | Self::FileComplete { file_name, .. }
            | Self::FileError { file_name, .. } => Some(file_name),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `round(index / total * 100)`, clamped to 100.
pub fn overall_progress_percent(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    let percent = (index as f64 / total as f64 * 100.0).round();
    percent.clamp(0.0, 100.0) as u8
}
