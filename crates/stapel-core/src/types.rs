// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Stapel batch processor.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StapelError};
use crate::operation::{Operation, OperationConfig};

/// Unique identifier for a batch job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
}

impl InputFile {
    pub fn new(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }

    /// Byte length of the content.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// A job as submitted, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobRequest {
    pub operation: String,
    #[serde(default)]
    pub files: Vec<InputFile>,
    #[serde(default)]
    pub options: serde_json::Value,
}

impl JobRequest {
    pub fn new(operation: impl Into<String>, files: Vec<InputFile>) -> Self {
        Self {
            operation: operation.into(),
            files,
            options: serde_json::Value::Null,
        }
    }

    pub fn with_options(mut self, options: serde_json::Value) -> Self {
        self.options = options;
        self
    }
}

/// A validated batch job.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub config: OperationConfig,
    pub files: Vec<InputFile>,
}

impl Job {
    /// Validate a submission: the file list must be non-empty, the operation
    /// recognised, and the options well-formed for that operation.
    pub fn validate(request: JobRequest) -> Result<Self> {
        if request.files.is_empty() {
            return Err(StapelError::Validation("no files provided".to_string()));
        }
        let operation: Operation = request.operation.parse()?;
        let config = OperationConfig::from_options(operation, &request.options)?;
        Ok(Self {
            id: JobId::new(),
            config,
            files: request.files,
        })
    }

    pub fn operation(&self) -> Operation {
        self.config.operation()
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }
}

/// Lifecycle states of a single file within a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl FileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// One file's unit of work within a job.
///
/// Progress only moves forward and the task settles exactly once; every
/// transition method reports whether it was applied.
#[derive(Debug, Clone)]
pub struct FileTask {
    pub index: usize,
    pub name: String,
    pub size: u64,
    progress: u8,
    status: FileStatus,
    error: Option<String>,
}

impl FileTask {
    pub fn new(index: usize, file: &InputFile) -> Self {
        Self {
            index,
            name: file.name.clone(),
            size: file.size(),
            progress: 0,
            status: FileStatus::Pending,
            error: None,
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn status(&self) -> FileStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Pending → Running.
    pub fn start(&mut self) -> bool {
        if self.status != FileStatus::Pending {
            return false;
        }
        self.status = FileStatus::Running;
        true
    }

    /// Record a checkpoint. Rejects values that are not strictly greater
    /// than the last one, values above 100, and updates after settlement.
    pub fn advance(&mut self, percent: u8) -> bool {
        if self.status.is_terminal() || percent > 100 || percent <= self.progress {
            return false;
        }
        self.progress = percent;
        true
    }

    pub fn succeed(&mut self) -> bool {
        self.settle(FileStatus::Succeeded, None)
    }

    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        self.settle(FileStatus::Failed, Some(error.into()))
    }

    fn settle(&mut self, status: FileStatus, error: Option<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.error = error;
        true
    }
}

/// Axis-aligned box in image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// One line of recognised text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// One sub-document produced by `split`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PagePart {
    pub page_numbers: Vec<u32>,
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    pub size: u64,
}

/// Operation-specific payload of a successful file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged, rename_all_fields = "camelCase")]
pub enum FileOutput {
    /// merge, compress, rotate, watermark.
    Document {
        #[serde(with = "base64_bytes")]
        data: Bytes,
        page_count: usize,
    },
    /// split.
    Pages { pages: Vec<PagePart> },
    /// extract.
    Extracted {
        #[serde(with = "base64_bytes")]
        data: Bytes,
        extracted_pages: Vec<u32>,
        page_count: usize,
    },
    /// ocr.
    Text {
        text: String,
        confidence: f32,
        #[serde(skip_serializing_if = "Option::is_none")]
        lines: Option<Vec<TextLine>>,
    },
}

impl FileOutput {
    /// Size of the primary output, where there is a single one.
    pub fn output_size(&self) -> Option<u64> {
        match self {
            Self::Document { data, .. } | Self::Extracted { data, .. } => Some(data.len() as u64),
            Self::Pages { pages } => Some(pages.iter().map(|p| p.size).sum()),
            Self::Text { .. } => None,
        }
    }
}

/// Result record of a successfully processed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub file_name: String,
    pub original_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_size: Option<u64>,
    pub success: bool,
    #[serde(flatten)]
    pub output: FileOutput,
}

impl FileResult {
    pub fn new(file: &InputFile, output: FileOutput) -> Self {
        Self {
            file_name: file.name.clone(),
            original_size: file.size(),
            new_size: output.output_size(),
            success: true,
            output,
        }
    }
}

/// Record of a file that failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileFailure {
    pub file_name: String,
    pub success: bool,
    pub error: String,
}

impl FileFailure {
    pub fn new(file_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            success: false,
            error: error.into(),
        }
    }
}

/// Per-file entry in the job's final results.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FileReport {
    Succeeded(FileResult),
    Failed(FileFailure),
}

impl FileReport {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn file_name(&self) -> &str {
        match self {
            Self::Succeeded(result) => &result.file_name,
            Self::Failed(failure) => &failure.file_name,
        }
    }
}

/// The combined document attached to a finished `merge` job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedDocument {
    #[serde(with = "base64_bytes")]
    pub data: Bytes,
    pub size: u64,
    pub page_count: usize,
    pub source_files: Vec<String>,
}

/// Base64 (standard alphabet) encoding for binary payloads in JSON.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let encoded = match encoded.split_once(";base64,") {
            // Accept data URLs as well as bare base64.
            Some((_, payload)) => payload,
            None => encoded.as_str(),
        };
        STANDARD
            .decode(encoded.trim())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
