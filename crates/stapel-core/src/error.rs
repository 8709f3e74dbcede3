// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Stapel.

use std::time::Duration;

use thiserror::Error;

/// Top-level error type for all Stapel operations.
#[derive(Debug, Error)]
pub enum StapelError {
    // -- Job submission --
    #[error("invalid job: {0}")]
    Validation(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    // -- Per-file processing --
    #[error("processing failed: {0}")]
    Processing(String),

    #[error("PDF operation failed: {0}")]
    Pdf(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    // -- Streaming / scheduling --
    #[error("progress channel closed by consumer")]
    ChannelClosed,

    #[error("queued task was aborted before settling")]
    TaskAborted,

    // -- Storage / persistence --
    #[error("storage error: {0}")]
    Storage(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StapelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_keeps_sub_second_limits() {
        assert_eq!(
            StapelError::Timeout(Duration::from_secs(12)).to_string(),
            "timed out after 12s"
        );
        assert_eq!(
            StapelError::Timeout(Duration::from_millis(200)).to_string(),
            "timed out after 200ms"
        );
    }
}
