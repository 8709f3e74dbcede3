// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The engine-neutral OCR seam: what a recognizer receives and returns.

use image::DynamicImage;
use stapel_core::TextLine;
use stapel_core::error::StapelError;
use tracing::debug;

/// Per-request OCR settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrRequest {
    /// Language code, e.g. `eng`.
    pub language: String,
    /// Also return per-line text with bounding boxes.
    pub layout: bool,
}

impl Default for OcrRequest {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            layout: false,
        }
    }
}

/// Output of one recognition.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// 0–100.
    pub confidence: f32,
    pub lines: Option<Vec<TextLine>>,
}

/// A synchronous OCR engine.
///
/// Recognition is CPU-bound; callers run it on a blocking thread. The engine
/// reports its own progress (0–100) through `progress`.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(
        &self,
        image: &DynamicImage,
        request: &OcrRequest,
        progress: &dyn Fn(u8),
    ) -> Result<Recognition, StapelError>;
}

/// Decode an uploaded image (PNG, JPEG, TIFF, ...).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, StapelError> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| StapelError::ImageError(format!("failed to decode image: {err}")))?;
    debug!(width = image.width(), height = image.height(), "Image decoded");
    Ok(image)
}
