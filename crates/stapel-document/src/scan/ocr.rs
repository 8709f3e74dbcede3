// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `ocrs` backed recognizer.
//
// # Feature Gate
//
// Only compiled with the `ocr` feature:
//
// ```toml
// stapel-document = { path = "crates/stapel-document", features = ["ocr"] }
// ```
//
// # Model Setup
//
// The engine needs two `.rten` model files in one directory:
//
// - `text-detection.rten` locates text regions.
// - `text-recognition.rten` decodes characters in each region.
//
// Running `ocrs-cli` once downloads both to `~/.cache/ocrs/`, which is the
// default directory.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine as OcrsEngine, OcrEngineParams, TextItem};
use rten::Model;
use stapel_core::error::StapelError;
use stapel_core::{BoundingBox, TextLine};
use tracing::{debug, info, instrument, warn};

use super::recognizer::{OcrRequest, Recognition, Recognizer};

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, falling back to `~/.cache/ocrs`.
fn default_model_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Model locations for an [`OcrsRecognizer`].
#[derive(Debug, Clone)]
pub struct OcrConfig {
    pub detection_model_path: PathBuf,
    pub recognition_model_path: PathBuf,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self::from_dir(default_model_dir())
    }
}

impl OcrConfig {
    /// Expects `dir` to contain `text-detection.rten` and `text-recognition.rten`.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection_model_path: dir.join(DETECTION_MODEL_FILENAME),
            recognition_model_path: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    pub fn validate(&self) -> Result<(), StapelError> {
        for path in [&self.detection_model_path, &self.recognition_model_path] {
            if !path.exists() {
                return Err(StapelError::Ocr(format!(
                    "OCR model not found at {}; run `ocrs-cli` once to download models",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Pure-Rust OCR via `ocrs`.
///
/// Model loading is the expensive step, so build one recognizer and share it.
/// `ocrs` only ships Latin-script models; other language codes are accepted
/// and recognised with the same models.
pub struct OcrsRecognizer {
    engine: OcrsEngine,
}

impl OcrsRecognizer {
    #[instrument(skip_all, fields(
        detection = %config.detection_model_path.display(),
        recognition = %config.recognition_model_path.display(),
    ))]
    pub fn new(config: OcrConfig) -> Result<Self, StapelError> {
        config.validate()?;

        info!("Loading OCR models");
        let detection_model = load_model(&config.detection_model_path)?;
        let recognition_model = load_model(&config.recognition_model_path)?;

        let engine = OcrsEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| StapelError::Ocr(format!("failed to initialise OCR engine: {err}")))?;

        info!("OCR engine initialised");
        Ok(Self { engine })
    }

    pub fn from_model_dir(dir: impl AsRef<Path>) -> Result<Self, StapelError> {
        Self::new(OcrConfig::from_dir(dir))
    }
}

fn load_model(path: &Path) -> Result<Model, StapelError> {
    Model::load_file(path).map_err(|err| {
        StapelError::Ocr(format!("failed to load model from {}: {err}", path.display()))
    })
}

impl Recognizer for OcrsRecognizer {
    fn name(&self) -> &str {
        "ocrs"
    }

    #[instrument(skip_all, fields(width = image.width(), height = image.height(), language = %request.language))]
    fn recognize(
        &self,
        image: &DynamicImage,
        request: &OcrRequest,
        progress: &dyn Fn(u8),
    ) -> Result<Recognition, StapelError> {
        if request.language != "eng" {
            warn!("ocrs has Latin-script models only, recognising anyway");
        }

        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let source = ImageSource::from_bytes(rgb.as_raw(), (width, height)).map_err(|err| {
            StapelError::Ocr(format!("failed to create image source ({width}x{height}): {err}"))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| StapelError::Ocr(format!("OCR preprocessing failed: {err}")))?;
        progress(10);

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| StapelError::Ocr(format!("word detection failed: {err}")))?;
        progress(40);

        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        progress(50);

        let recognised = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| StapelError::Ocr(format!("line recognition failed: {err}")))?;
        progress(90);

        let mut lines = Vec::with_capacity(recognised.len());
        for line in recognised.iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }
            let rect = line.bounding_rect();
            lines.push(TextLine {
                text,
                bbox: Some(BoundingBox {
                    x0: rect.left() as f32,
                    y0: rect.top() as f32,
                    x1: rect.right() as f32,
                    y1: rect.bottom() as f32,
                }),
            });
        }

        // ocrs gives no per-character scores; report the share of detected
        // lines that decoded to text.
        let confidence = if line_rects.is_empty() {
            0.0
        } else {
            (lines.len() as f32 / line_rects.len() as f32 * 100.0).min(100.0)
        };
        let text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        progress(100);

        debug!(lines = lines.len(), chars = text.len(), confidence, "OCR complete");
        Ok(Recognition {
            text,
            confidence,
            lines: request.layout.then_some(lines),
        })
    }
}
