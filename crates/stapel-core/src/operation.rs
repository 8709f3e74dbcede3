// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch operations and their typed, validated option sets.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StapelError};

/// The operations a batch job can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Merge,
    Split,
    Compress,
    Rotate,
    Watermark,
    Extract,
    Ocr,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Self::Merge,
        Self::Split,
        Self::Compress,
        Self::Rotate,
        Self::Watermark,
        Self::Extract,
        Self::Ocr,
    ];

    /// Wire name, as accepted in the `operation` form field.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merge => "merge",
            Self::Split => "split",
            Self::Compress => "compress",
            Self::Rotate => "rotate",
            Self::Watermark => "watermark",
            Self::Extract => "extract",
            Self::Ocr => "ocr",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = StapelError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| StapelError::UnsupportedOperation(s.to_string()))
    }
}

/// Inclusive, 1-indexed page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

fn default_rotation() -> i32 {
    90
}

fn default_opacity() -> f32 {
    0.3
}

fn default_font_size() -> f32 {
    48.0
}

fn default_language() -> String {
    "eng".to_string()
}

/// Operation plus its options, validated before any file is touched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum OperationConfig {
    /// Rebuild each document's page tree, then concatenate all successful
    /// outputs into one document at the end of the job.
    Merge {},
    /// One sub-document per page, or one per range when `ranges` is given.
    Split {
        #[serde(default)]
        ranges: Option<Vec<PageRange>>,
    },
    /// Drop unreferenced objects and deflate uncompressed streams.
    Compress {},
    Rotate {
        #[serde(default = "default_rotation")]
        degrees: i32,
        /// Pages to rotate; all pages when absent.
        #[serde(default)]
        pages: Option<Vec<u32>>,
    },
    Watermark {
        text: String,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default = "default_font_size")]
        font_size: f32,
    },
    Extract {
        page_numbers: Vec<u32>,
    },
    Ocr {
        #[serde(default = "default_language")]
        language: String,
        /// Return per-line text with bounding boxes as well as full text.
        #[serde(default)]
        layout: bool,
    },
}

impl OperationConfig {
    /// Build a config from an operation and its loosely typed JSON options.
    ///
    /// `options` may be `null` or an object. Any `kind` key inside it is
    /// overwritten by `operation`.
    pub fn from_options(operation: Operation, options: &serde_json::Value) -> Result<Self> {
        let mut object = match options {
            serde_json::Value::Null => serde_json::Map::new(),
            serde_json::Value::Object(map) => map.clone(),
            other => {
                return Err(StapelError::Validation(format!(
                    "options must be a JSON object, got {other}"
                )));
            }
        };
        object.insert(
            "kind".to_string(),
            serde_json::Value::String(operation.as_str().to_string()),
        );

        let config: Self = serde_json::from_value(serde_json::Value::Object(object))
            .map_err(|e| StapelError::Validation(format!("invalid {operation} options: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn operation(&self) -> Operation {
        match self {
            Self::Merge {} => Operation::Merge,
            Self::Split { .. } => Operation::Split,
            Self::Compress {} => Operation::Compress,
            Self::Rotate { .. } => Operation::Rotate,
            Self::Watermark { .. } => Operation::Watermark,
            Self::Extract { .. } => Operation::Extract,
            Self::Ocr { .. } => Operation::Ocr,
        }
    }

    /// Check value constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Merge {} | Self::Compress {} => Ok(()),
            Self::Split { ranges } => {
                if let Some(ranges) = ranges {
                    if ranges.is_empty() {
                        return Err(invalid("split ranges must not be empty"));
                    }
                    for range in ranges {
                        if range.start == 0 || range.end < range.start {
                            return Err(invalid(format!(
                                "split range {}-{} is not a valid 1-indexed range",
                                range.start, range.end
                            )));
                        }
                    }
                }
                Ok(())
            }
            Self::Rotate { degrees, pages } => {
                if degrees % 90 != 0 {
                    return Err(invalid(format!(
                        "rotation must be a multiple of 90, got {degrees}"
                    )));
                }
                if let Some(pages) = pages
                    && (pages.is_empty() || pages.contains(&0))
                {
                    return Err(invalid("rotate pages must be non-empty and 1-indexed"));
                }
                Ok(())
            }
            Self::Watermark {
                text,
                opacity,
                font_size,
            } => {
                if text.trim().is_empty() {
                    return Err(invalid("watermark text must not be empty"));
                }
                if !(*opacity > 0.0 && *opacity <= 1.0) {
                    return Err(invalid(format!(
                        "watermark opacity must be in (0, 1], got {opacity}"
                    )));
                }
                if !(*font_size > 0.0 && font_size.is_finite()) {
                    return Err(invalid(format!(
                        "watermark font size must be positive, got {font_size}"
                    )));
                }
                Ok(())
            }
            Self::Extract { page_numbers } => {
                if page_numbers.is_empty() {
                    return Err(invalid("extract needs at least one page number"));
                }
                if page_numbers.contains(&0) {
                    return Err(invalid("page numbers are 1-indexed"));
                }
                Ok(())
            }
            Self::Ocr { language, .. } => {
                if language.trim().is_empty() {
                    return Err(invalid("OCR language must not be empty"));
                }
                Ok(())
            }
        }
    }
}

fn invalid(msg: impl Into<String>) -> StapelError {
    StapelError::Validation(msg.into())
}
