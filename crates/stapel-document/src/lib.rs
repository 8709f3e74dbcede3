// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// stapel-document: Synchronous document transforms for the Stapel batch
// processor.
//
// PDF operations (merge, split, extract, rotate, compress, watermark) via
// `lopdf`, and image OCR behind the `Recognizer` trait, with an `ocrs`
// implementation under the `ocr` feature.

pub mod pdf;
pub mod scan;

pub use pdf::editor::{PdfEditor, Watermark};
pub use pdf::reader::PdfReader;
pub use scan::recognizer::{OcrRequest, Recognition, Recognizer, decode_image};

#[cfg(feature = "ocr")]
pub use scan::ocr::{OcrConfig, OcrsRecognizer};
