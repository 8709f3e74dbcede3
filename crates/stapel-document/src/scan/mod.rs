// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Optical character recognition on uploaded images.

pub mod recognizer;

#[cfg(feature = "ocr")]
pub mod ocr;

pub use recognizer::{OcrRequest, Recognition, Recognizer, decode_image};

#[cfg(feature = "ocr")]
pub use ocr::{OcrConfig, OcrsRecognizer};
