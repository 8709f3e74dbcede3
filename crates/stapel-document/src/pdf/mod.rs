// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF module: merging, splitting, extracting, rotating, compressing, and
// watermarking.

pub mod editor;
mod objects;
pub mod reader;

pub use editor::{PdfEditor, Watermark};
pub use reader::PdfReader;
