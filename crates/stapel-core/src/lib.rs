// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stapel: Core types, events, and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod event;
pub mod operation;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, StapelError};
pub use event::{ProgressEvent, StageLabel};
pub use operation::{Operation, OperationConfig, PageRange};
pub use types::*;
