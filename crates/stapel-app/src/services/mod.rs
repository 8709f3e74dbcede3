// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>

pub mod analytics;
pub mod app_services;
pub mod store;

pub use analytics::AnalyticsEvent;
pub use app_services::AppServices;
pub use store::StoredFile;
