// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Usage event recording.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use stapel_core::{Result, StapelError};
use stapel_pipeline::{JobOutcome, JobSummary};

/// Default number of events the in-memory sink retains.
pub const DEFAULT_EVENT_CAPACITY: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event: String,
    #[serde(default)]
    pub properties: Value,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl AnalyticsEvent {
    pub fn new(event: impl Into<String>, properties: Value) -> Self {
        Self {
            event: event.into(),
            properties,
            timestamp: Utc::now(),
        }
    }

    /// `job_completed` or `job_cancelled` for a finished job. Rejected jobs
    /// never started and are not recorded.
    pub fn from_summary(summary: &JobSummary) -> Option<Self> {
        let event = match summary.outcome {
            JobOutcome::Completed => "job_completed",
            JobOutcome::Cancelled => "job_cancelled",
            JobOutcome::Rejected => return None,
        };
        Some(Self::new(
            event,
            json!({
                "jobId": summary.job_id.map(|id| id.to_string()),
                "operation": summary.operation.map(|op| op.to_string()),
                "totalFiles": summary.total_files,
                "processedCount": summary.processed_count,
                "failedCount": summary.failed_count,
            }),
        ))
    }
}

#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record_event(&self, event: AnalyticsEvent) -> Result<()>;

    /// Recorded events, oldest first.
    async fn events(&self) -> Result<Vec<AnalyticsEvent>>;
}

/// Bounded in-memory sink. Once full, the oldest event is dropped.
#[derive(Debug, Clone)]
pub struct MemoryAnalytics {
    events: Arc<Mutex<VecDeque<AnalyticsEvent>>>,
    capacity: usize,
}

impl Default for MemoryAnalytics {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl MemoryAnalytics {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(64)))),
            capacity,
        }
    }
}

#[async_trait]
impl AnalyticsSink for MemoryAnalytics {
    async fn record_event(&self, event: AnalyticsEvent) -> Result<()> {
        if event.event.trim().is_empty() {
            return Err(StapelError::Validation("analytics event name is empty".into()));
        }
        tracing::debug!(event = %event.event, "Recorded analytics event");
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if events.len() == self.capacity {
            events.pop_front();
        }
        events.push_back(event);
        Ok(())
    }

    async fn events(&self) -> Result<Vec<AnalyticsEvent>> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(events.iter().cloned().collect())
    }
}
