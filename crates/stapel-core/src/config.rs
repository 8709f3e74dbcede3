// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "STAPEL_CONFIG";
/// Environment override for [`AppConfig::port`].
pub const PORT_ENV: &str = "STAPEL_PORT";
/// Environment override for [`AppConfig::bind_address`].
pub const BIND_ENV: &str = "STAPEL_BIND";

/// Server and pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Interface the HTTP server binds to.
    pub bind_address: String,
    /// HTTP port (default 8080).
    pub port: u16,
    /// Maximum number of heavy operations (PDF transforms, OCR) running at
    /// once across all jobs.
    pub max_concurrent_operations: usize,
    /// Number of progress events buffered per job before `emit` waits on the
    /// client.
    pub channel_capacity: usize,
    /// Per-file processing limit. `None` disables the timeout.
    pub file_timeout_secs: Option<u64>,
    /// Upper bound on a single request body.
    pub max_upload_bytes: usize,
    /// Prefix used when building URLs for stored files.
    pub public_base_url: String,
    /// Most files the in-memory store keeps before evicting the oldest.
    pub max_stored_files: usize,
    /// Most bytes the in-memory store keeps before evicting the oldest.
    pub max_stored_bytes: usize,
    /// Idle interval after which an SSE stream sends a keep-alive comment.
    pub sse_keep_alive_secs: u64,
    /// Directory holding the OCR detection/recognition models.
    pub ocr_model_dir: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_concurrent_operations: 3,
            channel_capacity: 64,
            file_timeout_secs: Some(120),
            max_upload_bytes: 100 * 1024 * 1024,
            public_base_url: "/api/files".to_string(),
            max_stored_files: 256,
            max_stored_bytes: 1024 * 1024 * 1024,
            sse_keep_alive_secs: 15,
            ocr_model_dir: None,
        }
    }
}

impl AppConfig {
    /// Read a config file. Missing keys fall back to their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config = serde_json::from_str(&data)?;
        Ok(config)
    }

    /// Load from `STAPEL_CONFIG` (if set), then apply `STAPEL_PORT` and
    /// `STAPEL_BIND` overrides.
    pub fn load() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from a key lookup. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup(PORT_ENV).and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(bind) = lookup(BIND_ENV).filter(|b| !b.is_empty()) {
            self.bind_address = bind;
        }
    }

    /// Per-file timeout as a `Duration`.
    pub fn file_timeout(&self) -> Option<Duration> {
        self.file_timeout_secs.map(Duration::from_secs)
    }

    /// Keep-alive interval for SSE streams, at least one second.
    pub fn sse_keep_alive(&self) -> Duration {
        Duration::from_secs(self.sse_keep_alive_secs.max(1))
    }

    /// `host:port` string for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"port": 9000, "max_concurrent_operations": 5}"#).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.max_concurrent_operations, 5);
        assert_eq!(config.channel_capacity, 64);
        assert_eq!(config.file_timeout(), Some(Duration::from_secs(120)));
        assert_eq!(config.max_stored_files, 256);
        assert_eq!(config.sse_keep_alive(), Duration::from_secs(15));
    }

    #[test]
    fn zero_keep_alive_is_clamped() {
        let config: AppConfig = serde_json::from_str(r#"{"sse_keep_alive_secs": 0}"#).unwrap();
        assert_eq!(config.sse_keep_alive(), Duration::from_secs(1));
    }

    #[test]
    fn overrides_apply_only_valid_values() {
        let mut config = AppConfig::default();
        config.apply_overrides(|key| match key {
            PORT_ENV => Some("not-a-port".into()),
            BIND_ENV => Some("127.0.0.1".into()),
            _ => None,
        });
        assert_eq!(config.port, 8080);
        assert_eq!(config.listen_addr(), "127.0.0.1:8080");

        config.apply_overrides(|key| (key == PORT_ENV).then(|| "3001".to_string()));
        assert_eq!(config.port, 3001);
    }

    #[test]
    fn null_timeout_disables_it() {
        let config: AppConfig = serde_json::from_str(r#"{"file_timeout_secs": null}"#).unwrap();
        assert!(config.file_timeout().is_none());
    }
}
