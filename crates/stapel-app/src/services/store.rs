// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// File storage behind a trait, with an in-memory content-addressed backend.
//
// Ids are the SHA-256 hex digest of the stored bytes, so uploading the same
// content twice yields the same id. The later upload's name wins.
//
// The memory backend is capped by file count and total bytes. Going over
// either cap evicts the least recently uploaded files first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use stapel_core::{Result, StapelError};
use tracing::{debug, info, instrument};

/// Metadata returned for an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFile {
    pub id: String,
    pub url: String,
    pub name: String,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<StoredFile>;

    /// Files whose name starts with `prefix` (all files when `None`), sorted
    /// by name.
    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredFile>>;

    async fn fetch(&self, id: &str) -> Result<Option<(StoredFile, Bytes)>>;
}

/// SHA-256 hex digest of `data`.
pub fn content_id(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
struct Entry {
    meta: StoredFile,
    data: Bytes,
}

#[derive(Debug, Default)]
struct Shelf {
    entries: BTreeMap<String, Entry>,
    /// Ids from oldest to newest upload.
    order: VecDeque<String>,
    bytes: usize,
}

impl Shelf {
    fn remove(&mut self, id: &str) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        self.order.retain(|held| held != id);
        self.bytes -= entry.data.len();
        Some(entry)
    }

    fn insert(&mut self, id: String, entry: Entry) {
        self.bytes += entry.data.len();
        self.order.push_back(id.clone());
        self.entries.insert(id, entry);
    }

    /// Drop the oldest entries until one more file of `incoming` bytes fits.
    fn make_room(&mut self, incoming: usize, max_files: usize, max_bytes: usize) {
        while !self.order.is_empty()
            && (self.entries.len() >= max_files || self.bytes + incoming > max_bytes)
        {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&oldest) {
                self.bytes -= entry.data.len();
                info!(id = %oldest, name = %entry.meta.name, "Evicted stored file");
            }
        }
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Clone)]
pub struct MemoryFileStore {
    base_url: String,
    max_files: usize,
    max_bytes: usize,
    shelf: Arc<Mutex<Shelf>>,
}

impl MemoryFileStore {
    /// A store holding at most `max_files` files and `max_bytes` bytes.
    /// Both caps are at least one.
    ///
    /// `base_url` prefixes every file URL, e.g. `/api/files` gives
    /// `/api/files/<id>`.
    pub fn with_limits(base_url: impl Into<String>, max_files: usize, max_bytes: usize) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            max_files: max_files.max(1),
            max_bytes: max_bytes.max(1),
            shelf: Arc::new(Mutex::new(Shelf::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shelf> {
        self.shelf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    #[instrument(skip(self, data, content_type), fields(size = data.len()))]
    async fn upload(
        &self,
        name: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<StoredFile> {
        if name.trim().is_empty() {
            return Err(StapelError::Validation("file name is empty".into()));
        }
        if data.is_empty() {
            return Err(StapelError::Validation(format!("{name} is empty")));
        }

        if data.len() > self.max_bytes {
            return Err(StapelError::Storage(format!(
                "{name} is {} bytes, the store holds at most {}",
                data.len(),
                self.max_bytes
            )));
        }

        let id = content_id(&data);
        let meta = StoredFile {
            url: format!("{}/{id}", self.base_url),
            id: id.clone(),
            name: name.to_string(),
            size: data.len() as u64,
            content_type,
            uploaded_at: Utc::now(),
        };
        let entry = Entry {
            meta: meta.clone(),
            data,
        };
        let held = {
            let mut shelf = self.lock();
            shelf.remove(&id);
            shelf.make_room(entry.data.len(), self.max_files, self.max_bytes);
            shelf.insert(id.clone(), entry);
            shelf.bytes
        };
        debug!(%id, held, "Stored file");
        Ok(meta)
    }

    async fn list(&self, prefix: Option<&str>) -> Result<Vec<StoredFile>> {
        let prefix = prefix.unwrap_or("");
        let mut files: Vec<StoredFile> = self
            .lock()
            .entries
            .values()
            .filter(|entry| entry.meta.name.starts_with(prefix))
            .map(|entry| entry.meta.clone())
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(files)
    }

    async fn fetch(&self, id: &str) -> Result<Option<(StoredFile, Bytes)>> {
        Ok(self
            .lock()
            .entries
            .get(id)
            .map(|entry| (entry.meta.clone(), entry.data.clone())))
    }
}
