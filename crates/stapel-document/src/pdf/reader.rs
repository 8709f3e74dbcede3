// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader: open, inspect, merge, split, extract, and rotate PDF documents
// held in memory, using the `lopdf` crate.

use std::collections::{BTreeMap, HashSet};

use lopdf::{Document, Object, ObjectId};
use stapel_core::PageRange;
use stapel_core::error::StapelError;
use tracing::{debug, info, instrument, warn};

use super::objects::{PageCopier, empty_document, inherited_attribute, page_dict_mut, save_to_bytes};

/// Reads and restructures an existing PDF.
///
/// Every operation produces fresh documents; the loaded document is never
/// modified, so one reader can serve several operations.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Load a PDF from raw bytes.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, StapelError> {
        let document = Document::load_mem(data)
            .map_err(|err| StapelError::Pdf(format!("failed to load PDF: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    fn page_map(&self) -> BTreeMap<u32, ObjectId> {
        self.document.get_pages()
    }

    fn page_id(pages: &BTreeMap<u32, ObjectId>, page_number: u32) -> Result<ObjectId, StapelError> {
        pages.get(&page_number).copied().ok_or_else(|| {
            StapelError::Pdf(format!(
                "page {page_number} out of range (document has {} pages)",
                pages.len()
            ))
        })
    }

    // -- Restructuring --------------------------------------------------------

    /// Copy the listed pages (1-indexed) into a new document, in the order
    /// given. Repeated page numbers are copied once, at their first position.
    #[instrument(skip(self), fields(pages = page_numbers.len()))]
    pub fn extract_pages(&self, page_numbers: &[u32]) -> Result<Vec<u8>, StapelError> {
        let pages = self.page_map();
        let mut seen = HashSet::new();
        let wanted: Vec<u32> = page_numbers
            .iter()
            .copied()
            .filter(|n| seen.insert(*n))
            .collect();
        if wanted.is_empty() {
            return Err(StapelError::Validation("no pages selected".to_string()));
        }
        let ids = wanted
            .iter()
            .map(|n| Self::page_id(&pages, *n))
            .collect::<Result<Vec<_>, _>>()?;

        let bytes = self.copy_pages(&ids)?;
        debug!(extracted = ids.len(), bytes = bytes.len(), "Pages extracted");
        Ok(bytes)
    }

    /// Rewrite the whole document into a fresh page tree.
    pub fn rebuild(&self) -> Result<Vec<u8>, StapelError> {
        let ids: Vec<ObjectId> = self.page_map().into_values().collect();
        self.copy_pages(&ids)
    }

    /// Split into one single-page document per page.
    ///
    /// `on_part` is called after each part with `(done, total)`.
    #[instrument(skip_all, fields(pages = self.page_count()))]
    pub fn split_pages(
        &self,
        mut on_part: impl FnMut(usize, usize),
    ) -> Result<Vec<(Vec<u32>, Vec<u8>)>, StapelError> {
        let pages = self.page_map();
        let total = pages.len();
        let mut parts = Vec::with_capacity(total);
        for (index, (number, id)) in pages.iter().enumerate() {
            parts.push((vec![*number], self.copy_pages(&[*id])?));
            on_part(index + 1, total);
        }
        info!(parts = parts.len(), "Document split by page");
        Ok(parts)
    }

    /// Split into one document per inclusive range.
    #[instrument(skip_all, fields(ranges = ranges.len()))]
    pub fn split_ranges(
        &self,
        ranges: &[PageRange],
        mut on_part: impl FnMut(usize, usize),
    ) -> Result<Vec<(Vec<u32>, Vec<u8>)>, StapelError> {
        let pages = self.page_map();
        let total = ranges.len();
        let mut parts = Vec::with_capacity(total);
        for (index, range) in ranges.iter().enumerate() {
            let numbers: Vec<u32> = range.pages().collect();
            let ids = numbers
                .iter()
                .map(|n| Self::page_id(&pages, *n))
                .collect::<Result<Vec<_>, _>>()?;
            parts.push((numbers, self.copy_pages(&ids)?));
            on_part(index + 1, total);
        }
        info!(parts = parts.len(), "Document split by range");
        Ok(parts)
    }

    /// Rotate pages by `degrees` (a multiple of 90), adding to any rotation
    /// the page already has. `pages` selects 1-indexed pages; `None` means all.
    #[instrument(skip(self, pages))]
    pub fn rotate_pages(&self, degrees: i32, pages: Option<&[u32]>) -> Result<Vec<u8>, StapelError> {
        if degrees % 90 != 0 {
            return Err(StapelError::Validation(format!(
                "rotation must be a multiple of 90, got {degrees}"
            )));
        }

        let mut doc = self.document.clone();
        let page_map = doc.get_pages();
        let targets: Vec<ObjectId> = match pages {
            Some(numbers) => numbers
                .iter()
                .map(|n| Self::page_id(&page_map, *n))
                .collect::<Result<_, _>>()?,
            None => page_map.values().copied().collect(),
        };

        for page_id in &targets {
            let current = inherited_attribute(&doc, *page_id, b"Rotate")
                .and_then(|value| value.as_i64().ok())
                .unwrap_or(0);
            let rotation = (current + degrees as i64).rem_euclid(360);
            page_dict_mut(&mut doc, *page_id)?.set("Rotate", Object::Integer(rotation));
        }

        info!(rotated = targets.len(), degrees, "Pages rotated");
        save_to_bytes(&mut doc)
    }

    /// Concatenate several PDFs, in order, into one document.
    ///
    /// Returns the merged bytes and their page count.
    #[instrument(skip_all, fields(count = documents.len()))]
    pub fn merge(documents: &[&[u8]]) -> Result<(Vec<u8>, usize), StapelError> {
        if documents.is_empty() {
            return Err(StapelError::Validation("nothing to merge".to_string()));
        }

        let (mut merged, pages_id) = empty_document();
        let mut page_count = 0;
        for (index, bytes) in documents.iter().enumerate() {
            let source = Document::load_mem(bytes).map_err(|err| {
                StapelError::Pdf(format!("failed to load merge input {index}: {err}"))
            })?;
            let mut copier = PageCopier::new(&source);
            for page_id in source.get_pages().into_values() {
                copier.append_page(&mut merged, pages_id, page_id)?;
                page_count += 1;
            }
        }
        if page_count == 0 {
            warn!("Merged document has no pages");
        }

        info!(page_count, "PDFs merged");
        Ok((save_to_bytes(&mut merged)?, page_count))
    }

    fn copy_pages(&self, page_ids: &[ObjectId]) -> Result<Vec<u8>, StapelError> {
        let (mut target, pages_id) = empty_document();
        let mut copier = PageCopier::new(&self.document);
        for page_id in page_ids {
            copier.append_page(&mut target, pages_id, *page_id)?;
        }
        save_to_bytes(&mut target)
    }
}
