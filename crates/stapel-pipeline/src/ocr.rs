// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// OCR processor: feeds images to a recognizer through the bounded queue.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use stapel_core::error::Result;
use stapel_document::{OcrRequest, Recognition, Recognizer, decode_image};
use tracing::{info, instrument};

use crate::queue::{BlockingTask, BoundedQueue};

/// Runs OCR through a caller-supplied queue.
///
/// Holds no global state; build one per engine and clone it freely.
#[derive(Clone)]
pub struct OcrProcessor {
    recognizer: Arc<dyn Recognizer>,
    queue: BoundedQueue,
}

impl fmt::Debug for OcrProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrProcessor")
            .field("engine", &self.recognizer.name())
            .field("queue", &self.queue)
            .finish()
    }
}

impl OcrProcessor {
    pub fn new(recognizer: Arc<dyn Recognizer>, queue: BoundedQueue) -> Self {
        Self { recognizer, queue }
    }

    pub fn engine_name(&self) -> &str {
        self.recognizer.name()
    }

    /// Queue one image: decode it, then recognise it.
    pub fn submit(&self, image: Bytes, request: OcrRequest) -> BlockingTask<Recognition> {
        let recognizer = Arc::clone(&self.recognizer);
        self.queue.submit_blocking(move |progress| {
            let decoded = decode_image(&image)?;
            recognizer.recognize(&decoded, &request, progress)
        })
    }

    /// Recognise one image, passing engine progress (0–100) to `on_progress`
    /// as it arrives.
    #[instrument(skip_all, fields(bytes = image.len(), language = %request.language))]
    pub async fn recognize(
        &self,
        image: Bytes,
        request: &OcrRequest,
        mut on_progress: impl FnMut(u8) + Send,
    ) -> Result<Recognition> {
        let mut task = self.submit(image, request.clone());
        while let Some(percent) = task.next_progress().await {
            on_progress(percent);
        }
        task.finish().await
    }

    /// Recognise several images. All are queued at once, so up to the queue's
    /// limit run together. Results come back in input order and one image's
    /// failure does not affect the others.
    #[instrument(skip_all, fields(images = images.len()))]
    pub async fn recognize_batch(
        &self,
        images: Vec<Bytes>,
        request: &OcrRequest,
    ) -> Vec<Result<Recognition>> {
        let tasks: Vec<_> = images
            .into_iter()
            .map(|image| self.submit(image, request.clone()))
            .collect();
        let results = futures::future::join_all(tasks.into_iter().map(BlockingTask::finish)).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        info!(total = results.len(), failed, "OCR batch complete");
        results
    }
}
