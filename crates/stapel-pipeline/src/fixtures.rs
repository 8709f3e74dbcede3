// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Test fixtures: synthetic PDFs and images, and a scripted recognizer.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, Stream, dictionary};
use stapel_core::error::{Result, StapelError};
use stapel_core::{BoundingBox, TextLine};
use stapel_document::{OcrRequest, Recognition, Recognizer};

/// An `n`-page PDF with one line of text per page.
pub(crate) fn sample_pdf(pages: u32) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let mut kids = Vec::new();
    for number in 1..=pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), Object::Integer(18)]),
                Operation::new("Td", vec![Object::Integer(72), Object::Integer(700)]),
                Operation::new("Tj", vec![Object::string_literal(format!("Page {number}"))]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => font_id } },
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(612),
                Object::Integer(792),
            ],
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => Object::Integer(pages as i64),
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);

    let mut output = Vec::new();
    doc.save_to(&mut output).unwrap();
    output
}

/// A small white PNG.
pub(crate) fn png_image() -> Vec<u8> {
    let image = RgbImage::from_pixel(16, 8, Rgb([255, 255, 255]));
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .unwrap();
    png
}

/// Recognizer returning a fixed text after an optional delay.
///
/// `calls` counts every image it was handed, shared across clones.
#[derive(Debug, Clone)]
pub(crate) struct FakeRecognizer {
    pub delay: Duration,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl Default for FakeRecognizer {
    fn default() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Recognizer for FakeRecognizer {
    fn name(&self) -> &str {
        "fake"
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        request: &OcrRequest,
        progress: &dyn Fn(u8),
    ) -> Result<Recognition> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        if self.fail {
            return Err(StapelError::Ocr("engine refused image".into()));
        }
        progress(50);
        let line = TextLine {
            text: "hello world".into(),
            bbox: Some(BoundingBox {
                x0: 0.0,
                y0: 0.0,
                x1: image.width() as f32,
                y1: image.height() as f32,
            }),
        };
        progress(100);
        Ok(Recognition {
            text: line.text.clone(),
            confidence: 92.5,
            lines: request.layout.then(|| vec![line]),
        })
    }
}
