// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// In-place PDF edits: compression and text watermarks.

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, dictionary};
use stapel_core::error::StapelError;
use tracing::{debug, info, instrument};

use super::objects::{inherited_attribute, media_box, page_dict_mut, resolve, save_to_bytes};

/// Resource names used by the watermark overlay.
const WATERMARK_FONT: &[u8] = b"StapelWmFont";
const WATERMARK_STATE: &[u8] = b"StapelWmGs";

/// Average Helvetica glyph advance as a fraction of the font size.
const HELVETICA_AVG_ADVANCE: f32 = 0.5;

/// Text stamped diagonally across every page.
#[derive(Debug, Clone, PartialEq)]
pub struct Watermark {
    pub text: String,
    /// Fill opacity in (0, 1].
    pub opacity: f32,
    pub font_size: f32,
}

/// Edits a loaded PDF and serialises the result.
pub struct PdfEditor {
    document: Document,
    original_len: usize,
}

impl PdfEditor {
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, StapelError> {
        let document = Document::load_mem(data)
            .map_err(|err| StapelError::Pdf(format!("failed to load PDF: {err}")))?;
        Ok(Self {
            document,
            original_len: data.len(),
        })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    /// Drop unreferenced objects, deflate streams, and renumber.
    ///
    /// Returns `None` when the rewrite would not be smaller than the input,
    /// in which case the caller keeps the original bytes.
    #[instrument(skip(self))]
    pub fn compress(mut self) -> Result<Option<Vec<u8>>, StapelError> {
        let pruned = self.document.prune_objects();
        self.document.compress();
        self.document.renumber_objects();
        let output = save_to_bytes(&mut self.document)?;

        info!(
            pruned = pruned.len(),
            before = self.original_len,
            after = output.len(),
            "PDF compressed"
        );
        if output.len() >= self.original_len {
            debug!("Compressed output is not smaller, keeping original");
            return Ok(None);
        }
        Ok(Some(output))
    }

    /// Stamp `watermark` on every page and serialise.
    #[instrument(skip_all, fields(text = %watermark.text))]
    pub fn watermark(mut self, watermark: &Watermark) -> Result<Vec<u8>, StapelError> {
        let doc = &mut self.document;
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let state_id = doc.add_object(dictionary! {
            "Type" => "ExtGState",
            "ca" => watermark.opacity,
            "CA" => watermark.opacity,
        });

        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        for page_id in &pages {
            let stamp = stamp_content(watermark, media_box(doc, *page_id))?;
            let open_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
            let stamp_id = doc.add_object(Stream::new(dictionary! {}, stamp));

            let resources = stamped_resources(doc, *page_id, font_id, state_id);
            let contents = wrapped_contents(doc, *page_id, open_id, stamp_id);

            let page = page_dict_mut(doc, *page_id)?;
            page.set("Resources", Object::Dictionary(resources));
            page.set("Contents", Object::Array(contents));
        }

        info!(pages = pages.len(), "Watermark applied");
        save_to_bytes(doc)
    }
}

/// Content stream that closes the original page's graphics state and draws
/// the watermark, rotated 45° about the page centre.
fn stamp_content(watermark: &Watermark, media_box: [f32; 4]) -> Result<Vec<u8>, StapelError> {
    let [llx, lly, urx, ury] = media_box;
    let (cx, cy) = ((llx + urx) / 2.0, (lly + ury) / 2.0);
    let text = latin1(&watermark.text);
    let width = text.len() as f32 * watermark.font_size * HELVETICA_AVG_ADVANCE;
    let (sin, cos) = std::f32::consts::FRAC_PI_4.sin_cos();

    let content = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new("gs", vec![Object::Name(WATERMARK_STATE.to_vec())]),
            Operation::new("g", vec![0.5_f32.into()]),
            Operation::new(
                "cm",
                vec![
                    Object::Integer(1),
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(1),
                    cx.into(),
                    cy.into(),
                ],
            ),
            Operation::new(
                "cm",
                vec![
                    cos.into(),
                    sin.into(),
                    (-sin).into(),
                    cos.into(),
                    Object::Integer(0),
                    Object::Integer(0),
                ],
            ),
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(WATERMARK_FONT.to_vec()), watermark.font_size.into()],
            ),
            Operation::new(
                "Td",
                vec![(-width / 2.0).into(), (-watermark.font_size / 3.0).into()],
            ),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
            Operation::new("Q", vec![]),
        ],
    };
    content
        .encode()
        .map_err(|err| StapelError::Pdf(format!("failed to encode watermark stream: {err}")))
}

/// Helvetica/WinAnsi can only show Latin-1; anything else becomes `?`.
fn latin1(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}

/// The page's effective resources as a direct dictionary, with the
/// watermark font and graphics state merged in.
fn stamped_resources(doc: &Document, page_id: ObjectId, font_id: ObjectId, state_id: ObjectId) -> Dictionary {
    let mut resources = inherited_attribute(doc, page_id, b"Resources")
        .and_then(|value| resolve(doc, &value).and_then(|o| o.as_dict().ok()).cloned())
        .unwrap_or_else(Dictionary::new);

    for (category, name, id) in [
        (b"Font".as_slice(), WATERMARK_FONT, font_id),
        (b"ExtGState".as_slice(), WATERMARK_STATE, state_id),
    ] {
        let mut entries = resources
            .get(category)
            .ok()
            .and_then(|value| resolve(doc, value))
            .and_then(|value| value.as_dict().ok())
            .cloned()
            .unwrap_or_else(Dictionary::new);
        entries.set(name.to_vec(), Object::Reference(id));
        resources.set(category.to_vec(), Object::Dictionary(entries));
    }
    resources
}

/// `[open, original contents..., stamp]`.
fn wrapped_contents(doc: &Document, page_id: ObjectId, open_id: ObjectId, stamp_id: ObjectId) -> Vec<Object> {
    let existing = doc
        .get_object(page_id)
        .and_then(Object::as_dict)
        .ok()
        .and_then(|page| page.get(b"Contents").ok());
    let existing: Vec<Object> = match existing {
        Some(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Some(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    };

    let mut contents = Vec::with_capacity(existing.len() + 2);
    contents.push(Object::Reference(open_id));
    contents.extend(existing);
    contents.push(Object::Reference(stamp_id));
    contents
}
