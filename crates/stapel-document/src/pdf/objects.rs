// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Low-level lopdf object helpers: fresh page trees, cross-document page
// copying, and inherited page attributes.

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object, ObjectId, dictionary};
use stapel_core::error::StapelError;
use tracing::warn;

/// Page attributes a page may inherit from its ancestors in the page tree
/// (ISO 32000-1 §7.7.3.4).
const INHERITABLE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guards against malformed trees whose /Parent chain loops.
const MAX_TREE_DEPTH: usize = 64;

/// Deepest run of directly nested arrays and dictionaries a copy accepts.
const MAX_NESTING_DEPTH: usize = 256;

/// Letter size, used when a page has no usable /MediaBox.
pub(crate) const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Map a lopdf error into a PDF error with context.
pub(crate) fn pdf_err(context: &'static str) -> impl FnOnce(lopdf::Error) -> StapelError {
    move |err| StapelError::Pdf(format!("{context}: {err}"))
}

/// Create an empty document with a catalog and an empty /Pages node.
///
/// Returns the document and the id of its /Pages node.
pub(crate) fn empty_document() -> (Document, ObjectId) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => Vec::<Object>::new(),
            "Count" => Object::Integer(0),
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    (doc, pages_id)
}

/// Serialise a document to bytes.
pub(crate) fn save_to_bytes(doc: &mut Document) -> Result<Vec<u8>, StapelError> {
    let mut output = Vec::new();
    doc.save_to(&mut output)
        .map_err(|err| StapelError::Pdf(format!("failed to serialise PDF: {err}")))?;
    Ok(output)
}

/// Borrow a page dictionary mutably.
pub(crate) fn page_dict_mut(
    doc: &mut Document,
    page_id: ObjectId,
) -> Result<&mut Dictionary, StapelError> {
    match doc.get_object_mut(page_id) {
        Ok(Object::Dictionary(dict)) => Ok(dict),
        Ok(_) => Err(StapelError::Pdf(format!(
            "page object {page_id:?} is not a dictionary"
        ))),
        Err(err) => Err(StapelError::Pdf(format!(
            "cannot read page object {page_id:?}: {err}"
        ))),
    }
}

/// Follow a reference to its target; direct objects are returned as-is.
pub(crate) fn resolve<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Look up a page attribute, walking up the /Parent chain when the page
/// does not define it itself.
pub(crate) fn inherited_attribute(doc: &Document, page_id: ObjectId, key: &[u8]) -> Option<Object> {
    let mut node_id = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_object(node_id).ok()?.as_dict().ok()?;
        if let Ok(value) = dict.get(key) {
            return Some(value.clone());
        }
        node_id = dict.get(b"Parent").ok()?.as_reference().ok()?;
    }
    None
}

/// Numeric value of an integer or real object.
pub(crate) fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Effective /MediaBox of a page as `[llx, lly, urx, ury]`.
pub(crate) fn media_box(doc: &Document, page_id: ObjectId) -> [f32; 4] {
    let Some(object) = inherited_attribute(doc, page_id, b"MediaBox") else {
        return DEFAULT_MEDIA_BOX;
    };
    let Some(Object::Array(values)) = resolve(doc, &object) else {
        return DEFAULT_MEDIA_BOX;
    };
    let numbers: Vec<f32> = values
        .iter()
        .filter_map(|v| resolve(doc, v).and_then(number))
        .collect();
    match numbers.as_slice() {
        [llx, lly, urx, ury] if urx > llx && ury > lly => [*llx, *lly, *urx, *ury],
        _ => DEFAULT_MEDIA_BOX,
    }
}

/// Copies pages from one document into another.
///
/// Every object reachable from a copied page is copied once; the memo keeps
/// shared resources shared and stops reference cycles (e.g. an annotation's
/// /P pointing back at its page). Indirect objects are queued on a worklist
/// rather than followed recursively, so chain length does not grow the stack.
pub(crate) struct PageCopier<'a> {
    source: &'a Document,
    memo: BTreeMap<ObjectId, ObjectId>,
    pending: Vec<(ObjectId, ObjectId)>,
}

impl<'a> PageCopier<'a> {
    pub(crate) fn new(source: &'a Document) -> Self {
        Self {
            source,
            memo: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    /// Append a copy of `page_id` as the last kid of `pages_id` in `target`.
    pub(crate) fn append_page(
        &mut self,
        target: &mut Document,
        pages_id: ObjectId,
        page_id: ObjectId,
    ) -> Result<ObjectId, StapelError> {
        let source = self.source;
        let mut page = source
            .get_object(page_id)
            .and_then(Object::as_dict)
            .map_err(|err| {
                StapelError::Pdf(format!("cannot read page object {page_id:?}: {err}"))
            })?
            .clone();

        // The copy lands under a different parent, so pull inherited
        // attributes down onto the page itself.
        for key in INHERITABLE_KEYS {
            if !page.has(key)
                && let Some(value) = inherited_attribute(source, page_id, key)
            {
                page.set(key.to_vec(), value);
            }
        }

        let new_id = target.new_object_id();
        self.memo.insert(page_id, new_id);

        let mut cloned = self.clone_dictionary(target, &page, 0)?;
        cloned.set("Parent", pages_id);
        target.objects.insert(new_id, Object::Dictionary(cloned));
        self.drain(target)?;

        append_kid(target, pages_id, new_id)?;
        Ok(new_id)
    }

    /// Copy every queued indirect object.
    fn drain(&mut self, target: &mut Document) -> Result<(), StapelError> {
        let source = self.source;
        while let Some((source_id, new_id)) = self.pending.pop() {
            let copy = match source.get_object(source_id) {
                Ok(object) => self.clone_object(target, object, 0)?,
                Err(err) => {
                    warn!(id = ?source_id, %err, "Cannot resolve reference, using Null");
                    Object::Null
                }
            };
            target.objects.insert(new_id, copy);
        }
        Ok(())
    }

    /// Copy a direct object. `depth` counts direct nesting only.
    fn clone_object(
        &mut self,
        target: &mut Document,
        object: &Object,
        depth: usize,
    ) -> Result<Object, StapelError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(StapelError::Pdf(format!(
                "object nesting exceeds {MAX_NESTING_DEPTH} levels"
            )));
        }
        Ok(match object {
            Object::Reference(id) => self.queue_reference(target, *id),
            Object::Dictionary(dict) => {
                Object::Dictionary(self.clone_dictionary(target, dict, depth + 1)?)
            }
            Object::Array(items) => Object::Array(
                items
                    .iter()
                    .map(|item| self.clone_object(target, item, depth + 1))
                    .collect::<Result<_, _>>()?,
            ),
            Object::Stream(stream) => {
                let mut copy = stream.clone();
                copy.dict = self.clone_dictionary(target, &stream.dict, depth + 1)?;
                Object::Stream(copy)
            }
            other => other.clone(),
        })
    }

    /// Page-tree nodes lose /Parent (the caller re-links copied pages);
    /// other dictionaries, such as annotations and form fields, keep it.
    fn clone_dictionary(
        &mut self,
        target: &mut Document,
        dict: &Dictionary,
        depth: usize,
    ) -> Result<Dictionary, StapelError> {
        let page_node = matches!(
            dict.get(b"Type").and_then(Object::as_name),
            Ok(b"Page" | b"Pages")
        );
        let mut copy = Dictionary::new();
        for (key, value) in dict.iter() {
            if page_node && key.as_slice() == b"Parent" {
                continue;
            }
            copy.set(key.clone(), self.clone_object(target, value, depth)?);
        }
        Ok(copy)
    }

    /// Reserve an id for `id` in `target` and queue its copy.
    fn queue_reference(&mut self, target: &mut Document, id: ObjectId) -> Object {
        if let Some(existing) = self.memo.get(&id) {
            return Object::Reference(*existing);
        }
        if let Err(err) = self.source.get_object(id) {
            warn!(?id, %err, "Cannot resolve reference, using Null");
            return Object::Null;
        }
        let new_id = target.new_object_id();
        self.memo.insert(id, new_id);
        self.pending.push((id, new_id));
        Object::Reference(new_id)
    }
}

/// Push a page reference onto a /Pages node and bump its /Count.
fn append_kid(doc: &mut Document, pages_id: ObjectId, page_id: ObjectId) -> Result<(), StapelError> {
    let pages = page_dict_mut(doc, pages_id)?;
    match pages.get_mut(b"Kids") {
        Ok(Object::Array(kids)) => kids.push(Object::Reference(page_id)),
        _ => pages.set("Kids", vec![Object::Reference(page_id)]),
    }
    let count = match pages.get(b"Count") {
        Ok(Object::Integer(count)) => *count + 1,
        _ => 1,
    };
    pages.set("Count", Object::Integer(count));
    Ok(())
}
