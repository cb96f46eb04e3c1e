//! Rewriting the graph for size: merging interchangeable font and image
//! objects, then sweeping everything the trailer can no longer reach.
//!
//! Both passes are deterministic (the surviving object of a duplicate
//! group is the lowest-numbered one) and idempotent, so running the
//! optimizer twice writes byte-identical output.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::debug;
use sha2::{Digest, Sha256};

use crate::writer::Writer;
use crate::{Document, Object, ObjectId};

impl Document {
    /// Deduplicates shared resources and reclaims unreachable objects.
    /// An abort flag stops the work between passes; each pass leaves the
    /// document consistent, so a cancelled run is simply less optimized.
    pub fn optimize(&mut self) {
        let merged_fonts = self.merge_duplicates(font_fingerprint);
        if self.check_abort().is_err() {
            return;
        }
        let merged_images = self.merge_duplicates(image_fingerprint);
        if merged_fonts + merged_images > 0 {
            debug!("merged {merged_fonts} duplicate fonts, {merged_images} duplicate images");
        }
        if self.check_abort().is_err() {
            return;
        }
        self.sweep_unreachable();
    }

    /// Groups objects by fingerprint, keeps the lowest-numbered member of
    /// each group, and rewrites every reference to the rest. Returns the
    /// number of objects merged away.
    fn merge_duplicates<F>(&mut self, fingerprint: F) -> usize
    where
        F: Fn(&Document, ObjectId, &Object) -> Option<Vec<u8>>,
    {
        let mut groups: BTreeMap<Vec<u8>, Vec<ObjectId>> = BTreeMap::new();
        for (&id, object) in &self.objects {
            if let Some(print) = fingerprint(self, id, object) {
                groups.entry(print).or_default().push(id);
            }
        }

        let mut replacements: HashMap<ObjectId, ObjectId> = HashMap::new();
        for members in groups.values() {
            // BTreeMap iteration handed us ascending ids.
            let (canonical, duplicates) = match members.split_first() {
                Some(split) => split,
                None => continue,
            };
            for &duplicate in duplicates {
                replacements.insert(duplicate, *canonical);
            }
        }
        if replacements.is_empty() {
            return 0;
        }

        for object in self.objects.values_mut() {
            rewrite_references(object, &replacements);
        }
        let mut trailer = Object::Dictionary(std::mem::take(&mut self.trailer));
        rewrite_references(&mut trailer, &replacements);
        if let Object::Dictionary(dict) = trailer {
            self.trailer = dict;
        }
        replacements.len()
    }

    /// Frees every object the trailer does not reach, bumping the
    /// generation of the reclaimed slots.
    fn sweep_unreachable(&mut self) {
        let reachable: HashSet<ObjectId> = self.reachable_objects();
        let unreachable: Vec<u32> = self
            .objects
            .keys()
            .filter(|id| !reachable.contains(id))
            .map(|id| id.0)
            .collect();
        for number in unreachable {
            debug!("sweeping unreachable object {number}");
            self.free_object(number);
        }
    }
}

fn rewrite_references(object: &mut Object, replacements: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(&canonical) = replacements.get(id) {
                *id = canonical;
            }
        }
        Object::Array(items) => {
            for item in items {
                rewrite_references(item, replacements);
            }
        }
        Object::Dictionary(dict) => {
            for (_, value) in dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        Object::Stream(stream) => {
            for (_, value) in stream.dict.iter_mut() {
                rewrite_references(value, replacements);
            }
        }
        _ => {}
    }
}

/// Fingerprint of a font dictionary: base name without its subset prefix,
/// subtype, encoding shape, and the bytes of any embedded font program.
/// Two fonts with equal fingerprints render identically.
fn font_fingerprint(document: &Document, _id: ObjectId, object: &Object) -> Option<Vec<u8>> {
    let Object::Dictionary(dict) = object else {
        return None;
    };
    if !dict.has_type(b"Font") {
        return None;
    }

    let mut hasher = Sha256::new();
    let base_font = dict.get(b"BaseFont").and_then(Object::as_name).unwrap_or(b"");
    hasher.update(strip_subset_prefix(base_font));
    hasher.update([0]);
    hasher.update(dict.get(b"Subtype").and_then(Object::as_name).unwrap_or(b""));
    hasher.update([0]);

    if let Ok(encoding) = dict.get(b"Encoding") {
        if let Ok((_, resolved)) = document.dereference(encoding) {
            let mut serialized = Vec::new();
            if Writer::serialize_object(&mut serialized, resolved).is_ok() {
                hasher.update(&serialized);
            }
        }
    }
    hasher.update([0]);

    // The embedded program distinguishes two same-named subsets with
    // different glyph sets.
    if let Some(program) = embedded_font_program(document, dict) {
        hasher.update(&program);
    } else if dict.has(b"FontDescriptor") || dict.has(b"DescendantFonts") {
        // An unresolvable descriptor makes the font unique; do not merge.
        return None;
    }

    let mut print = b"font:".to_vec();
    print.extend_from_slice(&hasher.finalize());
    Some(print)
}

/// Subset tags are six uppercase letters and a plus sign, `ABCDEF+Name`.
fn strip_subset_prefix(base_font: &[u8]) -> &[u8] {
    if base_font.len() > 7
        && base_font[6] == b'+'
        && base_font[..6].iter().all(u8::is_ascii_uppercase)
    {
        &base_font[7..]
    } else {
        base_font
    }
}

fn embedded_font_program(document: &Document, font: &crate::Dictionary) -> Option<Vec<u8>> {
    let descriptor = font
        .get(b"FontDescriptor")
        .ok()
        .or_else(|| {
            // Type0 fonts hold the descriptor on their descendant.
            let descendants = font.get(b"DescendantFonts").ok()?;
            let (_, descendants) = document.dereference(descendants).ok()?;
            let first = descendants.as_array().ok()?.first()?;
            let descendant = document.dereference_dict(first).ok()?;
            descendant.get(b"FontDescriptor").ok()
        })?;
    let descriptor = document.dereference_dict(descriptor).ok()?;
    for file_entry in [&b"FontFile"[..], b"FontFile2", b"FontFile3"] {
        if let Ok(file) = descriptor.get(file_entry) {
            let (_, resolved) = document.dereference(file).ok()?;
            let stream = resolved.as_stream().ok()?;
            return Some(Sha256::digest(&stream.content).to_vec());
        }
    }
    // Descriptor without an embedded file: a standard font; the name and
    // encoding already identify it.
    Some(Vec::new())
}

/// Fingerprint of an image xobject: dimensions, color space, bit depth,
/// filter chain, and a hash of the encoded payload.
fn image_fingerprint(document: &Document, _id: ObjectId, object: &Object) -> Option<Vec<u8>> {
    let Object::Stream(stream) = object else {
        return None;
    };
    if stream.dict.get(b"Subtype").and_then(Object::as_name).ok()? != b"Image" {
        return None;
    }

    let mut hasher = Sha256::new();
    for entry in [&b"Width"[..], b"Height", b"BitsPerComponent"] {
        let value = stream
            .dict
            .get(entry)
            .ok()
            .and_then(|v| document.dereference_int(v).ok())
            .unwrap_or(-1);
        hasher.update(value.to_le_bytes());
    }
    for entry in [&b"ColorSpace"[..], b"Filter", b"DecodeParms"] {
        let mut serialized = Vec::new();
        if let Ok(value) = stream.dict.get(entry) {
            if let Ok((_, resolved)) = document.dereference(value) {
                if Writer::serialize_object(&mut serialized, resolved).is_err() {
                    return None;
                }
            }
        }
        hasher.update(&serialized);
        hasher.update([0]);
    }
    hasher.update(Sha256::digest(&stream.content));

    let mut print = b"image:".to_vec();
    print.extend_from_slice(&hasher.finalize());
    Some(print)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::XrefEntry;
    use crate::{Stream, dictionary};

    fn document_with_two_helveticas() -> (Document, ObjectId, ObjectId, ObjectId, ObjectId) {
        let mut doc = Document::new();
        doc.max_id = 1;
        let font_a = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let font_b = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let page_a = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference((1, 0)),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => Object::Reference(font_a) } },
        });
        let page_b = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference((1, 0)),
            "Resources" => dictionary! { "Font" => dictionary! { "F1" => Object::Reference(font_b) } },
        });
        doc.objects.insert(
            (1, 0),
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_a), Object::Reference(page_b)],
                "Count" => 2,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference((1, 0)),
        });
        doc.trailer.set("Root", Object::Reference(catalog));
        (doc, font_a, font_b, page_a, page_b)
    }

    #[test]
    fn equivalent_fonts_merge_to_one() {
        let (mut doc, font_a, font_b, page_a, page_b) = document_with_two_helveticas();
        doc.optimize();

        assert!(doc.has_object(font_a));
        assert!(!doc.has_object(font_b), "duplicate font must be swept");
        for page in [page_a, page_b] {
            let resources = doc.get_dictionary(page).unwrap().get(b"Resources").unwrap();
            let font_ref = resources
                .as_dict()
                .unwrap()
                .get(b"Font")
                .unwrap()
                .as_dict()
                .unwrap()
                .get(b"F1")
                .unwrap()
                .as_reference()
                .unwrap();
            assert_eq!(font_ref, font_a);
        }
        // The freed slot carries a bumped generation.
        assert!(matches!(
            doc.reference_table.get(font_b.0),
            Some(XrefEntry::Free { generation: 1, .. })
        ));
    }

    #[test]
    fn different_subset_prefixes_of_one_font_merge() {
        assert_eq!(strip_subset_prefix(b"ABCDEF+Carlito"), b"Carlito");
        assert_eq!(strip_subset_prefix(b"Carlito"), b"Carlito");
        assert_eq!(strip_subset_prefix(b"ABC+Carlito"), b"ABC+Carlito");
    }

    #[test]
    fn distinct_fonts_survive() {
        let (mut doc, font_a, font_b, ..) = document_with_two_helveticas();
        if let Object::Dictionary(font) = doc.objects.get_mut(&font_b).unwrap() {
            font.set("BaseFont", "Courier");
        }
        doc.optimize();
        assert!(doc.has_object(font_a));
        assert!(doc.has_object(font_b));
    }

    #[test]
    fn identical_images_merge() {
        let (mut doc, .., page_a, page_b) = document_with_two_helveticas();
        let payload = vec![1u8, 2, 3, 4, 5, 6];
        let make_image = |payload: &[u8]| {
            Object::Stream(Stream::new(
                dictionary! {
                    "Subtype" => "Image",
                    "Width" => 2,
                    "Height" => 3,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                },
                payload.to_vec(),
            ))
        };
        let image_a = doc.add_object(make_image(&payload));
        let image_b = doc.add_object(make_image(&payload));
        for (page, image) in [(page_a, image_a), (page_b, image_b)] {
            if let Object::Dictionary(dict) = doc.objects.get_mut(&page).unwrap() {
                dict.set(
                    "Resources",
                    dictionary! { "XObject" => dictionary! { "Im0" => Object::Reference(image) } },
                );
            }
        }

        doc.optimize();
        assert!(doc.has_object(image_a));
        assert!(!doc.has_object(image_b));
    }

    #[test]
    fn sweep_reclaims_orphans_and_is_idempotent() {
        let (mut doc, ..) = document_with_two_helveticas();
        let orphan = doc.add_object(Object::Integer(99));
        doc.optimize();
        assert!(!doc.has_object(orphan));

        let snapshot = doc.objects.clone();
        doc.optimize();
        assert_eq!(doc.objects, snapshot);
    }
}
