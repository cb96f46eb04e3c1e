//! Page tree traversal: numbering the leaves and resolving the attributes
//! a page inherits from its ancestors.

use std::collections::BTreeMap;
use std::collections::HashSet;

use log::warn;

use crate::{Dictionary, Document, Error, Object, ObjectId, Result};

/// Attributes a `Page` leaf picked up on the path from the tree root.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InheritedAttrs {
    pub resources: Option<Object>,
    pub media_box: Option<Object>,
    pub crop_box: Option<Object>,
    pub rotate: Option<i64>,
}

impl InheritedAttrs {
    /// Takes over any of the four inheritable entries `dict` defines.
    fn absorb(&mut self, dict: &Dictionary) {
        if let Ok(resources) = dict.get(b"Resources") {
            self.resources = Some(resources.clone());
        }
        if let Ok(media_box) = dict.get(b"MediaBox") {
            self.media_box = Some(media_box.clone());
        }
        if let Ok(crop_box) = dict.get(b"CropBox") {
            self.crop_box = Some(crop_box.clone());
        }
        if let Ok(rotate) = dict.get(b"Rotate").and_then(Object::as_i64) {
            self.rotate = Some(rotate);
        }
    }

    /// Writes the inherited values into `page`, for entries the page does
    /// not define itself.
    fn consolidate_into(&self, page: &mut Dictionary) {
        if let Some(resources) = &self.resources {
            if !page.has(b"Resources") {
                page.set("Resources", resources.clone());
            }
        }
        if let Some(media_box) = &self.media_box {
            if !page.has(b"MediaBox") {
                page.set("MediaBox", media_box.clone());
            }
        }
        if let Some(crop_box) = &self.crop_box {
            if !page.has(b"CropBox") {
                page.set("CropBox", crop_box.clone());
            }
        }
        if let Some(rotate) = self.rotate {
            if !page.has(b"Rotate") {
                page.set("Rotate", rotate);
            }
        }
    }
}

impl Document {
    fn pages_root(&self) -> Result<ObjectId> {
        self.catalog()?
            .get(b"Pages")
            .and_then(Object::as_reference)
    }

    /// Numbers every `Page` leaf, depth first, starting at 1.
    pub fn get_pages(&self) -> BTreeMap<u32, ObjectId> {
        let mut pages = BTreeMap::new();
        let Ok(root) = self.pages_root() else {
            return pages;
        };
        let mut seen = HashSet::new();
        let mut next_number = 1u32;
        self.collect_pages(root, &mut pages, &mut next_number, &mut seen);
        pages
    }

    fn collect_pages(
        &self, node_id: ObjectId, pages: &mut BTreeMap<u32, ObjectId>, next_number: &mut u32,
        seen: &mut HashSet<ObjectId>,
    ) {
        if !seen.insert(node_id) {
            warn!("page tree cycle through {} {}", node_id.0, node_id.1);
            return;
        }
        let Ok(node) = self.get_dictionary(node_id) else {
            return;
        };
        if node.has_type(b"Pages") {
            let kids = match node.get(b"Kids").and_then(Object::as_array) {
                Ok(kids) => kids,
                Err(_) => return,
            };
            for kid in kids {
                if let Ok(kid_id) = kid.as_reference() {
                    self.collect_pages(kid_id, pages, next_number, seen);
                }
            }
        } else {
            // Leaves without a Type are treated as pages; broken files
            // drop the entry surprisingly often.
            pages.insert(*next_number, node_id);
            *next_number += 1;
        }
    }

    /// The number of `Page` leaves, as the root `Count` entry claims it.
    pub fn page_count(&self) -> Result<i64> {
        let root = self.pages_root()?;
        self.get_dictionary(root)?
            .get(b"Count")
            .and_then(Object::as_i64)
    }

    /// Resolves 1-based `page_number` to its dictionary and the
    /// attributes inherited along the way. With `consolidate`, the
    /// inherited entries are materialized on the returned copy.
    pub fn page_dict(&self, page_number: u32, consolidate: bool) -> Result<(Dictionary, InheritedAttrs)> {
        if page_number == 0 {
            return Err(Error::PageNumberNotFound(0));
        }
        let root = self.pages_root()?;
        let mut attrs = InheritedAttrs::default();
        let mut remaining = page_number;
        let mut seen = HashSet::new();
        let found = self.descend_to_page(root, &mut remaining, &mut attrs, &mut seen)?;
        let Some(page_id) = found else {
            return Err(Error::PageNumberNotFound(page_number));
        };
        let mut page = self.get_dictionary(page_id)?.clone();
        if consolidate {
            attrs.consolidate_into(&mut page);
        }
        Ok((page, attrs))
    }

    fn descend_to_page(
        &self, node_id: ObjectId, remaining: &mut u32, attrs: &mut InheritedAttrs,
        seen: &mut HashSet<ObjectId>,
    ) -> Result<Option<ObjectId>> {
        if !seen.insert(node_id) {
            return Err(Error::ReferenceCycle(node_id));
        }
        let node = self.get_dictionary(node_id)?;
        if node.has_type(b"Pages") {
            attrs.absorb(node);
            let saved = attrs.clone();
            for kid in node.get(b"Kids").and_then(Object::as_array)? {
                let kid_id = kid.as_reference()?;
                if let Some(found) = self.descend_to_page(kid_id, remaining, attrs, seen)? {
                    return Ok(Some(found));
                }
                // Siblings must not see a cousin's attributes.
                *attrs = saved.clone();
            }
            return Ok(None);
        }
        *remaining -= 1;
        if *remaining == 0 { Ok(Some(node_id)) } else { Ok(None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn nested_tree_document() -> Document {
        let mut doc = Document::new();
        // Reserve ids: 1 root Pages, 2 inner Pages, 3..5 pages.
        doc.max_id = 5;
        doc.objects.insert(
            (1, 0),
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 3,
                "Kids" => vec![Object::Reference((3, 0)), Object::Reference((2, 0))],
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Resources" => dictionary! { "Font" => dictionary! { "F1" => Object::Reference((6, 0)) } },
            }),
        );
        doc.objects.insert(
            (2, 0),
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Count" => 2,
                "Parent" => Object::Reference((1, 0)),
                "Kids" => vec![Object::Reference((4, 0)), Object::Reference((5, 0))],
                "Rotate" => 90,
            }),
        );
        doc.objects.insert(
            (3, 0),
            Object::Dictionary(dictionary! { "Type" => "Page", "Parent" => Object::Reference((1, 0)) }),
        );
        doc.objects.insert(
            (4, 0),
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => Object::Reference((2, 0)),
                "MediaBox" => vec![0.into(), 0.into(), 200.into(), 200.into()],
            }),
        );
        doc.objects.insert(
            (5, 0),
            Object::Dictionary(dictionary! { "Type" => "Page", "Parent" => Object::Reference((2, 0)) }),
        );
        let catalog = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => Object::Reference((1, 0)) });
        doc.trailer.set("Root", Object::Reference(catalog));
        doc
    }

    #[test]
    fn pages_are_numbered_depth_first() {
        let doc = nested_tree_document();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);
        assert_eq!(pages[&1], (3, 0));
        assert_eq!(pages[&2], (4, 0));
        assert_eq!(pages[&3], (5, 0));
        assert_eq!(doc.page_count().unwrap(), 3);
    }

    #[test]
    fn attributes_inherit_down_the_path() {
        let doc = nested_tree_document();
        let (_, attrs) = doc.page_dict(3, false).unwrap();
        assert_eq!(attrs.rotate, Some(90));
        assert!(attrs.media_box.is_some());
        assert!(attrs.resources.is_some());

        // Page 1 sits outside the rotated subtree.
        let (_, attrs) = doc.page_dict(1, false).unwrap();
        assert_eq!(attrs.rotate, None);
    }

    #[test]
    fn page_own_entries_beat_inherited_ones() {
        let doc = nested_tree_document();
        let (page, _) = doc.page_dict(2, true).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_i64().unwrap(), 200);
        // Rotate comes from the inner Pages node.
        assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
    }

    #[test]
    fn missing_page_number_errors() {
        let doc = nested_tree_document();
        assert!(matches!(doc.page_dict(4, false), Err(Error::PageNumberNotFound(4))));
    }
}
