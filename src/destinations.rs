//! Named destinations: the catalog's `Names.Dests` name tree (or the
//! old-style `Dests` dictionary) mapping names to jump targets.

use indexmap::IndexMap;

use crate::nametree::NameTree;
use crate::{Dictionary, Document, Object, Result};

/// One named destination: the page it points at and the view parameters.
#[derive(Debug, Clone)]
pub struct Destination(Dictionary);

impl Destination {
    /// Builds a destination from its array form `[page /Fit …]`.
    pub fn from_array(name: &[u8], target: &[Object]) -> Option<Self> {
        let page = target.first()?.clone();
        let kind = target.get(1).cloned().unwrap_or(Object::name("Fit"));
        let mut dict = Dictionary::new();
        dict.set("Title", Object::string_literal(name.to_vec()));
        dict.set("Page", page);
        dict.set("Type", kind);
        Some(Destination(dict))
    }

    pub fn title(&self) -> Result<&Object> {
        self.0.get(b"Title")
    }

    pub fn page(&self) -> Result<&Object> {
        self.0.get(b"Page")
    }

    pub fn kind(&self) -> Result<&Object> {
        self.0.get(b"Type")
    }
}

impl Document {
    /// Collects every named destination reachable from the catalog, in
    /// tree order.
    pub fn named_destinations(&self) -> Result<IndexMap<Vec<u8>, Destination>> {
        let mut destinations = IndexMap::new();
        let catalog = self.catalog()?;

        if let Ok(tree_root) = catalog
            .get(b"Names")
            .and_then(|names| self.dereference_dict(names))
            .and_then(|names| names.get(b"Dests"))
            .and_then(|dests| self.dereference_dict(dests))
        {
            let tree = NameTree::load(self, tree_root)?;
            for (name, value) in tree.iter() {
                self.collect_destination(name, value, &mut destinations);
            }
        }

        // Pre-1.2 files keep a plain dictionary on the catalog instead.
        if let Ok(dests) = catalog.get(b"Dests").and_then(|dests| self.dereference_dict(dests)) {
            for (name, value) in dests.iter() {
                self.collect_destination(name, value, &mut destinations);
            }
        }

        Ok(destinations)
    }

    fn collect_destination(
        &self, name: &[u8], value: &Object, destinations: &mut IndexMap<Vec<u8>, Destination>,
    ) {
        let Ok((_, resolved)) = self.dereference(value) else {
            return;
        };
        // The value is either the target array itself or a dictionary
        // wrapping it under D.
        let target = match resolved {
            Object::Array(array) => Some(array.clone()),
            Object::Dictionary(dict) => dict
                .get(b"D")
                .and_then(|d| self.dereference_array(d))
                .ok()
                .cloned(),
            _ => None,
        };
        if let Some(target) = target {
            if let Some(destination) = Destination::from_array(name, &target) {
                destinations.insert(name.to_vec(), destination);
            }
        }
    }
}
