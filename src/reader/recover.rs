//! Whole-file recovery: when the cross-reference data is missing or
//! lying, every `N G obj` header in the buffer becomes a candidate entry.

use std::collections::{BTreeMap, HashSet};

use log::warn;

use super::Reader;
use crate::document::Diagnostic;
use crate::error::ParseError;
use crate::parser::{self, ParserInput};
use crate::xref::{Xref, XrefEntry, XrefKind};
use crate::{Dictionary, Object, Result};

impl Reader<'_> {
    /// Rebuilds the cross-reference table and trailer from a full scan.
    /// For each object number the highest generation wins; among equals,
    /// the definition later in the file (the newer incremental update)
    /// wins.
    pub(super) fn recover(&mut self) -> Result<()> {
        let mut locations: BTreeMap<u32, (u16, usize)> = BTreeMap::new();
        for offset in self.scan_object_headers() {
            let Some((id, _)) = self
                .read_object(offset, None, &mut HashSet::new())
                .ok()
            else {
                continue;
            };
            match locations.get(&id.0) {
                Some(&(generation, _)) if generation > id.1 => {}
                _ => {
                    locations.insert(id.0, (id.1, offset));
                }
            }
        }
        if locations.is_empty() {
            return Err(ParseError::InvalidXref.into());
        }

        let mut xref = Xref::new(0, XrefKind::CrossReferenceTable);
        for (&number, &(generation, offset)) in &locations {
            xref.insert(
                number,
                XrefEntry::Normal {
                    offset: offset as u64,
                    generation,
                },
            );
        }
        xref.size = xref.max_id() + 1;

        let trailer = self.recover_trailer(&locations);
        self.report(Diagnostic::RebuiltXref {
            recovered_objects: locations.len(),
        });
        warn!("rebuilt cross-reference table with {} entries", locations.len());

        self.document.max_id = xref.size.saturating_sub(1);
        self.document.reference_table = xref;
        self.document.trailer = trailer;
        self.document.objects.clear();
        Ok(())
    }

    /// Byte offsets of plausible `N G obj` headers.
    fn scan_object_headers(&self) -> Vec<usize> {
        let buffer = self.buffer;
        let mut offsets = Vec::new();
        let mut pos = 0;
        while let Some(found) = parser::find_subslice(&buffer[pos..], b"obj") {
            let keyword = pos + found;
            pos = keyword + 3;
            // The keyword must terminate: "obj" then delimiter/whitespace.
            if let Some(&after) = buffer.get(keyword + 3) {
                if after.is_ascii_alphanumeric() {
                    continue;
                }
            }
            let Some(start) = Self::header_start(buffer, keyword) else {
                continue;
            };
            offsets.push(start);
        }
        offsets
    }

    /// Walks backwards from the `obj` keyword over `N G ` and yields the
    /// offset of `N`.
    fn header_start(buffer: &[u8], keyword: usize) -> Option<usize> {
        let mut pos = keyword;
        let step_back_over = |pos: &mut usize, test: fn(u8) -> bool| -> usize {
            let mut count = 0;
            while *pos > 0 && test(buffer[*pos - 1]) {
                *pos -= 1;
                count += 1;
            }
            count
        };
        if step_back_over(&mut pos, |b| b == b' ' || b == b'\r' || b == b'\n' || b == b'\t') == 0 {
            return None;
        }
        if step_back_over(&mut pos, |b| b.is_ascii_digit()) == 0 {
            return None;
        }
        if step_back_over(&mut pos, |b| b == b' ') == 0 {
            return None;
        }
        if step_back_over(&mut pos, |b| b.is_ascii_digit()) == 0 {
            return None;
        }
        Some(pos)
    }

    /// Looks for trailer dictionaries; failing that, promotes a scanned
    /// catalog object into a synthetic trailer.
    fn recover_trailer(&self, locations: &BTreeMap<u32, (u16, usize)>) -> Dictionary {
        let mut trailer = Dictionary::new();
        let mut search_from = 0;
        while let Some(found) = parser::find_subslice(&self.buffer[search_from..], b"trailer") {
            let start = search_from + found + b"trailer".len();
            search_from = start;
            let input = ParserInput::new_extra(&self.buffer[start..], "trailer");
            if let Some(Object::Dictionary(dict)) = parser::direct_object(input) {
                // Later trailers override earlier ones.
                for (key, value) in dict.iter() {
                    trailer.set(key.clone(), value.clone());
                }
            }
        }
        trailer.remove(b"Prev");
        trailer.remove(b"XRefStm");

        if !trailer.has(b"Root") {
            for (&number, &(generation, offset)) in locations {
                let Ok((_, object)) = self.read_object(offset, None, &mut HashSet::new()) else {
                    continue;
                };
                if object.as_dict().map(|d| d.has_type(b"Catalog")).unwrap_or(false) {
                    trailer.set("Root", Object::Reference((number, generation)));
                    break;
                }
            }
        }
        trailer.set("Size", (locations.keys().next_back().copied().unwrap_or(0) + 1) as i64);
        trailer
    }
}
