//! Loading documents: locating the cross-reference data, chaining
//! previous sections, materializing objects, recovering broken files.

mod encrypted;
mod load;
mod metadata;
mod object_loader;
mod recover;

#[cfg(test)]
mod tests;

use log::{error, warn};
use std::cmp;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::document::Diagnostic;
use crate::encryption::EncryptionState;
use crate::error::{ParseError, XrefError};
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::xref::XrefEntry;
use crate::{Document, Error, Object, ObjectId, Result};

pub use load::ReadOptions;
pub use metadata::PdfMetadata;

/// Maximum allowed embedding of literal strings.
pub const MAX_BRACKET: usize = 100;

/// How far from the end of the file the `startxref` marker may sit.
const STRICT_TAIL_WINDOW: usize = 1024;
const RELAXED_TAIL_WINDOW: usize = 64 * 1024;

pub struct Reader<'a> {
    pub buffer: &'a [u8],
    pub document: Document,
    pub options: ReadOptions,
    pub(crate) encryption_state: Option<EncryptionState>,
    pub(crate) raw_objects: BTreeMap<ObjectId, Vec<u8>>,
    diagnostics: Mutex<Vec<Diagnostic>>,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buffer: &'a [u8], document: Document, options: ReadOptions) -> Reader<'a> {
        Reader {
            buffer,
            document,
            options,
            encryption_state: None,
            raw_objects: BTreeMap::new(),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn is_relaxed(&self) -> bool {
        self.options.relaxed
    }

    pub(crate) fn honors_xref_streams(&self) -> bool {
        self.options.reader_v15
    }

    pub(crate) fn report(&self, diagnostic: Diagnostic) {
        self.diagnostics
            .lock()
            .expect("diagnostics mutex poisoned")
            .push(diagnostic);
    }

    pub(crate) fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diagnostics.lock().expect("diagnostics mutex poisoned"))
    }

    /// Read whole document.
    pub fn read(mut self) -> Result<Document> {
        // The document structure can be expressed in PEG as:
        //   document <- header indirect_object* xref trailer xref_start
        let header_window = if self.is_relaxed() {
            self.buffer.len()
        } else {
            cmp::min(self.buffer.len(), STRICT_TAIL_WINDOW)
        };
        let offset = self.buffer[..header_window]
            .windows(5)
            .position(|w| w == b"%PDF-")
            .unwrap_or(0);
        self.buffer = &self.buffer[offset..];

        let version =
            parser::header(ParserInput::new_extra(self.buffer, "header")).ok_or(ParseError::InvalidFileHeader)?;

        // The binary mark is the comment line after the version; only
        // all-high-bit marks are worth round-tripping.
        if let Some(pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            if let Some(binary_mark) =
                parser::binary_mark(ParserInput::new_extra(&self.buffer[pos + 1..], "binary_mark"))
            {
                if !binary_mark.is_empty() && binary_mark.iter().all(|&byte| byte >= 128) {
                    self.document.binary_mark = binary_mark;
                }
            }
        }
        self.document.version = version;

        match self.read_xref_chain() {
            Ok(()) => {}
            Err(err) if self.is_relaxed() => {
                warn!("cross-reference data unusable ({err}); rebuilding from a full scan");
                self.recover()?;
                let document = self.finish_load()?;
                return Ok(document);
            }
            Err(err) => return Err(err),
        }

        let document = self.finish_load()?;
        Ok(document)
    }

    fn finish_load(&mut self) -> Result<Document> {
        // Check if encrypted
        let is_encrypted = self.document.trailer.get(b"Encrypt").is_ok();
        if is_encrypted {
            self.load_encrypted_document()?;
        } else {
            self.load_objects_raw()?;
        }

        if self.document.trailer.get(b"Root").and_then(Object::as_reference).is_err() {
            if self.is_relaxed() {
                warn!("trailer has no usable Root entry; rebuilding from a full scan");
                self.recover()?;
                self.load_objects_raw()?;
            } else {
                return Err(Error::Parse(ParseError::InvalidTrailer));
            }
        }

        let diagnostics = self.take_diagnostics();
        self.document.report_all(diagnostics);
        Ok(std::mem::take(&mut self.document))
    }

    fn read_xref_chain(&mut self) -> Result<()> {
        let xref_start = Self::get_xref_start(self.buffer, self.tail_window())?;
        if xref_start > self.buffer.len() {
            return Err(Error::Xref(XrefError::Start));
        }
        self.document.xref_start = xref_start;

        let (mut xref, mut trailer) =
            parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[xref_start..], "xref"), self)
                .map_err(|err| match err {
                    Error::Parse(_) => Error::Xref(XrefError::Corrupt),
                    other => other,
                })?;

        // Read previous xrefs of linearized or incrementally updated
        // documents, newest first, with hybrid xref-stream overlays.
        let mut already_seen = HashSet::new();
        loop {
            if let Some(stm) = trailer.remove(b"XRefStm").and_then(|offset| offset.as_i64().ok()) {
                if stm < 0 || stm as usize > self.buffer.len() {
                    return Err(Error::Xref(XrefError::StreamStart));
                }
                let (stream_xref, _) =
                    parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[stm as usize..], "xrefstm"), self)?;
                xref.merge_hybrid(stream_xref);
            }

            let Some(prev) = trailer.remove(b"Prev").and_then(|offset| offset.as_i64().ok()) else {
                break;
            };
            if !already_seen.insert(prev) {
                break;
            }
            if prev < 0 || prev as usize > self.buffer.len() {
                return Err(Error::Xref(XrefError::PrevStart));
            }
            let (prev_xref, prev_trailer) =
                parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[prev as usize..], "xref"), self)?;
            xref.merge(prev_xref);
            for (key, value) in prev_trailer.iter() {
                if key == b"Prev" || key == b"XRefStm" {
                    trailer.set(key.clone(), value.clone());
                }
            }
        }

        let xref_entry_count = xref.max_id().checked_add(1).ok_or(ParseError::InvalidXref)?;
        if xref.size != xref_entry_count {
            warn!(
                "Size entry of trailer dictionary is {}, correct value is {}.",
                xref.size, xref_entry_count
            );
            xref.size = xref_entry_count;
        }

        self.document.max_id = xref.size.saturating_sub(1);
        self.document.reference_table = xref;
        self.document.trailer = trailer;
        Ok(())
    }

    fn tail_window(&self) -> usize {
        if self.is_relaxed() { RELAXED_TAIL_WINDOW } else { STRICT_TAIL_WINDOW }
    }

    pub(crate) fn load_objects_raw(&mut self) -> Result<()> {
        let deferred_streams = Mutex::new(vec![]);
        let object_streams = Mutex::new(vec![]);
        let fatal: Mutex<Option<Error>> = Mutex::new(None);
        let expand_object_streams = self.options.reader_v15;

        let entries_filter_map = |(&id, entry): (&u32, &XrefEntry)| {
            if let XrefEntry::Normal { offset, generation } = *entry {
                let result = self.read_object(offset as usize, Some((id, generation)), &mut HashSet::new());
                let (object_id, mut object) = match result {
                    Ok(ok) => ok,
                    Err(e) => {
                        error!("Object load error at offset {}: {e:?}", offset);
                        if self.is_relaxed() {
                            self.report(Diagnostic::ReplacedMalformedObject { id: (id, generation) });
                            return Some(((id, generation), Object::Null));
                        }
                        fatal.lock().expect("fatal mutex poisoned").get_or_insert(e);
                        return None;
                    }
                };

                if let Ok(stream) = object.as_stream_mut() {
                    if stream.dict.has_type(b"ObjStm") && expand_object_streams {
                        if let Ok(object_stream) = ObjectStream::new(stream) {
                            let mut object_streams = object_streams.lock().expect("object_streams mutex poisoned");
                            object_streams.extend(object_stream.objects);
                        }
                    } else if stream.content.is_empty() && stream.start_position.is_some() {
                        let mut deferred_streams =
                            deferred_streams.lock().expect("deferred_streams mutex poisoned");
                        deferred_streams.push(object_id);
                    }
                }

                Some((object_id, object))
            } else {
                None
            }
        };

        #[cfg(feature = "rayon")]
        {
            self.document.objects = self
                .document
                .reference_table
                .entries
                .par_iter()
                .filter_map(entries_filter_map)
                .collect();
        }
        #[cfg(not(feature = "rayon"))]
        {
            self.document.objects = self
                .document
                .reference_table
                .entries
                .iter()
                .filter_map(entries_filter_map)
                .collect();
        }

        if let Some(err) = fatal.into_inner().expect("fatal mutex poisoned") {
            return Err(err);
        }

        // First definition wins for duplicate ids; an uncompressed
        // definition outranks a compressed one.
        for (id, entry) in object_streams.into_inner().expect("object_streams mutex poisoned") {
            self.document.objects.entry(id).or_insert(entry);
        }

        for object_id in deferred_streams.into_inner().expect("deferred_streams mutex poisoned") {
            if let Err(err) = self.resolve_deferred_stream(object_id) {
                error!(
                    "payload of stream {} {} not recovered: {err}",
                    object_id.0, object_id.1
                );
                if !self.is_relaxed() {
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    fn get_xref_start(buffer: &[u8], window: usize) -> Result<usize> {
        let seek_pos = buffer.len() - cmp::min(buffer.len(), window);
        Self::search_substring(buffer, b"%%EOF", seek_pos)
            .and_then(|eof_pos| if eof_pos > 25 { Some(eof_pos) } else { None })
            .and_then(|eof_pos| Self::search_substring(buffer, b"startxref", eof_pos - 25))
            .or_else(|| Self::search_substring(buffer, b"startxref", seek_pos))
            .ok_or(Error::Xref(XrefError::Start))
            .and_then(|xref_pos| {
                if xref_pos <= buffer.len() {
                    match parser::xref_start(ParserInput::new_extra(&buffer[xref_pos..], "xref")) {
                        Some(startxref) if startxref >= 0 => Ok(startxref as usize),
                        _ => Err(Error::Xref(XrefError::Start)),
                    }
                } else {
                    Err(Error::Xref(XrefError::Start))
                }
            })
    }

    pub(crate) fn search_substring(buffer: &[u8], pattern: &[u8], start_pos: usize) -> Option<usize> {
        buffer
            .get(start_pos..)?
            .windows(pattern.len())
            .rposition(|window| window == pattern)
            .map(|pos| start_pos + pos)
    }
}
