use log::warn;
use std::collections::HashSet;

use super::Reader;
use crate::document::Diagnostic;
use crate::encryption;
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::xref::XrefEntry;
use crate::{Error, Object, ObjectId, Result};

impl Reader<'_> {
    /// Resolves one object by id against the source buffer, decrypting it
    /// when an encryption context is active. `already_seen` bounds the
    /// recursion that resolving can trigger (object streams, indirect
    /// stream lengths).
    pub fn get_object(&self, id: ObjectId, already_seen: &mut HashSet<ObjectId>) -> Result<Object> {
        if !already_seen.insert(id) {
            warn!("reference cycle detected resolving object {} {}", id.0, id.1);
            return Err(Error::ReferenceCycle(id));
        }

        let entry = self
            .document
            .reference_table
            .get(id.0)
            .copied()
            .ok_or(Error::MissingXrefEntry)?;
        let mut object = match entry {
            XrefEntry::Normal { offset, generation } if generation == id.1 => {
                self.read_object(offset as usize, Some(id), already_seen)?.1
            }
            XrefEntry::Compressed { container, .. } => {
                self.unpack_compressed(id.0, container, already_seen)?
            }
            _ => return Err(Error::MissingXrefEntry),
        };

        if let Some(ref state) = self.encryption_state {
            let encrypt_ref = self
                .document
                .trailer
                .get(b"Encrypt")
                .ok()
                .and_then(|o| o.as_reference().ok());
            if encrypt_ref != Some(id) {
                encryption::decrypt_object(state, id, &mut object).map_err(Error::Decryption)?;
            }
        }

        Ok(object)
    }

    /// Fetches one object out of the object stream holding it. The shared
    /// seen-set keeps a container whose members point back at it from
    /// recursing forever.
    fn unpack_compressed(
        &self, number: u32, container: u32, already_seen: &mut HashSet<ObjectId>,
    ) -> Result<Object> {
        let container_object = self.get_object((container, 0), already_seen)?;
        let mut container_stream = container_object.as_stream()?.clone();
        ObjectStream::new(&mut container_stream)?
            .objects
            .remove(&(number, 0))
            .ok_or(Error::MissingXrefEntry)
    }

    pub(super) fn read_object(
        &self, offset: usize, expected_id: Option<ObjectId>, already_seen: &mut HashSet<ObjectId>,
    ) -> Result<(ObjectId, Object)> {
        parser::indirect_object(
            ParserInput::new_extra(self.buffer, "indirect object"),
            offset,
            expected_id,
            self,
            already_seen,
        )
    }

    /// Second pass over streams whose `Length` was an indirect reference
    /// that could not be resolved while the object itself was parsed.
    ///
    /// With the whole table loaded the reference usually resolves and the
    /// payload is a straight slice. When it still does not — the length
    /// object is missing, cyclic, or not a number, which is routine in
    /// files whose xref needed reconstruction — the payload boundary is
    /// recovered by scanning for `endstream`, the dictionary is repaired,
    /// and the repair is recorded. Strict loads refuse instead.
    pub(super) fn resolve_deferred_stream(&mut self, object_id: ObjectId) -> Result<()> {
        let stream = self
            .document
            .get_object(object_id)
            .and_then(Object::as_stream)?;
        let start = stream
            .start_position
            .ok_or_else(|| Error::InvalidStream("missing start position".to_string()))?;
        if start > self.buffer.len() {
            return Err(Error::InvalidOffset(start));
        }
        let declared = stream
            .dict
            .get(b"Length")
            .and_then(|value| self.document.dereference(value))
            .and_then(|(_, value)| value.as_i64())
            .ok();

        let resolved_end = declared.and_then(|length| {
            let length = usize::try_from(length).ok()?;
            let end = start.checked_add(length)?;
            (end <= self.buffer.len()).then_some(end)
        });

        let end = match resolved_end {
            Some(end) => end,
            None => {
                if !self.is_relaxed() {
                    return Err(Error::InvalidStream(format!(
                        "length of stream {} {} cannot be resolved",
                        object_id.0, object_id.1
                    )));
                }
                let scanned = parser::scan_stream_payload(&self.buffer[start..]).ok_or_else(|| {
                    Error::InvalidStream("stream is not terminated by endstream".to_string())
                })?;
                warn!(
                    "recovered the payload boundary of stream {} {} by scanning for endstream",
                    object_id.0, object_id.1
                );
                self.report(Diagnostic::CorrectedStreamLength {
                    offset: start,
                    declared,
                    actual: scanned,
                });
                start + scanned
            }
        };

        let content = self.buffer[start..end].to_vec();
        self.document
            .get_object_mut(object_id)
            .and_then(Object::as_stream_mut)?
            .set_content(content);
        Ok(())
    }
}
