use log::warn;
use std::collections::{HashMap, HashSet};

use super::Reader;
use crate::encryption::{self, EncryptionState};
use crate::error::ParseError;
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::xref::XrefEntry;
use crate::{Error, Object, ObjectId, Result};

impl Reader<'_> {
    /// Loading an encrypted document works in two phases: first the raw
    /// object bytes are collected without interpreting them, then, once a
    /// password authenticates, everything is parsed and decrypted.
    pub(super) fn load_encrypted_document(&mut self) -> Result<()> {
        let entries: Vec<_> = self
            .document
            .reference_table
            .entries
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();

        let mut compressed = Vec::new();
        for (number, entry) in entries {
            match entry {
                XrefEntry::Normal { offset, .. } => {
                    if let Ok((id, raw_bytes)) = self.extract_raw_object(offset as usize) {
                        self.raw_objects.insert(id, raw_bytes);
                    }
                }
                XrefEntry::Compressed { container, index } => {
                    compressed.push((number, container, index));
                }
                XrefEntry::Free { .. } => {}
            }
        }

        self.parse_encryption_dictionary()?;
        self.authenticate_and_setup_encryption()?;

        let Some(state) = self.encryption_state.clone() else {
            return Ok(());
        };

        let encrypt_ref = self
            .document
            .trailer
            .get(b"Encrypt")
            .ok()
            .and_then(|o| o.as_reference().ok());

        for (id, raw_bytes) in &self.raw_objects {
            if encrypt_ref == Some(*id) {
                continue;
            }
            match self.parse_raw_object(raw_bytes) {
                Ok((parsed_id, mut object)) => {
                    if let Err(err) = encryption::decrypt_object(&state, *id, &mut object) {
                        warn!("failed to decrypt object {} {}: {err}", id.0, id.1);
                    }
                    self.document.objects.insert(parsed_id, object);
                }
                Err(err) => warn!("skipping undecodable object {} {}: {err}", id.0, id.1),
            }
        }

        // Object streams were decrypted with their container above; their
        // members come out in cleartext.
        let mut containers: HashMap<u32, Vec<(u32, u16)>> = HashMap::new();
        for (number, container, index) in compressed {
            containers.entry(container).or_default().push((number, index));
        }
        for (container, members) in containers {
            let Some(container_obj) = self.document.objects.get_mut(&(container, 0)) else {
                continue;
            };
            let Ok(stream) = container_obj.as_stream_mut() else {
                continue;
            };
            match ObjectStream::new(stream) {
                Ok(object_stream) => {
                    for (number, _index) in members {
                        if let Some(object) = object_stream.objects.get(&(number, 0)) {
                            self.document.objects.entry((number, 0)).or_insert_with(|| object.clone());
                        }
                    }
                }
                Err(err) => warn!("failed to unpack object stream {container}: {err}"),
            }
        }

        self.document.encryption_state = Some(state);

        // The decrypted document stands on its own; the encryption
        // dictionary would be stale.
        if let Some(encrypt_ref) = encrypt_ref {
            self.document.objects.remove(&encrypt_ref);
        }
        self.document.trailer.remove(b"Encrypt");

        Ok(())
    }

    pub(super) fn parse_raw_object(&self, raw_bytes: &[u8]) -> Result<(ObjectId, Object)> {
        parser::indirect_object(
            ParserInput::new_extra(raw_bytes, "indirect object"),
            0,
            None,
            self,
            &mut HashSet::new(),
        )
    }

    pub(super) fn parse_encryption_dictionary(&mut self) -> Result<()> {
        if let Ok(encrypt_ref) = self.document.trailer.get(b"Encrypt").and_then(|o| o.as_reference()) {
            if let Some(raw_bytes) = self.raw_objects.get(&encrypt_ref) {
                if let Ok((_, object)) = self.parse_raw_object(raw_bytes) {
                    self.document.objects.insert(encrypt_ref, object);
                }
            } else if let Some(XrefEntry::Normal { offset, .. }) =
                self.document.reference_table.get(encrypt_ref.0).copied()
            {
                let (_, object) = self.read_object(offset as usize, Some(encrypt_ref), &mut HashSet::new())?;
                self.document.objects.insert(encrypt_ref, object);
            }
        }
        Ok(())
    }

    pub(super) fn authenticate_and_setup_encryption(&mut self) -> Result<()> {
        // The empty user password unlocks a surprising share of encrypted
        // files in circulation; try it before demanding one.
        let password = if self.document.authenticate_password("").is_ok() {
            String::new()
        } else if let Some(ref password) = self.options.password {
            if self.document.authenticate_password(password).is_err() {
                return Err(Error::InvalidPassword);
            }
            password.clone()
        } else {
            return Err(Error::PasswordRequired);
        };

        let state = EncryptionState::decode(&self.document, &password).map_err(Error::Decryption)?;
        self.encryption_state = Some(state);
        Ok(())
    }

    /// Slices one `N G obj … endobj` span out of the buffer without
    /// parsing its body.
    pub(super) fn extract_raw_object(&mut self, offset: usize) -> Result<(ObjectId, Vec<u8>)> {
        if offset > self.buffer.len() {
            return Err(Error::InvalidOffset(offset));
        }
        let slice = &self.buffer[offset..];

        let mut pos = 0;
        while pos < slice.len() && slice[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let number_start = pos;
        while pos < slice.len() && slice[pos].is_ascii_digit() {
            pos += 1;
        }
        let number: u32 = std::str::from_utf8(&slice[number_start..pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::Parse(ParseError::InvalidObject(offset)))?;

        while pos < slice.len() && slice[pos].is_ascii_whitespace() {
            pos += 1;
        }

        let generation_start = pos;
        while pos < slice.len() && slice[pos].is_ascii_digit() {
            pos += 1;
        }
        let generation: u16 = std::str::from_utf8(&slice[generation_start..pos])
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(Error::Parse(ParseError::InvalidObject(offset)))?;

        while pos < slice.len() && slice[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if !slice[pos..].starts_with(b"obj") {
            return Err(Error::Parse(ParseError::InvalidObject(offset)));
        }

        let end = parser::find_subslice(&slice[pos..], b"endobj")
            .map(|found| pos + found + b"endobj".len())
            .ok_or(Error::Parse(ParseError::InvalidObject(offset)))?;

        Ok(((number, generation), slice[..end].to_vec()))
    }
}
