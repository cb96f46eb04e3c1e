//! The in-memory document: cross-reference table, materialized objects,
//! trailer, and the operations everything else builds on.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::warn;

use crate::encryption::{EncryptionSettings, EncryptionState, PasswordRole};
use crate::xref::Xref;
use crate::{Dictionary, Error, Object, ObjectId, Result};

/// A repair the reader performed on a non-conforming file. Relaxed-mode
/// loading fixes what it can and records what it fixed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A stream's `Length` entry disagreed with the scanned payload
    /// boundary and was rewritten.
    CorrectedStreamLength {
        offset: usize,
        declared: Option<i64>,
        actual: usize,
    },
    /// The cross-reference data was unusable; the table was rebuilt from
    /// a whole-file scan.
    RebuiltXref { recovered_objects: usize },
    /// An object failed to parse and was replaced by null.
    ReplacedMalformedObject { id: ObjectId },
    /// A reference pointed at an entry the document never defines and was
    /// resolved to null.
    DanglingReference { id: ObjectId },
}

/// A loaded (or under-construction) PDF document.
#[derive(Debug, Clone)]
pub struct Document {
    /// Version taken from the file header, e.g. "1.7".
    pub version: String,
    /// The high-bit comment bytes conventionally following the header.
    pub binary_mark: Vec<u8>,
    pub trailer: Dictionary,
    pub reference_table: Xref,
    /// Materialized objects. The xref table locates objects; this map
    /// owns them.
    pub objects: BTreeMap<ObjectId, Object>,
    /// Highest object number in use.
    pub max_id: u32,
    /// Byte offset the last cross-reference section was read from.
    pub xref_start: usize,
    /// Decryption context of an encrypted source file.
    pub encryption_state: Option<EncryptionState>,
    /// Encryption to apply when the document is next saved.
    pub encryption_settings: Option<EncryptionSettings>,
    diagnostics: Vec<Diagnostic>,
    abort: Option<Arc<AtomicBool>>,
}

impl Document {
    pub fn new() -> Document {
        Document::with_version("1.7")
    }

    pub fn with_version<V: Into<String>>(version: V) -> Document {
        Document {
            version: version.into(),
            binary_mark: vec![0xC2, 0xA5, 0xC2, 0xB1, 0xC3, 0xAB],
            trailer: Dictionary::new(),
            reference_table: Xref::default(),
            objects: BTreeMap::new(),
            max_id: 0,
            xref_start: 0,
            encryption_state: None,
            encryption_settings: None,
            diagnostics: Vec::new(),
            abort: None,
        }
    }

    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects.get_mut(&id).ok_or(Error::ObjectNotFound(id))
    }

    pub fn has_object(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Follows `object` through any chain of references to the value it
    /// finally names, along with the id of the last reference followed.
    ///
    /// A reference to a missing entry resolves to null, the way consumers
    /// of real-world files have to treat it; strict validation reports
    /// those separately.
    pub fn dereference<'a>(&'a self, object: &'a Object) -> Result<(Option<ObjectId>, &'a Object)> {
        static NULL: Object = Object::Null;
        let mut seen = HashSet::new();
        let mut current = object;
        let mut last_id = None;
        while let Object::Reference(id) = current {
            if !seen.insert(*id) {
                return Err(Error::ReferenceCycle(*id));
            }
            last_id = Some(*id);
            match self.objects.get(id) {
                Some(object) => current = object,
                None => return Ok((last_id, &NULL)),
            }
        }
        Ok((last_id, current))
    }

    /// Dereferences, then requires a dictionary (a stream's dictionary
    /// counts).
    pub fn get_dictionary(&self, id: ObjectId) -> Result<&Dictionary> {
        self.get_object(id).and_then(Object::as_dict)
    }

    /// Dereferences an arbitrary object down to a dictionary.
    pub fn dereference_dict<'a>(&'a self, object: &'a Object) -> Result<&'a Dictionary> {
        self.dereference(object).and_then(|(_, obj)| obj.as_dict())
    }

    /// Dereferences an arbitrary object down to an integer.
    pub fn dereference_int(&self, object: &Object) -> Result<i64> {
        self.dereference(object).and_then(|(_, obj)| obj.as_i64())
    }

    /// Dereferences an arbitrary object down to an array.
    pub fn dereference_array<'a>(&'a self, object: &'a Object) -> Result<&'a Vec<Object>> {
        self.dereference(object).and_then(|(_, obj)| obj.as_array())
    }

    /// The catalog dictionary the trailer's `Root` points at.
    pub fn catalog(&self) -> Result<&Dictionary> {
        self.trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .and_then(|id| self.get_dictionary(id))
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = self.trailer.get(b"Root").and_then(Object::as_reference)?;
        self.get_object_mut(id).and_then(Object::as_dict_mut)
    }

    /// The document information dictionary, when present.
    pub fn info(&self) -> Option<&Dictionary> {
        self.trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .and_then(|id| self.get_dictionary(id))
            .ok()
    }

    /// Allocates a fresh object number.
    pub fn new_object_id(&mut self) -> ObjectId {
        self.max_id += 1;
        (self.max_id, 0)
    }

    /// Adds `object` under a fresh number and returns its reference id.
    pub fn add_object<T: Into<Object>>(&mut self, object: T) -> ObjectId {
        self.max_id += 1;
        let id = (self.max_id, 0);
        self.objects.insert(id, object.into());
        id
    }

    /// Removes the object and returns its slot to the free list with a
    /// bumped generation, so the number is not silently reincarnated.
    pub fn free_object(&mut self, number: u32) {
        self.objects.retain(|id, _| id.0 != number);
        self.reference_table.free_entry(number);
    }

    /// Requests encryption on the next save: AES-256 with both passwords.
    /// Finer control goes through [`EncryptionSettings`] directly.
    pub fn set_password(&mut self, user: &str, owner: &str) {
        self.encryption_settings = Some(EncryptionSettings::with_passwords(user, owner));
    }

    pub fn set_encryption(&mut self, settings: EncryptionSettings) {
        self.encryption_settings = Some(settings);
    }

    /// Checks `password` against the encryption dictionary without
    /// decrypting anything.
    pub fn authenticate_password(&self, password: &str) -> Result<PasswordRole> {
        let state = EncryptionState::decode(self, password)?;
        Ok(state.role)
    }

    pub fn is_encrypted(&self) -> bool {
        self.trailer.get(b"Encrypt").is_ok()
    }

    /// The encryption dictionary, whether referenced or inlined in the
    /// trailer.
    pub fn encryption_dictionary(&self) -> Result<&Dictionary> {
        match self.trailer.get(b"Encrypt")? {
            Object::Reference(id) => self.get_dictionary(*id),
            Object::Dictionary(dict) => Ok(dict),
            other => Err(Error::Type {
                expected: "Dictionary",
                found: other.type_name(),
            }),
        }
    }

    /// Installs a flag that long operations (validate, optimize, save)
    /// poll between objects; setting it makes them stop with
    /// [`Error::Aborted`].
    pub fn set_abort_flag(&mut self, flag: Arc<AtomicBool>) {
        self.abort = Some(flag);
    }

    pub(crate) fn check_abort(&self) -> Result<()> {
        match &self.abort {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(Error::Aborted),
            _ => Ok(()),
        }
    }

    pub(crate) fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn report_all(&mut self, diagnostics: Vec<Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    /// What relaxed-mode loading had to repair to produce this document.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Calls `action` on every object reachable from `start`, following
    /// references, visiting each object once.
    pub fn traverse_from<F>(&self, start: &Object, action: &mut F)
    where
        F: FnMut(Option<ObjectId>, &Object),
    {
        let mut seen = HashSet::new();
        self.traverse_inner(start, None, action, &mut seen);
    }

    fn traverse_inner<F>(
        &self, object: &Object, id: Option<ObjectId>, action: &mut F, seen: &mut HashSet<ObjectId>,
    ) where
        F: FnMut(Option<ObjectId>, &Object),
    {
        match object {
            Object::Reference(target) => {
                if !seen.insert(*target) {
                    return;
                }
                match self.objects.get(target) {
                    Some(referenced) => self.traverse_inner(referenced, Some(*target), action, seen),
                    None => warn!("dangling reference {} {} R during traversal", target.0, target.1),
                }
            }
            Object::Array(items) => {
                action(id, object);
                for item in items {
                    self.traverse_inner(item, None, action, seen);
                }
            }
            Object::Dictionary(dict) => {
                action(id, object);
                for (_, value) in dict.iter() {
                    self.traverse_inner(value, None, action, seen);
                }
            }
            Object::Stream(stream) => {
                action(id, object);
                for (_, value) in stream.dict.iter() {
                    self.traverse_inner(value, None, action, seen);
                }
            }
            _ => action(id, object),
        }
    }

    /// Object ids reachable from the trailer.
    pub(crate) fn reachable_objects(&self) -> HashSet<ObjectId> {
        let mut reachable = HashSet::new();
        let trailer = Object::Dictionary(self.trailer.clone());
        let mut collect = |id: Option<ObjectId>, _: &Object| {
            if let Some(id) = id {
                reachable.insert(id);
            }
        };
        self.traverse_from(&trailer, &mut collect);
        reachable
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}
