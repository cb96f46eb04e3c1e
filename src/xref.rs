use std::collections::BTreeMap;

/// The cross-reference table: object number to location of the object.
#[derive(Debug, Clone)]
pub struct Xref {
    /// How the table was represented in the source file, or how it should
    /// be written out.
    pub kind: XrefKind,
    pub entries: BTreeMap<u32, XrefEntry>,
    /// Value of the trailer `Size` entry: highest object number plus one.
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefKind {
    /// Classical `xref` section with 20-byte ASCII entries.
    CrossReferenceTable,
    /// Cross-reference stream (PDF 1.5).
    CrossReferenceStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Member of the free list. `generation` is the generation number to
    /// use when the slot is next reused.
    Free { next_free: u32, generation: u16 },
    /// Uncompressed object at a byte offset in the file.
    Normal { offset: u64, generation: u16 },
    /// Object stored inside the object stream `container`, at the given
    /// index. Compressed objects always have generation 0.
    Compressed { container: u32, index: u16 },
}

impl XrefEntry {
    pub fn is_normal(&self) -> bool {
        matches!(self, XrefEntry::Normal { .. })
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, XrefEntry::Compressed { .. })
    }

    pub fn is_free(&self) -> bool {
        matches!(self, XrefEntry::Free { .. })
    }
}

impl Xref {
    /// An empty table holding only the mandatory head of the free list.
    pub fn new(size: u32, kind: XrefKind) -> Xref {
        let mut entries = BTreeMap::new();
        entries.insert(
            0,
            XrefEntry::Free {
                next_free: 0,
                generation: u16::MAX,
            },
        );
        Xref { kind, entries, size }
    }

    pub fn get(&self, id: u32) -> Option<&XrefEntry> {
        self.entries.get(&id)
    }

    pub fn insert(&mut self, id: u32, entry: XrefEntry) {
        self.entries.insert(id, entry);
    }

    /// Merges an older cross-reference section into this one. Existing
    /// entries win: the newest section was read first.
    pub fn merge(&mut self, older: Xref) {
        for (id, entry) in older.entries {
            self.entries.entry(id).or_insert(entry);
        }
    }

    /// Overlays the hidden-object section of a hybrid-reference file.
    /// The classical table lists objects that actually live in object
    /// streams as free; the `XRefStm` entries for those slots win.
    pub fn merge_hybrid(&mut self, stream_section: Xref) {
        for (id, entry) in stream_section.entries {
            if id == 0 {
                continue;
            }
            let replace = match self.entries.get(&id).copied() {
                None => true,
                Some(XrefEntry::Free { .. }) => !entry.is_free(),
                Some(_) => false,
            };
            if replace {
                self.entries.insert(id, entry);
            }
        }
    }

    pub fn max_id(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    pub fn clear(&mut self) {
        *self = Xref::new(1, self.kind);
    }

    /// Links an entry into the head of the free list. The generation of a
    /// previously in-use entry is bumped, so the slot's next occupant gets
    /// a fresh generation; generation 0xFFFF slots are never reused.
    pub fn free_entry(&mut self, id: u32) {
        if id == 0 {
            return;
        }
        let generation = match self.entries.get(&id) {
            Some(XrefEntry::Normal { generation, .. }) => generation.saturating_add(1),
            Some(XrefEntry::Free { generation, .. }) => *generation,
            Some(XrefEntry::Compressed { .. }) | None => 1,
        };
        let head_next = match self.entries.get(&0) {
            Some(XrefEntry::Free { next_free, .. }) => *next_free,
            _ => 0,
        };
        self.entries.insert(
            id,
            XrefEntry::Free {
                next_free: head_next,
                generation,
            },
        );
        self.entries.insert(
            0,
            XrefEntry::Free {
                next_free: id,
                generation: u16::MAX,
            },
        );
    }
}

impl Default for Xref {
    fn default() -> Self {
        Xref::new(1, XrefKind::CrossReferenceTable)
    }
}
