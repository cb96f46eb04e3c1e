//! Serializing a document back into PDF bytes.
//!
//! The writer always produces a consolidated file: one body of objects in
//! ascending number order, one cross-reference section (classical table
//! or xref stream), one trailer. Dictionary entry order is preserved so
//! rewritten files diff cleanly.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use rand::RngCore;

use crate::encryption::{self, EncryptionState};
use crate::object_stream::{ObjectStreamBuilder, ObjectStreamConfig};
use crate::xref::XrefEntry;
use crate::{Dictionary, Document, Error, Object, ObjectId, Result, Stream, StringFormat};

/// End-of-line style for the file framing (header, object wrappers,
/// cross-reference section, trailer). Stream payloads are verbatim and
/// never touched by this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndOfLine {
    #[default]
    Lf,
    Cr,
    CrLf,
}

impl EndOfLine {
    fn as_bytes(&self) -> &'static [u8] {
        match self {
            EndOfLine::Lf => b"\n",
            EndOfLine::Cr => b"\r",
            EndOfLine::CrLf => b"\r\n",
        }
    }

    /// The two bytes closing a 20-byte classical xref entry.
    fn xref_entry_tail(&self) -> &'static [u8] {
        match self {
            EndOfLine::Lf => b" \n",
            EndOfLine::Cr => b" \r",
            EndOfLine::CrLf => b"\r\n",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Emit the cross-reference data as an xref stream (PDF 1.5).
    pub use_xref_streams: bool,
    /// Pack eligible objects into object streams. Implies
    /// `use_xref_streams`.
    pub use_object_streams: bool,
    pub eol: EndOfLine,
    pub object_stream_config: ObjectStreamConfig,
}

impl SaveOptions {
    pub fn builder() -> SaveOptionsBuilder {
        SaveOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveOptionsBuilder {
    options: SaveOptions,
}

impl SaveOptionsBuilder {
    pub fn use_xref_streams(mut self, value: bool) -> Self {
        self.options.use_xref_streams = value;
        self
    }

    pub fn use_object_streams(mut self, value: bool) -> Self {
        self.options.use_object_streams = value;
        self
    }

    pub fn eol(mut self, eol: EndOfLine) -> Self {
        self.options.eol = eol;
        self
    }

    pub fn object_stream_config(mut self, config: ObjectStreamConfig) -> Self {
        self.options.object_stream_config = config;
        self
    }

    pub fn build(mut self) -> SaveOptions {
        // Compressed objects can only be located through an xref stream.
        if self.options.use_object_streams {
            self.options.use_xref_streams = true;
        }
        self.options
    }
}

impl Document {
    /// Save the document to a file path.
    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> Result<File> {
        let mut file = BufWriter::new(File::create(path)?);
        self.save_internal(&mut file, &SaveOptions::default())?;
        Ok(file.into_inner().map_err(|err| Error::Io(err.into_error()))?)
    }

    /// Save the document to any sink with default options.
    pub fn save_to<W: Write>(&mut self, target: &mut W) -> Result<()> {
        self.save_internal(target, &SaveOptions::default())
    }

    pub fn save_with_options<W: Write>(&mut self, target: &mut W, options: SaveOptions) -> Result<()> {
        self.save_internal(target, &options)
    }

    fn save_internal<W: Write>(&mut self, target: &mut W, options: &SaveOptions) -> Result<()> {
        let bytes = Writer::write_document(self, options)?;
        target.write_all(&bytes)?;
        Ok(())
    }
}

pub(crate) struct Writer;

impl Writer {
    pub(crate) fn write_document(document: &mut Document, options: &SaveOptions) -> Result<Vec<u8>> {
        let eol = options.eol.as_bytes();

        let (encrypt_state, encrypt_id) = Self::setup_encryption(document)?;

        // Divert eligible objects into object streams before emission.
        // The containers stay local to this write; they are not part of
        // the document's own graph.
        let mut packed: BTreeMap<ObjectId, (u32, u16)> = BTreeMap::new();
        let mut containers: Vec<(ObjectId, Object)> = Vec::new();
        if options.use_object_streams {
            let eligible: BTreeMap<ObjectId, Object> = document
                .objects
                .iter()
                .filter(|&(&id, object)| {
                    Some(id) != encrypt_id && ObjectStreamBuilder::is_eligible(id, object)
                })
                .map(|(id, object)| (*id, object.clone()))
                .collect();
            let builder = ObjectStreamBuilder::new(options.object_stream_config.clone());
            for section in builder.build_object_streams(&eligible)? {
                let container = document.new_object_id();
                for (index, member) in section.members.iter().enumerate() {
                    packed.insert(*member, (container.0, index as u16));
                }
                containers.push((container, Object::Stream(section.stream)));
            }
        }

        let mut out = Vec::new();
        out.extend_from_slice(b"%PDF-");
        out.extend_from_slice(document.version.as_bytes());
        out.extend_from_slice(eol);
        out.push(b'%');
        out.extend_from_slice(&document.binary_mark);
        out.extend_from_slice(eol);

        // Carry the free list over; in-use entries are rebuilt below.
        let mut entries: BTreeMap<u32, XrefEntry> = document
            .reference_table
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_free())
            .map(|(&id, &entry)| (id, entry))
            .collect();
        entries.entry(0).or_insert(XrefEntry::Free {
            next_free: 0,
            generation: u16::MAX,
        });

        for (&id, object) in document.objects.iter().chain(containers.iter().map(|(id, obj)| (id, obj))) {
            document.check_abort()?;
            if let Some(&(container, index)) = packed.get(&id) {
                entries.insert(id.0, XrefEntry::Compressed { container, index });
                continue;
            }
            entries.insert(
                id.0,
                XrefEntry::Normal {
                    offset: out.len() as u64,
                    generation: id.1,
                },
            );
            let encrypt_with = encrypt_state.as_ref().filter(|_| Some(id) != encrypt_id);
            Self::write_indirect_object(&mut out, id, object, encrypt_with, eol)?;
        }

        let use_xref_streams = options.use_xref_streams || options.use_object_streams;
        let startxref = if use_xref_streams {
            Self::write_xref_stream(document, &mut out, entries)?
        } else {
            Self::write_xref_table(document, &mut out, entries, options)?
        };

        out.extend_from_slice(b"startxref");
        out.extend_from_slice(eol);
        let mut formatter = itoa::Buffer::new();
        out.extend_from_slice(formatter.format(startxref).as_bytes());
        out.extend_from_slice(eol);
        out.extend_from_slice(b"%%EOF");
        out.extend_from_slice(eol);
        Ok(out)
    }

    /// When encryption is requested, produce the file identifier, the
    /// encryption dictionary and the live state used while emitting.
    fn setup_encryption(document: &mut Document) -> Result<(Option<EncryptionState>, Option<ObjectId>)> {
        let Some(settings) = document.encryption_settings.clone() else {
            return Ok((None, None));
        };
        // A previous save may have left its encryption dictionary behind.
        if let Ok(stale) = document.trailer.get(b"Encrypt").and_then(Object::as_reference) {
            document.objects.remove(&stale);
        }
        let mut rng = rand::rng();
        let mut id_half = [0u8; 16];
        rng.fill_bytes(&mut id_half);
        let first_id = id_half.to_vec();
        rng.fill_bytes(&mut id_half);
        document.trailer.set(
            "ID",
            vec![
                Object::String(first_id.clone(), StringFormat::Hexadecimal),
                Object::String(id_half.to_vec(), StringFormat::Hexadecimal),
            ],
        );

        let (state, dict) = EncryptionState::generate(&settings, &first_id).map_err(Error::Decryption)?;
        let encrypt_id = document.add_object(dict);
        document.trailer.set("Encrypt", Object::Reference(encrypt_id));
        if settings.key_length == 256 {
            document.version = "2.0".to_string();
        } else if document.version.as_str() < "1.5" {
            document.version = "1.5".to_string();
        }
        Ok((Some(state), Some(encrypt_id)))
    }

    fn write_indirect_object(
        out: &mut Vec<u8>, id: ObjectId, object: &Object, encrypt: Option<&EncryptionState>, eol: &[u8],
    ) -> Result<()> {
        let mut formatter = itoa::Buffer::new();
        out.extend_from_slice(formatter.format(id.0).as_bytes());
        out.push(b' ');
        out.extend_from_slice(formatter.format(id.1).as_bytes());
        out.extend_from_slice(b" obj");
        out.extend_from_slice(eol);

        match encrypt {
            Some(state) => {
                let mut encrypted = object.clone();
                Self::refresh_stream_length(&mut encrypted);
                encryption::encrypt_object(state, id, &mut encrypted).map_err(Error::Decryption)?;
                Self::serialize_object(out, &encrypted)?;
            }
            None => {
                let mut plain = object.clone();
                Self::refresh_stream_length(&mut plain);
                Self::serialize_object(out, &plain)?;
            }
        }

        out.extend_from_slice(eol);
        out.extend_from_slice(b"endobj");
        out.extend_from_slice(eol);
        Ok(())
    }

    /// The Length entry must equal the payload the file will actually
    /// carry; mutation may have left it stale.
    fn refresh_stream_length(object: &mut Object) {
        if let Object::Stream(stream) = object {
            stream.dict.set("Length", stream.content.len() as i64);
        }
    }

    pub(crate) fn serialize_object(out: &mut Vec<u8>, object: &Object) -> Result<()> {
        match object {
            Object::Null => out.extend_from_slice(b"null"),
            Object::Boolean(true) => out.extend_from_slice(b"true"),
            Object::Boolean(false) => out.extend_from_slice(b"false"),
            Object::Integer(value) => {
                let mut formatter = itoa::Buffer::new();
                out.extend_from_slice(formatter.format(*value).as_bytes());
            }
            Object::Real(value) => Self::write_real(out, *value),
            Object::Name(name) => Self::write_name(out, name),
            Object::String(bytes, StringFormat::Literal) => Self::write_literal_string(out, bytes),
            Object::String(bytes, StringFormat::Hexadecimal) => Self::write_hex_string(out, bytes),
            Object::Array(array) => {
                out.push(b'[');
                let mut first = true;
                for item in array {
                    let mut serialized = Vec::new();
                    Self::serialize_object(&mut serialized, item)?;
                    if !first && !starts_with_delimiter(&serialized) {
                        out.push(b' ');
                    }
                    first = false;
                    out.extend_from_slice(&serialized);
                }
                out.push(b']');
            }
            Object::Dictionary(dict) => Self::serialize_dictionary(out, dict)?,
            Object::Stream(stream) => {
                Self::serialize_dictionary(out, &stream.dict)?;
                out.extend_from_slice(b"stream\n");
                out.extend_from_slice(&stream.content);
                out.extend_from_slice(b"\nendstream");
            }
            Object::Reference(id) => {
                let mut formatter = itoa::Buffer::new();
                out.extend_from_slice(formatter.format(id.0).as_bytes());
                out.push(b' ');
                out.extend_from_slice(formatter.format(id.1).as_bytes());
                out.extend_from_slice(b" R");
            }
        }
        Ok(())
    }

    pub(crate) fn serialize_dictionary(out: &mut Vec<u8>, dict: &Dictionary) -> Result<()> {
        out.extend_from_slice(b"<<");
        for (key, value) in dict.iter() {
            Self::write_name(out, key);
            let mut serialized = Vec::new();
            Self::serialize_object(&mut serialized, value)?;
            if !starts_with_delimiter(&serialized) {
                out.push(b' ');
            }
            out.extend_from_slice(&serialized);
        }
        out.extend_from_slice(b">>");
        Ok(())
    }

    fn write_real(out: &mut Vec<u8>, value: f64) {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            // Keep the decimal point so the value reads back as a real.
            out.extend_from_slice(format!("{value:.1}").as_bytes());
        } else {
            out.extend_from_slice(format!("{value}").as_bytes());
        }
    }

    fn write_name(out: &mut Vec<u8>, name: &[u8]) {
        out.push(b'/');
        for &byte in name {
            // Irregular bytes go out as #xx escapes.
            let regular = byte > b' '
                && byte != b'#'
                && !matches!(byte, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
                && byte < 0x7F;
            if regular {
                out.push(byte);
            } else {
                out.extend_from_slice(format!("#{byte:02X}").as_bytes());
            }
        }
    }

    fn write_literal_string(out: &mut Vec<u8>, bytes: &[u8]) {
        out.push(b'(');
        for &byte in bytes {
            match byte {
                b'(' | b')' | b'\\' => {
                    out.push(b'\\');
                    out.push(byte);
                }
                b'\r' => out.extend_from_slice(b"\\r"),
                b'\n' => out.extend_from_slice(b"\\n"),
                _ => out.push(byte),
            }
        }
        out.push(b')');
    }

    fn write_hex_string(out: &mut Vec<u8>, bytes: &[u8]) {
        out.push(b'<');
        for byte in bytes {
            out.extend_from_slice(format!("{byte:02X}").as_bytes());
        }
        out.push(b'>');
    }

    /// Emits a classical `xref` section plus trailer; returns the offset
    /// `startxref` must point at.
    fn write_xref_table(
        document: &mut Document, out: &mut Vec<u8>, entries: BTreeMap<u32, XrefEntry>, options: &SaveOptions,
    ) -> Result<usize> {
        let xref_offset = out.len();
        let eol = options.eol.as_bytes();
        out.extend_from_slice(b"xref");
        out.extend_from_slice(eol);

        for run in contiguous_runs(&entries) {
            out.extend_from_slice(format!("{} {}", run[0].0, run.len()).as_bytes());
            out.extend_from_slice(eol);
            for &(_, entry) in &run {
                let (first, second, kind) = match entry {
                    XrefEntry::Free { next_free, generation } => (next_free as u64, generation, b'f'),
                    XrefEntry::Normal { offset, generation } => (offset, generation, b'n'),
                    // Classical tables cannot express compressed entries.
                    XrefEntry::Compressed { .. } => {
                        return Err(Error::InvalidStream(
                            "compressed objects require an xref stream".to_string(),
                        ));
                    }
                };
                out.extend_from_slice(format!("{first:010} {second:05} ").as_bytes());
                out.push(kind);
                out.extend_from_slice(options.eol.xref_entry_tail());
            }
        }

        let size = entries.keys().next_back().copied().unwrap_or(0) + 1;
        document.trailer.set("Size", size as i64);
        document.trailer.remove(b"Prev");
        document.trailer.remove(b"XRefStm");
        out.extend_from_slice(b"trailer");
        out.extend_from_slice(eol);
        Self::serialize_dictionary(out, &document.trailer)?;
        out.extend_from_slice(eol);
        Ok(xref_offset)
    }

    /// Emits the cross-reference data as an xref stream object; returns
    /// the offset `startxref` must point at.
    fn write_xref_stream(
        document: &mut Document, out: &mut Vec<u8>, mut entries: BTreeMap<u32, XrefEntry>,
    ) -> Result<usize> {
        let stream_id = document.new_object_id();
        let stream_offset = out.len() as u64;
        entries.insert(
            stream_id.0,
            XrefEntry::Normal {
                offset: stream_offset,
                generation: 0,
            },
        );
        let size = entries.keys().next_back().copied().unwrap_or(0) + 1;

        // Field widths: type byte, offset wide enough for this file, two
        // generation/index bytes.
        let max_field2 = entries
            .values()
            .map(|entry| match entry {
                XrefEntry::Free { next_free, .. } => *next_free as u64,
                XrefEntry::Normal { offset, .. } => *offset,
                XrefEntry::Compressed { container, .. } => *container as u64,
            })
            .max()
            .unwrap_or(0);
        let w2 = ((64 - max_field2.leading_zeros() as usize).div_ceil(8)).max(1);

        let mut index = Vec::new();
        let mut payload = Vec::new();
        for run in contiguous_runs(&entries) {
            index.push(Object::Integer(run[0].0 as i64));
            index.push(Object::Integer(run.len() as i64));
            for &(_, entry) in &run {
                let (kind, second, third) = match entry {
                    XrefEntry::Free { next_free, generation } => (0u8, next_free as u64, generation),
                    XrefEntry::Normal { offset, generation } => (1, offset, generation),
                    XrefEntry::Compressed { container, index } => (2, container as u64, index),
                };
                payload.push(kind);
                payload.extend_from_slice(&second.to_be_bytes()[8 - w2..]);
                payload.extend_from_slice(&third.to_be_bytes());
            }
        }

        document.trailer.set("Size", size as i64);
        document.trailer.remove(b"Prev");
        document.trailer.remove(b"XRefStm");

        let mut dict = crate::dictionary! {
            "Type" => "XRef",
            "Size" => size as i64,
            "W" => vec![1.into(), (w2 as i64).into(), 2.into()],
            "Index" => index,
        };
        for (key, value) in document.trailer.iter() {
            if key != b"Size" {
                dict.set(key.clone(), value.clone());
            }
        }

        let mut stream = Stream::new(dict, payload);
        stream.compress()?;
        Self::write_indirect_object(out, stream_id, &Object::Stream(stream), None, b"\n")?;
        Ok(stream_offset as usize)
    }
}

fn starts_with_delimiter(serialized: &[u8]) -> bool {
    matches!(serialized.first(), Some(b'/' | b'[' | b'(' | b'<'))
}

/// Splits the entry map into runs of consecutive object numbers, the unit
/// both xref representations are organized around.
fn contiguous_runs(entries: &BTreeMap<u32, XrefEntry>) -> Vec<Vec<(u32, XrefEntry)>> {
    let mut runs: Vec<Vec<(u32, XrefEntry)>> = Vec::new();
    for (&id, &entry) in entries {
        match runs.last_mut() {
            Some(run) if run.last().map(|(last, _)| last + 1) == Some(id) => run.push((id, entry)),
            _ => runs.push(vec![(id, entry)]),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;
    use crate::parser::{self, ParserInput};
    use crate::xref::XrefKind;

    fn roundtrip(object: Object) {
        let mut serialized = Vec::new();
        Writer::serialize_object(&mut serialized, &object).unwrap();
        let parsed = parser::direct_object(ParserInput::new_extra(&serialized, "test")).unwrap();
        assert_eq!(parsed, object, "serialized form: {}", String::from_utf8_lossy(&serialized));
    }

    #[test]
    fn serialize_parse_identity() {
        roundtrip(Object::Null);
        roundtrip(Object::Boolean(true));
        roundtrip(Object::Integer(-42));
        roundtrip(Object::Real(2.5));
        roundtrip(Object::Real(-3.0));
        roundtrip(Object::Name(b"Name With#Hash and spaces".to_vec()));
        roundtrip(Object::string_literal("escaped ( ) \\ text\nline"));
        roundtrip(Object::String(vec![0, 1, 0xFF], StringFormat::Hexadecimal));
        roundtrip(Object::Reference((17, 3)));
        roundtrip(Object::Array(vec![
            Object::Integer(1),
            Object::Reference((2, 0)),
            Object::Name(b"N".to_vec()),
            Object::Array(vec![Object::Real(0.5)]),
        ]));
        roundtrip(Object::Dictionary(dictionary! {
            "Kids" => vec![Object::Reference((3, 0))],
            "Count" => 1,
            "Label" => Object::string_literal("x"),
        }));
    }

    #[test]
    fn classical_xref_entries_are_twenty_bytes() {
        let mut entries = BTreeMap::new();
        entries.insert(0, XrefEntry::Free { next_free: 0, generation: u16::MAX });
        entries.insert(1, XrefEntry::Normal { offset: 17, generation: 0 });
        let mut document = Document::new();
        document.trailer.set("Root", Object::Reference((1, 0)));
        let mut out = Vec::new();
        Writer::write_xref_table(&mut document, &mut out, entries, &SaveOptions::default()).unwrap();

        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("xref"));
        assert_eq!(lines.next(), Some("0 2"));
        assert_eq!(lines.next().map(|l| l.len() + 1), Some(20));
        assert!(text.contains("0000000017 00000 n"));
        assert!(text.contains("0000000000 65535 f"));
        assert_eq!(document.trailer.get(b"Size").unwrap().as_i64().unwrap(), 2);
    }

    #[test]
    fn builder_forces_xref_streams_for_object_streams() {
        let options = SaveOptions::builder().use_object_streams(true).build();
        assert!(options.use_xref_streams);
    }

    #[test]
    fn save_then_load_preserves_catalog() {
        let mut doc = Document::with_version("1.4");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.4"));

        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
        assert!(
            reloaded
                .catalog()
                .unwrap()
                .equals_ignoring_order(doc.catalog().unwrap())
        );
    }

    #[test]
    fn save_with_xref_stream_roundtrips() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut bytes = Vec::new();
        let options = SaveOptions::builder()
            .use_xref_streams(true)
            .use_object_streams(true)
            .build();
        doc.save_with_options(&mut bytes, options).unwrap();
        // No classical section markers in an xref-stream file.
        assert!(!String::from_utf8_lossy(&bytes).contains("trailer"));

        let reloaded = Document::load_mem(&bytes).unwrap();
        assert_eq!(reloaded.get_pages().len(), 1);
        assert_eq!(
            reloaded.reference_table.kind,
            XrefKind::CrossReferenceStream
        );
    }
}
