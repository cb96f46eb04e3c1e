use std::collections::HashSet;

use super::Reader;
use crate::error::ParseError;
use crate::parser::{self, ParserInput};
use crate::text::decode_text_string;
use crate::{Dictionary, Document, Object, ObjectId, Result};

use super::load::ReadOptions;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Document information extracted without materializing every object.
/// Much faster than a full load when only the basics are needed.
#[derive(Debug, Clone, Default)]
pub struct PdfMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    /// PDF date string, `D:YYYYMMDDHHmmSSOHH'mm'`.
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: u32,
    pub version: String,
}

impl Document {
    /// Load title, info fields and page count without loading the entire
    /// document.
    #[inline]
    pub fn load_metadata<P: AsRef<Path>>(path: P) -> Result<PdfMetadata> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_metadata_internal(file, capacity, ReadOptions::default())
    }

    #[inline]
    pub fn load_metadata_with_password<P: AsRef<Path>>(path: P, password: &str) -> Result<PdfMetadata> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_metadata_internal(file, capacity, ReadOptions::default().with_password(password))
    }

    /// Load metadata from a memory slice.
    #[inline]
    pub fn load_metadata_mem(buffer: &[u8]) -> Result<PdfMetadata> {
        Reader::new(buffer, Document::new(), ReadOptions::default()).read_metadata()
    }

    #[inline]
    pub fn load_metadata_mem_with_password(buffer: &[u8], password: &str) -> Result<PdfMetadata> {
        Reader::new(buffer, Document::new(), ReadOptions::default().with_password(password)).read_metadata()
    }

    fn load_metadata_internal<R: Read>(
        mut source: R, capacity: Option<usize>, options: ReadOptions,
    ) -> Result<PdfMetadata> {
        let mut buffer = capacity.map(Vec::with_capacity).unwrap_or_default();
        source.read_to_end(&mut buffer)?;
        Reader::new(&buffer, Document::new(), options).read_metadata()
    }
}

impl Reader<'_> {
    /// Reads only the cross-reference chain, then resolves the handful of
    /// objects the info dictionary and page count depend on.
    pub fn read_metadata(mut self) -> Result<PdfMetadata> {
        let offset = self.buffer.windows(5).position(|w| w == b"%PDF-").unwrap_or(0);
        self.buffer = &self.buffer[offset..];

        let version =
            parser::header(ParserInput::new_extra(self.buffer, "header")).ok_or(ParseError::InvalidFileHeader)?;
        self.document.version = version.clone();
        self.read_xref_chain()?;

        if self.document.trailer.get(b"Encrypt").is_ok() {
            self.parse_encryption_dictionary()?;
            self.authenticate_and_setup_encryption()?;
        }

        let mut metadata = PdfMetadata {
            version,
            page_count: self.shallow_page_count(),
            ..PdfMetadata::default()
        };
        if let Some(info) = self.shallow_info_dict() {
            metadata.title = string_field(&info, b"Title");
            metadata.author = string_field(&info, b"Author");
            metadata.subject = string_field(&info, b"Subject");
            metadata.keywords = string_field(&info, b"Keywords");
            metadata.creator = string_field(&info, b"Creator");
            metadata.producer = string_field(&info, b"Producer");
            metadata.creation_date = string_field(&info, b"CreationDate");
            metadata.modification_date = string_field(&info, b"ModDate");
        }
        Ok(metadata)
    }

    fn shallow_info_dict(&self) -> Option<Dictionary> {
        let info_id = self.document.trailer.get(b"Info").and_then(Object::as_reference).ok()?;
        let object = self.get_object(info_id, &mut HashSet::new()).ok()?;
        object.as_dict().ok().cloned()
    }

    fn shallow_page_count(&self) -> u32 {
        let Some(pages_id) = self
            .document
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .ok()
            .and_then(|root| self.get_object(root, &mut HashSet::new()).ok())
            .and_then(|catalog| {
                catalog
                    .as_dict()
                    .and_then(|dict| dict.get(b"Pages"))
                    .and_then(Object::as_reference)
                    .ok()
            })
        else {
            return 0;
        };
        self.count_pages(pages_id, &mut HashSet::new())
    }

    fn count_pages(&self, node_id: ObjectId, seen: &mut HashSet<ObjectId>) -> u32 {
        if !seen.insert(node_id) {
            return 0;
        }
        let Ok(node) = self.get_object(node_id, &mut HashSet::new()) else {
            return 0;
        };
        let Ok(dict) = node.as_dict() else { return 0 };
        if !dict.has_type(b"Pages") {
            return 1;
        }
        if let Ok(count) = dict.get(b"Count").and_then(Object::as_i64) {
            if count >= 0 {
                return count as u32;
            }
        }
        dict.get(b"Kids")
            .and_then(Object::as_array)
            .map(|kids| {
                kids.iter()
                    .filter_map(|kid| kid.as_reference().ok())
                    .map(|kid| self.count_pages(kid, seen))
                    .sum()
            })
            .unwrap_or(0)
    }
}

fn string_field(dict: &Dictionary, key: &[u8]) -> Option<String> {
    dict.get(key)
        .and_then(Object::as_str)
        .ok()
        .map(decode_text_string)
}
