use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::Reader;
use crate::{Document, Error, Result};

/// How tolerant loading should be, and whether PDF 1.5 cross-reference
/// structure is honored.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Repair non-conforming files instead of rejecting them.
    pub relaxed: bool,
    /// Honor cross-reference streams and object streams.
    pub reader_v15: bool,
    /// Password for encrypted documents. The empty user password is
    /// always tried first.
    pub password: Option<String>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            relaxed: true,
            reader_v15: true,
            password: None,
        }
    }
}

impl ReadOptions {
    pub fn strict() -> ReadOptions {
        ReadOptions {
            relaxed: false,
            ..ReadOptions::default()
        }
    }

    pub fn with_password(mut self, password: &str) -> ReadOptions {
        self.password = Some(password.to_string());
        self
    }
}

impl Document {
    /// Load a PDF document from a specified file path.
    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Document> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_internal(file, capacity, ReadOptions::default())
    }

    /// Load a PDF document from a specified file path with a password for
    /// encrypted PDFs.
    #[inline]
    pub fn load_with_password<P: AsRef<Path>>(path: P, password: &str) -> Result<Document> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_internal(file, capacity, ReadOptions::default().with_password(password))
    }

    #[inline]
    pub fn load_with_options<P: AsRef<Path>>(path: P, options: ReadOptions) -> Result<Document> {
        let file = File::open(path)?;
        let capacity = Some(file.metadata()?.len() as usize);
        Self::load_internal(file, capacity, options)
    }

    /// Load a PDF document from an arbitrary source.
    #[inline]
    pub fn load_from<R: Read>(source: R) -> Result<Document> {
        Self::load_internal(source, None, ReadOptions::default())
    }

    #[inline]
    pub fn load_from_with_options<R: Read>(source: R, options: ReadOptions) -> Result<Document> {
        Self::load_internal(source, None, options)
    }

    fn load_internal<R: Read>(mut source: R, capacity: Option<usize>, options: ReadOptions) -> Result<Document> {
        let mut buffer = capacity.map(Vec::with_capacity).unwrap_or_default();
        source.read_to_end(&mut buffer)?;
        Reader::new(&buffer, Document::new(), options).read()
    }

    /// Load a PDF document from a memory slice.
    pub fn load_mem(buffer: &[u8]) -> Result<Document> {
        buffer.try_into()
    }

    /// Load a PDF document from a memory slice with a password for
    /// encrypted PDFs.
    pub fn load_mem_with_password(buffer: &[u8], password: &str) -> Result<Document> {
        Reader::new(buffer, Document::new(), ReadOptions::default().with_password(password)).read()
    }

    pub fn load_mem_with_options(buffer: &[u8], options: ReadOptions) -> Result<Document> {
        Reader::new(buffer, Document::new(), options).read()
    }
}

impl TryInto<Document> for &[u8] {
    type Error = Error;

    fn try_into(self) -> Result<Document> {
        Reader::new(self, Document::new(), ReadOptions::default()).read()
    }
}
