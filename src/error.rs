use thiserror::Error;

use crate::ObjectId;
use crate::encryption::DecryptionError;
use crate::validate::ValidationError;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A dictionary is missing a required entry.
    #[error("missing dictionary entry {}", String::from_utf8_lossy(.0))]
    DictKey(Vec<u8>),
    #[error("decryption: {0}")]
    Decryption(#[from] DecryptionError),
    #[error("filter: {0}")]
    Filter(#[from] FilterError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// An object offset points outside the document buffer.
    #[error("invalid object offset {0}")]
    InvalidOffset(usize),
    #[error("invalid stream: {0}")]
    InvalidStream(String),
    #[error("numeric cast failed: {0}")]
    NumericCast(String),
    /// The cross-reference table has no usable entry for the object.
    #[error("missing cross-reference entry")]
    MissingXrefEntry,
    #[error("object {} {} not found", .0.0, .0.1)]
    ObjectNotFound(ObjectId),
    /// A reference points at an object number the document never defines.
    /// Fatal when loading strictly; relaxed loading resolves it to null.
    #[error("dangling object reference {} {} R", .0.0, .0.1)]
    DanglingReference(ObjectId),
    #[error("reference cycle through object {} {}", .0.0, .0.1)]
    ReferenceCycle(ObjectId),
    #[error("parse: {0}")]
    Parse(#[from] ParseError),
    #[error("object has wrong type: expected {expected}, found {found}")]
    Type {
        expected: &'static str,
        found: &'static str,
    },
    #[error("validation: {0}")]
    Validation(#[from] ValidationError),
    #[error("invalid password")]
    InvalidPassword,
    #[error("document is encrypted and no password was supplied")]
    PasswordRequired,
    #[error("xref: {0}")]
    Xref(#[from] XrefError),
    #[error("page {0} does not exist")]
    PageNumberNotFound(u32),
    #[error("operation aborted by caller")]
    Aborted,
}

/// Errors local to parsing a single object or file section.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("invalid file header")]
    InvalidFileHeader,
    #[error("invalid trailer dictionary")]
    InvalidTrailer,
    #[error("invalid cross-reference section")]
    InvalidXref,
    #[error("malformed object at offset {0}")]
    InvalidObject(usize),
    #[error("object stream is malformed")]
    InvalidObjectStream,
    #[error("object id mismatch: expected {} {}, found {} {}", expected.0, expected.1, found.0, found.1)]
    ObjectIdMismatch { expected: ObjectId, found: ObjectId },
}

/// Errors raised while locating or chaining cross-reference sections.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum XrefError {
    #[error("startxref not found")]
    Start,
    #[error("Prev cross-reference offset out of bounds")]
    PrevStart,
    #[error("XRefStm offset out of bounds")]
    StreamStart,
    #[error("cross-reference data is corrupt")]
    Corrupt,
}

/// Errors from the stream filter pipeline.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("unsupported filter {}", String::from_utf8_lossy(.0))]
    Unsupported(Vec<u8>),
    #[error("stream data is corrupt: {0}")]
    Corrupt(String),
    #[error("unsupported predictor {0}")]
    Predictor(u8),
}
