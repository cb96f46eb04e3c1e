//! A library for reading, rewriting and optimizing PDF documents.
//!
//! The entry point is [`Document`]: load one from bytes or a file, inspect
//! and mutate its object graph, then save it back out — optionally packed
//! into object streams, optionally encrypted.
//!
//! ```no_run
//! use pdfmill::{Document, SaveOptions};
//!
//! let mut doc = Document::load("input.pdf")?;
//! doc.validate(pdfmill::ValidationMode::Relaxed)?;
//! doc.optimize();
//! let options = SaveOptions::builder().use_xref_streams(true).build();
//! let mut out = Vec::new();
//! doc.save_with_options(&mut out, options)?;
//! # Ok::<(), pdfmill::Error>(())
//! ```

mod destinations;
mod document;
mod error;
mod nametree;
mod object;
mod object_stream;
mod optimize;
mod pages;
mod text;
mod validate;
mod xref;

pub mod encryption;
pub mod filters;
pub mod parser;

mod reader;
mod writer;

pub use crate::destinations::Destination;
pub use crate::document::{Diagnostic, Document};
pub use crate::encryption::{DecryptionError, EncryptionSettings, PasswordRole, PermissionFlags};
pub use crate::error::{Error, FilterError, ParseError, Result, XrefError};
pub use crate::nametree::{NameTree, NumberTree, TreeKey};
pub use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
pub use crate::object_stream::{
    ObjectStream, ObjectStreamBuilder, ObjectStreamConfig, ObjectStreamSection,
};
pub use crate::pages::InheritedAttrs;
pub use crate::reader::{PdfMetadata, ReadOptions};
pub use crate::text::{decode_text_string, encode_text_string};
pub use crate::validate::{ValidationError, ValidationErrorKind, ValidationMode};
pub use crate::writer::{EndOfLine, SaveOptions, SaveOptionsBuilder};
pub use crate::xref::{Xref, XrefEntry, XrefKind};

/// Creates a [`Dictionary`] from a list of key-value pairs.
///
/// ```
/// let page = pdfmill::dictionary! {
///     "Type" => "Page",
///     "Parent" => pdfmill::Object::Reference((2, 0)),
/// };
/// assert!(page.has(b"Type"));
/// ```
#[macro_export]
macro_rules! dictionary {
    () => {
        $crate::Dictionary::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut dict = $crate::Dictionary::new();
        $(
            dict.set($key, $value);
        )+
        dict
    }};
}
