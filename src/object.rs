use std::fmt;

use indexmap::IndexMap;

use crate::{Error, Result};

/// Object identifier: object number and generation number.
pub type ObjectId = (u32, u16);

/// A PDF object value.
#[derive(Clone, PartialEq)]
pub enum Object {
    Null,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Name(Vec<u8>),
    String(Vec<u8>, StringFormat),
    Array(Vec<Object>),
    Dictionary(Dictionary),
    Stream(Stream),
    Reference(ObjectId),
}

/// String objects can be written in two lexical forms. Which one a string
/// was read from is preserved so that rewriting a file does not flip
/// representations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StringFormat {
    #[default]
    Literal,
    Hexadecimal,
}

impl Object {
    pub fn string_literal<S: Into<Vec<u8>>>(s: S) -> Self {
        Object::String(s.into(), StringFormat::Literal)
    }

    pub fn name<N: Into<Vec<u8>>>(name: N) -> Self {
        Object::Name(name.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    /// Name of the variant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Object::Null => "Null",
            Object::Boolean(_) => "Boolean",
            Object::Integer(_) => "Integer",
            Object::Real(_) => "Real",
            Object::Name(_) => "Name",
            Object::String(..) => "String",
            Object::Array(_) => "Array",
            Object::Dictionary(_) => "Dictionary",
            Object::Stream(_) => "Stream",
            Object::Reference(_) => "Reference",
        }
    }

    fn type_error<T>(&self, expected: &'static str) -> Result<T> {
        Err(Error::Type {
            expected,
            found: self.type_name(),
        })
    }

    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Object::Boolean(value) => Ok(*value),
            _ => self.type_error("Boolean"),
        }
    }

    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Object::Integer(value) => Ok(*value),
            _ => self.type_error("Integer"),
        }
    }

    /// Integer or real, widened to f64.
    pub fn as_float(&self) -> Result<f64> {
        match self {
            Object::Integer(value) => Ok(*value as f64),
            Object::Real(value) => Ok(*value),
            _ => self.type_error("Real"),
        }
    }

    pub fn as_name(&self) -> Result<&[u8]> {
        match self {
            Object::Name(name) => Ok(name),
            _ => self.type_error("Name"),
        }
    }

    pub fn as_str(&self) -> Result<&[u8]> {
        match self {
            Object::String(bytes, _) => Ok(bytes),
            _ => self.type_error("String"),
        }
    }

    pub fn as_str_mut(&mut self) -> Result<&mut Vec<u8>> {
        match self {
            Object::String(bytes, _) => Ok(bytes),
            _ => Err(Error::Type {
                expected: "String",
                found: self.type_name(),
            }),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Object>> {
        match self {
            Object::Array(array) => Ok(array),
            _ => self.type_error("Array"),
        }
    }

    pub fn as_array_mut(&mut self) -> Result<&mut Vec<Object>> {
        match self {
            Object::Array(array) => Ok(array),
            _ => Err(Error::Type {
                expected: "Array",
                found: self.type_name(),
            }),
        }
    }

    pub fn as_dict(&self) -> Result<&Dictionary> {
        match self {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream(stream) => Ok(&stream.dict),
            _ => self.type_error("Dictionary"),
        }
    }

    pub fn as_dict_mut(&mut self) -> Result<&mut Dictionary> {
        match self {
            Object::Dictionary(dict) => Ok(dict),
            Object::Stream(stream) => Ok(&mut stream.dict),
            _ => Err(Error::Type {
                expected: "Dictionary",
                found: self.type_name(),
            }),
        }
    }

    pub fn as_stream(&self) -> Result<&Stream> {
        match self {
            Object::Stream(stream) => Ok(stream),
            _ => self.type_error("Stream"),
        }
    }

    pub fn as_stream_mut(&mut self) -> Result<&mut Stream> {
        match self {
            Object::Stream(stream) => Ok(stream),
            _ => Err(Error::Type {
                expected: "Stream",
                found: self.type_name(),
            }),
        }
    }

    pub fn as_reference(&self) -> Result<ObjectId> {
        match self {
            Object::Reference(id) => Ok(*id),
            _ => self.type_error("Reference"),
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Boolean(value)
    }
}

impl From<i32> for Object {
    fn from(value: i32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<i64> for Object {
    fn from(value: i64) -> Self {
        Object::Integer(value)
    }
}

impl From<u32> for Object {
    fn from(value: u32) -> Self {
        Object::Integer(value as i64)
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Real(value)
    }
}

impl From<f32> for Object {
    fn from(value: f32) -> Self {
        Object::Real(value as f64)
    }
}

impl From<&str> for Object {
    fn from(name: &str) -> Self {
        Object::Name(name.as_bytes().to_vec())
    }
}

impl From<String> for Object {
    fn from(name: String) -> Self {
        Object::Name(name.into_bytes())
    }
}

impl From<Vec<Object>> for Object {
    fn from(array: Vec<Object>) -> Self {
        Object::Array(array)
    }
}

impl From<Dictionary> for Object {
    fn from(dict: Dictionary) -> Self {
        Object::Dictionary(dict)
    }
}

impl From<Stream> for Object {
    fn from(stream: Stream) -> Self {
        Object::Stream(stream)
    }
}

impl From<ObjectId> for Object {
    fn from(id: ObjectId) -> Self {
        Object::Reference(id)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Object::Null => f.write_str("null"),
            Object::Boolean(value) => write!(f, "{value}"),
            Object::Integer(value) => write!(f, "{value}"),
            Object::Real(value) => write!(f, "{value}"),
            Object::Name(name) => write!(f, "/{}", String::from_utf8_lossy(name)),
            Object::String(bytes, StringFormat::Literal) => {
                write!(f, "({})", String::from_utf8_lossy(bytes))
            }
            Object::String(bytes, StringFormat::Hexadecimal) => {
                f.write_str("<")?;
                for byte in bytes {
                    write!(f, "{byte:02X}")?;
                }
                f.write_str(">")
            }
            Object::Array(array) => f.debug_list().entries(array).finish(),
            Object::Dictionary(dict) => dict.fmt(f),
            Object::Stream(stream) => write!(f, "{:?}stream...endstream", stream.dict),
            Object::Reference(id) => write!(f, "{} {} R", id.0, id.1),
        }
    }
}

/// A dictionary object. Entry order is preserved so that a rewritten file
/// diffs cleanly against its source.
#[derive(Clone, Default, PartialEq)]
pub struct Dictionary(IndexMap<Vec<u8>, Object>);

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has(&self, key: &[u8]) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &[u8]) -> Result<&Object> {
        self.0.get(key).ok_or_else(|| Error::DictKey(key.to_vec()))
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Result<&mut Object> {
        self.0.get_mut(key).ok_or_else(|| Error::DictKey(key.to_vec()))
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Vec<u8>>,
        V: Into<Object>,
    {
        self.0.insert(key.into(), value.into());
    }

    /// Removes the entry, preserving the order of the remaining ones.
    pub fn remove(&mut self, key: &[u8]) -> Option<Object> {
        self.0.shift_remove(key)
    }

    pub fn iter(&self) -> indexmap::map::Iter<Vec<u8>, Object> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> indexmap::map::IterMut<Vec<u8>, Object> {
        self.0.iter_mut()
    }

    pub fn get_type(&self) -> Result<&[u8]> {
        self.get(b"Type").and_then(Object::as_name)
    }

    pub fn has_type(&self, type_name: &[u8]) -> bool {
        self.get_type().map(|name| name == type_name).unwrap_or(false)
    }

    /// Entry-order-insensitive equality, for comparing dictionaries that
    /// went through different serializations.
    pub fn equals_ignoring_order(&self, other: &Dictionary) -> bool {
        self.len() == other.len()
            && self.iter().all(|(key, value)| {
                other.0.get(key).is_some_and(|other_value| match (value, other_value) {
                    (Object::Dictionary(a), Object::Dictionary(b)) => a.equals_ignoring_order(b),
                    (a, b) => a == b,
                })
            })
    }

    pub fn extend(&mut self, other: &Dictionary) {
        for (key, value) in other.iter() {
            self.0.entry(key.clone()).or_insert_with(|| value.clone());
        }
    }
}

impl fmt::Debug for Dictionary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("<<")?;
        for (key, value) in self.iter() {
            write!(f, "/{} {:?}", String::from_utf8_lossy(key), value)?;
        }
        f.write_str(">>")
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = (&'a Vec<u8>, &'a Object);
    type IntoIter = indexmap::map::Iter<'a, Vec<u8>, Object>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A stream object: a dictionary plus a byte payload.
///
/// `content` always holds the encoded on-disk form; decoding through the
/// filter chain happens on demand via [`Stream::decoded_content`].
#[derive(Clone, PartialEq, Debug)]
pub struct Stream {
    pub dict: Dictionary,
    pub content: Vec<u8>,
    /// Streams that must stay verbatim (already-compressed image data,
    /// metadata required uncompressed) set this to false.
    pub allows_compression: bool,
    /// Byte position of the payload in the source buffer, when the stream
    /// was parsed with a deferred length.
    pub start_position: Option<usize>,
}

impl Stream {
    pub fn new(mut dict: Dictionary, content: Vec<u8>) -> Stream {
        dict.set("Length", content.len() as i64);
        Stream {
            dict,
            content,
            allows_compression: true,
            start_position: None,
        }
    }

    /// A stream whose payload is located later, once its `Length` entry
    /// can be dereferenced.
    pub fn with_position(dict: Dictionary, position: usize) -> Stream {
        Stream {
            dict,
            content: vec![],
            allows_compression: true,
            start_position: Some(position),
        }
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.dict.set("Length", content.len() as i64);
        self.content = content;
    }

    /// Replaces the payload with unencoded bytes, dropping any filter
    /// declaration.
    pub fn set_plain_content(&mut self, content: Vec<u8>) {
        self.dict.remove(b"Filter");
        self.dict.remove(b"DecodeParms");
        self.set_content(content);
    }

    pub fn with_compression(mut self, allows_compression: bool) -> Stream {
        self.allows_compression = allows_compression;
        self
    }
}
