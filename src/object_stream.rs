//! Object streams: streams that pack other objects (PDF 1.5).
//!
//! The decoded payload starts with `N` pairs of `object-number offset`,
//! then the concatenated objects themselves, `First` bytes in. Objects
//! living in an object stream always have generation 0.

use std::collections::BTreeMap;

use log::warn;

use crate::parser::{self, ParserInput};
use crate::writer::Writer;
use crate::{Error, Object, ObjectId, ParseError, Result, Stream, dictionary};

#[derive(Debug, Clone)]
pub struct ObjectStream {
    pub objects: BTreeMap<ObjectId, Object>,
}

impl ObjectStream {
    /// Unpacks every object held by an `ObjStm` stream.
    pub fn new(stream: &mut Stream) -> Result<ObjectStream> {
        let payload = stream.decoded_content()?;
        let count = stream.dict.get(b"N").and_then(Object::as_i64)?;
        let first = stream.dict.get(b"First").and_then(Object::as_i64)?;
        if count < 0 || first < 0 || first as usize > payload.len() {
            return Err(Error::Parse(ParseError::InvalidObjectStream));
        }
        let first = first as usize;

        let mut numbers = Vec::with_capacity(count as usize);
        let mut header = HeaderScanner::new(&payload[..first]);
        for _ in 0..count {
            let Some(number) = header.next_number() else { break };
            let Some(offset) = header.next_number() else { break };
            numbers.push((number as u32, offset as usize));
        }
        if numbers.len() != count as usize {
            warn!("object stream header declares {count} objects, found {}", numbers.len());
        }

        let mut objects = BTreeMap::new();
        for (number, offset) in numbers {
            let Some(slice) = payload.get(first + offset..) else {
                warn!("object {number} points outside its object stream");
                continue;
            };
            match parser::direct_object(ParserInput::new_extra(slice, "object stream")) {
                Some(object) => {
                    objects.insert((number, 0), object);
                }
                None => warn!("object {number} in object stream failed to parse"),
            }
        }
        Ok(ObjectStream { objects })
    }
}

struct HeaderScanner<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> HeaderScanner<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        HeaderScanner { bytes, pos: 0 }
    }

    fn next_number(&mut self) -> Option<u64> {
        while self.pos < self.bytes.len() && !self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        let start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
            self.pos += 1;
        }
        if start == self.pos {
            return None;
        }
        std::str::from_utf8(&self.bytes[start..self.pos])
            .ok()
            .and_then(|s| s.parse().ok())
    }
}

/// Knobs for packing objects into object streams at save time.
#[derive(Debug, Clone)]
pub struct ObjectStreamConfig {
    /// Objects per stream before a new one is started.
    pub max_objects: usize,
    /// Deflate the assembled payload.
    pub compress: bool,
}

impl Default for ObjectStreamConfig {
    fn default() -> Self {
        ObjectStreamConfig {
            max_objects: 100,
            compress: true,
        }
    }
}

/// One packed object stream, before it has an object number of its own.
#[derive(Debug, Clone)]
pub struct ObjectStreamSection {
    pub stream: Stream,
    /// The packed objects, in index order.
    pub members: Vec<ObjectId>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectStreamBuilder {
    config: ObjectStreamConfig,
}

impl ObjectStreamBuilder {
    pub fn new(config: ObjectStreamConfig) -> Self {
        ObjectStreamBuilder { config }
    }

    /// True for objects that may live inside an object stream: generation
    /// zero and not themselves streams.
    pub fn is_eligible(id: ObjectId, object: &Object) -> bool {
        id.1 == 0 && !matches!(object, Object::Stream(_))
    }

    /// Packs `objects` into as many object streams as the configured
    /// capacity requires. Ineligible objects are skipped.
    pub fn build_object_streams(
        &self, objects: &BTreeMap<ObjectId, Object>,
    ) -> Result<Vec<ObjectStreamSection>> {
        let eligible: Vec<(&ObjectId, &Object)> = objects
            .iter()
            .filter(|(id, object)| Self::is_eligible(**id, object))
            .collect();

        let mut sections = Vec::new();
        for chunk in eligible.chunks(self.config.max_objects.max(1)) {
            let mut header = Vec::new();
            let mut body = Vec::new();
            let mut members = Vec::with_capacity(chunk.len());
            for (id, object) in chunk {
                let mut formatter = itoa::Buffer::new();
                header.extend_from_slice(formatter.format(id.0).as_bytes());
                header.push(b' ');
                header.extend_from_slice(formatter.format(body.len()).as_bytes());
                header.push(b' ');
                Writer::serialize_object(&mut body, object)?;
                body.push(b'\n');
                members.push(**id);
            }

            let mut payload = header;
            let first = payload.len();
            payload.extend_from_slice(&body);
            let dict = dictionary! {
                "Type" => "ObjStm",
                "N" => chunk.len() as i64,
                "First" => first as i64,
            };
            let mut stream = Stream::new(dict, payload);
            if self.config.compress {
                stream.compress()?;
            }
            sections.push(ObjectStreamSection { stream, members });
        }
        Ok(sections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    #[test]
    fn unpack_plain_object_stream() {
        // Two objects at offsets 0 and 9 relative to First.
        let payload = b"1 0 2 9 <</A 1>>\n(text)\n";
        let first = 8i64;
        let dict = dictionary! { "Type" => "ObjStm", "N" => 2, "First" => first };
        let mut stream = Stream::new(dict, payload.to_vec());
        let unpacked = ObjectStream::new(&mut stream).unwrap();
        assert_eq!(unpacked.objects.len(), 2);
        assert!(unpacked.objects[&(1, 0)].as_dict().is_ok());
        assert_eq!(unpacked.objects[&(2, 0)].as_str().unwrap(), b"text");
    }

    #[test]
    fn build_then_unpack_roundtrip() {
        let mut objects = BTreeMap::new();
        for number in 1..=7u32 {
            objects.insert(
                (number, 0),
                Object::Dictionary(dictionary! { "Value" => number as i64 }),
            );
        }
        // A stream object and a generation-1 object must stay out.
        objects.insert((8, 0), Object::Stream(Stream::new(dictionary! {}, vec![1, 2])));
        objects.insert((9, 1), Object::Integer(9));

        let builder = ObjectStreamBuilder::new(ObjectStreamConfig {
            max_objects: 4,
            compress: true,
        });
        let sections = builder.build_object_streams(&objects).unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].members.len(), 4);
        assert_eq!(sections[1].members.len(), 3);

        let mut recovered = BTreeMap::new();
        for section in sections {
            let mut stream = section.stream;
            recovered.extend(ObjectStream::new(&mut stream).unwrap().objects);
        }
        assert_eq!(recovered.len(), 7);
        assert_eq!(
            recovered[&(5, 0)].as_dict().unwrap().get(b"Value").unwrap().as_i64().unwrap(),
            5
        );
    }
}
