//! Stream filter pipeline.
//!
//! A stream's `Filter` entry names the encodings its payload went through,
//! outermost first; `DecodeParms` carries per-filter parameters. Decoding
//! applies the chain in order, encoding in reverse. Image codecs
//! (DCT, JPX, JBIG2, CCITT) are carried opaquely and never transcoded.

mod ascii_85;
mod ascii_hex;
mod flate;
mod lzw;
mod predictor;
mod run_length;

use crate::{Dictionary, Error, FilterError, Object, Result, Stream};

/// A stream filter, as named in a `Filter` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Flate,
    Lzw,
    AsciiHex,
    Ascii85,
    RunLength,
    /// JPEG payload, carried verbatim.
    Dct,
    /// JPEG 2000 payload, carried verbatim.
    Jpx,
    Jbig2,
    CcittFax,
    /// Per-stream crypt filter marker; handled by the security layer.
    Crypt,
}

impl Filter {
    /// Recognizes full names and the inline-image abbreviations.
    pub fn from_name(name: &[u8]) -> Option<Filter> {
        match name {
            b"FlateDecode" | b"Fl" => Some(Filter::Flate),
            b"LZWDecode" | b"LZW" => Some(Filter::Lzw),
            b"ASCIIHexDecode" | b"AHx" => Some(Filter::AsciiHex),
            b"ASCII85Decode" | b"A85" => Some(Filter::Ascii85),
            b"RunLengthDecode" | b"RL" => Some(Filter::RunLength),
            b"DCTDecode" | b"DCT" => Some(Filter::Dct),
            b"JPXDecode" => Some(Filter::Jpx),
            b"JBIG2Decode" => Some(Filter::Jbig2),
            b"CCITTFaxDecode" | b"CCF" => Some(Filter::CcittFax),
            b"Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static [u8] {
        match self {
            Filter::Flate => b"FlateDecode",
            Filter::Lzw => b"LZWDecode",
            Filter::AsciiHex => b"ASCIIHexDecode",
            Filter::Ascii85 => b"ASCII85Decode",
            Filter::RunLength => b"RunLengthDecode",
            Filter::Dct => b"DCTDecode",
            Filter::Jpx => b"JPXDecode",
            Filter::Jbig2 => b"JBIG2Decode",
            Filter::CcittFax => b"CCITTFaxDecode",
            Filter::Crypt => b"Crypt",
        }
    }

    /// Filters whose payload this crate carries without transcoding.
    pub fn is_opaque(&self) -> bool {
        matches!(self, Filter::Dct | Filter::Jpx | Filter::Jbig2 | Filter::CcittFax)
    }
}

/// Reads the `(Filter, DecodeParms)` chain off a stream dictionary.
///
/// Both entries may be a single value or an array; a missing or null
/// parms slot yields `None`.
pub fn filter_chain(dict: &Dictionary) -> Result<Vec<(Filter, Option<Dictionary>)>> {
    let filters: Vec<Vec<u8>> = match dict.get(b"Filter") {
        Ok(Object::Name(name)) => vec![name.clone()],
        Ok(Object::Array(array)) => array
            .iter()
            .map(|f| f.as_name().map(<[u8]>::to_vec))
            .collect::<Result<_>>()?,
        Ok(Object::Null) | Err(Error::DictKey(_)) => return Ok(vec![]),
        Ok(other) => {
            return Err(Error::Type {
                expected: "Name",
                found: other.type_name(),
            });
        }
        Err(err) => return Err(err),
    };

    let parms: Vec<Option<Dictionary>> = match dict.get(b"DecodeParms").or_else(|_| dict.get(b"DP")) {
        Ok(Object::Dictionary(parm)) => vec![Some(parm.clone())],
        Ok(Object::Array(array)) => array
            .iter()
            .map(|p| match p {
                Object::Dictionary(parm) => Some(parm.clone()),
                _ => None,
            })
            .collect(),
        _ => vec![],
    };

    filters
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let filter = Filter::from_name(name)
                .ok_or_else(|| Error::Filter(FilterError::Unsupported(name.clone())))?;
            Ok((filter, parms.get(index).cloned().flatten()))
        })
        .collect()
}

/// Decodes `data` through one filter.
pub fn decode(filter: Filter, parms: Option<&Dictionary>, data: &[u8]) -> Result<Vec<u8>> {
    let decoded = match filter {
        Filter::Flate => flate::decode(data)?,
        Filter::Lzw => lzw::decode(data, lzw_early_change(parms))?,
        Filter::AsciiHex => ascii_hex::decode(data)?,
        Filter::Ascii85 => ascii_85::decode(data)?,
        Filter::RunLength => run_length::decode(data)?,
        Filter::Crypt => data.to_vec(),
        opaque => return Err(Error::Filter(FilterError::Unsupported(opaque.name().to_vec()))),
    };
    match filter {
        Filter::Flate | Filter::Lzw => predictor::undo(decoded, parms),
        _ => Ok(decoded),
    }
}

/// Encodes `data` through one filter. Predictors are never introduced on
/// encode; LZW payloads are rewritten as Flate upstream of this call.
pub fn encode(filter: Filter, data: &[u8]) -> Result<Vec<u8>> {
    match filter {
        Filter::Flate => Ok(flate::encode(data)),
        Filter::Lzw => Ok(lzw::encode(data)),
        Filter::AsciiHex => Ok(ascii_hex::encode(data)),
        Filter::Ascii85 => Ok(ascii_85::encode(data)),
        Filter::RunLength => Ok(run_length::encode(data)),
        Filter::Crypt => Ok(data.to_vec()),
        opaque => Err(Error::Filter(FilterError::Unsupported(opaque.name().to_vec()))),
    }
}

fn lzw_early_change(parms: Option<&Dictionary>) -> bool {
    parms
        .and_then(|p| p.get(b"EarlyChange").ok())
        .and_then(|v| v.as_i64().ok())
        .map(|v| v != 0)
        .unwrap_or(true)
}

/// Decodes a stream's payload through its whole filter chain.
pub fn decode_stream(stream: &Stream) -> Result<Vec<u8>> {
    let chain = filter_chain(&stream.dict)?;
    let mut data = stream.content.clone();
    for (filter, parms) in &chain {
        if filter.is_opaque() {
            return Err(Error::Filter(FilterError::Unsupported(filter.name().to_vec())));
        }
        data = decode(*filter, parms.as_ref(), &data)?;
    }
    Ok(data)
}

impl Stream {
    /// The payload with all filters undone.
    pub fn decoded_content(&self) -> Result<Vec<u8>> {
        decode_stream(self)
    }

    /// True when every declared filter can be undone by this crate.
    pub fn is_decodable(&self) -> bool {
        matches!(filter_chain(&self.dict), Ok(chain) if chain.iter().all(|(f, _)| !f.is_opaque()))
    }

    /// Replaces the payload with its decoded form and drops the filter
    /// declaration. Opaque image payloads are left untouched.
    pub fn decompress(&mut self) -> Result<()> {
        let data = decode_stream(self)?;
        self.set_plain_content(data);
        Ok(())
    }

    /// Deflates an unfiltered payload. Streams already behind a filter
    /// chain, and streams that forbid compression, are left as they are.
    pub fn compress(&mut self) -> Result<()> {
        if !self.allows_compression || self.dict.has(b"Filter") {
            return Ok(());
        }
        let compressed = encode(Filter::Flate, &self.content)?;
        if compressed.len() < self.content.len() {
            self.dict.set("Filter", Object::name("FlateDecode"));
            self.set_content(compressed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    #[test]
    fn chain_from_single_name() {
        let dict = dictionary! { "Filter" => "FlateDecode", "Length" => 0 };
        let chain = filter_chain(&dict).unwrap();
        assert_eq!(chain, vec![(Filter::Flate, None)]);
    }

    #[test]
    fn chain_from_array_with_parms() {
        let dict = dictionary! {
            "Filter" => vec!["ASCII85Decode".into(), "FlateDecode".into()],
            "DecodeParms" => vec![
                Object::Null,
                Object::Dictionary(dictionary! { "Predictor" => 12, "Columns" => 4 }),
            ],
        };
        let chain = filter_chain(&dict).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], (Filter::Ascii85, None));
        assert_eq!(chain[1].0, Filter::Flate);
        assert!(chain[1].1.as_ref().unwrap().has(b"Predictor"));
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let dict = dictionary! { "Filter" => "Rot13Decode" };
        assert!(matches!(
            filter_chain(&dict),
            Err(Error::Filter(FilterError::Unsupported(_)))
        ));
    }

    #[test]
    fn opaque_filters_refuse_decoding() {
        let stream = Stream::new(dictionary! { "Filter" => "DCTDecode" }, vec![0xFF, 0xD8]);
        assert!(!stream.is_decodable());
        assert!(matches!(
            stream.decoded_content(),
            Err(Error::Filter(FilterError::Unsupported(_)))
        ));
    }

    #[test]
    fn chained_decode_applies_in_order() {
        // Payload deflated, then ASCII85-armored: decode must undo the
        // armor first, the deflate second.
        let plain = b"chained filter pipeline".to_vec();
        let deflated = encode(Filter::Flate, &plain).unwrap();
        let armored = encode(Filter::Ascii85, &deflated).unwrap();
        let mut stream = Stream::new(
            dictionary! {
                "Filter" => vec!["ASCII85Decode".into(), "FlateDecode".into()],
            },
            armored,
        );
        stream.dict.set("Length", stream.content.len() as i64);
        assert_eq!(stream.decoded_content().unwrap(), plain);
    }

    #[test]
    fn compress_sets_filter_and_roundtrips() {
        let payload: Vec<u8> = std::iter::repeat_n(b"pattern ", 64).flatten().copied().collect();
        let mut stream = Stream::new(Dictionary::new(), payload.clone());
        stream.compress().unwrap();
        assert!(stream.dict.has(b"Filter"));
        assert!(stream.content.len() < payload.len());
        assert_eq!(stream.decoded_content().unwrap(), payload);
    }
}
