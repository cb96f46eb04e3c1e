//! Tokenization and parsing of PDF syntax.
//!
//! The grammar is LL(1) over the token set; everything is built from nom
//! combinators operating on a located byte span, so parse errors carry the
//! byte offset they happened at.

use std::collections::HashSet;
use std::str::{self, FromStr};

use log::warn;
use nom::branch::alt;
use nom::bytes::complete::{tag, take, take_while, take_while1};
use nom::character::complete::{digit0, digit1, one_of};
use nom::combinator::{map, map_opt, map_res, opt, recognize};
use nom::error::{Error as NomError, ErrorKind};
use nom::multi::{fold_many0, many0, many0_count};
use nom::sequence::{delimited, pair, preceded, terminated};
use nom::{IResult, Parser};
use nom_locate::LocatedSpan;

use crate::document::Diagnostic;
use crate::reader::{MAX_BRACKET, Reader};
use crate::xref::{Xref, XrefEntry, XrefKind};
use crate::{Dictionary, Error, Object, ObjectId, ParseError, Result, Stream, StringFormat};

pub type ParserInput<'a> = LocatedSpan<&'a [u8], &'static str>;
type NomResult<'a, O, E = NomError<ParserInput<'a>>> = IResult<ParserInput<'a>, O, E>;

#[inline]
fn strip_nom<O>(value: NomResult<O>) -> Option<O> {
    value.ok().map(|(_, output)| output)
}

#[inline]
fn nom_error<O>(input: ParserInput, kind: ErrorKind) -> NomResult<O> {
    Err(nom::Err::Error(NomError::new(input, kind)))
}

pub(crate) fn is_whitespace(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | b'\r' | b'\x0C' | b'\0')
}

fn is_delimiter(c: u8) -> bool {
    matches!(c, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(c: u8) -> bool {
    !is_whitespace(c) && !is_delimiter(c)
}

fn eol(input: ParserInput) -> NomResult<ParserInput> {
    alt((tag(b"\r\n".as_slice()), tag(b"\n".as_slice()), tag(b"\r".as_slice()))).parse(input)
}

fn comment(input: ParserInput) -> NomResult<()> {
    map(
        (tag(b"%".as_slice()), take_while(|c: u8| c != b'\r' && c != b'\n'), opt(eol)),
        |_| (),
    )
    .parse(input)
}

/// Eats any run of whitespace and comments, including none.
fn space(input: ParserInput) -> NomResult<()> {
    map(
        many0_count(alt((map(take_while1(is_whitespace), |_| ()), comment))),
        |_| (),
    )
    .parse(input)
}

fn unsigned_int<I: FromStr>(input: ParserInput) -> NomResult<I> {
    map_res(digit1, |digits: ParserInput| {
        str::from_utf8(digits.fragment())
            .map_err(|_| ())
            .and_then(|s| s.parse::<I>().map_err(|_| ()))
    })
    .parse(input)
}

fn integer(input: ParserInput) -> NomResult<i64> {
    map_res(
        recognize(pair(opt(one_of("+-")), digit1)),
        |bytes: ParserInput| {
            str::from_utf8(bytes.fragment())
                .map_err(|_| ())
                .and_then(|s| s.parse::<i64>().map_err(|_| ()))
        },
    )
    .parse(input)
}

fn real(input: ParserInput) -> NomResult<f64> {
    map_res(
        recognize((
            opt(one_of("+-")),
            alt((
                recognize((digit1, tag(b".".as_slice()), digit0)),
                recognize((tag(b".".as_slice()), digit1)),
            )),
        )),
        |bytes: ParserInput| {
            str::from_utf8(bytes.fragment())
                .map_err(|_| ())
                .and_then(|s| s.parse::<f64>().map_err(|_| ()))
        },
    )
    .parse(input)
}

fn hex_digit(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// One name byte: either a regular character or a `#xx` escape.
fn name_byte(input: ParserInput) -> NomResult<u8> {
    alt((
        preceded(
            tag(b"#".as_slice()),
            map_opt(take(2usize), |pair: ParserInput| {
                let f = pair.fragment();
                Some(hex_digit(f[0])? << 4 | hex_digit(f[1])?)
            }),
        ),
        map_opt(take(1usize), |byte: ParserInput| {
            let c = byte.fragment()[0];
            is_regular(c).then_some(c)
        }),
    ))
    .parse(input)
}

fn name(input: ParserInput) -> NomResult<Vec<u8>> {
    preceded(tag(b"/".as_slice()), many0(name_byte)).parse(input)
}

/// Literal `( … )` string. Parentheses balance; escapes per the usual
/// table; an isolated CR or CRLF in the payload reads as LF.
fn literal_string(input: ParserInput) -> NomResult<Vec<u8>> {
    let bytes = input.fragment();
    if bytes.first() != Some(&b'(') {
        return nom_error(input, ErrorKind::Tag);
    }

    let mut depth = 1usize;
    let mut pos = 1usize;
    let mut out = Vec::new();
    while pos < bytes.len() {
        match bytes[pos] {
            b'(' => {
                depth += 1;
                if depth > MAX_BRACKET {
                    return nom_error(input, ErrorKind::TooLarge);
                }
                out.push(b'(');
                pos += 1;
            }
            b')' => {
                depth -= 1;
                pos += 1;
                if depth == 0 {
                    let (rest, _) = take(pos).parse(input)?;
                    return Ok((rest, out));
                }
                out.push(b')');
            }
            b'\\' => {
                pos += 1;
                let Some(&escaped) = bytes.get(pos) else {
                    return nom_error(input, ErrorKind::Eof);
                };
                pos += 1;
                match escaped {
                    b'n' => out.push(b'\n'),
                    b'r' => out.push(b'\r'),
                    b't' => out.push(b'\t'),
                    b'b' => out.push(b'\x08'),
                    b'f' => out.push(b'\x0C'),
                    b'(' => out.push(b'('),
                    b')' => out.push(b')'),
                    b'\\' => out.push(b'\\'),
                    // Line continuation: the backslash and the EOL vanish.
                    b'\r' => {
                        if bytes.get(pos) == Some(&b'\n') {
                            pos += 1;
                        }
                    }
                    b'\n' => {}
                    b'0'..=b'7' => {
                        let mut value = (escaped - b'0') as u16;
                        for _ in 0..2 {
                            match bytes.get(pos) {
                                Some(&c @ b'0'..=b'7') => {
                                    value = value * 8 + (c - b'0') as u16;
                                    pos += 1;
                                }
                                _ => break,
                            }
                        }
                        out.push(value as u8);
                    }
                    // An unknown escape stands for the escaped byte itself.
                    other => out.push(other),
                }
            }
            b'\r' => {
                out.push(b'\n');
                pos += 1;
                if bytes.get(pos) == Some(&b'\n') {
                    pos += 1;
                }
            }
            c => {
                out.push(c);
                pos += 1;
            }
        }
    }
    nom_error(input, ErrorKind::Eof)
}

/// Hex `< … >` string. Whitespace between digits is allowed; an odd
/// trailing nibble is padded with zero.
fn hexadecimal_string(input: ParserInput) -> NomResult<Object> {
    map_res(
        delimited(
            tag(b"<".as_slice()),
            take_while(|c: u8| c.is_ascii_hexdigit() || is_whitespace(c)),
            tag(b">".as_slice()),
        ),
        |digits: ParserInput| {
            let nibbles: Vec<u8> = digits
                .fragment()
                .iter()
                .copied()
                .filter_map(hex_digit)
                .collect();
            let mut bytes = Vec::with_capacity(nibbles.len() / 2 + 1);
            for pair in nibbles.chunks(2) {
                let high = pair[0];
                let low = pair.get(1).copied().unwrap_or(0);
                bytes.push(high << 4 | low);
            }
            Ok::<_, ()>(Object::String(bytes, StringFormat::Hexadecimal))
        },
    )
    .parse(input)
}

pub(crate) fn object_id(input: ParserInput) -> NomResult<ObjectId> {
    pair(
        terminated(unsigned_int::<u32>, space),
        terminated(unsigned_int::<u16>, space),
    )
    .parse(input)
}

fn reference(input: ParserInput) -> NomResult<Object> {
    map(terminated(object_id, tag(b"R".as_slice())), Object::Reference).parse(input)
}

fn array(input: ParserInput) -> NomResult<Vec<Object>> {
    delimited(
        pair(tag(b"[".as_slice()), space),
        many0(terminated(_direct_object, space)),
        tag(b"]".as_slice()),
    )
    .parse(input)
}

fn dictionary(input: ParserInput) -> NomResult<Dictionary> {
    delimited(
        pair(tag(b"<<".as_slice()), space),
        fold_many0(
            pair(terminated(name, space), terminated(_direct_object, space)),
            Dictionary::new,
            |mut dict, (key, value)| {
                dict.set(key, value);
                dict
            },
        ),
        tag(b">>".as_slice()),
    )
    .parse(input)
}

/// Any object that is not a stream. Order matters: `R` references must win
/// over bare integers, reals over their integer prefix, `<<` over `<`.
fn _direct_object(input: ParserInput) -> NomResult<Object> {
    alt((
        map(tag(b"null".as_slice()), |_| Object::Null),
        map(tag(b"true".as_slice()), |_| Object::Boolean(true)),
        map(tag(b"false".as_slice()), |_| Object::Boolean(false)),
        reference,
        map(real, Object::Real),
        map(integer, Object::Integer),
        map(name, Object::Name),
        map(literal_string, Object::string_literal),
        map(dictionary, Object::Dictionary),
        hexadecimal_string,
        map(array, Object::Array),
    ))
    .parse(input)
}

/// Parses one object in a context where no indirect machinery is needed
/// (trailers, object stream payloads).
pub fn direct_object(input: ParserInput) -> Option<Object> {
    strip_nom(preceded(space, _direct_object).parse(input))
}

/// Parses one object, streams included. A recoverable stream failure
/// backtracks into the plain-object grammar; a broken stream body is
/// final and must not degrade into "the dictionary alone".
pub(crate) fn object<'a>(
    input: ParserInput<'a>, reader: &Reader, already_seen: &mut HashSet<ObjectId>,
) -> NomResult<'a, Object> {
    match stream(input, reader, already_seen) {
        Ok(ok) => Ok(ok),
        Err(failure @ nom::Err::Failure(_)) => Err(failure),
        Err(_) => _direct_object(input),
    }
}

fn stream<'a>(
    input: ParserInput<'a>, reader: &Reader, already_seen: &mut HashSet<ObjectId>,
) -> NomResult<'a, Object> {
    let (i, mut dict) = terminated(
        dictionary,
        (space, tag(b"stream".as_slice()), alt((tag(b"\r\n".as_slice()), tag(b"\n".as_slice()), tag(b"\r".as_slice())))),
    )
    .parse(input)?;

    let declared = dict.get(b"Length").ok().and_then(|value| match value {
        Object::Integer(n) => Some(*n),
        Object::Reference(id) => reader.get_object(*id, already_seen).ok()?.as_i64().ok(),
        _ => None,
    });

    match declared {
        Some(length) if length >= 0 && length as usize <= i.fragment().len() => {
            let length = length as usize;
            let (after, content) = take(length).parse(i)?;
            if strip_nom(pair(space, tag(b"endstream".as_slice())).parse(after)).is_some() {
                let mut stream = Stream::new(dict, content.fragment().to_vec());
                stream.start_position = None;
                let (rest, _) = pair(space, opt(tag(b"endstream".as_slice()))).parse(after)?;
                return Ok((rest, Object::Stream(stream)));
            }
            // Declared length does not land on endstream. Rescan for the
            // real boundary and repair the dictionary.
            recover_stream_payload(input, i, &mut dict, reader, Some(length as i64))
        }
        Some(negative_or_oversized) => {
            recover_stream_payload(input, i, &mut dict, reader, Some(negative_or_oversized))
        }
        None => {
            // Length is an unresolvable reference at this point of the
            // load. Remember where the payload starts; the reader fills
            // the content in once the length object is available.
            let stream = Stream::with_position(dict, i.location_offset());
            Ok((i, Object::Stream(stream)))
        }
    }
}

/// Locates `endstream` in `payload` and returns the content length, with
/// the framing EOL in front of the keyword trimmed off.
pub(crate) fn scan_stream_payload(payload: &[u8]) -> Option<usize> {
    let end = find_subslice(payload, b"endstream")?;
    let mut content_end = end;
    // The EOL before endstream belongs to the framing, not the payload.
    if content_end >= 2 && &payload[content_end - 2..content_end] == b"\r\n" {
        content_end -= 2;
    } else if content_end >= 1 && matches!(payload[content_end - 1], b'\r' | b'\n') {
        content_end -= 1;
    }
    Some(content_end)
}

fn recover_stream_payload<'a>(
    original: ParserInput<'a>, payload: ParserInput<'a>, dict: &mut Dictionary, reader: &Reader,
    declared: Option<i64>,
) -> NomResult<'a, Object> {
    if !reader.is_relaxed() {
        return Err(nom::Err::Failure(NomError::new(original, ErrorKind::LengthValue)));
    }
    let Some(content_end) = scan_stream_payload(payload.fragment()) else {
        return Err(nom::Err::Failure(NomError::new(original, ErrorKind::Eof)));
    };

    reader.report(Diagnostic::CorrectedStreamLength {
        offset: payload.location_offset(),
        declared,
        actual: content_end,
    });
    warn!(
        "stream at offset {} declares Length {:?} but ends after {} bytes",
        payload.location_offset(),
        declared,
        content_end
    );

    dict.set("Length", content_end as i64);
    let (after, content) = take(content_end).parse(payload)?;
    let (rest, _) = (space, tag(b"endstream".as_slice())).parse(after)?;
    let mut stream = Stream::new(dict.clone(), content.fragment().to_vec());
    stream.start_position = None;
    Ok((rest, Object::Stream(stream)))
}

pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

fn _indirect_object<'a>(
    input: ParserInput<'a>, reader: &Reader, already_seen: &mut HashSet<ObjectId>,
) -> NomResult<'a, (ObjectId, Object)> {
    let (i, _) = space(input)?;
    let (i, id) = terminated(object_id, pair(tag(b"obj".as_slice()), space)).parse(i)?;
    let (i, object) = object(i, reader, already_seen)?;
    let (i, _) = pair(space, opt(tag(b"endobj".as_slice()))).parse(i)?;
    Ok((i, (id, object)))
}

/// Parses the indirect object at `offset` of `input`.
///
/// When `expected_id` is given, a mismatched object number is an error; a
/// mismatched generation is tolerated with a warning, which matches how
/// widely-circulated files actually behave.
pub fn indirect_object(
    input: ParserInput, offset: usize, expected_id: Option<ObjectId>, reader: &Reader,
    already_seen: &mut HashSet<ObjectId>,
) -> Result<(ObjectId, Object)> {
    if offset > input.fragment().len() {
        return Err(Error::InvalidOffset(offset));
    }
    let slice = ParserInput::new_extra(&input.fragment()[offset..], input.extra);
    let (_, (id, mut object)) = _indirect_object(slice, reader, already_seen)
        .map_err(|_| Error::Parse(ParseError::InvalidObject(offset)))?;

    if let Some(expected) = expected_id {
        if expected.0 != id.0 {
            return Err(Error::Parse(ParseError::ObjectIdMismatch {
                expected,
                found: id,
            }));
        }
        if expected.1 != id.1 {
            warn!(
                "object {} has generation {} where the xref table says {}",
                id.0, id.1, expected.1
            );
        }
    }

    offset_stream(&mut object, offset);
    Ok((id, object))
}

/// Stream payload positions are relative to the parsed slice; rebase them
/// onto the whole buffer.
fn offset_stream(object: &mut Object, offset: usize) {
    if let Object::Stream(stream) = object {
        if let Some(start) = stream.start_position {
            stream.start_position = Some(start + offset);
        }
    }
}

/// Parses the `%PDF-M.m` header line.
pub fn header(input: ParserInput) -> Option<String> {
    strip_nom(
        map_res(
            delimited(
                tag(b"%PDF-".as_slice()),
                take_while1(|c: u8| c.is_ascii_digit() || c == b'.'),
                opt(comment),
            ),
            |version: ParserInput| str::from_utf8(version.fragment()).map(str::to_string),
        )
        .parse(input),
    )
}

/// Parses the binary comment line conventionally following the header.
pub fn binary_mark(input: ParserInput) -> Option<Vec<u8>> {
    strip_nom(
        preceded(
            tag(b"%".as_slice()),
            map(take_while(|c: u8| c != b'\r' && c != b'\n'), |bytes: ParserInput| {
                bytes.fragment().to_vec()
            }),
        )
        .parse(input),
    )
}

/// One 20-byte (nominally) entry of a classical xref subsection.
fn xref_entry(input: ParserInput) -> NomResult<(u64, u16, u8)> {
    map(
        (
            terminated(unsigned_int::<u64>, take_while(|c| c == b' ')),
            terminated(unsigned_int::<u16>, take_while(|c| c == b' ')),
            one_of("nf"),
            take_while(|c: u8| c == b' ' || c == b'\r' || c == b'\n'),
        ),
        |(offset, generation, kind, _)| (offset, generation, kind as u8),
    )
    .parse(input)
}

/// Classical `xref` section: one or more `first count` subsections.
pub fn xref(input: ParserInput) -> NomResult<Xref> {
    let (mut i, _) = (tag(b"xref".as_slice()), space).parse(input)?;
    let mut table = Xref::new(0, XrefKind::CrossReferenceTable);
    let mut any = false;
    loop {
        let header = pair(
            terminated(unsigned_int::<u32>, take_while(|c| c == b' ')),
            terminated(unsigned_int::<u32>, pair(take_while(|c| c == b' '), eol)),
        )
        .parse(i);
        let (mut j, (first, count)) = match header {
            Ok(ok) => ok,
            Err(_) if any => break,
            Err(e) => return Err(e),
        };
        any = true;
        for index in 0..count {
            let (k, (offset, generation, kind)) = xref_entry(j)?;
            let id = first + index;
            let entry = match kind {
                b'n' => XrefEntry::Normal { offset, generation },
                _ => XrefEntry::Free {
                    next_free: offset as u32,
                    generation,
                },
            };
            table.entries.entry(id).or_insert(entry);
            j = k;
        }
        i = j;
    }
    table.size = table.max_id() + 1;
    Ok((i, table))
}

fn trailer(input: ParserInput) -> NomResult<Dictionary> {
    preceded((space, tag(b"trailer".as_slice()), space), dictionary).parse(input)
}

/// Parses either form of cross-reference section and its trailer fields.
///
/// Classical sections are `xref … trailer <<…>>`; otherwise the bytes must
/// be an indirect stream object with `/Type /XRef`, whose dictionary
/// doubles as the trailer.
pub fn xref_and_trailer(input: ParserInput, reader: &Reader) -> Result<(Xref, Dictionary)> {
    if strip_nom(preceded(space, tag(b"xref".as_slice())).parse(input)).is_some() {
        let (rest, mut table) = preceded(space, xref)
            .parse(input)
            .map_err(|_| Error::Parse(ParseError::InvalidXref))?;
        let trailer = strip_nom(trailer(rest)).ok_or(Error::Parse(ParseError::InvalidTrailer))?;
        if let Ok(size) = trailer.get(b"Size").and_then(Object::as_i64) {
            table.size = size.max(0) as u32;
        }
        return Ok((table, trailer));
    }

    if !reader.honors_xref_streams() {
        return Err(Error::Parse(ParseError::InvalidXref));
    }
    let mut already_seen = HashSet::new();
    let (_, (_, object)) = _indirect_object(input, reader, &mut already_seen)
        .map_err(|_| Error::Parse(ParseError::InvalidXref))?;
    let stream = object.as_stream()?.clone();
    decode_xref_stream(stream)
}

/// Decodes a cross-reference stream into a table plus its trailer dict.
pub fn decode_xref_stream(mut stream: Stream) -> Result<(Xref, Dictionary)> {
    if !stream.dict.has_type(b"XRef") {
        return Err(Error::Parse(ParseError::InvalidXref));
    }
    let payload = crate::filters::decode_stream(&stream)?;
    stream.set_plain_content(payload);
    let dict = stream.dict;
    let payload = stream.content;

    let size = dict.get(b"Size").and_then(Object::as_i64)?;
    let widths: Vec<usize> = dict
        .get(b"W")
        .and_then(Object::as_array)?
        .iter()
        .map(|w| w.as_i64().map(|n| n.max(0) as usize))
        .collect::<Result<_>>()?;
    if widths.len() != 3 {
        return Err(Error::Parse(ParseError::InvalidXref));
    }
    let entry_len = widths.iter().sum::<usize>();
    if entry_len == 0 {
        return Err(Error::Parse(ParseError::InvalidXref));
    }

    let index: Vec<i64> = match dict.get(b"Index").and_then(Object::as_array) {
        Ok(pairs) => pairs.iter().map(Object::as_i64).collect::<Result<_>>()?,
        Err(_) => vec![0, size],
    };
    if index.len() % 2 != 0 {
        return Err(Error::Parse(ParseError::InvalidXref));
    }

    let mut table = Xref::new(size.max(0) as u32, XrefKind::CrossReferenceStream);
    let mut cursor = 0usize;
    for range in index.chunks(2) {
        let (first, count) = (range[0].max(0) as u32, range[1].max(0) as u32);
        for id in first..first.saturating_add(count) {
            let Some(raw) = payload.get(cursor..cursor + entry_len) else {
                return Err(Error::Parse(ParseError::InvalidXref));
            };
            cursor += entry_len;
            let (type_raw, rest) = raw.split_at(widths[0]);
            let (second_raw, third_raw) = rest.split_at(widths[1]);
            // A zero-width type field defaults to 1.
            let kind = if widths[0] == 0 { 1 } else { be_number(type_raw) };
            let second = be_number(second_raw);
            let third = be_number(third_raw);
            let entry = match kind {
                0 => XrefEntry::Free {
                    next_free: second as u32,
                    generation: third as u16,
                },
                1 => XrefEntry::Normal {
                    offset: second,
                    generation: third as u16,
                },
                2 => XrefEntry::Compressed {
                    container: second as u32,
                    index: third as u16,
                },
                _ => continue,
            };
            table.entries.entry(id).or_insert(entry);
        }
    }
    Ok((table, dict))
}

fn be_number(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, &b| acc << 8 | b as u64)
}

/// Parses `startxref <offset>`, with the `%%EOF` marker optional so that
/// truncated files still yield their offset.
pub fn xref_start(input: ParserInput) -> Option<i64> {
    strip_nom(
        delimited(
            (tag(b"startxref".as_slice()), space),
            integer,
            (space, opt(tag(b"%%EOF".as_slice()))),
        )
        .parse(input),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;
    use crate::reader::ReadOptions;

    fn input(bytes: &[u8]) -> ParserInput {
        ParserInput::new_extra(bytes, "test")
    }

    fn parse(bytes: &[u8]) -> Option<Object> {
        direct_object(input(bytes))
    }

    fn test_reader<'a>(buffer: &'a [u8]) -> Reader<'a> {
        Reader::new(buffer, Document::new(), ReadOptions::default())
    }

    #[test]
    fn parse_numbers() {
        assert_eq!(parse(b"42"), Some(Object::Integer(42)));
        assert_eq!(parse(b"-17"), Some(Object::Integer(-17)));
        assert_eq!(parse(b"3.5"), Some(Object::Real(3.5)));
        assert_eq!(parse(b"-.002"), Some(Object::Real(-0.002)));
        assert_eq!(parse(b"4."), Some(Object::Real(4.0)));
    }

    #[test]
    fn parse_keywords() {
        assert_eq!(parse(b"null"), Some(Object::Null));
        assert_eq!(parse(b"true"), Some(Object::Boolean(true)));
        assert_eq!(parse(b"false"), Some(Object::Boolean(false)));
    }

    #[test]
    fn parse_name_with_escapes() {
        assert_eq!(parse(b"/Name1"), Some(Object::Name(b"Name1".to_vec())));
        assert_eq!(
            parse(b"/Lime#20Green"),
            Some(Object::Name(b"Lime Green".to_vec()))
        );
        assert_eq!(parse(b"/A#42"), Some(Object::Name(b"AB".to_vec())));
    }

    #[test]
    fn parse_literal_string_escapes() {
        assert_eq!(
            parse(b"(text (nested) more)"),
            Some(Object::string_literal("text (nested) more"))
        );
        assert_eq!(
            parse(b"(line\\nbreak \\( \\061)"),
            Some(Object::string_literal("line\nbreak ( 1"))
        );
        assert_eq!(parse(b"(split\\\nline)"), Some(Object::string_literal("splitline")));
        assert_eq!(parse(b"(cr\rhere)"), Some(Object::string_literal("cr\nhere")));
    }

    #[test]
    fn literal_string_nesting_is_bounded() {
        let mut text = Vec::new();
        text.extend(std::iter::repeat_n(b'(', MAX_BRACKET + 2));
        text.extend(std::iter::repeat_n(b')', MAX_BRACKET + 2));
        assert_eq!(parse(&text), None);
    }

    #[test]
    fn parse_hexadecimal_string() {
        assert_eq!(
            parse(b"<48 65 6C6C6F>"),
            Some(Object::String(b"Hello".to_vec(), StringFormat::Hexadecimal))
        );
        // Odd nibble count pads with zero.
        assert_eq!(
            parse(b"<901FA>"),
            Some(Object::String(vec![0x90, 0x1F, 0xA0], StringFormat::Hexadecimal))
        );
    }

    #[test]
    fn parse_array_and_reference() {
        let parsed = parse(b"[ 1 0 R 2 (x) /N ]").unwrap();
        assert_eq!(
            parsed,
            Object::Array(vec![
                Object::Reference((1, 0)),
                Object::Integer(2),
                Object::string_literal("x"),
                Object::Name(b"N".to_vec()),
            ])
        );
    }

    #[test]
    fn parse_nested_dictionary() {
        let parsed = parse(b"<</A<</B 2>>/C[3]>>").unwrap();
        let dict = parsed.as_dict().unwrap();
        let inner = dict.get(b"A").unwrap().as_dict().unwrap();
        assert_eq!(inner.get(b"B").unwrap().as_i64().unwrap(), 2);
        assert_eq!(dict.get(b"C").unwrap().as_array().unwrap().len(), 1);
    }

    #[test]
    fn parse_indirect_stream_object() {
        let buffer = b"7 0 obj\n<</Length 5>>stream\nhello\nendstream\nendobj\n";
        let reader = test_reader(buffer);
        let (id, object) =
            indirect_object(input(buffer), 0, None, &reader, &mut HashSet::new()).unwrap();
        assert_eq!(id, (7, 0));
        assert_eq!(object.as_stream().unwrap().content, b"hello");
    }

    #[test]
    fn stream_with_wrong_length_is_repaired_when_relaxed() {
        let buffer = b"7 0 obj\n<</Length 3>>stream\nhello\nendstream\nendobj\n";
        let reader = test_reader(buffer);
        let (_, object) = indirect_object(input(buffer), 0, None, &reader, &mut HashSet::new()).unwrap();
        let stream = object.as_stream().unwrap();
        assert_eq!(stream.content, b"hello");
        assert_eq!(stream.dict.get(b"Length").unwrap().as_i64().unwrap(), 5);
        assert_eq!(reader.take_diagnostics().len(), 1);
    }

    #[test]
    fn stream_with_wrong_length_fails_when_strict() {
        let buffer = b"7 0 obj\n<</Length 3>>stream\nhello\nendstream\nendobj\n";
        let mut options = ReadOptions::default();
        options.relaxed = false;
        let reader = Reader::new(buffer, Document::new(), options);
        assert!(indirect_object(input(buffer), 0, None, &reader, &mut HashSet::new()).is_err());
    }

    #[test]
    fn parse_header_and_binary_mark() {
        assert_eq!(header(input(b"%PDF-1.7\n")), Some("1.7".to_string()));
        assert_eq!(header(input(b"no header")), None);
        assert_eq!(
            binary_mark(input(b"%\xB5\xB5\xB5\xB5\n")),
            Some(vec![0xB5, 0xB5, 0xB5, 0xB5])
        );
    }

    #[test]
    fn parse_classical_xref_section() {
        let section = b"xref\n0 3\n0000000000 65535 f \n0000000017 00000 n \n0000000081 00000 n \n2 1\n0000000199 00001 n \ntrailer\n<</Size 4/Root 1 0 R>>\nstartxref\n300\n%%EOF";
        let (rest, table) = xref(input(section)).unwrap();
        assert_eq!(
            table.get(0),
            Some(&XrefEntry::Free {
                next_free: 0,
                generation: u16::MAX
            })
        );
        assert_eq!(table.get(1), Some(&XrefEntry::Normal { offset: 17, generation: 0 }));
        // Within one section the first subsection defining an entry wins.
        assert_eq!(table.get(2), Some(&XrefEntry::Normal { offset: 81, generation: 0 }));
        let trailer_dict = strip_nom(trailer(rest)).unwrap();
        assert_eq!(trailer_dict.get(b"Size").unwrap().as_i64().unwrap(), 4);
    }

    #[test]
    fn parse_xref_start() {
        assert_eq!(xref_start(input(b"startxref\n1234\n%%EOF\n")), Some(1234));
        assert_eq!(xref_start(input(b"startxref\n98")), Some(98));
    }

    #[test]
    fn decode_uncompressed_xref_stream() {
        // W = [1 2 1], three entries: free head, object 1 at offset 0x11,
        // object 2 compressed in stream 1 index 0.
        let mut dict = crate::dictionary! {
            "Type" => "XRef",
            "Size" => 3,
            "W" => vec![1.into(), 2.into(), 1.into()],
        };
        dict.set("Root", Object::Reference((1, 0)));
        let payload = vec![
            0, 0, 0, 255, //
            1, 0, 0x11, 0, //
            2, 0, 1, 0,
        ];
        let stream = Stream::new(dict, payload);
        let (table, trailer) = decode_xref_stream(stream).unwrap();
        assert_eq!(table.get(1), Some(&XrefEntry::Normal { offset: 0x11, generation: 0 }));
        assert_eq!(table.get(2), Some(&XrefEntry::Compressed { container: 1, index: 0 }));
        assert_eq!(trailer.get(b"Size").unwrap().as_i64().unwrap(), 3);
    }
}
