use super::*;
use crate::{Document, ReadOptions};

/// Assembles a classical-xref file from object bodies, computing offsets
/// so fixtures stay valid when the bodies change.
pub(crate) fn assemble_pdf(objects: &[(u32, String)]) -> Vec<u8> {
    let mut out = b"%PDF-1.4\n%\xB5\xB5\xB5\xB5\n".to_vec();
    let mut offsets = Vec::new();
    for (number, body) in objects {
        offsets.push(out.len());
        out.extend_from_slice(format!("{number} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let xref_pos = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in &offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<</Size {}/Root 1 0 R>>\nstartxref\n{}\n%%EOF",
            objects.len() + 1,
            xref_pos
        )
        .as_bytes(),
    );
    out
}

pub(crate) fn simple_pdf() -> Vec<u8> {
    let content = "BT /F1 24 Tf 72 720 Td (Hello world) Tj ET";
    assemble_pdf(&[
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (
            2,
            "<</Type/Pages/Kids[3 0 R]/Count 1/MediaBox[0 0 595 842]>>".to_string(),
        ),
        (
            3,
            "<</Type/Page/Parent 2 0 R/Resources<</Font<</F1 4 0 R>>>>/Contents 5 0 R>>".to_string(),
        ),
        (4, "<</Type/Font/Subtype/Type1/BaseFont/Helvetica>>".to_string()),
        (
            5,
            format!("<</Length {}>>stream\n{}\nendstream", content.len(), content),
        ),
    ])
}

#[test]
fn load_document() {
    let doc = Document::load_mem(&simple_pdf()).unwrap();
    assert_eq!(doc.version, "1.4");
    assert_eq!(doc.get_pages().len(), 1);
    assert!(doc.catalog().unwrap().has_type(b"Catalog"));
    assert!(doc.diagnostics().is_empty());
}

#[test]
fn load_short_document() {
    let err = Document::load_mem_with_options(b"%PDF-1.5\n%%EOF\n", ReadOptions::strict()).unwrap_err();
    assert!(matches!(err, Error::Xref(XrefError::Start)));
}

#[test]
fn load_document_with_preceding_bytes() {
    let mut content = Vec::new();
    content.extend_from_slice(b"garbage");
    content.extend(simple_pdf());
    let doc = Document::load_mem(&content).unwrap();
    assert_eq!(doc.version, "1.4");
    assert_eq!(doc.get_pages().len(), 1);
}

#[test]
fn stream_length_behind_reference_is_resolved() {
    let content = "BT ET";
    let doc = assemble_pdf(&[
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (2, "<</Type/Pages/Kids[3 0 R]/Count 1>>".to_string()),
        (3, "<</Type/Page/Parent 2 0 R/Contents 4 0 R>>".to_string()),
        (4, format!("<</Length 5 0 R>>stream\n{content}\nendstream")),
        (5, content.len().to_string()),
    ]);
    let doc = Document::load_mem(&doc).unwrap();
    let stream = doc.get_object((4, 0)).unwrap().as_stream().unwrap();
    assert_eq!(stream.content, content.as_bytes());
}

#[test]
fn stream_length_reference_to_missing_object_is_scanned() {
    let content = "BT /F1 12 Tf (x) Tj ET";
    let bytes = assemble_pdf(&[
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (2, "<</Type/Pages/Kids[3 0 R]/Count 1>>".to_string()),
        (3, "<</Type/Page/Parent 2 0 R/Contents 4 0 R>>".to_string()),
        (4, format!("<</Length 9 0 R>>stream\n{content}\nendstream")),
    ]);

    // Relaxed: the payload boundary comes from the endstream scan and the
    // repair is recorded.
    let doc = Document::load_mem(&bytes).unwrap();
    let stream = doc.get_object((4, 0)).unwrap().as_stream().unwrap();
    assert_eq!(stream.content, content.as_bytes());
    assert_eq!(stream.dict.get(b"Length").unwrap().as_i64().unwrap(), content.len() as i64);
    assert!(
        doc.diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::CorrectedStreamLength { declared: None, .. }))
    );

    // Strict: an unresolvable length is fatal.
    assert!(Document::load_mem_with_options(&bytes, ReadOptions::strict()).is_err());
}

#[test]
fn stream_length_reference_to_itself_is_scanned() {
    let content = "0 0 m 10 10 l S";
    let bytes = assemble_pdf(&[
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (2, "<</Type/Pages/Kids[3 0 R]/Count 1>>".to_string()),
        (3, "<</Type/Page/Parent 2 0 R/Contents 4 0 R>>".to_string()),
        (4, format!("<</Length 4 0 R>>stream\n{content}\nendstream")),
    ]);

    let doc = Document::load_mem(&bytes).unwrap();
    let stream = doc.get_object((4, 0)).unwrap().as_stream().unwrap();
    assert_eq!(stream.content, content.as_bytes());
    assert!(
        doc.diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::CorrectedStreamLength { .. }))
    );
}

#[test]
fn wrong_startxref_offset_recovers_in_relaxed_mode() {
    let mut bytes = simple_pdf();
    let marker = Reader::search_substring(&bytes, b"startxref", 0).unwrap();
    let digits_at = marker + b"startxref\n".len();
    // Nudge the recorded offset into the middle of an object.
    bytes[digits_at] = b'0';
    bytes[digits_at + 1] = b'0';

    let err = Document::load_mem_with_options(&bytes, ReadOptions::strict()).unwrap_err();
    assert!(matches!(err, Error::Xref(XrefError::Corrupt)));

    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
    assert!(
        doc.diagnostics()
            .iter()
            .any(|d| matches!(d, Diagnostic::RebuiltXref { .. }))
    );
}

#[test]
fn missing_xref_section_recovers_in_relaxed_mode() {
    let full = simple_pdf();
    let xref_at = Reader::search_substring(&full, b"xref", 0).unwrap();
    // Keep objects and the trailer-less tail; drop the whole xref block.
    let mut bytes = full[..xref_at].to_vec();
    bytes.extend_from_slice(b"startxref\n0\n%%EOF");

    let doc = Document::load_mem(&bytes).unwrap();
    assert_eq!(doc.get_pages().len(), 1);
    assert!(doc.catalog().unwrap().has_type(b"Catalog"));
}

#[test]
fn metadata_shortcut_reads_info_and_page_count() {
    let bytes = assemble_pdf(&[
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (
            2,
            "<</Type/Pages/Kids[3 0 R 4 0 R]/Count 2>>".to_string(),
        ),
        (3, "<</Type/Page/Parent 2 0 R>>".to_string()),
        (4, "<</Type/Page/Parent 2 0 R>>".to_string()),
        (5, "<</Title (A title) /Producer (pdfmill)>>".to_string()),
    ]);
    // Point the trailer at the info dictionary.
    let bytes = String::from_utf8(bytes)
        .unwrap()
        .replace("/Root 1 0 R", "/Root 1 0 R/Info 5 0 R");
    let metadata = Document::load_metadata_mem(bytes.as_bytes()).unwrap();
    assert_eq!(metadata.page_count, 2);
    assert_eq!(metadata.title.as_deref(), Some("A title"));
    assert_eq!(metadata.producer.as_deref(), Some("pdfmill"));
}

#[test]
fn search_substring_finds_last_occurrence() {
    assert_eq!(Reader::search_substring(b"hello world", b"xyz", 0), None);
    assert_eq!(Reader::search_substring(b"hello world", b"world", 0), Some(6));

    let buffer = b"%%EOF\ntest%%EOF\nend";
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 0), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 6), Some(10));
    assert_eq!(Reader::search_substring(buffer, b"%%EOF", 15), None);
    assert_eq!(Reader::search_substring(b"%%EOF", b"%%EOF", 0), Some(0));
}
