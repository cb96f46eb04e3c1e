//! End-to-end read/write round trips over in-memory documents.

use pdfmill::{
    Document, Error, Object, ReadOptions, SaveOptions, ValidationMode, XrefKind, dictionary,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds a classical-xref file from object bodies, computing offsets so
/// the fixture stays valid when bodies change.
fn assemble_pdf(objects: &[(u32, String)]) -> Vec<u8> {
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

fn one_page_pdf() -> Vec<u8> {
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

fn multi_page_document() -> Document {
    let mut doc = Document::with_version("1.6");
    let pages_id = doc.new_object_id();
    let mut kids = Vec::new();
    for index in 0..4 {
        let content = pdfmill::Stream::new(
            dictionary! {},
            format!("BT /F1 12 Tf 10 10 Td (page {index}) Tj ET").into_bytes(),
        );
        let content_id = doc.add_object(content);
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference(pages_id),
            "Contents" => Object::Reference(content_id),
        });
        kids.push(Object::Reference(page));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => 4,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => Object::Reference(pages_id),
    });
    doc.trailer.set("Root", Object::Reference(catalog));
    doc
}

fn page_contents(doc: &Document, page_number: u32) -> Vec<u8> {
    let (page, _) = doc.page_dict(page_number, false).unwrap();
    let contents = page.get(b"Contents").unwrap();
    let (_, resolved) = doc.dereference(contents).unwrap();
    resolved.as_stream().unwrap().decoded_content().unwrap()
}

#[test]
fn classical_xref_write_is_a_fixpoint() {
    init_logging();
    let mut doc = Document::load_mem(&one_page_pdf()).unwrap();
    doc.validate(ValidationMode::Strict).unwrap();

    let mut first = Vec::new();
    doc.save_to(&mut first).unwrap();
    let mut reloaded = Document::load_mem(&first).unwrap();
    reloaded.validate(ValidationMode::Strict).unwrap();
    let mut second = Vec::new();
    reloaded.save_to(&mut second).unwrap();

    // Writing what was just read reproduces the file byte for byte,
    // classical xref section included.
    assert_eq!(first, second);
    let text = String::from_utf8_lossy(&second);
    assert!(text.contains("xref\n"));
    assert!(text.contains("trailer\n"));
}

#[test]
fn xref_stream_upgrade_preserves_page_tree() {
    let mut doc = Document::load_mem(&one_page_pdf()).unwrap();
    let catalog_before = doc.catalog().unwrap().clone();
    let pages_before = doc.get_pages().len();

    let mut upgraded = Vec::new();
    let options = SaveOptions::builder()
        .use_object_streams(true)
        .use_xref_streams(true)
        .build();
    doc.save_with_options(&mut upgraded, options).unwrap();

    let reloaded = Document::load_mem(&upgraded).unwrap();
    assert_eq!(reloaded.reference_table.kind, XrefKind::CrossReferenceStream);
    assert_eq!(reloaded.get_pages().len(), pages_before);
    assert!(reloaded.catalog().unwrap().equals_ignoring_order(&catalog_before));
    // The page, catalog and font all left the top level for an object
    // stream.
    assert!(String::from_utf8_lossy(&upgraded).contains("/ObjStm"));
}

#[test]
fn xref_stream_files_ignore_v15_structures_when_disabled() {
    let mut doc = Document::load_mem(&one_page_pdf()).unwrap();
    let mut upgraded = Vec::new();
    let options = SaveOptions::builder().use_object_streams(true).build();
    doc.save_with_options(&mut upgraded, options).unwrap();

    let mut options = ReadOptions::strict();
    options.reader_v15 = false;
    assert!(Document::load_mem_with_options(&upgraded, options).is_err());
}

#[test]
fn aes_256_roundtrip_with_both_passwords() {
    init_logging();
    let mut doc = multi_page_document();
    doc.set_password("u", "o");

    let mut encrypted = Vec::new();
    doc.save_to(&mut encrypted).unwrap();

    // The page text must not appear in cleartext anywhere in the file.
    assert!(
        !encrypted.windows(6).any(|w| w == b"page 0"),
        "content leaked into the encrypted file"
    );

    let reread = Document::load_mem_with_password(&encrypted, "u").unwrap();
    assert_eq!(reread.get_pages().len(), 4);
    assert_eq!(page_contents(&reread, 1), page_contents(&doc, 1));

    let via_owner = Document::load_mem_with_password(&encrypted, "o").unwrap();
    assert_eq!(via_owner.get_pages().len(), 4);

    match Document::load_mem_with_password(&encrypted, "wrong") {
        Err(Error::InvalidPassword) => {}
        other => panic!("expected InvalidPassword, got {other:?}"),
    }
    match Document::load_mem(&encrypted) {
        Err(Error::PasswordRequired) => {}
        other => panic!("expected PasswordRequired, got {other:?}"),
    }
}

#[test]
fn rc4_roundtrip_via_explicit_settings() {
    let mut doc = multi_page_document();
    doc.set_encryption(pdfmill::EncryptionSettings {
        user_password: "user".into(),
        owner_password: "owner".into(),
        permissions: pdfmill::PermissionFlags::default(),
        use_aes: false,
        key_length: 128,
    });
    let mut encrypted = Vec::new();
    doc.save_to(&mut encrypted).unwrap();

    let reread = Document::load_mem_with_password(&encrypted, "user").unwrap();
    assert_eq!(page_contents(&reread, 2), page_contents(&doc, 2));
}

#[test]
fn optimize_then_save_merges_fonts_across_pages() {
    let bytes = assemble_pdf(&[
        (1, "<</Type/Catalog/Pages 2 0 R>>".to_string()),
        (2, "<</Type/Pages/Kids[3 0 R 4 0 R]/Count 2/MediaBox[0 0 612 792]>>".to_string()),
        (3, "<</Type/Page/Parent 2 0 R/Resources<</Font<</F1 5 0 R>>>>>>".to_string()),
        (4, "<</Type/Page/Parent 2 0 R/Resources<</Font<</F2 6 0 R>>>>>>".to_string()),
        (5, "<</Type/Font/Subtype/Type1/BaseFont/Helvetica>>".to_string()),
        (6, "<</Type/Font/Subtype/Type1/BaseFont/Helvetica>>".to_string()),
    ]);
    let mut doc = Document::load_mem(&bytes).unwrap();
    doc.optimize();

    let mut out = Vec::new();
    doc.save_to(&mut out).unwrap();
    let reloaded = Document::load_mem(&out).unwrap();

    let font_objects = reloaded
        .objects
        .values()
        .filter(|object| object.as_dict().map(|d| d.has_type(b"Font")).unwrap_or(false))
        .count();
    assert_eq!(font_objects, 1);

    let font_ref_of = |page: u32| {
        let (dict, attrs) = reloaded.page_dict(page, true).unwrap();
        let _ = attrs;
        let resources = dict.get(b"Resources").unwrap().as_dict().unwrap().clone();
        let fonts = resources.get(b"Font").unwrap().as_dict().unwrap().clone();
        fonts.iter().next().map(|(_, v)| v.as_reference().unwrap()).unwrap()
    };
    assert_eq!(font_ref_of(1), font_ref_of(2));
}

#[test]
fn optimizer_output_is_deterministic() {
    let mut doc_a = multi_page_document();
    let mut doc_b = multi_page_document();
    doc_a.optimize();
    doc_b.optimize();
    let (mut out_a, mut out_b) = (Vec::new(), Vec::new());
    doc_a.save_to(&mut out_a).unwrap();
    doc_b.save_to(&mut out_b).unwrap();
    assert_eq!(out_a, out_b);
}

#[test]
fn abort_flag_stops_saving() {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    let mut doc = multi_page_document();
    doc.set_abort_flag(Arc::new(AtomicBool::new(true)));
    let mut out = Vec::new();
    assert!(matches!(doc.save_to(&mut out), Err(Error::Aborted)));
}

#[test]
fn save_to_disk_and_reload() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("roundtrip.pdf");
    let mut doc = multi_page_document();
    doc.save(&path).unwrap();
    let reloaded = Document::load(&path).unwrap();
    assert_eq!(reloaded.get_pages().len(), 4);
}

#[test]
fn prev_chained_sections_merge_with_newest_winning() {
    // An incremental update: object 4 is redefined, the new section
    // chains to the old one via Prev.
    let base = one_page_pdf();
    let base_len = base.len();
    let mut bytes = base;
    bytes.push(b'\n');
    let update_offset = bytes.len();
    bytes.extend_from_slice(b"4 0 obj\n<</Type/Font/Subtype/Type1/BaseFont/Courier>>\nendobj\n");
    let xref_pos = bytes.len();
    let old_startxref = {
        let text = String::from_utf8_lossy(&bytes[..base_len]);
        let marker = text.rfind("startxref").unwrap();
        text[marker + 10..].lines().next().unwrap().trim().parse::<usize>().unwrap()
    };
    bytes.extend_from_slice(
        format!(
            "xref\n4 1\n{update_offset:010} 00000 n \ntrailer\n<</Size 6/Root 1 0 R/Prev {old_startxref}>>\nstartxref\n{xref_pos}\n%%EOF"
        )
        .as_bytes(),
    );

    let doc = Document::load_mem(&bytes).unwrap();
    let font = doc.get_dictionary((4, 0)).unwrap();
    assert_eq!(font.get(b"BaseFont").unwrap().as_name().unwrap(), b"Courier");
    assert_eq!(doc.get_pages().len(), 1);
}
