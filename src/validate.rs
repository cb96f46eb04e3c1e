//! Graph validation: walking the document from the catalog and checking
//! that what the trailer promises is actually there, with the right
//! types and values.
//!
//! Strict mode stops at the first violation. Relaxed mode logs every
//! finding and keeps walking, which is how files from the wild have to be
//! treated. `None` skips the walk entirely.

use std::collections::HashSet;

use log::warn;
use thiserror::Error;

use crate::{Dictionary, Document, Error, Object, ObjectId, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    Strict,
    #[default]
    Relaxed,
    None,
}

/// A violation, located by the dotted key chain from the trailer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}: {kind}")]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationErrorKind {
    #[error("required entry {0} is missing")]
    MissingEntry(String),
    #[error("wrong type, expected {expected}")]
    WrongType { expected: &'static str },
    #[error("entry {0} is not allowed here")]
    InvalidEntry(String),
    #[error("invalid value: {0}")]
    InvalidValue(String),
    #[error("reference to an object the document never defines")]
    DanglingReference,
    #[error("page tree Count says {declared}, the tree holds {counted} leaves")]
    PageCountMismatch { declared: i64, counted: i64 },
    #[error("stream cannot be decoded: {0}")]
    CorruptStream(String),
}

impl Document {
    /// Validates the object graph reachable from the trailer.
    pub fn validate(&self, mode: ValidationMode) -> Result<()> {
        if mode == ValidationMode::None {
            return Ok(());
        }
        let mut validator = Validator {
            document: self,
            strict: mode == ValidationMode::Strict,
            findings: Vec::new(),
        };
        validator.trailer()?;
        Ok(())
    }

    /// Like [`Document::validate`], but returns everything a relaxed walk
    /// found instead of logging it.
    pub fn validate_report(&self) -> Vec<ValidationError> {
        let mut validator = Validator {
            document: self,
            strict: false,
            findings: Vec::new(),
        };
        // A relaxed walk never returns Err.
        let _ = validator.trailer();
        validator.findings
    }
}

struct Validator<'a> {
    document: &'a Document,
    strict: bool,
    findings: Vec<ValidationError>,
}

/// The inheritable page attributes tracked while descending the tree.
#[derive(Debug, Clone, Default)]
struct Inherited {
    resources: Option<Object>,
    media_box: Option<Object>,
}

impl Inherited {
    fn absorb(&mut self, node: &Dictionary) {
        if let Ok(resources) = node.get(b"Resources") {
            self.resources = Some(resources.clone());
        }
        if let Ok(media_box) = node.get(b"MediaBox") {
            self.media_box = Some(media_box.clone());
        }
    }
}

/// Entries allowed in dictionaries with a closed entry set.
const TRAILER_ENTRIES: &[&[u8]] = &[
    b"Size", b"Prev", b"Root", b"Encrypt", b"Info", b"ID", b"XRefStm", b"Type", b"Index", b"W",
    b"Filter", b"DecodeParms", b"Length", b"DL",
];
const PAGES_ENTRIES: &[&[u8]] = &[
    b"Type", b"Parent", b"Kids", b"Count", b"Resources", b"MediaBox", b"CropBox", b"Rotate",
];

impl Validator<'_> {
    fn report(&mut self, path: &str, kind: ValidationErrorKind) -> Result<()> {
        let finding = ValidationError {
            path: path.to_string(),
            kind,
        };
        if self.strict {
            return Err(Error::Validation(finding));
        }
        warn!("validation: {finding}");
        self.findings.push(finding);
        Ok(())
    }

    /// Stream decode failures are advisory in both modes: the stream is
    /// flagged and the walk continues.
    fn flag_stream(&mut self, path: &str, message: String) {
        let finding = ValidationError {
            path: path.to_string(),
            kind: ValidationErrorKind::CorruptStream(message),
        };
        warn!("validation: {finding}");
        self.findings.push(finding);
    }

    fn trailer(&mut self) -> Result<()> {
        let trailer = &self.document.trailer;
        for (key, _) in trailer.iter() {
            if !TRAILER_ENTRIES.contains(&key.as_slice()) {
                self.report(
                    "trailer",
                    ValidationErrorKind::InvalidEntry(String::from_utf8_lossy(key).into_owned()),
                )?;
            }
        }
        if trailer.get(b"Size").and_then(Object::as_i64).is_err() {
            self.report("trailer", ValidationErrorKind::MissingEntry("Size".into()))?;
        }

        match trailer.get(b"Root") {
            Err(_) => self.report("trailer", ValidationErrorKind::MissingEntry("Root".into()))?,
            Ok(root) => {
                if let Some(catalog) = self.require_dict("Root", root)? {
                    self.catalog(&catalog)?;
                }
            }
        }

        if let Ok(info) = trailer.get(b"Info") {
            if let Some(info) = self.require_dict("Info", info)? {
                self.info(&info)?;
            }
        }
        Ok(())
    }

    /// Dereferences and type-checks a dictionary value; reports and
    /// yields `None` when it is no dictionary.
    fn require_dict(&mut self, path: &str, object: &Object) -> Result<Option<Dictionary>> {
        match self.document.dereference(object) {
            Ok((id, value)) => match value {
                Object::Dictionary(dict) => Ok(Some(dict.clone())),
                Object::Stream(stream) => Ok(Some(stream.dict.clone())),
                Object::Null if id.is_some() => {
                    self.report(path, ValidationErrorKind::DanglingReference)?;
                    Ok(None)
                }
                _ => {
                    self.report(path, ValidationErrorKind::WrongType { expected: "Dictionary" })?;
                    Ok(None)
                }
            },
            Err(Error::ReferenceCycle(_)) => {
                self.report(path, ValidationErrorKind::InvalidValue("reference cycle".into()))?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn require_array(&mut self, path: &str, object: &Object) -> Result<Option<Vec<Object>>> {
        match self.document.dereference(object) {
            Ok((id, Object::Null)) if id.is_some() => {
                self.report(path, ValidationErrorKind::DanglingReference)?;
                Ok(None)
            }
            Ok((_, Object::Array(array))) => Ok(Some(array.clone())),
            Ok(_) => {
                self.report(path, ValidationErrorKind::WrongType { expected: "Array" })?;
                Ok(None)
            }
            Err(Error::ReferenceCycle(_)) => {
                self.report(path, ValidationErrorKind::InvalidValue("reference cycle".into()))?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn catalog(&mut self, catalog: &Dictionary) -> Result<()> {
        if !catalog.has_type(b"Catalog") {
            self.report(
                "Root.Type",
                ValidationErrorKind::InvalidValue("catalog must have /Type /Catalog".into()),
            )?;
        }

        match catalog.get(b"Pages") {
            Err(_) => self.report("Root", ValidationErrorKind::MissingEntry("Pages".into()))?,
            Ok(pages) => {
                let mut counted = 0i64;
                let mut declared = None;
                if let Some(pages_dict) = self.require_dict("Root.Pages", pages)? {
                    declared = pages_dict.get(b"Count").and_then(Object::as_i64).ok();
                    let mut seen = HashSet::new();
                    self.page_node("Root.Pages", &pages_dict, &mut counted, &mut seen, &Inherited::default())?;
                }
                if let Some(declared) = declared {
                    if declared != counted {
                        self.report(
                            "Root.Pages.Count",
                            ValidationErrorKind::PageCountMismatch { declared, counted },
                        )?;
                    }
                }
            }
        }

        if let Ok(names) = catalog.get(b"Names") {
            if let Some(names) = self.require_dict("Root.Names", names)? {
                if let Ok(dests) = names.get(b"Dests") {
                    if let Some(dests) = self.require_dict("Root.Names.Dests", dests)? {
                        self.name_tree_node("Root.Names.Dests", &dests, b"Names", &mut HashSet::new())?;
                    }
                }
            }
        }
        if let Ok(dests) = catalog.get(b"Dests") {
            self.require_dict("Root.Dests", dests)?;
        }
        if let Ok(labels) = catalog.get(b"PageLabels") {
            if let Some(labels) = self.require_dict("Root.PageLabels", labels)? {
                self.name_tree_node("Root.PageLabels", &labels, b"Nums", &mut HashSet::new())?;
            }
        }
        if let Ok(outlines) = catalog.get(b"Outlines") {
            if let Some(outlines) = self.require_dict("Root.Outlines", outlines)? {
                if outlines.has(b"Type") && !outlines.has_type(b"Outlines") {
                    self.report(
                        "Root.Outlines.Type",
                        ValidationErrorKind::InvalidValue("must be /Outlines".into()),
                    )?;
                }
            }
        }
        if let Ok(acro_form) = catalog.get(b"AcroForm") {
            if let Some(acro_form) = self.require_dict("Root.AcroForm", acro_form)? {
                self.acro_form(&acro_form)?;
            }
        }
        if let Ok(oc_properties) = catalog.get(b"OCProperties") {
            if let Some(oc_properties) = self.require_dict("Root.OCProperties", oc_properties)? {
                self.optional_content(&oc_properties)?;
            }
        }
        if let Ok(threads) = catalog.get(b"Threads") {
            if let Some(threads) = self.require_array("Root.Threads", threads)? {
                for (index, thread) in threads.iter().enumerate() {
                    let path = format!("Root.Threads[{index}]");
                    if let Some(thread) = self.require_dict(&path, thread)? {
                        if !thread.has(b"F") {
                            self.report(&path, ValidationErrorKind::MissingEntry("F".into()))?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn info(&mut self, info: &Dictionary) -> Result<()> {
        for (key, value) in info.iter() {
            let is_string = self
                .document
                .dereference(value)
                .map(|(_, v)| matches!(v, Object::String(..) | Object::Name(_) | Object::Null))
                .unwrap_or(true);
            if !is_string {
                self.report(
                    &format!("Info.{}", String::from_utf8_lossy(key)),
                    ValidationErrorKind::WrongType { expected: "String" },
                )?;
            }
        }
        Ok(())
    }

    fn page_node(
        &mut self, path: &str, node: &Dictionary, counted: &mut i64, seen: &mut HashSet<ObjectId>,
        inherited: &Inherited,
    ) -> Result<()> {
        self.document.check_abort()?;
        if node.has_type(b"Pages") {
            if self.strict {
                for (key, _) in node.iter() {
                    if !PAGES_ENTRIES.contains(&key.as_slice()) {
                        self.report(
                            path,
                            ValidationErrorKind::InvalidEntry(String::from_utf8_lossy(key).into_owned()),
                        )?;
                    }
                }
            }
            let mut next = inherited.clone();
            next.absorb(node);
            let Ok(kids) = node.get(b"Kids") else {
                return self.report(path, ValidationErrorKind::MissingEntry("Kids".into()));
            };
            let Some(kids) = self.require_array(&format!("{path}.Kids"), kids)? else {
                return Ok(());
            };
            for (index, kid) in kids.iter().enumerate() {
                let kid_path = format!("{path}.Kids[{index}]");
                let Ok(kid_id) = kid.as_reference() else {
                    self.report(&kid_path, ValidationErrorKind::WrongType { expected: "Reference" })?;
                    continue;
                };
                if !seen.insert(kid_id) {
                    self.report(&kid_path, ValidationErrorKind::InvalidValue("page tree cycle".into()))?;
                    continue;
                }
                if let Some(kid_dict) = self.require_dict(&kid_path, kid)? {
                    self.page_node(&kid_path, &kid_dict, counted, seen, &next)?;
                }
            }
            return Ok(());
        }

        *counted += 1;
        self.page_leaf(path, node, inherited)
    }

    fn page_leaf(&mut self, path: &str, page: &Dictionary, inherited: &Inherited) -> Result<()> {
        if page.has(b"Type") && !page.has_type(b"Page") {
            self.report(
                &format!("{path}.Type"),
                ValidationErrorKind::InvalidValue("must be /Page".into()),
            )?;
        }

        let media_box = page.get(b"MediaBox").ok().cloned().or_else(|| inherited.media_box.clone());
        match media_box {
            None => self.report(path, ValidationErrorKind::MissingEntry("MediaBox".into()))?,
            Some(rect) => self.rectangle(&format!("{path}.MediaBox"), &rect)?,
        }
        if let Ok(crop_box) = page.get(b"CropBox") {
            self.rectangle(&format!("{path}.CropBox"), crop_box)?;
        }
        if let Ok(rotate) = page.get(b"Rotate") {
            match self.document.dereference_int(rotate) {
                Ok(value) if value % 90 == 0 => {}
                _ => self.report(
                    &format!("{path}.Rotate"),
                    ValidationErrorKind::InvalidValue("must be a multiple of 90".into()),
                )?,
            }
        }

        let resources = page.get(b"Resources").ok().cloned().or_else(|| inherited.resources.clone());
        if let Some(resources) = resources {
            if let Some(resources) = self.require_dict(&format!("{path}.Resources"), &resources)? {
                self.resources(&format!("{path}.Resources"), &resources)?;
            }
        }

        if let Ok(contents) = page.get(b"Contents") {
            self.contents(&format!("{path}.Contents"), contents)?;
        }
        if let Ok(annots) = page.get(b"Annots") {
            if let Some(annots) = self.require_array(&format!("{path}.Annots"), annots)? {
                for (index, annot) in annots.iter().enumerate() {
                    let annot_path = format!("{path}.Annots[{index}]");
                    if let Some(annot) = self.require_dict(&annot_path, annot)? {
                        self.annotation(&annot_path, &annot)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn rectangle(&mut self, path: &str, object: &Object) -> Result<()> {
        let Some(array) = self.require_array(path, object)? else {
            return Ok(());
        };
        let all_numbers = array
            .iter()
            .all(|n| self.document.dereference(n).map(|(_, v)| v.as_float().is_ok()).unwrap_or(false));
        if array.len() != 4 || !all_numbers {
            self.report(
                path,
                ValidationErrorKind::InvalidValue("a rectangle is four numbers".into()),
            )?;
        }
        Ok(())
    }

    fn contents(&mut self, path: &str, contents: &Object) -> Result<()> {
        let (_, resolved) = self.document.dereference(contents)?;
        match resolved {
            Object::Stream(stream) => {
                if !stream.is_decodable() {
                    self.flag_stream(path, "unsupported content stream filter".into());
                } else if let Err(err) = stream.decoded_content() {
                    self.flag_stream(path, err.to_string());
                }
            }
            Object::Array(parts) => {
                for (index, part) in parts.clone().iter().enumerate() {
                    self.contents(&format!("{path}[{index}]"), part)?;
                }
            }
            Object::Null => {}
            _ => {
                self.report(path, ValidationErrorKind::WrongType { expected: "Stream" })?;
            }
        }
        Ok(())
    }

    fn resources(&mut self, path: &str, resources: &Dictionary) -> Result<()> {
        if let Ok(fonts) = resources.get(b"Font") {
            if let Some(fonts) = self.require_dict(&format!("{path}.Font"), fonts)? {
                for (name, font) in fonts.iter() {
                    let font_path = format!("{path}.Font.{}", String::from_utf8_lossy(name));
                    if let Some(font) = self.require_dict(&font_path, font)? {
                        self.font(&font_path, &font)?;
                    }
                }
            }
        }
        if let Ok(xobjects) = resources.get(b"XObject") {
            if let Some(xobjects) = self.require_dict(&format!("{path}.XObject"), xobjects)? {
                for (name, xobject) in xobjects.iter() {
                    let xobject_path = format!("{path}.XObject.{}", String::from_utf8_lossy(name));
                    self.xobject(&xobject_path, xobject)?;
                }
            }
        }
        if let Ok(color_spaces) = resources.get(b"ColorSpace") {
            if let Some(color_spaces) = self.require_dict(&format!("{path}.ColorSpace"), color_spaces)? {
                for (name, space) in color_spaces.iter() {
                    let space_path = format!("{path}.ColorSpace.{}", String::from_utf8_lossy(name));
                    self.color_space(&space_path, space)?;
                }
            }
        }
        if let Ok(shadings) = resources.get(b"Shading") {
            if let Some(shadings) = self.require_dict(&format!("{path}.Shading"), shadings)? {
                for (name, shading) in shadings.iter() {
                    let shading_path = format!("{path}.Shading.{}", String::from_utf8_lossy(name));
                    if let Some(shading) = self.require_dict(&shading_path, shading)? {
                        self.shading(&shading_path, &shading)?;
                    }
                }
            }
        }
        if let Ok(patterns) = resources.get(b"Pattern") {
            if let Some(patterns) = self.require_dict(&format!("{path}.Pattern"), patterns)? {
                for (name, pattern) in patterns.iter() {
                    let pattern_path = format!("{path}.Pattern.{}", String::from_utf8_lossy(name));
                    if let Some(pattern) = self.require_dict(&pattern_path, pattern)? {
                        let pattern_type = pattern.get(b"PatternType").and_then(Object::as_i64);
                        if !matches!(pattern_type, Ok(1) | Ok(2)) {
                            self.report(
                                &pattern_path,
                                ValidationErrorKind::InvalidValue("PatternType must be 1 or 2".into()),
                            )?;
                        }
                    }
                }
            }
        }
        if let Ok(ext_g_states) = resources.get(b"ExtGState") {
            if let Some(ext_g_states) = self.require_dict(&format!("{path}.ExtGState"), ext_g_states)? {
                for (name, state) in ext_g_states.iter() {
                    let state_path = format!("{path}.ExtGState.{}", String::from_utf8_lossy(name));
                    self.require_dict(&state_path, state)?;
                }
            }
        }
        if let Ok(properties) = resources.get(b"Properties") {
            self.require_dict(&format!("{path}.Properties"), properties)?;
        }
        Ok(())
    }

    fn font(&mut self, path: &str, font: &Dictionary) -> Result<()> {
        if !font.has_type(b"Font") {
            self.report(
                &format!("{path}.Type"),
                ValidationErrorKind::InvalidValue("must be /Font".into()),
            )?;
        }
        let subtype = font.get(b"Subtype").and_then(Object::as_name);
        match subtype {
            Err(_) => self.report(path, ValidationErrorKind::MissingEntry("Subtype".into()))?,
            Ok(subtype) => {
                const KNOWN: &[&[u8]] = &[
                    b"Type0", b"Type1", b"MMType1", b"Type3", b"TrueType", b"CIDFontType0", b"CIDFontType2",
                ];
                if !KNOWN.contains(&subtype) {
                    self.report(
                        &format!("{path}.Subtype"),
                        ValidationErrorKind::InvalidValue(format!(
                            "unknown font subtype {}",
                            String::from_utf8_lossy(subtype)
                        )),
                    )?;
                }
                if subtype != b"Type3" && !font.has(b"BaseFont") {
                    self.report(path, ValidationErrorKind::MissingEntry("BaseFont".into()))?;
                }
            }
        }
        Ok(())
    }

    fn xobject(&mut self, path: &str, xobject: &Object) -> Result<()> {
        let (id, resolved) = self.document.dereference(xobject)?;
        let Object::Stream(stream) = resolved else {
            if resolved.is_null() && id.is_some() {
                return self.report(path, ValidationErrorKind::DanglingReference);
            }
            return self.report(path, ValidationErrorKind::WrongType { expected: "Stream" });
        };
        let dict = stream.dict.clone();
        match dict.get(b"Subtype").and_then(Object::as_name) {
            Ok(b"Image") => {
                for required in [&b"Width"[..], b"Height"] {
                    let present = dict
                        .get(required)
                        .map(|v| self.document.dereference_int(v).is_ok())
                        .unwrap_or(false);
                    if !present {
                        self.report(
                            path,
                            ValidationErrorKind::MissingEntry(String::from_utf8_lossy(required).into_owned()),
                        )?;
                    }
                }
                let is_mask = dict.get(b"ImageMask").and_then(Object::as_bool).unwrap_or(false);
                if !is_mask {
                    if let Ok(space) = dict.get(b"ColorSpace") {
                        self.color_space(&format!("{path}.ColorSpace"), space)?;
                    } else {
                        self.report(path, ValidationErrorKind::MissingEntry("ColorSpace".into()))?;
                    }
                }
            }
            Ok(b"Form") => {
                if let Ok(resources) = dict.get(b"Resources") {
                    if let Some(resources) = self.require_dict(&format!("{path}.Resources"), resources)? {
                        self.resources(&format!("{path}.Resources"), &resources)?;
                    }
                }
                if let Ok(bbox) = dict.get(b"BBox") {
                    self.rectangle(&format!("{path}.BBox"), bbox)?;
                } else {
                    self.report(path, ValidationErrorKind::MissingEntry("BBox".into()))?;
                }
            }
            Ok(b"PS") => {}
            Ok(other) => self.report(
                &format!("{path}.Subtype"),
                ValidationErrorKind::InvalidValue(format!(
                    "unknown xobject subtype {}",
                    String::from_utf8_lossy(other)
                )),
            )?,
            Err(_) => self.report(path, ValidationErrorKind::MissingEntry("Subtype".into()))?,
        }
        Ok(())
    }

    fn color_space(&mut self, path: &str, space: &Object) -> Result<()> {
        let (_, resolved) = self.document.dereference(space)?;
        match resolved {
            Object::Name(name) => {
                const DEVICE: &[&[u8]] = &[b"DeviceGray", b"DeviceRGB", b"DeviceCMYK", b"Pattern", b"G", b"RGB", b"CMYK", b"I", b"Indexed"];
                if !DEVICE.contains(&name.as_slice()) {
                    self.report(
                        path,
                        ValidationErrorKind::InvalidValue(format!(
                            "unknown color space {}",
                            String::from_utf8_lossy(name)
                        )),
                    )?;
                }
            }
            Object::Array(parts) => {
                let parts = parts.clone();
                let family = parts
                    .first()
                    .and_then(|f| self.document.dereference(f).ok().map(|(_, v)| v.clone()));
                let Some(Object::Name(family)) = family else {
                    return self.report(path, ValidationErrorKind::InvalidValue("color space family must be a name".into()));
                };
                match family.as_slice() {
                    b"ICCBased" => {
                        let stream_ok = parts.get(1).is_some_and(|s| {
                            self.document
                                .dereference(s)
                                .map(|(_, v)| matches!(v, Object::Stream(_)))
                                .unwrap_or(false)
                        });
                        if !stream_ok {
                            self.report(path, ValidationErrorKind::InvalidValue("ICCBased needs a profile stream".into()))?;
                        }
                    }
                    b"Indexed" | b"I" => {
                        if parts.len() != 4 {
                            self.report(path, ValidationErrorKind::InvalidValue("Indexed is [/Indexed base hival lookup]".into()))?;
                        } else {
                            self.color_space(&format!("{path}[1]"), &parts[1])?;
                        }
                    }
                    b"Separation" => {
                        if parts.len() < 3 {
                            self.report(path, ValidationErrorKind::InvalidValue("Separation is [/Separation name alternate tint]".into()))?;
                        } else {
                            self.color_space(&format!("{path}[2]"), &parts[2])?;
                        }
                    }
                    b"DeviceN" => {
                        if parts.len() < 4 {
                            self.report(path, ValidationErrorKind::InvalidValue("DeviceN is [/DeviceN names alternate tint]".into()))?;
                        } else {
                            self.color_space(&format!("{path}[2]"), &parts[2])?;
                        }
                    }
                    b"CalGray" | b"CalRGB" | b"Lab" => {
                        let has_white_point = parts.get(1).is_some_and(|d| {
                            self.document
                                .dereference_dict(d)
                                .map(|dict| dict.has(b"WhitePoint"))
                                .unwrap_or(false)
                        });
                        if !has_white_point {
                            self.report(path, ValidationErrorKind::MissingEntry("WhitePoint".into()))?;
                        }
                    }
                    b"Pattern" => {
                        if let Some(base) = parts.get(1) {
                            self.color_space(&format!("{path}[1]"), base)?;
                        }
                    }
                    other => self.report(
                        path,
                        ValidationErrorKind::InvalidValue(format!(
                            "unknown color space family {}",
                            String::from_utf8_lossy(other)
                        )),
                    )?,
                }
            }
            Object::Null => {}
            _ => self.report(path, ValidationErrorKind::WrongType { expected: "Name or Array" })?,
        }
        Ok(())
    }

    fn shading(&mut self, path: &str, shading: &Dictionary) -> Result<()> {
        let shading_type = shading.get(b"ShadingType").and_then(Object::as_i64);
        let Ok(shading_type) = shading_type else {
            return self.report(path, ValidationErrorKind::MissingEntry("ShadingType".into()));
        };
        if !(1..=7).contains(&shading_type) {
            return self.report(
                &format!("{path}.ShadingType"),
                ValidationErrorKind::InvalidValue("shading types are 1 through 7".into()),
            );
        }
        if let Ok(space) = shading.get(b"ColorSpace") {
            self.color_space(&format!("{path}.ColorSpace"), space)?;
        } else {
            self.report(path, ValidationErrorKind::MissingEntry("ColorSpace".into()))?;
        }
        let coords_len = match shading_type {
            2 => Some(4),
            3 => Some(6),
            _ => None,
        };
        if let Some(expected) = coords_len {
            let actual = shading
                .get(b"Coords")
                .ok()
                .and_then(|c| self.document.dereference_array(c).ok().map(Vec::len));
            if actual != Some(expected) {
                self.report(
                    &format!("{path}.Coords"),
                    ValidationErrorKind::InvalidValue(format!("shading type {shading_type} takes {expected} coordinates")),
                )?;
            }
        }
        if matches!(shading_type, 1..=3) && !shading.has(b"Function") {
            self.report(path, ValidationErrorKind::MissingEntry("Function".into()))?;
        }
        Ok(())
    }

    fn annotation(&mut self, path: &str, annot: &Dictionary) -> Result<()> {
        match annot.get(b"Subtype").and_then(Object::as_name) {
            Err(_) => self.report(path, ValidationErrorKind::MissingEntry("Subtype".into()))?,
            Ok(subtype) => {
                match annot.get(b"Rect") {
                    Ok(rect) => self.rectangle(&format!("{path}.Rect"), rect)?,
                    Err(_) => self.report(path, ValidationErrorKind::MissingEntry("Rect".into()))?,
                }
                if subtype == b"Link" && !annot.has(b"Dest") && !annot.has(b"A") {
                    self.report(
                        path,
                        ValidationErrorKind::InvalidValue("link annotation without Dest or A".into()),
                    )?;
                }
            }
        }
        Ok(())
    }

    fn acro_form(&mut self, form: &Dictionary) -> Result<()> {
        let Ok(fields) = form.get(b"Fields") else {
            return self.report("Root.AcroForm", ValidationErrorKind::MissingEntry("Fields".into()));
        };
        let Some(fields) = self.require_array("Root.AcroForm.Fields", fields)? else {
            return Ok(());
        };
        for (index, field) in fields.iter().enumerate() {
            let path = format!("Root.AcroForm.Fields[{index}]");
            if let Some(field) = self.require_dict(&path, field)? {
                self.form_field(&path, &field, None, &mut HashSet::new())?;
            }
        }
        Ok(())
    }

    fn form_field(
        &mut self, path: &str, field: &Dictionary, inherited_type: Option<Vec<u8>>,
        seen: &mut HashSet<ObjectId>,
    ) -> Result<()> {
        let field_type = field
            .get(b"FT")
            .and_then(Object::as_name)
            .ok()
            .map(<[u8]>::to_vec)
            .or(inherited_type);
        let is_widget = field
            .get(b"Subtype")
            .and_then(Object::as_name)
            .map(|s| s == b"Annot" || s == b"Widget")
            .unwrap_or(false);

        match &field_type {
            Some(ft) => {
                const KINDS: &[&[u8]] = &[b"Btn", b"Tx", b"Ch", b"Sig"];
                if !KINDS.contains(&ft.as_slice()) {
                    self.report(
                        &format!("{path}.FT"),
                        ValidationErrorKind::InvalidValue(format!(
                            "unknown field type {}",
                            String::from_utf8_lossy(ft)
                        )),
                    )?;
                }
            }
            // A terminal field fused with its widget annotation may pick
            // FT up from an ancestor; anything else must carry one.
            None if !field.has(b"Kids") && !is_widget => {
                self.report(path, ValidationErrorKind::MissingEntry("FT".into()))?;
            }
            None => {}
        }

        if let Ok(kids) = field.get(b"Kids") {
            if let Some(kids) = self.require_array(&format!("{path}.Kids"), kids)? {
                for (index, kid) in kids.iter().enumerate() {
                    let kid_path = format!("{path}.Kids[{index}]");
                    if let Ok(kid_id) = kid.as_reference() {
                        if !seen.insert(kid_id) {
                            self.report(&kid_path, ValidationErrorKind::InvalidValue("field tree cycle".into()))?;
                            continue;
                        }
                    }
                    if let Some(kid) = self.require_dict(&kid_path, kid)? {
                        self.form_field(&kid_path, &kid, field_type.clone(), seen)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn optional_content(&mut self, properties: &Dictionary) -> Result<()> {
        match properties.get(b"OCGs") {
            Err(_) => self.report("Root.OCProperties", ValidationErrorKind::MissingEntry("OCGs".into()))?,
            Ok(ocgs) => {
                if let Some(ocgs) = self.require_array("Root.OCProperties.OCGs", ocgs)? {
                    for (index, ocg) in ocgs.iter().enumerate() {
                        let path = format!("Root.OCProperties.OCGs[{index}]");
                        if let Some(ocg) = self.require_dict(&path, ocg)? {
                            if !ocg.has(b"Name") {
                                self.report(&path, ValidationErrorKind::MissingEntry("Name".into()))?;
                            }
                        }
                    }
                }
            }
        }
        if !properties.has(b"D") {
            self.report("Root.OCProperties", ValidationErrorKind::MissingEntry("D".into()))?;
        }
        Ok(())
    }

    /// Structural check of a name or number tree node.
    fn name_tree_node(
        &mut self, path: &str, node: &Dictionary, pairs_entry: &[u8], seen: &mut HashSet<ObjectId>,
    ) -> Result<()> {
        if let Ok(kids) = node.get(b"Kids") {
            let Some(kids) = self.require_array(&format!("{path}.Kids"), kids)? else {
                return Ok(());
            };
            if kids.is_empty() {
                self.report(&format!("{path}.Kids"), ValidationErrorKind::InvalidValue("empty interior node".into()))?;
            }
            for (index, kid) in kids.iter().enumerate() {
                let kid_path = format!("{path}.Kids[{index}]");
                if let Ok(kid_id) = kid.as_reference() {
                    if !seen.insert(kid_id) {
                        self.report(&kid_path, ValidationErrorKind::InvalidValue("tree cycle".into()))?;
                        continue;
                    }
                }
                if let Some(kid) = self.require_dict(&kid_path, kid)? {
                    if !kid.has(b"Limits") {
                        self.report(&kid_path, ValidationErrorKind::MissingEntry("Limits".into()))?;
                    }
                    self.name_tree_node(&kid_path, &kid, pairs_entry, seen)?;
                }
            }
            return Ok(());
        }
        match node.get(pairs_entry) {
            Err(_) => self.report(
                path,
                ValidationErrorKind::MissingEntry(String::from_utf8_lossy(pairs_entry).into_owned()),
            )?,
            Ok(pairs) => {
                if let Some(pairs) = self.require_array(&format!("{path}.{}", String::from_utf8_lossy(pairs_entry)), pairs)? {
                    if pairs.len() % 2 != 0 {
                        self.report(
                            path,
                            ValidationErrorKind::InvalidValue("odd number of key/value entries".into()),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn valid_document() -> Document {
        let mut doc = Document::new();
        doc.max_id = 1;
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => Object::Reference((1, 0)),
        });
        doc.objects.insert(
            (1, 0),
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference((1, 0)),
        });
        doc.trailer.set("Size", 4);
        doc.trailer.set("Root", Object::Reference(catalog));
        doc
    }

    #[test]
    fn valid_document_passes_strict() {
        let doc = valid_document();
        doc.validate(ValidationMode::Strict).unwrap();
        assert!(doc.validate_report().is_empty());
    }

    #[test]
    fn missing_root_fails() {
        let mut doc = valid_document();
        doc.trailer.remove(b"Root");
        let err = doc.validate(ValidationMode::Strict).unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError { kind: ValidationErrorKind::MissingEntry(_), .. })));
        doc.validate(ValidationMode::Relaxed).unwrap();
        doc.validate(ValidationMode::None).unwrap();
    }

    #[test]
    fn page_count_mismatch_is_detected_with_path() {
        let mut doc = valid_document();
        if let Object::Dictionary(pages) = doc.objects.get_mut(&(1, 0)).unwrap() {
            pages.set("Count", 5);
        }
        let err = doc.validate(ValidationMode::Strict).unwrap_err();
        match err {
            Error::Validation(finding) => {
                assert_eq!(finding.path, "Root.Pages.Count");
                assert_eq!(
                    finding.kind,
                    ValidationErrorKind::PageCountMismatch { declared: 5, counted: 1 }
                );
            }
            other => panic!("unexpected error {other:?}"),
        }
        let findings = doc.validate_report();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn dangling_page_reference_reports_relaxed_and_fails_strict() {
        let mut doc = valid_document();
        if let Object::Dictionary(pages) = doc.objects.get_mut(&(1, 0)).unwrap() {
            pages.set("Kids", vec![Object::Reference((40, 0))]);
        }
        assert!(doc.validate(ValidationMode::Strict).is_err());
        let findings = doc.validate_report();
        assert!(
            findings
                .iter()
                .any(|f| f.kind == ValidationErrorKind::DanglingReference)
        );
    }

    #[test]
    fn bad_rotate_and_unknown_font_subtype() {
        let mut doc = valid_document();
        let font = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type9",
            "BaseFont" => "Mystery",
        });
        let page_id = doc
            .get_pages()
            .values()
            .next()
            .copied()
            .unwrap();
        if let Object::Dictionary(page) = doc.objects.get_mut(&page_id).unwrap() {
            page.set("Rotate", 45);
            page.set(
                "Resources",
                dictionary! { "Font" => dictionary! { "F1" => Object::Reference(font) } },
            );
        }
        let findings = doc.validate_report();
        assert!(findings.iter().any(|f| f.path.ends_with(".Rotate")));
        assert!(findings.iter().any(|f| f.path.ends_with(".Subtype")));
    }

    #[test]
    fn corrupt_content_stream_is_flagged_not_fatal() {
        let mut doc = valid_document();
        let bad = doc.add_object(Object::Stream(
            crate::Stream::new(
                dictionary! { "Filter" => "FlateDecode" },
                b"definitely not zlib".to_vec(),
            ),
        ));
        let page_id = doc.get_pages().values().next().copied().unwrap();
        if let Object::Dictionary(page) = doc.objects.get_mut(&page_id).unwrap() {
            page.set("Contents", Object::Reference(bad));
        }
        // Flagged in both modes, fatal in neither.
        doc.validate(ValidationMode::Strict).unwrap();
        let findings = doc.validate_report();
        assert!(
            findings
                .iter()
                .any(|f| matches!(f.kind, ValidationErrorKind::CorruptStream(_)))
        );
    }

    #[test]
    fn strict_rejects_unknown_pages_entries() {
        let mut doc = valid_document();
        if let Object::Dictionary(pages) = doc.objects.get_mut(&(1, 0)).unwrap() {
            pages.set("Unexpected", 1);
        }
        assert!(doc.validate(ValidationMode::Strict).is_err());
        // Relaxed tolerates the stray entry silently.
        doc.validate(ValidationMode::Relaxed).unwrap();
    }
}
