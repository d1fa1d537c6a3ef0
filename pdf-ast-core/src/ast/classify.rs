//! Node classification
//!
//! An object is classified by the first rule that yields a type:
//!
//! 1. its `/Type` entry, refined by `/Subtype` (and `/S` for actions);
//! 2. structural markers that identify the object without `/Type`
//!    (`/ShadingType`, `/PatternType`, `/JS`, an action `/S`, image and font
//!    subtypes, a signature `/ByteRange`, form-field and encryption keys);
//! 3. the dictionary key through which it was reached, together with the
//!    key one level up and the type of the enclosing node;
//! 4. otherwise [`NodeType::Other`].
//!
//! A recognised `/Type` is final even when it maps to `Other` (for example
//! `/FontDescriptor`), so context never overrides an explicit type.

use super::node::NodeType;
use crate::parser::objects::{PdfDictionary, PdfObject};

/// How an object was reached during traversal
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachContext<'k> {
    /// Key whose value holds the object (array elements inherit the key)
    pub key: Option<&'k str>,
    /// Key one level further up, e.g. `Font` for `/Font << /F1 5 0 R >>`
    pub parent_key: Option<&'k str>,
    /// Type of the nearest enclosing node
    pub parent_type: Option<NodeType>,
}

impl<'k> ReachContext<'k> {
    pub fn root() -> Self {
        Self::default()
    }
}

const ACTION_TYPES: &[&str] = &[
    "GoTo", "GoToR", "GoToE", "GoToDp", "Launch", "Thread", "URI", "Hide", "Named", "SubmitForm",
    "ResetForm", "ImportData", "SetOCGState", "Trans", "GoTo3DView",
];

const MULTIMEDIA_ACTIONS: &[&str] = &["Sound", "Movie", "Rendition", "RichMediaExecute"];

const ANNOTATION_SUBTYPES: &[&str] = &[
    "Text", "Link", "FreeText", "Line", "Square", "Circle", "Polygon", "PolyLine", "Highlight",
    "Underline", "Squiggly", "StrikeOut", "Caret", "Stamp", "Ink", "Popup", "FileAttachment",
    "Widget", "PrinterMark", "TrapNet", "Watermark", "Redact", "Projection",
];

const MULTIMEDIA_ANNOTATIONS: &[&str] = &["Sound", "Movie", "Screen", "3D", "RichMedia"];

/// Classify `object` reached through `ctx`
pub fn classify(object: &PdfObject, ctx: &ReachContext<'_>) -> NodeType {
    if let Some(dict) = object.as_dict() {
        if let Some(t) = by_type(dict) {
            return t;
        }
        if let Some(t) = by_markers(dict) {
            return t;
        }
    }
    by_context(object, ctx).unwrap_or(NodeType::Other)
}

fn by_type(dict: &PdfDictionary) -> Option<NodeType> {
    let subtype = dict.get_subtype();
    let t = match dict.get_type()? {
        "Catalog" => NodeType::Catalog,
        "Pages" => NodeType::Pages,
        "Page" => NodeType::Page,
        "Font" => font_type(subtype),
        "XObject" => match subtype {
            Some("Image") => NodeType::Image,
            _ => NodeType::XObject,
        },
        "Annot" => match subtype {
            Some(s) if MULTIMEDIA_ANNOTATIONS.contains(&s) => NodeType::Multimedia,
            _ => NodeType::Annotation,
        },
        "Outlines" => NodeType::Outline,
        "Action" => action_type(dict.get_name("S")).unwrap_or(NodeType::Action),
        "Metadata" => NodeType::Metadata,
        "Sig" | "DocTimeStamp" => NodeType::Signature,
        "StructTreeRoot" | "StructElem" | "MCR" | "OBJR" => NodeType::Structure,
        "EmbeddedFile" => NodeType::EmbeddedFile,
        "Filespec" | "F" if dict.contains_key("EF") => NodeType::EmbeddedFile,
        "Pattern" => NodeType::Pattern,
        "Rendition" | "MediaClip" | "RichMediaContent" | "RichMediaSettings" => NodeType::Multimedia,
        "FontDescriptor" | "Encoding" | "ExtGState" | "XRef" | "ObjStm" | "Group" | "OCG"
        | "OCMD" | "Mask" | "Filespec" | "F" | "CMap" | "OutputIntent" => NodeType::Other,
        _ => return None,
    };
    Some(t)
}

fn font_type(subtype: Option<&str>) -> NodeType {
    match subtype {
        Some("Type1") | Some("MMType1") => NodeType::Type1Font,
        Some("TrueType") => NodeType::TrueTypeFont,
        Some("Type3") => NodeType::Type3Font,
        _ => NodeType::Font,
    }
}

fn action_type(s: Option<&str>) -> Option<NodeType> {
    match s? {
        "JavaScript" => Some(NodeType::JavaScript),
        s if MULTIMEDIA_ACTIONS.contains(&s) => Some(NodeType::Multimedia),
        s if ACTION_TYPES.contains(&s) => Some(NodeType::Action),
        _ => None,
    }
}

fn by_markers(dict: &PdfDictionary) -> Option<NodeType> {
    if let Some(t) = action_type(dict.get_name("S")) {
        return Some(t);
    }
    if dict.contains_key("JS") {
        return Some(NodeType::JavaScript);
    }
    if dict.contains_key("ShadingType") {
        return Some(NodeType::Shading);
    }
    if dict.contains_key("PatternType") {
        return Some(NodeType::Pattern);
    }
    match dict.get_subtype() {
        Some("Image") => return Some(NodeType::Image),
        Some("Form") if dict.contains_key("BBox") => return Some(NodeType::XObject),
        Some(s @ ("Type0" | "Type1" | "MMType1" | "TrueType" | "Type3"))
            if dict.contains_key("BaseFont") || dict.contains_key("FontDescriptor") || s == "Type3" =>
        {
            return Some(font_type(Some(s)))
        }
        Some(s) if dict.contains_key("Rect") && MULTIMEDIA_ANNOTATIONS.contains(&s) => {
            return Some(NodeType::Multimedia)
        }
        Some(s) if dict.contains_key("Rect") && ANNOTATION_SUBTYPES.contains(&s) => {
            return Some(NodeType::Annotation)
        }
        _ => {}
    }
    if dict.contains_key("ByteRange") && dict.contains_key("Contents") {
        return Some(NodeType::Signature);
    }
    if dict.contains_key("Fields") || dict.contains_key("FT") {
        return Some(NodeType::Form);
    }
    if dict.get_name("Filter") == Some("Standard") && dict.contains_key("O") && dict.contains_key("U") {
        return Some(NodeType::Encryption);
    }
    if dict.contains_key("EF") {
        return Some(NodeType::EmbeddedFile);
    }
    None
}

fn by_context(object: &PdfObject, ctx: &ReachContext<'_>) -> Option<NodeType> {
    let is_stream = object.as_stream().is_some();
    let is_dict = object.as_dict().is_some();

    match (ctx.parent_key, ctx.parent_type) {
        (Some("Font"), _) if is_dict => return Some(NodeType::Font),
        (Some("XObject"), _) if is_stream => return Some(NodeType::XObject),
        (Some("ColorSpace"), _) => return Some(NodeType::ColorSpace),
        (Some("Pattern"), _) if is_dict => return Some(NodeType::Pattern),
        (Some("Shading"), _) if is_dict => return Some(NodeType::Shading),
        (Some("AA"), _) if is_dict => return Some(NodeType::Action),
        (Some("EF"), _) if is_stream => return Some(NodeType::EmbeddedFile),
        _ => {}
    }

    let t = match (ctx.key?, ctx.parent_type) {
        ("Contents", Some(NodeType::Page)) if is_stream => NodeType::ContentStream,
        ("ColorSpace", _) if !is_dict || is_stream => NodeType::ColorSpace,
        ("Shading", _) if is_dict => NodeType::Shading,
        ("Outlines", _) => NodeType::Outline,
        ("First" | "Next", Some(NodeType::Outline)) if is_dict => NodeType::Outline,
        ("AcroForm", _) => NodeType::Form,
        ("Fields" | "Kids", Some(NodeType::Form)) if is_dict => NodeType::Form,
        ("V", Some(NodeType::Form)) if is_dict => NodeType::Signature,
        ("Info", _) => NodeType::Metadata,
        ("Metadata", _) if is_stream => NodeType::Metadata,
        ("Encrypt", _) => NodeType::Encryption,
        ("OpenAction" | "A" | "Next", _) if is_dict => NodeType::Action,
        ("JS", _) => NodeType::JavaScript,
        ("StructTreeRoot", _) => NodeType::Structure,
        ("K", Some(NodeType::Structure)) if is_dict => NodeType::Structure,
        ("Annots", _) if is_dict => NodeType::Annotation,
        ("RichMediaContent" | "RichMediaSettings", _) => NodeType::Multimedia,
        ("Kids", Some(NodeType::Pages)) if is_dict => match object.as_dict() {
            Some(d) if d.contains_key("Kids") => NodeType::Pages,
            _ => NodeType::Page,
        },
        _ => return None,
    };
    Some(t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ObjectParser;

    fn parse(text: &str) -> PdfObject {
        ObjectParser::new(text.as_bytes()).parse_object().unwrap()
    }

    fn ctx<'k>(key: &'k str, parent_key: Option<&'k str>, parent_type: Option<NodeType>) -> ReachContext<'k> {
        ReachContext {
            key: Some(key),
            parent_key,
            parent_type,
        }
    }

    #[test]
    fn test_explicit_types() {
        let root = ReachContext::root();
        assert_eq!(classify(&parse("<< /Type /Catalog >>"), &root), NodeType::Catalog);
        assert_eq!(classify(&parse("<< /Type /Font /Subtype /TrueType >>"), &root), NodeType::TrueTypeFont);
        assert_eq!(classify(&parse("<< /Type /Font /Subtype /Type0 >>"), &root), NodeType::Font);
        assert_eq!(classify(&parse("<< /Type /XObject /Subtype /Image >>"), &root), NodeType::Image);
        assert_eq!(classify(&parse("<< /Type /Annot /Subtype /Screen >>"), &root), NodeType::Multimedia);
        assert_eq!(
            classify(&parse("<< /Type /Action /S /JavaScript /JS (x) >>"), &root),
            NodeType::JavaScript
        );
    }

    #[test]
    fn test_explicit_type_beats_context() {
        let c = ctx("F1", Some("Font"), Some(NodeType::Page));
        assert_eq!(classify(&parse("<< /Type /FontDescriptor >>"), &c), NodeType::Other);
        assert_eq!(classify(&parse("<< /BaseFont /Helvetica >>"), &c), NodeType::Font);
    }

    #[test]
    fn test_structural_markers() {
        let root = ReachContext::root();
        assert_eq!(classify(&parse("<< /S /URI /URI (http://x) >>"), &root), NodeType::Action);
        assert_eq!(classify(&parse("<< /S /Rendition >>"), &root), NodeType::Multimedia);
        assert_eq!(classify(&parse("<< /ShadingType 2 >>"), &root), NodeType::Shading);
        assert_eq!(classify(&parse("<< /PatternType 1 >>"), &root), NodeType::Pattern);
        assert_eq!(classify(&parse("<< /Subtype /Link /Rect [0 0 1 1] >>"), &root), NodeType::Annotation);
        assert_eq!(classify(&parse("<< /Fields [] >>"), &root), NodeType::Form);
        assert_eq!(
            classify(&parse("<< /Filter /Standard /O (a) /U (b) /V 1 /R 2 >>"), &root),
            NodeType::Encryption
        );
        // Structure element /S values are not actions
        assert_eq!(classify(&parse("<< /S /P >>"), &root), NodeType::Other);
    }

    #[test]
    fn test_context_rules() {
        let stream = parse("<< /Length 0 >>");
        assert_eq!(
            classify(&stream, &ctx("Info", None, Some(NodeType::Catalog))),
            NodeType::Metadata
        );
        assert_eq!(
            classify(&parse("[/ICCBased 5 0 R]"), &ctx("CS0", Some("ColorSpace"), None)),
            NodeType::ColorSpace
        );
        assert_eq!(
            classify(&parse("<< /Title (x) >>"), &ctx("First", None, Some(NodeType::Outline))),
            NodeType::Outline
        );
        assert_eq!(
            classify(&parse("<< /Kids [] >>"), &ctx("Kids", None, Some(NodeType::Pages))),
            NodeType::Pages
        );
        assert_eq!(classify(&parse("<< /Foo 1 >>"), &ctx("Bar", None, None)), NodeType::Other);
        assert_eq!(classify(&PdfObject::Integer(3), &ReachContext::root()), NodeType::Other);
    }

    #[test]
    fn test_signature_dictionaries() {
        let root = ReachContext::root();
        assert_eq!(
            classify(&parse("<< /Type /Sig /Filter /Adobe.PPKLite >>"), &root),
            NodeType::Signature
        );
        assert_eq!(classify(&parse("<< /Type /DocTimeStamp >>"), &root), NodeType::Signature);
        assert_eq!(
            classify(&parse("<< /ByteRange [0 10 20 5] /Contents <00> >>"), &root),
            NodeType::Signature
        );
        // The field holding a signature is still a form field
        assert_eq!(classify(&parse("<< /FT /Sig /T (sig1) >>"), &root), NodeType::Form);
        assert_eq!(
            classify(&parse("<< /Filter /Adobe.PPKLite >>"), &ctx("V", None, Some(NodeType::Form))),
            NodeType::Signature
        );
        assert_eq!(
            classify(&parse("(text value)"), &ctx("V", None, Some(NodeType::Form))),
            NodeType::Other
        );
    }
}
