//! End-to-end parsing: document tree shape, recovery and decryption

mod common;

use common::Rc4Fixture;
use pdf_ast::parser::reader::EncryptionState;
use pdf_ast::parser::test_helpers::{hybrid_single_page, linearized_single_page, offset_of, signed_form, PdfFixture};
use pdf_ast::parser::ObjectId;
use pdf_ast::{parse_document, parse_document_with_options, parse_file, NodeType, ParseError, ParseOptions, PdfAstError};
use pretty_assertions::assert_eq;
use std::io::Write;

fn has_code(doc: &pdf_ast::Document, code: &str) -> bool {
    doc.diagnostics().iter().any(|d| d.code == code)
}

#[test]
fn test_root_is_catalog() {
    let doc = parse_document(&PdfFixture::single_page().build()).unwrap();
    assert_eq!(doc.root().node_type, NodeType::Catalog);
    assert_eq!(doc.root().object_id(), Some(ObjectId::new(1, 0)));
    assert!(doc.diagnostics().is_empty(), "{:?}", doc.diagnostics());
}

#[test]
fn test_node_lookup_round_trips() {
    let doc = parse_document(&PdfFixture::single_page().build()).unwrap();
    for node in doc.all_nodes() {
        assert_eq!(doc.node(node.id), Some(node));
    }
}

#[test]
fn test_children_and_parents_agree() {
    let doc = parse_document(&PdfFixture::single_page().build()).unwrap();
    for node in doc.all_nodes() {
        for child in doc.children(node.id) {
            assert!(doc.parent_ids(child.id).contains(&node.id));
        }
        for parent in doc.parents(node.id) {
            assert!(doc.child_ids(parent.id).contains(&node.id));
        }
    }
    let pages = doc.nodes_by_type(NodeType::Pages);
    assert_eq!(doc.children(pages[0].id).len(), 1);
}

#[test]
fn test_byte_ranges_reslice_to_their_objects() {
    let pdf = PdfFixture::single_page().build();
    let doc = parse_document(&pdf).unwrap();
    for node in doc.all_nodes() {
        let meta = node.metadata.unwrap();
        let slice = &pdf[meta.byte_range()];
        let text = String::from_utf8_lossy(slice);
        let id = meta.object_id.unwrap();
        assert!(text.starts_with(&format!("{} {} obj", id.number, id.generation)));
        assert!(text.ends_with("endobj"));
        if node.node_type == NodeType::Font {
            assert!(text.contains("/BaseFont /Helvetica"));
        }
    }
}

#[test]
fn test_latest_incremental_update_wins() {
    let pdf = PdfFixture::single_page()
        .update(vec![(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Times-Roman >>".to_string())])
        .update(vec![(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>".to_string())])
        .build();

    let doc = parse_document(&pdf).unwrap();
    let fonts = doc.fonts();
    assert_eq!(fonts.len(), 1);
    assert_eq!(fonts[0].property_name("BaseFont"), Some("Courier"));
}

#[test]
fn test_prev_cycle_terminates_via_rebuild() {
    common::init_tracing();
    let pdf = PdfFixture::single_page().with_prev_cycle().build();

    let doc = parse_document(&pdf).unwrap();
    assert!(has_code(&doc, "XREF_REBUILT"));
    assert!(doc.statistics().xref_rebuilt);
    assert_eq!(doc.root().node_type, NodeType::Catalog);
    assert_eq!(doc.nodes_by_type(NodeType::Page).len(), 1);
}

#[test]
fn test_missing_xref_is_rebuilt() {
    let pdf = PdfFixture::single_page().without_xref().build();
    let doc = parse_document(&pdf).unwrap();
    assert!(has_code(&doc, "XREF_REBUILT"));
    assert_eq!(doc.root().node_type, NodeType::Catalog);
    assert_eq!(doc.fonts().len(), 1);
}

#[test]
fn test_strict_mode_rejects_missing_xref() {
    let pdf = PdfFixture::single_page().without_xref().build();
    let err = parse_document_with_options(&pdf, &ParseOptions::strict()).unwrap_err();
    assert!(matches!(err.as_parse_error(), Some(ParseError::InvalidXRef { .. })));
}

#[test]
fn test_self_referential_kids_are_bounded() {
    let pdf = PdfFixture::single_page()
        .object(2, "<< /Type /Pages /Kids [2 0 R 3 0 R] /Count 1 >>")
        .build();
    let doc = parse_document(&pdf).unwrap();
    assert!(has_code(&doc, "CYCLIC_REFERENCE"));
    assert!(doc.statistics().total_nodes <= 5);
    assert_eq!(doc.nodes_by_type(NodeType::Page).len(), 1);
}

#[test]
fn test_deep_chain_is_truncated() {
    // 1 -> 2 -> ... -> 40 through /Next links
    let mut pdf = PdfFixture::empty().object(1, "<< /Type /Catalog /Outlines 2 0 R >>");
    for n in 2..40 {
        pdf = pdf.object(n, format!("<< /Title (item {n}) /Next {} 0 R >>", n + 1));
    }
    pdf = pdf.object(40, "<< /Title (last) >>");

    let options = ParseOptions::default().with_max_depth(8);
    let doc = parse_document_with_options(&pdf.build(), &options).unwrap();
    assert!(has_code(&doc, "TRAVERSAL_DEPTH_EXCEEDED"));
    assert!(doc.max_depth() <= 8);
}

#[test]
fn test_unresolved_reference_is_a_warning() {
    let pdf = PdfFixture::single_page()
        .object(1, "<< /Type /Catalog /Pages 2 0 R /Outlines 99 0 R >>")
        .build();
    let doc = parse_document(&pdf).unwrap();
    assert!(has_code(&doc, "REFERENCE_UNRESOLVED"));
    assert_eq!(doc.nodes_by_type(NodeType::Outline).len(), 0);
}

#[test]
fn test_missing_header_is_tolerated() {
    let pdf = PdfFixture::single_page().without_header().build();
    let doc = parse_document(&pdf).unwrap();
    assert!(has_code(&doc, "HEADER_MISSING"));
    assert_eq!(doc.version().to_string(), "1.4");
}

#[cfg(feature = "compression")]
#[test]
fn test_xref_stream_with_png_predictor() {
    let pdf = common::xref_stream_pdf();
    let doc = parse_document(&pdf).unwrap();
    assert!(!has_code(&doc, "XREF_REBUILT"), "{:?}", doc.diagnostics());

    let page = doc.node_for_object(ObjectId::new(4, 0)).expect("page resolved from object stream");
    assert_eq!(page.node_type, NodeType::Page);
    assert_eq!(page.property("source"), Some("object stream 3, index 0"));

    let font = doc.node_for_object(ObjectId::new(5, 0)).expect("font resolved from object stream");
    assert_eq!(font.property_name("BaseFont"), Some("Courier"));
    assert_eq!(doc.version().to_string(), "1.5");
}

#[test]
fn test_hybrid_file_prefers_xref_stream_entries() {
    let doc = parse_document(&hybrid_single_page()).unwrap();
    assert!(!has_code(&doc, "XREF_REBUILT"), "{:?}", doc.diagnostics());
    let fonts = doc.fonts();
    assert_eq!(fonts.len(), 1);
    assert_eq!(fonts[0].property_name("BaseFont"), Some("Courier"));
}

#[test]
fn test_sibling_cross_references_stay_acyclic() {
    let pdf = PdfFixture::minimal()
        .object(1, "<< /Type /Catalog /Pages 2 0 R /Names 4 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 /X 4 0 R >>")
        .object(4, "<< /Y 2 0 R >>")
        .build();
    let doc = parse_document(&pdf).unwrap();
    assert!(has_code(&doc, "CYCLIC_REFERENCE"));

    // Depth-first walk with an explicit path: no node may be its own descendant
    fn walk(doc: &pdf_ast::Document, id: pdf_ast::NodeId, path: &mut Vec<pdf_ast::NodeId>) {
        assert!(!path.contains(&id), "cycle through {id:?}");
        path.push(id);
        for &child in doc.child_ids(id) {
            walk(doc, child, path);
        }
        path.pop();
    }
    walk(&doc, doc.root_id(), &mut Vec::new());
}

#[cfg(feature = "compression")]
#[test]
fn test_oversized_predictor_is_a_decode_error() {
    for columns in ["9223372036854775807", "4398046511104"] {
        let content = common::deflate(b"BT /F1 12 Tf (predicted) Tj ET");
        let pdf = PdfFixture::single_page()
            .stream_object(
                4,
                &format!("/Filter /FlateDecode /DecodeParms << /Predictor 12 /Columns {columns} >>"),
                &content,
            )
            .build();
        let doc = parse_document(&pdf).unwrap();
        let stream = &doc.nodes_by_type(NodeType::ContentStream)[0];
        assert!(stream.has_property("decodeError"));
        assert!(!stream.has_property("decodedLength"));
        assert_eq!(doc.nodes_by_type(NodeType::Page).len(), 1);
    }
}

#[test]
fn test_page_with_stale_xref_offset_is_kept() {
    let pdf = PdfFixture::single_page().build();
    // Swap the offset of the page for the offset of the font
    let page_entry = format!("{:010} 00000 n", offset_of(&pdf, "\n3 0 obj") + 1);
    let font_entry = format!("{:010} 00000 n", offset_of(&pdf, "\n5 0 obj") + 1);
    let at = offset_of(&pdf, &page_entry);
    let mut pdf = pdf;
    pdf[at..at + font_entry.len()].copy_from_slice(font_entry.as_bytes());

    let doc = parse_document(&pdf).unwrap();
    assert!(!has_code(&doc, "REFERENCE_UNRESOLVED"), "{:?}", doc.diagnostics());
    assert!(has_code(&doc, "OBJECT_OFFSET_RECOVERED"));
    assert_eq!(doc.nodes_by_type(NodeType::Page).len(), 1);
    assert_eq!(doc.fonts().len(), 1);
}

#[test]
fn test_rc4_encrypted_strings_are_decrypted() {
    common::init_tracing();
    let fixture = Rc4Fixture::new();
    let doc = parse_document(&fixture.document("Quarterly Numbers")).unwrap();

    match doc.encryption() {
        EncryptionState::Unlocked { revision, .. } => assert_eq!(*revision, 2),
        other => panic!("document not unlocked: {other:?}"),
    }
    let info = doc.nodes_by_type(NodeType::Metadata);
    assert_eq!(info.len(), 1);
    assert_eq!(info[0].property_text("Title").as_deref(), Some("Quarterly Numbers"));

    let encryption = doc.nodes_by_type(NodeType::Encryption);
    assert_eq!(encryption.len(), 1);
    assert!(encryption[0].has_property("permissions"));
    assert!(doc.statistics().encrypted);
}

#[test]
fn test_parse_file_reads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&PdfFixture::single_page().build()).unwrap();
    file.flush().unwrap();

    let doc = parse_file(file.path()).unwrap();
    assert_eq!(doc.nodes_by_type(NodeType::Page).len(), 1);
}

#[test]
fn test_fatal_inputs() {
    assert!(matches!(
        parse_document(b"   \n\t "),
        Err(PdfAstError::Parse(ParseError::EmptyFile))
    ));
    assert!(matches!(
        parse_document(b"%PDF-1.7\nnothing to see here\n%%EOF"),
        Err(PdfAstError::Parse(ParseError::NoObjects))
    ));
}

#[test]
fn test_document_is_shareable_across_threads() {
    let doc = parse_document(&PdfFixture::single_page().build()).unwrap();
    let counts: Vec<usize> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| doc.all_nodes().len()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(counts.iter().all(|&c| c == doc.statistics().total_nodes));
}

#[test]
fn test_linearized_file_statistics() {
    let doc = parse_document(&linearized_single_page(true)).unwrap();
    assert!(doc.statistics().linearized);
    assert!(!has_code(&doc, "LINEARIZATION_INVALID"));
    let info = doc.linearization().unwrap();
    assert_eq!(info.object_id, ObjectId::new(1, 0));
    assert_eq!(info.first_page_object, 3);

    // The parameter dictionary is not part of the catalog's tree
    assert!(doc.node_for_object(ObjectId::new(1, 0)).is_none());
    assert_eq!(doc.root().object_id(), Some(ObjectId::new(6, 0)));
}

#[test]
fn test_stale_linearization_is_diagnosed() {
    let doc = parse_document(&linearized_single_page(false)).unwrap();
    assert!(doc.statistics().linearized);
    let issue = doc
        .diagnostics()
        .iter()
        .find(|d| d.code == "LINEARIZATION_INVALID")
        .unwrap();
    assert!(issue.message.contains("/L 0"), "{}", issue.message);
    assert_eq!(doc.nodes_by_type(NodeType::Page).len(), 1);
}

#[test]
fn test_signature_after_incremental_update() {
    let doc = parse_document(&signed_form(true)).unwrap();
    let sig = doc.nodes_by_type(NodeType::Signature)[0];
    assert_eq!(sig.property("byteRangeStatus"), Some("valid"));
    assert_eq!(sig.property("coversWholeFile"), Some("false"));

    // The update's page wins, the signature still resolves
    let page = doc.nodes_by_type(NodeType::Page)[0];
    assert_eq!(page.property("MediaBox"), Some("[0 0 595 842]"));
}
