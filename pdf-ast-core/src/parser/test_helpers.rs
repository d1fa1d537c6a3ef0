//! Builder for test PDFs with correct cross-reference offsets

use std::collections::BTreeMap;

/// Assembles a PDF body, its xref sections and incremental updates
#[derive(Debug, Clone)]
pub struct PdfFixture {
    version: Option<String>,
    objects: Vec<(u32, Vec<u8>)>,
    trailer_extra: Vec<(String, String)>,
    updates: Vec<Vec<(u32, Vec<u8>)>>,
    prev_cycle: bool,
    write_xref: bool,
    bad_startxref: bool,
    root: u32,
}

impl PdfFixture {
    /// Header only; add a catalog as object 1
    pub fn empty() -> Self {
        Self {
            version: Some("1.4".to_string()),
            objects: Vec::new(),
            trailer_extra: Vec::new(),
            updates: Vec::new(),
            prev_cycle: false,
            write_xref: true,
            bad_startxref: false,
            root: 1,
        }
    }

    /// Catalog (1) and an empty page tree (2)
    pub fn minimal() -> Self {
        Self::empty()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
    }

    /// Catalog (1), page tree (2), one page (3) with a content stream (4) and a font (5)
    pub fn single_page() -> Self {
        Self::empty()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
                 /Resources << /Font << /F1 5 0 R >> >> >>",
            )
            .stream_object(4, "", b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET")
            .object(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
    }

    pub fn with_version(mut self, version: &str) -> Self {
        self.version = Some(version.to_string());
        self
    }

    pub fn without_header(mut self) -> Self {
        self.version = None;
        self
    }

    /// Add or replace a body object
    pub fn object(mut self, number: u32, body: impl AsRef<[u8]>) -> Self {
        self.objects.retain(|(n, _)| *n != number);
        self.objects.push((number, body.as_ref().to_vec()));
        self
    }

    /// Add a stream object with a correct `/Length`
    pub fn stream_object(self, number: u32, extra_dict: &str, data: &[u8]) -> Self {
        self.object(number, stream_body(extra_dict, data))
    }

    pub fn trailer_entry(mut self, key: &str, value: &str) -> Self {
        self.trailer_extra.push((key.to_string(), value.to_string()));
        self
    }

    /// Append an incremental update redefining the given objects
    pub fn update(mut self, objects: Vec<(u32, String)>) -> Self {
        self.updates
            .push(objects.into_iter().map(|(n, b)| (n, b.into_bytes())).collect());
        self
    }

    /// Make the oldest section's `/Prev` point at itself
    pub fn with_prev_cycle(mut self) -> Self {
        self.prev_cycle = true;
        self
    }

    /// Omit every xref section, trailer and `startxref`
    pub fn without_xref(mut self) -> Self {
        self.write_xref = false;
        self
    }

    /// Name a catalog other than object 1 in the trailer
    pub fn with_root(mut self, number: u32) -> Self {
        self.root = number;
        self
    }

    /// Point `startxref` into the middle of the header
    pub fn with_bad_startxref(mut self) -> Self {
        self.bad_startxref = true;
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(version) = &self.version {
            out.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
            out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
        }

        let mut offsets = BTreeMap::new();
        for (number, body) in &self.objects {
            offsets.insert(*number, out.len());
            write_object(&mut out, *number, body);
        }

        if !self.write_xref {
            out.extend_from_slice(b"%%EOF\n");
            return out;
        }

        let size = offsets.keys().max().map_or(1, |m| m + 1);
        let base_xref = out.len();
        out.extend_from_slice(format!("xref\n0 {size}\n").as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for number in 1..size {
            match offsets.get(&number) {
                Some(offset) => out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 00000 f \n"),
            }
        }
        let prev = self.prev_cycle.then_some(base_xref);
        self.write_trailer(&mut out, size, prev);

        let mut last_xref = base_xref;
        let mut max_number = size - 1;
        for update in &self.updates {
            let mut update_offsets = BTreeMap::new();
            for (number, body) in update {
                update_offsets.insert(*number, out.len());
                write_object(&mut out, *number, body);
                max_number = max_number.max(*number);
            }
            let xref_offset = out.len();
            out.extend_from_slice(b"xref\n");
            for (number, offset) in &update_offsets {
                out.extend_from_slice(format!("{number} 1\n{offset:010} 00000 n \n").as_bytes());
            }
            self.write_trailer(&mut out, max_number + 1, Some(last_xref));
            last_xref = xref_offset;
        }

        let startxref = if self.bad_startxref { 3 } else { last_xref };
        out.extend_from_slice(format!("startxref\n{startxref}\n%%EOF\n").as_bytes());
        out
    }

    fn write_trailer(&self, out: &mut Vec<u8>, size: u32, prev: Option<usize>) {
        let mut trailer = format!("trailer\n<< /Size {size} /Root {} 0 R", self.root);
        for (key, value) in &self.trailer_extra {
            trailer.push_str(&format!(" /{key} {value}"));
        }
        if let Some(prev) = prev {
            trailer.push_str(&format!(" /Prev {prev}"));
        }
        trailer.push_str(" >>\n");
        out.extend_from_slice(trailer.as_bytes());
    }
}

/// Hybrid-reference file: the table places font 5 (Helvetica) in the body,
/// while the `/XRefStm` stream of the same section relocates it to a later
/// Courier definition
pub fn hybrid_single_page() -> Vec<u8> {
    let mut out = PdfFixture::single_page().without_xref().build();
    let offsets: Vec<usize> = (1..=5)
        .map(|n| offset_of(&out, &format!("\n{n} 0 obj")) + 1)
        .collect();

    let courier = out.len();
    write_object(&mut out, 5, b"<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>");

    // One /W [1 4 1] row for object 5
    let xref_stm = out.len();
    let mut row = vec![1u8];
    row.extend_from_slice(&(courier as u32).to_be_bytes());
    row.push(0);
    write_object(
        &mut out,
        6,
        &stream_body("/Type /XRef /Size 7 /W [1 4 1] /Index [5 1]", &row),
    );

    let table = out.len();
    out.extend_from_slice(b"xref\n0 6\n0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    out.extend_from_slice(
        format!("trailer\n<< /Size 7 /Root 1 0 R /XRefStm {xref_stm} >>\nstartxref\n{table}\n%%EOF\n")
            .as_bytes(),
    );
    out
}

/// One page with the linearization dictionary as object 1 and the catalog
/// as object 6. Unless `intact`, `/L` is stale as after an incremental save.
pub fn linearized_single_page(intact: bool) -> Vec<u8> {
    let fixture = |length: usize| {
        PdfFixture::empty()
            .object(
                1,
                format!("<< /Linearized 1 /L {length:010} /H [200 40] /O 3 /E 300 /N 1 /T 400 >>"),
            )
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(
                3,
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R \
                 /Resources << /Font << /F1 5 0 R >> >> >>",
            )
            .stream_object(4, "", b"BT /F1 12 Tf 72 712 Td (Hello) Tj ET")
            .object(5, "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>")
            .object(6, "<< /Type /Catalog /Pages 2 0 R >>")
            .with_root(6)
    };
    let draft = fixture(0).build();
    if !intact {
        return draft;
    }
    // `/L` is zero padded, so the final file has the draft's length
    fixture(draft.len()).build()
}

/// One page with a signature field (6) whose value (7) is signed over the
/// whole file. With `modified_after`, an incremental update redefining the
/// page follows the signed bytes.
pub fn signed_form(modified_after: bool) -> Vec<u8> {
    let fixture = |range: [usize; 3]| {
        PdfFixture::single_page()
            .object(
                1,
                "<< /Type /Catalog /Pages 2 0 R /AcroForm << /Fields [6 0 R] /SigFlags 3 >> >>",
            )
            .object(6, "<< /FT /Sig /T (Signature1) /V 7 0 R >>")
            .object(
                7,
                format!(
                    "<< /Type /Sig /Filter /Adobe.PPKLite /SubFilter /adbe.pkcs7.detached \
                     /ByteRange [0 {:010} {:010} {:010}] /Contents <{}> /M (D:20240101000000Z) >>",
                    range[0],
                    range[1],
                    range[2],
                    "0".repeat(64)
                ),
            )
    };
    // The range fields are zero padded, so every draft has the same layout
    let draft = fixture([0; 3]).build();
    let gap_start = offset_of(&draft, "/Contents <") + "/Contents ".len();
    let gap_end = gap_start + 66;
    let mut out = fixture([gap_start, gap_end, draft.len() - gap_end]).build();
    if !modified_after {
        return out;
    }

    let prev = last_startxref(&out);
    let page = out.len();
    write_object(
        &mut out,
        3,
        b"<< /Type /Page /Parent 2 0 R /MediaBox [0 0 595 842] /Contents 4 0 R \
          /Resources << /Font << /F1 5 0 R >> >> >>",
    );
    let xref = out.len();
    out.extend_from_slice(
        format!(
            "xref\n3 1\n{page:010} 00000 n \ntrailer\n<< /Size 8 /Root 1 0 R /Prev {prev} >>\nstartxref\n{xref}\n%%EOF\n"
        )
        .as_bytes(),
    );
    out
}

fn last_startxref(data: &[u8]) -> usize {
    let at = data
        .windows(b"startxref".len())
        .rposition(|w| w == b"startxref")
        .unwrap_or_else(|| panic!("fixture has no startxref"));
    String::from_utf8_lossy(&data[at + b"startxref".len()..])
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .unwrap_or_else(|| panic!("fixture has no startxref offset"))
}

fn write_object(out: &mut Vec<u8>, number: u32, body: &[u8]) {
    out.extend_from_slice(format!("{number} 0 obj\n").as_bytes());
    out.extend_from_slice(body);
    out.extend_from_slice(b"\nendobj\n");
}

/// `<< /Length n extra >> stream ... endstream`
pub fn stream_body(extra_dict: &str, data: &[u8]) -> Vec<u8> {
    let mut body = format!("<< /Length {} {extra_dict} >>\nstream\n", data.len()).into_bytes();
    body.extend_from_slice(data);
    body.extend_from_slice(b"\nendstream");
    body
}

/// Byte offset of the first occurrence of `needle`
pub fn offset_of(data: &[u8], needle: &str) -> usize {
    data.windows(needle.len())
        .position(|w| w == needle.as_bytes())
        .unwrap_or_else(|| panic!("{needle:?} not found in fixture"))
}
