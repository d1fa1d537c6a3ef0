//! Integration test helpers on top of `pdf_ast::parser::test_helpers`

#![allow(dead_code)]

use pdf_ast::encryption::Rc4;
#[cfg(feature = "compression")]
use pdf_ast::parser::test_helpers::stream_body;
use pdf_ast::parser::test_helpers::PdfFixture;

/// Route library logs to the test harness; set `RUST_LOG` to see them
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

pub fn hex(bytes: &[u8]) -> String {
    let digits: String = bytes.iter().map(|b| format!("{b:02X}")).collect();
    format!("<{digits}>")
}

#[cfg(feature = "compression")]
pub fn deflate(data: &[u8]) -> Vec<u8> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory finish")
}

/// One page whose page and font live in a Flate object stream, indexed by
/// an xref stream using the PNG Up predictor
#[cfg(feature = "compression")]
pub fn xref_stream_pdf() -> Vec<u8> {
    let page = "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Resources << /Font << /F1 5 0 R >> >> >>";
    let font = "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>";
    let objects = format!("{page} {font}");
    let header = format!("4 0 5 {} ", page.len() + 1);
    let packed = deflate(format!("{header}{objects}").as_bytes());

    let mut out = b"%PDF-1.5\n%\xE2\xE3\xCF\xD3\n".to_vec();
    let mut offsets = [0usize; 7];
    offsets[1] = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    offsets[2] = out.len();
    out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [4 0 R] /Count 1 >>\nendobj\n");
    offsets[3] = out.len();
    out.extend_from_slice(b"3 0 obj\n");
    out.extend_from_slice(&stream_body(
        &format!("/Type /ObjStm /N 2 /First {} /Filter /FlateDecode", header.len()),
        &packed,
    ));
    out.extend_from_slice(b"\nendobj\n");
    offsets[6] = out.len();

    // Rows of /W [1 4 2]
    let mut rows: Vec<[u8; 7]> = Vec::new();
    let row = |kind: u8, field: u32, extra: u16| {
        let f = field.to_be_bytes();
        let e = extra.to_be_bytes();
        [kind, f[0], f[1], f[2], f[3], e[0], e[1]]
    };
    rows.push(row(0, 0, 65535));
    for number in 1..=3 {
        rows.push(row(1, offsets[number] as u32, 0));
    }
    rows.push(row(2, 3, 0));
    rows.push(row(2, 3, 1));
    rows.push(row(1, offsets[6] as u32, 0));

    let mut predicted = Vec::new();
    let mut previous = [0u8; 7];
    for current in &rows {
        predicted.push(2);
        for (c, p) in current.iter().zip(previous.iter()) {
            predicted.push(c.wrapping_sub(*p));
        }
        previous = *current;
    }
    let xref_data = deflate(&predicted);

    out.extend_from_slice(b"6 0 obj\n");
    out.extend_from_slice(&stream_body(
        "/Type /XRef /Size 7 /W [1 4 2] /Root 1 0 R /Filter /FlateDecode \
         /DecodeParms << /Predictor 12 /Columns 7 >>",
        &xref_data,
    ));
    out.extend_from_slice(b"\nendobj\n");
    out.extend_from_slice(format!("startxref\n{}\n%%EOF\n", offsets[6]).as_bytes());
    out
}

/// Standard security handler, revision 2 (40-bit RC4), empty user password
pub struct Rc4Fixture {
    pub key: Vec<u8>,
    pub owner: [u8; 32],
    pub file_id: [u8; 16],
    pub p: i32,
}

impl Rc4Fixture {
    pub fn new() -> Self {
        let owner = [0x4F; 32];
        let file_id = *b"0123456789abcdef";
        let p = -4;

        let mut input = PADDING.to_vec();
        input.extend_from_slice(&owner);
        input.extend_from_slice(&(p as u32).to_le_bytes());
        input.extend_from_slice(&file_id);
        let key = md5::compute(&input).0[..5].to_vec();
        Self {
            key,
            owner,
            file_id,
            p,
        }
    }

    pub fn user_hash(&self) -> Vec<u8> {
        Rc4::apply(&self.key, &PADDING)
    }

    /// Encrypt `data` belonging to object `number`, generation 0
    pub fn encrypt(&self, number: u32, data: &[u8]) -> Vec<u8> {
        let mut input = self.key.clone();
        input.extend_from_slice(&number.to_le_bytes()[..3]);
        input.extend_from_slice(&[0, 0]);
        let object_key = &md5::compute(&input).0[..self.key.len() + 5];
        Rc4::apply(object_key, data)
    }

    pub fn encrypt_dict(&self) -> String {
        format!(
            "<< /Filter /Standard /V 1 /R 2 /O {} /U {} /P {} >>",
            hex(&self.owner),
            hex(&self.user_hash()),
            self.p
        )
    }

    /// One-page document with an encrypted Info title and content stream
    pub fn document(&self, title: &str) -> Vec<u8> {
        let content = self.encrypt(4, b"BT /F1 12 Tf (secret) Tj ET");
        PdfFixture::minimal()
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R >>")
            .stream_object(4, "", &content)
            .object(6, format!("<< /Title {} >>", hex(&self.encrypt(6, title.as_bytes()))))
            .object(7, self.encrypt_dict())
            .trailer_entry("Info", "6 0 R")
            .trailer_entry("Encrypt", "7 0 R")
            .trailer_entry("ID", &format!("[{} {}]", hex(&self.file_id), hex(&self.file_id)))
            .build()
    }
}
