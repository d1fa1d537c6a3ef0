//! PDF Stream Filters
//!
//! Handles decompression and decoding of PDF streams according to ISO 32000-2
//! Section 7.4. Image codecs (DCT, JPX, JBIG2, CCITT) are terminal: their
//! input is returned unchanged and the result is flagged as not fully decoded.

use super::objects::{PdfDictionary, PdfObject};
use super::{ParseError, ParseResult};

#[cfg(feature = "compression")]
use flate2::read::{DeflateDecoder, ZlibDecoder};
#[cfg(feature = "compression")]
use std::io::Read;

/// Upper bound on decoded stream size
pub const MAX_DECODED_LEN: usize = 256 * 1024 * 1024;

/// Supported PDF filters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// ASCII hex decode
    ASCIIHexDecode,

    /// ASCII 85 decode
    ASCII85Decode,

    /// LZW decode
    LZWDecode,

    /// Flate decode (zlib/deflate compression)
    FlateDecode,

    /// Run length decode
    RunLengthDecode,

    /// CCITT fax decode
    CCITTFaxDecode,

    /// JBIG2 decode
    JBIG2Decode,

    /// DCT decode (JPEG)
    DCTDecode,

    /// JPX decode (JPEG 2000)
    JPXDecode,

    /// Crypt filter
    Crypt,
}

impl Filter {
    /// Parse filter from name, including the abbreviations allowed in inline images
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ASCIIHexDecode" | "AHx" => Some(Filter::ASCIIHexDecode),
            "ASCII85Decode" | "A85" => Some(Filter::ASCII85Decode),
            "LZWDecode" | "LZW" => Some(Filter::LZWDecode),
            "FlateDecode" | "Fl" => Some(Filter::FlateDecode),
            "RunLengthDecode" | "RL" => Some(Filter::RunLengthDecode),
            "CCITTFaxDecode" | "CCF" => Some(Filter::CCITTFaxDecode),
            "JBIG2Decode" => Some(Filter::JBIG2Decode),
            "DCTDecode" | "DCT" => Some(Filter::DCTDecode),
            "JPXDecode" => Some(Filter::JPXDecode),
            "Crypt" => Some(Filter::Crypt),
            _ => None,
        }
    }

    /// Image codecs whose output is pixel data we do not decode
    pub fn is_image_codec(self) -> bool {
        matches!(
            self,
            Filter::CCITTFaxDecode | Filter::JBIG2Decode | Filter::DCTDecode | Filter::JPXDecode
        )
    }

    /// Filters that decode one of the LZW/Flate predictor families
    pub fn is_lossless_compression(self) -> bool {
        matches!(self, Filter::FlateDecode | Filter::LZWDecode)
    }
}

/// Result of running a stream's filter chain
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedStream {
    pub data: Vec<u8>,
    /// Filters that were applied, in order
    pub applied: Vec<Filter>,
    /// Image codec at which decoding stopped, if any
    pub stopped_at: Option<Filter>,
}

impl DecodedStream {
    /// Whether every declared filter was applied
    pub fn is_complete(&self) -> bool {
        self.stopped_at.is_none()
    }
}

/// Filter names and their decode parameters, in decode order
pub fn filter_chain(dict: &PdfDictionary) -> ParseResult<Vec<(Filter, Option<&PdfDictionary>)>> {
    let names: Vec<&str> = match dict.get("Filter") {
        Some(PdfObject::Name(name)) => vec![name.as_str()],
        Some(PdfObject::Array(array)) => {
            let mut filter_names = Vec::new();
            for obj in array.iter() {
                match obj.as_name() {
                    Some(name) => filter_names.push(name.as_str()),
                    None => {
                        return Err(ParseError::StreamDecodeError(
                            "Invalid filter in array".to_string(),
                        ))
                    }
                }
            }
            filter_names
        }
        None => return Ok(Vec::new()),
        Some(other) => {
            return Err(ParseError::StreamDecodeError(format!(
                "Invalid Filter type: {}",
                other.kind()
            )))
        }
    };

    let params: Vec<Option<&PdfDictionary>> = match dict.get("DecodeParms") {
        Some(PdfObject::Dictionary(d)) => vec![Some(d)],
        Some(PdfObject::Array(array)) => array
            .iter()
            .map(|p| match p {
                PdfObject::Dictionary(d) => Some(d),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };

    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let filter = Filter::from_name(name)
                .ok_or_else(|| ParseError::StreamDecodeError(format!("Unknown filter: {name}")))?;
            Ok((filter, params.get(i).copied().flatten()))
        })
        .collect()
}

/// Decode stream data according to specified filters.
///
/// Decoding stops before the first image codec; the bytes returned are then
/// the codec's input.
pub fn decode_stream(data: &[u8], dict: &PdfDictionary) -> ParseResult<Vec<u8>> {
    decode_stream_detailed(data, dict).map(|d| d.data)
}

/// Decode stream data and report which filters were applied
pub fn decode_stream_detailed(data: &[u8], dict: &PdfDictionary) -> ParseResult<DecodedStream> {
    let chain = filter_chain(dict)?;
    let mut result = DecodedStream {
        data: data.to_vec(),
        applied: Vec::with_capacity(chain.len()),
        stopped_at: None,
    };

    for (filter, params) in chain {
        if filter.is_image_codec() {
            result.stopped_at = Some(filter);
            break;
        }
        result.data = apply_filter(&result.data, filter, params)?;
        result.applied.push(filter);
    }

    Ok(result)
}

/// Apply a single filter to data
pub fn apply_filter(
    data: &[u8],
    filter: Filter,
    params: Option<&PdfDictionary>,
) -> ParseResult<Vec<u8>> {
    let decoded = match filter {
        Filter::FlateDecode => decode_flate(data)?,
        Filter::LZWDecode => {
            let early_change = params
                .and_then(|p| p.get_integer("EarlyChange"))
                .unwrap_or(1);
            decode_lzw(data, early_change != 0)?
        }
        Filter::ASCIIHexDecode => return decode_ascii_hex(data),
        Filter::ASCII85Decode => return decode_ascii85(data),
        Filter::RunLengthDecode => return decode_run_length(data),
        // Encryption is removed by the security handler before filters run
        Filter::Crypt => return Ok(data.to_vec()),
        other => {
            return Err(ParseError::StreamDecodeError(format!(
                "Filter {other:?} produces image data and is not decoded"
            )))
        }
    };

    match params {
        Some(params) if filter.is_lossless_compression() => apply_predictor(&decoded, params),
        _ => Ok(decoded),
    }
}

/// Decode FlateDecode (zlib/deflate) compressed data.
///
/// Falls back to raw deflate when the zlib header is missing, and keeps
/// partial output when the stream is truncated or its checksum is wrong.
#[cfg(feature = "compression")]
fn decode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let zlib_error = match ZlibDecoder::new(data)
        .take(MAX_DECODED_LEN as u64)
        .read_to_end(&mut result)
    {
        Ok(_) => return Ok(result),
        Err(e) => e,
    };

    if !result.is_empty() {
        tracing::debug!(error = %zlib_error, decoded = result.len(), "keeping partial flate output");
        return Ok(result);
    }

    let mut raw = Vec::new();
    match DeflateDecoder::new(data)
        .take(MAX_DECODED_LEN as u64)
        .read_to_end(&mut raw)
    {
        _ if !raw.is_empty() => Ok(raw),
        _ => Err(ParseError::StreamDecodeError(format!(
            "Flate decode error: {zlib_error}"
        ))),
    }
}

#[cfg(not(feature = "compression"))]
fn decode_flate(_data: &[u8]) -> ParseResult<Vec<u8>> {
    Err(ParseError::StreamDecodeError(
        "FlateDecode requires 'compression' feature".to_string(),
    ))
}

/// Decode ASCIIHexDecode data
fn decode_ascii_hex(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut high: Option<u8> = None;

    for &ch in data {
        if ch == b'>' {
            break;
        }
        if super::is_whitespace(ch) {
            continue;
        }
        let value = hex_digit_value(ch).ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Invalid hex digit: {}", ch as char))
        })?;
        match high.take() {
            Some(h) => result.push((h << 4) | value),
            None => high = Some(value),
        }
    }

    // Odd number of digits, pad with 0
    if let Some(h) = high {
        result.push(h << 4);
    }

    Ok(result)
}

/// Get value of hex digit
fn hex_digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        _ => None,
    }
}

/// Decode ASCII85Decode data
fn decode_ascii85(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut group = [0u8; 5];
    let mut group_len = 0;

    let body = data.strip_prefix(b"<~").unwrap_or(data);

    for &c in body.iter().filter(|&&b| !super::is_whitespace(b)) {
        match c {
            b'~' => break,
            b'z' if group_len == 0 => result.extend_from_slice(&[0, 0, 0, 0]),
            b'!'..=b'u' => {
                group[group_len] = c - b'!';
                group_len += 1;
                if group_len == 5 {
                    result.extend_from_slice(&ascii85_group_value(&group)?.to_be_bytes());
                    group_len = 0;
                }
            }
            _ => {
                return Err(ParseError::StreamDecodeError(format!(
                    "Invalid ASCII85 character: {}",
                    c as char
                )));
            }
        }
    }

    // Handle incomplete final group: pad with 'u', keep n-1 bytes
    if group_len == 1 {
        return Err(ParseError::StreamDecodeError(
            "ASCII85 final group has a single character".to_string(),
        ));
    }
    if group_len > 1 {
        for slot in group.iter_mut().skip(group_len) {
            *slot = 84;
        }
        let bytes = ascii85_group_value(&group)?.to_be_bytes();
        result.extend_from_slice(&bytes[..group_len - 1]);
    }

    Ok(result)
}

fn ascii85_group_value(group: &[u8; 5]) -> ParseResult<u32> {
    let value = group
        .iter()
        .fold(0u64, |acc, &digit| acc * 85 + u64::from(digit));
    u32::try_from(value)
        .map_err(|_| ParseError::StreamDecodeError("ASCII85 group out of range".to_string()))
}

/// Decode RunLengthDecode data
fn decode_run_length(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut result = Vec::new();
    let mut i = 0;

    while i < data.len() {
        let length = data[i];
        i += 1;
        match length {
            128 => break,
            0..=127 => {
                let count = usize::from(length) + 1;
                let end = (i + count).min(data.len());
                result.extend_from_slice(&data[i..end]);
                i = end;
            }
            _ => {
                let Some(&byte) = data.get(i) else { break };
                result.extend(std::iter::repeat(byte).take(257 - usize::from(length)));
                i += 1;
            }
        }
    }

    Ok(result)
}

/// Decode LZWDecode data (variable code width 9 to 12 bits)
fn decode_lzw(data: &[u8], early_change: bool) -> ParseResult<Vec<u8>> {
    const CLEAR: u16 = 256;
    const EOD: u16 = 257;

    let mut table: Vec<Vec<u8>> = (0..=255u8).map(|b| vec![b]).collect();
    table.push(Vec::new());
    table.push(Vec::new());

    let mut result = Vec::new();
    let mut code_width = 9u32;
    let mut bit_buffer = 0u32;
    let mut bits_in_buffer = 0u32;
    let mut previous: Option<u16> = None;

    for &byte in data {
        bit_buffer = (bit_buffer << 8) | u32::from(byte);
        bits_in_buffer += 8;

        while bits_in_buffer >= code_width {
            let code = ((bit_buffer >> (bits_in_buffer - code_width)) & ((1 << code_width) - 1)) as u16;
            bits_in_buffer -= code_width;

            if code == CLEAR {
                table.truncate(258);
                code_width = 9;
                previous = None;
                continue;
            }
            if code == EOD {
                return Ok(result);
            }

            let entry = match (usize::from(code) < table.len(), previous) {
                (true, _) => table[usize::from(code)].clone(),
                (false, Some(prev)) if usize::from(code) == table.len() => {
                    let mut entry = table[usize::from(prev)].clone();
                    entry.push(entry[0]);
                    entry
                }
                _ => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid LZW code {code}"
                    )))
                }
            };

            result.extend_from_slice(&entry);
            if result.len() > MAX_DECODED_LEN {
                return Err(ParseError::StreamDecodeError(
                    "LZW output exceeds size limit".to_string(),
                ));
            }

            if let Some(prev) = previous {
                if table.len() < 4096 {
                    let mut new_entry = table[usize::from(prev)].clone();
                    new_entry.push(entry[0]);
                    table.push(new_entry);
                }
            }
            previous = Some(code);

            let threshold = table.len() + usize::from(early_change);
            code_width = match threshold {
                t if t >= 2048 => 12,
                t if t >= 1024 => 11,
                t if t >= 512 => 10,
                _ => 9,
            };
        }
    }

    Ok(result)
}

/// Undo a PNG (10-15) or TIFF (2) predictor
pub fn apply_predictor(data: &[u8], params: &PdfDictionary) -> ParseResult<Vec<u8>> {
    let predictor = params.get_integer("Predictor").unwrap_or(1);
    if predictor <= 1 {
        return Ok(data.to_vec());
    }

    let colors = params.get_integer("Colors").unwrap_or(1).clamp(1, 32) as usize;
    let bpc = params.get_integer("BitsPerComponent").unwrap_or(8).clamp(1, 16) as usize;
    let columns = usize::try_from(params.get_integer("Columns").unwrap_or(1).max(1))
        .map_err(|_| ParseError::StreamDecodeError("Predictor /Columns out of range".to_string()))?;

    let bytes_per_pixel = ((colors * bpc) / 8).max(1);
    let row_len = (colors * bpc)
        .checked_mul(columns)
        .and_then(|bits| bits.checked_add(7))
        .map(|bits| bits / 8)
        .ok_or_else(|| {
            ParseError::StreamDecodeError(format!("Predictor row of {columns} columns overflows"))
        })?;
    if data.is_empty() {
        return Ok(Vec::new());
    }
    // A row can never be longer than the data it is predicted from
    if row_len > data.len() {
        return Err(ParseError::StreamDecodeError(format!(
            "Predictor row length {row_len} exceeds {} bytes of data",
            data.len()
        )));
    }

    match predictor {
        2 => Ok(undo_tiff_predictor(data, row_len, bytes_per_pixel, bpc)),
        10..=15 => undo_png_predictor(data, row_len, bytes_per_pixel),
        other => Err(ParseError::StreamDecodeError(format!(
            "Unsupported predictor {other}"
        ))),
    }
}

fn undo_tiff_predictor(data: &[u8], row_len: usize, bpp: usize, bpc: usize) -> Vec<u8> {
    // Only byte-aligned samples are differenced here
    if bpc != 8 {
        return data.to_vec();
    }
    let mut out = data.to_vec();
    for row in out.chunks_mut(row_len) {
        for i in bpp..row.len() {
            row[i] = row[i].wrapping_add(row[i - bpp]);
        }
    }
    out
}

fn undo_png_predictor(data: &[u8], row_len: usize, bpp: usize) -> ParseResult<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    let mut previous = vec![0u8; row_len];

    for chunk in data.chunks(row_len + 1) {
        let filter_type = chunk[0];
        let mut row = chunk[1..].to_vec();
        row.resize(row_len, 0);

        for i in 0..row_len {
            let left = if i >= bpp { row[i - bpp] } else { 0 };
            let up = previous[i];
            let upper_left = if i >= bpp { previous[i - bpp] } else { 0 };
            row[i] = match filter_type {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, upper_left)),
                other => {
                    return Err(ParseError::StreamDecodeError(format!(
                        "Invalid PNG filter type {other}"
                    )))
                }
            };
        }

        out.extend_from_slice(&row);
        previous = row;
    }

    Ok(out)
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = i16::from(a) + i16::from(b) - i16::from(c);
    let pa = (p - i16::from(a)).abs();
    let pb = (p - i16::from(b)).abs();
    let pc = (p - i16::from(c)).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}
