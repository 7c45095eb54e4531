//! Self-describing row codec
//!
//! A row is `header | payload`: the header starts with a varint giving the
//! length of the type-code area, followed by one varint type code per
//! column; the payload holds the column bodies in column order. Type codes
//! carry both the kind and, for variable-width kinds, the payload size, so
//! a decoder can locate any column by walking codes without touching
//! payload bytes.
//!
//! Some codes state that the column's value lives in the row's key rather
//! than in the payload; decoding such a column reads the cursor's current
//! key through the key codec.

use crate::codec::key::{num_to_value, KeyReader};
use crate::codec::varint::{read_varint, varint_len, write_varint};
use crate::error::{Error, ErrorCode, Result};
use crate::num::Num;
use crate::types::Value;

// ============================================================================
// Type codes
// ============================================================================

const CODE_NULL: u64 = 0;
const CODE_INT_ZERO: u64 = 1;
const CODE_INT_ONE: u64 = 2;
/// Codes 3..=10: signed big-endian integer of `code - 2` bytes.
const CODE_INT_BASE: u64 = 2;
/// Codes 11..=21: decimal number, `code - 11` payload bytes.
const CODE_NUM_BASE: u64 = 11;
const CODE_NUM_MAX: u64 = 21;
/// Codes >= 22 stride by 4: text, blob, in-key, typed blob.
const CODE_TEXT: u64 = 22;
const CODE_BLOB: u64 = 23;
const CODE_KEY: u64 = 24;
const CODE_TYPED_BLOB: u64 = 25;

/// Text payload encoding markers.
const TEXT_UTF8: u8 = 0;
const TEXT_UTF16LE: u8 = 1;
const TEXT_UTF16BE: u8 = 2;

// ============================================================================
// Encoder
// ============================================================================

/// One column input to the row encoder: either a value stored in the
/// payload, or a reference to a field of the row's key.
#[derive(Debug, Clone, Copy)]
pub enum Col<'a> {
    /// Value stored inline.
    Val(&'a Value),
    /// Value lives in the key at `field`; `real` forces floating-point
    /// affinity when the column is decoded.
    InKey { field: usize, real: bool },
}

/// Encode a row from column inputs.
///
/// `perm`, when given, selects and orders the inputs: output column `j` is
/// `cols[perm[j]]`. This lets a caller project columns without building an
/// intermediate row.
pub fn encode_row(cols: &[Col<'_>], perm: Option<&[usize]>) -> Result<Vec<u8>> {
    let mut header = Vec::with_capacity(cols.len() * 2);
    let mut payload = Vec::new();

    let count = perm.map_or(cols.len(), |p| p.len());
    for j in 0..count {
        let idx = match perm {
            Some(p) => {
                let i = p[j];
                if i >= cols.len() {
                    return Err(Error::with_message(
                        ErrorCode::Misuse,
                        "permutation index out of range",
                    ));
                }
                i
            }
            None => j,
        };
        encode_col(&cols[idx], &mut header, &mut payload)?;
    }

    let mut out = Vec::with_capacity(varint_len(header.len() as u64) + header.len() + payload.len());
    write_varint(header.len() as u64, &mut out);
    out.extend_from_slice(&header);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Encode a row of plain values.
pub fn encode_values(values: &[Value]) -> Result<Vec<u8>> {
    let cols: Vec<Col<'_>> = values.iter().map(Col::Val).collect();
    encode_row(&cols, None)
}

fn encode_col(col: &Col<'_>, header: &mut Vec<u8>, payload: &mut Vec<u8>) -> Result<()> {
    match col {
        Col::InKey { field, real } => {
            let k = 2 * *field as u64 + *real as u64;
            write_varint(CODE_KEY + 4 * k, header);
        }
        Col::Val(Value::Null) => write_varint(CODE_NULL, header),
        Col::Val(Value::Integer(0)) => write_varint(CODE_INT_ZERO, header),
        Col::Val(Value::Integer(1)) => write_varint(CODE_INT_ONE, header),
        Col::Val(Value::Integer(v)) => {
            let n = int_width(*v);
            write_varint(CODE_INT_BASE + n as u64, header);
            payload.extend_from_slice(&v.to_be_bytes()[8 - n..]);
        }
        Col::Val(Value::Real(v)) => {
            let bytes = encode_num_payload(&Num::from_f64(*v));
            write_varint(CODE_NUM_BASE + bytes.len() as u64, header);
            payload.extend_from_slice(&bytes);
        }
        Col::Val(Value::Text(s)) => {
            let bytes = s.as_bytes();
            let prefixed = !bytes.is_empty() && bytes[0] < 3;
            let n = bytes.len() + prefixed as usize;
            write_varint(CODE_TEXT + 4 * n as u64, header);
            if prefixed {
                payload.push(TEXT_UTF8);
            }
            payload.extend_from_slice(bytes);
        }
        Col::Val(Value::Blob(b)) => {
            write_varint(CODE_BLOB + 4 * b.len() as u64, header);
            payload.extend_from_slice(b);
        }
        Col::Val(Value::TypedBlob { subtype, data }) => {
            let n = varint_len(*subtype as u64) + data.len();
            write_varint(CODE_TYPED_BLOB + 4 * n as u64, header);
            write_varint(*subtype as u64, payload);
            payload.extend_from_slice(data);
        }
    }
    Ok(())
}

/// Minimal big-endian two's-complement width for an integer, in bytes.
fn int_width(v: i64) -> usize {
    for n in 1..8usize {
        let bits = 8 * n as u32 - 1;
        if v >= -(1i64 << bits) && v < (1i64 << bits) {
            return n;
        }
    }
    8
}

/// Decimal payload: a varint folding the exponent with two flag bits
/// (bit0 = mantissa sign, bit1 = exponent sign) followed by the mantissa
/// varint. Kept to at most 10 bytes so the type code can carry the size;
/// the encoder sheds low mantissa digits in the rare case that would
/// overflow.
fn encode_num_payload(num: &Num) -> Vec<u8> {
    let mut m = num.mantissa();
    let mut e = num.exponent() as i64;
    let sign = num.is_negative() as u64;
    loop {
        let flags = ((e.unsigned_abs()) << 2) | (((e < 0) as u64) << 1) | sign;
        if varint_len(flags) + varint_len(m) <= (CODE_NUM_MAX - CODE_NUM_BASE) as usize {
            let mut out = Vec::with_capacity(4);
            write_varint(flags, &mut out);
            write_varint(m, &mut out);
            return out;
        }
        m /= 10;
        e += 1;
    }
}

fn decode_num_payload(payload: &[u8]) -> Result<Num> {
    let (flags, n) = read_varint(payload, 0)?;
    let (m, n2) = read_varint(payload, n)?;
    if n + n2 != payload.len() {
        return Err(Error::new(ErrorCode::Corrupt));
    }
    let sign = flags & 1 != 0;
    let mut e = (flags >> 2) as i64;
    if flags & 2 != 0 {
        e = -e;
    }
    if !(i16::MIN as i64..=i16::MAX as i64).contains(&e) {
        return Err(Error::new(ErrorCode::Corrupt));
    }
    Ok(Num::from_parts(sign, false, e as i16, m))
}

// ============================================================================
// Decoder
// ============================================================================

/// Per-column decoder over an encoded row.
///
/// `key` is the cursor's current key; it is only consulted for columns
/// whose type code points into the key.
#[derive(Debug)]
pub struct RowReader<'a> {
    row: &'a [u8],
    key: Option<&'a [u8]>,
    hdr_start: usize,
    hdr_end: usize,
    payload_start: usize,
}

impl<'a> RowReader<'a> {
    /// Validate header bounds and build a reader.
    pub fn new(row: &'a [u8], key: Option<&'a [u8]>) -> Result<RowReader<'a>> {
        let (hdr_len, n) = read_varint(row, 0)?;
        let hdr_start = n;
        let hdr_end = hdr_start
            .checked_add(hdr_len as usize)
            .ok_or_else(|| Error::new(ErrorCode::Corrupt))?;
        if hdr_end > row.len() {
            return Err(Error::with_message(
                ErrorCode::Corrupt,
                "row header overruns row",
            ));
        }
        Ok(RowReader {
            row,
            key,
            hdr_start,
            hdr_end,
            payload_start: hdr_end,
        })
    }

    /// Number of columns in the row.
    pub fn col_count(&self) -> Result<usize> {
        let mut pos = self.hdr_start;
        let mut count = 0;
        while pos < self.hdr_end {
            let (_, n) = read_varint(&self.row[..self.hdr_end], pos)?;
            pos += n;
            count += 1;
        }
        Ok(count)
    }

    /// Decode column `i`. Columns are independent: decoding one never
    /// requires materializing another.
    pub fn get(&self, i: usize) -> Result<Value> {
        let mut pos = self.hdr_start;
        let mut payload_off = 0usize;
        let mut idx = 0usize;
        while pos < self.hdr_end {
            let (code, n) = read_varint(&self.row[..self.hdr_end], pos)?;
            let size = payload_size(code)?;
            if idx == i {
                return self.materialize(code, payload_off, size);
            }
            pos += n;
            payload_off += size;
            idx += 1;
        }
        Err(Error::with_message(
            ErrorCode::NotFound,
            format!("row has {} columns, column {} requested", idx, i),
        ))
    }

    fn payload(&self, off: usize, size: usize) -> Result<&'a [u8]> {
        let start = self.payload_start + off;
        let end = start
            .checked_add(size)
            .ok_or_else(|| Error::new(ErrorCode::Corrupt))?;
        if end > self.row.len() {
            return Err(Error::with_message(
                ErrorCode::Corrupt,
                "column payload extends past row end",
            ));
        }
        Ok(&self.row[start..end])
    }

    fn materialize(&self, code: u64, off: usize, size: usize) -> Result<Value> {
        match code {
            CODE_NULL => Ok(Value::Null),
            CODE_INT_ZERO => Ok(Value::Integer(0)),
            CODE_INT_ONE => Ok(Value::Integer(1)),
            c if (3..=10).contains(&c) => {
                let bytes = self.payload(off, size)?;
                let mut v: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
                for &b in bytes {
                    v = (v << 8) | b as i64;
                }
                Ok(Value::Integer(v))
            }
            c if (CODE_NUM_BASE..=CODE_NUM_MAX).contains(&c) => {
                let num = decode_num_payload(self.payload(off, size)?)?;
                Ok(match num_to_value(num) {
                    Value::Integer(v) => Value::Real(v as f64),
                    v => v,
                })
            }
            _ => self.materialize_wide(code, off, size),
        }
    }

    fn materialize_wide(&self, code: u64, off: usize, size: usize) -> Result<Value> {
        match (code - CODE_TEXT) % 4 + CODE_TEXT {
            CODE_TEXT => {
                let bytes = self.payload(off, size)?;
                decode_text(bytes)
            }
            CODE_BLOB => Ok(Value::Blob(self.payload(off, size)?.to_vec())),
            CODE_KEY => {
                let k = (code - CODE_KEY) / 4;
                let field = (k / 2) as usize;
                let real = k & 1 != 0;
                let key = self.key.ok_or_else(|| {
                    Error::with_message(ErrorCode::Misuse, "column lives in key but no key supplied")
                })?;
                let (_, reader) = KeyReader::new(key)?;
                let v = reader.field_at(field)?;
                Ok(match v {
                    Value::Integer(n) if real => Value::Real(n as f64),
                    v => v,
                })
            }
            CODE_TYPED_BLOB => {
                let bytes = self.payload(off, size)?;
                let (subtype, n) = read_varint(bytes, 0)?;
                if subtype > u32::MAX as u64 {
                    return Err(Error::new(ErrorCode::Corrupt));
                }
                Ok(Value::TypedBlob {
                    subtype: subtype as u32,
                    data: bytes[n..].to_vec(),
                })
            }
            _ => unreachable!(),
        }
    }
}

/// Payload size implied by a type code.
fn payload_size(code: u64) -> Result<usize> {
    match code {
        CODE_NULL | CODE_INT_ZERO | CODE_INT_ONE => Ok(0),
        c if (3..=10).contains(&c) => Ok((c - CODE_INT_BASE) as usize),
        c if (CODE_NUM_BASE..=CODE_NUM_MAX).contains(&c) => Ok((c - CODE_NUM_BASE) as usize),
        c if c >= CODE_TEXT => {
            if (c - CODE_TEXT) % 4 + CODE_TEXT == CODE_KEY {
                Ok(0)
            } else {
                Ok(((c - CODE_TEXT) / 4) as usize)
            }
        }
        _ => Err(Error::with_message(
            ErrorCode::Corrupt,
            format!("unknown row type code {}", code),
        )),
    }
}

fn decode_text(bytes: &[u8]) -> Result<Value> {
    if bytes.is_empty() {
        return Ok(Value::Text(String::new()));
    }
    if bytes[0] >= 3 {
        return String::from_utf8(bytes.to_vec())
            .map(Value::Text)
            .map_err(|_| Error::with_message(ErrorCode::Corrupt, "row text is not utf-8"));
    }
    let content = &bytes[1..];
    match bytes[0] {
        TEXT_UTF8 => String::from_utf8(content.to_vec())
            .map(Value::Text)
            .map_err(|_| Error::with_message(ErrorCode::Corrupt, "row text is not utf-8")),
        TEXT_UTF16LE | TEXT_UTF16BE => {
            if content.len() % 2 != 0 {
                return Err(Error::new(ErrorCode::Corrupt));
            }
            let be = bytes[0] == TEXT_UTF16BE;
            let units: Vec<u16> = content
                .chunks_exact(2)
                .map(|c| {
                    if be {
                        u16::from_be_bytes([c[0], c[1]])
                    } else {
                        u16::from_le_bytes([c[0], c[1]])
                    }
                })
                .collect();
            String::from_utf16(&units)
                .map(Value::Text)
                .map_err(|_| Error::with_message(ErrorCode::Corrupt, "row text is not utf-16"))
        }
        _ => unreachable!(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::key::{encode_key, KeyInfo};

    fn row(values: &[Value]) -> Vec<u8> {
        encode_values(values).unwrap()
    }

    #[test]
    fn test_typed_int_layout() {
        // Columns [NULL, 1, 300, "hi"]: one header-length byte, four
        // one-byte codes, then the 300 payload and the text bytes.
        let bytes = row(&[
            Value::Null,
            Value::Integer(1),
            Value::Integer(300),
            Value::Text("hi".into()),
        ]);
        assert_eq!(bytes, vec![4, 0, 2, 4, 30, 0x01, 0x2C, b'h', b'i']);

        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.col_count().unwrap(), 4);
        // Column 2 decodes without touching the others.
        assert_eq!(r.get(2).unwrap(), Value::Integer(300));
        assert_eq!(r.get(0).unwrap(), Value::Null);
        assert_eq!(r.get(3).unwrap(), Value::Text("hi".into()));
    }

    #[test]
    fn test_integer_widths() {
        for v in [
            0i64,
            1,
            2,
            -1,
            127,
            128,
            -128,
            -129,
            32767,
            32768,
            (1 << 23) - 1,
            1 << 23,
            i64::MAX,
            i64::MIN,
        ] {
            let bytes = row(&[Value::Integer(v)]);
            let r = RowReader::new(&bytes, None).unwrap();
            assert_eq!(r.get(0).unwrap(), Value::Integer(v), "{}", v);
        }
        // 0 and 1 are header-only.
        assert_eq!(row(&[Value::Integer(0)]), vec![1, 1]);
        assert_eq!(row(&[Value::Integer(1)]), vec![1, 2]);
        // -1 takes a single payload byte.
        assert_eq!(row(&[Value::Integer(-1)]), vec![1, 3, 0xFF]);
    }

    #[test]
    fn test_decimal_round_trip() {
        for v in [2.5, -2.5, 0.0, 1.0e100, -7.25e-3, 2.0] {
            let bytes = row(&[Value::Real(v)]);
            let r = RowReader::new(&bytes, None).unwrap();
            // Decimal codes always decode with real affinity.
            assert_eq!(r.get(0).unwrap(), Value::Real(v), "{}", v);
        }
    }

    #[test]
    fn test_decimal_specials() {
        let bytes = row(&[
            Value::Real(f64::NAN),
            Value::Real(f64::INFINITY),
            Value::Real(f64::NEG_INFINITY),
        ]);
        let r = RowReader::new(&bytes, None).unwrap();
        match r.get(0).unwrap() {
            Value::Real(f) => assert!(f.is_nan()),
            other => panic!("expected NaN, got {:?}", other),
        }
        assert_eq!(r.get(1).unwrap(), Value::Real(f64::INFINITY));
        assert_eq!(r.get(2).unwrap(), Value::Real(f64::NEG_INFINITY));
    }

    #[test]
    fn test_text_encoding_prefix() {
        // Ordinary text: no prefix byte.
        assert_eq!(row(&[Value::Text("hi".into())]), vec![1, 30, b'h', b'i']);
        // Leading control byte forces the encoding prefix.
        let bytes = row(&[Value::Text("\u{1}x".into())]);
        assert_eq!(bytes, vec![1, 34, 0, 1, b'x']);
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap(), Value::Text("\u{1}x".into()));
        // Empty text.
        let bytes = row(&[Value::Text(String::new())]);
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap(), Value::Text(String::new()));
    }

    #[test]
    fn test_utf16_text_decodes() {
        // Hand-build a row whose text payload is UTF-16LE "ok".
        let payload = [TEXT_UTF16LE, b'o', 0, b'k', 0];
        let mut bytes = vec![1, (CODE_TEXT + 4 * payload.len() as u64) as u8];
        bytes.extend_from_slice(&payload);
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap(), Value::Text("ok".into()));
    }

    #[test]
    fn test_blob_and_typed_blob() {
        let values = [
            Value::Blob(vec![1, 2, 3]),
            Value::TypedBlob {
                subtype: 9,
                data: vec![0xAA, 0xBB],
            },
        ];
        let bytes = row(&values);
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap(), values[0]);
        assert_eq!(r.get(1).unwrap(), values[1]);
    }

    #[test]
    fn test_in_key_columns() {
        let key = encode_key(
            5,
            &[Value::Integer(77), Value::Text("pk".into())],
            &KeyInfo::ascending(2),
        )
        .unwrap();
        let extra = Value::Text("body".into());
        let cols = [
            Col::InKey {
                field: 0,
                real: false,
            },
            Col::InKey {
                field: 1,
                real: false,
            },
            Col::Val(&extra),
        ];
        let bytes = encode_row(&cols, None).unwrap();

        let r = RowReader::new(&bytes, Some(&key)).unwrap();
        assert_eq!(r.get(0).unwrap(), Value::Integer(77));
        assert_eq!(r.get(1).unwrap(), Value::Text("pk".into()));
        assert_eq!(r.get(2).unwrap(), Value::Text("body".into()));

        // Without a key the in-key column is a misuse.
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap_err().code(), ErrorCode::Misuse);
        // The inline column still decodes.
        assert_eq!(r.get(2).unwrap(), Value::Text("body".into()));
    }

    #[test]
    fn test_in_key_real_affinity() {
        let key = encode_key(5, &[Value::Integer(3)], &KeyInfo::ascending(1)).unwrap();
        let cols = [Col::InKey {
            field: 0,
            real: true,
        }];
        let bytes = encode_row(&cols, None).unwrap();
        let r = RowReader::new(&bytes, Some(&key)).unwrap();
        assert_eq!(r.get(0).unwrap(), Value::Real(3.0));
    }

    #[test]
    fn test_permutation() {
        let a = Value::Integer(10);
        let b = Value::Text("mid".into());
        let c = Value::Integer(30);
        let cols = [Col::Val(&a), Col::Val(&b), Col::Val(&c)];
        let bytes = encode_row(&cols, Some(&[2, 0])).unwrap();
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.col_count().unwrap(), 2);
        assert_eq!(r.get(0).unwrap(), Value::Integer(30));
        assert_eq!(r.get(1).unwrap(), Value::Integer(10));
        assert!(encode_row(&cols, Some(&[5])).is_err());
    }

    #[test]
    fn test_column_out_of_range() {
        let bytes = row(&[Value::Integer(1)]);
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(1).unwrap_err().code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_corrupt_rows() {
        // Header length overruns the row.
        assert_eq!(
            RowReader::new(&[9, 0], None).unwrap_err().code(),
            ErrorCode::Corrupt
        );
        // Declared payload extends past the row end.
        let bytes = vec![1, 7]; // 5-byte integer, no payload
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap_err().code(), ErrorCode::Corrupt);
        // Truncated decimal payload.
        let bytes = vec![1, 13, 6]; // two payload bytes declared, one present
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(0).unwrap_err().code(), ErrorCode::Corrupt);
        // Empty row is fine and has no columns.
        let r = RowReader::new(&[0], None).unwrap();
        assert_eq!(r.col_count().unwrap(), 0);
    }

    #[test]
    fn test_independent_column_access() {
        // Decoding later columns first must not depend on earlier ones.
        let values = [
            Value::Text("aaa".into()),
            Value::Integer(-500),
            Value::Real(0.5),
            Value::Blob(vec![7; 10]),
        ];
        let bytes = row(&values);
        let r = RowReader::new(&bytes, None).unwrap();
        assert_eq!(r.get(3).unwrap(), values[3]);
        assert_eq!(r.get(1).unwrap(), values[1]);
        assert_eq!(r.get(2).unwrap(), values[2]);
        assert_eq!(r.get(0).unwrap(), values[0]);
    }
}
