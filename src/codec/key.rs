//! Order-preserving key codec
//!
//! Encodes a table id and a sequence of typed field values into a byte
//! string whose unsigned lexicographic order agrees with SQL tuple
//! comparison under the requested per-field sort orders and collations.
//! Every field is self-delimiting, so fields can be skipped without being
//! decoded.
//!
//! Each field starts with a single class tag chosen so that tag order
//! matches SQL type order (NULL < numbers < text < blobs). Numbers are
//! normalized to `M * 100^E` with `1/100 <= M < 1` and written as a
//! centi-exponent class plus base-100 mantissa digits; the digit bytes
//! carry a continuation bit so shorter mantissas that share a prefix sort
//! correctly. Descending fields are the bitwise complement of the
//! ascending encoding, tag included.

use crate::codec::collation::Collation;
use crate::codec::varint::{read_varint, varint_len_from_first, write_varint};
use crate::error::{Error, ErrorCode, Result};
use crate::num::Num;
use crate::types::{SortOrder, TableId, Value, ROOT_TABLE};

// ============================================================================
// Class tags (ascending set)
// ============================================================================

pub const TAG_NULL: u8 = 0x05;
pub const TAG_NAN: u8 = 0x06;
pub const TAG_NEG_INF: u8 = 0x07;
pub const TAG_NEG_LARGE: u8 = 0x08;
pub const TAG_NEG_MEDIUM_MIN: u8 = 0x09;
pub const TAG_NEG_MEDIUM_MAX: u8 = 0x13;
pub const TAG_NEG_SMALL: u8 = 0x14;
pub const TAG_ZERO: u8 = 0x15;
pub const TAG_POS_SMALL: u8 = 0x16;
pub const TAG_POS_MEDIUM_MIN: u8 = 0x17;
pub const TAG_POS_MEDIUM_MAX: u8 = 0x21;
pub const TAG_POS_LARGE: u8 = 0x22;
pub const TAG_POS_INF: u8 = 0x23;
pub const TAG_TEXT: u8 = 0x24;
pub const TAG_BLOB: u8 = 0x25;
pub const TAG_FINAL_BLOB: u8 = 0x26;

/// Widest centi-exponent the medium number classes can carry in the tag.
const MEDIUM_MAX_EXP: i32 = 11;

/// Sanity bound on decoded centi-exponents; anything larger is corrupt.
const MAX_CENT_EXP: i64 = 10_000;

// ============================================================================
// KeyInfo
// ============================================================================

/// Sort order and collation for one key field.
#[derive(Debug, Clone, Default)]
pub struct KeyField {
    pub order: SortOrder,
    pub coll: Collation,
}

/// Per-field encoding directives for a whole key. Fields beyond the listed
/// ones default to ascending binary.
#[derive(Debug, Clone, Default)]
pub struct KeyInfo {
    pub fields: Vec<KeyField>,
}

impl KeyInfo {
    /// All-ascending, binary-collated key of `n` fields.
    pub fn ascending(n: usize) -> Self {
        KeyInfo {
            fields: vec![KeyField::default(); n],
        }
    }

    /// Directives for field `i`.
    pub fn field(&self, i: usize) -> KeyField {
        self.fields.get(i).cloned().unwrap_or_default()
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Encode a full key: table-id varint prefix (omitted for the root
/// namespace) followed by each field value.
///
/// The last field of a blob uses the terminal form (raw bytes, no
/// terminator); earlier blobs use the packed self-delimiting form.
pub fn encode_key(table_id: TableId, values: &[Value], info: &KeyInfo) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(16 + values.len() * 8);
    if table_id != ROOT_TABLE {
        write_varint(table_id, &mut out);
    }
    for (i, v) in values.iter().enumerate() {
        let f = info.field(i);
        encode_field(&mut out, v, f.order, &f.coll, i + 1 == values.len())?;
    }
    Ok(out)
}

/// Encode a single field and append it to `out`.
///
/// `terminal_ok` permits the terminal (to-end-of-key) blob form; it must
/// only be set for the final field of a key.
pub fn encode_field(
    out: &mut Vec<u8>,
    value: &Value,
    order: SortOrder,
    coll: &Collation,
    terminal_ok: bool,
) -> Result<()> {
    let start = out.len();
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Integer(v) => encode_num(out, &Num::from_i64(*v)),
        Value::Real(v) => encode_num(out, &Num::from_f64(*v)),
        Value::Text(s) => {
            out.push(TAG_TEXT);
            escape_bytes(&coll.sort_key(s), out);
            out.push(0x00);
        }
        Value::Blob(b) | Value::TypedBlob { data: b, .. } => {
            if terminal_ok {
                out.push(TAG_FINAL_BLOB);
                out.extend_from_slice(b);
            } else {
                out.push(TAG_BLOB);
                pack7(b, out);
                out.push(0x00);
            }
        }
    }
    if order.is_desc() {
        for byte in &mut out[start..] {
            *byte = !*byte;
        }
    }
    Ok(())
}

/// Encode a decimal number in its ascending form.
fn encode_num(out: &mut Vec<u8>, num: &Num) {
    if num.is_nan() {
        out.push(TAG_NAN);
        return;
    }
    if num.is_inf() {
        out.push(if num.is_negative() {
            TAG_NEG_INF
        } else {
            TAG_POS_INF
        });
        return;
    }
    if num.is_zero() {
        out.push(TAG_ZERO);
        return;
    }

    let neg = num.is_negative();
    let (e_cent, digits) = centimal_digits(num.mantissa(), num.exponent() as i32);

    if e_cent > MEDIUM_MAX_EXP {
        // Large magnitude: explicit centi-exponent varint.
        out.push(if neg { TAG_NEG_LARGE } else { TAG_POS_LARGE });
        push_varint_inverted(out, e_cent as u64, neg);
    } else if e_cent >= 1 {
        // Medium magnitude: centi-exponent folded into the tag.
        out.push(if neg {
            TAG_NEG_SMALL - e_cent as u8
        } else {
            TAG_POS_SMALL + e_cent as u8
        });
    } else {
        // Small magnitude (|V| < 1): centi-exponent stored negated; the
        // inversion pattern flips between signs so byte order tracks
        // value order.
        out.push(if neg { TAG_NEG_SMALL } else { TAG_POS_SMALL });
        push_varint_inverted(out, (-e_cent) as u64, !neg);
    }

    let last = digits.len() - 1;
    for (i, &g) in digits.iter().enumerate() {
        let mut byte = g * 2 + if i < last { 1 } else { 0 };
        if neg {
            byte = !byte;
        }
        out.push(byte);
    }
}

/// Normalize a nonzero decimal `m * 10^e` into a centi-exponent and
/// base-100 mantissa digits with the first digit nonzero.
fn centimal_digits(mut m: u64, mut e: i32) -> (i32, Vec<u8>) {
    debug_assert!(m != 0);
    while m % 10 == 0 {
        m /= 10;
        e += 1;
    }
    let mut dec = Vec::with_capacity(20);
    {
        let mut v = m;
        while v != 0 {
            dec.push((v % 10) as u8);
            v /= 10;
        }
        dec.reverse();
    }
    let p = dec.len() as i32 + e;
    let e_cent = if p % 2 == 0 { p / 2 } else { (p + 1) / 2 };

    let mut digits = Vec::with_capacity(dec.len() / 2 + 1);
    let mut iter: Box<dyn Iterator<Item = u8>> = if p % 2 == 0 {
        Box::new(dec.into_iter())
    } else {
        Box::new(std::iter::once(0).chain(dec))
    };
    loop {
        match (iter.next(), iter.next()) {
            (Some(hi), Some(lo)) => digits.push(hi * 10 + lo),
            (Some(hi), None) => {
                digits.push(hi * 10);
                break;
            }
            _ => break,
        }
    }
    (e_cent, digits)
}

/// Append a varint, complementing every byte when `invert` is set.
fn push_varint_inverted(out: &mut Vec<u8>, value: u64, invert: bool) {
    let start = out.len();
    write_varint(value, out);
    if invert {
        for byte in &mut out[start..] {
            *byte = !*byte;
        }
    }
}

/// Escape text-body bytes so the escaped stream contains neither 0x00 nor
/// 0x01 outside escape pairs. The transform preserves unsigned byte order
/// and keeps both terminators (0x00 ascending, 0xFF descending)
/// unambiguous for arbitrary input.
fn escape_bytes(data: &[u8], out: &mut Vec<u8>) {
    for &b in data {
        match b {
            0x00 => out.extend_from_slice(&[0x01, 0x01]),
            0x01 => out.extend_from_slice(&[0x01, 0x02]),
            _ => out.push(b),
        }
    }
}

/// Expand blob bytes into 7-bit groups, each emitted with the high bit
/// set so no payload byte can equal the 0x00 terminator.
fn pack7(data: &[u8], out: &mut Vec<u8>) {
    let mut acc: u32 = 0;
    let mut nbits: u32 = 0;
    for &b in data {
        acc = (acc << 8) | b as u32;
        nbits += 8;
        while nbits >= 7 {
            out.push(0x80 | ((acc >> (nbits - 7)) & 0x7F) as u8);
            nbits -= 7;
        }
    }
    if nbits > 0 {
        out.push(0x80 | ((acc << (7 - nbits)) & 0x7F) as u8);
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Decode a full key into its table id and field values.
pub fn decode_key(key: &[u8]) -> Result<(TableId, Vec<Value>)> {
    let (table_id, n) = read_varint(key, 0)?;
    let mut reader = KeyReader::at(key, n);
    let mut values = Vec::new();
    while !reader.at_end() {
        values.push(reader.read_field()?);
    }
    Ok((table_id, values))
}

/// Length in bytes of the table-id prefix plus the first `n_fields`
/// fields, computed without decoding any payload.
pub fn short_key(key: &[u8], n_fields: usize) -> Result<usize> {
    let (_, n) = read_varint(key, 0)?;
    let mut reader = KeyReader::at(key, n);
    for _ in 0..n_fields {
        reader.skip_field()?;
    }
    Ok(reader.pos())
}

/// Field-at-a-time reader over an encoded key.
pub struct KeyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> KeyReader<'a> {
    /// Reader positioned after the table-id prefix.
    pub fn new(key: &'a [u8]) -> Result<(TableId, KeyReader<'a>)> {
        let (table_id, n) = read_varint(key, 0)?;
        Ok((table_id, KeyReader::at(key, n)))
    }

    /// Reader over a prefix-free (root namespace) key.
    pub fn flat(key: &'a [u8]) -> KeyReader<'a> {
        KeyReader::at(key, 0)
    }

    fn at(key: &'a [u8], pos: usize) -> KeyReader<'a> {
        KeyReader { buf: key, pos }
    }

    /// Current byte offset.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// True when no fields remain.
    pub fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Decode the field at index `i` (counted from the start of the
    /// fields), without disturbing this reader.
    pub fn field_at(&self, i: usize) -> Result<Value> {
        let mut r = KeyReader::at(self.buf, self.pos);
        for _ in 0..i {
            r.skip_field()?;
        }
        r.read_field()
    }

    fn take(&mut self, invert: bool) -> Result<u8> {
        let b = *self
            .buf
            .get(self.pos)
            .ok_or_else(|| Error::new(ErrorCode::Corrupt))?;
        self.pos += 1;
        Ok(if invert { !b } else { b })
    }

    fn peek(&self, invert: bool) -> Option<u8> {
        self.buf.get(self.pos).map(|&b| if invert { !b } else { b })
    }

    /// Read a varint whose bytes may be stored complemented.
    fn read_varint_inv(&mut self, invert: bool) -> Result<u64> {
        let first = self.peek(invert).ok_or_else(|| Error::new(ErrorCode::Corrupt))?;
        let len = varint_len_from_first(first);
        if self.pos + len > self.buf.len() {
            return Err(Error::new(ErrorCode::Corrupt));
        }
        let mut tmp = [0u8; 9];
        for (i, slot) in tmp[..len].iter_mut().enumerate() {
            let b = self.buf[self.pos + i];
            *slot = if invert { !b } else { b };
        }
        self.pos += len;
        let (v, _) = read_varint(&tmp[..len], 0)?;
        Ok(v)
    }

    /// Resolve the field's class tag and direction.
    fn read_tag(&mut self) -> Result<(u8, bool)> {
        let raw = self.take(false)?;
        if (TAG_NULL..=TAG_FINAL_BLOB).contains(&raw) {
            Ok((raw, false))
        } else if (TAG_NULL..=TAG_FINAL_BLOB).contains(&!raw) {
            Ok((!raw, true))
        } else {
            Err(Error::with_message(
                ErrorCode::Corrupt,
                format!("unknown key tag 0x{:02x}", raw),
            ))
        }
    }

    /// Decode the next field.
    pub fn read_field(&mut self) -> Result<Value> {
        let (tag, inv) = self.read_tag()?;
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_NAN => Ok(Value::Real(f64::NAN)),
            TAG_NEG_INF => Ok(Value::Real(f64::NEG_INFINITY)),
            TAG_POS_INF => Ok(Value::Real(f64::INFINITY)),
            TAG_ZERO => Ok(Value::Integer(0)),
            TAG_TEXT => self.read_text(inv),
            TAG_BLOB => self.read_blob(inv),
            TAG_FINAL_BLOB => {
                let mut data = self.buf[self.pos..].to_vec();
                self.pos = self.buf.len();
                if inv {
                    for b in &mut data {
                        *b = !*b;
                    }
                }
                Ok(Value::Blob(data))
            }
            _ => self.read_num(tag, inv),
        }
    }

    /// Skip the next field without decoding its payload.
    pub fn skip_field(&mut self) -> Result<()> {
        let (tag, inv) = self.read_tag()?;
        match tag {
            TAG_NULL | TAG_NAN | TAG_NEG_INF | TAG_POS_INF | TAG_ZERO => Ok(()),
            TAG_TEXT => {
                while self.take(inv)? != 0x00 {}
                Ok(())
            }
            TAG_BLOB => {
                while self.take(inv)? & 0x80 != 0 {}
                Ok(())
            }
            TAG_FINAL_BLOB => {
                self.pos = self.buf.len();
                Ok(())
            }
            TAG_NEG_LARGE => {
                self.read_varint_inv(!inv)?;
                self.skip_mantissa(!inv)
            }
            TAG_NEG_SMALL => {
                self.read_varint_inv(inv)?;
                self.skip_mantissa(!inv)
            }
            TAG_POS_SMALL => {
                self.read_varint_inv(!inv)?;
                self.skip_mantissa(inv)
            }
            TAG_POS_LARGE => {
                self.read_varint_inv(inv)?;
                self.skip_mantissa(inv)
            }
            t if (TAG_NEG_MEDIUM_MIN..=TAG_NEG_MEDIUM_MAX).contains(&t) => {
                self.skip_mantissa(!inv)
            }
            t if (TAG_POS_MEDIUM_MIN..=TAG_POS_MEDIUM_MAX).contains(&t) => self.skip_mantissa(inv),
            _ => Err(Error::new(ErrorCode::Corrupt)),
        }
    }

    /// Scan mantissa digit bytes: the continuation bit is clear on the
    /// last digit of a plain stream, set on the last of a complemented one.
    fn skip_mantissa(&mut self, invert: bool) -> Result<()> {
        loop {
            let b = self.take(invert)?;
            if b & 0x01 == 0 {
                return Ok(());
            }
        }
    }

    fn read_text(&mut self, inv: bool) -> Result<Value> {
        let mut bytes = Vec::new();
        loop {
            let b = self.take(inv)?;
            match b {
                0x00 => break,
                0x01 => match self.take(inv)? {
                    0x01 => bytes.push(0x00),
                    0x02 => bytes.push(0x01),
                    _ => return Err(Error::new(ErrorCode::Corrupt)),
                },
                _ => bytes.push(b),
            }
        }
        String::from_utf8(bytes)
            .map(Value::Text)
            .map_err(|_| Error::with_message(ErrorCode::Corrupt, "key text is not utf-8"))
    }

    fn read_blob(&mut self, inv: bool) -> Result<Value> {
        let mut groups = Vec::new();
        loop {
            let b = self.take(inv)?;
            if b & 0x80 == 0 {
                if b != 0x00 {
                    return Err(Error::new(ErrorCode::Corrupt));
                }
                break;
            }
            groups.push(b & 0x7F);
        }
        let nbytes = groups.len() * 7 / 8;
        let mut out = Vec::with_capacity(nbytes);
        let mut acc: u32 = 0;
        let mut nbits: u32 = 0;
        for g in groups {
            acc = (acc << 7) | g as u32;
            nbits += 7;
            if nbits >= 8 {
                out.push((acc >> (nbits - 8)) as u8);
                nbits -= 8;
            }
        }
        out.truncate(nbytes);
        Ok(Value::Blob(out))
    }

    fn read_num(&mut self, tag: u8, inv: bool) -> Result<Value> {
        let neg;
        let e_cent: i64;
        match tag {
            TAG_NEG_LARGE => {
                neg = true;
                e_cent = self.read_varint_inv(!inv)? as i64;
            }
            TAG_NEG_SMALL => {
                neg = true;
                e_cent = -(self.read_varint_inv(inv)? as i64);
            }
            TAG_POS_SMALL => {
                neg = false;
                e_cent = -(self.read_varint_inv(!inv)? as i64);
            }
            TAG_POS_LARGE => {
                neg = false;
                e_cent = self.read_varint_inv(inv)? as i64;
            }
            t if (TAG_NEG_MEDIUM_MIN..=TAG_NEG_MEDIUM_MAX).contains(&t) => {
                neg = true;
                e_cent = (TAG_NEG_SMALL - t) as i64;
            }
            t if (TAG_POS_MEDIUM_MIN..=TAG_POS_MEDIUM_MAX).contains(&t) => {
                neg = false;
                e_cent = (t - TAG_POS_SMALL) as i64;
            }
            _ => return Err(Error::new(ErrorCode::Corrupt)),
        }
        if e_cent.abs() > MAX_CENT_EXP {
            return Err(Error::new(ErrorCode::Corrupt));
        }

        let digit_inv = inv != neg;
        let mut m: u128 = 0;
        let mut npairs: i64 = 0;
        loop {
            let b = self.take(digit_inv)?;
            let g = (b >> 1) as u128;
            if g > 99 {
                return Err(Error::new(ErrorCode::Corrupt));
            }
            if m <= (u128::MAX - 99) / 100 {
                m = m * 100 + g;
            } else {
                return Err(Error::new(ErrorCode::Corrupt));
            }
            npairs += 1;
            if b & 0x01 == 0 {
                break;
            }
        }
        if m == 0 {
            return Err(Error::new(ErrorCode::Corrupt));
        }

        let mut e10 = 2 * (e_cent - npairs);
        let mut approx = false;
        while m > u64::MAX as u128 {
            if m % 10 != 0 {
                approx = true;
            }
            m /= 10;
            e10 += 1;
        }
        if !(-(i16::MAX as i64)..=i16::MAX as i64).contains(&e10) {
            return Err(Error::new(ErrorCode::Corrupt));
        }
        let num = Num::from_parts(neg, approx, e10 as i16, m as u64);
        Ok(num_to_value(num))
    }
}

/// Surface a decoded numeric with integer affinity when exact, real
/// affinity otherwise.
pub(crate) fn num_to_value(num: Num) -> Value {
    if !num.is_approx() && num.is_integral() {
        let (v, lossy) = num.to_i64();
        if !lossy {
            return Value::Integer(v);
        }
    }
    Value::Real(num.to_f64())
}

// ============================================================================
// Tests
// ============================================================================
