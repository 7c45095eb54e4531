//! Decimal numeric model
//!
//! A `Num` is a decimal scalar `(-1)^sign * m * 10^e` with a 64-bit mantissa
//! and a 16-bit exponent, plus an `approx` bit recording whether the value is
//! an exact integer or a best-effort real. This is the numeric type the key
//! and row codecs preserve; it is deliberately independent of IEEE binary
//! floating point so that stored ordering matches SQL numeric ordering.
//!
//! Reserved encodings:
//! - `m == 0, e != 1000` is zero
//! - `m == 0, e == 1000` is NaN
//! - `m == 1, e == 1000` is +/- infinity (sign selects)

use std::cmp::Ordering;

use bitflags::bitflags;

// ============================================================================
// Constants
// ============================================================================

/// Exponent value reserved for NaN and infinities.
const SPECIAL_EXP: i16 = 1000;

/// Largest exponent magnitude for finite values. Values that normalize
/// outside this band overflow to infinity or underflow to zero.
const MAX_EXP: i32 = 999;

/// Maximum significant decimal digits carried by arithmetic.
const MAX_DIGITS: u32 = 18;

bitflags! {
    /// Flags controlling text-to-number parsing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NumParseFlags: u32 {
        /// Skip leading and trailing whitespace.
        const IGNORE_WHITESPACE = 0x01;
        /// Stop at the first non-numeric character instead of failing.
        const PREFIX_ONLY       = 0x02;
        /// Reject fractional parts and exponents.
        const INTEGER_ONLY      = 0x04;
        /// Input is UTF-16 little-endian.
        const UTF16LE           = 0x08;
        /// Input is UTF-16 big-endian.
        const UTF16BE           = 0x10;
    }
}

// ============================================================================
// Num
// ============================================================================

/// Decimal scalar value.
///
/// Equality derived here is structural; use [`Num::compare`] for semantic
/// comparison (`5e1` and `50e0` compare equal but are distinct structures).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Num {
    sign: bool,
    approx: bool,
    e: i16,
    m: u64,
}

/// Zero constant.
pub const ZERO: Num = Num {
    sign: false,
    approx: false,
    e: 0,
    m: 0,
};

/// Not-a-number constant.
pub const NAN: Num = Num {
    sign: false,
    approx: false,
    e: SPECIAL_EXP,
    m: 0,
};

/// Positive infinity constant.
pub const INF: Num = Num {
    sign: false,
    approx: false,
    e: SPECIAL_EXP,
    m: 1,
};

/// Negative infinity constant.
pub const NEG_INF: Num = Num {
    sign: true,
    approx: false,
    e: SPECIAL_EXP,
    m: 1,
};

impl Num {
    // ========================================================================
    // Construction
    // ========================================================================

    /// Build a `Num` from raw parts. The reserved encodings are taken at
    /// face value; finite exponents outside the legal band saturate.
    pub fn from_parts(sign: bool, approx: bool, e: i16, m: u64) -> Num {
        if e == SPECIAL_EXP {
            return match m {
                0 => NAN,
                _ => {
                    if sign {
                        NEG_INF
                    } else {
                        INF
                    }
                }
            };
        }
        if m == 0 {
            return ZERO;
        }
        normalize(sign, approx, e as i32, m)
    }

    /// Exact integer conversion.
    pub fn from_i64(v: i64) -> Num {
        if v == 0 {
            return ZERO;
        }
        Num {
            sign: v < 0,
            approx: false,
            e: 0,
            m: v.unsigned_abs(),
        }
    }

    /// Exact 32-bit integer conversion.
    pub fn from_i32(v: i32) -> Num {
        Num::from_i64(v as i64)
    }

    /// Convert a binary double. Integral doubles in i64 range convert
    /// exactly; everything else goes through the shortest decimal
    /// representation and is marked approximate.
    pub fn from_f64(v: f64) -> Num {
        if v.is_nan() {
            return NAN;
        }
        if v.is_infinite() {
            return if v < 0.0 { NEG_INF } else { INF };
        }
        if v == 0.0 {
            return ZERO;
        }
        if v.fract() == 0.0 && v >= -9.007199254740992e15 && v <= 9.007199254740992e15 {
            // Exactly representable integer within the 2^53 lattice.
            return Num::from_i64(v as i64);
        }
        let text = format!("{:e}", v);
        let (mut num, _) = Num::from_text(text.as_bytes(), NumParseFlags::empty());
        num.approx = true;
        num
    }

    /// Parse text into a number.
    ///
    /// Returns the parsed value and a flag that is true iff a fractional
    /// part or exponent was seen. Unrecognized input yields NaN, not an
    /// error.
    pub fn from_text(input: &[u8], flags: NumParseFlags) -> (Num, bool) {
        let buf;
        let bytes: &[u8] = if flags.intersects(NumParseFlags::UTF16LE | NumParseFlags::UTF16BE) {
            buf = utf16_to_bytes(input, flags.contains(NumParseFlags::UTF16BE));
            &buf
        } else {
            input
        };

        let mut i = 0usize;
        let n = bytes.len();

        if flags.contains(NumParseFlags::IGNORE_WHITESPACE) {
            while i < n && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
        }

        let mut sign = false;
        if i < n && (bytes[i] == b'+' || bytes[i] == b'-') {
            sign = bytes[i] == b'-';
            i += 1;
        }

        let mut m: u64 = 0;
        let mut e: i32 = 0;
        let mut approx = false;
        let mut seen_digit = false;
        let mut is_real = false;

        // Integer part
        while i < n && bytes[i].is_ascii_digit() {
            let d = (bytes[i] - b'0') as u64;
            if m <= (u64::MAX - 9) / 10 {
                m = m * 10 + d;
            } else {
                e += 1;
                if d != 0 {
                    approx = true;
                }
            }
            seen_digit = true;
            i += 1;
        }

        // Fractional part
        if i < n && bytes[i] == b'.' && !flags.contains(NumParseFlags::INTEGER_ONLY) {
            i += 1;
            is_real = true;
            while i < n && bytes[i].is_ascii_digit() {
                let d = (bytes[i] - b'0') as u64;
                if m <= (u64::MAX - 9) / 10 {
                    m = m * 10 + d;
                    e -= 1;
                } else if d != 0 {
                    approx = true;
                }
                seen_digit = true;
                i += 1;
            }
        }

        // Exponent
        if i < n
            && (bytes[i] == b'e' || bytes[i] == b'E')
            && !flags.contains(NumParseFlags::INTEGER_ONLY)
        {
            let mark = i;
            i += 1;
            let mut exp_sign = false;
            if i < n && (bytes[i] == b'+' || bytes[i] == b'-') {
                exp_sign = bytes[i] == b'-';
                i += 1;
            }
            if i < n && bytes[i].is_ascii_digit() {
                let mut exp: i32 = 0;
                while i < n && bytes[i].is_ascii_digit() {
                    if exp < 100_000 {
                        exp = exp * 10 + (bytes[i] - b'0') as i32;
                    }
                    i += 1;
                }
                e += if exp_sign { -exp } else { exp };
                is_real = true;
            } else {
                // "12e" or "12e+" with no digits: the exponent is not part
                // of the number.
                i = mark;
            }
        }

        if flags.contains(NumParseFlags::IGNORE_WHITESPACE) {
            while i < n && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
        }

        if !seen_digit {
            return (NAN, false);
        }
        if i < n && !flags.contains(NumParseFlags::PREFIX_ONLY) {
            return (NAN, false);
        }

        if m == 0 {
            return (ZERO, is_real);
        }
        (normalize(sign, approx, e, m), is_real)
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// True iff this is NaN.
    pub fn is_nan(&self) -> bool {
        self.e == SPECIAL_EXP && self.m == 0
    }

    /// True iff this is +infinity or -infinity.
    pub fn is_inf(&self) -> bool {
        self.e == SPECIAL_EXP && self.m != 0
    }

    /// True iff this is zero.
    pub fn is_zero(&self) -> bool {
        self.m == 0 && self.e != SPECIAL_EXP
    }

    /// True iff the value is finite (not NaN, not infinite).
    pub fn is_finite(&self) -> bool {
        self.e != SPECIAL_EXP
    }

    /// True for negative values (including -infinity).
    pub fn is_negative(&self) -> bool {
        self.sign && !self.is_nan() && !self.is_zero()
    }

    /// True iff the value was derived from an inexact source or lost
    /// digits along the way.
    pub fn is_approx(&self) -> bool {
        self.approx
    }

    /// True iff the value is finite and mathematically an integer.
    pub fn is_integral(&self) -> bool {
        if !self.is_finite() {
            return false;
        }
        if self.m == 0 || self.e >= 0 {
            return true;
        }
        let shift = -(self.e as i32);
        if shift > 19 {
            return false;
        }
        self.m % 10u64.pow(shift as u32) == 0
    }

    /// Raw mantissa.
    pub fn mantissa(&self) -> u64 {
        self.m
    }

    /// Raw exponent.
    pub fn exponent(&self) -> i16 {
        self.e
    }

    // ========================================================================
    // Conversions
    // ========================================================================

    /// Convert to i64, truncating toward zero. The second element is true
    /// when the conversion lost information (fraction, range clamp, NaN).
    pub fn to_i64(&self) -> (i64, bool) {
        if self.is_nan() {
            return (0, true);
        }
        if self.is_inf() {
            return (if self.sign { i64::MIN } else { i64::MAX }, true);
        }
        if self.m == 0 {
            return (0, false);
        }

        let mut lossy = false;
        let mag: u128;
        if self.e >= 0 {
            if self.e as u32 > 38 {
                return (if self.sign { i64::MIN } else { i64::MAX }, true);
            }
            match (self.m as u128).checked_mul(10u128.pow(self.e as u32)) {
                Some(v) => mag = v,
                None => return (if self.sign { i64::MIN } else { i64::MAX }, true),
            }
        } else {
            let shift = -(self.e as i32) as u32;
            if shift > 19 {
                return (0, true);
            }
            let div = 10u128.pow(shift);
            let m = self.m as u128;
            if m % div != 0 {
                lossy = true;
            }
            mag = m / div;
        }

        let limit: u128 = if self.sign { 1u128 << 63 } else { (1u128 << 63) - 1 };
        if mag > limit {
            return (if self.sign { i64::MIN } else { i64::MAX }, true);
        }
        let v = if self.sign {
            (mag as i128).wrapping_neg() as i64
        } else {
            mag as i64
        };
        (v, lossy)
    }

    /// Convert to i32, truncating toward zero, clamping out-of-range.
    pub fn to_i32(&self) -> (i32, bool) {
        let (v, lossy) = self.to_i64();
        if v > i32::MAX as i64 {
            (i32::MAX, true)
        } else if v < i32::MIN as i64 {
            (i32::MIN, true)
        } else {
            (v as i32, lossy)
        }
    }

    /// Convert to the nearest binary double.
    pub fn to_f64(&self) -> f64 {
        if self.is_nan() {
            return f64::NAN;
        }
        if self.is_inf() {
            return if self.sign {
                f64::NEG_INFINITY
            } else {
                f64::INFINITY
            };
        }
        if self.m == 0 {
            return 0.0;
        }
        // Route through the decimal string so the conversion is correctly
        // rounded; f64's FromStr guarantees that.
        let text = format!("{}e{}", self.m, self.e);
        let v: f64 = text.parse().unwrap_or(f64::INFINITY);
        if self.sign {
            -v
        } else {
            v
        }
    }

    /// Render as text. Finite values use plain decimal notation when the
    /// leading digit's power of ten is in [-6, 17], scientific notation
    /// otherwise.
    pub fn to_text(&self) -> String {
        if self.is_nan() {
            return "NaN".to_string();
        }
        if self.is_inf() {
            return if self.sign { "-inf" } else { "inf" }.to_string();
        }
        if self.m == 0 {
            return "0".to_string();
        }

        let (mut m, mut e) = (self.m, self.e as i32);
        while m % 10 == 0 {
            m /= 10;
            e += 1;
        }
        let digits = m.to_string();
        let n = digits.len() as i32;
        let point = n - 1 + e;

        let mut out = String::new();
        if self.sign {
            out.push('-');
        }

        if (-6..=17).contains(&point) {
            if e >= 0 {
                out.push_str(&digits);
                for _ in 0..e {
                    out.push('0');
                }
            } else if n + e > 0 {
                let split = (n + e) as usize;
                out.push_str(&digits[..split]);
                out.push('.');
                out.push_str(&digits[split..]);
            } else {
                out.push_str("0.");
                for _ in 0..-(n + e) {
                    out.push('0');
                }
                out.push_str(&digits);
            }
        } else {
            out.push_str(&digits[..1]);
            if digits.len() > 1 {
                out.push('.');
                out.push_str(&digits[1..]);
            }
            out.push_str(&format!("e{:+}", point));
        }
        out
    }

    // ========================================================================
    // Arithmetic
    // ========================================================================

    /// Negation. NaN stays NaN, zero stays zero.
    pub fn neg(&self) -> Num {
        if self.is_nan() || self.is_zero() {
            return *self;
        }
        let mut out = *self;
        out.sign = !out.sign;
        out
    }

    /// Addition on the decimal representation.
    pub fn add(a: Num, b: Num) -> Num {
        if a.is_nan() || b.is_nan() {
            return NAN;
        }
        if a.is_inf() || b.is_inf() {
            return match (a.is_inf(), b.is_inf()) {
                (true, true) if a.sign != b.sign => NAN,
                (true, _) => a,
                _ => b,
            };
        }
        if a.is_zero() {
            return b;
        }
        if b.is_zero() {
            return a;
        }

        let mut approx = a.approx || b.approx;
        let (mut m1, mut e1) = (a.m, a.e as i32);
        let (mut m2, mut e2) = (b.m, b.e as i32);

        // Align exponents: prefer growing the larger-exponent mantissa,
        // fall back to dropping digits from the other side.
        while e1 != e2 {
            if e1 > e2 {
                if m1 <= u64::MAX / 10 {
                    m1 *= 10;
                    e1 -= 1;
                } else {
                    if m2 % 10 != 0 {
                        approx = true;
                    }
                    m2 /= 10;
                    e2 += 1;
                    if m2 == 0 {
                        break;
                    }
                }
            } else if m2 <= u64::MAX / 10 {
                m2 *= 10;
                e2 -= 1;
            } else {
                if m1 % 10 != 0 {
                    approx = true;
                }
                m1 /= 10;
                e1 += 1;
                if m1 == 0 {
                    break;
                }
            }
        }
        let e = e1.max(e2);

        if a.sign == b.sign {
            let mut sum = m1 as u128 + m2 as u128;
            let mut e = e;
            if sum > u64::MAX as u128 {
                if sum % 10 != 0 {
                    approx = true;
                }
                sum /= 10;
                e += 1;
            }
            return normalize(a.sign, approx, e, sum as u64);
        }

        match m1.cmp(&m2) {
            Ordering::Equal => ZERO,
            Ordering::Greater => normalize(a.sign, approx, e, m1 - m2),
            Ordering::Less => normalize(b.sign, approx, e, m2 - m1),
        }
    }

    /// Subtraction.
    pub fn sub(a: Num, b: Num) -> Num {
        Num::add(a, b.neg())
    }

    /// Multiplication: mantissas multiply, exponents add; overflowing
    /// digits are shed and mark the result approximate.
    pub fn mul(a: Num, b: Num) -> Num {
        if a.is_nan() || b.is_nan() {
            return NAN;
        }
        if a.is_inf() || b.is_inf() {
            if a.is_zero() || b.is_zero() {
                return NAN;
            }
            return if a.sign != b.sign { NEG_INF } else { INF };
        }
        if a.is_zero() || b.is_zero() {
            return ZERO;
        }

        let mut approx = a.approx || b.approx;
        let mut p = a.m as u128 * b.m as u128;
        let mut e = a.e as i32 + b.e as i32;
        while p > u64::MAX as u128 {
            if p % 10 != 0 {
                approx = true;
            }
            p /= 10;
            e += 1;
        }
        normalize(a.sign != b.sign, approx, e, p as u64)
    }

    /// Long division yielding up to 18 significant digits; a nonzero
    /// remainder marks the result approximate.
    pub fn div(a: Num, b: Num) -> Num {
        if a.is_nan() || b.is_nan() {
            return NAN;
        }
        if a.is_inf() {
            if b.is_inf() {
                return NAN;
            }
            return if a.sign != b.is_negative() { NEG_INF } else { INF };
        }
        if b.is_inf() {
            return ZERO;
        }
        if b.is_zero() {
            if a.is_zero() {
                return NAN;
            }
            return if a.sign { NEG_INF } else { INF };
        }
        if a.is_zero() {
            return ZERO;
        }

        let den = b.m as u128;
        let mut n = a.m as u128;
        let mut e = a.e as i32 - b.e as i32;
        while n < den {
            n *= 10;
            e -= 1;
        }
        let limit = 10u128.pow(MAX_DIGITS - 1);
        while n % den != 0 && n / den < limit && n <= u128::MAX / 10 {
            n *= 10;
            e -= 1;
        }
        let mut q = n / den;
        let mut approx = a.approx || b.approx || n % den != 0;
        while q > u64::MAX as u128 {
            if q % 10 != 0 {
                approx = true;
            }
            q /= 10;
            e += 1;
        }
        normalize(a.sign != b.sign, approx, e, q as u64)
    }

    // ========================================================================
    // Comparison
    // ========================================================================

    /// Semantic comparison. Returns `None` when either operand is NaN; the
    /// storage codec separately maps NaN to a fixed lowest slot so that the
    /// on-disk ordering stays total.
    pub fn compare(a: &Num, b: &Num) -> Option<Ordering> {
        if a.is_nan() || b.is_nan() {
            return None;
        }
        // Infinities are the extremes.
        if a.is_inf() || b.is_inf() {
            let rank = |x: &Num| {
                if x.is_inf() {
                    if x.sign {
                        -1i32
                    } else {
                        1
                    }
                } else {
                    0
                }
            };
            let (ra, rb) = (rank(a), rank(b));
            if ra != rb {
                return Some(ra.cmp(&rb));
            }
            if ra != 0 {
                return Some(Ordering::Equal);
            }
        }
        if a.is_zero() || b.is_zero() {
            let rank = |x: &Num| {
                if x.is_zero() {
                    0i32
                } else if x.sign {
                    -1
                } else {
                    1
                }
            };
            return Some(rank(a).cmp(&rank(b)));
        }
        if a.sign != b.sign {
            return Some(if a.sign {
                Ordering::Less
            } else {
                Ordering::Greater
            });
        }
        let mag = compare_magnitude(a.m, a.e as i32, b.m, b.e as i32);
        Some(if a.sign { mag.reverse() } else { mag })
    }
}

// ============================================================================
// Internal helpers
// ============================================================================

/// Bring a finite nonzero value into the legal exponent band.
fn normalize(sign: bool, mut approx: bool, mut e: i32, mut m: u64) -> Num {
    if m == 0 {
        return ZERO;
    }
    // Fold trailing zero digits into the exponent first.
    while m % 10 == 0 && e < MAX_EXP {
        m /= 10;
        e += 1;
    }
    while e > MAX_EXP {
        if m > u64::MAX / 10 {
            // Cannot widen further; the value is out of range.
            return if sign { NEG_INF } else { INF };
        }
        m *= 10;
        e -= 1;
    }
    while e < -MAX_EXP {
        if m % 10 != 0 {
            approx = true;
        }
        m /= 10;
        e += 1;
        if m == 0 {
            return Num {
                sign: false,
                approx: true,
                e: 0,
                m: 0,
            };
        }
    }
    Num {
        sign,
        approx,
        e: e as i16,
        m,
    }
}

/// Compare magnitudes of two finite nonzero values.
fn compare_magnitude(m1: u64, e1: i32, m2: u64, e2: i32) -> Ordering {
    let d1 = dec_digits(m1) as i32;
    let d2 = dec_digits(m2) as i32;
    let p1 = d1 + e1;
    let p2 = d2 + e2;
    if p1 != p2 {
        return p1.cmp(&p2);
    }
    // Same leading power of ten: widen the shorter mantissa and compare.
    let (mut a, mut b) = (m1 as u128, m2 as u128);
    if d1 < d2 {
        a *= 10u128.pow((d2 - d1) as u32);
    } else if d2 < d1 {
        b *= 10u128.pow((d1 - d2) as u32);
    }
    a.cmp(&b)
}

/// Number of decimal digits in a nonzero u64.
fn dec_digits(mut m: u64) -> u32 {
    let mut n = 0;
    while m != 0 {
        m /= 10;
        n += 1;
    }
    n
}

/// Flatten UTF-16 input to bytes; non-Latin-1 units become a sentinel
/// that no numeric character matches.
fn utf16_to_bytes(input: &[u8], big_endian: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len() / 2);
    let mut i = 0;
    while i + 1 < input.len() {
        let (lo, hi) = if big_endian {
            (input[i + 1], input[i])
        } else {
            (input[i], input[i + 1])
        };
        out.push(if hi == 0 { lo } else { 0xFF });
        i += 2;
    }
    out
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Num {
        Num::from_text(s.as_bytes(), NumParseFlags::empty()).0
    }

    #[test]
    fn test_from_i64() {
        assert!(Num::from_i64(0).is_zero());
        let n = Num::from_i64(-42);
        assert!(n.is_negative());
        assert_eq!(n.to_i64(), (-42, false));
        assert_eq!(Num::from_i64(i64::MIN).to_i64(), (i64::MIN, false));
        assert_eq!(Num::from_i64(i64::MAX).to_i64(), (i64::MAX, false));
    }

    #[test]
    fn test_parse_basic() {
        assert_eq!(parse("123").to_i64(), (123, false));
        assert_eq!(parse("-17").to_i64(), (-17, false));
        assert_eq!(parse("+9").to_i64(), (9, false));
        assert!(parse("").is_nan());
        assert!(parse("abc").is_nan());
        assert!(parse("12x").is_nan());
    }

    #[test]
    fn test_parse_real_flag() {
        let (_, real) = Num::from_text(b"12", NumParseFlags::empty());
        assert!(!real);
        let (_, real) = Num::from_text(b"12.5", NumParseFlags::empty());
        assert!(real);
        let (_, real) = Num::from_text(b"12e3", NumParseFlags::empty());
        assert!(real);
    }

    #[test]
    fn test_parse_flags() {
        let (n, _) = Num::from_text(b"  42  ", NumParseFlags::IGNORE_WHITESPACE);
        assert_eq!(n.to_i64(), (42, false));
        assert!(Num::from_text(b"  42  ", NumParseFlags::empty()).0.is_nan());

        let (n, _) = Num::from_text(b"42abc", NumParseFlags::PREFIX_ONLY);
        assert_eq!(n.to_i64(), (42, false));

        assert!(Num::from_text(b"1.5", NumParseFlags::INTEGER_ONLY).0.is_nan());
        let (n, _) = Num::from_text(
            b"1.5",
            NumParseFlags::INTEGER_ONLY | NumParseFlags::PREFIX_ONLY,
        );
        assert_eq!(n.to_i64(), (1, false));
    }

    #[test]
    fn test_parse_utf16() {
        let le: Vec<u8> = "-3.5".bytes().flat_map(|b| [b, 0]).collect();
        let (n, real) = Num::from_text(&le, NumParseFlags::UTF16LE);
        assert!(real);
        assert_eq!(n.to_text(), "-3.5");

        let be: Vec<u8> = "20".bytes().flat_map(|b| [0, b]).collect();
        let (n, _) = Num::from_text(&be, NumParseFlags::UTF16BE);
        assert_eq!(n.to_i64(), (20, false));
    }

    #[test]
    fn test_parse_exponent() {
        assert_eq!(parse("1e3").to_i64(), (1000, false));
        assert_eq!(parse("2.5e1").to_i64(), (25, false));
        assert_eq!(parse("25e-1").to_text(), "2.5");
        assert!(parse("1e2000").is_inf());
        assert!(parse("1e-2000").is_zero());
        // Trailing 'e' with no digits is not an exponent.
        assert!(parse("12e").is_nan());
        let (n, _) = Num::from_text(b"12e+", NumParseFlags::PREFIX_ONLY);
        assert_eq!(n.to_i64(), (12, false));
    }

    #[test]
    fn test_to_text() {
        assert_eq!(Num::from_i64(0).to_text(), "0");
        assert_eq!(Num::from_i64(-12300).to_text(), "-12300");
        assert_eq!(parse("0.001").to_text(), "0.001");
        assert_eq!(parse("1.25").to_text(), "1.25");
        assert_eq!(parse("1e30").to_text(), "1e+30");
        assert_eq!(parse("-4.2e-9").to_text(), "-4.2e-9");
        assert_eq!(NAN.to_text(), "NaN");
        assert_eq!(INF.to_text(), "inf");
        assert_eq!(NEG_INF.to_text(), "-inf");
    }

    #[test]
    fn test_f64_round_trip() {
        for v in [0.1, -2.5, 1.0e100, -3.7e-12, 12345.678] {
            let n = Num::from_f64(v);
            assert!(n.is_approx() || v.fract() == 0.0);
            assert_eq!(n.to_f64(), v);
        }
        assert_eq!(Num::from_f64(2.0), Num::from_i64(2));
        assert!(Num::from_f64(f64::NAN).is_nan());
        assert!(Num::from_f64(f64::NEG_INFINITY).is_inf());
    }

    #[test]
    fn test_to_i64_lossy() {
        assert_eq!(parse("3.7").to_i64(), (3, true));
        assert_eq!(parse("-3.7").to_i64(), (-3, true));
        assert_eq!(parse("1e20").to_i64(), (i64::MAX, true));
        assert_eq!(parse("-1e20").to_i64(), (i64::MIN, true));
        assert_eq!(NAN.to_i64(), (0, true));
        assert_eq!(parse("40").to_i32(), (40, false));
        assert_eq!(parse("3000000000").to_i32(), (i32::MAX, true));
    }

    #[test]
    fn test_add_sub() {
        let sum = Num::add(Num::from_i64(7), Num::from_i64(35));
        assert_eq!(sum.to_i64(), (42, false));
        let diff = Num::sub(Num::from_i64(7), Num::from_i64(35));
        assert_eq!(diff.to_i64(), (-28, false));
        assert!(Num::add(Num::from_i64(5), Num::from_i64(-5)).is_zero());
        assert_eq!(Num::add(parse("1.5"), parse("0.25")).to_text(), "1.75");
        assert!(Num::add(INF, NEG_INF).is_nan());
        assert!(Num::add(INF, Num::from_i64(1)).is_inf());
        assert!(Num::add(NAN, Num::from_i64(1)).is_nan());
    }

    #[test]
    fn test_add_precision_loss() {
        let big = parse("18446744073709551615"); // > 64-bit after +1 shift
        let sum = Num::add(big, Num::from_i64(7));
        assert!(sum.is_approx());
    }

    #[test]
    fn test_mul() {
        assert_eq!(Num::mul(Num::from_i64(6), Num::from_i64(-7)).to_i64(), (-42, false));
        assert_eq!(Num::mul(parse("1.5"), parse("2.0")).to_i64(), (3, false));
        assert!(Num::mul(INF, ZERO).is_nan());
        assert!(Num::mul(NEG_INF, Num::from_i64(-2)).is_inf());
        assert!(!Num::mul(NEG_INF, Num::from_i64(-2)).is_negative());
        let p = Num::mul(parse("1e999"), parse("1e999"));
        assert!(p.is_inf());
    }

    #[test]
    fn test_div() {
        assert_eq!(Num::div(Num::from_i64(1), Num::from_i64(4)).to_text(), "0.25");
        let third = Num::div(Num::from_i64(1), Num::from_i64(3));
        assert!(third.is_approx());
        assert!(third.to_text().starts_with("0.3333333333333"));
        assert!(Num::div(Num::from_i64(1), ZERO).is_inf());
        assert!(Num::div(ZERO, ZERO).is_nan());
        assert!(Num::div(Num::from_i64(-1), ZERO).is_negative());
        assert!(Num::div(Num::from_i64(5), INF).is_zero());
        assert_eq!(
            Num::div(Num::from_i64(-10), Num::from_i64(4)).to_text(),
            "-2.5"
        );
    }

    #[test]
    fn test_compare() {
        let cmp = |a: &str, b: &str| Num::compare(&parse(a), &parse(b));
        assert_eq!(cmp("1", "2"), Some(Ordering::Less));
        assert_eq!(cmp("-1", "1"), Some(Ordering::Less));
        assert_eq!(cmp("-2", "-1"), Some(Ordering::Less));
        assert_eq!(cmp("10", "9.5"), Some(Ordering::Greater));
        assert_eq!(cmp("5e1", "50"), Some(Ordering::Equal));
        assert_eq!(cmp("0.0001", "0.001"), Some(Ordering::Less));
        assert_eq!(cmp("0", "0.5"), Some(Ordering::Less));
        assert_eq!(cmp("0", "-0.5"), Some(Ordering::Greater));
        assert_eq!(
            Num::compare(&NEG_INF, &Num::from_i64(i64::MIN)),
            Some(Ordering::Less)
        );
        assert_eq!(Num::compare(&INF, &INF), Some(Ordering::Equal));
        assert_eq!(Num::compare(&NAN, &NAN), None);
        assert_eq!(Num::compare(&NAN, &ZERO), None);
    }

    #[test]
    fn test_is_integral() {
        assert!(Num::from_i64(10).is_integral());
        assert!(parse("2.50e1").is_integral());
        assert!(!parse("2.5").is_integral());
        assert!(!INF.is_integral());
        assert!(ZERO.is_integral());
    }

    #[test]
    fn test_from_parts_reserved() {
        assert!(Num::from_parts(false, false, 1000, 0).is_nan());
        assert!(Num::from_parts(true, false, 1000, 1).is_inf());
        assert!(Num::from_parts(true, false, 1000, 1).is_negative());
        assert!(Num::from_parts(false, false, 3, 0).is_zero());
    }
}
