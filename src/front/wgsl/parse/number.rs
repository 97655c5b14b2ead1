//! Numeric literal scanning and conversion.
//!
//! <https://www.w3.org/TR/WGSL/#numeric-literals>

use super::lexer::LexError;

/// A numeric literal after suffix handling and range checks.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Number {
    /// Integer literal without a suffix.
    AbstractInt(i64),
    /// Float literal without a suffix.
    AbstractFloat(f64),
    /// `i` suffix.
    I32(i32),
    /// `u` suffix.
    U32(u32),
    /// `f` suffix.
    F32(f32),
    /// `h` suffix, widened to `f32`.
    F16(f32),
}

/// The largest finite `f16` value.
const F16_MAX: f64 = 65504.0;

#[derive(Clone, Copy, PartialEq)]
enum Kind {
    Int,
    Float,
}

/// Scan the numeric literal at the start of `input`, which must begin with
/// a digit or with `.` followed by a digit.
///
/// Returns the converted value (or the reason it is invalid) and the number
/// of bytes consumed.
pub fn consume_number(input: &str) -> (Result<Number, LexError>, usize) {
    let bytes = input.as_bytes();
    let is_hex = bytes.len() > 2 && bytes[0] == b'0' && matches!(bytes[1], b'x' | b'X') && {
        // `0x` must be followed by a hex digit, or by `.` and a hex digit.
        match bytes[2] {
            b'.' => bytes.get(3).map_or(false, u8::is_ascii_hexdigit),
            c => c.is_ascii_hexdigit(),
        }
    };
    if is_hex {
        consume_hex(input)
    } else {
        consume_decimal(input)
    }
}

fn count_while(bytes: &[u8], start: usize, f: impl Fn(u8) -> bool) -> usize {
    bytes[start..].iter().take_while(|&&b| f(b)).count()
}

/// Scan an exponent (`e`, `E`, `p` or `P` at `pos`). Returns its length, or
/// zero if the characters there don't form a complete exponent.
fn exponent_len(bytes: &[u8], pos: usize, markers: [u8; 2]) -> usize {
    match bytes.get(pos) {
        Some(b) if markers.contains(b) => {}
        _ => return 0,
    }
    let mut len = 1;
    if let Some(b'+' | b'-') = bytes.get(pos + len) {
        len += 1;
    }
    let digits = count_while(bytes, pos + len, |b| b.is_ascii_digit());
    if digits == 0 {
        0
    } else {
        len + digits
    }
}

fn consume_decimal(input: &str) -> (Result<Number, LexError>, usize) {
    let bytes = input.as_bytes();
    let int_len = count_while(bytes, 0, |b| b.is_ascii_digit());
    let mut pos = int_len;
    let mut kind = Kind::Int;

    if bytes.get(pos) == Some(&b'.') {
        let frac_len = count_while(bytes, pos + 1, |b| b.is_ascii_digit());
        if int_len + frac_len > 0 {
            kind = Kind::Float;
            pos += 1 + frac_len;
        }
    }
    let exp = exponent_len(bytes, pos, [b'e', b'E']);
    if exp != 0 {
        kind = Kind::Float;
        pos += exp;
    }
    let digits = &input[..pos];

    let suffix = bytes.get(pos).copied();
    let result = match (kind, suffix) {
        (Kind::Int, Some(b'i')) => {
            pos += 1;
            check_leading_zeros(digits).and_then(|()| parse_i32(digits, 10))
        }
        (Kind::Int, Some(b'u')) => {
            pos += 1;
            check_leading_zeros(digits).and_then(|()| parse_u32(digits, 10))
        }
        (_, Some(b'f')) => {
            pos += 1;
            // `01f` is as invalid as `01`.
            match kind {
                Kind::Int => check_leading_zeros(digits),
                Kind::Float => Ok(()),
            }
            .and_then(|()| parse_decimal_float(digits))
            .and_then(to_f32)
        }
        (_, Some(b'h')) => {
            pos += 1;
            match kind {
                Kind::Int => check_leading_zeros(digits),
                Kind::Float => Ok(()),
            }
            .and_then(|()| parse_decimal_float(digits))
            .and_then(to_f16)
        }
        (Kind::Int, _) => check_leading_zeros(digits).and_then(|()| parse_abstract_int(digits, 10)),
        (Kind::Float, _) => parse_decimal_float(digits).and_then(to_abstract_float),
    };
    (result, pos)
}

fn consume_hex(input: &str) -> (Result<Number, LexError>, usize) {
    let bytes = input.as_bytes();
    let int_start = 2;
    let int_len = count_while(bytes, int_start, |b| b.is_ascii_hexdigit());
    let mut pos = int_start + int_len;
    let mut frac = None;
    let mut kind = Kind::Int;

    if bytes.get(pos) == Some(&b'.') {
        let frac_len = count_while(bytes, pos + 1, |b| b.is_ascii_hexdigit());
        if int_len + frac_len > 0 {
            kind = Kind::Float;
            frac = Some(&input[pos + 1..pos + 1 + frac_len]);
            pos += 1 + frac_len;
        }
    }
    let exp_len = exponent_len(bytes, pos, [b'p', b'P']);
    let exponent = if exp_len != 0 {
        kind = Kind::Float;
        let text = &input[pos + 1..pos + exp_len];
        pos += exp_len;
        Some(text)
    } else {
        None
    };
    let int_digits = &input[int_start..int_start + int_len];

    let result = match kind {
        Kind::Int => match bytes.get(pos) {
            Some(b'i') => {
                pos += 1;
                parse_i32(int_digits, 16)
            }
            Some(b'u') => {
                pos += 1;
                parse_u32(int_digits, 16)
            }
            _ => parse_abstract_int(int_digits, 16),
        },
        Kind::Float => {
            let value = parse_hex_float(int_digits, frac, exponent);
            match bytes.get(pos) {
                // A hex float with no exponent can't take a suffix: `f` is a
                // hex digit there and was consumed above.
                Some(b'f') if exponent.is_some() => {
                    pos += 1;
                    value.and_then(to_f32)
                }
                Some(b'h') if exponent.is_some() => {
                    pos += 1;
                    value.and_then(to_f16)
                }
                _ => value.and_then(to_abstract_float),
            }
        }
    };
    (result, pos)
}

fn check_leading_zeros(digits: &str) -> Result<(), LexError> {
    if digits.len() > 1 && digits.starts_with('0') {
        Err(LexError::LeadingZeros)
    } else {
        Ok(())
    }
}

fn parse_abstract_int(digits: &str, radix: u32) -> Result<Number, LexError> {
    i64::from_str_radix(digits, radix)
        .map(Number::AbstractInt)
        .map_err(|_| LexError::Unrepresentable("abstract-int"))
}

fn parse_i32(digits: &str, radix: u32) -> Result<Number, LexError> {
    i32::from_str_radix(digits, radix)
        .map(Number::I32)
        .map_err(|_| LexError::Unrepresentable("i32"))
}

fn parse_u32(digits: &str, radix: u32) -> Result<Number, LexError> {
    u32::from_str_radix(digits, radix)
        .map(Number::U32)
        .map_err(|_| LexError::Unrepresentable("u32"))
}

fn parse_decimal_float(digits: &str) -> Result<f64, LexError> {
    digits
        .parse::<f64>()
        .map_err(|_| LexError::Unrepresentable("abstract-float"))
}

fn parse_hex_float(
    int_digits: &str,
    frac: Option<&str>,
    exponent: Option<&str>,
) -> Result<f64, LexError> {
    // hexf wants `0x<int>[.<frac>]p<exp>`, with a non-empty integer part.
    let mut text = String::with_capacity(int_digits.len() + 16);
    text.push_str("0x");
    text.push_str(if int_digits.is_empty() { "0" } else { int_digits });
    if let Some(frac) = frac.filter(|f| !f.is_empty()) {
        text.push('.');
        text.push_str(frac);
    }
    text.push('p');
    text.push_str(exponent.unwrap_or("0"));
    hexf_parse::parse_hexf64(&text, false)
        .map_err(|_| LexError::Unrepresentable("abstract-float"))
}

fn to_abstract_float(value: f64) -> Result<Number, LexError> {
    if value.is_finite() {
        Ok(Number::AbstractFloat(value))
    } else {
        Err(LexError::NonFinite("abstract-float", value.is_sign_negative()))
    }
}

fn to_f32(value: f64) -> Result<Number, LexError> {
    if value.is_infinite() {
        return Err(LexError::NonFinite("f32", value.is_sign_negative()));
    }
    let narrowed = value as f32;
    if narrowed.is_finite() {
        Ok(Number::F32(narrowed))
    } else {
        Err(LexError::Unrepresentable("f32"))
    }
}

fn to_f16(value: f64) -> Result<Number, LexError> {
    if value.is_infinite() {
        return Err(LexError::NonFinite("f16", value.is_sign_negative()));
    }
    if value.abs() <= F16_MAX {
        Ok(Number::F16(value as f32))
    } else {
        Err(LexError::Unrepresentable("f16"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn number(input: &str) -> (Result<Number, LexError>, usize) {
        consume_number(input)
    }

    #[test]
    fn integers() {
        assert_eq!(number("0"), (Ok(Number::AbstractInt(0)), 1));
        assert_eq!(number("123;"), (Ok(Number::AbstractInt(123)), 3));
        assert_eq!(number("7i"), (Ok(Number::I32(7)), 2));
        assert_eq!(number("7u)"), (Ok(Number::U32(7)), 2));
        assert_eq!(number("0x1Fu"), (Ok(Number::U32(31)), 5));
        assert_eq!(number("0xffffffffu"), (Ok(Number::U32(u32::MAX)), 11));
        assert_eq!(number("0x"), (Ok(Number::AbstractInt(0)), 1));
    }

    #[test]
    fn integer_errors() {
        assert_eq!(number("0123").0, Err(LexError::LeadingZeros));
        assert_eq!(number("2147483648i").0, Err(LexError::Unrepresentable("i32")));
        assert_eq!(number("4294967296u").0, Err(LexError::Unrepresentable("u32")));
        assert_eq!(
            number("9223372036854775808").0,
            Err(LexError::Unrepresentable("abstract-int"))
        );
    }

    #[test]
    fn floats() {
        assert_eq!(number("1.5"), (Ok(Number::AbstractFloat(1.5)), 3));
        assert_eq!(number("1."), (Ok(Number::AbstractFloat(1.0)), 2));
        assert_eq!(number(".25f"), (Ok(Number::F32(0.25)), 4));
        assert_eq!(number("1e3"), (Ok(Number::AbstractFloat(1000.0)), 3));
        assert_eq!(number("2E-1h"), (Ok(Number::F16(0.2f64 as f32)), 5));
        assert_eq!(number("0f"), (Ok(Number::F32(0.0)), 2));
        assert_eq!(number("1e"), (Ok(Number::AbstractInt(1)), 1));
        assert_eq!(number("0x1.8p1"), (Ok(Number::AbstractFloat(3.0)), 7));
        assert_eq!(number("0x1p-2f"), (Ok(Number::F32(0.25)), 7));
        assert_eq!(number("0x.8"), (Ok(Number::AbstractFloat(0.5)), 4));
    }

    #[test]
    fn float_errors() {
        assert_eq!(number("1e39f").0, Err(LexError::Unrepresentable("f32")));
        assert_eq!(number("1e400f").0, Err(LexError::NonFinite("f32", false)));
        assert_eq!(number("70000h").0, Err(LexError::Unrepresentable("f16")));
        assert_eq!(
            number("1e400").0,
            Err(LexError::NonFinite("abstract-float", false))
        );
    }
}
