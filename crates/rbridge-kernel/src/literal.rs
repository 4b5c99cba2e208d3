//! Literal tokens: host values to engine syntax and back.
//!
//! Encoding is a pure function of the value. Decoding first matches the
//! fixed special tokens (case-insensitive), then falls back to a numeric
//! parse.
//!
//! | Value | Token |
//! |-------|-------|
//! | `true` / `false` | `TRUE` / `FALSE` |
//! | `NaN` | `NaN` (`NA` also decodes to NaN) |
//! | `+∞` / `-∞` | `Inf` / `-Inf` |
//! | long outside i32 | `as.double(n)` |

use rbridge_types::{Scalar, ValueType};

pub const TRUE_TOKEN: &str = "TRUE";
pub const FALSE_TOKEN: &str = "FALSE";
pub const NAN_TOKEN: &str = "NaN";
pub const POS_INF_TOKEN: &str = "Inf";
pub const NEG_INF_TOKEN: &str = "-Inf";

/// A decoded reply token before it is coerced to the expected kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Bool(bool),
    Number(f64),
}

impl Token {
    pub fn as_f64(self) -> f64 {
        match self {
            Token::Bool(true) => 1.0,
            Token::Bool(false) => 0.0,
            Token::Number(n) => n,
        }
    }
}

/// Engine syntax for one scalar.
pub fn encode_scalar(value: &Scalar) -> String {
    match *value {
        Scalar::Bool(b) => encode_bool(b).to_string(),
        Scalar::Long(i) => encode_long(i),
        Scalar::Double(d) => encode_double(d),
    }
}

pub fn encode_bool(b: bool) -> &'static str {
    if b { TRUE_TOKEN } else { FALSE_TOKEN }
}

/// Plain decimal inside the 32-bit range, widened to double outside it.
pub fn encode_long(i: i64) -> String {
    if i32::try_from(i).is_ok() {
        i.to_string()
    } else {
        format!("as.double({})", i)
    }
}

/// Shortest round-trip decimal, or a special token for non-finite values.
pub fn encode_double(d: f64) -> String {
    if d.is_nan() {
        NAN_TOKEN.to_string()
    } else if d == f64::INFINITY {
        POS_INF_TOKEN.to_string()
    } else if d == f64::NEG_INFINITY {
        NEG_INF_TOKEN.to_string()
    } else {
        // Debug switches to exponent notation for very large/small magnitudes
        format!("{:?}", d)
    }
}

/// Matrix element; integral values of integer matrices drop the fraction.
pub fn encode_element(v: f64, integer: bool) -> String {
    if integer && v.is_finite() && v.fract() == 0.0 && v.abs() < 9.007_199_254_740_992e15 {
        format!("{}", v as i64)
    } else {
        encode_double(v)
    }
}

/// Drop the `[1]` index prefix the engine's print format puts on a line.
pub fn strip_index_prefix(line: &str) -> &str {
    let trimmed = line.trim();
    if let Some(rest) = trimmed.strip_prefix('[')
        && let Some(end) = rest.find(']')
        && rest[..end].chars().all(|c| c.is_ascii_digit())
    {
        return rest[end + 1..].trim_start();
    }
    trimmed
}

/// Decode a single whitespace-free token.
pub fn decode_token(raw: &str) -> Option<Token> {
    let token = raw.trim().trim_matches('"');
    match token.to_ascii_lowercase().as_str() {
        "true" | "t" => return Some(Token::Bool(true)),
        "false" | "f" => return Some(Token::Bool(false)),
        "nan" | "na" => return Some(Token::Number(f64::NAN)),
        "inf" | "+inf" => return Some(Token::Number(f64::INFINITY)),
        "-inf" => return Some(Token::Number(f64::NEG_INFINITY)),
        _ => {}
    }
    // Rust's parser also accepts "infinity"; the engine never prints it
    if token.chars().any(|c| c.is_ascii_alphabetic() && !matches!(c, 'e' | 'E')) {
        return None;
    }
    token.parse::<f64>().ok().map(Token::Number)
}

/// Decode a scalar reply line as the registered kind.
pub fn decode_scalar(line: &str, ty: ValueType) -> Result<Scalar, String> {
    let text = strip_index_prefix(line);
    let token = decode_token(text).ok_or_else(|| format!("not a literal: {:?}", text))?;

    match (ty, token) {
        (ValueType::Boolean, Token::Bool(b)) => Ok(Scalar::Bool(b)),
        (ValueType::Boolean, Token::Number(n)) if !n.is_nan() => Ok(Scalar::Bool(n != 0.0)),
        (ValueType::Boolean, Token::Number(_)) => Err("NaN is not a boolean".to_string()),
        (ValueType::Long, _) => decode_long(text, token).map(Scalar::Long),
        (_, Token::Bool(b)) if ty == ValueType::Unknown => Ok(Scalar::Bool(b)),
        (_, token) => Ok(Scalar::Double(token.as_f64())),
    }
}

fn decode_long(text: &str, token: Token) -> Result<i64, String> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(i);
    }
    let n = token.as_f64();
    if n.is_finite() && n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Ok(n as i64)
    } else {
        Err(format!("{:?} is not an integer", text))
    }
}

/// Whether an `exists(...)` reply confirms the variable.
///
/// Anything other than a recognisable `FALSE` counts as confirmation; the
/// reply's arrival is what orders the protocol.
pub fn fence_confirms(line: &str) -> bool {
    !matches!(decode_token(strip_index_prefix(line)), Some(Token::Bool(false)))
}
