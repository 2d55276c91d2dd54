//! Text framing rules shared by every SCPI family.
//!
//! Commands go out as plain ASCII lines. Answers come back as ASCII lines whose
//! carriage returns and line feeds are stripped before they are interpreted.
//! Numbers travel in decimal or scientific notation.

use crate::error::{Error, Result};

/// Symbolic names accepted in the `terminator` and `suffix` configuration fields.
const LINE_ENDING_TOKENS: [(&str, char); 4] = [("CR", '\r'), ("LF", '\n'), ("\\r", '\r'), ("\\n", '\n')];

/// Translate a symbolic line ending such as `"CRLF"` into the literal control bytes.
///
/// Tokens are matched case-insensitively. Anything that is not a token is kept as is.
pub fn translate_line_ending(symbolic: &str) -> String {
    let mut translated = String::with_capacity(symbolic.len());
    let mut rest = symbolic;

    'outer: while let Some(first) = rest.chars().next() {
        for (token, byte) in LINE_ENDING_TOKENS {
            if rest
                .get(..token.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(token))
            {
                translated.push(byte);
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }
        translated.push(first);
        rest = &rest[first.len_utf8()..];
    }

    translated
}

/// Remove the carriage returns and line feeds an instrument wraps around its answer.
pub fn clean_response(response: &str) -> String {
    response.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// The first value of a response: first whitespace delimited token, up to the first comma.
fn first_value(response: &str) -> Option<&str> {
    response
        .split_whitespace()
        .next()
        .and_then(|token| token.split(',').next())
        .filter(|value| !value.is_empty())
}

/// Parse the first value of a response as single precision float.
///
/// Accepts scientific notation, e.g. `"-1.234500e+02\r\n"` => `-123.45`.
pub fn parse_float(response: &str) -> Result<f32> {
    let cleaned = clean_response(response);
    first_value(&cleaned)
        .and_then(|value| value.parse::<f32>().ok())
        .ok_or(Error::Parse(cleaned))
}

/// Parse the first value of a response as integer.
///
/// Integral values sent in float notation (`"1.000000E+00"`) are accepted too.
pub fn parse_int(response: &str) -> Result<i32> {
    let cleaned = clean_response(response);
    let Some(value) = first_value(&cleaned) else {
        return Err(Error::Parse(cleaned));
    };

    if let Ok(int) = value.parse::<i32>() {
        return Ok(int);
    }
    match value.parse::<f32>() {
        Ok(float) if float.is_finite() && float.fract() == 0.0 => Ok(float as i32),
        _ => Err(Error::Parse(cleaned)),
    }
}

/// Parse a boolean answer: `ON`/`OFF` or any integer, where non-zero is true.
pub fn parse_bool(response: &str) -> Result<bool> {
    let cleaned = clean_response(response);
    match first_value(&cleaned) {
        Some(value) if value.eq_ignore_ascii_case("ON") => Ok(true),
        Some(value) if value.eq_ignore_ascii_case("OFF") => Ok(false),
        _ => parse_int(&cleaned).map(|int| int != 0),
    }
}

/// Format a number in scientific notation without losing precision.
///
/// Uses the shortest mantissa that parses back to the same `f32` and a signed,
/// at least two digit exponent: `3.5` => `"3.5e+00"`, `1e-6` => `"1e-06"`.
pub fn format_scientific(value: f32) -> String {
    let shortest = format!("{value:e}");
    match shortest.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        // inf and NaN have no exponent.
        None => shortest,
    }
}

/// Build `"<header> <value>"` with the value in scientific notation.
pub fn command_with_value(header: &str, value: f32) -> String {
    format!("{header} {}", format_scientific(value))
}
