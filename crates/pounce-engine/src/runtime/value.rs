//! Script value representation and coercions.
//!
//! Block scripts are dynamically typed: every slot holds a number, a string
//! or a boolean, and each consumer coerces on read. Arithmetic and
//! comparison coerce the same text differently, see [`Value::to_number`]
//! and [`crate::vm::comparison`].

use std::fmt;

/// A script value.
#[derive(Debug, Clone)]
pub enum Value {
    /// Number (IEEE 754 double)
    Number(f64),
    /// String
    String(String),
    /// Boolean
    Boolean(bool),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            // Structural equality: compiled tables must compare equal even
            // when they fold a NaN constant.
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// The empty string, default for text slots.
    pub fn empty() -> Self {
        Value::String(String::new())
    }

    /// Returns true if this value is a number.
    pub fn is_number(&self) -> bool {
        matches!(self, Value::Number(_))
    }

    /// Arithmetic coercion.
    ///
    /// Text is parsed like `Number()` (so blank text is `0`), and anything
    /// that fails to parse, including a stored `NaN`, becomes `0`.
    pub fn to_number(&self) -> f64 {
        let n = match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => f64::from(u8::from(*b)),
            Value::String(s) => parse_number(s),
        };
        if n.is_nan() { 0.0 } else { n }
    }

    /// Truthiness used by conditions.
    ///
    /// Text is false only when empty, `"0"`, or `"false"` in any case.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")),
        }
    }

    /// Converts to a 24-bit RGB color.
    ///
    /// Accepts a number, `#rrggbb`/`rrggbb`, or `#rgb`/`rgb` where each
    /// digit is doubled. Anything else is coerced numerically.
    pub fn to_color(&self) -> u32 {
        if let Value::String(s) = self {
            if let Some(rgb) = parse_hex_color(s) {
                return rgb;
            }
        }
        let n = self.to_number();
        if n.is_finite() {
            (n as i64 as u32) & 0x00ff_ffff
        } else {
            0
        }
    }

    /// Text coercion, matching how numbers print in the editor.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Converts a JSON literal from a project file.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Null => Value::empty(),
            other => Value::String(other.to_string()),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0.0)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{}", b),
        }
    }
}

/// Formats a number the way the editor displays it.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        // -0 prints as 0
        "0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Parses text like `Number()`.
///
/// Surrounding whitespace is ignored and blank text is `0`. Hex, binary
/// and octal prefixes and `Infinity` are recognised; everything else that
/// is not a plain decimal literal is `NaN`.
pub fn parse_number(s: &str) -> f64 {
    let t = s.trim();
    if t.is_empty() {
        return 0.0;
    }

    let radix = match t.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0b") | Some("0B") => Some(2),
        Some("0o") | Some("0O") => Some(8),
        _ => None,
    };
    if let Some(radix) = radix {
        return u64::from_str_radix(&t[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }

    match t {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }

    // Rust also accepts "inf" and "nan", which are not numbers here.
    if !t
        .bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
    {
        return f64::NAN;
    }
    t.parse::<f64>().unwrap_or(f64::NAN)
}

/// True for text that is empty or only whitespace.
pub fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

fn parse_hex_color(s: &str) -> Option<u32> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    match hex.len() {
        6 => u32::from_str_radix(hex, 16).ok(),
        3 => {
            let doubled: String = hex.chars().flat_map(|c| [c, c]).collect();
            u32::from_str_radix(&doubled, 16).ok()
        }
        _ => None,
    }
}
