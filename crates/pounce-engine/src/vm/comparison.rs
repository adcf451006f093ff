//! Ordering and equality for `<`, `>` and `=` blocks.
//!
//! Comparison coerces differently from arithmetic: blank text is `NaN`
//! here, not `0`. Numeric operands compare as numbers; a blank operand
//! against a number is unordered; everything else compares as
//! case-insensitive text.

use std::cmp::Ordering;

use crate::runtime::value::{Value, is_blank, parse_number};

/// How an operand participates in a comparison.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Operand {
    Numeric(f64),
    Blank,
    Text,
}

fn classify(value: &Value) -> Operand {
    match value {
        Value::Number(n) if n.is_nan() => Operand::Text,
        Value::Number(n) => Operand::Numeric(*n),
        Value::Boolean(b) => Operand::Numeric(f64::from(u8::from(*b))),
        Value::String(s) if is_blank(s) => Operand::Blank,
        Value::String(s) => {
            let n = parse_number(s);
            if n.is_nan() { Operand::Text } else { Operand::Numeric(n) }
        }
    }
}

/// Compares two values, returning `None` when they are unordered.
pub fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (classify(a), classify(b)) {
        (Operand::Numeric(x), Operand::Numeric(y)) => x.partial_cmp(&y),
        (Operand::Blank, Operand::Numeric(_)) | (Operand::Numeric(_), Operand::Blank) => None,
        _ => {
            let x = a.to_text().to_lowercase();
            let y = b.to_text().to_lowercase();
            Some(x.cmp(&y))
        }
    }
}

/// `a = b`
pub fn equals(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Equal)
}

/// `a < b`
pub fn less_than(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Less)
}

/// `a > b`
pub fn greater_than(a: &Value, b: &Value) -> bool {
    compare(a, b) == Some(Ordering::Greater)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_comparison() {
        assert!(equals(&Value::from("10"), &Value::Number(10.0)));
        assert!(less_than(&Value::from("9"), &Value::from("10")));
        assert!(greater_than(&Value::Number(2.5), &Value::from("  2 ")));
        assert!(equals(&Value::Boolean(true), &Value::Number(1.0)));
    }

    #[test]
    fn test_text_comparison_ignores_case() {
        assert!(equals(&Value::from("Apple"), &Value::from("APPLE")));
        assert!(less_than(&Value::from("apple"), &Value::from("Banana")));
        assert!(greater_than(&Value::from("b"), &Value::Number(10.0)));
    }

    #[test]
    fn test_blank_against_number_is_unordered() {
        let blank = Value::from("   ");
        let five = Value::Number(5.0);
        assert!(!less_than(&blank, &five));
        assert!(!greater_than(&blank, &five));
        assert!(!equals(&blank, &five));
        assert!(!equals(&Value::from(""), &Value::Number(0.0)));
    }

    #[test]
    fn test_blank_against_text_compares_as_text() {
        assert!(less_than(&Value::from(" "), &Value::from("a")));
        assert!(equals(&Value::from(""), &Value::from("")));
    }

    #[test]
    fn test_nan_compares_as_text() {
        assert!(equals(&Value::Number(f64::NAN), &Value::from("nan")));
    }
}
