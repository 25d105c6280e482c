// Number/string conversions shared by coercion, concatenation and the
// builtins.

use super::LuaValue;
use smol_str::SmolStr;

/// Parse a string into a number the way the VM coerces operands:
/// optional surrounding whitespace, optional sign, then a decimal or
/// `0x` hexadecimal literal. Integral results are canonicalized to
/// Integer.
pub fn string_to_number(s: &str) -> Option<LuaValue> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let (negative, digits) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        let value = i64::from_str_radix(hex, 16).ok()?;
        return Some(LuaValue::Integer(if negative { -value } else { value }));
    }

    if let Ok(i) = s.parse::<i64>() {
        return Some(LuaValue::Integer(i));
    }
    match s.parse::<f64>() {
        Ok(f) => Some(LuaValue::number(f)),
        Err(_) => None,
    }
}

/// Textual form of a number: integers print without a decimal point,
/// floats follow the usual `%.14g`-style rendering.
pub fn number_to_string(value: &LuaValue) -> Option<SmolStr> {
    match value {
        LuaValue::Integer(i) => {
            let mut buf = itoa::Buffer::new();
            Some(SmolStr::new(buf.format(*i)))
        }
        LuaValue::Float(f) => Some(SmolStr::new(float_text(*f))),
        _ => None,
    }
}

fn float_text(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_string();
    }
    if f.fract() == 0.0 && f.abs() < 1e14 {
        format!("{:.0}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_parsing() {
        assert_eq!(string_to_number("42"), Some(LuaValue::Integer(42)));
        assert_eq!(string_to_number("-8"), Some(LuaValue::Integer(-8)));
        assert_eq!(string_to_number("  10  "), Some(LuaValue::Integer(10)));
        assert_eq!(string_to_number("1.5"), Some(LuaValue::Float(1.5)));
        // integral floats canonicalize
        assert_eq!(string_to_number("3.0"), Some(LuaValue::Integer(3)));
        assert_eq!(string_to_number("1e2"), Some(LuaValue::Integer(100)));
    }

    #[test]
    fn test_hex_parsing() {
        assert_eq!(string_to_number("0xFF"), Some(LuaValue::Integer(255)));
        assert_eq!(string_to_number("0X10"), Some(LuaValue::Integer(16)));
        assert_eq!(string_to_number("-0x2"), Some(LuaValue::Integer(-2)));
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(string_to_number(""), None);
        assert_eq!(string_to_number("x"), None);
        assert_eq!(string_to_number("1x"), None);
        assert_eq!(string_to_number("0x"), None);
        assert_eq!(string_to_number("--1"), None);
    }

    #[test]
    fn test_number_text() {
        assert_eq!(
            number_to_string(&LuaValue::Integer(7)).unwrap().as_str(),
            "7"
        );
        assert_eq!(
            number_to_string(&LuaValue::Integer(-40)).unwrap().as_str(),
            "-40"
        );
        assert_eq!(
            number_to_string(&LuaValue::Float(1.5)).unwrap().as_str(),
            "1.5"
        );
        assert_eq!(
            number_to_string(&LuaValue::Float(3.0)).unwrap().as_str(),
            "3"
        );
        assert_eq!(number_to_string(&LuaValue::Nil), None);
    }

    #[test]
    fn test_roundtrip_integers() {
        for i in [0i64, 1, -1, 999999, i64::MAX, i64::MIN] {
            let text = number_to_string(&LuaValue::Integer(i)).unwrap();
            assert_eq!(string_to_number(&text), Some(LuaValue::Integer(i)));
        }
    }
}
