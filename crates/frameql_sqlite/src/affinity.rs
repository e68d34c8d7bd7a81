//! SQLite column affinity, value ordering and text rendering.
//!
//! Used to evaluate pushed down constraints exactly as SQLite evaluates them
//! against a native table with the same declared column types.
use std::cmp::Ordering;

use frameql_core::format::Format;
use rusqlite::types::Value as SqlValue;

/// Type affinity of a column, derived from its declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Affinity {
    Integer,
    Real,
    Numeric,
    Text,
    Blob,
}

impl Affinity {
    /// Affinity SQLite assigns to a declared column type.
    pub fn from_decl_type(decl_type: &str) -> Self {
        let decl = decl_type.to_ascii_uppercase();
        if decl.contains("INT") {
            Affinity::Integer
        } else if decl.contains("CHAR") || decl.contains("CLOB") || decl.contains("TEXT") {
            Affinity::Text
        } else if decl.is_empty() || decl.contains("BLOB") {
            Affinity::Blob
        } else if decl.contains("REAL") || decl.contains("FLOA") || decl.contains("DOUB") {
            Affinity::Real
        } else {
            Affinity::Numeric
        }
    }

    /// Affinity of a column declared for `format`.
    pub fn for_format(format: Format) -> Self {
        Self::from_decl_type(format.sql_type_name())
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(self, Affinity::Integer | Affinity::Real | Affinity::Numeric)
    }

    /// Convert a value the way storing it in a column of this affinity
    /// would.
    ///
    /// Also the conversion applied to the other operand of a comparison with
    /// a column of this affinity.
    pub fn apply(&self, value: &SqlValue) -> SqlValue {
        match (self, value) {
            (Affinity::Integer | Affinity::Numeric, SqlValue::Text(s)) => match parse_numeric(s) {
                Some(SqlValue::Real(v)) => integral_real(v).unwrap_or(SqlValue::Real(v)),
                Some(v) => v,
                None => value.clone(),
            },
            (Affinity::Integer | Affinity::Numeric, SqlValue::Real(v)) => {
                integral_real(*v).unwrap_or(SqlValue::Real(*v))
            }
            (Affinity::Real, SqlValue::Text(s)) => match parse_numeric(s) {
                Some(SqlValue::Integer(v)) => SqlValue::Real(v as f64),
                Some(v) => v,
                None => value.clone(),
            },
            (Affinity::Real, SqlValue::Integer(v)) => SqlValue::Real(*v as f64),
            (Affinity::Text, SqlValue::Integer(_) | SqlValue::Real(_)) => {
                sql_text(value).map_or(SqlValue::Null, SqlValue::Text)
            }
            _ => value.clone(),
        }
    }
}

/// 2^63. Reals in `[-2^63, 2^63)` fit an i64.
const I64_BOUND: f64 = -(i64::MIN as f64);

/// Real stored as an integer when it holds an integral value in range.
fn integral_real(v: f64) -> Option<SqlValue> {
    if v.fract() == 0.0 && (-I64_BOUND..I64_BOUND).contains(&v) {
        Some(SqlValue::Integer(v as i64))
    } else {
        None
    }
}

/// Parse text that SQLite treats as a well formed number.
///
/// Leading and trailing spaces are allowed. Hex literals and words like
/// `inf` are not numbers.
fn parse_numeric(s: &str) -> Option<SqlValue> {
    let s = s.trim_matches(|c: char| c.is_ascii_whitespace());
    if let Ok(v) = s.parse::<i64>() {
        return Some(SqlValue::Integer(v));
    }

    let well_formed = s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !well_formed {
        return None;
    }
    s.parse::<f64>().ok().map(SqlValue::Real)
}

/// Render a real the way SQLite converts it to text (`%!.15g`).
pub fn real_text(v: f64) -> String {
    if v.is_nan() {
        return String::new();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    if v == 0.0 {
        return "0.0".to_string();
    }

    // Exactly 15 significant digits, correctly rounded.
    let sci = format!("{v:.14e}");
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };
    let all_digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = match all_digits.trim_end_matches('0') {
        "" => "0",
        d => d,
    };

    let mut out = String::with_capacity(24);
    if v < 0.0 {
        out.push('-');
    }

    if !(-4..15).contains(&exp) {
        out.push_str(&digits[..1]);
        out.push('.');
        out.push_str(if digits.len() > 1 { &digits[1..] } else { "0" });
        out.push('e');
        out.push(if exp < 0 { '-' } else { '+' });
        out.push_str(&format!("{:02}", exp.abs()));
    } else if exp >= 0 {
        let int_len = exp as usize + 1;
        if digits.len() <= int_len {
            out.push_str(digits);
            out.extend(std::iter::repeat_n('0', int_len - digits.len()));
            out.push_str(".0");
        } else {
            out.push_str(&digits[..int_len]);
            out.push('.');
            out.push_str(&digits[int_len..]);
        }
    } else {
        out.push_str("0.");
        out.extend(std::iter::repeat_n('0', (-exp - 1) as usize));
        out.push_str(digits);
    }

    out
}

/// Text form SQLite gives a value, `None` for NULL.
pub fn sql_text(value: &SqlValue) -> Option<String> {
    match value {
        SqlValue::Null => None,
        SqlValue::Integer(v) => Some(v.to_string()),
        SqlValue::Real(v) => Some(real_text(*v)),
        SqlValue::Text(v) => Some(v.clone()),
        SqlValue::Blob(v) => Some(String::from_utf8_lossy(v).into_owned()),
    }
}

fn class_rank(value: &SqlValue) -> u8 {
    match value {
        SqlValue::Null => 0,
        SqlValue::Integer(_) | SqlValue::Real(_) => 1,
        SqlValue::Text(_) => 2,
        SqlValue::Blob(_) => 3,
    }
}

/// Compare an integer with a real without losing precision.
fn compare_int_real(i: i64, r: f64) -> Ordering {
    if r < -I64_BOUND {
        return Ordering::Greater;
    }
    if r >= I64_BOUND {
        return Ordering::Less;
    }
    let truncated = r as i64;
    match i.cmp(&truncated) {
        Ordering::Equal => 0.0_f64.partial_cmp(&r.fract()).unwrap_or(Ordering::Equal),
        ord => ord,
    }
}

/// Compare two values with SQLite's ordering and binary collation.
///
/// Numbers sort before text, text before blobs. `None` when either side is
/// NULL, since no comparison with NULL is true.
pub fn compare(left: &SqlValue, right: &SqlValue) -> Option<Ordering> {
    Some(match (left, right) {
        (SqlValue::Null, _) | (_, SqlValue::Null) => return None,
        (SqlValue::Integer(a), SqlValue::Integer(b)) => a.cmp(b),
        (SqlValue::Real(a), SqlValue::Real(b)) => a.partial_cmp(b)?,
        (SqlValue::Integer(a), SqlValue::Real(b)) => compare_int_real(*a, *b),
        (SqlValue::Real(a), SqlValue::Integer(b)) => compare_int_real(*b, *a).reverse(),
        (SqlValue::Text(a), SqlValue::Text(b)) => a.as_bytes().cmp(b.as_bytes()),
        (SqlValue::Blob(a), SqlValue::Blob(b)) => a.cmp(b),
        (a, b) => class_rank(a).cmp(&class_rank(b)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn declared_types() {
        assert_eq!(Affinity::Integer, Affinity::for_format(Format::Integer));
        assert_eq!(Affinity::Real, Affinity::for_format(Format::Double));
        assert_eq!(Affinity::Text, Affinity::for_format(Format::String));
        assert_eq!(Affinity::Numeric, Affinity::for_format(Format::Bool));
        assert_eq!(Affinity::Numeric, Affinity::for_format(Format::DateTime));
        assert_eq!(Affinity::Integer, Affinity::from_decl_type("BIGINT"));
        assert_eq!(Affinity::Text, Affinity::from_decl_type("varchar(10)"));
        assert_eq!(Affinity::Blob, Affinity::from_decl_type(""));
    }

    #[test]
    fn real_rendering() {
        let cases = [
            (1.0, "1.0"),
            (-2.0, "-2.0"),
            (0.5, "0.5"),
            (3.25, "3.25"),
            (100.0, "100.0"),
            (0.0001, "0.0001"),
            (0.00001, "1.0e-05"),
            (1e15, "1.0e+15"),
            (123456789012345.0, "123456789012345.0"),
            (1.0 / 3.0, "0.333333333333333"),
            (1.5e300, "1.5e+300"),
            (0.0, "0.0"),
        ];
        for (v, expected) in cases {
            assert_eq!(expected, real_text(v), "value: {v}");
        }
    }

    #[test]
    fn numeric_affinity_converts_well_formed_text() {
        let numeric = Affinity::Numeric;
        assert_eq!(SqlValue::Integer(30), numeric.apply(&text(" 30 ")));
        assert_eq!(SqlValue::Integer(3), numeric.apply(&text("3.0")));
        assert_eq!(SqlValue::Real(2.5), numeric.apply(&text("2.5")));
        assert_eq!(SqlValue::Integer(100_000), numeric.apply(&text("1e5")));
        assert_eq!(SqlValue::Real(1e30), numeric.apply(&text("1e30")));
        for s in ["true", "!", "0x10", "inf", "", "2024-01-01 00:00:00.000"] {
            assert_eq!(text(s), numeric.apply(&text(s)), "text: {s:?}");
        }

        assert_eq!(SqlValue::Real(3.0), Affinity::Real.apply(&text("3")));
        assert_eq!(SqlValue::Real(3.0), Affinity::Real.apply(&SqlValue::Integer(3)));
    }

    #[test]
    fn text_affinity_renders_numbers() {
        assert_eq!(text("1.0"), Affinity::Text.apply(&SqlValue::Real(1.0)));
        assert_eq!(text("7"), Affinity::Text.apply(&SqlValue::Integer(7)));
        assert_eq!(text("x"), Affinity::Text.apply(&text("x")));
        assert_eq!(SqlValue::Null, Affinity::Blob.apply(&SqlValue::Null));
    }

    #[test]
    fn storage_class_ordering() {
        assert_eq!(Some(Ordering::Less), compare(&SqlValue::Integer(99), &text("!")));
        assert_eq!(Some(Ordering::Less), compare(&SqlValue::Real(1e300), &text("")));
        assert_eq!(
            Some(Ordering::Less),
            compare(&text("zzz"), &SqlValue::Blob(vec![0]))
        );
        assert_eq!(
            Some(Ordering::Equal),
            compare(&SqlValue::Integer(2), &SqlValue::Real(2.0))
        );
        assert_eq!(
            Some(Ordering::Less),
            compare(&SqlValue::Integer(2), &SqlValue::Real(2.5))
        );
        assert_eq!(
            Some(Ordering::Greater),
            compare(&SqlValue::Real(-1.5), &SqlValue::Integer(-2))
        );
        assert_eq!(Some(Ordering::Less), compare(&text("B"), &text("a")));
        assert_eq!(None, compare(&SqlValue::Null, &SqlValue::Null));
        assert_eq!(None, compare(&SqlValue::Integer(1), &SqlValue::Null));
    }

    #[test]
    fn large_integers_compare_exactly() {
        let big = i64::MAX;
        assert_eq!(
            Some(Ordering::Less),
            compare(&SqlValue::Integer(big), &SqlValue::Real(9.3e18))
        );
        assert_eq!(
            Some(Ordering::Less),
            compare(&SqlValue::Integer(big - 1), &SqlValue::Integer(big))
        );
    }
}
