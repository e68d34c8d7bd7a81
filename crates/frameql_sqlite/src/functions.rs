//! Scalar SQL functions installed on every connection.
use std::error::Error;
use std::fmt;

use regex::{Regex, RegexBuilder};
use rusqlite::Connection;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;

use crate::affinity::real_text;

type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A scalar function that can be installed on a connection.
#[derive(Clone, Copy)]
pub struct ScalarFunction {
    pub name: &'static str,
    pub num_args: i32,
    pub description: &'static str,
    install: fn(conn: &Connection, func: &ScalarFunction) -> rusqlite::Result<()>,
}

impl fmt::Debug for ScalarFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarFunction")
            .field("name", &self.name)
            .field("num_args", &self.num_args)
            .finish_non_exhaustive()
    }
}

const FLAGS: FunctionFlags = FunctionFlags::SQLITE_UTF8.union(FunctionFlags::SQLITE_DETERMINISTIC);

pub const TEXT_EXTRACT: ScalarFunction = ScalarFunction {
    name: "text_extract",
    num_args: 2,
    description: "Split text on whitespace and return the field at a zero-based index",
    install: |conn, func| {
        conn.create_scalar_function(func.name, func.num_args, FLAGS, |ctx| {
            let text = value_text(ctx.get_raw(0));
            let idx = ctx.get::<Option<i64>>(1)?;
            Ok(match (text, idx) {
                (Some(text), Some(idx)) => text_extract(&text, idx),
                _ => None,
            })
        })
    },
};

pub const REGEXP: ScalarFunction = ScalarFunction {
    name: "regexp",
    num_args: 2,
    description: "Returns true if the text matches the regular expression",
    install: |conn, func| {
        conn.create_scalar_function(func.name, func.num_args, FLAGS, |ctx| {
            let re = cached_regex(ctx)?;
            Ok(value_text(ctx.get_raw(1)).map(|text| re.is_match(&text)))
        })
    },
};

pub const MATCH: ScalarFunction = ScalarFunction {
    name: "match",
    num_args: 2,
    description: "Returns true if the text contains the needle",
    install: |conn, func| {
        conn.create_scalar_function(func.name, func.num_args, FLAGS, |ctx| {
            let needle = value_text(ctx.get_raw(0));
            let text = value_text(ctx.get_raw(1));
            Ok(match (needle, text) {
                (Some(needle), Some(text)) => Some(text.contains(&needle)),
                _ => None,
            })
        })
    },
};

/// The set of scalar functions installed on engine connections.
#[derive(Debug, Clone)]
pub struct FunctionSet {
    functions: Vec<ScalarFunction>,
}

impl Default for FunctionSet {
    fn default() -> Self {
        FunctionSet {
            functions: vec![TEXT_EXTRACT, REGEXP, MATCH],
        }
    }
}

impl FunctionSet {
    pub fn iter(&self) -> impl Iterator<Item = &ScalarFunction> {
        self.functions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ScalarFunction> {
        self.functions
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn install(&self, conn: &Connection) -> rusqlite::Result<()> {
        for func in &self.functions {
            (func.install)(conn, func)?;
        }
        Ok(())
    }
}

fn cached_regex(ctx: &Context<'_>) -> rusqlite::Result<std::sync::Arc<Regex>> {
    ctx.get_or_create_aux(0, |pattern| -> Result<Regex, BoxError> {
        let pattern = pattern.as_str()?;
        Ok(Regex::new(pattern)?)
    })
}

/// Text form of a SQL value, `None` for NULL.
pub(crate) fn value_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(v) => Some(v.to_string()),
        ValueRef::Real(v) => Some(real_text(v)),
        ValueRef::Text(v) | ValueRef::Blob(v) => Some(String::from_utf8_lossy(v).into_owned()),
    }
}

/// Return the `idx`-th whitespace separated field of `text`.
pub fn text_extract(text: &str, idx: i64) -> Option<String> {
    let idx = usize::try_from(idx).ok()?;
    text.split_whitespace().nth(idx).map(str::to_string)
}

/// Compile a SQL LIKE pattern.
///
/// `%` matches any sequence and `_` any single character. Matching is
/// case-insensitive for ASCII only.
pub fn like_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    for c in pattern.chars() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            c if c.is_ascii_alphabetic() => {
                re.push('[');
                re.push(c.to_ascii_lowercase());
                re.push(c.to_ascii_uppercase());
                re.push(']');
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re).dot_matches_new_line(true).build()
}

/// Compile a SQL GLOB pattern.
///
/// `*` matches any sequence, `?` any single character and `[...]` a
/// character class (`[^...]` negated). Matching is case-sensitive.
pub fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            '[' => {
                let mut class = String::from("[");
                if chars.peek() == Some(&'^') {
                    chars.next();
                    class.push('^');
                }
                // A leading ']' is part of the class.
                if chars.peek() == Some(&']') {
                    chars.next();
                    class.push_str("\\]");
                }
                let mut closed = false;
                for c in chars.by_ref() {
                    match c {
                        ']' => {
                            closed = true;
                            break;
                        }
                        '-' => class.push('-'),
                        c => class.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
                    }
                }
                if closed {
                    class.push(']');
                    re.push_str(&class);
                } else {
                    // Unterminated class never matches.
                    re.push_str("[^\\s\\S]");
                }
            }
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    RegexBuilder::new(&re).dot_matches_new_line(true).build()
}
