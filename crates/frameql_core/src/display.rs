use std::fmt::{self, Write as _};

use frameql_error::Result;

use crate::dataframe::DataFrame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Text printed for null values.
    pub null: &'static str,
    /// Text printed for empty strings.
    pub empty_string: &'static str,
}

impl FormatOptions {
    pub const fn new() -> Self {
        FormatOptions {
            null: "NULL",
            empty_string: "",
        }
    }
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Print a frame as tab-separated text with a header line.
pub fn ugly_print(frame: &DataFrame, opts: FormatOptions) -> Result<String> {
    let mut buf = frame.schema().names().collect::<Vec<_>>().join("\t");

    for row in frame.iter() {
        buf.push('\n');
        for (idx, value) in row.values().iter().enumerate() {
            if idx > 0 {
                buf.push('\t');
            }
            match value.raw() {
                None => buf.push_str(opts.null),
                Some(_) => {
                    let s = value.to_string();
                    if s.is_empty() {
                        buf.push_str(opts.empty_string);
                    } else {
                        write!(buf, "{s}")?;
                    }
                }
            }
        }
    }

    Ok(buf)
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const OPTS: FormatOptions = FormatOptions::new();
        let s = ugly_print(self, OPTS).map_err(|_| fmt::Error)?;
        f.write_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Format;
    use crate::testutil::{double, frame, int, text};

    #[test]
    fn prints_header_and_nulls() {
        let df = frame(
            "t",
            &[("a", Format::Integer), ("b", Format::String), ("c", Format::Double)],
            vec![
                vec![int(1), text("x"), double(1.5)],
                vec![None, text(""), double(3.0)],
            ],
        );
        assert_eq!("a\tb\tc\n1\tx\t1.5\nNULL\t\t3", df.to_string());

        let opts = FormatOptions {
            null: "<null>",
            empty_string: "''",
        };
        assert_eq!(
            "a\tb\tc\n1\tx\t1.5\n<null>\t''\t3",
            ugly_print(&df, opts).unwrap()
        );
    }

    #[test]
    fn empty_frame_prints_header() {
        let df = frame("t", &[("a", Format::Integer)], Vec::new());
        assert_eq!("a", df.to_string());
    }
}
