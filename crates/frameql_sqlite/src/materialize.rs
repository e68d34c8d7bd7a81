//! Copying frames into native SQLite tables.
use frameql_core::dataframe::DataFrame;
use frameql_core::schema::Schema;
use frameql_error::{DbError, Result};
use rusqlite::types::Value as SqlValue;

use crate::convert::value_to_sql;

/// Maximum number of bound parameters in a single statement.
pub const SQLITE_MAX_PARAMS: usize = 32766;

/// Quote an identifier for use in generated SQL.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` statement for a frame.
pub fn create_table_sql(name: &str, schema: &Schema) -> String {
    let columns = schema
        .iter()
        .map(|f| format!("{} {}", quote_identifier(&f.name), f.format.sql_type_name()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({columns})", quote_identifier(name))
}

/// Rows per insert, capped so a statement stays under the parameter limit.
pub fn rows_per_batch(batch_size: usize, num_columns: usize) -> usize {
    let max_rows = SQLITE_MAX_PARAMS / num_columns.max(1);
    batch_size.min(max_rows).max(1)
}

fn insert_sql(name: &str, num_columns: usize, num_rows: usize) -> String {
    let placeholders = format!("({})", vec!["?"; num_columns].join(","));
    format!(
        "INSERT INTO {} VALUES {}",
        quote_identifier(name),
        vec![placeholders.as_str(); num_rows].join(",")
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertBatch {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Statements that load a frame into a native table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableLoad {
    pub table: String,
    pub create: String,
    pub batches: Vec<InsertBatch>,
}

impl TableLoad {
    /// Build the statements for loading `frame`.
    ///
    /// This does all the value conversion up front so that executing the
    /// load only needs the connection for binding and stepping.
    pub fn try_new(frame: &DataFrame, batch_size: usize, layout: &str) -> Result<Self> {
        let num_columns = frame.num_columns();
        if num_columns == 0 {
            return Err(DbError::new("Cannot register a frame with no columns")
                .with_field("table", frame.name()));
        }

        let rows_per_batch = rows_per_batch(batch_size, num_columns);
        let full_sql = insert_sql(frame.name(), num_columns, rows_per_batch);

        let batches = frame
            .rows()
            .chunks(rows_per_batch)
            .map(|chunk| {
                let sql = if chunk.len() == rows_per_batch {
                    full_sql.clone()
                } else {
                    insert_sql(frame.name(), num_columns, chunk.len())
                };
                let params = chunk
                    .iter()
                    .flat_map(|row| row.values().iter().map(|v| value_to_sql(v, layout)))
                    .collect();
                InsertBatch { sql, params }
            })
            .collect();

        Ok(TableLoad {
            table: frame.name().to_string(),
            create: create_table_sql(frame.name(), frame.schema()),
            batches,
        })
    }

    pub fn num_rows(&self, num_columns: usize) -> usize {
        self.batches.iter().map(|b| b.params.len()).sum::<usize>() / num_columns.max(1)
    }
}

#[cfg(test)]
mod tests {
    use frameql_core::format::Format;
    use frameql_core::testutil::{frame, int, text};

    use super::*;

    #[test]
    fn quoting() {
        assert_eq!("\"t\"", quote_identifier("t"));
        assert_eq!("\"a\"\"b\"", quote_identifier("a\"b"));
    }

    #[test]
    fn create_statement() {
        let df = frame(
            "t1",
            &[
                ("a", Format::Integer),
                ("b", Format::String),
                ("c", Format::DateTime),
            ],
            Vec::new(),
        );
        assert_eq!(
            "CREATE TABLE \"t1\" (\"a\" integer, \"b\" text, \"c\" datetime)",
            create_table_sql(df.name(), df.schema())
        );
    }

    #[test]
    fn batch_caps() {
        assert_eq!(500, rows_per_batch(500, 2));
        assert_eq!(32, rows_per_batch(500, 1000));
        assert_eq!(1, rows_per_batch(500, 40_000));
        assert_eq!(1, rows_per_batch(0, 1));
    }

    #[test]
    fn batches_cover_all_rows() {
        let df = frame(
            "t",
            &[("a", Format::Integer), ("b", Format::String)],
            (0..5).map(|i| vec![int(i), text("x")]).collect(),
        );

        let load = TableLoad::try_new(&df, 2, "%Y").unwrap();
        assert_eq!(3, load.batches.len());
        assert_eq!(
            "INSERT INTO \"t\" VALUES (?,?),(?,?)",
            load.batches[0].sql
        );
        assert_eq!("INSERT INTO \"t\" VALUES (?,?)", load.batches[2].sql);
        assert_eq!(5, load.num_rows(2));
    }

    #[test]
    fn empty_schema_rejected() {
        let df = frame("t", &[], Vec::new());
        TableLoad::try_new(&df, 10, "%Y").unwrap_err();
    }
}
