use std::path::Path;

use common::error::AppError;
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use serde::Serialize;
use tracing::debug;

/// How many rows the summarizer sees.
const SAMPLE_ROW_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TableColumnInfo {
    pub name: String,
    pub column_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TableSchema {
    pub table_name: String,
    pub columns: Vec<TableColumnInfo>,
    pub row_count: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct TableSnapshot {
    pub schema: TableSchema,
    pub sample_rows: Vec<Vec<String>>,
}

/// Scoped analytical session for one knowledge's tabular data.
///
/// Backed by an in-process SQLite database whose lifetime is the session
/// itself; dropping the session releases everything, on every exit path.
/// `rusqlite` is synchronous, so callers run the whole session inside
/// `spawn_blocking`.
pub(crate) struct TableSession {
    connection: Connection,
    table_name: String,
}

impl TableSession {
    pub(crate) fn open(knowledge_id: &str) -> Result<Self, AppError> {
        let connection = Connection::open_in_memory()?;
        Ok(Self {
            connection,
            table_name: sanitize_identifier(knowledge_id),
        })
    }

    /// Load the knowledge's file into the session table.
    ///
    /// Spreadsheet formats pass the upload gate but need a CSV export step
    /// upstream; the loader surfaces them as unsupported.
    pub(crate) fn load(&mut self, file_type: &str, path: &Path) -> Result<(), AppError> {
        match file_type {
            "csv" => self.load_csv(path),
            "xlsx" | "xls" => Err(AppError::Unsupported(format!(
                "{file_type} tables must be exported to csv before summarization"
            ))),
            other => Err(AppError::Unsupported(format!(
                "file type {other} for table summary"
            ))),
        }
    }

    fn load_csv(&mut self, path: &Path) -> Result<(), AppError> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(sanitize_identifier)
            .collect();
        if headers.is_empty() {
            return Err(AppError::Unsupported("csv file has no header row".into()));
        }

        let mut rows: Vec<Vec<String>> = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }

        let column_types = infer_column_types(&headers, &rows);
        let column_defs: Vec<String> = headers
            .iter()
            .zip(&column_types)
            .map(|(name, column_type)| format!("\"{name}\" {column_type}"))
            .collect();
        self.connection.execute(
            &format!(
                "CREATE TABLE \"{}\" ({})",
                self.table_name,
                column_defs.join(", ")
            ),
            [],
        )?;

        let placeholders: Vec<&str> = headers.iter().map(|_| "?").collect();
        let insert_sql = format!(
            "INSERT INTO \"{}\" VALUES ({})",
            self.table_name,
            placeholders.join(", ")
        );
        let tx = self.connection.transaction()?;
        {
            let mut statement = tx.prepare(&insert_sql)?;
            for row in &rows {
                statement.execute(rusqlite::params_from_iter(row.iter()))?;
            }
        }
        tx.commit()?;

        debug!(table = %self.table_name, rows = rows.len(), "csv loaded into session table");
        Ok(())
    }

    /// Schema plus the first rows, the way the summarizer consumes them.
    pub(crate) fn snapshot(&self) -> Result<TableSnapshot, AppError> {
        let row_count: u64 = self.connection.query_row(
            &format!("SELECT COUNT(*) FROM \"{}\"", self.table_name),
            [],
            |row| row.get::<_, i64>(0),
        )? as u64;

        let mut columns = Vec::new();
        let mut pragma = self
            .connection
            .prepare(&format!("PRAGMA table_info(\"{}\")", self.table_name))?;
        let mut pragma_rows = pragma.query([])?;
        while let Some(row) = pragma_rows.next()? {
            columns.push(TableColumnInfo {
                name: row.get::<_, String>(1)?,
                column_type: row.get::<_, String>(2)?,
            });
        }

        let mut select = self.connection.prepare(&format!(
            "SELECT * FROM \"{}\" LIMIT {SAMPLE_ROW_LIMIT}",
            self.table_name
        ))?;
        let column_count = select.column_count();
        let mut sample_rows = Vec::new();
        let mut select_rows = select.query([])?;
        while let Some(row) = select_rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for index in 0..column_count {
                values.push(render_value(row.get_ref(index)?));
            }
            sample_rows.push(values);
        }

        Ok(TableSnapshot {
            schema: TableSchema {
                table_name: self.table_name.clone(),
                columns,
                row_count,
            },
            sample_rows,
        })
    }
}

fn render_value(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

/// Keep identifiers alphanumeric so they can be double-quoted safely.
fn sanitize_identifier(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "col".to_string()
    } else {
        cleaned
    }
}

fn infer_column_types(headers: &[String], rows: &[Vec<String>]) -> Vec<String> {
    (0..headers.len())
        .map(|index| {
            let mut saw_value = false;
            let mut all_integer = true;
            let mut all_real = true;
            for row in rows {
                let Some(value) = row.get(index) else {
                    continue;
                };
                if value.is_empty() {
                    continue;
                }
                saw_value = true;
                if value.parse::<i64>().is_err() {
                    all_integer = false;
                }
                if value.parse::<f64>().is_err() {
                    all_real = false;
                }
            }
            if !saw_value {
                "TEXT".to_string()
            } else if all_integer {
                "INTEGER".to_string()
            } else if all_real {
                "REAL".to_string()
            } else {
                "TEXT".to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn csv_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(content.as_bytes()).expect("write csv");
        file
    }

    #[test]
    fn loads_csv_and_reports_schema_and_samples() {
        let file = csv_file("name,age,score\nalice,30,9.5\nbob,41,7.25\n");
        let mut session = TableSession::open("know 1").expect("open");
        session.load("csv", file.path()).expect("load");

        let snapshot = session.snapshot().expect("snapshot");
        assert_eq!(snapshot.schema.table_name, "know_1");
        assert_eq!(snapshot.schema.row_count, 2);

        let names: Vec<&str> = snapshot
            .schema
            .columns
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["name", "age", "score"]);
        let types: Vec<&str> = snapshot
            .schema
            .columns
            .iter()
            .map(|c| c.column_type.as_str())
            .collect();
        assert_eq!(types, vec!["TEXT", "INTEGER", "REAL"]);

        assert_eq!(snapshot.sample_rows.len(), 2);
        assert_eq!(snapshot.sample_rows[0], vec!["alice", "30", "9.5"]);
    }

    #[test]
    fn sampling_stops_at_ten_rows() {
        let mut content = String::from("n\n");
        for i in 0..25 {
            content.push_str(&format!("{i}\n"));
        }
        let file = csv_file(&content);
        let mut session = TableSession::open("big").expect("open");
        session.load("csv", file.path()).expect("load");

        let snapshot = session.snapshot().expect("snapshot");
        assert_eq!(snapshot.schema.row_count, 25);
        assert_eq!(snapshot.sample_rows.len(), 10);
    }

    #[test]
    fn spreadsheets_are_rejected_as_unsupported() {
        let file = csv_file("a,b\n1,2\n");
        let mut session = TableSession::open("sheet").expect("open");
        let outcome = session.load("xlsx", file.path());
        assert!(matches!(outcome, Err(AppError::Unsupported(_))));
    }
}
