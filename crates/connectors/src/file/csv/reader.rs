use crate::file::csv::error::FileError;
use model::{
    core::{identifiers::normalize_col_name, value::Value},
    records::record::Record,
};
use std::path::Path;
use tracing::debug;

/// Reads a headed CSV file into records, one per data row.
///
/// Headers are normalized into column names; cells are kept as text so the
/// normalizer decides how to type them. Short rows yield empty cells.
pub fn read_records(path: &Path) -> Result<Vec<Record>, FileError> {
    let shown = path.display().to_string();
    if !path.exists() {
        return Err(FileError::NotFound(shown));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|source| FileError::Csv {
            path: shown.clone(),
            source,
        })?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| FileError::Csv {
            path: shown.clone(),
            source,
        })?
        .iter()
        .map(normalize_col_name)
        .collect();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|source| FileError::Csv {
            path: shown.clone(),
            source,
        })?;
        let record: Record = headers
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), Value::from(row.get(idx).unwrap_or(""))))
            .collect();
        records.push(record);
    }

    debug!(path = %shown, rows = records.len(), columns = headers.len(), "Read CSV file");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn reads_rows_with_normalized_headers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Order Id,Order-Status,Total").unwrap();
        writeln!(file, "1001,NEW,19.99").unwrap();
        writeln!(file, "1002,DECLINED").unwrap();

        let records = read_records(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_value("order_id"), Value::from("1001"));
        assert_eq!(records[0].get_value("order_status"), Value::from("NEW"));
        assert_eq!(records[1].get_value("total"), Value::from(""));
        assert!(logs_contain("Read CSV file"));
    }

    #[test]
    fn missing_file() {
        let err = read_records(Path::new("/nonexistent/orders.csv")).unwrap_err();
        assert!(matches!(err, FileError::NotFound(_)));
    }
}
