//! CSV ingest for the input series and the observations.
//!
//! Both files share one layout: two numeric columns, time (decimal year)
//! then value. A leading row that does not parse as numbers is treated as a
//! header. Rows whose cells are all blank are skipped; any other malformed
//! row is an error naming its line, so the user can fix the file before a
//! run is started.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::Series;
use crate::error::AppError;

/// Read the tracer input series (e.g. tritium in precipitation).
pub fn read_input_series(path: &Path) -> Result<Series, AppError> {
    read_series(path, "input")
}

/// Read the observed concentrations the model is fitted to.
pub fn read_observation_series(path: &Path) -> Result<Series, AppError> {
    read_series(path, "observations")
}

/// Dataset name used for result entries: the file stem.
pub fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

fn read_series(path: &Path, what: &str) -> Result<Series, AppError> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if extension != "csv" && extension != "txt" {
        return Err(AppError::file(format!(
            "Unsupported {what} file format '{}'; export the sheet as CSV.",
            path.display()
        )));
    }

    let file = File::open(path)
        .map_err(|e| AppError::file(format!("Failed to open {what} file '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut x = Vec::new();
    let mut y = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        let record = result.map_err(|e| AppError::file(format!("Line {line}: CSV parse error: {e}")))?;

        if record.iter().all(str::is_empty) {
            continue;
        }

        match parse_pair(&record) {
            Ok((t, v)) => {
                x.push(t);
                y.push(v);
            }
            // First non-blank row may be a header.
            Err(_) if x.is_empty() && line == 1 => continue,
            Err(msg) => return Err(AppError::file(format!("Line {line}: {msg}"))),
        }
    }

    if x.is_empty() {
        return Err(AppError::file(format!(
            "No data rows found in {what} file '{}'.",
            path.display()
        )));
    }

    tracing::debug!(file = %path.display(), rows = x.len(), what, "series loaded");
    Ok(Series::new(x, y))
}

fn parse_pair(record: &StringRecord) -> Result<(f64, f64), String> {
    if record.len() < 2 {
        return Err(format!("expected 2 columns, found {}.", record.len()));
    }
    let t = parse_cell(&record[0])?;
    let v = parse_cell(&record[1])?;
    Ok((t, v))
}

fn parse_cell(cell: &str) -> Result<f64, String> {
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("invalid number '{cell}'.")),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::error::ErrorKind;

    fn csv_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_rows_and_skips_header() {
        let file = csv_file("year,tritium\n1960.5, 120.0\n1961.5,80\n\n");
        let series = read_input_series(file.path()).unwrap();
        assert_eq!(series.x, vec![1960.5, 1961.5]);
        assert_eq!(series.y, vec![120.0, 80.0]);
    }

    #[test]
    fn headerless_file_is_accepted() {
        let file = csv_file("1990,10.5\n1995,8.25\n");
        let series = read_observation_series(file.path()).unwrap();
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn malformed_row_names_its_line() {
        let file = csv_file("year,value\n1990,10\n1991,abc\n");
        let err = read_observation_series(file.path()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::File);
        assert!(err.message().starts_with("Line 3"), "{}", err.message());
    }

    #[test]
    fn empty_or_missing_files_are_file_errors() {
        let file = csv_file("year,value\n");
        assert_eq!(read_input_series(file.path()).unwrap_err().kind(), ErrorKind::File);

        let missing = Path::new("/definitely/not/here.csv");
        assert_eq!(read_input_series(missing).unwrap_err().kind(), ErrorKind::File);

        let xlsx = Path::new("data.xlsx");
        assert!(read_input_series(xlsx).unwrap_err().message().contains("CSV"));
    }

    #[test]
    fn dataset_name_is_file_stem() {
        assert_eq!(dataset_name(Path::new("/data/well_7.csv")), "well_7");
    }
}
