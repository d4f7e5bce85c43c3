//! Export fitted results to CSV.
//!
//! Two artifacts, both stamped with the local time (`YYYY-MM-DD_HH-MM-SS`):
//!
//! - `results_<stamp>/<name>/output.csv` (+ `response_function.csv` for every
//!   family that has one), comma-delimited: one header row built by
//!   `report::export_header`, then one `x,y` row per point
//! - `parameters_<stamp>.csv`, `;`-delimited, one row per registry entry

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::domain::Series;
use crate::error::AppError;
use crate::report::{TABLE_HEADERS, export_header, fmt_float, table_row};
use crate::session::registry::{Registry, ResultEntry};

pub const OUTPUT_FILE: &str = "output.csv";
pub const RESPONSE_FUNCTION_FILE: &str = "response_function.csv";

pub fn timestamp_now() -> String {
    Local::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

/// Write the output (and response function) series of `entries` under
/// `dir/results_<stamp>/`. Returns the created results directory.
pub fn export_results<'a>(
    dir: &Path,
    entries: impl IntoIterator<Item = &'a ResultEntry>,
    stamp: &str,
) -> Result<PathBuf, AppError> {
    let root = dir.join(format!("results_{stamp}"));
    fs::create_dir_all(&root)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", root.display())))?;

    let mut used = HashSet::new();
    let mut written = 0usize;
    for entry in entries {
        let result = entry.result();
        let display = entry.display_name();
        let tail = display.rsplit(' ').next().unwrap_or(entry.name());

        // Names can repeat after deletions; the ordinal keeps directories apart.
        let mut dir_name = tail.to_string();
        if !used.insert(dir_name.clone()) {
            dir_name = format!("{tail}-{}", entry.ordinal());
            if !used.insert(dir_name.clone()) {
                return Err(AppError::io(format!(
                    "Cannot export '{display}': directory '{dir_name}' is already used."
                )));
            }
        }
        let entry_dir = root.join(&dir_name);
        fs::create_dir_all(&entry_dir)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", entry_dir.display())))?;

        let header = export_header(result);
        write_series_csv(&entry_dir.join(OUTPUT_FILE), &header, &result.output)?;

        if result.model_type.has_response_function() {
            if let Some(rf) = &result.response_function {
                write_series_csv(&entry_dir.join(RESPONSE_FUNCTION_FILE), &header, rf)?;
            }
        }
        written += 1;
    }

    tracing::info!(dir = %root.display(), entries = written, "exported results");
    Ok(root)
}

/// Write the parameter table to `dir/parameters_<stamp>.csv`.
pub fn export_parameters(dir: &Path, registry: &Registry, stamp: &str) -> Result<PathBuf, AppError> {
    let path = dir.join(format!("parameters_{stamp}.csv"));
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b';')
        .from_path(&path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;

    writer
        .write_record(TABLE_HEADERS)
        .map_err(|e| AppError::io(format!("Failed to write parameter table header: {e}")))?;
    for entry in registry.entries() {
        writer
            .write_record(table_row(entry))
            .map_err(|e| AppError::io(format!("Failed to write parameter table row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{}': {e}", path.display())))?;

    tracing::info!(file = %path.display(), rows = registry.count(), "exported parameter table");
    Ok(path)
}

/// Header row followed by one `x,y` row per point.
pub fn write_series_csv(path: &Path, header: &[String], series: &Series) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);

    writer
        .write_record(header)
        .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))?;
    for (x, y) in series.points() {
        writer
            .write_record([fmt_float(x), fmt_float(y)])
            .map_err(|e| AppError::io(format!("Failed to write '{}': {e}", path.display())))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{}': {e}", path.display())))
}

/// Read back a file written by [`write_series_csv`].
pub fn read_series_csv(path: &Path) -> Result<(Vec<String>, Series), AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AppError::file(format!("Failed to open '{}': {e}", path.display())))?;

    let mut records = reader.records();
    let header = match records.next() {
        Some(Ok(record)) => record.iter().map(str::to_string).collect(),
        Some(Err(e)) => return Err(AppError::file(format!("Invalid header in '{}': {e}", path.display()))),
        None => return Err(AppError::file(format!("'{}' is empty.", path.display()))),
    };

    let mut series = Series::default();
    for (idx, record) in records.enumerate() {
        let record = record.map_err(|e| AppError::file(format!("Line {}: {e}", idx + 2)))?;
        let parse = |i: usize| {
            record
                .get(i)
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| AppError::file(format!("Line {}: expected two numbers.", idx + 2)))
        };
        series.x.push(parse(0)?);
        series.y.push(parse(1)?);
    }
    Ok((header, series))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::domain::{Accuracy, FittingResult, ModelKind};

    fn result(kind: ModelKind) -> FittingResult {
        FittingResult {
            model_type: kind,
            params: vec![10.0; kind.arity()],
            accuracy: Accuracy::StdError {
                params_accuracy: vec![1.0; kind.arity()],
            },
            beta: None,
            mse: 2.0,
            model_efficiency: 0.75,
            observations: Series::new(vec![1990.0], vec![5.0]),
            output: Series::new(vec![1990.0, 1990.5, 1991.0], vec![5.5, 0.1, -3.25]),
            response_function: kind
                .has_response_function()
                .then(|| Series::new(vec![0.0, 1.0], vec![0.3, 0.2])),
        }
    }

    #[test]
    fn output_series_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OUTPUT_FILE);
        let res = result(ModelKind::Em);
        let header = export_header(&res);

        write_series_csv(&path, &header, &res.output).unwrap();
        let (read_header, series) = read_series_csv(&path).unwrap();

        assert_eq!(read_header, header);
        assert_eq!(series, res.output);
    }

    #[test]
    fn results_directory_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        registry.add("well", result(ModelKind::Pfm));
        registry.add("well", result(ModelKind::Dm));

        let root = export_results(dir.path(), registry.entries(), "2024-01-02_03-04-05").unwrap();

        assert_eq!(root, dir.path().join("results_2024-01-02_03-04-05"));
        assert!(root.join("well").join(OUTPUT_FILE).is_file());
        assert!(!root.join("well").join(RESPONSE_FUNCTION_FILE).exists());
        assert!(root.join("well_1").join(OUTPUT_FILE).is_file());
        assert!(root.join("well_1").join(RESPONSE_FUNCTION_FILE).is_file());

        let (header, rf) = read_series_csv(&root.join("well_1").join(RESPONSE_FUNCTION_FILE)).unwrap();
        assert_eq!(header[0], "DM");
        assert_eq!(rf.y, vec![0.3, 0.2]);
    }

    #[test]
    fn repeated_names_get_separate_directories() {
        let mut registry = Registry::new();
        for x in 1..=3 {
            let mut res = result(ModelKind::Pfm);
            res.output = Series::new(vec![f64::from(x)], vec![0.0]);
            registry.add("a", res);
        }
        registry.delete(&BTreeSet::from([2])).unwrap();
        let mut res = result(ModelKind::Pfm);
        res.output = Series::new(vec![4.0], vec![0.0]);
        registry.add("a", res);

        let names: Vec<String> = registry.entries().iter().map(ResultEntry::display_name).collect();
        assert_eq!(names, vec!["1. a", "2. a_2", "3. a_2"]);

        let dir = tempfile::tempdir().unwrap();
        let root = export_results(dir.path(), registry.entries(), "stamp").unwrap();

        let (_, second) = read_series_csv(&root.join("a_2").join(OUTPUT_FILE)).unwrap();
        let (_, third) = read_series_csv(&root.join("a_2-3").join(OUTPUT_FILE)).unwrap();
        assert_eq!(second.x, vec![3.0]);
        assert_eq!(third.x, vec![4.0]);
        assert_eq!(fs::read_dir(&root).unwrap().count(), 3);
    }

    #[test]
    fn parameter_table_is_semicolon_delimited() {
        let dir = tempfile::tempdir().unwrap();
        let mut registry = Registry::new();
        registry.add("well", result(ModelKind::Epm));

        let path = export_parameters(dir.path(), &registry, "stamp").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(path.file_name().unwrap(), "parameters_stamp.csv");
        assert_eq!(lines[0], "Name;Model Type;Params;Beta;MSE;ME");
        assert_eq!(lines[1], "well;EPM;10.0(1.0), 10.0(1.0);-;2.0;0.75");
    }
}
