//! Text formatting for result tables, detail panels and export headers.

use crate::domain::FittingResult;
use crate::session::registry::{Registry, ResultEntry};

/// Column headers of the parameter table (and of `parameters_*.csv`).
pub const TABLE_HEADERS: [&str; 6] = ["Name", "Model Type", "Params", "Beta", "MSE", "ME"];

/// Round to `sig` significant digits (ties to even).
pub fn round_sig(value: f64, sig: i32) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let digits = sig - value.abs().log10().floor() as i32 - 1;
    if digits >= 0 {
        let factor = 10f64.powi(digits);
        (value * factor).round_ties_even() / factor
    } else {
        let factor = 10f64.powi(-digits);
        (value / factor).round_ties_even() * factor
    }
}

/// Shortest round-trip rendering of a float, always with a fractional part
/// (`2000.0`, `0.25`, `33.0`).
pub fn fmt_float(value: f64) -> String {
    format!("{value:?}")
}

/// `12.5(0.5), 1.2(0.01)`: each parameter with its accuracy at two significant digits.
pub fn params_with_accuracy(result: &FittingResult) -> String {
    result
        .params
        .iter()
        .zip(result.accuracy.per_param())
        .map(|(&p, &acc)| format!("{}({})", fmt_float(p), fmt_float(round_sig(acc, 2))))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `τ = 12.5 (0.5), η = 1.2 (0.01)` for the detail panel.
pub fn params_display(result: &FittingResult) -> String {
    result
        .model_type
        .param_symbols()
        .iter()
        .zip(&result.params)
        .zip(result.accuracy.per_param())
        .map(|((sym, &p), &acc)| format!("{sym} = {} ({})", fmt_float(p), fmt_float(round_sig(acc, 2))))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Beta as reported in tables and exports. A zero beta counts as absent.
fn reported_beta(result: &FittingResult) -> Option<f64> {
    result.beta.filter(|&beta| beta != 0.0)
}

pub fn beta_text(result: &FittingResult) -> String {
    reported_beta(result).map(fmt_float).unwrap_or_else(|| "-".to_string())
}

/// Header row of `output.csv` / `response_function.csv`:
/// `[modelType, "T=12.5(12.0)", ..., "beta=0.5"?]`.
pub fn export_header(result: &FittingResult) -> Vec<String> {
    let mut header = vec![result.model_type.code().to_string()];
    header.extend(
        result
            .model_type
            .param_csv_names()
            .iter()
            .zip(&result.params)
            .map(|(name, &p)| format!("{name}={}({})", fmt_float(p), fmt_float(round_sig(p, 2)))),
    );
    if let Some(beta) = reported_beta(result) {
        header.push(format!("beta={}", fmt_float(beta)));
    }
    header
}

/// One row of the parameter table.
pub fn table_row(entry: &ResultEntry) -> [String; 6] {
    let result = entry.result();
    [
        entry.name().to_string(),
        result.model_type.code().to_string(),
        params_with_accuracy(result),
        beta_text(result),
        fmt_float(result.mse),
        fmt_float(result.model_efficiency),
    ]
}

/// Render the whole registry as an aligned text table.
pub fn format_table(registry: &Registry) -> String {
    let rows: Vec<[String; 6]> = registry.entries().iter().map(table_row).collect();

    let mut widths = TABLE_HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let mut push_row = |cells: &[String]| {
        let line = cells
            .iter()
            .zip(widths)
            .map(|(c, w)| format!("{c:<w$}"))
            .collect::<Vec<_>>()
            .join("  ");
        out.push_str(line.trim_end());
        out.push('\n');
    };

    push_row(&TABLE_HEADERS.map(str::to_string));
    for row in &rows {
        push_row(row);
    }
    out
}
