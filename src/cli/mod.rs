//! Command-line parsing for the tracer fit session tool.
//!
//! Argument parsing stays here; dispatch lives in [`crate::app`].

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::ModelKind;
use crate::session::config::DEFAULT_ALPHA;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "tracer", version, about = "Tritium tracer-method model fitting sessions")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Launch the interactive TUI.
    Tui(TuiArgs),
    /// Fit a batch of models without the TUI and print the parameter table.
    Run(RunArgs),
}

/// Options shared by every front-end.
#[derive(Debug, Args, Clone)]
pub struct EngineArgs {
    /// Command line of the fitting engine (JSON request on stdin, result on stdout).
    #[arg(long, env = "TRACER_ENGINE")]
    pub engine: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct TuiArgs {
    /// Input series CSV (time, value).
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Observations CSV (time, value).
    #[arg(short, long)]
    pub observations: Option<PathBuf>,

    /// Directory where results and parameter tables are saved.
    #[arg(long, default_value = ".")]
    pub export_dir: PathBuf,

    /// Log file (the terminal is taken by the UI).
    #[arg(long, env = "TRACER_LOG_FILE", default_value = "tracer.log")]
    pub log_file: PathBuf,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Input series CSV (time, value).
    #[arg(short, long)]
    pub input: PathBuf,

    /// Observations CSV (time, value).
    #[arg(short, long)]
    pub observations: PathBuf,

    /// Model families to fit, in order. Repeatable.
    #[arg(short, long = "model", value_enum, required = true)]
    pub models: Vec<ModelKind>,

    /// Parameter bounds, e.g. `EPM.T=1:50` or `DM.PD=0.05:0.5`. Repeatable.
    #[arg(long = "bound", value_name = "KIND.PARAM=LO:HI", value_parser = parse_bound)]
    pub bounds: Vec<BoundArg>,

    /// Enable beta refinement for a family, e.g. `EM=0.7`. Repeatable.
    #[arg(long = "beta", value_name = "KIND=VALUE", value_parser = parse_beta)]
    pub betas: Vec<BetaArg>,

    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    pub alpha: f64,

    /// Ask the engine for confidence intervals instead of plain accuracies.
    #[arg(long)]
    pub uncertainty: bool,

    /// Write every result and the parameter table under this directory.
    #[arg(long, value_name = "DIR")]
    pub export: Option<PathBuf>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundArg {
    pub kind: ModelKind,
    pub param: usize,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaArg {
    pub kind: ModelKind,
    pub value: f64,
}

fn parse_kind(code: &str) -> Result<ModelKind, String> {
    ModelKind::from_code(code).ok_or_else(|| format!("unknown model '{code}' (expected PFM, EM, EPM or DM)"))
}

fn parse_number(text: &str) -> Result<f64, String> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("invalid number '{text}'"))
}

pub fn parse_bound(s: &str) -> Result<BoundArg, String> {
    let (key, range) = s.split_once('=').ok_or("expected KIND.PARAM=LO:HI")?;
    let (kind, param) = key.split_once('.').ok_or("expected KIND.PARAM before '='")?;
    let kind = parse_kind(kind)?;

    let param = param.trim();
    let index = kind
        .param_csv_names()
        .iter()
        .position(|name| name.eq_ignore_ascii_case(param))
        .ok_or_else(|| {
            format!(
                "{} has no parameter '{param}' (expected one of {})",
                kind.code(),
                kind.param_csv_names().join(", ")
            )
        })?;

    let (lo, hi) = range.split_once(':').ok_or("expected LO:HI after '='")?;
    Ok(BoundArg {
        kind,
        param: index,
        lower: parse_number(lo)?,
        upper: parse_number(hi)?,
    })
}

pub fn parse_beta(s: &str) -> Result<BetaArg, String> {
    let (kind, value) = s.split_once('=').ok_or("expected KIND=VALUE")?;
    Ok(BetaArg {
        kind: parse_kind(kind)?,
        value: parse_number(value)?,
    })
}
