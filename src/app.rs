//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments
//! - builds the fitting engine
//! - runs either the TUI or a headless batch

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, EngineArgs, RunArgs, TuiArgs};
use crate::engine::{CommandEngine, FitEngine};
use crate::error::AppError;
use crate::session::orchestrator::RunEvent;
use crate::session::{Session, SessionConfig};

/// Environment variable holding the log filter directives.
pub const LOG_ENV: &str = "TRACER_LOG";

/// Entry point for the `tracer` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // `tracer` and `tracer -i in.csv` behave like `tracer tui ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Tui(args) => handle_tui(args),
        Command::Run(args) => handle_run(args),
    }
}

fn handle_tui(args: TuiArgs) -> Result<(), AppError> {
    init_logging(Some(&args.log_file))?;
    let engine = engine_from_args(&args.engine)?;

    let config = SessionConfig {
        input_file: args.input.clone(),
        observations_file: args.observations.clone(),
        ..SessionConfig::default()
    };
    crate::tui::run(Session::new(engine, config), args.export_dir)
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    init_logging(None)?;
    let engine = engine_from_args(&args.engine)?;
    let mut session = Session::new(engine, session_config_from_args(&args));

    session.start_run()?;
    session.wait(|event, registry| match event {
        RunEvent::Started { label } => eprintln!("{label}..."),
        RunEvent::Progress { label, .. } => eprintln!("  {label}"),
        RunEvent::ResultReady { .. } => {
            if let Some(entry) = registry.entries().last() {
                eprintln!("  {} ({})", entry.display_name(), entry.result().model_type.code());
            }
        }
        RunEvent::Failed { variant, error } => eprintln!("  {} failed: {error}", variant.kind.code()),
        RunEvent::Finished { cancelled: true } => eprintln!("Cancelled."),
        RunEvent::Finished { cancelled: false } => {}
    });

    println!("{}", crate::report::format_table(session.registry()));

    if let Some(dir) = &args.export {
        fs::create_dir_all(dir)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", dir.display())))?;
        if !session.registry().is_empty() {
            session.toggle_check_all();
            let results = session.export_checked(dir)?;
            println!("Results written to {}", results.display());
        }
        let table = session.export_parameter_table(dir)?;
        println!("Parameters written to {}", table.display());
    }

    if session.registry().is_empty() && !session.failures().is_empty() {
        return Err(AppError::fit(format!(
            "All {} model fits failed.",
            session.failures().len()
        )));
    }
    Ok(())
}

pub fn session_config_from_args(args: &RunArgs) -> SessionConfig {
    let mut config = SessionConfig {
        input_file: Some(args.input.clone()),
        observations_file: Some(args.observations.clone()),
        alpha: args.alpha,
        want_uncertainty: args.uncertainty,
        ..SessionConfig::default()
    };

    for &kind in &args.models {
        config.model_mut(kind).enabled = true;
    }
    config.run_order = args.models.clone();
    for bound in &args.bounds {
        let model = config.model_mut(bound.kind);
        model.on_upper_changed(bound.param, bound.upper);
        model.on_lower_changed(bound.param, bound.lower);
    }
    for beta in &args.betas {
        let model = config.model_mut(beta.kind);
        model.beta_enabled = true;
        model.beta = beta.value;
    }
    config
}

fn engine_from_args(args: &EngineArgs) -> Result<Arc<dyn FitEngine>, AppError> {
    let line = args.engine.as_deref().ok_or_else(|| {
        AppError::config("No fitting engine configured; pass --engine or set TRACER_ENGINE.")
    })?;
    let engine = CommandEngine::from_command_line(line)?;
    tracing::debug!(program = engine.program(), "fitting engine configured");
    Ok(Arc::new(engine))
}

/// Install the global subscriber. Logs go to `log_file` when given, stderr otherwise.
fn init_logging(log_file: Option<&Path>) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AppError::io(format!("Failed to open log file '{}': {e}", path.display())))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if let Err(e) = installed {
        // Already installed (tests, embedding); keep the existing one.
        tracing::debug!("logging already initialised: {e}");
    }
    Ok(())
}

/// Rewrite argv so `tracer` defaults to `tracer tui`.
///
/// Rules:
/// - `tracer`                          -> `tracer tui`
/// - `tracer -i in.csv ...`            -> `tracer tui -i in.csv ...`
/// - `tracer --help/--version/-h`      -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("tui".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    if matches!(arg1.as_str(), "tui" | "run") {
        return argv;
    }

    if arg1.starts_with('-') {
        argv.insert(1, "tui".to_string());
    }
    argv
}
