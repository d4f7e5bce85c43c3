//! Engine adapter that shells out to an external program.
//!
//! Protocol:
//! - the request is written to the child's stdin as one JSON document (`EngineRequest`)
//! - the child writes one `FittingResult` JSON document to stdout and exits 0
//! - anything else (spawn failure, non-zero exit, malformed JSON) is a fit error

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread;

use serde::Serialize;

use crate::domain::{FittingResult, ModelVariant, Series};
use crate::engine::FitEngine;
use crate::error::AppError;

#[derive(Debug, Serialize)]
struct EngineRequest<'a> {
    dataset: &'a Series,
    observations: &'a Series,
    alpha: f64,
    models: &'a [ModelVariant],
    calculate_uncertainty: bool,
}

/// Runs the configured command once per fit call.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from a whitespace-separated command line (e.g. `python3 fit.py`).
    pub fn from_command_line(line: &str) -> Result<Self, AppError> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let Some(program) = parts.next() else {
            return Err(AppError::config(
                "No fit engine configured. Pass `--engine <command>` or set TRACER_ENGINE.",
            ));
        };
        Ok(Self::new(program, parts.collect()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl FitEngine for CommandEngine {
    fn fit(
        &self,
        dataset: &Series,
        observations: &Series,
        alpha: f64,
        variants: &[ModelVariant],
        want_uncertainty: bool,
    ) -> Result<FittingResult, AppError> {
        let request = EngineRequest {
            dataset,
            observations,
            alpha,
            models: variants,
            calculate_uncertainty: want_uncertainty,
        };
        let payload = serde_json::to_vec(&request)
            .map_err(|e| AppError::fit(format!("Failed to encode engine request: {e}")))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::fit(format!("Failed to start fit engine '{}': {e}", self.program)))?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        // Both output pipes are drained while the request is written, so an
        // engine that talks before it reads cannot stall either side.
        let (sent, status, stdout, stderr) = thread::scope(|scope| {
            let stdout = scope.spawn(move || read_pipe(stdout));
            let stderr = scope.spawn(move || read_pipe(stderr));

            let sent = match stdin {
                Some(mut stdin) => stdin.write_all(&payload),
                None => Ok(()),
            };

            let status = match child.wait() {
                Ok(status) => Ok(status),
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    Err(e)
                }
            };
            (sent, status, join_pipe(stdout), join_pipe(stderr))
        });

        let status = status.map_err(|e| AppError::fit(format!("Fit engine did not complete: {e}")))?;
        if !status.success() {
            let stderr = stderr.unwrap_or_default();
            return Err(AppError::fit(format!(
                "Fit engine exited with {status}: {}",
                String::from_utf8_lossy(&stderr).trim()
            )));
        }
        sent.map_err(|e| AppError::fit(format!("Failed to send request to fit engine: {e}")))?;
        let stdout = stdout.map_err(|e| AppError::fit(format!("Failed to read fit engine output: {e}")))?;

        serde_json::from_slice(&stdout)
            .map_err(|e| AppError::fit(format!("Invalid fit engine output: {e}")))
    }
}

fn read_pipe(pipe: Option<impl Read>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        pipe.read_to_end(&mut buf)?;
    }
    Ok(buf)
}

fn join_pipe(handle: thread::ScopedJoinHandle<'_, io::Result<Vec<u8>>>) -> io::Result<Vec<u8>> {
    handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe reader panicked")))
}
