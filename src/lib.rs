//! `tracer-fit` library crate.
//!
//! The binary (`tracer`) is a thin wrapper around this library so that:
//!
//! - the session core is testable without a terminal or a real engine
//! - the fitting engine stays behind one trait
//! - front-ends (TUI, headless) share one controller

pub mod app;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod error;
pub mod io;
pub mod report;
pub mod session;
pub mod tui;
