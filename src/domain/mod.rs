//! Domain types used throughout the session.
//!
//! This module defines:
//!
//! - the closed set of model families (`ModelKind`)
//! - fit requests (`ModelVariant`, `ComputationRequest`)
//! - engine outputs (`FittingResult`, `Accuracy`, `Series`)

pub mod types;

pub use types::*;
