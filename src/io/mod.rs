//! Input/output helpers.
//!
//! - CSV ingest of the input series and observations (`ingest`)
//! - result and parameter-table exports (`export`)

pub mod export;
pub mod ingest;

pub use export::*;
pub use ingest::*;
