//! Reporting utilities: parameter tables, detail text and export headers.

pub mod format;

pub use format::*;
