//! Core library for the report-tools command line application.
//!
//! Each tool turns a loosely structured spreadsheet export into a formatted
//! report. The stages stay small and composable: workbook adapters live under
//! [`io`], header discovery in [`detect`], label binding and body projection
//! in [`reconcile`], per-tool post-processing in [`derive`], and the named
//! tool configurations in [`profile`]. [`pipeline`] wires the stages together.

pub mod dates;
pub mod derive;
pub mod detect;
pub mod error;
pub mod io;
pub mod meta;
pub mod model;
pub mod pipeline;
pub mod profile;
pub mod reconcile;
pub mod summary;

pub use error::{Result, ToolError};
