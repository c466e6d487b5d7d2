//! Domain model for the restaurant insights pipeline.
//!
//! Everything here is plain data: the fixed [`Stage`] order, the
//! [`AnalysisSession`] record with its checkpoint and thought-trace logs, and
//! the typed payloads each stage contributes to [`AnalysisData`].

pub mod domain;
mod error;

pub use domain::*;
pub use error::{CoreError, Result};
