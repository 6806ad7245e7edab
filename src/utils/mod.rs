//! Shared helpers: logging setup and string utilities.

pub mod logging;
pub mod string;
