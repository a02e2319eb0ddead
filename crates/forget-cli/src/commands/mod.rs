//! CLI command implementations

pub mod completions;
pub mod io;
pub mod relationships;
pub mod traverse;
