//! Command-line front end of the adverse-event pipeline.

pub mod cli;
pub mod logging;
pub mod options;
