//! lineflow-cli library, exposed for unit tests.

pub mod commands;
pub mod output;
pub mod progress;
