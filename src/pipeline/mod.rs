//! Pipeline stages for one conversion request.
//!
//! Each submodule implements exactly one step; [`crate::convert`] wires them
//! together.
//!
//! ```text
//! fetch ──▶ workspace ──▶ command ──▶ exec
//! (URL)     (stage input) (argv)      (child process)
//! ```
//!
//! 1. [`fetch`]: download bytes for URL inputs and derive a filename
//! 2. [`workspace`]: unique scratch directory, canonical input name, cleanup
//! 3. [`command`]: tool-specific argument vector and expected output path
//! 4. [`exec`]: spawn with a deadline, capture output, kill on timeout

pub mod command;
pub mod exec;
pub mod fetch;
pub mod workspace;
