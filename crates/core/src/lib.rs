//! Job execution engine for audio stem separation.
//!
//! Spawns one external separator process per job, multiplexes its output
//! streams, estimates progress from elapsed time and hands a single terminal
//! record to pollers. All subprocess management is here; the HTTP surface
//! lives in `stemsep-api`.

pub mod config;
pub mod conversion;
pub mod engine;
pub mod error;
pub mod job;
pub mod models;
pub mod postprocess;
pub mod progress;
pub mod separator;
pub mod store;
pub mod supervisor;
pub mod toolchain;
pub mod types;
