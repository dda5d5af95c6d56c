//! Configuration module
//!
//! Compile-time defaults and the persistent record of the runtime tunables.

pub mod params;
pub mod storage;

pub use params::*;

pub use storage::{ConfigError, Crc32, WallConfig, RECORD_SIZE};
