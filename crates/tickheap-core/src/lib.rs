//! # tickheap core
//!
//! Configuration and error types shared by the scheduler crate and the demo binary.

pub mod config;
pub mod error;

pub use config::{Strategy, TickheapConfig, TimerConfig};
pub use error::{Result, TickheapError};
