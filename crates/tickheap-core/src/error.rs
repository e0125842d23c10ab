use thiserror::Error;

/// Errors surfaced by the tickheap crates.
#[derive(Error, Debug)]
pub enum TickheapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    /// The engine's owner loop is gone, so a command could not be delivered or answered.
    #[error("timer engine is closed")]
    EngineClosed,
}

pub type Result<T> = std::result::Result<T, TickheapError>;
