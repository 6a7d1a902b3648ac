use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ModError {
    #[error("File Error: {0}")]
    FileError(String),
    #[error("Audio Error: {0}")]
    AudioError(String),
    #[error("Module too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("Out of memory: {0}")]
    OutOfMemory(String),
}
