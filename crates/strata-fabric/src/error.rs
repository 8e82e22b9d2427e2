use std::io;

/// Errors produced by the journal and event plumbing.
#[derive(Debug, thiserror::Error)]
pub enum FabricError {
    /// I/O error while reading or writing the journal.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A single record exceeds the frame size limit.
    #[error("journal entry of {size} bytes exceeds the {limit} byte limit")]
    EntryTooLarge { size: usize, limit: usize },

    /// Another thread panicked while holding the journal lock.
    #[error("journal lock poisoned")]
    Poisoned,
}

/// Convenience alias used throughout the fabric crate.
pub type Result<T> = std::result::Result<T, FabricError>;
