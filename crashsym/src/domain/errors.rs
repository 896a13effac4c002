//! Structured error types for crashsym
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SymbolError {
    #[error("Could not determine arch from input, use --arch=XXX to specify it")]
    ArchUndetermined,

    #[error("Could not find llvm tool chain directory {}", .0.display())]
    ToolchainNotFound(PathBuf),

    #[error("Could not find llvm-cxxfilt tool")]
    DemanglerNotFound,

    #[error("Failed to spawn {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("{tool} I/O failed: {source}")]
    ToolIo {
        tool: String,
        #[source]
        source: io::Error,
    },
}

impl SymbolError {
    /// Whether this error ends the whole analysis session.
    ///
    /// Everything else is scoped to one library or one address.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SymbolError::ArchUndetermined
                | SymbolError::ToolchainNotFound(_)
                | SymbolError::DemanglerNotFound
        )
    }
}
