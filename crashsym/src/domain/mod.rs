//! Domain model for crashsym
//!
//! This module contains core domain types and errors that provide:
//! - Compile-time separation of address text, symbols and locations
//! - Self-documenting function signatures
//! - Structured error handling

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{Address, Arch, ObjectSymbol, SourceFrame, SymbolRecord};

pub use errors::SymbolError;
