//! LLTM SDK
//!
//! Shared library providing the memory record model and error types for
//! LLTM components. This crate is used by the engine and by anything that
//! writes documents into a memory index.

/// Error types and handling
pub mod errors;

/// Memory record types
pub mod types;

// Re-export commonly used types
pub use errors::{EngineError, LltmErrorExt};
pub use types::{AccessList, Document, DocumentRevision, MemoryRecord, NewDocument, Privacy};
