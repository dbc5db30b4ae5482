//! Error types for the node registry.

use crate::shutdown::Cancelled;
use std::error::Error;
use std::fmt;

/// Errors returned by [`NodeRegistry`](crate::NodeRegistry) operations.
#[derive(Debug)]
pub enum RegistryError {
    /// The registry holds no candidate row.
    NotFound,
    /// The row being inserted already exists.
    AlreadyExists,
    /// Storage stayed busy for every retry attempt.
    StorageConflict {
        operation: &'static str,
        attempts: u32,
    },
    /// Unexpected storage failure, not retried.
    StorageProblem {
        operation: &'static str,
        source: rusqlite::Error,
    },
    /// Shutdown was requested while waiting to retry.
    Cancelled,
    /// The blocking storage task panicked or was aborted.
    BlockingTaskFailed,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound => write!(f, "no node found in registry"),
            RegistryError::AlreadyExists => write!(f, "node already exists in registry"),
            RegistryError::StorageConflict {
                operation,
                attempts,
            } => write!(
                f,
                "{operation}: storage still busy after {attempts} attempts"
            ),
            RegistryError::StorageProblem { operation, source } => {
                write!(f, "{operation}: storage problem: {source}")
            }
            RegistryError::Cancelled => write!(f, "registry operation cancelled"),
            RegistryError::BlockingTaskFailed => write!(f, "registry task failed to complete"),
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RegistryError::StorageProblem { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<Cancelled> for RegistryError {
    fn from(_: Cancelled) -> Self {
        RegistryError::Cancelled
    }
}
