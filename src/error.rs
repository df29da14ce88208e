//! Crate-wide error taxonomy.

use std::path::PathBuf;

use crate::container::ContainerStatus;
use crate::fs::MountError;
use crate::gofer::GoferError;
use crate::hooks::HookError;
use crate::sandbox::SandboxError;

pub type Result<T> = std::result::Result<T, WardenError>;

#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    #[error("invalid container id {id:?}")]
    InvalidId { id: String },
    #[error("container {id:?} does not exist")]
    NotFound { id: String },
    #[error("container id {id:?} is ambiguous, it could refer to {first:?} or {second:?}")]
    Ambiguous {
        id: String,
        first: String,
        second: String,
    },
    #[error("container {id:?} already exists")]
    AlreadyExists { id: String },
    #[error("cannot {op} container in state {status}")]
    BadState {
        status: ContainerStatus,
        op: &'static str,
    },
    #[error("spec does not name a sandbox to join")]
    MissingSandboxId,
    #[error("sandbox {id:?} is not running")]
    SandboxNotRunning { id: String },
    #[error("sandbox for container {id:?} did not shut down in time")]
    ShutdownTimeout { id: String },
    #[error("{phase} hook failed")]
    Hook {
        phase: &'static str,
        #[source]
        source: HookError,
    },
    #[error(transparent)]
    Mount(#[from] MountError),
    #[error(transparent)]
    Gofer(#[from] GoferError),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("failed to read container metadata from {path:?}")]
    ReadMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write container metadata to {path:?}")]
    WriteMetadata {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse container metadata at {path:?}")]
    ParseMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read root directory {path:?}")]
    ReadRootDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write pid file {path:?}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to remove container root directory {path:?}")]
    RemoveRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
