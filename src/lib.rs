//! # Warden
//!
//! Warden is the lifecycle manager of a sandboxed OCI-compatible runtime. It
//! implements the user-visible runtime contract (create, start, exec, pause,
//! resume, checkpoint, kill, delete, wait, list, state) while delegating
//! in-sandbox execution to a separate sandbox process and filesystem access
//! to a separate gofer process.
//!
//! Container metadata is kept on disk under a root directory, one
//! subdirectory per container, so that an independent invocation of the
//! runtime can reattach to a running sandbox.

pub mod config;
pub mod container;
pub mod error;
pub mod fs;
pub mod gofer;
pub mod hooks;
pub mod sandbox;
pub mod specutils;
pub mod syscall;
pub mod utils;

pub use error::{Result, WardenError};
