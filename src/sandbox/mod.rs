//! Client side of the sandbox process.
//!
//! The sandbox executes container workloads in its own kernel; the manager
//! only holds a handle to it (id, pid, control endpoint) and issues commands
//! over the control channel. One sandbox may serve several containers, so
//! every command names the container it applies to.

pub mod client;
pub mod driver;
#[allow(clippy::module_inception)]
pub mod sandbox;
pub mod test;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use driver::{create_driver, SandboxDriver};
pub use sandbox::Sandbox;

#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    #[error("failed to fork sandbox process")]
    Fork(#[source] std::io::Error),
    #[error("failed to connect to sandbox control socket {address:?}")]
    Connect {
        address: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode control request")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode control response")]
    Decode(#[source] serde_json::Error),
    #[error("sandbox rejected {method}: {message}")]
    Rejected { method: String, message: String },
}

/// Arguments for running a command inside an existing container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecArgs {
    pub argv: Vec<String>,
    pub envv: Vec<String>,
    pub cwd: PathBuf,
    pub uid: u32,
    pub gid: u32,
}

/// Accounting snapshot for a single container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(rename = "type")]
    pub typ: String,
    pub data: serde_json::Value,
}

/// One process inside a container's PID namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessInfo {
    pub uid: u32,
    pub pid: i32,
    pub ppid: i32,
    pub time: String,
    pub cmd: String,
}
