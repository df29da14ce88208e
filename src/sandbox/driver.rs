//! The transport behind the sandbox handle. Tests substitute a recording
//! driver; everything else speaks to the real sandbox process.

use std::any::Any;
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::Arc;

use oci_spec::runtime::Spec;

use super::client::ControlDriver;
use super::sandbox::Sandbox;
use super::test::TestDriver;
use super::{Event, ExecArgs, ProcessInfo, SandboxError};
use crate::config::Config;

type Result<T> = std::result::Result<T, SandboxError>;

pub trait SandboxDriver {
    fn as_any(&self) -> &dyn Any;

    /// Forks the sandbox process and returns its pid.
    #[allow(clippy::too_many_arguments)]
    fn create(
        &self,
        id: &str,
        spec: &Spec,
        conf: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        control_address: &Path,
        io_files: Vec<OwnedFd>,
    ) -> Result<i32>;

    /// Instructs a just-created sandbox to run the root container's process.
    fn start_root(&self, sandbox: &Sandbox, spec: &Spec, conf: &Config) -> Result<()>;

    /// Starts a non-root container inside an existing sandbox.
    fn start(
        &self,
        sandbox: &Sandbox,
        spec: &Spec,
        conf: &Config,
        id: &str,
        io_files: Vec<OwnedFd>,
    ) -> Result<()>;

    fn execute(&self, sandbox: &Sandbox, id: &str, args: &ExecArgs) -> Result<i32>;
    fn event(&self, sandbox: &Sandbox, id: &str) -> Result<Event>;
    fn pause(&self, sandbox: &Sandbox, id: &str) -> Result<()>;
    fn resume(&self, sandbox: &Sandbox, id: &str) -> Result<()>;
    fn checkpoint(&self, sandbox: &Sandbox, id: &str, image_path: &Path) -> Result<()>;
    fn restore(
        &self,
        sandbox: &Sandbox,
        id: &str,
        spec: &Spec,
        conf: &Config,
        image_path: &Path,
    ) -> Result<()>;
    fn signal(&self, sandbox: &Sandbox, id: &str, signal: i32) -> Result<()>;
    fn wait(&self, sandbox: &Sandbox, id: &str) -> Result<i32>;
    fn wait_pid(&self, sandbox: &Sandbox, id: &str, pid: i32) -> Result<i32>;
    fn processes(&self, sandbox: &Sandbox, id: &str) -> Result<Vec<ProcessInfo>>;

    /// Terminates a single container within the sandbox.
    fn stop(&self, sandbox: &Sandbox, id: &str) -> Result<()>;

    /// Terminates the sandbox process itself.
    fn destroy(&self, sandbox: &Sandbox) -> Result<()>;

    /// Signal-0 liveness probe.
    fn process_alive(&self, pid: i32) -> bool;
}

pub fn create_driver() -> Arc<dyn SandboxDriver> {
    if cfg!(test) {
        Arc::<TestDriver>::default()
    } else {
        Arc::new(ControlDriver)
    }
}
