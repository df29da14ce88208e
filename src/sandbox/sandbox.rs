//! The serializable sandbox handle.

use std::fmt;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use oci_spec::runtime::Spec;
use serde::{Deserialize, Serialize};

use super::driver::{create_driver, SandboxDriver};
use super::{Event, ExecArgs, ProcessInfo, SandboxError};
use crate::config::Config;

const CONTROL_SOCKET_NAME: &str = "control.sock";

type Result<T> = std::result::Result<T, SandboxError>;

/// A handle to a running sandbox: its id (equal to the id of the root
/// container), the pid of the sandbox process and the control endpoint. The
/// handle is a value; containers and the manager hold copies of it and
/// reload it from the metadata store by id.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sandbox {
    pub id: String,
    pub pid: i32,
    pub control_address: PathBuf,
    #[serde(skip, default = "create_driver")]
    pub(crate) driver: Arc<dyn SandboxDriver>,
}

impl fmt::Debug for Sandbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sandbox")
            .field("id", &self.id)
            .field("pid", &self.pid)
            .field("control_address", &self.control_address)
            .finish()
    }
}

impl Sandbox {
    /// Forks a new sandbox process for the root container `id` and returns
    /// the handle to it. `io_files` are the sandbox-side ends of the gofer
    /// socket pairs and are consumed by the child.
    pub fn create(
        id: &str,
        spec: &Spec,
        conf: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        io_files: Vec<OwnedFd>,
    ) -> Result<Self> {
        let control_address = conf.root_dir.join(id).join(CONTROL_SOCKET_NAME);
        let driver = create_driver();
        let pid = driver.create(
            id,
            spec,
            conf,
            bundle_dir,
            console_socket,
            &control_address,
            io_files,
        )?;
        tracing::info!("sandbox started, pid: {}", pid);

        Ok(Self {
            id: id.to_string(),
            pid,
            control_address,
            driver,
        })
    }

    pub fn start_root(&self, spec: &Spec, conf: &Config) -> Result<()> {
        tracing::debug!("starting root container in sandbox {}", self.id);
        self.driver.start_root(self, spec, conf)
    }

    pub fn start(
        &self,
        spec: &Spec,
        conf: &Config,
        id: &str,
        io_files: Vec<OwnedFd>,
    ) -> Result<()> {
        tracing::debug!("starting container {} in sandbox {}", id, self.id);
        self.driver.start(self, spec, conf, id, io_files)
    }

    pub fn execute(&self, id: &str, args: &ExecArgs) -> Result<i32> {
        self.driver.execute(self, id, args)
    }

    pub fn event(&self, id: &str) -> Result<Event> {
        self.driver.event(self, id)
    }

    pub fn pause(&self, id: &str) -> Result<()> {
        self.driver.pause(self, id)
    }

    pub fn resume(&self, id: &str) -> Result<()> {
        self.driver.resume(self, id)
    }

    pub fn checkpoint(&self, id: &str, image_path: &Path) -> Result<()> {
        self.driver.checkpoint(self, id, image_path)
    }

    pub fn restore(
        &self,
        id: &str,
        spec: &Spec,
        conf: &Config,
        image_path: &Path,
    ) -> Result<()> {
        self.driver.restore(self, id, spec, conf, image_path)
    }

    pub fn signal(&self, id: &str, signal: i32) -> Result<()> {
        self.driver.signal(self, id, signal)
    }

    pub fn wait(&self, id: &str) -> Result<i32> {
        self.driver.wait(self, id)
    }

    pub fn wait_pid(&self, id: &str, pid: i32) -> Result<i32> {
        self.driver.wait_pid(self, id, pid)
    }

    pub fn processes(&self, id: &str) -> Result<Vec<ProcessInfo>> {
        self.driver.processes(self, id)
    }

    pub fn stop(&self, id: &str) -> Result<()> {
        self.driver.stop(self, id)
    }

    pub fn destroy(&self) -> Result<()> {
        tracing::debug!("destroying sandbox {}", self.id);
        self.driver.destroy(self)
    }

    /// Whether the sandbox process still exists.
    pub fn is_running(&self) -> bool {
        self.driver.process_alive(self.pid)
    }

    /// The root container is the container the sandbox was created for; its
    /// id names the sandbox.
    pub fn is_root_container(&self, id: &str) -> bool {
        self.id == id
    }
}
