//! Waiting for container processes to exit.

use super::{Container, ContainerStatus};
use crate::error::{Result, WardenError};

impl Container {
    /// Blocks until the container exits and returns its wait status.
    pub fn wait(&self) -> Result<i32> {
        tracing::debug!("waiting on container {:?}", self.id);
        if self.status == ContainerStatus::Stopped {
            return Err(WardenError::BadState {
                status: self.status,
                op: "wait on",
            });
        }
        Ok(self.sandbox_for("wait on")?.wait(&self.id)?)
    }

    /// Blocks until process `pid` in the container's PID namespace exits and
    /// returns its wait status.
    pub fn wait_pid(&mut self, pid: i32) -> Result<i32> {
        tracing::debug!("waiting on pid {} in container {:?}", pid, self.id);
        if self.status == ContainerStatus::Stopped {
            return Err(WardenError::BadState {
                status: self.status,
                op: "wait on",
            });
        }

        let sandbox = self.sandbox_for("wait on")?.clone();
        let wait_status = sandbox.wait_pid(&self.id, pid)?;
        if sandbox.is_root_container(&self.id) {
            // When the waited process is the root container's, give the
            // sandbox process time to exit to prevent races with resources
            // that might still be in use.
            self.wait_for_stopped()?;
        }
        Ok(wait_status)
    }

    /// Blocks until process `pid` in the sandbox's own PID namespace exits
    /// and returns its wait status.
    pub fn wait_root_pid(&self, pid: i32) -> Result<i32> {
        if self.status == ContainerStatus::Stopped {
            return Err(WardenError::BadState {
                status: self.status,
                op: "wait on",
            });
        }

        let sandbox = self.sandbox_for("wait on")?;
        tracing::debug!("waiting on pid {} in sandbox {:?}", pid, sandbox.id);
        let sandbox_id = sandbox.id.clone();
        Ok(sandbox.wait_pid(&sandbox_id, pid)?)
    }
}
