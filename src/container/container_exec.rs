//! Introspection of and execution inside a live container.

use super::{Container, ContainerStatus};
use crate::error::{Result, WardenError};
use crate::sandbox::{Event, ExecArgs, ProcessInfo};

impl Container {
    /// Runs the specified command inside the container and returns its wait
    /// status.
    pub fn execute(&self, args: &ExecArgs) -> Result<i32> {
        tracing::debug!("executing command in container {:?}", self.id);
        if !matches!(
            self.status,
            ContainerStatus::Created | ContainerStatus::Running
        ) {
            return Err(WardenError::BadState {
                status: self.status,
                op: "exec in",
            });
        }
        Ok(self.sandbox_for("exec in")?.execute(&self.id, args)?)
    }

    /// Returns an accounting snapshot for the container.
    pub fn event(&self) -> Result<Event> {
        tracing::debug!("getting events for container {:?}", self.id);
        if !matches!(
            self.status,
            ContainerStatus::Created | ContainerStatus::Running
        ) {
            return Err(WardenError::BadState {
                status: self.status,
                op: "get events for",
            });
        }
        Ok(self.sandbox_for("get events for")?.event(&self.id)?)
    }

    /// Enumerates the processes in the container's PID namespace.
    pub fn processes(&self) -> Result<Vec<ProcessInfo>> {
        if !matches!(
            self.status,
            ContainerStatus::Running | ContainerStatus::Paused
        ) {
            return Err(WardenError::BadState {
                status: self.status,
                op: "get processes of",
            });
        }
        Ok(self.sandbox_for("get processes of")?.processes(&self.id)?)
    }
}
