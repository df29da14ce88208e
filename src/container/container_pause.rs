//! Suspending a container and its kernel.

use super::{Container, ContainerStatus};
use crate::error::{Result, WardenError};

impl Container {
    /// Freezes the container and its kernel. Only a created or running
    /// container can be paused.
    pub fn pause(&mut self) -> Result<()> {
        tracing::debug!("pausing container {:?}", self.id);
        if !matches!(
            self.status,
            ContainerStatus::Created | ContainerStatus::Running
        ) {
            return Err(WardenError::BadState {
                status: self.status,
                op: "pause",
            });
        }

        self.sandbox_for("pause")?.pause(&self.id)?;
        self.status = ContainerStatus::Paused;
        self.save()
    }
}
