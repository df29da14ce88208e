//! Thawing a paused container.

use super::{Container, ContainerStatus};
use crate::error::{Result, WardenError};

impl Container {
    /// Unfreezes the container and its kernel. Only a paused container can
    /// be resumed.
    pub fn resume(&mut self) -> Result<()> {
        tracing::debug!("resuming container {:?}", self.id);
        if self.status != ContainerStatus::Paused {
            return Err(WardenError::BadState {
                status: self.status,
                op: "resume",
            });
        }

        self.sandbox_for("resume")?.resume(&self.id)?;
        self.status = ContainerStatus::Running;
        self.save()
    }
}
