//! Signal delivery and checkpointing.

use std::path::Path;

use super::{Container, ContainerStatus};
use crate::error::Result;

impl Container {
    /// Delivers a signal to the container's init process. Signaling a
    /// stopped container is not an error; the signal is simply dropped.
    pub fn signal(&self, signal: i32) -> Result<()> {
        tracing::debug!("signaling container {:?}", self.id);
        if self.status == ContainerStatus::Stopped {
            tracing::warn!(
                "container {} not running, not sending signal {}",
                self.id,
                signal
            );
            return Ok(());
        }
        // TODO: query the container for its resulting state and save it.
        Ok(self.sandbox_for("kill")?.signal(&self.id, signal)?)
    }

    /// Writes a state image of the container to the given path.
    pub fn checkpoint(&self, image_path: &Path) -> Result<()> {
        tracing::debug!("checkpointing container {:?}", self.id);
        if self.status == ContainerStatus::Stopped {
            tracing::warn!("container {} not running, not checkpointing", self.id);
            return Ok(());
        }
        Ok(self.sandbox_for("checkpoint")?.checkpoint(&self.id, image_path)?)
    }
}
