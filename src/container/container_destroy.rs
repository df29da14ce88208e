//! Teardown of containers and their resources.

use std::io::ErrorKind;

use super::{Container, ContainerStatus};
use crate::error::{Result, WardenError};
use crate::hooks;

impl Container {
    /// Frees all resources associated with the container: stops it inside
    /// the sandbox, runs poststop hooks, takes the sandbox down when this is
    /// its root container, kills the gofer and removes the metadata
    /// directory. Destroy is idempotent; teardown problems other than a
    /// failure to remove the metadata directory are logged, not returned.
    pub fn destroy(&mut self) -> Result<()> {
        tracing::debug!("destroying container {:?}", self.id);

        // First stop the container, if there still is a sandbox to ask.
        if let Some(sandbox) = self.sandbox.clone() {
            if let Err(err) = sandbox.stop(&self.id) {
                tracing::warn!("failed to stop container {}: {}", self.id, err);
            }
        }

        // "If any poststop hook fails, the runtime MUST log a warning, but
        // the remaining hooks and lifecycle continue as if the hook had
        // succeeded" -OCI spec
        if matches!(
            self.status,
            ContainerStatus::Created | ContainerStatus::Running
        ) {
            let spec_hooks = self.spec.hooks().clone();
            if let Some(hooks) = &spec_hooks {
                if let Err(err) = hooks::run_hooks(hooks.poststop().as_ref(), &self.state()) {
                    tracing::warn!("poststop hook failed for container {}: {}", self.id, err);
                }
            }
        }

        // If we are the root container of the sandbox, take the sandbox down
        // with us.
        if let Some(sandbox) = self.sandbox.clone() {
            if sandbox.is_root_container(&self.id) {
                if let Err(err) = sandbox.destroy() {
                    tracing::warn!("failed to destroy sandbox {}: {}", sandbox.id, err);
                }
            }
        }
        self.status = ContainerStatus::Stopped;
        self.sandbox = None;

        if let Err(err) = self.destroy_gofer() {
            tracing::warn!("error destroying gofer for container {}: {}", self.id, err);
        }

        match std::fs::remove_dir_all(&self.root) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(WardenError::RemoveRoot {
                path: self.root.clone(),
                source: err,
            }),
        }
    }

    /// Destroy, then wait for the sandbox process to disappear.
    ///
    /// Only meaningful for a container that does not share its sandbox: with
    /// siblings still running the sandbox stays up and the wait times out.
    pub fn destroy_and_wait(&mut self) -> Result<()> {
        self.destroy()?;
        self.wait_for_stopped()
    }
}
