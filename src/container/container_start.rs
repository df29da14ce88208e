//! Starting the containerized process inside the sandbox.

use std::path::Path;

use oci_spec::runtime::Spec;

use super::{Container, ContainerStatus};
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::gofer;
use crate::hooks;
use crate::specutils;
use crate::syscall::create_syscall;

impl Container {
    /// Starts the container process. Prestart hook failures stop and destroy
    /// the container; poststart hook failures only log a warning.
    #[allow(deprecated)]
    pub fn start(&mut self, conf: &Config) -> Result<()> {
        tracing::debug!("starting container {:?}", self.id);
        if self.status != ContainerStatus::Created {
            return Err(WardenError::BadState {
                status: self.status,
                op: "start",
            });
        }

        let spec_hooks = self.spec.hooks().clone();

        // "If any prestart hook fails, the runtime MUST generate an error,
        // stop and destroy the container" -OCI spec
        if let Some(hooks) = &spec_hooks {
            if let Err(err) = hooks::run_hooks(hooks.prestart().as_ref(), &self.state()) {
                let _ = self.destroy();
                return Err(WardenError::Hook {
                    phase: "prestart",
                    source: err,
                });
            }
        }

        let sandbox = self.sandbox_for("start")?.clone();
        if specutils::should_create_sandbox(&self.spec) || !conf.multi_container {
            if let Err(err) = sandbox.start_root(&self.spec, conf) {
                let _ = self.destroy();
                return Err(err.into());
            }
        } else {
            // A joining container brings its own gofer into the shared
            // sandbox.
            let syscall = create_syscall();
            let (io_files, gofer_pid) =
                gofer::spawn(&self.spec, conf, &self.bundle_dir, syscall.as_ref())?;
            self.gofer_pid = gofer_pid;
            if let Err(err) = sandbox.start(&self.spec, conf, &self.id, io_files) {
                let _ = self.destroy();
                return Err(err.into());
            }
        }

        // "If any poststart hook fails, the runtime MUST log a warning, but
        // the remaining hooks and lifecycle continue as if the hook had
        // succeeded" -OCI spec
        if let Some(hooks) = &spec_hooks {
            if let Err(err) = hooks::run_hooks(hooks.poststart().as_ref(), &self.state()) {
                tracing::warn!("poststart hook failed for container {}: {}", self.id, err);
            }
        }

        self.status = ContainerStatus::Running;
        self.save()
    }

    /// Replaces the sandbox's kernel and file system state with the contents
    /// of the image file, then considers the container running.
    pub fn restore(&mut self, spec: &Spec, conf: &Config, image_path: &Path) -> Result<()> {
        tracing::debug!("restoring container {:?}", self.id);
        if self.status != ContainerStatus::Created {
            return Err(WardenError::BadState {
                status: self.status,
                op: "restore",
            });
        }

        let sandbox = self.sandbox_for("restore")?;
        sandbox.restore(&self.id, spec, conf, image_path)?;
        self.status = ContainerStatus::Running;
        self.save()
    }
}
