//! Creation of new containers.

use std::path::Path;

use chrono::Utc;
use oci_spec::runtime::Spec;

use super::container::validate_id;
use super::{Container, ContainerStatus};
use crate::config::Config;
use crate::error::{Result, WardenError};
use crate::gofer;
use crate::sandbox::Sandbox;
use crate::specutils;
use crate::syscall::create_syscall;
use crate::utils;

impl Container {
    /// Creates the container in a new sandbox process, unless the spec's
    /// annotations say it joins an existing sandbox. The container is in
    /// status `Created` afterwards; its process is not running until
    /// [`Container::start`].
    ///
    /// Any failure after the first irreversible side effect destroys the
    /// container before returning, so a failed create leaves no trace.
    pub fn create(
        id: &str,
        spec: Spec,
        conf: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        pid_file: Option<&Path>,
    ) -> Result<Container> {
        tracing::debug!("creating container {:?} in root dir {:?}", id, conf.root_dir);
        validate_id(id)?;

        let container_root = conf.root_dir.join(id);
        if container_root.exists() {
            return Err(WardenError::AlreadyExists { id: id.to_string() });
        }

        let mut container = Container {
            id: id.to_string(),
            spec,
            bundle_dir: bundle_dir.to_path_buf(),
            root: container_root,
            created_at: Utc::now(),
            owner: std::env::var("USER").unwrap_or_default(),
            console_socket: console_socket.map(Path::to_path_buf),
            status: ContainerStatus::Creating,
            gofer_pid: 0,
            sandbox: None,
        };

        if specutils::should_create_sandbox(&container.spec) || !conf.multi_container {
            tracing::debug!("creating new sandbox for container {:?}", id);
            let syscall = create_syscall();
            let (io_files, gofer_pid) =
                gofer::spawn(&container.spec, conf, bundle_dir, syscall.as_ref())?;
            container.gofer_pid = gofer_pid;

            // The gofer is running; from here on every failure must destroy
            // the container.
            match Sandbox::create(
                id,
                &container.spec,
                conf,
                bundle_dir,
                container.console_socket.as_deref(),
                io_files,
            ) {
                Ok(sandbox) => container.sandbox = Some(sandbox),
                Err(err) => {
                    let _ = container.destroy();
                    return Err(err.into());
                }
            }
        } else {
            // The spec's annotations carry the id of the sandbox to join,
            // which is the id of the root container of that sandbox.
            let sandbox_id =
                specutils::sandbox_id(&container.spec).ok_or(WardenError::MissingSandboxId)?;
            tracing::debug!("creating container {:?} in sandbox {:?}", id, sandbox_id);

            let root_container = match Container::load(&conf.root_dir, &sandbox_id) {
                Ok(root_container) => root_container,
                Err(err) => {
                    let _ = container.destroy();
                    return Err(err);
                }
            };
            match root_container.sandbox {
                Some(sandbox) => container.sandbox = Some(sandbox),
                None => {
                    let _ = container.destroy();
                    return Err(WardenError::SandboxNotRunning { id: sandbox_id });
                }
            }
        }
        container.status = ContainerStatus::Created;

        if let Err(err) = container.save() {
            let _ = container.destroy();
            return Err(err);
        }

        // Consumers treat the pid file as the completion of create, so it is
        // written after everything else succeeded.
        if let Some(pid_file) = pid_file {
            if let Err(err) = utils::write_pid_file(pid_file, container.pid()) {
                let _ = container.destroy();
                return Err(WardenError::PidFile {
                    path: pid_file.to_path_buf(),
                    source: err,
                });
            }
        }

        Ok(container)
    }

    /// Create + start + wait, returning the container's wait status.
    pub fn run(
        id: &str,
        spec: Spec,
        conf: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        pid_file: Option<&Path>,
    ) -> Result<i32> {
        tracing::debug!("running container {:?} in root dir {:?}", id, conf.root_dir);
        let mut container =
            Container::create(id, spec, conf, bundle_dir, console_socket, pid_file)?;
        container.start(conf)?;
        container.wait()
    }
}
