//! The durable container record and its metadata store.
//!
//! Within a root directory there is one subdirectory per container, named
//! after the container id, holding a single `meta.json` file. The record is
//! rewritten after every state change; the whole directory is deleted when
//! the container is destroyed. The format is private to this runtime, it is
//! not part of the OCI spec.

use std::fs::{DirBuilder, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use oci_spec::runtime::Spec;
use serde::{Deserialize, Serialize};

use crate::container::{ContainerStatus, OciState};
use crate::error::{Result, WardenError};
use crate::gofer;
use crate::sandbox::Sandbox;
use crate::syscall::create_syscall;
use crate::utils;

pub(crate) const METADATA_FILENAME: &str = "meta.json";

const STOP_DEADLINE: Duration = Duration::from_secs(1);
const STOP_POLL_STEP: Duration = Duration::from_millis(100);

/// A containerized application. When running, the container is associated
/// with a single sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// The container id, unique within the root directory.
    pub id: String,
    /// The OCI runtime spec that configures this container.
    pub spec: Spec,
    /// The directory containing the container bundle.
    pub bundle_dir: PathBuf,
    /// The directory holding the container metadata file.
    pub root: PathBuf,
    /// The time the container was created.
    pub created_at: DateTime<Utc>,
    /// The container owner.
    pub owner: String,
    /// Path to a unix domain socket that receives the console fd. Only used
    /// during create, never stored in the metadata.
    #[serde(skip)]
    pub console_socket: Option<PathBuf>,
    /// The current container status.
    pub status: ContainerStatus,
    /// Pid of the gofer running alongside the sandbox. 0 if the gofer has
    /// been killed or is not being used.
    pub gofer_pid: i32,
    /// The sandbox this container runs in. None when the container is
    /// stopped.
    pub sandbox: Option<Sandbox>,
}

/// Checks that the id only uses the portable character set.
pub(crate) fn validate_id(id: &str) -> Result<()> {
    let well_formed = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '.'));
    if !well_formed {
        return Err(WardenError::InvalidId { id: id.to_string() });
    }
    Ok(())
}

impl Container {
    /// Loads the container with the given id from its metadata file. `id`
    /// may be an abbreviation of the full container id, as long as it
    /// unambiguously refers to one container.
    pub fn load(root_dir: &Path, id: &str) -> Result<Container> {
        tracing::debug!("loading container {:?} from {:?}", id, root_dir);
        validate_id(id)?;

        let container_root = find_container_root(root_dir, id)?;
        let meta_file = container_root.join(METADATA_FILENAME);
        let meta = std::fs::read_to_string(&meta_file).map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                WardenError::NotFound { id: id.to_string() }
            } else {
                WardenError::ReadMetadata {
                    path: meta_file.clone(),
                    source: err,
                }
            }
        })?;
        let mut container: Container =
            serde_json::from_str(&meta).map_err(|err| WardenError::ParseMetadata {
                path: meta_file,
                source: err,
            })?;

        // A record may outlive its sandbox: reconcile the status against
        // process reality. The observation is inherently racy and is not
        // written back; the next load probes again.
        if matches!(
            container.status,
            ContainerStatus::Running | ContainerStatus::Created
        ) && !container.is_running()
        {
            container.status = ContainerStatus::Stopped;
            container.sandbox = None;
        }

        Ok(container)
    }

    /// Returns all container ids in the given root directory.
    pub fn list(root_dir: &Path) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(root_dir).map_err(|err| WardenError::ReadRootDir {
            path: root_dir.to_path_buf(),
            source: err,
        })?;
        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| WardenError::ReadRootDir {
                path: root_dir.to_path_buf(),
                source: err,
            })?;
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Persists the record. Must be called after every state change, before
    /// reporting success to the caller.
    pub(crate) fn save(&self) -> Result<()> {
        tracing::debug!("saving container {} with status {}", self.id, self.status);
        if !self.root.exists() {
            DirBuilder::new()
                .recursive(true)
                .mode(0o711)
                .create(&self.root)
                .map_err(|err| WardenError::WriteMetadata {
                    path: self.root.clone(),
                    source: err,
                })?;
        }

        let meta_file = self.root.join(METADATA_FILENAME);
        let as_error = |err: std::io::Error| WardenError::WriteMetadata {
            path: meta_file.clone(),
            source: err,
        };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .mode(0o640)
            .open(&meta_file)
            .map_err(as_error)?;
        serde_json::to_writer(&file, self).map_err(|err| WardenError::ParseMetadata {
            path: meta_file.clone(),
            source: err,
        })?;
        Ok(())
    }

    /// The OCI state of the container.
    pub fn state(&self) -> OciState {
        OciState {
            oci_version: self.spec.version().clone(),
            id: self.id.clone(),
            status: self.status,
            pid: self.pid(),
            bundle: self.bundle_dir.clone(),
            annotations: self.spec.annotations().clone(),
        }
    }

    /// Pid of the sandbox the container runs in, or -1 when the container is
    /// not running.
    pub fn pid(&self) -> i32 {
        if !matches!(
            self.status,
            ContainerStatus::Running | ContainerStatus::Created | ContainerStatus::Paused
        ) {
            return -1;
        }
        self.sandbox.as_ref().map(|s| s.pid).unwrap_or(-1)
    }

    /// Whether the sandbox or gofer process is still alive.
    pub fn is_running(&mut self) -> bool {
        if let Some(sandbox) = &self.sandbox {
            if sandbox.is_running() {
                return true;
            }
        }
        if gofer::alive(self.gofer_pid) {
            tracing::warn!("found orphan gofer process, pid: {}", self.gofer_pid);
            if let Err(err) = self.destroy_gofer() {
                tracing::warn!("error destroying gofer: {}", err);
            }
            // Don't wait for the gofer to die. Report 'running' and hope it
            // is gone next time around.
            return true;
        }
        false
    }

    pub(crate) fn destroy_gofer(&mut self) -> std::result::Result<(), gofer::GoferError> {
        let syscall = create_syscall();
        gofer::destroy(self.gofer_pid, &self.spec, &self.bundle_dir, syscall.as_ref())?;
        self.gofer_pid = 0;
        Ok(())
    }

    /// Waits for the whole sandbox to disappear, to avoid races with
    /// resources that might still be in use.
    pub(crate) fn wait_for_stopped(&mut self) -> Result<()> {
        utils::retry_until(STOP_DEADLINE, STOP_POLL_STEP, || {
            if self.is_running() {
                return Err(());
            }
            Ok(())
        })
        .map_err(|()| WardenError::ShutdownTimeout {
            id: self.id.clone(),
        })
    }

    pub(crate) fn sandbox_for(&self, op: &'static str) -> Result<&Sandbox> {
        self.sandbox.as_ref().ok_or(WardenError::BadState {
            status: self.status,
            op,
        })
    }
}

/// Resolves a full or abbreviated id to the container's root directory.
fn find_container_root(root_dir: &Path, partial_id: &str) -> Result<PathBuf> {
    // Check whether the id fully specifies an existing container.
    let container_root = root_dir.join(partial_id);
    if container_root.exists() {
        return Ok(container_root);
    }

    // Now see whether the id is an abbreviation of exactly one container id.
    let mut resolved: Option<String> = None;
    for id in Container::list(root_dir)? {
        if id.starts_with(partial_id) {
            if let Some(first) = resolved.take() {
                return Err(WardenError::Ambiguous {
                    id: partial_id.to_string(),
                    first,
                    second: id,
                });
            }
            resolved = Some(id);
        }
    }

    match resolved {
        Some(id) => {
            tracing::debug!("abbreviated id {:?} resolves to {:?}", partial_id, id);
            Ok(root_dir.join(id))
        }
        None => Err(WardenError::NotFound {
            id: partial_id.to_string(),
        }),
    }
}
