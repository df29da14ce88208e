//! Supervision of the gofer process that serves the sandbox's filesystem.
//!
//! The gofer is the runtime binary re-invoked with the `gofer` subcommand.
//! It inherits one end of a socket pair per served mount; the other ends are
//! handed to the sandbox. The gofer runs inside the container's user
//! namespace so that its view of file ownership matches the sandbox.

use std::fmt::Write as _;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use nix::sched::CloneFlags;
use nix::sys::signal::{kill, Signal};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use nix::unistd::Pid;
use oci_spec::runtime::{LinuxNamespaceType, Spec};

use crate::config::{Config, FileAccess};
use crate::fs::{self, MountError};
use crate::specutils;
use crate::syscall::Syscall;
use crate::utils;

const TEARDOWN_DEADLINE: Duration = Duration::from_secs(3);
const TEARDOWN_STEP: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum GoferError {
    #[error(transparent)]
    Mounts(#[from] MountError),
    #[error("failed to create io socket pair")]
    SocketPair(#[source] nix::errno::Errno),
    #[error("failed to locate runtime binary")]
    BinPath(#[source] std::io::Error),
    #[error("failed to fork gofer process")]
    Fork(#[source] std::io::Error),
    #[error("gofer filesystem teardown did not finish before the deadline")]
    Teardown(#[source] MountError),
}

type Result<T> = std::result::Result<T, GoferError>;

/// Prepares the container's mounts and forks the gofer. Returns the
/// sandbox-side socket ends and the gofer pid. With direct file access no
/// gofer is needed and `(vec![], 0)` is returned.
pub fn spawn(
    spec: &Spec,
    conf: &Config,
    bundle_dir: &Path,
    syscall: &dyn Syscall,
) -> Result<(Vec<OwnedFd>, i32)> {
    if conf.file_access == FileAccess::Direct {
        // The sandbox will access the host filesystem directly.
        return Ok((Vec::new(), 0));
    }

    fs::setup(spec, bundle_dir, syscall)?;

    let mut args = conf.to_flags();
    args.push("gofer".to_string());
    args.push("--bundle".to_string());
    args.push(bundle_dir.display().to_string());
    if conf.overlay {
        // A writable overlay hides the host files; the gofer must never see
        // a write.
        args.push("--panic-on-write=true".to_string());
    }

    // One socket pair for the root mount plus one per mount the gofer
    // serves.
    let mount_count = 1 + spec
        .mounts()
        .as_ref()
        .map(|mounts| mounts.iter().filter(|m| specutils::is_gofer_mount(m)).count())
        .unwrap_or(0);

    let mut sandbox_ends = Vec::with_capacity(mount_count);
    let mut gofer_ends = Vec::with_capacity(mount_count);
    // The gofer sees its ends at consecutive descriptors starting at 3,
    // right after stdio.
    for i in 0..mount_count {
        let (sandbox_end, gofer_end) = socketpair(
            AddressFamily::Unix,
            SockType::Stream,
            None,
            SockFlag::SOCK_CLOEXEC,
        )
        .map_err(GoferError::SocketPair)?;
        sandbox_ends.push(sandbox_end);
        gofer_ends.push(gofer_end);
        args.push(format!("--io-fds={}", 3 + i));
    }

    let bin_path = specutils::bin_path().map_err(GoferError::BinPath)?;
    tracing::debug!("starting gofer: {:?} {:?}", bin_path, args);

    let mut command = Command::new(bin_path);
    command.args(args).stdin(Stdio::null());

    let raw_fds: Vec<RawFd> = gofer_ends.iter().map(|fd| fd.as_raw_fd()).collect();
    let namespace = user_namespace_setup(spec);
    unsafe {
        command.pre_exec(move || {
            // dup2 also clears the close-on-exec flag on the new fd.
            for (i, fd) in raw_fds.iter().enumerate() {
                nix::unistd::dup2(*fd, 3 + i as RawFd)
                    .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
            }
            namespace.enter()
        });
    }

    let child = command.spawn().map_err(GoferError::Fork)?;
    tracing::info!("gofer started, pid: {}", child.id());

    // The gofer-side ends are dropped here, closing our copies.
    Ok((sandbox_ends, child.id() as i32))
}

/// Kills the gofer and retries the filesystem cleanup until it goes through.
/// The gofer may take a moment to release its mounts after SIGKILL.
pub fn destroy(
    gofer_pid: i32,
    spec: &Spec,
    bundle_dir: &Path,
    syscall: &dyn Syscall,
) -> Result<()> {
    if gofer_pid != 0 {
        tracing::debug!("killing gofer, pid: {}", gofer_pid);
        if let Err(errno) = kill(Pid::from_raw(gofer_pid), Signal::SIGKILL) {
            if errno != nix::errno::Errno::ESRCH {
                tracing::warn!("error sending SIGKILL to gofer {}: {}", gofer_pid, errno);
            }
        }
    }

    utils::retry_until(TEARDOWN_DEADLINE, TEARDOWN_STEP, || {
        fs::teardown(spec, bundle_dir, syscall)
    })
    .map_err(GoferError::Teardown)
}

/// Signal-0 probe. A gofer that outlives its sandbox is an orphan; it should
/// have died with the sandbox.
pub fn alive(gofer_pid: i32) -> bool {
    gofer_pid != 0 && kill(Pid::from_raw(gofer_pid), None).is_ok()
}

/// User-namespace entry for the gofer child, precomputed in the parent so
/// the post-fork hook only performs syscalls and plain writes.
struct UserNamespaceSetup {
    join_path: Option<PathBuf>,
    create: bool,
    uid_map: String,
    gid_map: String,
}

fn user_namespace_setup(spec: &Spec) -> UserNamespaceSetup {
    let linux = spec.linux().as_ref();
    let user_ns = linux
        .and_then(|l| l.namespaces().as_ref())
        .and_then(|nss| {
            nss.iter()
                .find(|ns| ns.typ() == LinuxNamespaceType::User)
        });

    let id_map = |mappings: Option<&Vec<oci_spec::runtime::LinuxIdMapping>>| {
        let mut out = String::new();
        for m in mappings.into_iter().flatten() {
            let _ = writeln!(out, "{} {} {}", m.container_id(), m.host_id(), m.size());
        }
        out
    };

    UserNamespaceSetup {
        join_path: user_ns.and_then(|ns| ns.path().clone()),
        create: user_ns.is_some(),
        uid_map: id_map(linux.and_then(|l| l.uid_mappings().as_ref())),
        gid_map: id_map(linux.and_then(|l| l.gid_mappings().as_ref())),
    }
}

impl UserNamespaceSetup {
    /// Runs between fork and exec in the gofer child.
    fn enter(&self) -> std::io::Result<()> {
        let as_io_error = |errno: nix::errno::Errno| std::io::Error::from_raw_os_error(errno as i32);

        if let Some(path) = &self.join_path {
            let ns_file = std::fs::File::open(path)?;
            nix::sched::setns(ns_file, CloneFlags::CLONE_NEWUSER).map_err(as_io_error)?;
            return Ok(());
        }

        if !self.create {
            return Ok(());
        }

        nix::sched::unshare(CloneFlags::CLONE_NEWUSER).map_err(as_io_error)?;
        if !self.gid_map.is_empty() {
            std::fs::write("/proc/self/setgroups", "deny")?;
            std::fs::write("/proc/self/gid_map", &self.gid_map)?;
        }
        if !self.uid_map.is_empty() {
            std::fs::write("/proc/self/uid_map", &self.uid_map)?;
        }
        Ok(())
    }
}
