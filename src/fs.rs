//! Prepares the container's view of the host filesystem before the sandbox
//! and the gofer open it.
//!
//! Bind mounts from the spec are materialized under the container root so
//! that the gofer can be chrooted there. Mount destinations may traverse
//! symlinks inside the container root; they are resolved the way the
//! container would resolve them, without ever escaping the root.

use std::fs::{DirBuilder, OpenOptions};
use std::io::ErrorKind;
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt};
use std::path::{Component, Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};
use oci_spec::runtime::{Mount, Spec};

use crate::specutils;
use crate::syscall::Syscall;
use crate::utils::PathBufExt;

const MAX_SYMLINK_TRAVERSALS: u32 = 255;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("mount {destination:?} has no source")]
    NoSource { destination: PathBuf },
    #[error("failed to stat mount source {path:?}")]
    SourceMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("spec has no root filesystem path")]
    NoRootPath,
    #[error("too many symlinks to follow, path: {path:?}")]
    TooManySymlinks { path: PathBuf },
    #[error("failed to resolve mount destination {path:?}")]
    ResolveDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create mount point {path:?}")]
    CreateMountPoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to mount {src:?} at {target:?} with flags {flags:?}")]
    Mount {
        src: PathBuf,
        target: PathBuf,
        flags: MsFlags,
        #[source]
        errno: nix::errno::Errno,
    },
    #[error("failed to remount root {path:?} read-only")]
    RemountRoot {
        path: PathBuf,
        #[source]
        errno: nix::errno::Errno,
    },
    #[error("failed to unmount {path:?}")]
    Umount {
        path: PathBuf,
        #[source]
        errno: nix::errno::Errno,
    },
}

type Result<T> = std::result::Result<T, MountError>;

/// Bind mounts every supported mount of the spec under the container root,
/// creating missing mount points, then remounts the root read-only if the
/// spec asks for it.
pub fn setup(spec: &Spec, bundle_dir: &Path, syscall: &dyn Syscall) -> Result<()> {
    let root = specutils::root_path(spec, bundle_dir).ok_or(MountError::NoRootPath)?;

    if let Some(mounts) = spec.mounts() {
        for mount in mounts {
            if mount.typ().as_deref() != Some("bind") || !specutils::is_supported_mount(mount) {
                continue;
            }
            setup_bind_mount(&root, mount, bundle_dir, syscall)?;
        }
    }

    let readonly = spec
        .root()
        .as_ref()
        .map(|r| r.readonly().unwrap_or(false))
        .unwrap_or(false);
    if readonly {
        tracing::debug!("remounting root as readonly: {:?}", root);
        let flags =
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY | MsFlags::MS_REC;
        syscall
            .mount(Some(&root), &root, Some("bind"), flags, None)
            .map_err(|errno| MountError::RemountRoot {
                path: root.clone(),
                errno,
            })?;
    }

    Ok(())
}

fn setup_bind_mount(
    root: &Path,
    mount: &Mount,
    bundle_dir: &Path,
    syscall: &dyn Syscall,
) -> Result<()> {
    let source = mount.source().as_ref().ok_or(MountError::NoSource {
        destination: mount.destination().clone(),
    })?;
    let source = if source.is_absolute() {
        source.clone()
    } else {
        bundle_dir.join(source)
    };
    let source_info = source
        .metadata()
        .map_err(|err| MountError::SourceMissing {
            path: source.clone(),
            source: err,
        })?;

    // The destination may follow symlinks inside the container.
    let destination = resolve_symlinks(root, mount.destination())?;

    if let Err(err) = destination.symlink_metadata() {
        if err.kind() != ErrorKind::NotFound {
            return Err(MountError::ResolveDestination {
                path: destination.clone(),
                source: err,
            });
        }
        create_mount_point(&destination, source_info.is_dir())?;
    }

    let flags = options_to_flags(mount.options().as_deref().unwrap_or(&[])) | MsFlags::MS_BIND;
    tracing::debug!(
        "mounting source: {:?}, destination: {:?}, flags: {:?}",
        source,
        destination,
        flags
    );
    syscall
        .mount(Some(&source), &destination, Some("bind"), flags, None)
        .map_err(|errno| MountError::Mount {
            src: source,
            target: destination,
            flags,
            errno,
        })
}

fn create_mount_point(destination: &Path, is_dir: bool) -> Result<()> {
    let as_error = |err| MountError::CreateMountPoint {
        path: destination.to_path_buf(),
        source: err,
    };

    let mut dir_builder = DirBuilder::new();
    dir_builder.recursive(true).mode(0o755);
    if is_dir {
        dir_builder.create(destination).map_err(as_error)?;
    } else {
        if let Some(parent) = destination.parent() {
            dir_builder.create(parent).map_err(as_error)?;
        }
        OpenOptions::new()
            .create(true)
            .write(true)
            .mode(0o755)
            .open(destination)
            .map_err(as_error)?;
    }
    Ok(())
}

/// Unmounts everything `setup` mounted, lazily. Called when the gofer is
/// torn down; mounts that were never made or are already gone are not
/// errors.
pub fn teardown(spec: &Spec, bundle_dir: &Path, syscall: &dyn Syscall) -> Result<()> {
    let root = match specutils::root_path(spec, bundle_dir) {
        Some(root) => root,
        None => return Ok(()),
    };

    if let Some(mounts) = spec.mounts() {
        for mount in mounts {
            if mount.typ().as_deref() != Some("bind") || !specutils::is_supported_mount(mount) {
                continue;
            }
            let destination = resolve_symlinks(&root, mount.destination())?;
            lazy_umount(&destination, syscall)?;
        }
    }

    lazy_umount(&root, syscall)
}

fn lazy_umount(target: &Path, syscall: &dyn Syscall) -> Result<()> {
    match syscall.umount(target, MntFlags::MNT_DETACH) {
        Ok(()) => Ok(()),
        // EINVAL: not a mount point. ENOENT: the path never existed.
        Err(nix::errno::Errno::EINVAL) | Err(nix::errno::Errno::ENOENT) => Ok(()),
        Err(errno) => Err(MountError::Umount {
            path: target.to_path_buf(),
            errno,
        }),
    }
}

/// Walks `rel` having `root` as the root directory. Symlinks are evaluated
/// relative to `root` so that the result is the same path the container
/// itself would reach, and `..` cannot escape the root. Components that do
/// not exist terminate the walk cleanly so that mount points can be created.
pub fn resolve_symlinks(root: &Path, rel: &Path) -> Result<PathBuf> {
    resolve_symlinks_impl(root, root.to_path_buf(), rel, MAX_SYMLINK_TRAVERSALS)
}

fn resolve_symlinks_impl(
    root: &Path,
    base: PathBuf,
    rel: &Path,
    follow_count: u32,
) -> Result<PathBuf> {
    if follow_count == 0 {
        return Err(MountError::TooManySymlinks {
            path: base.join(rel),
        });
    }

    let mut base = base;
    for component in rel.components() {
        let name = match component {
            Component::RootDir | Component::CurDir | Component::Prefix(..) => continue,
            Component::ParentDir => Path::new(".."),
            Component::Normal(name) => Path::new(name),
        };

        let path = base.join(name).normalize();
        if !path.starts_with(root) {
            // One cannot '..' their way out of root.
            base = root.to_path_buf();
            continue;
        }

        let metadata = match path.symlink_metadata() {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // No symlink to check, keep walking dirs.
                base = path;
                continue;
            }
            Err(err) => {
                return Err(MountError::ResolveDestination { path, source: err });
            }
        };

        if metadata.file_type().is_symlink() {
            let link = path
                .read_link()
                .map_err(|err| MountError::ResolveDestination { path, source: err })?;
            if link.is_absolute() {
                base = root.to_path_buf();
            }
            base = resolve_symlinks_impl(root, base, &link, follow_count - 1)?;
            continue;
        }

        base = path;
    }

    Ok(base)
}

/// Folds mount options into mount flags following the mount(8) option table.
/// Options marked "set" OR their bit in, options marked "clear" XOR it out.
/// Unknown options are logged and skipped.
pub fn options_to_flags(options: &[String]) -> MsFlags {
    let mut flags = MsFlags::empty();
    for option in options {
        let (set, flag) = match option.as_str() {
            "acl" => (true, MsFlags::MS_POSIXACL),
            "async" => (false, MsFlags::MS_SYNCHRONOUS),
            "atime" => (false, MsFlags::MS_NOATIME),
            "bind" => (true, MsFlags::MS_BIND),
            "defaults" => (true, MsFlags::empty()),
            "dev" => (false, MsFlags::MS_NODEV),
            "diratime" => (false, MsFlags::MS_NODIRATIME),
            "dirsync" => (true, MsFlags::MS_DIRSYNC),
            "exec" => (false, MsFlags::MS_NOEXEC),
            "iversion" => (true, MsFlags::MS_I_VERSION),
            "loud" => (false, MsFlags::MS_SILENT),
            "mand" => (true, MsFlags::MS_MANDLOCK),
            "noacl" => (false, MsFlags::MS_POSIXACL),
            "noatime" => (true, MsFlags::MS_NOATIME),
            "nodev" => (true, MsFlags::MS_NODEV),
            "nodiratime" => (true, MsFlags::MS_NODIRATIME),
            "noexec" => (true, MsFlags::MS_NOEXEC),
            "noiversion" => (false, MsFlags::MS_I_VERSION),
            "nomand" => (false, MsFlags::MS_MANDLOCK),
            "norelatime" => (false, MsFlags::MS_RELATIME),
            "nostrictatime" => (false, MsFlags::MS_STRICTATIME),
            "nosuid" => (true, MsFlags::MS_NOSUID),
            "private" => (true, MsFlags::MS_PRIVATE),
            "rbind" => (true, MsFlags::MS_BIND | MsFlags::MS_REC),
            "relatime" => (true, MsFlags::MS_RELATIME),
            "remount" => (true, MsFlags::MS_REMOUNT),
            "ro" => (true, MsFlags::MS_RDONLY),
            "rprivate" => (true, MsFlags::MS_PRIVATE | MsFlags::MS_REC),
            "rw" => (false, MsFlags::MS_RDONLY),
            "silent" => (true, MsFlags::MS_SILENT),
            "strictatime" => (true, MsFlags::MS_STRICTATIME),
            "suid" => (false, MsFlags::MS_NOSUID),
            "sync" => (true, MsFlags::MS_SYNCHRONOUS),
            _ => {
                tracing::warn!("ignoring mount option {:?}", option);
                continue;
            }
        };
        if set {
            flags |= flag;
        } else {
            flags ^= flag;
        }
    }
    flags
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::symlink;

    use anyhow::Result;
    use oci_spec::runtime::{MountBuilder, RootBuilder, SpecBuilder};

    use super::*;
    use crate::syscall::test::TestHelperSyscall;

    fn options(opts: &[&str]) -> Vec<String> {
        opts.iter().map(|o| o.to_string()).collect()
    }

    #[test]
    fn test_options_to_flags_folding() {
        // "ro" is set first, then cleared again by "rw"; the unknown option
        // is skipped.
        assert_eq!(
            options_to_flags(&options(&["ro", "nosuid", "unknown", "rw"])),
            MsFlags::MS_NOSUID
        );
    }

    #[test]
    fn test_options_to_flags() {
        assert_eq!(options_to_flags(&options(&["defaults"])), MsFlags::empty());
        assert_eq!(
            options_to_flags(&options(&["rbind", "ro"])),
            MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_RDONLY
        );
        assert_eq!(
            options_to_flags(&options(&["noexec", "nosuid", "nodev"])),
            MsFlags::MS_NOEXEC | MsFlags::MS_NOSUID | MsFlags::MS_NODEV
        );
        // clearing a flag that was never set toggles it on; the table is a
        // fold, not a filter
        assert_eq!(
            options_to_flags(&options(&["suid", "suid"])),
            MsFlags::empty()
        );
    }

    #[test]
    fn test_resolve_symlinks_plain_walk() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("rootfs");
        std::fs::create_dir_all(root.join("a/b"))?;

        assert_eq!(
            resolve_symlinks(&root, Path::new("/a/b/c"))?,
            root.join("a/b/c")
        );
        // missing components terminate the walk cleanly
        assert_eq!(
            resolve_symlinks(&root, Path::new("/missing/dir"))?,
            root.join("missing/dir")
        );
        Ok(())
    }

    #[test]
    fn test_resolve_symlinks_cannot_escape_root() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("sbx");
        std::fs::create_dir_all(&root)?;
        symlink("../../etc", root.join("a"))?;

        assert_eq!(
            resolve_symlinks(&root, Path::new("/a/passwd"))?,
            root.join("etc/passwd")
        );
        Ok(())
    }

    #[test]
    fn test_resolve_symlinks_absolute_target() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().join("rootfs");
        std::fs::create_dir_all(root.join("real/data"))?;
        symlink("/real/data", root.join("data"))?;

        assert_eq!(
            resolve_symlinks(&root, Path::new("/data/mnt"))?,
            root.join("real/data/mnt")
        );
        Ok(())
    }

    #[test]
    fn test_resolve_symlinks_loop_detection() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();
        symlink("loop", root.join("loop"))?;

        let err = resolve_symlinks(&root, Path::new("/loop")).unwrap_err();
        assert!(matches!(err, MountError::TooManySymlinks { .. }));
        Ok(())
    }

    #[test]
    fn test_setup_bind_mounts_through_symlink() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path();
        let root = bundle.join("rootfs");
        std::fs::create_dir_all(root.join("real/data"))?;
        symlink("/real/data", root.join("data"))?;
        let source = bundle.join("host-data");
        std::fs::create_dir_all(&source)?;

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path(&root).build()?)
            .mounts(vec![MountBuilder::default()
                .destination(PathBuf::from("/data/mnt"))
                .typ("bind")
                .source(&source)
                .options(options(&["rbind", "ro"]))
                .build()?])
            .build()?;

        let syscall = TestHelperSyscall::default();
        setup(&spec, bundle, &syscall)?;

        // the mount point was created behind the symlink
        assert!(root.join("real/data/mnt").is_dir());

        let got = syscall.get_mount_args();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, Some(source));
        assert_eq!(got[0].target, root.join("real/data/mnt"));
        assert_eq!(
            got[0].flags,
            MsFlags::MS_BIND | MsFlags::MS_REC | MsFlags::MS_RDONLY
        );
        Ok(())
    }

    #[test]
    fn test_setup_file_mount_point() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path();
        let root = bundle.join("rootfs");
        std::fs::create_dir_all(&root)?;
        let source = bundle.join("hosts");
        std::fs::write(&source, "127.0.0.1 localhost\n")?;

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path(&root).build()?)
            .mounts(vec![MountBuilder::default()
                .destination(PathBuf::from("/etc/hosts"))
                .typ("bind")
                .source(&source)
                .options(options(&["bind"]))
                .build()?])
            .build()?;

        let syscall = TestHelperSyscall::default();
        setup(&spec, bundle, &syscall)?;

        // a regular file was touched as the mount point
        assert!(root.join("etc/hosts").is_file());
        let got = syscall.get_mount_args();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].flags, MsFlags::MS_BIND);
        Ok(())
    }

    #[test]
    fn test_setup_missing_source_fails() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path();
        let root = bundle.join("rootfs");
        std::fs::create_dir_all(&root)?;

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path(&root).build()?)
            .mounts(vec![MountBuilder::default()
                .destination(PathBuf::from("/data"))
                .typ("bind")
                .source(bundle.join("does-not-exist"))
                .build()?])
            .build()?;

        let syscall = TestHelperSyscall::default();
        let err = setup(&spec, bundle, &syscall).unwrap_err();
        assert!(matches!(err, MountError::SourceMissing { .. }));
        assert!(syscall.get_mount_args().is_empty());
        Ok(())
    }

    #[test]
    fn test_setup_readonly_root_remount() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path();
        let root = bundle.join("rootfs");
        std::fs::create_dir_all(&root)?;

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path(&root).readonly(true).build()?)
            .build()?;

        let syscall = TestHelperSyscall::default();
        setup(&spec, bundle, &syscall)?;

        let got = syscall.get_mount_args();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].source, Some(root.clone()));
        assert_eq!(got[0].target, root);
        assert_eq!(
            got[0].flags,
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY | MsFlags::MS_REC
        );
        Ok(())
    }

    #[test]
    fn test_setup_skips_unsupported_mounts() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path();
        let root = bundle.join("rootfs");
        std::fs::create_dir_all(&root)?;
        let source = bundle.join("null");
        std::fs::write(&source, "")?;

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path(&root).build()?)
            .mounts(vec![
                MountBuilder::default()
                    .destination(PathBuf::from("/dev/null"))
                    .typ("bind")
                    .source(&source)
                    .build()?,
                MountBuilder::default()
                    .destination(PathBuf::from("/proc"))
                    .typ("proc")
                    .source(PathBuf::from("proc"))
                    .build()?,
            ])
            .build()?;

        let syscall = TestHelperSyscall::default();
        setup(&spec, bundle, &syscall)?;
        assert!(syscall.get_mount_args().is_empty());
        Ok(())
    }

    #[test]
    fn test_teardown_unmounts_lazily() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let bundle = tmp.path();
        let root = bundle.join("rootfs");
        std::fs::create_dir_all(root.join("data"))?;

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path(&root).build()?)
            .mounts(vec![MountBuilder::default()
                .destination(PathBuf::from("/data"))
                .typ("bind")
                .source(bundle.join("host-data"))
                .build()?])
            .build()?;

        let syscall = TestHelperSyscall::default();
        teardown(&spec, bundle, &syscall)?;

        let got = syscall.get_umount_args();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].target, root.join("data"));
        assert_eq!(got[0].flags, MntFlags::MNT_DETACH);
        assert_eq!(got[1].target, root);
        Ok(())
    }
}
