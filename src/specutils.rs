//! Helpers for interrogating the OCI runtime spec.
//!
//! The spec's annotations double as a control channel: they decide whether a
//! container brings up its own sandbox or joins an existing one. All
//! annotation lookups live here so the predicates stay in one place.

use std::path::{Path, PathBuf};

use oci_spec::runtime::{Mount, Spec};

/// Annotation that marks a container as the sandbox-creating ("sandbox") or
/// sandbox-joining ("container") member of a pod.
pub const CONTAINER_TYPE_ANNOTATION: &str = "io.kubernetes.cri.container-type";

/// Annotation carrying the id of the sandbox a container joins. The sandbox
/// id is the id of the root container.
pub const SANDBOX_ID_ANNOTATION: &str = "io.kubernetes.cri.sandbox-id";

pub const CONTAINER_TYPE_SANDBOX: &str = "sandbox";

fn annotation<'a>(spec: &'a Spec, key: &str) -> Option<&'a str> {
    spec.annotations()
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Whether this spec asks for a new sandbox. An unannotated spec always gets
/// its own sandbox.
pub fn should_create_sandbox(spec: &Spec) -> bool {
    annotation(spec, CONTAINER_TYPE_ANNOTATION).map_or(true, |v| v == CONTAINER_TYPE_SANDBOX)
}

/// The id of the sandbox this container should join, if any.
pub fn sandbox_id(spec: &Spec) -> Option<String> {
    annotation(spec, SANDBOX_ID_ANNOTATION).map(str::to_string)
}

/// Mounts under /dev are emulated inside the sandbox and must not be bind
/// mounted on the host.
pub fn is_supported_mount(mount: &Mount) -> bool {
    !mount.destination().starts_with("/dev")
}

/// Whether a mount is served by the gofer and therefore needs its own socket
/// pair between the sandbox and the gofer.
pub fn is_gofer_mount(mount: &Mount) -> bool {
    mount.typ().as_deref() == Some("bind")
        && mount.source().is_some()
        && is_supported_mount(mount)
}

/// The path of the container's root filesystem, made absolute relative to
/// the bundle directory when needed.
pub fn root_path(spec: &Spec, bundle_dir: &Path) -> Option<PathBuf> {
    let root = spec.root().as_ref()?.path();
    if root.is_absolute() {
        Some(root.clone())
    } else {
        Some(bundle_dir.join(root))
    }
}

/// Path to the runtime binary, used to re-invoke ourselves as the gofer and
/// the sandbox.
pub fn bin_path() -> std::io::Result<PathBuf> {
    std::env::current_exe()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use anyhow::Result;
    use oci_spec::runtime::{MountBuilder, RootBuilder, SpecBuilder};

    use super::*;

    fn annotated_spec(typ: Option<&str>, sandbox: Option<&str>) -> Result<Spec> {
        let mut annotations = HashMap::new();
        if let Some(typ) = typ {
            annotations.insert(CONTAINER_TYPE_ANNOTATION.to_string(), typ.to_string());
        }
        if let Some(id) = sandbox {
            annotations.insert(SANDBOX_ID_ANNOTATION.to_string(), id.to_string());
        }
        Ok(SpecBuilder::default().annotations(annotations).build()?)
    }

    #[test]
    fn test_should_create_sandbox() -> Result<()> {
        assert!(should_create_sandbox(&annotated_spec(None, None)?));
        assert!(should_create_sandbox(&annotated_spec(
            Some("sandbox"),
            None
        )?));
        assert!(!should_create_sandbox(&annotated_spec(
            Some("container"),
            Some("c0")
        )?));
        Ok(())
    }

    #[test]
    fn test_sandbox_id() -> Result<()> {
        assert_eq!(sandbox_id(&annotated_spec(None, None)?), None);
        assert_eq!(
            sandbox_id(&annotated_spec(Some("container"), Some("c0"))?),
            Some("c0".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_is_gofer_mount() -> Result<()> {
        let bind = MountBuilder::default()
            .destination(PathBuf::from("/data"))
            .typ("bind")
            .source(PathBuf::from("/host/data"))
            .build()?;
        assert!(is_gofer_mount(&bind));

        let dev_bind = MountBuilder::default()
            .destination(PathBuf::from("/dev/null"))
            .typ("bind")
            .source(PathBuf::from("/host/null"))
            .build()?;
        assert!(!is_gofer_mount(&dev_bind));

        let tmpfs = MountBuilder::default()
            .destination(PathBuf::from("/tmp"))
            .typ("tmpfs")
            .source(PathBuf::from("tmpfs"))
            .build()?;
        assert!(!is_gofer_mount(&tmpfs));
        Ok(())
    }

    #[test]
    fn test_root_path() -> Result<()> {
        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path("rootfs").build()?)
            .build()?;
        assert_eq!(
            root_path(&spec, Path::new("/bundle")),
            Some(PathBuf::from("/bundle/rootfs"))
        );

        let spec = SpecBuilder::default()
            .root(RootBuilder::default().path("/rootfs").build()?)
            .build()?;
        assert_eq!(
            root_path(&spec, Path::new("/bundle")),
            Some(PathBuf::from("/rootfs"))
        );
        Ok(())
    }
}
