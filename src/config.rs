//! Global runtime configuration shared by all subcommands.

use std::path::PathBuf;

use clap::ValueEnum;

pub const DEFAULT_ROOT_DIR: &str = "/run/warden";

/// How the sandbox reaches the host filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FileAccess {
    /// Filesystem requests are served by a gofer process over socket pairs.
    Proxy,
    /// The sandbox accesses the host filesystem directly, without a gofer.
    Direct,
}

/// Configuration derived from the global command line flags. It is not
/// persisted; every invocation reconstructs it from its own flags.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory that holds one subdirectory per container.
    pub root_dir: PathBuf,
    pub file_access: FileAccess,
    /// Overlay a writable tmpfs on top of the container root filesystem.
    pub overlay: bool,
    /// Allow multiple containers to share a single sandbox.
    pub multi_container: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_ROOT_DIR))
    }
}

impl Config {
    pub fn new(root_dir: PathBuf) -> Self {
        Self {
            root_dir,
            file_access: FileAccess::Proxy,
            overlay: false,
            multi_container: false,
        }
    }

    /// Reconstructs the global flags so that child invocations of the runtime
    /// binary (the gofer and the sandbox) see the same configuration. The
    /// returned flags go in front of the subcommand.
    pub fn to_flags(&self) -> Vec<String> {
        let mut flags = vec![
            "--root".to_string(),
            self.root_dir.display().to_string(),
            "--file-access".to_string(),
            match self.file_access {
                FileAccess::Proxy => "proxy".to_string(),
                FileAccess::Direct => "direct".to_string(),
            },
        ];
        if self.overlay {
            flags.push("--overlay".to_string());
        }
        if self.multi_container {
            flags.push("--multi-container".to_string());
        }

        flags
    }
}
