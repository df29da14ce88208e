//! Implementation of the mount interface using the Linux syscalls.

use std::any::Any;
use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};

pub struct LinuxSyscall;

impl super::Syscall for LinuxSyscall {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), nix::errno::Errno> {
        mount(source, target, fstype, flags, data)
    }

    fn umount(&self, target: &Path, flags: MntFlags) -> Result<(), nix::errno::Errno> {
        umount2(target, flags)
    }
}
