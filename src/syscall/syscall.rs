//! An interface trait so that the mount preparer can record mount calls in
//! tests instead of issuing them to the kernel.

use std::any::Any;
use std::path::Path;

use nix::mount::{MntFlags, MsFlags};

use crate::syscall::linux::LinuxSyscall;
use crate::syscall::test::TestHelperSyscall;

pub trait Syscall {
    fn as_any(&self) -> &dyn Any;
    fn mount(
        &self,
        source: Option<&Path>,
        target: &Path,
        fstype: Option<&str>,
        flags: MsFlags,
        data: Option<&str>,
    ) -> Result<(), nix::errno::Errno>;
    fn umount(&self, target: &Path, flags: MntFlags) -> Result<(), nix::errno::Errno>;
}

pub fn create_syscall() -> Box<dyn Syscall> {
    if cfg!(test) {
        Box::<TestHelperSyscall>::default()
    } else {
        Box::new(LinuxSyscall)
    }
}
