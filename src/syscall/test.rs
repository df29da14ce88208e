//! Test helper that records mount calls instead of performing them.

use std::any::Any;
use std::cell::RefCell;
use std::path::{Path, PathBuf};

use nix::mount::{MntFlags, MsFlags};

use super::Syscall;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountArgs {
    pub source: Option<PathBuf>,
    pub target: PathBuf,
    pub fstype: Option<String>,
    pub flags: MsFlags,
    pub data: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UmountArgs {
    pub target: PathBuf,
    pub flags: MntFlags,
}

#[derive(Default)]
pub struct TestHelperSyscall {
    mount_args: RefCell<Vec<MountArgs>>,
    umount_args: RefCell<Vec<UmountArgs>>,
}

impl Syscall for TestHelperSyscall {
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
        self.mount_args.borrow_mut().push(MountArgs {
            source: source.map(|x| x.to_owned()),
            target: target.to_owned(),
            fstype: fstype.map(|x| x.to_owned()),
            flags,
            data: data.map(|x| x.to_owned()),
        });
        Ok(())
    }

    fn umount(&self, target: &Path, flags: MntFlags) -> Result<(), nix::errno::Errno> {
        self.umount_args.borrow_mut().push(UmountArgs {
            target: target.to_owned(),
            flags,
        });
        Ok(())
    }
}

impl TestHelperSyscall {
    pub fn get_mount_args(&self) -> Vec<MountArgs> {
        self.mount_args.borrow().clone()
    }

    pub fn get_umount_args(&self) -> Vec<UmountArgs> {
        self.umount_args.borrow().clone()
    }
}
