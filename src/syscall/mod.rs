//! Interface to the mount syscalls the manager performs on the host, so that
//! the rest of the crate can be tested without touching the kernel.
pub mod linux;
#[allow(clippy::module_inception)]
pub mod syscall;
pub mod test;

pub use syscall::{create_syscall, Syscall};
