//! Container management

#[allow(clippy::module_inception)]
mod container;
mod container_create;
mod container_destroy;
mod container_exec;
mod container_pause;
mod container_resume;
mod container_signal;
mod container_start;
mod container_wait;
mod state;

pub use container::Container;
pub use state::{ContainerStatus, OciState};
