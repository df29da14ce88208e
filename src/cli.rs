//! Command line argument structs, one per subcommand, following the OCI
//! runtime command line conventions.

use std::path::PathBuf;

use clap::Parser;

/// Create a container
#[derive(Parser, Debug)]
pub struct Create {
    /// Path to the bundle directory, containing config.json and the root
    /// filesystem
    #[clap(short, long, default_value = ".")]
    pub bundle: PathBuf,
    /// Unix socket (file) path which will receive the file descriptor of the
    /// console pseudoterminal
    #[clap(short, long)]
    pub console_socket: Option<PathBuf>,
    /// File to write the sandbox pid to once create completes
    #[clap(short, long)]
    pub pid_file: Option<PathBuf>,
    /// Name of the container instance to be created
    #[clap(value_parser = clap::builder::NonEmptyStringValueParser::new(), required = true)]
    pub container_id: String,
}

/// Start a created container
#[derive(Parser, Debug)]
pub struct Start {
    pub container_id: String,
}

/// Create and start a container, then wait for it to exit
#[derive(Parser, Debug)]
pub struct Run {
    #[clap(short, long, default_value = ".")]
    pub bundle: PathBuf,
    #[clap(short, long)]
    pub console_socket: Option<PathBuf>,
    #[clap(short, long)]
    pub pid_file: Option<PathBuf>,
    pub container_id: String,
}

/// Execute a command inside a running container
#[derive(Parser, Debug)]
pub struct Exec {
    /// Working directory of the command, inside the container
    #[clap(long)]
    pub cwd: Option<PathBuf>,
    /// Environment variables to set, as key=value
    #[clap(short, long)]
    pub env: Vec<String>,
    pub container_id: String,
    /// Command and arguments to run
    #[clap(required = true, last = true)]
    pub command: Vec<String>,
}

/// Send a signal to the container's init process
#[derive(Parser, Debug)]
pub struct Kill {
    pub container_id: String,
    /// Signal name ("KILL", "SIGKILL") or number ("9")
    #[clap(default_value = "SIGTERM")]
    pub signal: String,
}

/// Delete a container and its on-disk state
#[derive(Parser, Debug)]
pub struct Delete {
    /// Delete the container even if it is still running
    #[clap(short, long)]
    pub force: bool,
    pub container_id: String,
}

/// Print the OCI state of a container
#[derive(Parser, Debug)]
pub struct State {
    pub container_id: String,
}

/// List containers in the root directory
#[derive(Parser, Debug)]
pub struct List {}

/// List processes running inside a container
#[derive(Parser, Debug)]
pub struct Ps {
    pub container_id: String,
}

/// Print an accounting snapshot for a container
#[derive(Parser, Debug)]
pub struct Events {
    pub container_id: String,
}

/// Suspend all processes in a container
#[derive(Parser, Debug)]
pub struct Pause {
    pub container_id: String,
}

/// Resume a paused container
#[derive(Parser, Debug)]
pub struct Resume {
    pub container_id: String,
}

/// Wait for a container, or a process inside it, to exit
#[derive(Parser, Debug)]
pub struct Wait {
    /// Wait on this pid in the container's PID namespace instead of the
    /// container itself
    #[clap(short, long)]
    pub pid: Option<i32>,
    /// Wait on this pid in the sandbox's own PID namespace
    #[clap(long)]
    pub root_pid: Option<i32>,
    pub container_id: String,
}

/// Write a checkpoint image of a container to a file
#[derive(Parser, Debug)]
pub struct Checkpoint {
    /// Path the state image is written to
    #[clap(long)]
    pub image_path: PathBuf,
    pub container_id: String,
}

/// Restore a created container from a checkpoint image
#[derive(Parser, Debug)]
pub struct Restore {
    /// Path of the state image to restore from
    #[clap(long)]
    pub image_path: PathBuf,
    #[clap(short, long, default_value = ".")]
    pub bundle: PathBuf,
    pub container_id: String,
}
