//! Warden command line entry point.
//!
//! The binary is run by a higher-level container manager with global flags
//! followed by an OCI runtime subcommand. The same binary is re-invoked with
//! the internal `boot` and `gofer` subcommands to bring up the sandbox and
//! gofer processes.

mod cli;
mod observability;

use std::io::Write as _;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use oci_spec::runtime::Spec;
use tabwriter::TabWriter;

use warden::config::{Config, FileAccess, DEFAULT_ROOT_DIR};
use warden::container::{Container, ContainerStatus};
use warden::sandbox::ExecArgs;
use warden::{utils, WardenError};

use observability::ObservabilityConfig;

#[derive(Parser, Debug)]
#[clap(version, about = "container manager for a sandboxed OCI runtime")]
struct Opts {
    /// Root directory to store container state
    #[clap(long, default_value = DEFAULT_ROOT_DIR)]
    root: PathBuf,
    /// Log file; defaults to stderr
    #[clap(long)]
    log: Option<PathBuf>,
    /// Log level: error, warn, info, debug, trace
    #[clap(long)]
    log_level: Option<String>,
    /// Log format: text or json
    #[clap(long)]
    log_format: Option<String>,
    /// How the sandbox accesses the host filesystem
    #[clap(long, value_enum, default_value = "proxy")]
    file_access: FileAccess,
    /// Overlay a writable tmpfs on top of the container root filesystem
    #[clap(long)]
    overlay: bool,
    /// Allow multiple containers to share one sandbox
    #[clap(long)]
    multi_container: bool,
    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
enum SubCommand {
    Create(cli::Create),
    Start(cli::Start),
    Run(cli::Run),
    Exec(cli::Exec),
    Kill(cli::Kill),
    Delete(cli::Delete),
    State(cli::State),
    List(cli::List),
    Ps(cli::Ps),
    Events(cli::Events),
    Pause(cli::Pause),
    Resume(cli::Resume),
    Wait(cli::Wait),
    Checkpoint(cli::Checkpoint),
    Restore(cli::Restore),
    /// Internal: sandbox and gofer entry points
    #[clap(external_subcommand)]
    Internal(Vec<String>),
}

fn load_spec(bundle: &PathBuf) -> Result<Spec> {
    let config_path = bundle.join("config.json");
    Spec::load(&config_path)
        .with_context(|| format!("failed to load spec from {config_path:?}"))
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    observability::init(ObservabilityConfig {
        log_level: opts.log_level.clone(),
        log_file: opts.log.clone(),
        log_format: opts.log_format.clone(),
    })?;

    std::fs::create_dir_all(&opts.root)
        .with_context(|| format!("failed to create root directory {:?}", opts.root))?;
    let root_dir = std::fs::canonicalize(&opts.root)?;
    let conf = Config {
        root_dir,
        file_access: opts.file_access,
        overlay: opts.overlay,
        multi_container: opts.multi_container,
    };

    match opts.subcmd {
        SubCommand::Create(create) => {
            let spec = load_spec(&create.bundle)?;
            let bundle = std::fs::canonicalize(&create.bundle)?;
            Container::create(
                &create.container_id,
                spec,
                &conf,
                &bundle,
                create.console_socket.as_deref(),
                create.pid_file.as_deref(),
            )?;
            Ok(())
        }
        SubCommand::Start(start) => {
            let mut container = Container::load(&conf.root_dir, &start.container_id)?;
            container.start(&conf)?;
            Ok(())
        }
        SubCommand::Run(run) => {
            let spec = load_spec(&run.bundle)?;
            let bundle = std::fs::canonicalize(&run.bundle)?;
            let wait_status = Container::run(
                &run.container_id,
                spec,
                &conf,
                &bundle,
                run.console_socket.as_deref(),
                run.pid_file.as_deref(),
            )?;
            std::process::exit(utils::exit_code(wait_status));
        }
        SubCommand::Exec(exec) => {
            let container = Container::load(&conf.root_dir, &exec.container_id)?;
            let args = ExecArgs {
                argv: exec.command.clone(),
                envv: exec.env.clone(),
                cwd: exec.cwd.unwrap_or_else(|| PathBuf::from("/")),
                uid: 0,
                gid: 0,
            };
            let wait_status = container.execute(&args)?;
            std::process::exit(utils::exit_code(wait_status));
        }
        SubCommand::Kill(kill) => {
            let container = Container::load(&conf.root_dir, &kill.container_id)?;
            let signal = utils::parse_signal(&kill.signal)?;
            container.signal(signal)?;
            Ok(())
        }
        SubCommand::Delete(delete) => {
            let mut container = Container::load(&conf.root_dir, &delete.container_id)?;
            if !delete.force && container.status != ContainerStatus::Stopped {
                bail!(WardenError::BadState {
                    status: container.status,
                    op: "delete",
                });
            }
            container.destroy()?;
            Ok(())
        }
        SubCommand::State(state) => {
            let container = Container::load(&conf.root_dir, &state.container_id)?;
            println!("{}", serde_json::to_string_pretty(&container.state())?);
            Ok(())
        }
        SubCommand::List(_) => list(&conf),
        SubCommand::Ps(ps) => {
            let container = Container::load(&conf.root_dir, &ps.container_id)?;
            let processes = container.processes()?;
            let mut tab_writer = TabWriter::new(std::io::stdout());
            writeln!(&mut tab_writer, "UID\tPID\tPPID\tTIME\tCMD")?;
            for process in processes {
                writeln!(
                    &mut tab_writer,
                    "{}\t{}\t{}\t{}\t{}",
                    process.uid, process.pid, process.ppid, process.time, process.cmd
                )?;
            }
            tab_writer.flush()?;
            Ok(())
        }
        SubCommand::Events(events) => {
            let container = Container::load(&conf.root_dir, &events.container_id)?;
            println!("{}", serde_json::to_string_pretty(&container.event()?)?);
            Ok(())
        }
        SubCommand::Pause(pause) => {
            let mut container = Container::load(&conf.root_dir, &pause.container_id)?;
            container.pause()?;
            Ok(())
        }
        SubCommand::Resume(resume) => {
            let mut container = Container::load(&conf.root_dir, &resume.container_id)?;
            container.resume()?;
            Ok(())
        }
        SubCommand::Wait(wait) => {
            let mut container = Container::load(&conf.root_dir, &wait.container_id)?;
            let wait_status = match (wait.pid, wait.root_pid) {
                (Some(_), Some(_)) => bail!("--pid and --root-pid are mutually exclusive"),
                (Some(pid), None) => container.wait_pid(pid)?,
                (None, Some(pid)) => container.wait_root_pid(pid)?,
                (None, None) => container.wait()?,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "id": container.id,
                    "exitStatus": utils::exit_code(wait_status),
                }))?
            );
            Ok(())
        }
        SubCommand::Checkpoint(checkpoint) => {
            let container = Container::load(&conf.root_dir, &checkpoint.container_id)?;
            container.checkpoint(&checkpoint.image_path)?;
            Ok(())
        }
        SubCommand::Restore(restore) => {
            let spec = load_spec(&restore.bundle)?;
            let mut container = Container::load(&conf.root_dir, &restore.container_id)?;
            container.restore(&spec, &conf, &restore.image_path)?;
            Ok(())
        }
        SubCommand::Internal(args) => {
            // `boot` and `gofer` are implemented by the sandbox and gofer
            // components, which are linked into the production binary but
            // not into this manager-only build.
            bail!(
                "internal subcommand {:?} is not available in this build",
                args.first().map(String::as_str).unwrap_or("")
            );
        }
    }
}

/// Lists all containers in the root directory.
fn list(conf: &Config) -> Result<()> {
    let mut content = String::new();
    for id in Container::list(&conf.root_dir)? {
        // directories without a metadata file are not containers
        let container = match Container::load(&conf.root_dir, &id) {
            Ok(container) => container,
            Err(WardenError::NotFound { .. }) => continue,
            Err(err) => return Err(err.into()),
        };

        let created: DateTime<Local> = DateTime::from(container.created_at);
        content.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            container.id,
            container.pid(),
            container.status,
            container.bundle_dir.display(),
            created.to_rfc3339_opts(chrono::SecondsFormat::Secs, false),
            container.owner,
        ));
    }

    let mut tab_writer = TabWriter::new(std::io::stdout());
    writeln!(&mut tab_writer, "ID\tPID\tSTATUS\tBUNDLE\tCREATED\tOWNER")?;
    write!(&mut tab_writer, "{content}")?;
    tab_writer.flush()?;

    Ok(())
}
