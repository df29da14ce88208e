//! The real sandbox driver: forks the sandbox process and speaks JSON over
//! its control socket.

use std::any::Any;
use std::io::{IoSlice, Write};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Command, Stdio};

use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};
use oci_spec::runtime::Spec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::driver::SandboxDriver;
use super::sandbox::Sandbox;
use super::{Event, ExecArgs, ProcessInfo, SandboxError};
use crate::config::Config;
use crate::specutils;

type Result<T> = std::result::Result<T, SandboxError>;

pub struct ControlDriver;

#[derive(Serialize)]
struct Request<'a> {
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    container_id: Option<&'a str>,
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct Response {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

impl ControlDriver {
    fn call<R: DeserializeOwned>(
        &self,
        sandbox: &Sandbox,
        method: &str,
        container_id: Option<&str>,
        params: serde_json::Value,
    ) -> Result<R> {
        self.call_with_fds(sandbox, method, container_id, params, &[])
    }

    /// One request, one response. The sandbox reads until the write side is
    /// shut down, so no framing is needed. File descriptors, if any, ride
    /// along with the first byte of the request as SCM_RIGHTS.
    fn call_with_fds<R: DeserializeOwned>(
        &self,
        sandbox: &Sandbox,
        method: &str,
        container_id: Option<&str>,
        params: serde_json::Value,
        fds: &[RawFd],
    ) -> Result<R> {
        let connect_err = |err: std::io::Error| SandboxError::Connect {
            address: sandbox.control_address.clone(),
            source: err,
        };

        let mut stream = UnixStream::connect(&sandbox.control_address).map_err(connect_err)?;

        let request = Request {
            method,
            container_id,
            params,
        };
        let payload = serde_json::to_vec(&request).map_err(SandboxError::Encode)?;

        if fds.is_empty() {
            stream.write_all(&payload).map_err(connect_err)?;
        } else {
            let iov = [IoSlice::new(&payload)];
            let cmsgs = [ControlMessage::ScmRights(fds)];
            let sent = sendmsg::<()>(
                stream.as_raw_fd(),
                &iov,
                &cmsgs,
                MsgFlags::empty(),
                None,
            )
            .map_err(|errno| connect_err(std::io::Error::from_raw_os_error(errno as i32)))?;
            stream.write_all(&payload[sent..]).map_err(connect_err)?;
        }
        stream.shutdown(Shutdown::Write).map_err(connect_err)?;

        let response: Response =
            serde_json::from_reader(&stream).map_err(SandboxError::Decode)?;
        if !response.ok {
            return Err(SandboxError::Rejected {
                method: method.to_string(),
                message: response.error.unwrap_or_default(),
            });
        }
        serde_json::from_value(response.result).map_err(SandboxError::Decode)
    }
}

impl SandboxDriver for ControlDriver {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn create(
        &self,
        _id: &str,
        _spec: &Spec,
        conf: &Config,
        bundle_dir: &Path,
        console_socket: Option<&Path>,
        control_address: &Path,
        io_files: Vec<OwnedFd>,
    ) -> Result<i32> {
        let bin_path = specutils::bin_path().map_err(SandboxError::Fork)?;

        let mut args = conf.to_flags();
        args.push("boot".to_string());
        args.push("--bundle".to_string());
        args.push(bundle_dir.display().to_string());
        args.push(format!("--controller={}", control_address.display()));
        if let Some(console_socket) = console_socket {
            args.push(format!("--console-socket={}", console_socket.display()));
        }
        // io fds land at consecutive descriptors starting at 3, right after
        // stdio.
        for (i, _) in io_files.iter().enumerate() {
            args.push(format!("--io-fds={}", 3 + i));
        }

        let mut command = Command::new(bin_path);
        command.args(args).stdin(Stdio::null());

        let raw_fds: Vec<RawFd> = io_files.iter().map(|fd| fd.as_raw_fd()).collect();
        unsafe {
            command.pre_exec(move || {
                // dup2 also clears the close-on-exec flag on the new fd.
                for (i, fd) in raw_fds.iter().enumerate() {
                    nix::unistd::dup2(*fd, 3 + i as RawFd)
                        .map_err(|errno| std::io::Error::from_raw_os_error(errno as i32))?;
                }
                Ok(())
            });
        }

        let child = command.spawn().map_err(SandboxError::Fork)?;
        // The sandbox outlives this invocation and is not reaped by us.
        // io_files are dropped here, closing our copies.
        Ok(child.id() as i32)
    }

    fn start_root(&self, sandbox: &Sandbox, spec: &Spec, _conf: &Config) -> Result<()> {
        self.call(sandbox, "start-root", None, json!({ "spec": spec }))
    }

    fn start(
        &self,
        sandbox: &Sandbox,
        spec: &Spec,
        _conf: &Config,
        id: &str,
        io_files: Vec<OwnedFd>,
    ) -> Result<()> {
        let fds: Vec<RawFd> = io_files.iter().map(|fd| fd.as_raw_fd()).collect();
        self.call_with_fds(
            sandbox,
            "start",
            Some(id),
            json!({ "spec": spec, "ioFds": fds.len() }),
            &fds,
        )
    }

    fn execute(&self, sandbox: &Sandbox, id: &str, args: &ExecArgs) -> Result<i32> {
        self.call(sandbox, "execute", Some(id), json!(args))
    }

    fn event(&self, sandbox: &Sandbox, id: &str) -> Result<Event> {
        self.call(sandbox, "event", Some(id), json!({}))
    }

    fn pause(&self, sandbox: &Sandbox, id: &str) -> Result<()> {
        self.call(sandbox, "pause", Some(id), json!({}))
    }

    fn resume(&self, sandbox: &Sandbox, id: &str) -> Result<()> {
        self.call(sandbox, "resume", Some(id), json!({}))
    }

    fn checkpoint(&self, sandbox: &Sandbox, id: &str, image_path: &Path) -> Result<()> {
        self.call(
            sandbox,
            "checkpoint",
            Some(id),
            json!({ "imagePath": image_path }),
        )
    }

    fn restore(
        &self,
        sandbox: &Sandbox,
        id: &str,
        spec: &Spec,
        _conf: &Config,
        image_path: &Path,
    ) -> Result<()> {
        self.call(
            sandbox,
            "restore",
            Some(id),
            json!({ "spec": spec, "imagePath": image_path }),
        )
    }

    fn signal(&self, sandbox: &Sandbox, id: &str, signal: i32) -> Result<()> {
        self.call(sandbox, "signal", Some(id), json!({ "signal": signal }))
    }

    fn wait(&self, sandbox: &Sandbox, id: &str) -> Result<i32> {
        self.call(sandbox, "wait", Some(id), json!({}))
    }

    fn wait_pid(&self, sandbox: &Sandbox, id: &str, pid: i32) -> Result<i32> {
        self.call(sandbox, "wait-pid", Some(id), json!({ "pid": pid }))
    }

    fn processes(&self, sandbox: &Sandbox, id: &str) -> Result<Vec<ProcessInfo>> {
        self.call(sandbox, "processes", Some(id), json!({}))
    }

    fn stop(&self, sandbox: &Sandbox, id: &str) -> Result<()> {
        self.call(sandbox, "stop", Some(id), json!({}))
    }

    fn destroy(&self, sandbox: &Sandbox) -> Result<()> {
        self.call(sandbox, "destroy", None, json!({}))
    }

    fn process_alive(&self, pid: i32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
    }
}
