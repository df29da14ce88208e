//! Test driver that records every sandbox command instead of talking to a
//! sandbox process.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::os::fd::OwnedFd;
use std::path::Path;

use oci_spec::runtime::Spec;
use serde_json::json;

use super::driver::SandboxDriver;
use super::sandbox::Sandbox;
use super::{Event, ExecArgs, ProcessInfo, SandboxError};
use crate::config::Config;

type Result<T> = std::result::Result<T, SandboxError>;

#[derive(Default)]
pub struct TestDriver {
    calls: RefCell<Vec<String>>,
    fail_methods: RefCell<HashSet<&'static str>>,
    wait_status: Cell<i32>,
}

impl TestDriver {
    fn record(&self, method: &'static str, container_id: Option<&str>) -> Result<()> {
        let call = match container_id {
            Some(id) => format!("{method} {id}"),
            None => method.to_string(),
        };
        self.calls.borrow_mut().push(call);

        if self.fail_methods.borrow().contains(method) {
            return Err(SandboxError::Rejected {
                method: method.to_string(),
                message: "forced failure".to_string(),
            });
        }
        Ok(())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    /// Makes every subsequent call of `method` fail.
    pub fn fail_on(&self, method: &'static str) {
        self.fail_methods.borrow_mut().insert(method);
    }

    pub fn set_wait_status(&self, wait_status: i32) {
        self.wait_status.set(wait_status);
    }
}

impl SandboxDriver for TestDriver {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn create(
        &self,
        id: &str,
        _spec: &Spec,
        _conf: &Config,
        _bundle_dir: &Path,
        _console_socket: Option<&Path>,
        _control_address: &Path,
        _io_files: Vec<OwnedFd>,
    ) -> Result<i32> {
        self.record("create", Some(id))?;
        // The test process itself stands in for the sandbox, so liveness
        // probes against the returned pid succeed.
        Ok(std::process::id() as i32)
    }

    fn start_root(&self, _sandbox: &Sandbox, _spec: &Spec, _conf: &Config) -> Result<()> {
        self.record("start-root", None)
    }

    fn start(
        &self,
        _sandbox: &Sandbox,
        _spec: &Spec,
        _conf: &Config,
        id: &str,
        _io_files: Vec<OwnedFd>,
    ) -> Result<()> {
        self.record("start", Some(id))
    }

    fn execute(&self, _sandbox: &Sandbox, id: &str, _args: &ExecArgs) -> Result<i32> {
        self.record("execute", Some(id))?;
        Ok(self.wait_status.get())
    }

    fn event(&self, _sandbox: &Sandbox, id: &str) -> Result<Event> {
        self.record("event", Some(id))?;
        Ok(Event {
            typ: "stats".to_string(),
            data: json!({}),
        })
    }

    fn pause(&self, _sandbox: &Sandbox, id: &str) -> Result<()> {
        self.record("pause", Some(id))
    }

    fn resume(&self, _sandbox: &Sandbox, id: &str) -> Result<()> {
        self.record("resume", Some(id))
    }

    fn checkpoint(&self, _sandbox: &Sandbox, id: &str, _image_path: &Path) -> Result<()> {
        self.record("checkpoint", Some(id))
    }

    fn restore(
        &self,
        _sandbox: &Sandbox,
        id: &str,
        _spec: &Spec,
        _conf: &Config,
        _image_path: &Path,
    ) -> Result<()> {
        self.record("restore", Some(id))
    }

    fn signal(&self, _sandbox: &Sandbox, id: &str, _signal: i32) -> Result<()> {
        self.record("signal", Some(id))
    }

    fn wait(&self, _sandbox: &Sandbox, id: &str) -> Result<i32> {
        self.record("wait", Some(id))?;
        Ok(self.wait_status.get())
    }

    fn wait_pid(&self, _sandbox: &Sandbox, id: &str, _pid: i32) -> Result<i32> {
        self.record("wait-pid", Some(id))?;
        Ok(self.wait_status.get())
    }

    fn processes(&self, _sandbox: &Sandbox, id: &str) -> Result<Vec<ProcessInfo>> {
        self.record("processes", Some(id))?;
        Ok(Vec::new())
    }

    fn stop(&self, _sandbox: &Sandbox, id: &str) -> Result<()> {
        self.record("stop", Some(id))
    }

    fn destroy(&self, _sandbox: &Sandbox) -> Result<()> {
        self.record("destroy", None)
    }

    fn process_alive(&self, pid: i32) -> bool {
        nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
    }
}
