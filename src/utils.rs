//! Utility functionality

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Component, Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

pub trait PathBufExt {
    /// Normalizes a path without touching the filesystem. In contrast to
    /// canonicalize the path does not need to exist.
    fn normalize(&self) -> PathBuf;
}

impl PathBufExt for Path {
    // adapted from https://github.com/rust-lang/cargo/blob/fede83ccf973457de319ba6fa0e36ead454d2e20/src/cargo/util/paths.rs#L61
    fn normalize(&self) -> PathBuf {
        let mut components = self.components().peekable();
        let mut ret = if let Some(c @ Component::Prefix(..)) = components.peek().cloned() {
            components.next();
            PathBuf::from(c.as_os_str())
        } else {
            PathBuf::new()
        };

        for component in components {
            match component {
                Component::Prefix(..) => unreachable!(),
                Component::RootDir => {
                    ret.push(component.as_os_str());
                }
                Component::CurDir => {}
                Component::ParentDir => {
                    ret.pop();
                }
                Component::Normal(c) => {
                    ret.push(c);
                }
            }
        }
        ret
    }
}

/// Retries `op` with a constant `step` pause until it succeeds or `deadline`
/// has elapsed. On timeout the last error is returned.
pub fn retry_until<E>(
    deadline: Duration,
    step: Duration,
    mut op: impl FnMut() -> Result<(), E>,
) -> Result<(), E> {
    let start = Instant::now();
    loop {
        match op() {
            Ok(()) => return Ok(()),
            Err(err) => {
                if start.elapsed() >= deadline {
                    return Err(err);
                }
                thread::sleep(step);
            }
        }
    }
}

pub fn parse_env(envs: &[String]) -> HashMap<String, String> {
    envs.iter()
        .filter_map(|e| {
            let mut split = e.split('=');

            split.next().map(|key| {
                let value = split.collect::<Vec<&str>>().join("=");
                (key.into(), value)
            })
        })
        .collect()
}

/// Writes `pid` as an ASCII decimal, mode 0644. Consumers treat the creation
/// of this file as the completion of create, so it must be written last.
pub fn write_pid_file(path: &Path, pid: i32) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o644)
        .open(path)?;
    file.write_all(pid.to_string().as_bytes())
}

#[derive(Debug, thiserror::Error)]
#[error("invalid signal {signal:?}")]
pub struct InvalidSignalError {
    signal: String,
}

/// Parses a signal given as a number ("9"), a name ("KILL") or a prefixed
/// name ("SIGKILL").
pub fn parse_signal(signal: &str) -> Result<i32, InvalidSignalError> {
    if let Ok(num) = signal.parse::<i32>() {
        return Ok(num);
    }

    let name = signal.to_ascii_uppercase();
    let name = name.strip_prefix("SIG").unwrap_or(&name);
    let num = match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "TRAP" => 5,
        "ABRT" => 6,
        "BUS" => 7,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        "CHLD" => 17,
        "CONT" => 18,
        "STOP" => 19,
        "TSTP" => 20,
        "TTIN" => 21,
        "TTOU" => 22,
        "URG" => 23,
        "XCPU" => 24,
        "XFSZ" => 25,
        "VTALRM" => 26,
        "PROF" => 27,
        "WINCH" => 28,
        "IO" => 29,
        "PWR" => 30,
        "SYS" => 31,
        _ => {
            return Err(InvalidSignalError {
                signal: signal.to_string(),
            })
        }
    };
    Ok(num)
}

/// Maps a raw wait status to a shell-style exit code: the exit status for a
/// normal exit, 128 + signal number for a signaled exit.
pub fn exit_code(wait_status: i32) -> i32 {
    let termination_signal = wait_status & 0x7f;
    if termination_signal != 0 {
        return 128 + termination_signal;
    }
    (wait_status >> 8) & 0xff
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use anyhow::Result;

    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            Path::new("/a/b/../c/./d").normalize(),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(Path::new("/sbx/..").normalize(), PathBuf::from("/"));
    }

    #[test]
    fn test_retry_until_eventually_succeeds() -> Result<()> {
        let attempts = Cell::new(0);
        retry_until(Duration::from_secs(3), Duration::from_millis(1), || {
            attempts.set(attempts.get() + 1);
            if attempts.get() < 3 {
                Err("not yet")
            } else {
                Ok(())
            }
        })
        .map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(attempts.get(), 3);
        Ok(())
    }

    #[test]
    fn test_retry_until_deadline() {
        let res: Result<(), &str> = retry_until(
            Duration::from_millis(20),
            Duration::from_millis(5),
            || Err("always"),
        );
        assert_eq!(res, Err("always"));
    }

    #[test]
    fn test_parse_env() {
        let env_input = vec!["key=value=with=equals".to_string()];
        let env_output = parse_env(&env_input);
        assert_eq!(env_output.len(), 1);
        assert_eq!(
            env_output.get("key"),
            Some(&"value=with=equals".to_string())
        );
    }

    #[test]
    fn test_write_pid_file() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let pid_file = tmp.path().join("test.pid");
        write_pid_file(&pid_file, 1234)?;
        assert_eq!(std::fs::read_to_string(&pid_file)?, "1234");
        Ok(())
    }

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_signal("9").unwrap(), 9);
        assert_eq!(parse_signal("KILL").unwrap(), 9);
        assert_eq!(parse_signal("SIGKILL").unwrap(), 9);
        assert_eq!(parse_signal("sigterm").unwrap(), 15);
        assert!(parse_signal("NOSUCH").is_err());
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(0), 0);
        // exit(3)
        assert_eq!(exit_code(3 << 8), 3);
        // killed by SIGKILL
        assert_eq!(exit_code(9), 137);
    }
}
