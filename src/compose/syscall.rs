// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! External process execution.
//!
//! Everything that talks to Docker does so by shelling out. The
//! [`CommandRunner`] trait is the seam for that, so the compose invoker and
//! network remediation can be exercised without a Docker daemon around.

use crate::env::EnvironmentMap;

use std::{
    ffi::{OsStr, OsString},
    fmt::{Display, Formatter, Result as FmtResult},
    io::Read,
    process::{Child, Command, ExitStatus, Stdio},
};

/// How an output stream of a child process is handled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Share stream with current process.
    #[default]
    Inherit,

    /// Collect stream into [`SyscallOutput`].
    Capture,
}

/// Description of a process to run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Syscall {
    pub program: OsString,
    pub args: Vec<OsString>,

    /// Variables layered over the inherited environment.
    pub envs: Vec<(String, String)>,
    pub stdout: Stream,
    pub stderr: Stream,
}

impl Syscall {
    /// Construct new system call of target program.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    /// Append arguments.
    pub fn args(mut self, args: impl IntoIterator<Item = impl Into<OsString>>) -> Self {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Layer environment over inherited environment of child process.
    pub fn envs(mut self, env: &EnvironmentMap) -> Self {
        self.envs
            .extend(env.iter().map(|(key, value)| (key.to_string(), value.to_string())));
        self
    }

    /// Capture standard error, but keep standard output inherited.
    pub fn capture_stderr(mut self) -> Self {
        self.stderr = Stream::Capture;
        self
    }

    /// Capture both standard output and standard error.
    pub fn capture(mut self) -> Self {
        self.stdout = Stream::Capture;
        self.stderr = Stream::Capture;
        self
    }

    /// Check if argument list contains target argument.
    pub fn has_arg(&self, arg: impl AsRef<OsStr>) -> bool {
        self.args.iter().any(|given| given == arg.as_ref())
    }
}

impl Display for Syscall {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(&self.program.to_string_lossy())?;
        for arg in &self.args {
            write!(fmt, " {}", arg.to_string_lossy())?;
        }

        Ok(())
    }
}

/// Outcome of a finished process.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyscallOutput {
    /// Exit code, absent if process was killed by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl SyscallOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Combined stdout and stderr text with trailing newlines chomped.
    pub fn message(&self) -> String {
        let mut message = String::new();
        if !self.stdout.is_empty() {
            message.push_str(format!("stdout: {}", self.stdout).as_str());
        }

        if !self.stderr.is_empty() {
            message.push_str(format!("stderr: {}", self.stderr).as_str());
        }

        message.trim_end_matches(['\r', '\n']).to_string()
    }
}

/// Layer of indirection for running external processes.
pub trait CommandRunner {
    type Process: Process;

    /// Start process without waiting on it.
    fn spawn(&self, syscall: &Syscall) -> Result<Self::Process>;

    /// Run process to completion.
    fn output(&self, syscall: &Syscall) -> Result<SyscallOutput> {
        self.spawn(syscall)?.wait()
    }
}

/// Handle to a running process.
pub trait Process {
    /// Process identifier.
    fn id(&self) -> u32;

    /// Block until process exits.
    fn wait(self) -> Result<SyscallOutput>;

    /// Check if process exited without blocking.
    fn try_wait(&mut self) -> Result<Option<SyscallOutput>>;
}

/// Run external processes on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl CommandRunner for HostRunner {
    type Process = HostProcess;

    fn spawn(&self, syscall: &Syscall) -> Result<HostProcess> {
        let child = Command::new(&syscall.program)
            .args(&syscall.args)
            .envs(syscall.envs.iter().map(|(key, value)| (key, value)))
            .stdout(stdio(syscall.stdout))
            .stderr(stdio(syscall.stderr))
            .spawn()
            .map_err(|err| SyscallError::Spawn {
                source: err,
                program: syscall.program.clone(),
            })?;

        Ok(HostProcess(child))
    }
}

fn stdio(stream: Stream) -> Stdio {
    match stream {
        Stream::Inherit => Stdio::inherit(),
        Stream::Capture => Stdio::piped(),
    }
}

/// Process running on the host.
#[derive(Debug)]
pub struct HostProcess(Child);

impl Process for HostProcess {
    fn id(&self) -> u32 {
        self.0.id()
    }

    fn wait(self) -> Result<SyscallOutput> {
        let pid = self.0.id();
        let output = self
            .0
            .wait_with_output()
            .map_err(|err| SyscallError::Wait { source: err, pid })?;

        Ok(SyscallOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(output.stdout.as_slice()).into_owned(),
            stderr: String::from_utf8_lossy(output.stderr.as_slice()).into_owned(),
        })
    }

    fn try_wait(&mut self) -> Result<Option<SyscallOutput>> {
        let pid = self.0.id();
        let wait_err = |err| SyscallError::Wait { source: err, pid };
        let Some(status) = self.0.try_wait().map_err(wait_err)? else {
            return Ok(None);
        };

        Ok(Some(self.drain(status).map_err(wait_err)?))
    }
}

impl HostProcess {
    fn drain(&mut self, status: ExitStatus) -> std::io::Result<SyscallOutput> {
        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(pipe) = self.0.stdout.as_mut() {
            pipe.read_to_string(&mut stdout)?;
        }

        if let Some(pipe) = self.0.stderr.as_mut() {
            pipe.read_to_string(&mut stderr)?;
        }

        Ok(SyscallOutput {
            code: status.code(),
            stdout,
            stderr,
        })
    }
}

/// System call error types.
#[derive(Debug, thiserror::Error)]
pub enum SyscallError {
    /// Process could not be started.
    #[error("failed to spawn {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: OsString,
    },

    /// Process could not be waited on.
    #[error("failed to wait on process {pid}")]
    Wait {
        #[source]
        source: std::io::Error,
        pid: u32,
    },
}

/// Friendly result alias :3
pub type Result<T, E = SyscallError> = std::result::Result<T, E>;
