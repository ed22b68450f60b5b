// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Docker compose invocation.
//!
//! Once a service tree is resolved and its environment composed, the service
//! is launched through `docker compose`. The compose file lives in the
//! service directory and is named after the active version of the service:
//!
//! ```text
//! {service dir}/{version}-docker-compose.yml
//! ```
//!
//! The compose project name is taken from the composed environment
//! (`PROJECT_NAME` by default). The whole composed environment is layered
//! over the environment of the compose process, so the compose file can
//! refer to any variable defined along the tree.
//!
//! # Retries
//!
//! A failed invocation can be remediated and retried. The
//! [`Remediation`] strategy decides which failures it can handle. Retries
//! are bounded and happen without backoff.

pub mod options;
pub mod remedy;
pub mod syscall;

use crate::{
    compose::{
        options::{Action, CommandOptions},
        remedy::{NoRemediation, Remediation, RemedyError},
        syscall::{CommandRunner, Process, Syscall, SyscallError},
    },
    env::EnvironmentMap,
    fs::FileSystem,
    tree::ServiceTree,
};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Version of service to launch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComposeVariant {
    #[default]
    Dev,
    Prod,
}

/// Outcome of a successful invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Launch {
    /// Compose ran to completion.
    Completed,

    /// Compose was left running in the background.
    Detached { pid: u32 },
}

/// Launch services through compose.
#[derive(Debug, Clone)]
pub struct ComposeInvoker<R, M = NoRemediation> {
    runner: R,
    remediation: M,
    program: String,
    variant: ComposeVariant,
    project_var: String,
    max_retries: usize,
}

impl<R: CommandRunner> ComposeInvoker<R> {
    /// Construct new invoker that never remediates.
    pub fn new(runner: R) -> Self {
        Self {
            runner,
            remediation: NoRemediation,
            program: "docker".into(),
            variant: ComposeVariant::default(),
            project_var: "PROJECT_NAME".into(),
            max_retries: 0,
        }
    }
}

impl<R, M> ComposeInvoker<R, M>
where
    R: CommandRunner,
    M: Remediation,
{
    /// Remediate matching failures, retrying at most `max_retries` times.
    pub fn with_remediation<N: Remediation>(
        self,
        remediation: N,
        max_retries: usize,
    ) -> ComposeInvoker<R, N> {
        ComposeInvoker {
            runner: self.runner,
            remediation,
            program: self.program,
            variant: self.variant,
            project_var: self.project_var,
            max_retries,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_variant(mut self, variant: ComposeVariant) -> Self {
        self.variant = variant;
        self
    }

    /// Set variable holding compose project name.
    pub fn with_project_var(mut self, project_var: impl Into<String>) -> Self {
        self.project_var = project_var.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Expected path of compose file for target service tree.
    ///
    /// Returns `None` if the service directory was not found.
    pub fn compose_file(&self, tree: &ServiceTree) -> Option<PathBuf> {
        tree.service
            .dir
            .as_ref()
            .map(|dir| dir.join(self.compose_file_name(tree)))
    }

    fn compose_file_name(&self, tree: &ServiceTree) -> String {
        let version = match self.variant {
            ComposeVariant::Dev => &tree.service.dev_version,
            ComposeVariant::Prod => &tree.service.prod_version,
        };

        format!("{version}-docker-compose.yml")
    }

    /// Build compose system call.
    pub fn syscall(
        &self,
        file: &std::path::Path,
        project: &str,
        options: &CommandOptions,
        env: &EnvironmentMap,
    ) -> Syscall {
        let mut syscall = Syscall::new(&self.program)
            .args(["compose", "-f"])
            .args([file])
            .args(["-p", project, options.action.as_str()]);

        if options.build {
            syscall = syscall.args(["--build"]);
        }

        if options.detached && options.action == Action::Up {
            syscall = syscall.args(["-d"]);
        }

        syscall.envs(env)
    }

    /// Invoke compose for target service tree.
    ///
    /// Attached invocations wait for compose to finish. Detached invocations
    /// return as soon as compose is started.
    ///
    /// # Errors
    ///
    /// - Return [`ComposeError::ComposeFileNotFound`] if compose file does
    ///   not exist.
    /// - Return [`ComposeError::MissingProjectName`] if project variable is
    ///   absent or empty.
    /// - Return [`ComposeError::ExecutionFailed`] if compose exits
    ///   unsuccessfully and remediation did not help.
    /// - Return [`ComposeError::Remedy`] if remediation fails.
    /// - Return [`ComposeError::Syscall`] if compose cannot be run at all.
    #[instrument(skip(self, fs, tree, env), fields(key = %tree.key), level = "debug")]
    pub fn invoke(
        &self,
        fs: &impl FileSystem,
        options: &CommandOptions,
        tree: &ServiceTree,
        env: &EnvironmentMap,
    ) -> Result<Launch> {
        // INVARIANT: Preconditions are checked before any process is spawned.
        let file = match self.compose_file(tree) {
            Some(file) if fs.exists(&file) => file,
            Some(file) => return Err(ComposeError::ComposeFileNotFound { path: file }),
            None => {
                return Err(ComposeError::ComposeFileNotFound {
                    path: PathBuf::from(self.compose_file_name(tree)),
                })
            }
        };

        let project = env
            .get(&self.project_var)
            .filter(|project| !project.is_empty())
            .ok_or_else(|| ComposeError::MissingProjectName {
                var: self.project_var.clone(),
            })?;

        // INVARIANT: Detached processes outlive their handle, so nothing of
        //   theirs may be piped.
        let mut syscall = self.syscall(&file, project, options, env);
        if !options.detached {
            syscall = syscall.capture_stderr();
        }

        let mut retries = 0;

        loop {
            info!("run {syscall}");
            match self.launch(&syscall, options.detached) {
                Err(ComposeError::ExecutionFailed { code, stderr })
                    if retries < self.max_retries && self.remediation.matches(&stderr) =>
                {
                    warn!("compose failed with exit code {code:?}, attempting remediation");
                    self.remediation.remediate(&self.runner, &stderr)?;
                    retries += 1;
                    info!("retry {retries} of {}", self.max_retries);
                }
                result => return result,
            }
        }
    }

    fn launch(&self, syscall: &Syscall, detached: bool) -> Result<Launch> {
        let process = self.runner.spawn(syscall)?;
        if detached {
            let pid = process.id();
            info!("compose running in background with pid {pid}");
            return Ok(Launch::Detached { pid });
        }

        let output = process.wait()?;
        if !output.success() {
            return Err(ComposeError::ExecutionFailed {
                code: output.code,
                stderr: output.stderr,
            });
        }

        Ok(Launch::Completed)
    }
}

/// Compose invocation error types.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    /// Compose file of service does not exist.
    #[error("compose file {:?} not found", path.display())]
    ComposeFileNotFound { path: PathBuf },

    /// Environment lacks compose project name.
    #[error("variable {var} is not set, cannot name compose project")]
    MissingProjectName { var: String },

    /// Compose exited unsuccessfully.
    #[error("compose failed with exit code {code:?}: {stderr}")]
    ExecutionFailed { code: Option<i32>, stderr: String },

    /// Remediation of failure failed itself.
    #[error(transparent)]
    Remedy(#[from] RemedyError),

    /// Compose process cannot be run.
    #[error(transparent)]
    Syscall(#[from] SyscallError),
}

/// Friendly result alias :3
pub type Result<T, E = ComposeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compose::syscall::{self, SyscallOutput},
        fs::HostFs,
    };
    use pretty_assertions::assert_eq;
    use std::{
        cell::{Cell, RefCell},
        collections::VecDeque,
        fs::{create_dir_all, write},
        sync::mpsc,
        thread,
        time::Duration,
    };

    /// Runner whose processes exit with scripted outputs.
    #[derive(Debug, Default)]
    struct ScriptedRunner {
        calls: RefCell<Vec<Syscall>>,
        script: RefCell<VecDeque<SyscallOutput>>,
    }

    impl ScriptedRunner {
        fn new(script: impl IntoIterator<Item = SyscallOutput>) -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                script: RefCell::new(script.into_iter().collect()),
            }
        }

        fn spawned(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    struct Scripted(SyscallOutput);

    impl Process for Scripted {
        fn id(&self) -> u32 {
            42
        }

        fn wait(self) -> syscall::Result<SyscallOutput> {
            Ok(self.0)
        }

        fn try_wait(&mut self) -> syscall::Result<Option<SyscallOutput>> {
            Ok(Some(self.0.clone()))
        }
    }

    impl CommandRunner for ScriptedRunner {
        type Process = Scripted;

        fn spawn(&self, syscall: &Syscall) -> syscall::Result<Scripted> {
            self.calls.borrow_mut().push(syscall.clone());
            let output = self.script.borrow_mut().pop_front().unwrap_or(SyscallOutput {
                code: Some(0),
                ..Default::default()
            });
            Ok(Scripted(output))
        }
    }

    /// Runner whose processes never exit on their own.
    struct HangingRunner;

    struct Hanging;

    impl Process for Hanging {
        fn id(&self) -> u32 {
            7
        }

        fn wait(self) -> syscall::Result<SyscallOutput> {
            loop {
                thread::park();
            }
        }

        fn try_wait(&mut self) -> syscall::Result<Option<SyscallOutput>> {
            Ok(None)
        }
    }

    impl CommandRunner for HangingRunner {
        type Process = Hanging;

        fn spawn(&self, _syscall: &Syscall) -> syscall::Result<Hanging> {
            Ok(Hanging)
        }
    }

    /// Remediation that counts how often it ran.
    #[derive(Default)]
    struct CountingRemedy {
        runs: Cell<usize>,
    }

    impl Remediation for CountingRemedy {
        fn matches(&self, failure: &str) -> bool {
            failure.contains("in use by task")
        }

        fn remediate(&self, _runner: &impl CommandRunner, _failure: &str) -> remedy::Result<()> {
            self.runs.set(self.runs.get() + 1);
            Ok(())
        }
    }

    fn fail(stderr: &str) -> SyscallOutput {
        SyscallOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    struct Fixture {
        _root: tempfile::TempDir,
        tree: ServiceTree,
        env: EnvironmentMap,
    }

    fn fixture(with_compose_file: bool) -> anyhow::Result<Fixture> {
        let root = tempfile::tempdir()?;
        let service = root.path().join("01-acme/01310-web");
        create_dir_all(&service)?;
        write(service.join("0310-dev.env"), "PROJECT_NAME=acme-web\n")?;
        if with_compose_file {
            write(service.join("0310-docker-compose.yml"), "services: {}\n")?;
        }

        let mut tree = ServiceTree::resolve(&HostFs, root.path(), "01310".parse()?);
        tree.service.dir = Some(service);
        let env = [("PROJECT_NAME", "acme-web"), ("DOMAIN", "example.org")]
            .into_iter()
            .collect();

        Ok(Fixture {
            _root: root,
            tree,
            env,
        })
    }

    #[test]
    fn invoke_builds_argument_list() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let invoker = ComposeInvoker::new(ScriptedRunner::default());
        let options = CommandOptions {
            action: Action::Up,
            build: true,
            detached: false,
        };

        let result = invoker.invoke(&HostFs, &options, &fixture.tree, &fixture.env)?;
        assert_eq!(result, Launch::Completed);

        let calls = invoker.runner().calls.borrow();
        let file = invoker.compose_file(&fixture.tree).unwrap();
        let expect = format!("docker compose -f {} -p acme-web up --build", file.display());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].to_string(), expect);
        assert_eq!(
            calls[0].envs,
            vec![
                ("PROJECT_NAME".to_string(), "acme-web".to_string()),
                ("DOMAIN".into(), "example.org".into()),
            ]
        );

        Ok(())
    }

    #[test]
    fn invoke_only_detaches_up() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let invoker = ComposeInvoker::new(ScriptedRunner::default());
        let file = invoker.compose_file(&fixture.tree).unwrap();

        let up = CommandOptions {
            action: Action::Up,
            build: false,
            detached: true,
        };
        let syscall = invoker.syscall(&file, "acme-web", &up, &fixture.env);
        assert!(syscall.has_arg("-d"));

        let down = CommandOptions {
            action: Action::Down,
            ..up
        };
        let syscall = invoker.syscall(&file, "acme-web", &down, &fixture.env);
        assert!(!syscall.has_arg("-d"));
        assert!(syscall.has_arg("down"));

        Ok(())
    }

    #[test]
    fn invoke_missing_compose_file_spawns_nothing() -> anyhow::Result<()> {
        let fixture = fixture(false)?;
        let invoker = ComposeInvoker::new(ScriptedRunner::default());

        let result = invoker.invoke(&HostFs, &CommandOptions::default(), &fixture.tree, &fixture.env);
        assert!(matches!(result, Err(ComposeError::ComposeFileNotFound { .. })));
        assert_eq!(invoker.runner().spawned(), 0);

        let mut tree = fixture.tree.clone();
        tree.service.dir = None;
        let result = invoker.invoke(&HostFs, &CommandOptions::default(), &tree, &fixture.env);
        assert!(matches!(result, Err(ComposeError::ComposeFileNotFound { .. })));
        assert_eq!(invoker.runner().spawned(), 0);

        Ok(())
    }

    #[test]
    fn invoke_missing_project_name_spawns_nothing() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let invoker = ComposeInvoker::new(ScriptedRunner::default()).with_project_var("COMPOSE_NAME");

        let result = invoker.invoke(&HostFs, &CommandOptions::default(), &fixture.tree, &fixture.env);
        assert!(matches!(result, Err(ComposeError::MissingProjectName { .. })));
        assert_eq!(invoker.runner().spawned(), 0);

        Ok(())
    }

    #[test]
    fn invoke_detached_does_not_wait() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let (sender, receiver) = mpsc::channel();
        let options = CommandOptions {
            detached: true,
            ..Default::default()
        };

        thread::spawn(move || {
            let invoker = ComposeInvoker::new(HangingRunner);
            let result = invoker.invoke(&HostFs, &options, &fixture.tree, &fixture.env);
            let _ = sender.send(result.map_err(|err| err.to_string()));
        });

        let result = receiver.recv_timeout(Duration::from_secs(5))?;
        assert_eq!(result, Ok(Launch::Detached { pid: 7 }));

        Ok(())
    }

    #[test]
    fn invoke_remediates_once_then_retries() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let failure = "network juwju_net is in use by task xyz";
        let runner = ScriptedRunner::new([fail(failure), fail(failure)]);
        let invoker = ComposeInvoker::new(runner).with_remediation(CountingRemedy::default(), 1);

        let result = invoker.invoke(&HostFs, &CommandOptions::default(), &fixture.tree, &fixture.env);
        assert!(matches!(result, Err(ComposeError::ExecutionFailed { code: Some(1), .. })));
        assert_eq!(invoker.runner().spawned(), 2);
        assert_eq!(invoker.remediation.runs.get(), 1);

        Ok(())
    }

    #[test]
    fn invoke_succeeds_after_remediation() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let runner = ScriptedRunner::new([fail("network x is in use by task y")]);
        let invoker = ComposeInvoker::new(runner).with_remediation(CountingRemedy::default(), 1);

        let result = invoker.invoke(&HostFs, &CommandOptions::default(), &fixture.tree, &fixture.env)?;
        assert_eq!(result, Launch::Completed);
        assert_eq!(invoker.runner().spawned(), 2);
        assert_eq!(invoker.remediation.runs.get(), 1);

        Ok(())
    }

    #[test]
    fn invoke_does_not_remediate_unrelated_failure() -> anyhow::Result<()> {
        let fixture = fixture(true)?;
        let runner = ScriptedRunner::new([fail("no such image")]);
        let invoker = ComposeInvoker::new(runner).with_remediation(CountingRemedy::default(), 1);

        let result = invoker.invoke(&HostFs, &CommandOptions::default(), &fixture.tree, &fixture.env);
        assert!(matches!(result, Err(ComposeError::ExecutionFailed { .. })));
        assert_eq!(invoker.runner().spawned(), 1);
        assert_eq!(invoker.remediation.runs.get(), 0);

        Ok(())
    }
}
