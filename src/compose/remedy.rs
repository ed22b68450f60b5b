// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remediation of failed compose invocations.
//!
//! Some compose failures are caused by leftover Docker state rather than by
//! the service itself. The classic case is a network still held by a Swarm
//! task, which makes `docker compose up` refuse to recreate it. A
//! [`Remediation`] recognizes such a failure and tries to clean up, so the
//! invocation can be retried.

use crate::compose::syscall::{CommandRunner, Process, Syscall, SyscallError, SyscallOutput};

use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    sync::LazyLock,
    thread,
    time::{Duration, Instant},
};
use tracing::{debug, info, instrument, warn};

/// Bound on waiting for Docker daemon restart.
pub const DAEMON_RESTART_TIMEOUT: Duration = Duration::from_secs(30);

static NETWORK_IN_USE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"network\s+([\w.-]+)\s+(?:id\s+\S+\s+)?is in use by task")
        .expect("network pattern is valid")
});

/// Strategy to recover from failed compose invocation.
pub trait Remediation {
    /// Check if failure message can be remediated.
    fn matches(&self, failure: &str) -> bool;

    /// Attempt to fix cause of failure.
    ///
    /// # Errors
    ///
    /// - Return [`RemedyError`] if remediation cannot be carried out.
    fn remediate(&self, runner: &impl CommandRunner, failure: &str) -> Result<()>;
}

/// Never remediate anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRemediation;

impl Remediation for NoRemediation {
    fn matches(&self, _failure: &str) -> bool {
        false
    }

    fn remediate(&self, _runner: &impl CommandRunner, _failure: &str) -> Result<()> {
        Ok(())
    }
}

/// Clean up Docker networks that block compose.
///
/// For each target network:
///
/// 1. Inspect it. Networks that do not exist are skipped, any other inspect
///    failure aborts the cleanup.
/// 2. If it is a Swarm network, remove the services attached to it, after
///    asking the user for confirmation.
/// 3. Stop and remove containers attached to it.
/// 4. Remove the network itself.
///
/// Afterwards dangling Docker resources are pruned, and the Docker daemon
/// is optionally restarted.
#[derive(Debug, Clone)]
pub struct NetworkCleanup {
    program: String,
    patterns: Vec<String>,
    networks: Vec<String>,
    confirm: bool,
    restart_daemon: bool,
    restart_timeout: Duration,
    bar: ProgressBar,
}

impl Default for NetworkCleanup {
    fn default() -> Self {
        Self {
            program: "docker".into(),
            patterns: vec!["network".into(), "in use by task".into()],
            networks: Vec::new(),
            confirm: true,
            restart_daemon: false,
            restart_timeout: DAEMON_RESTART_TIMEOUT,
            bar: ProgressBar::hidden(),
        }
    }
}

impl NetworkCleanup {
    /// Construct new network cleanup with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set patterns that must all occur in a failure message to match.
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.patterns = patterns.into_iter().map(Into::into).collect();
        self
    }

    /// Set networks to clean up on top of those named by the failure.
    pub fn with_networks(mut self, networks: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.networks = networks.into_iter().map(Into::into).collect();
        self
    }

    /// Ask before removing Swarm services.
    pub fn with_confirm(mut self, confirm: bool) -> Self {
        self.confirm = confirm;
        self
    }

    /// Restart Docker daemon after cleanup, waiting at most for timeout.
    pub fn with_daemon_restart(mut self, restart: bool, timeout: Duration) -> Self {
        self.restart_daemon = restart;
        self.restart_timeout = timeout;
        self
    }

    /// Report progress on target progress bar.
    ///
    /// # Errors
    ///
    /// - Return [`RemedyError::IndicatifStyleTemplate`] if spinner style is
    ///   invalid.
    pub fn with_progress(mut self, bar: ProgressBar) -> Result<Self> {
        let style = ProgressStyle::with_template("{spinner:.yellow} {elapsed_precise:.green}  {msg}")?;
        bar.set_style(style);
        self.bar = bar;
        Ok(self)
    }

    /// Networks to clean up for target failure, without duplicates.
    pub fn targets(&self, failure: &str) -> Vec<String> {
        let mut targets = self.networks.clone();
        for caps in NETWORK_IN_USE.captures_iter(failure) {
            targets.push(caps[1].to_string());
        }

        let mut seen = Vec::with_capacity(targets.len());
        targets.retain(|network| {
            if seen.contains(network) {
                false
            } else {
                seen.push(network.clone());
                true
            }
        });

        targets
    }

    fn docker(&self, args: impl IntoIterator<Item = impl Into<std::ffi::OsString>>) -> Syscall {
        Syscall::new(&self.program).args(args).capture()
    }

    fn clean_network(&self, runner: &impl CommandRunner, network: &str) -> Result<()> {
        self.bar.set_message(format!("inspect network {network}"));
        let output = runner.output(&self.docker(["network", "inspect", network]))?;
        if !output.success() {
            if output.stderr.contains("not found") {
                info!("network {network} does not exist, skipping");
                return Ok(());
            }

            return Err(RemedyError::Step {
                step: format!("network inspect {network}"),
                output,
            });
        }

        let inspect: Vec<NetworkInspect> = serde_json::from_str(&output.stdout)?;
        let Some(inspect) = inspect.into_iter().next() else {
            return Ok(());
        };

        if inspect.scope == "swarm" {
            self.remove_swarm_services(runner, network)?;
        }

        for container in inspect.containers.unwrap_or_default().keys() {
            self.bar.set_message(format!("remove container {container}"));
            for action in ["stop", "rm"] {
                let output = runner.output(&self.docker([action, container.as_str()]))?;
                if !output.success() {
                    warn!("cannot {action} container {container}: {}", output.message());
                }
            }
        }

        self.bar.set_message(format!("remove network {network}"));
        let output = runner.output(&self.docker(["network", "rm", network]))?;
        if output.success() {
            info!("removed network {network}");
        } else if output.stderr.contains("in use by task") {
            warn!("network {network} is still in use by a task");
        } else {
            warn!("cannot remove network {network}: {}", output.message());
        }

        Ok(())
    }

    fn remove_swarm_services(&self, runner: &impl CommandRunner, network: &str) -> Result<()> {
        self.bar.set_message(format!("list services of swarm network {network}"));
        let filter = format!("network={network}");
        let output = runner.output(&self.docker([
            "service",
            "ls",
            "--filter",
            filter.as_str(),
            "--format",
            "{{.ID}}",
        ]))?;
        if !output.success() {
            return Err(RemedyError::Step {
                step: format!("service ls {network}"),
                output,
            });
        }

        let services: Vec<String> = output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(String::from)
            .collect();

        if services.is_empty() {
            debug!("no service attached to swarm network {network}");
            return Ok(());
        }

        if self.confirm {
            let question = format!(
                "remove {} swarm service(s) attached to network {network}?",
                services.len()
            );
            let accepted = self
                .bar
                .suspend(|| Confirm::new(&question).with_default(false).prompt())?;
            if !accepted {
                return Err(RemedyError::Declined {
                    network: network.into(),
                });
            }
        }

        for service in &services {
            self.bar.set_message(format!("remove service {service}"));
            let output = runner.output(&self.docker(["service", "rm", service.as_str()]))?;
            if !output.success() {
                return Err(RemedyError::Step {
                    step: format!("service rm {service}"),
                    output,
                });
            }
        }

        Ok(())
    }

    fn clean_up(&self, runner: &impl CommandRunner, failure: &str) -> Result<()> {
        for network in self.targets(failure) {
            self.clean_network(runner, &network)?;
        }

        self.bar.set_message("prune docker system");
        let output = runner.output(&self.docker(["system", "prune", "-f"]))?;
        if !output.success() {
            warn!("docker system prune failed: {}", output.message());
        }

        if self.restart_daemon {
            self.restart_daemon(runner)?;
        }

        Ok(())
    }

    fn restart_daemon(&self, runner: &impl CommandRunner) -> Result<()> {
        self.bar.set_message("restart docker daemon");
        let syscall = Syscall::new("sudo").args(["systemctl", "restart", "docker"]);
        let mut process = runner.spawn(&syscall)?;
        let deadline = Instant::now() + self.restart_timeout;

        loop {
            if let Some(output) = process.try_wait()? {
                if !output.success() {
                    warn!("docker daemon restart failed: {}", output.message());
                }
                return Ok(());
            }

            if Instant::now() >= deadline {
                warn!(
                    "docker daemon restart still running after {}s, moving on",
                    self.restart_timeout.as_secs()
                );
                return Ok(());
            }

            thread::sleep(Duration::from_millis(100));
        }
    }
}

impl Remediation for NetworkCleanup {
    fn matches(&self, failure: &str) -> bool {
        !self.patterns.is_empty()
            && self
                .patterns
                .iter()
                .all(|pattern| failure.contains(pattern.as_str()))
    }

    #[instrument(skip(self, runner, failure), level = "debug")]
    fn remediate(&self, runner: &impl CommandRunner, failure: &str) -> Result<()> {
        self.bar.reset();
        self.bar.enable_steady_tick(Duration::from_millis(100));
        let result = self.clean_up(runner, failure);
        self.bar.finish_and_clear();
        result?;

        info!("network cleanup done");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct NetworkInspect {
    #[serde(rename = "Scope", default)]
    scope: String,

    #[serde(rename = "Containers", default)]
    containers: Option<BTreeMap<String, serde_json::Value>>,
}

/// Remediation error types.
#[derive(Debug, thiserror::Error)]
pub enum RemedyError {
    /// User refused to remove Swarm services.
    #[error("removal of swarm services on network {network} was declined")]
    Declined { network: String },

    /// Cleanup step exited unsuccessfully.
    #[error("cleanup step {step:?} failed: {}", output.message())]
    Step { step: String, output: SyscallOutput },

    /// Docker produced unexpected inspect output.
    #[error(transparent)]
    Inspect(#[from] serde_json::Error),

    /// External process could not be run.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// User prompt failed.
    #[error(transparent)]
    Prompt(#[from] inquire::InquireError),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = RemedyError> = std::result::Result<T, E>;
