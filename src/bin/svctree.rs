// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use svctree::{
    compose::{
        options::LaunchRequest,
        remedy::{NetworkCleanup, DAEMON_RESTART_TIMEOUT},
        syscall::HostRunner,
        ComposeInvoker, Launch,
    },
    config::Settings,
    env::{launch_report, EnvLoader},
    fs::HostFs,
    journal::ErrorJournal,
    path::default_config_path,
    tree::ServiceTree,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::{
    fs::read_to_string,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  svctree [options] <service_key> [up|down|restart] [--build] [-d]\n  svctree [options] journal <command>",
    subcommand_help_heading = "Commands",
    args_conflicts_with_subcommands = true,
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    #[command(flatten)]
    pub launch: LaunchOptions,

    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl Cli {
    fn run(self, settings: &Settings, journal: &ErrorJournal) -> Result<()> {
        match self.command {
            Some(Command::Journal(opts)) => run_journal(opts, journal),
            None => run_launch(self.launch, settings),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Inspect recorded errors.
    #[command(subcommand, override_usage = "svctree journal <command>")]
    Journal(JournalCommand),
}

#[derive(Debug, Clone, Subcommand)]
enum JournalCommand {
    /// List recorded errors.
    List,

    /// Move recorded error into archive.
    #[command(override_usage = "svctree journal archive <id>")]
    Archive {
        /// Identifier of recorded error.
        #[arg(value_name = "id")]
        id: u64,
    },
}

#[derive(clap::Args, Clone, Debug)]
struct LaunchOptions {
    /// Service key and compose action, in any order.
    #[arg(value_name = "token")]
    pub tokens: Vec<String>,

    /// Rebuild images before starting containers.
    #[arg(long)]
    pub build: bool,

    /// Launch in the background.
    #[arg(short = 'd', long = "detach")]
    pub detached: bool,

    /// Root of service tree, defaults to current directory.
    #[arg(short = 'C', long, value_name = "dir")]
    pub root: Option<PathBuf>,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = Cli::parse();
    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    };

    let journal = ErrorJournal::new(&settings.journal.path, &settings.journal.archive);
    if let Err(error) = cli.run(&settings, &journal) {
        error!("{error:?}");
        record_error(&journal, &error);
        exit(1);
    }

    exit(0)
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => {
            let path = default_config_path()?;
            if !path.exists() {
                debug!("no settings file at {:?}, using defaults", path.display());
                return Ok(Settings::default());
            }
            path
        }
    };

    let content = read_to_string(&path)
        .with_context(|| format!("failed to read settings at {:?}", path.display()))?;
    let settings = content
        .parse::<Settings>()
        .with_context(|| format!("invalid settings at {:?}", path.display()))?;

    Ok(settings)
}

fn record_error(journal: &ErrorJournal, error: &anyhow::Error) {
    let causes = error
        .chain()
        .skip(1)
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    let stack = (!causes.is_empty()).then(|| causes.join("\n"));

    if let Err(journal_error) = journal.record(error.to_string(), stack) {
        warn!("cannot record error in journal: {journal_error}");
    }
}

fn run_launch(opts: LaunchOptions, settings: &Settings) -> Result<()> {
    let request = LaunchRequest::parse(&opts.tokens)?.with_flags(opts.build, opts.detached);

    let root = match opts.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };

    let tree = ServiceTree::resolve(&HostFs, root, request.key);
    let loader = EnvLoader::new(settings.interpolation.max_passes);
    let env = loader.load(&HostFs, tree.env_files())?;

    if let Some(report) = launch_report(&tree, &env, &request.options) {
        info!("\n{report}");
    }

    let remediation = &settings.remediation;
    let cleanup = NetworkCleanup::new()
        .with_program(&settings.compose.program)
        .with_patterns(&remediation.patterns)
        .with_networks(&remediation.networks)
        .with_confirm(remediation.confirm)
        .with_daemon_restart(remediation.restart_daemon, DAEMON_RESTART_TIMEOUT)
        .with_progress(ProgressBar::new_spinner())?;
    let invoker = ComposeInvoker::new(HostRunner)
        .with_program(&settings.compose.program)
        .with_variant(settings.compose.variant)
        .with_project_var(&settings.compose.project_var)
        .with_remediation(cleanup, remediation.max_retries);

    match invoker.invoke(&HostFs, &request.options, &tree, &env.vars)? {
        Launch::Completed => info!(
            "compose {} of service {} finished",
            request.options.action, request.key
        ),
        Launch::Detached { pid } => info!(
            "compose {} of service {} running in background (pid {pid})",
            request.options.action, request.key
        ),
    }

    Ok(())
}

fn run_journal(opts: JournalCommand, journal: &ErrorJournal) -> Result<()> {
    match opts {
        JournalCommand::List => {
            let entries = journal.entries()?;
            if entries.is_empty() {
                info!("no recorded errors in {:?}", journal.path().display());
            }

            for entry in entries {
                info!(
                    "#{} [{}x, last {}] {}",
                    entry.id,
                    entry.count,
                    entry.last_occurrence.to_rfc3339(),
                    entry.message
                );
                if let Some(stack) = entry.stack {
                    for cause in stack.lines() {
                        info!("    caused by: {cause}");
                    }
                }
            }
        }
        JournalCommand::Archive { id } => {
            let entry = journal.archive(id)?;
            info!("archived error #{} {:?}", entry.id, entry.message);
        }
    }

    Ok(())
}
