// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that svctree uses to simplify the
//! process of serialization and deserialization. File I/O is left to the
//! caller to figure out.

use crate::{compose::ComposeVariant, env::interpolate::DEFAULT_MAX_PASSES};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Settings layout.
///
/// Every section and every key is optional. Anything left out falls back to
/// its default, so an empty settings file is a valid one.
///
/// # General Layout
///
/// ```toml
/// [interpolation]
/// max_passes = 3
///
/// [compose]
/// program = "docker"
/// variant = "dev"
/// project_var = "PROJECT_NAME"
///
/// [journal]
/// path = "errors.json"
/// archive = "ErrorArchive.json"
///
/// [remediation]
/// patterns = ["network", "in use by task"]
/// networks = []
/// max_retries = 1
/// confirm = true
/// restart_daemon = false
/// ```
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub interpolation: InterpolationSettings,
    pub compose: ComposeSettings,
    pub journal: JournalSettings,
    pub remediation: RemediationSettings,
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on journal paths.
        settings.journal.path = expand(&settings.journal.path)?;
        settings.journal.archive = expand(&settings.journal.archive)?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn expand(path: &std::path::Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Variable interpolation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InterpolationSettings {
    /// Bound on interpolation passes, zero disables interpolation. Bounds
    /// above [`MAX_PASSES_LIMIT`](crate::env::interpolate::MAX_PASSES_LIMIT) are
    /// lowered to it.
    pub max_passes: usize,
}

impl Default for InterpolationSettings {
    fn default() -> Self {
        Self {
            max_passes: DEFAULT_MAX_PASSES,
        }
    }
}

/// Compose invocation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComposeSettings {
    /// Program providing the `compose` subcommand.
    pub program: String,

    /// Service version whose compose file is used.
    pub variant: ComposeVariant,

    /// Variable holding compose project name.
    pub project_var: String,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            program: "docker".into(),
            variant: ComposeVariant::Dev,
            project_var: "PROJECT_NAME".into(),
        }
    }
}

/// Error journal settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JournalSettings {
    /// Journal of recorded errors.
    pub path: PathBuf,

    /// Journal of archived errors.
    pub archive: PathBuf,
}

impl Default for JournalSettings {
    fn default() -> Self {
        Self {
            path: "errors.json".into(),
            archive: "ErrorArchive.json".into(),
        }
    }
}

/// Failure remediation settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemediationSettings {
    /// Patterns that must all occur in a failure to remediate it.
    pub patterns: Vec<String>,

    /// Networks to always clean up.
    pub networks: Vec<String>,

    /// Bound on retries after remediation, zero disables remediation.
    pub max_retries: usize,

    /// Ask before removing Swarm services.
    pub confirm: bool,

    /// Restart Docker daemon after cleanup.
    pub restart_daemon: bool,
}

impl Default for RemediationSettings {
    fn default() -> Self {
        Self {
            patterns: vec!["network".into(), "in use by task".into()],
            networks: Vec::new(),
            max_retries: 1,
            confirm: true,
            restart_daemon: false,
        }
    }
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
