// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Launch request parsing.
//!
//! A launch request is written as a loose list of tokens, e.g.,
//! `01310 restart --build -d`. Tokens can appear in any order:
//!
//! - `up`, `down`, `restart` select the compose action. Only one action is
//!   ever active, and the last one given wins. Default is `up`.
//! - `--build` rebuilds images before starting.
//! - `-d` launches in the background and returns right away.
//! - Anything else is a service key. The last one given wins.

use crate::key::{KeyError, ServiceKey};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

/// Compose action to perform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    Up,
    Down,
    Restart,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Restart => "restart",
        }
    }
}

impl FromStr for Action {
    type Err = ();

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        match data {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "restart" => Ok(Self::Restart),
            _ => Err(()),
        }
    }
}

impl Display for Action {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Options of a compose invocation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    /// Action to perform.
    pub action: Action,

    /// Rebuild images before starting containers.
    pub build: bool,

    /// Do not wait for compose to finish.
    pub detached: bool,
}

/// Parsed launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchRequest {
    pub key: ServiceKey,
    pub options: CommandOptions,
}

impl LaunchRequest {
    /// Parse launch request from loose list of tokens.
    ///
    /// # Errors
    ///
    /// - Return [`OptionsError::Key`] if a token is neither a known option
    ///   nor a valid service key.
    /// - Return [`OptionsError::MissingIdentifier`] if no service key was
    ///   given at all.
    pub fn parse(tokens: impl IntoIterator<Item = impl AsRef<str>>) -> Result<Self> {
        let mut options = CommandOptions::default();
        let mut key = None;

        for token in tokens {
            let token = token.as_ref();
            match token {
                "--build" => options.build = true,
                "-d" => options.detached = true,
                _ => match token.parse::<Action>() {
                    Ok(action) => options.action = action,
                    Err(()) => key = Some(token.parse::<ServiceKey>()?),
                },
            }
        }

        Ok(Self {
            key: key.ok_or(OptionsError::MissingIdentifier)?,
            options,
        })
    }

    /// Merge flags given outside of the token list.
    ///
    /// Flags only ever switch options on, so a flag given as token stays set.
    pub fn with_flags(mut self, build: bool, detached: bool) -> Self {
        self.options.build |= build;
        self.options.detached |= detached;
        self
    }
}

/// Launch request parsing error types.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OptionsError {
    /// No service key among the tokens.
    #[error("no service key given (e.g. 01310)")]
    MissingIdentifier,

    /// Token is not a valid service key.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Friendly result alias :3
type Result<T, E = OptionsError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test_case(&["01310"], Action::Up, false, false; "default action is up")]
    #[test_case(&["down", "01310"], Action::Down, false, false; "action before key")]
    #[test_case(&["01310", "down", "restart"], Action::Restart, false, false; "last action wins")]
    #[test_case(&["restart", "up", "01310", "--build"], Action::Up, true, false; "build flag")]
    #[test_case(&["-d", "01310", "down"], Action::Down, false, true; "detached flag")]
    #[test]
    fn parse_launch_request(tokens: &[&str], action: Action, build: bool, detached: bool) {
        let result = LaunchRequest::parse(tokens).unwrap();
        let expect = LaunchRequest {
            key: "01310".parse().unwrap(),
            options: CommandOptions {
                action,
                build,
                detached,
            },
        };
        pretty_assertions::assert_eq!(result, expect);
    }

    #[test]
    fn parse_last_key_wins() {
        let result = LaunchRequest::parse(["01310", "up", "12345"]).unwrap();
        assert_eq!(result.key.to_string(), "12345");
    }

    #[test_case(false, false, false, false; "no flags")]
    #[test_case(true, false, true, false; "build flag")]
    #[test_case(false, true, false, true; "detach flag")]
    #[test]
    fn merge_outside_flags(build: bool, detached: bool, expect_build: bool, expect_detached: bool) {
        let result = LaunchRequest::parse(["01310", "down"])
            .unwrap()
            .with_flags(build, detached);
        let expect = CommandOptions {
            action: Action::Down,
            build: expect_build,
            detached: expect_detached,
        };
        pretty_assertions::assert_eq!(result.options, expect);

        let result = LaunchRequest::parse(["01310", "-d", "--build"])
            .unwrap()
            .with_flags(build, detached);
        assert!(result.options.build && result.options.detached);
    }

    #[test]
    fn parse_rejects_bad_tokens() {
        let result = LaunchRequest::parse(["up", "--build"]);
        assert_eq!(result, Err(OptionsError::MissingIdentifier));

        let result = LaunchRequest::parse(["01310", "--verbose"]);
        assert_eq!(
            result,
            Err(OptionsError::Key(KeyError::InvalidFormat {
                given: "--verbose".into()
            }))
        );
    }
}
