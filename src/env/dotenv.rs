// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Environment file parsing.
//!
//! Environment files follow the usual dotenv conventions:
//!
//! ```text
//! # Comment lines and blank lines are ignored.
//! DOMAIN=example.org
//! export ORG=acme               # "export" prefix is allowed
//! GREETING="hello\nworld"       # double quotes expand escapes
//! RAW='${NOT_EXPANDED_HERE}'    # single quotes are literal
//! PROJECT_NAME=${ORG}-web       # references are resolved later
//! ```
//!
//! Parsing is lenient. Malformed lines are skipped with a warning rather than
//! failing the whole file.

use tracing::warn;

/// Parse environment file content into ordered variable assignments.
///
/// Duplicate keys are kept in order of appearance, so merging the result
/// naturally lets the last assignment win.
pub fn parse(content: &str) -> Vec<(String, String)> {
    let mut vars = Vec::new();

    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").map_or(line, str::trim_start);
        let Some((key, value)) = line.split_once('=') else {
            warn!("skip line {} without assignment: {line:?}", number + 1);
            continue;
        };

        let key = key.trim();
        if !is_valid_key(key) {
            warn!("skip line {} with invalid key {key:?}", number + 1);
            continue;
        }

        vars.push((key.to_string(), parse_value(value.trim())));
    }

    vars
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }

    chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-'))
}

fn parse_value(value: &str) -> String {
    if let Some(rest) = value.strip_prefix('"') {
        if let Some(quoted) = double_quoted(rest) {
            return quoted;
        }
    }

    if let Some(rest) = value.strip_prefix('\'') {
        if let Some((quoted, _)) = rest.split_once('\'') {
            return quoted.to_string();
        }
    }

    // INVARIANT: Inline comments need leading whitespace, so "a#b" stays intact.
    let value = match value.find(" #").or_else(|| value.find("\t#")) {
        Some(at) => &value[..at],
        None => value,
    };

    value.trim_end().to_string()
}

fn double_quoted(rest: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = rest.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => return Some(out),
            '\\' => match chars.next()? {
                'n' => out.push('\n'),
                'r' => out.push('\r'),
                't' => out.push('\t'),
                other => out.push(other),
            },
            other => out.push(other),
        }
    }

    // Unterminated quote, so let caller treat it as a bare value.
    None
}
