// src/system/environment.rs

use crate::constants::{
    DEFAULT_ENVIRONMENT, SHAREAS_DEFAULT_ENTRY, SHAREAS_KEY, STDENV_COMMENT_MARKER,
};
use nix::unistd::{Uid, User};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvironmentError {
    #[error("User registry lookup failed for uid {uid}: {source}")]
    Lookup {
        uid: Uid,
        #[source]
        source: nix::Error,
    },
    #[error("No user registry entry for uid {0}")]
    UnknownUser(Uid),
}

/// The invoking account as recorded in the user registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub home: PathBuf,
    pub shell: PathBuf,
}

impl Account {
    /// Looks up the account the supervisor runs under.
    pub fn current() -> Result<Self, EnvironmentError> {
        let uid = Uid::current();
        let user = User::from_uid(uid)
            .map_err(|source| EnvironmentError::Lookup { uid, source })?
            .ok_or(EnvironmentError::UnknownUser(uid))?;
        log::debug!(
            "Running as {} (home {}, shell {})",
            user.name,
            user.dir.display(),
            user.shell.display()
        );
        Ok(Self {
            name: user.name,
            home: user.dir,
            shell: user.shell,
        })
    }
}

/// The child's environment as an ordered list of `KEY=VALUE` entries.
///
/// Entries are kept in application order; when a key repeats, the last
/// entry wins.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvironmentList {
    entries: Vec<String>,
}

impl EnvironmentList {
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// The effective value of `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .filter_map(|entry| split_entry(entry))
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Resolved `(key, value)` pairs, one per key, in first-appearance order.
    /// Entries without `=` are skipped.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        for entry in &self.entries {
            let Some((key, value)) = split_entry(entry) else {
                log::warn!("Ignoring environment entry without '=': {}", entry);
                continue;
            };
            match pairs.iter_mut().find(|(k, _)| k == key) {
                Some(existing) => existing.1 = value.to_string(),
                None => pairs.push((key.to_string(), value.to_string())),
            }
        }
        pairs
    }

    /// True unless the effective sharing policy isolates the child.
    pub fn shares_address_space(&self) -> bool {
        !matches!(self.get(SHAREAS_KEY), Some(value) if value.eq_ignore_ascii_case("NO"))
    }
}

fn split_entry(entry: &str) -> Option<(&str, &str)> {
    entry.split_once('=').filter(|(key, _)| !key.is_empty())
}

/// Assembles the child environment.
///
/// Order of application: the static defaults, `HOME` and `PWD` from the
/// account, the lines of the STDENV dataset (leading whitespace trimmed,
/// blank and `#` lines skipped), and finally `_BPX_SHAREAS=MUST` unless
/// STDENV set `_BPX_SHAREAS` itself.
pub fn build_environment(account: &Account, stdenv: Option<&str>) -> EnvironmentList {
    let mut entries: Vec<String> = DEFAULT_ENVIRONMENT.iter().map(|e| e.to_string()).collect();

    let home = account.home.display();
    entries.push(format!("HOME={}", home));
    entries.push(format!("PWD={}", home));

    let mut shareas_overridden = false;
    for line in stdenv.unwrap_or_default().lines() {
        let line = line.trim_start_matches([' ', '\t', '\n']);
        if line.is_empty() || line.starts_with(STDENV_COMMENT_MARKER) {
            continue;
        }
        if line
            .strip_prefix(SHAREAS_KEY)
            .is_some_and(|rest| rest.starts_with('='))
        {
            shareas_overridden = true;
        }
        entries.push(line.to_string());
    }

    if !shareas_overridden {
        entries.push(SHAREAS_DEFAULT_ENTRY.to_string());
    }

    log::debug!("Assembled {} environment entries", entries.len());
    EnvironmentList { entries }
}

// MARK: --- UNIT TESTS ---
