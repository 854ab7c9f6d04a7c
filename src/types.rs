use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Opaque identifier of a logical unit (usually a package directory).
///
/// Keys are only ever produced by a [`KeyResolver`](crate::watch::KeyResolver)
/// and compare by exact string equality.
pub type PackageKey = String;

/// Which strategy turns a changed directory into a [`PackageKey`].
///
/// - `Relative`: the directory path relative to the watch root.
/// - `SourceRoot`: the directory path relative to `<source root>/<subdir>`
///   of the nearest configured source root (GOPATH-style layouts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolverKind {
    Relative,
    SourceRoot,
}

impl Default for ResolverKind {
    fn default() -> Self {
        ResolverKind::Relative
    }
}

impl FromStr for ResolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "relative" => Ok(ResolverKind::Relative),
            "source-root" | "source_root" => Ok(ResolverKind::SourceRoot),
            other => Err(format!(
                "invalid resolver: {other} (expected \"relative\" or \"source-root\")"
            )),
        }
    }
}

/// How a child process ended, as far as the supervisor and executor care.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exit status zero.
    Success,
    /// Non-zero exit. `None` when the process was terminated by a signal.
    Failed(Option<i32>),
}

impl ExitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Success)
    }
}

impl From<std::process::ExitStatus> for ExitOutcome {
    fn from(status: std::process::ExitStatus) -> Self {
        if status.success() {
            ExitOutcome::Success
        } else {
            ExitOutcome::Failed(status.code())
        }
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitOutcome::Success => write!(f, "exited successfully"),
            ExitOutcome::Failed(Some(code)) => write!(f, "exited with status {code}"),
            ExitOutcome::Failed(None) => write!(f, "terminated by signal"),
        }
    }
}
