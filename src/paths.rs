//! User-facing path handling and output checks.
use crate::error::PreconditionError;
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};

/// Make a user path absolute against the invocation directory.
///
/// Tools run with the scratch directory as their working directory, so
/// relative user paths would otherwise resolve against the wrong place.
pub fn from_user(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("resolve path {}", path.display()))
}

/// Check that `path` may be written as a run output.
///
/// Nothing is created here; the check only has to hold until the run
/// reaches its export step.
pub fn check_output_path(path: &Path, force: bool) -> Result<()> {
    let path = from_user(path)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.is_dir() {
            return Err(PreconditionError::OutputParentMissing(path).into());
        }
    }
    if path.exists() {
        if !force {
            return Err(PreconditionError::OutputExists(path).into());
        }
        tracing::warn!(path = %path.display(), "output will be overwritten");
    }
    Ok(())
}

/// Borrow a path as UTF-8 for use on a tool command line.
pub fn path_arg(path: &Path, label: &str) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{label} path is not valid UTF-8: {}", path.display()))
}

/// Resolve a user path and render it as a command-line argument.
pub fn user_arg(path: &Path, label: &str) -> Result<String> {
    path_arg(&from_user(path)?, label)
}
