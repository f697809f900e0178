//! Image header queries.
use crate::paths::path_arg;
use crate::runner::{Invocation, ToolRunner};
use crate::shells::Shells;
use anyhow::{Context, Result};
use std::path::Path;

/// Read the b-value shells of `image` via `mrinfo -shell_bvalues`.
pub fn shell_bvalues(runner: &mut dyn ToolRunner, image: &Path, cwd: &Path) -> Result<Shells> {
    let invocation = Invocation::new("mrinfo")
        .arg(path_arg(image, "image")?)
        .arg("-shell_bvalues");
    let text = runner.capture(&invocation, cwd)?;
    let shells =
        Shells::parse(&text).with_context(|| format!("read shells of {}", image.display()))?;
    tracing::info!(shells = ?shells.values(), "b-value shells");
    Ok(shells)
}
