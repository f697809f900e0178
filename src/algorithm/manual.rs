//! The `manual` algorithm: a response function from pre-selected voxels.
//!
//! The caller supplies the voxel selection. Fibre directions come either from
//! a user image or from the principal eigenvector of a tensor fit restricted
//! to those voxels; which one is settled once, during input import.
use super::{Algorithm, RunContext};
use crate::cli::ManualArgs;
use crate::header;
use crate::paths::{from_user, path_arg, user_arg};
use crate::runner::{run_function, Invocation, Step};
use crate::shells::LmaxList;
use crate::workspace::{Artifact, Provenance};
use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};

const TOOLS: &[&str] = &["dwi2tensor", "tensor2metric", "amp2response"];

/// Vector components fastest-varying, as amp2response expects.
const DIRECTION_STRIDES: &str = "0,0,0,1";

/// Where the fibre direction field comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directions {
    /// Imported from this user image.
    UserSupplied(PathBuf),
    /// Computed by a tensor fit over the selected voxels.
    Derived,
}

#[derive(Debug)]
pub struct ManualInputs {
    pub directions: Directions,
}

pub struct Manual {
    args: ManualArgs,
}

impl Manual {
    pub fn new(args: ManualArgs) -> Self {
        Self { args }
    }
}

impl Algorithm for Manual {
    type Inputs = ManualInputs;

    fn name(&self) -> &'static str {
        "manual"
    }

    fn required_tools(&self) -> &'static [&'static str] {
        TOOLS
    }

    fn input_image(&self) -> &Path {
        &self.args.input
    }

    fn output_paths(&self) -> Vec<&Path> {
        vec![self.args.output.as_path()]
    }

    fn get_inputs(&self, ctx: &mut RunContext<'_>) -> Result<ManualInputs> {
        // The voxel selection replaces any brain mask; a mask imported
        // earlier in the run would only mislead later readers of the workspace.
        if ctx.workspace.provenance(Artifact::Mask).is_some() {
            ctx.warn("-mask option is ignored by algorithm 'manual'");
            ctx.workspace.discard(Artifact::Mask)?;
        }

        let in_voxels = from_user(&self.args.in_voxels)?;
        ctx.run(Step::Command(
            Invocation::new("mrconvert")
                .arg(path_arg(&in_voxels, "voxel selection")?)
                .arg(path_arg(&ctx.workspace.path(Artifact::InVoxels), "scratch")?),
        ))?;
        ctx.workspace
            .record(Artifact::InVoxels, Provenance::User(in_voxels));

        let directions = match &self.args.dirs {
            Some(dirs) => {
                let dirs = from_user(dirs)?;
                ctx.run(Step::Command(
                    Invocation::new("mrconvert")
                        .arg(path_arg(&dirs, "directions")?)
                        .arg(path_arg(&ctx.workspace.path(Artifact::Dirs), "scratch")?)
                        .arg("-strides")
                        .arg(DIRECTION_STRIDES),
                ))?;
                ctx.workspace
                    .record(Artifact::Dirs, Provenance::User(dirs.clone()));
                Directions::UserSupplied(dirs)
            }
            None => Directions::Derived,
        };
        Ok(ManualInputs { directions })
    }

    fn execute(&self, ctx: &mut RunContext<'_>, inputs: ManualInputs) -> Result<()> {
        let options = ctx.options;
        let dwi = path_arg(&ctx.workspace.require(Artifact::Dwi)?, "scratch")?;
        let in_voxels = path_arg(&ctx.workspace.require(Artifact::InVoxels)?, "scratch")?;

        let shells = header::shell_bvalues(
            &mut *ctx.runner,
            &ctx.workspace.path(Artifact::Dwi),
            ctx.workspace.root(),
        )?;
        let lmax = match options
            .lmax
            .as_deref()
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
        {
            Some(raw) => Some(LmaxList::parse_for(raw, &shells)?),
            None => None,
        };
        if let Some(lmax) = &lmax {
            tracing::debug!(lmax = ?lmax.values(), "lmax per shell");
        }

        let dirs = match inputs.directions {
            Directions::UserSupplied(source) => {
                tracing::debug!(source = %source.display(), "using supplied fibre directions");
                path_arg(&ctx.workspace.require(Artifact::Dirs)?, "scratch")?
            }
            Directions::Derived => {
                let dirs = path_arg(&ctx.workspace.path(Artifact::Dirs), "scratch")?;
                ctx.run(Step::Pipeline(vec![
                    Invocation::new("dwi2tensor")
                        .arg(dwi.as_str())
                        .args(["-", "-mask"])
                        .arg(in_voxels.as_str()),
                    Invocation::new("tensor2metric")
                        .args(["-", "-vector"])
                        .arg(dirs.as_str()),
                ]))?;
                ctx.workspace
                    .record(Artifact::Dirs, Provenance::Derived("tensor2metric"));
                dirs
            }
        };

        let response = ctx.workspace.path(Artifact::Response);
        let mut fit = Invocation::new("amp2response")
            .arg(dwi)
            .arg(in_voxels.as_str())
            .arg(dirs)
            .arg(path_arg(&response, "scratch")?)
            .arg("-shells")
            .arg(shells.option_value());
        if let Some(lmax) = &lmax {
            fit = fit.arg("-lmax").arg(lmax.option_value());
        }
        ctx.run(Step::Command(fit))?;
        ctx.workspace
            .record(Artifact::Response, Provenance::Derived("amp2response"));

        let output = from_user(&self.args.output)?;
        run_function(
            &format!("copy {} to {}", response.display(), output.display()),
            || fs::copy(&response, &output).map(|_| ()),
        )?;

        if let Some(voxels) = &options.voxels {
            let mut export = Invocation::new("mrconvert")
                .arg(in_voxels)
                .arg(user_arg(voxels, "voxels output")?)
                .arg("-strides")
                .arg(user_arg(&self.args.input, "input")?);
            if options.force {
                export = export.arg("-force");
            }
            ctx.run(Step::Command(export))?;
        }
        Ok(())
    }
}
