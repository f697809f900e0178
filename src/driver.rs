//! The `dwi2response` driver.
//!
//! Sequences one run: output checks, tool preflight, scratch workspace,
//! common imports, then the algorithm's two phases. The workspace is removed
//! on every exit path unless the caller asked to keep it.
use crate::algorithm::{Algorithm, RunContext};
use crate::cli::GlobalArgs;
use crate::config::Config;
use crate::paths::{check_output_path, path_arg, user_arg};
use crate::runner::{Invocation, ProcessRunner, Step, ToolRunner};
use crate::workspace::{Artifact, Provenance, Workspace};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Tools the driver itself calls, whatever the algorithm.
const DRIVER_TOOLS: &[&str] = &["mrconvert", "mrinfo"];

/// Gradient table supplied alongside the DWI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gradients {
    Mrtrix(PathBuf),
    Fsl { bvecs: PathBuf, bvals: PathBuf },
}

/// Resolved settings for one run: command line layered over config.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub mask: Option<PathBuf>,
    pub lmax: Option<String>,
    pub voxels: Option<PathBuf>,
    pub gradients: Option<Gradients>,
    pub force: bool,
    pub keep_scratch: bool,
    pub scratch_parent: Option<PathBuf>,
    pub tool_dir: Option<PathBuf>,
}

impl RunOptions {
    pub fn new(args: &GlobalArgs, config: Config) -> Self {
        let gradients = match (&args.grad, args.fslgrad.as_deref()) {
            (Some(grad), _) => Some(Gradients::Mrtrix(grad.clone())),
            (None, Some([bvecs, bvals])) => Some(Gradients::Fsl {
                bvecs: bvecs.clone(),
                bvals: bvals.clone(),
            }),
            _ => None,
        };
        Self {
            mask: args.mask.clone(),
            lmax: args.lmax.clone(),
            voxels: args.voxels.clone(),
            gradients,
            force: args.force,
            keep_scratch: args.nocleanup || config.keep_scratch,
            scratch_parent: args.scratch.clone().or(config.scratch_dir),
            tool_dir: config.tool_dir,
        }
    }
}

/// What a successful run leaves behind besides its outputs.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub warnings: Vec<String>,
    /// Set when the scratch directory was kept.
    pub scratch: Option<PathBuf>,
}

/// Run `algorithm` against the real MRtrix executables.
pub fn execute<A: Algorithm>(algorithm: &A, options: &RunOptions) -> Result<RunSummary> {
    check_output_paths(algorithm, options)?;
    let tools: Vec<&str> = DRIVER_TOOLS
        .iter()
        .chain(algorithm.required_tools())
        .copied()
        .collect();
    let mut runner = ProcessRunner::resolve(options.tool_dir.as_deref(), &tools)?;
    run_pipeline(algorithm, options, &mut runner)
}

/// Validate every user output before any work starts.
pub fn check_output_paths<A: Algorithm>(algorithm: &A, options: &RunOptions) -> Result<()> {
    for path in algorithm.output_paths() {
        check_output_path(path, options.force)?;
    }
    if let Some(voxels) = &options.voxels {
        check_output_path(voxels, options.force)?;
    }
    Ok(())
}

/// Create the workspace, run every stage, and settle the workspace's fate.
pub fn run_pipeline<A: Algorithm>(
    algorithm: &A,
    options: &RunOptions,
    runner: &mut dyn ToolRunner,
) -> Result<RunSummary> {
    let mut workspace = Workspace::create(options.scratch_parent.as_deref())?;
    tracing::info!(
        algorithm = algorithm.name(),
        scratch = %workspace.root().display(),
        "starting response estimation"
    );
    let outcome = run_stages(algorithm, options, &mut workspace, runner);
    let finished = workspace.finish(options.keep_scratch);
    let warnings = match (outcome, &finished) {
        (Ok(warnings), _) => warnings,
        (Err(err), Ok(Some(kept))) => {
            return Err(err.context(format!("scratch directory kept at {}", kept.display())));
        }
        (Err(err), _) => return Err(err),
    };
    let scratch = finished?;
    Ok(RunSummary { warnings, scratch })
}

fn run_stages<A: Algorithm>(
    algorithm: &A,
    options: &RunOptions,
    workspace: &mut Workspace,
    runner: &mut dyn ToolRunner,
) -> Result<Vec<String>> {
    let mut ctx = RunContext::new(options, workspace, runner);
    import_dwi(&mut ctx, algorithm.input_image())?;
    if let Some(mask) = &options.mask {
        import_mask(&mut ctx, mask)?;
    }
    let inputs = algorithm
        .get_inputs(&mut ctx)
        .with_context(|| format!("import inputs for algorithm '{}'", algorithm.name()))?;
    algorithm.execute(&mut ctx, inputs)?;
    Ok(ctx.into_warnings())
}

fn import_dwi(ctx: &mut RunContext<'_>, input: &Path) -> Result<()> {
    let mut convert = Invocation::new("mrconvert")
        .arg(user_arg(input, "input")?)
        .arg(path_arg(&ctx.workspace.path(Artifact::Dwi), "scratch")?)
        .arg("-strides")
        .arg("0,0,0,1");
    match &ctx.options.gradients {
        Some(Gradients::Mrtrix(grad)) => {
            convert = convert.arg("-grad").arg(user_arg(grad, "gradient table")?);
        }
        Some(Gradients::Fsl { bvecs, bvals }) => {
            convert = convert
                .arg("-fslgrad")
                .arg(user_arg(bvecs, "bvecs")?)
                .arg(user_arg(bvals, "bvals")?);
        }
        None => {}
    }
    ctx.run(Step::Command(convert))?;
    ctx.workspace.record(Artifact::Dwi, Provenance::Driver);
    Ok(())
}

fn import_mask(ctx: &mut RunContext<'_>, mask: &Path) -> Result<()> {
    ctx.run(Step::Command(
        Invocation::new("mrconvert")
            .arg(user_arg(mask, "mask")?)
            .arg(path_arg(&ctx.workspace.path(Artifact::Mask), "scratch")?)
            .arg("-datatype")
            .arg("bit"),
    ))?;
    ctx.workspace.record(Artifact::Mask, Provenance::Driver);
    Ok(())
}
