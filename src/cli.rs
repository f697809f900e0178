//! CLI argument parsing.
//!
//! Options use MRtrix-style single-dash long names (`-dirs`, `-lmax`); the
//! double-dash form clap expects is accepted too. Global options may appear
//! before or after the algorithm sub-command.
use crate::logging::Verbosity;
use clap::{Args, CommandFactory, Parser, Subcommand};
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::PathBuf;

/// Root CLI entrypoint.
#[derive(Parser, Debug)]
#[command(
    name = "dwi2response",
    version,
    about = "Estimate response function(s) for spherical deconvolution",
    after_help = "Examples:\n  dwi2response manual dwi.mif voxels.mif response.txt\n  dwi2response manual dwi.mif voxels.mif response.txt -dirs dirs.mif -lmax 0,8",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every algorithm.
#[derive(Args, Debug, Default, Clone)]
pub struct GlobalArgs {
    /// Provide an initial mask for response voxel selection
    #[arg(long, global = true, value_name = "IMAGE")]
    pub mask: Option<PathBuf>,

    /// The maximum spherical harmonic order for each b-value shell (comma-separated)
    #[arg(long, global = true, value_name = "LIST", allow_hyphen_values = true)]
    pub lmax: Option<String>,

    /// Output an image showing the final voxel selection(s)
    #[arg(long, global = true, value_name = "IMAGE")]
    pub voxels: Option<PathBuf>,

    /// Provide the diffusion gradient table in MRtrix format
    #[arg(long, global = true, value_name = "FILE", conflicts_with = "fslgrad")]
    pub grad: Option<PathBuf>,

    /// Provide the diffusion gradient table in FSL bvecs/bvals format
    #[arg(long, global = true, num_args = 2, value_names = ["BVECS", "BVALS"])]
    pub fslgrad: Option<Vec<PathBuf>>,

    /// Force overwrite of output files
    #[arg(long, global = true)]
    pub force: bool,

    /// Do not delete the scratch directory at completion
    #[arg(long, global = true)]
    pub nocleanup: bool,

    /// Parent directory for the scratch directory
    #[arg(long, global = true, value_name = "DIR")]
    pub scratch: Option<PathBuf>,

    /// Suppress informational messages
    #[arg(long, global = true, conflicts_with_all = ["info", "debug"])]
    pub quiet: bool,

    /// Display additional information about each step
    #[arg(long, global = true)]
    pub info: bool,

    /// Display debugging messages
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    pub fn verbosity(&self) -> Verbosity {
        if self.debug {
            Verbosity::Debug
        } else if self.info {
            Verbosity::Info
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Normal
        }
    }
}

/// Response estimation algorithms.
#[derive(Subcommand, Debug)]
pub enum Command {
    Manual(ManualArgs),
}

/// Inputs of the `manual` algorithm.
#[derive(Parser, Debug, Clone)]
#[command(
    about = "Derive a response function using an input mask image alone (i.e. pre-selected voxels)"
)]
pub struct ManualArgs {
    /// The input DWI
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Input voxel selection mask
    #[arg(value_name = "IN_VOXELS")]
    pub in_voxels: PathBuf,

    /// Output response function text file
    #[arg(value_name = "OUTPUT")]
    pub output: PathBuf,

    /// Manually provide the fibre direction in each voxel (a tensor fit will be used otherwise)
    #[arg(long, value_name = "IMAGE")]
    pub dirs: Option<PathBuf>,
}

/// Rewrite `-name` to `--name` for every long option the CLI defines.
///
/// The program name and anything after `--` pass through untouched, as do
/// values that merely start with a dash (`-2,4`).
pub fn normalize_single_dash<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    let longs = long_option_names();
    let mut normalized = Vec::new();
    let mut passthrough = false;
    for (index, arg) in args.into_iter().enumerate() {
        if index == 0 || passthrough {
            normalized.push(arg);
            continue;
        }
        if arg == "--" {
            passthrough = true;
            normalized.push(arg);
            continue;
        }
        let rewritten = arg
            .to_str()
            .and_then(|text| text.strip_prefix('-'))
            .filter(|name| !name.starts_with('-') && longs.contains(*name))
            .map(|name| OsString::from(format!("--{name}")));
        normalized.push(rewritten.unwrap_or(arg));
    }
    normalized
}

fn long_option_names() -> BTreeSet<String> {
    let mut names = BTreeSet::from(["help".to_string(), "version".to_string()]);
    collect_long_names(&RootArgs::command(), &mut names);
    names
}

fn collect_long_names(command: &clap::Command, names: &mut BTreeSet<String>) {
    for arg in command.get_arguments() {
        if let Some(long) = arg.get_long() {
            names.insert(long.to_string());
        }
    }
    for sub in command.get_subcommands() {
        collect_long_names(sub, names);
    }
}
