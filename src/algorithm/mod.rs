//! Response estimation algorithms and the context they run in.
//!
//! The driver prepares the scratch workspace, then hands each algorithm a
//! [`RunContext`] in two phases: `get_inputs` brings algorithm-specific data
//! into the workspace, and `execute` produces and exports the response.
pub mod manual;

use crate::driver::RunOptions;
use crate::runner::{Step, ToolRunner};
use crate::workspace::Workspace;
use anyhow::Result;
use std::path::Path;

/// Contract every response algorithm implements.
pub trait Algorithm {
    /// What `get_inputs` resolves and `execute` consumes.
    type Inputs;

    fn name(&self) -> &'static str;

    /// Executables needed beyond the driver's own.
    fn required_tools(&self) -> &'static [&'static str];

    /// The DWI the driver imports into the workspace.
    fn input_image(&self) -> &Path;

    /// User paths the algorithm will write.
    fn output_paths(&self) -> Vec<&Path>;

    fn get_inputs(&self, ctx: &mut RunContext<'_>) -> Result<Self::Inputs>;

    fn execute(&self, ctx: &mut RunContext<'_>, inputs: Self::Inputs) -> Result<()>;
}

/// Everything an algorithm may touch during one run.
pub struct RunContext<'a> {
    pub options: &'a RunOptions,
    pub workspace: &'a mut Workspace,
    pub runner: &'a mut dyn ToolRunner,
    warnings: Vec<String>,
}

impl<'a> RunContext<'a> {
    pub fn new(
        options: &'a RunOptions,
        workspace: &'a mut Workspace,
        runner: &'a mut dyn ToolRunner,
    ) -> Self {
        Self {
            options,
            workspace,
            runner,
            warnings: Vec::new(),
        }
    }

    /// Run a step with the workspace as working directory.
    pub fn run(&mut self, step: Step) -> Result<()> {
        self.runner.run(&step, self.workspace.root())
    }

    /// Log a non-fatal condition and keep it for the run summary.
    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{message}");
        self.warnings.push(message);
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}
