//! External tool execution.
//!
//! Tools are resolved once up front so a missing executable is reported
//! before any scratch state exists. Steps run as argv vectors; the shell is
//! never involved, pipes included.
use crate::error::{PreconditionError, ToolError};
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Instant;

/// One program with its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        write!(f, "{}", shell_words::join(words))
    }
}

/// A unit of work: a single command or a pipe of commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Command(Invocation),
    Pipeline(Vec<Invocation>),
}

impl Step {
    pub fn stages(&self) -> &[Invocation] {
        match self {
            Step::Command(invocation) => std::slice::from_ref(invocation),
            Step::Pipeline(stages) => stages,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.stages().iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" | "))
    }
}

/// Seam between the pipeline and the processes it launches.
pub trait ToolRunner {
    /// Run a step to completion; any failing stage fails the step.
    fn run(&mut self, step: &Step, cwd: &Path) -> Result<()>;

    /// Run one command and return its standard output.
    fn capture(&mut self, invocation: &Invocation, cwd: &Path) -> Result<String>;
}

/// Run an in-process operation with the same logging and failure shape as a
/// tool step.
pub fn run_function<F>(description: &str, operation: F) -> Result<()>
where
    F: FnOnce() -> std::io::Result<()>,
{
    let start = Instant::now();
    operation().with_context(|| description.to_string())?;
    tracing::info!(
        elapsed_ms = start.elapsed().as_millis(),
        function = description,
        "function complete"
    );
    Ok(())
}

struct RunningStage<'a> {
    invocation: &'a Invocation,
    child: Child,
    stderr: File,
}

/// Runs resolved executables as child processes.
pub struct ProcessRunner {
    tools: BTreeMap<String, PathBuf>,
}

impl ProcessRunner {
    /// Locate every named tool, in `tool_dir` first and then on `PATH`.
    pub fn resolve(tool_dir: Option<&Path>, names: &[&str]) -> Result<Self> {
        let cwd = std::env::current_dir().context("read current directory")?;
        let mut tools = BTreeMap::new();
        let mut missing = Vec::new();
        for name in names {
            let found = tool_dir
                .and_then(|dir| which::which_in(name, Some(dir), &cwd).ok())
                .or_else(|| which::which(name).ok());
            match found {
                Some(path) => {
                    tracing::debug!(tool = name, path = %path.display(), "tool resolved");
                    tools.insert(name.to_string(), path);
                }
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(PreconditionError::MissingTools(missing).into());
        }
        Ok(Self { tools })
    }

    fn command(&self, invocation: &Invocation, cwd: &Path) -> Result<Command> {
        let path = self.tools.get(&invocation.program).ok_or_else(|| {
            anyhow!(
                "executable {} was not resolved before the run",
                invocation.program
            )
        })?;
        let mut command = Command::new(path);
        command.args(&invocation.args).current_dir(cwd);
        Ok(command)
    }

    fn spawn_stages<'a>(
        &self,
        stages: &'a [Invocation],
        cwd: &Path,
        running: &mut Vec<RunningStage<'a>>,
    ) -> Result<()> {
        let mut upstream = None;
        for (index, invocation) in stages.iter().enumerate() {
            let mut command = self.command(invocation, cwd)?;
            // stderr goes to an anonymous file so a chatty stage cannot stall on a full pipe.
            let stderr = tempfile::tempfile().context("create stderr capture file")?;
            command.stderr(stderr.try_clone().context("clone stderr capture file")?);
            match upstream.take() {
                Some(stdout) => command.stdin(Stdio::from(stdout)),
                None => command.stdin(Stdio::null()),
            };
            if index + 1 < stages.len() {
                command.stdout(Stdio::piped());
            } else {
                command.stdout(Stdio::null());
            }
            tracing::debug!(command = %invocation, "spawn");
            let mut child = command
                .spawn()
                .with_context(|| format!("spawn {}", invocation.program))?;
            upstream = child.stdout.take();
            running.push(RunningStage {
                invocation,
                child,
                stderr,
            });
        }
        Ok(())
    }
}

/// Stop stages that were started before a later stage could not be.
fn abandon(running: Vec<RunningStage<'_>>) {
    for mut stage in running {
        if let Err(err) = stage.child.kill() {
            tracing::debug!(program = %stage.invocation.program, error = %err, "kill failed");
        }
        if let Err(err) = stage.child.wait() {
            tracing::debug!(program = %stage.invocation.program, error = %err, "reap failed");
        }
    }
}

impl ToolRunner for ProcessRunner {
    fn run(&mut self, step: &Step, cwd: &Path) -> Result<()> {
        let start = Instant::now();
        let stages = step.stages();
        let mut running: Vec<RunningStage<'_>> = Vec::with_capacity(stages.len());
        if let Err(err) = self.spawn_stages(stages, cwd, &mut running) {
            abandon(running);
            return Err(err);
        }

        let mut failed = Vec::new();
        for mut stage in running {
            let status = stage
                .child
                .wait()
                .with_context(|| format!("wait for {}", stage.invocation.program))?;
            if !status.success() {
                failed.push((stage, status.code()));
            }
        }
        // A stage killed by a signal is usually an upstream writer that lost its
        // reader, so blame a stage with an exit code first.
        let culprit = failed
            .iter()
            .position(|(_, code)| code.is_some())
            .or_else(|| (!failed.is_empty()).then_some(0));
        if let Some(index) = culprit {
            let (mut stage, status) = failed.swap_remove(index);
            let err = ToolError {
                program: stage.invocation.program.clone(),
                status,
                stderr_line: first_line(&read_capture(&mut stage.stderr)?),
            };
            return Err(err).with_context(|| format!("command failed: {step}"));
        }

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis(),
            command = %step,
            "command complete"
        );
        Ok(())
    }

    fn capture(&mut self, invocation: &Invocation, cwd: &Path) -> Result<String> {
        let start = Instant::now();
        let output = self
            .command(invocation, cwd)?
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("run {}", invocation.program))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ToolError {
                program: invocation.program.clone(),
                status: output.status.code(),
                stderr_line: first_line(&stderr),
            })
            .with_context(|| format!("command failed: {invocation}"));
        }
        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis(),
            command = %invocation,
            stdout_bytes = output.stdout.len(),
            "query complete"
        );
        String::from_utf8(output.stdout)
            .with_context(|| format!("decode {} output as UTF-8", invocation.program))
    }
}

fn read_capture(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))
        .context("rewind stderr capture file")?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)
        .context("read stderr capture file")?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_arguments() {
        let invocation = Invocation::new("mrconvert")
            .arg("/data/my scan.nii")
            .arg("dwi.mif");
        assert_eq!(invocation.to_string(), "mrconvert '/data/my scan.nii' dwi.mif");
    }

    #[test]
    fn pipeline_display_joins_stages() {
        let step = Step::Pipeline(vec![
            Invocation::new("dwi2tensor").args(["dwi.mif", "-"]),
            Invocation::new("tensor2metric").args(["-", "-vector", "dirs.mif"]),
        ]);
        assert_eq!(
            step.to_string(),
            "dwi2tensor dwi.mif - | tensor2metric - -vector dirs.mif"
        );
        assert_eq!(step.stages().len(), 2);
    }

    #[test]
    fn missing_tools_are_listed_together() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = ProcessRunner::resolve(
            Some(dir.path()),
            &["dwi2response-missing-a", "dwi2response-missing-b"],
        )
        .err()
        .expect("tools are missing");
        assert_eq!(
            err.downcast_ref::<PreconditionError>(),
            Some(&PreconditionError::MissingTools(vec![
                "dwi2response-missing-a".to_string(),
                "dwi2response-missing-b".to_string(),
            ]))
        );
    }

    #[test]
    fn function_failures_carry_description() {
        let err = run_function("copy response", || {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))
        })
        .unwrap_err();
        assert!(format!("{err:#}").contains("copy response"));
    }

    #[cfg(unix)]
    mod process {
        use super::super::*;

        fn runner(names: &[&str]) -> Option<ProcessRunner> {
            ProcessRunner::resolve(None, names).ok()
        }

        #[test]
        fn pipe_feeds_next_stage() {
            let Some(mut runner) = runner(&["sh"]) else {
                return;
            };
            let dir = tempfile::tempdir().expect("temp dir");
            let out = dir.path().join("out.txt");
            let step = Step::Pipeline(vec![
                Invocation::new("sh").args(["-c", "echo piped"]),
                Invocation::new("sh").args(["-c", "cat > \"$0\"", out.to_str().expect("utf8")]),
            ]);
            runner.run(&step, dir.path()).expect("pipeline runs");
            assert_eq!(std::fs::read_to_string(&out).expect("read"), "piped\n");
        }

        #[test]
        fn failing_stage_reports_stderr() {
            let Some(mut runner) = runner(&["sh"]) else {
                return;
            };
            let dir = tempfile::tempdir().expect("temp dir");
            let step = Step::Command(Invocation::new("sh").args(["-c", "echo broken >&2; exit 4"]));
            let err = runner.run(&step, dir.path()).unwrap_err();
            let tool = err.downcast_ref::<ToolError>().expect("tool error");
            assert_eq!(tool.status, Some(4));
            assert_eq!(tool.stderr_line.as_deref(), Some("broken"));
        }

        #[test]
        fn failing_reader_is_blamed_over_its_starved_writer() {
            let Some(mut runner) = runner(&["sh"]) else {
                return;
            };
            let dir = tempfile::tempdir().expect("temp dir");
            let step = Step::Pipeline(vec![
                Invocation::new("sh").args(["-c", "while :; do echo data; done"]),
                Invocation::new("sh").args(["-c", "echo real problem >&2; exit 5"]),
            ]);
            let err = runner.run(&step, dir.path()).unwrap_err();
            let tool = err.downcast_ref::<ToolError>().expect("tool error");
            assert_eq!(tool.status, Some(5));
            assert_eq!(tool.stderr_line.as_deref(), Some("real problem"));
        }

        #[test]
        fn unstartable_stage_stops_earlier_stages() {
            let Some(mut runner) = runner(&["sh"]) else {
                return;
            };
            let dir = tempfile::tempdir().expect("temp dir");
            let marker = dir.path().join("marker");
            let step = Step::Pipeline(vec![
                Invocation::new("sh").args([
                    "-c",
                    "sleep 1; echo alive > \"$0\"",
                    marker.to_str().expect("utf8"),
                ]),
                Invocation::new("dwi2response-unresolved"),
            ]);
            assert!(runner.run(&step, dir.path()).is_err());
            std::thread::sleep(std::time::Duration::from_millis(1500));
            assert!(!marker.exists(), "first stage kept running");
        }

        #[test]
        fn capture_returns_stdout() {
            let Some(mut runner) = runner(&["sh"]) else {
                return;
            };
            let dir = tempfile::tempdir().expect("temp dir");
            let text = runner
                .capture(
                    &Invocation::new("sh").args(["-c", "echo 0 1000 2000"]),
                    dir.path(),
                )
                .expect("capture");
            assert_eq!(text.trim(), "0 1000 2000");
        }
    }
}
