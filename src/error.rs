//! Typed failures that callers need to tell apart.
//!
//! Everything else travels as a plain `anyhow::Error`; these two types ride
//! inside it so `main` can pick an exit code by downcasting.
use std::fmt;
use std::path::PathBuf;

/// A user-supplied value or environment fact that makes the run impossible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreconditionError {
    /// `-lmax` has a different number of entries than the DWI has shells.
    LmaxCount { supplied: usize, shells: usize },
    /// An lmax entry is odd.
    LmaxOdd(i64),
    /// An lmax entry is negative.
    LmaxNegative(i64),
    /// An lmax entry is not an integer.
    LmaxParse(String),
    /// An lmax entry is an integer too large to use.
    LmaxRange(i64),
    /// The header reported no b-value shells.
    NoShells,
    /// An output path exists and `-force` was not given.
    OutputExists(PathBuf),
    /// The directory an output would be written into does not exist.
    OutputParentMissing(PathBuf),
    /// Executables that could not be located before the run started.
    MissingTools(Vec<String>),
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PreconditionError::LmaxCount { supplied, shells } => write!(
                f,
                "number of manually-defined lmax's ({supplied}) does not match number of b-value shells ({shells})"
            ),
            PreconditionError::LmaxOdd(value) => {
                write!(f, "values for lmax must be even (got {value})")
            }
            PreconditionError::LmaxNegative(value) => {
                write!(f, "values for lmax must be non-negative (got {value})")
            }
            PreconditionError::LmaxParse(token) => {
                write!(f, "invalid lmax value {token:?}: expected an integer")
            }
            PreconditionError::LmaxRange(value) => {
                write!(f, "lmax value {value} is out of range")
            }
            PreconditionError::NoShells => write!(f, "input DWI does not contain any b-value shells"),
            PreconditionError::OutputExists(path) => write!(
                f,
                "output path {} already exists (use -force to override)",
                path.display()
            ),
            PreconditionError::OutputParentMissing(path) => write!(
                f,
                "directory for output path {} does not exist",
                path.display()
            ),
            PreconditionError::MissingTools(tools) => write!(
                f,
                "required executables not found: {} (set tool_dir or DWI2RESPONSE_TOOL_DIR, or extend PATH)",
                tools.join(", ")
            ),
        }
    }
}

impl std::error::Error for PreconditionError {}

/// An external executable exited unsuccessfully.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub program: String,
    pub status: Option<i32>,
    pub stderr_line: Option<String>,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.status {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_string(),
        };
        match &self.stderr_line {
            Some(line) => write!(f, "{} failed ({status}): {line}", self.program),
            None => write!(f, "{} failed ({status})", self.program),
        }
    }
}

impl std::error::Error for ToolError {}

/// Map a run failure onto the process exit code.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<PreconditionError>().is_some() {
        2
    } else if err.downcast_ref::<ToolError>().is_some() {
        3
    } else {
        1
    }
}
