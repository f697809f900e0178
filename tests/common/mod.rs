//! Shared test infrastructure for integration tests.
//!
//! Fake MRtrix executables are shell scripts that append their argv to a log
//! file and create whatever output file the real tool would have written.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const LOG_PRELUDE: &str = "#!/bin/sh\necho \"$(basename \"$0\") $*\" >> \"$FAKE_MRTRIX_LOG\"\n";

const MRINFO: &str = "echo \"${FAKE_SHELLS:-0 1000}\"\n";

const MRCONVERT: &str = "if [ \"$2\" != \"-\" ]; then echo converted > \"$2\"; fi\nexit 0\n";

const DWI2TENSOR: &str = "echo tensor\n";

const TENSOR2METRIC: &str = r#"cat > /dev/null
prev=""
for arg in "$@"; do
  if [ "$prev" = "-vector" ]; then echo dirs > "$arg"; fi
  prev="$arg"
done
"#;

const AMP2RESPONSE: &str = r#"if [ -n "$FAKE_FAIL_AMP2RESPONSE" ]; then
  echo "amp2response: simulated failure" >&2
  exit 1
fi
printf '1 -0.5 0.1\n' > "$4"
"#;

/// A scratch area holding fake tools, user inputs, and the command log.
pub struct FakeMrtrix {
    _root: TempDir,
    // Canonical so paths match what the binary sees as its working directory.
    base: PathBuf,
}

/// Result of running the compiled binary.
pub struct RunResult {
    pub output: Output,
    pub log: Vec<String>,
}

impl RunResult {
    pub fn code(&self) -> Option<i32> {
        self.output.status.code()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.output.stderr).to_string()
    }

    /// Program names in the order they were invoked.
    pub fn programs(&self) -> Vec<&str> {
        self.log
            .iter()
            .filter_map(|line| line.split_whitespace().next())
            .collect()
    }
}

impl FakeMrtrix {
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("create temp dir");
        let base = root.path().canonicalize().expect("canonicalize temp dir");
        let fake = Self { _root: root, base };
        fs::create_dir_all(fake.tools_dir()).expect("create tools dir");
        fs::create_dir_all(fake.user_dir()).expect("create user dir");
        fake.install("mrinfo", MRINFO);
        fake.install("mrconvert", MRCONVERT);
        fake.install("dwi2tensor", DWI2TENSOR);
        fake.install("tensor2metric", TENSOR2METRIC);
        fake.install("amp2response", AMP2RESPONSE);
        for input in ["dwi.mif", "voxels.mif", "dirs.mif"] {
            fs::write(fake.user_path(input), b"image").expect("write input");
        }
        fake
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.base.join("bin")
    }

    pub fn user_dir(&self) -> PathBuf {
        self.base.join("user")
    }

    pub fn user_path(&self, name: &str) -> PathBuf {
        self.user_dir().join(name)
    }

    fn log_path(&self) -> PathBuf {
        self.base.join("commands.log")
    }

    fn install(&self, name: &str, body: &str) {
        let path = self.tools_dir().join(name);
        fs::write(&path, format!("{LOG_PRELUDE}{body}")).expect("write fake tool");
        let mut perms = fs::metadata(&path).expect("stat fake tool").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).expect("chmod fake tool");
    }

    /// Command for the binary with an isolated config and the fake tools.
    pub fn command(&self) -> Command {
        let mut command = Command::new(env!("CARGO_BIN_EXE_dwi2response"));
        command
            .current_dir(self.user_dir())
            .env("DWI2RESPONSE_CONFIG", self.base.join("no-config.json"))
            .env("DWI2RESPONSE_TOOL_DIR", self.tools_dir())
            .env("FAKE_MRTRIX_LOG", self.log_path())
            .env_remove("RUST_LOG")
            .env_remove("FAKE_FAIL_AMP2RESPONSE");
        command
    }

    /// Run `manual` on the standard inputs with extra arguments appended.
    pub fn run_manual(&self, extra: &[&str], configure: impl FnOnce(&mut Command)) -> RunResult {
        let mut command = self.command();
        command
            .args(["manual", "dwi.mif", "voxels.mif", "response.txt"])
            .args(extra);
        configure(&mut command);
        let output = command.output().expect("run dwi2response");
        RunResult {
            output,
            log: self.read_log(),
        }
    }

    pub fn read_log(&self) -> Vec<String> {
        read_lines(&self.log_path())
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    match fs::read_to_string(path) {
        Ok(text) => text.lines().map(str::to_string).collect(),
        Err(_) => Vec::new(),
    }
}
