//! Scoped scratch workspace with a registry of named artifacts.
//!
//! Every file the pipeline writes into the scratch directory is recorded
//! together with who produced it, so later stages decide what to do from the
//! registry instead of probing the filesystem.
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "dwi2response-tmp-";

/// Fixed-name artifacts the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Artifact {
    Dwi,
    Mask,
    InVoxels,
    Dirs,
    Response,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::Dwi => "dwi.mif",
            Artifact::Mask => "mask.mif",
            Artifact::InVoxels => "in_voxels.mif",
            Artifact::Dirs => "dirs.mif",
            Artifact::Response => "response.txt",
        }
    }
}

/// Who put an artifact into the workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Imported by the driver before the algorithm ran.
    Driver,
    /// Imported by the algorithm from a user-supplied path.
    User(PathBuf),
    /// Computed inside the workspace by the named tool.
    Derived(&'static str),
}

/// Handle on the scratch directory; removed on drop unless kept.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    artifacts: BTreeMap<Artifact, Provenance>,
}

impl Workspace {
    /// Create a fresh workspace under `parent`, or the system temp dir.
    pub fn create(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => builder
                .tempdir_in(parent)
                .with_context(|| format!("create scratch directory in {}", parent.display()))?,
            None => builder.tempdir().context("create scratch directory")?,
        };
        tracing::debug!(path = %dir.path().display(), "scratch directory created");
        Ok(Self {
            dir,
            artifacts: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Absolute path an artifact lives at, whether or not it exists yet.
    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.path().join(artifact.file_name())
    }

    /// Path of an artifact that must already have been produced.
    pub fn require(&self, artifact: Artifact) -> Result<PathBuf> {
        if !self.artifacts.contains_key(&artifact) {
            return Err(anyhow!(
                "{} has not been produced in the scratch directory",
                artifact.file_name()
            ));
        }
        Ok(self.path(artifact))
    }

    pub fn record(&mut self, artifact: Artifact, provenance: Provenance) {
        tracing::trace!(artifact = artifact.file_name(), ?provenance, "artifact recorded");
        self.artifacts.insert(artifact, provenance);
    }

    pub fn provenance(&self, artifact: Artifact) -> Option<&Provenance> {
        self.artifacts.get(&artifact)
    }

    /// Delete an artifact and forget it; a no-op if it was never produced.
    pub fn discard(&mut self, artifact: Artifact) -> Result<()> {
        if self.artifacts.remove(&artifact).is_none() {
            return Ok(());
        }
        let path = self.path(artifact);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
        }
    }

    /// End the workspace's life: delete it, or keep it and return its path.
    pub fn finish(self, keep: bool) -> Result<Option<PathBuf>> {
        if keep {
            let path = self.dir.keep();
            tracing::info!(path = %path.display(), "scratch directory kept");
            return Ok(Some(path));
        }
        let path = self.dir.path().to_path_buf();
        self.dir
            .close()
            .with_context(|| format!("remove scratch directory {}", path.display()))?;
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_paths_live_under_root() {
        let parent = tempfile::tempdir().expect("parent dir");
        let workspace = Workspace::create(Some(parent.path())).expect("create workspace");
        let dirs = workspace.path(Artifact::Dirs);
        assert_eq!(dirs.parent(), Some(workspace.root()));
        assert_eq!(dirs.file_name().and_then(|n| n.to_str()), Some("dirs.mif"));
        assert!(workspace.root().starts_with(parent.path()));
    }

    #[test]
    fn require_fails_until_recorded() {
        let mut workspace = Workspace::create(None).expect("create workspace");
        assert!(workspace.require(Artifact::InVoxels).is_err());
        workspace.record(Artifact::InVoxels, Provenance::User(PathBuf::from("vox.mif")));
        assert_eq!(
            workspace.require(Artifact::InVoxels).expect("recorded"),
            workspace.path(Artifact::InVoxels)
        );
    }

    #[test]
    fn discard_removes_file_and_record() {
        let mut workspace = Workspace::create(None).expect("create workspace");
        let mask = workspace.path(Artifact::Mask);
        fs::write(&mask, b"mask").expect("write mask");
        workspace.record(Artifact::Mask, Provenance::Driver);

        workspace.discard(Artifact::Mask).expect("discard");
        assert!(!mask.exists());
        assert!(workspace.provenance(Artifact::Mask).is_none());
        workspace.discard(Artifact::Mask).expect("second discard is a no-op");
    }

    #[test]
    fn finish_removes_or_keeps_directory() {
        let workspace = Workspace::create(None).expect("create workspace");
        let root = workspace.root().to_path_buf();
        assert_eq!(workspace.finish(false).expect("finish"), None);
        assert!(!root.exists());

        let workspace = Workspace::create(None).expect("create workspace");
        let kept = workspace.finish(true).expect("finish").expect("kept path");
        assert!(kept.is_dir());
        fs::remove_dir_all(kept).expect("clean up kept dir");
    }

    #[test]
    fn drop_removes_directory() {
        let workspace = Workspace::create(None).expect("create workspace");
        let root = workspace.root().to_path_buf();
        drop(workspace);
        assert!(!root.exists());
    }
}
