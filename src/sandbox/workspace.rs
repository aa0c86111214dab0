//! Per-request script workspace
//!
//! Every run gets its own freshly created directory holding the script file.
//! The directory name carries a random suffix chosen by `tempfile`, so two
//! requests never share a path no matter how close together they arrive.

use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::RunError;

/// Suffix appended to the script path to form the result-channel path
pub const RESULT_SUFFIX: &str = ".result";

/// Materialized script plus its companion result-channel path
#[derive(Debug)]
pub struct ScriptWorkspace {
    dir: TempDir,
    script_path: PathBuf,
    result_path: PathBuf,
}

impl ScriptWorkspace {
    /// Create a fresh directory under `root` and write `source` into it verbatim
    pub async fn materialize(
        root: &Path,
        script_file: &str,
        source: &[u8],
    ) -> Result<Self, RunError> {
        let dir = tempfile::Builder::new()
            .prefix("run-")
            .tempdir_in(root)
            .map_err(RunError::Materialize)?;

        let script_path = dir.path().join(script_file);
        let result_path = result_path_for(&script_path);

        fs::write(&script_path, source)
            .await
            .map_err(RunError::Materialize)?;

        debug!("Materialized {} bytes at {:?}", source.len(), script_path);

        Ok(Self {
            dir,
            script_path,
            result_path,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn script_path(&self) -> &Path {
        &self.script_path
    }

    pub fn result_path(&self) -> &Path {
        &self.result_path
    }

    /// Remove the script, any leftover result file and the directory itself.
    ///
    /// Failures are logged and swallowed; they never affect the response.
    pub async fn cleanup(self) {
        remove_quietly(&self.script_path).await;
        remove_quietly(&self.result_path).await;

        let dir_path = self.dir.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Failed to remove workspace {:?}: {}", dir_path, e);
            }
        }
    }
}

/// Result-channel path derived from the script path
pub fn result_path_for(script_path: &Path) -> PathBuf {
    let mut name = script_path.as_os_str().to_owned();
    name.push(RESULT_SUFFIX);
    PathBuf::from(name)
}

/// Best-effort file removal; a file that is already gone is not an error
pub async fn remove_quietly(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {:?}: {}", path, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_materialize_writes_source_verbatim() {
        let root = tempfile::tempdir().unwrap();
        let source = b"print('hi')\n\xff\xfe raw bytes";

        let workspace = ScriptWorkspace::materialize(root.path(), "main.py", source)
            .await
            .unwrap();

        assert!(workspace.script_path().starts_with(root.path()));
        assert_eq!(std::fs::read(workspace.script_path()).unwrap(), source);
        assert!(!workspace.result_path().exists());
        workspace.cleanup().await;
    }

    #[tokio::test]
    async fn test_result_path_is_derived_from_script() {
        let root = tempfile::tempdir().unwrap();
        let workspace = ScriptWorkspace::materialize(root.path(), "main.py", b"")
            .await
            .unwrap();

        let expected = workspace.dir().join("main.py.result");
        assert_eq!(workspace.result_path(), expected.as_path());
        workspace.cleanup().await;
    }

    #[tokio::test]
    async fn test_workspaces_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let mut dirs = std::collections::HashSet::new();
        let mut workspaces = Vec::new();

        for _ in 0..64 {
            let ws = ScriptWorkspace::materialize(root.path(), "main.py", b"x")
                .await
                .unwrap();
            assert!(dirs.insert(ws.dir().to_path_buf()));
            workspaces.push(ws);
        }

        for ws in workspaces {
            ws.cleanup().await;
        }
    }

    #[tokio::test]
    async fn test_cleanup_removes_everything() {
        let root = tempfile::tempdir().unwrap();
        let workspace = ScriptWorkspace::materialize(root.path(), "main.py", b"x")
            .await
            .unwrap();
        std::fs::write(workspace.result_path(), "{}").unwrap();

        let dir = workspace.dir().to_path_buf();
        let script = workspace.script_path().to_path_buf();
        let result = workspace.result_path().to_path_buf();
        workspace.cleanup().await;

        assert!(!script.exists());
        assert!(!result.exists());
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_files() {
        let root = tempfile::tempdir().unwrap();
        let workspace = ScriptWorkspace::materialize(root.path(), "main.py", b"x")
            .await
            .unwrap();
        std::fs::remove_file(workspace.script_path()).unwrap();

        let dir = workspace.dir().to_path_buf();
        workspace.cleanup().await;
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_materialize_into_missing_root_fails() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("does-not-exist");

        let err = ScriptWorkspace::materialize(&missing, "main.py", b"x")
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Materialize(_)));
    }
}
