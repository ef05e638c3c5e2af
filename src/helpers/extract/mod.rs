use std::path::{Path, PathBuf};

use async_trait::async_trait;

/// Unpacks the members of an archive that match a glob into `workdir`.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, archive: &Path, pattern: &str, workdir: &Path) -> Result<(), ExtractError>;
}

/// Runs the external extraction script as `<script> <archive> <pattern>`
/// from inside the scratch directory. Exit status zero means success.
pub struct ScriptExtractor {
    script: PathBuf,
}

impl ScriptExtractor {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl Extractor for ScriptExtractor {
    async fn extract(&self, archive: &Path, pattern: &str, workdir: &Path) -> Result<(), ExtractError> {
        let output = tokio::process::Command::new(&self.script)
            .arg(archive)
            .arg(pattern)
            .current_dir(workdir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ExtractError::Spawn {
                script: self.script.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Failed {
                archive: archive.to_path_buf(),
                status: output.status.to_string(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}

/// Extract `archive` inside a private `extract_tmp_*` directory under
/// `scratch_root`, so concurrent extractions never share a working folder.
/// The directory is removed whether or not extraction succeeds.
pub async fn extract_isolated(
    extractor: &dyn Extractor,
    archive: &Path,
    pattern: &str,
    scratch_root: &Path,
) -> Result<(), ExtractError> {
    let io_err = |source| ExtractError::Io {
        archive: archive.to_path_buf(),
        source,
    };

    let archive = tokio::fs::canonicalize(archive).await.map_err(io_err)?;
    let scratch = tempfile::Builder::new()
        .prefix("extract_tmp_")
        .tempdir_in(scratch_root)
        .map_err(io_err)?;

    let result = extractor.extract(&archive, pattern, scratch.path()).await;
    scratch.close().map_err(io_err)?;
    result
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error("could not run extraction script {script}: {source}")]
    Spawn {
        script: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("extracting {archive} failed ({status}): {stderr}")]
    Failed {
        archive: PathBuf,
        status: String,
        stderr: String,
    },
    #[error("preparing extraction of {archive} failed: {source}")]
    Io {
        archive: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
