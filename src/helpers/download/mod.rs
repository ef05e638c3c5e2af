use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use url::Url;

/// A path relative to a mirror root, e.g.
/// `SUSE/Updates/SLE-SERVER/12-SP3/x86_64/update_debug/x86_64/kernel-....rpm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPath(String);

impl MirrorPath {
    pub fn new(relative: impl Into<String>) -> Self {
        Self(relative.into().trim_start_matches('/').to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Absolute URL of this path on `mirror`. The mirror may carry its own
    /// path prefix (`http://host/repo/smt`).
    pub fn on(&self, mirror: &Url) -> Result<Url, url::ParseError> {
        let mut base = mirror.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.join(&self.0)
    }
}

/// Removes the partially written file unless the download completed. Dropping
/// the download future (Ctrl-C) therefore cleans up as well.
struct PartialFile {
    path: PathBuf,
    committed: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            committed: false,
        }
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    dest.with_file_name(name)
}

fn progress_bar(url: &Url, total_size: Option<u64>) -> ProgressBar {
    let pb = ProgressBar::new(total_size.unwrap_or(0));
    if let Ok(style) = ProgressStyle::with_template(
        "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] \
         {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
    ) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Downloading {url}"));
    pb
}

/// Stream `url` into `dest`, going through `<dest>.tmp` so a half-written
/// package never looks present. Returns the number of bytes written.
pub async fn download_file(client: &Client, url: &Url, dest: &Path) -> Result<u64, DownloadError> {
    let request_err = |source| DownloadError::Request {
        url: url.to_string(),
        source,
    };
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| DownloadError::Io { path, source }
    };

    let mut res = client
        .get(url.clone())
        .send()
        .await
        .map_err(request_err)?
        .error_for_status()
        .map_err(request_err)?;

    let tmp = partial_path(dest);
    let mut guard = PartialFile::new(tmp.clone());
    let mut file = File::create(&tmp).await.map_err(io_err(&tmp))?;

    let pb = progress_bar(url, res.content_length());
    let mut downloaded: u64 = 0;

    while let Some(chunk) = res.chunk().await.map_err(request_err)? {
        file.write_all(&chunk).await.map_err(io_err(&tmp))?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }

    file.flush().await.map_err(io_err(&tmp))?;
    drop(file);

    fs::rename(&tmp, dest).await.map_err(io_err(dest))?;
    guard.committed = true;

    pb.finish_with_message(format!("Downloaded {url} to {}", dest.display()));
    Ok(downloaded)
}

/// Tries the same relative path on each mirror in order and stops at the
/// first one that delivers.
#[derive(Debug, Clone, Copy)]
pub struct MirrorFallback<'a> {
    mirrors: &'a [Url],
}

/// Successful fetch through [`MirrorFallback`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub url: Url,
    pub bytes: u64,
    /// Zero-based index of the mirror that served the file.
    pub mirror_index: usize,
}

impl<'a> MirrorFallback<'a> {
    pub fn new(mirrors: &'a [Url]) -> Self {
        Self { mirrors }
    }

    pub async fn fetch(&self, client: &Client, path: &MirrorPath, dest: &Path) -> Result<Fetched, DownloadFailed> {
        let mut attempts = Vec::with_capacity(self.mirrors.len());

        for (mirror_index, mirror) in self.mirrors.iter().enumerate() {
            let url = match path.on(mirror) {
                Ok(url) => url,
                Err(source) => {
                    attempts.push(DownloadError::InvalidUrl {
                        mirror: mirror.to_string(),
                        path: path.as_str().to_string(),
                        source,
                    });
                    continue;
                }
            };

            info!(%url, "downloading");
            match download_file(client, &url, dest).await {
                Ok(bytes) => {
                    return Ok(Fetched {
                        url,
                        bytes,
                        mirror_index,
                    });
                }
                Err(err) => {
                    warn!(error = %err, "mirror failed");
                    attempts.push(err);
                }
            }
        }

        Err(DownloadFailed {
            path: path.as_str().to_string(),
            attempts,
        })
    }
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("writing {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot place {path} on mirror {mirror}: {source}")]
    InvalidUrl {
        mirror: String,
        path: String,
        #[source]
        source: url::ParseError,
    },
}

/// Every mirror was tried for one package and none delivered it.
#[derive(thiserror::Error, Debug)]
#[error("{path} could not be downloaded from any mirror ({} attempt(s)): {}", .attempts.len(), summarize(.attempts))]
pub struct DownloadFailed {
    pub path: String,
    pub attempts: Vec<DownloadError>,
}

fn summarize(attempts: &[DownloadError]) -> String {
    attempts
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
