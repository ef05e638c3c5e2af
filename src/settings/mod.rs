mod models;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use url::Url;

use models::SettingsFile;

/// Knowledge-base page listing the kernels shipped per release.
pub const DEFAULT_CATALOG_SOURCE: &str = "https://ziu.nue.suse.com/dm/TID.php?tid=000019587";

/// Primary mirror first, backups after it in the order they are tried.
pub const DEFAULT_MIRRORS: &[&str] = &["http://collective.suse.cloud/repo/smt", "http://updates.suse.de"];

/// The knowledge base rejects blank or library user agents.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/114.0.0.0 Safari/537.36";

const CATALOG_FILE_NAME: &str = "kernel_versions.json";
const EXTRACTION_SCRIPT_NAME: &str = "rpmExtraction.sh";
const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 3600);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Immutable run configuration, built once in `main` and handed to the
/// catalog refresher and the resolver by reference.
#[derive(Debug, Clone)]
pub struct Settings {
    catalog_source: String,
    catalog_path: PathBuf,
    catalog_max_age: Duration,
    mirrors: Vec<Url>,
    user_agent: String,
    timeout: Duration,
    extraction_script: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            catalog_source: DEFAULT_CATALOG_SOURCE.to_string(),
            catalog_path: std::env::temp_dir().join(CATALOG_FILE_NAME),
            catalog_max_age: DEFAULT_MAX_AGE,
            mirrors: DEFAULT_MIRRORS
                .iter()
                .filter_map(|m| Url::parse(m).ok())
                .collect(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            extraction_script: default_extraction_script(),
        }
    }
}

/// The extraction script ships next to the binary.
fn default_extraction_script() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(EXTRACTION_SCRIPT_NAME)))
        .unwrap_or_else(|| PathBuf::from(EXTRACTION_SCRIPT_NAME))
}

fn parse_mirrors(raw: &[String]) -> Result<Vec<Url>, SettingsError> {
    if raw.is_empty() {
        return Err(SettingsError::NoMirrors);
    }
    raw.iter()
        .map(|m| {
            Url::parse(m).map_err(|source| SettingsError::InvalidMirror {
                url: m.clone(),
                source,
            })
        })
        .collect()
}

impl Settings {
    /// Load settings from a JSON file, falling back to defaults for every
    /// key the file leaves out.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&data)
    }

    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let parsed: SettingsFile = serde_json::from_str(json)?;
        let mut settings = Self::default();

        if let Some(source) = parsed.catalog_source {
            settings.catalog_source = source;
        }
        if let Some(path) = parsed.catalog_path {
            settings.catalog_path = path;
        }
        if let Some(hours) = parsed.catalog_max_age_hours {
            settings.catalog_max_age = Duration::from_secs(hours * 3600);
        }
        if let Some(mirrors) = parsed.mirrors {
            settings.mirrors = parse_mirrors(&mirrors)?;
        }
        if let Some(agent) = parsed.user_agent {
            settings.user_agent = agent;
        }
        if let Some(secs) = parsed.timeout_secs {
            settings.timeout = Duration::from_secs(secs);
        }
        if let Some(script) = parsed.extraction_script {
            settings.extraction_script = script;
        }

        Ok(settings)
    }

    #[allow(unused)]
    pub fn with_catalog_source(mut self, source: impl Into<String>) -> Self {
        self.catalog_source = source.into();
        self
    }

    #[allow(unused)]
    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = path.into();
        self
    }

    #[allow(unused)]
    pub fn with_mirrors(mut self, mirrors: &[String]) -> Result<Self, SettingsError> {
        self.mirrors = parse_mirrors(mirrors)?;
        Ok(self)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[allow(unused)]
    pub fn with_extraction_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.extraction_script = script.into();
        self
    }

    pub fn catalog_source(&self) -> &str {
        &self.catalog_source
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn catalog_max_age(&self) -> Duration {
        self.catalog_max_age
    }

    /// Mirror base URLs, primary first.
    pub fn mirrors(&self) -> &[Url] {
        &self.mirrors
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn extraction_script(&self) -> &Path {
        &self.extraction_script
    }
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error in settings: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid mirror URL '{url}': {source}")]
    InvalidMirror {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("at least one mirror must be configured")]
    NoMirrors,
}
