use serde::Deserialize;
use std::path::PathBuf;

/// On-disk shape of the settings file; serde is confined to this module tree.
///
/// Every key is optional so a file only needs to name what it overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SettingsFile {
    pub(crate) catalog_source: Option<String>,
    pub(crate) catalog_path: Option<PathBuf>,
    pub(crate) catalog_max_age_hours: Option<u64>,
    /// Mirror base URLs, primary first.
    pub(crate) mirrors: Option<Vec<String>>,
    pub(crate) user_agent: Option<String>,
    pub(crate) timeout_secs: Option<u64>,
    pub(crate) extraction_script: Option<PathBuf>,
}
