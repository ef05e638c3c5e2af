mod model;
mod scrape;
mod store;

use std::path::PathBuf;
use std::time::SystemTime;

use reqwest::Client;
use tracing::{info, warn};

use crate::settings::Settings;

pub use model::ReleaseCatalog;
pub use scrape::{fetch_source, parse_catalog};
pub use store::{load, needs_refresh, save};

/// Fetch the knowledge-base page and turn it into a catalog. Nothing is
/// written to disk here.
pub async fn build_catalog(client: &Client, source_url: &str) -> Result<ReleaseCatalog, CatalogError> {
    let text = fetch_source(client, source_url).await?;
    parse_catalog(&text)
}

/// Return the catalog to resolve against, rebuilding the persisted copy first
/// when it is missing, stale, or `force` is set.
///
/// A fetch failure falls back to the existing file if there is one. Parse
/// failures never overwrite it.
pub async fn ensure_catalog(client: &Client, settings: &Settings, force: bool) -> Result<ReleaseCatalog, CatalogError> {
    let path = settings.catalog_path();

    if force || needs_refresh(path, settings.catalog_max_age(), SystemTime::now()) {
        info!(source = settings.catalog_source(), "refreshing kernel catalog");

        match build_catalog(client, settings.catalog_source()).await {
            Ok(catalog) => {
                save(&catalog, path)?;
                info!(
                    path = %path.display(),
                    releases = catalog.len(),
                    "kernel catalog written"
                );
                return Ok(catalog);
            }
            Err(err @ CatalogError::Fetch { .. }) if path.exists() => {
                warn!(error = %err, path = %path.display(), "catalog refresh failed, using existing catalog");
            }
            Err(err) => return Err(err),
        }
    }

    load(path)
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("failed to fetch catalog source {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("kernel version '{token}' appears before any release header; the page layout is not recognized (collected so far: {partial:?})")]
    Parse { token: String, partial: ReleaseCatalog },
    #[error("I/O error on catalog file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed catalog file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
