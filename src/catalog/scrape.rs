use std::sync::OnceLock;

use regex::Regex;
use reqwest::Client;

use super::{CatalogError, ReleaseCatalog};

/// Release headers sit right after a closing `>` of the surrounding markup;
/// kernel versions look like `4.4.73-5.1` or `3.0.101-63.1`.
fn token_regex() -> &'static Regex {
    static TOKEN_RE: OnceLock<Regex> = OnceLock::new();
    TOKEN_RE.get_or_init(|| {
        Regex::new(
            r">(?P<release>SLES?\s?\d+\.?(?:\sSP\d)?(?:\s-\sLTSS)?[A-Za-z0-9-]*)|(?P<version>(?:\d+\.)+\d+-\d+(?:\.?\d*)*)",
        )
        .expect("invalid catalog token regex")
    })
}

/// Fetch the raw knowledge-base page. The client carries the configured
/// browser user agent.
pub async fn fetch_source(client: &Client, url: &str) -> Result<String, CatalogError> {
    let fetch = |source| CatalogError::Fetch {
        url: url.to_string(),
        source,
    };

    client
        .get(url)
        .send()
        .await
        .map_err(fetch)?
        .error_for_status()
        .map_err(fetch)?
        .text()
        .await
        .map_err(fetch)
}

/// Walk release headers and kernel versions in document order.
///
/// Every header opens a new bucket and every version lands in the bucket
/// opened last. A version seen before any header means the page layout is
/// not the one we know how to read.
pub fn parse_catalog(text: &str) -> Result<ReleaseCatalog, CatalogError> {
    let mut catalog = ReleaseCatalog::new();
    let mut current: Option<String> = None;

    for caps in token_regex().captures_iter(text) {
        if let Some(release) = caps.name("release") {
            let release = release.as_str().to_string();
            catalog.open_release(&release);
            current = Some(release);
        } else if let Some(version) = caps.name("version") {
            let Some(release) = current.as_deref() else {
                return Err(CatalogError::Parse {
                    token: version.as_str().to_string(),
                    partial: catalog,
                });
            };
            catalog.push_version(release, version.as_str());
        }
    }

    Ok(catalog)
}
