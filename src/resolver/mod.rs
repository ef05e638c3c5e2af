mod packages;
mod report;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::future::join_all;
use reqwest::Client;
use tracing::{error, info, warn};

use crate::catalog::{CatalogError, ReleaseCatalog, ensure_catalog};
use crate::helpers::download::MirrorFallback;
use crate::helpers::extract::{Extractor, extract_isolated};
use crate::release::{Classification, Major, Release, ReleaseError};
use crate::settings::Settings;

pub use packages::PackageKind;
pub use report::{PackageOutcome, ResolutionReport};

pub const DEFAULT_ARCH: &str = "x86_64";
pub const DEFAULT_FLAVOR: &str = "default";

/// One kernel to prepare artifacts for.
#[derive(Debug, Clone)]
pub struct ResolveRequest {
    pub kernel: String,
    pub arch: String,
    pub flavor: String,
    pub include_base: bool,
    pub extract: bool,
    /// Where packages land and where already-present files are looked for.
    pub output_dir: PathBuf,
}

impl ResolveRequest {
    pub fn new(kernel: impl Into<String>) -> Self {
        Self {
            kernel: kernel.into(),
            arch: DEFAULT_ARCH.to_string(),
            flavor: DEFAULT_FLAVOR.to_string(),
            include_base: false,
            extract: false,
            output_dir: PathBuf::from("."),
        }
    }

    fn kinds(&self) -> Vec<PackageKind> {
        let mut kinds = vec![PackageKind::Info, PackageKind::Source];
        if self.include_base {
            kinds.push(PackageKind::Base);
        }
        kinds
    }
}

/// `uname -r` style `<version>-default` names the first sub-release, so it
/// maps to `<version>.1`. Later sub-releases (`.2`, `.3`) cannot be reached
/// through this shorthand.
pub fn normalize_kernel_version(kernel: &str) -> String {
    match kernel.strip_suffix("-default") {
        Some(stem) => {
            info!(
                "converting \"-default\" to \".1\"; a kernel released as .2, .3, ... will not be found this way"
            );
            format!("{stem}.1")
        }
        None => kernel.to_string(),
    }
}

/// Finds the release that shipped a kernel and fetches its debug packages
/// from the configured mirrors.
pub struct Resolver<'a> {
    settings: &'a Settings,
    client: Client,
    extractor: Arc<dyn Extractor>,
}

impl<'a> Resolver<'a> {
    pub fn new(settings: &'a Settings, client: Client, extractor: Arc<dyn Extractor>) -> Self {
        Self {
            settings,
            client,
            extractor,
        }
    }

    /// Refresh the catalog if needed, then resolve against it.
    pub async fn run(&self, request: &ResolveRequest, force_refresh: bool) -> Result<ResolutionReport, ResolveError> {
        let catalog = ensure_catalog(&self.client, self.settings, force_refresh).await?;
        self.resolve(&catalog, request).await
    }

    pub async fn resolve(&self, catalog: &ReleaseCatalog, request: &ResolveRequest) -> Result<ResolutionReport, ResolveError> {
        let kernel = normalize_kernel_version(&request.kernel);
        info!(kernel = %kernel, flavor = %request.flavor, arch = %request.arch, "registered request");

        let (release_name, versions) =
            catalog
                .find_release(&kernel)
                .ok_or_else(|| ResolveError::KernelNotFound {
                    kernel: kernel.clone(),
                    catalog: self.settings.catalog_path().to_path_buf(),
                })?;

        let release: Release = release_name.parse()?;
        info!(release = release.name(), "registered the OS version");

        let class = Classification::new(release, versions, &kernel);
        if class.is_pool() {
            info!("this is a pool kernel");
        }
        if class.is_ltss() {
            info!("this is an LTSS kernel");
        }
        if class.is_pool() && class.major() == Major::Sle10 {
            warn!(
                release = class.release().name(),
                "the mirrors have no pool repository for this release; the download may fail"
            );
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|source| ResolveError::OutputDir {
                path: request.output_dir.clone(),
                source,
            })?;

        let mut report = ResolutionReport::new(kernel.clone(), class.clone());
        let fallback = MirrorFallback::new(self.settings.mirrors());
        let mut ready = Vec::new();

        for kind in request.kinds() {
            let file_name = kind.file_name(class.major(), &request.flavor, &kernel, &request.arch);
            let dest = request.output_dir.join(&file_name);

            let outcome = if !kind.is_available_on(class.major()) {
                info!(release = class.release().name(), "no separate {kind} package exists for this release");
                PackageOutcome::NotApplicable {
                    reason: format!("{} has no separate {kind} package", class.release().name()),
                }
            } else if dest.exists() {
                info!(file = %dest.display(), "already exists");
                PackageOutcome::SkippedAlreadyPresent
            } else {
                let path = kind.mirror_path(&class, &request.arch, &file_name);
                match fallback.fetch(&self.client, &path, &dest).await {
                    Ok(fetched) => {
                        info!(file = %dest.display(), bytes = fetched.bytes, "{kind} package downloaded");
                        if fetched.mirror_index > 0 {
                            warn!(url = %fetched.url, "{kind} package served by backup mirror");
                        }
                        PackageOutcome::Downloaded { url: fetched.url }
                    }
                    Err(failed) => {
                        error!(error = %failed, "{kind} package unavailable");
                        PackageOutcome::DownloadFailed {
                            reason: failed.to_string(),
                        }
                    }
                }
            };

            if outcome.is_available() {
                ready.push((kind, dest.clone()));
            }
            report.record(kind, dest, outcome);
        }

        if request.extract {
            self.extract_all(class.major(), &ready, &request.output_dir, &mut report)
                .await;
        }

        Ok(report)
    }

    /// Extractions run concurrently, one task per package; a failure only
    /// affects its own package.
    async fn extract_all(
        &self,
        major: Major,
        ready: &[(PackageKind, PathBuf)],
        scratch_root: &Path,
        report: &mut ResolutionReport,
    ) {
        let tasks = ready.iter().map(|(kind, archive)| async move {
            info!(file = %archive.display(), "extracting for crash analysis");
            let result = extract_isolated(
                self.extractor.as_ref(),
                archive,
                kind.extraction_pattern(major),
                scratch_root,
            )
            .await;
            (*kind, archive, result)
        });

        for (kind, archive, result) in join_all(tasks).await {
            let outcome = match result {
                Ok(()) => {
                    info!(file = %archive.display(), "extracted");
                    PackageOutcome::Extracted
                }
                Err(err) => {
                    error!(error = %err, "extraction failed");
                    PackageOutcome::ExtractionFailed {
                        reason: err.to_string(),
                    }
                }
            };
            report.record(kind, archive.clone(), outcome);
        }
    }
}

/// ---- Errors ----
#[derive(thiserror::Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("kernel {kernel} was not found in the catalog {catalog}")]
    KernelNotFound { kernel: String, catalog: PathBuf },
    #[error(transparent)]
    UnsupportedRelease(#[from] ReleaseError),
    #[error("cannot prepare output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use httpmock::prelude::*;

    use super::*;
    use crate::catalog::parse_catalog;
    use crate::helpers::extract::ExtractError;

    const PAGE: &str = "
        <th>SLES10 SP4</th><td>2.6.16.60-0.85.1</td>
        <th>SLES12 SP3</th><td>4.4.73-5.1</td><td>4.4.92-6.2</td><td>4.4.103-6.33.1</td>
        <th>SLES12 SP3 - LTSS</th><td>4.4.180-94.1</td>
        <th>SLES 13</th><td>5.0.1-1.1</td>";

    #[derive(Default)]
    struct FakeExtractor {
        patterns: Mutex<Vec<String>>,
        fail_pattern: Option<&'static str>,
    }

    #[async_trait]
    impl Extractor for FakeExtractor {
        async fn extract(&self, archive: &Path, pattern: &str, _workdir: &Path) -> Result<(), ExtractError> {
            self.patterns.lock().unwrap().push(pattern.to_string());
            if self.fail_pattern == Some(pattern) {
                return Err(ExtractError::Failed {
                    archive: archive.to_path_buf(),
                    status: "exit status: 1".to_string(),
                    stderr: "broken archive".to_string(),
                });
            }
            Ok(())
        }
    }

    struct Fixture {
        server: MockServer,
        dir: tempfile::TempDir,
        settings: Settings,
        catalog: ReleaseCatalog,
    }

    async fn fixture() -> Fixture {
        let server = MockServer::start_async().await;
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default()
            .with_catalog_path(dir.path().join("kernel_versions.json"))
            .with_mirrors(&[server.url("/primary"), server.url("/backup")])
            .unwrap();
        Fixture {
            server,
            dir,
            settings,
            catalog: parse_catalog(PAGE).unwrap(),
        }
    }

    impl Fixture {
        fn request(&self, kernel: &str) -> ResolveRequest {
            ResolveRequest {
                output_dir: self.dir.path().join("out"),
                ..ResolveRequest::new(kernel)
            }
        }

        async fn resolve_with(&self, extractor: Arc<dyn Extractor>, request: &ResolveRequest) -> Result<ResolutionReport, ResolveError> {
            Resolver::new(&self.settings, Client::new(), extractor)
                .resolve(&self.catalog, request)
                .await
        }

        async fn resolve(&self, request: &ResolveRequest) -> Result<ResolutionReport, ResolveError> {
            self.resolve_with(Arc::new(FakeExtractor::default()), request).await
        }
    }

    #[test]
    fn default_suffix_maps_to_first_sub_release() {
        assert_eq!(normalize_kernel_version("4.4.73-default"), "4.4.73.1");
        assert_eq!(normalize_kernel_version("4.12.14-122.37-default"), "4.12.14-122.37.1");
        assert_eq!(normalize_kernel_version("4.4.73-5.1"), "4.4.73-5.1");
    }

    #[tokio::test]
    async fn pool_kernel_downloads_from_products() {
        let fx = fixture().await;
        let info = fx
            .server
            .mock_async(|when, then| {
                when.method(GET).path(
                    "/primary/SUSE/Products/SLE-SERVER/12-SP3/x86_64/product_debug/x86_64/kernel-default-debuginfo-4.4.73-5.1.x86_64.rpm",
                );
                then.status(200).body("info");
            })
            .await;
        let source = fx
            .server
            .mock_async(|when, then| {
                when.method(GET).path(
                    "/primary/SUSE/Products/SLE-SERVER/12-SP3/x86_64/product_debug/x86_64/kernel-default-debugsource-4.4.73-5.1.x86_64.rpm",
                );
                then.status(200).body("source");
            })
            .await;

        let report = fx.resolve(&fx.request("4.4.73-5.1")).await.unwrap();

        info.assert_hits_async(1).await;
        source.assert_hits_async(1).await;
        assert!(report.classification().is_pool());
        assert!(matches!(report.outcome(PackageKind::Info), Some(PackageOutcome::Downloaded { .. })));
        assert!(matches!(report.outcome(PackageKind::Source), Some(PackageOutcome::Downloaded { .. })));
        assert_eq!(report.outcome(PackageKind::Base), None);
        assert!(!report.has_failures());
        let out = fx.dir.path().join("out");
        assert_eq!(fs::read_to_string(out.join("kernel-default-debuginfo-4.4.73-5.1.x86_64.rpm")).unwrap(), "info");
    }

    #[tokio::test]
    async fn update_kernel_falls_back_to_backup_mirror() {
        let fx = fixture().await;
        let backup = fx
            .server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("/backup/SUSE/Updates/SLE-SERVER/12-SP3/x86_64/update_debug/");
                then.status(200).body("rpm");
            })
            .await;

        let report = fx.resolve(&fx.request("4.4.92-6.2")).await.unwrap();

        backup.assert_hits_async(2).await;
        assert!(!report.classification().is_pool());
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn ltss_head_downloads_from_ltss_updates() {
        let fx = fixture().await;
        let ltss = fx
            .server
            .mock_async(|when, then| {
                when.method(GET)
                    .path_contains("/primary/SUSE/Updates/SLE-SERVER/12-SP3-LTSS/x86_64/update_debug/");
                then.status(200).body("rpm");
            })
            .await;

        let report = fx.resolve(&fx.request("4.4.180-94.1")).await.unwrap();

        ltss.assert_hits_async(2).await;
        assert!(report.classification().is_ltss());
        assert!(!report.classification().is_pool());
    }

    #[tokio::test]
    async fn present_files_cause_no_network_calls() {
        let fx = fixture().await;
        let any = fx
            .server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).body("rpm");
            })
            .await;
        let mut request = fx.request("4.4.92-6.2");
        request.include_base = true;
        fs::create_dir_all(&request.output_dir).unwrap();
        for name in [
            "kernel-default-debuginfo-4.4.92-6.2.x86_64.rpm",
            "kernel-default-debugsource-4.4.92-6.2.x86_64.rpm",
            "kernel-default-4.4.92-6.2.x86_64.rpm",
        ] {
            fs::write(request.output_dir.join(name), "cached").unwrap();
        }

        let report = fx.resolve(&request).await.unwrap();

        any.assert_hits_async(0).await;
        assert_eq!(report.packages().len(), 3);
        assert!(report
            .packages()
            .iter()
            .all(|p| p.outcome == PackageOutcome::SkippedAlreadyPresent));
    }

    #[tokio::test]
    async fn sle10_never_requests_debugsource() {
        let fx = fixture().await;
        let source = fx
            .server
            .mock_async(|when, then| {
                when.method(GET).path_contains("debugsource");
                then.status(200).body("rpm");
            })
            .await;
        let info = fx
            .server
            .mock_async(|when, then| {
                when.method(GET).path_contains("debuginfo");
                then.status(200).body("rpm");
            })
            .await;

        let report = fx.resolve(&fx.request("2.6.16.60-0.85.1")).await.unwrap();

        source.assert_hits_async(0).await;
        info.assert_hits_async(1).await;
        assert!(matches!(report.outcome(PackageKind::Source), Some(PackageOutcome::NotApplicable { .. })));
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn default_suffix_resolves_like_full_version() {
        let fx = fixture().await;
        fx.server
            .mock_async(|when, then| {
                when.method(GET).path_contains("4.4.103-6.33.1");
                then.status(200).body("rpm");
            })
            .await;

        let report = fx.resolve(&fx.request("4.4.103-6.33-default")).await.unwrap();

        assert_eq!(report.kernel(), "4.4.103-6.33.1");
        assert_eq!(report.packages()[0].file.file_name().unwrap(), "kernel-default-debuginfo-4.4.103-6.33.1.x86_64.rpm");
        assert!(!report.has_failures());
    }

    #[tokio::test]
    async fn failed_package_does_not_stop_the_others() {
        let fx = fixture().await;
        fx.server
            .mock_async(|when, then| {
                when.method(GET).path_contains("debuginfo");
                then.status(200).body("rpm");
            })
            .await;
        let extractor = Arc::new(FakeExtractor::default());
        let mut request = fx.request("4.4.92-6.2");
        request.extract = true;

        let report = fx.resolve_with(extractor.clone(), &request).await.unwrap();

        assert_eq!(report.outcome(PackageKind::Info), Some(&PackageOutcome::Extracted));
        match report.outcome(PackageKind::Source) {
            Some(PackageOutcome::DownloadFailed { reason }) => {
                assert!(reason.contains("/primary/SUSE/Updates"));
                assert!(reason.contains("/backup/SUSE/Updates"));
            }
            other => panic!("expected download failure, got {other:?}"),
        }
        assert!(report.has_failures());
        assert_eq!(*extractor.patterns.lock().unwrap(), vec!["./usr/*".to_string()]);
    }

    #[tokio::test]
    async fn one_failed_extraction_leaves_the_rest_extracted() {
        let fx = fixture().await;
        fx.server
            .mock_async(|when, then| {
                when.method(GET);
                then.status(200).body("rpm");
            })
            .await;
        let extractor = Arc::new(FakeExtractor {
            fail_pattern: Some("./boot/*"),
            ..Default::default()
        });
        let mut request = fx.request("4.4.73-5.1");
        request.include_base = true;
        request.extract = true;

        let report = fx.resolve_with(extractor.clone(), &request).await.unwrap();

        assert_eq!(report.outcome(PackageKind::Info), Some(&PackageOutcome::Extracted));
        assert_eq!(report.outcome(PackageKind::Source), Some(&PackageOutcome::Extracted));
        assert!(matches!(
            report.outcome(PackageKind::Base),
            Some(PackageOutcome::ExtractionFailed { reason }) if reason.contains("broken archive")
        ));
        assert_eq!(extractor.patterns.lock().unwrap().len(), 3);
        let leftovers: Vec<_> = fs::read_dir(&request.output_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("extract_tmp_"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn unknown_kernel_is_fatal_and_names_the_catalog() {
        let fx = fixture().await;

        let err = fx.resolve(&fx.request("9.9.9-1.1")).await.unwrap_err();

        assert!(matches!(err, ResolveError::KernelNotFound { .. }));
        assert!(err.to_string().contains("9.9.9-1.1"));
        assert!(err.to_string().contains("kernel_versions.json"));
    }

    #[tokio::test]
    async fn unsupported_release_is_fatal() {
        let fx = fixture().await;

        let err = fx.resolve(&fx.request("5.0.1-1.1")).await.unwrap_err();

        assert!(matches!(err, ResolveError::UnsupportedRelease(_)));
        assert!(err.to_string().contains("SLES 13"));
    }

    #[tokio::test]
    async fn run_builds_a_missing_catalog_first() {
        let fx = fixture().await;
        let settings = fx.settings.clone().with_catalog_source(fx.server.url("/TID.php"));
        fx.server
            .mock_async(|when, then| {
                when.method(GET).path("/TID.php");
                then.status(200).body(PAGE);
            })
            .await;
        fx.server
            .mock_async(|when, then| {
                when.method(GET).path_contains("/primary/SUSE/");
                then.status(200).body("rpm");
            })
            .await;

        let report = Resolver::new(&settings, Client::new(), Arc::new(FakeExtractor::default()))
            .run(&fx.request("4.4.73-5.1"), false)
            .await
            .unwrap();

        assert!(settings.catalog_path().exists());
        assert!(!report.has_failures());
    }
}
