use std::fmt;
use std::path::PathBuf;

use url::Url;

use super::PackageKind;
use crate::release::Classification;

/// Final state of one package after a resolution run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    /// The file was already in the output directory; no network call made.
    SkippedAlreadyPresent,
    Downloaded { url: Url },
    DownloadFailed { reason: String },
    Extracted,
    ExtractionFailed { reason: String },
    /// The package does not exist for this release line.
    NotApplicable { reason: String },
}

impl PackageOutcome {
    /// A package that is now on disk, whether fetched or already present.
    pub fn is_available(&self) -> bool {
        matches!(
            self,
            PackageOutcome::SkippedAlreadyPresent | PackageOutcome::Downloaded { .. }
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PackageOutcome::DownloadFailed { .. } | PackageOutcome::ExtractionFailed { .. }
        )
    }
}

impl fmt::Display for PackageOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackageOutcome::SkippedAlreadyPresent => f.write_str("already present"),
            PackageOutcome::Downloaded { url } => write!(f, "downloaded from {url}"),
            PackageOutcome::DownloadFailed { reason } => write!(f, "download failed: {reason}"),
            PackageOutcome::Extracted => f.write_str("extracted"),
            PackageOutcome::ExtractionFailed { reason } => write!(f, "extraction failed: {reason}"),
            PackageOutcome::NotApplicable { reason } => write!(f, "not applicable: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageReport {
    pub kind: PackageKind,
    pub file: PathBuf,
    pub outcome: PackageOutcome,
}

/// What happened to each requested package, in request order.
#[derive(Debug, Clone)]
pub struct ResolutionReport {
    kernel: String,
    classification: Classification,
    packages: Vec<PackageReport>,
}

impl ResolutionReport {
    pub fn new(kernel: String, classification: Classification) -> Self {
        Self {
            kernel,
            classification,
            packages: Vec::new(),
        }
    }

    /// Record `outcome` for `kind`, replacing any earlier state.
    pub fn record(&mut self, kind: PackageKind, file: PathBuf, outcome: PackageOutcome) {
        match self.packages.iter_mut().find(|p| p.kind == kind) {
            Some(entry) => {
                entry.file = file;
                entry.outcome = outcome;
            }
            None => self.packages.push(PackageReport { kind, file, outcome }),
        }
    }

    pub fn kernel(&self) -> &str {
        &self.kernel
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn packages(&self) -> &[PackageReport] {
        &self.packages
    }

    #[allow(unused)]
    pub fn outcome(&self, kind: PackageKind) -> Option<&PackageOutcome> {
        self.packages.iter().find(|p| p.kind == kind).map(|p| &p.outcome)
    }

    pub fn has_failures(&self) -> bool {
        self.packages.iter().any(|p| p.outcome.is_failure())
    }
}
