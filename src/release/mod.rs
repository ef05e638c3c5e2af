use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

fn release_regex() -> &'static Regex {
    static RELEASE_RE: OnceLock<Regex> = OnceLock::new();
    RELEASE_RE.get_or_init(|| {
        Regex::new(r"^SLES?\s?(?P<major>\d+)(?:\.(?P<minor>\d+))?(?:\s?-?SP(?P<sp>\d+))?")
            .expect("invalid release identifier regex")
    })
}

/// Release lines the repository layout rules know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Major {
    Sle10,
    Sle11,
    Sle12,
    Sle15,
    Sle16,
}

/// The two repository path families found on the mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateFamily {
    /// `$RCE/...` trees inherited from the Novell days (10 and 11).
    Legacy,
    /// `SUSE/<era>/<product>/...` trees (12 and later).
    Product,
}

impl Major {
    fn from_number(n: u32) -> Option<Self> {
        match n {
            10 => Some(Major::Sle10),
            11 => Some(Major::Sle11),
            12 => Some(Major::Sle12),
            15 => Some(Major::Sle15),
            16 => Some(Major::Sle16),
            _ => None,
        }
    }

    pub fn number(self) -> u32 {
        match self {
            Major::Sle10 => 10,
            Major::Sle11 => 11,
            Major::Sle12 => 12,
            Major::Sle15 => 15,
            Major::Sle16 => 16,
        }
    }

    pub fn family(self) -> TemplateFamily {
        match self {
            Major::Sle10 | Major::Sle11 => TemplateFamily::Legacy,
            Major::Sle12 | Major::Sle15 | Major::Sle16 => TemplateFamily::Product,
        }
    }

    /// Product directory segment used on the mirrors.
    pub fn product_dir(self, ltss: bool) -> &'static str {
        match self {
            Major::Sle10 => "sles-10",
            Major::Sle11 => "sle-11",
            Major::Sle12 => "SLE-SERVER",
            Major::Sle15 if ltss => "SLE-Product-SLES",
            Major::Sle15 => "SLE-Module-Basesystem",
            Major::Sle16 => "SLE-Product-SLES",
        }
    }
}

/// Service pack (`SP3`) or minor version (`16.0`) of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubRelease {
    ServicePack(u32),
    Minor(u32),
}

impl fmt::Display for SubRelease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubRelease::ServicePack(sp) => write!(f, "-SP{sp}"),
            SubRelease::Minor(minor) => write!(f, ".{minor}"),
        }
    }
}

/// Structured form of a catalog release key such as `SLES12 SP3 - LTSS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Release {
    name: String,
    major: Major,
    sub: Option<SubRelease>,
    ltss: bool,
}

impl Release {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn major(&self) -> Major {
        self.major
    }

    pub fn sub(&self) -> Option<SubRelease> {
        self.sub
    }

    pub fn is_ltss(&self) -> bool {
        self.ltss
    }

    /// `<major><sub>`, e.g. `12-SP3`, `16.0` or `15`.
    pub fn version_dir(&self) -> String {
        match self.sub {
            Some(sub) => format!("{}{sub}", self.major.number()),
            None => self.major.number().to_string(),
        }
    }
}

impl FromStr for Release {
    type Err = ReleaseError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let unsupported = || ReleaseError::Unsupported {
            release: name.to_string(),
        };

        let caps = release_regex().captures(name.trim()).ok_or_else(unsupported)?;
        let major = caps["major"]
            .parse()
            .ok()
            .and_then(Major::from_number)
            .ok_or_else(unsupported)?;

        let sub = match (caps.name("sp"), caps.name("minor")) {
            (Some(sp), _) => sp.as_str().parse().ok().map(SubRelease::ServicePack),
            (None, Some(minor)) => minor.as_str().parse().ok().map(SubRelease::Minor),
            (None, None) => None,
        };

        Ok(Release {
            name: name.to_string(),
            major,
            sub,
            ltss: name.contains("LTSS"),
        })
    }
}

/// Distribution stream a package is published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Era {
    Pool,
    Products,
    Updates,
}

impl Era {
    pub fn as_str(self) -> &'static str {
        match self {
            Era::Pool => "Pool",
            Era::Products => "Products",
            Era::Updates => "Updates",
        }
    }

    /// Lower-case singular channel directory (`product`, `update`).
    pub fn channel_dir(self) -> &'static str {
        match self {
            Era::Pool => "pool",
            Era::Products => "product",
            Era::Updates => "update",
        }
    }
}

impl fmt::Display for Era {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the URL rules need to know about the requested kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    release: Release,
    pool: bool,
    era: Era,
}

impl Classification {
    /// `versions` is the release's catalog list; its head is the pool kernel
    /// unless the release is an LTSS stream.
    pub fn new(release: Release, versions: &[String], kernel: &str) -> Self {
        let pool = !release.is_ltss() && versions.first().is_some_and(|head| head == kernel);

        let era = match (release.major(), pool) {
            // Every 16 kernel is published under Products.
            (Major::Sle16, _) => Era::Products,
            (major, true) => match major.family() {
                TemplateFamily::Legacy => Era::Pool,
                TemplateFamily::Product => Era::Products,
            },
            (_, false) => Era::Updates,
        };

        Self { release, pool, era }
    }

    pub fn release(&self) -> &Release {
        &self.release
    }

    pub fn major(&self) -> Major {
        self.release.major()
    }

    pub fn is_pool(&self) -> bool {
        self.pool
    }

    pub fn is_ltss(&self) -> bool {
        self.release.is_ltss()
    }

    pub fn era(&self) -> Era {
        self.era
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ReleaseError {
    #[error("release '{release}' is not covered by any known repository layout")]
    Unsupported { release: String },
}
