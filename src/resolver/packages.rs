use std::fmt;

use crate::helpers::download::MirrorPath;
use crate::release::{Classification, Era, Major, TemplateFamily};

/// The three artifacts crash analysis needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageKind {
    /// Debug symbols (`kernel-<flavor>-debuginfo`).
    Info,
    /// Matching sources (`kernel-<flavor>-debugsource`).
    Source,
    /// The kernel image itself (`kernel-<flavor>[-base]`).
    Base,
}

impl PackageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PackageKind::Info => "debuginfo",
            PackageKind::Source => "debugsource",
            PackageKind::Base => "base",
        }
    }

    /// SLE 10 ships sources inside the debuginfo package.
    pub fn is_available_on(self, major: Major) -> bool {
        !(self == PackageKind::Source && major == Major::Sle10)
    }

    pub fn file_name(self, major: Major, flavor: &str, kernel: &str, arch: &str) -> String {
        match self {
            PackageKind::Info | PackageKind::Source => {
                format!("kernel-{flavor}-{}-{kernel}.{arch}.rpm", self.as_str())
            }
            PackageKind::Base if major == Major::Sle11 => {
                format!("kernel-{flavor}-base-{kernel}.{arch}.rpm")
            }
            PackageKind::Base => format!("kernel-{flavor}-{kernel}.{arch}.rpm"),
        }
    }

    /// In-archive glob handed to the extraction script. 16 moved the kernel
    /// image and the debug tree under `/usr/lib/modules`.
    pub fn extraction_pattern(self, major: Major) -> &'static str {
        match (self, major) {
            (PackageKind::Base, Major::Sle16) => "./usr/lib/modules/*/vmlinux.xz",
            (PackageKind::Info, Major::Sle16) => "./usr/lib/debug/usr/lib/modules/*",
            (PackageKind::Base, _) => "./boot/*",
            (PackageKind::Info | PackageKind::Source, _) => "./usr/*",
        }
    }

    /// Repository path of `file_name` relative to a mirror root.
    pub fn mirror_path(self, class: &Classification, arch: &str, file_name: &str) -> MirrorPath {
        let release = class.release();
        let major = class.major();
        let product = major.product_dir(class.is_ltss());
        let version = release.version_dir();
        let era = class.era();

        let relative = match (major.family(), self) {
            (TemplateFamily::Legacy, PackageKind::Info | PackageKind::Source) => format!(
                "$RCE/SLE{}{}-Debuginfo-{era}/{product}-{arch}/rpm/{arch}/{file_name}",
                major.number(),
                sub_suffix(class),
            ),
            (TemplateFamily::Legacy, PackageKind::Base) => {
                let era = if class.is_ltss() { "LTSS-Updates" } else { era.as_str() };
                format!(
                    "$RCE/SLES{}{}-{era}/{product}-{arch}/rpm/{arch}/{file_name}",
                    major.number(),
                    sub_suffix(class),
                )
            }
            (TemplateFamily::Product, kind) => {
                let ltss = if class.is_ltss() { "-LTSS" } else { "" };
                let channel = product_channel(era, kind);
                format!("SUSE/{era}/{product}/{version}{ltss}/{arch}/{channel}/{arch}/{file_name}")
            }
        };

        MirrorPath::new(relative)
    }
}

fn sub_suffix(class: &Classification) -> String {
    class
        .release()
        .sub()
        .map(|sub| sub.to_string())
        .unwrap_or_default()
}

/// `product_debug`, `update`, ...
fn product_channel(era: Era, kind: PackageKind) -> String {
    match kind {
        PackageKind::Base => era.channel_dir().to_string(),
        PackageKind::Info | PackageKind::Source => format!("{}_debug", era.channel_dir()),
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
