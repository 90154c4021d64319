use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

/// Everything the classifier resolved about one application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationTarget {
    pub name: String,
    /// Bundle under one of the applications directories
    pub bundle_path: Option<PathBuf>,
    /// `CFBundleIdentifier` read from the bundle's Info.plist
    pub bundle_id: Option<String>,
    /// Identifiers known to the system package manager
    pub system_packages: Vec<String>,
    /// Distributions known to the language package manager
    pub language_packages: Vec<String>,
    pub containers: Vec<String>,
    pub images: Vec<String>,
}

/// How an application was installed. Ordering is the removal order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InstallationKind {
    BundleApp,
    PackageManagerPackage,
    LanguagePackage,
    ContainerArtifact,
    Unknown,
}

impl fmt::Display for InstallationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            InstallationKind::BundleApp => "application bundle",
            InstallationKind::PackageManagerPackage => "system package",
            InstallationKind::LanguagePackage => "language package",
            InstallationKind::ContainerArtifact => "container artifact",
            InstallationKind::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Non-empty set of installation kinds.
///
/// `Unknown` is present if and only if no other kind is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSet(BTreeSet<InstallationKind>);

impl KindSet {
    pub fn from_detected(kinds: impl IntoIterator<Item = InstallationKind>) -> Self {
        let mut set: BTreeSet<_> = kinds
            .into_iter()
            .filter(|k| *k != InstallationKind::Unknown)
            .collect();
        if set.is_empty() {
            set.insert(InstallationKind::Unknown);
        }
        KindSet(set)
    }

    pub fn unknown() -> Self {
        Self::from_detected([])
    }

    pub fn contains(&self, kind: InstallationKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_unknown(&self) -> bool {
        self.contains(InstallationKind::Unknown)
    }

    /// Kinds in removal order.
    pub fn iter(&self) -> impl Iterator<Item = InstallationKind> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Default for KindSet {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self.iter().map(|k| k.to_string()).collect();
        f.write_str(&labels.join(", "))
    }
}

/// Where a leftover was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeftoverCategory {
    Preferences,
    Caches,
    ApplicationSupport,
    Logs,
    LaunchAgents,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeftoverPath {
    pub path: PathBuf,
    pub category: LeftoverCategory,
    /// Whether the path existed when it was discovered
    pub existed: bool,
    /// The name is the application's own (or its bundle identifier's),
    /// possibly with a `.`, `-` or `_` suffix. Only these are ever removed;
    /// plain substring matches are reported and kept.
    pub exact: bool,
}
