//! Installation classification.
//!
//! Four detectors run in a fixed order, each on its own. A detector whose
//! tool is missing or whose query fails contributes nothing and leaves a
//! Warning; the others still run. The matched kinds are collected into a
//! [`KindSet`], which falls back to `{Unknown}` when nothing matched.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::journal::Journal;
use crate::target::{ApplicationTarget, InstallationKind, KindSet};
use crate::tools::{ContainerRuntime, PackageManager, ToolError, Toolbox};

/// What a detector found, ready to be folded into the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evidence {
    Bundle {
        path: PathBuf,
        bundle_id: Option<String>,
    },
    SystemPackages(Vec<String>),
    LanguagePackages(Vec<String>),
    Containers {
        containers: Vec<String>,
        images: Vec<String>,
    },
}

impl Evidence {
    fn apply(self, target: &mut ApplicationTarget) {
        match self {
            Evidence::Bundle { path, bundle_id } => {
                target.bundle_path = Some(path);
                target.bundle_id = bundle_id;
            }
            Evidence::SystemPackages(ids) => target.system_packages = ids,
            Evidence::LanguagePackages(ids) => target.language_packages = ids,
            Evidence::Containers { containers, images } => {
                target.containers = containers;
                target.images = images;
            }
        }
    }
}

pub trait Detector {
    fn kind(&self) -> InstallationKind;

    /// `Ok(None)` when the application is not installed this way. Partial
    /// problems that still leave a usable answer go to `journal`.
    fn detect(&self, app: &str, journal: &Journal<'_>) -> Result<Option<Evidence>, ToolError>;
}

pub struct BundleDetector {
    application_dirs: Vec<PathBuf>,
}

impl BundleDetector {
    pub fn new(application_dirs: Vec<PathBuf>) -> Self {
        Self { application_dirs }
    }

    fn find_bundle(&self, app: &str) -> Option<PathBuf> {
        for dir in &self.application_dirs {
            let exact = dir.join(format!("{app}.app"));
            if exact.exists() {
                return Some(exact);
            }
        }
        // Fall back to a case-insensitive match on the bundle name.
        for dir in &self.application_dirs {
            let Ok(entries) = fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let is_app = path.extension().is_some_and(|ext| ext == "app");
                let stem_matches = path
                    .file_stem()
                    .is_some_and(|stem| stem.to_string_lossy().eq_ignore_ascii_case(app));
                if is_app && stem_matches {
                    return Some(path);
                }
            }
        }
        None
    }
}

impl Detector for BundleDetector {
    fn kind(&self) -> InstallationKind {
        InstallationKind::BundleApp
    }

    fn detect(&self, app: &str, _journal: &Journal<'_>) -> Result<Option<Evidence>, ToolError> {
        Ok(self.find_bundle(app).map(|path| Evidence::Bundle {
            bundle_id: read_bundle_identifier(&path),
            path,
        }))
    }
}

/// Reads `CFBundleIdentifier` from an XML Info.plist. Binary plists yield
/// `None`.
pub fn read_bundle_identifier(bundle: &Path) -> Option<String> {
    let plist = fs::read_to_string(bundle.join("Contents").join("Info.plist")).ok()?;
    let after_key = plist.split("<key>CFBundleIdentifier</key>").nth(1)?;
    let value = after_key.trim_start().strip_prefix("<string>")?;
    let end = value.find("</string>")?;
    let id = value[..end].trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// Detector over a package manager; used for both the system and the
/// language package manager.
pub struct PackageDetector<'a> {
    kind: InstallationKind,
    label: &'static str,
    manager: Option<&'a dyn PackageManager>,
}

impl<'a> PackageDetector<'a> {
    pub fn system(manager: Option<&'a dyn PackageManager>) -> Self {
        Self {
            kind: InstallationKind::PackageManagerPackage,
            label: "system package manager",
            manager,
        }
    }

    pub fn language(manager: Option<&'a dyn PackageManager>) -> Self {
        Self {
            kind: InstallationKind::LanguagePackage,
            label: "language package manager",
            manager,
        }
    }
}

impl Detector for PackageDetector<'_> {
    fn kind(&self) -> InstallationKind {
        self.kind
    }

    fn detect(&self, app: &str, _journal: &Journal<'_>) -> Result<Option<Evidence>, ToolError> {
        let manager = self
            .manager
            .ok_or_else(|| ToolError::Unavailable(self.label.to_string()))?;
        let ids = manager.list_installed(app)?;
        if ids.is_empty() {
            return Ok(None);
        }
        Ok(Some(match self.kind {
            InstallationKind::LanguagePackage => Evidence::LanguagePackages(ids),
            _ => Evidence::SystemPackages(ids),
        }))
    }
}

pub struct ContainerDetector<'a> {
    runtime: Option<&'a dyn ContainerRuntime>,
}

impl<'a> ContainerDetector<'a> {
    pub fn new(runtime: Option<&'a dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }
}

impl Detector for ContainerDetector<'_> {
    fn kind(&self) -> InstallationKind {
        InstallationKind::ContainerArtifact
    }

    fn detect(&self, app: &str, journal: &Journal<'_>) -> Result<Option<Evidence>, ToolError> {
        let runtime = self
            .runtime
            .ok_or_else(|| ToolError::Unavailable("container runtime".to_string()))?;
        let keep = |listing: Result<Vec<String>, ToolError>, what: &str| match listing {
            Ok(ids) => ids,
            Err(e) => {
                journal.warn(format!("Could not list {what} for {app}: {e}"));
                Vec::new()
            }
        };
        let (containers, images) = match (runtime.list_containers(app), runtime.list_images(app)) {
            (Err(e), Err(_)) => return Err(e),
            (containers, images) => (keep(containers, "containers"), keep(images, "images")),
        };
        if containers.is_empty() && images.is_empty() {
            return Ok(None);
        }
        Ok(Some(Evidence::Containers { containers, images }))
    }
}

pub struct InstallClassifier<'a> {
    detectors: Vec<Box<dyn Detector + 'a>>,
}

impl<'a> InstallClassifier<'a> {
    /// The standard detectors in removal order.
    pub fn new(config: &Config, tools: &'a Toolbox) -> Self {
        Self::with_detectors(vec![
            Box::new(BundleDetector::new(config.application_dirs.clone())),
            Box::new(PackageDetector::system(tools.system.as_deref())),
            Box::new(PackageDetector::language(tools.language.as_deref())),
            Box::new(ContainerDetector::new(tools.containers.as_deref())),
        ])
    }

    pub fn with_detectors(detectors: Vec<Box<dyn Detector + 'a>>) -> Self {
        Self { detectors }
    }

    pub fn classify(&self, app: &str, journal: &Journal<'_>) -> (ApplicationTarget, KindSet) {
        let mut target = ApplicationTarget {
            name: app.to_string(),
            ..ApplicationTarget::default()
        };
        let mut kinds = Vec::new();

        for detector in &self.detectors {
            let kind = detector.kind();
            match detector.detect(app, journal) {
                Ok(Some(evidence)) => {
                    journal.info(format!("Detected {app} installation: {kind}"));
                    evidence.apply(&mut target);
                    kinds.push(kind);
                }
                Ok(None) => {}
                Err(e) => journal.warn(format!("Skipping {kind} detection for {app}: {e}")),
            }
        }

        let kinds = KindSet::from_detected(kinds);
        if kinds.is_unknown() {
            journal.warn(format!("Could not detect installation type for {app}"));
        }
        (target, kinds)
    }
}
