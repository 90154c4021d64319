//! Backups and their manifests.
//!
//! A backup run lives in its own directory under the backup root:
//!
//! ```text
//! <backup root>/<app>_<YYYYmmdd_HHMMSS>/
//!   manifest.json     # BackupManifest
//!   home/...          # copies of paths under the home directory
//!   root/...          # copies of every other absolute path
//! ```
//!
//! Copies are staged in `.<run>.partial` and the staging directory is renamed
//! into place only after the manifest has been persisted, so a run directory
//! is either complete or absent.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};
use crate::fs_ops::{copy_tree, delete_path};
use crate::journal::Journal;

pub const MANIFEST_FILE: &str = "manifest.json";
pub(crate) const MANIFEST_VERSION: u32 = 1;
const HOME_PREFIX: &str = "home";
const ROOT_PREFIX: &str = "root";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Absolute path the data was copied from
    pub original: PathBuf,
    /// Location of the copy, relative to the run directory
    pub relative: PathBuf,
}

impl ManifestEntry {
    /// Where this entry goes back to: its original path, or a path under
    /// the override root. Home entries land at `<override>/<path below home>`;
    /// everything else keeps its `root/` component so it can never land on a
    /// home entry.
    pub fn restore_destination(&self, override_root: Option<&Path>) -> PathBuf {
        match override_root {
            None => self.original.clone(),
            Some(root) => match self.relative.strip_prefix(HOME_PREFIX) {
                Ok(rest) => root.join(rest),
                Err(_) => root.join(&self.relative),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupManifest {
    pub version: u32,
    pub application: String,
    pub backup_root: PathBuf,
    pub created_at: DateTime<Local>,
    pub entries: Vec<ManifestEntry>,
}

impl BackupManifest {
    /// Reads a manifest, distinguishing a missing file from a corrupt one.
    pub fn load(path: &Path) -> Result<Self> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::ManifestNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(Error::corrupt(path, e)),
        };
        let manifest: Self = serde_json::from_str(&json).map_err(|e| Error::corrupt(path, e))?;

        if manifest.version != MANIFEST_VERSION {
            return Err(Error::corrupt(
                path,
                format!("unsupported manifest version {}", manifest.version),
            ));
        }
        for entry in &manifest.entries {
            if !is_contained(&entry.relative) {
                return Err(Error::corrupt(
                    path,
                    format!("entry {:?} escapes the backup directory", entry.relative),
                ));
            }
        }
        Ok(manifest)
    }

    /// Persists the manifest into `dir` through a temporary file and a rename.
    pub(crate) fn write_atomic(&self, dir: &Path) -> io::Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        file.write_all(json.as_bytes())?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }
}

/// A relative path made only of normal components, with at least one below
/// the `home`/`root` prefix.
fn is_contained(relative: &Path) -> bool {
    let mut count = 0;
    for component in relative.components() {
        match component {
            Component::Normal(_) => count += 1,
            _ => return false,
        }
    }
    count >= 2
}

/// Location of `original` inside a run directory.
pub fn relative_location(original: &Path, home: &Path) -> PathBuf {
    if let Ok(rest) = original.strip_prefix(home) {
        if !rest.as_os_str().is_empty() {
            return Path::new(HOME_PREFIX).join(rest);
        }
    }
    let rest: PathBuf = original
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect();
    Path::new(ROOT_PREFIX).join(rest)
}

/// Directory-name prefix for an application's backup runs.
pub fn run_prefix(app: &str) -> String {
    let name: String = app
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    format!("{name}_")
}

pub struct BackupManager {
    home: PathBuf,
}

impl BackupManager {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    /// Copies `sources` into a new run under `destination` and writes its
    /// manifest.
    ///
    /// Sources that are gone by the time they are copied are skipped with a
    /// Warning. A destination that cannot be created fails the whole backup
    /// before anything is copied. Returns the manifest path, or `None` on a
    /// dry run.
    pub fn backup(
        &self,
        app: &str,
        sources: &[PathBuf],
        destination: &Path,
        journal: &mut Journal<'_>,
    ) -> Result<Option<PathBuf>> {
        let run_name = self.run_name(app, destination);
        let run_dir = destination.join(&run_name);

        if journal.is_dry_run() {
            for source in sources {
                let copy = run_dir.join(relative_location(source, &self.home));
                journal.plan(format!("Would back up {} to {}", source.display(), copy.display()));
            }
            journal.plan(format!("Would write {}", run_dir.join(MANIFEST_FILE).display()));
            return Ok(None);
        }

        let staging = destination.join(format!(".{run_name}.partial"));
        fs::create_dir_all(destination).map_err(|e| Error::configuration(destination, e))?;
        fs::create_dir(&staging).map_err(|e| Error::configuration(&staging, e))?;
        journal.info(format!("Creating backup at {}", run_dir.display()));

        let mut entries = Vec::new();
        for source in sources {
            let step = format!("backup {}", source.display());
            let relative = relative_location(source, &self.home);
            let copy = staging.join(&relative);

            match copy_tree(source, &copy, &mut |_| {}) {
                Ok(()) => {
                    journal.succeed(step, format!("Backed up: {}", source.display()));
                    journal.record_backed_up(source);
                    entries.push(ManifestEntry {
                        original: source.clone(),
                        relative,
                    });
                }
                Err(e) => {
                    let _ = delete_path(&copy);
                    if e.kind() == io::ErrorKind::NotFound {
                        journal.warn(format!(
                            "Skipping {}: it disappeared before it could be backed up",
                            source.display()
                        ));
                    } else {
                        journal.fail(step, e);
                    }
                }
            }
        }

        let manifest = BackupManifest {
            version: MANIFEST_VERSION,
            application: app.to_string(),
            backup_root: run_dir.clone(),
            created_at: Local::now(),
            entries,
        };
        let finalize = manifest
            .write_atomic(&staging)
            .and_then(|_| fs::rename(&staging, &run_dir));
        if let Err(e) = finalize {
            let _ = delete_path(&staging);
            return Err(Error::configuration(&run_dir, e));
        }

        let manifest_path = run_dir.join(MANIFEST_FILE);
        journal.info(format!("Backup manifest written to {}", manifest_path.display()));
        Ok(Some(manifest_path))
    }

    fn run_name(&self, app: &str, destination: &Path) -> String {
        let base = format!("{}{}", run_prefix(app), Local::now().format("%Y%m%d_%H%M%S"));
        let taken = |name: &str| {
            destination.join(name).exists() || destination.join(format!(".{name}.partial")).exists()
        };
        if !taken(base.as_str()) {
            return base;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{base}_{n}");
            if !taken(candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }
}
