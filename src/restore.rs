//! Restoring backup runs.
//!
//! A restore reads one manifest and copies every entry back, to its original
//! path or under an override root. Nothing is written before the manifest
//! has been loaded and validated.

use std::fs;
use std::path::{Path, PathBuf};

use crate::backup::{run_prefix, BackupManifest, MANIFEST_FILE};
use crate::error::{Error, Result};
use crate::fs_ops::{copy_tree, exists};
use crate::journal::Journal;

/// Copies backed-up data back to where it came from.
#[derive(Debug, Default)]
pub struct RestoreManager;

impl RestoreManager {
    pub fn new() -> Self {
        Self
    }

    /// Resolves `backup_dir` to a manifest file.
    ///
    /// Accepts a manifest file, a run directory, or a backup root. For a root,
    /// only runs whose manifest names `app` itself count, and the most
    /// recently created one wins.
    pub fn locate_manifest(backup_dir: &Path, app: &str) -> Result<PathBuf> {
        if backup_dir.is_file() {
            return Ok(backup_dir.to_path_buf());
        }
        let direct = backup_dir.join(MANIFEST_FILE);
        if direct.is_file() {
            return Ok(direct);
        }

        let prefix = run_prefix(app);
        let newest = fs::read_dir(backup_dir)
            .map_err(|_| Error::ManifestNotFound(direct.clone()))?
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.path().join(MANIFEST_FILE))
            // "Foo 2" runs share the "Foo_" prefix; the manifest settles it.
            .filter_map(|path| {
                let manifest = BackupManifest::load(&path).ok()?;
                (manifest.application == app).then_some((manifest.created_at, path))
            })
            .max();

        newest
            .map(|(_, path)| path)
            .ok_or(Error::ManifestNotFound(direct))
    }

    /// Restores every entry of the manifest at `manifest_path`.
    ///
    /// A missing or unreadable manifest fails before anything is written.
    /// Existing destination files are overwritten, each with a Warning.
    pub fn restore(
        &self,
        manifest_path: &Path,
        override_root: Option<&Path>,
        journal: &mut Journal<'_>,
    ) -> Result<BackupManifest> {
        let manifest = BackupManifest::load(manifest_path)?;
        let run_dir = manifest_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| manifest.backup_root.clone());

        journal.info(format!(
            "Restoring {} entries of {} from {}",
            manifest.entries.len(),
            manifest.application,
            run_dir.display()
        ));

        for entry in &manifest.entries {
            let source = run_dir.join(&entry.relative);
            let dest = entry.restore_destination(override_root);
            let step = format!("restore {}", dest.display());

            if !exists(&source) {
                journal.fail(step, format!("backup data missing at {}", source.display()));
                continue;
            }

            if journal.is_dry_run() {
                if exists(&dest) {
                    journal.warn(format!("[DRY RUN] Would overwrite {}", dest.display()));
                }
                journal.plan(format!("Would restore {} to {}", source.display(), dest.display()));
                continue;
            }

            let copied = copy_tree(&source, &dest, &mut |existing| {
                journal.warn(format!("Overwriting existing {}", existing.display()));
            });
            match copied {
                Ok(()) => {
                    journal.succeed(step, format!("Restored {}", dest.display()));
                    journal.record_restored(dest);
                }
                Err(e) => journal.fail(step, e),
            }
        }

        Ok(manifest)
    }
}
