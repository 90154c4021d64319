//! Sequencing of a whole run.
//!
//! Uninstall: Idle → Classifying → LocatingLeftovers → BackingUp (only with
//! a backup directory) → Removing → Done. Restore: Idle → Restoring → Done.
//! Phases never repeat and never go back; a failed run is re-invoked by the
//! caller.

use std::path::PathBuf;

use crate::backup::BackupManager;
use crate::classifier::InstallClassifier;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::journal::{Journal, LogSink, OperationResult};
use crate::locator::PathLocator;
use crate::removal::RemovalExecutor;
use crate::restore::RestoreManager;
use crate::target::KindSet;
use crate::tools::Toolbox;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Uninstall,
    Restore,
}

/// Everything the caller resolved before invoking the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub application: String,
    pub mode: Mode,
    pub backup_dir: Option<PathBuf>,
    /// Restore under this root instead of the original locations
    pub restore_path: Option<PathBuf>,
    pub dry_run: bool,
    /// Skip the confirmation capability entirely
    pub silent: bool,
    /// Delete leftover paths after the removal actions
    pub purge_leftovers: bool,
}

impl OperationRequest {
    pub fn uninstall(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            mode: Mode::Uninstall,
            backup_dir: None,
            restore_path: None,
            dry_run: false,
            silent: false,
            purge_leftovers: true,
        }
    }

    pub fn restore(application: impl Into<String>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: Mode::Restore,
            backup_dir: Some(backup_dir.into()),
            ..Self::uninstall(application)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Idle,
    Classifying,
    LocatingLeftovers,
    BackingUp,
    Removing,
    Restoring,
    Done,
}

/// Asked before the backup and the removal phases unless the run is silent.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

/// Approves everything; what silent runs use.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

impl Confirm for AlwaysConfirm {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

struct PhaseTracker {
    current: Phase,
}

impl PhaseTracker {
    fn enter(&mut self, next: Phase) {
        debug_assert!(next > self.current, "phase {next:?} after {:?}", self.current);
        tracing::debug!(from = ?self.current, to = ?next, "phase transition");
        self.current = next;
    }
}

pub struct Orchestrator {
    config: Config,
    tools: Toolbox,
}

impl Orchestrator {
    pub fn new(config: Config, tools: Toolbox) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs one request to completion.
    ///
    /// Only invalid requests, configuration problems, and missing or corrupt
    /// manifests come back as `Err`; everything else is folded into the
    /// returned result.
    pub fn run(
        &self,
        request: &OperationRequest,
        sink: &dyn LogSink,
        confirm: &dyn Confirm,
    ) -> Result<OperationResult> {
        let app = request.application.trim();
        if app.is_empty() {
            return Err(Error::InvalidRequest("application name is empty".into()));
        }
        let confirm: &dyn Confirm = if request.silent { &AlwaysConfirm } else { confirm };
        let mut phases = PhaseTracker { current: Phase::Idle };
        let mut journal = Journal::new(sink, request.dry_run);

        let result = match request.mode {
            Mode::Uninstall => {
                journal.info(format!("Starting uninstallation process for {app}."));
                self.uninstall(app, request, confirm, &mut phases, journal)?
            }
            Mode::Restore => {
                journal.info(format!("Starting restoration process for {app}."));
                self.restore(app, request, &mut phases, journal)?
            }
        };
        phases.enter(Phase::Done);
        Ok(result)
    }

    fn uninstall(
        &self,
        app: &str,
        request: &OperationRequest,
        confirm: &dyn Confirm,
        phases: &mut PhaseTracker,
        mut journal: Journal<'_>,
    ) -> Result<OperationResult> {
        let dry_run = request.dry_run;

        phases.enter(Phase::Classifying);
        let (target, kinds) = InstallClassifier::new(&self.config, &self.tools).classify(app, &journal);

        phases.enter(Phase::LocatingLeftovers);
        let found = PathLocator::new(self.config.search_roots.clone()).locate(app, target.bundle_id.as_deref());
        if found.is_empty() {
            journal.info(format!("No leftover files found for {app}."));
        } else {
            journal.info(format!("Found {} leftover path(s) for {app}.", found.len()));
        }
        let mut leftovers: Vec<PathBuf> = Vec::with_capacity(found.len());
        for leftover in found {
            if leftover.exact {
                leftovers.push(leftover.path);
            } else {
                journal.warn(format!(
                    "Keeping {}: its name only partially matches {app}",
                    leftover.path.display()
                ));
            }
        }

        let mut manifest = None;
        let mut unprotected: Vec<PathBuf> = Vec::new();
        if let Some(backup_dir) = &request.backup_dir {
            let sources: Vec<PathBuf> = target
                .bundle_path
                .iter()
                .cloned()
                .chain(leftovers.iter().cloned())
                .collect();

            if sources.is_empty() {
                journal.info("No files found to back up.");
            } else {
                let prompt = format!(
                    "Back up {} path(s) for {app} to {}?",
                    sources.len(),
                    backup_dir.display()
                );
                if !dry_run && !confirm.confirm(&prompt) {
                    journal.info(format!("Backup declined; leaving {app} untouched."));
                    return Ok(journal.finish(kinds, None, true));
                }

                phases.enter(Phase::BackingUp);
                manifest = BackupManager::new(&self.config.home).backup(app, &sources, backup_dir, &mut journal)?;
                if !dry_run {
                    let saved = journal.backed_up();
                    unprotected = sources.into_iter().filter(|s| !saved.contains(s)).collect();
                }
            }
        }

        let nothing_to_remove = kinds.is_unknown() && (leftovers.is_empty() || !request.purge_leftovers);
        if nothing_to_remove {
            journal.info(format!("Nothing to remove for {app}."));
            return Ok(finish(journal, app, kinds, manifest));
        }

        let prompt = format!("Remove {app} ({kinds}) and {} leftover path(s)?", leftovers.len());
        if !dry_run && !confirm.confirm(&prompt) {
            journal.info(format!("Removal of {app} declined."));
            return Ok(journal.finish(kinds, manifest, true));
        }

        phases.enter(Phase::Removing);
        let mut target = target;
        if target.bundle_path.as_ref().is_some_and(|b| unprotected.contains(b)) {
            if let Some(bundle) = target.bundle_path.take() {
                journal.warn(format!("Keeping {}: it was not backed up", bundle.display()));
            }
        }
        let executor = RemovalExecutor::new(&self.tools);
        executor.remove(&target, &kinds, &mut journal);

        if request.purge_leftovers {
            let mut purge = Vec::with_capacity(leftovers.len());
            for path in leftovers {
                if unprotected.contains(&path) {
                    journal.warn(format!("Keeping {}: it was not backed up", path.display()));
                } else {
                    purge.push(path);
                }
            }
            executor.purge_leftovers(&purge, &mut journal);
        } else if !leftovers.is_empty() {
            journal.info(format!("Keeping {} leftover path(s).", leftovers.len()));
        }

        Ok(finish(journal, app, kinds, manifest))
    }

    fn restore(
        &self,
        app: &str,
        request: &OperationRequest,
        phases: &mut PhaseTracker,
        mut journal: Journal<'_>,
    ) -> Result<OperationResult> {
        let backup_dir = request
            .backup_dir
            .as_deref()
            .ok_or_else(|| Error::InvalidRequest("restore needs a backup directory".into()))?;

        phases.enter(Phase::Restoring);
        let manifest_path = RestoreManager::locate_manifest(backup_dir, app)?;
        RestoreManager::new().restore(&manifest_path, request.restore_path.as_deref(), &mut journal)?;
        journal.info(format!("Restoration for {app} completed."));

        let mut result = journal.finish(KindSet::unknown(), Some(manifest_path), false);
        result.nothing_found = false;
        Ok(result)
    }
}

fn finish(journal: Journal<'_>, app: &str, kinds: KindSet, manifest: Option<PathBuf>) -> OperationResult {
    journal.info(format!("Uninstallation and cleanup for {app} completed."));
    journal.finish(kinds, manifest, false)
}
