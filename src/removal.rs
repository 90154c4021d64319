//! Removal actions.
//!
//! One action per installation kind, always in the order bundle, system
//! package, language package, container artifacts. Each action stands on
//! its own: a failure is recorded and the next action still runs.

use std::path::{Path, PathBuf};

use crate::fs_ops::{delete_path, exists};
use crate::journal::Journal;
use crate::target::{ApplicationTarget, InstallationKind, KindSet};
use crate::tools::{ContainerAction, PackageManager, ToolError, Toolbox};

pub struct RemovalExecutor<'a> {
    tools: &'a Toolbox,
}

impl<'a> RemovalExecutor<'a> {
    pub fn new(tools: &'a Toolbox) -> Self {
        Self { tools }
    }

    pub fn remove(&self, target: &ApplicationTarget, kinds: &KindSet, journal: &mut Journal<'_>) {
        for kind in kinds.iter() {
            match kind {
                InstallationKind::BundleApp => {
                    if let Some(bundle) = &target.bundle_path {
                        delete(format!("delete {}", bundle.display()), bundle, journal);
                    }
                }
                InstallationKind::PackageManagerPackage => {
                    let manager = self.tools.system.as_deref();
                    for id in &target.system_packages {
                        uninstall_package(manager, "system package manager", id, journal);
                    }
                }
                InstallationKind::LanguagePackage => {
                    let manager = self.tools.language.as_deref();
                    for id in &target.language_packages {
                        uninstall_package(manager, "language package manager", id, journal);
                    }
                }
                InstallationKind::ContainerArtifact => self.remove_containers(target, journal),
                InstallationKind::Unknown => {
                    journal.info(format!("Installation type for {} not handled.", target.name));
                }
            }
        }
    }

    /// Deletes leftovers that are still present after the removal actions.
    pub fn purge_leftovers(&self, leftovers: &[PathBuf], journal: &mut Journal<'_>) {
        for path in leftovers {
            if !exists(path) {
                journal.info(format!("{} is already gone", path.display()));
                continue;
            }
            delete(format!("leftover:{}", path.display()), path, journal);
        }
    }

    fn remove_containers(&self, target: &ApplicationTarget, journal: &mut Journal<'_>) {
        let runtime = self.tools.containers.as_deref();

        // Containers hold their images, so they go first.
        for container in &target.containers {
            let step = format!("remove container {container}");
            let Some(runtime) = runtime else {
                journal.fail(step, ToolError::Unavailable("container runtime".into()));
                continue;
            };
            if journal.is_dry_run() {
                journal.plan(format!("Would run {}", runtime.command_line(ContainerAction::Stop, container)));
                journal.plan(format!("Would run {}", runtime.command_line(ContainerAction::Remove, container)));
                continue;
            }
            let removed = runtime
                .apply(ContainerAction::Stop, container)
                .and_then(|()| runtime.apply(ContainerAction::Remove, container));
            match removed {
                Ok(()) => journal.succeed(step, format!("Removed container: {container}")),
                Err(e) => journal.fail(step, e),
            }
        }

        for image in &target.images {
            let step = format!("remove image {image}");
            let Some(runtime) = runtime else {
                journal.fail(step, ToolError::Unavailable("container runtime".into()));
                continue;
            };
            if journal.is_dry_run() {
                journal.plan(format!("Would run {}", runtime.command_line(ContainerAction::RemoveImage, image)));
                continue;
            }
            match runtime.apply(ContainerAction::RemoveImage, image) {
                Ok(()) => journal.succeed(step, format!("Removed image: {image}")),
                Err(e) => journal.fail(step, e),
            }
        }
    }
}

fn delete(step: String, path: &Path, journal: &mut Journal<'_>) {
    if journal.is_dry_run() {
        journal.plan(format!("Would delete {}", path.display()));
        return;
    }
    match delete_path(path) {
        Ok(()) => {
            journal.succeed(step, format!("Deleted {}", path.display()));
            journal.record_removed(path);
        }
        Err(e) => journal.fail(step, e),
    }
}

fn uninstall_package(
    manager: Option<&dyn PackageManager>,
    label: &str,
    id: &str,
    journal: &mut Journal<'_>,
) {
    let step = format!("uninstall {id} ({label})");
    let Some(manager) = manager else {
        journal.fail(step, ToolError::Unavailable(label.to_string()));
        return;
    };
    if journal.is_dry_run() {
        journal.plan(format!("Would run {}", manager.uninstall_command(id)));
        return;
    }
    match manager.uninstall(id) {
        Ok(()) => journal.succeed(step, format!("Uninstalled {id} using {}.", manager.name())),
        Err(e) => journal.fail(step, e),
    }
}
