//! End-to-end runs of the orchestrator against a sandboxed home directory
//! and fake external tools.

use appsweep_core::{
    AlwaysConfirm, Confirm, Config, ContainerAction, ContainerRuntime, Error, InstallationKind,
    MemorySink, Mode, OperationRequest, OperationStatus, Orchestrator, PackageManager, Severity,
    ToolError, Toolbox,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

struct FakePackages {
    installed: Vec<&'static str>,
    tool_missing_on_uninstall: bool,
}

impl PackageManager for FakePackages {
    fn name(&self) -> &str {
        "fakepkg"
    }

    fn list_installed(&self, app: &str) -> Result<Vec<String>, ToolError> {
        Ok(self
            .installed
            .iter()
            .filter(|id| id.eq_ignore_ascii_case(app))
            .map(|id| id.to_string())
            .collect())
    }

    fn uninstall(&self, _id: &str) -> Result<(), ToolError> {
        if self.tool_missing_on_uninstall {
            Err(ToolError::Unavailable("fakepkg".into()))
        } else {
            Ok(())
        }
    }

    fn uninstall_command(&self, id: &str) -> String {
        format!("fakepkg uninstall {id}")
    }
}

struct FakeDocker {
    images: Vec<&'static str>,
}

impl ContainerRuntime for FakeDocker {
    fn name(&self) -> &str {
        "fakedocker"
    }

    fn list_containers(&self, _app: &str) -> Result<Vec<String>, ToolError> {
        Ok(Vec::new())
    }

    fn list_images(&self, app: &str) -> Result<Vec<String>, ToolError> {
        let wanted = app.to_lowercase();
        Ok(self
            .images
            .iter()
            .filter(|image| image.contains(&wanted))
            .map(|image| image.to_string())
            .collect())
    }

    fn apply(&self, _action: ContainerAction, _id: &str) -> Result<(), ToolError> {
        Ok(())
    }

    fn command_line(&self, action: ContainerAction, id: &str) -> String {
        format!("fakedocker {action:?} {id}")
    }
}

struct Decline;

impl Confirm for Decline {
    fn confirm(&self, _prompt: &str) -> bool {
        false
    }
}

struct Sandbox {
    temp: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            temp: TempDir::new().unwrap(),
        }
    }

    fn home(&self) -> PathBuf {
        self.temp.path().join("home")
    }

    fn backups(&self) -> PathBuf {
        self.temp.path().join("backups")
    }

    fn config(&self) -> Config {
        Config::with_home(self.home())
    }

    fn write(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.home().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    /// Installs `Foo.app` plus one preferences file.
    fn install_foo(&self) -> (PathBuf, PathBuf) {
        let binary = self.write("Applications/Foo.app/Contents/MacOS/Foo", "binary");
        let bundle = binary.ancestors().nth(3).unwrap().to_path_buf();
        let prefs = self.write("Library/Preferences/Foo.plist", "prefs");
        (bundle, prefs)
    }

    fn orchestrator(&self, tools: Toolbox) -> Orchestrator {
        Orchestrator::new(self.config(), tools)
    }
}

fn snapshot(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    fn walk(dir: &Path, out: &mut BTreeMap<PathBuf, Option<Vec<u8>>>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.insert(path.clone(), None);
                walk(&path, out);
            } else {
                out.insert(path.clone(), Some(fs::read(&path).unwrap()));
            }
        }
    }
    let mut out = BTreeMap::new();
    walk(root, &mut out);
    out
}

fn silent(mut request: OperationRequest) -> OperationRequest {
    request.silent = true;
    request
}

#[test]
fn bundle_only_app_is_backed_up_and_removed() {
    let sandbox = Sandbox::new();
    let (bundle, prefs) = sandbox.install_foo();

    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(sandbox.backups());

    let sink = MemorySink::new();
    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&request, &sink, &AlwaysConfirm)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert!(result.kinds.contains(InstallationKind::BundleApp));
    assert_eq!(result.kinds.len(), 1);
    assert!(!result.nothing_found);
    assert!(!bundle.exists());
    assert!(!prefs.exists());
    assert_eq!(result.backed_up, vec![bundle.clone(), prefs.clone()]);

    let manifest = appsweep_core::BackupManifest::load(result.manifest.as_ref().unwrap()).unwrap();
    let originals: Vec<_> = manifest.entries.iter().map(|e| e.original.clone()).collect();
    assert_eq!(originals, vec![bundle, prefs]);
    assert!(sink.with_severity(Severity::Error).is_empty());
}

#[test]
fn failed_package_uninstall_next_to_image_removal_is_partial() {
    let sandbox = Sandbox::new();
    let tools = Toolbox {
        system: Some(Box::new(FakePackages {
            installed: vec!["bar"],
            tool_missing_on_uninstall: true,
        })),
        language: None,
        containers: Some(Box::new(FakeDocker {
            images: vec!["acme/bar:latest"],
        })),
    };

    let sink = MemorySink::new();
    let result = sandbox
        .orchestrator(tools)
        .run(&silent(OperationRequest::uninstall("Bar")), &sink, &AlwaysConfirm)
        .unwrap();

    assert_eq!(result.status, OperationStatus::PartialFailure);
    assert!(result.kinds.contains(InstallationKind::PackageManagerPackage));
    assert!(result.kinds.contains(InstallationKind::ContainerArtifact));
    assert_eq!(result.failures().count(), 1);
    assert_eq!(sink.with_severity(Severity::Error).len(), 1);
    assert!(result.failures().all(|f| f.step.contains("bar")));
}

#[test]
fn restore_with_deleted_manifest_fails_without_touching_files() {
    let sandbox = Sandbox::new();
    let (_bundle, prefs) = sandbox.install_foo();

    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(sandbox.backups());
    let orchestrator = sandbox.orchestrator(Toolbox::default());
    let result = orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();
    let manifest = result.manifest.unwrap();
    fs::remove_file(&manifest).unwrap();

    let before = snapshot(sandbox.temp.path());
    let restore = OperationRequest::restore("Foo", manifest.parent().unwrap());
    let err = orchestrator
        .run(&restore, &MemorySink::new(), &AlwaysConfirm)
        .unwrap_err();

    assert!(matches!(err, Error::ManifestNotFound(_)));
    assert_eq!(snapshot(sandbox.temp.path()), before);
    assert!(!prefs.exists());
}

#[test]
fn dry_run_leaves_the_filesystem_alone() {
    let sandbox = Sandbox::new();
    sandbox.install_foo();
    sandbox.write("Library/Caches/Foo/cache.db", "cache");

    let mut request = OperationRequest::uninstall("Foo");
    request.dry_run = true;
    request.backup_dir = Some(sandbox.backups());

    let before = snapshot(sandbox.temp.path());
    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&request, &MemorySink::new(), &Decline)
        .unwrap();

    assert_eq!(result.status, OperationStatus::DryRunCompleted);
    assert_eq!(snapshot(sandbox.temp.path()), before);
    assert!(result.removed.is_empty());
    assert!(result.manifest.is_none());
}

#[test]
fn second_removal_finds_nothing_to_do() {
    let sandbox = Sandbox::new();
    sandbox.install_foo();
    let orchestrator = sandbox.orchestrator(Toolbox::default());
    let request = silent(OperationRequest::uninstall("Foo"));

    let first = orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();
    assert_eq!(first.status, OperationStatus::Success);

    let second = orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();
    assert!(second.kinds.is_unknown());
    assert!(second.nothing_found);
    assert_eq!(second.status, OperationStatus::Success);
    assert_eq!(second.failures().count(), 0);
}

#[test]
fn restore_reproduces_backed_up_contents() {
    let sandbox = Sandbox::new();
    let (bundle, prefs) = sandbox.install_foo();
    let cache = sandbox.write("Library/Caches/Foo/nested/cache.db", "cache bytes");
    let before = snapshot(&sandbox.home());

    let orchestrator = sandbox.orchestrator(Toolbox::default());
    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(sandbox.backups());
    orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();
    assert!(!bundle.exists() && !prefs.exists() && !cache.exists());

    let sink = MemorySink::new();
    let restore = OperationRequest::restore("Foo", sandbox.backups());
    let result = orchestrator.run(&restore, &sink, &AlwaysConfirm).unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(result.restored.len(), 3);
    assert!(!result.nothing_found);
    assert_eq!(snapshot(&sandbox.home()), before);
    assert!(sink.with_severity(Severity::Warning).is_empty());
}

#[test]
fn restore_under_override_root() {
    let sandbox = Sandbox::new();
    sandbox.install_foo();
    let orchestrator = sandbox.orchestrator(Toolbox::default());
    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(sandbox.backups());
    orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();

    let elsewhere = sandbox.temp.path().join("elsewhere");
    let restore = OperationRequest {
        restore_path: Some(elsewhere.clone()),
        ..OperationRequest::restore("Foo", sandbox.backups())
    };
    let result = orchestrator.run(&restore, &MemorySink::new(), &AlwaysConfirm).unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(
        fs::read_to_string(elsewhere.join("Library/Preferences/Foo.plist")).unwrap(),
        "prefs"
    );
    assert!(elsewhere.join("Applications/Foo.app/Contents/MacOS/Foo").exists());
}

#[test]
fn declined_removal_changes_nothing() {
    let sandbox = Sandbox::new();
    let (bundle, prefs) = sandbox.install_foo();

    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&OperationRequest::uninstall("Foo"), &MemorySink::new(), &Decline)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Cancelled);
    assert!(bundle.exists());
    assert!(prefs.exists());
}

#[test]
fn silent_run_never_asks() {
    let sandbox = Sandbox::new();
    let (bundle, _prefs) = sandbox.install_foo();

    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&silent(OperationRequest::uninstall("Foo")), &MemorySink::new(), &Decline)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert!(!bundle.exists());
}

#[test]
fn unusable_backup_root_aborts_before_removal() {
    let sandbox = Sandbox::new();
    let (bundle, prefs) = sandbox.install_foo();
    let blocker = sandbox.temp.path().join("not-a-dir");
    fs::write(&blocker, "file").unwrap();

    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(blocker);

    let err = sandbox
        .orchestrator(Toolbox::default())
        .run(&request, &MemorySink::new(), &AlwaysConfirm)
        .unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }));
    assert!(bundle.exists());
    assert!(prefs.exists());
}

#[test]
fn keep_leftovers_only_removes_the_install() {
    let sandbox = Sandbox::new();
    let (bundle, prefs) = sandbox.install_foo();
    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.purge_leftovers = false;

    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&request, &MemorySink::new(), &AlwaysConfirm)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert!(!bundle.exists());
    assert!(prefs.exists());
    assert_eq!(request.mode, Mode::Uninstall);
}

#[test]
fn other_apps_sharing_the_name_are_left_alone() {
    let sandbox = Sandbox::new();
    let binary = sandbox.write("Applications/Code.app/Contents/MacOS/Code", "binary");
    let bundle = binary.ancestors().nth(3).unwrap().to_path_buf();
    let own_cache = sandbox.write("Library/Caches/Code/cache.db", "code");
    let xcode = sandbox.write("Library/Caches/com.apple.dt.Xcode/db", "xcode");

    let sink = MemorySink::new();
    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&silent(OperationRequest::uninstall("Code")), &sink, &AlwaysConfirm)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert!(!bundle.exists());
    assert!(!own_cache.exists());
    assert_eq!(fs::read_to_string(&xcode).unwrap(), "xcode");
    assert!(result.removed.iter().all(|p| !p.to_string_lossy().contains("Xcode")));
    let kept: Vec<_> = sink
        .with_severity(Severity::Warning)
        .into_iter()
        .filter(|w| w.message.contains("partially matches"))
        .collect();
    assert_eq!(kept.len(), 1);
    assert!(kept[0].message.contains("com.apple.dt.Xcode"));
}

#[test]
fn restore_picks_the_run_of_the_named_application() {
    let sandbox = Sandbox::new();
    let (_bundle, prefs) = sandbox.install_foo();
    let other = sandbox.write("Library/Caches/Foo 2/cache.db", "other app");
    let orchestrator = sandbox.orchestrator(Toolbox::default());

    for app in ["Foo", "Foo 2"] {
        let mut request = silent(OperationRequest::uninstall(app));
        request.backup_dir = Some(sandbox.backups());
        orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();
    }
    assert!(!prefs.exists() && !other.exists());

    let result = orchestrator
        .run(&OperationRequest::restore("Foo", sandbox.backups()), &MemorySink::new(), &AlwaysConfirm)
        .unwrap();

    assert_eq!(result.status, OperationStatus::Success);
    assert_eq!(fs::read_to_string(&prefs).unwrap(), "prefs");
    assert!(!other.exists());
    let manifest = appsweep_core::BackupManifest::load(result.manifest.as_ref().unwrap()).unwrap();
    assert_eq!(manifest.application, "Foo");
}

#[cfg(unix)]
#[test]
fn leftover_that_cannot_be_backed_up_is_kept() {
    let sandbox = Sandbox::new();
    let (bundle, prefs) = sandbox.install_foo();
    let cache_dir = sandbox.home().join("Library/Caches/Foo");
    fs::create_dir_all(&cache_dir).unwrap();
    // Sockets cannot be copied, whatever the permissions of the caller.
    let _listener = std::os::unix::net::UnixListener::bind(cache_dir.join("agent.sock")).unwrap();

    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(sandbox.backups());
    let sink = MemorySink::new();
    let result = sandbox
        .orchestrator(Toolbox::default())
        .run(&request, &sink, &AlwaysConfirm)
        .unwrap();

    assert_eq!(result.status, OperationStatus::PartialFailure);
    assert_eq!(result.failures().count(), 1);
    assert!(result.failures().all(|f| f.step.contains("Caches/Foo")));
    assert_eq!(sink.with_severity(Severity::Error).len(), 1);
    assert!(cache_dir.join("agent.sock").exists());
    assert!(!bundle.exists());
    assert!(!prefs.exists());
    assert!(sink
        .with_severity(Severity::Warning)
        .iter()
        .any(|w| w.message.contains("not backed up")));
}

#[test]
fn dry_run_restore_only_logs_the_plan() {
    let sandbox = Sandbox::new();
    let (_bundle, prefs) = sandbox.install_foo();
    let orchestrator = sandbox.orchestrator(Toolbox::default());
    let mut request = silent(OperationRequest::uninstall("Foo"));
    request.backup_dir = Some(sandbox.backups());
    orchestrator.run(&request, &MemorySink::new(), &AlwaysConfirm).unwrap();

    let before = snapshot(sandbox.temp.path());
    let mut restore = OperationRequest::restore("Foo", sandbox.backups());
    restore.dry_run = true;
    let sink = MemorySink::new();
    let result = orchestrator.run(&restore, &sink, &Decline).unwrap();

    assert_eq!(result.status, OperationStatus::DryRunCompleted);
    assert!(result.restored.is_empty());
    assert!(!prefs.exists());
    assert_eq!(snapshot(sandbox.temp.path()), before);
    assert!(sink
        .events()
        .iter()
        .any(|e| e.message.starts_with("[DRY RUN] Would restore")));
}
