//! Filesystem locations and tool settings used by every component.
//!
//! Nothing here reads global state after construction; the caller builds a
//! [`Config`] once and hands it to the orchestrator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::target::LeftoverCategory;

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// A directory scanned for leftovers, tagged with what it usually holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    pub path: PathBuf,
    pub category: LeftoverCategory,
}

impl SearchRoot {
    pub fn new(path: impl Into<PathBuf>, category: LeftoverCategory) -> Self {
        Self {
            path: path.into(),
            category,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub home: PathBuf,
    /// Directories holding application bundles
    pub application_dirs: Vec<PathBuf>,
    pub search_roots: Vec<SearchRoot>,
    /// Upper bound for each external tool invocation
    pub tool_timeout: Duration,
    /// Interpreter used to drive pip
    pub python: String,
}

impl Config {
    /// Builds the default layout for the current user.
    ///
    /// `APPSWEEP_TOOL_TIMEOUT` (seconds) and `APPSWEEP_PYTHON` override the
    /// tool settings.
    pub fn detect() -> Result<Self> {
        let home = dirs::home_dir()
            .ok_or_else(|| Error::configuration("~", "could not determine the home directory"))?;
        let mut config = Self::for_system(&home, Path::new("/"));

        if let Ok(secs) = std::env::var("APPSWEEP_TOOL_TIMEOUT") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                Error::configuration("APPSWEEP_TOOL_TIMEOUT", format!("not a number of seconds: {secs}"))
            })?;
            config.tool_timeout = Duration::from_secs(secs);
        }
        if let Ok(python) = std::env::var("APPSWEEP_PYTHON") {
            if !python.trim().is_empty() {
                config.python = python;
            }
        }

        Ok(config)
    }

    /// Same layout as [`Config::detect`], with the user directories under
    /// `home` and the system-wide ones under `home` as well.
    ///
    /// Keeps a whole run inside one directory tree.
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self::for_system(&home, &home)
    }

    fn for_system(home: &Path, system: &Path) -> Self {
        let user_library = home.join("Library");
        let system_library = system.join("Library");

        let user = [
            ("Application Support", LeftoverCategory::ApplicationSupport),
            ("Caches", LeftoverCategory::Caches),
            ("Preferences", LeftoverCategory::Preferences),
            ("Logs", LeftoverCategory::Logs),
            ("LaunchAgents", LeftoverCategory::LaunchAgents),
            ("Containers", LeftoverCategory::Other),
            ("Saved Application State", LeftoverCategory::Other),
            ("HTTPStorages", LeftoverCategory::Other),
            ("WebKit", LeftoverCategory::Other),
        ];
        let system_wide = [
            ("Application Support", LeftoverCategory::ApplicationSupport),
            ("Caches", LeftoverCategory::Caches),
            ("Preferences", LeftoverCategory::Preferences),
            ("LaunchAgents", LeftoverCategory::LaunchAgents),
            ("LaunchDaemons", LeftoverCategory::LaunchAgents),
        ];

        let mut search_roots: Vec<SearchRoot> = user
            .iter()
            .map(|(dir, category)| SearchRoot::new(user_library.join(dir), *category))
            .collect();
        // With a sandboxed system root the two libraries are the same directory.
        if system_library != user_library {
            search_roots.extend(
                system_wide
                    .iter()
                    .map(|(dir, category)| SearchRoot::new(system_library.join(dir), *category)),
            );
        }

        let mut application_dirs = vec![system.join("Applications")];
        if home.join("Applications") != application_dirs[0] {
            application_dirs.push(home.join("Applications"));
        }

        Self {
            home: home.to_path_buf(),
            application_dirs,
            search_roots,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            python: String::from("python3"),
        }
    }
}
