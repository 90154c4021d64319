//! AppSweep Core Library
//!
//! Finds, removes, backs up, and restores desktop applications and the files
//! they leave behind.
//!
//! # Architecture
//!
//! The library is the whole uninstall/restore engine. A caller (the
//! `appsweep` binary, or anything embedding the crate) resolves a
//! [`OperationRequest`], supplies a [`LogSink`] and a [`Confirm`]
//! capability, and gets an [`OperationResult`] back.
//!
//! # Core Features Implemented
//!
//! ## Detection (`classifier`, `locator` modules)
//! - `InstallClassifier::classify()` - Bundle, system package, language
//!   package, and container detectors, each allowed to fail on its own
//! - `PathLocator::locate()` - Leftovers under the Library search roots
//!
//! ## Backup and Restore (`backup`, `restore` modules)
//! - `BackupManager::backup()` - Timestamped runs with an atomically written
//!   manifest
//! - `RestoreManager::restore()` - Copies a run back to its original
//!   locations or under an override root
//!
//! ## Removal (`removal` module)
//! - `RemovalExecutor::remove()` - One action per installation kind, in a
//!   fixed order
//! - `RemovalExecutor::purge_leftovers()` - Deletes leftovers that survived
//!
//! ## External Tools (`tools` module)
//! - `PackageManager` / `ContainerRuntime` - Capabilities backed by Homebrew,
//!   pip, and Docker, each call bounded by a timeout
//!
//! ## Sequencing (`orchestrator` module)
//! - `Orchestrator::run()` - The only entry point callers need

pub mod backup;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fs_ops;
pub mod journal;
pub mod locator;
pub mod orchestrator;
pub mod removal;
pub mod restore;
pub mod target;
pub mod tools;

pub use backup::{BackupManager, BackupManifest, ManifestEntry};
pub use classifier::InstallClassifier;
pub use config::{Config, SearchRoot};
pub use error::{Error, Result};
pub use journal::{
    FanoutSink, FileSink, Journal, LogEvent, LogSink, MemorySink, OperationResult,
    OperationStatus, Severity, StepOutcome, TracingSink,
};
pub use locator::PathLocator;
pub use orchestrator::{AlwaysConfirm, Confirm, Mode, OperationRequest, Orchestrator, Phase};
pub use removal::RemovalExecutor;
pub use restore::RestoreManager;
pub use target::{ApplicationTarget, InstallationKind, KindSet, LeftoverCategory, LeftoverPath};
pub use tools::{ContainerAction, ContainerRuntime, PackageManager, ToolError, Toolbox};
