//! External tool boundary: system package manager, language package
//! manager, and container runtime.
//!
//! Each capability is a trait so the classifier and the removal executor
//! never care whether they talk to the real `brew`/`pip`/`docker` or to a
//! stand-in. Every real invocation goes through [`run_tool`], which bounds
//! it with a timeout.

use serde::Deserialize;
use std::io::{self, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("`{0}` is not installed")]
    Unavailable(String),

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("`{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("could not parse output of `{command}`: {reason}")]
    Parse { command: String, reason: String },
}

/// Package manager seen as two capabilities: list and uninstall.
pub trait PackageManager {
    fn name(&self) -> &str;

    /// Identifiers of installed packages matching the application name.
    fn list_installed(&self, app: &str) -> Result<Vec<String>, ToolError>;

    fn uninstall(&self, id: &str) -> Result<(), ToolError>;

    /// The command `uninstall` would run, for dry-run logging.
    fn uninstall_command(&self, id: &str) -> String;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerAction {
    Stop,
    Remove,
    RemoveImage,
}

pub trait ContainerRuntime {
    fn name(&self) -> &str;

    fn list_containers(&self, app: &str) -> Result<Vec<String>, ToolError>;

    fn list_images(&self, app: &str) -> Result<Vec<String>, ToolError>;

    fn apply(&self, action: ContainerAction, id: &str) -> Result<(), ToolError>;

    fn command_line(&self, action: ContainerAction, id: &str) -> String;
}

/// The capabilities available to a run. `None` means the tool is absent.
#[derive(Default)]
pub struct Toolbox {
    pub system: Option<Box<dyn PackageManager>>,
    pub language: Option<Box<dyn PackageManager>>,
    pub containers: Option<Box<dyn ContainerRuntime>>,
}

impl Toolbox {
    /// Homebrew, pip, and Docker, driven through their command-line tools.
    pub fn system_defaults(config: &Config) -> Self {
        Self {
            system: Some(Box::new(Homebrew::new(config.tool_timeout))),
            language: Some(Box::new(Pip::new(config.python.clone(), config.tool_timeout))),
            containers: Some(Box::new(Docker::new(config.tool_timeout))),
        }
    }
}

/// Runs `program` with `args`, killing it once `timeout` elapses.
///
/// Returns stdout on a zero exit status. A program that cannot be found maps
/// to [`ToolError::Unavailable`].
pub fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<String, ToolError> {
    let command = render(program, args);
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ToolError::Unavailable(program.to_string()),
            _ => ToolError::Io {
                command: command.clone(),
                source: e,
            },
        })?;

    // Pipes are drained on their own threads so a chatty tool cannot block
    // on a full pipe while we poll.
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let stdout_reader = thread::spawn(move || drain(stdout));
    let stderr_reader = thread::spawn(move || drain(stderr));

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ToolError::TimedOut { command, timeout });
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(source) => return Err(ToolError::Io { command, source }),
        }
    };

    let stdout = stdout_reader.join().unwrap_or_default();
    let stderr = stderr_reader.join().unwrap_or_default();

    if status.success() {
        Ok(stdout)
    } else {
        Err(ToolError::Failed {
            command,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        })
    }
}

fn drain(pipe: Option<impl Read>) -> String {
    let mut buf = String::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_string(&mut buf);
    }
    buf
}

fn render(program: &str, args: &[&str]) -> String {
    std::iter::once(program)
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Non-empty, trimmed lines, skipping `==>` section headers.
fn listing_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("==>"))
}

/// Lowercase with runs of whitespace replaced by `-` ("Visual Studio Code"
/// becomes "visual-studio-code").
pub fn dashed_token(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// PEP 503 project-name normalization.
pub fn normalize_distribution(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') || c.is_whitespace() {
            if !in_separator {
                out.push('-');
            }
            in_separator = true;
        } else {
            out.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    out
}

// ── Homebrew ──

/// Marks identifiers found in `brew list --cask`; they uninstall with
/// `--cask`.
const CASK_PREFIX: &str = "cask:";

pub struct Homebrew {
    program: String,
    timeout: Duration,
}

impl Homebrew {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: String::from("brew"),
            timeout,
        }
    }

    fn uninstall_args(id: &str) -> Vec<&str> {
        match id.strip_prefix(CASK_PREFIX) {
            Some(cask) => vec!["uninstall", "--cask", cask],
            None => vec!["uninstall", id],
        }
    }
}

impl PackageManager for Homebrew {
    fn name(&self) -> &str {
        "brew"
    }

    /// Formulae come back as their name, casks as `cask:<name>`. A listing
    /// that fails is skipped; the error only surfaces when nothing matched.
    fn list_installed(&self, app: &str) -> Result<Vec<String>, ToolError> {
        let token = dashed_token(app);
        let mut matches = Vec::new();
        let mut failure = None;
        for (flag, prefix) in [("--formula", ""), ("--cask", CASK_PREFIX)] {
            match run_tool(&self.program, &["list", "-1", flag], self.timeout) {
                Ok(output) => matches.extend(
                    listing_lines(&output)
                        .filter(|id| id.eq_ignore_ascii_case(&token))
                        .map(|id| format!("{prefix}{id}")),
                ),
                Err(e) => {
                    tracing::warn!("brew list {flag} failed: {e}");
                    failure = Some(e);
                }
            }
        }
        match failure {
            Some(e) if matches.is_empty() => Err(e),
            _ => Ok(matches),
        }
    }

    fn uninstall(&self, id: &str) -> Result<(), ToolError> {
        run_tool(&self.program, &Self::uninstall_args(id), self.timeout).map(|_| ())
    }

    fn uninstall_command(&self, id: &str) -> String {
        render(&self.program, &Self::uninstall_args(id))
    }
}

// ── pip ──

#[derive(Debug, Deserialize)]
struct PipDistribution {
    name: String,
}

pub struct Pip {
    python: String,
    timeout: Duration,
}

impl Pip {
    pub fn new(python: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python: python.into(),
            timeout,
        }
    }
}

fn parse_pip_list(command: &str, output: &str, app: &str) -> Result<Vec<String>, ToolError> {
    let distributions: Vec<PipDistribution> =
        serde_json::from_str(output.trim()).map_err(|e| ToolError::Parse {
            command: command.to_string(),
            reason: e.to_string(),
        })?;
    let wanted = normalize_distribution(app);
    Ok(distributions
        .into_iter()
        .filter(|d| normalize_distribution(&d.name) == wanted)
        .map(|d| d.name)
        .collect())
}

impl PackageManager for Pip {
    fn name(&self) -> &str {
        "pip"
    }

    fn list_installed(&self, app: &str) -> Result<Vec<String>, ToolError> {
        let args = ["-m", "pip", "list", "--format=json"];
        let output = run_tool(&self.python, &args, self.timeout)?;
        parse_pip_list(&render(&self.python, &args), &output, app)
    }

    fn uninstall(&self, id: &str) -> Result<(), ToolError> {
        run_tool(&self.python, &["-m", "pip", "uninstall", "-y", id], self.timeout).map(|_| ())
    }

    fn uninstall_command(&self, id: &str) -> String {
        render(&self.python, &["-m", "pip", "uninstall", "-y", id])
    }
}

// ── Docker ──

pub struct Docker {
    program: String,
    timeout: Duration,
}

impl Docker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: String::from("docker"),
            timeout,
        }
    }

    fn args(action: ContainerAction, id: &str) -> [&str; 2] {
        match action {
            ContainerAction::Stop => ["stop", id],
            ContainerAction::Remove => ["rm", id],
            ContainerAction::RemoveImage => ["rmi", id],
        }
    }
}

fn matching_containers(output: &str, app: &str) -> Vec<String> {
    let wanted = app.to_lowercase();
    listing_lines(output)
        .filter(|name| name.to_lowercase().contains(&wanted))
        .map(str::to_string)
        .collect()
}

/// Images whose last repository segment is the application's token.
fn matching_images(output: &str, app: &str) -> Vec<String> {
    let wanted = dashed_token(app);
    listing_lines(output)
        .filter(|image| !image.starts_with("<none>"))
        .filter(|image| {
            let repository = image.rsplit_once(':').map_or(*image, |(repo, _)| repo);
            let last = repository.rsplit('/').next().unwrap_or(repository);
            last.eq_ignore_ascii_case(&wanted)
        })
        .map(str::to_string)
        .collect()
}

impl ContainerRuntime for Docker {
    fn name(&self) -> &str {
        "docker"
    }

    fn list_containers(&self, app: &str) -> Result<Vec<String>, ToolError> {
        let output = run_tool(
            &self.program,
            &["ps", "-a", "--format", "{{.Names}}"],
            self.timeout,
        )?;
        Ok(matching_containers(&output, app))
    }

    fn list_images(&self, app: &str) -> Result<Vec<String>, ToolError> {
        let output = run_tool(
            &self.program,
            &["images", "--format", "{{.Repository}}:{{.Tag}}"],
            self.timeout,
        )?;
        Ok(matching_images(&output, app))
    }

    fn apply(&self, action: ContainerAction, id: &str) -> Result<(), ToolError> {
        run_tool(&self.program, &Self::args(action, id), self.timeout).map(|_| ())
    }

    fn command_line(&self, action: ContainerAction, id: &str) -> String {
        render(&self.program, &Self::args(action, id))
    }
}
