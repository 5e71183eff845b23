//! Ordered step plans
//!
//! Multi-step mutations are described as a [`Plan`] of [`Step`]s and handed
//! to a [`StepRunner`]. Two policies exist:
//!
//! - [`StepRunner::execute`] stops at the first failing step and reports its
//!   index. Steps already applied stay applied, so a caller can resume from
//!   the reported index after fixing the cause.
//! - [`StepRunner::execute_best_effort`] runs every step and collects the
//!   failures.

use command_executor::Command;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, error, warn};

use crate::context::AdminContext;
use crate::error::{Error, Result};
use crate::fsutil::{set_mode, write_atomic};
use crate::journal::MessageKey;
use crate::system::{DirectoryEntry, run_checked};

/// One unit of work
#[derive(Debug, Clone)]
pub enum Step {
    /// Run a command; a non-zero exit fails the step
    Run(Command),
    /// Create a directory and its parents; an existing one is fine
    CreateDir(PathBuf),
    /// Atomically replace a file
    WriteFile {
        /// Destination
        path: PathBuf,
        /// New content
        contents: String,
    },
    /// Copy a template, replacing every occurrence of a literal string
    Render {
        /// Template
        from: PathBuf,
        /// Destination
        to: PathBuf,
        /// Text searched for
        needle: String,
        /// Replacement
        replacement: String,
    },
    /// Copy a file, creating the destination directory
    CopyFile {
        /// Source
        from: PathBuf,
        /// Destination file
        to: PathBuf,
    },
    /// Remove a file; a missing file is skipped
    RemoveFile(PathBuf),
    /// Point `link` at `target`, replacing whatever `link` was
    Symlink {
        /// What the link points to
        target: PathBuf,
        /// The link itself
        link: PathBuf,
    },
    /// Set permission bits
    Chmod {
        /// File or directory
        path: PathBuf,
        /// Mode, e.g. `0o755`
        mode: u32,
    },
    /// Restart a system service
    Restart(String),
    /// Start a system service at boot
    EnableAtBoot(String),
    /// Create a directory entry unless it already exists
    EnsureEntry(DirectoryEntry),
    /// Create or update a directory entry
    UpsertEntry(DirectoryEntry),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Run(cmd) => write!(f, "run `{}`", cmd),
            Self::CreateDir(path) => write!(f, "create directory {}", path.display()),
            Self::WriteFile { path, .. } => write!(f, "write {}", path.display()),
            Self::Render { from, to, .. } => {
                write!(f, "render {} to {}", from.display(), to.display())
            }
            Self::CopyFile { from, to } => write!(f, "copy {} to {}", from.display(), to.display()),
            Self::RemoveFile(path) => write!(f, "remove {}", path.display()),
            Self::Symlink { target, link } => {
                write!(f, "link {} to {}", link.display(), target.display())
            }
            Self::Chmod { path, mode } => write!(f, "chmod {:o} {}", mode, path.display()),
            Self::Restart(service) => write!(f, "restart {}", service),
            Self::EnableAtBoot(service) => write!(f, "enable {} at boot", service),
            Self::EnsureEntry(entry) => write!(f, "ensure entry {}", entry.rdn),
            Self::UpsertEntry(entry) => write!(f, "upsert entry {}", entry.rdn),
        }
    }
}

/// What applying a step did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step changed something
    Applied,
    /// Nothing to do
    Skipped,
}

/// A named, ordered list of steps
#[derive(Debug, Clone)]
pub struct Plan {
    /// Name used in logs and errors
    pub name: String,
    /// Key reported when the plan fails
    pub failure: MessageKey,
    /// Steps in execution order
    pub steps: Vec<Step>,
}

impl Plan {
    /// Create an empty plan
    pub fn new(name: impl Into<String>, failure: MessageKey) -> Self {
        Self {
            name: name.into(),
            failure,
            steps: Vec::new(),
        }
    }

    /// Append a step
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Append several steps
    pub fn steps(mut self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.steps.extend(steps);
        self
    }
}

/// A step that did not complete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    /// Position in the plan
    pub index: usize,
    /// Step description
    pub step: String,
    /// Underlying failure
    pub reason: String,
}

/// Outcome of a plan run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    /// Indices of steps that changed something
    pub applied: Vec<usize>,
    /// Indices of steps that had nothing to do
    pub skipped: Vec<usize>,
    /// Failed steps, best-effort runs only
    pub failures: Vec<StepFailure>,
}

/// Applies steps against the collaborators of a context
pub struct StepRunner<'a> {
    ctx: &'a AdminContext,
}

impl<'a> StepRunner<'a> {
    /// Create a runner for `ctx`
    pub fn new(ctx: &'a AdminContext) -> Self {
        Self { ctx }
    }

    /// Run every step in order, stopping at the first failure
    pub async fn execute(&self, plan: &Plan) -> Result<PlanReport> {
        let mut report = PlanReport::default();
        for (index, step) in plan.steps.iter().enumerate() {
            debug!(plan = %plan.name, index, %step, "applying step");
            match self.apply(step).await {
                Ok(StepOutcome::Applied) => report.applied.push(index),
                Ok(StepOutcome::Skipped) => report.skipped.push(index),
                Err(e) => {
                    error!(plan = %plan.name, index, %step, error = %e, "step failed");
                    return Err(Error::StepFailed {
                        plan: plan.name.clone(),
                        index,
                        step: step.to_string(),
                        reason: e.to_string(),
                        key: plan.failure,
                    });
                }
            }
        }
        Ok(report)
    }

    /// Run every step in order whatever happens, collecting failures
    pub async fn execute_best_effort(&self, plan: &Plan) -> PlanReport {
        let mut report = PlanReport::default();
        for (index, step) in plan.steps.iter().enumerate() {
            debug!(plan = %plan.name, index, %step, "applying step");
            match self.apply(step).await {
                Ok(StepOutcome::Applied) => report.applied.push(index),
                Ok(StepOutcome::Skipped) => report.skipped.push(index),
                Err(e) => {
                    warn!(plan = %plan.name, index, %step, error = %e, "step failed, continuing");
                    report.failures.push(StepFailure {
                        index,
                        step: step.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }

    /// Apply a single step
    pub async fn apply(&self, step: &Step) -> Result<StepOutcome> {
        match step {
            Step::Run(cmd) => {
                run_checked(self.ctx.runner.as_ref(), cmd).await?;
            }
            Step::CreateDir(path) => {
                if path.is_dir() {
                    return Ok(StepOutcome::Skipped);
                }
                std::fs::create_dir_all(path).map_err(Error::file(path))?;
            }
            Step::WriteFile { path, contents } => write_atomic(path, contents.as_bytes())?,
            Step::Render {
                from,
                to,
                needle,
                replacement,
            } => {
                let template = std::fs::read_to_string(from).map_err(Error::file(from))?;
                write_atomic(to, template.replace(needle.as_str(), replacement).as_bytes())?;
            }
            Step::CopyFile { from, to } => {
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent).map_err(Error::file(parent))?;
                }
                std::fs::copy(from, to).map_err(Error::file(from))?;
            }
            Step::RemoveFile(path) => match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Ok(StepOutcome::Skipped);
                }
                Err(e) => return Err(Error::file(path)(e)),
            },
            Step::Symlink { target, link } => replace_symlink(target, link)?,
            Step::Chmod { path, mode } => set_mode(path, *mode)?,
            Step::Restart(service) => self.ctx.services.restart(service).await?,
            Step::EnableAtBoot(service) => self.ctx.services.enable_at_boot(service).await?,
            Step::EnsureEntry(entry) => {
                if self.ctx.directory.exists(&entry.rdn).await? {
                    return Ok(StepOutcome::Skipped);
                }
                match self.ctx.directory.add(entry).await {
                    Ok(()) => {}
                    Err(Error::EntryExists(rdn)) => {
                        debug!(%rdn, "entry appeared concurrently");
                        return Ok(StepOutcome::Skipped);
                    }
                    Err(e) => return Err(e),
                }
            }
            Step::UpsertEntry(entry) => self.ctx.directory.update(entry).await?,
        }
        Ok(StepOutcome::Applied)
    }
}

fn replace_symlink(target: &std::path::Path, link: &std::path::Path) -> Result<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link).map_err(Error::file(link))?;
    }
    if let Some(parent) = link.parent() {
        std::fs::create_dir_all(parent).map_err(Error::file(parent))?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link).map_err(Error::file(link))?;
    #[cfg(not(unix))]
    std::fs::copy(target, link).map_err(Error::file(link))?;
    Ok(())
}
