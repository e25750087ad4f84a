//! Running the package manager.
//!
//! The executor is a small state machine:
//!
//! ```text
//! Idle -> Preparing -> Invoking -> Succeeded
//!                         |  ^
//!                         v  |
//!                       Retrying
//!                         |
//!                         v
//!                       Failed
//! ```
//!
//! Process execution goes through [`ProcessRunner`] so that tests can stand
//! in for the package manager.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::core::workspace::RecoveryStrategy;
use crate::ops::install::errors::InstallError;
use crate::util::fs;
use crate::util::process::ProcessBuilder;
use crate::util::recycler::Recycler;

/// Runs a command to completion and reports its exit code.
pub trait ProcessRunner {
    fn run(&self, command: &ProcessBuilder) -> Result<i32>;
}

/// Runs commands as real child processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &ProcessBuilder) -> Result<i32> {
        let status = command.status()?;
        // killed by a signal
        Ok(status.code().unwrap_or(-1))
    }
}

/// Action taken between a failed attempt and the next one.
pub trait RecoveryHook {
    fn recover(&self, failed_attempt: u32) -> Result<()>;
}

/// Move the shared dependency-output directory aside. The content store is
/// left alone.
pub struct RecycleOutput<'a> {
    recycler: &'a Recycler,
    output_dir: PathBuf,
}

impl<'a> RecycleOutput<'a> {
    pub fn new(recycler: &'a Recycler, output_dir: impl Into<PathBuf>) -> Self {
        RecycleOutput {
            recycler,
            output_dir: output_dir.into(),
        }
    }
}

impl RecoveryHook for RecycleOutput<'_> {
    fn recover(&self, failed_attempt: u32) -> Result<()> {
        tracing::info!(
            "Attempt {} failed; recycling {} before retrying",
            failed_attempt,
            self.output_dir.display()
        );
        self.recycler.recycle(&self.output_dir)?;
        Ok(())
    }
}

/// Retry without touching anything.
pub struct NoRecovery;

impl RecoveryHook for NoRecovery {
    fn recover(&self, failed_attempt: u32) -> Result<()> {
        tracing::info!("Attempt {} failed; retrying", failed_attempt);
        Ok(())
    }
}

/// The hook for a configured strategy.
pub fn recovery_for<'a>(
    strategy: RecoveryStrategy,
    recycler: &'a Recycler,
    output_dir: &Path,
) -> Box<dyn RecoveryHook + 'a> {
    match strategy {
        RecoveryStrategy::RecycleOutput => Box::new(RecycleOutput::new(recycler, output_dir)),
        RecoveryStrategy::None => Box::new(NoRecovery),
    }
}

/// Where the executor is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    Preparing,
    Invoking { attempt: u32 },
    Retrying { attempt: u32 },
    Succeeded { attempts: u32 },
    Failed { attempts: u32, code: i32 },
}

impl fmt::Display for ExecutorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutorState::Idle => write!(f, "idle"),
            ExecutorState::Preparing => write!(f, "preparing"),
            ExecutorState::Invoking { attempt } => write!(f, "invoking (attempt {})", attempt),
            ExecutorState::Retrying { attempt } => write!(f, "retrying after attempt {}", attempt),
            ExecutorState::Succeeded { attempts } => {
                write!(f, "succeeded after {} attempt(s)", attempts)
            }
            ExecutorState::Failed { attempts, code } => {
                write!(f, "failed after {} attempt(s) with code {}", attempts, code)
            }
        }
    }
}

/// One package-manager run.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// The fully built command, environment and working directory included.
    pub command: ProcessBuilder,
    pub max_attempts: u32,
    /// Start from an empty shared output directory.
    pub purge: bool,
    /// The shared dependency-output directory.
    pub output_dir: PathBuf,
    /// The local content store; `None` when the global store is used.
    pub local_store: Option<PathBuf>,
    /// Per-project dependency-output directories to create on success.
    pub project_output_dirs: Vec<PathBuf>,
}

/// Drives an [`Invocation`] through its states.
pub struct InstallExecutor<'a> {
    runner: &'a dyn ProcessRunner,
    recovery: Box<dyn RecoveryHook + 'a>,
    recycler: &'a Recycler,
    state: ExecutorState,
    history: Vec<ExecutorState>,
}

impl<'a> InstallExecutor<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        recovery: Box<dyn RecoveryHook + 'a>,
        recycler: &'a Recycler,
    ) -> Self {
        InstallExecutor {
            runner,
            recovery,
            recycler,
            state: ExecutorState::Idle,
            history: vec![ExecutorState::Idle],
        }
    }

    /// The current state.
    pub fn state(&self) -> ExecutorState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[ExecutorState] {
        &self.history
    }

    fn transition(&mut self, next: ExecutorState) {
        tracing::debug!("Install executor: {} -> {}", self.state, next);
        self.state = next;
        self.history.push(next);
    }

    /// Run the package manager. Returns the number of attempts on success.
    pub fn run(&mut self, invocation: &Invocation) -> Result<u32> {
        self.transition(ExecutorState::Preparing);
        if invocation.purge {
            tracing::info!("Removing {} for a clean install", invocation.output_dir.display());
            self.recycler.recycle(&invocation.output_dir)?;
            fs::ensure_dir(&invocation.output_dir)?;
        }

        let max_attempts = invocation.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            self.transition(ExecutorState::Invoking { attempt });
            tracing::info!(
                "Invoking `{}` (attempt {} of {})",
                invocation.command.display_command(),
                attempt,
                max_attempts
            );

            let code = self.runner.run(&invocation.command)?;
            if code == 0 {
                self.transition(ExecutorState::Succeeded { attempts: attempt });
                break;
            }

            if attempt < max_attempts {
                self.transition(ExecutorState::Retrying { attempt });
                self.recovery.recover(attempt)?;
                attempt += 1;
                continue;
            }

            self.transition(ExecutorState::Failed {
                attempts: attempt,
                code,
            });
            if let Some(store) = &invocation.local_store {
                tracing::warn!(
                    "The package manager failed {} time(s); recycling the local store {} in case it is corrupted",
                    attempt,
                    store.display()
                );
                if let Err(e) = self.recycler.recycle(store) {
                    tracing::warn!("Could not recycle {}: {:#}", store.display(), e);
                }
            }
            return Err(InstallError::PackageManagerFailed {
                command: invocation.command.display_command(),
                attempts: attempt,
                code,
            }
            .into());
        }

        fs::ensure_dir(&invocation.output_dir)?;
        for dir in &invocation.project_output_dirs {
            fs::ensure_dir(dir)?;
        }

        Ok(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::StubRunner;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct CountingRecovery<'a>(&'a Cell<u32>);

    impl RecoveryHook for CountingRecovery<'_> {
        fn recover(&self, _failed_attempt: u32) -> Result<()> {
            self.0.set(self.0.get() + 1);
            Ok(())
        }
    }

    fn invocation(tmp: &TempDir, max_attempts: u32) -> Invocation {
        Invocation {
            command: ProcessBuilder::new("pnpm").arg("install").cwd(tmp.path()),
            max_attempts,
            purge: false,
            output_dir: tmp.path().join("node_modules"),
            local_store: Some(tmp.path().join("pnpm-store")),
            project_output_dirs: vec![tmp.path().join("packages/a/node_modules")],
        }
    }

    #[test]
    fn test_retry_invokes_recovery_n_minus_one_times() {
        let tmp = TempDir::new().unwrap();
        let recycler = Recycler::new(tmp.path().join("recycler"));
        let runner = StubRunner::failing(2);
        let recoveries = Cell::new(0);

        let mut executor =
            InstallExecutor::new(&runner, Box::new(CountingRecovery(&recoveries)), &recycler);
        let attempts = executor.run(&invocation(&tmp, 3)).unwrap();

        assert_eq!(attempts, 3);
        assert_eq!(runner.calls(), 3);
        assert_eq!(recoveries.get(), 2);
        assert_eq!(executor.state(), ExecutorState::Succeeded { attempts: 3 });
        assert!(tmp.path().join("packages/a/node_modules").is_dir());
    }

    #[test]
    fn test_exhausted_retries_recycle_local_store() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("pnpm-store/v3")).unwrap();
        let recycler = Recycler::new(tmp.path().join("recycler"));
        let runner = StubRunner::failing(5);

        let mut executor = InstallExecutor::new(&runner, Box::new(NoRecovery), &recycler);
        let err = executor.run(&invocation(&tmp, 2)).unwrap_err();

        let install_err = err.downcast_ref::<InstallError>().unwrap();
        assert!(matches!(
            install_err,
            InstallError::PackageManagerFailed { attempts: 2, code: 1, .. }
        ));
        assert_eq!(runner.calls(), 2);
        assert!(!tmp.path().join("pnpm-store").exists());
        assert_eq!(
            executor.history(),
            &[
                ExecutorState::Idle,
                ExecutorState::Preparing,
                ExecutorState::Invoking { attempt: 1 },
                ExecutorState::Retrying { attempt: 1 },
                ExecutorState::Invoking { attempt: 2 },
                ExecutorState::Failed { attempts: 2, code: 1 },
            ]
        );
    }

    #[test]
    fn test_recycle_output_keeps_store() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/.pnpm")).unwrap();
        std::fs::create_dir_all(tmp.path().join("pnpm-store")).unwrap();
        let recycler = Recycler::new(tmp.path().join("recycler"));
        let runner = StubRunner::failing(1);

        let hook = recovery_for(
            RecoveryStrategy::RecycleOutput,
            &recycler,
            &tmp.path().join("node_modules"),
        );
        let mut executor = InstallExecutor::new(&runner, hook, &recycler);
        executor.run(&invocation(&tmp, 2)).unwrap();

        assert!(tmp.path().join("pnpm-store").is_dir());
        assert!(!tmp.path().join("node_modules/.pnpm").exists());
        assert!(tmp.path().join("node_modules").is_dir());
    }

    #[test]
    fn test_purge_starts_from_empty_output() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("node_modules/stale")).unwrap();
        let recycler = Recycler::new(tmp.path().join("recycler"));
        let runner = StubRunner::succeeding();

        let mut inv = invocation(&tmp, 1);
        inv.purge = true;
        let mut executor = InstallExecutor::new(&runner, Box::new(NoRecovery), &recycler);
        executor.run(&inv).unwrap();

        assert!(tmp.path().join("node_modules").is_dir());
        assert!(!tmp.path().join("node_modules/stale").exists());
    }
}
