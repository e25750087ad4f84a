//! Install error types and diagnostics.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::core::workspace::{REPO_CONFIG_NAME, TEMP_FOLDER_ENV};
use crate::util::diagnostic::{suggestions, Diagnostic};

/// Error during an install run.
#[derive(Debug, Error, MietteDiagnostic)]
pub enum InstallError {
    #[error("`{project}` depends on `{dependency}@{declared}`, but the workspace has `{dependency}@{local_version}`")]
    #[diagnostic(code(monorail::install::unsatisfiable_local_version))]
    UnsatisfiableLocalVersion {
        project: String,
        dependency: String,
        declared: String,
        local_version: String,
    },

    #[error("`{project}` depends on `{dependency}@{declared}`, which exists within the workspace")]
    #[diagnostic(code(monorail::install::mutation_not_authorized))]
    LockfileMutationNotAuthorized {
        project: String,
        dependency: String,
        declared: String,
    },

    #[error("`{project}` references `{dependency}@{declared}`, but no project named `{dependency}` exists")]
    #[diagnostic(code(monorail::install::unknown_workspace_reference))]
    UnknownWorkspaceReference {
        project: String,
        dependency: String,
        declared: String,
    },

    #[error("the lockfile is out of date")]
    #[diagnostic(code(monorail::install::lockfile_out_of_date))]
    LockfileOutOfDate { warnings: Vec<String> },

    #[error("the `{variable}` environment variable is not supported in workspace mode")]
    #[diagnostic(code(monorail::install::environment_override))]
    EnvironmentOverride { variable: String },

    #[error("variant `{variant}` is not declared in {}", REPO_CONFIG_NAME)]
    #[diagnostic(code(monorail::install::unknown_variant))]
    UnknownVariant { variant: String },

    #[error("could not find the package manager `{name}`")]
    #[diagnostic(code(monorail::install::package_manager_not_found))]
    PackageManagerNotFound { name: String },

    #[error("`{command}` failed after {attempts} attempt(s) (exit code {code})")]
    #[diagnostic(code(monorail::install::package_manager_failed))]
    PackageManagerFailed {
        command: String,
        attempts: u32,
        code: i32,
    },
}

impl InstallError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            InstallError::UnsatisfiableLocalVersion {
                project,
                dependency,
                declared,
                local_version,
            } => Diagnostic::error(self.to_string())
                .with_context(format!(
                    "`{}@{}` does not satisfy `{}`",
                    dependency, local_version, declared
                ))
                .with_suggestion(format!(
                    "Change the version of `{}` in `{}` to a range that includes {}",
                    dependency, project, local_version
                ))
                .with_suggestion(format!(
                    "Add `{}` to the cyclic-dependencies of `{}` in {} to keep consuming it from the registry",
                    dependency, project, REPO_CONFIG_NAME
                )),

            InstallError::LockfileMutationNotAuthorized {
                dependency,
                ..
            } => Diagnostic::error(self.to_string())
                .with_context(format!(
                    "the reference to `{}` must become a `workspace:` reference, which changes the lockfile",
                    dependency
                ))
                .with_suggestion(suggestions::FULL_UPDATE),

            InstallError::UnknownWorkspaceReference { project, dependency, .. } => {
                Diagnostic::error(self.to_string())
                    .with_suggestion(format!(
                        "Add `{}` to the projects in {}",
                        dependency, REPO_CONFIG_NAME
                    ))
                    .with_suggestion(format!(
                        "Replace the `workspace:` reference in `{}` with a registry version",
                        project
                    ))
            }

            InstallError::LockfileOutOfDate { warnings } => {
                let mut diag = Diagnostic::error(self.to_string());
                for warning in warnings {
                    diag = diag.with_context(warning.clone());
                }
                diag.with_suggestion(suggestions::STALE_LOCK)
            }

            InstallError::EnvironmentOverride { variable } => Diagnostic::error(self.to_string())
                .with_context("the shared temp folder location is derived from the repository root")
                .with_suggestion(format!("Unset `{}`", variable)),

            InstallError::UnknownVariant { variant } => Diagnostic::error(self.to_string())
                .with_suggestion(format!(
                    "Add \"{}\" to `variants` in {}, or drop `--variant`",
                    variant, REPO_CONFIG_NAME
                )),

            InstallError::PackageManagerNotFound { name } => Diagnostic::error(self.to_string())
                .with_suggestion(format!("Install `{}` and make sure it is on PATH", name))
                .with_suggestion(format!(
                    "Set `executable` under [package-manager] in {}",
                    REPO_CONFIG_NAME
                )),

            InstallError::PackageManagerFailed { .. } => {
                Diagnostic::error(self.to_string()).with_suggestion(suggestions::INSTALL_FAILED)
            }
        }
    }
}

/// The environment variable that conflicts with workspace installs.
pub fn environment_override_error() -> InstallError {
    InstallError::EnvironmentOverride {
        variable: TEMP_FOLDER_ENV.to_string(),
    }
}
