//! Branch context
//!
//! The authoring branch is resolved once at command startup and passed
//! explicitly through the call chain, never read from ambient state at
//! arbitrary depth.

use std::process::Command;
use tracing::warn;

/// The branch a command runs under. Carried by value so every consumer sees
/// the same resolution, including the degraded empty-string case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchContext {
    branch: String,
}

impl BranchContext {
    /// Resolve the current git branch.
    ///
    /// Resolution failure (not a repository, git missing, detached output
    /// unreadable) degrades to an empty branch name with a warning; it is
    /// never surfaced as an error. Downstream logic treats `""` as a valid,
    /// if degenerate, branch tag.
    pub fn detect() -> Self {
        let output = Command::new("git")
            .args(["rev-parse", "--abbrev-ref", "HEAD"])
            .output();

        let branch = match output {
            Ok(out) if out.status.success() => {
                String::from_utf8_lossy(&out.stdout).trim().to_string()
            }
            Ok(out) => {
                warn!(
                    "Failed to resolve current git branch (git exited with {}); \
                     falling back to empty branch tag",
                    out.status
                );
                String::new()
            }
            Err(e) => {
                warn!(
                    "Failed to resolve current git branch ({}); \
                     falling back to empty branch tag",
                    e
                );
                String::new()
            }
        };

        Self { branch }
    }

    /// Build a context for a known branch name (used by tests and tooling).
    pub fn from_branch(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
        }
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// Whether this branch is in the protected set (squash guard).
    pub fn is_protected(&self, protected: &[String]) -> bool {
        protected.iter().any(|p| p == &self.branch)
    }
}
