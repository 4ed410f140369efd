//! Commit-driven triggering

use gantry_core::domain::commit::Commit;
use gantry_core::domain::run::RunId;

/// Decides which branches trigger a run automatically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPolicy {
    pub auto_trigger_branches: Vec<String>,
}

impl BranchPolicy {
    pub fn new(branches: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            auto_trigger_branches: branches.into_iter().map(Into::into).collect(),
        }
    }

    pub fn should_trigger(&self, commit: &Commit) -> bool {
        self.auto_trigger_branches.iter().any(|b| *b == commit.branch)
    }
}

impl Default for BranchPolicy {
    fn default() -> Self {
        Self::new(["main", "develop"])
    }
}

/// What the engine did with a commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    /// A run was started for the commit
    Triggered(RunId),
    /// The branch does not auto-trigger; the commit waits for a merge request
    Deferred,
    /// The branch auto-triggers but the engine was busy
    Skipped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_branches() {
        let policy = BranchPolicy::default();
        assert!(policy.should_trigger(&Commit::new("abc", "main", "fix")));
        assert!(policy.should_trigger(&Commit::new("abc", "develop", "feat")));
        assert!(!policy.should_trigger(&Commit::new("abc", "feature/login", "wip")));
    }

    #[test]
    fn test_custom_policy() {
        let policy = BranchPolicy::new(["release"]);
        assert!(policy.should_trigger(&Commit::new("abc", "release", "v2")));
        assert!(!policy.should_trigger(&Commit::new("abc", "main", "fix")));
    }
}
