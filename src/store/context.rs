//! Per-operation scratchpad.

/// Decision record carried through one serialized operation.
///
/// The operation body acts as the builder side (`require_push`,
/// `commit`, `set_push_branch`); the serializer reads the flags when the
/// body returns to decide whether to commit, which branch to push, and
/// whether to notify listeners.
#[derive(Debug, Default)]
pub struct GitContext {
    require_push: bool,
    require_commit: bool,
    commit_message: String,
    push_branch: Option<String>,
}

impl GitContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push after the operation even if no commit was made.
    pub fn require_push(&mut self) {
        self.require_push = true;
    }

    /// Commit with `message` when the operation body returns. Repeated
    /// calls accumulate into one commit message.
    pub fn commit(&mut self, message: impl AsRef<str>) {
        self.require_commit = true;
        self.commit_message.push_str(message.as_ref());
    }

    /// Push to `branch` instead of the branch checked out at commit time.
    pub fn set_push_branch(&mut self, branch: impl Into<String>) {
        self.push_branch = Some(branch.into());
    }

    pub fn is_require_push(&self) -> bool {
        self.require_push
    }

    pub fn is_require_commit(&self) -> bool {
        self.require_commit
    }

    pub fn commit_message(&self) -> &str {
        &self.commit_message
    }

    pub fn push_branch(&self) -> Option<&str> {
        self.push_branch.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_accumulates_message() {
        let mut ctx = GitContext::new();
        assert!(!ctx.is_require_commit());
        ctx.commit("Added profile a");
        ctx.commit("; removed profile b");
        assert!(ctx.is_require_commit());
        assert_eq!(ctx.commit_message(), "Added profile a; removed profile b");
    }

    #[test]
    fn push_branch_overrides() {
        let mut ctx = GitContext::new();
        assert!(ctx.push_branch().is_none());
        ctx.set_push_branch("1.0");
        assert_eq!(ctx.push_branch(), Some("1.0"));
    }
}
