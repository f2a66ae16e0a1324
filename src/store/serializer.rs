//! The operation serializer.
//!
//! Every repository interaction runs under one exclusive lock with a fixed
//! prelude and epilogue: resolve credentials, stash stray working-copy
//! changes, remember the branch and head, optionally reconcile with the
//! remote, run the body, commit when asked, restore the branch, push and
//! notify when something changed. Read operations serialize too: even a
//! read switches branches on the shared working copy.

use git2::Oid;

use super::{GitContext, GitDataStore};
use crate::credentials::Credentials;
use crate::error::StoreError;
use crate::repo::{CommitIdentity, GitRepo};

impl GitDataStore {
    /// Run a read-only operation. Skips the pull prelude.
    pub fn read_op<T>(
        &self,
        body: impl FnOnce(&GitRepo, &mut GitContext) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.git_operation(None, false, GitContext::new(), body)
    }

    /// Run a read/write operation with the pull prelude.
    pub fn write_op<T>(
        &self,
        body: impl FnOnce(&GitRepo, &mut GitContext) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.git_operation(None, true, GitContext::new(), body)
    }

    /// Run a read/write operation with an explicit author and context.
    pub fn write_op_with_identity<T>(
        &self,
        identity: Option<CommitIdentity>,
        pull_first: bool,
        ctx: GitContext,
        body: impl FnOnce(&GitRepo, &mut GitContext) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.git_operation(identity, pull_first, ctx, body)
    }

    fn git_operation<T>(
        &self,
        identity: Option<CommitIdentity>,
        pull_first: bool,
        mut ctx: GitContext,
        body: impl FnOnce(&GitRepo, &mut GitContext) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut slot = self.repo.lock().expect("operation lock");
        self.assert_active()?;
        let repo = slot.as_mut().ok_or(StoreError::NotActive)?;

        let credentials = self.resolve_credentials()?;
        let identity = identity.unwrap_or_else(|| repo.identity_from_config());

        if repo.has_head() {
            // Shelve stray files a prior failed operation may have left.
            repo.stash_work_tree(&identity, "Stash before a write")?;
        }
        let original_branch = repo.current_branch()?;
        let status_before = repo.head_id();

        if pull_first {
            self.reconcile(repo, credentials.as_ref(), &identity);
        }

        let repo: &GitRepo = repo;
        let value = match body(repo, &mut ctx) {
            Ok(value) => value,
            Err(e) => {
                // Keep the single-branch invariant even on the error path.
                if let Err(restore) = repo.checkout_local_branch(&original_branch, true) {
                    tracing::warn!(
                        error = %restore,
                        branch = %original_branch,
                        "failed to restore branch after operation error"
                    );
                }
                return Err(e);
            }
        };

        let mut require_push = ctx.is_require_push();
        if ctx.is_require_commit() {
            require_push = true;
            let message = ctx.commit_message();
            if message.is_empty() {
                tracing::warn!("operation requested a commit without a message; please add one");
            }
            repo.commit_index(&identity, message)?;
        }
        let branch_at_commit = repo.current_branch()?;

        repo.checkout_local_branch(&original_branch, false)?;

        if require_push || head_changed(status_before, repo.head_id()) {
            let push_branch = ctx.push_branch().unwrap_or(&branch_at_commit);
            self.clear_caches();
            self.push_to_remote(repo, push_branch, credentials.as_ref());
            self.fire_change_notifications();
        }
        Ok(value)
    }

    /// Current credentials: static settings in external mode, otherwise the
    /// deployment-provided source. Resolved fresh on every operation so
    /// rotation is automatic.
    fn resolve_credentials(&self) -> Result<Option<Credentials>, StoreError> {
        if self.settings.is_external()
            && let (Some(username), Some(password)) = (
                self.settings.remote_user.clone(),
                self.settings.remote_password.clone(),
            )
        {
            return Ok(Some(Credentials { username, password }));
        }
        match &self.credential_source {
            Some(source) => source.credentials().map(Some),
            None => Ok(None),
        }
    }

    /// Push `branch` upstream. Skipped quietly when no remote URL is
    /// configured. Failures are logged, never raised: the committed local
    /// state is the authoritative outcome of the operation.
    fn push_to_remote(&self, repo: &GitRepo, branch: &str, credentials: Option<&Credentials>) {
        let remote = self.remote_name();
        let url = match repo.config_string(&format!("remote.{remote}.url")) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read the remote url; not pushing");
                return;
            }
        };
        let Some(url) = url else {
            tracing::info!("no remote repository defined yet, so not doing a push");
            return;
        };
        if let Err(e) = repo.push(&remote, branch, credentials) {
            tracing::warn!(error = %e, url = %url, branch, "failed to push to the remote");
        }
    }
}

/// Value equality on commit ids, null-safe.
fn head_changed(before: Option<Oid>, after: Option<Oid>) -> bool {
    before != after
}
