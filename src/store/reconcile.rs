//! Remote reconciliation.
//!
//! The pull prelude. Fetches from the configured remote and converges the
//! local branch set toward it: branches gone from a non-empty remote are
//! deleted (never `master`), branches new on the remote become local
//! tracking branches, and divergent branches are merged with the remote
//! side authoritative. Failures never escape; the committed local state
//! always survives a bad remote.

use std::collections::BTreeSet;

use super::GitDataStore;
use crate::credentials::Credentials;
use crate::error::StoreError;
use crate::profiles::MASTER_BRANCH;
use crate::repo::{CommitIdentity, GitRepo, MergeOutcome};

/// Scratch branch names are invisible to reconciliation.
const TMP_BRANCH_SUFFIX: &str = "-tmp";

impl GitDataStore {
    /// Converge the local branch set toward the remote. Errors are logged
    /// and swallowed.
    pub(crate) fn reconcile(
        &self,
        repo: &GitRepo,
        credentials: Option<&Credentials>,
        identity: &CommitIdentity,
    ) {
        if let Err(e) = self.try_reconcile(repo, credentials, identity) {
            tracing::error!(error = %e, "failed to pull from the remote git repo");
        }
    }

    fn try_reconcile(
        &self,
        repo: &GitRepo,
        credentials: Option<&Credentials>,
        identity: &CommitIdentity,
    ) -> Result<(), StoreError> {
        let remote = self.remote_name();
        let Some(url) = repo.config_string(&format!("remote.{remote}.url"))? else {
            tracing::debug!("no remote repository defined, so not doing a pull");
            return Ok(());
        };
        tracing::debug!(url = %url, "fetching from the remote repository");
        if let Err(e) = repo.fetch(&remote, credentials) {
            tracing::debug!(error = %e, "fetch failed; ignoring");
            return Ok(());
        }

        let local_branches: std::collections::BTreeMap<_, _> = repo
            .local_branches()?
            .into_iter()
            .filter(|(name, _)| !name.ends_with(TMP_BRANCH_SUFFIX))
            .collect();
        let remote_branches: std::collections::BTreeMap<_, _> = repo
            .remote_branches(&remote)?
            .into_iter()
            .filter(|(name, _)| !name.ends_with(TMP_BRANCH_SUFFIX))
            .collect();

        let git_versions: BTreeSet<&String> =
            local_branches.keys().chain(remote_branches.keys()).collect();

        let mut has_changed = false;
        for version in git_versions {
            match (local_branches.get(version), remote_branches.get(version)) {
                // Gone from a non-empty remote: drop it locally, except
                // master.
                (Some(_), None) => {
                    if remote_branches.is_empty() || version.as_str() == MASTER_BRANCH {
                        continue;
                    }
                    if repo.delete_branch(version).is_err() {
                        // Deleting the checked-out branch: park on master
                        // first.
                        repo.checkout_local_branch(MASTER_BRANCH, true)?;
                        repo.delete_branch(version)?;
                    }
                    has_changed = true;
                }
                // New on the remote: track it.
                (None, Some(_)) => {
                    repo.create_tracking_branch(version, &remote)?;
                    has_changed = true;
                }
                // Present on both and divergent: remote wins.
                (Some(local_id), Some(remote_id)) if local_id != remote_id => {
                    repo.clean_untracked()?;
                    repo.discard_worktree()?;
                    repo.checkout_local_branch(version, true)?;
                    if repo.merge_theirs(*remote_id, identity)? != MergeOutcome::AlreadyUpToDate
                    {
                        has_changed = true;
                    }
                }
                _ => {}
            }
        }

        if has_changed {
            tracing::debug!("changed after pull");
            self.fire_change_notifications();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tempfile::TempDir;

    use crate::coordination::MemoryAttributeStore;
    use crate::listener::ChangeListener;
    use crate::repo::{CommitIdentity, GitRepo};
    use crate::settings::StoreSettings;
    use crate::store::GitDataStore;

    fn identity() -> CommitIdentity {
        CommitIdentity::new("tester", "tester@localhost")
    }

    /// A local clone wired to a bare upstream, plus a second clone acting as
    /// the "other writer" pushing into the upstream.
    struct Fixture {
        _dirs: (TempDir, TempDir, TempDir),
        store: Arc<GitDataStore>,
        writer: GitRepo,
        fired: Arc<AtomicUsize>,
    }

    fn fixture() -> Fixture {
        let upstream_dir = TempDir::new().unwrap();
        git2::Repository::init_bare(upstream_dir.path()).unwrap();
        let upstream_url = upstream_dir.path().to_string_lossy().into_owned();

        // Seed the upstream through a writer clone.
        let writer_dir = TempDir::new().unwrap();
        let writer = GitRepo::init(writer_dir.path()).unwrap();
        writer
            .set_config("remote.origin.url", &upstream_url)
            .unwrap();
        writer
            .set_config("remote.origin.fetch", "+refs/heads/*:refs/remotes/origin/*")
            .unwrap();
        fs::write(writer.workdir().join("README.md"), b"fabric\n").unwrap();
        writer.add_path(Path::new("README.md")).unwrap();
        writer.commit_index(&identity(), "Initial import").unwrap();
        writer.push("origin", "master", None).unwrap();

        // The store's local clone.
        let local_dir = TempDir::new().unwrap();
        let local = GitRepo::init(local_dir.path()).unwrap();
        local.set_config("remote.origin.url", &upstream_url).unwrap();
        local
            .set_config("remote.origin.fetch", "+refs/heads/*:refs/remotes/origin/*")
            .unwrap();
        local.fetch("origin", None).unwrap();
        local.create_tracking_branch("master", "origin").unwrap();

        let settings = StoreSettings {
            pull_period_ms: 60_000,
            ..Default::default()
        };
        let store = GitDataStore::new(settings, Arc::new(MemoryAttributeStore::new()), None);
        store.bind_repository(local);
        store.start().unwrap();

        let fired = Arc::new(AtomicUsize::new(0));
        let listener = {
            let fired = fired.clone();
            Arc::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }) as Arc<dyn ChangeListener>
        };
        store.bind_listener(listener);

        Fixture {
            _dirs: (upstream_dir, writer_dir, local_dir),
            store,
            writer,
            fired,
        }
    }

    fn advance_writer(writer: &GitRepo, branch: &str, file: &str, contents: &[u8]) {
        writer.checkout_branch(branch, "origin").unwrap();
        fs::write(writer.workdir().join(file), contents).unwrap();
        writer.add_path(Path::new(file)).unwrap();
        writer
            .commit_index(&identity(), &format!("update {file}"))
            .unwrap();
        writer.push("origin", branch, None).unwrap();
    }

    #[test]
    fn tracks_branches_new_on_the_remote() {
        let f = fixture();
        advance_writer(&f.writer, "1.0", "a.txt", b"x");

        f.store.pull();
        let branches = f
            .store
            .read_op(|repo, _ctx| repo.local_branches())
            .unwrap();
        assert!(branches.contains_key("1.0"));
        assert!(f.fired.load(Ordering::SeqCst) >= 1);
        f.store.stop();
    }

    #[test]
    fn theirs_merge_fires_exactly_once_per_tick() {
        let f = fixture();
        // Establish local tracking of 1.0, then advance it remotely while
        // the working copy sits idle on master.
        advance_writer(&f.writer, "1.0", "a.txt", b"v1\n");
        f.store.pull();
        advance_writer(&f.writer, "1.0", "config.txt", b"remote wins\n");

        f.fired.store(0, Ordering::SeqCst);
        f.store.pull();
        assert_eq!(f.fired.load(Ordering::SeqCst), 1);

        let contents = f
            .store
            .read_op(|repo, _ctx| {
                repo.checkout_local_branch("1.0", false)?;
                Ok(fs::read(repo.workdir().join("config.txt"))?)
            })
            .unwrap();
        assert_eq!(contents, b"remote wins\n");

        // A second tick with no remote movement stays quiet.
        f.fired.store(0, Ordering::SeqCst);
        f.store.pull();
        assert_eq!(f.fired.load(Ordering::SeqCst), 0);
        f.store.stop();
    }

    #[test]
    fn remote_deleted_branches_are_dropped_but_never_master() {
        let f = fixture();
        advance_writer(&f.writer, "1.0", "a.txt", b"a");
        f.store.pull();
        assert!(
            f.store
                .read_op(|repo, _ctx| repo.local_branches())
                .unwrap()
                .contains_key("1.0")
        );

        // Delete 1.0 on the upstream by pushing a deletion refspec.
        let upstream = git2::Repository::open_bare(f._dirs.0.path()).unwrap();
        upstream
            .find_reference("refs/heads/1.0")
            .unwrap()
            .delete()
            .unwrap();

        f.store.pull();
        let branches = f
            .store
            .read_op(|repo, _ctx| repo.local_branches())
            .unwrap();
        assert!(!branches.contains_key("1.0"));
        assert!(branches.contains_key("master"));
        f.store.stop();
    }

    #[test]
    fn scratch_branches_are_invisible() {
        let f = fixture();
        advance_writer(&f.writer, "1.1-tmp", "scratch.txt", b"s");

        f.store.pull();
        let branches = f
            .store
            .read_op(|repo, _ctx| repo.local_branches())
            .unwrap();
        assert!(!branches.contains_key("1.1-tmp"));
        f.store.stop();
    }

    #[test]
    fn empty_remote_deletes_nothing() {
        // A store with local branches but a remote that has no branches at
        // all: reconciliation must not delete anything.
        let upstream_dir = TempDir::new().unwrap();
        git2::Repository::init_bare(upstream_dir.path()).unwrap();
        let upstream_url = upstream_dir.path().to_string_lossy().into_owned();

        let local_dir = TempDir::new().unwrap();
        let local = GitRepo::init(local_dir.path()).unwrap();
        local.set_config("remote.origin.url", &upstream_url).unwrap();
        local
            .set_config("remote.origin.fetch", "+refs/heads/*:refs/remotes/origin/*")
            .unwrap();
        fs::write(local.workdir().join("README.md"), b"fabric\n").unwrap();
        local.add_path(Path::new("README.md")).unwrap();
        local.commit_index(&identity(), "Initial import").unwrap();
        local.checkout_branch("1.0", "origin").unwrap();
        local.checkout_local_branch("master", false).unwrap();

        let settings = StoreSettings {
            pull_period_ms: 60_000,
            ..Default::default()
        };
        let store = GitDataStore::new(settings, Arc::new(MemoryAttributeStore::new()), None);
        store.bind_repository(local);
        store.start().unwrap();

        store.pull();
        let branches = store.read_op(|repo, _ctx| repo.local_branches()).unwrap();
        assert!(branches.contains_key("1.0"));
        assert!(branches.contains_key("master"));
        store.stop();
    }
}
