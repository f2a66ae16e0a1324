//! Repository handle.
//!
//! `GitRepo` owns the on-disk working copy and exposes the narrow set of
//! primitives the store composes: branch checkout/create/delete, staging,
//! commit, stash, clean, fetch/push with credential callbacks, a
//! remote-wins merge, and read-only history access. `git2` types stay inside
//! this module; callers see domain errors and plain data.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    BranchType, Commit, Cred, DiffFormat, DiffOptions, ErrorCode, FetchOptions, IndexAddOption,
    ObjectType, Oid, PushOptions, RemoteCallbacks, Repository, RepositoryInitOptions, Signature,
    Sort, StashFlags, StatusOptions,
};

use crate::credentials::Credentials;
use crate::error::StoreError;
use crate::profiles::MASTER_BRANCH;

/// Author/committer identity for commits created by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl CommitIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    fn signature(&self) -> Result<Signature<'static>, StoreError> {
        Ok(Signature::now(&self.name, &self.email)?)
    }
}

/// One commit of interest from the history surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    pub id: String,
    pub author: String,
    pub email: String,
    pub time_secs: i64,
    pub message: String,
}

/// Outcome of a remote-wins merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The local branch already contains the remote commit.
    AlreadyUpToDate,
    /// The local branch was behind and moved forward to the remote commit.
    FastForward,
    /// Histories diverged; a merge commit carrying the remote tree was made.
    Merged,
}

pub struct GitRepo {
    inner: Repository,
    workdir: PathBuf,
}

impl GitRepo {
    /// Open an existing repository with a working copy at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let inner = Repository::open(path)
            .map_err(|e| StoreError::OpenRepo(path.to_path_buf(), e))?;
        Self::from_repository(inner, path)
    }

    /// Initialize a new repository at `path` with `master` as the initial
    /// branch.
    pub fn init(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(MASTER_BRANCH);
        let inner = Repository::init_opts(path, &opts)
            .map_err(|e| StoreError::OpenRepo(path.to_path_buf(), e))?;
        Self::from_repository(inner, path)
    }

    fn from_repository(inner: Repository, path: &Path) -> Result<Self, StoreError> {
        let workdir = inner
            .workdir()
            .ok_or_else(|| {
                StoreError::OpenRepo(
                    path.to_path_buf(),
                    git2::Error::from_str("bare repository has no working copy"),
                )
            })?
            .to_path_buf();
        Ok(Self { inner, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Express `path` relative to the working copy root.
    pub fn relative_path(&self, path: &Path) -> Result<PathBuf, StoreError> {
        let rel = path.strip_prefix(&self.workdir).map_err(|_| {
            StoreError::Io(std::io::Error::other(format!(
                "{} is outside the working copy",
                path.display()
            )))
        })?;
        Ok(rel.to_path_buf())
    }

    // === HEAD and branches ===

    /// Whether the repository has at least one commit.
    pub fn has_head(&self) -> bool {
        self.head_id().is_some()
    }

    /// The commit id HEAD resolves to, if any.
    pub fn head_id(&self) -> Option<Oid> {
        self.inner.head().ok().and_then(|head| head.target())
    }

    /// Name of the branch HEAD points at.
    pub fn current_branch(&self) -> Result<String, StoreError> {
        let head = self.inner.find_reference("HEAD")?;
        let target = head
            .symbolic_target()
            .ok_or_else(|| StoreError::BranchNotFound("HEAD is detached".into()))?;
        Ok(target.trim_start_matches("refs/heads/").to_string())
    }

    /// Local branch names and their tips.
    pub fn local_branches(&self) -> Result<BTreeMap<String, Oid>, StoreError> {
        let mut branches = BTreeMap::new();
        for entry in self.inner.branches(Some(BranchType::Local))? {
            let (branch, _) = entry?;
            if let Some(name) = branch.name()?
                && let Some(oid) = branch.get().target()
            {
                branches.insert(name.to_string(), oid);
            }
        }
        Ok(branches)
    }

    /// Remote-tracking branch names (stripped of the `<remote>/` prefix) and
    /// their tips. `<remote>/HEAD` is skipped.
    pub fn remote_branches(&self, remote: &str) -> Result<BTreeMap<String, Oid>, StoreError> {
        let prefix = format!("{remote}/");
        let mut branches = BTreeMap::new();
        for entry in self.inner.branches(Some(BranchType::Remote))? {
            let (branch, _) = entry?;
            if let Some(full) = branch.name()?
                && let Some(name) = full.strip_prefix(&prefix)
                && name != "HEAD"
                && let Some(oid) = branch.get().target()
            {
                branches.insert(name.to_string(), oid);
            }
        }
        Ok(branches)
    }

    pub fn branch_id(&self, name: &str) -> Option<Oid> {
        self.inner
            .find_branch(name, BranchType::Local)
            .ok()
            .and_then(|b| b.get().target())
    }

    /// Check out `branch`, creating it if necessary: an existing local branch
    /// is checked out as-is, a branch known on `remote` becomes a local
    /// tracking branch, and otherwise a new branch is started at HEAD.
    pub fn checkout_branch(&self, branch: &str, remote: &str) -> Result<(), StoreError> {
        if !self.has_head() {
            // Unborn repository: point HEAD at the branch so the first
            // commit lands there.
            self.inner.set_head(&format!("refs/heads/{branch}"))?;
            return Ok(());
        }
        if self.current_branch()? == branch {
            return Ok(());
        }
        if self.inner.find_branch(branch, BranchType::Local).is_ok() {
            return self.checkout_local_branch(branch, false);
        }
        let remote_name = format!("{remote}/{branch}");
        if self.inner.find_branch(&remote_name, BranchType::Remote).is_ok() {
            return self.create_tracking_branch(branch, remote);
        }
        let head = self.inner.head()?.peel_to_commit()?;
        self.inner.branch(branch, &head, false)?;
        self.checkout_local_branch(branch, false)
    }

    /// Create (or reset) a local branch tracking `<remote>/<branch>` and
    /// check it out.
    pub fn create_tracking_branch(&self, branch: &str, remote: &str) -> Result<(), StoreError> {
        let remote_name = format!("{remote}/{branch}");
        let remote_branch = self
            .inner
            .find_branch(&remote_name, BranchType::Remote)
            .map_err(|_| StoreError::BranchNotFound(remote_name.clone()))?;
        let target = remote_branch.get().peel_to_commit()?;
        let mut local = self.inner.branch(branch, &target, true)?;
        local.set_upstream(Some(&remote_name))?;
        self.checkout_local_branch(branch, true)
    }

    /// Check out an existing local branch; `force` discards worktree edits.
    pub fn checkout_local_branch(&self, branch: &str, force: bool) -> Result<(), StoreError> {
        let reference = self
            .inner
            .find_branch(branch, BranchType::Local)
            .map_err(|_| StoreError::BranchNotFound(branch.to_string()))?
            .into_reference();
        let object = reference.peel(ObjectType::Commit)?;
        let mut opts = CheckoutBuilder::new();
        if force {
            opts.force();
        }
        self.inner.checkout_tree(&object, Some(&mut opts))?;
        self.inner.set_head(&format!("refs/heads/{branch}"))?;
        Ok(())
    }

    /// Delete a local branch. Fails while the branch is checked out.
    pub fn delete_branch(&self, name: &str) -> Result<(), StoreError> {
        let mut branch = self
            .inner
            .find_branch(name, BranchType::Local)
            .map_err(|_| StoreError::BranchNotFound(name.to_string()))?;
        Ok(branch.delete()?)
    }

    // === Working copy ===

    /// Reset tracked files in the working copy back to HEAD.
    pub fn discard_worktree(&self) -> Result<(), StoreError> {
        let mut opts = CheckoutBuilder::new();
        opts.force();
        Ok(self.inner.checkout_head(Some(&mut opts))?)
    }

    /// Remove untracked files, including untracked directories.
    pub fn clean_untracked(&self) -> Result<(), StoreError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self.inner.statuses(Some(&mut opts))?;
        for entry in statuses.iter() {
            if !entry.status().is_wt_new() {
                continue;
            }
            let Some(rel) = entry.path() else { continue };
            let path = self.workdir.join(rel);
            if path.is_dir() {
                fs::remove_dir_all(&path)?;
            } else if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Shelve any working-copy changes. Returns `None` when there was
    /// nothing to stash.
    pub fn stash_work_tree(
        &mut self,
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<Option<Oid>, StoreError> {
        let sig = identity.signature()?;
        match self
            .inner
            .stash_save(&sig, message, Some(StashFlags::INCLUDE_UNTRACKED))
        {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stage `relative` (a file or a directory tree).
    pub fn add_path(&self, relative: &Path) -> Result<(), StoreError> {
        let mut index = self.inner.index()?;
        if self.workdir.join(relative).is_dir() {
            index.add_all([relative], IndexAddOption::DEFAULT, None)?;
        } else {
            index.add_path(relative)?;
        }
        index.write()?;
        Ok(())
    }

    /// Unstage and forget `relative` (a file or a directory tree).
    pub fn rm_path(&self, relative: &Path) -> Result<(), StoreError> {
        let mut index = self.inner.index()?;
        index.remove_all([relative], None)?;
        index.write()?;
        Ok(())
    }

    /// Commit the staged index onto the current branch.
    pub fn commit_index(
        &self,
        identity: &CommitIdentity,
        message: &str,
    ) -> Result<Oid, StoreError> {
        let sig = identity.signature()?;
        let mut index = self.inner.index()?;
        let tree_oid = index.write_tree()?;
        let tree = self.inner.find_tree(tree_oid)?;
        let parent = match self.head_id() {
            Some(oid) => Some(self.inner.find_commit(oid)?),
            None => None,
        };
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        Ok(self
            .inner
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?)
    }

    // === Remote interaction ===

    pub fn fetch(&self, remote: &str, creds: Option<&Credentials>) -> Result<(), StoreError> {
        let mut remote = self.inner.find_remote(remote).map_err(StoreError::Fetch)?;
        let mut opts = FetchOptions::new();
        opts.remote_callbacks(Self::callbacks(creds.cloned()));
        opts.prune(git2::FetchPrune::On);
        remote
            .fetch(&[] as &[&str], Some(&mut opts), None)
            .map_err(StoreError::Fetch)
    }

    pub fn push(
        &self,
        remote: &str,
        branch: &str,
        creds: Option<&Credentials>,
    ) -> Result<(), StoreError> {
        let mut remote = self.inner.find_remote(remote).map_err(StoreError::Push)?;
        let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
        let mut opts = PushOptions::new();
        opts.remote_callbacks(Self::callbacks(creds.cloned()));
        remote
            .push(&[refspec.as_str()], Some(&mut opts))
            .map_err(StoreError::Push)
    }

    fn callbacks(creds: Option<Credentials>) -> RemoteCallbacks<'static> {
        let mut callbacks = RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed| {
            if allowed.is_user_pass_plaintext()
                && let Some(c) = creds.as_ref()
            {
                return Cred::userpass_plaintext(&c.username, &c.password);
            }
            if allowed.is_ssh_key()
                && let Some(user) = username_from_url
            {
                return Cred::ssh_key_from_agent(user);
            }
            Cred::default()
        });
        callbacks
    }

    /// Merge `theirs` into the current branch with the remote side
    /// authoritative: fast-forward when possible, otherwise a two-parent
    /// merge commit whose tree is the remote tree.
    pub fn merge_theirs(
        &self,
        theirs: Oid,
        identity: &CommitIdentity,
    ) -> Result<MergeOutcome, StoreError> {
        let head = self.inner.head()?;
        let branch_ref = head
            .name()
            .ok_or_else(|| StoreError::BranchNotFound("HEAD".into()))?
            .to_string();
        let local = head.peel_to_commit()?;
        if local.id() == theirs {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }
        let base = self.inner.merge_base(local.id(), theirs)?;
        if base == theirs {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let theirs_commit = self.inner.find_commit(theirs)?;
        let mut opts = CheckoutBuilder::new();
        opts.force();
        if base == local.id() {
            self.inner
                .reference(&branch_ref, theirs, true, "merge: fast-forward")?;
            self.inner.checkout_head(Some(&mut opts))?;
            return Ok(MergeOutcome::FastForward);
        }

        let tree = theirs_commit.tree()?;
        let sig = identity.signature()?;
        let message = format!("Merge commit '{theirs}'");
        self.inner.commit(
            Some("HEAD"),
            &sig,
            &sig,
            &message,
            &tree,
            &[&local, &theirs_commit],
        )?;
        self.inner.checkout_head(Some(&mut opts))?;
        Ok(MergeOutcome::Merged)
    }

    // === Config and identity ===

    pub fn config_string(&self, name: &str) -> Result<Option<String>, StoreError> {
        let config = self.inner.config()?;
        match config.get_string(name) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set_config(&self, name: &str, value: &str) -> Result<(), StoreError> {
        let mut config = self.inner.config()?;
        Ok(config.set_str(name, value)?)
    }

    /// Commit identity from repository config, falling back to the local
    /// account when none is configured.
    pub fn identity_from_config(&self) -> CommitIdentity {
        if let Ok(sig) = self.inner.signature()
            && let (Some(name), Some(email)) = (sig.name(), sig.email())
        {
            return CommitIdentity::new(name, email);
        }
        let user = whoami::username();
        let host = whoami::fallible::hostname().unwrap_or_else(|_| "localhost".into());
        CommitIdentity::new(&user, format!("{user}@{host}"))
    }

    // === History ===

    /// Commits reachable from HEAD, newest first, optionally restricted to
    /// those that touched `path`.
    pub fn history(
        &self,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, StoreError> {
        let mut out = Vec::new();
        if !self.has_head() || limit == 0 {
            return Ok(out);
        }
        let mut walk = self.inner.revwalk()?;
        walk.push_head()?;
        walk.set_sorting(Sort::TIME)?;
        for oid in walk {
            let commit = self.inner.find_commit(oid?)?;
            if let Some(p) = path
                && !self.commit_touches(&commit, p)?
            {
                continue;
            }
            let author = commit.author();
            out.push(CommitInfo {
                id: commit.id().to_string(),
                author: author.name().unwrap_or_default().to_string(),
                email: author.email().unwrap_or_default().to_string(),
                time_secs: commit.time().seconds(),
                message: commit.message().unwrap_or_default().to_string(),
            });
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    fn commit_touches(&self, commit: &Commit<'_>, path: &str) -> Result<bool, StoreError> {
        let current = commit
            .tree()?
            .get_path(Path::new(path))
            .ok()
            .map(|entry| entry.id());
        if commit.parent_count() == 0 {
            return Ok(current.is_some());
        }
        for parent in commit.parents() {
            let previous = parent
                .tree()?
                .get_path(Path::new(path))
                .ok()
                .map(|entry| entry.id());
            if previous != current {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Unified diff of `commit` against `base` (its first parent when
    /// absent), optionally restricted to `path`.
    pub fn diff_text(
        &self,
        commit: Oid,
        base: Option<Oid>,
        path: Option<&str>,
    ) -> Result<String, StoreError> {
        let commit = self.inner.find_commit(commit)?;
        let new_tree = commit.tree()?;
        let old_tree = match base {
            Some(oid) => Some(self.inner.find_commit(oid)?.tree()?),
            None => match commit.parent(0) {
                Ok(parent) => Some(parent.tree()?),
                Err(_) => None,
            },
        };
        let mut opts = DiffOptions::new();
        if let Some(p) = path {
            opts.pathspec(p);
        }
        let diff =
            self.inner
                .diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), Some(&mut opts))?;
        let mut text = String::new();
        diff.print(DiffFormat::Patch, |_delta, _hunk, line| {
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin());
            }
            text.push_str(std::str::from_utf8(line.content()).unwrap_or(""));
            true
        })?;
        Ok(text)
    }

    /// Blob contents of `path` at `commit`, `None` when absent.
    pub fn blob_at(&self, commit: Oid, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let commit = self.inner.find_commit(commit)?;
        let tree = commit.tree()?;
        let Ok(entry) = tree.get_path(Path::new(path)) else {
            return Ok(None);
        };
        let object = entry.to_object(&self.inner)?;
        match object.as_blob() {
            Some(blob) => Ok(Some(blob.content().to_vec())),
            None => Ok(None),
        }
    }

    /// Parse a commit id string.
    pub fn parse_commit_id(&self, id: &str) -> Result<Oid, StoreError> {
        Ok(Oid::from_str(id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn identity() -> CommitIdentity {
        CommitIdentity::new("tester", "tester@localhost")
    }

    fn fixture() -> (TempDir, GitRepo) {
        let tmp = TempDir::new().unwrap();
        let repo = GitRepo::init(tmp.path()).unwrap();
        fs::write(repo.workdir().join("README.md"), b"fabric\n").unwrap();
        repo.add_path(Path::new("README.md")).unwrap();
        repo.commit_index(&identity(), "Initial import").unwrap();
        (tmp, repo)
    }

    #[test]
    fn starts_on_master_with_one_commit() {
        let (_tmp, repo) = fixture();
        assert!(repo.has_head());
        assert_eq!(repo.current_branch().unwrap(), "master");
        assert_eq!(repo.local_branches().unwrap().len(), 1);
    }

    #[test]
    fn checkout_creates_branch_at_head() {
        let (_tmp, repo) = fixture();
        let master_tip = repo.head_id().unwrap();
        repo.checkout_branch("1.0", "origin").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "1.0");
        assert_eq!(repo.head_id(), Some(master_tip));
        // Checking out again is a no-op.
        repo.checkout_branch("1.0", "origin").unwrap();
        assert_eq!(repo.current_branch().unwrap(), "1.0");
    }

    #[test]
    fn delete_branch_refuses_current() {
        let (_tmp, repo) = fixture();
        repo.checkout_branch("1.0", "origin").unwrap();
        assert!(repo.delete_branch("1.0").is_err());
        repo.checkout_local_branch("master", true).unwrap();
        repo.delete_branch("1.0").unwrap();
        assert!(repo.branch_id("1.0").is_none());
    }

    #[test]
    fn stash_with_clean_tree_is_none() {
        let (_tmp, mut repo) = fixture();
        let stashed = repo
            .stash_work_tree(&identity(), "Stash before a write")
            .unwrap();
        assert!(stashed.is_none());
    }

    #[test]
    fn stash_shelves_dirty_files() {
        let (_tmp, mut repo) = fixture();
        fs::write(repo.workdir().join("README.md"), b"dirty\n").unwrap();
        let stashed = repo
            .stash_work_tree(&identity(), "Stash before a write")
            .unwrap();
        assert!(stashed.is_some());
        assert_eq!(
            fs::read(repo.workdir().join("README.md")).unwrap(),
            b"fabric\n"
        );
    }

    #[test]
    fn clean_removes_untracked_directories() {
        let (_tmp, repo) = fixture();
        let junk = repo.workdir().join("junk");
        fs::create_dir_all(junk.join("nested")).unwrap();
        fs::write(junk.join("nested/file"), b"x").unwrap();
        fs::write(repo.workdir().join("loose"), b"y").unwrap();
        repo.clean_untracked().unwrap();
        assert!(!junk.exists());
        assert!(!repo.workdir().join("loose").exists());
        assert!(repo.workdir().join("README.md").exists());
    }

    #[test]
    fn merge_theirs_fast_forwards_when_behind() {
        let (_tmp, repo) = fixture();
        let old_tip = repo.head_id().unwrap();
        fs::write(repo.workdir().join("new.txt"), b"n").unwrap();
        repo.add_path(Path::new("new.txt")).unwrap();
        let new_tip = repo.commit_index(&identity(), "advance").unwrap();

        // Rewind the branch, keep the commit reachable via merge target.
        repo.inner
            .reference("refs/heads/master", old_tip, true, "rewind")
            .unwrap();
        repo.discard_worktree().unwrap();
        assert_eq!(
            repo.merge_theirs(new_tip, &identity()).unwrap(),
            MergeOutcome::FastForward
        );
        assert_eq!(repo.head_id(), Some(new_tip));
        assert!(repo.workdir().join("new.txt").exists());
    }

    #[test]
    fn merge_theirs_takes_remote_tree_on_divergence() {
        let (_tmp, repo) = fixture();
        let base = repo.head_id().unwrap();

        // "Remote" line of history.
        fs::write(repo.workdir().join("conflict.txt"), b"theirs\n").unwrap();
        repo.add_path(Path::new("conflict.txt")).unwrap();
        let theirs = repo.commit_index(&identity(), "their change").unwrap();

        // Rewind and diverge locally on the same path.
        repo.inner
            .reference("refs/heads/master", base, true, "rewind")
            .unwrap();
        repo.discard_worktree().unwrap();
        repo.clean_untracked().unwrap();
        fs::write(repo.workdir().join("conflict.txt"), b"ours\n").unwrap();
        repo.add_path(Path::new("conflict.txt")).unwrap();
        repo.commit_index(&identity(), "our change").unwrap();

        assert_eq!(
            repo.merge_theirs(theirs, &identity()).unwrap(),
            MergeOutcome::Merged
        );
        assert_eq!(
            fs::read(repo.workdir().join("conflict.txt")).unwrap(),
            b"theirs\n"
        );
    }

    #[test]
    fn merge_theirs_is_idle_when_ahead() {
        let (_tmp, repo) = fixture();
        let old_tip = repo.head_id().unwrap();
        fs::write(repo.workdir().join("ahead.txt"), b"a").unwrap();
        repo.add_path(Path::new("ahead.txt")).unwrap();
        repo.commit_index(&identity(), "ahead").unwrap();
        assert_eq!(
            repo.merge_theirs(old_tip, &identity()).unwrap(),
            MergeOutcome::AlreadyUpToDate
        );
    }

    #[test]
    fn history_filters_by_path() {
        let (_tmp, repo) = fixture();
        fs::write(repo.workdir().join("a.txt"), b"1").unwrap();
        repo.add_path(Path::new("a.txt")).unwrap();
        repo.commit_index(&identity(), "touch a").unwrap();
        fs::write(repo.workdir().join("b.txt"), b"2").unwrap();
        repo.add_path(Path::new("b.txt")).unwrap();
        repo.commit_index(&identity(), "touch b").unwrap();

        let all = repo.history(None, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "touch b");

        let only_a = repo.history(Some("a.txt"), 10).unwrap();
        assert_eq!(only_a.len(), 1);
        assert_eq!(only_a[0].message, "touch a");
    }

    #[test]
    fn blob_at_reads_old_revisions() {
        let (_tmp, repo) = fixture();
        fs::write(repo.workdir().join("file.txt"), b"v1").unwrap();
        repo.add_path(Path::new("file.txt")).unwrap();
        let first = repo.commit_index(&identity(), "v1").unwrap();
        fs::write(repo.workdir().join("file.txt"), b"v2").unwrap();
        repo.add_path(Path::new("file.txt")).unwrap();
        repo.commit_index(&identity(), "v2").unwrap();

        assert_eq!(
            repo.blob_at(first, "file.txt").unwrap(),
            Some(b"v1".to_vec())
        );
        assert_eq!(repo.blob_at(first, "missing.txt").unwrap(), None);
    }

    #[test]
    fn diff_text_mentions_changed_lines() {
        let (_tmp, repo) = fixture();
        fs::write(repo.workdir().join("file.txt"), b"old\n").unwrap();
        repo.add_path(Path::new("file.txt")).unwrap();
        let first = repo.commit_index(&identity(), "v1").unwrap();
        fs::write(repo.workdir().join("file.txt"), b"new\n").unwrap();
        repo.add_path(Path::new("file.txt")).unwrap();
        let second = repo.commit_index(&identity(), "v2").unwrap();

        let diff = repo.diff_text(second, Some(first), Some("file.txt")).unwrap();
        assert!(diff.contains("-old"));
        assert!(diff.contains("+new"));
    }
}
