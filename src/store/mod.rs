//! The git-backed data store.
//!
//! Versions of the fabric configuration live as branches of one shared
//! working copy; profiles live as directories on those branches. Every
//! facade operation runs through the operation serializer (`serializer`),
//! which owns the single-branch-checkout invariant, and mutations are pushed
//! upstream and announced to listeners as soon as they commit. A small set
//! of fabric-wide attributes bypasses git entirely and lives in the
//! coordination service.

mod context;
mod reconcile;
mod serializer;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};

pub use context::GitContext;

use crate::coordination::{AttributeStore, paths as coordination_paths};
use crate::credentials::CredentialSource;
use crate::error::StoreError;
use crate::listener::{ChangeListener, ChangePublisher, RemoteEvents};
use crate::profiles::{
    AGENT_METADATA_FILE, CONFIGS_PROFILES, CONFIG_ROOT_DIR, MASTER_BRANCH,
    USE_DIRECTORIES_FOR_PROFILES, branch_of, directory_of, is_legacy_profile_dir, profile_names,
};
use crate::repo::{CommitIdentity, CommitInfo, GitRepo};
use crate::requirements::FabricRequirements;
use crate::settings::StoreSettings;
use crate::sync::SyncWorker;

/// Identifies this data store plugin.
pub const DATA_STORE_TYPE: &str = "git";

/// How long `stop` waits for an in-flight operation to finish.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct GitDataStore {
    settings: StoreSettings,
    /// Name of the upstream remote; `origin` unless overridden.
    remote_name: Mutex<String>,
    /// The repository handle. The mutex is the operation serializer lock;
    /// the slot is empty until a repository is bound at activation.
    repo: Mutex<Option<GitRepo>>,
    publisher: ChangePublisher,
    version_cache: Mutex<Option<Vec<String>>>,
    credential_source: Option<Arc<dyn CredentialSource>>,
    attributes: Arc<dyn AttributeStore>,
    worker: Mutex<Option<SyncWorker>>,
    active: AtomicBool,
}

impl GitDataStore {
    pub fn new(
        settings: StoreSettings,
        attributes: Arc<dyn AttributeStore>,
        credential_source: Option<Arc<dyn CredentialSource>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            remote_name: Mutex::new("origin".to_string()),
            repo: Mutex::new(None),
            publisher: ChangePublisher::new(),
            version_cache: Mutex::new(None),
            credential_source,
            attributes,
            worker: Mutex::new(None),
            active: AtomicBool::new(false),
        })
    }

    pub fn data_store_type(&self) -> &'static str {
        DATA_STORE_TYPE
    }

    // === Lifecycle ===

    /// Install the repository handle. Must happen before `start`.
    pub fn bind_repository(&self, repo: GitRepo) {
        *self.repo.lock().expect("operation lock") = Some(repo);
    }

    pub fn unbind_repository(&self) -> Option<GitRepo> {
        self.repo.lock().expect("operation lock").take()
    }

    /// Activate the store and begin pulling from the remote every
    /// `gitPullPeriod` milliseconds.
    pub fn start(self: &Arc<Self>) -> Result<(), StoreError> {
        if self.repo.lock().expect("operation lock").is_none() {
            return Err(StoreError::Settings {
                key: "repository",
                reason: "no repository bound".to_string(),
            });
        }
        self.active.store(true, Ordering::SeqCst);
        let worker = SyncWorker::spawn(Arc::downgrade(self), self.settings.pull_period());
        if let Some(url) = &self.settings.remote_url {
            worker.url_changed(url.clone());
        }
        tracing::info!(
            period_ms = self.settings.pull_period_ms,
            "starting to pull from the remote repository"
        );
        *self.worker.lock().expect("worker lock") = Some(worker);
        Ok(())
    }

    /// Deactivate the store, allowing an in-flight operation up to five
    /// seconds to finish.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().expect("worker lock").take() {
            worker.shutdown(SHUTDOWN_GRACE);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn assert_active(&self) -> Result<(), StoreError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(StoreError::NotActive)
        }
    }

    // === Remote identity ===

    pub fn remote_name(&self) -> String {
        self.remote_name.lock().expect("remote name lock").clone()
    }

    pub fn set_remote_name(&self, name: &str) -> Result<(), StoreError> {
        if name.is_empty() {
            return Err(StoreError::EmptyRemoteName);
        }
        *self.remote_name.lock().expect("remote name lock") = name.to_string();
        Ok(())
    }

    pub fn remote_url(&self) -> Option<String> {
        self.settings.remote_url.clone()
    }

    // === Listeners and caches ===

    pub fn bind_listener(&self, listener: Arc<dyn ChangeListener>) {
        self.publisher.bind(listener);
    }

    pub fn unbind_listener(&self, listener: &Arc<dyn ChangeListener>) {
        self.publisher.unbind(listener);
    }

    pub(crate) fn clear_caches(&self) {
        *self.version_cache.lock().expect("version cache lock") = None;
    }

    pub(crate) fn fire_change_notifications(&self) {
        tracing::debug!("firing change notifications");
        self.clear_caches();
        self.publisher.fire();
    }

    // === Versions ===

    /// Every local branch name except `master`.
    pub fn versions(&self) -> Result<Vec<String>, StoreError> {
        self.assert_active()?;
        if let Some(cached) = self.version_cache.lock().expect("version cache lock").clone() {
            return Ok(cached);
        }
        let versions = self.read_op(|repo, _ctx| {
            Ok(repo
                .local_branches()?
                .into_keys()
                .filter(|name| name != MASTER_BRANCH)
                .collect::<Vec<_>>())
        })?;
        *self.version_cache.lock().expect("version cache lock") = Some(versions.clone());
        Ok(versions)
    }

    pub fn has_version(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.versions()?.iter().any(|v| v == name))
    }

    pub fn create_version(&self, version: &str) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(&version, &remote)?;
            ctx.set_push_branch(&version);
            ctx.require_push();
            Ok(())
        })
    }

    /// Create `version` starting from the tip of `parent`.
    pub fn create_version_from(&self, parent: &str, version: &str) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let parent = parent.to_string();
        let version = version.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(&parent, &remote)?;
            repo.checkout_branch(&version, &remote)?;
            ctx.set_push_branch(&version);
            ctx.require_push();
            Ok(())
        })
    }

    pub fn delete_version(&self, _version: &str) -> Result<(), StoreError> {
        Err(StoreError::Unsupported("delete_version"))
    }

    // === Profiles ===

    /// Profiles visible on `version`: the union of the `master` branch
    /// (fabric-wide ensemble profiles) and the version branch.
    pub fn profiles(&self, version: &str) -> Result<Vec<String>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        self.read_op(move |repo, _ctx| {
            let mut names = BTreeSet::new();
            let known = version != MASTER_BRANCH
                && repo.local_branches()?.contains_key(&version);
            if known {
                repo.checkout_branch(MASTER_BRANCH, &remote)?;
                names.extend(profile_names(&profiles_root(repo))?);
                repo.checkout_branch(&version, &remote)?;
                names.extend(profile_names(&profiles_root(repo))?);
            }
            Ok(names.into_iter().collect())
        })
    }

    /// Look up `profile` on `version`, creating it when `create` is set.
    /// Returns `None` when the profile does not exist (or already existed,
    /// for the create path).
    pub fn get_profile(
        &self,
        version: &str,
        profile: &str,
        create: bool,
    ) -> Result<Option<String>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            let dir = profile_directory(repo, &profile);
            if !dir.exists() {
                if create {
                    return do_create_profile(repo, ctx, &version, &profile);
                }
                return Ok(None);
            }
            Ok(Some(profile.clone()))
        })
    }

    pub fn create_profile(&self, version: &str, profile: &str) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            do_create_profile(repo, ctx, &version, &profile)?;
            Ok(())
        })
    }

    pub fn delete_profile(&self, version: &str, profile: &str) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            let dir = profile_directory(repo, &profile);
            recursive_delete_and_rm(repo, &dir)?;
            ctx.set_push_branch(&version);
            ctx.commit(format!("Removed profile {profile}"));
            Ok(())
        })
    }

    /// Filesystem modification time of the profile, in milliseconds.
    ///
    /// Purely mtime-based and therefore not monotonic across branch
    /// switches; 0 when the profile directory is absent.
    pub fn last_modified(&self, version: &str, profile: &str) -> Result<u64, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        self.read_op(move |repo, _ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            let dir = profile_directory(repo, &profile);
            if !dir.exists() {
                return Ok(0);
            }
            let mut answer = mtime_millis(&dir);
            let metadata = dir.join(AGENT_METADATA_FILE);
            if metadata.exists() {
                answer = answer.max(mtime_millis(&metadata));
            }
            Ok(answer)
        })
    }

    /// Sorted union of directory entries at `path` under each profile.
    pub fn list_files(
        &self,
        version: &str,
        profiles: &[&str],
        path: &str,
    ) -> Result<Vec<String>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profiles: Vec<String> = profiles.iter().map(|p| p.to_string()).collect();
        let path = path.to_string();
        self.read_op(move |repo, _ctx| {
            let mut names = BTreeSet::new();
            for profile in &profiles {
                repo.checkout_branch(branch_of(&version, profile), &remote)?;
                let dir = profile_directory(repo, profile);
                let base = if path.is_empty() { dir } else { dir.join(&path) };
                if base.is_dir() {
                    for entry in fs::read_dir(&base)? {
                        names.insert(entry?.file_name().to_string_lossy().into_owned());
                    }
                }
            }
            Ok(names.into_iter().collect())
        })
    }

    // === File configurations ===

    /// All configuration files of a profile, keyed by path relative to the
    /// profile directory.
    pub fn file_configurations(
        &self,
        version: &str,
        profile: &str,
    ) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        self.read_op(move |repo, _ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            gather_file_configurations(repo, &profile)
        })
    }

    pub fn file_configuration(
        &self,
        version: &str,
        profile: &str,
        name: &str,
    ) -> Result<Option<Vec<u8>>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        let name = name.to_string();
        self.read_op(move |repo, _ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            load_file_configuration(&profile_directory(repo, &profile).join(&name))
        })
    }

    /// Replace the full configuration set of a profile. Supplied entries are
    /// written; pre-existing entries not in the input are removed.
    pub fn set_file_configurations(
        &self,
        version: &str,
        profile: &str,
        configurations: BTreeMap<String, Vec<u8>>,
    ) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            let mut existing = gather_file_configurations(repo, &profile)?;
            for (name, bytes) in &configurations {
                existing.remove(name);
                write_file_configuration(repo, &profile, name, Some(bytes))?;
            }
            for leftover in existing.keys() {
                let stale = profile_directory(repo, &profile).join(leftover);
                recursive_delete_and_rm(repo, &stale)?;
            }
            ctx.set_push_branch(&version);
            ctx.commit(format!("Updated configuration for profile {profile}"));
            Ok(())
        })
    }

    /// Write (or, with `None`, remove) a single configuration file.
    pub fn set_file_configuration(
        &self,
        version: &str,
        profile: &str,
        name: &str,
        configuration: Option<&[u8]>,
    ) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        let name = name.to_string();
        let configuration = configuration.map(|bytes| bytes.to_vec());
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            write_file_configuration(repo, &profile, &name, configuration.as_deref())?;
            ctx.set_push_branch(&version);
            ctx.commit(format!("Updated {name} for profile {profile}"));
            Ok(())
        })
    }

    // === PID configurations ===

    /// The key/value map of `<pid>.properties`; empty when the file is
    /// absent.
    pub fn configuration(
        &self,
        version: &str,
        profile: &str,
        pid: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let profile = profile.to_string();
        let pid = pid.to_string();
        self.read_op(move |repo, _ctx| {
            repo.checkout_branch(branch_of(&version, &profile), &remote)?;
            let file = pid_file(&profile_directory(repo, &profile), &pid);
            if file.is_file() {
                crate::properties::parse(&fs::read(&file)?)
            } else {
                Ok(BTreeMap::new())
            }
        })
    }

    pub fn set_configuration(
        &self,
        version: &str,
        profile: &str,
        pid: &str,
        configuration: &BTreeMap<String, String>,
    ) -> Result<(), StoreError> {
        let data = crate::properties::render(configuration);
        self.set_file_configuration(version, profile, &format!("{pid}.properties"), Some(&data))
    }

    pub fn set_configurations(
        &self,
        version: &str,
        profile: &str,
        configurations: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<(), StoreError> {
        let mut files = BTreeMap::new();
        for (pid, map) in configurations {
            files.insert(
                format!("{pid}.properties"),
                crate::properties::render(map),
            );
        }
        self.set_file_configurations(version, profile, files)
    }

    // === Import ===

    /// Import a configuration tree from the local filesystem.
    ///
    /// Detects the legacy coordination-service layout
    /// (`fabric/configs/versions/<v>/profiles`) and imports each version onto
    /// its branch, converting flat profile directories to the hierarchical
    /// layout; any other tree is imported wholesale onto the default version.
    pub fn import_from_filesystem(&self, from: &Path) -> Result<(), StoreError> {
        self.assert_active()?;
        let configs = from.join(CONFIG_ROOT_DIR).join("configs");
        let default_version = self.default_version()?;
        if configs.is_dir() {
            tracing::info!("importing the legacy coordination-service layout");
            let versions_dir = configs.join("versions");
            if versions_dir.is_dir() {
                for entry in fs::read_dir(&versions_dir)? {
                    let version_dir = entry?.path();
                    if !version_dir.is_dir() {
                        continue;
                    }
                    let version = version_dir
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    for child in fs::read_dir(&version_dir)? {
                        let child = child?.path();
                        tracing::info!(
                            from = %child.display(),
                            branch = %version,
                            "importing version configuration"
                        );
                        self.import_tree(&child, CONFIG_ROOT_DIR, &version, true)?;
                    }
                }
            }
            let metrics = from.join(CONFIG_ROOT_DIR).join("metrics");
            if metrics.is_dir() {
                tracing::info!(branch = %default_version, "importing metrics");
                self.import_tree(&metrics, CONFIG_ROOT_DIR, &default_version, false)?;
            }
        } else {
            tracing::info!(
                from = %from.display(),
                version = %default_version,
                "importing tree"
            );
            self.import_tree(from, "", &default_version, false)?;
        }
        Ok(())
    }

    fn import_tree(
        &self,
        from: &Path,
        destination: &str,
        version: &str,
        is_profile_dir: bool,
    ) -> Result<(), StoreError> {
        let remote = self.remote_name();
        let from = from.to_path_buf();
        let destination = destination.to_string();
        let version = version.to_string();
        self.write_op(move |repo, ctx| {
            repo.checkout_branch(&version, &remote)?;
            let mut to_dir = repo.workdir().to_path_buf();
            if !destination.is_empty() {
                to_dir = to_dir.join(&destination);
            }
            if is_profile_dir && USE_DIRECTORIES_FOR_PROFILES {
                copy_legacy_profiles(repo, &from, &to_dir)?;
            } else {
                copy_and_add(repo, &from, &to_dir, true)?;
            }
            ctx.set_push_branch(&version);
            ctx.commit(format!("Imported from {}", from.display()));
            Ok(())
        })
    }

    // === History surface ===

    /// Commits on `version`, newest first, optionally restricted to those
    /// touching `path` (repository-relative).
    pub fn history(
        &self,
        version: &str,
        path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<CommitInfo>, StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let path = path.map(str::to_string);
        self.read_op(move |repo, _ctx| {
            repo.checkout_branch(&version, &remote)?;
            repo.history(path.as_deref(), limit)
        })
    }

    /// Unified diff of `commit` against `base` (its first parent when
    /// absent), optionally restricted to `path`.
    pub fn diff(
        &self,
        commit: &str,
        base: Option<&str>,
        path: Option<&str>,
    ) -> Result<String, StoreError> {
        self.assert_active()?;
        let commit = commit.to_string();
        let base = base.map(str::to_string);
        let path = path.map(str::to_string);
        self.read_op(move |repo, _ctx| {
            let commit = repo.parse_commit_id(&commit)?;
            let base = match &base {
                Some(id) => Some(repo.parse_commit_id(id)?),
                None => None,
            };
            repo.diff_text(commit, base, path.as_deref())
        })
    }

    /// Restore `path` on `version` to its contents at `commit_id`, as an
    /// authored commit.
    pub fn revert_to(
        &self,
        version: &str,
        commit_id: &str,
        path: &str,
        message: &str,
        identity: CommitIdentity,
    ) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let commit_id = commit_id.to_string();
        let path = path.to_string();
        let message = message.to_string();
        self.write_op_with_identity(
            Some(identity),
            true,
            GitContext::new(),
            move |repo, ctx| {
                repo.checkout_branch(&version, &remote)?;
                let oid = repo.parse_commit_id(&commit_id)?;
                let Some(bytes) = repo.blob_at(oid, &path)? else {
                    return Err(StoreError::BranchNotFound(format!(
                        "{path} not found at commit {commit_id}"
                    )));
                };
                let file = repo.workdir().join(&path);
                if let Some(parent) = file.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&file, bytes)?;
                repo.add_path(Path::new(&path))?;
                ctx.set_push_branch(&version);
                ctx.commit(&message);
                Ok(())
            },
        )
    }

    /// Move `old_path` to `new_path` on `version`, as an authored commit.
    pub fn rename(
        &self,
        version: &str,
        old_path: &str,
        new_path: &str,
        message: &str,
        identity: CommitIdentity,
    ) -> Result<(), StoreError> {
        self.assert_active()?;
        let remote = self.remote_name();
        let version = version.to_string();
        let old_path = old_path.to_string();
        let new_path = new_path.to_string();
        let message = message.to_string();
        self.write_op_with_identity(
            Some(identity),
            true,
            GitContext::new(),
            move |repo, ctx| {
                repo.checkout_branch(&version, &remote)?;
                let old_file = repo.workdir().join(&old_path);
                let new_file = repo.workdir().join(&new_path);
                if let Some(parent) = new_file.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::rename(&old_file, &new_file)?;
                repo.rm_path(Path::new(&old_path))?;
                repo.add_path(Path::new(&new_path))?;
                ctx.set_push_branch(&version);
                ctx.commit(&message);
                Ok(())
            },
        )
    }

    // === Attribute store surface ===

    pub fn version_attributes(
        &self,
        version: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        self.assert_active()?;
        self.attributes.get_map(&coordination_paths::version(version))
    }

    /// Set (or, with `None`, remove) one version attribute.
    pub fn set_version_attribute(
        &self,
        version: &str,
        key: &str,
        value: Option<&str>,
    ) -> Result<(), StoreError> {
        self.assert_active()?;
        let node = coordination_paths::version(version);
        let mut attrs = self.attributes.get_map(&node)?;
        match value {
            Some(value) => attrs.insert(key.to_string(), value.to_string()),
            None => attrs.remove(key),
        };
        self.attributes.set_map(&node, &attrs)
    }

    pub fn requirements(&self) -> Result<FabricRequirements, StoreError> {
        self.assert_active()?;
        match self
            .attributes
            .get_string(coordination_paths::REQUIREMENTS_JSON)?
        {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(FabricRequirements::default()),
        }
    }

    pub fn set_requirements(
        &self,
        mut requirements: FabricRequirements,
    ) -> Result<(), StoreError> {
        self.assert_active()?;
        requirements.remove_empty_requirements();
        let json = serde_json::to_string(&requirements)?;
        self.attributes
            .set_string(coordination_paths::REQUIREMENTS_JSON, &json)
    }

    /// Default JVM options for new containers; empty while the coordinator
    /// is disconnected.
    pub fn default_jvm_options(&self) -> Result<String, StoreError> {
        self.assert_active()?;
        if self.attributes.is_connected()
            && self
                .attributes
                .exists(coordination_paths::DEFAULT_JVM_OPTIONS)?
        {
            Ok(self
                .attributes
                .get_string(coordination_paths::DEFAULT_JVM_OPTIONS)?
                .unwrap_or_default())
        } else {
            Ok(String::new())
        }
    }

    pub fn set_default_jvm_options(&self, options: &str) -> Result<(), StoreError> {
        self.assert_active()?;
        self.attributes
            .set_string(coordination_paths::DEFAULT_JVM_OPTIONS, options)
    }

    pub fn cluster_id(&self) -> Result<Option<String>, StoreError> {
        self.assert_active()?;
        self.attributes.get_string(coordination_paths::ENSEMBLES)
    }

    /// Container names of the current ensemble.
    pub fn ensemble_containers(&self) -> Result<Vec<String>, StoreError> {
        self.assert_active()?;
        let Some(cluster) = self.cluster_id()? else {
            return Ok(Vec::new());
        };
        let Some(listing) = self
            .attributes
            .get_string(&coordination_paths::ensemble(&cluster))?
        else {
            return Ok(Vec::new());
        };
        Ok(listing
            .trim()
            .split(',')
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn default_version(&self) -> Result<String, StoreError> {
        self.assert_active()?;
        Ok(self
            .attributes
            .get_string(coordination_paths::DEFAULT_VERSION)?
            .unwrap_or_else(|| "1.0".to_string()))
    }

    // === Remote events ===

    /// Run an empty serialized write; the prelude pulls and fires any
    /// required notifications. Failures are logged, never raised.
    pub fn pull(&self) {
        if let Err(e) = self.write_op(|_repo, _ctx| Ok(())) {
            tracing::warn!(error = %e, "failed to perform a pull");
        }
    }

    /// Point `remote.<name>.url` at `url` (with the default fetch refspec)
    /// and pull. Invoked on the sync worker.
    pub(crate) fn apply_remote_url(&self, url: &str) {
        let remote = self.remote_name();
        let url = url.to_string();
        let result = self.write_op({
            let remote = remote.clone();
            let url = url.clone();
            move |repo, _ctx| {
                let key = format!("remote.{remote}.url");
                if repo.config_string(&key)?.as_deref() != Some(url.as_str()) {
                    repo.set_config(&key, &url)?;
                    repo.set_config(
                        &format!("remote.{remote}.fetch"),
                        &format!("+refs/heads/*:refs/remotes/{remote}/*"),
                    )?;
                }
                Ok(())
            }
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, url = %url, "failed to update the remote url");
        }
        self.pull();
    }
}

impl RemoteEvents for GitDataStore {
    fn on_remote_url_changed(&self, url: &str) {
        if !self.is_active() {
            return;
        }
        // An operator-configured URL takes precedence over the event.
        let actual = self
            .settings
            .remote_url
            .clone()
            .unwrap_or_else(|| url.to_string());
        if let Some(worker) = self.worker.lock().expect("worker lock").as_ref() {
            worker.url_changed(actual);
        }
    }

    fn on_receive_pack(&self) {
        if self.is_active() {
            self.clear_caches();
        }
    }
}

// === Profile helpers ===

fn profiles_root(repo: &GitRepo) -> PathBuf {
    repo.workdir().join(CONFIGS_PROFILES)
}

fn profile_directory(repo: &GitRepo, profile: &str) -> PathBuf {
    profiles_root(repo).join(directory_of(profile))
}

fn pid_file(profile_dir: &Path, pid: &str) -> PathBuf {
    profile_dir.join(format!("{pid}.properties"))
}

/// Create the profile directory with its agent metadata file on the current
/// branch. A no-op returning `None` when the metadata file already exists.
fn do_create_profile(
    repo: &GitRepo,
    ctx: &mut GitContext,
    version: &str,
    profile: &str,
) -> Result<Option<String>, StoreError> {
    let dir = profile_directory(repo, profile);
    let metadata = dir.join(AGENT_METADATA_FILE);
    if metadata.exists() {
        return Ok(None);
    }
    fs::create_dir_all(&dir)?;
    fs::write(&metadata, format!("#Profile:{profile}\n"))?;
    repo.add_path(&repo.relative_path(&dir)?)?;
    ctx.set_push_branch(version);
    ctx.commit(format!("Added profile {profile}"));
    Ok(Some(profile.to_string()))
}

/// Write (or remove, with `None`) one configuration file and stage the
/// change.
fn write_file_configuration(
    repo: &GitRepo,
    profile: &str,
    name: &str,
    configuration: Option<&[u8]>,
) -> Result<(), StoreError> {
    let file = profile_directory(repo, profile).join(name);
    match configuration {
        None => recursive_delete_and_rm(repo, &file),
        Some(bytes) => {
            if let Some(parent) = file.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&file, bytes)?;
            repo.add_path(&repo.relative_path(&file)?)
        }
    }
}

/// Delete `target` from the working copy and the index.
fn recursive_delete_and_rm(repo: &GitRepo, target: &Path) -> Result<(), StoreError> {
    if !target.exists() {
        return Ok(());
    }
    let rel = repo.relative_path(target)?;
    if rel.as_os_str() == ".git" {
        return Ok(());
    }
    repo.rm_path(&rel)?;
    if target.is_dir() {
        fs::remove_dir_all(target)?;
    } else {
        fs::remove_file(target)?;
    }
    Ok(())
}

/// Gather every file under the profile directory, keyed by path relative to
/// it, forward slashes.
fn gather_file_configurations(
    repo: &GitRepo,
    profile: &str,
) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
    let mut configurations = BTreeMap::new();
    let root = profile_directory(repo, profile);
    if !root.is_dir() {
        return Ok(configurations);
    }
    let mut stack = vec![root.clone()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                let rel = path.strip_prefix(&root).map_err(|_| {
                    StoreError::Io(std::io::Error::other("path escapes the profile directory"))
                })?;
                let key = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                configurations.insert(key, fs::read(&path)?);
            }
        }
    }
    Ok(configurations)
}

/// Read one configuration file; `None` when absent. A PID that resolves to
/// a directory yields the concatenation of `<child> = <contents>` lines.
fn load_file_configuration(file: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    if file.is_dir() {
        let mut buf = String::new();
        let mut entries: Vec<_> = fs::read_dir(file)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());
        for child in entries {
            let contents = fs::read_to_string(child.path())?;
            buf.push_str(&format!(
                "{} = {}\n",
                child.file_name().to_string_lossy(),
                contents
            ));
        }
        return Ok(Some(buf.into_bytes()));
    }
    if file.is_file() {
        return Ok(Some(fs::read(file)?));
    }
    Ok(None)
}

/// Copy a tree (or file) into the working copy and stage it. With
/// `use_to_as_destination` a directory's contents land directly in `to`
/// rather than in `to/<name>`.
fn copy_and_add(
    repo: &GitRepo,
    from: &Path,
    to: &Path,
    use_to_as_destination: bool,
) -> Result<(), StoreError> {
    let root_dst = if from.is_dir() && use_to_as_destination {
        to.to_path_buf()
    } else {
        match from.file_name() {
            Some(name) => to.join(name),
            None => to.to_path_buf(),
        }
    };
    let mut stack = vec![(from.to_path_buf(), root_dst.clone())];
    while let Some((src, dst)) = stack.pop() {
        if src.is_dir() {
            fs::create_dir_all(&dst)?;
            for entry in fs::read_dir(&src)? {
                let child = entry?.path();
                match child.file_name() {
                    Some(name) => stack.push((child.clone(), dst.join(name))),
                    None => continue,
                }
            }
        } else {
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&src, &dst)?;
        }
    }
    repo.add_path(&repo.relative_path(&root_dst)?)?;
    Ok(())
}

/// Copy a flat profiles directory into the hierarchical layout, converting
/// each `foo-bar` profile directory into `foo/bar.profile` on the way in.
fn copy_legacy_profiles(repo: &GitRepo, from: &Path, to_dir: &Path) -> Result<(), StoreError> {
    if !from.is_dir() {
        return Err(StoreError::Io(std::io::Error::other(format!(
            "expected a profiles directory, got {}",
            from.display()
        ))));
    }
    let to_file = match from.file_name() {
        Some(name) => to_dir.join(name),
        None => to_dir.to_path_buf(),
    };
    for entry in fs::read_dir(from)? {
        let profile_dir = entry?.path();
        if is_legacy_profile_dir(&profile_dir)? {
            let profile_id = profile_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let to_profile = to_file.join(directory_of(&profile_id));
            fs::create_dir_all(&to_profile)?;
            copy_and_add(repo, &profile_dir, &to_profile, true)?;
        } else {
            copy_and_add(repo, &profile_dir, &to_file, false)?;
        }
    }
    repo.add_path(&repo.relative_path(&to_file)?)?;
    Ok(())
}

fn mtime_millis(path: &Path) -> u64 {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
