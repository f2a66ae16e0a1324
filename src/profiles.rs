//! Version/profile mapping.
//!
//! Versions are branches; profiles are directories under `fabric/profiles`
//! on the version branch. With the hierarchical layout a profile id such as
//! `foo-bar` maps to the directory `foo/bar.profile`, which keeps related
//! profiles grouped in folders on disk.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;

pub const MASTER_BRANCH: &str = "master";
pub const CONFIG_ROOT_DIR: &str = "fabric";
pub const CONFIGS_PROFILES: &str = "fabric/profiles";
pub const AGENT_METADATA_FILE: &str = "org.fusesource.fabric.agent.properties";
pub const PROFILE_FOLDER_SUFFIX: &str = ".profile";

/// Convert profile directories named `foo-bar` into a `foo/bar.profile`
/// tree. Kept as a constant so the flat layout stays reachable for repos
/// imported before the hierarchical layout existed.
pub const USE_DIRECTORIES_FOR_PROFILES: bool = true;

/// The branch holding a `(version, profile)` pair.
///
/// The profile is ignored today; the indirection exists so cross-version
/// profiles can later be routed to `master`.
pub fn branch_of<'a>(version: &'a str, _profile: &str) -> &'a str {
    version
}

/// Map a profile id to its directory path under the profiles root.
pub fn directory_of(profile_id: &str) -> String {
    if USE_DIRECTORIES_FOR_PROFILES {
        let mut path = profile_id.replace('-', "/");
        path.push_str(PROFILE_FOLDER_SUFFIX);
        path
    } else {
        profile_id.to_string()
    }
}

/// Collect profile ids from a profiles directory.
///
/// Walks the tree iteratively; a directory named `*.profile` is a leaf whose
/// id is the accumulated segments joined with `-`, any other directory is an
/// intermediate segment.
pub fn profile_names(profiles_dir: &Path) -> Result<BTreeSet<String>, StoreError> {
    let mut names = BTreeSet::new();
    if !profiles_dir.is_dir() {
        return Ok(names);
    }
    let mut stack: Vec<(PathBuf, String)> = vec![(profiles_dir.to_path_buf(), String::new())];
    while let Some((dir, prefix)) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if USE_DIRECTORIES_FOR_PROFILES {
                if let Some(leaf) = name.strip_suffix(PROFILE_FOLDER_SUFFIX) {
                    names.insert(format!("{prefix}{leaf}"));
                } else {
                    stack.push((entry.path(), format!("{prefix}{name}-")));
                }
            } else {
                names.insert(name);
            }
        }
    }
    Ok(names)
}

/// Detect a flat-layout profile directory by the presence of at least one
/// `*.properties` or `*.mvel` file. Used when importing legacy trees.
pub fn is_legacy_profile_dir(dir: &Path) -> Result<bool, StoreError> {
    if !dir.is_dir() {
        return Ok(false);
    }
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if name.ends_with(".properties") || name.ends_with(".mvel") {
            return Ok(true);
        }
    }
    Ok(false)
}
