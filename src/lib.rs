#![forbid(unsafe_code)]

//! Versioned fabric configuration store backed by a git repository.
//!
//! Versions map to branches, profiles to directories, configuration files to
//! blobs; `master` carries cross-version profiles. One exclusive serializer
//! mediates all repository access, a background worker converges the local
//! clone toward the upstream remote, and listeners hear about every
//! effective change. A narrow set of fabric-wide metadata lives in a
//! hierarchical coordination service instead of the repository.

pub mod coordination;
pub mod credentials;
pub mod error;
pub mod listener;
pub mod profiles;
pub mod properties;
pub mod repo;
pub mod requirements;
pub mod settings;
pub mod store;
mod sync;

pub use error::{StoreError, Transience};
pub type Result<T> = std::result::Result<T, StoreError>;

pub use coordination::{AttributeStore, MemoryAttributeStore};
pub use credentials::{CredentialSource, Credentials, StaticCredentials};
pub use listener::{ChangeListener, RemoteEvents};
pub use repo::{CommitIdentity, CommitInfo, GitRepo, MergeOutcome};
pub use requirements::{FabricRequirements, ProfileRequirements};
pub use settings::StoreSettings;
pub use store::{GitContext, GitDataStore};
