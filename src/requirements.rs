//! Fabric-wide requirements.
//!
//! A JSON blob in the attribute store describing how many instances of each
//! profile the fabric should run. Field names stay camelCase on the wire for
//! compatibility with existing agents.

use serde::{Deserialize, Serialize};

/// Scaling requirements for one profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRequirements {
    pub profile: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum_instances: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum_instances: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dependent_profiles: Vec<String>,
}

impl ProfileRequirements {
    /// A requirement with no counts and no dependencies says nothing.
    pub fn is_empty(&self) -> bool {
        self.minimum_instances.is_none()
            && self.maximum_instances.is_none()
            && self.dependent_profiles.is_empty()
    }
}

/// Requirements for the whole fabric.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FabricRequirements {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub profile_requirements: Vec<ProfileRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl FabricRequirements {
    /// Drop requirement entries that say nothing before persisting.
    pub fn remove_empty_requirements(&mut self) {
        self.profile_requirements.retain(|r| !r.is_empty());
    }
}
