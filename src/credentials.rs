//! Push/pull credential sources.
//!
//! Credentials are resolved fresh on every serialized operation so rotation
//! is automatic. With both `gitRemoteUser` and `gitRemotePassword` configured
//! the store runs in "external" mode and uses them verbatim; otherwise the
//! deployment-provided source (typically derived from a coordination service
//! token) is consulted.

use crate::error::StoreError;

/// A `(username, password)` pair for the upstream remote.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the password.
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Yields the current push/pull credentials.
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Result<Credentials, StoreError>;
}

/// Operator-supplied static credentials.
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, StoreError> {
        Ok(self.credentials.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_hides_the_password() {
        let source = StaticCredentials::new("agent", "hunter2");
        let rendered = format!("{:?}", source.credentials().unwrap());
        assert!(rendered.contains("agent"));
        assert!(!rendered.contains("hunter2"));
    }
}
