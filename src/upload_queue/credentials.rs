//! Bearer credential source for uploads.

use std::sync::RwLock;

/// Supplies the bearer token used for uploads.
///
/// The controller reads the token once per attempt and never refreshes it;
/// `None` means the user is not authenticated.
pub trait CredentialProvider: Send + Sync {
    fn bearer_token(&self) -> Option<String>;
}

/// In-memory credential holder that can be signed in and out at runtime.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    token: RwLock<Option<String>>,
}

impl StaticCredentials {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        *self.token.write().unwrap() = Some(token.into());
    }

    pub fn sign_out(&self) {
        *self.token.write().unwrap() = None;
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.token.read().unwrap().clone()
    }
}
