//! Opaque credential supply for transports
//!
//! The engine never inspects credentials itself. A transport asks the
//! caller's [`CredentialProvider`] when a remote demands authentication and
//! hands the answer to its own network layer.

use crate::error::Result;
use async_trait::async_trait;
use std::fmt;

/// What a transport may present to a remote
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Whatever the platform offers without asking (agent, helper, none)
    Default,
    UsernamePassword {
        username: String,
        password: String,
    },
    /// An SSH key held in memory rather than on disk
    SshKeyFromMemory {
        username: String,
        public_key: Option<String>,
        private_key: String,
        passphrase: Option<String>,
    },
}

impl Credentials {
    pub fn username(&self) -> Option<&str> {
        match self {
            Credentials::Default => None,
            Credentials::UsernamePassword { username, .. }
            | Credentials::SshKeyFromMemory { username, .. } => Some(username),
        }
    }
}

// secrets stay out of logs and error messages
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Default => f.write_str("Default"),
            Credentials::UsernamePassword { username, .. } => f
                .debug_struct("UsernamePassword")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::SshKeyFromMemory {
                username,
                public_key,
                ..
            } => f
                .debug_struct("SshKeyFromMemory")
                .field("username", username)
                .field("public_key", &public_key.as_ref().map(|_| "<present>"))
                .field("private_key", &"<redacted>")
                .finish(),
        }
    }
}

/// Source of credentials, consulted once per authentication challenge
///
/// `username_from_url` carries the user part of the remote URL when there
/// is one.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self, url: &str, username_from_url: Option<&str>) -> Result<Credentials>;
}

#[async_trait]
impl CredentialProvider for Credentials {
    async fn credentials(&self, _url: &str, _username_from_url: Option<&str>) -> Result<Credentials> {
        Ok(self.clone())
    }
}

/// Adapts a plain closure into a provider
pub struct CredentialCallback<F>(pub F);

#[async_trait]
impl<F> CredentialProvider for CredentialCallback<F>
where
    F: Fn(&str, Option<&str>) -> Result<Credentials> + Send + Sync,
{
    async fn credentials(&self, url: &str, username_from_url: Option<&str>) -> Result<Credentials> {
        (self.0)(url, username_from_url)
    }
}
