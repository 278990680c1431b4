//! The Hub contract: a small `async_trait` the engine is written
//! against. No concrete HTTP implementation lives here — see the
//! `prbridge-hub` crate's `GithubClient` for that.

use async_trait::async_trait;
use thiserror::Error;

use crate::entities::{Commit, Event, PullRequest, Ref, Repo, Status};

/// An opaque Hub credential. Deliberately has no `Debug`/`Display` that
/// prints the token itself — only `redacted()` is printable, so a stray
/// `{:?}` in a log line can't leak it.
#[derive(Clone)]
pub struct HubToken(std::sync::Arc<str>);

impl HubToken {
    pub fn new(token: impl Into<std::sync::Arc<str>>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn redacted(&self) -> &'static str {
        "<redacted>"
    }
}

impl std::fmt::Debug for HubToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HubToken").field(&self.redacted()).finish()
    }
}

#[derive(Debug, Error)]
pub enum HubError {
    #[error("hub request failed: {0}")]
    Request(String),
    #[error("hub returned an unexpected response: {0}")]
    Protocol(String),
    #[error("hub rate-limited the request after retries: {0}")]
    RateLimited(String),
    #[error("hub rejected the credential")]
    Unauthorized,
}

/// The outbound-facing surface the sync engine drives. Every method is
/// independently fallible; callers log and continue rather than abort a
/// tick on a single failing call.
#[async_trait]
pub trait HubClient: Send + Sync {
    async fn user_exists(&self, token: &HubToken, user: &str) -> Result<bool, HubError>;
    async fn repo_exists(&self, token: &HubToken, repo: &Repo) -> Result<bool, HubError>;
    async fn repos(&self, token: &HubToken, user: &str) -> Result<Vec<Repo>, HubError>;

    async fn status(&self, token: &HubToken, commit: &Commit) -> Result<Vec<Status>, HubError>;
    async fn set_status(&self, token: &HubToken, status: &Status) -> Result<(), HubError>;

    /// Open pull requests only — closure is inferred by absence.
    async fn prs(&self, token: &HubToken, repo: &Repo) -> Result<Vec<PullRequest>, HubError>;
    async fn set_pr(&self, token: &HubToken, pr: &PullRequest) -> Result<(), HubError>;

    async fn refs(&self, token: &HubToken, repo: &Repo) -> Result<Vec<Ref>, HubError>;

    async fn events(&self, token: &HubToken, repo: &Repo) -> Result<Vec<Event>, HubError>;
}
