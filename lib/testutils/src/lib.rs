//! Fixture builders and a scripted fake `HubClient`, shared by `prbridge`'s
//! own `#[cfg(test)]` modules and the `lib/tests/` integration suite.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use prbridge::entities::{Commit, Event, PathSegments, PrState, PullRequest, Ref, Repo, Status, StatusState};
use prbridge::{HubClient, HubError, HubToken};

pub fn repo(user: &str, name: &str) -> Repo {
    Repo::new(user, name)
}

pub fn commit(repo: &Repo, id: &str) -> Commit {
    Commit::new(repo.clone(), id)
}

pub fn open_pr(repo: &Repo, number: u64, head: &str, title: &str) -> PullRequest {
    PullRequest::new(commit(repo, head), number, PrState::Open, title)
}

pub fn success_status(repo: &Repo, head: &str, context: &[&str]) -> Status {
    Status::new(commit(repo, head), PathSegments::new(context.iter().copied()), None, None, StatusState::Success)
}

pub fn branch_ref(repo: &Repo, head: &str, name: &[&str]) -> Ref {
    Ref::new(commit(repo, head), PathSegments::new(name.iter().copied()))
}

/// A `HubClient` whose responses are entirely pre-scripted per repo, and
/// which records every call made against it — the test double shared by the
/// engine/import/export unit tests and the integration suite, so a scenario
/// only has to set up its registries once.
#[derive(Default)]
pub struct ScriptedHub {
    pub prs: Mutex<HashMap<Repo, Vec<PullRequest>>>,
    pub statuses: Mutex<HashMap<Commit, Vec<Status>>>,
    pub refs: Mutex<HashMap<Repo, Vec<Ref>>>,
    pub events: Mutex<HashMap<Repo, Vec<Event>>>,
    pub status_calls: Mutex<Vec<Status>>,
    pub pr_calls: Mutex<Vec<PullRequest>>,
    /// Repos that should fail every call against them, instead of the
    /// in-scope fixtures above — used to exercise per-repo failure
    /// isolation without aborting the whole tick.
    pub failing_repos: Mutex<Vec<Repo>>,
}

impl ScriptedHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pr(self, repo: &Repo, pr: PullRequest) -> Self {
        self.prs.lock().unwrap().entry(repo.clone()).or_default().push(pr);
        self
    }

    pub fn with_ref(self, repo: &Repo, r: Ref) -> Self {
        self.refs.lock().unwrap().entry(repo.clone()).or_default().push(r);
        self
    }

    pub fn with_status(self, status: Status) -> Self {
        self.statuses.lock().unwrap().entry(status.commit.clone()).or_default().push(status);
        self
    }

    pub fn fail_repo(self, repo: &Repo) -> Self {
        self.failing_repos.lock().unwrap().push(repo.clone());
        self
    }

    fn fails(&self, repo: &Repo) -> bool {
        self.failing_repos.lock().unwrap().contains(repo)
    }
}

#[async_trait]
impl HubClient for ScriptedHub {
    async fn user_exists(&self, _token: &HubToken, _user: &str) -> Result<bool, HubError> {
        Ok(true)
    }

    async fn repo_exists(&self, _token: &HubToken, repo: &Repo) -> Result<bool, HubError> {
        Ok(!self.fails(repo))
    }

    async fn repos(&self, _token: &HubToken, _user: &str) -> Result<Vec<Repo>, HubError> {
        Ok(self.prs.lock().unwrap().keys().cloned().collect())
    }

    async fn status(&self, _token: &HubToken, commit: &Commit) -> Result<Vec<Status>, HubError> {
        if self.fails(&commit.repo) {
            return Err(HubError::Request("scripted failure".to_string()));
        }
        Ok(self.statuses.lock().unwrap().get(commit).cloned().unwrap_or_default())
    }

    async fn set_status(&self, _token: &HubToken, status: &Status) -> Result<(), HubError> {
        self.status_calls.lock().unwrap().push(status.clone());
        Ok(())
    }

    async fn prs(&self, _token: &HubToken, repo: &Repo) -> Result<Vec<PullRequest>, HubError> {
        if self.fails(repo) {
            return Err(HubError::Request("scripted failure".to_string()));
        }
        Ok(self.prs.lock().unwrap().get(repo).cloned().unwrap_or_default())
    }

    async fn set_pr(&self, _token: &HubToken, pr: &PullRequest) -> Result<(), HubError> {
        self.pr_calls.lock().unwrap().push(pr.clone());
        Ok(())
    }

    async fn refs(&self, _token: &HubToken, repo: &Repo) -> Result<Vec<Ref>, HubError> {
        if self.fails(repo) {
            return Err(HubError::Request("scripted failure".to_string()));
        }
        Ok(self.refs.lock().unwrap().get(repo).cloned().unwrap_or_default())
    }

    async fn events(&self, _token: &HubToken, repo: &Repo) -> Result<Vec<Event>, HubError> {
        Ok(self.events.lock().unwrap().get(repo).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_repo_errors_every_call_but_leaves_others_alone() {
        let r = repo("alice", "proj");
        let other = repo("alice", "other");
        let hub = ScriptedHub::new()
            .with_pr(&other, open_pr(&other, 1, "abc", "x"))
            .fail_repo(&r);
        let token = HubToken::new("t");
        assert!(hub.prs(&token, &r).await.is_err());
        assert_eq!(hub.prs(&token, &other).await.unwrap().len(), 1);
    }
}
