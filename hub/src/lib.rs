//! A `HubClient` backed by the GitHub REST API.
//!
//! Talks JSON over `reqwest`, follows `Link: rel="next"` pagination, and
//! backs off with jittered exponential delay on 403 (secondary rate limit)
//! and 429 responses before giving up and returning `HubError::RateLimited`.

use std::time::Duration;

use async_trait::async_trait;
use prbridge::entities::{Commit, Event, PathSegments, PullRequest, Ref, Repo, Status};
use prbridge::hub_client::{HubClient, HubError, HubToken};
use reqwest::{Method, StatusCode};
use serde::Deserialize;

mod model;

use model::{GhCombinedStatus, GhEvent, GhPullRequest, GhRef, GhRepo, GhStatus};

const DEFAULT_BASE_URL: &str = "https://api.github.com";
const MAX_ATTEMPTS: u32 = 5;

/// A GitHub-backed `HubClient`.
///
/// One client is shared across every repo and every tick; it carries no
/// per-request state beyond the `reqwest::Client` connection pool.
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
}

impl GithubClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Points the client at something other than `api.github.com` — used to
    /// test against a GitHub Enterprise install, or a local stub server.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .user_agent("prbridge")
                .build()
                .expect("building the GitHub http client"),
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends one request, retrying with exponential backoff on 403/429.
    /// Any other non-2xx response is mapped straight to a `HubError`.
    async fn send(&self, method: Method, path: &str, token: &HubToken, body: Option<&serde_json::Value>) -> Result<reqwest::Response, HubError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut req = self
                .http
                .request(method.clone(), self.url(path))
                .bearer_auth(token.as_str())
                .header("Accept", "application/vnd.github+json");
            if let Some(body) = body {
                req = req.json(body);
            }
            let response = req.send().await.map_err(|err| HubError::Request(err.to_string()))?;

            match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if is_auth_rejection(&response) => {
                    return Err(HubError::Unauthorized);
                }
                StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS => {
                    if attempt >= MAX_ATTEMPTS {
                        return Err(HubError::RateLimited(format!(
                            "giving up on {path} after {attempt} attempts"
                        )));
                    }
                    let delay = backoff_delay(attempt);
                    tracing::warn!(path, attempt, delay_ms = delay.as_millis() as u64, "hub rate-limited request, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                status if status.is_success() => return Ok(response),
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(HubError::Protocol(format!("{path} returned {status}: {body}")));
                }
            }
        }
    }

    /// GETs `path` and follows `Link: rel="next"` until exhausted, collecting
    /// every page's items into one `Vec`.
    async fn get_all<T: for<'de> Deserialize<'de>>(&self, token: &HubToken, path: &str) -> Result<Vec<T>, HubError> {
        let mut items = Vec::new();
        let mut next = Some(path.to_string());
        while let Some(path) = next {
            let response = self.send(Method::GET, &path, token, None).await?;
            next = response
                .headers()
                .get(reqwest::header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link_from_header)
                .map(|full_url| full_url.trim_start_matches(&self.base_url).to_string());
            let page: Vec<T> = response.json().await.map_err(|err| HubError::Protocol(err.to_string()))?;
            items.extend(page);
        }
        Ok(items)
    }
}

impl Default for GithubClient {
    fn default() -> Self {
        Self::new()
    }
}

fn is_auth_rejection(response: &reqwest::Response) -> bool {
    response.status() == StatusCode::UNAUTHORIZED
        || response
            .headers()
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|remaining| remaining != "0")
            .unwrap_or(true)
}

fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 200u64.saturating_mul(1u64 << attempt.min(8));
    Duration::from_millis(base_ms.min(30_000))
}

/// Pulls the `rel="next"` URL out of a GitHub `Link` header, e.g.
/// `<https://api.github.com/...&page=2>; rel="next", <...>; rel="last"`.
fn next_link_from_header(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut segments = part.split(';');
        let url = segments.next()?.trim().trim_start_matches('<').trim_end_matches('>');
        let is_next = segments.any(|attr| attr.trim() == r#"rel="next""#);
        is_next.then(|| url.to_string())
    })
}

/// `refs/heads/main` -> `["main"]`; anything not under `refs/heads/` is kept
/// verbatim, segmented on `/`.
fn ref_name_to_segments(git_ref: &str) -> PathSegments {
    let trimmed = git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref);
    PathSegments::new(trimmed.split('/'))
}

fn segments_to_ref_name(name: &PathSegments) -> String {
    format!("refs/heads/{}", name.as_slice().join("/"))
}

fn status_context_to_segments(context: &str) -> PathSegments {
    PathSegments::new(context.split('/'))
}

fn segments_to_status_context(context: &PathSegments) -> String {
    context.as_slice().join("/")
}

#[async_trait]
impl HubClient for GithubClient {
    async fn user_exists(&self, token: &HubToken, user: &str) -> Result<bool, HubError> {
        match self.send(Method::GET, &format!("/users/{user}"), token, None).await {
            Ok(_) => Ok(true),
            Err(HubError::Protocol(msg)) if msg.contains("404") => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn repo_exists(&self, token: &HubToken, repo: &Repo) -> Result<bool, HubError> {
        match self
            .send(Method::GET, &format!("/repos/{}/{}", repo.user, repo.repo), token, None)
            .await
        {
            Ok(_) => Ok(true),
            Err(HubError::Protocol(msg)) if msg.contains("404") => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn repos(&self, token: &HubToken, user: &str) -> Result<Vec<Repo>, HubError> {
        let repos: Vec<GhRepo> = self.get_all(token, &format!("/users/{user}/repos?per_page=100")).await?;
        Ok(repos.into_iter().map(|r| Repo::new(r.owner.login, r.name)).collect())
    }

    async fn status(&self, token: &HubToken, commit: &Commit) -> Result<Vec<Status>, HubError> {
        let path = format!(
            "/repos/{}/{}/commits/{}/status",
            commit.repo.user, commit.repo.repo, commit.id
        );
        let response = self.send(Method::GET, &path, token, None).await?;
        let combined: GhCombinedStatus = response.json().await.map_err(|err| HubError::Protocol(err.to_string()))?;
        combined
            .statuses
            .into_iter()
            .map(|s| gh_status_to_status(commit, s))
            .collect()
    }

    async fn set_status(&self, token: &HubToken, status: &Status) -> Result<(), HubError> {
        let path = format!(
            "/repos/{}/{}/statuses/{}",
            status.commit.repo.user, status.commit.repo.repo, status.commit.id
        );
        let body = serde_json::json!({
            "state": status.state.as_str(),
            "target_url": status.url,
            "description": status.description,
            "context": segments_to_status_context(&status.context),
        });
        self.send(Method::POST, &path, token, Some(&body)).await?;
        Ok(())
    }

    async fn prs(&self, token: &HubToken, repo: &Repo) -> Result<Vec<PullRequest>, HubError> {
        let path = format!("/repos/{}/{}/pulls?state=open&per_page=100", repo.user, repo.repo);
        let prs: Vec<GhPullRequest> = self.get_all(token, &path).await?;
        prs.into_iter().map(|p| gh_pr_to_pr(repo, p)).collect()
    }

    async fn set_pr(&self, token: &HubToken, pr: &PullRequest) -> Result<(), HubError> {
        let path = format!("/repos/{}/{}/pulls/{}", pr.repo().user, pr.repo().repo, pr.number);
        let body = serde_json::json!({
            "state": pr.state.as_str(),
            "title": pr.title,
        });
        self.send(Method::PATCH, &path, token, Some(&body)).await?;
        Ok(())
    }

    async fn refs(&self, token: &HubToken, repo: &Repo) -> Result<Vec<Ref>, HubError> {
        let path = format!("/repos/{}/{}/git/refs/heads?per_page=100", repo.user, repo.repo);
        let refs: Vec<GhRef> = self.get_all(token, &path).await?;
        Ok(refs
            .into_iter()
            .map(|r| Ref::new(Commit::new(repo.clone(), r.object.sha), ref_name_to_segments(&r.r#ref)))
            .collect())
    }

    async fn events(&self, token: &HubToken, repo: &Repo) -> Result<Vec<Event>, HubError> {
        let path = format!("/repos/{}/{}/events?per_page=100", repo.user, repo.repo);
        let events: Vec<GhEvent> = self.get_all(token, &path).await?;
        Ok(events.into_iter().map(gh_event_to_event).collect())
    }
}

fn gh_status_to_status(commit: &Commit, s: GhStatus) -> Result<Status, HubError> {
    let state = prbridge::entities::StatusState::parse(&s.state)
        .ok_or_else(|| HubError::Protocol(format!("unrecognized status state {:?}", s.state)))?;
    Ok(Status::new(
        commit.clone(),
        status_context_to_segments(&s.context),
        s.target_url,
        s.description,
        state,
    ))
}

fn gh_pr_to_pr(repo: &Repo, p: GhPullRequest) -> Result<PullRequest, HubError> {
    let state = prbridge::entities::PrState::parse(&p.state)
        .ok_or_else(|| HubError::Protocol(format!("unrecognized pr state {:?}", p.state)))?;
    Ok(PullRequest::new(
        Commit::new(repo.clone(), p.head.sha),
        p.number,
        state,
        p.title,
    ))
}

fn gh_event_to_event(e: GhEvent) -> Event {
    match e.r#type.as_str() {
        "PullRequestEvent" => Event::Other("pull_request".to_string()),
        "StatusEvent" => Event::Other("status".to_string()),
        "PushEvent" => Event::Other("push".to_string()),
        other => Event::Other(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_header_extracts_next_relation() {
        let header = r#"<https://api.github.com/resource?page=2>; rel="next", <https://api.github.com/resource?page=5>; rel="last""#;
        assert_eq!(
            next_link_from_header(header),
            Some("https://api.github.com/resource?page=2".to_string())
        );
    }

    #[test]
    fn link_header_without_next_relation_returns_none() {
        let header = r#"<https://api.github.com/resource?page=1>; rel="prev""#;
        assert_eq!(next_link_from_header(header), None);
    }

    #[test]
    fn ref_name_strips_heads_prefix() {
        assert_eq!(ref_name_to_segments("refs/heads/main").as_slice(), &["main".to_string()]);
        assert_eq!(
            ref_name_to_segments("refs/heads/feature/x").as_slice(),
            &["feature".to_string(), "x".to_string()]
        );
    }

    #[test]
    fn ref_name_round_trips_through_segments() {
        let name = PathSegments::new(["release", "1.0"]);
        assert_eq!(ref_name_to_segments(&segments_to_ref_name(&name)), name);
    }

    #[test]
    fn status_context_round_trips_through_segments() {
        let context = PathSegments::new(["ci", "build"]);
        assert_eq!(status_context_to_segments(&segments_to_status_context(&context)), context);
    }

    #[test]
    fn backoff_grows_but_is_capped() {
        assert!(backoff_delay(1) < backoff_delay(4));
        assert!(backoff_delay(8) <= Duration::from_secs(30));
    }
}
