//! Immutable value types shared by every other module.
//!
//! Everything here is cheap to clone and orders lexicographically so that
//! [`crate::snapshot::Snapshot`] can keep its five sets in sorted
//! (`BTreeSet`) collections and define a total ordering over itself.

use std::fmt;

/// An ordered sequence of path segments, used for status contexts and ref
/// names. An empty status context is distinct from `PathSegments(vec![])`
/// at the API boundary: callers normalize it to `["default"]` before it
/// reaches a [`Status`] (see [`Status::new`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct PathSegments(pub Vec<String>);

impl PathSegments {
    pub fn new(segments: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All but the last segment, used to recover a ref name from a diff path
    /// that points at one of its leaf files.
    pub fn without_last(&self) -> Self {
        let mut segments = self.0.clone();
        segments.pop();
        Self(segments)
    }
}

impl fmt::Display for PathSegments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

impl<S: Into<String>> FromIterator<S> for PathSegments {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// A code-hosting repository, identified by owner and name.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Repo {
    pub user: String,
    pub repo: String,
}

impl Repo {
    pub fn new(user: impl Into<String>, repo: impl Into<String>) -> Self {
        let user = user.into();
        let repo = repo.into();
        assert!(!user.is_empty(), "repo user must be non-empty");
        assert!(!repo.is_empty(), "repo name must be non-empty");
        Self { user, repo }
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.repo)
    }
}

/// An opaque, content-addressed-looking commit id. Never parsed, only
/// compared and rendered.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Commit {
    pub repo: Repo,
    pub id: String,
}

impl Commit {
    pub fn new(repo: Repo, id: impl Into<String>) -> Self {
        Self { repo, id: id.into() }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum PrState {
    Open,
    Closed,
}

impl PrState {
    pub fn as_str(self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(PrState::Open),
            "closed" => Some(PrState::Closed),
            _ => None,
        }
    }
}

/// A pull request. Identity within a repo is `number`; `head.repo` must
/// equal the PR's own repo (enforced in [`PullRequest::new`]).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PullRequest {
    pub head: Commit,
    pub number: u64,
    pub state: PrState,
    pub title: String,
}

impl PullRequest {
    pub fn new(head: Commit, number: u64, state: PrState, title: impl Into<String>) -> Self {
        assert!(number > 0, "PR number must be positive");
        Self {
            head,
            number,
            state,
            title: title.into(),
        }
    }

    pub fn repo(&self) -> &Repo {
        &self.head.repo
    }

    pub fn with_state(&self, state: PrState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum StatusState {
    Error,
    Pending,
    Success,
    Failure,
}

impl StatusState {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusState::Error => "error",
            StatusState::Pending => "pending",
            StatusState::Success => "success",
            StatusState::Failure => "failure",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "error" => Some(StatusState::Error),
            "pending" => Some(StatusState::Pending),
            "success" => Some(StatusState::Success),
            "failure" => Some(StatusState::Failure),
            _ => None,
        }
    }
}

/// A commit status (a.k.a. check) on one context path. An empty `context`
/// means the logical context `["default"]`; [`Status::new`] performs that
/// normalization so identity comparisons never have to special-case it.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Status {
    pub commit: Commit,
    pub context: PathSegments,
    pub url: Option<String>,
    pub description: Option<String>,
    pub state: StatusState,
}

impl Status {
    pub fn new(
        commit: Commit,
        context: PathSegments,
        url: Option<String>,
        description: Option<String>,
        state: StatusState,
    ) -> Self {
        let context = if context.is_empty() {
            PathSegments::new(["default"])
        } else {
            context
        };
        Self {
            commit,
            context,
            url,
            description,
            state,
        }
    }
}

/// A named ref (branch/tag-like pointer) in a repo. Identity within a repo
/// is `name`; unlike [`PullRequest`] and [`Status`] the ref's head commit is
/// not required to appear in the snapshot's `commits` set (see
/// `crate::prune` for why).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Ref {
    pub head: Commit,
    pub name: PathSegments,
}

impl Ref {
    pub fn new(head: Commit, name: PathSegments) -> Self {
        assert!(!name.is_empty(), "ref name must be non-empty");
        Self { head, name }
    }

    pub fn repo(&self) -> &Repo {
        &self.head.repo
    }
}

/// An event reported by the Hub, used only to decide that a re-sync is
/// warranted; the engine never inspects the payload of `Other`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Event {
    Pr(PullRequest),
    Status(Status),
    Ref(Ref),
    Other(String),
}
