//! The in-memory data model: a value holding five sets of entities, with a
//! small pure algebra over it. Snapshots are plain
//! values — cloning one clones its `BTreeSet`s, which is cheap at the sizes
//! this bridge deals in (hundreds, not millions, of PRs/commits/refs per
//! repo) and keeps every operation free of shared mutable state.

use std::collections::BTreeSet;

use crate::entities::{Commit, PathSegments, PrState, PullRequest, Ref, Repo, Status};

/// Declaration order of the fields below is load-bearing: the derived
/// `PartialOrd`/`Ord` compares `repos`, then `commits`, then `statuses`,
/// then `prs`, then `refs` — the canonical total ordering over snapshots.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct Snapshot {
    pub repos: BTreeSet<Repo>,
    pub commits: BTreeSet<Commit>,
    pub statuses: BTreeSet<Status>,
    pub prs: BTreeSet<PullRequest>,
    pub refs: BTreeSet<Ref>,
}

impl Snapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            repos: self.repos.union(&other.repos).cloned().collect(),
            commits: self.commits.union(&other.commits).cloned().collect(),
            statuses: self.statuses.union(&other.statuses).cloned().collect(),
            prs: self.prs.union(&other.prs).cloned().collect(),
            refs: self.refs.union(&other.refs).cloned().collect(),
        }
    }

    // --- commits ---------------------------------------------------------

    pub fn add_commit(&self, commit: Commit) -> Self {
        let mut out = self.clone();
        out.repos.insert(commit.repo.clone());
        out.commits.insert(commit);
        out
    }

    pub fn remove_commit(&self, repo: &Repo, id: &str) -> Self {
        let mut out = self.clone();
        out.commits.retain(|c| !(&c.repo == repo && c.id == id));
        out
    }

    pub fn replace_commit(&self, commit: Commit) -> Self {
        self.remove_commit(&commit.repo, &commit.id).add_commit(commit)
    }

    // --- pull requests -----------------------------------------------------

    pub fn add_pr(&self, pr: PullRequest) -> Self {
        let mut out = self.clone();
        out.repos.insert(pr.repo().clone());
        out.commits.insert(pr.head.clone());
        out.prs.insert(pr);
        out
    }

    pub fn remove_pr(&self, repo: &Repo, number: u64) -> Self {
        let mut out = self.clone();
        out.prs.retain(|p| !(p.repo() == repo && p.number == number));
        out
    }

    pub fn replace_pr(&self, pr: PullRequest) -> Self {
        self.remove_pr(pr.repo(), pr.number).add_pr(pr)
    }

    // --- statuses ----------------------------------------------------------

    pub fn add_status(&self, status: Status) -> Self {
        let mut out = self.clone();
        out.repos.insert(status.commit.repo.clone());
        out.commits.insert(status.commit.clone());
        out.statuses.insert(status);
        out
    }

    pub fn remove_status(&self, commit: &Commit, context: &PathSegments) -> Self {
        let mut out = self.clone();
        out.statuses
            .retain(|s| !(&s.commit == commit && &s.context == context));
        out
    }

    pub fn replace_status(&self, status: Status) -> Self {
        self.remove_status(&status.commit, &status.context).add_status(status)
    }

    // --- refs ----------------------------------------------------------------

    pub fn add_ref(&self, r: Ref) -> Self {
        let mut out = self.clone();
        out.repos.insert(r.repo().clone());
        out.refs.insert(r);
        out
    }

    pub fn remove_ref(&self, repo: &Repo, name: &PathSegments) -> Self {
        let mut out = self.clone();
        out.refs.retain(|r| !(r.repo() == repo && &r.name == name));
        out
    }

    pub fn replace_ref(&self, r: Ref) -> Self {
        self.remove_ref(r.repo(), &r.name.clone()).add_ref(r)
    }

    // --- queries used by conversion/prune/hub_import -------------------------

    pub fn pr(&self, repo: &Repo, number: u64) -> Option<&PullRequest> {
        self.prs.iter().find(|p| p.repo() == repo && p.number == number)
    }

    pub fn status(&self, commit: &Commit, context: &PathSegments) -> Option<&Status> {
        self.statuses
            .iter()
            .find(|s| &s.commit == commit && &s.context == context)
    }

    pub fn ref_by_name(&self, repo: &Repo, name: &PathSegments) -> Option<&Ref> {
        self.refs.iter().find(|r| r.repo() == repo && &r.name == name)
    }

    pub fn has_commit(&self, repo: &Repo, id: &str) -> bool {
        self.commits.iter().any(|c| &c.repo == repo && c.id == id)
    }

    pub fn open_prs_in(&self, repo: &Repo) -> impl Iterator<Item = &PullRequest> {
        self.prs
            .iter()
            .filter(move |p| p.repo() == repo && p.state == PrState::Open)
    }

    /// The statuses/prs/refs that belong to `repo`, used when writing one
    /// repo's subtree back to the Store (`conversion::update_repo`).
    pub fn prs_in(&self, repo: &Repo) -> impl Iterator<Item = &PullRequest> {
        self.prs.iter().filter(move |p| p.repo() == repo)
    }

    pub fn statuses_in(&self, repo: &Repo) -> impl Iterator<Item = &Status> {
        self.statuses.iter().filter(move |s| &s.commit.repo == repo)
    }

    pub fn refs_in(&self, repo: &Repo) -> impl Iterator<Item = &Ref> {
        self.refs.iter().filter(move |r| r.repo() == repo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::StatusState;

    fn repo() -> Repo {
        Repo::new("alice", "proj")
    }

    fn commit(id: &str) -> Commit {
        Commit::new(repo(), id)
    }

    #[test]
    fn add_commit_also_adds_repo() {
        let s = Snapshot::empty().add_commit(commit("deadbeef"));
        assert!(s.repos.contains(&repo()));
        assert!(s.has_commit(&repo(), "deadbeef"));
    }

    #[test]
    fn add_pr_adds_head_and_repo_invariant() {
        let pr = PullRequest::new(commit("deadbeef"), 7, PrState::Open, "add x");
        let s = Snapshot::empty().add_pr(pr.clone());
        for p in &s.prs {
            assert!(s.commits.contains(&p.head));
            assert!(s.repos.contains(&p.head.repo));
        }
        assert_eq!(s.pr(&repo(), 7), Some(&pr));
    }

    #[test]
    fn add_status_adds_commit_and_repo_invariant() {
        let status = Status::new(
            commit("deadbeef"),
            PathSegments::new(["ci", "build"]),
            None,
            None,
            StatusState::Success,
        );
        let s = Snapshot::empty().add_status(status.clone());
        for x in &s.statuses {
            assert!(s.commits.contains(&x.commit));
            assert!(s.repos.contains(&x.commit.repo));
        }
        assert_eq!(
            s.status(&commit("deadbeef"), &PathSegments::new(["ci", "build"])),
            Some(&status)
        );
    }

    #[test]
    fn add_ref_does_not_add_commit() {
        let r = Ref::new(commit("deadbeef"), PathSegments::new(["main"]));
        let s = Snapshot::empty().add_ref(r);
        assert!(s.repos.contains(&repo()));
        assert!(!s.has_commit(&repo(), "deadbeef"));
    }

    #[test]
    fn remove_commit_does_not_touch_dependents() {
        let pr = PullRequest::new(commit("deadbeef"), 7, PrState::Open, "x");
        let s = Snapshot::empty().add_pr(pr.clone()).remove_commit(&repo(), "deadbeef");
        assert!(!s.has_commit(&repo(), "deadbeef"));
        assert_eq!(s.pr(&repo(), 7), Some(&pr));
    }

    #[test]
    fn replace_pr_enforces_identity_uniqueness() {
        let pr1 = PullRequest::new(commit("aaaa"), 7, PrState::Open, "first");
        let pr2 = PullRequest::new(commit("bbbb"), 7, PrState::Closed, "second");
        let s = Snapshot::empty().add_pr(pr1).replace_pr(pr2.clone());
        assert_eq!(s.prs.len(), 1);
        assert_eq!(s.pr(&repo(), 7), Some(&pr2));
    }

    #[test]
    fn union_is_set_wise() {
        let a = Snapshot::empty().add_commit(commit("aaaa"));
        let b = Snapshot::empty().add_commit(commit("bbbb"));
        let u = a.union(&b);
        assert!(u.has_commit(&repo(), "aaaa"));
        assert!(u.has_commit(&repo(), "bbbb"));
    }

    #[test]
    fn total_ordering_prefers_repos_then_commits() {
        let a = Snapshot::empty().add_commit(Commit::new(Repo::new("a", "p"), "x"));
        let b = Snapshot::empty().add_commit(Commit::new(Repo::new("b", "p"), "x"));
        assert!(a < b);
    }
}
