//! Discards PRs and commits that are closed and no longer referenced, so
//! neither the in-memory snapshot nor the Store tree it mirrors grows
//! unboundedly.
//!
//! The commit-reachability check below considers only statuses, not refs: a
//! commit that is a ref head but carries no status is pruned from
//! `commits`, kept alive only indirectly through the ref's own `head`
//! field. This mirrors the asymmetry already present in
//! [`crate::snapshot::Snapshot::add_ref`] and is preserved deliberately
//! rather than "fixed" — see DESIGN.md.

use crate::entities::{Commit, PrState, PullRequest, Repo};
use crate::snapshot::Snapshot;

#[derive(Debug)]
pub enum PruneResult {
    /// `kept_snapshot == input_snapshot`; nothing to write back anywhere.
    Clean,
    Prune {
        snapshot: Snapshot,
        removed_prs: Vec<PullRequest>,
        removed_commits: Vec<Commit>,
    },
}

impl PruneResult {
    pub fn is_clean(&self) -> bool {
        matches!(self, PruneResult::Clean)
    }
}

struct RepoPrune {
    kept: Snapshot,
    removed_prs: Vec<PullRequest>,
    removed_commits: Vec<Commit>,
}

fn prune_repo(snapshot: &Snapshot, repo: &Repo) -> RepoPrune {
    let open_prs: Vec<&PullRequest> = snapshot
        .prs_in(repo)
        .filter(|p| p.state == PrState::Open)
        .collect();
    let closed_prs: Vec<PullRequest> = snapshot
        .prs_in(repo)
        .filter(|p| p.state != PrState::Open)
        .cloned()
        .collect();

    let reachable_heads: std::collections::BTreeSet<&Commit> = open_prs
        .iter()
        .map(|p| &p.head)
        .chain(snapshot.refs_in(repo).map(|r| &r.head))
        .collect();

    let open_statuses: Vec<_> = snapshot
        .statuses_in(repo)
        .filter(|s| reachable_heads.contains(&s.commit))
        .cloned()
        .collect();

    let reachable_commits: std::collections::BTreeSet<&Commit> =
        open_statuses.iter().map(|s| &s.commit).collect();

    let removed_commits: Vec<Commit> = snapshot
        .commits
        .iter()
        .filter(|c| &c.repo == repo && !reachable_commits.contains(c))
        .cloned()
        .collect();

    let mut kept = Snapshot::empty();
    kept.repos.insert(repo.clone());
    for pr in open_prs {
        kept = kept.add_pr(pr.clone());
    }
    for status in open_statuses {
        kept = kept.add_status(status);
    }
    for r in snapshot.refs_in(repo) {
        kept = kept.add_ref(r.clone());
    }
    for c in reachable_commits {
        kept = kept.add_commit(c.clone());
    }

    RepoPrune {
        kept,
        removed_prs: closed_prs,
        removed_commits,
    }
}

pub fn prune(snapshot: &Snapshot) -> PruneResult {
    let mut new_snapshot = Snapshot::empty();
    let mut all_removed_prs = Vec::new();
    let mut all_removed_commits = Vec::new();

    for repo in &snapshot.repos {
        let result = prune_repo(snapshot, repo);
        new_snapshot = new_snapshot.union(&result.kept);
        all_removed_prs.extend(result.removed_prs);
        all_removed_commits.extend(result.removed_commits);
    }

    if all_removed_prs.is_empty() && all_removed_commits.is_empty() {
        PruneResult::Clean
    } else {
        PruneResult::Prune {
            snapshot: new_snapshot,
            removed_prs: all_removed_prs,
            removed_commits: all_removed_commits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{PathSegments, Status, StatusState};

    fn repo() -> Repo {
        Repo::new("alice", "proj")
    }

    fn commit(id: &str) -> Commit {
        Commit::new(repo(), id)
    }

    #[test]
    fn clean_when_all_prs_open_and_reachable() {
        let pr = PullRequest::new(commit("deadbeef"), 7, PrState::Open, "add x");
        let status = Status::new(
            commit("deadbeef"),
            PathSegments::new(["ci", "build"]),
            None,
            None,
            StatusState::Success,
        );
        let s = Snapshot::empty().add_pr(pr).add_status(status);
        let result = prune(&s);
        assert!(result.is_clean());
    }

    #[test]
    fn closed_pr_and_its_commit_are_removed_when_unreachable() {
        let pr = PullRequest::new(commit("deadbeef"), 7, PrState::Closed, "add x");
        let status = Status::new(
            commit("deadbeef"),
            PathSegments::new(["ci", "build"]),
            None,
            None,
            StatusState::Success,
        );
        let s = Snapshot::empty().add_pr(pr.clone()).add_status(status);
        match prune(&s) {
            PruneResult::Prune {
                snapshot,
                removed_prs,
                removed_commits,
            } => {
                assert_eq!(removed_prs, vec![pr]);
                assert_eq!(removed_commits, vec![commit("deadbeef")]);
                assert!(!snapshot.has_commit(&repo(), "deadbeef"));
                assert!(snapshot.prs.is_empty());
            }
            PruneResult::Clean => panic!("expected a prune"),
        }
    }

    #[test]
    fn ref_only_commit_is_pruned_without_a_status() {
        use crate::entities::Ref;
        let r = Ref::new(commit("deadbeef"), PathSegments::new(["main"]));
        let s = Snapshot::empty().add_ref(r.clone());
        match prune(&s) {
            PruneResult::Prune {
                snapshot,
                removed_commits,
                ..
            } => {
                assert!(removed_commits.is_empty(), "ref head was never in `commits`");
                assert!(snapshot.refs.contains(&r));
            }
            PruneResult::Clean => {}
        }
    }

    #[test]
    fn idempotent() {
        let pr = PullRequest::new(commit("deadbeef"), 7, PrState::Closed, "x");
        let s = Snapshot::empty().add_pr(pr);
        let once = prune(&s);
        let snapshot = match once {
            PruneResult::Prune { snapshot, .. } => snapshot,
            PruneResult::Clean => panic!("first prune should not be clean"),
        };
        assert!(prune(&snapshot).is_clean());
    }

    #[test]
    fn preserves_open_prs_commits_statuses_and_refs() {
        use crate::entities::Ref;
        let open_pr = PullRequest::new(commit("aaaa"), 1, PrState::Open, "open");
        let closed_pr = PullRequest::new(commit("bbbb"), 2, PrState::Closed, "closed");
        let status = Status::new(
            commit("aaaa"),
            PathSegments::new(["ci"]),
            None,
            None,
            StatusState::Success,
        );
        let r = Ref::new(commit("cccc"), PathSegments::new(["main"]));
        let s = Snapshot::empty()
            .add_pr(open_pr.clone())
            .add_pr(closed_pr)
            .add_status(status.clone())
            .add_ref(r.clone());
        if let PruneResult::Prune { snapshot, .. } = prune(&s) {
            assert!(snapshot.prs.contains(&open_pr));
            assert!(snapshot.has_commit(&repo(), "aaaa"));
            assert!(snapshot.statuses.contains(&status));
            assert!(snapshot.refs.contains(&r));
        } else {
            panic!("expected the closed PR to trigger a prune");
        }
    }
}
