//! Hub → Store direction: fetch the Hub's view of a set of repos
//! and fold it onto a prior snapshot. Per-repo and per-commit failures are
//! logged and contribute nothing rather than aborting the whole import —
//! the Hub is an unreliable collaborator, not a trusted source of truth.

use std::collections::BTreeSet;

use futures::future::join_all;

use crate::entities::{Commit, PrState, PullRequest, Repo};
use crate::hub_client::{HubClient, HubToken};
use crate::snapshot::Snapshot;

async fn fetch_prs(hub: &dyn HubClient, token: &HubToken, repo: &Repo) -> Vec<PullRequest> {
    match hub.prs(token, repo).await {
        Ok(prs) => prs,
        Err(err) => {
            tracing::warn!(%repo, error = %err, "failed to fetch open PRs, repo contributes nothing this tick");
            Vec::new()
        }
    }
}

async fn fetch_refs(hub: &dyn HubClient, token: &HubToken, repo: &Repo) -> Vec<crate::entities::Ref> {
    match hub.refs(token, repo).await {
        Ok(refs) => refs,
        Err(err) => {
            tracing::warn!(%repo, error = %err, "failed to fetch refs, repo contributes nothing this tick");
            Vec::new()
        }
    }
}

async fn fetch_statuses(hub: &dyn HubClient, token: &HubToken, commit: &Commit) -> Vec<crate::entities::Status> {
    match hub.status(token, commit).await {
        Ok(statuses) => statuses,
        Err(err) => {
            tracing::warn!(commit = %commit.id, repo = %commit.repo, error = %err, "failed to fetch statuses");
            Vec::new()
        }
    }
}

/// Builds the Hub's current view of `repos` and folds it onto
/// `old_snapshot`.
pub async fn import(
    hub: &dyn HubClient,
    token: &HubToken,
    old_snapshot: &Snapshot,
    repos: &BTreeSet<Repo>,
) -> Snapshot {
    let pr_futures = repos.iter().map(|repo| fetch_prs(hub, token, repo));
    let ref_futures = repos.iter().map(|repo| fetch_refs(hub, token, repo));
    let (pr_results, ref_results) = futures::join!(join_all(pr_futures), join_all(ref_futures));

    let fetched_prs: Vec<PullRequest> = pr_results.into_iter().flatten().collect();
    let fetched_refs: Vec<crate::entities::Ref> = ref_results.into_iter().flatten().collect();

    let commits: BTreeSet<Commit> = fetched_prs
        .iter()
        .map(|p| p.head.clone())
        .chain(fetched_refs.iter().map(|r| r.head.clone()))
        .collect();

    let status_futures = commits.iter().map(|commit| fetch_statuses(hub, token, commit));
    let statuses: Vec<crate::entities::Status> = join_all(status_futures).await.into_iter().flatten().collect();

    // Closed-PR synthesis: an open PR we previously knew about that the Hub
    // no longer lists as open, in a repo we actually queried, is inferred closed.
    let fetched_open: BTreeSet<(Repo, u64)> = fetched_prs.iter().map(|p| (p.repo().clone(), p.number)).collect();
    let closed: Vec<PullRequest> = old_snapshot
        .prs
        .iter()
        .filter(|p| {
            p.state == PrState::Open
                && repos.contains(p.repo())
                && !fetched_open.contains(&(p.repo().clone(), p.number))
        })
        .map(|p| p.with_state(PrState::Closed))
        .collect();

    let mut snapshot = old_snapshot.clone();
    for pr in closed {
        snapshot = snapshot.replace_pr(pr);
    }
    for pr in fetched_prs {
        snapshot = snapshot.replace_pr(pr);
    }
    for r in fetched_refs {
        snapshot = snapshot.replace_ref(r);
    }
    for commit in commits {
        snapshot = snapshot.add_commit(commit);
    }
    for status in statuses {
        snapshot = snapshot.replace_status(status);
    }

    snapshot
}
