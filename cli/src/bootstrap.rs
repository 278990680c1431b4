//! One-time wiring that gets configured repos onto the private branch so
//! the engine's own repo-discovery (union of both branches' tracked repos)
//! has something to find on a brand-new Store. Not part of the sync
//! engine itself — the engine never needs to be told which repos exist,
//! it only ever looks at what is already committed.

use std::collections::BTreeSet;

use anyhow::{bail, Context, Result};
use prbridge::conversion;
use prbridge::entities::Repo;
use prbridge::store::mem::with_transaction;
use prbridge::store::Branch;
use prbridge::{HubClient, HubToken};

pub fn parse_repo(spec: &str) -> Result<Repo> {
    let (user, repo) = spec
        .split_once('/')
        .with_context(|| format!("repo {spec:?} is not in owner/name form"))?;
    Ok(Repo::new(user, repo))
}

/// Writes one ref per configured repo onto `priv_branch`, skipping any repo
/// the branch already tracks. A no-op once the branch has seen a repo once.
pub async fn seed_repos(
    hub: &dyn HubClient,
    token: &HubToken,
    priv_branch: &dyn Branch,
    already_tracked: &BTreeSet<Repo>,
    repos: &[String],
) -> Result<()> {
    let missing: Vec<Repo> = repos
        .iter()
        .map(|s| parse_repo(s))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .filter(|repo| !already_tracked.contains(repo))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let mut fetched = Vec::new();
    for repo in &missing {
        let refs = hub
            .refs(token, repo)
            .await
            .with_context(|| format!("fetching refs for {repo} while seeding"))?;
        fetched.push(refs);
    }

    let wrote = with_transaction(priv_branch, "Seed tracked repos", |mut tr| async move {
        let mut wrote_any = false;
        for refs in &fetched {
            for r in refs {
                conversion::update_ref(tr.as_mut(), r);
                wrote_any = true;
            }
        }
        Ok((tr, wrote_any.then_some(())))
    })
    .await
    .context("committing seeded repos")?;

    if wrote.is_none() {
        bail!("none of the configured repos had any refs to seed from");
    }
    Ok(())
}
