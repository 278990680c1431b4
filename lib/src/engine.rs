//! The sync engine: orchestrates import, prune, write, and merge
//! into ticks, and drives the `Once`/`Repeat` run policies over them.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Notify;

use crate::branch_view::BranchView;
use crate::conversion::{self, ConversionError};
use crate::entities::{PullRequest, Repo};
use crate::hub_client::{HubClient, HubToken};
use crate::hub_export;
use crate::hub_import;
use crate::prune::{self, PruneResult};
use crate::snapshot::Snapshot;
use crate::store::{Branch, CancelSwitch, CommitId, StoreError, Transaction};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("a freshly opened transaction had no parent")]
    ZeroParents,
    #[error("a freshly opened transaction had {0} parents, expected exactly one")]
    TooManyParents(usize),
    #[error("expected branch {0:?} to exist after init_sync")]
    BranchMissingAfterInit(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunPolicy {
    Once,
    Repeat,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: RunPolicy,
    pub dry_updates: bool,
    /// Upper bound on how long a branch watcher waits before re-checking
    /// the cancellation switch, used as a fallback for Store
    /// implementations without a push-based watch.
    pub poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: RunPolicy::Repeat,
            dry_updates: false,
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// The last synchronized snapshots of both branches, carried from one tick
/// to the next. Each snapshot is paired with the commit it was captured at,
/// so the next `BranchView::open` can diff the branch's current tree
/// against that exact commit rather than against its own (always
/// identical) fresh parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
    pub pub_snapshot: Snapshot,
    pub pub_head: CommitId,
    pub priv_snapshot: Snapshot,
    pub priv_head: CommitId,
}

pub struct SyncEngine {
    hub: Arc<dyn HubClient>,
    token: HubToken,
    pub_branch: Arc<dyn Branch>,
    priv_branch: Arc<dyn Branch>,
    config: EngineConfig,
}

impl SyncEngine {
    pub fn new(
        hub: Arc<dyn HubClient>,
        token: HubToken,
        pub_branch: Arc<dyn Branch>,
        priv_branch: Arc<dyn Branch>,
        config: EngineConfig,
    ) -> Self {
        Self {
            hub,
            token,
            pub_branch,
            priv_branch,
            config,
        }
    }

    /// Ensures both branches exist and share an ancestor.
    pub async fn init_sync(&self) -> Result<(), EngineError> {
        let pub_head = self.pub_branch.head().await?;
        let priv_head = self.priv_branch.head().await?;
        match (pub_head, priv_head) {
            (None, None) => {
                let mut tr = self.priv_branch.transaction().await?;
                tr.create_or_replace_file("README", "Synchronized by prbridge.\n");
                let id = tr.commit("Initial commit").await?;
                self.pub_branch.fast_forward(&id).await?;
            }
            (None, Some(priv_id)) => self.pub_branch.fast_forward(&priv_id).await?,
            (Some(pub_id), None) => self.priv_branch.fast_forward(&pub_id).await?,
            (Some(_), Some(_)) => {}
        }

        if self.pub_branch.head().await?.is_none() {
            return Err(EngineError::BranchMissingAfterInit(self.pub_branch.name().to_owned()));
        }
        if self.priv_branch.head().await?.is_none() {
            return Err(EngineError::BranchMissingAfterInit(self.priv_branch.name().to_owned()));
        }
        Ok(())
    }

    /// Builds both branch views from scratch, and if either side already
    /// knows about a repo, runs a full sync tick.
    pub async fn first_sync(&self) -> Result<SyncState, EngineError> {
        let pub_view = BranchView::open(self.pub_branch.as_ref(), None).await?;
        let priv_view = BranchView::open(self.priv_branch.as_ref(), None).await?;
        let repos: BTreeSet<Repo> = pub_view.snapshot.repos.union(&priv_view.snapshot.repos).cloned().collect();

        if repos.is_empty() {
            let state = SyncState {
                pub_snapshot: pub_view.snapshot.clone(),
                pub_head: pub_view.head.clone(),
                priv_snapshot: priv_view.snapshot.clone(),
                priv_head: priv_view.head.clone(),
            };
            pub_view.tr.abort().await;
            priv_view.tr.abort().await;
            return Ok(state);
        }

        let result = self.sync_repos(priv_view, pub_view, repos).await?;
        hub_export::call_api(
            self.hub.as_ref(),
            &self.token,
            &result.priv_snapshot,
            &result.pub_snapshot,
            self.config.dry_updates,
        )
        .await;
        Ok(result)
    }

    /// Pushes user edits outward (read incrementally, against the commit
    /// `old` was captured at), then re-syncs every repo currently tracked
    /// on either branch. The repo set can only grow from one tick to the
    /// next (nothing ever removes an entry from `Snapshot::repos`), so this
    /// is equivalent to re-importing the full known set — a narrower
    /// "only what changed locally" set would never notice a Hub-side-only
    /// change (a PR closing, a status flipping) for a repo nothing local
    /// touched, defeating the point of polling the Hub at all.
    pub async fn sync_once(&self, old: &SyncState) -> Result<SyncState, EngineError> {
        let pub_view = BranchView::open(self.pub_branch.as_ref(), Some((&old.pub_snapshot, &old.pub_head))).await?;
        hub_export::call_api(
            self.hub.as_ref(),
            &self.token,
            &old.pub_snapshot,
            &pub_view.snapshot,
            self.config.dry_updates,
        )
        .await;

        let priv_view =
            BranchView::open(self.priv_branch.as_ref(), Some((&old.priv_snapshot, &old.priv_head))).await?;

        let repos: BTreeSet<Repo> = pub_view.snapshot.repos.union(&priv_view.snapshot.repos).cloned().collect();

        if repos.is_empty() {
            let state = SyncState {
                pub_snapshot: pub_view.snapshot.clone(),
                pub_head: pub_view.head.clone(),
                priv_snapshot: priv_view.snapshot.clone(),
                priv_head: priv_view.head.clone(),
            };
            pub_view.tr.abort().await;
            priv_view.tr.abort().await;
            return Ok(state);
        }

        self.sync_repos(priv_view, pub_view, repos).await
    }

    /// The central operation: import the Hub's view into `priv`,
    /// prune both sides, write priv back, and merge priv into pub.
    async fn sync_repos(
        &self,
        mut priv_view: BranchView,
        pub_view: BranchView,
        repos: BTreeSet<Repo>,
    ) -> Result<SyncState, EngineError> {
        // 1-2: import the Hub's view of `repos` onto priv, then prune it.
        let imported = hub_import::import(self.hub.as_ref(), &self.token, &priv_view.snapshot, &repos).await;
        let prune_result = prune::prune(&imported);
        let priv_s = match &prune_result {
            PruneResult::Clean => imported,
            PruneResult::Prune { snapshot, .. } => snapshot.clone(),
        };

        // 3: apply prune cleanups to priv's tree, if any.
        if let PruneResult::Prune { removed_prs, removed_commits, .. } = &prune_result {
            apply_prune_cleanup(priv_view.tr.as_mut(), removed_prs, removed_commits);
        }

        // 4: write the reconciled snapshot back into priv's tree.
        for repo in &repos {
            conversion::write_repo(priv_view.tr.as_mut(), &priv_s, repo);
        }

        // 5: commit priv only if something actually changed.
        let priv_diff_empty = priv_view.tr.diff_against(&priv_view.head).await?.is_empty();
        let priv_head = if prune_result.is_clean() && priv_diff_empty {
            let head = priv_view.head.clone();
            priv_view.tr.abort().await;
            head
        } else {
            priv_view
                .tr
                .commit(&format!("Sync with {}", format_repo_set(&repos)))
                .await?
        };

        // 6-7: drop the stale pub transaction, open a fresh one, and merge
        // priv's new head into it.
        pub_view.tr.abort().await;
        let fresh_pub_view = BranchView::open(self.pub_branch.as_ref(), None).await?;
        let pub_view = self.merge(fresh_pub_view, &priv_head, &priv_s).await?;

        // 8: prune pub's own snapshot, committing the cleanup if any.
        let (pub_snapshot, pub_head) = match prune::prune(&pub_view.snapshot) {
            PruneResult::Clean => {
                let snapshot = pub_view.snapshot.clone();
                let head = pub_view.head.clone();
                pub_view.tr.abort().await;
                (snapshot, head)
            }
            PruneResult::Prune {
                snapshot,
                removed_prs,
                removed_commits,
            } => {
                let mut pub_view = pub_view;
                apply_prune_cleanup(pub_view.tr.as_mut(), &removed_prs, &removed_commits);
                let head = pub_view.tr.commit("Prune").await?;
                (snapshot, head)
            }
        };

        Ok(SyncState {
            priv_snapshot: priv_s,
            priv_head,
            pub_snapshot,
            pub_head,
        })
    }

    /// Merges `priv_head`/`priv_snapshot` into `pub_view`'s tree, resolving
    /// conflicts with "user mutation wins over imported state" , and
    /// returns a fresh view over the result.
    async fn merge(
        &self,
        mut pub_view: BranchView,
        priv_head: &CommitId,
        priv_snapshot: &Snapshot,
    ) -> Result<BranchView, EngineError> {
        if pub_view.snapshot == *priv_snapshot {
            pub_view.tr.abort().await;
            return Ok(BranchView::open(self.pub_branch.as_ref(), None).await?);
        }

        let outcome = pub_view.tr.merge(priv_head).await?;
        for path in &outcome.conflicts {
            let (dir, file) = split_last(path);
            let ours = outcome.ours.read_file(path);
            let theirs = outcome.theirs.read_file(path);
            match (ours, theirs) {
                (None, None) => pub_view.tr.remove(&dir),
                (Some(value), _) | (None, Some(value)) => {
                    pub_view.tr.create_or_replace_file(&join(&dir, &file), &value)
                }
            }
        }

        let diff_empty = pub_view.tr.diff_against(&pub_view.head).await?.is_empty();
        if diff_empty {
            pub_view.tr.abort().await;
        } else {
            let message = format!(
                "Merge {} ({} conflict{})",
                self.priv_branch.name(),
                outcome.conflicts.len(),
                if outcome.conflicts.len() == 1 { "" } else { "s" }
            );
            pub_view.tr.commit(&message).await?;
        }
        Ok(BranchView::open(self.pub_branch.as_ref(), None).await?)
    }

    /// Runs the engine to completion per `self.config.policy`: Starting ->
    /// Running via `first_sync`, then either a single `sync_once` or a
    /// repeating watch/reactor loop.
    pub async fn run(&self, switch: CancelSwitch) -> Result<(), EngineError> {
        self.init_sync().await?;
        match self.config.policy {
            RunPolicy::Once => {
                self.first_sync().await?;
                Ok(())
            }
            RunPolicy::Repeat => self.run_repeat(switch).await,
        }
    }

    async fn run_repeat(&self, switch: CancelSwitch) -> Result<(), EngineError> {
        let dirty = Arc::new(AtomicBool::new(true));
        let notify = Arc::new(Notify::new());

        let pub_watch = tokio::spawn(watch_loop(
            self.pub_branch.clone(),
            switch.clone(),
            dirty.clone(),
            notify.clone(),
            self.config.poll_interval,
        ));
        let priv_watch = tokio::spawn(watch_loop(
            self.priv_branch.clone(),
            switch.clone(),
            dirty.clone(),
            notify.clone(),
            self.config.poll_interval,
        ));

        let mut state: Option<SyncState> = None;
        loop {
            tokio::select! {
                _ = notify.notified() => {}
                _ = switch.cancelled() => break,
            }
            if switch.is_cancelled() {
                break;
            }
            if !dirty.swap(false, Ordering::SeqCst) {
                continue;
            }
            let tick = match &state {
                None => self.first_sync().await,
                Some(previous) => self.sync_once(previous).await,
            };
            match tick {
                Ok(new_state) => state = Some(new_state),
                Err(err) => tracing::error!(error = %err, "sync tick failed, remaining in Running state"),
            }
        }

        pub_watch.abort();
        priv_watch.abort();
        Ok(())
    }
}

async fn watch_loop(
    branch: Arc<dyn Branch>,
    switch: CancelSwitch,
    dirty: Arc<AtomicBool>,
    notify: Arc<Notify>,
    poll_interval: Duration,
) {
    loop {
        if switch.is_cancelled() {
            return;
        }
        tokio::select! {
            result = branch.wait_for_head(&switch) => {
                if result.is_err() {
                    return;
                }
            }
            _ = tokio::time::sleep(poll_interval) => {}
            _ = switch.cancelled() => return,
        }
        if switch.is_cancelled() {
            return;
        }
        dirty.store(true, Ordering::SeqCst);
        notify.notify_one();
    }
}

fn apply_prune_cleanup(tr: &mut dyn Transaction, removed_prs: &[PullRequest], removed_commits: &[crate::entities::Commit]) {
    for pr in removed_prs {
        tr.remove(&conversion::pr_dir(pr.repo(), pr.number));
    }
    for commit in removed_commits {
        tr.remove(&conversion::commit_dir(&commit.repo, &commit.id));
    }
}

fn split_last(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some((dir, file)) => (dir.to_owned(), file.to_owned()),
        None => (String::new(), path.to_owned()),
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

fn format_repo_set(repos: &BTreeSet<Repo>) -> String {
    repos.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")
}
