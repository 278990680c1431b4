//! Store → Hub direction: pushes the delta between two snapshots
//! out through the Hub client. Refs are never pushed outward — the Hub is
//! always the source of truth for ref movement.

use crate::hub_client::{HubClient, HubToken};
use crate::snapshot::Snapshot;

/// Computes `new \ old` over statuses and PRs and calls the Hub for each.
/// In dry-run mode the deltas are still computed (so callers can log what
/// *would* have been pushed) but no API call is made. Per-item failures are
/// logged and not retried this tick.
pub async fn call_api(hub: &dyn HubClient, token: &HubToken, old: &Snapshot, new: &Snapshot, dry: bool) {
    let status_delta: Vec<_> = new.statuses.difference(&old.statuses).collect();
    for status in status_delta {
        if dry {
            tracing::info!(repo = %status.commit.repo, commit = %status.commit.id, context = %status.context, "dry-run: would set status");
            continue;
        }
        if let Err(err) = hub.set_status(token, status).await {
            tracing::warn!(repo = %status.commit.repo, commit = %status.commit.id, error = %err, "failed to push status");
        }
    }

    let pr_delta: Vec<_> = new.prs.difference(&old.prs).collect();
    for pr in pr_delta {
        if dry {
            tracing::info!(repo = %pr.repo(), number = pr.number, "dry-run: would set pr");
            continue;
        }
        if let Err(err) = hub.set_pr(token, pr).await {
            tracing::warn!(repo = %pr.repo(), number = pr.number, error = %err, "failed to push pr");
        }
    }
}
