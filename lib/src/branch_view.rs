//! A snapshot paired with the open transaction it was read from.
//! Exactly one transaction is open per view; callers must commit or abort
//! it before the view is dropped (enforced by `Transaction`'s own `Drop`
//! check, not by `BranchView` itself).

use crate::conversion;
use crate::engine::EngineError;
use crate::snapshot::Snapshot;
use crate::store::{Branch, CommitId, Transaction};

pub struct BranchView {
    pub tr: Box<dyn Transaction>,
    pub head: CommitId,
    pub snapshot: Snapshot,
}

impl BranchView {
    /// Opens a transaction on `branch`, resolves its single parent as
    /// `head`, and builds a snapshot — incrementally from `old` if
    /// supplied, otherwise by a full rebuild.
    ///
    /// `old`, when supplied, pairs the prior snapshot with the commit it was
    /// captured at. The incremental path diffs the freshly opened tree
    /// against *that* commit, not against `head`: `head` is this
    /// transaction's own parent, so a diff against it is always empty and
    /// would silently turn every incremental open into a no-op.
    pub async fn open(branch: &dyn Branch, old: Option<(&Snapshot, &CommitId)>) -> Result<Self, EngineError> {
        let tr = branch.transaction().await?;
        let head = match tr.parents().as_slice() {
            [single] => single.clone(),
            [] => return Err(EngineError::ZeroParents),
            parents => return Err(EngineError::TooManyParents(parents.len())),
        };
        let snapshot = match old {
            None => conversion::snapshot_of_tree(tr.as_ref())?,
            Some((old_snapshot, old_head)) => {
                let diffs = tr.diff_against(old_head).await?;
                conversion::apply_diff(old_snapshot, tr.as_ref(), &diffs)?
            }
        };
        Ok(Self { tr, head, snapshot })
    }
}
