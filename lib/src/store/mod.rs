//! The Store contract: a small set of traits the conversion and
//! engine layers are written against. No concrete, durable implementation
//! lives here — that is an external collaborator; see [`mem`] for the
//! single in-memory implementation this crate carries for its own tests and
//! the demo binary.
//!
//! Separates a content-addressing `Backend`-style trait from the
//! transaction/view machinery built on top of it, the same split as a
//! Git-like versioning layer:
//! [`ReadTree`] is the read-only surface that both a tree-at-a-commit and a
//! tree-inside-an-open-transaction can satisfy (no inheritance, just two
//! structs implementing the same trait), and [`Transaction`]/[`Branch`] are
//! the mutable/suspending surface the sync engine drives.

pub mod mem;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Cooperative cancellation handle passed into the run loop.
pub type CancelSwitch = CancellationToken;

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommitId(pub String);

impl fmt::Debug for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommitId").field(&self.0).finish()
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ChangeKind {
    Added,
    Removed,
    Updated,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct PathChange {
    pub path: String,
    pub kind: ChangeKind,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("branch {0:?} has no head commit")]
    BranchEmpty(String),
    #[error("transaction has no parent (expected exactly one)")]
    ZeroParents,
    #[error("transaction has {0} parents (expected exactly one)")]
    TooManyParents(usize),
    #[error("transaction conflicted with a concurrent writer: {0}")]
    TransactionConflict(String),
    #[error("merge failed: {0}")]
    MergeFailed(String),
    #[error("store I/O error: {0}")]
    Io(String),
}

/// A read-only view over a tree, satisfied by both a commit's tree and an
/// open transaction's working tree.
pub trait ReadTree: fmt::Debug + Send + Sync {
    fn exists_file(&self, path: &str) -> bool;
    fn exists_dir(&self, path: &str) -> bool;
    fn read_file(&self, path: &str) -> Option<String>;
    /// Direct children of `path` (file and directory names, not full paths).
    /// The empty string denotes the tree root.
    fn read_dir(&self, path: &str) -> Vec<String>;

    /// Path-level diff of `self` (the new side) against `other` (the old
    /// side): a path is `Added` if it exists in `self` but not `other`,
    /// `Removed` the other way around, `Updated` if both have it with
    /// different contents. Order is unspecified. Backed by a generic
    /// recursive walk over both sides' `read_dir`/`read_file`, so
    /// implementors only need to provide the four methods above.
    fn diff(&self, other: &dyn ReadTree) -> Vec<PathChange> {
        let mut new_paths = std::collections::BTreeMap::new();
        walk_files(self, "", &mut new_paths);
        let mut old_paths = std::collections::BTreeMap::new();
        walk_files(other, "", &mut old_paths);
        diff_maps(&old_paths, &new_paths)
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

fn walk_files(tree: &(impl ReadTree + ?Sized), dir: &str, out: &mut std::collections::BTreeMap<String, String>) {
    for name in tree.read_dir(dir) {
        let path = join(dir, &name);
        if tree.exists_file(&path) {
            if let Some(contents) = tree.read_file(&path) {
                out.insert(path, contents);
            }
        } else if tree.exists_dir(&path) {
            walk_files(tree, &path, out);
        }
    }
}

/// Shared by [`ReadTree::diff`]'s default implementation and any backend
/// (like [`mem::MemStore`]) that already has both sides materialized as
/// plain maps and wants to skip the generic walk. `old`/`new` match the
/// `self`/`other` convention of [`ReadTree::diff`].
pub fn diff_maps(
    old: &std::collections::BTreeMap<String, String>,
    new: &std::collections::BTreeMap<String, String>,
) -> Vec<PathChange> {
    let mut changes = Vec::new();
    for (path, value) in old {
        match new.get(path) {
            None => changes.push(PathChange {
                path: path.clone(),
                kind: ChangeKind::Removed,
            }),
            Some(new_value) if new_value != value => changes.push(PathChange {
                path: path.clone(),
                kind: ChangeKind::Updated,
            }),
            Some(_) => {}
        }
    }
    for path in new.keys() {
        if !old.contains_key(path) {
            changes.push(PathChange {
                path: path.clone(),
                kind: ChangeKind::Added,
            });
        }
    }
    changes
}

/// The result of merging a Store commit into an open transaction: the set
/// of conflicting paths plus read-only views over each side, as read by
/// `SyncEngine::merge` to resolve them.
pub struct MergeOutcome {
    pub conflicts: Vec<String>,
    pub ours: Box<dyn ReadTree>,
    pub theirs: Box<dyn ReadTree>,
}

impl fmt::Debug for MergeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergeOutcome")
            .field("conflicts", &self.conflicts)
            .finish_non_exhaustive()
    }
}

/// An open, exclusively-owned mutation against one branch. Must be
/// consumed by exactly one of [`Transaction::commit`] / [`Transaction::abort`];
/// dropping one still open is a programmer error (see DESIGN.md).
#[async_trait]
pub trait Transaction: ReadTree + Send {
    /// The resolved parent commit(s) the transaction was opened against.
    fn parents(&self) -> Vec<CommitId>;

    fn make_dirs(&mut self, path: &str);
    fn create_or_replace_file(&mut self, path: &str, contents: &str);
    fn remove(&mut self, path: &str);
    fn exists(&self, path: &str) -> bool;

    /// Path-level diff between the transaction's current tree and `commit`.
    async fn diff_against(&self, commit: &CommitId) -> Result<Vec<PathChange>, StoreError>;

    /// Three-way merge of `commit` into this transaction's tree.
    async fn merge(&mut self, commit: &CommitId) -> Result<MergeOutcome, StoreError>;

    async fn commit(self: Box<Self>, message: &str) -> Result<CommitId, StoreError>;
    async fn abort(self: Box<Self>);

    fn closed(&self) -> bool;
}

#[async_trait]
pub trait Branch: Send + Sync {
    fn name(&self) -> &str;
    async fn head(&self) -> Result<Option<CommitId>, StoreError>;
    async fn transaction(&self) -> Result<Box<dyn Transaction>, StoreError>;
    async fn fast_forward(&self, to: &CommitId) -> Result<(), StoreError>;
    /// Suspends until the branch head changes or `switch` is cancelled.
    async fn wait_for_head(&self, switch: &CancelSwitch) -> Result<(), StoreError>;
}
