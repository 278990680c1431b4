//! A single-process, `Mutex`-guarded Store implementation, good enough to
//! exercise every engine code path in tests and the demo binary. Commits
//! form an append-only DAG keyed by a content hash of their tree plus
//! parents; branches are named pointers into that DAG. A durable,
//! Git-backed Store is an external collaborator this crate does not
//! implement — see [`crate::store`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{
    diff_maps, CancelSwitch, CommitId, MergeOutcome, PathChange, ReadTree, StoreError, Transaction,
};

type FileMap = BTreeMap<String, String>;

#[derive(Clone)]
struct StoredCommit {
    parents: Vec<CommitId>,
    tree: FileMap,
}

struct State {
    commits: HashMap<CommitId, StoredCommit>,
    heads: HashMap<String, Option<CommitId>>,
    notifies: HashMap<String, Arc<Notify>>,
}

/// Handle to the whole store; clone it to hand branch views to different
/// parts of the engine, they all share the same underlying state.
#[derive(Clone)]
pub struct MemStore {
    state: Arc<Mutex<State>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                commits: HashMap::new(),
                heads: HashMap::new(),
                notifies: HashMap::new(),
            })),
        }
    }

    /// Returns a handle to `name`, creating it (empty) on first access.
    pub fn branch(&self, name: &str) -> MemBranch {
        let mut state = self.state.lock().unwrap();
        state.heads.entry(name.to_owned()).or_insert(None);
        state
            .notifies
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(Notify::new()));
        MemBranch {
            state: self.state.clone(),
            name: name.to_owned(),
        }
    }
}

fn compute_commit_id(parents: &[CommitId], tree: &FileMap) -> CommitId {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for parent in parents {
        parent.0.hash(&mut hasher);
    }
    for (path, contents) in tree {
        path.hash(&mut hasher);
        contents.hash(&mut hasher);
    }
    CommitId(format!("{:016x}", hasher.finish()))
}

fn ancestors(state: &State, start: &CommitId) -> BTreeSet<CommitId> {
    let mut seen = BTreeSet::new();
    let mut frontier = vec![start.clone()];
    while let Some(id) = frontier.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(commit) = state.commits.get(&id) {
            frontier.extend(commit.parents.iter().cloned());
        }
    }
    seen
}

/// Nearest common ancestor of `a` and `b`, or `None` if they share none
/// (the two histories never joined — callers treat that as an empty base).
fn common_ancestor(state: &State, a: &CommitId, b: &CommitId) -> Option<CommitId> {
    let a_ancestors = ancestors(state, a);
    let mut frontier = vec![b.clone()];
    let mut seen = BTreeSet::new();
    while let Some(id) = frontier.pop() {
        if a_ancestors.contains(&id) {
            return Some(id);
        }
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(commit) = state.commits.get(&id) {
            frontier.extend(commit.parents.iter().cloned());
        }
    }
    None
}

#[derive(Debug, Clone)]
pub struct MemTree {
    files: FileMap,
}

impl MemTree {
    fn dir_prefix(path: &str) -> String {
        if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        }
    }
}

impl ReadTree for MemTree {
    fn exists_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    fn exists_dir(&self, path: &str) -> bool {
        if path.is_empty() {
            return true;
        }
        let prefix = Self::dir_prefix(path);
        self.files.keys().any(|k| k.starts_with(&prefix))
    }

    fn read_file(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    fn read_dir(&self, path: &str) -> Vec<String> {
        let prefix = Self::dir_prefix(path);
        let mut names: BTreeSet<String> = BTreeSet::new();
        for key in self.files.keys() {
            let rest = if prefix.is_empty() {
                Some(key.as_str())
            } else {
                key.strip_prefix(prefix.as_str())
            };
            if let Some(rest) = rest {
                if let Some((head, _)) = rest.split_once('/') {
                    names.insert(head.to_owned());
                } else if !rest.is_empty() {
                    names.insert(rest.to_owned());
                }
            }
        }
        names.into_iter().collect()
    }
}

pub struct MemTransaction {
    state: Arc<Mutex<State>>,
    branch: String,
    parents: Vec<CommitId>,
    files: FileMap,
    closed: bool,
}

impl std::fmt::Debug for MemTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemTransaction")
            .field("branch", &self.branch)
            .field("parents", &self.parents)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Drop for MemTransaction {
    fn drop(&mut self) {
        if !self.closed {
            tracing::error!(
                branch = %self.branch,
                "transaction dropped without being committed or aborted"
            );
        }
    }
}

impl ReadTree for MemTransaction {
    fn exists_file(&self, path: &str) -> bool {
        MemTree { files: self.files.clone() }.exists_file(path)
    }
    fn exists_dir(&self, path: &str) -> bool {
        MemTree { files: self.files.clone() }.exists_dir(path)
    }
    fn read_file(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }
    fn read_dir(&self, path: &str) -> Vec<String> {
        MemTree { files: self.files.clone() }.read_dir(path)
    }
}

#[async_trait]
impl Transaction for MemTransaction {
    fn parents(&self) -> Vec<CommitId> {
        self.parents.clone()
    }

    fn make_dirs(&mut self, _path: &str) {
        // Directories are implicit in a flat file map; nothing to create.
    }

    fn create_or_replace_file(&mut self, path: &str, contents: &str) {
        self.files.insert(path.to_owned(), contents.to_owned());
    }

    fn remove(&mut self, path: &str) {
        let prefix = format!("{path}/");
        self.files.remove(path);
        self.files.retain(|k, _| !k.starts_with(&prefix));
    }

    fn exists(&self, path: &str) -> bool {
        self.exists_file(path) || self.exists_dir(path)
    }

    async fn diff_against(&self, commit: &CommitId) -> Result<Vec<PathChange>, StoreError> {
        let state = self.state.lock().unwrap();
        let old = state
            .commits
            .get(commit)
            .map(|c| c.tree.clone())
            .unwrap_or_default();
        Ok(diff_maps(&old, &self.files))
    }

    async fn merge(&mut self, commit: &CommitId) -> Result<MergeOutcome, StoreError> {
        let (base_tree, their_tree) = {
            let state = self.state.lock().unwrap();
            let theirs = state
                .commits
                .get(commit)
                .ok_or_else(|| StoreError::MergeFailed(format!("unknown commit {commit}")))?
                .tree
                .clone();
            let base = match self.parents.first() {
                Some(parent) => common_ancestor(&state, parent, commit)
                    .and_then(|id| state.commits.get(&id).map(|c| c.tree.clone()))
                    .unwrap_or_default(),
                None => FileMap::default(),
            };
            (base, theirs)
        };

        let mut conflicts = Vec::new();
        let mut paths: BTreeSet<&String> = base_tree.keys().collect();
        paths.extend(self.files.keys());
        paths.extend(their_tree.keys());

        for path in paths {
            let base_v = base_tree.get(path);
            let our_v = self.files.get(path);
            resolve_path_three_way(path, base_v, our_v, their_tree.get(path), &mut self.files, &mut conflicts);
        }

        Ok(MergeOutcome {
            conflicts,
            ours: Box::new(MemTree { files: self.files.clone() }),
            theirs: Box::new(MemTree { files: their_tree }),
        })
    }

    async fn commit(self: Box<Self>, _message: &str) -> Result<CommitId, StoreError> {
        let id = compute_commit_id(&self.parents, &self.files);
        let mut this = self;
        let notify = {
            let mut state = this.state.lock().unwrap();
            state.commits.insert(
                id.clone(),
                StoredCommit {
                    parents: this.parents.clone(),
                    tree: this.files.clone(),
                },
            );
            state.heads.insert(this.branch.clone(), Some(id.clone()));
            state
                .notifies
                .entry(this.branch.clone())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };
        notify.notify_waiters();
        this.closed = true;
        Ok(id)
    }

    async fn abort(self: Box<Self>) {
        let mut this = self;
        this.closed = true;
    }

    fn closed(&self) -> bool {
        self.closed
    }
}

/// Three-way reconciliation for one path: applies the non-conflicting cases
/// directly to `files` (the transaction's working tree) and records the
/// path in `conflicts` when both sides changed it differently.
fn resolve_path_three_way(
    path: &str,
    base: Option<&String>,
    ours: Option<&String>,
    theirs: Option<&String>,
    files: &mut FileMap,
    conflicts: &mut Vec<String>,
) {
    if ours == theirs {
        return;
    }
    if ours == base {
        // Only theirs changed: fast-forward this path.
        match theirs {
            Some(v) => {
                files.insert(path.to_owned(), v.clone());
            }
            None => {
                files.remove(path);
            }
        }
        return;
    }
    if theirs == base {
        // Only ours changed: keep the working tree's value untouched.
        return;
    }
    conflicts.push(path.to_owned());
}

pub struct MemBranch {
    state: Arc<Mutex<State>>,
    name: String,
}

#[async_trait]
impl super::Branch for MemBranch {
    fn name(&self) -> &str {
        &self.name
    }

    async fn head(&self) -> Result<Option<CommitId>, StoreError> {
        let state = self.state.lock().unwrap();
        Ok(state.heads.get(&self.name).cloned().flatten())
    }

    async fn transaction(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let state = self.state.lock().unwrap();
        let head = state.heads.get(&self.name).cloned().flatten();
        let (parents, files) = match &head {
            Some(id) => {
                let commit = state
                    .commits
                    .get(id)
                    .ok_or_else(|| StoreError::Io(format!("dangling head {id}")))?;
                (vec![id.clone()], commit.tree.clone())
            }
            None => (vec![], FileMap::default()),
        };
        Ok(Box::new(MemTransaction {
            state: self.state.clone(),
            branch: self.name.clone(),
            parents,
            files,
            closed: false,
        }))
    }

    async fn fast_forward(&self, to: &CommitId) -> Result<(), StoreError> {
        let notify = {
            let mut state = self.state.lock().unwrap();
            if !state.commits.contains_key(to) {
                return Err(StoreError::Io(format!("fast-forward to unknown commit {to}")));
            }
            state.heads.insert(self.name.clone(), Some(to.clone()));
            state
                .notifies
                .entry(self.name.clone())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };
        notify.notify_waiters();
        Ok(())
    }

    async fn wait_for_head(&self, switch: &CancelSwitch) -> Result<(), StoreError> {
        let notify = {
            let mut state = self.state.lock().unwrap();
            state
                .notifies
                .entry(self.name.clone())
                .or_insert_with(|| Arc::new(Notify::new()))
                .clone()
        };
        tokio::select! {
            _ = notify.notified() => Ok(()),
            _ = switch.cancelled() => Ok(()),
        }
    }
}

/// Runs `open(branch)`, the body, then commits if the transaction still has
/// a diff against its single parent and aborts otherwise — the
/// `with_transaction` convenience from the Store contract. Kept free
/// rather than a trait method so `Branch` stays object-safe.
pub async fn with_transaction<F, Fut, T>(
    branch: &dyn super::Branch,
    message: &str,
    body: F,
) -> Result<Option<T>, StoreError>
where
    F: FnOnce(Box<dyn Transaction>) -> Fut,
    Fut: std::future::Future<Output = Result<(Box<dyn Transaction>, Option<T>), StoreError>>,
{
    let tr = branch.transaction().await?;
    let parent = tr.parents().first().cloned();
    let (tr, value) = body(tr).await?;
    let changed = match &parent {
        Some(id) => !tr.diff_against(id).await?.is_empty(),
        None => true,
    };
    if changed && value.is_some() {
        tr.commit(message).await?;
    } else {
        tr.abort().await;
    }
    Ok(value)
}
