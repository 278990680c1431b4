//! Maps a [`Snapshot`] to and from a Store tree: either a full
//! rebuild (`snapshot_of_tree`) or an incremental update from a prior
//! snapshot plus a list of path diffs (`apply_diff`). Both paths must agree
//! for the same tree — exercised in the module's tests.
//!
//! Tree layout under the root:
//!
//! ```text
//! <user>/<repo>/pr/<N>/head
//! <user>/<repo>/pr/<N>/state
//! <user>/<repo>/pr/<N>/title
//! <user>/<repo>/commit/<id>/ (marker directory)
//! <user>/<repo>/commit/<id>/status/<context…>/state
//! <user>/<repo>/commit/<id>/status/<context…>/description
//! <user>/<repo>/commit/<id>/status/<context…>/target_url
//! <user>/<repo>/ref/<name…>/head
//! ```
//!
//! Every file value is written with a trailing `\n`; readers trim
//! surrounding whitespace. Missing optional fields become `None`.

use thiserror::Error;

use crate::entities::{Commit, PathSegments, PrState, PullRequest, Ref, Repo, Status, StatusState};
use crate::snapshot::Snapshot;
use crate::store::{PathChange, ReadTree, Transaction};

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("invalid {field} value {value:?} at {path}")]
    InvalidEnumValue {
        path: String,
        field: &'static str,
        value: String,
    },
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

fn read_trimmed(tree: &(impl ReadTree + ?Sized), path: &str) -> Option<String> {
    tree.read_file(path).map(|s| s.trim().to_owned())
}

fn write_field(tr: &mut dyn Transaction, path: &str, value: Option<&str>) {
    match value {
        Some(v) => tr.create_or_replace_file(path, &format!("{v}\n")),
        None => tr.remove(path),
    }
}

/// Depth-first walk collecting every directory (relative to `root`, as
/// path segments) that contains a file named `leaf`. A directory
/// contributes both its own entry (if `leaf` exists there) and the union
/// of its children's contributions.
fn walk(tree: &(impl ReadTree + ?Sized), root: &str, leaf: &str) -> Vec<Vec<String>> {
    fn rec(tree: &(impl ReadTree + ?Sized), dir: &str, leaf: &str, rel: &mut Vec<String>, out: &mut Vec<Vec<String>>) {
        if tree.exists_file(&join(dir, leaf)) {
            out.push(rel.clone());
        }
        for name in tree.read_dir(dir) {
            let child = join(dir, &name);
            if tree.exists_dir(&child) {
                rel.push(name);
                rec(tree, &child, leaf, rel, out);
                rel.pop();
            }
        }
    }
    let mut out = Vec::new();
    rec(tree, root, leaf, &mut Vec::new(), &mut out);
    out
}

// --- reading one entity's subtree --------------------------------------------

pub(crate) fn pr_dir(repo: &Repo, number: u64) -> String {
    format!("{}/{}/pr/{number}", repo.user, repo.repo)
}

fn read_pr(tree: &(impl ReadTree + ?Sized), repo: &Repo, number: u64) -> Result<Option<PullRequest>, ConversionError> {
    let dir = pr_dir(repo, number);
    let head = read_trimmed(tree, &join(&dir, "head"));
    let state = read_trimmed(tree, &join(&dir, "state"));
    let (Some(head), Some(state)) = (head, state) else {
        return Ok(None);
    };
    let state = PrState::parse(&state).ok_or_else(|| ConversionError::InvalidEnumValue {
        path: join(&dir, "state"),
        field: "pr state",
        value: state.clone(),
    })?;
    let title = read_trimmed(tree, &join(&dir, "title")).unwrap_or_default();
    Ok(Some(PullRequest::new(Commit::new(repo.clone(), head), number, state, title)))
}

pub(crate) fn commit_dir(repo: &Repo, id: &str) -> String {
    format!("{}/{}/commit/{id}", repo.user, repo.repo)
}

fn status_dir(repo: &Repo, id: &str, context: &PathSegments) -> String {
    let mut dir = format!("{}/{}/commit/{id}/status", repo.user, repo.repo);
    for segment in context.as_slice() {
        dir = join(&dir, segment);
    }
    dir
}

fn read_status(
    tree: &(impl ReadTree + ?Sized),
    repo: &Repo,
    id: &str,
    context: &PathSegments,
) -> Result<Option<Status>, ConversionError> {
    let dir = status_dir(repo, id, context);
    let Some(state) = read_trimmed(tree, &join(&dir, "state")) else {
        return Ok(None);
    };
    let state = StatusState::parse(&state).ok_or_else(|| ConversionError::InvalidEnumValue {
        path: join(&dir, "state"),
        field: "status state",
        value: state.clone(),
    })?;
    let description = read_trimmed(tree, &join(&dir, "description"));
    let url = read_trimmed(tree, &join(&dir, "target_url"));
    Ok(Some(Status::new(
        Commit::new(repo.clone(), id.to_owned()),
        context.clone(),
        url,
        description,
        state,
    )))
}

fn ref_dir(repo: &Repo, name: &PathSegments) -> String {
    let mut dir = format!("{}/{}/ref", repo.user, repo.repo);
    for segment in name.as_slice() {
        dir = join(&dir, segment);
    }
    dir
}

fn read_ref(tree: &(impl ReadTree + ?Sized), repo: &Repo, name: &PathSegments) -> Option<Ref> {
    let dir = ref_dir(repo, name);
    let head = read_trimmed(tree, &join(&dir, "head"))?;
    Some(Ref::new(Commit::new(repo.clone(), head), name.clone()))
}

// --- full rebuild -------------------------------------------------------------

pub fn snapshot_of_tree(tree: &(impl ReadTree + ?Sized)) -> Result<Snapshot, ConversionError> {
    let mut snapshot = Snapshot::empty();

    for user in tree.read_dir("") {
        let user_dir = user.clone();
        for repo_name in tree.read_dir(&user_dir) {
            let repo = Repo::new(user.clone(), repo_name.clone());
            let repo_dir = join(&user_dir, &repo_name);
            snapshot.repos.insert(repo.clone());

            let pr_root = join(&repo_dir, "pr");
            for number_str in tree.read_dir(&pr_root) {
                let Ok(number) = number_str.parse::<u64>() else {
                    continue;
                };
                if let Some(pr) = read_pr(tree, &repo, number)? {
                    snapshot = snapshot.add_pr(pr);
                }
            }

            let commit_root = join(&repo_dir, "commit");
            for id in tree.read_dir(&commit_root) {
                snapshot = snapshot.add_commit(Commit::new(repo.clone(), id.clone()));
                let status_root = join(&join(&commit_root, &id), "status");
                for context_segments in walk(tree, &status_root, "state") {
                    let context = PathSegments(context_segments);
                    if let Some(status) = read_status(tree, &repo, &id, &context)? {
                        snapshot = snapshot.add_status(status);
                    }
                }
            }

            let ref_root = join(&repo_dir, "ref");
            for name_segments in walk(tree, &ref_root, "head") {
                let name = PathSegments(name_segments);
                if let Some(r) = read_ref(tree, &repo, &name) {
                    snapshot = snapshot.add_ref(r);
                }
            }
        }
    }

    Ok(snapshot)
}

// --- incremental update from a tree diff -------------------------------------

enum Classified {
    Pr { repo: Repo, number: u64 },
    Status { repo: Repo, commit_id: String, context: PathSegments },
    Ref { repo: Repo, name: PathSegments },
    Unknown { repo: Repo },
    Ignored,
}

fn classify(path: &str) -> Classified {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.len() < 2 {
        return Classified::Ignored;
    }
    let repo = Repo::new(parts[0], parts[1]);

    if parts.len() >= 5 && parts[2] == "pr" {
        if let Ok(number) = parts[3].parse::<u64>() {
            return Classified::Pr { repo, number };
        }
    }

    if parts.len() >= 7 && parts[2] == "commit" && parts[4] == "status" {
        let commit_id = parts[3].to_owned();
        let context: Vec<String> = parts[5..parts.len() - 1].iter().map(|s| s.to_string()).collect();
        if !context.is_empty() {
            return Classified::Status {
                repo,
                commit_id,
                context: PathSegments(context),
            };
        }
    }

    if parts.len() >= 4 && parts[2] == "ref" {
        let name: Vec<String> = parts[3..parts.len() - 1].iter().map(|s| s.to_string()).collect();
        if !name.is_empty() {
            return Classified::Ref { repo, name: PathSegments(name) };
        }
    }

    Classified::Unknown { repo }
}

/// Applies `diffs` (as produced by `tree.diff(old_commit)`) to `old`,
/// re-reading each affected subtree from `tree` (the tree's *current*
/// state). Must yield the same result as `snapshot_of_tree(tree)` for the
/// same tree — see the round-trip test below.
pub fn apply_diff(
    old: &Snapshot,
    tree: &(impl ReadTree + ?Sized),
    diffs: &[PathChange],
) -> Result<Snapshot, ConversionError> {
    let mut snapshot = old.clone();

    for diff in diffs {
        match classify(&diff.path) {
            Classified::Pr { repo, number } => match read_pr(tree, &repo, number)? {
                Some(pr) => snapshot = snapshot.replace_pr(pr),
                None => snapshot = snapshot.remove_pr(&repo, number),
            },
            Classified::Status { repo, commit_id, context } => {
                match read_status(tree, &repo, &commit_id, &context)? {
                    Some(status) => snapshot = snapshot.replace_status(status),
                    None => {
                        let commit = Commit::new(repo.clone(), commit_id.clone());
                        snapshot = snapshot.remove_status(&commit, &context);
                    }
                }
                let commit = Commit::new(repo.clone(), commit_id.clone());
                if tree.exists_dir(&commit_dir(&repo, &commit_id)) {
                    snapshot = snapshot.replace_commit(commit);
                } else {
                    snapshot = snapshot.remove_commit(&repo, &commit_id);
                }
            }
            Classified::Ref { repo, name } => match read_ref(tree, &repo, &name) {
                Some(r) => snapshot = snapshot.replace_ref(r),
                None => snapshot = snapshot.remove_ref(&repo, &name),
            },
            Classified::Unknown { repo } => {
                snapshot.repos.insert(repo);
            }
            Classified::Ignored => {}
        }
    }

    Ok(snapshot)
}

// --- writing a snapshot back -------------------------------------------------

/// Writes one PR's subtree, or removes it entirely once it is `Closed`
/// (closed PRs are not persisted — pruning responsibility is partially
/// delegated to write-time).
pub fn update_pr(tr: &mut dyn Transaction, pr: &PullRequest) {
    let dir = pr_dir(pr.repo(), pr.number);
    if pr.state == PrState::Closed {
        tr.remove(&dir);
        return;
    }
    tr.make_dirs(&dir);
    write_field(tr, &join(&dir, "head"), Some(&pr.head.id));
    write_field(tr, &join(&dir, "state"), Some(pr.state.as_str()));
    write_field(tr, &join(&dir, "title"), Some(&pr.title));
}

pub fn update_status(tr: &mut dyn Transaction, status: &Status) {
    let dir = status_dir(&status.commit.repo, &status.commit.id, &status.context);
    tr.make_dirs(&dir);
    write_field(tr, &join(&dir, "state"), Some(status.state.as_str()));
    write_field(tr, &join(&dir, "description"), status.description.as_deref());
    write_field(tr, &join(&dir, "target_url"), status.url.as_deref());
}

pub fn update_ref(tr: &mut dyn Transaction, r: &Ref) {
    let dir = ref_dir(r.repo(), &r.name);
    tr.make_dirs(&dir);
    write_field(tr, &join(&dir, "head"), Some(&r.head.id));
}

pub fn update_prs(tr: &mut dyn Transaction, snapshot: &Snapshot, repo: &Repo) {
    for pr in snapshot.prs_in(repo) {
        update_pr(tr, pr);
    }
}

pub fn update_statuses(tr: &mut dyn Transaction, snapshot: &Snapshot, repo: &Repo) {
    for status in snapshot.statuses_in(repo) {
        update_status(tr, status);
    }
}

pub fn update_refs(tr: &mut dyn Transaction, snapshot: &Snapshot, repo: &Repo) {
    for r in snapshot.refs_in(repo) {
        update_ref(tr, r);
    }
}

/// Writes a repo's prs, statuses, and refs into an open transaction — the
/// write phase of a sync tick.
pub fn write_repo(tr: &mut dyn Transaction, snapshot: &Snapshot, repo: &Repo) {
    update_prs(tr, snapshot, repo);
    update_statuses(tr, snapshot, repo);
    update_refs(tr, snapshot, repo);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mem::MemStore;
    use crate::store::Branch;

    fn repo() -> Repo {
        Repo::new("alice", "proj")
    }

    async fn open_tr(store: &MemStore) -> Box<dyn Transaction> {
        store.branch("main").transaction().await.unwrap()
    }

    #[tokio::test]
    async fn write_then_read_open_pr_round_trips() {
        let store = MemStore::new();
        let mut tr = open_tr(&store).await;
        let pr = PullRequest::new(Commit::new(repo(), "deadbeef"), 7, PrState::Open, "add x");
        let status = Status::new(
            Commit::new(repo(), "deadbeef"),
            PathSegments::new(["ci", "build"]),
            None,
            None,
            StatusState::Success,
        );
        let snapshot = Snapshot::empty().add_pr(pr.clone()).add_status(status.clone());
        write_repo(tr.as_mut(), &snapshot, &repo());

        let rebuilt = snapshot_of_tree(tr.as_ref()).unwrap();
        assert_eq!(rebuilt.pr(&repo(), 7), Some(&pr));
        assert_eq!(
            rebuilt.status(&Commit::new(repo(), "deadbeef"), &PathSegments::new(["ci", "build"])),
            Some(&status)
        );
        tr.abort().await;
    }

    #[tokio::test]
    async fn closed_pr_is_not_persisted() {
        let store = MemStore::new();
        let mut tr = open_tr(&store).await;
        let pr = PullRequest::new(Commit::new(repo(), "deadbeef"), 7, PrState::Closed, "x");
        update_pr(tr.as_mut(), &pr);
        assert!(!tr.exists(&pr_dir(&repo(), 7)));
        tr.abort().await;
    }

    #[tokio::test]
    async fn legacy_pr_without_title_defaults_to_empty() {
        let store = MemStore::new();
        let mut tr = open_tr(&store).await;
        let dir = pr_dir(&repo(), 3);
        tr.make_dirs(&dir);
        tr.create_or_replace_file(&join(&dir, "head"), "cafebabe\n");
        tr.create_or_replace_file(&join(&dir, "state"), "open\n");
        let pr = read_pr(tr.as_ref(), &repo(), 3).unwrap().unwrap();
        assert_eq!(pr.title, "");
        tr.abort().await;
    }

    #[tokio::test]
    async fn invalid_state_value_is_a_conversion_error() {
        let store = MemStore::new();
        let mut tr = open_tr(&store).await;
        let dir = pr_dir(&repo(), 3);
        tr.make_dirs(&dir);
        tr.create_or_replace_file(&join(&dir, "head"), "cafebabe\n");
        tr.create_or_replace_file(&join(&dir, "state"), "sideways\n");
        assert!(snapshot_of_tree(tr.as_ref()).is_err());
        tr.abort().await;
    }

    #[tokio::test]
    async fn incremental_and_full_rebuild_agree() {
        let store = MemStore::new();
        let mut tr = open_tr(&store).await;
        let pr = PullRequest::new(Commit::new(repo(), "deadbeef"), 7, PrState::Open, "add x");
        let snapshot = Snapshot::empty().add_pr(pr);
        write_repo(tr.as_mut(), &snapshot, &repo());
        let full = snapshot_of_tree(tr.as_ref()).unwrap();

        let diffs = tr.diff_against(&crate::store::CommitId(String::new())).await.unwrap();
        let incremental = apply_diff(&Snapshot::empty(), tr.as_ref(), &diffs).unwrap();
        assert_eq!(full, incremental);
        tr.abort().await;
    }

    #[test]
    fn unknown_path_only_touches_repos() {
        match classify("alice/proj/misc/foo") {
            Classified::Unknown { repo: r } => assert_eq!(r, repo()),
            _ => panic!("expected Unknown"),
        }
    }

    #[test]
    fn bare_commit_marker_is_unknown_not_commits() {
        match classify("alice/proj/commit/deadbeef/extra") {
            Classified::Unknown { .. } => {}
            other => panic!("expected Unknown, got a different classification: {}", matches_name(&other)),
        }
    }

    fn matches_name(c: &Classified) -> &'static str {
        match c {
            Classified::Pr { .. } => "Pr",
            Classified::Status { .. } => "Status",
            Classified::Ref { .. } => "Ref",
            Classified::Unknown { .. } => "Unknown",
            Classified::Ignored => "Ignored",
        }
    }
}
