//! Integration tests for the concrete sync scenarios, run against `MemStore`
//! and `testutils::ScriptedHub`. Each test name below names the scenario it
//! covers rather than restating it in prose.

use std::sync::Arc;
use std::time::Duration;

use prbridge::store::mem::MemStore;
use prbridge::store::Branch;
use prbridge::{conversion, EngineConfig, HubToken, RunPolicy, SyncEngine};
use testutils::{branch_ref, commit, open_pr, repo, success_status, ScriptedHub};

fn engine(hub: Arc<ScriptedHub>, store: &MemStore, dry: bool) -> SyncEngine {
    SyncEngine::new(
        hub,
        HubToken::new("t"),
        Arc::new(store.branch("pub")),
        Arc::new(store.branch("priv")),
        EngineConfig {
            policy: RunPolicy::Once,
            dry_updates: dry,
            poll_interval: Duration::from_secs(1),
        },
    )
}

/// Writes `snapshot` to `branch`'s tree and commits it, purely to register
/// a repo with the engine before its first tick (a fresh Store has no
/// tracked repos at all, and the engine only discovers what's already on
/// disk).
async fn seed(store: &MemStore, branch: &str, r: &prbridge::entities::Repo, snapshot: &prbridge::Snapshot) {
    let b = store.branch(branch);
    let mut tr = b.transaction().await.unwrap();
    conversion::write_repo(tr.as_mut(), snapshot, r);
    tr.commit("seed").await.unwrap();
}

#[tokio::test]
async fn empty_start_produces_empty_state_and_makes_no_hub_calls() {
    let store = MemStore::new();
    let hub = Arc::new(ScriptedHub::new());
    let e = engine(hub.clone(), &store, false);
    e.init_sync().await.unwrap();

    let state = e.first_sync().await.unwrap();
    assert!(state.pub_snapshot.repos.is_empty());
    assert!(state.priv_snapshot.repos.is_empty());
    assert!(hub.pr_calls.lock().unwrap().is_empty());
    assert!(hub.status_calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn new_open_pr_flows_from_hub_into_public_branch() {
    let r = repo("alice", "proj");
    let pr = open_pr(&r, 1, "deadbeef", "add x");
    let hub = Arc::new(ScriptedHub::new().with_pr(&r, pr.clone()));
    let store = MemStore::new();
    let e = engine(hub, &store, false);
    e.init_sync().await.unwrap();

    let seed_snapshot = prbridge::Snapshot::empty().add_ref(branch_ref(&r, "seed", &["main"]));
    seed(&store, "priv", &r, &seed_snapshot).await;

    let state = e.first_sync().await.unwrap();
    assert_eq!(state.pub_snapshot.pr(&r, 1), Some(&pr));
}

#[tokio::test]
async fn pr_closure_via_absence_prunes_it_on_the_next_tick() {
    let r = repo("alice", "proj");
    let pr = open_pr(&r, 1, "deadbeef", "add x");
    let hub = Arc::new(ScriptedHub::new().with_pr(&r, pr.clone()));
    let store = MemStore::new();
    let e = engine(hub.clone(), &store, false);
    e.init_sync().await.unwrap();

    let seed_snapshot = prbridge::Snapshot::empty().add_ref(branch_ref(&r, "seed", &["main"]));
    seed(&store, "priv", &r, &seed_snapshot).await;

    let state1 = e.first_sync().await.unwrap();
    assert_eq!(state1.pub_snapshot.pr(&r, 1), Some(&pr));

    // The Hub no longer reports the PR as open: closure by absence.
    hub.prs.lock().unwrap().get_mut(&r).unwrap().clear();
    let state2 = e.sync_once(&state1).await.unwrap();
    assert_eq!(state2.priv_snapshot.pr(&r, 1), None);
    assert_eq!(state2.pub_snapshot.pr(&r, 1), None);
}

#[tokio::test]
async fn user_status_edit_on_public_branch_wins_over_imported_state() {
    let r = repo("alice", "proj");
    let hub_status = success_status(&r, "deadbeef", &["ci", "build"]);
    let pr = open_pr(&r, 1, "deadbeef", "add x");
    let hub = Arc::new(ScriptedHub::new().with_pr(&r, pr.clone()).with_status(hub_status.clone()));
    let store = MemStore::new();
    let e = engine(hub, &store, false);
    e.init_sync().await.unwrap();

    let seed_snapshot = prbridge::Snapshot::empty().add_ref(branch_ref(&r, "seed", &["main"]));
    seed(&store, "priv", &r, &seed_snapshot).await;
    let state1 = e.first_sync().await.unwrap();
    assert_eq!(state1.pub_snapshot.status(&commit(&r, "deadbeef"), &hub_status.context), Some(&hub_status));

    // The user edits the status directly on the public branch.
    let user_status = prbridge::entities::Status::new(
        commit(&r, "deadbeef"),
        hub_status.context.clone(),
        Some("https://example.com/user-edit".to_string()),
        Some("user edit".to_string()),
        prbridge::entities::StatusState::Failure,
    );
    let pub_branch = store.branch("pub");
    let mut tr = pub_branch.transaction().await.unwrap();
    conversion::update_status(tr.as_mut(), &user_status);
    tr.commit("user edit").await.unwrap();

    let state2 = e.sync_once(&state1).await.unwrap();
    assert_eq!(state2.pub_snapshot.status(&commit(&r, "deadbeef"), &hub_status.context), Some(&user_status));
}

#[tokio::test]
async fn unknown_path_diff_only_registers_the_repo() {
    let store = MemStore::new();
    let priv_branch = store.branch("priv");
    let mut tr = priv_branch.transaction().await.unwrap();
    tr.make_dirs("alice/proj/misc");
    tr.create_or_replace_file("alice/proj/misc/foo", "bar\n");
    tr.commit("unrelated file").await.unwrap();

    let r = repo("alice", "proj");
    let view = prbridge::BranchView::open(&priv_branch, None).await.unwrap();
    assert!(view.snapshot.repos.contains(&r));
    assert!(view.snapshot.commits.is_empty());
    view.tr.abort().await;
}

#[tokio::test]
async fn dry_run_computes_the_delta_but_does_not_call_the_hub() {
    let r = repo("alice", "proj");
    let pr = open_pr(&r, 1, "deadbeef", "add x");
    let hub = Arc::new(ScriptedHub::new().with_pr(&r, pr.clone()));
    let store = MemStore::new();
    let e = engine(hub.clone(), &store, true);
    e.init_sync().await.unwrap();

    let seed_snapshot = prbridge::Snapshot::empty().add_ref(branch_ref(&r, "seed", &["main"]));
    seed(&store, "priv", &r, &seed_snapshot).await;

    e.first_sync().await.unwrap();
    assert!(hub.pr_calls.lock().unwrap().is_empty());
    assert!(hub.status_calls.lock().unwrap().is_empty());
}
