//! `prbridge`: wires a `GithubClient` and an in-memory `Store` into a
//! `SyncEngine` and runs it. Contains no synchronization logic of its own —
//! everything here is argument parsing, config loading, and process glue.

mod bootstrap;
mod cli_util;
mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use config::PolicyArg;
use prbridge::store::mem::MemStore;
use prbridge::store::Branch;
use prbridge::{HubToken, SyncEngine};
use prbridge_hub::GithubClient;

/// Bidirectional sync bridge between a code-hosting Hub and a Store branch pair.
#[derive(Parser, Debug)]
#[command(name = "prbridge", version)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Skip outbound Hub API calls, still computing and logging deltas.
    #[arg(long, global = true)]
    dry_run: bool,

    /// Overrides the config file's run policy.
    #[arg(long, global = true, value_enum)]
    policy: Option<PolicyArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Runs the engine loop until cancelled (Ctrl-C).
    Run,
    /// Runs a single sync tick and exits.
    Once,
}

#[tokio::main]
async fn main() -> Result<()> {
    cli_util::init_tracing();
    let cli = Cli::parse();

    let file_config = config::load(cli.config.as_deref()).context("loading config")?;
    let mut resolved = config::resolve(file_config, cli.policy, cli.dry_run).context("resolving config")?;
    if matches!(cli.command, Command::Once) {
        resolved.engine.policy = prbridge::RunPolicy::Once;
    }

    let hub = Arc::new(GithubClient::new());
    let token = HubToken::new(resolved.token.clone());
    let store = MemStore::new();
    let pub_branch: Arc<dyn Branch> = Arc::new(store.branch(&resolved.pub_branch));
    let priv_branch: Arc<dyn Branch> = Arc::new(store.branch(&resolved.priv_branch));

    let engine = SyncEngine::new(hub.clone(), token.clone(), pub_branch.clone(), priv_branch.clone(), resolved.engine);
    engine.init_sync().await.context("initializing branches")?;

    let peek = priv_branch.transaction().await.context("opening a transaction to inspect tracked repos")?;
    let tracked = prbridge::conversion::snapshot_of_tree(peek.as_ref()).map(|s| s.repos).unwrap_or_default();
    peek.abort().await;
    bootstrap::seed_repos(hub.as_ref(), &token, priv_branch.as_ref(), &tracked, &resolved.repos)
        .await
        .context("seeding configured repos")?;

    let switch = cli_util::ctrl_c_switch();
    engine.run(switch).await.context("running the sync engine")?;
    Ok(())
}
