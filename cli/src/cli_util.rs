//! Process-entry glue: tracing initialization and Ctrl-C wiring. Kept
//! separate from `main.rs` so `main` reads as pure sequencing.

use prbridge::store::CancelSwitch;

/// Initializes the global tracing subscriber. Must be called exactly once,
/// as early as possible; library code never installs a subscriber of its
/// own, it only emits events.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::metadata::LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// A `CancelSwitch` that fires when the process receives Ctrl-C, for a
/// graceful shutdown of the run loop.
pub fn ctrl_c_switch() -> CancelSwitch {
    let switch = CancelSwitch::new();
    let child = switch.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl-C, shutting down");
            child.cancel();
        }
    });
    switch
}
