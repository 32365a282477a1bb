use live_recorder::config::Config;
use live_recorder::logging;
use live_recorder::probe::StreamlinkProber;
use live_recorder::recording::{Supervisor, SystemProcesses};
use live_recorder::signal::shutdown_signal;
use live_recorder::store::StateStore;

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    logging::init();
    // Handlers go in before the first cycle so an early signal still
    // runs the shutdown sequence.
    let shutdown = shutdown_signal();

    let store = match StateStore::open(&config.data_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Cannot open data directory");
            std::process::exit(1);
        }
    };

    tracing::info!(
        tool = %config.capture.tool,
        quality = %config.capture.quality,
        "Starting recording supervisor"
    );

    let supervisor = Supervisor::new(
        store,
        StreamlinkProber::new(config.capture.clone()),
        SystemProcesses::new(),
        config.capture,
    );
    supervisor.run_until(shutdown).await;
}
