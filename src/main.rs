use std::sync::Arc;

use live_recorder::api;
use live_recorder::config::Config;
use live_recorder::control::ControlPlane;
use live_recorder::logging;
use live_recorder::recording::SystemProcesses;
use live_recorder::signal::shutdown_signal;
use live_recorder::store::StateStore;
use live_recorder::upload::{UploadLockManager, UploadService};

#[tokio::main]
async fn main() {
    let config = Config::from_env();
    logging::init();

    let store = match StateStore::open(&config.data_dir) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Cannot open data directory");
            std::process::exit(1);
        }
    };

    let uploads = UploadService::new(store.clone(), UploadLockManager::new(), config.upload.clone());
    let control = ControlPlane::new(
        store,
        uploads,
        Arc::new(SystemProcesses::new()),
        config.capture.stop_grace,
    );

    let server = warp::serve(api::routes(control))
        .try_bind_with_graceful_shutdown(config.bind_address(), shutdown_signal());

    match server {
        Ok((addr, running)) => {
            tracing::info!(
                address = %addr,
                data_dir = %config.data_dir.display(),
                max_concurrent_uploads = config.upload.max_concurrent,
                "Recorder server listening"
            );
            running.await;
            tracing::info!("Recorder server stopped");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to bind server");
            std::process::exit(1);
        }
    }
}
