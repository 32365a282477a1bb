use std::future::Future;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Installs the Ctrl+C and (on unix) SIGTERM handlers right away and
/// returns a future that resolves once either arrives.
///
/// A signal delivered after this call returns is never lost, even if the
/// future is first polled much later. Must be called inside the runtime.
/// A handler that cannot be installed is logged and never fires.
#[cfg(unix)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    let mut interrupt = listen(SignalKind::interrupt(), "SIGINT");
    let mut terminate = listen(SignalKind::terminate(), "SIGTERM");

    async move {
        tokio::select! {
            _ = recv(&mut interrupt) => {},
            _ = recv(&mut terminate) => {},
        }
        tracing::info!("Shutdown signal received");
    }
}

#[cfg(unix)]
fn listen(kind: SignalKind, name: &'static str) -> Option<Signal> {
    match signal(kind) {
        Ok(stream) => Some(stream),
        Err(e) => {
            tracing::error!(signal = name, error = %e, "Failed to install signal handler");
            None
        }
    }
}

#[cfg(unix)]
async fn recv(stream: &mut Option<Signal>) {
    match stream {
        Some(stream) => {
            stream.recv().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(windows)]
pub fn shutdown_signal() -> impl Future<Output = ()> + Send + 'static {
    let ctrl_c = tokio::signal::windows::ctrl_c();

    async move {
        match ctrl_c {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
        tracing::info!("Shutdown signal received");
    }
}
