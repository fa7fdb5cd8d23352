//! stackci - CI pipeline runner for a backend/frontend web application
//!
//! ## Commands
//!
//! - `stackci run` - Build, test, containerize, smoke test and publish
//! - `stackci plan` - Show which stages would run and what they would execute
//! - `stackci completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Package, build images, start the stack and wait for it
//! BUILD_NUMBER=42 stackci run
//!
//! # Run the tests too and publish to a registry
//! stackci run --run-tests --registry registry.example.com --credentials registry-creds
//!
//! # See what would happen on the main branch
//! stackci plan --branch main --build-number 42 --revision "$(git rev-parse HEAD)"
//! ```
//!
//! The process exits with 0 when the pipeline succeeds and 1 otherwise.
//! Ctrl-C and SIGTERM cancel the run; the teardown still runs.

use stackci::pipeline::CancelToken;
use std::future::Future;
use std::process::ExitCode;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let cancel = CancelToken::new();

    tokio::spawn(cancel_on(shutdown_signal(), cancel.clone()));

    match tokio::task::spawn_blocking(move || cli::run(cancel)).await {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Resolves on the first Ctrl-C or, on Unix, SIGTERM
async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Cancels `cancel` once `signal` resolves successfully
async fn cancel_on<F>(signal: F, cancel: CancelToken)
where
    F: Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => {
            tracing::warn!("Shutdown signal received, cancelling run");
            cancel.cancel();
        }
        Err(e) => tracing::warn!(error = %e, "Cannot listen for shutdown signals"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_cancels_run() {
        let cancel = CancelToken::new();
        cancel_on(std::future::ready(Ok(())), cancel.clone()).await;
        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_listener_failure_leaves_run_alone() {
        let cancel = CancelToken::new();
        let failed = std::future::ready(Err(std::io::Error::other("no signal handling")));
        cancel_on(failed, cancel.clone()).await;
        assert!(!cancel.is_cancelled());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_handler_installs() {
        let listener = tokio::spawn(shutdown_signal());
        tokio::task::yield_now().await;
        assert!(!listener.is_finished());
        listener.abort();
    }
}
