use std::pin::Pin;

use cfg_if::cfg_if;
use futures::{future::Shared, FutureExt};
use std::future::Future;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

cfg_if! {
    if #[cfg(windows)] {
        use tokio::signal::windows::*;

        async fn raw_shutdown_signal() {
            let (Ok(mut ctrl_c), Ok(mut ctrl_close), Ok(mut ctrl_shutdown)) =
                (ctrl_c(), ctrl_close(), ctrl_shutdown())
            else {
                warn!("Failed to attach windows shutdown signals, relying on programmatic shutdown only");
                return futures::future::pending().await;
            };
            select! {
                _ = ctrl_c.recv() => (),
                _ = ctrl_close.recv() => (),
                _ = ctrl_shutdown.recv() => (),
            }
        }
    } else if #[cfg(unix)] {
        use tokio::signal::unix::*;

        async fn unix_shutdown_signal(signal_kind: SignalKind) {
            match signal(signal_kind) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to listen to unix shutdown signal");
                    futures::future::pending::<()>().await;
                }
            }
        }

        async fn raw_shutdown_signal() {
            select! {
                _ = unix_shutdown_signal(SignalKind::interrupt()) => (),
                _ = unix_shutdown_signal(SignalKind::terminate()) => (),
                _ = unix_shutdown_signal(SignalKind::hangup()) => (),
            };
        }
    } else {
        compile_error!("Your OS does not support shutdown signal ! Are you targeting wasm ?");
    }
}

/// A cloneable future that resolves once shutdown has been requested.
///
/// Always poll a fresh clone: a `Shared` that already returned `Ready` must not
/// be polled again.
pub type ShutdownSignal = Shared<Pin<Box<dyn Future<Output = ()> + Send>>>;

/// Builds a shutdown signal fired by `token` and, when `listen_os_signals` is set,
/// by SIGINT / SIGTERM / SIGHUP (ctrl-c / close / shutdown on windows).
pub fn shutdown_signal(token: CancellationToken, listen_os_signals: bool) -> ShutdownSignal {
    async move {
        if listen_os_signals {
            select! {
                _ = raw_shutdown_signal() => {
                    info!("Shutdown signal detected. Attempting graceful shutdown...");
                    token.cancel();
                }
                _ = token.cancelled() => {
                    info!("Shutdown requested. Attempting graceful shutdown...");
                }
            }
        } else {
            token.cancelled().await;
            info!("Shutdown requested. Attempting graceful shutdown...");
        }
    }
    .boxed()
    .shared()
}

/// Whether `signal` has already fired, without waiting.
pub fn is_triggered(signal: &ShutdownSignal) -> bool {
    signal.clone().now_or_never().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_programmatic_shutdown() {
        let token = CancellationToken::new();
        let signal = shutdown_signal(token.clone(), false);
        assert!(!is_triggered(&signal));

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), signal.clone())
            .await
            .expect("signal should resolve after cancel");
        assert!(is_triggered(&signal));
    }

    #[tokio::test]
    async fn test_cancel_before_first_poll_is_not_lost() {
        let token = CancellationToken::new();
        token.cancel();
        let signal = shutdown_signal(token, false);
        assert!(is_triggered(&signal));
    }

    #[tokio::test]
    async fn test_clones_resolve_independently() {
        let token = CancellationToken::new();
        let signal = shutdown_signal(token.clone(), false);
        let first = signal.clone();
        let second = signal.clone();

        token.cancel();
        first.await;
        second.await;
        signal.await;
    }
}
