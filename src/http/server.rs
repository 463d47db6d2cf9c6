//! HTTP server implementation.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, error, info};

use super::service::router;
use super::state::AppState;
use crate::error::{PollguardError, Result};

/// HTTP server for the decision API.
pub struct HttpServer {
    /// Address to bind to
    addr: SocketAddr,
    /// Shared limiter state
    state: AppState,
    /// Interval between background sweeps of expired records
    sweep_interval: Duration,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            state,
            sweep_interval: Duration::from_secs(60),
        }
    }

    /// Set the background sweep interval. A zero interval disables sweeping.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Bind and serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.addr).await.map_err(|e| {
            error!(addr = %self.addr, error = %e, "Failed to bind HTTP listener");
            PollguardError::Io(e)
        })?;

        self.serve_listener(listener, signal).await
    }

    /// Serve on an already-bound listener until `signal` resolves.
    pub async fn serve_listener<F>(self, listener: TcpListener, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener.local_addr()?;
        let sweeper = self.spawn_sweeper();
        let app = router(self.state);

        info!(addr = %local_addr, "Starting HTTP server for rate limit decisions");

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            PollguardError::Http(e.to_string())
        });

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }

        result
    }

    /// Spawn the task that periodically drops expired records.
    fn spawn_sweeper(&self) -> Option<tokio::task::JoinHandle<()>> {
        if self.sweep_interval.is_zero() {
            return None;
        }

        let state = self.state.clone();
        let period = self.sweep_interval;
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                let removed = state.registry().sweep_expired();
                debug!(
                    removed = removed,
                    tracked = state.registry().tracked_keys(),
                    "Periodic sweep finished"
                );
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollguardConfig;

    #[test]
    fn test_server_creation() {
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        let state = AppState::new(&PollguardConfig::default()).unwrap();
        let server = HttpServer::new(addr, state).with_sweep_interval(Duration::from_secs(5));
        assert_eq!(server.sweep_interval, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let state = AppState::new(&PollguardConfig::default()).unwrap();
        let server = HttpServer::new(listener.local_addr().unwrap(), state)
            .with_sweep_interval(Duration::from_millis(10));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve_listener(listener, async move {
            let _ = rx.await;
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(()).unwrap();
        assert!(handle.await.unwrap().is_ok());
    }
}
