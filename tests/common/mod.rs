//! Shared plumbing for the device integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Once;

use axum::Router;
use tokio::task::JoinHandle;

/// One throwaway HTTP server per test, serving an axum router on an
/// ephemeral localhost port. Dropping it stops the server.
pub struct MockServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(router: Router) -> Self {
        // Bind before spawning so the port is live when `start` returns.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        Self { addr, handle }
    }

    pub fn host(&self) -> String {
        self.addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

static TRACING: Once = Once::new();

/// Send tracing output to the test writer, honoring `RUST_LOG`.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
