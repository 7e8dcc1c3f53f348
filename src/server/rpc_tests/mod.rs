//! Integration tests for the geofence bus.
//!
//! These tests spin up real servers and clients on ephemeral ports to test
//! the full communication flow. No mocks are used.

mod peer_loss_tests;
mod routing_tests;

use crate::client::GeofenceClient;
use crate::config::{ClientConfig, ServerConfig};
use crate::identity::LookupError;
use crate::rpc::{Category, GeofenceNotification, SignalKind};
use crate::server::{Capabilities, GeofenceServer};
use std::time::Duration;
use tokio::sync::mpsc;

/// Identity the test resolver assigns to `pid`.
pub fn app_id_for(pid: u32) -> String {
    format!("app.pid{}", pid)
}

/// Wrap `capabilities` so idle-category reports arrive on a channel.
pub fn record_idle(capabilities: Capabilities) -> (Capabilities, mpsc::UnboundedReceiver<Category>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let capabilities = capabilities.on_idle_category(move |category| {
        let _ = tx.send(category);
    });
    (capabilities, rx)
}

/// Receive the next item, or `None` if nothing arrives within `ms`.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, ms: u64) -> Option<T> {
    tokio::time::timeout(Duration::from_millis(ms), rx.recv())
        .await
        .ok()
        .flatten()
}

/// Test harness that manages a real geofence server.
pub struct TestServer {
    server: Option<GeofenceServer>,
}

impl TestServer {
    /// Start a server on ephemeral ports with a deterministic identity resolver.
    pub async fn start(capabilities: Capabilities) -> Self {
        let config = ServerConfig {
            name: Some("test".to_string()),
            ..ServerConfig::default()
        };
        let resolver = Box::new(|pid: u32| -> Result<String, LookupError> { Ok(app_id_for(pid)) });
        let server = GeofenceServer::create_with_resolver(&config, capabilities, resolver)
            .await
            .unwrap();
        Self {
            server: Some(server),
        }
    }

    pub fn server(&self) -> &GeofenceServer {
        self.server.as_ref().unwrap()
    }

    pub fn client_config(&self) -> ClientConfig {
        let server = self.server();
        ClientConfig {
            call_timeout_secs: 5,
            ..ClientConfig::with_ports(
                "127.0.0.1",
                server.local_addr().port(),
                server.signal_addr().port(),
            )
        }
    }

    pub async fn create_client(&self) -> GeofenceClient {
        GeofenceClient::create(&self.client_config()).await.unwrap()
    }

    /// A started client whose signals arrive on the returned channel.
    pub async fn started_client(
        &self,
    ) -> (
        GeofenceClient,
        mpsc::UnboundedReceiver<(SignalKind, GeofenceNotification)>,
    ) {
        let mut client = self.create_client().await;
        let (tx, rx) = mpsc::unbounded_channel();
        client
            .start(move |kind, notification| {
                let _ = tx.send((kind, notification.clone()));
            })
            .await
            .unwrap();
        (client, rx)
    }

    pub async fn session_count(&self) -> usize {
        self.server().session_count().await.unwrap()
    }

    pub async fn subscription_count(&self) -> usize {
        self.server().subscription_count().await.unwrap()
    }

    /// Poll until the server tracks `expected` sessions; false on timeout.
    pub async fn wait_for_sessions(&self, expected: usize) -> bool {
        for _ in 0..100 {
            if self.session_count().await == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    pub async fn destroy(mut self) {
        if let Some(server) = self.server.take() {
            server.destroy().await.unwrap();
        }
    }
}
