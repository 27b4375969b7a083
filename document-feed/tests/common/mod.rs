#![allow(dead_code)]

use document_feed::config::DocumentFeedConfig;
use document_feed::gateway::DocumentGateway;
use document_feed::startup::Application;
use service_core::config::Config as CoreConfig;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_USER_ID: &str = "test_user_123";

pub struct TestApp {
    pub address: String,
    pub ws_address: String,
    pub port: u16,
    pub gateway: Arc<dyn DocumentGateway>,
    pub storage_path: String,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Spawn on a random port against the in-memory store. `overrides` are
    /// applied on top of the test defaults.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Self {
        let storage_path = format!("target/test-storage-{}", Uuid::new_v4());

        let mut vars: HashMap<String, String> = HashMap::from([
            ("GATEWAY_BACKEND".to_string(), "memory".to_string()),
            ("STORAGE_LOCAL_PATH".to_string(), storage_path.clone()),
            ("FEED_REPLAY_TIMEOUT_MS".to_string(), "1000".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert(key.to_string(), value.to_string());
        }

        let common = CoreConfig {
            port: 0, // Random port for testing
            log_level: "debug".to_string(),
            otlp_endpoint: None,
        };
        let config = DocumentFeedConfig::from_lookup(common, |key| vars.get(key).cloned())
            .expect("Failed to load configuration");

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let gateway = app.gateway().clone();

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for HTTP server to be ready by polling health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("http://127.0.0.1:{}/health", port);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address: format!("http://127.0.0.1:{}", port),
            ws_address: format!("ws://127.0.0.1:{}", port),
            port,
            gateway,
            storage_path,
        }
    }

    /// Cleanup test resources.
    pub async fn cleanup(&self) {
        let _ = tokio::fs::remove_dir_all(&self.storage_path).await;
    }
}
