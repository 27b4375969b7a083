use document_feed::config::DocumentFeedConfig;
use document_feed::services::init_metrics;
use document_feed::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Metrics recorder must exist before anything records.
    init_metrics().map_err(|e| std::io::Error::other(e.to_string()))?;

    let config = DocumentFeedConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "document-feed",
        &config.common.log_level,
        config.common.otlp_endpoint.as_deref(),
    )
    .map_err(|e| std::io::Error::other(format!("Tracing initialization error: {}", e)))?;

    tracing::info!(
        gateway = ?config.gateway,
        page_size = config.feed.page_size,
        "Starting document-feed"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    app.run_until_stopped().await?;
    tracing::info!("Server stopped");
    Ok(())
}
