//! HTTP Server

use axum::Router;
use jobctl_core::application::ShutdownToken;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::info;

const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP Server Configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub host: String,
    pub port: u16,
    /// Whole-request budget; must exceed the longest lock wait
    pub request_timeout: Duration,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HTTP_HOST.to_string(),
            port: DEFAULT_HTTP_PORT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Bind and serve until `shutdown` fires, then drain in-flight requests
pub async fn serve(
    config: &HttpServerConfig,
    router: Router,
    shutdown: ShutdownToken,
) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!(
        addr = %listener.local_addr()?,
        request_timeout_ms = config.request_timeout.as_millis() as u64,
        "HTTP gateway listening"
    );

    let app = router.layer(TimeoutLayer::new(config.request_timeout));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled())
        .await?;

    info!("HTTP gateway stopped");
    Ok(())
}
