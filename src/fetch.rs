use std::time::{Duration, Instant};

use reqwest::StatusCode;
use thiserror::Error;
use tracing::info;

use crate::settings::Settings;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("catalog request failed with status {0}")]
    Status(StatusCode),
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// GET the catalog page as a browser would and return its body.
pub async fn fetch_catalog(settings: &Settings) -> Result<String, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()?;

    info!("Fetching model catalog: {}", settings.source_url);
    let start = Instant::now();
    let response = client.get(&settings.source_url).send().await?;

    let status = response.status();
    if status != StatusCode::OK {
        return Err(FetchError::Status(status));
    }

    let body = response.text().await?;
    info!(
        "Fetched {} bytes in {}ms",
        body.len(),
        start.elapsed().as_millis()
    );
    Ok(body)
}

// ── Tests ──

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// One-shot HTTP server on localhost. Returns the URL to hit and a handle
    /// yielding the raw request it received.
    pub(crate) async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {}\r\ncontent-type: text/html\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });

        (format!("http://{}/search", addr), handle)
    }

    pub(crate) fn settings_for(url: String) -> Settings {
        Settings {
            source_url: url,
            timeout_secs: 5,
            ..Settings::default()
        }
    }

    #[tokio::test]
    async fn ok_returns_body_and_sends_user_agent() {
        let (url, server) = serve_once("200 OK", "<html>catalog</html>").await;
        let body = fetch_catalog(&settings_for(url)).await.unwrap();
        assert_eq!(body, "<html>catalog</html>");

        let request = server.await.unwrap().to_lowercase();
        assert!(request.starts_with("get /search"));
        assert!(request.contains("user-agent: mozilla/5.0"));
    }

    #[tokio::test]
    async fn not_found_is_status_error() {
        let (url, _server) = serve_once("404 Not Found", "").await;
        let err = fetch_catalog(&settings_for(url)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(StatusCode::NOT_FOUND)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn other_success_codes_are_rejected_too() {
        let (url, _server) = serve_once("204 No Content", "").await;
        let err = fetch_catalog(&settings_for(url)).await.unwrap_err();
        assert!(matches!(err, FetchError::Status(StatusCode::NO_CONTENT)));
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        // Bind then drop to get a port nobody listens on.
        let addr = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
        let err = fetch_catalog(&settings_for(format!("http://{}/", addr)))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
