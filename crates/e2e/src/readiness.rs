//! Readiness polling against the dev server

use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::ReadinessConfig;
use crate::error::{SmokeError, SmokeResult};

/// Poll `url` until it answers HTTP 200 or `config.timeout` elapses.
///
/// Connection errors and non-200 answers are expected while the server is
/// starting and only count as attempts. Returns the time it took.
pub async fn wait_until_ready(url: &str, config: &ReadinessConfig) -> SmokeResult<Duration> {
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()?;

    let start = Instant::now();
    let mut attempts = 0usize;

    while start.elapsed() < config.timeout() {
        attempts += 1;

        match client.get(url).send().await {
            Ok(resp) if resp.status() == StatusCode::OK => {
                let elapsed = start.elapsed();
                info!(
                    "Server ready at {} after {} attempt(s) ({} ms)",
                    url,
                    attempts,
                    elapsed.as_millis()
                );
                return Ok(elapsed);
            }
            Ok(resp) => {
                debug!("Readiness probe returned {}", resp.status());
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for server at {}...", url);
                }
                debug!("Readiness probe error: {}", e);
            }
        }

        sleep(config.poll_interval()).await;
    }

    Err(SmokeError::ServerNotReady {
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn quick() -> ReadinessConfig {
        ReadinessConfig {
            timeout_ms: 2_000,
            poll_interval_ms: 20,
            request_timeout_ms: 500,
        }
    }

    /// Serve `503` for the first `unavailable` connections, then `200`
    async fn responder(unavailable: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let status = if n < unavailable {
                    "503 Service Unavailable"
                } else {
                    "200 OK"
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = socket.write_all(response.as_bytes()).await;
            }
        });

        (url, hits)
    }

    async fn unused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_ready_on_first_200() {
        let (url, hits) = responder(0).await;
        wait_until_ready(&url, &quick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_200_is_retried() {
        let (url, hits) = responder(3).await;
        wait_until_ready(&url, &quick()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_refused_connections_time_out() {
        let url = unused_url().await;
        let config = ReadinessConfig {
            timeout_ms: 300,
            ..quick()
        };

        let start = Instant::now();
        let err = wait_until_ready(&url, &config).await.unwrap_err();

        assert!(start.elapsed() >= Duration::from_millis(300));
        match err {
            SmokeError::ServerNotReady { url: reported } => assert_eq!(reported, url),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_ready_once_server_starts_listening() {
        let url = unused_url().await;
        let addr = url.trim_start_matches("http://").to_string();

        // Nothing listens for the first 200 ms, so early probes are refused
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let listener = TcpListener::bind(&addr).await.unwrap();
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                    .await;
            }
        });

        let waited = wait_until_ready(&url, &quick()).await.unwrap();
        assert!(waited >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_never_200_times_out() {
        let (url, _) = responder(usize::MAX).await;
        let config = ReadinessConfig {
            timeout_ms: 200,
            ..quick()
        };
        let err = wait_until_ready(&url, &config).await.unwrap_err();
        assert!(err.to_string().starts_with("Timed out waiting for server at"));
    }
}
