use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;

use crate::error::{ConfigError, HttpFault};
use crate::probe::{ProbeResult, Prober};

const MAX_BODY_SIZE: usize = 1024 * 1024;
const USER_AGENT: &str = concat!("subtake/", env!("CARGO_PKG_VERSION"));

/// Status and (possibly truncated) body of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    pub status: u16,
    pub body: String,
}

/// Retrieves the page served for a domain so the classifier can look for
/// provider error markers.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, domain: &str) -> Result<PageResponse, HttpFault>;
}

/// Plain-HTTP client used for both existence probes and page fetches.
///
/// Probes send HEAD without following redirects; fetches send GET and follow
/// up to five redirects.
pub struct HttpClient {
    probe_client: Client,
    fetch_client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
        let probe_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::none())
            .user_agent(USER_AGENT)
            .build()?;

        let fetch_client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            probe_client,
            fetch_client,
        })
    }
}

#[async_trait]
impl Prober for HttpClient {
    async fn probe(&self, domain: &str) -> ProbeResult {
        // any status, 4xx and 5xx included, means the host answered
        match self.probe_client.head(format!("http://{}", domain)).send().await {
            Ok(resp) => {
                debug!("{} answered HEAD with {}", domain, resp.status());
                ProbeResult::reachable(domain)
            }
            Err(err) => ProbeResult::unreachable(domain, HttpFault::from(err)),
        }
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(&self, domain: &str) -> Result<PageResponse, HttpFault> {
        let mut resp = self
            .fetch_client
            .get(format!("http://{}", domain))
            .send()
            .await?;
        let status = resp.status().as_u16();

        let mut buf = BytesMut::new();
        while let Some(chunk) = resp.chunk().await? {
            let room = MAX_BODY_SIZE - buf.len();
            if chunk.len() >= room {
                buf.extend_from_slice(&chunk[..room]);
                debug!("{} body truncated at {} bytes", domain, MAX_BODY_SIZE);
                break;
            }
            buf.extend_from_slice(&chunk);
        }

        Ok(PageResponse {
            status,
            body: String::from_utf8_lossy(&buf).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `response` verbatim to every connection on a local port.
    async fn serve(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 2048];
                    let _ = socket.read(&mut buf).await;
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr.to_string()
    }

    async fn closed_port() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr.to_string()
    }

    fn client() -> HttpClient {
        HttpClient::new(Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn test_probe_error_status_is_reachable() {
        let host = serve("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let result = client().probe(&host).await;
        assert!(result.reachable);
        assert_eq!(result.fault, None);
    }

    #[tokio::test]
    async fn test_probe_not_found_is_reachable() {
        let host = serve("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        assert!(client().probe(&host).await.reachable);
    }

    #[tokio::test]
    async fn test_probe_refused_is_unreachable() {
        let host = closed_port().await;
        let result = client().probe(&host).await;
        assert!(!result.reachable);
        assert!(matches!(result.fault, Some(HttpFault::Connection(_))));
    }

    #[tokio::test]
    async fn test_fetch_returns_status_and_body() {
        let host = serve(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 20\r\nConnection: close\r\n\r\nRepository not found",
        )
        .await;
        let page = client().fetch(&host).await.unwrap();
        assert_eq!(page.status, 404);
        assert_eq!(page.body, "Repository not found");
    }

    #[tokio::test]
    async fn test_fetch_refused_is_fault() {
        let host = closed_port().await;
        assert!(client().fetch(&host).await.is_err());
    }
}
