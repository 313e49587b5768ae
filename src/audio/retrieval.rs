use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;

use crate::audio::config::EngineConfig;
use crate::audio::errors::RetrievalError;

/// Boundary to the Audio Retrieval Service: turns a source identifier into
/// the raw bytes of a decodable audio container.
#[async_trait]
pub trait AudioRetriever: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, RetrievalError>;
}

/// Fetches from the proxy endpoint, `GET {base}{path}?url=<source>`.
pub struct HttpRetriever {
    client: reqwest::Client,
    endpoint: Url,
    max_payload_bytes: u64,
}

impl HttpRetriever {
    pub fn new(config: &EngineConfig) -> Result<Self, RetrievalError> {
        let endpoint_str = format!(
            "{}{}",
            config.retrieval_base_url.trim_end_matches('/'),
            config.retrieval_path
        );
        let endpoint = Url::parse(&endpoint_str).map_err(|e| RetrievalError::InvalidEndpoint {
            endpoint: endpoint_str.clone(),
            reason: e.to_string(),
        })?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(HttpRetriever {
            client,
            endpoint,
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    pub(crate) fn request_url(&self, source: &str) -> Result<Url, RetrievalError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(RetrievalError::EmptySource);
        }
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("url", source);
        Ok(url)
    }
}

#[async_trait]
impl AudioRetriever for HttpRetriever {
    async fn fetch(&self, source: &str) -> Result<Vec<u8>, RetrievalError> {
        let url = self.request_url(source)?;
        log::info!("Retrieval: GET {}", url);

        let mut response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::ServerStatus {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
            });
        }
        if let Some(length) = response.content_length() {
            if length > self.max_payload_bytes {
                return Err(RetrievalError::PayloadTooLarge {
                    limit: self.max_payload_bytes,
                });
            }
        }

        // The proxy streams without a length, so the limit is enforced per chunk.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) as u64 > self.max_payload_bytes {
                return Err(RetrievalError::PayloadTooLarge {
                    limit: self.max_payload_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        log::info!("Retrieval: Received {} bytes for '{}'", body.len(), source);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn retriever(base: &str) -> HttpRetriever {
        let config = EngineConfig {
            retrieval_base_url: base.to_string(),
            ..EngineConfig::default()
        };
        HttpRetriever::new(&config).unwrap()
    }

    /// Serves one canned response on a loopback port and returns its base URL.
    async fn serve_once(status_line: &'static str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let head = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn fetch_returns_the_whole_body() {
        let base = serve_once("200 OK", vec![1, 2, 3, 4]).await;
        let bytes = retriever(&base).fetch("track").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn error_status_carries_code_and_reason() {
        let base = serve_once("500 Internal Server Error", Vec::new()).await;
        let err = retriever(&base).fetch("track").await.unwrap_err();
        assert_eq!(err.to_string(), "Server error: 500 - Internal Server Error");
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let base = serve_once("200 OK", vec![0; 64]).await;
        let config = EngineConfig {
            retrieval_base_url: base,
            max_payload_bytes: 16,
            ..EngineConfig::default()
        };
        let err = HttpRetriever::new(&config)
            .unwrap()
            .fetch("track")
            .await
            .unwrap_err();
        assert!(matches!(err, RetrievalError::PayloadTooLarge { limit: 16 }));
    }

    #[test]
    fn source_is_percent_encoded_into_query() {
        let url = retriever("http://localhost:3000")
            .request_url("https://www.youtube.com/watch?v=abc&t=42")
            .unwrap();
        assert_eq!(url.path(), "/api/audio");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![(
                "url".to_string(),
                "https://www.youtube.com/watch?v=abc&t=42".to_string()
            )]
        );
    }

    #[test]
    fn trailing_slash_on_base_is_tolerated() {
        let url = retriever("http://localhost:3000/").request_url("x").unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/audio?url=x");
    }

    #[test]
    fn blank_source_is_rejected_before_any_request() {
        let err = retriever("http://localhost:3000")
            .request_url("   ")
            .unwrap_err();
        assert!(matches!(err, RetrievalError::EmptySource));
    }

    #[test]
    fn bad_base_url_fails_construction() {
        let config = EngineConfig {
            retrieval_base_url: "not a url".to_string(),
            ..EngineConfig::default()
        };
        assert!(matches!(
            HttpRetriever::new(&config),
            Err(RetrievalError::InvalidEndpoint { .. })
        ));
    }
}
