//! [`QueryService`] over a JSON job API.
//!
//! | Step   | Request                          | Response body                         |
//! |--------|----------------------------------|---------------------------------------|
//! | submit | `POST {base}/queries`            | `{"id": "..."}`                       |
//! | poll   | `GET {base}/queries/{id}`        | `{"status": "running", "reason": ..}` |
//! | fetch  | `GET {base}/queries/{id}/result` | `{"layers": {"name": {..}}}`          |

use crate::query::config::ServiceConfig;
use crate::query::error::QueryError;
use crate::query::result::QueryResult;
use crate::query::service::{QueryHandle, QueryService};
use crate::query::spec::QuerySpec;
use crate::query::status::QueryStatus;
use log::{debug, warn};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;

pub struct HttpQueryService {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpQueryService {
    pub fn new(config: &ServiceConfig) -> Result<Self, QueryError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .build()
            .map_err(|e| QueryError::NetworkRequest(config.base_url.clone(), e))?;
        Self::with_client(client, config)
    }

    /// Uses an existing client; its own timeout settings apply.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Config`] if the configured base URL cannot be parsed or cannot
    /// carry a path.
    pub fn with_client(client: Client, config: &ServiceConfig) -> Result<Self, QueryError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            QueryError::Config(format!("Invalid base URL '{}': {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(QueryError::Config(format!(
                "Base URL '{}' cannot carry a path",
                config.base_url
            )));
        }
        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// The base URL extended by `segments`, each one percent-encoded as a single path segment.
    fn url(&self, segments: &[&str]) -> Result<Url, QueryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                QueryError::Config(format!("Base URL '{}' cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        url: String,
    ) -> Result<T, QueryError> {
        let request = match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| QueryError::NetworkRequest(url.clone(), e))?;

        let response = match response.error_for_status() {
            Ok(resp) => resp,
            Err(e) => {
                warn!("HTTP error for {}: {:?}", url, e);
                return Err(if let Some(status) = e.status() {
                    QueryError::HttpStatus {
                        url,
                        status,
                        source: e,
                    }
                } else {
                    QueryError::NetworkRequest(url, e)
                });
            }
        };

        let body = response
            .bytes()
            .await
            .map_err(|e| QueryError::NetworkRequest(url.clone(), e))?;
        debug!("Received {} bytes from {}", body.len(), url);
        serde_json::from_slice(&body).map_err(|e| QueryError::Decode(url, e))
    }
}

impl QueryService for HttpQueryService {
    async fn submit_query(&self, spec: &QuerySpec) -> Result<QueryHandle, QueryError> {
        let url = self.url(&["queries"])?;
        self.send(self.client.post(url.clone()).json(spec), url.to_string())
            .await
    }

    async fn poll_status(&self, handle: &QueryHandle) -> Result<QueryStatus, QueryError> {
        let url = self.url(&["queries", handle.id.as_str()])?;
        self.send(self.client.get(url.clone()), url.to_string()).await
    }

    async fn fetch_result(&self, handle: &QueryHandle) -> Result<QueryResult, QueryError> {
        let url = self.url(&["queries", handle.id.as_str(), "result"])?;
        self.send(self.client.get(url.clone()), url.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::spec::{LayerSpec, SpatialExtent, TemporalExtent};
    use crate::types::geo::LatLon;
    use chrono::{TimeZone, Utc};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serves one canned HTTP response and hands back the raw request it received.
    async fn serve_once(status: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buffer = [0u8; 4096];
            loop {
                let read = socket.read(&mut buffer).await.unwrap();
                request.extend_from_slice(&buffer[..read]);
                if read == 0 || request_complete(&request) {
                    break;
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&request).into_owned()
        });

        (base_url, server)
    }

    fn request_complete(request: &[u8]) -> bool {
        let text = String::from_utf8_lossy(request);
        let Some(header_end) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..header_end]
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= header_end + 4 + content_length
    }

    fn service(base_url: &str, api_key: Option<&str>) -> HttpQueryService {
        let config = ServiceConfig::builder()
            .base_url(format!("{base_url}/"))
            .maybe_api_key(api_key)
            .build();
        HttpQueryService::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_submit_posts_spec() -> Result<(), Box<dyn std::error::Error>> {
        let (base_url, server) = serve_once("201 Created", r#"{"id": "q-42"}"#).await;
        let spec = QuerySpec::builder()
            .spatial(SpatialExtent::point(LatLon(52.1, 5.18)))
            .temporal(TemporalExtent::Snapshots {
                times: vec![Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap()],
            })
            .layers(vec![LayerSpec::new("ra", "era5.t2m")])
            .build();

        let handle = service(&base_url, Some("secret")).submit_query(&spec).await?;
        assert_eq!(handle, QueryHandle::new("q-42"));

        let request = server.await?;
        assert!(request.starts_with("POST /queries HTTP/1.1"));
        assert!(request
            .to_ascii_lowercase()
            .contains("authorization: bearer secret"));
        assert!(request.contains(r#""key":"era5.t2m""#));
        Ok(())
    }

    #[tokio::test]
    async fn test_poll_status() -> Result<(), Box<dyn std::error::Error>> {
        let (base_url, server) =
            serve_once("200 OK", r#"{"status": "failed", "reason": "quota"}"#).await;
        let status = service(&base_url, None)
            .poll_status(&QueryHandle::new("q-42"))
            .await?;
        assert_eq!(
            status,
            QueryStatus::Failed {
                reason: Some("quota".to_string())
            }
        );

        let request = server.await?;
        assert!(request.starts_with("GET /queries/q-42 HTTP/1.1"));
        assert!(!request.to_ascii_lowercase().contains("authorization"));
        Ok(())
    }

    #[tokio::test]
    async fn test_query_id_is_a_single_path_segment() -> Result<(), Box<dyn std::error::Error>> {
        let (base_url, server) = serve_once("200 OK", r#"{"status": "running"}"#).await;
        let status = service(&base_url, None)
            .poll_status(&QueryHandle::new("a/b?c#d"))
            .await?;
        assert_eq!(status, QueryStatus::Running);

        let request = server.await?;
        assert!(
            request.starts_with("GET /queries/a%2Fb%3Fc%23d HTTP/1.1"),
            "{request}"
        );
        Ok(())
    }

    #[test]
    fn test_base_url_keeps_its_path() -> Result<(), Box<dyn std::error::Error>> {
        let service = service("https://queries.example.org/v1", None);
        let url = service.url(&["queries", "q-1", "result"])?;
        assert_eq!(url.as_str(), "https://queries.example.org/v1/queries/q-1/result");
        Ok(())
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        let config = ServiceConfig::builder().base_url("not a url").build();
        assert!(matches!(
            HttpQueryService::new(&config),
            Err(QueryError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let (base_url, server) = serve_once("404 Not Found", r#"{"error": "no such query"}"#).await;
        let error = service(&base_url, None)
            .fetch_result(&QueryHandle::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            QueryError::HttpStatus { ref url, status, .. }
                if status == reqwest::StatusCode::NOT_FOUND && url.ends_with("/queries/missing/result")
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_decode_error() {
        let (base_url, server) = serve_once("200 OK", r#"{"status": "exploded"}"#).await;
        let error = service(&base_url, None)
            .poll_status(&QueryHandle::new("q-1"))
            .await
            .unwrap_err();
        assert!(matches!(error, QueryError::Decode(..)));
        server.await.unwrap();
    }
}
