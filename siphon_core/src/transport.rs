use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, redirect};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    /// The request (or the client itself) could not be assembled. Never
    /// transient: retrying with the same configuration fails the same way.
    #[error("Failed to build request: {0}")]
    Build(String),
    /// Connection, TLS, or timeout failure while talking to the target.
    #[error("Request to {url} failed: {message}")]
    Request { url: String, message: String },
}

/// One outgoing request. Headers are kept as plain strings so fakes can
/// inspect them without touching `reqwest` types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRequest {
    pub method: String,
    pub url: String,
    pub body: String,
    pub headers: Vec<(String, String)>,
}

/// The only network primitive the oracle needs: send a request and report the
/// status code that came back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &TransportRequest) -> Result<u16, TransportError>;
}

/// `reqwest`-backed transport that never follows redirects, so a 3xx answer is
/// observed as-is.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, TransportError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(|e| TransportError::Build(format!("HTTP client: {e}")))?;
        Ok(Self { client })
    }

    fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::Build(format!("header name {name:?}: {e}")))?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::Build(format!("header {name} value: {e}")))?;
            map.insert(header_name, header_value);
        }
        Ok(map)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &TransportRequest) -> Result<u16, TransportError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportError::Build(format!("method {:?}: {e}", request.method)))?;
        let headers = Self::header_map(&request.headers)?;

        let built = self
            .client
            .request(method, &request.url)
            .headers(headers)
            .body(request.body.clone())
            .build()
            .map_err(|e| TransportError::Build(format!("{}: {e}", request.url)))?;

        let response = self
            .client
            .execute(built)
            .await
            .map_err(|e| TransportError::Request {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one connection, captures the raw request, answers with
    /// `response`, and hands the captured bytes back.
    async fn one_shot_server(response: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
                let text = String::from_utf8_lossy(&raw);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if raw.len() >= header_end + 4 + content_length {
                        break;
                    }
                }
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
            String::from_utf8_lossy(&raw).into_owned()
        });
        (format!("http://{addr}/login"), handle)
    }

    #[tokio::test]
    async fn redirect_status_is_observed_not_followed() {
        let (url, server) = one_shot_server(
            "HTTP/1.1 303 See Other\r\nLocation: /dashboard\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        let transport = ReqwestTransport::new(Duration::from_secs(5), false).unwrap();
        let request = TransportRequest {
            method: "POST".to_string(),
            url,
            body: r#"1_ldap-username=admin&1_ldap-secret=a*&0=[{},"$K1"]"#.to_string(),
            headers: vec![
                (
                    "Content-Type".to_string(),
                    "application/x-www-form-urlencoded".to_string(),
                ),
                ("Next-Action".to_string(), "abc123".to_string()),
            ],
        };

        let status = transport.send(&request).await.unwrap();
        assert_eq!(status, 303);

        let raw = server.await.unwrap();
        assert!(raw.starts_with("POST /login HTTP/1.1"), "raw request: {raw}");
        assert!(raw.to_ascii_lowercase().contains("next-action: abc123"));
        assert!(
            raw.ends_with(r#"1_ldap-username=admin&1_ldap-secret=a*&0=[{},"$K1"]"#),
            "body must be sent byte-for-byte, got: {raw}"
        );
    }

    #[tokio::test]
    async fn connection_refused_is_request_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new(Duration::from_secs(2), false).unwrap();
        let request = TransportRequest {
            method: "POST".to_string(),
            url: format!("http://{addr}/"),
            body: String::new(),
            headers: Vec::new(),
        };
        match transport.send(&request).await {
            Err(TransportError::Request { url, .. }) => assert!(url.contains(&addr.to_string())),
            other => panic!("Expected a request error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_header_value_is_build_error() {
        let transport = ReqwestTransport::new(Duration::from_secs(2), false).unwrap();
        let request = TransportRequest {
            method: "POST".to_string(),
            url: "http://127.0.0.1:9/".to_string(),
            body: String::new(),
            headers: vec![("Next-Action".to_string(), "bad\nvalue".to_string())],
        };
        assert!(matches!(
            transport.send(&request).await,
            Err(TransportError::Build(_))
        ));
    }
}
