//! REST adapter for [`DeviceClient`].
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET   /state`        → [`DeviceState`]
//! - `PATCH /state`        ← [`StatePatch`] (power changes use the same route)
//! - `GET   /sensors/room` → `{ "temperature": <number> }`

use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;

use super::{DeviceClient, DeviceError, DeviceState, StatePatch};

/// Connection settings for the device API.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Base URL without trailing slash, e.g. `http://10.0.0.5:8080/api`.
    pub api_url: String,
    /// Optional bearer token.
    pub token: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RoomReading {
    temperature: f64,
}

/// HTTP client for a single climate unit.
pub struct RestDevice {
    http: reqwest::Client,
    base: String,
    token: Option<String>,
}

impl RestDevice {
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{path}", self.base));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn patch(&self, patch: &StatePatch) -> Result<(), DeviceError> {
        tracing::debug!(?patch, "PATCH /state");
        let response = self
            .request(Method::PATCH, "/state")
            .json(patch)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

/// Turn a non-2xx response into [`DeviceError::Status`].
async fn check_status(response: Response) -> Result<Response, DeviceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeviceError::Status {
        status: status.as_u16(),
        body,
    })
}

impl DeviceClient for RestDevice {
    fn read_state(&self) -> BoxFuture<'_, Result<DeviceState, DeviceError>> {
        async move {
            let response = self.request(Method::GET, "/state").send().await?;
            let state = check_status(response).await?.json::<DeviceState>().await?;
            tracing::debug!(?state, "GET /state");
            Ok(state)
        }
        .boxed()
    }

    fn mutate_state(&self, patch: StatePatch) -> BoxFuture<'_, Result<(), DeviceError>> {
        async move { self.patch(&patch).await }.boxed()
    }

    fn read_room_temperature(&self) -> BoxFuture<'_, Result<f64, DeviceError>> {
        async move {
            let response = self.request(Method::GET, "/sensors/room").send().await?;
            let reading = check_status(response).await?.json::<RoomReading>().await?;
            tracing::debug!(temperature = reading.temperature, "GET /sensors/room");
            Ok(reading.temperature)
        }
        .boxed()
    }

    fn set_power(&self, on: bool) -> BoxFuture<'_, Result<(), DeviceError>> {
        async move {
            self.patch(&StatePatch {
                power: Some(on),
                ..Default::default()
            })
            .await
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response on a loopback port.
    ///
    /// Returns the base URL and a handle resolving to the raw request
    /// (head and body) the client sent.
    async fn serve_once(
        status_line: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];

            // Read the head, then as much body as content-length announces.
            let head_end = loop {
                let n = stream.read(&mut chunk).await.unwrap();
                assert!(n > 0, "client closed before sending a request");
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos + 4;
                }
            };
            let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
            let content_length = head
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            while buf.len() < head_end + content_length {
                let n = stream.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let response = format!(
                "{status_line}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            String::from_utf8_lossy(&buf).into_owned()
        });

        (format!("http://{addr}/api/"), handle)
    }

    fn device(base: String, token: Option<&str>) -> RestDevice {
        RestDevice::new(&DeviceConfig {
            api_url: base,
            token: token.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn read_state_parses_body_and_sends_token() {
        let (base, server) = serve_once(
            "HTTP/1.1 200 OK",
            r#"{"power":true,"target_temperature":23,"mode":"cool"}"#,
        )
        .await;

        let state = device(base, Some("s3cret")).read_state().await.unwrap();
        assert!(state.power);
        assert_eq!(state.target_temperature, 23);
        assert_eq!(state.mode.as_deref(), Some("cool"));

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/state HTTP/1.1"), "{request}");
        assert!(request.to_lowercase().contains("authorization: bearer s3cret"));
    }

    #[tokio::test]
    async fn mutate_state_sends_partial_patch() {
        let (base, server) = serve_once("HTTP/1.1 204 No Content", "").await;

        device(base, None)
            .mutate_state(StatePatch {
                target_temperature: Some(21),
                ..Default::default()
            })
            .await
            .unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PATCH /api/state HTTP/1.1"), "{request}");
        assert!(request.ends_with(r#"{"target_temperature":21}"#), "{request}");
        assert!(!request.to_lowercase().contains("authorization"));
    }

    #[tokio::test]
    async fn set_power_patches_power_only() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", "{}").await;

        device(base, None).set_power(false).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("PATCH /api/state"), "{request}");
        assert!(request.ends_with(r#"{"power":false}"#), "{request}");
    }

    #[tokio::test]
    async fn read_room_temperature() {
        let (base, server) = serve_once("HTTP/1.1 200 OK", r#"{"temperature":26.5}"#).await;

        let room = device(base, None).read_room_temperature().await.unwrap();
        assert!((room - 26.5).abs() < f64::EPSILON);

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/sensors/room"), "{request}");
    }

    #[tokio::test]
    async fn non_success_status_maps_to_status_error() {
        let (base, _server) =
            serve_once("HTTP/1.1 503 Service Unavailable", r#"{"error":"busy"}"#).await;

        let err = device(base, None).read_state().await.unwrap_err();
        match err {
            DeviceError::Status { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("busy"));
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_http_error() {
        let (base, _server) = serve_once("HTTP/1.1 200 OK", "not json").await;

        let err = device(base, None).read_state().await.unwrap_err();
        assert!(matches!(err, DeviceError::Http(_)), "{err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_http_error() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = device(format!("http://{addr}"), None)
            .read_room_temperature()
            .await
            .unwrap_err();
        assert!(matches!(err, DeviceError::Http(_)), "{err:?}");
    }
}
