use std::time::Duration;

use lamp_common::{DeviceConfig, DeviceRequest};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("request to {path} failed: {source}")]
    Transport {
        path: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("device answered {status} for {path}")]
    Status {
        path: &'static str,
        status: StatusCode,
    },
}

#[derive(Clone)]
pub struct DeviceClient {
    http: reqwest::Client,
    base_url: String,
}

impl DeviceClient {
    pub fn new(config: &DeviceConfig) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reads a plain-text or JSON body from one of the `get*` endpoints.
    pub async fn fetch_text(&self, path: &'static str) -> Result<String, DeviceError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .map_err(|source| DeviceError::Transport { path, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status { path, status });
        }

        response
            .text()
            .await
            .map_err(|source| DeviceError::Transport { path, source })
    }

    /// Issues a write. The response body is advisory and only logged.
    pub async fn send(&self, request: &DeviceRequest) -> Result<(), DeviceError> {
        let path = request.path;
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(&request.query)
            .send()
            .await
            .map_err(|source| DeviceError::Transport { path, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeviceError::Status { path, status });
        }

        if let Ok(body) = response.text().await {
            if !body.is_empty() {
                debug!("device {path}: {}", body.trim());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use axum::{extract::Query, routing::get, Router};
    use lamp_common::{AlarmConfig, EngineAction, PATH_GET_COLOR};
    use tokio::net::TcpListener;

    use super::*;

    type Recorded = Arc<Mutex<Vec<HashMap<String, String>>>>;

    async fn spawn_fake_device(router: Router) -> DeviceClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        DeviceClient::new(&DeviceConfig {
            base_url: format!("http://{addr}/"),
            request_timeout_ms: 2_000,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_plain_text_values() {
        let router = Router::new()
            .route("/getColor", get(|| async { "#00ff7f" }));
        let client = spawn_fake_device(router).await;

        assert_eq!(client.fetch_text(PATH_GET_COLOR).await.unwrap(), "#00ff7f");
    }

    #[tokio::test]
    async fn alarm_write_reaches_device_query() {
        let recorded: Recorded = Arc::default();
        let sink = recorded.clone();
        let router = Router::new().route(
            "/setAlarm",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let sink = sink.clone();
                async move {
                    sink.lock().unwrap().push(params);
                    "ok"
                }
            }),
        );
        let client = spawn_fake_device(router).await;

        let request = EngineAction::SetAlarm(AlarmConfig {
            enabled: true,
            time: "06:45".to_string(),
        })
        .request()
        .unwrap();
        client.send(&request).await.unwrap();

        let recorded = recorded.lock().unwrap();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].get("enabled").map(String::as_str), Some("1"));
        assert_eq!(recorded[0].get("time").map(String::as_str), Some("06:45"));
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_status_error() {
        let client = spawn_fake_device(Router::new()).await;

        let err = client.fetch_text(PATH_GET_COLOR).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::Status {
                status: StatusCode::NOT_FOUND,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_device_is_a_transport_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = DeviceClient::new(&DeviceConfig {
            base_url: format!("http://{addr}"),
            request_timeout_ms: 500,
        })
        .unwrap();

        let err = client.fetch_text(PATH_GET_COLOR).await.unwrap_err();
        assert!(matches!(err, DeviceError::Transport { .. }));
    }
}
