//! Cliente HTTP del tracker.

use std::time::Duration;

use async_trait::async_trait;
use common::{
    DescribeRequest, DescribeResponse, SubmitRequest, SubmitResponse, UnitId, UnitReport,
};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{tracker_base_url, PollConfig};
use crate::source::{QueryError, StatusSource, WorkSubmitter};

#[derive(Debug, Clone)]
pub struct HttpTracker {
    client: Client,
    base_url: String,
}

impl HttpTracker {
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// TRACKER_URL + el mismo límite por consulta que usa el poller.
    pub fn from_config(config: &PollConfig) -> reqwest::Result<Self> {
        Self::new(tracker_base_url(), config.query_timeout)
    }

    pub fn from_env() -> reqwest::Result<Self> {
        Self::from_config(&PollConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, QueryError>
    where
        B: serde::Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let resp = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        let resp = check_status(resp).await?;

        let bytes = resp.bytes().await.map_err(classify)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| QueryError::Rejected(format!("invalid response from {url}: {e}")))
    }
}

fn classify(e: reqwest::Error) -> QueryError {
    if e.is_builder() || e.is_decode() {
        QueryError::Rejected(e.to_string())
    } else {
        QueryError::Transient(e.to_string())
    }
}

async fn check_status(resp: Response) -> Result<Response, QueryError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(QueryError::Transient(format!("tracker returned {status}: {body}")))
    } else {
        Err(QueryError::Rejected(format!("tracker returned {status}: {body}")))
    }
}

#[async_trait]
impl StatusSource for HttpTracker {
    async fn describe(&self, ids: &[UnitId]) -> Result<Vec<UnitReport>, QueryError> {
        let request = DescribeRequest { jobs: ids.to_vec() };
        let response: DescribeResponse = self.post_json("/api/v1/jobs/describe", &request).await?;
        Ok(response.jobs)
    }
}

#[async_trait]
impl WorkSubmitter for HttpTracker {
    async fn submit(&self, request: &SubmitRequest) -> Result<Vec<UnitId>, QueryError> {
        let response: SubmitResponse = self.post_json("/api/v1/jobs", request).await?;
        Ok(response.job_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BatchStatusPoller, PollError};
    use axum::{routing::post, Router};
    use common::UnitStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// Levanta un tracker en 127.0.0.1:0 que responde siempre lo mismo al
    /// describe y cuenta cuántas veces lo llamaron.
    async fn tracker_fijo(code: StatusCode, body: &'static str) -> (HttpTracker, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/api/v1/jobs/describe",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    (code, [("content-type", "application/json")], body)
                }
            }),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let tracker = HttpTracker::new(format!("http://{addr}"), Duration::from_secs(5)).unwrap();
        (tracker, hits)
    }

    fn ids() -> Vec<UnitId> {
        vec!["a".to_string()]
    }

    #[test]
    fn base_url_sin_barra_final() {
        let t = HttpTracker::new("http://tracker:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(t.base_url(), "http://tracker:8080");
    }

    #[tokio::test]
    async fn tracker_caido_es_transitorio() {
        // Puerto 9 (discard) en loopback: nadie escucha.
        let t = HttpTracker::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = t.describe(&ids()).await.unwrap_err();
        assert!(err.is_retryable(), "got {err:?}");
    }

    #[tokio::test]
    async fn respuesta_valida_se_decodifica() {
        let (t, _) = tracker_fijo(
            StatusCode::OK,
            r#"{"jobs":[{"job_id":"a","status":"RUNNING"}]}"#,
        )
        .await;
        let reports = t.describe(&ids()).await.unwrap();
        assert_eq!(
            reports,
            vec![UnitReport {
                job_id: "a".to_string(),
                status: UnitStatus::Running
            }]
        );
    }

    #[tokio::test]
    async fn error_503_es_transitorio() {
        let (t, _) = tracker_fijo(StatusCode::SERVICE_UNAVAILABLE, r#"{"error":"busy"}"#).await;
        let err = t.describe(&ids()).await.unwrap_err();
        assert!(matches!(err, QueryError::Transient(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn error_429_es_transitorio() {
        let (t, _) = tracker_fijo(StatusCode::TOO_MANY_REQUESTS, r#"{"error":"slow down"}"#).await;
        let err = t.describe(&ids()).await.unwrap_err();
        assert!(matches!(err, QueryError::Transient(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn error_400_es_rechazo() {
        let (t, _) = tracker_fijo(StatusCode::BAD_REQUEST, r#"{"error":"too many ids"}"#).await;
        let err = t.describe(&ids()).await.unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)), "got {err:?}");
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn estado_desconocido_se_rechaza_sin_reintentar() {
        let body = r#"{"jobs":[{"job_id":"a","status":"ZOMBIE"}]}"#;
        let (t, hits) = tracker_fijo(StatusCode::OK, body).await;

        let err = t.describe(&ids()).await.unwrap_err();
        assert!(matches!(err, QueryError::Rejected(_)), "got {err:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let config = PollConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            ..PollConfig::default()
        };
        let poller = BatchStatusPoller::new(t, config);
        match poller.check(&ids()).await {
            Err(PollError::Query(QueryError::Rejected(_))) => {}
            other => panic!("esperaba Rejected, got {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
