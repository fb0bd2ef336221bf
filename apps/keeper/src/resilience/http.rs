use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::resilience::error::OperationError;
use crate::resilience::executor::ResilientExecutor;
use crate::resilience::policy::RetryPolicy;

/// JSON-over-HTTP helper: every request goes through
/// [`ResilientExecutor::fetch_with_retry`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    executor: ResilientExecutor,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client, executor: ResilientExecutor, policy: RetryPolicy) -> Self {
        Self {
            client,
            executor,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, OperationError> {
        let response = self
            .executor
            .fetch_with_retry(
                |_token| {
                    let request = self.client.get(url);
                    async move { Ok(request.send().await?) }
                },
                &self.policy,
            )
            .await?;
        debug!(url, status = response.status().as_u16(), "GET succeeded");
        Ok(response.json::<T>().await?)
    }

    pub async fn post_json<B, T>(&self, url: &str, body: &B) -> Result<T, OperationError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .executor
            .fetch_with_retry(
                |_token| {
                    let request = self.client.post(url).json(body);
                    async move { Ok(request.send().await?) }
                },
                &self.policy,
            )
            .await?;
        debug!(url, status = response.status().as_u16(), "POST succeeded");
        Ok(response.json::<T>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::clock::SystemClock;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn fetcher(max_attempts: u32) -> HttpFetcher {
        let policy = RetryPolicy::default()
            .with_max_attempts(max_attempts)
            .with_delays(Duration::from_millis(5), Duration::from_millis(20));
        HttpFetcher::new(
            reqwest::Client::new(),
            ResilientExecutor::new(Arc::new(SystemClock)),
            policy,
        )
    }

    #[tokio::test]
    async fn test_get_json_retries_server_errors() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = {
            let hits = Arc::clone(&hits);
            Router::new().route(
                "/templates",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(StatusCode::SERVICE_UNAVAILABLE)
                        } else {
                            Ok(Json(json!({ "templates": ["classic", "modern"] })))
                        }
                    }
                }),
            )
        };
        let base = serve(router).await;

        let body: Value = fetcher(3)
            .get_json(&format!("{base}/templates"))
            .await
            .unwrap();
        assert_eq!(body["templates"][1], "modern");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let hits = Arc::new(AtomicU32::new(0));
        let router = {
            let hits = Arc::clone(&hits);
            Router::new().route(
                "/missing",
                get(move || {
                    let hits = Arc::clone(&hits);
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        StatusCode::NOT_FOUND
                    }
                }),
            )
        };
        let base = serve(router).await;

        let err = fetcher(3)
            .get_json::<Value>(&format!("{base}/missing"))
            .await
            .unwrap_err();
        assert_eq!(err.root_cause().status(), Some(404));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
