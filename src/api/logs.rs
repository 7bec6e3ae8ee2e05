//! Service log retrieval.

use std::sync::Arc;

use reqwest::Method;
use tokio_util::sync::CancellationToken;

use super::{endpoint, ApiError, OrgSelection, Requester};

/// Fetches service logs from the backend.
#[derive(Clone)]
pub struct LogManager {
    requester: Arc<dyn Requester>,
    org: OrgSelection,
}

impl LogManager {
    pub(crate) fn new(requester: Arc<dyn Requester>, org: OrgSelection) -> Self {
        Self { requester, org }
    }

    /// Returns the raw log output of `service` in environment `env_id`.
    ///
    /// `tail` limits the output to the last N lines; the backend default
    /// applies when `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn fetch(
        &self,
        ctx: &CancellationToken,
        env_id: &str,
        service: &str,
        tail: Option<u32>,
    ) -> Result<Vec<u8>, ApiError> {
        let mut query = self.org.query();
        if let Some(tail) = tail {
            query.push(("tail", tail.to_string()));
        }
        let uri = endpoint(&["application", env_id, "services", service, "logs"], &query)?;
        self.requester
            .request(ctx, Method::GET, &uri, None, None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeRequester;

    #[tokio::test]
    async fn fetch_returns_raw_bytes() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond_raw("line one\nline two\n");
        let logs = LogManager::new(fake.clone(), OrgSelection::new(None));

        let body = logs
            .fetch(&CancellationToken::new(), "env-1", "web", Some(50))
            .await
            .unwrap();
        assert_eq!(body, b"line one\nline two\n");
        assert_eq!(
            fake.calls()[0].uri,
            "/api/v1/application/env-1/services/web/logs?tail=50"
        );
    }
}
