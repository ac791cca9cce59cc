//! PostgREST row store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::auth::AuthProvider;
use crate::error::StoreError;
use crate::filter::RowFilter;
use crate::store::RowStore;

/// Row store talking to `{base}/rest/v1`.
pub struct RestStore {
    http: reqwest::Client,
    rest_url: String,
    anon_key: String,
    auth: Option<Arc<dyn AuthProvider>>,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("rest_url", &self.rest_url)
            .field("anon_key", &"[REDACTED]")
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

impl RestStore {
    pub fn new(rest_url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Ok(Self {
            http,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            anon_key: anon_key.into(),
            auth: None,
        })
    }

    /// Send the signed-in user's token instead of the anon key when there is one.
    pub fn with_auth(mut self, auth: Arc<dyn AuthProvider>) -> Self {
        self.auth = Some(auth);
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{table}", self.rest_url)
    }

    async fn bearer(&self) -> String {
        let token = match &self.auth {
            Some(auth) => auth.current_user().await.and_then(|u| u.access_token),
            None => None,
        };
        format!("Bearer {}", token.as_deref().unwrap_or(&self.anon_key))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// Query pairs for a filtered select.
pub(crate) fn select_query(filter: Option<&RowFilter>) -> Vec<(String, String)> {
    let mut query = vec![("select".to_string(), "*".to_string())];
    if let Some(filter) = filter {
        query.push((filter.column().to_string(), filter.wire_value()));
    }
    query
}

#[async_trait]
impl RowStore for RestStore {
    async fn upsert(
        &self,
        table: &str,
        row: serde_json::Value,
        on_conflict: &str,
    ) -> Result<(), StoreError> {
        debug!(table, on_conflict, "REST upsert");
        let response = self
            .http
            .post(self.table_url(table))
            .query(&[("on_conflict", on_conflict)])
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer().await)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&row)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }

    async fn select(
        &self,
        table: &str,
        filter: Option<&RowFilter>,
    ) -> Result<Vec<serde_json::Value>, StoreError> {
        debug!(table, filter = ?filter.map(|f| f.to_string()), "REST select");
        let response = self
            .http
            .get(self.table_url(table))
            .query(&select_query(filter))
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer().await)
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}
