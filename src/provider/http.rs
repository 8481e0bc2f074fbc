//! Remote backend over HTTP.
//!
//! Mirrors the [`DatabaseProvider`] contract as JSON calls against
//! `{base}/sync/...`. Version checks happen on the server; a `409 Conflict`
//! on a thing write becomes `Error::StaleVersion`, any other failure
//! `Error::Provider` carrying the server's message.

use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parser::{StagedChange, thing_url};
use crate::provider::events::Event;
use crate::provider::sqlite::DEFAULT_ACTOR;
use crate::provider::{DatabaseProvider, EntitySnapshot, SyncActionOptions};
use crate::sync::types::{SyncState, SyncStats};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// HTTP-based provider.
#[derive(Debug, Clone)]
pub struct HttpProvider {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    actor: String,
}

#[derive(Debug, Deserialize)]
struct ActionCreated {
    id: String,
}

#[derive(Debug, Serialize)]
struct ProgressRequest {
    processed: usize,
    total: usize,
}

#[derive(Debug, Serialize)]
struct CompleteRequest<'a> {
    stats: &'a SyncStats,
}

#[derive(Debug, Serialize)]
struct FailRequest<'a> {
    error: &'a str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    ns: &'a str,
    change: &'a StagedChange,
    version: u64,
    actor: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    ns: &'a str,
    #[serde(rename = "type")]
    thing_type: &'a str,
    id: &'a str,
    version: u64,
    actor: &'a str,
}

impl HttpProvider {
    /// Create a provider for `base_url` (trailing slashes are ignored).
    #[must_use]
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = actor.to_string();
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/sync/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.timeout(REQUEST_TIMEOUT);
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(
        &self,
        request: RequestBuilder,
        what: &str,
        write: Option<(&str, u64)>,
    ) -> Result<Response> {
        let response = self.authorize(request).send().await?;
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(rejection(status, &body, what, write))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B, what: &str) -> Result<()> {
        let request = self.client.post(self.endpoint(path)).json(body);
        self.send(request, what, None).await?;
        Ok(())
    }

    /// POST a thing write; a `409` means the version was stale.
    async fn post_write<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        what: &str,
        url: &str,
        version: u64,
    ) -> Result<()> {
        let request = self.client.post(self.endpoint(path)).json(body);
        self.send(request, what, Some((url, version))).await?;
        Ok(())
    }

    /// GET returning `None` on 404.
    async fn get_optional<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        what: &str,
    ) -> Result<Option<T>> {
        let request = self.client.get(self.endpoint(path)).query(query);
        let response = self.authorize(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(rejection(status, &body, what, None));
        }
        Ok(Some(response.json().await?))
    }
}

/// Server current version in a `409` body, e.g. `{"current": 4}`.
#[derive(Deserialize)]
struct StaleBody {
    current: u64,
}

/// Error for a non-success response.
fn rejection(status: StatusCode, body: &str, what: &str, write: Option<(&str, u64)>) -> Error {
    if let Some((url, attempted)) = write.filter(|_| status == StatusCode::CONFLICT) {
        let current = serde_json::from_str::<StaleBody>(body).map_or(attempted, |b| b.current);
        return Error::StaleVersion {
            url: url.to_string(),
            attempted,
            current,
        };
    }
    Error::Provider(format!("{what} failed ({status}): {body}"))
}

impl DatabaseProvider for HttpProvider {
    async fn is_connected(&self) -> bool {
        let request = self.client.get(self.endpoint("health")).timeout(HEALTH_TIMEOUT);
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        request
            .send()
            .await
            .is_ok_and(|response| response.status().is_success())
    }

    async fn get_sync_state(&self, repo: &str, branch: &str) -> Result<Option<SyncState>> {
        self.get_optional("state", &[("repo", repo), ("branch", branch)], "get sync state")
            .await
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.post("state", state, "save sync state").await
    }

    async fn create_sync_action(&self, options: &SyncActionOptions) -> Result<String> {
        let request = self.client.post(self.endpoint("actions")).json(options);
        let response = self.send(request, "create sync action", None).await?;
        let created: ActionCreated = response.json().await?;
        Ok(created.id)
    }

    async fn update_action_progress(&self, action_id: &str, processed: usize, total: usize) -> Result<()> {
        self.post(
            &format!("actions/{action_id}/progress"),
            &ProgressRequest { processed, total },
            "update action progress",
        )
        .await
    }

    async fn complete_action(&self, action_id: &str, stats: &SyncStats) -> Result<()> {
        self.post(
            &format!("actions/{action_id}/complete"),
            &CompleteRequest { stats },
            "complete action",
        )
        .await
    }

    async fn fail_action(&self, action_id: &str, error: &str) -> Result<()> {
        self.post(
            &format!("actions/{action_id}/fail"),
            &FailRequest { error },
            "fail action",
        )
        .await
    }

    async fn upsert_thing(&self, ns: &str, change: &StagedChange, version: u64) -> Result<()> {
        let body = UpsertRequest {
            ns,
            change,
            version,
            actor: &self.actor,
        };
        let url = change.url(ns).unwrap_or_else(|| change.path.clone());
        self.post_write("things", &body, "upsert thing", &url, version)
            .await
    }

    async fn delete_thing(&self, ns: &str, thing_type: &str, id: &str, version: u64) -> Result<()> {
        let body = DeleteRequest {
            ns,
            thing_type,
            id,
            version,
            actor: &self.actor,
        };
        let url = thing_url(ns, thing_type, id);
        self.post_write("things/delete", &body, "delete thing", &url, version)
            .await
    }

    async fn get_thing(&self, url: &str) -> Result<Option<EntitySnapshot>> {
        self.get_optional("things", &[("url", url)], "get thing").await
    }

    async fn emit_event(&self, event: &Event) -> Result<()> {
        self.post("events", event, "emit event").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_building() {
        let provider = HttpProvider::new("https://content.example.com/api/", None);
        assert_eq!(provider.base_url(), "https://content.example.com/api");
        assert_eq!(
            provider.endpoint("actions/abc/progress"),
            "https://content.example.com/api/sync/actions/abc/progress"
        );
    }

    #[test]
    fn test_delete_request_shape() {
        let body = DeleteRequest {
            ns: "ns",
            thing_type: "Post",
            id: "a",
            version: 3,
            actor: "me",
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["type"], "Post");
        assert_eq!(value["version"], 3);
    }

    #[test]
    fn test_conflict_on_write_is_stale_version() {
        let err = rejection(
            StatusCode::CONFLICT,
            r#"{"current": 4}"#,
            "upsert thing",
            Some(("ns/Post/a", 3)),
        );
        assert!(matches!(
            err,
            Error::StaleVersion { ref url, attempted: 3, current: 4 } if url == "ns/Post/a"
        ));

        let err = rejection(StatusCode::CONFLICT, "busy", "delete thing", Some(("ns/Post/a", 3)));
        assert!(matches!(err, Error::StaleVersion { attempted: 3, current: 3, .. }));
    }

    #[test]
    fn test_other_failures_are_provider_errors() {
        let err = rejection(StatusCode::CONFLICT, "", "emit event", None);
        assert!(matches!(err, Error::Provider(_)));
        let err = rejection(StatusCode::INTERNAL_SERVER_ERROR, "boom", "upsert thing", Some(("u", 1)));
        assert!(matches!(err, Error::Provider(ref m) if m.contains("boom")));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_not_connected() {
        let provider = HttpProvider::new("http://127.0.0.1:9", None);
        assert!(!provider.is_connected().await);
    }
}
