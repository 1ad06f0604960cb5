//! Backend data collaborator
//!
//! REST client for the store of accounts, bots, and channels. The low-level
//! calls return the JSON body together with the HTTP status; 200/201 denote
//! success and any other status is a failure whose body is inspected for a
//! human-readable `detail`. The typed helpers are built on the low-level
//! calls so a test can stub the four raw methods and get the full surface.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::domain::{BotProfile, BotRecord, ChannelRecord};

/// Errors from the backend collaborator
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("backend returned {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("unexpected payload: {0}")]
    InvalidResponse(String),
}

/// Pull the human-readable reason out of an error body, if present
fn detail_of(body: &Value) -> String {
    body.get("detail")
        .and_then(Value::as_str)
        .unwrap_or("no detail")
        .to_string()
}

fn expect(body: Value, status: u16, want: u16) -> Result<Value, BackendError> {
    if status == want {
        Ok(body)
    } else {
        Err(BackendError::Status {
            status,
            detail: detail_of(&body),
        })
    }
}

fn parse<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, BackendError> {
    serde_json::from_value(body).map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

/// The accounts/bots/channels store, as the fleet sees it
#[async_trait]
pub trait BackendApi: Send + Sync {
    /// GET a path under the API root
    async fn fetch(&self, path: &str) -> Result<(Value, u16), BackendError>;

    /// GET an absolute URL (token validation goes straight to the provider)
    async fn fetch_url(&self, url: &str) -> Result<(Value, u16), BackendError>;

    /// POST a JSON body to a path under the API root
    async fn post(&self, path: &str, body: Value) -> Result<(Value, u16), BackendError>;

    /// PATCH a JSON body to a path under the API root
    async fn patch(&self, path: &str, body: Value) -> Result<(Value, u16), BackendError>;

    /// All bots, or one tenant's when `owner` is given
    async fn list_bots(&self, owner: Option<i64>) -> Result<Vec<BotRecord>, BackendError> {
        let path = match owner {
            Some(owner) => format!("bots/?account_id={owner}"),
            None => "bots/".to_string(),
        };
        let (body, status) = self.fetch(&path).await?;
        parse(expect(body, status, 200)?)
    }

    /// A tenant's channels; `without_bot` restricts to unattached ones
    async fn list_channels(&self, owner: i64, without_bot: bool) -> Result<Vec<ChannelRecord>, BackendError> {
        let mut path = format!("channels/?account_id={owner}");
        if without_bot {
            path.push_str("&doesnt_have_bot=1");
        }
        let (body, status) = self.fetch(&path).await?;
        parse(expect(body, status, 200)?)
    }

    /// Register an account; true when newly created, false when it already
    /// existed
    async fn register_account(&self, id: i64, name: &str, username: Option<&str>) -> Result<bool, BackendError> {
        let (body, status) = self
            .post(
                "account/add/",
                json!({"id": id, "name": name, "username": username}),
            )
            .await?;
        match status {
            201 => Ok(true),
            400 if detail_of(&body) == "Account already exists" => Ok(false),
            _ => Err(BackendError::Status {
                status,
                detail: detail_of(&body),
            }),
        }
    }

    async fn add_channel(&self, id: &str, name: &str, owner: i64) -> Result<(), BackendError> {
        let (body, status) = self
            .post("channel/add/", json!({"id": id, "name": name, "owner": owner}))
            .await?;
        expect(body, status, 201)?;
        Ok(())
    }

    /// Create a bot; the created record comes back from the backend
    async fn add_bot(&self, payload: Value) -> Result<BotRecord, BackendError> {
        let (body, status) = self.post("bot/add/", payload).await?;
        parse(expect(body, status, 201)?)
    }

    /// Flip a bot's `is_running` flag; returns the updated record
    async fn set_bot_running(&self, bot_id: &str, running: bool) -> Result<BotRecord, BackendError> {
        let (body, status) = self
            .patch(&format!("bot/update/{bot_id}/"), json!({"is_running": running}))
            .await?;
        parse(expect(body, status, 200)?)
    }

    /// Check a bot token against the provider's getMe endpoint
    ///
    /// `None` means the token was rejected; errors are reserved for the call
    /// itself failing.
    async fn validate_bot_token(&self, api_base: &str, token: &str) -> Result<Option<BotProfile>, BackendError> {
        let url = format!("{}/bot{}/getMe", api_base.trim_end_matches('/'), token);
        let (body, status) = self.fetch_url(&url).await?;
        if status != 200 {
            return Ok(None);
        }
        let profile = body
            .get("result")
            .cloned()
            .ok_or_else(|| BackendError::InvalidResponse("getMe: missing result".to_string()))?;
        Ok(Some(parse(profile)?))
    }
}

/// reqwest-backed implementation of [`BackendApi`]
pub struct HttpBackend {
    http: reqwest::Client,
    api_root: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let http = reqwest::Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            api_root: format!("{}/api/v1/", base_url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    async fn read(response: reqwest::Response) -> (Value, u16) {
        let status = response.status().as_u16();
        // an empty or non-JSON error body still carries the status
        let body = response.json::<Value>().await.unwrap_or(Value::Null);
        (body, status)
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn fetch(&self, path: &str) -> Result<(Value, u16), BackendError> {
        debug!(path, "backend GET");
        let response = self.http.get(self.url(path)).send().await?;
        Ok(Self::read(response).await)
    }

    async fn fetch_url(&self, url: &str) -> Result<(Value, u16), BackendError> {
        let response = self.http.get(url).send().await?;
        Ok(Self::read(response).await)
    }

    async fn post(&self, path: &str, body: Value) -> Result<(Value, u16), BackendError> {
        debug!(path, "backend POST");
        let response = self.http.post(self.url(path)).json(&body).send().await?;
        Ok(Self::read(response).await)
    }

    async fn patch(&self, path: &str, body: Value) -> Result<(Value, u16), BackendError> {
        debug!(path, "backend PATCH");
        let response = self.http.patch(self.url(path)).json(&body).send().await?;
        Ok(Self::read(response).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Stub that scripts the raw calls so the typed helpers can be exercised
    struct StubBackend {
        responses: Mutex<Vec<(Value, u16)>>,
        requests: Mutex<Vec<String>>,
    }

    impl StubBackend {
        fn new(responses: Vec<(Value, u16)>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn next(&self, request: String) -> (Value, u16) {
            self.requests.lock().unwrap().push(request);
            self.responses.lock().unwrap().remove(0)
        }
    }

    #[async_trait]
    impl BackendApi for StubBackend {
        async fn fetch(&self, path: &str) -> Result<(Value, u16), BackendError> {
            Ok(self.next(format!("GET {path}")))
        }

        async fn fetch_url(&self, url: &str) -> Result<(Value, u16), BackendError> {
            Ok(self.next(format!("GET {url}")))
        }

        async fn post(&self, path: &str, _body: Value) -> Result<(Value, u16), BackendError> {
            Ok(self.next(format!("POST {path}")))
        }

        async fn patch(&self, path: &str, _body: Value) -> Result<(Value, u16), BackendError> {
            Ok(self.next(format!("PATCH {path}")))
        }
    }

    #[tokio::test]
    async fn test_list_bots_scopes_by_owner() {
        let stub = StubBackend::new(vec![(
            json!([{"id": "201", "username": "echo_bot", "is_running": true}]),
            200,
        )]);

        let bots = stub.list_bots(Some(42)).await.unwrap();

        assert_eq!(bots.len(), 1);
        assert_eq!(bots[0].id, "201");
        assert_eq!(stub.requests.lock().unwrap()[0], "GET bots/?account_id=42");
    }

    #[tokio::test]
    async fn test_list_channels_without_bot_filter() {
        let stub = StubBackend::new(vec![(json!([]), 200)]);

        stub.list_channels(42, true).await.unwrap();

        assert_eq!(
            stub.requests.lock().unwrap()[0],
            "GET channels/?account_id=42&doesnt_have_bot=1"
        );
    }

    #[tokio::test]
    async fn test_register_account_branches_on_status() {
        let stub = StubBackend::new(vec![
            (json!({}), 201),
            (json!({"detail": "Account already exists"}), 400),
            (json!({"detail": "bad payload"}), 400),
        ]);

        assert!(stub.register_account(42, "Ann", Some("ann")).await.unwrap());
        assert!(!stub.register_account(42, "Ann", Some("ann")).await.unwrap());
        assert!(stub.register_account(42, "Ann", None).await.is_err());
    }

    #[tokio::test]
    async fn test_failure_status_carries_detail() {
        let stub = StubBackend::new(vec![(json!({"detail": "channel exists"}), 409)]);

        let error = stub.add_channel("-100", "news", 42).await.unwrap_err();

        let BackendError::Status { status, detail } = error else {
            panic!("expected status error");
        };
        assert_eq!(status, 409);
        assert_eq!(detail, "channel exists");
    }

    #[tokio::test]
    async fn test_validate_bot_token_maps_rejection_to_none() {
        let stub = StubBackend::new(vec![
            (json!({"ok": true, "result": {"id": 7, "first_name": "Echo", "username": "echo_bot"}}), 200),
            (json!({"ok": false}), 401),
        ]);

        let profile = stub
            .validate_bot_token("https://api.telegram.org", "7:abc")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.id, 7);

        let rejected = stub.validate_bot_token("https://api.telegram.org", "bad").await.unwrap();
        assert!(rejected.is_none());
    }
}
