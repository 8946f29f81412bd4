//! Appwrite REST and realtime client.
//!
//! Sessions are carried the way Appwrite's mobile SDKs carry them: the
//! server returns the session cookie in an `X-Fallback-Cookies` header and
//! the client sends it back on every request. The same value authenticates
//! the realtime socket. Persisting it between runs is up to the caller
//! ([`AppwriteClient::session_secret`] / [`AppwriteClient::set_session_secret`]).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use super::query::Query;
use super::traits::{AuthBackend, DocumentStore, RealtimeChannel};
use super::unique_id;
use crate::config::BackendConfig;
use crate::error::{CoreError, Result};
use crate::model::User;
use crate::realtime::{RealtimeMessage, Subscription, SUBSCRIPTION_BUFFER};

const RESPONSE_FORMAT: &str = "1.5.0";
const FALLBACK_COOKIES: &str = "x-fallback-cookies";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct DocumentList {
    #[serde(default)]
    documents: Vec<Value>,
}

/// Appwrite client for one project and database.
pub struct AppwriteClient {
    http: Client,
    config: BackendConfig,
    endpoint: String,
    fallback_cookies: RwLock<Option<String>>,
}

impl AppwriteClient {
    /// Create a client. Fails if `config` is incomplete.
    pub fn new(config: BackendConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            http,
            config,
            fallback_cookies: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Session cookie blob to persist between runs, if signed in.
    pub fn session_secret(&self) -> Option<String> {
        self.fallback_cookies
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Restore (or clear) a previously persisted session.
    pub fn set_session_secret(&self, secret: Option<String>) {
        *self
            .fallback_cookies
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = secret;
    }

    fn documents_path(&self, collection: &str) -> String {
        format!(
            "/databases/{}/collections/{}/documents",
            urlencoding::encode(&self.config.database_id),
            urlencoding::encode(collection)
        )
    }

    fn document_path(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/{}",
            self.documents_path(collection),
            urlencoding::encode(id)
        )
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut rb = self
            .http
            .request(method, format!("{}{}", self.endpoint, path))
            .header("X-Appwrite-Project", &self.config.project_id)
            .header("X-Appwrite-Response-Format", RESPONSE_FORMAT);
        if !self.config.platform.is_empty() {
            rb = rb.header(
                "Origin",
                format!("appwrite-{}://{}", std::env::consts::OS, self.config.platform),
            );
        }
        if let Some(cookies) = self.session_secret() {
            rb = rb.header("X-Fallback-Cookies", cookies);
        }
        rb
    }

    /// Send, remember any session cookie the server hands back, and turn
    /// non-success statuses into errors.
    async fn execute(&self, rb: RequestBuilder) -> Result<Response> {
        let resp = rb.send().await?;

        if let Some(cookies) = resp
            .headers()
            .get(FALLBACK_COOKIES)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty() && *v != "[]")
        {
            self.set_session_secret(Some(cookies.to_string()));
        }

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let body: ErrorBody = resp.json().await.unwrap_or_default();
        tracing::debug!(status = status.as_u16(), kind = %body.kind, "appwrite request failed");
        match status.as_u16() {
            401 => Err(CoreError::Auth(body.message)),
            code => Err(CoreError::Backend {
                status: code,
                message: body.message,
            }),
        }
    }

    async fn execute_json(&self, rb: RequestBuilder) -> Result<Value> {
        Ok(self.execute(rb).await?.json().await?)
    }

    /// `wss://.../v1/realtime?project=..&channels[]=..` for `channels`.
    pub fn realtime_url(&self, channels: &[String]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/realtime", self.endpoint)).map_err(|e| {
            CoreError::Realtime(format!("invalid realtime endpoint: {e}"))
        })?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| CoreError::Realtime("cannot switch endpoint to websocket".into()))?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("project", &self.config.project_id);
            for channel in channels {
                pairs.append_pair("channels[]", channel);
            }
        }
        Ok(url)
    }

    /// Session secret for the realtime handshake, pulled out of the cookie blob.
    fn realtime_session(&self) -> Option<String> {
        let blob = self.session_secret()?;
        let cookies: serde_json::Map<String, Value> = serde_json::from_str(&blob).ok()?;
        let key = format!("a_session_{}", self.config.project_id);
        cookies
            .get(&key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

/// A decoded realtime socket frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    /// Handshake finished; `authenticated` is false when the socket has no user.
    Connected { authenticated: bool },
    Event(RealtimeMessage),
    Error(String),
    Other,
}

pub(crate) fn parse_frame(text: &str) -> Frame {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Frame::Other;
    };
    let data = value.get("data").cloned().unwrap_or(Value::Null);
    match value.get("type").and_then(Value::as_str) {
        Some("connected") => Frame::Connected {
            authenticated: data.get("user").is_some_and(|u| !u.is_null()),
        },
        Some("event") => match serde_json::from_value(data) {
            Ok(msg) => Frame::Event(msg),
            Err(e) => Frame::Error(format!("malformed event: {e}")),
        },
        Some("error") => Frame::Error(
            data.get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown realtime error")
                .to_string(),
        ),
        _ => Frame::Other,
    }
}

#[async_trait]
impl AuthBackend for AppwriteClient {
    async fn create_session(&self, email: &str, password: &str) -> Result<()> {
        let rb = self
            .request(Method::POST, "/account/sessions/email")
            .json(&json!({"email": email, "password": password}));
        self.execute(rb).await?;
        Ok(())
    }

    async fn current_user(&self) -> Result<Option<User>> {
        match self.execute_json(self.request(Method::GET, "/account")).await {
            Ok(value) => Ok(Some(serde_json::from_value(value)?)),
            Err(CoreError::Auth(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_account(&self, email: &str, password: &str) -> Result<User> {
        let rb = self.request(Method::POST, "/account").json(&json!({
            "userId": unique_id(),
            "email": email,
            "password": password,
        }));
        let value = self.execute_json(rb).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn delete_session(&self) -> Result<()> {
        self.execute(self.request(Method::DELETE, "/account/sessions/current"))
            .await?;
        self.set_session_secret(None);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for AppwriteClient {
    async fn list(&self, collection: &str, queries: &[Query]) -> Result<Vec<Value>> {
        let params: Vec<(&str, String)> = queries
            .iter()
            .map(|q| ("queries[]", q.to_json().to_string()))
            .collect();
        let rb = self
            .request(Method::GET, &self.documents_path(collection))
            .query(&params);
        let list: DocumentList = serde_json::from_value(self.execute_json(rb).await?)?;
        Ok(list.documents)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Value> {
        let rb = self.request(Method::GET, &self.document_path(collection, id));
        match self.execute_json(rb).await {
            Err(CoreError::Backend { status: 404, .. }) => Err(CoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            other => other,
        }
    }

    async fn create(&self, collection: &str, id: &str, data: Value) -> Result<Value> {
        let rb = self
            .request(Method::POST, &self.documents_path(collection))
            .json(&json!({"documentId": id, "data": data}));
        self.execute_json(rb).await
    }

    async fn update(&self, collection: &str, id: &str, data: Value) -> Result<Value> {
        let rb = self
            .request(Method::PATCH, &self.document_path(collection, id))
            .json(&json!({"data": data}));
        match self.execute_json(rb).await {
            Err(CoreError::Backend { status: 404, .. }) => Err(CoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            other => other,
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let rb = self.request(Method::DELETE, &self.document_path(collection, id));
        match self.execute(rb).await {
            Ok(_) => Ok(()),
            Err(CoreError::Backend { status: 404, .. }) => Err(CoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RealtimeChannel for AppwriteClient {
    async fn subscribe(&self, channels: Vec<String>) -> Result<Subscription> {
        let url = self.realtime_url(&channels)?;
        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = socket.split();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let session = self.realtime_session();
        tracing::debug!(channels = channels.len(), "realtime connected");

        let task = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
            heartbeat.tick().await;
            loop {
                tokio::select! {
                    frame = stream.next() => match frame {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            Frame::Connected { authenticated: false } => {
                                if let Some(session) = &session {
                                    let auth = json!({"type": "authentication", "data": {"session": session}});
                                    if sink.send(Message::Text(auth.to_string())).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Frame::Event(msg) => {
                                if tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                            Frame::Error(message) => tracing::warn!(%message, "realtime error frame"),
                            Frame::Connected { .. } | Frame::Other => {}
                        },
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "realtime socket failed");
                            break;
                        }
                    },
                    _ = heartbeat.tick() => {
                        let ping = json!({"type": "ping"}).to_string();
                        if sink.send(Message::Text(ping)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("realtime feed closed");
        });

        Ok(Subscription::new(channels, rx, task))
    }
}
