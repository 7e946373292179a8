//! Outbound push delivery through the WeCom application message API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::{LostFoundError, LostFoundResult};

/// Asynchronous delivery of messages to a user
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn push_text(&self, user_id: &str, text: &str) -> LostFoundResult<()>;
    async fn push_markdown(&self, user_id: &str, markdown: &str) -> LostFoundResult<()>;
}

/// errcodes meaning the access token must be fetched again
const CREDENTIAL_ERRCODES: &[i64] = &[40014, 41001, 42001];

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
    #[serde(default)]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

#[derive(Debug, Serialize)]
struct PushContent<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct PushMessage<'a> {
    touser: &'a str,
    msgtype: &'static str,
    agentid: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<PushContent<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    markdown: Option<PushContent<'a>>,
    enable_duplicate_check: u8,
}

/// Credentials for the WeCom API
#[derive(Debug, Clone)]
pub struct WeComCredentials {
    pub api_base: String,
    pub corp_id: String,
    pub corp_secret: String,
    pub agent_id: i64,
}

/// Notifier backed by `cgi-bin/message/send`.
///
/// Each push is attempted up to `max_attempts` times. A credential-invalid answer drops
/// the cached access token so the next attempt fetches a fresh one.
pub struct WeComNotifier {
    client: reqwest::Client,
    credentials: WeComCredentials,
    max_attempts: u32,
    retry_delay: Duration,
    access_token: RwLock<Option<String>>,
}

impl WeComNotifier {
    pub fn new(client: reqwest::Client, credentials: WeComCredentials) -> Self {
        Self {
            client,
            credentials,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(300),
            access_token: RwLock::new(None),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/cgi-bin/{}",
            self.credentials.api_base.trim_end_matches('/'),
            path
        )
    }

    /// Fetch a new access token and cache it
    pub async fn refresh_access_token(&self) -> LostFoundResult<String> {
        let resp: TokenResponse = self
            .client
            .get(self.url("gettoken"))
            .query(&[
                ("corpid", self.credentials.corp_id.as_str()),
                ("corpsecret", self.credentials.corp_secret.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if resp.errcode != 0 || resp.access_token.is_empty() {
            return Err(LostFoundError::Credential {
                errcode: resp.errcode,
                errmsg: resp.errmsg,
            });
        }

        info!("Access token refreshed");
        *self.access_token.write().await = Some(resp.access_token.clone());
        Ok(resp.access_token)
    }

    async fn access_token(&self) -> LostFoundResult<String> {
        if let Some(token) = self.access_token.read().await.clone() {
            return Ok(token);
        }
        self.refresh_access_token().await
    }

    async fn send_once(&self, message: &PushMessage<'_>) -> LostFoundResult<()> {
        let token = self.access_token().await?;
        let resp: SendResponse = self
            .client
            .post(self.url("message/send"))
            .query(&[("access_token", token.as_str())])
            .json(message)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match resp.errcode {
            0 => Ok(()),
            code if CREDENTIAL_ERRCODES.contains(&code) => {
                *self.access_token.write().await = None;
                Err(LostFoundError::Credential {
                    errcode: code,
                    errmsg: resp.errmsg,
                })
            }
            code => Err(LostFoundError::Delivery {
                attempts: 1,
                reason: format!("errcode={} errmsg={}", code, resp.errmsg),
            }),
        }
    }

    async fn send(&self, message: PushMessage<'_>) -> LostFoundResult<()> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match self.send_once(&message).await {
                Ok(()) => {
                    debug!(user_id = message.touser, attempt, "Push delivered");
                    return Ok(());
                }
                Err(e) if e.is_retryable() => {
                    warn!(
                        user_id = message.touser,
                        attempt,
                        error = %e,
                        "Push attempt failed"
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts && !self.retry_delay.is_zero() {
                        tokio::time::sleep(self.retry_delay * attempt).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Err(LostFoundError::Delivery {
            attempts: self.max_attempts,
            reason: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        })
    }
}

#[async_trait]
impl Notifier for WeComNotifier {
    async fn push_text(&self, user_id: &str, text: &str) -> LostFoundResult<()> {
        self.send(PushMessage {
            touser: user_id,
            msgtype: "text",
            agentid: self.credentials.agent_id,
            text: Some(PushContent { content: text }),
            markdown: None,
            enable_duplicate_check: 0,
        })
        .await
    }

    async fn push_markdown(&self, user_id: &str, markdown: &str) -> LostFoundResult<()> {
        self.send(PushMessage {
            touser: user_id,
            msgtype: "markdown",
            agentid: self.credentials.agent_id,
            text: None,
            markdown: Some(PushContent { content: markdown }),
            enable_duplicate_check: 0,
        })
        .await
    }
}

/// Notifier that only logs, used when no WeCom credentials are configured
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn push_text(&self, user_id: &str, text: &str) -> LostFoundResult<()> {
        info!(user_id, text, "push (text, not delivered)");
        Ok(())
    }

    async fn push_markdown(&self, user_id: &str, markdown: &str) -> LostFoundResult<()> {
        info!(user_id, markdown, "push (markdown, not delivered)");
        Ok(())
    }
}
