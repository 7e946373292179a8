//! Callback payload verification and (de)coding
//!
//! The platform signs every callback with `sha1(sort(token, timestamp, nonce, payload))`.
//! AES payload encryption is left to other [`MessageCodec`] implementations; the shipped
//! [`PlaintextCodec`] handles callbacks configured in plaintext mode.

use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::error::{LostFoundError, LostFoundResult};

/// Query parameters attached to every callback request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub msg_signature: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub nonce: String,
    /// Only present on the URL verification handshake
    #[serde(default)]
    pub echostr: Option<String>,
}

/// Turns raw callback bodies into envelope XML and back
pub trait MessageCodec: Send + Sync {
    /// Answer the URL verification handshake with the plain echo string
    fn verify_url(&self, params: &CallbackParams) -> LostFoundResult<String>;

    /// Verify and decode a callback body into envelope XML
    fn decode(&self, params: &CallbackParams, body: &str) -> LostFoundResult<String>;

    /// Encode a reply envelope for the response body
    fn encode_reply(&self, params: &CallbackParams, reply_xml: String) -> LostFoundResult<String>;
}

/// Signature over the sorted parts, hex encoded
pub fn signature(token: &str, timestamp: &str, nonce: &str, payload: &str) -> String {
    let mut parts = [token, timestamp, nonce, payload];
    parts.sort_unstable();
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Codec for plaintext callbacks.
///
/// With a token configured every request must carry a matching `msg_signature`; without
/// one, payloads pass through unchecked (local testing).
#[derive(Debug, Clone, Default)]
pub struct PlaintextCodec {
    token: Option<String>,
}

impl PlaintextCodec {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()),
        }
    }

    fn check(&self, params: &CallbackParams, payload: &str) -> LostFoundResult<()> {
        let Some(token) = &self.token else {
            return Ok(());
        };
        let expected = signature(token, &params.timestamp, &params.nonce, payload);
        if !expected.eq_ignore_ascii_case(params.msg_signature.trim()) {
            return Err(LostFoundError::Crypto("signature mismatch".to_string()));
        }
        Ok(())
    }
}

impl MessageCodec for PlaintextCodec {
    fn verify_url(&self, params: &CallbackParams) -> LostFoundResult<String> {
        let echostr = params
            .echostr
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| LostFoundError::MalformedPayload("missing echostr".to_string()))?;
        self.check(params, echostr)?;
        Ok(echostr.to_string())
    }

    fn decode(&self, params: &CallbackParams, body: &str) -> LostFoundResult<String> {
        if body.trim().is_empty() {
            return Err(LostFoundError::MalformedPayload("empty body".to_string()));
        }
        self.check(params, body)?;
        Ok(body.to_string())
    }

    fn encode_reply(&self, _params: &CallbackParams, reply_xml: String) -> LostFoundResult<String> {
        Ok(reply_xml)
    }
}
