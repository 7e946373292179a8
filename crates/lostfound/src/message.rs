//! Wire messages exchanged with the WeCom callback
//!
//! Inbound envelopes arrive as XML (after decryption). They are parsed once into a
//! closed [`InboundMessage`] variant so the dialog never matches on raw type strings.

use crate::error::{LostFoundError, LostFoundResult};
use serde::{Deserialize, Serialize};

/// Raw envelope, every type-specific field optional
#[derive(Debug, Default, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "ToUserName", default)]
    to_username: String,
    #[serde(rename = "FromUserName", default)]
    from_username: String,
    #[serde(rename = "CreateTime", default)]
    create_time: u32,
    #[serde(rename = "MsgType", default)]
    msg_type: String,
    #[serde(rename = "Content", default)]
    content: Option<String>,
    #[serde(rename = "PicUrl", default)]
    pic_url: Option<String>,
    #[serde(rename = "MediaId", default)]
    media_id: Option<String>,
    #[serde(rename = "MsgId", default)]
    msg_id: Option<String>,
    #[serde(rename = "AgentID", default)]
    agent_id: Option<u32>,
}

/// Fields shared by every inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sending user id
    pub from: String,
    /// Receiving corp id
    pub to: String,
    pub created_at: u32,
    pub msg_id: Option<String>,
    pub agent_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub envelope: Envelope,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMessage {
    pub envelope: Envelope,
    pub picture_url: String,
    pub media_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedMessage {
    pub envelope: Envelope,
    pub msg_type: String,
}

/// Parsed inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Text(TextMessage),
    Image(ImageMessage),
    Unsupported(UnsupportedMessage),
}

impl InboundMessage {
    /// Parse a decrypted XML envelope
    pub fn from_xml(xml: &str) -> LostFoundResult<Self> {
        let raw: RawEnvelope = quick_xml::de::from_str(xml)?;
        if raw.from_username.is_empty() {
            return Err(LostFoundError::MalformedPayload(
                "missing FromUserName".to_string(),
            ));
        }

        let envelope = Envelope {
            from: raw.from_username,
            to: raw.to_username,
            created_at: raw.create_time,
            msg_id: raw.msg_id,
            agent_id: raw.agent_id,
        };

        let message = match raw.msg_type.as_str() {
            "text" => InboundMessage::Text(TextMessage {
                envelope,
                content: raw.content.unwrap_or_default(),
            }),
            "image" => match raw.pic_url {
                Some(picture_url) if !picture_url.is_empty() => {
                    InboundMessage::Image(ImageMessage {
                        envelope,
                        picture_url,
                        media_id: raw.media_id.unwrap_or_default(),
                    })
                }
                _ => {
                    return Err(LostFoundError::MalformedPayload(
                        "image message without PicUrl".to_string(),
                    ))
                }
            },
            other => InboundMessage::Unsupported(UnsupportedMessage {
                envelope,
                msg_type: other.to_string(),
            }),
        };
        Ok(message)
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            InboundMessage::Text(m) => &m.envelope,
            InboundMessage::Image(m) => &m.envelope,
            InboundMessage::Unsupported(m) => &m.envelope,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.envelope().from
    }

    /// Trimmed text content, `None` for non-text messages
    pub fn text(&self) -> Option<&str> {
        match self {
            InboundMessage::Text(m) => Some(m.content.trim()),
            _ => None,
        }
    }
}

/// Passive reply returned in the callback response body
#[derive(Debug, Serialize)]
#[serde(rename = "xml")]
pub struct ReplyTextMsg {
    #[serde(rename = "ToUserName")]
    pub to_username: String,
    #[serde(rename = "FromUserName")]
    pub from_username: String,
    #[serde(rename = "CreateTime")]
    pub create_time: u32,
    #[serde(rename = "MsgType")]
    pub msg_type: &'static str,
    #[serde(rename = "Content")]
    pub content: String,
}

impl ReplyTextMsg {
    /// Reply to `envelope`, swapping sender and receiver
    pub fn to_envelope(envelope: &Envelope, content: impl Into<String>) -> Self {
        Self {
            to_username: envelope.from.clone(),
            from_username: envelope.to.clone(),
            create_time: envelope.created_at,
            msg_type: "text",
            content: content.into(),
        }
    }

    pub fn to_xml(&self) -> LostFoundResult<String> {
        Ok(quick_xml::se::to_string(self)?)
    }
}

/// Produce the synchronous reply payload for an inbound envelope
pub fn reply_inline(envelope: &Envelope, text: &str) -> LostFoundResult<String> {
    ReplyTextMsg::to_envelope(envelope, text).to_xml()
}
