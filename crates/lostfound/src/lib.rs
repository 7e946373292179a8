//! Lost-and-found intake bot
//!
//! Drives a turn-by-turn WeCom chat dialog in which a user reports a lost or found item,
//! confirms each field, may jump back from the final review to amend one field, and
//! finally commits the record. Users can also browse the other side's records.
//!
//! # Features
//! - Per-user session store with idle eviction
//! - Stage dispatcher with a shared confirm loop, review and browse controllers
//! - SQLite record storage with per-kind tag index
//! - WeCom push delivery with access token refresh and retry
//! - Callback signature verification and XML envelopes

pub mod codec;
pub mod config;
pub mod conversation;
pub mod error;
pub mod message;
pub mod migrations;
pub mod models;
pub mod services;

pub use config::{DialogConfig, Prompts};
pub use conversation::{Effect, EffectRunner, Outcome, SessionStore, StageDispatcher};
pub use error::{LostFoundError, LostFoundResult};
pub use message::InboundMessage;
