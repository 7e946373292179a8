//! Application state

use lostfound::codec::MessageCodec;
use lostfound::services::DbPool;
use lostfound::{EffectRunner, SessionStore, StageDispatcher};
use std::sync::Arc;

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Record database
    pub pool: DbPool,

    /// Server configuration
    pub config: Config,

    /// Conversation engine, owns the session store
    pub dispatcher: Arc<StageDispatcher>,

    /// Runs deferred pushes, commits and downloads
    pub runner: Arc<EffectRunner>,

    /// Callback verification and payload decoding
    pub codec: Arc<dyn MessageCodec>,
}

impl AppState {
    pub fn sessions(&self) -> &Arc<SessionStore> {
        self.dispatcher.store()
    }
}
