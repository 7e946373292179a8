//! WeCom callback routes

use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use lostfound::codec::CallbackParams;
use lostfound::message::reply_inline;
use lostfound::{InboundMessage, LostFoundError};
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::{info, warn};

use crate::state::AppState;

/// Callback endpoint plus static hosting of stored pictures
pub fn bot_routes(state: Arc<AppState>) -> Router {
    let images = ServeDir::new(&state.config.image_dir);
    Router::new()
        .route("/api/bot/message", get(verify_url).post(receive_message))
        .nest_service("/api/bot/imgs", images)
        .with_state(state)
}

/// URL verification handshake: echo the verified `echostr`
async fn verify_url(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<String, LostFoundError> {
    match state.codec.verify_url(&params) {
        Ok(echo) => {
            info!("Callback URL verified");
            Ok(echo)
        }
        Err(e) => {
            warn!(error = %e, "Callback URL verification failed");
            Err(e)
        }
    }
}

async fn receive_message(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
    body: String,
) -> Result<Response, LostFoundError> {
    let message = state
        .codec
        .decode(&params, &body)
        .and_then(|xml| InboundMessage::from_xml(&xml))
        .inspect_err(|e| warn!(error = %e, "Rejected callback payload"))?;

    let outcome = state.dispatcher.dispatch(&message).await?;
    let reply = reply_inline(message.envelope(), &outcome.reply)
        .and_then(|xml| state.codec.encode_reply(&params, xml));
    // effects run even if the reply cannot be encoded; the session is already updated
    state.runner.spawn(outcome).await;

    Ok((
        [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
        reply?,
    )
        .into_response())
}
