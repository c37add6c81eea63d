//! Live ticket updates over WebSocket.
//!
//! The caller is authenticated before the upgrade. Browsers cannot set
//! headers on a WebSocket handshake, so credentials may also be passed as
//! query parameters: `token` for API keys, `user_id`/`role` in development
//! mode.

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use triage_core::auth::{USER_ID_HEADER, USER_ROLE_HEADER};
use triage_core::{Identity, TriageEvent};

use super::middleware::authenticate_headers;
use crate::metrics::{WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_MESSAGES_SENT};
use crate::state::AppState;

/// Message sent to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    /// First message on every connection.
    Connected,
    /// A ticket changed, already masked for the subscriber.
    TicketUpdated(TriageEvent),
}

impl StreamMessage {
    fn kind(&self) -> &'static str {
        match self {
            StreamMessage::Connected => "connected",
            StreamMessage::TicketUpdated(_) => "ticket_updated",
        }
    }
}

/// Credentials accepted on the query string.
#[derive(Debug, Default, Deserialize)]
pub struct StreamParams {
    pub token: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
}

impl StreamParams {
    /// Copy query credentials into headers the authenticator understands.
    /// Headers sent by the client take precedence.
    fn apply(self, headers: &mut HeaderMap) {
        let mut set = |name: header::HeaderName, value: Option<String>| {
            if headers.contains_key(&name) {
                return;
            }
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(&v).ok()) {
                headers.insert(name, value);
            }
        };

        set(
            header::AUTHORIZATION,
            self.token.map(|token| format!("Bearer {}", token)),
        );
        set(header::HeaderName::from_static(USER_ID_HEADER), self.user_id);
        set(header::HeaderName::from_static(USER_ROLE_HEADER), self.role);
    }
}

/// WebSocket upgrade handler for the live ticket stream.
pub async fn stream_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<AppState>>,
    Query(params): Query<StreamParams>,
    mut headers: HeaderMap,
) -> Response {
    params.apply(&mut headers);

    let identity = match authenticate_headers(
        state.authenticator(),
        &headers,
        IpAddr::V4(Ipv4Addr::LOCALHOST),
    )
    .await
    {
        Ok(identity) => identity,
        Err(status) => return status.into_response(),
    };

    match ws {
        Ok(ws) => ws
            .on_upgrade(move |socket| handle_socket(socket, state, identity))
            .into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &StreamMessage,
) -> Result<(), ()> {
    let json = match serde_json::to_string(msg) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize StreamMessage: {}", e);
            return Ok(());
        }
    };

    sender
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())?;
    WS_MESSAGES_SENT.with_label_values(&[msg.kind()]).inc();
    Ok(())
}

/// Handle a single live connection.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Identity) {
    let (mut sender, mut receiver) = socket.split();

    let mut session = state.gateway().connect(identity);
    let session_id = session.id();

    WS_CONNECTIONS_TOTAL.inc();
    WS_CONNECTIONS_ACTIVE.inc();

    info!(session_id, user_id = %session.identity().user_id, "Live stream connected");

    let mut send_task = tokio::spawn(async move {
        if send_message(&mut sender, &StreamMessage::Connected)
            .await
            .is_err()
        {
            return;
        }

        while let Some(event) = session.recv().await {
            if send_message(&mut sender, &StreamMessage::TicketUpdated(event))
                .await
                .is_err()
            {
                debug!(session_id, "WebSocket send failed, client disconnected");
                return;
            }
        }

        // Session was closed by the gateway.
        let _ = sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            _ = &mut send_task => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!(session_id, "WebSocket client closed");
                    break;
                }
                Some(Ok(Message::Text(text))) => {
                    // Subscribers never send commands.
                    debug!(session_id, "Ignoring client message: {}", text);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session_id, "WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }

    // Dropping the session with the task unsubscribes it.
    send_task.abort();
    WS_CONNECTIONS_ACTIVE.dec();
    info!(session_id, "Live stream disconnected");
}
